use drill_core::language::LanguagePack;
use drill_core::{Pacing, VoiceConfig};
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub language: &'static LanguagePack,
    pub speech_rate: f32,
    pub speech_pitch: f32,
    pub speech_volume: f32,
    pub retry_pause: Duration,
    pub advance_pause: Duration,
    pub log_level: Level,
}

/// Reads `name`, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let language_str = std::env::var("LESSON_LANGUAGE").unwrap_or_else(|_| "ru".to_string());
        let language = LanguagePack::from_code(&language_str).ok_or_else(|| {
            ConfigError::InvalidValue(
                "LESSON_LANGUAGE".to_string(),
                format!("'{}' is not a supported language", language_str),
            )
        })?;

        let speech_rate = env_or("SPEECH_RATE", 0.8_f32)?;
        let speech_pitch = env_or("SPEECH_PITCH", 1.0_f32)?;
        let speech_volume = env_or("SPEECH_VOLUME", 1.0_f32)?;
        if !(0.0..=1.0).contains(&speech_volume) {
            return Err(ConfigError::InvalidValue(
                "SPEECH_VOLUME".to_string(),
                format!("{} is outside 0.0..=1.0", speech_volume),
            ));
        }

        let retry_pause = Duration::from_millis(env_or("RETRY_PAUSE_MS", 1000_u64)?);
        let advance_pause = Duration::from_millis(env_or("ADVANCE_PAUSE_MS", 2000_u64)?);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            language,
            speech_rate,
            speech_pitch,
            speech_volume,
            retry_pause,
            advance_pause,
            log_level,
        })
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            retry_pause: self.retry_pause,
            advance_pause: self.advance_pause,
        }
    }

    /// Voice settings for new connections; the voice itself is picked per client.
    pub fn voice_config(&self) -> VoiceConfig {
        VoiceConfig {
            rate: self.speech_rate,
            pitch: self.speech_pitch,
            volume: self.speech_volume,
            ..VoiceConfig::for_language(self.language)
        }
    }
}
