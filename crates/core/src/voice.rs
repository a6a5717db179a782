//! Voice Service
//!
//! Adapter over the two speech engines. It applies the lesson's voice
//! settings, enforces one utterance at a time, normalises transcripts and
//! exposes the number parser for the active language pack.

use crate::language::LanguagePack;
use crate::speech::{
    Capability, RecognitionOptions, SpeechRecognizer, SpeechSynthesizer, Utterance, VoiceError,
    VoiceInfo,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Voice settings applied to every utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub lang: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl VoiceConfig {
    /// Defaults for a pack: its locale, slightly slowed speech for learners.
    pub fn for_language(pack: &LanguagePack) -> Self {
        Self {
            lang: pack.tts_locale.to_string(),
            voice: None,
            rate: 0.8,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// Partial override for [`VoiceConfig`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceConfigUpdate {
    pub voice: Option<String>,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
}

/// Clears an activity flag when the in-flight call finishes or is dropped.
struct ActivityGuard<'a>(&'a AtomicBool);

impl<'a> ActivityGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct VoiceService {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    pack: &'static LanguagePack,
    config: VoiceConfig,
    speaking: AtomicBool,
    listening: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl VoiceService {
    /// Creates the adapter and picks a voice matching the pack's language.
    ///
    /// Either engine may be absent; calls that need it then fail with
    /// `VoiceError::CapabilityUnavailable`.
    pub fn new(
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        pack: &'static LanguagePack,
        config: VoiceConfig,
    ) -> Self {
        let mut service = Self {
            synthesizer,
            recognizer,
            pack,
            config,
            speaking: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            last_error: Mutex::new(None),
        };
        if service.config.voice.is_none() {
            service.config.voice = service.pick_voice().map(|voice| voice.name);
        }
        info!(
            lang = %service.config.lang,
            voice = ?service.config.voice,
            supported = service.is_supported(),
            "Voice service initialized"
        );
        service
    }

    pub fn pack(&self) -> &'static LanguagePack {
        self.pack
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn is_supported(&self) -> bool {
        self.synthesizer.is_some() && self.recognizer.is_some()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Message of the last failed speak or listen, cleared when the next one starts.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .ok()
            .and_then(|slot| (*slot).clone())
    }

    /// Voices whose language tag or name fit the active pack.
    pub fn available_voices(&self) -> Vec<VoiceInfo> {
        let Some(synthesizer) = &self.synthesizer else {
            return Vec::new();
        };
        synthesizer
            .voices()
            .into_iter()
            .filter(|voice| self.voice_matches(voice))
            .collect()
    }

    pub fn set_voice(&mut self, voice: impl Into<String>) {
        self.config.voice = Some(voice.into());
    }

    pub fn update_config(&mut self, update: VoiceConfigUpdate) {
        if let Some(voice) = update.voice {
            self.config.voice = Some(voice);
        }
        if let Some(rate) = update.rate {
            self.config.rate = rate;
        }
        if let Some(pitch) = update.pitch {
            self.config.pitch = pitch;
        }
        if let Some(volume) = update.volume {
            self.config.volume = volume;
        }
    }

    /// Speaks `text` and waits for it to finish.
    ///
    /// Blank text completes immediately without touching the engine. Any
    /// utterance still playing is cancelled first.
    ///
    /// # Errors
    ///
    /// `CapabilityUnavailable` without a synthesizer, or whatever the engine
    /// reports (normally `SynthesisFailure`).
    pub async fn speak(&self, text: &str) -> Result<(), VoiceError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let synthesizer = self
            .synthesizer
            .as_ref()
            .ok_or(VoiceError::CapabilityUnavailable(Capability::Synthesis))?;

        synthesizer.cancel();
        let utterance = Utterance {
            text: text.to_string(),
            lang: self.config.lang.clone(),
            voice: self.config.voice.clone(),
            rate: self.config.rate,
            pitch: self.config.pitch,
            volume: self.config.volume,
        };

        self.set_error(None);
        let result = {
            let _speaking = ActivityGuard::raise(&self.speaking);
            synthesizer.speak(&utterance).await
        };
        if let Err(e) = &result {
            error!(error = %e, "Speech synthesis failed");
            self.set_error(Some(e.to_string()));
        }
        result
    }

    /// Listens for one answer and returns the transcript, lower-cased and trimmed.
    ///
    /// Recognition that ends without a result yields an empty string.
    ///
    /// # Errors
    ///
    /// `CapabilityUnavailable` without a recognizer, or whatever the engine
    /// reports (normally `RecognitionFailure`).
    pub async fn listen(&self) -> Result<String, VoiceError> {
        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or(VoiceError::CapabilityUnavailable(Capability::Recognition))?;
        let options = RecognitionOptions::single_shot(self.config.lang.clone());

        self.set_error(None);
        let result = {
            let _listening = ActivityGuard::raise(&self.listening);
            recognizer.recognize(&options).await
        };
        match result {
            Ok(Some(transcript)) => {
                let transcript = transcript.to_lowercase().trim().to_string();
                debug!(%transcript, "Recognized utterance");
                Ok(transcript)
            }
            Ok(None) => {
                debug!("Recognition ended without a result");
                Ok(String::new())
            }
            Err(e) => {
                error!(error = %e, "Speech recognition failed");
                self.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Maps a transcript to a number using the active pack's lexicon.
    pub fn parse_spoken_number(&self, utterance: &str) -> Option<i64> {
        self.pack.lexicon.parse(utterance)
    }

    /// Cancels synthesis and halts recognition. Safe to call at any time.
    pub fn stop(&self) {
        if let Some(synthesizer) = &self.synthesizer {
            synthesizer.cancel();
        }
        if let Some(recognizer) = &self.recognizer {
            recognizer.abort();
        }
        self.speaking.store(false, Ordering::SeqCst);
        self.listening.store(false, Ordering::SeqCst);
    }

    fn pick_voice(&self) -> Option<VoiceInfo> {
        self.synthesizer
            .as_ref()?
            .voices()
            .into_iter()
            .find(|voice| self.voice_matches(voice))
    }

    fn voice_matches(&self, voice: &VoiceInfo) -> bool {
        voice.lang.starts_with(self.pack.language_prefix())
            || voice.name.to_lowercase().contains(self.pack.voice_name_hint)
    }

    fn set_error(&self, message: Option<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = message;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{HEBREW, RUSSIAN};
    use crate::speech::{MockSpeechRecognizer, MockSpeechSynthesizer};
    use mockall::Sequence;

    fn voices() -> Vec<VoiceInfo> {
        vec![
            VoiceInfo {
                name: "Google US English".into(),
                lang: "en-US".into(),
            },
            VoiceInfo {
                name: "Carmit".into(),
                lang: "he-IL".into(),
            },
            VoiceInfo {
                name: "Milena".into(),
                lang: "ru-RU".into(),
            },
        ]
    }

    fn quiet_synth() -> MockSpeechSynthesizer {
        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_voices().returning(voices);
        synth
    }

    fn service(
        synth: MockSpeechSynthesizer,
        recognizer: MockSpeechRecognizer,
    ) -> VoiceService {
        VoiceService::new(
            Some(Arc::new(synth)),
            Some(Arc::new(recognizer)),
            &RUSSIAN,
            VoiceConfig::for_language(&RUSSIAN),
        )
    }

    #[test]
    fn picks_a_voice_for_the_pack() {
        let voice = service(quiet_synth(), MockSpeechRecognizer::new());
        assert_eq!(voice.config().voice.as_deref(), Some("Milena"));

        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_voices().returning(voices);
        let hebrew = VoiceService::new(
            Some(Arc::new(synth)),
            None,
            &HEBREW,
            VoiceConfig::for_language(&HEBREW),
        );
        assert_eq!(hebrew.config().voice.as_deref(), Some("Carmit"));
        assert_eq!(hebrew.available_voices().len(), 1);
        assert!(!hebrew.is_supported());
    }

    #[test]
    fn voice_can_be_matched_by_name() {
        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_voices().returning(|| {
            vec![VoiceInfo {
                name: "Microsoft Hebrew Asaf".into(),
                lang: "".into(),
            }]
        });
        let voice = VoiceService::new(
            Some(Arc::new(synth)),
            None,
            &HEBREW,
            VoiceConfig::for_language(&HEBREW),
        );
        assert_eq!(voice.config().voice.as_deref(), Some("Microsoft Hebrew Asaf"));
    }

    #[tokio::test]
    async fn blank_text_never_reaches_the_engine() {
        let mut synth = quiet_synth();
        synth.expect_speak().never();
        synth.expect_cancel().never();
        let voice = service(synth, MockSpeechRecognizer::new());

        assert_eq!(voice.speak("   ").await, Ok(()));
        assert_eq!(voice.speak("").await, Ok(()));
    }

    #[tokio::test]
    async fn speak_cancels_before_starting_and_applies_config() {
        let mut seq = Sequence::new();
        let mut synth = quiet_synth();
        synth
            .expect_cancel()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        synth
            .expect_speak()
            .withf(|u: &Utterance| {
                u.text == "Правильно!"
                    && u.lang == "ru-RU"
                    && u.voice.as_deref() == Some("Milena")
                    && (u.rate - 0.8).abs() < f32::EPSILON
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let voice = service(synth, MockSpeechRecognizer::new());

        assert_eq!(voice.speak("Правильно!").await, Ok(()));
        assert!(!voice.is_speaking());
    }

    #[tokio::test]
    async fn synthesis_failure_is_reported() {
        let mut synth = quiet_synth();
        synth.expect_cancel().return_const(());
        synth
            .expect_speak()
            .returning(|_| Err(VoiceError::SynthesisFailure("audio-busy".into())));
        let voice = service(synth, MockSpeechRecognizer::new());

        let err = voice.speak("Привет").await.unwrap_err();
        assert_eq!(err, VoiceError::SynthesisFailure("audio-busy".into()));
        assert_eq!(
            voice.last_error().as_deref(),
            Some("Speech synthesis error: audio-busy")
        );
    }

    #[tokio::test]
    async fn missing_engines_are_unavailable() {
        let voice = VoiceService::new(None, None, &RUSSIAN, VoiceConfig::for_language(&RUSSIAN));
        assert!(!voice.is_supported());
        assert_eq!(
            voice.speak("Привет").await,
            Err(VoiceError::CapabilityUnavailable(Capability::Synthesis))
        );
        assert_eq!(
            voice.listen().await,
            Err(VoiceError::CapabilityUnavailable(Capability::Recognition))
        );
        voice.stop();
    }

    #[tokio::test]
    async fn listen_asks_for_one_final_result_and_normalises() {
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer
            .expect_recognize()
            .withf(|o: &RecognitionOptions| {
                o.lang == "ru-RU" && !o.continuous && !o.interim_results && o.max_alternatives == 1
            })
            .times(1)
            .returning(|_| Ok(Some("  Семь ".to_string())));
        let voice = service(quiet_synth(), recognizer);

        assert_eq!(voice.listen().await, Ok("семь".to_string()));
        assert!(!voice.is_listening());
    }

    #[tokio::test]
    async fn listen_without_result_is_empty() {
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer.expect_recognize().returning(|_| Ok(None));
        let voice = service(quiet_synth(), recognizer);

        assert_eq!(voice.listen().await, Ok(String::new()));
    }

    #[tokio::test]
    async fn recognition_failure_is_reported() {
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer
            .expect_recognize()
            .returning(|_| Err(VoiceError::RecognitionFailure("no-speech".into())));
        let voice = service(quiet_synth(), recognizer);

        assert_eq!(
            voice.listen().await,
            Err(VoiceError::RecognitionFailure("no-speech".into()))
        );
        assert!(voice.last_error().is_some());
    }

    #[test]
    fn stop_halts_both_engines_and_is_repeatable() {
        let mut synth = quiet_synth();
        synth.expect_cancel().times(2).return_const(());
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer.expect_abort().times(2).return_const(());
        let voice = service(synth, recognizer);

        voice.stop();
        voice.stop();
        assert!(!voice.is_speaking());
        assert!(!voice.is_listening());
    }

    #[test]
    fn parses_with_the_pack_lexicon() {
        let voice = service(quiet_synth(), MockSpeechRecognizer::new());
        assert_eq!(voice.parse_spoken_number("семь"), Some(7));
        assert_eq!(voice.parse_spoken_number("7"), Some(7));
        assert_eq!(voice.parse_spoken_number("xyz"), None);
        assert_eq!(voice.parse_spoken_number("25"), None);
    }

    #[test]
    fn config_updates_merge() {
        let mut voice = service(quiet_synth(), MockSpeechRecognizer::new());
        voice.update_config(crate::VoiceConfigUpdate {
            rate: Some(1.2),
            ..Default::default()
        });
        voice.set_voice("Yuri");
        assert_eq!(voice.config().rate, 1.2);
        assert_eq!(voice.config().pitch, 1.0);
        assert_eq!(voice.config().voice.as_deref(), Some("Yuri"));
    }
}
