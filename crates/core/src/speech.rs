//! Speech capability seams.
//!
//! The engines that actually produce and recognise speech live outside this
//! crate (a browser, a native engine, a test double). They are reached through
//! the two traits here; each call resolves exactly once.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which of the two speech engines an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Synthesis,
    Recognition,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Synthesis => write!(f, "synthesis"),
            Capability::Recognition => write!(f, "recognition"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum VoiceError {
    #[error("Speech {0} not supported")]
    CapabilityUnavailable(Capability),
    #[error("Speech synthesis error: {0}")]
    SynthesisFailure(String),
    #[error("Speech recognition error: {0}")]
    RecognitionFailure(String),
    #[error("Speech request was cancelled")]
    Cancelled,
}

/// One utterance handed to the synthesis engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Recognition settings; a lesson always asks for one final result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecognitionOptions {
    pub lang: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
}

impl RecognitionOptions {
    pub fn single_shot(lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            continuous: false,
            interim_results: false,
            max_alternatives: 1,
        }
    }
}

/// A voice offered by the synthesis engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub lang: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speaks `utterance`, completing when it has finished playing.
    async fn speak(&self, utterance: &Utterance) -> Result<(), VoiceError>;

    /// Drops the utterance in progress, if any. Must not fail.
    fn cancel(&self);

    fn voices(&self) -> Vec<VoiceInfo>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Listens once. `Ok(None)` means recognition ended without a result.
    async fn recognize(&self, options: &RecognitionOptions) -> Result<Option<String>, VoiceError>;

    /// Halts recognition in progress, if any. Must not fail.
    fn abort(&self);
}
