//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! The browser owns the speech engines. The server drives the lesson and asks
//! the browser to speak or listen; every request carries an `id` that the
//! browser echoes back when the request settles.

use drill_core::LessonView;
use drill_core::speech::{RecognitionOptions, Utterance, VoiceInfo};
use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Reports the browser's speech capabilities. This must be the first message.
    Hello {
        synthesis: bool,
        recognition: bool,
        #[serde(default)]
        voices: Vec<VoiceInfo>,
    },
    /// Starts a lesson.
    Start,
    /// Stops the running lesson.
    Stop,
    /// An utterance finished playing.
    SpeechEnded { id: u64 },
    /// An utterance could not be played.
    SpeechFailed { id: u64, error: String },
    /// The final transcript of a listen request.
    Recognized { id: u64, transcript: String },
    /// Recognition ended without producing a transcript.
    RecognitionEnded { id: u64 },
    /// Recognition failed.
    RecognitionFailed { id: u64, error: String },
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the handshake and names the lesson language.
    Ready { language: String },
    /// Pushes the complete, updated lesson view.
    View { view: LessonView },
    /// Asks the browser to play an utterance.
    Speak {
        id: u64,
        #[serde(flatten)]
        utterance: Utterance,
    },
    /// Drops whatever the browser is currently saying.
    CancelSpeech,
    /// Asks the browser for one recognition result.
    Listen {
        id: u64,
        #[serde(flatten)]
        options: RecognitionOptions,
    },
    /// Halts recognition in progress.
    StopListening,
    /// Reports an error to the client.
    Error { message: String },
}
