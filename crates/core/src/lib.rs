//! Drill Core
//!
//! Engine for a spoken arithmetic drill: the number-word lexicon, per-language
//! phrase packs, the tiered question bank and session state machine, the
//! speech capability adapter and the lesson controller that drives them.

pub mod language;
pub mod lesson;
pub mod lexicon;
pub mod phrasing;
pub mod session;
pub mod speech;
pub mod voice;

pub use language::LanguagePack;
pub use lesson::{
    LessonController, LessonOutcome, LessonPhase, LessonTicket, LessonView, Pacing,
};
pub use session::{NextStep, Question, Session, SessionSummary, Tier};
pub use speech::{SpeechRecognizer, SpeechSynthesizer, VoiceError};
pub use voice::{VoiceConfig, VoiceConfigUpdate, VoiceService};
