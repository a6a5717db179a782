//! Speech engines that live in the browser on the other end of the socket.
//!
//! Each `speak` or `recognize` call becomes a `speak`/`listen` message with a
//! fresh id and parks on a oneshot until the browser reports back with the
//! same id.

use super::protocol::ServerMessage;
use async_trait::async_trait;
use drill_core::speech::{
    RecognitionOptions, SpeechRecognizer, SpeechSynthesizer, Utterance, VoiceError, VoiceInfo,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type SpeechReply = oneshot::Sender<Result<(), VoiceError>>;
type RecognitionReply = oneshot::Sender<Result<Option<String>, VoiceError>>;

pub struct BrowserSpeech {
    outbound: mpsc::Sender<ServerMessage>,
    next_id: AtomicU64,
    pending_speech: Mutex<HashMap<u64, SpeechReply>>,
    pending_recognition: Mutex<HashMap<u64, RecognitionReply>>,
    voices: Vec<VoiceInfo>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BrowserSpeech {
    pub fn new(outbound: mpsc::Sender<ServerMessage>, voices: Vec<VoiceInfo>) -> Self {
        Self {
            outbound,
            next_id: AtomicU64::new(1),
            pending_speech: Mutex::new(HashMap::new()),
            pending_recognition: Mutex::new(HashMap::new()),
            voices,
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Settles the `speak` request with this id. Unknown ids are ignored.
    pub fn resolve_speech(&self, id: u64, result: Result<(), VoiceError>) {
        match lock(&self.pending_speech).remove(&id) {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => debug!(id, "Ignoring speech result for unknown request"),
        }
    }

    /// Settles the `listen` request with this id. Unknown ids are ignored.
    pub fn resolve_recognition(&self, id: u64, result: Result<Option<String>, VoiceError>) {
        match lock(&self.pending_recognition).remove(&id) {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => debug!(id, "Ignoring recognition result for unknown request"),
        }
    }

    pub fn pending_requests(&self) -> usize {
        lock(&self.pending_speech).len() + lock(&self.pending_recognition).len()
    }
}

#[async_trait]
impl SpeechSynthesizer for BrowserSpeech {
    async fn speak(&self, utterance: &Utterance) -> Result<(), VoiceError> {
        let id = self.allocate_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.pending_speech).insert(id, reply_tx);

        let message = ServerMessage::Speak {
            id,
            utterance: utterance.clone(),
        };
        if self.outbound.send(message).await.is_err() {
            lock(&self.pending_speech).remove(&id);
            return Err(VoiceError::SynthesisFailure(
                "client disconnected".to_string(),
            ));
        }

        reply_rx.await.unwrap_or(Err(VoiceError::Cancelled))
    }

    fn cancel(&self) {
        for (_, reply) in lock(&self.pending_speech).drain() {
            let _ = reply.send(Err(VoiceError::Cancelled));
        }
        if let Err(e) = self.outbound.try_send(ServerMessage::CancelSpeech) {
            warn!(error = %e, "Could not forward speech cancellation");
        }
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }
}

#[async_trait]
impl SpeechRecognizer for BrowserSpeech {
    async fn recognize(&self, options: &RecognitionOptions) -> Result<Option<String>, VoiceError> {
        let id = self.allocate_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.pending_recognition).insert(id, reply_tx);

        let message = ServerMessage::Listen {
            id,
            options: options.clone(),
        };
        if self.outbound.send(message).await.is_err() {
            lock(&self.pending_recognition).remove(&id);
            return Err(VoiceError::RecognitionFailure(
                "client disconnected".to_string(),
            ));
        }

        reply_rx.await.unwrap_or(Err(VoiceError::Cancelled))
    }

    fn abort(&self) {
        for (_, reply) in lock(&self.pending_recognition).drain() {
            let _ = reply.send(Err(VoiceError::Cancelled));
        }
        if let Err(e) = self.outbound.try_send(ServerMessage::StopListening) {
            warn!(error = %e, "Could not forward recognition abort");
        }
    }
}
