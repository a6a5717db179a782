//! Manages the WebSocket connection lifecycle for one lesson.

use super::{
    bridge::BrowserSpeech,
    protocol::{ClientMessage, ServerMessage},
};
use crate::state::AppState;
use anyhow::{Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use drill_core::speech::{SpeechRecognizer, SpeechSynthesizer, VoiceError, VoiceInfo};
use drill_core::{LessonController, LessonView, VoiceService};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{Instrument, error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// What the browser reported in its `hello`.
#[derive(Debug, PartialEq)]
struct Capabilities {
    synthesis: bool,
    recognition: bool,
    voices: Vec<VoiceInfo>,
}

/// Main handler for an individual WebSocket connection.
///
/// Waits for the `hello` handshake, wires the browser's speech engines into a
/// lesson controller and then serves client commands until the socket closes.
#[instrument(name = "ws_session", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", connection_id);
    info!("New WebSocket connection. Awaiting hello...");

    let (mut socket_tx, mut socket_rx) = socket.split();

    // The first message from the client must be a `hello` message.
    let capabilities = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_hello(&text),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `hello` message.")),
        _ => {
            info!("Client disconnected before sending hello.");
            return;
        }
    };
    let capabilities = match capabilities {
        Ok(capabilities) => capabilities,
        Err(e) => {
            error!("Handshake failed: {:?}", e);
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };
    info!(
        synthesis = capabilities.synthesis,
        recognition = capabilities.recognition,
        voices = capabilities.voices.len(),
        "Client capabilities received"
    );

    let (outbound_tx, outbound_rx) = mpsc::channel::<ServerMessage>(32);
    let writer_handle = tokio::spawn(forward_outbound(socket_tx, outbound_rx).in_current_span());

    let bridge = Arc::new(BrowserSpeech::new(
        outbound_tx.clone(),
        capabilities.voices,
    ));
    let synthesizer = capabilities
        .synthesis
        .then(|| bridge.clone() as Arc<dyn SpeechSynthesizer>);
    let recognizer = capabilities
        .recognition
        .then(|| bridge.clone() as Arc<dyn SpeechRecognizer>);
    let voice = VoiceService::new(
        synthesizer,
        recognizer,
        state.config.language,
        state.config.voice_config(),
    );
    let controller = Arc::new(LessonController::new(voice, state.config.pacing()));
    let views_handle =
        tokio::spawn(forward_views(controller.subscribe(), outbound_tx.clone()).in_current_span());

    let greeting = [
        ServerMessage::Ready {
            language: state.config.language.code.to_string(),
        },
        ServerMessage::View {
            view: controller.view(),
        },
    ];
    for msg in greeting {
        if outbound_tx.send(msg).await.is_err() {
            error!("Failed to queue greeting for client.");
            writer_handle.abort();
            views_handle.abort();
            return;
        }
    }

    let mut lesson_handle: Option<JoinHandle<()>> = None;
    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(msg, &controller, &bridge, &mut lesson_handle),
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed client message.");
                    let _ = outbound_tx
                        .send(ServerMessage::Error {
                            message: format!("Malformed message: {}", e),
                        })
                        .await;
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Shutting down session.");
                break;
            }
            Ok(Message::Binary(_)) => warn!("Ignoring unexpected binary message."),
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        }
    }

    // Clean up background tasks on exit.
    controller.stop();
    if let Some(handle) = lesson_handle.take() {
        handle.abort();
    }
    views_handle.abort();
    writer_handle.abort();
    info!("WebSocket connection closed and lesson terminated.");
}

/// Parses the first client message, which must be `hello`.
fn parse_hello(text: &str) -> Result<Capabilities> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Hello {
            synthesis,
            recognition,
            voices,
        } => Ok(Capabilities {
            synthesis,
            recognition,
            voices,
        }),
        _ => Err(anyhow!("First message must be `hello`")),
    }
}

/// Applies one post-handshake client message.
fn handle_client_message(
    msg: ClientMessage,
    controller: &Arc<LessonController>,
    bridge: &BrowserSpeech,
    lesson_handle: &mut Option<JoinHandle<()>>,
) {
    match msg {
        ClientMessage::Start => {
            // Claimed here so a Stop queued right behind this Start applies to it.
            let ticket = match controller.begin() {
                Ok(ticket) => ticket,
                Err(outcome) => {
                    warn!(?outcome, "Ignoring start.");
                    return;
                }
            };
            let controller = controller.clone();
            *lesson_handle = Some(tokio::spawn(
                async move {
                    let outcome = controller.run_with(ticket).await;
                    info!(?outcome, "Lesson task finished.");
                }
                .in_current_span(),
            ));
        }
        ClientMessage::Stop => controller.stop(),
        ClientMessage::SpeechEnded { id } => bridge.resolve_speech(id, Ok(())),
        ClientMessage::SpeechFailed { id, error } => {
            bridge.resolve_speech(id, Err(VoiceError::SynthesisFailure(error)))
        }
        ClientMessage::Recognized { id, transcript } => {
            bridge.resolve_recognition(id, Ok(Some(transcript)))
        }
        ClientMessage::RecognitionEnded { id } => bridge.resolve_recognition(id, Ok(None)),
        ClientMessage::RecognitionFailed { id, error } => {
            bridge.resolve_recognition(id, Err(VoiceError::RecognitionFailure(error)))
        }
        ClientMessage::Hello { .. } => warn!("Ignoring repeated hello."),
    }
}

/// Pushes every lesson view change to the client.
async fn forward_views(
    mut views: watch::Receiver<LessonView>,
    outbound: mpsc::Sender<ServerMessage>,
) {
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        if outbound.send(ServerMessage::View { view }).await.is_err() {
            break;
        }
    }
}

/// Sole writer of the socket sink; everything else queues through `outbound`.
async fn forward_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, msg).await {
            error!("Failed to send message to client: {:?}", e);
            break;
        }
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::Pacing;
    use drill_core::language::RUSSIAN;
    use drill_core::voice::VoiceConfig;

    fn controller_with(bridge: &Arc<BrowserSpeech>) -> Arc<LessonController> {
        let voice = VoiceService::new(
            Some(bridge.clone() as Arc<dyn SpeechSynthesizer>),
            Some(bridge.clone() as Arc<dyn SpeechRecognizer>),
            &RUSSIAN,
            VoiceConfig::for_language(&RUSSIAN),
        );
        Arc::new(LessonController::new(voice, Pacing::default()))
    }

    #[test]
    fn hello_is_required_first() {
        let capabilities =
            parse_hello(r#"{"type":"hello","synthesis":true,"recognition":true}"#).unwrap();
        assert_eq!(
            capabilities,
            Capabilities {
                synthesis: true,
                recognition: true,
                voices: vec![],
            }
        );

        let err = parse_hello(r#"{"type":"start"}"#).unwrap_err();
        assert_eq!(err.to_string(), "First message must be `hello`");
        assert!(parse_hello("not json").is_err());
    }

    #[tokio::test]
    async fn client_results_settle_bridge_requests() {
        let (tx, mut outbound) = mpsc::channel(8);
        let bridge = Arc::new(BrowserSpeech::new(tx, vec![]));
        let controller = controller_with(&bridge);
        let mut lesson_handle = None;

        let task = tokio::spawn({
            let bridge = bridge.clone();
            async move {
                bridge
                    .recognize(&drill_core::speech::RecognitionOptions::single_shot("ru-RU"))
                    .await
            }
        });
        let Some(ServerMessage::Listen { id, .. }) = outbound.recv().await else {
            panic!("expected a listen request");
        };

        handle_client_message(
            ClientMessage::Recognized {
                id,
                transcript: "три".into(),
            },
            &controller,
            &bridge,
            &mut lesson_handle,
        );

        assert_eq!(task.await.unwrap(), Ok(Some("три".into())));
        assert!(lesson_handle.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_lesson_and_stop_ends_it() {
        let (tx, mut outbound) = mpsc::channel(32);
        let bridge = Arc::new(BrowserSpeech::new(tx, vec![]));
        let controller = controller_with(&bridge);
        let mut lesson_handle = None;

        handle_client_message(ClientMessage::Start, &controller, &bridge, &mut lesson_handle);

        // The greeting goes out as a speak request once the lesson is running.
        loop {
            match outbound.recv().await {
                Some(ServerMessage::Speak { utterance, .. }) => {
                    assert_eq!(utterance.text, RUSSIAN.phrases.greeting);
                    break;
                }
                Some(_) => continue,
                None => panic!("outbound closed"),
            }
        }
        assert!(controller.is_running());

        // A second start while running is ignored.
        handle_client_message(ClientMessage::Start, &controller, &bridge, &mut lesson_handle);
        assert!(lesson_handle.is_some());
        assert_eq!(bridge.pending_requests(), 1);

        handle_client_message(ClientMessage::Stop, &controller, &bridge, &mut lesson_handle);
        lesson_handle.take().unwrap().await.unwrap();

        assert!(!controller.is_running());
        let view = controller.view();
        assert!(!view.is_active);
        assert_eq!(view.status, RUSSIAN.phrases.status_stopped);
    }

    #[tokio::test]
    async fn views_are_forwarded_on_change() {
        let (view_tx, view_rx) = watch::channel(controller_view());
        let (tx, mut outbound) = mpsc::channel(4);
        let forwarder = tokio::spawn(forward_views(view_rx, tx));

        view_tx.send_modify(|view| view.status = "Вопрос: 2 + 1 = ?".to_string());

        let Some(ServerMessage::View { view }) = outbound.recv().await else {
            panic!("expected a view");
        };
        assert_eq!(view.status, "Вопрос: 2 + 1 = ?");

        drop(view_tx);
        forwarder.await.unwrap();
    }

    fn controller_view() -> LessonView {
        let (tx, _rx) = mpsc::channel(1);
        controller_with(&Arc::new(BrowserSpeech::new(tx, vec![]))).view()
    }
    #[tokio::test(start_paused = true)]
    async fn stop_right_after_start_keeps_the_lesson_idle() {
        let (tx, mut outbound) = mpsc::channel(32);
        let bridge = Arc::new(BrowserSpeech::new(tx, vec![]));
        let controller = controller_with(&bridge);
        let mut lesson_handle = None;

        handle_client_message(ClientMessage::Start, &controller, &bridge, &mut lesson_handle);
        handle_client_message(ClientMessage::Stop, &controller, &bridge, &mut lesson_handle);
        lesson_handle.take().unwrap().await.unwrap();

        assert!(!controller.is_running());
        let view = controller.view();
        assert!(!view.is_active);
        assert_eq!(view.status, RUSSIAN.phrases.status_stopped);

        while let Ok(msg) = outbound.try_recv() {
            assert!(
                !matches!(msg, ServerMessage::Speak { .. } | ServerMessage::Listen { .. }),
                "lesson spoke after stop: {:?}",
                msg
            );
        }
        assert_eq!(bridge.pending_requests(), 0);

        // The next start begins a fresh lesson.
        handle_client_message(ClientMessage::Start, &controller, &bridge, &mut lesson_handle);
        assert!(controller.is_running());
    }
}
