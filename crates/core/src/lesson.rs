//! Lesson Controller
//!
//! Drives one lesson from greeting to completion: ask a question, listen,
//! grade, report, and after each pass replay the tier, promote to the next
//! one or finish. Every step awaits the previous one, so speaking and
//! listening never overlap.
//!
//! The controller publishes a [`LessonView`] snapshot after each change for
//! whatever renders the lesson, and can be stopped from another task.

use crate::language::LanguagePack;
use crate::phrasing::{
    format_errors_for_speech, format_question_for_speech, format_solution_for_speech, render,
};
use crate::session::{NextStep, Question, Session, SessionError, Tier};
use crate::speech::VoiceError;
use crate::voice::VoiceService;
use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

/// Fixed pauses between lesson steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// After an answer could not be understood.
    pub retry_pause: Duration,
    /// After grading an answer and after a session report.
    pub advance_pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            retry_pause: Duration::from_millis(1000),
            advance_pause: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonPhase {
    #[default]
    Idle,
    AwaitingAnswer,
    Grading,
    Retrying,
    SessionSummary,
    LessonComplete,
}

/// Everything a renderer needs to show the lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonView {
    pub status: String,
    pub phase: LessonPhase,
    pub is_active: bool,
    pub is_speaking: bool,
    pub is_listening: bool,
    pub tier: Option<Tier>,
    /// 1-based position of the current question.
    pub question_number: Option<usize>,
    pub total_questions: Option<usize>,
    pub current_question: Option<Question>,
    /// Answered questions of the current session, oldest first.
    pub history: Vec<Question>,
    pub error: Option<String>,
    pub lessons_completed: u32,
}

impl LessonView {
    fn idle(status: &str, lessons_completed: u32) -> Self {
        Self {
            status: status.to_string(),
            phase: LessonPhase::Idle,
            is_active: false,
            is_speaking: false,
            is_listening: false,
            tier: None,
            question_number: None,
            total_questions: None,
            current_question: None,
            history: Vec::new(),
            error: None,
            lessons_completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LessonError {
    #[error(transparent)]
    Voice(#[from] VoiceError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("lesson stopped")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LessonOutcome {
    /// The last tier was passed without mistakes.
    Completed,
    /// `stop` was called while the lesson ran.
    Stopped,
    /// Synthesis or recognition is missing.
    Unsupported,
    /// Another `run` on this controller has not returned yet.
    AlreadyRunning,
    /// A lesson step failed; the status line explains why.
    Aborted(LessonError),
}

/// Claim on one lesson, handed out by [`LessonController::begin`].
///
/// A ticket goes stale as soon as `stop` is called, even if the run it
/// belongs to has not been polled yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonTicket {
    generation: u64,
}

#[derive(Debug, Default)]
struct RunSlot {
    /// Generation of the run that currently owns the controller.
    active: Option<u64>,
    issued: u64,
}

pub struct LessonController {
    voice: VoiceService,
    pack: &'static LanguagePack,
    pacing: Pacing,
    view_tx: watch::Sender<LessonView>,
    run_slot: Mutex<RunSlot>,
    stop_signal: Notify,
    lessons_completed: AtomicU32,
}

impl LessonController {
    pub fn new(voice: VoiceService, pacing: Pacing) -> Self {
        let pack = voice.pack();
        let status = if voice.is_supported() {
            pack.phrases.status_idle
        } else {
            pack.phrases.status_unsupported
        };
        let (view_tx, _) = watch::channel(LessonView::idle(status, 0));
        Self {
            voice,
            pack,
            pacing,
            view_tx,
            run_slot: Mutex::new(RunSlot::default()),
            stop_signal: Notify::new(),
            lessons_completed: AtomicU32::new(0),
        }
    }

    pub fn voice(&self) -> &VoiceService {
        &self.voice
    }

    pub fn subscribe(&self) -> watch::Receiver<LessonView> {
        self.view_tx.subscribe()
    }

    pub fn view(&self) -> LessonView {
        self.view_tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.slot().active.is_some()
    }

    /// Claims the controller for a new lesson without starting it.
    ///
    /// Lets a caller accept a start command synchronously and drive the
    /// lesson elsewhere with [`run_with`](Self::run_with); a `stop` issued in
    /// between is not lost.
    pub fn begin(&self) -> Result<LessonTicket, LessonOutcome> {
        if !self.voice.is_supported() {
            warn!("Speech capabilities unavailable; lesson not started");
            let status = self.pack.phrases.status_unsupported;
            self.view_tx.send_modify(|view| view.status = status.to_string());
            return Err(LessonOutcome::Unsupported);
        }
        let mut slot = self.slot();
        if slot.active.is_some() {
            warn!("Lesson already running; ignoring start");
            return Err(LessonOutcome::AlreadyRunning);
        }
        slot.issued += 1;
        slot.active = Some(slot.issued);
        Ok(LessonTicket {
            generation: slot.issued,
        })
    }

    /// Runs a lesson to its end.
    ///
    /// Failures never escape: they are written to the status line and
    /// reported through the returned outcome.
    pub async fn run(&self) -> LessonOutcome {
        match self.begin() {
            Ok(ticket) => self.run_with(ticket).await,
            Err(outcome) => outcome,
        }
    }

    /// Runs the lesson claimed by `ticket`.
    pub async fn run_with(&self, ticket: LessonTicket) -> LessonOutcome {
        let run = LessonRun {
            controller: self,
            generation: ticket.generation,
        };
        if run.is_stopped() {
            info!("Lesson stopped before it began");
            return LessonOutcome::Stopped;
        }
        info!(language = self.pack.code, "Lesson started");

        let outcome = match run.drive().await {
            Ok(outcome) => outcome,
            Err(_) if run.is_stopped() => LessonOutcome::Stopped,
            Err(e) => {
                error!(error = %e, "Lesson step failed");
                let message = e.to_string();
                let status = render(
                    self.pack.phrases.status_question_error,
                    &[("error", message.as_str())],
                );
                run.publish(|view| view.status = status);
                LessonOutcome::Aborted(e)
            }
        };

        run.release();
        info!(?outcome, "Lesson ended");
        outcome
    }

    /// Halts speech, resets the view to idle and makes `run` return `Stopped`.
    ///
    /// Idempotent. The controller can be started again right away; a run
    /// still winding down publishes nothing and says nothing more.
    pub fn stop(&self) {
        self.slot().active = None;
        self.stop_signal.notify_waiters();
        self.voice.stop();
        let status = self.pack.phrases.status_stopped;
        let lessons_completed = self.lessons_completed.load(Ordering::SeqCst);
        self.view_tx
            .send_modify(|view| *view = LessonView::idle(status, lessons_completed));
        info!("Lesson stopped");
    }

    fn slot(&self) -> MutexGuard<'_, RunSlot> {
        self.run_slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One run of the lesson loop, bound to the generation it was started with.
struct LessonRun<'a> {
    controller: &'a LessonController,
    generation: u64,
}

impl Deref for LessonRun<'_> {
    type Target = LessonController;

    fn deref(&self) -> &LessonController {
        self.controller
    }
}

impl LessonRun<'_> {
    async fn drive(&self) -> Result<LessonOutcome, LessonError> {
        let phrases = &self.pack.phrases;
        let lessons_completed = self.lessons_completed.load(Ordering::SeqCst);
        self.publish(|view| {
            *view = LessonView::idle(phrases.status_starting, lessons_completed);
            view.is_active = true;
        });

        let mut session = Session::new(Tier::One);
        self.show_session(&session);

        match self.say(phrases.greeting).await {
            Err(LessonError::Voice(e)) if !self.is_stopped() => {
                error!(error = %e, "Greeting failed");
                let message = e.to_string();
                let status = render(phrases.status_error, &[("error", message.as_str())]);
                self.publish(|view| {
                    view.status = status;
                    view.is_active = false;
                });
                return Ok(LessonOutcome::Aborted(e.into()));
            }
            other => other?,
        }

        loop {
            let Some(question) = session.next_question().cloned() else {
                match self.conclude(&session).await? {
                    NextStep::Finish => return Ok(LessonOutcome::Completed),
                    NextStep::Replay(tier) | NextStep::Promote(tier) => {
                        info!(%tier, "Starting session");
                        session = Session::new(tier);
                        self.show_session(&session);
                        continue;
                    }
                }
            };

            match self.ask(&question).await? {
                Some(answer) => {
                    session = session.process_answer(answer)?;
                    self.report_grade(&session).await?;
                }
                None => self.retry(&question).await?,
            }
        }
    }

    /// Reads the question aloud and listens for an answer.
    async fn ask(&self, question: &Question) -> Result<Option<i64>, LessonError> {
        self.publish(|view| {
            view.phase = LessonPhase::AwaitingAnswer;
            view.current_question = Some(question.clone());
        });
        self.say(&format_question_for_speech(self.pack, question))
            .await?;

        let status = render(
            self.pack.phrases.status_question,
            &[("expression", question.expression.as_str())],
        );
        self.publish(|view| view.status = status);

        let transcript = self.hear().await?;
        let answer = self.voice.parse_spoken_number(&transcript);
        debug!(question = %question.id, %transcript, ?answer, "Answer heard");
        Ok(answer)
    }

    async fn retry(&self, question: &Question) -> Result<(), LessonError> {
        warn!(question = %question.id, "Answer not recognized; asking again");
        let phrases = &self.pack.phrases;
        self.publish(|view| {
            view.phase = LessonPhase::Retrying;
            view.status = phrases.status_unrecognized.to_string();
        });
        self.say(phrases.retry).await?;
        self.pause(self.pacing.retry_pause).await
    }

    async fn report_grade(&self, session: &Session) -> Result<(), LessonError> {
        let Some(graded) = session.last_answered() else {
            return Ok(());
        };
        self.show_session(session);
        self.publish(|view| view.phase = LessonPhase::Grading);

        let phrases = &self.pack.phrases;
        let answer = graded.correct_answer.to_string();
        let values = [
            ("expression", graded.expression.as_str()),
            ("answer", answer.as_str()),
        ];
        if graded.is_correct == Some(true) {
            debug!(question = %graded.id, "Correct answer");
            self.say(phrases.correct).await?;
            let status = render(phrases.status_correct, &values);
            self.publish(|view| view.status = status);
        } else {
            debug!(question = %graded.id, given = ?graded.user_answer, "Incorrect answer");
            let solution = format_solution_for_speech(self.pack, graded);
            self.say(&render(phrases.incorrect, &[("solution", solution.as_str())]))
                .await?;
            let status = render(phrases.status_incorrect, &values);
            self.publish(|view| view.status = status);
        }

        self.pause(self.pacing.advance_pause).await
    }

    /// Reports a finished pass and carries out what follows it.
    async fn conclude(&self, session: &Session) -> Result<NextStep, LessonError> {
        let phrases = &self.pack.phrases;
        let summary = session.summary();
        info!(
            tier = %summary.tier,
            total = summary.total_questions,
            incorrect = summary.incorrect_count,
            "Session complete"
        );
        self.publish(|view| {
            view.phase = LessonPhase::SessionSummary;
            view.current_question = None;
        });

        let total = summary.total_questions.to_string();
        let incorrect = summary.incorrect_count.to_string();
        let report = render(
            phrases.summary,
            &[("total", total.as_str()), ("incorrect", incorrect.as_str())],
        );
        self.say(&report).await?;
        self.publish(|view| view.status = report);

        let step = summary.next_step();
        match step {
            NextStep::Replay(_) => {
                self.say(&format_errors_for_speech(self.pack, &summary.errors))
                    .await?;
                self.say(phrases.replay).await?;
                self.pause(self.pacing.advance_pause).await?;
            }
            NextStep::Promote(_) => {
                self.say(phrases.next_level).await?;
                self.pause(self.pacing.advance_pause).await?;
            }
            NextStep::Finish => {
                self.say(phrases.finished).await?;
                let completed = self.lessons_completed.fetch_add(1, Ordering::SeqCst) + 1;
                self.publish(|view| {
                    view.status = phrases.status_finished.to_string();
                    view.phase = LessonPhase::LessonComplete;
                    view.is_active = false;
                    view.lessons_completed = completed;
                });
            }
        }
        Ok(step)
    }

    async fn say(&self, text: &str) -> Result<(), LessonError> {
        self.ensure_running()?;
        self.publish(|view| {
            view.is_speaking = true;
            view.error = None;
        });
        let result = self.voice.speak(text).await;
        let last_error = self.voice.last_error();
        self.publish(|view| {
            view.is_speaking = false;
            view.error = last_error;
        });
        result?;
        self.ensure_running()
    }

    async fn hear(&self) -> Result<String, LessonError> {
        self.ensure_running()?;
        self.publish(|view| {
            view.is_listening = true;
            view.error = None;
        });
        let result = self.voice.listen().await;
        let last_error = self.voice.last_error();
        self.publish(|view| {
            view.is_listening = false;
            view.error = last_error;
        });
        let transcript = result?;
        self.ensure_running()?;
        Ok(transcript)
    }

    /// Waits out `duration`, or less if the lesson is stopped meanwhile.
    async fn pause(&self, duration: Duration) -> Result<(), LessonError> {
        let stopped = self.stop_signal.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();
        self.ensure_running()?;

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = &mut stopped => debug!("Pause cut short by stop"),
        }
        self.ensure_running()
    }

    fn show_session(&self, session: &Session) {
        let total = session.questions().len();
        let number = (session.current_question_index() + 1).min(total);
        let history = session.answered().to_vec();
        self.publish(|view| {
            view.tier = Some(session.tier());
            view.question_number = Some(number);
            view.total_questions = Some(total);
            view.history = history;
        });
    }

    /// Applies `update` unless this run has been stopped.
    fn publish(&self, update: impl FnOnce(&mut LessonView)) {
        self.view_tx.send_if_modified(|view| {
            if self.is_stopped() {
                return false;
            }
            update(view);
            true
        });
    }

    fn is_stopped(&self) -> bool {
        self.slot().active != Some(self.generation)
    }

    fn ensure_running(&self) -> Result<(), LessonError> {
        if self.is_stopped() {
            Err(LessonError::Stopped)
        } else {
            Ok(())
        }
    }

    /// Frees the controller unless a `stop` already did.
    fn release(&self) {
        let mut slot = self.slot();
        if slot.active == Some(self.generation) {
            slot.active = None;
        }
    }
}
