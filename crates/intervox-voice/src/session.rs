//! Turn-taking session controller.
//!
//! One interview is one explicit state machine with a single owner. Every
//! user intent and capability result is consumed by a method on
//! `InterviewSession`, one at a time; there are no independently-reacting
//! observers over shared flags. Whether the answer control is enabled is
//! derived from the phase, never stored.

use crate::capabilities::Capabilities;
use crate::capture::AnswerCapture;
use crate::config::SessionConfig;
use crate::error::{InterviewError, InterviewResult};
use crate::playback::{PlaybackController, SpeechSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Where the session is in its lifecycle. The listen → transcribe → reply
/// → speak loop runs between `AwaitingAnswer` and `AiSpeaking` until an
/// end marker is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    /// Control enabled; waiting for the candidate to start an answer.
    AwaitingAnswer,
    /// Recording the candidate's answer.
    Listening,
    Transcribing,
    AwaitingAiReply,
    AiSpeaking,
    Ended,
    Failed,
}

impl Phase {
    /// The candidate may start an answer only from `AwaitingAnswer` and
    /// end one only from `Listening`; everywhere else the control is
    /// inert.
    pub fn allows_answer_control(self) -> bool {
        matches!(self, Phase::AwaitingAnswer | Phase::Listening)
    }
}

/// One prompt/answer exchange, recorded in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// The question (or greeting) the candidate was answering.
    pub prompt: String,
    /// The transcribed answer.
    pub answer: String,
    /// When the answer finished transcribing.
    pub answered_at: DateTime<Utc>,
}

/// Events emitted as the session progresses. The shell renders from
/// these; it never mutates session state except through `toggle_answer`.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhaseChanged { phase: Phase },
    /// A new prompt is about to be spoken.
    PromptReady { text: String },
    /// A transcribed answer was appended to the transcript.
    AnswerRecorded { answer: String },
    /// Synthesis or playback failed; the turn proceeded as if the speech
    /// had already ended.
    SpeechSkipped { reason: String },
    ErrorReported { message: String },
    InterviewEnded { at: DateTime<Utc> },
    TranscriptSubmitted { at: DateTime<Utc> },
}

/// The turn-taking session controller. Owns its capability handles, its
/// capture source and its playback controller; constructed per interview
/// and never shared between interviews.
pub struct InterviewSession<S: SpeechSink> {
    capabilities: Capabilities,
    capture: Box<dyn AnswerCapture>,
    playback: PlaybackController<S>,
    config: SessionConfig,

    phase: Phase,
    session_id: Option<String>,
    current_prompt: String,
    transcript: Vec<TurnRecord>,
    last_error: Option<InterviewError>,
    submitted: bool,

    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<S: SpeechSink> InterviewSession<S> {
    pub fn new(
        capabilities: Capabilities,
        capture: Box<dyn AnswerCapture>,
        sink: S,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let session = Self {
            capabilities,
            capture,
            playback: PlaybackController::new(sink),
            config,
            phase: Phase::Uninitialized,
            session_id: None,
            current_prompt: String::new(),
            transcript: Vec::new(),
            last_error: None,
            submitted: false,
            events,
        };
        (session, event_rx)
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Derived from the phase on every call; never stored.
    pub fn is_answer_control_enabled(&self) -> bool {
        self.phase.allows_answer_control()
    }

    pub fn current_prompt(&self) -> &str {
        &self.current_prompt
    }

    pub fn transcript(&self) -> &[TurnRecord] {
        &self.transcript
    }

    pub fn last_error(&self) -> Option<&InterviewError> {
        self.last_error.as_ref()
    }

    /// Whether the final transcript delivery succeeded.
    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// "AI is speaking" indicator for the shell.
    pub fn speaking_watch(&self) -> watch::Receiver<bool> {
        self.playback.speaking_watch()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Start the interview: create the assistant session, fetch and speak
    /// the greeting, then enable the answer control.
    ///
    /// Idempotent: a call in any phase other than `Uninitialized` is a
    /// logged no-op, so a double-mounted shell cannot create two
    /// assistant sessions. After `shutdown` (explicit reset) a fresh call
    /// is honored again.
    pub async fn initialize(&mut self) -> InterviewResult<()> {
        if self.phase != Phase::Uninitialized {
            debug!(phase = ?self.phase, "initialize ignored: session already started");
            return Ok(());
        }
        self.current_prompt.clear();
        self.transcript.clear();
        self.submitted = false;
        self.advance(Phase::Initializing);
        info!("Initializing interview session");

        let session_id = match self.capabilities.assistant.create_session().await {
            Ok(id) => id,
            Err(e) => return Err(self.fail(Phase::Failed, e)),
        };
        debug!(%session_id, "Assistant session created");
        self.session_id = Some(session_id.clone());

        let opening = self.config.opening_utterance.clone();
        let greeting = match self.ask_with_retry(&session_id, &opening).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => return Err(self.fail(Phase::Failed, e)),
        };
        if greeting.is_empty() {
            let err = InterviewError::Assistant("Greeting was empty".to_string());
            return Err(self.fail(Phase::Failed, err));
        }

        self.current_prompt = greeting.clone();
        self.emit(SessionEvent::PromptReady { text: greeting });
        self.advance(Phase::AiSpeaking);
        self.speak_current_prompt().await;
        self.advance(Phase::AwaitingAnswer);
        info!("Interview ready");
        Ok(())
    }

    /// The single control surface. From `AwaitingAnswer` starts
    /// recording; from `Listening` finishes the answer and runs the
    /// transcribe → reply → speak turn. In any other phase the toggle is
    /// a logged no-op, so a stale button press can never start an
    /// overlapping operation.
    pub async fn toggle_answer(&mut self) -> InterviewResult<()> {
        match self.phase {
            Phase::AwaitingAnswer => self.begin_answer(),
            Phase::Listening => self.finish_answer().await,
            phase => {
                debug!(?phase, "toggle ignored: control is not active");
                Ok(())
            }
        }
    }

    /// From a recoverable mid-interview failure, return to
    /// `AwaitingAnswer` so the candidate can retry the current prompt.
    pub fn retry(&mut self) -> InterviewResult<()> {
        if self.phase != Phase::Failed {
            return Err(InterviewError::InvalidPhase(format!(
                "retry requires a failed session (phase: {:?})",
                self.phase
            )));
        }
        if self.session_id.is_none() || self.current_prompt.is_empty() {
            // Initialization never completed; only a reset helps.
            return Err(InterviewError::InvalidPhase(
                "session never reached a stable state; shut down and initialize again".to_string(),
            ));
        }
        self.advance(Phase::AwaitingAnswer);
        info!("Retrying current prompt after failure");
        Ok(())
    }

    /// Retry the final transcript delivery. Valid only once the
    /// interview has ended with an undelivered transcript.
    pub async fn resubmit(&mut self) -> InterviewResult<()> {
        if self.phase != Phase::Ended {
            return Err(InterviewError::InvalidPhase(format!(
                "resubmit requires an ended interview (phase: {:?})",
                self.phase
            )));
        }
        if self.submitted {
            debug!("resubmit ignored: transcript already delivered");
            return Ok(());
        }
        match self
            .capabilities
            .submission
            .submit(&self.config.candidate_phone, &self.transcript)
            .await
        {
            Ok(()) => {
                self.submitted = true;
                self.last_error = None;
                self.emit(SessionEvent::TranscriptSubmitted { at: Utc::now() });
                info!("Transcript submitted on manual retry");
                Ok(())
            }
            Err(e) => {
                self.last_error = Some(e.clone());
                self.emit(SessionEvent::ErrorReported {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Tear the session down: stop playback, abort capture, release the
    /// assistant handle. The transcript stays readable. `initialize` is
    /// legal again afterward.
    pub fn shutdown(&mut self) {
        self.playback.stop();
        self.capture.abort();
        self.session_id = None;
        self.settle(Phase::Uninitialized);
        info!("Session shut down");
    }

    // ------------------------------------------------------------------
    // Turn internals
    // ------------------------------------------------------------------

    fn begin_answer(&mut self) -> InterviewResult<()> {
        if let Err(e) = self.capture.start() {
            return Err(self.fail(Phase::AwaitingAnswer, e));
        }
        self.advance(Phase::Listening);
        info!("Listening for answer");
        Ok(())
    }

    async fn finish_answer(&mut self) -> InterviewResult<()> {
        self.advance(Phase::Transcribing);

        let clip = match self.capture.finish() {
            Ok(clip) => clip,
            Err(e) => return Err(self.fail(Phase::AwaitingAnswer, e)),
        };
        let text = match self.capabilities.transcription.transcribe(&clip).await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(Phase::AwaitingAnswer, e)),
        };
        let answer = text.trim().to_string();
        if answer.is_empty() {
            return Err(self.fail(Phase::AwaitingAnswer, InterviewError::EmptyTranscription));
        }

        // Recorded before the assistant round trip: a network failure
        // must not drop an answer the candidate already gave.
        self.transcript.push(TurnRecord {
            prompt: self.current_prompt.clone(),
            answer: answer.clone(),
            answered_at: Utc::now(),
        });
        self.emit(SessionEvent::AnswerRecorded {
            answer: answer.clone(),
        });
        self.advance(Phase::AwaitingAiReply);

        let session_id = match self.session_id.clone() {
            Some(id) => id,
            None => {
                let err = InterviewError::Assistant("Session handle missing".to_string());
                return Err(self.fail(Phase::Failed, err));
            }
        };
        let reply = match self.ask_with_retry(&session_id, &answer).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => return Err(self.fail(Phase::Failed, e)),
        };
        if reply.is_empty() {
            let err = InterviewError::Assistant("Reply was empty".to_string());
            return Err(self.fail(Phase::Failed, err));
        }

        let is_end = self.config.end_markers.matches(&reply);
        self.current_prompt = reply.clone();
        self.emit(SessionEvent::PromptReady { text: reply });
        self.advance(Phase::AiSpeaking);
        self.speak_current_prompt().await;

        if is_end {
            info!("End of interview detected");
            self.deliver_transcript().await;
            self.settle(Phase::Ended);
            self.emit(SessionEvent::InterviewEnded { at: Utc::now() });
        } else {
            self.advance(Phase::AwaitingAnswer);
        }
        Ok(())
    }

    /// One automatic retry with backoff on assistant round trips.
    async fn ask_with_retry(
        &self,
        session_id: &str,
        utterance: &str,
    ) -> InterviewResult<String> {
        let mut attempt = 0;
        loop {
            match self
                .capabilities
                .assistant
                .submit_and_get_reply(session_id, utterance)
                .await
            {
                Ok(reply) => return Ok(reply),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Assistant request failed ({}); retry {}/{}",
                        e, attempt, self.config.max_retries
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Synthesize and play the current prompt. Synthesis and playback
    /// failures are non-fatal: the turn proceeds as if the speech had
    /// already ended, so a corrupt audio buffer can never hang the
    /// session.
    async fn speak_current_prompt(&mut self) {
        let audio = match self
            .capabilities
            .synthesis
            .synthesize(&self.current_prompt)
            .await
        {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Speech synthesis failed: {}", e);
                self.emit(SessionEvent::SpeechSkipped {
                    reason: e.to_string(),
                });
                return;
            }
        };
        if let Err(e) = self.playback.play(&audio).await {
            warn!("Playback failed, treating speech as ended: {}", e);
            self.emit(SessionEvent::SpeechSkipped {
                reason: e.to_string(),
            });
        }
    }

    /// Deliver the transcript exactly once, with one automatic retry. On
    /// persistent failure the transcript is retained and `resubmit`
    /// stays available.
    async fn deliver_transcript(&mut self) {
        let phone = self.config.candidate_phone.clone();
        let mut attempt = 0;
        loop {
            match self
                .capabilities
                .submission
                .submit(&phone, &self.transcript)
                .await
            {
                Ok(()) => {
                    self.submitted = true;
                    self.last_error = None;
                    self.emit(SessionEvent::TranscriptSubmitted { at: Utc::now() });
                    info!("Transcript submitted: {} turns", self.transcript.len());
                    return;
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Submission failed ({}); retry {}/{}",
                        e, attempt, self.config.max_retries
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => {
                    warn!("Submission failed after retry; transcript retained: {}", e);
                    self.last_error = Some(e.clone());
                    self.emit(SessionEvent::ErrorReported {
                        message: e.to_string(),
                    });
                    return;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // State plumbing
    // ------------------------------------------------------------------

    /// Forward-progress transition: clears `last_error`.
    fn advance(&mut self, phase: Phase) {
        self.last_error = None;
        self.set_phase(phase);
    }

    /// Transition that keeps `last_error` (error fallbacks, terminal
    /// states).
    fn settle(&mut self, phase: Phase) {
        self.set_phase(phase);
    }

    /// Record an error, transition, and hand the error back to the
    /// caller.
    fn fail(&mut self, phase: Phase, err: InterviewError) -> InterviewError {
        warn!("{}", err);
        self.last_error = Some(err.clone());
        self.emit(SessionEvent::ErrorReported {
            message: err.to_string(),
        });
        self.settle(phase);
        err
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "Phase transition");
            self.phase = phase;
            self.emit(SessionEvent::PhaseChanged { phase });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // A shell that dropped its receiver just stops observing; the
        // session keeps running.
        let _ = self.events.send(event);
    }
}
