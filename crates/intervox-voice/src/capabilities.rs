//! Capability interfaces consumed by the session controller.
//!
//! The four external services (transcription, conversational assistant,
//! speech synthesis, result submission) are contracts, not implementations;
//! HTTP adapters live in `intervox-services`. Placeholder implementations
//! here let the session run without network or keys.

use crate::capture::AudioClip;
use crate::error::{InterviewError, InterviewResult};
use crate::session::TurnRecord;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Speech-to-text over one recorded answer. An empty string means nothing
/// was recognized (the session treats that as a retryable condition, not
/// an error).
#[async_trait]
pub trait Transcription: Send + Sync {
    async fn transcribe(&self, clip: &AudioClip) -> InterviewResult<String>;
}

/// Threaded conversation with the AI interviewer. One session handle per
/// interview; replies are returned in submission order.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Create a fresh conversation session, returning its opaque handle.
    async fn create_session(&self) -> InterviewResult<String>;

    /// Submit one utterance and wait for the interviewer's reply.
    async fn submit_and_get_reply(
        &self,
        session_id: &str,
        utterance: &str,
    ) -> InterviewResult<String>;
}

/// Text-to-speech. Returns encoded audio bytes; an empty buffer means
/// "nothing to play" and the session skips playback for that turn.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    async fn synthesize(&self, text: &str) -> InterviewResult<Vec<u8>>;
}

/// Delivery of the finished transcript to the downstream workflow.
#[async_trait]
pub trait ResultSubmission: Send + Sync {
    async fn submit(&self, identifier: &str, transcript: &[TurnRecord]) -> InterviewResult<()>;
}

/// The full set of capability handles a session is constructed with.
/// Owned per session (constructor injection, no globals) so independent
/// sessions never share state.
pub struct Capabilities {
    pub assistant: Arc<dyn Assistant>,
    pub transcription: Arc<dyn Transcription>,
    pub synthesis: Arc<dyn SpeechSynthesis>,
    pub submission: Arc<dyn ResultSubmission>,
}

/// Placeholder transcription: returns a fixed string. Use for wiring the
/// session without a speech service.
#[derive(Debug, Default)]
pub struct PlaceholderTranscription {
    /// If set, return this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderTranscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

#[async_trait]
impl Transcription for PlaceholderTranscription {
    async fn transcribe(&self, clip: &AudioClip) -> InterviewResult<String> {
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        Ok(format!(
            "[transcription placeholder: {} samples, {:.1}s]",
            clip.samples.len(),
            clip.duration.as_secs_f32()
        ))
    }
}

/// Placeholder assistant: greets, then serves scripted replies in order,
/// closing with a reply that carries an end marker once the script runs
/// out.
pub struct PlaceholderAssistant {
    greeting: String,
    replies: Mutex<Vec<String>>,
    closing: String,
    sessions_created: AtomicUsize,
}

impl PlaceholderAssistant {
    pub fn new(
        greeting: impl Into<String>,
        replies: Vec<String>,
        closing: impl Into<String>,
    ) -> Self {
        let mut replies = replies;
        replies.reverse(); // pop from the back in submission order
        Self {
            greeting: greeting.into(),
            replies: Mutex::new(replies),
            closing: closing.into(),
            sessions_created: AtomicUsize::new(0),
        }
    }

    /// A short two-question script with the default closing line.
    pub fn scripted_demo() -> Self {
        Self::new(
            "테스트를 진행해보겠습니다. 간단히 자기소개 부탁드립니다.",
            vec!["지원 동기를 말씀해주세요.".to_string()],
            "면접이 종료되었습니다. 수고하셨습니다.",
        )
    }

    /// How many sessions this placeholder has created.
    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Assistant for PlaceholderAssistant {
    async fn create_session(&self) -> InterviewResult<String> {
        let n = self.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("placeholder-session-{n}"))
    }

    async fn submit_and_get_reply(
        &self,
        _session_id: &str,
        utterance: &str,
    ) -> InterviewResult<String> {
        // The first submission is the hidden opening utterance.
        if utterance.contains("면접을 시작") {
            return Ok(self.greeting.clone());
        }
        let next = self
            .replies
            .lock()
            .map_err(|e| InterviewError::Assistant(e.to_string()))?
            .pop();
        Ok(next.unwrap_or_else(|| self.closing.clone()))
    }
}

/// Placeholder synthesis: returns empty audio so nothing plays.
#[derive(Debug, Default)]
pub struct PlaceholderSynthesis;

#[async_trait]
impl SpeechSynthesis for PlaceholderSynthesis {
    async fn synthesize(&self, _text: &str) -> InterviewResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Placeholder submission: logs the transcript and counts calls.
#[derive(Debug, Default)]
pub struct PlaceholderSubmission {
    submissions: AtomicUsize,
}

impl PlaceholderSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultSubmission for PlaceholderSubmission {
    async fn submit(&self, identifier: &str, transcript: &[TurnRecord]) -> InterviewResult<()> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        info!(
            "Placeholder submission for {}: {} turns",
            identifier,
            transcript.len()
        );
        Ok(())
    }
}
