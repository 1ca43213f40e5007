//! Error types for the interview voice engine

use thiserror::Error;

/// Result type alias for interview operations
pub type InterviewResult<T> = Result<T, InterviewError>;

/// Errors that can occur while running an interview session.
///
/// Variants carry plain strings so the session can both record an error as
/// `last_error` and hand a copy to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterviewError {
    #[error("Assistant session could not be created: {0}")]
    AssistantUnavailable(String),

    #[error("Assistant request failed: {0}")]
    Assistant(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Nothing was recognized in the recorded answer")]
    EmptyTranscription,

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio could not be decoded for playback: {0}")]
    PlaybackDecode(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Microphone capture error: {0}")]
    Capture(String),

    #[error("Transcript submission failed: {0}")]
    Submission(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation not valid in the current phase: {0}")]
    InvalidPhase(String),
}

impl InterviewError {
    /// True for errors the user can recover from by retrying the same
    /// prompt (the session returns to `AwaitingAnswer` after these).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InterviewError::Transcription(_)
                | InterviewError::EmptyTranscription
                | InterviewError::Capture(_)
        )
    }
}
