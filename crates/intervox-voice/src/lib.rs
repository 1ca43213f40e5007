//! # Intervox Voice - Turn-Taking Interview Engine
//!
//! This crate implements the spoken-interview session: a strict
//! turn-taking state machine between a human candidate and an AI
//! interviewer, with single-flight speech playback and push-to-talk
//! answer capture.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Interview Session                           │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │   Capture    │→ │ Transcription│→ │  Assistant   │       │
//! │  │    (cpal)    │  │ (capability) │  │ (capability) │       │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘       │
//! │         ↑                                    ↓               │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Toggle (UI)  │← │   Playback   │← │  Synthesis   │       │
//! │  │ phase-gated  │  │   (rodio)    │  │ (capability) │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The session is the single owner of every transition: one event at a
//! time, no overlapping turns, control enablement derived from the phase.

pub mod capabilities;
pub mod capture;
pub mod config;
pub mod error;
pub mod playback;
pub mod session;

pub use capabilities::{
    Assistant, Capabilities, PlaceholderAssistant, PlaceholderSubmission, PlaceholderSynthesis,
    PlaceholderTranscription, ResultSubmission, SpeechSynthesis, Transcription,
};
pub use capture::{AnswerCapture, AudioClip, CaptureConfig, MicrophoneCapture, PlaceholderCapture};
pub use config::{EndMarkers, SessionConfig};
pub use error::{InterviewError, InterviewResult};
pub use playback::{PlaybackController, RodioSink, SilentSink, SpeechSink, UtteranceHandle};
pub use session::{InterviewSession, Phase, SessionEvent, TurnRecord};
