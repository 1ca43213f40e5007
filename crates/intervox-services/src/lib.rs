//! HTTP adapters for the interview capability interfaces.
//!
//! Each adapter implements one `intervox-voice` capability trait against
//! the real external service: an OpenAI Assistants-style threaded
//! conversation, a Whisper-style transcription endpoint, an
//! ElevenLabs-style speech-synthesis endpoint, and the automation
//! workflow's webhooks (result submission, candidate registration,
//! résumé listing/saving). All of them are plain reqwest clients with
//! explicit timeouts; none hold cross-session state.

pub mod assistant;
pub mod resume;
pub mod speech;
pub mod transcription;
pub mod workflow;

pub use assistant::OpenAiAssistant;
pub use resume::{filter_records, sort_records, ResumeRecord, ResumeWorkflow, SortDirection, SortField};
pub use speech::ElevenLabsSpeech;
pub use transcription::WhisperTranscription;
pub use workflow::WorkflowWebhook;
