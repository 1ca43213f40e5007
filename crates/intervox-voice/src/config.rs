//! Session configuration loaded from explicit values or the environment.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | INTERVOX_OPENING_UTTERANCE | "면접을 시작해주세요." | Hidden first message that asks the assistant for its greeting. |
//! | INTERVOX_END_MARKERS | three closing phrases | `\|`-separated substrings that mark the interview as finished. |
//! | INTERVOX_RETRY_BACKOFF_MS | 1500 | Backoff before the single automatic assistant/submission retry. |

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Phrases whose presence in an assistant reply signals the end of the
/// interview. Substring matching is the contract the upstream assistant
/// currently offers; this type isolates it so a structured end-of-session
/// signal can replace it without touching the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndMarkers {
    phrases: Vec<String>,
}

impl Default for EndMarkers {
    fn default() -> Self {
        Self {
            phrases: vec![
                "면접이 종료되었습니다".to_string(),
                "면접을 마치겠습니다".to_string(),
                "수고하셨습니다".to_string(),
            ],
        }
    }
}

impl EndMarkers {
    /// Build from an explicit phrase list. Empty phrases are dropped.
    pub fn new(phrases: impl IntoIterator<Item = String>) -> Self {
        let phrases: Vec<String> = phrases
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// Whether `reply` contains any marker phrase.
    pub fn matches(&self, reply: &str) -> bool {
        self.phrases.iter().any(|p| reply.contains(p.as_str()))
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

/// Configuration for one interview session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Candidate identifier forwarded with the final transcript (the
    /// phone number entered before the interview).
    pub candidate_phone: String,

    /// First (hidden) message sent to a fresh assistant session; the reply
    /// is the spoken greeting.
    pub opening_utterance: String,

    /// End-of-interview marker phrases.
    pub end_markers: EndMarkers,

    /// Automatic retries for assistant round trips and final submission
    /// (default: 1).
    pub max_retries: u32,

    /// Backoff before an automatic retry.
    pub retry_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            candidate_phone: String::new(),
            opening_utterance: "면접을 시작해주세요.".to_string(),
            end_markers: EndMarkers::default(),
            max_retries: 1,
            retry_backoff: Duration::from_millis(1500),
        }
    }
}

impl SessionConfig {
    /// Default configuration for the given candidate.
    pub fn for_candidate(phone: impl Into<String>) -> Self {
        Self {
            candidate_phone: phone.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden from `INTERVOX_*` environment variables.
    pub fn from_env(phone: impl Into<String>) -> Self {
        let mut config = Self::for_candidate(phone);
        if let Ok(utterance) = std::env::var("INTERVOX_OPENING_UTTERANCE") {
            if !utterance.trim().is_empty() {
                config.opening_utterance = utterance;
            }
        }
        if let Ok(markers) = std::env::var("INTERVOX_END_MARKERS") {
            let markers = EndMarkers::new(markers.split('|').map(str::to_string));
            if !markers.phrases().is_empty() {
                config.end_markers = markers;
            }
        }
        if let Some(ms) = std::env::var("INTERVOX_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.retry_backoff = Duration::from_millis(ms);
        }
        config
    }
}
