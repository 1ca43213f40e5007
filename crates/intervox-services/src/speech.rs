//! Text-to-speech adapter (ElevenLabs API).
//!
//! Returns encoded audio for the playback controller to decode. Voice
//! settings follow the tuned interviewer voice (multilingual model,
//! moderate stability).

use async_trait::async_trait;
use intervox_voice::{InterviewError, InterviewResult, SpeechSynthesis};
use std::time::Duration;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.elevenlabs.io/v1";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";
const DEFAULT_STABILITY: f64 = 0.45;
const DEFAULT_SIMILARITY_BOOST: f64 = 0.75;

/// ElevenLabs-style synthesis for the interviewer's voice.
#[derive(Debug, Clone)]
pub struct ElevenLabsSpeech {
    /// Base URL without trailing slash (e.g. https://api.elevenlabs.io/v1).
    pub base_url: String,
    /// API key sent as `xi-api-key`.
    pub api_key: String,
    /// Voice to synthesize with.
    pub voice_id: String,
    /// TTS model id.
    pub model_id: String,
    /// Voice stability (0..1).
    pub stability: f64,
    /// Similarity boost (0..1).
    pub similarity_boost: f64,
    client: reqwest::Client,
}

impl ElevenLabsSpeech {
    /// Build from environment: `ELEVENLABS_API_KEY`, `ELEVENLABS_VOICE_ID`,
    /// optional `TTS_API_URL`.
    pub fn from_env() -> InterviewResult<Self> {
        let base_url =
            std::env::var("TTS_API_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = std::env::var("ELEVENLABS_API_KEY")
            .map_err(|_| InterviewError::Config("ELEVENLABS_API_KEY not set".to_string()))?;
        let voice_id = std::env::var("ELEVENLABS_VOICE_ID")
            .map_err(|_| InterviewError::Config("ELEVENLABS_VOICE_ID not set".to_string()))?;
        Self::new(base_url, api_key, voice_id)
    }

    /// Create with explicit config.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> InterviewResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| InterviewError::Synthesis(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model_id: DEFAULT_MODEL.to_string(),
            stability: DEFAULT_STABILITY,
            similarity_boost: DEFAULT_SIMILARITY_BOOST,
            client,
        })
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": self.stability,
                "similarity_boost": self.similarity_boost,
            },
        })
    }
}

#[async_trait]
impl SpeechSynthesis for ElevenLabsSpeech {
    async fn synthesize(&self, text: &str) -> InterviewResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        );
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| InterviewError::Synthesis(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InterviewError::Synthesis(format!(
                "TTS API error {status}: {body}"
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| InterviewError::Synthesis(e.to_string()))?;
        debug!(bytes = bytes.len(), "Synthesized prompt audio");
        Ok(bytes.to_vec())
    }
}
