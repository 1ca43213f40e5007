//! Speech-to-text adapter (OpenAI-compatible transcription API).
//!
//! Uploads the recorded answer as a WAV file. The language hint and the
//! domain prompt bias the model toward clean interview-answer Korean.

use async_trait::async_trait;
use intervox_voice::{AudioClip, InterviewError, InterviewResult, Transcription};
use std::time::Duration;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "whisper-1";
const DEFAULT_LANGUAGE: &str = "ko";
const DEFAULT_STYLE_PROMPT: &str = "이것은 면접 답변입니다. 명확하고 전문적인 어투로 변환해주세요.";

/// Whisper-style transcription over multipart WAV upload.
#[derive(Debug, Clone)]
pub struct WhisperTranscription {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Model: whisper-1 or a compatible transcription model.
    pub model: String,
    /// ISO language hint (default: ko).
    pub language: String,
    /// Style prompt sent with every request.
    pub style_prompt: String,
    client: reqwest::Client,
}

impl WhisperTranscription {
    /// Build from environment: `OPENAI_API_KEY`, optional `STT_API_URL`
    /// and `STT_MODEL`.
    pub fn from_env() -> InterviewResult<Self> {
        let base_url =
            std::env::var("STT_API_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| InterviewError::Config("OPENAI_API_KEY not set".to_string()))?;
        let model = std::env::var("STT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(base_url, api_key, model)
    }

    /// Create with explicit config.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> InterviewResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| InterviewError::Transcription(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            style_prompt: DEFAULT_STYLE_PROMPT.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Transcription for WhisperTranscription {
    async fn transcribe(&self, clip: &AudioClip) -> InterviewResult<String> {
        if clip.is_empty() {
            return Ok(String::new());
        }
        let wav = clip.to_wav_bytes();
        debug!(
            bytes = wav.len(),
            seconds = clip.duration.as_secs_f32(),
            "Uploading answer for transcription"
        );
        let url = format!(
            "{}/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        );
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("answer.wav")
            .mime_str("audio/wav")
            .map_err(|e| InterviewError::Transcription(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("temperature", "0.2")
            .text("response_format", "verbose_json")
            .text("prompt", self.style_prompt.clone());
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| InterviewError::Transcription(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InterviewError::Transcription(format!(
                "Transcription API error {status}: {body}"
            )));
        }
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InterviewError::Transcription(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(text)
    }
}
