//! Threaded-assistant adapter (OpenAI Assistants API).
//!
//! One interview session maps to one thread. Each answer is appended as a
//! user message, a run is created, polled until it reaches a terminal
//! status, and the newest assistant message is the interviewer's reply.
//!
//! API key: `OPENAI_API_KEY`; interviewer persona: `GPT_ASSISTANT_ID`.

use async_trait::async_trait;
use intervox_voice::{Assistant, InterviewError, InterviewResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// How long a run may stay queued/in_progress before it is treated as
/// failed. The upstream service occasionally wedges runs; polling forever
/// would wedge the interview with it.
const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Deserialize)]
struct ThreadCreated {
    id: String,
}

#[derive(Deserialize)]
struct RunCreated {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<Message>,
}

#[derive(Deserialize)]
struct Message {
    role: String,
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<MessageText>,
}

#[derive(Deserialize)]
struct MessageText {
    value: String,
}

/// Conversation with a configured interviewer assistant over threads.
#[derive(Debug, Clone)]
pub struct OpenAiAssistant {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// The interviewer assistant to run against each thread.
    pub assistant_id: String,
    /// Delay between run-status polls.
    pub poll_interval: Duration,
    /// Overall budget for one run to finish.
    pub run_timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiAssistant {
    /// Build from environment: `OPENAI_API_KEY`, `GPT_ASSISTANT_ID`,
    /// optional `ASSISTANT_API_URL`.
    pub fn from_env() -> InterviewResult<Self> {
        let base_url = std::env::var("ASSISTANT_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| InterviewError::Config("OPENAI_API_KEY not set".to_string()))?;
        let assistant_id = std::env::var("GPT_ASSISTANT_ID")
            .map_err(|_| InterviewError::Config("GPT_ASSISTANT_ID not set".to_string()))?;
        Self::new(base_url, api_key, assistant_id)
    }

    /// Create with explicit config (e.g. for tests or non-env wiring).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        assistant_id: impl Into<String>,
    ) -> InterviewResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| InterviewError::Assistant(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            assistant_id: assistant_id.into(),
            poll_interval: Duration::from_secs(1),
            run_timeout: DEFAULT_RUN_TIMEOUT,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    async fn check(response: reqwest::Response, what: &str) -> InterviewResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(InterviewError::Assistant(format!(
            "{what} failed with {status}: {body}"
        )))
    }

    async fn wait_for_run(&self, thread_id: &str, run_id: &str) -> InterviewResult<()> {
        let deadline = tokio::time::Instant::now() + self.run_timeout;
        loop {
            let response = self
                .get(&format!("threads/{thread_id}/runs/{run_id}"))
                .send()
                .await
                .map_err(|e| InterviewError::Assistant(e.to_string()))?;
            let run: RunCreated = Self::check(response, "Run poll")
                .await?
                .json()
                .await
                .map_err(|e| InterviewError::Assistant(e.to_string()))?;

            match run.status.as_str() {
                "completed" => return Ok(()),
                "queued" | "in_progress" => {
                    if tokio::time::Instant::now() >= deadline {
                        warn!(%run_id, "Run did not finish within the budget");
                        return Err(InterviewError::Assistant(
                            "Run did not finish in time".to_string(),
                        ));
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                status => {
                    return Err(InterviewError::Assistant(format!(
                        "Run ended with status {status}"
                    )))
                }
            }
        }
    }

    async fn newest_assistant_text(&self, thread_id: &str) -> InterviewResult<String> {
        let response = self
            .get(&format!("threads/{thread_id}/messages"))
            .send()
            .await
            .map_err(|e| InterviewError::Assistant(e.to_string()))?;
        let list: MessageList = Self::check(response, "Message list")
            .await?
            .json()
            .await
            .map_err(|e| InterviewError::Assistant(e.to_string()))?;

        // Messages are returned newest-first; the reply is the newest
        // assistant text block.
        list.data
            .iter()
            .find(|m| m.role == "assistant")
            .and_then(|m| {
                m.content
                    .iter()
                    .find(|c| c.kind == "text")
                    .and_then(|c| c.text.as_ref())
            })
            .map(|t| t.value.clone())
            .ok_or_else(|| InterviewError::Assistant("Reply had no text content".to_string()))
    }
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    async fn create_session(&self) -> InterviewResult<String> {
        let response = self
            .post("threads")
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| InterviewError::AssistantUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InterviewError::AssistantUnavailable(format!(
                "Thread creation failed with {status}: {body}"
            )));
        }
        let thread: ThreadCreated = response
            .json()
            .await
            .map_err(|e| InterviewError::AssistantUnavailable(e.to_string()))?;
        debug!(thread_id = %thread.id, "Created interview thread");
        Ok(thread.id)
    }

    async fn submit_and_get_reply(
        &self,
        session_id: &str,
        utterance: &str,
    ) -> InterviewResult<String> {
        let response = self
            .post(&format!("threads/{session_id}/messages"))
            .json(&serde_json::json!({ "role": "user", "content": utterance }))
            .send()
            .await
            .map_err(|e| InterviewError::Assistant(e.to_string()))?;
        Self::check(response, "Message create").await?;

        let response = self
            .post(&format!("threads/{session_id}/runs"))
            .json(&serde_json::json!({ "assistant_id": self.assistant_id }))
            .send()
            .await
            .map_err(|e| InterviewError::Assistant(e.to_string()))?;
        let run: RunCreated = Self::check(response, "Run create")
            .await?
            .json()
            .await
            .map_err(|e| InterviewError::Assistant(e.to_string()))?;
        debug!(run_id = %run.id, status = %run.status, "Run started");

        self.wait_for_run(session_id, &run.id).await?;
        self.newest_assistant_text(session_id).await
    }
}
