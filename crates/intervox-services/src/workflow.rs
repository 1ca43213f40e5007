//! Automation-workflow webhooks: candidate registration and final
//! transcript delivery.
//!
//! The downstream workflow identifies candidates by the phone number
//! entered before the interview; timestamps are epoch milliseconds.

use async_trait::async_trait;
use chrono::Utc;
use intervox_voice::{InterviewError, InterviewResult, ResultSubmission, TurnRecord};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Serialize)]
struct RegistrationPayload<'a> {
    phone: &'a str,
    time: i64,
}

#[derive(Serialize)]
struct SubmissionPayload<'a> {
    phone: &'a str,
    time: i64,
    answers: &'a [TurnRecord],
}

/// Client for the interview workflow's webhooks.
#[derive(Debug, Clone)]
pub struct WorkflowWebhook {
    /// Endpoint receiving the finished transcript.
    pub result_url: String,
    /// Endpoint receiving the candidate's phone number before the
    /// interview (optional; registration is skipped when unset).
    pub registration_url: Option<String>,
    client: reqwest::Client,
}

impl WorkflowWebhook {
    /// Build from environment: `INTERVIEW_RESULT_WEBHOOK_URL`, optional
    /// `PHONE_WEBHOOK_URL`.
    pub fn from_env() -> InterviewResult<Self> {
        let result_url = std::env::var("INTERVIEW_RESULT_WEBHOOK_URL")
            .map_err(|_| InterviewError::Config("INTERVIEW_RESULT_WEBHOOK_URL not set".to_string()))?;
        let registration_url = std::env::var("PHONE_WEBHOOK_URL").ok();
        Self::new(result_url, registration_url)
    }

    /// Create with explicit endpoints.
    pub fn new(
        result_url: impl Into<String>,
        registration_url: Option<String>,
    ) -> InterviewResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| InterviewError::Submission(e.to_string()))?;
        Ok(Self {
            result_url: result_url.into(),
            registration_url,
            client,
        })
    }

    /// Announce a candidate before their interview. Best-effort: a
    /// failure is logged and reported, but callers typically proceed with
    /// the interview anyway.
    pub async fn register_candidate(&self, phone: &str) -> InterviewResult<()> {
        let Some(url) = self.registration_url.as_deref() else {
            return Ok(());
        };
        let payload = RegistrationPayload {
            phone,
            time: Utc::now().timestamp_millis(),
        };
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| InterviewError::Submission(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, "Candidate registration rejected");
            return Err(InterviewError::Submission(format!(
                "Registration webhook returned {status}"
            )));
        }
        info!(phone, "Candidate registered");
        Ok(())
    }
}

#[async_trait]
impl ResultSubmission for WorkflowWebhook {
    async fn submit(&self, identifier: &str, transcript: &[TurnRecord]) -> InterviewResult<()> {
        let payload = SubmissionPayload {
            phone: identifier,
            time: Utc::now().timestamp_millis(),
            answers: transcript,
        };
        let response = self
            .client
            .post(&self.result_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| InterviewError::Submission(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InterviewError::Submission(format!(
                "Result webhook returned {status}: {body}"
            )));
        }
        info!(
            identifier,
            turns = transcript.len(),
            "Interview transcript delivered"
        );
        Ok(())
    }
}
