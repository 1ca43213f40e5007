//! Résumé workflow client for the operator screen.
//!
//! Past interview submissions are fetched from the automation workflow as
//! a flat record list; edited résumé HTML is posted back. The only
//! non-presentational logic on that screen is search filtering and
//! column sorting, which live here so they can be tested.

use chrono::{DateTime, Utc};
use intervox_voice::{InterviewError, InterviewResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// One past interview submission as the workflow reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub birth: String,
    #[serde(default)]
    pub resumer_history: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub evaluation: String,
    #[serde(default)]
    pub resume_html: String,
    #[serde(default)]
    pub createdate: String,
}

/// Sortable listing columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    Phone,
    CreateDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Case-insensitive search over candidate name and phone number.
pub fn filter_records<'a>(records: &'a [ResumeRecord], term: &str) -> Vec<&'a ResumeRecord> {
    let term = term.trim().to_lowercase();
    records
        .iter()
        .filter(|r| term.is_empty() || r.name.to_lowercase().contains(&term) || r.phone.contains(&term))
        .collect()
}

/// Sort a listing by column. Creation dates compare as timestamps when
/// they parse, otherwise fall back to string order.
pub fn sort_records(records: &mut [ResumeRecord], field: SortField, direction: SortDirection) {
    records.sort_by(|a, b| {
        let ordering = match field {
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Phone => a.phone.cmp(&b.phone),
            SortField::CreateDate => {
                let parse = |s: &str| s.parse::<DateTime<Utc>>().ok();
                match (parse(&a.createdate), parse(&b.createdate)) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => a.createdate.cmp(&b.createdate),
                }
            }
        };
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

#[derive(Serialize)]
struct FetchPayload {
    timestamp: DateTime<Utc>,
    action: &'static str,
}

#[derive(Serialize)]
struct SavePayload<'a> {
    resume_html: &'a str,
}

/// Client for the résumé listing/saving webhooks.
#[derive(Debug, Clone)]
pub struct ResumeWorkflow {
    /// Endpoint returning the submission list.
    pub fetch_url: String,
    /// Endpoint receiving edited résumé HTML.
    pub save_url: String,
    client: reqwest::Client,
}

impl ResumeWorkflow {
    /// Build from environment: `RESUME_FETCH_WEBHOOK_URL`,
    /// `RESUME_SAVE_WEBHOOK_URL`.
    pub fn from_env() -> InterviewResult<Self> {
        let fetch_url = std::env::var("RESUME_FETCH_WEBHOOK_URL")
            .map_err(|_| InterviewError::Config("RESUME_FETCH_WEBHOOK_URL not set".to_string()))?;
        let save_url = std::env::var("RESUME_SAVE_WEBHOOK_URL")
            .map_err(|_| InterviewError::Config("RESUME_SAVE_WEBHOOK_URL not set".to_string()))?;
        Self::new(fetch_url, save_url)
    }

    /// Create with explicit endpoints.
    pub fn new(fetch_url: impl Into<String>, save_url: impl Into<String>) -> InterviewResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| InterviewError::Submission(e.to_string()))?;
        Ok(Self {
            fetch_url: fetch_url.into(),
            save_url: save_url.into(),
            client,
        })
    }

    /// Fetch all past interview submissions.
    pub async fn fetch_records(&self) -> InterviewResult<Vec<ResumeRecord>> {
        let payload = FetchPayload {
            timestamp: Utc::now(),
            action: "fetch_resume_data",
        };
        let response = self
            .client
            .post(&self.fetch_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| InterviewError::Submission(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InterviewError::Submission(format!(
                "Resume fetch returned {status}: {body}"
            )));
        }
        let records: Vec<ResumeRecord> = response
            .json()
            .await
            .map_err(|e| InterviewError::Submission(format!("Resume list was not an array: {e}")))?;
        debug!(count = records.len(), "Fetched resume records");
        Ok(records)
    }

    /// Persist an edited résumé.
    pub async fn save_resume(&self, resume_html: &str) -> InterviewResult<()> {
        let response = self
            .client
            .post(&self.save_url)
            .json(&SavePayload { resume_html })
            .send()
            .await
            .map_err(|e| InterviewError::Submission(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(InterviewError::Submission(format!(
                "Resume save returned {status}"
            )));
        }
        info!("Resume saved");
        Ok(())
    }
}
