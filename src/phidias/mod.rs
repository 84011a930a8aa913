//! Client for the Phidias poll API.
//!
//! One poll record is a flat list of heterogeneously-typed answers; the
//! record mapper in `sync::mapper` turns it into a canonical falta. This
//! module only does network I/O: fetching records for a (student, poll)
//! pair and driving batches of such fetches with per-item error isolation.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use crate::config::Config;
use crate::errors::AppError;

/// One answer within a poll record. Values are heterogeneous: dates arrive
/// as numeric epoch seconds, everything else as free text.
#[derive(Debug, Clone, Deserialize)]
pub struct PollAnswer {
    pub name: String,
    pub value: AnswerValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Number(f64),
    Text(String),
}

impl AnswerValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnswerValue::Number(n) => Some(*n),
            AnswerValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(s) => Some(s),
            AnswerValue::Number(_) => None,
        }
    }
}

/// One poll response unit as returned by Phidias. Immutable once fetched.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalRecord {
    pub id: i64,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    /// Creation timestamp, epoch seconds.
    pub added: i64,
    /// Last-edit timestamp, epoch seconds.
    pub edited: i64,
    #[serde(default)]
    pub answers: Vec<PollAnswer>,
}

impl ExternalRecord {
    /// Display name of the staff member who filed the record.
    pub fn author(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct PollRecordsResponse {
    #[serde(default)]
    records: Vec<ExternalRecord>,
}

/// Seam for the Phidias poll API so tests can script responses.
#[async_trait]
pub trait PollClient: Send + Sync {
    /// Fetch all records of one poll for one student.
    async fn fetch_records(
        &self,
        student_external_code: &str,
        poll_id: i64,
    ) -> Result<Vec<ExternalRecord>, AppError>;
}

/// reqwest-backed client for the real platform.
pub struct PhidiasClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl PhidiasClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.phidias_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.phidias_base_url.trim_end_matches('/').to_string(),
            token: config.phidias_token.clone(),
        })
    }
}

#[async_trait]
impl PollClient for PhidiasClient {
    async fn fetch_records(
        &self,
        student_external_code: &str,
        poll_id: i64,
    ) -> Result<Vec<ExternalRecord>, AppError> {
        let url = format!("{}/rest/1/poll/{}/records", self.base_url, poll_id);

        let mut request = self
            .client
            .get(&url)
            .query(&[("person", student_external_code)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::External(format!(
                "Phidias returned {} for poll {} (student {})",
                status, poll_id, student_external_code
            )));
        }

        let body: PollRecordsResponse = response.json().await?;
        tracing::debug!(
            poll_id,
            student = student_external_code,
            records = body.records.len(),
            "Fetched poll records"
        );
        Ok(body.records)
    }
}

/// Minimal student handle needed to drive a batch.
#[derive(Debug, Clone)]
pub struct StudentRef {
    pub id: String,
    pub external_code: String,
}

/// Outcome of one (student, poll) fetch within a batch. Failures are
/// captured as messages so one bad pair never aborts the batch.
#[derive(Debug)]
pub struct BatchItem {
    pub student_id: String,
    pub poll_id: i64,
    pub result: Result<Vec<ExternalRecord>, String>,
}

/// Fetch poll records for every (student, poll) pair, `batch_size` students
/// at a time. Fetches within a chunk run concurrently; chunks run one after
/// another, which bounds in-flight requests and respects Phidias rate
/// limits. `on_progress(processed_students, total_students)` fires after
/// each chunk.
pub async fn process_batch<F>(
    client: &dyn PollClient,
    students: &[StudentRef],
    poll_ids: &[i64],
    batch_size: usize,
    mut on_progress: F,
) -> Vec<BatchItem>
where
    F: FnMut(usize, usize),
{
    let mut items = Vec::with_capacity(students.len() * poll_ids.len());
    let mut processed = 0usize;

    for chunk in students.chunks(batch_size.max(1)) {
        let fetches = chunk.iter().flat_map(|student| {
            poll_ids.iter().map(move |&poll_id| async move {
                let result = client
                    .fetch_records(&student.external_code, poll_id)
                    .await
                    .map_err(|e| e.to_string());
                BatchItem {
                    student_id: student.id.clone(),
                    poll_id,
                    result,
                }
            })
        });

        items.extend(join_all(fetches).await);

        processed += chunk.len();
        on_progress(processed, students.len());
    }

    items
}
