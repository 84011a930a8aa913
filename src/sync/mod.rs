//! Sync orchestration: drives one end-to-end reconciliation run against
//! the Phidias platform.
//!
//! A run walks a fixed set of phases (load config, load students, sync,
//! finalize) and audits itself as exactly one `sync_runs` row. Per-item
//! failures (one student's fetch, one record's write) are collected and
//! never abort the run; only configuration-level problems do.

pub mod mapper;
pub mod reconcile;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::classify::student_level;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{
    Student, SyncItemError, SyncRequest, SyncRun, SyncRunStatus, SyncRunType,
};
use crate::phidias::{process_batch, PollClient, StudentRef};

use reconcile::ReconcileOutcome;

/// Phases of a sync run, in order. Closed set so consumers can match
/// exhaustively instead of sniffing message strings.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    LoadingConfig,
    LoadingStudents,
    Syncing,
    Completed,
    Error,
}

/// One progress notification. Observability only: consumers cannot affect
/// control flow through it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: SyncPhase,
    pub processed: usize,
    pub total: usize,
    pub message: String,
}

/// Observer seam for progress events. Publishing must never fail the run.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: ProgressEvent);
}

/// Default sink: retains the latest event for the status endpoint to poll.
#[derive(Default)]
pub struct SharedProgress {
    latest: RwLock<Option<ProgressEvent>>,
}

impl SharedProgress {
    pub fn snapshot(&self) -> Option<ProgressEvent> {
        self.latest.read().ok()?.clone()
    }
}

impl ProgressSink for SharedProgress {
    fn publish(&self, event: ProgressEvent) {
        // A poisoned lock only loses the notification, never the run.
        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(event);
        }
    }
}

struct RunOutcome {
    students_processed: usize,
    created: usize,
    updated: usize,
    errors: Vec<SyncItemError>,
}

/// Orchestrates sync runs. Constructed once at startup and shared through
/// `AppState`; owns the only mutable run state (counters, error list) and
/// mutates it strictly from its own sequential control flow.
pub struct SyncService {
    repo: Arc<Repository>,
    client: Arc<dyn PollClient>,
    progress: Arc<SharedProgress>,
    batch_size: usize,
    /// Single-flight guard: two operators triggering at once race for this.
    run_guard: Mutex<()>,
}

impl SyncService {
    pub fn new(repo: Arc<Repository>, client: Arc<dyn PollClient>, batch_size: usize) -> Self {
        Self {
            repo,
            client,
            progress: Arc::new(SharedProgress::default()),
            batch_size,
            run_guard: Mutex::new(()),
        }
    }

    /// Latest progress event, for the polling status endpoint.
    pub fn progress_snapshot(&self) -> Option<ProgressEvent> {
        self.progress.snapshot()
    }

    /// Execute one sync run to completion and return its finalized audit
    /// record. Exactly one `sync_runs` row is finalized per call, whether
    /// the run succeeds, partially succeeds, or fails on configuration.
    pub async fn run(&self, request: SyncRequest) -> Result<SyncRun, AppError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| AppError::SyncInProgress)?;

        let run_type = request.run_type.unwrap_or(SyncRunType::Manual);
        let triggered_by = request
            .triggered_by
            .clone()
            .unwrap_or_else(|| "system".to_string());

        let started = Instant::now();
        let run = self.repo.create_sync_run(run_type, &triggered_by).await?;
        tracing::info!(run_id = %run.id, ?run_type, "Starting sync run");

        match self.execute(&request).await {
            Ok(outcome) => {
                let status = if outcome.errors.is_empty() {
                    SyncRunStatus::Success
                } else {
                    SyncRunStatus::Partial
                };
                let duration_ms = started.elapsed().as_millis() as i64;

                self.repo
                    .finalize_sync_run(
                        &run.id,
                        status,
                        outcome.students_processed as i64,
                        outcome.created as i64,
                        outcome.updated as i64,
                        &outcome.errors,
                        duration_ms,
                    )
                    .await?;

                self.emit(
                    SyncPhase::Completed,
                    outcome.students_processed,
                    outcome.students_processed,
                    format!(
                        "Sync {}: {} created, {} updated, {} errors",
                        status.as_str(),
                        outcome.created,
                        outcome.updated,
                        outcome.errors.len()
                    ),
                );
                tracing::info!(
                    run_id = %run.id,
                    status = status.as_str(),
                    created = outcome.created,
                    updated = outcome.updated,
                    errors = outcome.errors.len(),
                    duration_ms,
                    "Sync run finished"
                );

                Ok(SyncRun {
                    id: run.id,
                    run_type,
                    status,
                    students_processed: outcome.students_processed as i64,
                    created_count: outcome.created as i64,
                    updated_count: outcome.updated as i64,
                    errors: outcome.errors,
                    triggered_by,
                    started_at: run.started_at,
                    finished_at: Some(Utc::now().to_rfc3339()),
                    duration_ms: Some(duration_ms),
                })
            }
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                // Run-level failure: recorded without a (student, poll) context.
                let errors = vec![SyncItemError {
                    student_id: String::new(),
                    poll_id: 0,
                    message: err.message(),
                }];

                if let Err(finalize_err) = self
                    .repo
                    .finalize_sync_run(
                        &run.id,
                        SyncRunStatus::Error,
                        0,
                        0,
                        0,
                        &errors,
                        duration_ms,
                    )
                    .await
                {
                    tracing::error!(run_id = %run.id, "Failed to finalize errored sync run: {}", finalize_err);
                }

                self.emit(SyncPhase::Error, 0, 0, err.message());
                tracing::error!(run_id = %run.id, "Sync run failed: {}", err);
                Err(err)
            }
        }
    }

    async fn execute(&self, request: &SyncRequest) -> Result<RunOutcome, AppError> {
        self.emit(SyncPhase::LoadingConfig, 0, 0, "Loading sync configuration");
        let year = self.repo.get_active_school_year().await?;
        let configs = self
            .repo
            .list_active_configs(&year.id, request.level)
            .await?;
        if configs.is_empty() {
            return Err(AppError::Validation(format!(
                "No active sync configs for school year {}",
                year.name
            )));
        }

        self.emit(SyncPhase::LoadingStudents, 0, 0, "Loading students");
        let mut students = self.repo.list_students(&year.id).await?;
        if let Some(student_id) = &request.student_id {
            students.retain(|s| &s.id == student_id);
            if students.is_empty() {
                return Err(AppError::NotFound(format!(
                    "Student {} not found in school year {}",
                    student_id, year.name
                )));
            }
        }

        let trimesters = self.repo.list_trimesters(&year.id).await?;

        let mut created = 0usize;
        let mut updated = 0usize;
        let mut errors: Vec<SyncItemError> = Vec::new();
        let mut processed_students: HashSet<String> = HashSet::new();

        let total_configs = configs.len();
        for (idx, config) in configs.iter().enumerate() {
            let matching: Vec<&Student> = students
                .iter()
                .filter(|s| student_level(s) == config.level)
                .collect();

            self.emit(
                SyncPhase::Syncing,
                idx,
                total_configs,
                format!("{}: {} matching students", config.name, matching.len()),
            );

            if matching.is_empty() {
                tracing::info!(config = %config.name, level = config.level.as_str(), "No matching students, skipping config");
                continue;
            }

            let refs: Vec<StudentRef> = matching
                .iter()
                .map(|s| StudentRef {
                    id: s.id.clone(),
                    external_code: s.external_code.clone(),
                })
                .collect();

            let items = process_batch(
                self.client.as_ref(),
                &refs,
                &[config.poll_id],
                self.batch_size,
                |done, total| {
                    self.emit(
                        SyncPhase::Syncing,
                        done,
                        total,
                        format!("{}: fetched {}/{} students", config.name, done, total),
                    );
                },
            )
            .await;

            for item in items {
                match item.result {
                    Ok(records) => {
                        processed_students.insert(item.student_id.clone());
                        let Some(student) = matching.iter().find(|s| s.id == item.student_id)
                        else {
                            continue;
                        };
                        for record in &records {
                            let data = mapper::map_to_falta(
                                record,
                                student,
                                &trimesters,
                                config.infraction_type,
                                config.level,
                            );
                            match reconcile::reconcile(&self.repo, &data).await {
                                Ok(ReconcileOutcome::Created) => created += 1,
                                Ok(ReconcileOutcome::Updated) => updated += 1,
                                Ok(ReconcileOutcome::Unchanged) => {}
                                Err(e) => {
                                    tracing::warn!(
                                        student_id = %item.student_id,
                                        poll_id = item.poll_id,
                                        record_id = record.id,
                                        "Failed to persist record: {}",
                                        e
                                    );
                                    errors.push(SyncItemError {
                                        student_id: item.student_id.clone(),
                                        poll_id: item.poll_id,
                                        message: e.to_string(),
                                    });
                                }
                            }
                        }
                    }
                    Err(message) => {
                        tracing::warn!(
                            student_id = %item.student_id,
                            poll_id = item.poll_id,
                            "Fetch failed: {}",
                            message
                        );
                        errors.push(SyncItemError {
                            student_id: item.student_id,
                            poll_id: item.poll_id,
                            message,
                        });
                    }
                }
            }
        }

        Ok(RunOutcome {
            students_processed: processed_students.len(),
            created,
            updated,
            errors,
        })
    }

    fn emit(&self, phase: SyncPhase, processed: usize, total: usize, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(?phase, processed, total, "{}", message);
        self.progress.publish(ProgressEvent {
            phase,
            processed,
            total,
            message,
        });
    }
}
