//! Sync configuration and run-audit models.

use serde::{Deserialize, Serialize};

use super::{AcademicLevel, InfractionType};

/// Identifies one Phidias poll for one (infraction type, level, school year).
///
/// Created and edited by the administrative UI; read-only to the sync engine.
/// At most one active config may exist per (poll id, school year).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeguimientoConfig {
    pub id: String,
    pub poll_id: i64,
    pub name: String,
    pub infraction_type: InfractionType,
    pub level: AcademicLevel,
    pub school_year_id: String,
    pub active: bool,
}

/// Request body for registering a new sync configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConfigRequest {
    pub poll_id: i64,
    pub name: String,
    pub infraction_type: InfractionType,
    pub level: AcademicLevel,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// How a sync run was triggered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunType {
    Manual,
    Automatic,
}

impl SyncRunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunType::Manual => "manual",
            SyncRunType::Automatic => "automatic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(SyncRunType::Manual),
            "automatic" => Some(SyncRunType::Automatic),
            _ => None,
        }
    }
}

/// Final (or in-flight) status of a sync run.
///
/// `Partial` means data was written but some per-item failures occurred;
/// it is deliberately distinct from `Success`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Running,
    Success,
    Partial,
    Error,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Running => "running",
            SyncRunStatus::Success => "success",
            SyncRunStatus::Partial => "partial",
            SyncRunStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SyncRunStatus::Running),
            "success" => Some(SyncRunStatus::Success),
            "partial" => Some(SyncRunStatus::Partial),
            "error" => Some(SyncRunStatus::Error),
            _ => None,
        }
    }
}

/// One per-item failure recorded during a run, with enough context to
/// diagnose which (student, poll) pair it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncItemError {
    pub student_id: String,
    pub poll_id: i64,
    pub message: String,
}

/// Audit record for one execution of the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: String,
    pub run_type: SyncRunType,
    pub status: SyncRunStatus,
    pub students_processed: i64,
    pub created_count: i64,
    pub updated_count: i64,
    pub errors: Vec<SyncItemError>,
    pub triggered_by: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// Request body for triggering a sync run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub run_type: Option<SyncRunType>,
    /// Restrict the run to configs for a single academic level.
    #[serde(default)]
    pub level: Option<AcademicLevel>,
    /// Debug mode: restrict the run to a single local student id.
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub triggered_by: Option<String>,
}
