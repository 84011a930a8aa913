//! Derived case model: the lifecycle view of a moderada falta.

use chrono::NaiveDate;
use serde::Serialize;

use super::AcademicLevel;

/// Pure projection over a moderada falta and its seguimientos.
///
/// Never persisted; recomputed on demand from current store state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Caso {
    pub falta_hash: String,
    pub student_id: String,
    pub student_name: String,
    pub section: String,
    pub level: AcademicLevel,
    pub fecha: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeral: Option<u32>,
    pub completed_count: u8,
    pub pending_count: u8,
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_number: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_date: Option<NaiveDate>,
    pub overdue: bool,
}
