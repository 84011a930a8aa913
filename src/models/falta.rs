//! Falta (infraction) and seguimiento (follow-up) models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{AcademicLevel, TrimesterRef};

/// Ordinal severity of a falta. The three-step follow-up policy applies to
/// `Moderada` only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InfractionType {
    Leve,
    Moderada,
    Grave,
}

impl InfractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfractionType::Leve => "leve",
            InfractionType::Moderada => "moderada",
            InfractionType::Grave => "grave",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "leve" => Some(InfractionType::Leve),
            "moderada" => Some(InfractionType::Moderada),
            "grave" => Some(InfractionType::Grave),
            _ => None,
        }
    }
}

/// A recorded disciplinary incident.
///
/// `hash` is derived deterministically from the Phidias record id, so the
/// same external record always maps to the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Falta {
    pub hash: String,
    pub student_id: String,
    pub external_record_id: i64,
    pub infraction_type: InfractionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeral: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub falta_manual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acciones: Option<String>,
    pub author: String,
    pub fecha: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trimester: Option<TrimesterRef>,
    pub level: AcademicLevel,
    pub diagnostico: bool,
    /// Creation timestamp on the external platform (epoch seconds).
    pub external_added_at: i64,
    /// Last-edit timestamp on the external platform (epoch seconds).
    pub external_edited_at: i64,
    /// Mutated only by the case-management UI, never by sync.
    pub attended: bool,
    pub updated_at: String,
}

/// Canonical shape produced by the record mapper and consumed by the
/// reconciliation upserter. Sync-owned fields only: `attended` and local
/// bookkeeping are deliberately absent.
#[derive(Debug, Clone, PartialEq)]
pub struct FaltaData {
    pub hash: String,
    pub student_id: String,
    pub external_record_id: i64,
    pub infraction_type: InfractionType,
    pub numeral: Option<u32>,
    pub falta_manual: Option<String>,
    pub description: Option<String>,
    pub acciones: Option<String>,
    pub author: String,
    pub fecha: NaiveDate,
    pub trimester: Option<TrimesterRef>,
    pub level: AcademicLevel,
    pub diagnostico: bool,
    pub external_added_at: i64,
    pub external_edited_at: i64,
}

/// One of up to three required check-ins for a moderada falta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seguimiento {
    pub id: String,
    pub falta_hash: String,
    /// Always 1, 2 or 3; uniqueness per falta is enforced at the API layer.
    pub number: u8,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub author: String,
    pub created_at: String,
}

/// Request body for recording a follow-up on a falta.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSeguimientoRequest {
    pub number: u8,
    pub date: NaiveDate,
    #[serde(default)]
    pub details: Option<String>,
    pub author: String,
}
