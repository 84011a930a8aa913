//! School-year, trimester and student models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical academic level. Students and sync configurations are matched
/// on this value, never on raw grade labels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AcademicLevel {
    Preescolar,
    Primaria,
    Secundaria,
    Media,
    /// Fallback when no classification rule matches a grade label.
    SinNivel,
}

impl AcademicLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcademicLevel::Preescolar => "preescolar",
            AcademicLevel::Primaria => "primaria",
            AcademicLevel::Secundaria => "secundaria",
            AcademicLevel::Media => "media",
            AcademicLevel::SinNivel => "sin_nivel",
        }
    }

    /// Parse a stored tag or a user-facing label ("Preescolar", "media").
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "preescolar" => Some(AcademicLevel::Preescolar),
            "primaria" => Some(AcademicLevel::Primaria),
            "secundaria" => Some(AcademicLevel::Secundaria),
            "media" => Some(AcademicLevel::Media),
            "sin_nivel" => Some(AcademicLevel::SinNivel),
            _ => None,
        }
    }
}

/// One academic year. Exactly one row is expected to be active at a time;
/// that invariant is maintained by the administrative tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolYear {
    pub id: String,
    pub name: String,
    pub active: bool,
}

/// A school-year-scoped date range used for period-based reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trimester {
    pub id: String,
    pub school_year_id: String,
    pub name: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

/// Reference to a resolved trimester, carried on each falta.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrimesterRef {
    pub id: String,
    pub name: String,
}

/// Local projection of a student, populated by a separate import path.
///
/// `external_code` is the student's identifier on the Phidias platform and
/// is stable and unique within a school year.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub school_year_id: String,
    pub external_code: String,
    pub display_name: String,
    pub grade: String,
    pub section: String,
}
