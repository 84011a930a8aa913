//! Maps one Phidias poll record onto the canonical falta shape.
//!
//! Answer extraction is a small ordered rule table matched by
//! case-insensitive substring on the answer name; the first match wins and
//! a missing answer is tolerated per field. Keeping the rules in one table
//! makes the fallback behavior testable in isolation.

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};

use crate::classify::extract_numeral;
use crate::models::{AcademicLevel, FaltaData, InfractionType, Student, Trimester};
use crate::phidias::{ExternalRecord, PollAnswer};
use crate::terms::resolve_trimester;

/// Fields the rule table can populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnswerField {
    Fecha,
    FaltaManual,
    Descripcion,
    Acciones,
    Diagnostico,
}

/// Ordered (needle, field) rules applied to normalized answer names.
const ANSWER_RULES: &[(&str, AnswerField)] = &[
    ("fecha", AnswerField::Fecha),
    ("falta segun manual", AnswerField::FaltaManual),
    ("falta según manual", AnswerField::FaltaManual),
    ("descripcion", AnswerField::Descripcion),
    ("descripción", AnswerField::Descripcion),
    ("acciones", AnswerField::Acciones),
    ("diagnostico", AnswerField::Diagnostico),
    ("diagnóstico", AnswerField::Diagnostico),
];

/// First answer whose name matches the given field, or `None`.
fn find_answer<'a>(answers: &'a [PollAnswer], field: AnswerField) -> Option<&'a PollAnswer> {
    answers.iter().find(|a| {
        let name = a.name.to_lowercase();
        ANSWER_RULES
            .iter()
            .any(|(needle, f)| *f == field && name.contains(needle))
    })
}

fn find_text(answers: &[PollAnswer], field: AnswerField) -> Option<String> {
    find_answer(answers, field)
        .and_then(|a| a.value.as_text())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Deterministic identity for a falta, derived from the Phidias record id.
/// Re-processing the same record always lands on the same row.
pub fn falta_hash(external_record_id: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("phidias-falta:{}", external_record_id).as_bytes());
    hex::encode(hasher.finalize())
}

/// Transform one external record into [`FaltaData`].
///
/// Pure: touches no persistence. The trimester is resolved against the
/// supplied term list and `None` (a date in a gap) is propagated as-is.
pub fn map_to_falta(
    record: &ExternalRecord,
    student: &Student,
    trimesters: &[Trimester],
    infraction_type: InfractionType,
    level: AcademicLevel,
) -> FaltaData {
    let fecha = find_answer(&record.answers, AnswerField::Fecha)
        .and_then(|a| a.value.as_number())
        .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch as i64, 0))
        .map(|dt| dt.date_naive())
        // Documented fallback: records without a fecha answer are dated today.
        .unwrap_or_else(today);

    let falta_manual = find_text(&record.answers, AnswerField::FaltaManual);
    let numeral = falta_manual.as_deref().and_then(extract_numeral);

    let diagnostico = find_text(&record.answers, AnswerField::Diagnostico)
        .map(|s| matches!(s.to_lowercase().as_str(), "si" | "sí" | "yes"))
        .unwrap_or(false);

    FaltaData {
        hash: falta_hash(record.id),
        student_id: student.id.clone(),
        external_record_id: record.id,
        infraction_type,
        numeral,
        falta_manual,
        description: find_text(&record.answers, AnswerField::Descripcion),
        acciones: find_text(&record.answers, AnswerField::Acciones),
        author: record.author(),
        fecha,
        trimester: resolve_trimester(fecha, trimesters),
        level,
        diagnostico,
        external_added_at: record.added,
        external_edited_at: record.edited,
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
