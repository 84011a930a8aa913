//! Academic-level classification and numeral extraction.
//!
//! Grade labels arrive as free text from the student import ("Décimo A",
//! "Kínder 5 B") and have to be mapped onto the four canonical levels that
//! sync configurations are keyed by. Matching is an ordered keyword table
//! over a normalized label; unknown labels fall back to a sentinel instead
//! of failing.

use crate::models::{AcademicLevel, Student};

/// Ordered (keywords, level) rules. First rule with a matching keyword wins.
const LEVEL_RULES: &[(&[&str], AcademicLevel)] = &[
    (
        &[
            "prejardin",
            "pre-jardin",
            "jardin",
            "kinder",
            "parvulos",
            "transicion",
            "preescolar",
        ],
        AcademicLevel::Preescolar,
    ),
    (&["decimo", "undecimo", "once"], AcademicLevel::Media),
    (
        &["sexto", "septimo", "octavo", "noveno", "secundaria"],
        AcademicLevel::Secundaria,
    ),
    (
        &["primero", "segundo", "tercero", "cuarto", "quinto", "primaria"],
        AcademicLevel::Primaria,
    ),
];

/// Map a raw grade label to its canonical academic level.
///
/// Never fails: unrecognized labels classify as [`AcademicLevel::SinNivel`].
pub fn classify_level(grade_label: &str) -> AcademicLevel {
    let normalized = normalize(grade_label);
    for (keywords, level) in LEVEL_RULES {
        if keywords.iter().any(|k| normalized.contains(k)) {
            return *level;
        }
    }
    AcademicLevel::SinNivel
}

/// Level for a student, with the section-label override: when the import
/// already stored a canonical level name in the section field it is used
/// directly, otherwise the grade label is classified.
pub fn student_level(student: &Student) -> AcademicLevel {
    if let Some(level) = AcademicLevel::from_str(&student.section) {
        return level;
    }
    classify_level(&student.grade)
}

/// Extract the infraction sequence number from administrative free text,
/// e.g. `"Numeral 12 - Irrespeto a compañeros"` yields `Some(12)`.
///
/// Takes the first contiguous digit run, tolerating any severity-code
/// prefix before it. Returns `None` when no number is present or the run
/// does not fit a `u32`.
pub fn extract_numeral(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Lowercase and strip the Spanish diacritics that appear in grade labels.
fn normalize(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' => 'u',
            'ü' => 'u',
            'ñ' => 'n',
            _ => c,
        })
        .collect()
}
