//! Case derivation: the read-side lifecycle view over moderada faltas.
//!
//! Pure and synchronous; operates on in-memory snapshots and is safe to
//! call while a sync run is writing, since it never touches the stores.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::classify::student_level;
use crate::models::{AcademicLevel, Caso, Falta, InfractionType, Seguimiento, Student};
use crate::terms::seguimiento_schedule;

const REQUIRED_SEGUIMIENTOS: u8 = 3;

/// Derive the case view for every moderada falta.
///
/// `level_filter` narrows by the student's canonical level. A falta whose
/// student is missing from `students` still yields a case, with placeholder
/// identity fields; that mismatch is logged, never raised.
pub fn derive_casos(
    faltas: &[Falta],
    seguimientos: &[Seguimiento],
    students: &[Student],
    level_filter: Option<AcademicLevel>,
    today: NaiveDate,
) -> Vec<Caso> {
    let students_by_id: HashMap<&str, &Student> =
        students.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut seguimientos_by_falta: HashMap<&str, Vec<&Seguimiento>> = HashMap::new();
    for s in seguimientos {
        seguimientos_by_falta
            .entry(s.falta_hash.as_str())
            .or_default()
            .push(s);
    }

    let mut casos: Vec<Caso> = Vec::new();
    for falta in faltas {
        // The three-step follow-up policy applies to moderada only.
        if falta.infraction_type != InfractionType::Moderada {
            continue;
        }

        let student = students_by_id.get(falta.student_id.as_str()).copied();
        if let Some(filter) = level_filter {
            let level = student.map(student_level).unwrap_or(falta.level);
            if level != filter {
                continue;
            }
        }

        let (student_name, section) = match student {
            Some(s) => (s.display_name.clone(), s.section.clone()),
            None => {
                tracing::warn!(
                    falta_hash = %falta.hash,
                    student_id = %falta.student_id,
                    "Falta references unknown student"
                );
                ("Estudiante desconocido".to_string(), "N/A".to_string())
            }
        };

        let present: Vec<u8> = seguimientos_by_falta
            .get(falta.hash.as_str())
            .map(|list| list.iter().map(|s| s.number).collect())
            .unwrap_or_default();

        let completed = (1..=REQUIRED_SEGUIMIENTOS)
            .filter(|n| present.contains(n))
            .count() as u8;
        let pending = REQUIRED_SEGUIMIENTOS - completed;
        let closed = pending == 0;

        let next_number = (1..=REQUIRED_SEGUIMIENTOS).find(|n| !present.contains(n));
        let schedule = seguimiento_schedule(falta.fecha);
        let next_date = next_number.map(|n| schedule[(n - 1) as usize]);
        let overdue = !closed && next_date.map(|d| d < today).unwrap_or(false);

        casos.push(Caso {
            falta_hash: falta.hash.clone(),
            student_id: falta.student_id.clone(),
            student_name,
            section,
            level: student.map(student_level).unwrap_or(falta.level),
            fecha: falta.fecha,
            description: falta.description.clone(),
            numeral: falta.numeral,
            completed_count: completed,
            pending_count: pending,
            closed,
            next_number,
            next_date,
            overdue,
        });
    }

    casos.sort_by(compare_casos);
    casos
}

/// Sort order: open before closed; open cases overdue-first, then by next
/// expected date, then by infraction date; closed cases newest-first.
fn compare_casos(a: &Caso, b: &Caso) -> Ordering {
    match (a.closed, b.closed) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => b.fecha.cmp(&a.fecha),
        (false, false) => b
            .overdue
            .cmp(&a.overdue)
            .then_with(|| a.next_date.cmp(&b.next_date))
            .then_with(|| a.fecha.cmp(&b.fecha)),
    }
}
