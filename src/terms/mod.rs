//! Trimester resolution and the follow-up date schedule.

use chrono::{Duration, NaiveDate};

use crate::models::{Trimester, TrimesterRef};

/// Find the trimester whose inclusive [starts_on, ends_on] range contains
/// `date`. Gaps between trimesters are expected: `None` is a normal
/// outcome, not an error. Should ranges ever overlap due to misconfigured
/// term data, the first match in storage order wins.
pub fn resolve_trimester(date: NaiveDate, trimesters: &[Trimester]) -> Option<TrimesterRef> {
    trimesters
        .iter()
        .find(|t| t.starts_on <= date && date <= t.ends_on)
        .map(|t| TrimesterRef {
            id: t.id.clone(),
            name: t.name.clone(),
        })
}

/// Expected dates for the three follow-ups of a moderada falta: 30, 60 and
/// 90 days after the infraction date.
pub fn seguimiento_schedule(fecha: NaiveDate) -> [NaiveDate; 3] {
    [
        fecha + Duration::days(30),
        fecha + Duration::days(60),
        fecha + Duration::days(90),
    ]
}
