//! Idempotent upsert of mapped faltas.

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::FaltaData;

/// What the reconciliation did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    /// Stored copy is as new or newer; re-sync is a no-op, not a duplicate.
    Unchanged,
}

/// Create or update the falta identified by `data.hash`.
///
/// An existing row is only rewritten when the external last-edit timestamp
/// is strictly newer than the stored one. The local `attended` flag is
/// owned by the UI and survives updates untouched.
pub async fn reconcile(repo: &Repository, data: &FaltaData) -> Result<ReconcileOutcome, AppError> {
    match repo.find_falta_by_hash(&data.hash).await? {
        None => {
            repo.insert_falta(data).await?;
            tracing::debug!(hash = %data.hash, "Created falta");
            Ok(ReconcileOutcome::Created)
        }
        Some(existing) => {
            if data.external_edited_at > existing.external_edited_at {
                repo.update_falta(data).await?;
                tracing::debug!(hash = %data.hash, "Updated falta from newer edit");
                Ok(ReconcileOutcome::Updated)
            } else {
                Ok(ReconcileOutcome::Unchanged)
            }
        }
    }
}
