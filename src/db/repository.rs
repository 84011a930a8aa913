//! Database repository for all data operations.
//!
//! Uses prepared statements and keeps each operation small so sync-loop
//! failures stay scoped to a single record.

use chrono::{NaiveDate, Utc};
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    AcademicLevel, CreateConfigRequest, CreateSeguimientoRequest, Falta, FaltaData,
    InfractionType, SchoolYear, Seguimiento, SeguimientoConfig, Student, SyncItemError, SyncRun,
    SyncRunStatus, SyncRunType, Trimester, TrimesterRef,
};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== SCHOOL YEAR OPERATIONS ====================

    /// Get the single active school year.
    ///
    /// The one-active-year invariant is maintained by administrative
    /// tooling; this accessor is the only place the engine checks it.
    pub async fn get_active_school_year(&self) -> Result<SchoolYear, AppError> {
        let row = sqlx::query("SELECT id, name, active FROM school_years WHERE active = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(SchoolYear {
                id: row.get("id"),
                name: row.get("name"),
                active: row.get::<i64, _>("active") != 0,
            }),
            None => Err(AppError::NoActiveSchoolYear),
        }
    }

    /// Insert a school year (administrative/import path).
    pub async fn insert_school_year(&self, year: &SchoolYear) -> Result<(), AppError> {
        sqlx::query("INSERT INTO school_years (id, name, active) VALUES (?, ?, ?)")
            .bind(&year.id)
            .bind(&year.name)
            .bind(year.active as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== TRIMESTER OPERATIONS ====================

    /// List trimesters of a school year in storage order.
    pub async fn list_trimesters(&self, school_year_id: &str) -> Result<Vec<Trimester>, AppError> {
        let rows = sqlx::query(
            "SELECT id, school_year_id, name, starts_on, ends_on FROM trimesters WHERE school_year_id = ? ORDER BY starts_on",
        )
        .bind(school_year_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Trimester {
                id: row.get("id"),
                school_year_id: row.get("school_year_id"),
                name: row.get("name"),
                starts_on: row.get("starts_on"),
                ends_on: row.get("ends_on"),
            })
            .collect())
    }

    /// Insert a trimester (administrative/import path).
    pub async fn insert_trimester(&self, trimester: &Trimester) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO trimesters (id, school_year_id, name, starts_on, ends_on) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&trimester.id)
        .bind(&trimester.school_year_id)
        .bind(&trimester.name)
        .bind(trimester.starts_on)
        .bind(trimester.ends_on)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== STUDENT OPERATIONS ====================

    /// List all students of a school year.
    pub async fn list_students(&self, school_year_id: &str) -> Result<Vec<Student>, AppError> {
        let rows = sqlx::query(
            "SELECT id, school_year_id, external_code, display_name, grade, section FROM students WHERE school_year_id = ? ORDER BY display_name",
        )
        .bind(school_year_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| student_from_row(&row)).collect())
    }

    /// Insert a student (populated by the separate import path).
    pub async fn insert_student(&self, student: &Student) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO students (id, school_year_id, external_code, display_name, grade, section) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&student.id)
        .bind(&student.school_year_id)
        .bind(&student.external_code)
        .bind(&student.display_name)
        .bind(&student.grade)
        .bind(&student.section)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== SYNC CONFIG OPERATIONS ====================

    /// List all configs of a school year, active or not.
    pub async fn list_configs(
        &self,
        school_year_id: &str,
    ) -> Result<Vec<SeguimientoConfig>, AppError> {
        let rows = sqlx::query(
            "SELECT id, poll_id, name, infraction_type, level, school_year_id, active FROM seguimiento_configs WHERE school_year_id = ? ORDER BY name",
        )
        .bind(school_year_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| config_from_row(&row)).collect())
    }

    /// List active configs of a school year, optionally for a single level.
    pub async fn list_active_configs(
        &self,
        school_year_id: &str,
        level: Option<AcademicLevel>,
    ) -> Result<Vec<SeguimientoConfig>, AppError> {
        let rows = match level {
            Some(level) => {
                sqlx::query(
                    "SELECT id, poll_id, name, infraction_type, level, school_year_id, active FROM seguimiento_configs WHERE school_year_id = ? AND active = 1 AND level = ? ORDER BY name",
                )
                .bind(school_year_id)
                .bind(level.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, poll_id, name, infraction_type, level, school_year_id, active FROM seguimiento_configs WHERE school_year_id = ? AND active = 1 ORDER BY name",
                )
                .bind(school_year_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(|row| config_from_row(&row)).collect())
    }

    /// Create a sync config, rejecting a second active config for the same
    /// (poll id, school year).
    pub async fn create_config(
        &self,
        school_year_id: &str,
        request: &CreateConfigRequest,
    ) -> Result<SeguimientoConfig, AppError> {
        if request.active {
            let existing = sqlx::query(
                "SELECT id FROM seguimiento_configs WHERE school_year_id = ? AND poll_id = ? AND active = 1",
            )
            .bind(school_year_id)
            .bind(request.poll_id)
            .fetch_optional(&self.pool)
            .await?;

            if existing.is_some() {
                return Err(AppError::Conflict(format!(
                    "An active config for poll {} already exists in this school year",
                    request.poll_id
                )));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO seguimiento_configs (id, poll_id, name, infraction_type, level, school_year_id, active) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(request.poll_id)
        .bind(&request.name)
        .bind(request.infraction_type.as_str())
        .bind(request.level.as_str())
        .bind(school_year_id)
        .bind(request.active as i32)
        .execute(&self.pool)
        .await?;

        Ok(SeguimientoConfig {
            id,
            poll_id: request.poll_id,
            name: request.name.clone(),
            infraction_type: request.infraction_type,
            level: request.level,
            school_year_id: school_year_id.to_string(),
            active: request.active,
        })
    }

    // ==================== FALTA OPERATIONS ====================

    /// Find a falta by its stable hash.
    pub async fn find_falta_by_hash(&self, hash: &str) -> Result<Option<Falta>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM faltas WHERE hash = ?",
            FALTA_COLUMNS
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(falta_from_row))
    }

    /// List faltas of one severity.
    pub async fn list_faltas_by_type(
        &self,
        infraction_type: InfractionType,
    ) -> Result<Vec<Falta>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM faltas WHERE infraction_type = ? ORDER BY fecha DESC",
            FALTA_COLUMNS
        ))
        .bind(infraction_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(falta_from_row).collect())
    }

    /// Insert a freshly synced falta.
    pub async fn insert_falta(&self, data: &FaltaData) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO faltas (hash, student_id, external_record_id, infraction_type, numeral, falta_manual, description, acciones, author, fecha, trimester_id, trimester_name, level, diagnostico, external_added_at, external_edited_at, attended, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&data.hash)
        .bind(&data.student_id)
        .bind(data.external_record_id)
        .bind(data.infraction_type.as_str())
        .bind(data.numeral.map(|n| n as i64))
        .bind(&data.falta_manual)
        .bind(&data.description)
        .bind(&data.acciones)
        .bind(&data.author)
        .bind(data.fecha)
        .bind(data.trimester.as_ref().map(|t| t.id.clone()))
        .bind(data.trimester.as_ref().map(|t| t.name.clone()))
        .bind(data.level.as_str())
        .bind(data.diagnostico as i32)
        .bind(data.external_added_at)
        .bind(data.external_edited_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rewrite the sync-owned fields of an existing falta. The local
    /// `attended` flag is deliberately not part of the statement.
    pub async fn update_falta(&self, data: &FaltaData) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE faltas SET student_id = ?, external_record_id = ?, infraction_type = ?, numeral = ?, falta_manual = ?, description = ?, acciones = ?, author = ?, fecha = ?, trimester_id = ?, trimester_name = ?, level = ?, diagnostico = ?, external_added_at = ?, external_edited_at = ?, updated_at = ? WHERE hash = ?",
        )
        .bind(&data.student_id)
        .bind(data.external_record_id)
        .bind(data.infraction_type.as_str())
        .bind(data.numeral.map(|n| n as i64))
        .bind(&data.falta_manual)
        .bind(&data.description)
        .bind(&data.acciones)
        .bind(&data.author)
        .bind(data.fecha)
        .bind(data.trimester.as_ref().map(|t| t.id.clone()))
        .bind(data.trimester.as_ref().map(|t| t.name.clone()))
        .bind(data.level.as_str())
        .bind(data.diagnostico as i32)
        .bind(data.external_added_at)
        .bind(data.external_edited_at)
        .bind(&now)
        .bind(&data.hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Falta {} not found",
                data.hash
            )));
        }
        Ok(())
    }

    /// Mark a falta as attended (UI action, never touched by sync).
    pub async fn set_falta_attended(&self, hash: &str, attended: bool) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE faltas SET attended = ?, updated_at = ? WHERE hash = ?")
            .bind(attended as i32)
            .bind(&now)
            .bind(hash)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Falta {} not found", hash)));
        }
        Ok(())
    }

    // ==================== SEGUIMIENTO OPERATIONS ====================

    /// List every follow-up record, newest faltas first.
    pub async fn list_seguimientos(&self) -> Result<Vec<Seguimiento>, AppError> {
        let rows = sqlx::query(
            "SELECT id, falta_hash, number, date, details, author, created_at FROM seguimientos ORDER BY falta_hash, number",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(seguimiento_from_row).collect())
    }

    /// List follow-ups of one falta.
    pub async fn list_seguimientos_for_falta(
        &self,
        falta_hash: &str,
    ) -> Result<Vec<Seguimiento>, AppError> {
        let rows = sqlx::query(
            "SELECT id, falta_hash, number, date, details, author, created_at FROM seguimientos WHERE falta_hash = ? ORDER BY number",
        )
        .bind(falta_hash)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(seguimiento_from_row).collect())
    }

    /// Record a follow-up for a falta.
    pub async fn insert_seguimiento(
        &self,
        falta_hash: &str,
        request: &CreateSeguimientoRequest,
    ) -> Result<Seguimiento, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO seguimientos (id, falta_hash, number, date, details, author, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(falta_hash)
        .bind(request.number as i64)
        .bind(request.date)
        .bind(&request.details)
        .bind(&request.author)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Seguimiento {
            id,
            falta_hash: falta_hash.to_string(),
            number: request.number,
            date: request.date,
            details: request.details.clone(),
            author: request.author.clone(),
            created_at: now,
        })
    }

    // ==================== SYNC RUN OPERATIONS ====================

    /// Open a new run-audit record with status `running`.
    pub async fn create_sync_run(
        &self,
        run_type: SyncRunType,
        triggered_by: &str,
    ) -> Result<SyncRun, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO sync_runs (id, run_type, status, students_processed, created_count, updated_count, errors, triggered_by, started_at) VALUES (?, ?, ?, 0, 0, 0, '[]', ?, ?)",
        )
        .bind(&id)
        .bind(run_type.as_str())
        .bind(SyncRunStatus::Running.as_str())
        .bind(triggered_by)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(SyncRun {
            id,
            run_type,
            status: SyncRunStatus::Running,
            students_processed: 0,
            created_count: 0,
            updated_count: 0,
            errors: Vec::new(),
            triggered_by: triggered_by.to_string(),
            started_at: now,
            finished_at: None,
            duration_ms: None,
        })
    }

    /// Finalize a run exactly once: status, counts, error list, duration.
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_sync_run(
        &self,
        id: &str,
        status: SyncRunStatus,
        students_processed: i64,
        created_count: i64,
        updated_count: i64,
        errors: &[SyncItemError],
        duration_ms: i64,
    ) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let errors_json = serde_json::to_string(errors)?;

        sqlx::query(
            "UPDATE sync_runs SET status = ?, students_processed = ?, created_count = ?, updated_count = ?, errors = ?, finished_at = ?, duration_ms = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(students_processed)
        .bind(created_count)
        .bind(updated_count)
        .bind(&errors_json)
        .bind(&now)
        .bind(duration_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub async fn list_sync_runs(&self, limit: i64) -> Result<Vec<SyncRun>, AppError> {
        let rows = sqlx::query(
            "SELECT id, run_type, status, students_processed, created_count, updated_count, errors, triggered_by, started_at, finished_at, duration_ms FROM sync_runs ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(sync_run_from_row).collect())
    }
}

const FALTA_COLUMNS: &str = "hash, student_id, external_record_id, infraction_type, numeral, falta_manual, description, acciones, author, fecha, trimester_id, trimester_name, level, diagnostico, external_added_at, external_edited_at, attended, updated_at";

fn student_from_row(row: &sqlx::sqlite::SqliteRow) -> Student {
    Student {
        id: row.get("id"),
        school_year_id: row.get("school_year_id"),
        external_code: row.get("external_code"),
        display_name: row.get("display_name"),
        grade: row.get("grade"),
        section: row.get("section"),
    }
}

fn config_from_row(row: &sqlx::sqlite::SqliteRow) -> SeguimientoConfig {
    SeguimientoConfig {
        id: row.get("id"),
        poll_id: row.get("poll_id"),
        name: row.get("name"),
        infraction_type: InfractionType::from_str(&row.get::<String, _>("infraction_type"))
            .unwrap_or(InfractionType::Leve),
        level: AcademicLevel::from_str(&row.get::<String, _>("level")).unwrap_or(AcademicLevel::SinNivel),
        school_year_id: row.get("school_year_id"),
        active: row.get::<i64, _>("active") != 0,
    }
}

fn falta_from_row(row: &sqlx::sqlite::SqliteRow) -> Falta {
    let trimester = match (
        row.get::<Option<String>, _>("trimester_id"),
        row.get::<Option<String>, _>("trimester_name"),
    ) {
        (Some(id), Some(name)) => Some(TrimesterRef { id, name }),
        _ => None,
    };

    Falta {
        hash: row.get("hash"),
        student_id: row.get("student_id"),
        external_record_id: row.get("external_record_id"),
        infraction_type: InfractionType::from_str(&row.get::<String, _>("infraction_type"))
            .unwrap_or(InfractionType::Leve),
        numeral: row.get::<Option<i64>, _>("numeral").map(|n| n as u32),
        falta_manual: row.get("falta_manual"),
        description: row.get("description"),
        acciones: row.get("acciones"),
        author: row.get("author"),
        fecha: row.get::<NaiveDate, _>("fecha"),
        trimester,
        level: AcademicLevel::from_str(&row.get::<String, _>("level")).unwrap_or(AcademicLevel::SinNivel),
        diagnostico: row.get::<i64, _>("diagnostico") != 0,
        external_added_at: row.get("external_added_at"),
        external_edited_at: row.get("external_edited_at"),
        attended: row.get::<i64, _>("attended") != 0,
        updated_at: row.get("updated_at"),
    }
}

fn seguimiento_from_row(row: &sqlx::sqlite::SqliteRow) -> Seguimiento {
    Seguimiento {
        id: row.get("id"),
        falta_hash: row.get("falta_hash"),
        number: row.get::<i64, _>("number") as u8,
        date: row.get::<NaiveDate, _>("date"),
        details: row.get("details"),
        author: row.get("author"),
        created_at: row.get("created_at"),
    }
}

fn sync_run_from_row(row: &sqlx::sqlite::SqliteRow) -> SyncRun {
    let errors: Vec<SyncItemError> = row
        .get::<Option<String>, _>("errors")
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default();

    SyncRun {
        id: row.get("id"),
        run_type: SyncRunType::from_str(&row.get::<String, _>("run_type")).unwrap_or(SyncRunType::Manual),
        status: SyncRunStatus::from_str(&row.get::<String, _>("status")).unwrap_or(SyncRunStatus::Error),
        students_processed: row.get("students_processed"),
        created_count: row.get("created_count"),
        updated_count: row.get("updated_count"),
        errors,
        triggered_by: row.get("triggered_by"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        duration_ms: row.get("duration_ms"),
    }
}
