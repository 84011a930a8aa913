//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all application data.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Create tables if they don't exist
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS school_years (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trimesters (
            id TEXT PRIMARY KEY,
            school_year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            starts_on TEXT NOT NULL,
            ends_on TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            id TEXT PRIMARY KEY,
            school_year_id TEXT NOT NULL,
            external_code TEXT NOT NULL,
            display_name TEXT NOT NULL,
            grade TEXT NOT NULL,
            section TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seguimiento_configs (
            id TEXT PRIMARY KEY,
            poll_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            infraction_type TEXT NOT NULL,
            level TEXT NOT NULL,
            school_year_id TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS faltas (
            hash TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            external_record_id INTEGER NOT NULL,
            infraction_type TEXT NOT NULL,
            numeral INTEGER,
            falta_manual TEXT,
            description TEXT,
            acciones TEXT,
            author TEXT NOT NULL,
            fecha TEXT NOT NULL,
            trimester_id TEXT,
            trimester_name TEXT,
            level TEXT NOT NULL,
            diagnostico INTEGER NOT NULL DEFAULT 0,
            external_added_at INTEGER NOT NULL,
            external_edited_at INTEGER NOT NULL,
            attended INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seguimientos (
            id TEXT PRIMARY KEY,
            falta_hash TEXT NOT NULL,
            number INTEGER NOT NULL CHECK (number BETWEEN 1 AND 3),
            date TEXT NOT NULL,
            details TEXT,
            author TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (falta_hash, number)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_runs (
            id TEXT PRIMARY KEY,
            run_type TEXT NOT NULL,
            status TEXT NOT NULL,
            students_processed INTEGER NOT NULL DEFAULT 0,
            created_count INTEGER NOT NULL DEFAULT 0,
            updated_count INTEGER NOT NULL DEFAULT 0,
            errors TEXT,
            triggered_by TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            duration_ms INTEGER
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_students_year_code ON students(school_year_id, external_code);
        CREATE INDEX IF NOT EXISTS idx_trimesters_year ON trimesters(school_year_id);
        CREATE INDEX IF NOT EXISTS idx_configs_year ON seguimiento_configs(school_year_id, active);
        CREATE INDEX IF NOT EXISTS idx_faltas_student ON faltas(student_id);
        CREATE INDEX IF NOT EXISTS idx_faltas_type ON faltas(infraction_type);
        CREATE INDEX IF NOT EXISTS idx_seguimientos_falta ON seguimientos(falta_hash);
        CREATE INDEX IF NOT EXISTS idx_sync_runs_started ON sync_runs(started_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
