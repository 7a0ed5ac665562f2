//! Database module for votekeeper
//!
//! Provides persistence for applications and their vote tallies.

mod schema;

pub use schema::*;

use crate::tally::VoteTally;
use crate::transport::MessageRef;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Application not found: {0}")]
    ApplicationNotFound(String),
    #[error("Failed to encode tally: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

const APPLICATION_COLUMNS: &str =
    "id, applicant, summary, status, surface_id, message_id, tally, created_at, updated_at";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Application Operations ====================

    /// Insert a new awaiting application bound to `message_ref`.
    /// Applications are normally created by the submission flow.
    #[allow(dead_code)] // Used in tests
    pub fn create_application(
        &self,
        id: &str,
        applicant: &str,
        summary: &str,
        message_ref: &MessageRef,
    ) -> DbResult<Application> {
        let conn = self.conn();
        let now = Utc::now();
        let tally = VoteTally::default();
        let tally_json = serde_json::to_string(&tally)?;

        conn.execute(
            "INSERT INTO applications (id, applicant, summary, status, surface_id, message_id, tally, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                id,
                applicant,
                summary,
                ApplicationStatus::Awaiting.to_string(),
                message_ref.surface_id.as_str(),
                message_ref.message_id.as_str(),
                tally_json,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Application {
            id: id.to_string(),
            applicant: applicant.to_string(),
            summary: summary.to_string(),
            status: ApplicationStatus::Awaiting,
            message_ref: message_ref.clone(),
            tally,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get application by ID
    #[allow(dead_code)] // Used in tests
    pub fn get_application(&self, id: &str) -> DbResult<Application> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"
        ))?;

        stmt.query_row(params![id], parse_application_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::ApplicationNotFound(id.to_string()),
                other => DbError::Sqlite(other),
            })
    }

    /// Find the application whose vote message is `message_ref`
    pub fn find_by_message_ref(&self, message_ref: &MessageRef) -> DbResult<Option<Application>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE surface_id = ?1 AND message_id = ?2"
        ))?;

        let app = stmt
            .query_row(
                params![message_ref.surface_id.as_str(), message_ref.message_id.as_str()],
                parse_application_row,
            )
            .optional()?;
        Ok(app)
    }

    /// List all applications in creation order
    pub fn list_applications(&self) -> DbResult<Vec<Application>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications ORDER BY created_at ASC, id ASC"
        ))?;

        let rows = stmt.query_map([], parse_application_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Persist the fields this service owns: message binding and tally.
    /// Status is left untouched.
    pub fn save_application(&self, app: &Application) -> DbResult<()> {
        let conn = self.conn();
        let now = Utc::now();
        let tally_json = serde_json::to_string(&app.tally)?;

        let updated = conn.execute(
            "UPDATE applications SET surface_id = ?1, message_id = ?2, tally = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                app.message_ref.surface_id.as_str(),
                app.message_ref.message_id.as_str(),
                tally_json,
                now.to_rfc3339(),
                app.id,
            ],
        )?;

        if updated == 0 {
            return Err(DbError::ApplicationNotFound(app.id.clone()));
        }
        Ok(())
    }

    /// Record a decision (owned by the external review flow)
    #[allow(dead_code)] // Used in tests
    pub fn set_status(&self, id: &str, status: ApplicationStatus) -> DbResult<()> {
        let conn = self.conn();
        let now = Utc::now();

        let updated = conn.execute(
            "UPDATE applications SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.to_string(), now.to_rfc3339(), id],
        )?;

        if updated == 0 {
            return Err(DbError::ApplicationNotFound(id.to_string()));
        }
        Ok(())
    }
}

fn conversion_error(
    column: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, err.into())
}

fn parse_application_row(row: &Row<'_>) -> rusqlite::Result<Application> {
    let status: String = row.get(3)?;
    let status = status
        .parse::<ApplicationStatus>()
        .map_err(|e| conversion_error(3, e))?;

    let tally_json: String = row.get(6)?;
    let tally: VoteTally = serde_json::from_str(&tally_json).map_err(|e| conversion_error(6, e))?;

    Ok(Application {
        id: row.get(0)?,
        applicant: row.get(1)?,
        summary: row.get(2)?,
        status,
        message_ref: MessageRef::new(row.get::<_, String>(4)?, row.get::<_, String>(5)?),
        tally,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
