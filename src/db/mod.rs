// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Database module for analysis records

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::{EmotiscopeError, Result};

/// SQLite `CURRENT_TIMESTAMP` layout
const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Database manager for Emotiscope (thread-safe wrapper)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// One completed emotion analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub user_name: String,
    pub image_filename: String,
    pub analysis_result: String,
    pub timestamp: DateTime<Utc>,
}

impl Database {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    pub(crate) fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EmotiscopeError::DatabaseUnavailable("connection lock poisoned".to_string()))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_name TEXT,
                image_filename TEXT NOT NULL,
                analysis_result TEXT NOT NULL,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            );
        "#)?;
        Ok(())
    }

    /// Append an analysis record, returning the id SQLite assigned to it
    pub fn insert_analysis(
        &self,
        user_name: &str,
        image_filename: &str,
        analysis_result: &str,
    ) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO analyses (user_name, image_filename, analysis_result) VALUES (?1, ?2, ?3)",
            params![user_name, image_filename, analysis_result],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All analyses, newest first. Rows sharing a timestamp come out highest id first.
    pub fn list_analyses(&self) -> Result<Vec<AnalysisRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, user_name, image_filename, analysis_result, timestamp
               FROM analyses ORDER BY timestamp DESC, id DESC"#
        )?;

        let records = stmt.query_map([], |row| {
            let user_name: Option<String> = row.get(1)?;
            let timestamp: String = row.get(4)?;
            Ok(AnalysisRecord {
                id: row.get(0)?,
                user_name: user_name.unwrap_or_default(),
                image_filename: row.get(2)?,
                analysis_result: row.get(3)?,
                timestamp: parse_timestamp(&timestamp),
            })
        })?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn get_analysis_count(&self) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT COUNT(*) FROM analyses", [], |row| row.get(0))
            .map_err(Into::into)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, SQLITE_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_else(|_| {
            tracing::warn!("Unparseable analysis timestamp: {}", raw);
            DateTime::<Utc>::default()
        })
}
