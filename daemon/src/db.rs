//! SQLite event store

use rusqlite::{params, Connection, DatabaseName};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{StorageInitError, StorageReadError, StorageWriteError};
use crate::event::{Event, EventRecord};

const EVENT_COLUMNS: [&str; 6] = ["id", "timestamp", "type", "severity", "description", "source"];

/// Append-only sink for security events.
pub trait EventStore {
    /// Persist one event and return its id. The row is visible to readers on return.
    fn append(&mut self, event: &Event) -> Result<i64, StorageWriteError>;

    /// Release the backing connection. Safe to call more than once.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

pub struct Database {
    conn: Option<Connection>,
}

impl Database {
    /// Open or create the store at `path`, creating parent directories and the
    /// `events` table as needed.
    pub fn open(path: &Path) -> Result<Self, StorageInitError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageInitError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(|source| StorageInitError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::ensure_writable(&conn, path)?;
        Self::init_schema(&conn)?;
        debug!("Event store ready at {:?}", path);
        Ok(Self { conn: Some(conn) })
    }

    /// SQLite silently falls back to read-only when the file is not writable.
    fn ensure_writable(conn: &Connection, path: &Path) -> Result<(), StorageInitError> {
        let read_only = conn
            .is_readonly(DatabaseName::Main)
            .map_err(|source| StorageInitError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        if read_only {
            return Err(StorageInitError::ReadOnly {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn init_schema(conn: &Connection) -> Result<(), StorageInitError> {
        conn.execute_batch(include_str!("../schema.sql"))
            .map_err(StorageInitError::Schema)?;

        let mut stmt = conn
            .prepare("SELECT name FROM pragma_table_info('events') ORDER BY cid")
            .map_err(StorageInitError::Schema)?;
        let found = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(StorageInitError::Schema)?;

        if found != EVENT_COLUMNS {
            return Err(StorageInitError::SchemaMismatch { found });
        }
        Ok(())
    }

    fn reader(&self) -> Result<&Connection, StorageReadError> {
        self.conn.as_ref().ok_or(StorageReadError::Closed)
    }

    /// Newest first.
    pub fn recent_events(&self, limit: u32) -> Result<Vec<EventRecord>, StorageReadError> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, type, severity, description, source
             FROM events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], Self::map_event)?;
        let events = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    pub fn count_events(&self) -> Result<u64, StorageReadError> {
        let count: i64 = self
            .reader()?
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn map_event(row: &rusqlite::Row) -> rusqlite::Result<EventRecord> {
        Ok(EventRecord {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            event_type: row.get(2)?,
            severity: row.get(3)?,
            description: row.get(4)?,
            source: row.get(5)?,
        })
    }
}

impl EventStore for Database {
    fn append(&mut self, event: &Event) -> Result<i64, StorageWriteError> {
        let conn = self.conn.as_ref().ok_or(StorageWriteError::Closed)?;
        conn.execute(
            "INSERT INTO events (timestamp, type, severity, description, source) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.timestamp_text(),
                event.event_type,
                event.severity.as_str(),
                event.description,
                event.source
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                warn!("Event store did not close cleanly: {}", e);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }
}
