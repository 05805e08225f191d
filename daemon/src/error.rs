//! Error kinds shared across the agent

use std::io;
use std::path::PathBuf;

use crate::agent::AgentState;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageInitError {
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot open event store {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("event store {path} is not writable")]
    ReadOnly { path: PathBuf },

    #[error("cannot create events schema: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("events table has unexpected columns: {found:?}")]
    SchemaMismatch { found: Vec<String> },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageWriteError {
    #[error("event store is closed")]
    Closed,

    #[error("failed to append event: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageReadError {
    #[error("event store is closed")]
    Closed,

    #[error("failed to query events: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Per-process failure while sampling. Filtered out inside the collector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessAccessError {
    #[error("process {0} no longer exists")]
    Vanished(u32),

    #[error("access denied to process {0}")]
    AccessDenied(u32),

    #[error("unreadable proc entry for process {0}")]
    Malformed(u32),
}

impl ProcessAccessError {
    pub fn from_io(pid: u32, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::AccessDenied(pid),
            io::ErrorKind::NotFound => Self::Vanished(pid),
            // ESRCH surfaces when the task exits between open and read
            _ if err.raw_os_error() == Some(libc::ESRCH) => Self::Vanished(pid),
            _ => Self::Malformed(pid),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("cannot enumerate processes under {path}: {source}")]
    ProcUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("process sampling failed: {0}")]
    Collector(#[from] CollectorError),

    #[error(transparent)]
    Storage(#[from] StorageWriteError),

    #[error("agent cannot start from state {0:?}")]
    AlreadyStarted(AgentState),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_io_errors_to_access_kinds() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let gone = io::Error::from(io::ErrorKind::NotFound);
        let esrch = io::Error::from_raw_os_error(libc::ESRCH);
        let other = io::Error::from(io::ErrorKind::InvalidData);

        assert_eq!(ProcessAccessError::from_io(7, &denied), ProcessAccessError::AccessDenied(7));
        assert_eq!(ProcessAccessError::from_io(7, &gone), ProcessAccessError::Vanished(7));
        assert_eq!(ProcessAccessError::from_io(7, &esrch), ProcessAccessError::Vanished(7));
        assert_eq!(ProcessAccessError::from_io(7, &other), ProcessAccessError::Malformed(7));
    }
}
