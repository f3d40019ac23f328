use thiserror::Error;

use crate::models::DimensionKind;

/// Per-row failures. Every variant makes the batch driver skip the row and
/// move on; only source and connection errors abort a batch.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("failed to resolve {kind} '{key}': {source}")]
    Resolution {
        kind: DimensionKind,
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to write posting (rolled back): {source}")]
    Write {
        #[source]
        source: rusqlite::Error,
    },

    #[error("unreadable record at line {line}: {source}")]
    Record {
        line: u64,
        #[source]
        source: csv::Error,
    },
}

impl RowError {
    pub fn write(source: rusqlite::Error) -> Self {
        RowError::Write { source }
    }
}
