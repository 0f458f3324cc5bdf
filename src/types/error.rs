use thiserror::Error;

use crate::types::Offset;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Invalid {field} timestamp: {value}")]
    InvalidTimestamp { field: &'static str, value: i64 },

    #[error("Unexpected end of buffer at byte offset {offset} (needed {needed} bytes)")]
    UnexpectedEndOfBuffer { offset: usize, needed: usize },

    #[error("Unexpected type 0x{found:04x} at byte offset {offset}, expected {expected}")]
    TypeMismatch {
        offset: usize,
        expected: String,
        found: u16,
    },

    #[error("Structure and entry tuple type mismatch: {details}")]
    StructureMismatch { details: String },

    #[error("Structure '{name}' does not exist")]
    StructureNotFound { name: String },

    #[error("Entry '{entry}' does not exist in structure '{structure}'")]
    EntryNotFound { structure: String, entry: String },

    #[error("Invalid length {length} at byte offset {offset}")]
    InvalidLength { offset: usize, length: i64 },

    #[error("Index offset at byte {offset} points outside the buffer (target {target})")]
    InvalidOffset { offset: usize, target: i64 },

    #[error("Offset {offset} does not fit in 32 bits; enable wide offsets")]
    OffsetOverflow { offset: Offset },

    #[error("Structure '{name}' already exists")]
    DuplicateKey { name: String },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DatabaseError::StructureNotFound { .. } | DatabaseError::EntryNotFound { .. }
        )
    }

    pub(crate) fn mismatch(details: impl Into<String>) -> Self {
        DatabaseError::StructureMismatch {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
