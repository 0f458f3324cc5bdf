use chrono::{DateTime, Utc};

use crate::{
    storage::{cursor::BinaryCursor, writer::BinaryWriter},
    types::{
        FORMAT_VERSION, MAGIC, MAX_TIMESTAMP, Timestamp,
        error::{DatabaseError, Result},
    },
};

/*
 * Header Layout on Disk (25 bytes, big-endian, untagged)
 * ┌──────────────┬──────────────┬─────────┬────────────────┬────────────────┐
 * │ magic (4)    │ version (4)  │ wide(1) │ created_ms (8) │ updated_ms (8) │
 * └──────────────┴──────────────┴─────────┴────────────────┴────────────────┘
 */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterstellarHeader {
    pub format_version: i32,
    pub wide_offsets: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

impl InterstellarHeader {
    /// Header for a database that has never been persisted.
    pub fn new(wide_offsets: bool) -> Self {
        let now = now_millis();
        Self {
            format_version: FORMAT_VERSION,
            wide_offsets,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn parse(cursor: &mut BinaryCursor) -> Result<Self> {
        cursor.attempt(|cursor| {
            let magic = cursor.read_integer()?;
            if magic != MAGIC {
                return Err(DatabaseError::InvalidFormat {
                    reason: format!("Invalid magic number {}", magic),
                });
            }

            let format_version = cursor.read_integer()?;
            if !(1..=FORMAT_VERSION).contains(&format_version) {
                return Err(DatabaseError::InvalidFormat {
                    reason: format!("Unsupported format version: {}", format_version),
                });
            }

            let wide_offsets = cursor.read_bool()?;
            let created_at = validate_timestamp("creation", cursor.read_long()?)?;
            let updated_at = validate_timestamp("last update", cursor.read_long()?)?;

            Ok(Self {
                format_version,
                wide_offsets,
                created_at,
                updated_at,
            })
        })
    }

    /// Writes a header stamped with the current format version and `now` as
    /// the update time, returning the update time that was written.
    pub fn serialize(
        writer: &mut BinaryWriter,
        wide_offsets: bool,
        created_at: Timestamp,
    ) -> Result<Timestamp> {
        let created_at = validate_timestamp("creation", created_at)?;
        let updated_at = now_millis();

        writer.write_integer(MAGIC);
        writer.write_integer(FORMAT_VERSION);
        writer.write_bool(wide_offsets);
        writer.write_long(created_at);
        writer.write_long(updated_at);

        Ok(updated_at)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.updated_at)
    }
}

fn validate_timestamp(field: &'static str, value: i64) -> Result<Timestamp> {
    if (0..MAX_TIMESTAMP).contains(&value) {
        Ok(value)
    } else {
        Err(DatabaseError::InvalidTimestamp { field, value })
    }
}
