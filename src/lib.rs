//! Reader and writer for the interstellar database file format: schema
//! validated records grouped into named structures, addressed through a
//! two-level offset index and decoded lazily.

pub mod storage;
pub mod types;
pub mod utils;

pub use storage::{
    database::Database,
    options::{DatabaseOptions, TypePriority},
    schema::{AlternativeShape, FieldOverload, Schema},
};
pub use types::{
    entry::Entry,
    error::{DatabaseError, Result},
    value::{IndexKey, Value},
    wire::{TypeSet, WireType},
};
