use std::{
    fs,
    path::PathBuf,
    process,
    sync::atomic::{AtomicUsize, Ordering},
};

use tempfile::env::temp_dir;

use crate::{
    storage::{
        database::Database,
        header::now_millis,
        options::DatabaseOptions,
        schema::{FieldOverload, Schema},
    },
    types::{entry::Entry, error::Result, wire::WireType},
};

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn create_temp_db_path() -> PathBuf {
    create_temp_db_path_with_prefix("interstellar_test")
}

pub fn create_temp_db_path_with_prefix(prefix: &str) -> PathBuf {
    let mut temp_path = temp_dir();
    temp_path.push(format!(
        "{}_{}_{}_{}.bin",
        prefix,
        process::id(),
        now_millis(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    temp_path
}

/// A database file in the temp directory, removed on drop.
pub struct TempDatabase {
    pub path: PathBuf,
    pub database: Option<Database>,
}

impl TempDatabase {
    pub fn new() -> Self {
        Self {
            path: create_temp_db_path(),
            database: None,
        }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            path: create_temp_db_path_with_prefix(prefix),
            database: None,
        }
    }

    pub fn open_database(&mut self, options: DatabaseOptions) -> Result<&mut Database> {
        Ok(self.database.insert(Database::open(&self.path, options)?))
    }

    pub fn get_database(&mut self) -> Option<&mut Database> {
        self.database.as_mut()
    }
}

impl Default for TempDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        self.database = None;
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// `test`: a single field `test` accepting BOOL or NULL.
pub fn simple_schema() -> Schema {
    Schema::new().field("test", FieldOverload::basic(WireType::Bool | WireType::Null))
}

/// `test02`: `ID` INTEGER, `name` STRING | WSTRING and `name_history`, an
/// array of STRING | WSTRING.
pub fn user_schema() -> Schema {
    let text = WireType::String | WireType::WString;
    Schema::new()
        .field("ID", FieldOverload::basic(WireType::Integer))
        .field("name", FieldOverload::basic(text))
        .field("name_history", FieldOverload::array_of(FieldOverload::basic(text)))
}

pub fn user_entry(id: i32, name: &str, history: &[&str]) -> Entry {
    Entry::new()
        .with("ID", id)
        .with("name", name)
        .with("name_history", history.to_vec())
}

/// The two-structure database used throughout the tests: `test` with one
/// null entry and `test02` with three users.
pub fn complex_database(options: DatabaseOptions) -> Result<Database> {
    let mut database = Database::create(options);

    database.insert_structure("test", simple_schema())?;
    database.insert_entry("test", "entry", Entry::new().with("test", None::<bool>))?;

    database.insert_structure("test02", user_schema())?;
    database.insert_entry("test02", "entry01", user_entry(1, "test_user", &["old_test_user"]))?;
    database.insert_entry(
        "test02",
        "entry02",
        user_entry(2, "test_user02", &["old_test_user02", "test"]),
    )?;
    database.insert_entry("test02", "user", user_entry(3, "Silvia", &["Sjoerd"]))?;

    Ok(database)
}

/// [`complex_database`] serialized with the given addressing mode.
pub fn complex_bytes(wide_offsets: bool) -> Result<Vec<u8>> {
    complex_database(DatabaseOptions::new().wide_offsets(wide_offsets))?.to_bytes()
}
