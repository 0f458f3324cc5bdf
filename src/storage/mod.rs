pub mod codec;
pub mod cursor;
pub mod database;
pub mod header;
pub mod index;
pub mod options;
pub mod schema;
pub mod writer;
