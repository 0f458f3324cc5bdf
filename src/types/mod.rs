pub mod entry;
pub mod error;
pub mod value;
pub mod wire;

// Common type aliases
pub type Offset = u64;
pub type Timestamp = i64;

// File layout constants
pub const MAGIC: i32 = 299_792_458; // speed of light, in m/s
pub const FORMAT_VERSION: i32 = 1;
pub const HEADER_SIZE: usize = 25; // magic(4) + version(4) + wide(1) + created(8) + updated(8)
pub const MAX_TIMESTAMP: Timestamp = 1 << 53; // exclusive

pub const TAG_SIZE: usize = 2;
pub const LENGTH_SIZE: usize = 4;
pub const NARROW_OFFSET_SIZE: usize = 4;
pub const WIDE_OFFSET_SIZE: usize = 8;
