use crate::types::{
    TAG_SIZE,
    error::{DatabaseError, Result},
    value::IndexKey,
    wire::WireType,
};

/// Handle to a saved cursor position. Consumed by [`BinaryCursor::rollback`]
/// or [`BinaryCursor::release`].
#[derive(Debug)]
#[must_use]
pub struct Checkpoint(usize);

/// Big-endian reader over a fixed byte buffer.
///
/// Every structural parse goes through [`BinaryCursor::attempt`], which
/// restores the position on failure so a caller can retry the same bytes
/// against another shape. Checkpoints live on a stack that is popped on both
/// success and failure; it is empty again once a top-level parse returns.
pub struct BinaryCursor<'a> {
    buffer: &'a [u8],
    position: usize,
    checkpoints: Vec<usize>,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            checkpoints: Vec::new(),
        }
    }

    pub fn at(buffer: &'a [u8], position: usize) -> Result<Self> {
        let mut cursor = Self::new(buffer);
        cursor.seek(position)?;
        Ok(cursor)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn has_ended(&self) -> bool {
        self.position >= self.buffer.len()
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.buffer.len() {
            return Err(DatabaseError::UnexpectedEndOfBuffer {
                offset: position,
                needed: 0,
            });
        }
        self.position = position;
        Ok(())
    }

    pub fn skip(&mut self, length: usize) -> Result<()> {
        self.take(length).map(|_| ())
    }

    pub fn mark(&mut self) -> Checkpoint {
        self.checkpoints.push(self.position);
        Checkpoint(self.checkpoints.len() - 1)
    }

    /// Restores the position saved by `checkpoint` and drops it, together
    /// with any checkpoint pushed after it.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        if let Some(&position) = self.checkpoints.get(checkpoint.0) {
            self.position = position;
        }
        self.checkpoints.truncate(checkpoint.0);
    }

    pub fn release(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.truncate(checkpoint.0);
    }

    pub fn checkpoint_depth(&self) -> usize {
        self.checkpoints.len()
    }

    /// Runs `parse`, rolling back to the current position if it fails.
    pub fn attempt<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let checkpoint = self.mark();
        let result = parse(self);
        match &result {
            Ok(_) => self.release(checkpoint),
            Err(_) => self.rollback(checkpoint),
        }
        result
    }

    fn take(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.remaining() {
            return Err(DatabaseError::UnexpectedEndOfBuffer {
                offset: self.position,
                needed: length,
            });
        }
        let bytes = &self.buffer[self.position..self.position + length];
        self.position += length;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn type_mismatch(&self, expected: impl Into<String>, found: u16) -> DatabaseError {
        DatabaseError::TypeMismatch {
            offset: self.position,
            expected: expected.into(),
            found,
        }
    }

    // Tags

    /// Reads the next tag without moving the cursor.
    pub fn peek_tag(&self) -> Result<u16> {
        if self.remaining() < TAG_SIZE {
            return Err(DatabaseError::UnexpectedEndOfBuffer {
                offset: self.position,
                needed: TAG_SIZE,
            });
        }
        Ok(u16::from_be_bytes([
            self.buffer[self.position],
            self.buffer[self.position + 1],
        ]))
    }

    pub fn read_tag(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    /// Consumes the next tag only if it is exactly `expected`.
    pub fn expect_tag(&mut self, expected: WireType) -> Result<()> {
        let found = self.peek_tag()?;
        if found != expected.as_u16() {
            return Err(self.type_mismatch(expected.name(), found));
        }
        self.position += TAG_SIZE;
        Ok(())
    }

    fn tagged<T>(&mut self, expected: WireType, read: fn(&mut Self) -> Result<T>) -> Result<T> {
        self.attempt(|cursor| {
            cursor.expect_tag(expected)?;
            read(cursor)
        })
    }

    // Fixed-width values

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.take_array::<1>()?[0] != 0)
    }

    pub fn read_char(&mut self) -> Result<char> {
        Ok(char::from(self.take_array::<1>()?[0]))
    }

    pub fn read_wchar(&mut self) -> Result<char> {
        let unit = u16::from_be_bytes(self.take_array()?);
        Ok(char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    pub fn read_short(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_integer(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    pub fn read_long(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    pub fn read_tagged_bool(&mut self) -> Result<bool> {
        self.tagged(WireType::Bool, Self::read_bool)
    }

    pub fn read_tagged_char(&mut self) -> Result<char> {
        self.tagged(WireType::Char, Self::read_char)
    }

    pub fn read_tagged_wchar(&mut self) -> Result<char> {
        self.tagged(WireType::WChar, Self::read_wchar)
    }

    pub fn read_tagged_short(&mut self) -> Result<i16> {
        self.tagged(WireType::Short, Self::read_short)
    }

    pub fn read_tagged_integer(&mut self) -> Result<i32> {
        self.tagged(WireType::Integer, Self::read_integer)
    }

    pub fn read_tagged_float(&mut self) -> Result<f32> {
        self.tagged(WireType::Float, Self::read_float)
    }

    pub fn read_tagged_long(&mut self) -> Result<i64> {
        self.tagged(WireType::Long, Self::read_long)
    }

    pub fn read_tagged_double(&mut self) -> Result<f64> {
        self.tagged(WireType::Double, Self::read_double)
    }

    /// Reads an untagged int32 length or count prefix.
    pub fn read_length(&mut self) -> Result<usize> {
        self.attempt(|cursor| {
            let offset = cursor.position;
            let length = cursor.read_integer()?;
            usize::try_from(length).map_err(|_| DatabaseError::InvalidLength {
                offset,
                length: length as i64,
            })
        })
    }

    // Strings

    /// Untagged STRING payload: int32 byte length, then UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String> {
        self.attempt(|cursor| {
            let length = cursor.read_length()?;
            let bytes = cursor.take(length)?;
            Ok(String::from_utf8_lossy(bytes).into_owned())
        })
    }

    /// Untagged WSTRING payload: int32 code unit count, then UTF-16BE units.
    pub fn read_wstring(&mut self) -> Result<String> {
        self.attempt(|cursor| {
            let length = cursor.read_length()?;
            let byte_length = length.checked_mul(2).ok_or(DatabaseError::InvalidLength {
                offset: cursor.position,
                length: length as i64,
            })?;
            let bytes = cursor.take(byte_length)?;
            let units = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            Ok(char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect())
        })
    }

    pub fn read_tagged_string(&mut self) -> Result<String> {
        self.tagged(WireType::String, Self::read_string)
    }

    pub fn read_tagged_wstring(&mut self) -> Result<String> {
        self.tagged(WireType::WString, Self::read_wstring)
    }

    /// Reads a tagged STRING or WSTRING.
    pub fn read_any_string(&mut self) -> Result<String> {
        let tag = self.peek_tag()?;
        match WireType::from_u16(tag) {
            Some(WireType::String) => self.read_tagged_string(),
            Some(WireType::WString) => self.read_tagged_wstring(),
            _ => Err(self.type_mismatch("STRING | WSTRING", tag)),
        }
    }

    /// Reads an index block name: a tagged STRING, WSTRING or INTEGER.
    pub fn read_index_key(&mut self) -> Result<IndexKey> {
        let tag = self.peek_tag()?;
        match WireType::from_u16(tag) {
            Some(WireType::String) => self.read_tagged_string().map(IndexKey::Text),
            Some(WireType::WString) => self.read_tagged_wstring().map(IndexKey::Text),
            Some(WireType::Integer) => self.read_tagged_integer().map(IndexKey::Integer),
            _ => Err(self.type_mismatch("STRING | WSTRING | INTEGER", tag)),
        }
    }

    /// Bytes between `start` and the current position, used to copy a value
    /// that was just walked over.
    pub fn slice_from(&self, start: usize) -> &'a [u8] {
        &self.buffer[start.min(self.position)..self.position]
    }
}
