use std::{fmt, sync::Arc};

use crate::{
    storage::options::{exact_in_f32, exact_in_f64},
    types::{
        error::{DatabaseError, Result},
        value::IndexKey,
        wire::WireType,
    },
};

/// Raised when a value does not fit the wire type it is written as. The
/// value is still written, converted or truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecisionLoss {
    pub target: WireType,
    pub detail: String,
}

impl fmt::Display for PrecisionLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} written as {}, precision may be lost", self.detail, self.target)
    }
}

pub type PrecisionHook = Arc<dyn Fn(&PrecisionLoss) + Send + Sync>;

/// Numeric payload handed to [`BinaryWriter::write_numeric`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(i64),
    Real(f64),
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Integer(i) => write!(f, "{}", i),
            Numeric::Real(r) => write!(f, "{}", r),
        }
    }
}

/// Big-endian writer mirroring [`BinaryCursor`](super::cursor::BinaryCursor).
#[derive(Default)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
    warnings: Option<PrecisionHook>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warnings(warnings: Option<PrecisionHook>) -> Self {
        Self {
            buffer: Vec::new(),
            warnings,
        }
    }

    /// A fresh writer sharing this writer's warning channel.
    pub fn scratch(&self) -> Self {
        Self::with_warnings(self.warnings.clone())
    }

    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn warn(&self, target: WireType, detail: impl FnOnce() -> String) {
        if let Some(hook) = &self.warnings {
            hook(&PrecisionLoss {
                target,
                detail: detail(),
            });
        }
    }

    pub fn write_tag(&mut self, ty: WireType) {
        self.buffer.extend_from_slice(&ty.as_u16().to_be_bytes());
    }

    pub fn write_null(&mut self) {
        self.write_tag(WireType::Null);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(value as u8);
    }

    pub fn write_short(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_integer(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_float(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_long(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_double(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_tagged_bool(&mut self, value: bool) {
        self.write_tag(WireType::Bool);
        self.write_bool(value);
    }

    pub fn write_tagged_integer(&mut self, value: i32) {
        self.write_tag(WireType::Integer);
        self.write_integer(value);
    }

    /// CHAR holds a single Latin-1 byte.
    pub fn write_char(&mut self, value: char) {
        let code = value as u32;
        if code > 0xFF {
            self.warn(WireType::Char, || format!("character {:?}", value));
        }
        self.buffer.push(code as u8);
    }

    /// WCHAR holds a single UTF-16 code unit.
    pub fn write_wchar(&mut self, value: char) {
        let mut units = [0u16; 2];
        let encoded = value.encode_utf16(&mut units);
        if encoded.len() > 1 {
            self.warn(WireType::WChar, || format!("character {:?}", value));
        }
        self.buffer.extend_from_slice(&units[0].to_be_bytes());
    }

    pub fn write_length(&mut self, length: usize) -> Result<()> {
        let length = i32::try_from(length).map_err(|_| DatabaseError::InvalidLength {
            offset: self.buffer.len(),
            length: length as i64,
        })?;
        self.write_integer(length);
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_length(value.len())?;
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn write_wstring(&mut self, value: &str) -> Result<()> {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.write_length(units.len())?;
        for unit in units {
            self.buffer.extend_from_slice(&unit.to_be_bytes());
        }
        Ok(())
    }

    pub fn write_tagged_string(&mut self, value: &str) -> Result<()> {
        self.write_tag(WireType::String);
        self.write_string(value)
    }

    pub fn write_tagged_wstring(&mut self, value: &str) -> Result<()> {
        self.write_tag(WireType::WString);
        self.write_wstring(value)
    }

    pub fn write_index_key(&mut self, key: &IndexKey) -> Result<()> {
        match key {
            IndexKey::Text(name) => self.write_tagged_string(name),
            IndexKey::Integer(id) => {
                self.write_tagged_integer(*id);
                Ok(())
            }
        }
    }

    /// Writes `value` tagged as the numeric wire type `ty`, converting it and
    /// reporting through the warning channel when it does not fit.
    pub fn write_numeric(&mut self, ty: WireType, value: Numeric) -> Result<()> {
        match ty {
            WireType::Short => {
                let narrowed = self.integral(ty, value, i16::MIN as i64, i16::MAX as i64);
                self.write_tag(ty);
                self.write_short(narrowed as i16);
            }
            WireType::Integer => {
                let narrowed = self.integral(ty, value, i32::MIN as i64, i32::MAX as i64);
                self.write_tag(ty);
                self.write_integer(narrowed as i32);
            }
            WireType::Long => {
                let narrowed = self.integral(ty, value, i64::MIN, i64::MAX);
                self.write_tag(ty);
                self.write_long(narrowed);
            }
            WireType::Float => {
                let narrowed = match value {
                    Numeric::Integer(i) => i as f32,
                    Numeric::Real(r) => r as f32,
                };
                let exact = match value {
                    Numeric::Integer(i) => exact_in_f32(i),
                    Numeric::Real(r) => r.is_nan() || narrowed as f64 == r,
                };
                if !exact {
                    self.warn(ty, || format!("number {}", value));
                }
                self.write_tag(ty);
                self.write_float(narrowed);
            }
            WireType::Double => {
                let widened = match value {
                    Numeric::Integer(i) => {
                        if !exact_in_f64(i) {
                            self.warn(ty, || format!("number {}", value));
                        }
                        i as f64
                    }
                    Numeric::Real(r) => r,
                };
                self.write_tag(ty);
                self.write_double(widened);
            }
            other => {
                return Err(DatabaseError::mismatch(format!(
                    "{} is not a numeric wire type",
                    other
                )));
            }
        }
        Ok(())
    }

    fn integral(&self, ty: WireType, value: Numeric, min: i64, max: i64) -> i64 {
        match value {
            Numeric::Integer(i) => {
                if i < min || i > max {
                    self.warn(ty, || format!("number {}", i));
                }
                i
            }
            Numeric::Real(r) => {
                if r.fract() != 0.0 || r.is_nan() || r < min as f64 || r >= -(min as f64) {
                    self.warn(ty, || format!("number {}", r));
                }
                (r as i64).clamp(min, max)
            }
        }
    }
}
