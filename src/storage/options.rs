use std::{fmt, sync::Arc};

use crate::{
    storage::writer::{PrecisionHook, PrecisionLoss},
    types::{
        value::Value,
        wire::{TypeSet, WireType},
    },
};

const DEFAULT_TEXT_PRIORITY: [WireType; 4] = [
    WireType::Char,
    WireType::WChar,
    WireType::String,
    WireType::WString,
];

const DEFAULT_NUMERIC_PRIORITY: [WireType; 5] = [
    WireType::Short,
    WireType::Integer,
    WireType::Float,
    WireType::Long,
    WireType::Double,
];

const TEXTUAL: &[WireType] = &[
    WireType::Char,
    WireType::WChar,
    WireType::String,
    WireType::WString,
];
const INTEGRAL: &[WireType] = &[WireType::Short, WireType::Integer, WireType::Long];
const FLOATING: &[WireType] = &[WireType::Float, WireType::Double];

/// Preference order used when a value could be written as several wire
/// types the field allows. Types missing from a list are tried afterwards
/// in the default order.
#[derive(Debug, Clone, PartialEq)]
pub struct TypePriority {
    pub text: Vec<WireType>,
    pub numeric: Vec<WireType>,
}

impl Default for TypePriority {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT_PRIORITY.to_vec(),
            numeric: DEFAULT_NUMERIC_PRIORITY.to_vec(),
        }
    }
}

impl TypePriority {
    pub fn with_text(mut self, order: impl Into<Vec<WireType>>) -> Self {
        self.text = order.into();
        self
    }

    pub fn with_numeric(mut self, order: impl Into<Vec<WireType>>) -> Self {
        self.numeric = order.into();
        self
    }

    fn candidates(preferred: &[WireType], defaults: &[WireType], allowed: TypeSet) -> Vec<WireType> {
        let mut order: Vec<WireType> = Vec::with_capacity(defaults.len());
        for ty in preferred.iter().chain(defaults) {
            if defaults.contains(ty) && allowed.contains(*ty) && !order.contains(ty) {
                order.push(*ty);
            }
        }
        order
    }

    /// Picks the wire type `value` is written as, or `None` when `allowed`
    /// has nothing that can hold it.
    ///
    /// The first type in priority order that holds the value without loss
    /// and keeps its kind wins, then the first lossless type of any kind,
    /// then the first allowed type at all (the writer reports the loss).
    pub fn select(&self, value: &Value, allowed: TypeSet) -> Option<WireType> {
        let (candidates, same_kind): (Vec<WireType>, &[WireType]) = match value {
            Value::Null => {
                return allowed.contains(WireType::Null).then_some(WireType::Null);
            }
            Value::Boolean(_) => {
                return allowed.contains(WireType::Bool).then_some(WireType::Bool);
            }
            Value::Text(_) => (
                Self::candidates(&self.text, &DEFAULT_TEXT_PRIORITY, allowed),
                TEXTUAL,
            ),
            Value::Integer(_) => (
                Self::candidates(&self.numeric, &DEFAULT_NUMERIC_PRIORITY, allowed),
                INTEGRAL,
            ),
            Value::Real(_) => (
                Self::candidates(&self.numeric, &DEFAULT_NUMERIC_PRIORITY, allowed),
                FLOATING,
            ),
            Value::Entry(_) | Value::Array(_) => return None,
        };

        candidates
            .iter()
            .find(|ty| same_kind.contains(*ty) && holds_losslessly(**ty, value))
            .or_else(|| candidates.iter().find(|ty| holds_losslessly(**ty, value)))
            .or_else(|| candidates.first())
            .copied()
    }
}

fn holds_losslessly(ty: WireType, value: &Value) -> bool {
    match (ty, value) {
        (WireType::String | WireType::WString, Value::Text(_)) => true,
        (WireType::Char, Value::Text(s)) => {
            let mut chars = s.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if (c as u32) <= 0xFF)
        }
        (WireType::WChar, Value::Text(s)) => {
            let mut chars = s.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if c.len_utf16() == 1)
        }
        (WireType::Short, Value::Integer(i)) => i16::try_from(*i).is_ok(),
        (WireType::Integer, Value::Integer(i)) => i32::try_from(*i).is_ok(),
        (WireType::Long, Value::Integer(_)) => true,
        (WireType::Float, Value::Integer(i)) => exact_in_f32(*i),
        (WireType::Double, Value::Integer(i)) => exact_in_f64(*i),
        (WireType::Float, Value::Real(r)) => r.is_nan() || (*r as f32) as f64 == *r,
        (WireType::Double, Value::Real(_)) => true,
        (WireType::Short, Value::Real(r)) => integral_within(*r, i16::MIN as f64),
        (WireType::Integer, Value::Real(r)) => integral_within(*r, i32::MIN as f64),
        (WireType::Long, Value::Real(r)) => integral_within(*r, i64::MIN as f64),
        _ => false,
    }
}

pub(crate) fn exact_in_f32(value: i64) -> bool {
    (value as f32) as i128 == value as i128
}

pub(crate) fn exact_in_f64(value: i64) -> bool {
    (value as f64) as i128 == value as i128
}

/// Whether `value` is a whole number in `[min, -min)`, the range of a
/// two's complement integer whose minimum is `min`.
fn integral_within(value: f64, min: f64) -> bool {
    value.fract() == 0.0 && value >= min && value < -min
}

/// Options accepted by [`Database`](super::database::Database) when opening
/// or creating a file.
#[derive(Clone, Default)]
pub struct DatabaseOptions {
    /// Addressing mode used when writing. Reading always follows the flag
    /// stored in the header.
    pub wide_offsets: Option<bool>,
    /// Decode entries on every access instead of memoizing them.
    pub disable_cache: bool,
    /// Report values that lose precision when written.
    pub warn_on_precision_loss: bool,
    /// Receives precision-loss reports; defaults to a `tracing` warning.
    pub precision_hook: Option<PrecisionHook>,
    pub type_priority: TypePriority,
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wide_offsets(mut self, wide: bool) -> Self {
        self.wide_offsets = Some(wide);
        self
    }

    pub fn disable_cache(mut self) -> Self {
        self.disable_cache = true;
        self
    }

    pub fn warn_on_precision_loss(mut self) -> Self {
        self.warn_on_precision_loss = true;
        self
    }

    pub fn on_precision_loss(
        mut self,
        hook: impl Fn(&PrecisionLoss) + Send + Sync + 'static,
    ) -> Self {
        self.warn_on_precision_loss = true;
        self.precision_hook = Some(Arc::new(hook));
        self
    }

    pub fn type_priority(mut self, priority: TypePriority) -> Self {
        self.type_priority = priority;
        self
    }

    /// The warning channel handed to writers, if warnings are enabled.
    pub fn warnings(&self) -> Option<PrecisionHook> {
        if !self.warn_on_precision_loss {
            return None;
        }
        Some(self.precision_hook.clone().unwrap_or_else(|| {
            Arc::new(|loss: &PrecisionLoss| tracing::warn!(target: "interstellar", "{}", loss))
        }))
    }
}

impl fmt::Debug for DatabaseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseOptions")
            .field("wide_offsets", &self.wide_offsets)
            .field("disable_cache", &self.disable_cache)
            .field("warn_on_precision_loss", &self.warn_on_precision_loss)
            .field("precision_hook", &self.precision_hook.as_ref().map(|_| "<hook>"))
            .field("type_priority", &self.type_priority)
            .finish()
    }
}
