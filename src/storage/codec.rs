//! Entry codec: positional tuples on the wire, named records in memory.
//!
//! Decoding happens in two phases. [`read_tuple`] walks one tagged value and
//! builds an [`AnnotatedValue`] tree that still carries wire tags but no
//! field names. [`reconcile`] then matches that tree against a [`Schema`],
//! trying each field's alternatives in order until one fits.

use crate::{
    storage::{
        cursor::BinaryCursor,
        options::TypePriority,
        schema::{AlternativeShape, FieldOverload, Schema},
        writer::{BinaryWriter, Numeric},
    },
    types::{
        entry::Entry,
        error::{DatabaseError, Result},
        value::Value,
        wire::WireType,
    },
};

/// Name-erased value tree as read from the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotatedValue {
    Primitive { tag: WireType, value: Value },
    /// STRUCTURE: an object-shaped positional tuple.
    Tuple(Vec<AnnotatedValue>),
    /// ARRAY: a sequence of values.
    Sequence(Vec<AnnotatedValue>),
}

impl AnnotatedValue {
    pub fn tag(&self) -> WireType {
        match self {
            AnnotatedValue::Primitive { tag, .. } => *tag,
            AnnotatedValue::Tuple(_) => WireType::Structure,
            AnnotatedValue::Sequence(_) => WireType::Array,
        }
    }
}

/// Reads one tagged value, recursing into containers.
pub fn read_tuple(cursor: &mut BinaryCursor) -> Result<AnnotatedValue> {
    cursor.attempt(read_value)
}

fn read_value(cursor: &mut BinaryCursor) -> Result<AnnotatedValue> {
    let raw = cursor.peek_tag()?;
    let tag = match WireType::from_u16(raw) {
        Some(tag) if tag != WireType::IndexBlock => tag,
        _ => return Err(cursor.type_mismatch("value type", raw)),
    };
    cursor.read_tag()?;

    let value = match tag {
        WireType::Structure => return read_elements(cursor).map(AnnotatedValue::Tuple),
        WireType::Array => return read_elements(cursor).map(AnnotatedValue::Sequence),
        WireType::Null => Value::Null,
        WireType::String => Value::Text(cursor.read_string()?),
        WireType::WString => Value::Text(cursor.read_wstring()?),
        WireType::Bool => Value::Boolean(cursor.read_bool()?),
        WireType::Char => Value::Text(cursor.read_char()?.to_string()),
        WireType::WChar => Value::Text(cursor.read_wchar()?.to_string()),
        WireType::Short => Value::Integer(cursor.read_short()? as i64),
        WireType::Integer => Value::Integer(cursor.read_integer()? as i64),
        WireType::Float => Value::Real(cursor.read_float()? as f64),
        WireType::Long => Value::Integer(cursor.read_long()?),
        WireType::Double => Value::Real(cursor.read_double()?),
        WireType::IndexBlock => return Err(cursor.type_mismatch("value type", raw)),
    };
    Ok(AnnotatedValue::Primitive { tag, value })
}

fn read_elements(cursor: &mut BinaryCursor) -> Result<Vec<AnnotatedValue>> {
    let count = cursor.read_length()?;
    // Every element takes at least a tag, so a corrupt count cannot force a
    // huge allocation.
    let mut elements = Vec::with_capacity(count.min(cursor.remaining() / 2));
    for _ in 0..count {
        elements.push(read_value(cursor)?);
    }
    Ok(elements)
}

/// Matches a positional tuple against `schema`, element `i` to field `i`.
pub fn reconcile(schema: &Schema, tuple: &[AnnotatedValue]) -> Result<Entry> {
    if tuple.len() != schema.len() {
        return Err(DatabaseError::mismatch(format!(
            "tuple has {} elements, schema has {} fields",
            tuple.len(),
            schema.len()
        )));
    }

    let mut entry = Entry::with_capacity(schema.len());
    for ((name, overload), element) in schema.fields().zip(tuple) {
        let value = reconcile_value(overload, element).map_err(|error| match error {
            DatabaseError::StructureMismatch { details } => {
                DatabaseError::mismatch(format!("field '{}': {}", name, details))
            }
            other => other,
        })?;
        entry.insert(name, value);
    }
    Ok(entry)
}

/// Matches one value against a field overload. Containers try the
/// overload's alternatives in order and take the first that fits.
pub fn reconcile_value(overload: &FieldOverload, value: &AnnotatedValue) -> Result<Value> {
    match value {
        AnnotatedValue::Primitive { tag, value } => {
            if overload.allowed.contains(*tag) {
                Ok(value.clone())
            } else {
                Err(DatabaseError::mismatch(format!(
                    "{} is not one of {}",
                    tag, overload.allowed
                )))
            }
        }
        AnnotatedValue::Tuple(elements) => first_match(overload, WireType::Structure, |shape| {
            match shape {
                AlternativeShape::Structure(schema) => {
                    reconcile(schema, elements).ok().map(Value::Entry)
                }
                AlternativeShape::ArrayOf(_) => None,
            }
        }),
        AnnotatedValue::Sequence(elements) => first_match(overload, WireType::Array, |shape| {
            match shape {
                AlternativeShape::ArrayOf(element) => elements
                    .iter()
                    .map(|item| reconcile_value(element, item))
                    .collect::<Result<Vec<_>>>()
                    .ok()
                    .map(Value::Array),
                AlternativeShape::Structure(_) => None,
            }
        }),
    }
}

fn first_match(
    overload: &FieldOverload,
    tag: WireType,
    attempt: impl FnMut(&AlternativeShape) -> Option<Value>,
) -> Result<Value> {
    overload
        .alternatives
        .iter()
        .find_map(attempt)
        .ok_or_else(|| {
            DatabaseError::mismatch(format!(
                "no alternative of {} matched the {} value",
                overload.alternatives.len(),
                tag
            ))
        })
}

/// Decodes the entry at the cursor's position. On failure the cursor is
/// left where it started.
pub fn decode_entry(cursor: &mut BinaryCursor, schema: &Schema) -> Result<Entry> {
    cursor.attempt(|cursor| {
        let start = cursor.position();
        match read_tuple(cursor)? {
            AnnotatedValue::Tuple(elements) | AnnotatedValue::Sequence(elements) => {
                reconcile(schema, &elements)
            }
            AnnotatedValue::Primitive { tag, .. } => Err(DatabaseError::TypeMismatch {
                offset: start,
                expected: "STRUCTURE | ARRAY".to_string(),
                found: tag.as_u16(),
            }),
        }
    })
}

/// Walks over the value at the cursor and returns its raw bytes.
pub fn raw_value<'a>(cursor: &mut BinaryCursor<'a>) -> Result<&'a [u8]> {
    let start = cursor.position();
    read_tuple(cursor)?;
    Ok(cursor.slice_from(start))
}

/// Writes records in their positional wire form.
pub struct EntryEncoder<'a> {
    priority: &'a TypePriority,
}

impl<'a> EntryEncoder<'a> {
    pub fn new(priority: &'a TypePriority) -> Self {
        Self { priority }
    }

    /// Encodes `entry` as a top-level record. Nothing is written if the
    /// record does not conform to `schema`.
    pub fn encode(&self, writer: &mut BinaryWriter, schema: &Schema, entry: &Entry) -> Result<()> {
        self.check_entry(schema, entry)?;
        self.write_fields(writer, WireType::Array, schema, entry)
    }

    pub fn encode_to_vec(
        &self,
        writer: &BinaryWriter,
        schema: &Schema,
        entry: &Entry,
    ) -> Result<Vec<u8>> {
        let mut scratch = writer.scratch();
        self.encode(&mut scratch, schema, entry)?;
        Ok(scratch.into_bytes())
    }

    /// Explains why `entry` does not conform to `schema`, if it does not.
    pub fn check_entry(&self, schema: &Schema, entry: &Entry) -> Result<()> {
        if let Some(extra) = entry.field_names().find(|name| schema.get(name).is_none()) {
            return Err(DatabaseError::mismatch(format!(
                "field '{}' is not part of the schema",
                extra
            )));
        }
        for (name, overload) in schema.fields() {
            let value = entry.get(name).unwrap_or(&Value::Null);
            if !self.conforms(overload, value) {
                return Err(DatabaseError::mismatch(format!(
                    "field '{}' does not accept {:?}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    fn conforms_entry(&self, schema: &Schema, entry: &Entry) -> bool {
        entry.field_names().all(|name| schema.get(name).is_some())
            && schema.fields().all(|(name, overload)| {
                self.conforms(overload, entry.get(name).unwrap_or(&Value::Null))
            })
    }

    fn conforms(&self, overload: &FieldOverload, value: &Value) -> bool {
        self.select_shape(overload, value).is_some()
    }

    /// The wire shape `value` is written as under `overload`.
    fn select_shape<'s>(&self, overload: &'s FieldOverload, value: &Value) -> Option<Shape<'s>> {
        match value {
            Value::Entry(entry) => overload.alternatives.iter().find_map(|shape| match shape {
                AlternativeShape::Structure(schema) if self.conforms_entry(schema, entry) => {
                    Some(Shape::Structure(schema))
                }
                _ => None,
            }),
            Value::Array(items) => overload.alternatives.iter().find_map(|shape| match shape {
                AlternativeShape::ArrayOf(element)
                    if items.iter().all(|item| self.conforms(element, item)) =>
                {
                    Some(Shape::ArrayOf(element))
                }
                _ => None,
            }),
            primitive => self
                .priority
                .select(primitive, overload.allowed)
                .map(Shape::Basic),
        }
    }

    /// Whether a structure alternative listed before `chosen` also accepts
    /// the positional values of `entry`. Decoding picks the first fit, so
    /// such a record comes back under the earlier alternative's names.
    fn is_shadowed(&self, overload: &FieldOverload, chosen: &Schema, entry: &Entry) -> bool {
        overload
            .alternatives
            .iter()
            .take_while(|shape| {
                !matches!(shape, AlternativeShape::Structure(schema) if std::ptr::eq(schema, chosen))
            })
            .any(|shape| match shape {
                AlternativeShape::Structure(earlier) => {
                    earlier.len() == chosen.len()
                        && earlier.fields().zip(chosen.field_names()).all(|((_, slot), name)| {
                            self.conforms(slot, entry.get(name).unwrap_or(&Value::Null))
                        })
                }
                AlternativeShape::ArrayOf(_) => false,
            })
    }

    fn write_fields(
        &self,
        writer: &mut BinaryWriter,
        container: WireType,
        schema: &Schema,
        entry: &Entry,
    ) -> Result<()> {
        writer.write_tag(container);
        writer.write_length(schema.len())?;
        for (name, overload) in schema.fields() {
            let value = entry.get(name).unwrap_or(&Value::Null);
            self.write_value(writer, overload, value)?;
        }
        Ok(())
    }

    fn write_value(&self, writer: &mut BinaryWriter, overload: &FieldOverload, value: &Value) -> Result<()> {
        let shape = self.select_shape(overload, value).ok_or_else(|| {
            DatabaseError::mismatch(format!("no shape of the field accepts {:?}", value))
        })?;

        match (shape, value) {
            (Shape::Structure(schema), Value::Entry(entry)) => {
                if self.is_shadowed(overload, schema, entry) {
                    writer.warn(WireType::Structure, || {
                        format!("record {:?} reads back through an earlier alternative", entry)
                    });
                }
                self.write_fields(writer, WireType::Structure, schema, entry)
            }
            (Shape::ArrayOf(element), Value::Array(items)) => {
                writer.write_tag(WireType::Array);
                writer.write_length(items.len())?;
                for item in items {
                    self.write_value(writer, element, item)?;
                }
                Ok(())
            }
            (Shape::Basic(ty), value) => write_primitive(writer, ty, value),
            _ => Err(DatabaseError::mismatch(format!(
                "value {:?} does not match its selected shape",
                value
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Shape<'s> {
    Basic(WireType),
    Structure(&'s Schema),
    ArrayOf(&'s FieldOverload),
}

fn write_primitive(writer: &mut BinaryWriter, ty: WireType, value: &Value) -> Result<()> {
    match (ty, value) {
        (WireType::Null, Value::Null) => writer.write_null(),
        (WireType::Bool, Value::Boolean(b)) => writer.write_tagged_bool(*b),
        (WireType::String, Value::Text(s)) => writer.write_tagged_string(s)?,
        (WireType::WString, Value::Text(s)) => writer.write_tagged_wstring(s)?,
        (WireType::Char | WireType::WChar, Value::Text(s)) => {
            let mut chars = s.chars();
            let first = chars.next();
            if first.is_none() || chars.next().is_some() {
                writer.warn(ty, || format!("text {:?}", s));
            }
            writer.write_tag(ty);
            if ty == WireType::Char {
                writer.write_char(first.unwrap_or('\0'));
            } else {
                writer.write_wchar(first.unwrap_or('\0'));
            }
        }
        (_, Value::Integer(i)) => writer.write_numeric(ty, Numeric::Integer(*i))?,
        (_, Value::Real(r)) => writer.write_numeric(ty, Numeric::Real(*r))?,
        _ => {
            return Err(DatabaseError::mismatch(format!(
                "{:?} cannot be written as {}",
                value, ty
            )));
        }
    }
    Ok(())
}
