use crate::{
    storage::{cursor::BinaryCursor, writer::BinaryWriter},
    types::{
        error::{DatabaseError, Result},
        wire::{TypeSet, WireType},
    },
};

/// A nested shape a container value may take.
#[derive(Debug, Clone, PartialEq)]
pub enum AlternativeShape {
    /// An object-shaped value described by a nested schema.
    Structure(Schema),
    /// A sequence whose elements all satisfy the wrapped overload.
    ArrayOf(FieldOverload),
}

/// The union of shapes a single field accepts: any basic wire type in
/// `allowed`, or one of `alternatives`, tried in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldOverload {
    pub allowed: TypeSet,
    pub alternatives: Vec<AlternativeShape>,
}

impl FieldOverload {
    pub fn basic(allowed: impl Into<TypeSet>) -> Self {
        Self {
            allowed: allowed.into(),
            alternatives: Vec::new(),
        }
    }

    pub fn structure(schema: Schema) -> Self {
        Self::default().or_structure(schema)
    }

    pub fn array_of(element: FieldOverload) -> Self {
        Self::default().or_array_of(element)
    }

    pub fn or_basic(mut self, ty: WireType) -> Self {
        self.allowed = self.allowed.with(ty);
        self
    }

    pub fn or_structure(mut self, schema: Schema) -> Self {
        self.alternatives.push(AlternativeShape::Structure(schema));
        self
    }

    pub fn or_array_of(mut self, element: FieldOverload) -> Self {
        self.alternatives.push(AlternativeShape::ArrayOf(element));
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.allowed.is_empty() || !self.alternatives.is_empty()
    }

    pub fn parse(cursor: &mut BinaryCursor) -> Result<Self> {
        cursor.attempt(|cursor| {
            let mut overload = FieldOverload::default();

            let tag = cursor.peek_tag()?;
            if let Some(allowed) = TypeSet::from_bits(tag) {
                cursor.read_tag()?;
                overload.allowed = allowed;
            } else if tag != WireType::Structure.as_u16() && tag != WireType::Array.as_u16() {
                return Err(cursor.type_mismatch("basic type set | STRUCTURE | ARRAY", tag));
            }

            // Greedy: every STRUCTURE or ARRAY tag that follows belongs to
            // this field.
            loop {
                match cursor.peek_tag().ok().and_then(WireType::from_u16) {
                    Some(WireType::Structure) => {
                        let schema = Schema::parse(cursor)?;
                        overload.alternatives.push(AlternativeShape::Structure(schema));
                    }
                    Some(WireType::Array) => {
                        cursor.read_tag()?;
                        let element = FieldOverload::parse(cursor)?;
                        overload.alternatives.push(AlternativeShape::ArrayOf(element));
                    }
                    _ => break,
                }
            }

            if !overload.is_valid() {
                return Err(cursor.type_mismatch("non-empty field overload", tag));
            }
            Ok(overload)
        })
    }

    pub fn serialize(&self, writer: &mut BinaryWriter) -> Result<()> {
        if !self.is_valid() {
            return Err(DatabaseError::mismatch(
                "field overload allows no basic type and no alternative",
            ));
        }
        if !self.allowed.is_empty() {
            writer.write_raw(&self.allowed.bits().to_be_bytes());
        }
        for alternative in &self.alternatives {
            match alternative {
                AlternativeShape::Structure(schema) => schema.serialize(writer)?,
                AlternativeShape::ArrayOf(element) => {
                    writer.write_tag(WireType::Array);
                    element.serialize(writer)?;
                }
            }
        }
        Ok(())
    }
}

/// Ordered field name to overload mapping. The order is the positional
/// order of tuple elements on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<(String, FieldOverload)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field; a repeated name replaces the earlier overload in
    /// place.
    pub fn field(mut self, name: impl Into<String>, overload: FieldOverload) -> Self {
        self.insert(name, overload);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, overload: FieldOverload) {
        let name = name.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, slot)) => *slot = overload,
            None => self.fields.push((name, overload)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldOverload> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, overload)| overload)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldOverload)> {
        self.fields
            .iter()
            .map(|(name, overload)| (name.as_str(), overload))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn parse(cursor: &mut BinaryCursor) -> Result<Self> {
        cursor.attempt(|cursor| {
            cursor.expect_tag(WireType::Structure)?;
            let count = cursor.read_length()?;
            let mut schema = Schema {
                fields: Vec::with_capacity(count.min(cursor.remaining())),
            };
            for _ in 0..count {
                let offset = cursor.position();
                let name = cursor.read_any_string()?;
                if schema.get(&name).is_some() {
                    return Err(DatabaseError::InvalidFormat {
                        reason: format!("Duplicate field '{}' at byte offset {}", name, offset),
                    });
                }
                let overload = FieldOverload::parse(cursor)?;
                schema.fields.push((name, overload));
            }
            Ok(schema)
        })
    }

    pub fn serialize(&self, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_tag(WireType::Structure);
        writer.write_length(self.fields.len())?;
        for (name, overload) in &self.fields {
            writer.write_tagged_string(name)?;
            overload.serialize(writer)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = BinaryWriter::new();
        self.serialize(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// Fails unless the encoded schema parses back to `self`. A field
    /// alternative written after a nested structure or array is absorbed
    /// by that nested overload on read.
    pub fn check_round_trip(&self) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut cursor = BinaryCursor::new(&bytes);
        let parsed = Schema::parse(&mut cursor)?;
        if parsed != *self || !cursor.has_ended() {
            return Err(DatabaseError::InvalidFormat {
                reason: "schema does not read back as written; only the last alternative \
                         of a field may be a non-empty structure or an array"
                    .to_string(),
            });
        }
        Ok(())
    }
}
