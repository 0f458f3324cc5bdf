use std::collections::HashMap;

use crate::{
    storage::{cursor::BinaryCursor, schema::Schema, writer::BinaryWriter},
    types::{
        LENGTH_SIZE, NARROW_OFFSET_SIZE, Offset, TAG_SIZE, WIDE_OFFSET_SIZE,
        error::{DatabaseError, Result},
        value::IndexKey,
        wire::WireType,
    },
};

/*
 * Index Block Layout
 * ┌───────────────────┬──────────────────┬─────────────┬──────────────────────────────┐
 * │ INDEXBLOCK tag(2) │ Schema (struct   │ count (4)   │ (name, delta) * count        │
 * │                   │ index only)      │             │ delta: int32 or int64        │
 * └───────────────────┴──────────────────┴─────────────┴──────────────────────────────┘
 *
 * A stored delta is relative to the position right after it: the absolute
 * target is `position_after_delta + delta`.
 */

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexBlock {
    /// Present on structure indices, absent on the root index.
    pub schema: Option<Schema>,
    /// Names and absolute byte offsets, in on-disk order.
    pub entries: Vec<(IndexKey, Offset)>,
}

pub fn offset_width(wide_offsets: bool) -> usize {
    if wide_offsets {
        WIDE_OFFSET_SIZE
    } else {
        NARROW_OFFSET_SIZE
    }
}

/// Encoded size of an index block name.
pub fn key_len(key: &IndexKey) -> usize {
    match key {
        IndexKey::Text(name) => TAG_SIZE + LENGTH_SIZE + name.len(),
        IndexKey::Integer(_) => TAG_SIZE + 4,
    }
}

impl IndexBlock {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn for_schema(schema: Schema) -> Self {
        Self {
            schema: Some(schema),
            entries: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.schema.is_none()
    }

    pub fn get(&self, key: &IndexKey) -> Option<Offset> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, offset)| *offset)
    }

    pub fn insert(&mut self, key: IndexKey, offset: Offset) {
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some((_, slot)) => *slot = offset,
            None => self.entries.push((key, offset)),
        }
    }

    pub fn parse_root(cursor: &mut BinaryCursor, wide_offsets: bool) -> Result<Self> {
        Self::parse(cursor, wide_offsets, false)
    }

    pub fn parse_structure(cursor: &mut BinaryCursor, wide_offsets: bool) -> Result<Self> {
        Self::parse(cursor, wide_offsets, true)
    }

    fn parse(cursor: &mut BinaryCursor, wide_offsets: bool, with_schema: bool) -> Result<Self> {
        cursor.attempt(|cursor| {
            cursor.expect_tag(WireType::IndexBlock)?;

            let mut block = IndexBlock::default();
            if with_schema {
                block.schema = Some(Schema::parse(cursor)?);
            }

            let count = cursor.read_length()?;
            // Position of each key in `block.entries`
            let mut positions: HashMap<IndexKey, usize> = HashMap::new();
            for _ in 0..count {
                let key = cursor.read_index_key()?;
                let delta = if wide_offsets {
                    cursor.read_long()?
                } else {
                    cursor.read_integer()? as i64
                };
                let after = cursor.position();
                let target = (after as i64).checked_add(delta).unwrap_or(-1);
                if target < 0 || target as usize >= cursor.len() {
                    return Err(DatabaseError::InvalidOffset {
                        offset: after,
                        target,
                    });
                }
                match positions.get(&key) {
                    Some(&at) => block.entries[at].1 = target as Offset,
                    None => {
                        positions.insert(key.clone(), block.entries.len());
                        block.entries.push((key, target as Offset));
                    }
                }
            }
            Ok(block)
        })
    }

    /// Encoded size of this block. Only depends on names and offset width,
    /// never on the offset values, so it can be computed before the final
    /// layout is known.
    pub fn encoded_len(&self, wide_offsets: bool) -> Result<usize> {
        let schema_len = match &self.schema {
            Some(schema) => schema.to_bytes()?.len(),
            None => 0,
        };
        let width = offset_width(wide_offsets);
        Ok(TAG_SIZE
            + schema_len
            + LENGTH_SIZE
            + self
                .entries
                .iter()
                .map(|(key, _)| key_len(key) + width)
                .sum::<usize>())
    }

    /// Writes the block at the writer's current position, which must be the
    /// block's absolute position in the file.
    pub fn serialize(&self, writer: &mut BinaryWriter, wide_offsets: bool) -> Result<()> {
        writer.write_tag(WireType::IndexBlock);
        if let Some(schema) = &self.schema {
            schema.serialize(writer)?;
        }
        writer.write_length(self.entries.len())?;

        let width = offset_width(wide_offsets);
        for (key, target) in &self.entries {
            writer.write_index_key(key)?;
            let after = (writer.position() + width) as i64;
            let delta = *target as i64 - after;
            if wide_offsets {
                writer.write_long(delta);
            } else {
                let narrow = i32::try_from(delta)
                    .map_err(|_| DatabaseError::OffsetOverflow { offset: *target })?;
                writer.write_integer(narrow);
            }
        }
        Ok(())
    }
}
