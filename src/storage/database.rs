use std::{
    collections::HashMap,
    path::Path,
    sync::{
        PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use tracing::{debug, trace};

use crate::{
    storage::{
        codec::{EntryEncoder, decode_entry, raw_value},
        cursor::BinaryCursor,
        header::InterstellarHeader,
        index::IndexBlock,
        options::DatabaseOptions,
        schema::Schema,
        writer::BinaryWriter,
    },
    types::{
        HEADER_SIZE, Offset,
        entry::Entry,
        error::{DatabaseError, Result},
        value::IndexKey,
    },
};

/// An index slot: the byte offset of an encoded entry until it is first
/// decoded, the decoded record afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoCell {
    Unresolved(Offset),
    Resolved(Entry),
}

#[derive(Debug, Default)]
struct EntryCells {
    keys: Vec<IndexKey>,
    slots: HashMap<IndexKey, MemoCell>,
}

impl EntryCells {
    fn insert(&mut self, key: IndexKey, cell: MemoCell) {
        if self.slots.insert(key.clone(), cell).is_none() {
            self.keys.push(key);
        }
    }
}

/// A named schema together with the entries that conform to it.
#[derive(Debug)]
pub struct Structure {
    schema: Schema,
    cells: RwLock<EntryCells>,
}

impl Structure {
    fn new(schema: Schema) -> Self {
        Self {
            schema,
            cells: RwLock::new(EntryCells::default()),
        }
    }

    fn from_block(block: IndexBlock) -> Self {
        let mut cells = EntryCells::default();
        for (key, offset) in block.entries {
            cells.insert(key, MemoCell::Unresolved(offset));
        }
        Self {
            schema: block.schema.unwrap_or_default(),
            cells: RwLock::new(cells),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn read_cells(&self) -> RwLockReadGuard<'_, EntryCells> {
        self.cells.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cells(&self) -> RwLockWriteGuard<'_, EntryCells> {
        self.cells.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An opened (or freshly created) database file.
///
/// The header and every index block are parsed eagerly; entries are decoded
/// on first access and memoized in their index slot unless caching is
/// disabled.
pub struct Database {
    header: InterstellarHeader,
    buffer: Vec<u8>,
    structures: Vec<(IndexKey, Structure)>,
    options: DatabaseOptions,
    decodes: AtomicUsize,
}

impl Database {
    /// A new, empty database. Nothing is written until [`Database::save`].
    pub fn create(options: DatabaseOptions) -> Self {
        let header = InterstellarHeader::new(options.wide_offsets.unwrap_or(false));
        Self {
            header,
            buffer: Vec::new(),
            structures: Vec::new(),
            options,
            decodes: AtomicUsize::new(0),
        }
    }

    /// Opens the file at `path`, or creates an empty database when it does
    /// not exist yet.
    pub fn open<P: AsRef<Path>>(path: P, options: DatabaseOptions) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            debug!("Opening existing database at path: {}", path.display());
            Self::from_bytes(std::fs::read(path)?, options)
        } else {
            debug!("Creating new database for path: {}", path.display());
            Ok(Self::create(options))
        }
    }

    /// Like [`Database::open`], but reads the file without blocking the
    /// calling task.
    pub async fn open_async<P: AsRef<Path>>(path: P, options: DatabaseOptions) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await? {
            debug!("Opening existing database at path: {}", path.display());
            let bytes = tokio::fs::read(path).await?;
            Self::from_bytes(bytes, options)
        } else {
            debug!("Creating new database for path: {}", path.display());
            Ok(Self::create(options))
        }
    }

    pub fn from_bytes(buffer: Vec<u8>, options: DatabaseOptions) -> Result<Self> {
        let mut cursor = BinaryCursor::new(&buffer);
        let header = InterstellarHeader::parse(&mut cursor)?;
        let root = IndexBlock::parse_root(&mut cursor, header.wide_offsets)?;

        let mut structures = Vec::with_capacity(root.entries.len());
        for (name, offset) in &root.entries {
            cursor.seek(to_position(*offset)?)?;
            let block = IndexBlock::parse_structure(&mut cursor, header.wide_offsets)?;
            trace!(
                structure = %name,
                entries = block.entries.len(),
                "Parsed structure index"
            );
            structures.push((name.clone(), Structure::from_block(block)));
        }

        debug!(
            version = header.format_version,
            wide_offsets = header.wide_offsets,
            structures = structures.len(),
            "Loaded database"
        );

        Ok(Self {
            header,
            buffer,
            structures,
            options,
            decodes: AtomicUsize::new(0),
        })
    }

    pub fn header(&self) -> &InterstellarHeader {
        &self.header
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Number of entry decodes performed so far.
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::Relaxed)
    }

    fn structure(&self, name: &IndexKey) -> Result<&Structure> {
        self.structures
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, structure)| structure)
            .ok_or_else(|| DatabaseError::StructureNotFound {
                name: name.to_string(),
            })
    }

    fn structure_mut(&mut self, name: &IndexKey) -> Result<&mut Structure> {
        self.structures
            .iter_mut()
            .find(|(key, _)| key == name)
            .map(|(_, structure)| structure)
            .ok_or_else(|| DatabaseError::StructureNotFound {
                name: name.to_string(),
            })
    }

    pub fn list_structures(&self) -> Vec<IndexKey> {
        self.structures.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn schema(&self, structure: impl Into<IndexKey>) -> Result<&Schema> {
        self.structure(&structure.into()).map(Structure::schema)
    }

    pub fn list_entries(&self, structure: impl Into<IndexKey>) -> Result<Vec<IndexKey>> {
        let structure = self.structure(&structure.into())?;
        Ok(structure.read_cells().keys.clone())
    }

    pub fn is_cached(&self, structure: impl Into<IndexKey>, key: impl Into<IndexKey>) -> Result<bool> {
        let structure_name = structure.into();
        let key = key.into();
        let structure = self.structure(&structure_name)?;
        match structure.read_cells().slots.get(&key) {
            Some(cell) => Ok(matches!(cell, MemoCell::Resolved(_))),
            None => Err(DatabaseError::EntryNotFound {
                structure: structure_name.to_string(),
                entry: key.to_string(),
            }),
        }
    }

    pub fn get_entry(&self, structure: impl Into<IndexKey>, key: impl Into<IndexKey>) -> Result<Entry> {
        let structure_name = structure.into();
        let key = key.into();
        let structure = self.structure(&structure_name)?;

        let cell = structure.read_cells().slots.get(&key).cloned();
        match cell {
            Some(cell) => self.resolve(structure, &key, cell),
            None => Err(DatabaseError::EntryNotFound {
                structure: structure_name.to_string(),
                entry: key.to_string(),
            }),
        }
    }

    /// Every entry of `structure`, in index order.
    pub fn get_all_entries(&self, structure: impl Into<IndexKey>) -> Result<Vec<Entry>> {
        Ok(self
            .get_structure_entries(structure)?
            .into_iter()
            .map(|(_, entry)| entry)
            .collect())
    }

    pub fn get_structure_map(
        &self,
        structure: impl Into<IndexKey>,
    ) -> Result<HashMap<IndexKey, Entry>> {
        Ok(self.get_structure_entries(structure)?.into_iter().collect())
    }

    fn get_structure_entries(&self, structure: impl Into<IndexKey>) -> Result<Vec<(IndexKey, Entry)>> {
        let structure = self.structure(&structure.into())?;
        let cells: Vec<(IndexKey, MemoCell)> = {
            let cells = structure.read_cells();
            cells
                .keys
                .iter()
                .filter_map(|key| cells.slots.get(key).map(|cell| (key.clone(), cell.clone())))
                .collect()
        };

        cells
            .into_iter()
            .map(|(key, cell)| {
                let entry = self.resolve(structure, &key, cell)?;
                Ok((key, entry))
            })
            .collect()
    }

    fn resolve(&self, structure: &Structure, key: &IndexKey, cell: MemoCell) -> Result<Entry> {
        let offset = match cell {
            MemoCell::Resolved(entry) => return Ok(entry),
            MemoCell::Unresolved(offset) => offset,
        };

        let entry = self.decode_at(structure.schema(), offset)?;

        if !self.options.disable_cache {
            // Two readers may decode the same slot concurrently; both results
            // are equal, so whichever write lands first is kept.
            let mut cells = structure.write_cells();
            if let Some(slot) = cells.slots.get_mut(key) {
                if matches!(slot, MemoCell::Unresolved(_)) {
                    *slot = MemoCell::Resolved(entry.clone());
                }
            }
        }
        Ok(entry)
    }

    fn decode_at(&self, schema: &Schema, offset: Offset) -> Result<Entry> {
        let mut cursor = BinaryCursor::at(&self.buffer, to_position(offset)?)?;
        let entry = decode_entry(&mut cursor, schema)?;
        self.decodes.fetch_add(1, Ordering::Relaxed);
        trace!(offset, "Decoded entry");
        Ok(entry)
    }

    // Write path

    pub fn insert_structure(&mut self, name: impl Into<IndexKey>, schema: Schema) -> Result<()> {
        let name = name.into();
        if self.structure(&name).is_ok() {
            return Err(DatabaseError::DuplicateKey {
                name: name.to_string(),
            });
        }
        schema.check_round_trip()?;
        self.structures.push((name, Structure::new(schema)));
        Ok(())
    }

    /// Adds or replaces an entry. The record must conform to the structure's
    /// schema.
    pub fn insert_entry(
        &mut self,
        structure: impl Into<IndexKey>,
        key: impl Into<IndexKey>,
        entry: Entry,
    ) -> Result<()> {
        let priority = self.options.type_priority.clone();
        let structure = self.structure_mut(&structure.into())?;
        EntryEncoder::new(&priority).check_entry(&structure.schema, &entry)?;
        structure
            .cells
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), MemoCell::Resolved(entry));
        Ok(())
    }

    pub fn remove_entry(&mut self, structure: impl Into<IndexKey>, key: impl Into<IndexKey>) -> Result<()> {
        let structure_name = structure.into();
        let key = key.into();
        let structure = self.structure_mut(&structure_name)?;
        let cells = structure.cells.get_mut().unwrap_or_else(PoisonError::into_inner);
        if cells.slots.remove(&key).is_none() {
            return Err(DatabaseError::EntryNotFound {
                structure: structure_name.to_string(),
                entry: key.to_string(),
            });
        }
        cells.keys.retain(|existing| *existing != key);
        Ok(())
    }

    /// Serializes the whole database and stamps the header's update time.
    ///
    /// Layout: header, root index, one index per structure, then every
    /// entry payload. Entries that were never decoded are copied verbatim
    /// from the loaded buffer.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let wide = self.options.wide_offsets.unwrap_or(self.header.wide_offsets);
        let mut writer = BinaryWriter::with_warnings(self.options.warnings());
        let encoder = EntryEncoder::new(&self.options.type_priority);

        let mut root = IndexBlock::root();
        let mut blocks = Vec::with_capacity(self.structures.len());
        let mut payloads: Vec<Vec<Vec<u8>>> = Vec::with_capacity(self.structures.len());

        for (name, structure) in &self.structures {
            let cells = structure.read_cells();
            let mut block = IndexBlock::for_schema(structure.schema.clone());
            let mut bytes = Vec::with_capacity(cells.keys.len());
            for key in &cells.keys {
                let payload = match cells.slots.get(key) {
                    Some(MemoCell::Resolved(entry)) => {
                        encoder.encode_to_vec(&writer, &structure.schema, entry)?
                    }
                    Some(MemoCell::Unresolved(offset)) => {
                        let mut cursor = BinaryCursor::at(&self.buffer, to_position(*offset)?)?;
                        raw_value(&mut cursor)?.to_vec()
                    }
                    None => continue,
                };
                block.entries.push((key.clone(), 0));
                bytes.push(payload);
            }
            root.entries.push((name.clone(), 0));
            blocks.push(block);
            payloads.push(bytes);
        }

        // Block sizes do not depend on offset values, so the layout can be
        // fixed before anything is written.
        let mut position = HEADER_SIZE + root.encoded_len(wide)?;
        for (slot, block) in root.entries.iter_mut().zip(&blocks) {
            slot.1 = position as Offset;
            position += block.encoded_len(wide)?;
        }
        for (block, bytes) in blocks.iter_mut().zip(&payloads) {
            for (slot, payload) in block.entries.iter_mut().zip(bytes) {
                slot.1 = position as Offset;
                position += payload.len();
            }
        }

        let updated_at = InterstellarHeader::serialize(&mut writer, wide, self.header.created_at)?;
        root.serialize(&mut writer, wide)?;
        for block in &blocks {
            block.serialize(&mut writer, wide)?;
        }
        for payload in payloads.iter().flatten() {
            writer.write_raw(payload);
        }
        debug_assert_eq!(writer.position(), position);

        self.header.updated_at = updated_at;
        self.header.wide_offsets = wide;
        debug!(
            bytes = writer.position(),
            structures = blocks.len(),
            wide_offsets = wide,
            "Serialized database"
        );
        Ok(writer.into_bytes())
    }

    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub async fn save_async<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

fn to_position(offset: Offset) -> Result<usize> {
    usize::try_from(offset).map_err(|_| DatabaseError::InvalidOffset {
        offset: 0,
        target: offset as i64,
    })
}
