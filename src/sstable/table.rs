//! Building, opening, and reading a single sstable file.
//!
//! [`TableBuilder`] consumes an ascending key stream and lays the file out as
//! data blocks, index block, footer. [`Table`] opens a finished file, keeps
//! the decoded sparse index in memory, and serves point lookups by reading
//! one data block per probe.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::index::{self, IndexEntry};
use crate::error::{Error, Result};
use crate::record;

/// Accumulates an ascending key stream into a new sstable file.
///
/// A data block collects text lines until its byte length first exceeds the
/// configured block length; the block is then written out and the next key
/// starts a fresh block. The tail block is flushed on [`finish`]
/// regardless of size.
///
/// [`finish`]: TableBuilder::finish
pub struct TableBuilder {
    file: File,
    path: PathBuf,
    name: String,
    block_length: usize,
    skip_index: bool,
    block: String,
    block_first_key: Option<String>,
    block_start: u32,
    offset: u32,
    index: Vec<IndexEntry>,
}

impl TableBuilder {
    /// Create the file at `path`, truncating any leftover from a crashed
    /// predecessor that allocated the same id.
    pub fn create(path: impl Into<PathBuf>, block_length: usize, skip_index: bool) -> Result<Self> {
        let path = path.into();
        let name = file_name(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self {
            file,
            path,
            name,
            block_length,
            skip_index,
            block: String::new(),
            block_first_key: None,
            block_start: 0,
            offset: 0,
            index: Vec::new(),
        })
    }

    /// Append the next record. Keys must arrive in ascending order.
    pub fn add(&mut self, key: &str, value: &str) -> Result<()> {
        if self.block_first_key.is_none() {
            self.block_first_key = Some(key.to_string());
        }

        let line = record::encode_line(key, value);
        self.offset += line.len() as u32;
        self.block.push_str(&line);

        if self.block.len() > self.block_length {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        let first_key = match self.block_first_key.take() {
            Some(key) => key,
            None => return Ok(()),
        };
        self.file.write_all(self.block.as_bytes())?;
        self.index.push(IndexEntry {
            key: first_key,
            offset: self.block_start,
        });
        self.block_start = self.offset;
        self.block.clear();
        Ok(())
    }

    /// Flush the tail block, write the index block and footer, fsync, and
    /// hand back a readable [`Table`].
    pub fn finish(mut self) -> Result<Table> {
        self.flush_block()?;

        let index_offset = self.offset;
        if !self.skip_index {
            self.file.write_all(&index::encode(&self.index))?;
            self.file.write_u32::<BigEndian>(index_offset)?;
        }
        self.file.sync_all()?;

        Ok(Table {
            file: self.file,
            path: self.path,
            name: self.name,
            index: if self.skip_index { Vec::new() } else { self.index },
            index_offset,
        })
    }
}

/// An open, immutable sstable file with its sparse index in memory.
///
/// `index_offset` doubles as the length of the data region; it bounds the
/// final data block on lookups, and it is the whole file when the index was
/// skipped.
pub struct Table {
    file: File,
    path: PathBuf,
    name: String,
    index: Vec<IndexEntry>,
    index_offset: u32,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("blocks", &self.index.len())
            .finish()
    }
}

impl Table {
    /// Open an existing sstable file and decode its index.
    pub fn open(path: impl Into<PathBuf>, skip_index: bool) -> Result<Self> {
        let path = path.into();
        let name = file_name(&path)?;
        let mut file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        if skip_index {
            return Ok(Self {
                file,
                path,
                name,
                index: Vec::new(),
                index_offset: file_size as u32,
            });
        }

        if file_size < 4 {
            return Err(Error::CorruptIndex(format!(
                "{name}: {file_size} bytes is too small to hold a footer"
            )));
        }

        file.seek(SeekFrom::End(-4))?;
        let index_offset = file.read_u32::<BigEndian>()?;
        if index_offset as u64 > file_size - 4 {
            return Err(Error::CorruptIndex(format!(
                "{name}: footer points at {index_offset}, past the index block"
            )));
        }

        let index_len = (file_size - 4 - index_offset as u64) as usize;
        let mut index_buf = vec![0u8; index_len];
        file.seek(SeekFrom::Start(index_offset as u64))?;
        file.read_exact(&mut index_buf)?;
        let index = index::decode(&index_buf)
            .map_err(|e| Error::CorruptIndex(format!("{name}: {e}")))?;

        // Keys and offsets must both ascend; lookups subtract adjacent
        // offsets and a disordered index would read garbage ranges.
        for pair in index.windows(2) {
            if pair[0].key >= pair[1].key || pair[0].offset >= pair[1].offset {
                return Err(Error::CorruptIndex(format!(
                    "{name}: index entries out of order"
                )));
            }
        }
        if index.last().is_some_and(|last| last.offset >= index_offset) {
            return Err(Error::CorruptIndex(format!(
                "{name}: final index entry points past the data region"
            )));
        }

        Ok(Self {
            file,
            path,
            name,
            index,
            index_offset,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bare file name, the form recorded in the manifest.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    /// Point lookup through the sparse index: binary-search for the block
    /// that could hold the key, read just that block, scan its lines.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let slot = match index::lower_bound(&self.index, key) {
            Some(slot) => slot,
            None => return Ok(None),
        };

        let start = self.index[slot].offset;
        // The index block start bounds the final data block.
        let end = match self.index.get(slot + 1) {
            Some(next) => next.offset,
            None => self.index_offset,
        };

        let block = self.read_range(start, end)?;
        Ok(find_in_block(&block, key))
    }

    /// Scan the whole data region for the key. Serves lookups when the
    /// index was skipped.
    pub fn linear_search(&self, key: &str) -> Result<Option<String>> {
        let data = self.read_range(0, self.index_offset)?;
        Ok(find_in_block(&data, key))
    }

    /// A cheap handle for the compactor: a duplicated file descriptor plus
    /// the data region length, taken without reading any data.
    pub fn snapshot(&self) -> Result<TableSnapshot> {
        Ok(TableSnapshot {
            file: self.file.try_clone()?,
            path: self.path.clone(),
            name: self.name.clone(),
            data_len: self.index_offset,
        })
    }

    fn read_range(&self, start: u32, end: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; (end - start) as usize];
        let mut reader = self.file.try_clone()?;
        reader.seek(SeekFrom::Start(start as u64))?;
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// A point-in-time handle on one table's data region, held by the compactor
/// while the family keeps serving reads.
pub struct TableSnapshot {
    file: File,
    path: PathBuf,
    name: String,
    data_len: u32,
}

impl TableSnapshot {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the data region (everything before the index block).
    pub fn read_data(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.data_len as usize];
        let mut reader = self.file.try_clone()?;
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Scan a block's text lines for the key. A block read may carry a
/// malformed tail line; those are skipped.
fn find_in_block(block: &[u8], key: &str) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    for line in text.split('\n') {
        if let Some((line_key, value)) = record::parse_line(line) {
            if line_key == key {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| Error::InvalidInput(format!("invalid sstable path: {path:?}")))
}
