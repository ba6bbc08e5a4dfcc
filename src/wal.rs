//! Write-ahead log for durability and recovery.
//!
//! Every write is framed and appended here, then fsynced, before it becomes
//! visible in the memtable. Replaying the log on open rebuilds exactly the
//! acknowledged state of the previous process instance.
//!
//! # Frame format
//!
//! ```text
//! +-----------+----------------+-----------+
//! | len: u32  | payload        | crc32: u32|
//! +-----------+----------------+-----------+
//! | 4 bytes   | `len` bytes    | 4 bytes   |
//! +-----------+----------------+-----------+
//! ```
//!
//! - All integers are big-endian.
//! - The CRC-32 (IEEE polynomial) covers the payload bytes only.
//! - Payloads longer than [`MAX_PAYLOAD_LEN`] are rejected as corrupt.
//!
//! A frame that ends early (process died mid-write) surfaces on the next
//! replay as [`Error::CorruptFrame`]; [`ReplayIterator::valid_offset`] then
//! gives the byte offset of the last intact frame so the caller can truncate
//! the tail and continue.

use byteorder::{BigEndian, WriteBytesExt};
use crc::{Crc, CRC_32_ISO_HDLC};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Sanity bound on a single frame's payload length (1 MB).
pub const MAX_PAYLOAD_LEN: usize = 1_000_000;

pub struct Wal {
    writer: Mutex<File>,
    path: PathBuf,
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal").field("path", &self.path).finish()
    }
}

impl Wal {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            writer: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one framed payload and force it to stable storage before
    /// returning. The append and the fsync share the critical section, so
    /// frames from concurrent writers never interleave.
    pub fn write_entry(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::InvalidInput(format!(
                "wal payload of {} bytes exceeds the {} byte bound",
                payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }

        let mut buf = Vec::with_capacity(4 + payload.len() + 4);
        buf.write_u32::<BigEndian>(payload.len() as u32)?;
        buf.extend_from_slice(payload);
        buf.write_u32::<BigEndian>(CRC32.checksum(payload))?;

        let mut writer = self.writer.lock()?;
        writer.write_all(&buf)?;
        writer.sync_all()?;
        Ok(())
    }

    /// Truncate the log to length 0. Used after a successful memtable flush,
    /// once the data is durable in an sstable.
    pub fn clear(&self) -> Result<()> {
        let writer = self.writer.lock()?;
        writer.set_len(0)?;
        writer.sync_all()?;
        Ok(())
    }

    /// Truncate the log at `offset`, discarding a corrupt tail while keeping
    /// every intact frame before it.
    pub fn truncate_to(&self, offset: u64) -> Result<()> {
        let writer = self.writer.lock()?;
        writer.set_len(offset)?;
        writer.sync_all()?;
        Ok(())
    }

    /// Current size of the log file in bytes.
    pub fn size(&self) -> u64 {
        self.writer
            .lock()
            .ok()
            .and_then(|w| w.metadata().ok())
            .map_or(0, |meta| meta.len())
    }

    /// Sequentially decode the log from the start with an independent read
    /// handle.
    pub fn replay(&self) -> Result<ReplayIterator> {
        ReplayIterator::new(&self.path)
    }
}

pub struct ReplayIterator {
    reader: BufReader<File>,
    offset: u64,
}

impl ReplayIterator {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(ReplayIterator {
            reader: BufReader::new(file),
            offset: 0,
        })
    }

    /// Byte offset just past the last frame that decoded cleanly. After a
    /// decode error this is where a corrupt tail begins.
    pub fn valid_offset(&self) -> u64 {
        self.offset
    }

    /// Read the 4-byte length prefix, distinguishing a clean end of log
    /// (zero bytes left) from a torn frame (1-3 bytes left).
    fn read_len_prefix<R: Read>(reader: &mut R) -> Result<Option<u32>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            4 => Ok(Some(u32::from_be_bytes(buf))),
            _ => Err(Error::CorruptFrame(
                "partial write: incomplete length prefix".to_string(),
            )),
        }
    }

    fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
        let payload_len = match Self::read_len_prefix(reader)? {
            Some(len) => len as usize,
            None => return Ok(None),
        };

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(Error::CorruptFrame(format!(
                "payload length {payload_len} exceeds the {MAX_PAYLOAD_LEN} byte bound"
            )));
        }

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                Error::CorruptFrame("partial write: incomplete payload".to_string())
            }
            _ => Error::Io(e.to_string()),
        })?;

        let mut checksum_buf = [0u8; 4];
        reader
            .read_exact(&mut checksum_buf)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    Error::CorruptFrame("partial write: incomplete checksum".to_string())
                }
                _ => Error::Io(e.to_string()),
            })?;

        let stored = u32::from_be_bytes(checksum_buf);
        let computed = CRC32.checksum(&payload);
        if stored != computed {
            return Err(Error::CorruptFrame(format!(
                "checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }

        Ok(Some(payload))
    }
}

impl Iterator for ReplayIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match Self::read_frame(&mut self.reader) {
            Ok(Some(payload)) => {
                self.offset += 4 + payload.len() as u64 + 4;
                Some(Ok(payload))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
