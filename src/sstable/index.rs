//! The sparse index: one entry per data block, mapping the block's first
//! key to the block's starting byte offset.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// One `(first key of block, block start offset)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: String,
    pub offset: u32,
}

/// Encode the index block: `[key_len: u32 BE][key bytes][offset: u32 BE]`
/// per entry, written contiguously.
pub fn encode(entries: &[IndexEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    for entry in entries {
        buf.write_u32::<BigEndian>(entry.key.len() as u32).unwrap();
        buf.extend_from_slice(entry.key.as_bytes());
        buf.write_u32::<BigEndian>(entry.offset).unwrap();
    }
    buf
}

/// Decode an index block, preserving entry order. Order equals ascending key
/// order because blocks were written from an ascending key stream.
pub fn decode(mut buf: &[u8]) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    while !buf.is_empty() {
        if buf.len() < 4 {
            return Err(Error::CorruptIndex(
                "index block truncated inside a key length".to_string(),
            ));
        }
        let key_len = buf.read_u32::<BigEndian>()? as usize;

        if buf.len() < key_len + 4 {
            return Err(Error::CorruptIndex(
                "index block truncated inside an entry".to_string(),
            ));
        }
        let key = std::str::from_utf8(&buf[..key_len])
            .map_err(|e| Error::CorruptIndex(format!("index key is not utf-8: {e}")))?
            .to_string();
        buf = &buf[key_len..];
        let offset = buf.read_u32::<BigEndian>()?;

        entries.push(IndexEntry { key, offset });
    }
    Ok(entries)
}

/// Binary search for the rightmost entry whose first key is <= `key`, the
/// block that could contain the key. `None` means the key sorts before the
/// whole file.
pub fn lower_bound(entries: &[IndexEntry], key: &str) -> Option<usize> {
    let mut low = 0isize;
    let mut high = entries.len() as isize - 1;
    let mut found = None;
    while low <= high {
        let mid = low + (high - low) / 2;
        if entries[mid as usize].key.as_str() <= key {
            found = Some(mid as usize);
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> Vec<IndexEntry> {
        vec![
            IndexEntry { key: "apple".to_string(), offset: 0 },
            IndexEntry { key: "mango".to_string(), offset: 120 },
            IndexEntry { key: "peach".to_string(), offset: 260 },
        ]
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let index = sample_index();
        let decoded = decode(&encode(&index)).expect("Failed to decode index");
        assert_eq!(decoded, index);
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode(&[]).expect("Failed to decode empty index"), vec![]);
    }

    #[test]
    fn test_decode_truncated() {
        let mut buf = encode(&sample_index());
        buf.truncate(buf.len() - 2);
        assert!(matches!(decode(&buf), Err(Error::CorruptIndex(_))));

        // Truncation inside a key length prefix.
        assert!(matches!(decode(&[0u8, 0]), Err(Error::CorruptIndex(_))));
    }

    #[test]
    fn test_lower_bound() {
        let index = sample_index();

        // Before the first key: the key cannot be in this file.
        assert_eq!(lower_bound(&index, "aardvark"), None);

        // Exact matches land on their own entry.
        assert_eq!(lower_bound(&index, "apple"), Some(0));
        assert_eq!(lower_bound(&index, "mango"), Some(1));

        // Keys inside a block land on the block's entry.
        assert_eq!(lower_bound(&index, "banana"), Some(0));
        assert_eq!(lower_bound(&index, "melon"), Some(1));

        // Keys past the last entry land on the final block.
        assert_eq!(lower_bound(&index, "zebra"), Some(2));
    }

    #[test]
    fn test_lower_bound_empty() {
        assert_eq!(lower_bound(&[], "anything"), None);
    }
}
