//! Text codec for the `PUT <key> <value>\n` line shared by the WAL payload
//! and the sstable data blocks.
//!
//! The framing is whitespace-delimited, which is what forbids spaces and
//! newlines inside keys and values: a key or value containing either would
//! shift the token boundaries of every later record in the block.

use crate::errinput;
use crate::error::Result;

/// Encode one record as the on-disk text line, trailing newline included.
pub fn encode_line(key: &str, value: &str) -> String {
    format!("PUT {key} {value}\n")
}

/// Decode one text line into `(key, value)`. Returns `None` for lines that
/// do not carry a well-formed record; block reads may include a truncated
/// tail line, and those are skipped rather than reported.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let mut tokens = line.split(' ');
    match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
        (Some("PUT"), Some(key), Some(value), None) if !key.is_empty() && !value.is_empty() => {
            Some((key, value))
        }
        _ => None,
    }
}

/// Validate a key or value against the constraints of the text framing:
/// non-empty, no space, no newline.
pub fn validate(what: &str, s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(errinput!("{what} must not be empty"));
    }
    if s.contains(' ') || s.contains('\n') {
        return Err(errinput!(
            "{what} must not contain spaces or newlines: {s:?}"
        ));
    }
    Ok(())
}
