//! The manifest: a small JSON file naming the live L0 files and their
//! logical age order.
//!
//! `file_names` is the sole source of truth for ordering, oldest first.
//! Compaction renumbers files, so a file's numeric id says nothing about its
//! age; only its position in this list does. `next_file_id` strictly
//! increases so every new file gets a fresh on-disk name.
//!
//! Saves go through a temporary sibling and an atomic rename, so a crash
//! mid-save leaves the previous manifest intact.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::Result;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub next_file_id: u32,
    /// Live L0 file names, oldest first.
    pub file_names: Vec<String>,
}

impl Manifest {
    /// Load the manifest from `dir`. An absent or empty file yields the
    /// default `{ next_file_id: 0, file_names: [] }`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Atomically persist the manifest into `dir`: write a temporary
    /// sibling, fsync it, rename over the real file, fsync the directory.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let tmp_path = dir.join(format!("{MANIFEST_FILE_NAME}.tmp"));
        let contents = serde_json::to_string_pretty(self)?;

        let mut file = File::create(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, dir.join(MANIFEST_FILE_NAME))?;

        #[cfg(unix)]
        File::open(dir)?.sync_all()?;

        Ok(())
    }

    /// Return the next file id and post-increment the counter. The bumped
    /// counter becomes durable at the next save.
    pub fn allocate_file_id(&mut self) -> u32 {
        let id = self.next_file_id;
        self.next_file_id += 1;
        id
    }
}
