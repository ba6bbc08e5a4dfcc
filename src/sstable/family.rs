//! The L0 family: every live sstable file, ordered oldest to newest.
//!
//! The family owns the open file handles, their in-memory indexes, and the
//! manifest that makes the ordering durable. A single readers-writer lock
//! covers the file list and the manifest together: point lookups share it,
//! installations (flush or compaction swap) take it exclusively.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::table::{Table, TableBuilder, TableSnapshot};
use crate::config::Config;
use crate::error::Result;
use crate::manifest::Manifest;

pub struct Family {
    dir: PathBuf,
    block_length: usize,
    compaction_trigger: usize,
    skip_index: bool,
    inner: RwLock<FamilyInner>,
    compacting: AtomicBool,
}

struct FamilyInner {
    /// Oldest to newest; mirrors `manifest.file_names` position for position.
    tables: Vec<Table>,
    manifest: Manifest,
}

impl Family {
    /// Load the manifest and open every file it names, in order.
    pub fn open(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let manifest = Manifest::load(&config.data_dir)?;

        let mut tables = Vec::with_capacity(manifest.file_names.len());
        for name in &manifest.file_names {
            tables.push(Table::open(config.data_dir.join(name), config.skip_index)?);
        }

        Ok(Self {
            dir: config.data_dir.clone(),
            block_length: config.block_length,
            compaction_trigger: config.compaction_trigger,
            skip_index: config.skip_index,
            inner: RwLock::new(FamilyInner { tables, manifest }),
            compacting: AtomicBool::new(false),
        })
    }

    /// Allocate a fresh file id and start a builder for `<dir>/<id>.log`.
    /// Only the id allocation holds the lock; file creation does not.
    pub fn create_builder(&self) -> Result<TableBuilder> {
        let id = self.inner.write().unwrap().manifest.allocate_file_id();
        let path = self.dir.join(format!("{id}.log"));
        TableBuilder::create(path, self.block_length, self.skip_index)
    }

    /// Write a key-ordered stream into a new file and register it as the
    /// newest member of the family.
    pub fn write(&self, entries: impl Iterator<Item = (String, String)>) -> Result<()> {
        let mut builder = self.create_builder()?;
        for (key, value) in entries {
            builder.add(&key, &value)?;
        }
        let table = builder.finish()?;
        self.install_flush(table)
    }

    /// Register a freshly written file at the newest position. The manifest
    /// is persisted before the file becomes visible; if the save fails the
    /// file is deleted and the family is unchanged.
    fn install_flush(&self, table: Table) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        let mut candidate = inner.manifest.clone();
        candidate.file_names.push(table.name().to_string());

        if let Err(e) = candidate.save(&self.dir) {
            drop(inner);
            let path = table.path().to_path_buf();
            drop(table);
            if let Err(rm) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %rm, "Failed to remove unregistered sstable file");
            }
            return Err(e);
        }

        inner.manifest = candidate;
        inner.tables.push(table);
        Ok(())
    }

    /// Point lookup, newest file to oldest. The first hit wins: later
    /// writes always land in later files, so newest-wins resolves
    /// overwrites.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read().unwrap();
        for table in inner.tables.iter().rev() {
            let value = if self.skip_index {
                table.linear_search(key)?
            } else {
                table.get(key)?
            };
            if value.is_some() {
                return Ok(value);
            }
        }
        Ok(None)
    }

    /// True when a compaction pass should start: none running, and the
    /// family has grown to the trigger size.
    pub fn should_run_compaction(&self) -> bool {
        !self.compacting.load(Ordering::SeqCst)
            && self.inner.read().unwrap().tables.len() >= self.compaction_trigger
    }

    pub fn table_count(&self) -> usize {
        self.inner.read().unwrap().tables.len()
    }

    /// Claim the compacting flag. Returns `None` if a pass is already
    /// running; the guard releases the flag when dropped.
    pub(crate) fn begin_compaction(&self) -> Option<CompactionGuard<'_>> {
        if self.compacting.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(CompactionGuard { family: self })
    }

    /// Snapshot the current file list under the shared lock. No data is
    /// read here; the handles are duplicated for the compactor to read
    /// after the lock is released.
    pub(crate) fn snapshot_tables(&self) -> Result<Vec<TableSnapshot>> {
        let inner = self.inner.read().unwrap();
        inner.tables.iter().map(|t| t.snapshot()).collect()
    }

    /// Atomically install a compacted file in place of the snapshot files.
    ///
    /// The compacted file takes the OLDEST position: files admitted after
    /// the snapshot hold strictly newer writes than anything merged into
    /// it, so they keep their newer positions. On manifest save failure
    /// nothing is swapped and the snapshot files stay live; the caller
    /// discards the compacted file.
    pub(crate) fn install_compacted(&self, compacted: Table, replaced: &[String]) -> Result<()> {
        let replaced: HashSet<&str> = replaced.iter().map(String::as_str).collect();
        let mut inner = self.inner.write().unwrap();

        let mut file_names = vec![compacted.name().to_string()];
        file_names.extend(
            inner
                .tables
                .iter()
                .filter(|t| !replaced.contains(t.name()))
                .map(|t| t.name().to_string()),
        );
        let candidate = Manifest {
            next_file_id: inner.manifest.next_file_id,
            file_names,
        };
        candidate.save(&self.dir)?;

        let current = std::mem::take(&mut inner.tables);
        let (removed, retained): (Vec<Table>, Vec<Table>) = current
            .into_iter()
            .partition(|t| replaced.contains(t.name()));

        inner.manifest = candidate;
        inner.tables = Vec::with_capacity(retained.len() + 1);
        inner.tables.push(compacted);
        inner.tables.extend(retained);
        drop(inner);

        // Close and unlink the replaced files outside the lock.
        for table in removed {
            let path = table.path().to_path_buf();
            drop(table);
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove compacted-away sstable file");
            }
        }
        Ok(())
    }
}

/// RAII guard for the compacting flag.
pub(crate) struct CompactionGuard<'a> {
    family: &'a Family,
}

impl Drop for CompactionGuard<'_> {
    fn drop(&mut self) {
        self.family.compacting.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MANIFEST_FILE_NAME;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config::new(dir.path().join("data"))
    }

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_open_empty() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let family = Family::open(&test_config(&dir)).expect("Failed to open family");

        assert_eq!(family.table_count(), 0);
        assert_eq!(family.get("anything").expect("Error during get"), None);
        assert!(!family.should_run_compaction());
    }

    #[test]
    fn test_write_and_get() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let family = Family::open(&test_config(&dir)).expect("Failed to open family");

        family
            .write(entries(&[("a", "1"), ("b", "2"), ("c", "3")]).into_iter())
            .expect("Failed to write");

        assert_eq!(family.table_count(), 1);
        assert_eq!(family.get("b").expect("Error during get"), Some("2".to_string()));
        assert_eq!(family.get("d").expect("Error during get"), None);
    }

    #[test]
    fn test_newest_file_wins() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let family = Family::open(&test_config(&dir)).expect("Failed to open family");

        family
            .write(entries(&[("k", "old"), ("only_old", "x")]).into_iter())
            .expect("Failed to write");
        family
            .write(entries(&[("k", "new")]).into_iter())
            .expect("Failed to write");

        assert_eq!(family.get("k").expect("Error during get"), Some("new".to_string()));
        assert_eq!(
            family.get("only_old").expect("Error during get"),
            Some("x".to_string())
        );
    }

    #[test]
    fn test_reopen_restores_state() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = test_config(&dir);

        {
            let family = Family::open(&config).expect("Failed to open family");
            family
                .write(entries(&[("a", "1")]).into_iter())
                .expect("Failed to write");
            family
                .write(entries(&[("b", "2")]).into_iter())
                .expect("Failed to write");
        }

        let family = Family::open(&config).expect("Failed to reopen family");
        assert_eq!(family.table_count(), 2);
        assert_eq!(family.get("a").expect("Error during get"), Some("1".to_string()));
        assert_eq!(family.get("b").expect("Error during get"), Some("2".to_string()));

        // Ids continue past the reopened manifest's counter.
        let manifest = Manifest::load(&config.data_dir).expect("Failed to load manifest");
        assert_eq!(manifest.next_file_id, 2);
        assert_eq!(manifest.file_names, vec!["0.log", "1.log"]);
    }

    #[test]
    fn test_should_run_compaction_threshold() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = test_config(&dir).compaction_trigger(2);
        let family = Family::open(&config).expect("Failed to open family");

        family
            .write(entries(&[("a", "1")]).into_iter())
            .expect("Failed to write");
        assert!(!family.should_run_compaction());

        family
            .write(entries(&[("b", "2")]).into_iter())
            .expect("Failed to write");
        assert!(family.should_run_compaction());

        // The flag suppresses a second concurrent pass.
        let guard = family.begin_compaction().expect("Failed to claim flag");
        assert!(!family.should_run_compaction());
        assert!(family.begin_compaction().is_none());
        drop(guard);
        assert!(family.should_run_compaction());
    }

    #[test]
    fn test_skip_index_family() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = test_config(&dir).skip_index(true);
        let family = Family::open(&config).expect("Failed to open family");

        family
            .write(entries(&[("a", "1"), ("b", "2")]).into_iter())
            .expect("Failed to write");
        assert_eq!(family.get("a").expect("Error during get"), Some("1".to_string()));
        assert_eq!(family.get("zz").expect("Error during get"), None);
    }

    #[test]
    fn test_manifest_written_on_install() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = test_config(&dir);
        let family = Family::open(&config).expect("Failed to open family");

        family
            .write(entries(&[("a", "1")]).into_iter())
            .expect("Failed to write");

        let raw = std::fs::read_to_string(config.data_dir.join(MANIFEST_FILE_NAME))
            .expect("Failed to read manifest");
        assert!(raw.contains("0.log"));
    }
}
