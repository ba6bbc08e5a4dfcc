use std::path::PathBuf;

/// Default directory for sstable files and the manifest.
pub const DEFAULT_DATA_DIR: &str = "data_files_sstable";
/// Default WAL file path.
pub const DEFAULT_WAL_PATH: &str = "wal.log";

/// Configuration for the storage engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding sstable files and `manifest.json`.
    pub data_dir: PathBuf,

    /// Path of the write-ahead log file.
    pub wal_path: PathBuf,

    /// Memtable flush threshold in bytes (default: 400).
    pub memtable_bytes_limit: usize,

    /// Target sstable data block size in bytes (default: 100; production
    /// deployments should raise this to 4 KiB or more).
    pub block_length: usize,

    /// Number of L0 files that triggers a compaction pass (default: 4).
    pub compaction_trigger: usize,

    /// Diagnostic mode: skip writing the index block and footer and serve
    /// lookups by linear scan (default: false).
    pub skip_index: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            wal_path: PathBuf::from(DEFAULT_WAL_PATH),
            memtable_bytes_limit: 400,
            block_length: 100,
            compaction_trigger: 4,
            skip_index: false,
        }
    }
}

impl Config {
    /// Create a new config rooted at the given data directory. The WAL is
    /// placed inside the directory so that one path carries the whole store.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let wal_path = dir.join(DEFAULT_WAL_PATH);
        Self {
            data_dir: dir,
            wal_path,
            ..Default::default()
        }
    }

    /// Set the WAL file path.
    pub fn wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wal_path = path.into();
        self
    }

    /// Set the memtable flush threshold in bytes.
    pub fn memtable_bytes_limit(mut self, limit: usize) -> Self {
        self.memtable_bytes_limit = limit;
        self
    }

    /// Set the target sstable block length in bytes.
    pub fn block_length(mut self, length: usize) -> Self {
        self.block_length = length;
        self
    }

    /// Set the L0 file-count compaction trigger.
    pub fn compaction_trigger(mut self, trigger: usize) -> Self {
        self.compaction_trigger = trigger;
        self
    }

    /// Disable the sparse index and use linear scans (benchmarking aid).
    pub fn skip_index(mut self, skip: bool) -> Self {
        self.skip_index = skip;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.wal_path, PathBuf::from(DEFAULT_WAL_PATH));
        assert_eq!(config.memtable_bytes_limit, 400);
        assert_eq!(config.block_length, 100);
        assert_eq!(config.compaction_trigger, 4);
        assert!(!config.skip_index);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new("/tmp/ember")
            .memtable_bytes_limit(64 * 1024)
            .block_length(4096)
            .compaction_trigger(8)
            .skip_index(true);

        assert_eq!(config.data_dir, PathBuf::from("/tmp/ember"));
        assert_eq!(config.wal_path, PathBuf::from("/tmp/ember/wal.log"));
        assert_eq!(config.memtable_bytes_limit, 64 * 1024);
        assert_eq!(config.block_length, 4096);
        assert_eq!(config.compaction_trigger, 8);
        assert!(config.skip_index);
    }
}
