//! # EmberDB
//!
//! An embedded, single-node, persistent key-value store for string keys and
//! string values, with:
//! - a write-ahead log that fsyncs every write before acknowledging it
//! - an in-memory sorted memtable with threshold-triggered flushes
//! - a single level (L0) of immutable sstable files with a sparse index
//! - background compaction that merges L0 into one file, newest write wins
//!
//! ## Data flow
//!
//! ```text
//!          Put                              Get
//!           │                                │
//!           ▼                                ▼
//!     ┌───────────┐                   ┌───────────┐
//!     │    WAL    │                   │ Memtable  │──miss──┐
//!     │  (fsync)  │                   └───────────┘        │
//!     └─────┬─────┘                                        ▼
//!           ▼                                    ┌──────────────────┐
//!     ┌───────────┐  threshold   ┌──────────┐   │  SSTable family  │
//!     │ Memtable  │─────────────▶│  Flush   │──▶│ (newest → oldest)│
//!     └───────────┘              └──────────┘   └──────────────────┘
//! ```

pub mod compaction;
pub mod config;
pub mod db;
pub mod error;
pub mod flock;
pub mod manifest;
pub mod memtable;
pub mod record;
pub mod sstable;
pub mod wal;

pub use config::Config;
pub use db::Db;
pub use error::{Error, Result};

/// Current version of EmberDB.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
