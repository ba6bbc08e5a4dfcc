//! The engine facade: one WAL, one memtable, one sstable family, and the
//! background compactor that keeps the family small.
//!
//! # Write path
//!
//! `put` appends the record to the WAL (fsynced), inserts it into the
//! memtable, and, once the memtable reaches its byte limit, flushes it into
//! a new sstable and clears both the memtable and the WAL. Writers and the
//! flush serialise on one mutex; this is what makes the memtable iteration
//! during a flush observe a quiesced, consistent snapshot.
//!
//! # Read path
//!
//! `get` never takes the write mutex: the memtable is probed lock-free,
//! then the family is searched newest file to oldest under its shared read
//! lock.
//!
//! # Recovery
//!
//! `open` replays the WAL into a fresh memtable. A corrupt tail (torn
//! frame, bad checksum, oversize length) is truncated at the last intact
//! frame and the store opens with the prefix applied; the sstable family is
//! already at its post-last-flush state via the manifest.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::compaction;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::flock::FileLock;
use crate::memtable::Memtable;
use crate::record;
use crate::sstable::Family;
use crate::wal::Wal;

const LOCK_FILE: &str = "emberdb.lock";

pub struct Db {
    config: Config,
    wal: Wal,
    memtable: Memtable,
    family: Arc<Family>,
    /// Serialises `put` and the flush it may trigger.
    write_lock: Mutex<()>,
    compactor: Compactor,
    _lock: FileLock,
}

/// The background compaction worker: one thread, woken through a single
/// boolean trigger, stopped through the shutdown flag.
struct Compactor {
    handle: Option<JoinHandle<()>>,
    trigger: Arc<(Mutex<bool>, Condvar)>,
    shutdown: Arc<AtomicBool>,
}

impl Db {
    /// Open (or create) the store described by `config`: lock the data
    /// directory, rebuild the memtable from the WAL, open the sstable
    /// family from the manifest, and start the compactor worker.
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        if let Some(parent) = config.wal_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock = FileLock::lock(config.data_dir.join(LOCK_FILE))
            .map_err(|e| Error::Locked(e.to_string()))?;

        let wal = Wal::open(&config.wal_path)?;
        let (memtable, replayed) = Self::build_memtable_from_wal(&wal)?;

        let family = Arc::new(Family::open(&config)?);

        let trigger = Arc::new((Mutex::new(false), Condvar::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = spawn_compactor(Arc::clone(&family), Arc::clone(&trigger), Arc::clone(&shutdown));

        tracing::info!(
            wal_entries_replayed = replayed,
            sstable_files = family.table_count(),
            "Opened database"
        );

        Ok(Self {
            config,
            wal,
            memtable,
            family,
            write_lock: Mutex::new(()),
            compactor: Compactor {
                handle: Some(handle),
                trigger,
                shutdown,
            },
            _lock: lock,
        })
    }

    fn build_memtable_from_wal(wal: &Wal) -> Result<(Memtable, usize)> {
        let memtable = Memtable::new();
        let mut replayed = 0;

        let mut replay = wal.replay()?;
        loop {
            match replay.next() {
                Some(Ok(payload)) => {
                    let line = String::from_utf8_lossy(&payload);
                    match record::parse_line(line.trim_end_matches('\n')) {
                        Some((key, value)) => {
                            memtable.put(key.to_string(), value.to_string());
                            replayed += 1;
                        }
                        None => {
                            return Err(Error::CorruptFrame(format!(
                                "wal payload is not a put record: {line:?}"
                            )))
                        }
                    }
                }
                Some(Err(Error::CorruptFrame(msg))) => {
                    // A torn tail from a crash mid-write: keep the intact
                    // prefix and truncate the rest.
                    let offset = replay.valid_offset();
                    tracing::warn!(offset, error = %msg, "Truncating corrupt WAL tail");
                    wal.truncate_to(offset)?;
                    break;
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        Ok((memtable, replayed))
    }

    /// Durably record and apply one write. The WAL append (with its fsync)
    /// happens before the memtable insert; if the append fails the memtable
    /// is untouched.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        record::validate("key", key)?;
        record::validate("value", value)?;

        let guard = self.write_lock.lock().unwrap();

        let payload = record::encode_line(key, value);
        self.wal.write_entry(payload.as_bytes())?;
        self.memtable.put(key.to_string(), value.to_string());

        if self.memtable.should_flush(self.config.memtable_bytes_limit) {
            self.flush_memtable()?;
        }
        drop(guard);

        if self.family.should_run_compaction() {
            self.kick_compactor();
        }
        Ok(())
    }

    /// Point lookup: memtable first, then the family newest to oldest.
    /// A missing key is `Ok(None)`, never an error.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.memtable.get(key) {
            return Ok(Some(value));
        }
        self.family.get(key)
    }

    /// Convert the memtable into a new sstable, then reset the memtable and
    /// the WAL. Called with the write lock held. On failure both are
    /// retained; the next threshold crossing retries.
    fn flush_memtable(&self) -> Result<()> {
        let entries = self.memtable.len();
        self.family.write(self.memtable.iter())?;
        self.memtable.clear();
        self.wal.clear()?;

        tracing::info!(
            entries,
            sstable_files = self.family.table_count(),
            "Flushed memtable to sstable"
        );
        Ok(())
    }

    /// Run a compaction pass synchronously if the family is at its trigger
    /// size. The background worker uses the same pass; the flag inside the
    /// family keeps the two from overlapping.
    pub fn compact(&self) -> Result<()> {
        if self.family.should_run_compaction() {
            compaction::run(&self.family)?;
        }
        Ok(())
    }

    /// Number of live L0 sstable files.
    pub fn sstable_count(&self) -> usize {
        self.family.table_count()
    }

    /// Stop the compactor (waiting for an in-flight pass) and release all
    /// file handles. Durability needs no memtable flush here: everything
    /// unflushed is in the WAL and replays on the next open.
    pub fn close(mut self) -> Result<()> {
        self.shutdown_compactor();
        Ok(())
    }

    fn kick_compactor(&self) {
        let (lock, cvar) = &*self.compactor.trigger;
        *lock.lock().unwrap() = true;
        cvar.notify_one();
    }

    fn shutdown_compactor(&mut self) {
        if let Some(handle) = self.compactor.handle.take() {
            self.compactor.shutdown.store(true, Ordering::SeqCst);
            let (lock, cvar) = &*self.compactor.trigger;
            drop(lock.lock().unwrap());
            cvar.notify_all();
            if handle.join().is_err() {
                tracing::error!("Compactor worker panicked");
            }
        }
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        self.shutdown_compactor();
    }
}

fn spawn_compactor(
    family: Arc<Family>,
    trigger: Arc<(Mutex<bool>, Condvar)>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let (lock, cvar) = &*trigger;
        loop {
            let mut triggered = lock.lock().unwrap();
            while !*triggered && !shutdown.load(Ordering::SeqCst) {
                triggered = cvar.wait(triggered).unwrap();
            }
            *triggered = false;
            drop(triggered);

            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            // Flushes that land during a pass cannot kick the trigger, so
            // keep draining until the family is back under its threshold.
            while family.should_run_compaction() && !shutdown.load(Ordering::SeqCst) {
                if let Err(e) = compaction::run(&family) {
                    tracing::error!(error = %e, "Compaction pass failed");
                    break;
                }
            }
        }
    })
}
