//! Block access strategies for storage-file readers.
//!
//! A reader is one [`ReaderCore`] plus one strategy. The strategy decides
//! what happens around block reads (nothing, or read-ahead on a worker
//! thread) and what closing the reader tears down.

use crate::config::AccessMode;
use crate::error::{Error, Result};
use crate::sfile::reader::ReaderCore;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Hooks a reader calls around its block reads.
pub trait AccessStrategy: Send + Sync + fmt::Debug {
    /// Which access mode this strategy implements.
    fn mode(&self) -> AccessMode;

    /// Called once after the reader has parsed the file's metadata.
    fn on_open(&self, core: &ReaderCore) -> Result<()>;

    /// Called after data block `block_index` was served to a caller.
    fn after_block_read(&self, core: &ReaderCore, block_index: usize);

    /// Release the reader's resources.
    ///
    /// `evict_on_close` asks for the file's blocks to leave the shared
    /// cache; a strategy may ignore it.
    fn close(&self, core: &ReaderCore, evict_on_close: bool) -> Result<()>;

    /// True when no background work is outstanding.
    fn is_idle(&self) -> bool;
}

/// Reads blocks inline, on demand.
///
/// Closing only closes the file handle. Cached blocks stay in the cache
/// for other readers of the same file, whatever `evict_on_close` says.
#[derive(Debug, Default)]
pub struct StreamStrategy;

impl AccessStrategy for StreamStrategy {
    fn mode(&self) -> AccessMode {
        AccessMode::Stream
    }

    fn on_open(&self, _core: &ReaderCore) -> Result<()> {
        Ok(())
    }

    fn after_block_read(&self, _core: &ReaderCore, _block_index: usize) {}

    fn close(&self, core: &ReaderCore, _evict_on_close: bool) -> Result<()> {
        core.close_streams();
        Ok(())
    }

    fn is_idle(&self) -> bool {
        true
    }
}

/// Reads data blocks ahead of demand on a background worker and places them
/// in the shared block cache.
pub struct PrefetchStrategy {
    depth: usize,
    prefetch_on_open: bool,
    sender: Mutex<Option<Sender<usize>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    inflight: Arc<Mutex<HashSet<usize>>>,
}

impl PrefetchStrategy {
    /// Start the worker thread for `core`.
    pub fn start(core: Arc<ReaderCore>, depth: usize, prefetch_on_open: bool) -> Result<Self> {
        let (sender, receiver) = channel::unbounded();
        let inflight = Arc::new(Mutex::new(HashSet::new()));

        let worker_inflight = Arc::clone(&inflight);
        let worker = thread::Builder::new()
            .name("sfile-prefetch".to_string())
            .spawn(move || run_worker(core, receiver, worker_inflight))?;

        Ok(Self {
            depth,
            prefetch_on_open,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            inflight,
        })
    }

    /// Number of blocks queued or being read.
    pub fn pending(&self) -> usize {
        self.inflight.lock().len()
    }

    fn enqueue(&self, core: &ReaderCore, indices: impl Iterator<Item = usize>) {
        if core.cache().is_none() {
            return;
        }
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return;
        };

        for index in indices.take_while(|&i| i < core.num_blocks()) {
            if core.is_block_cached(index) || !self.inflight.lock().insert(index) {
                continue;
            }
            if sender.send(index).is_err() {
                self.inflight.lock().remove(&index);
                return;
            }
        }
    }
}

fn run_worker(core: Arc<ReaderCore>, requests: Receiver<usize>, inflight: Arc<Mutex<HashSet<usize>>>) {
    log::debug!("Prefetch worker started for {}", core.file_name());
    for index in requests {
        if !core.is_closed() {
            if let Err(e) = core.prefetch_block(index) {
                log::warn!("Prefetch of block {} in {} failed: {}", index, core.file_name(), e);
            }
        }
        inflight.lock().remove(&index);
    }
    log::debug!("Prefetch worker stopped for {}", core.file_name());
}

impl AccessStrategy for PrefetchStrategy {
    fn mode(&self) -> AccessMode {
        AccessMode::Prefetch
    }

    fn on_open(&self, core: &ReaderCore) -> Result<()> {
        if self.prefetch_on_open {
            self.enqueue(core, 0..core.num_blocks());
        } else {
            self.enqueue(core, 0..self.depth);
        }
        Ok(())
    }

    fn after_block_read(&self, core: &ReaderCore, block_index: usize) {
        self.enqueue(core, (block_index + 1)..=block_index.saturating_add(self.depth));
    }

    fn close(&self, core: &ReaderCore, evict_on_close: bool) -> Result<()> {
        // Dropping the sender ends the worker's loop once the queue drains.
        drop(self.sender.lock().take());
        let joined = match self.worker.lock().take() {
            Some(handle) => handle.join().map_err(|_| Error::invalid_state("prefetch worker panicked")),
            None => Ok(()),
        };

        core.close_streams();

        if evict_on_close {
            if let Some(cache) = core.cache() {
                let evicted = cache.evict_file(core.file_name());
                log::info!("Evicted {} blocks of {} on close", evicted, core.file_name());
            }
        }
        joined
    }

    fn is_idle(&self) -> bool {
        self.inflight.lock().is_empty()
    }
}

impl fmt::Debug for PrefetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchStrategy")
            .field("depth", &self.depth)
            .field("prefetch_on_open", &self.prefetch_on_open)
            .field("pending", &self.pending())
            .finish()
    }
}
