//! Minibase - the storage runtime of a disk-oriented educational DBMS
//!
//! This crate turns a random-access block device into a pool of pinned,
//! latched in-memory page frames, with asynchronous disk scheduling and a
//! weighted LRU-K replacement policy deciding who gets sacrificed under
//! memory pressure.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): the device boundary
//!   - `DiskManager`: block device trait, with file-backed and in-memory
//!     implementations
//!   - `DiskScheduler`: multi-worker asynchronous I/O dispatch
//!   - `DirectoryPage`: the directory page of an extendible hash table
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: pins pages into frames, evicting through the
//!     replacer and reading/writing through the scheduler
//!   - `LruKReplacer`: LRU-K replacement with access-type weighting
//!   - `Frame`: per-frame metadata and the latched page buffer
//!   - `BasicPageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII guards
//!     tying latch release and unpin to scope exit
//!
//! - **Trie** (`trie`): a persistent, structurally-shared immutable map
//!   keyed by byte strings
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use minibase::buffer::BufferPoolManager;
//! use minibase::storage::disk::{DiskManager, FileDiskManager};
//!
//! let disk: Arc<dyn DiskManager> =
//!     Arc::new(FileDiskManager::new("test.db").unwrap());
//! let bpm = BufferPoolManager::new(100, 2, disk);
//!
//! let page_id = bpm.new_page().unwrap();
//! {
//!     let mut guard = bpm.fetch_page_write(page_id).unwrap();
//!     guard.data_mut()[..5].copy_from_slice(b"hello");
//! }
//! bpm.unpin_page(page_id, false);
//! bpm.flush_page(page_id).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod storage;
pub mod trie;

// Re-export commonly used types at the crate root
pub use common::{FrameId, MinibaseError, PageId, Result};
pub use trie::Trie;
