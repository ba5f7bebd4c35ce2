//! Vault ingestion: the event source feeding the processing queue.
//!
//! 1. **Watcher**: monitors the vault tree for new image files and admits
//!    them once their size is stable
//! 2. **Scanner**: one-shot recursive sweep for catch-up after a restart
//!
//! Both only ever call [`ProcessingQueue::enqueue`]; dedup and idempotency
//! live in the queue and the processed history, not here.
//!
//! [`ProcessingQueue::enqueue`]: crate::core::ProcessingQueue::enqueue

pub mod watcher;

pub use watcher::{ScanResult, VaultWatcher, WatchHandle, WatcherError};
