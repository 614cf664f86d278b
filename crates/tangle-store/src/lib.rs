//! Ledger storage collaborators and the cached object store.
//!
//! This crate defines the [`TangleStore`] trait for persisting messages,
//! milestones and the unspent-output set, two backends, and the
//! reference-counted cache layered on top:
//!
//! - [`MemoryStore`]: in-memory storage behind a single `RwLock`.
//! - [`FjallStore`]: persistent storage on Fjall keyspaces.
//! - [`Storage`]: hands out [`CachedMilestone`] / [`CachedMessage`] handles
//!   whose reference count is the only thing that gates eviction.

mod cache;
mod error;
mod fjall_store;
mod memory_store;
mod storage;
mod traits;

pub use cache::{CacheKey, CachedHandle, ObjectCache};
pub use error::StoreError;
pub use fjall_store::FjallStore;
pub use memory_store::MemoryStore;
pub use storage::{CachedMessage, CachedMilestone, Storage, StorageConfig};
pub use traits::{LedgerMutation, Snapshot, TangleStore};
