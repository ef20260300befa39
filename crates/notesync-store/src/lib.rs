//! # notesync-store
//!
//! Remote store and blob store adapters for notesync.
//!
//! - [`MemoryRemoteStore`]: in-process store with a broadcast change feed
//! - [`PgRemoteStore`]: PostgreSQL table plus LISTEN/NOTIFY change feed
//! - [`FilesystemBlobStore`] / [`MemoryBlobStore`]: attachment bytes
//!
//! With the `mock` feature the in-memory adapters expose fault injection
//! ([`StoreOp`], [`Fault`]) for exercising partial failures.

pub mod blob;
pub mod fault;
pub mod memory;
pub mod pool;
pub mod postgres;

pub use blob::{FilesystemBlobStore, MemoryBlobStore};
pub use fault::{Fault, StoreOp};
pub use memory::MemoryRemoteStore;
pub use pool::{create_pool, PoolConfig};
pub use postgres::PgRemoteStore;

// Re-export core types for convenience
pub use notesync_core::{BlobStore, RemoteStore};
