//! # notesync-core
//!
//! Core types, traits, and abstractions for notesync.
//!
//! This crate provides the data model (principals, notes, change batches,
//! field patches), the adapter traits that the store, inference and client
//! crates implement or consume, and the shared error, event and logging
//! vocabulary.

pub mod defaults;
pub mod error;
pub mod events;
pub mod file_safety;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{ClientEvent, EventBus, EventEnvelope, Notice};
pub use file_safety::{attachment_path, is_image, sanitize_filename};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
