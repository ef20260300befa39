//! # notesync-inference
//!
//! Summary generation for the notesync enrichment service.
//!
//! This crate provides:
//! - OpenAI-compatible generation backend (feature `openai`, default)
//! - [`Summarizer`], which turns note text into a short summary
//! - Mock backend for tests (feature `mock`)

#[cfg(feature = "openai")]
pub mod openai;

pub mod summary;

// Mock generation backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "openai")]
pub use openai::{OpenAIBackend, OpenAIConfig};
pub use summary::Summarizer;

// Re-export core traits for convenience
pub use notesync_core::GenerationBackend;
