//! OpenAI-compatible generation backend.
//!
//! Works with any endpoint exposing `/chat/completions` in the OpenAI wire
//! format (OpenAI, Azure OpenAI, Ollama's compatibility mode, vLLM, ...).
//!
//! # Example
//!
//! ```rust,no_run
//! use notesync_inference::openai::OpenAIBackend;
//! use notesync_core::GenerationBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let text = backend
//!         .generate_with_system("Summarize briefly.", "Buy milk and eggs.")
//!         .await
//!         .unwrap();
//!     println!("{}", text);
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use error::{to_notesync_error, OpenAIErrorCode};
pub use types::*;
