//! Structured logging field names.
//!
//! Every crate logs with these names so that aggregated logs can be queried
//! uniformly.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Failed user operation or degraded service |
//! | WARN  | Recoverable issue (subscription lost, late completion dropped) |
//! | INFO  | Lifecycle events (startup, sign-in, subscription opened, note saved) |
//! | DEBUG | Decision points, config choices |
//! | TRACE | Per-change iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "store", "inference", "client"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "session", "sync", "lifecycle", "memory_store", "pg_store", "openai"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "subscribe", "create", "patch", "upload", "summarize"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

pub const NOTE_ID: &str = "note_id";

/// Principal uid owning the note or subscription.
pub const OWNER_ID: &str = "owner_id";

/// Subscription generation number.
pub const GENERATION: &str = "generation";

/// Edit session token.
pub const SESSION_TOKEN: &str = "session_token";

/// Blob path relative to the store root.
pub const BLOB_PATH: &str = "blob_path";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of changes in a delivered batch.
pub const BATCH_SIZE: &str = "batch_size";

/// Number of notes in the local collection.
pub const COLLECTION_SIZE: &str = "collection_size";

/// Byte length of an upload.
pub const SIZE_BYTES: &str = "size_bytes";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for generation.
pub const MODEL: &str = "model";

/// HTTP status code from an upstream service.
pub const STATUS: &str = "status";
