//! Server configuration from the environment.

use std::path::PathBuf;

use notesync_core::defaults::{BLOB_ROOT, DATABASE_URL, SERVER_HOST, SERVER_PORT, STORE_KIND};
use notesync_core::{Error, Result};

/// Which remote store the service writes summaries to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Postgres,
}

impl std::str::FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            other => Err(Error::Config(format!("unknown NOTESYNC_STORE: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreKind,
    pub database_url: String,
    /// Directory served under `/blobs`, if attachments are stored locally.
    pub blob_root: Option<PathBuf>,
    /// Replacement system prompt for summaries (`SUMMARY_PROMPT`).
    pub summary_prompt: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(p) => p
                .parse()
                .map_err(|_| Error::Config(format!("invalid PORT: {}", p)))?,
            Err(_) => SERVER_PORT,
        };
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| SERVER_HOST.to_string()),
            port,
            store: std::env::var("NOTESYNC_STORE")
                .unwrap_or_else(|_| STORE_KIND.to_string())
                .parse()?,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DATABASE_URL.to_string()),
            blob_root: Some(
                std::env::var("BLOB_ROOT")
                    .unwrap_or_else(|_| BLOB_ROOT.to_string())
                    .into(),
            )
            .filter(|p: &PathBuf| p.is_dir()),
            summary_prompt: std::env::var("SUMMARY_PROMPT")
                .ok()
                .filter(|p| !p.trim().is_empty()),
        })
    }
}
