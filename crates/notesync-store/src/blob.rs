//! Blob store adapters for note attachments.
//!
//! Paths are relative, `/`-separated keys such as
//! `notes/{owner_id}/{note_id}/{file_name}`. Writing to an existing path
//! replaces the object, so a re-upload for the same note overwrites the
//! earlier one.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use notesync_core::defaults::{BLOB_PUBLIC_URL, BLOB_ROOT};
use notesync_core::{new_v7, BlobStore, Error, Result};

use crate::fault::{FaultPlan, StoreOp};

/// Reject absolute paths and parent-directory segments.
fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::InvalidInput("empty blob path".to_string()));
    }
    let ok = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !ok || path.contains('\\') {
        return Err(Error::InvalidInput(format!("invalid blob path: {}", path)));
    }
    Ok(())
}

/// Join a base URL and a blob path, percent-encoding each segment.
fn public_url(base: &str, path: &str) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"))
}

// =============================================================================
// FILESYSTEM
// =============================================================================

/// Filesystem blob store served from a public base URL.
///
/// Objects are written under `root`; locations resolve to
/// `{public_base_url}/{path}`.
pub struct FilesystemBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Build from `BLOB_ROOT` and `BLOB_PUBLIC_URL`.
    pub fn from_env() -> Self {
        let root = std::env::var("BLOB_ROOT").unwrap_or_else(|_| BLOB_ROOT.to_string());
        let base =
            std::env::var("BLOB_PUBLIC_URL").unwrap_or_else(|_| BLOB_PUBLIC_URL.to_string());
        Self::new(root, base)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Check at startup that the root is writable.
    pub async fn validate(&self) -> Result<()> {
        let probe = format!(".health-check/{}.bin", new_v7());
        self.write(&probe, b"blob-health-check").await?;
        let full = self.full_path(&probe);
        let data = fs::read(&full).await?;
        if data != b"blob-health-check" {
            return Err(Error::Storage("read-back mismatch".to_string()));
        }
        fs::remove_file(&full).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        validate_path(path)?;
        let full_path = self.full_path(path);
        debug!(
            component = "fs_blob_store",
            op = "write",
            blob_path = %path,
            size_bytes = data.len(),
            "Blob write"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "fs_blob_store: create_dir_all failed");
                e
            })?;
        }

        // Temp file + rename so readers never see a partial object
        let temp_path = full_path.with_file_name(format!(".{}.tmp", new_v7()));
        let mut file = fs::File::create(&temp_path).await?;
        if let Err(e) = file.write_all(data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "fs_blob_store: rename failed");
            e
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn resolve_location(&self, path: &str) -> Result<String> {
        validate_path(path)?;
        if !fs::try_exists(self.full_path(path)).await? {
            return Err(Error::NotFound(format!("blob {}", path)));
        }
        Ok(public_url(&self.public_base_url, path))
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// In-memory blob store, primarily for tests.
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    public_base_url: String,
    faults: FaultPlan,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

impl MemoryBlobStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            public_base_url: public_base_url.into(),
            faults: FaultPlan::default(),
        }
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[cfg(any(test, feature = "mock"))]
impl MemoryBlobStore {
    /// Make every subsequent `op` fail. Only `BlobWrite` and `BlobResolve`
    /// apply here.
    pub fn inject_fault(&self, op: StoreOp, fault: crate::fault::Fault) {
        self.faults.inject(op, fault);
    }

    pub fn clear_fault(&self, op: StoreOp) {
        self.faults.clear(op);
    }

    pub fn gate(&self, op: StoreOp) -> std::sync::Arc<tokio::sync::Notify> {
        self.faults.gate(op)
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.faults.calls(op)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.faults.enter(StoreOp::BlobWrite).await?;
        validate_path(path)?;
        self.objects().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn resolve_location(&self, path: &str) -> Result<String> {
        self.faults.enter(StoreOp::BlobResolve).await?;
        validate_path(path)?;
        if !self.objects().contains_key(path) {
            return Err(Error::NotFound(format!("blob {}", path)));
        }
        Ok(public_url(&self.public_base_url, path))
    }
}
