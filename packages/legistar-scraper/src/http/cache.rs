//! On-disk response cache.
//!
//! One JSON file per request identity. Writers stage into a uniquely named
//! temp file and rename it over the final path, so readers see either the
//! old entry, the new one, or nothing.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::traits::transport::{HttpRequest, HttpResponse};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn update_framed(hasher: &mut Sha256, part: &str) {
    hasher.update((part.len() as u64).to_le_bytes());
    hasher.update(part.as_bytes());
}

/// Response cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// SHA-256 over method, URL, sorted query and sorted form fields. Every
    /// part is length-prefixed, so no two requests share an encoding.
    pub fn key(request: &HttpRequest) -> String {
        let mut hasher = Sha256::new();
        update_framed(&mut hasher, request.method.as_str());
        update_framed(&mut hasher, &request.url);

        let mut query: Vec<_> = request.query.iter().collect();
        query.sort();
        hasher.update(b"q");
        hasher.update((query.len() as u64).to_le_bytes());
        for (k, v) in query {
            update_framed(&mut hasher, k);
            update_framed(&mut hasher, v);
        }

        if let Some(form) = &request.form {
            let mut fields: Vec<_> = form.iter().collect();
            fields.sort();
            hasher.update(b"f");
            hasher.update((fields.len() as u64).to_le_bytes());
            for (k, v) in fields {
                update_framed(&mut hasher, k);
                update_framed(&mut hasher, v);
            }
        }

        hex::encode(hasher.finalize())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Two-level fan-out keeps directories small.
        self.root.join(&key[..2]).join(format!("{}.json", key))
    }

    /// Cached response for a request, if any. Unreadable entries are misses.
    pub async fn get(&self, request: &HttpRequest) -> Option<HttpResponse> {
        let path = self.path_for(&Self::key(request));
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(response) => {
                debug!(url = %request.display_url(), "Cache hit");
                Some(response)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt cache entry");
                None
            }
        }
    }

    /// Store a response. Only successful responses are worth replaying.
    pub async fn put(&self, request: &HttpRequest, response: &HttpResponse) -> std::io::Result<()> {
        if response.status != 200 {
            return Ok(());
        }

        let key = Self::key(request);
        let path = self.path_for(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staged = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let bytes = serde_json::to_vec(response)?;
        tokio::fs::write(&staged, bytes).await?;
        tokio::fs::rename(&staged, &path).await?;
        Ok(())
    }
}
