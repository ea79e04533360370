//! # File Storage
//!
//! Persistent bucket storage on disk.
//!
//! ```text
//! <root>/buckets.json            bucket names, creation order
//! <root>/<hex(name)>/<sha>.body  response body
//! <root>/<hex(name)>/<sha>.meta  request key + response head, JSON
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::request::{RequestKey, StoredResponse};
use crate::storage::CacheStorage;

const MANIFEST_FILE: &str = "buckets.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    buckets: Vec<String>,
}

/// What a `.meta` file holds next to the body
#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    key: RequestKey,
    response: StoredResponse,
}

/// Bucket storage persisted under a directory
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    /// Serialises read-modify-write cycles on the manifest
    manifest_lock: Mutex<()>,
}

impl FileStorage {
    /// Create the storage, making sure the root directory exists
    pub async fn new(root: impl Into<PathBuf>) -> ProxyResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = ?root, "File storage ready");
        Ok(Self {
            root,
            manifest_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, name: &str) -> PathBuf {
        // Bucket names are arbitrary strings, hex keeps them path-safe.
        self.root.join(hex::encode(name.as_bytes()))
    }

    fn body_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        self.bucket_dir(name)
            .join(format!("{}.body", key.to_filename()))
    }

    fn meta_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        self.bucket_dir(name)
            .join(format!("{}.meta", key.to_filename()))
    }

    async fn read_manifest(&self) -> ProxyResult<Manifest> {
        let path = self.root.join(MANIFEST_FILE);
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to read bucket manifest");
                Err(e.into())
            }
        }
    }

    async fn write_manifest(&self, manifest: &Manifest) -> ProxyResult<()> {
        let path = self.root.join(MANIFEST_FILE);
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, serde_json::to_vec_pretty(manifest)?).await?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn write_entry(
        &self,
        name: &str,
        key: RequestKey,
        response: StoredResponse,
    ) -> ProxyResult<()> {
        let body_path = self.body_path(name, &key);
        let meta_path = self.meta_path(name, &key);
        let body = response.body.clone();
        let meta_json = serde_json::to_vec(&EntryRecord { key, response })?;

        // Write to temporary files first, then rename into place
        let temp_body_path = body_path.with_extension("body.tmp");
        let temp_meta_path = meta_path.with_extension("meta.tmp");

        if let Err(e) = fs::write(&temp_body_path, &body).await {
            warn!(path = ?temp_body_path, error = %e, "Failed to write entry body");
            return Err(e.into());
        }

        if let Err(e) = fs::write(&temp_meta_path, &meta_json).await {
            warn!(path = ?temp_meta_path, error = %e, "Failed to write entry metadata");
            let _ = fs::remove_file(&temp_body_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_body_path, &body_path).await {
            warn!(from = ?temp_body_path, to = ?body_path, error = %e, "Failed to rename entry body");
            let _ = fs::remove_file(&temp_body_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e.into());
        }

        // The meta file is the commit point: an entry without it is invisible.
        if let Err(e) = fs::rename(&temp_meta_path, &meta_path).await {
            warn!(from = ?temp_meta_path, to = ?meta_path, error = %e, "Failed to rename entry metadata");
            let _ = fs::remove_file(&body_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn read_record(path: &Path) -> Option<EntryRecord> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = ?path, error = %e, "Failed to read entry metadata");
                }
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to parse entry metadata");
                None
            }
        }
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    async fn open(&self, name: &str) -> ProxyResult<()> {
        let _guard = self.manifest_lock.lock().await;

        fs::create_dir_all(self.bucket_dir(name)).await?;

        let mut manifest = self.read_manifest().await?;
        if !manifest.buckets.iter().any(|b| b == name) {
            manifest.buckets.push(name.to_string());
            self.write_manifest(&manifest).await?;
            debug!(bucket = name, "Created file bucket");
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> ProxyResult<bool> {
        Ok(self.read_manifest().await?.buckets.iter().any(|b| b == name))
    }

    async fn bucket_names(&self) -> ProxyResult<Vec<String>> {
        Ok(self.read_manifest().await?.buckets)
    }

    async fn delete_bucket(&self, name: &str) -> ProxyResult<bool> {
        let _guard = self.manifest_lock.lock().await;

        let mut manifest = self.read_manifest().await?;
        let before = manifest.buckets.len();
        manifest.buckets.retain(|b| b != name);
        if manifest.buckets.len() == before {
            return Ok(false);
        }

        // The name stays listed until its directory is gone, so a failed
        // removal is seen as stale again by the next activate.
        let dir = self.bucket_dir(name);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(dir = ?dir, error = %e, "Failed to remove bucket directory");
                return Err(e.into());
            }
        }

        self.write_manifest(&manifest).await?;
        debug!(bucket = name, "Deleted file bucket");
        Ok(true)
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> ProxyResult<()> {
        if !self.has(name).await? {
            return Err(ProxyError::BucketNotFound(name.to_string()));
        }

        fs::create_dir_all(self.bucket_dir(name)).await?;

        // A batch lands whole or not at all.
        let mut written: Vec<RequestKey> = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            let committed = key.clone();
            if let Err(e) = self.write_entry(name, key, response).await {
                for key in &written {
                    let _ = fs::remove_file(self.meta_path(name, key)).await;
                    let _ = fs::remove_file(self.body_path(name, key)).await;
                }
                warn!(bucket = name, rolled_back = written.len(), error = %e, "Batch write failed");
                return Err(e);
            }
            written.push(committed);
        }
        Ok(())
    }

    async fn get(&self, name: &str, key: &RequestKey) -> ProxyResult<Option<StoredResponse>> {
        if !self.has(name).await? {
            return Ok(None);
        }

        let meta_path = self.meta_path(name, key);
        let body_path = self.body_path(name, key);

        let Some(record) = Self::read_record(&meta_path).await else {
            return Ok(None);
        };

        if &record.key != key {
            // Hash collision or a foreign file; treat as a miss.
            warn!(path = ?meta_path, stored = %record.key, wanted = %key, "Entry key mismatch");
            return Ok(None);
        }

        let body = match fs::read(&body_path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(path = ?body_path, error = %e, "Failed to read entry body");
                return Ok(None);
            }
        };

        let mut response = record.response;
        response.body = body;
        Ok(Some(response))
    }

    async fn entry_keys(&self, name: &str) -> ProxyResult<Vec<RequestKey>> {
        if !self.has(name).await? {
            return Err(ProxyError::BucketNotFound(name.to_string()));
        }

        let dir = self.bucket_dir(name);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            if let Some(record) = Self::read_record(&path).await {
                keys.push(record.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
