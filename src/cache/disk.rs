//! On-disk generation storage.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/
//!   latvian-lang-b1-v2/
//!     3f1c…e9.entry      one file per cached request
//!     .committed         present once an install wrote every entry
//!   latvian-lang-b1-v3/
//!     …
//! ```
//!
//! An entry file is a single line of JSON metadata (method, URL, status,
//! headers, store time), a newline, then the raw body bytes. The file name
//! is the SHA-256 of the request key. Entries are written to a temporary
//! file and renamed into place, so a lookup never sees a torn write.
//!
//! Hidden directories (leading `.`) under the root are ignored.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::{CacheGeneration, CacheStorage};
use crate::types::{CachedResponse, RequestKey, Response};
use crate::{MuninnError, Result};

const ENTRY_EXTENSION: &str = "entry";
const COMMIT_MARKER: &str = ".committed";

/// Distinguishes concurrent writers' temporary files.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generations persisted as directories under a root.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage rooted at `~/.cache/muninn/generations`.
    pub fn default_location() -> Self {
        Self::new(default_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, name: &str) -> Result<PathBuf> {
        validate_generation_name(name)?;
        Ok(self.root.join(name))
    }
}

/// Default storage root: `~/.cache/muninn/generations`.
pub fn default_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("muninn")
        .join("generations")
}

/// Generation tags become directory names, so they must be a single,
/// visible path component.
fn validate_generation_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && name.len() <= 255;
    if valid {
        Ok(())
    } else {
        Err(MuninnError::Storage(format!(
            "invalid generation name '{name}'"
        )))
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    fn name(&self) -> &str {
        "disk"
    }

    async fn open(&self, name: &str) -> Result<Arc<dyn CacheGeneration>> {
        let dir = self.generation_dir(name)?;
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            MuninnError::Storage(format!(
                "failed to create generation dir {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Arc::new(DiskGeneration {
            name: name.to_string(),
            dir,
        }))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.generation_dir(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MuninnError::Storage(format!(
                "failed to delete generation dir {}: {e}",
                dir.display()
            ))),
        }
    }

    async fn names(&self) -> Result<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && !name.starts_with('.')
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Metadata line at the head of an entry file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    stored_at: SystemTime,
}

/// One generation directory.
pub struct DiskGeneration {
    name: String,
    dir: PathBuf,
}

impl DiskGeneration {
    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.dir
            .join(format!("{}.{ENTRY_EXTENSION}", hex::encode(digest)))
    }

    async fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl CacheGeneration for DiskGeneration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<()> {
        let path = self.entry_path(&key);
        let stored_at = response.stored_at();
        let response = response.into_response();
        let meta = EntryMeta {
            method: key.method().to_string(),
            url: key.url().to_string(),
            status: response.status,
            headers: response.headers,
            stored_at,
        };

        let mut contents = serde_json::to_vec(&meta)?;
        contents.push(b'\n');
        contents.extend_from_slice(&response.body);

        // Never recreate the directory: a write landing after the generation
        // was deleted must fail instead of resurrecting it.
        let tmp_path = path.with_extension(format!(
            "{}-{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = tokio::fs::write(&tmp_path, &contents).await {
            return Err(MuninnError::Storage(format!(
                "failed to write entry for {key} in generation '{}': {e}",
                self.name
            )));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(MuninnError::Storage(format!(
                "failed to commit entry for {key} in generation '{}': {e}",
                self.name
            )));
        }
        Ok(())
    }

    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let path = self.entry_path(key);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (meta, body) = parse_entry(&path, contents)?;
        if meta.url != key.url() {
            // Digest collision or a hand-edited file; treat as a miss.
            warn!(path = %path.display(), url = %key.url(), "entry does not match key");
            return Ok(None);
        }
        let response = Response {
            status: meta.status,
            headers: meta.headers,
            body,
        };
        Ok(Some(CachedResponse::with_stored_at(response, meta.stored_at)))
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys = Vec::new();
        for path in self.entry_paths().await? {
            match read_meta(&path).await.and_then(|meta| parse_key(&meta)) {
                Ok(key) => keys.push(key),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping corrupt cache entry"),
            }
        }
        Ok(keys)
    }

    /// Number of entry files; corrupt entries are counted.
    async fn len(&self) -> Result<usize> {
        Ok(self.entry_paths().await?.len())
    }

    async fn commit(&self) -> Result<()> {
        // Plain write: fails instead of recreating a deleted generation.
        tokio::fs::write(self.dir.join(COMMIT_MARKER), b"")
            .await
            .map_err(|e| {
                MuninnError::Storage(format!(
                    "failed to commit generation '{}': {e}",
                    self.name
                ))
            })
    }

    async fn is_committed(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.dir.join(COMMIT_MARKER)).await?)
    }
}

/// Read only the metadata line of an entry file.
async fn read_meta(path: &Path) -> Result<EntryMeta> {
    let file = tokio::fs::File::open(path).await?;
    let mut line = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut line).await?;
    if line.pop() != Some(b'\n') {
        return Err(MuninnError::Storage(format!(
            "corrupt cache entry {}: missing metadata line",
            path.display()
        )));
    }
    Ok(serde_json::from_slice(&line)?)
}

fn parse_entry(path: &Path, contents: Vec<u8>) -> Result<(EntryMeta, Bytes)> {
    let mut contents = Bytes::from(contents);
    let Some(split) = contents.iter().position(|b| *b == b'\n') else {
        return Err(MuninnError::Storage(format!(
            "corrupt cache entry {}: missing metadata line",
            path.display()
        )));
    };
    let body = contents.split_off(split + 1);
    let meta: EntryMeta = serde_json::from_slice(&contents[..split])?;
    Ok((meta, body))
}

fn parse_key(meta: &EntryMeta) -> Result<RequestKey> {
    let url = Url::parse(&meta.url).map_err(|e| MuninnError::InvalidUrl {
        url: meta.url.clone(),
        message: e.to_string(),
    })?;
    Ok(RequestKey::get(&url))
}
