//! Write-through disk mirror of a partition.
//!
//! Layout: `<root>/<partition>/<stem>.meta` holds key, status, headers and
//! the name of the body file as JSON; the body lives in
//! `<root>/<partition>/<stem>-<nonce>.cache`. Every write gets a fresh body
//! file and the meta rename is the commit point, so a reader sees either the
//! old or the new entry, never a mix. Callers serialize writes per key.

use std::{
    collections::HashSet,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use swcache_http::FetchResponse;
use tokio::fs;
use tracing::warn;

use crate::{CacheEntry, CacheError, CacheKey};

const DATA_EXT: &str = "cache";
const META_EXT: &str = "meta";
const TMP_EXT: &str = "tmp";

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique per write within a process, and across restarts via the clock.
fn nonce() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}{seq:04x}")
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: CacheKey,
    status: u16,
    status_text: Option<String>,
    headers: Vec<(String, String)>,
    body_file: String,
}

impl EntryMeta {
    fn from_entry(key: &CacheKey, entry: &CacheEntry, body_file: String) -> Self {
        let res = &entry.response;
        Self {
            key: key.clone(),
            body_file,
            status: res.status.as_u16(),
            status_text: res.status_text.clone(),
            headers: res
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
        }
    }

    fn into_entry(self, body: Bytes) -> Option<(CacheKey, CacheEntry)> {
        let status = StatusCode::from_u16(self.status).ok()?;
        let mut headers = HeaderMap::new();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.append(name, value);
            }
        }
        let mut response = FetchResponse::new(status, headers, body);
        response.status_text = self.status_text;
        Some((self.key, CacheEntry::new(response)))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DiskPartition {
    dir: PathBuf,
}

impl DiskPartition {
    pub(crate) fn new(root: &Path, name: &str) -> Self {
        Self {
            dir: root.join(name),
        }
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{META_EXT}", key.file_stem()))
    }

    /// Body file currently committed for `meta_path`, if any.
    async fn committed_body(&self, meta_path: &Path) -> Option<PathBuf> {
        let bytes = fs::read(meta_path).await.ok()?;
        let meta: EntryMeta = serde_json::from_slice(&bytes).ok()?;
        body_path(&self.dir, &meta.body_file)
    }

    pub(crate) async fn write(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?;

        let meta_path = self.meta_path(key);
        let previous = self.committed_body(&meta_path).await;

        let body_file = format!("{}-{}.{DATA_EXT}", key.file_stem(), nonce());
        let data_path = self.dir.join(&body_file);
        let meta = EntryMeta::from_entry(key, entry, body_file);
        let meta_bytes = serde_json::to_vec(&meta).map_err(|source| CacheError::Meta {
            path: meta_path.clone(),
            source,
        })?;

        write_atomic(&data_path, &entry.response.body).await?;
        if let Err(err) = write_atomic(&meta_path, &meta_bytes).await {
            let _ = remove_if_exists(&data_path).await;
            return Err(err);
        }

        if let Some(old) = previous.filter(|old| *old != data_path) {
            remove_if_exists(&old).await?;
        }
        Ok(())
    }

    pub(crate) async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let meta_path = self.meta_path(key);
        let body = self.committed_body(&meta_path).await;
        remove_if_exists(&meta_path).await?;
        match body {
            Some(path) => remove_if_exists(&path).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn destroy(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.dir, e)),
        }
    }

    /// Read back every committed entry. Damaged entries are skipped and
    /// files no entry refers to (interrupted writes) are removed.
    pub(crate) async fn load(&self) -> Result<Vec<(CacheKey, CacheEntry)>, CacheError> {
        let mut out = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };

        let mut metas = Vec::new();
        let mut others = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some(META_EXT) {
                metas.push(path);
            } else {
                others.push(path);
            }
        }

        let mut referenced = HashSet::new();
        for meta_path in metas {
            match load_one(&self.dir, &meta_path).await {
                Ok(Some((data_path, pair))) => {
                    referenced.insert(data_path);
                    out.push(pair);
                }
                Ok(None) => {
                    warn!(
                        target: "swcache::disk",
                        path = %meta_path.display(),
                        "Skipping entry with invalid status"
                    );
                }
                Err(err) => {
                    warn!(
                        target: "swcache::disk",
                        path = %meta_path.display(),
                        error = %err,
                        "Skipping unreadable cache entry"
                    );
                }
            }
        }

        for stray in others {
            let is_leftover = match stray.extension().and_then(|e| e.to_str()) {
                Some(DATA_EXT) => !referenced.contains(&stray),
                Some(TMP_EXT) => true,
                _ => false,
            };
            if is_leftover {
                remove_if_exists(&stray).await?;
            }
        }

        Ok(out)
    }
}

/// A body file name from a meta record, only if it is a plain file name
/// inside `dir`.
fn body_path(dir: &Path, body_file: &str) -> Option<PathBuf> {
    let name = Path::new(body_file);
    if name.file_name()? != name.as_os_str() {
        return None;
    }
    Some(dir.join(name))
}

type Loaded = (PathBuf, (CacheKey, CacheEntry));

async fn load_one(dir: &Path, meta_path: &Path) -> Result<Option<Loaded>, CacheError> {
    let meta_bytes = fs::read(meta_path)
        .await
        .map_err(|e| CacheError::io(meta_path, e))?;
    let meta: EntryMeta =
        serde_json::from_slice(&meta_bytes).map_err(|source| CacheError::Meta {
            path: meta_path.to_path_buf(),
            source,
        })?;

    let Some(data_path) = body_path(dir, &meta.body_file) else {
        return Ok(None);
    };
    let body = fs::read(&data_path)
        .await
        .map_err(|e| CacheError::io(&data_path, e))?;

    Ok(meta
        .into_entry(Bytes::from(body))
        .map(|pair| (data_path, pair)))
}

/// Names of the partition directories under `root`, sorted.
pub(crate) async fn list_partitions(root: &Path) -> Result<Vec<String>, CacheError> {
    let mut names = Vec::new();
    let mut dir = match fs::read_dir(root).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(CacheError::io(root, e)),
    };

    while let Some(item) = dir
        .next_entry()
        .await
        .map_err(|e| CacheError::io(root, e))?
    {
        let is_dir = item
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }
        if let Some(name) = item.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    names.sort();
    Ok(names)
}

/// Write through a temp file private to this call, then rename over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.{TMP_EXT}", nonce()));
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| CacheError::io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::io(path, e))
}

async fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}
