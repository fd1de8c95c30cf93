use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::Mutex;
use tracing::debug;

use crate::{CacheEntry, CacheError, CacheKey, disk::DiskPartition};

/// One named partition: an in-memory map, optionally mirrored to disk.
#[derive(Debug)]
pub struct Partition {
    name: String,
    seq: u64,
    inner: RwLock<HashMap<CacheKey, CacheEntry>>,
    disk: Option<DiskPartition>,
    /// Held across a disk write and the matching memory insert. `true` once
    /// the partition has been destroyed; later writes are dropped.
    writes: Mutex<bool>,
}

impl Partition {
    pub(crate) fn new(name: String, seq: u64, disk: Option<DiskPartition>) -> Self {
        Self {
            name,
            seq,
            inner: RwLock::new(HashMap::new()),
            disk,
            writes: Mutex::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation order among partitions; lookups across partitions follow it.
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.read().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.inner
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or overwrite. The in-memory entry always lands; an error
    /// only reports that the disk mirror could not be updated. A put on a
    /// destroyed partition is a no-op.
    pub async fn put(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        let destroyed = self.writes.lock().await;
        if *destroyed {
            debug!(
                target: "swcache::cache",
                partition = %self.name,
                key = %key,
                "Dropping write to deleted partition"
            );
            return Ok(());
        }

        debug!(
            target: "swcache::cache",
            partition = %self.name,
            key = %key,
            "Storing entry"
        );

        if let Some(disk) = &self.disk {
            let result = disk.write(&key, &entry).await;
            self.insert_loaded(key, entry);
            return result;
        }

        self.insert_loaded(key, entry);
        Ok(())
    }

    /// Returns whether an entry was present.
    pub async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let destroyed = self.writes.lock().await;
        if *destroyed {
            return Ok(false);
        }

        let removed = self
            .inner
            .write()
            .map(|mut m| m.remove(key).is_some())
            .unwrap_or(false);

        if let Some(disk) = &self.disk {
            disk.remove(key).await?;
        }
        Ok(removed)
    }

    pub(crate) fn insert_loaded(&self, key: CacheKey, entry: CacheEntry) {
        let _ = self.inner.write().map(|mut m| m.insert(key, entry));
    }

    pub(crate) async fn destroy(&self) -> Result<(), CacheError> {
        let mut destroyed = self.writes.lock().await;
        *destroyed = true;
        let _ = self.inner.write().map(|mut m| m.clear());
        if let Some(disk) = &self.disk {
            disk.destroy().await?;
        }
        Ok(())
    }

    pub(crate) async fn restore(&self) -> Result<usize, CacheError> {
        let Some(disk) = &self.disk else {
            return Ok(0);
        };
        let _guard = self.writes.lock().await;
        let loaded = disk.load().await?;
        let count = loaded.len();
        for (key, entry) in loaded {
            self.insert_loaded(key, entry);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::Partition;
    use crate::{CacheEntry, CacheKey, disk::DiskPartition};
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, StatusCode};
    use std::sync::Arc;
    use swcache_http::FetchResponse;

    fn entry(body: &'static [u8]) -> CacheEntry {
        CacheEntry::new(FetchResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(body),
        ))
    }

    #[tokio::test]
    async fn put_overwrites_same_key() {
        let p = Partition::new("static-v2".into(), 0, None);
        let key = CacheKey::get("/css/site.css");
        p.put(key.clone(), entry(b"old")).await.expect("put");
        p.put(key.clone(), entry(b"new")).await.expect("put");
        assert_eq!(p.len(), 1);
        assert_eq!(&p.get(&key).expect("hit").response.body[..], b"new");
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let p = Partition::new("dynamic-v2".into(), 0, None);
        let key = CacheKey::get("/img/a.png");
        p.put(key.clone(), entry(b"png")).await.expect("put");
        assert!(p.delete(&key).await.expect("delete"));
        assert!(!p.delete(&key).await.expect("delete"));
        assert!(p.is_empty());
    }

    fn tagged(tag: &str) -> CacheEntry {
        let mut headers = HeaderMap::new();
        headers.insert("x-writer", HeaderValue::from_str(tag).expect("header"));
        CacheEntry::new(FetchResponse::new(
            StatusCode::OK,
            headers,
            Bytes::from(tag.repeat(4096)),
        ))
    }

    fn assert_consistent(entry: &CacheEntry) {
        let tag = entry.response.header_str("x-writer").expect("tag");
        assert_eq!(entry.response.body, Bytes::from(tag.repeat(4096)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_never_tear_an_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let p = Arc::new(Partition::new(
            "dynamic-v2".into(),
            0,
            Some(DiskPartition::new(dir.path(), "dynamic-v2")),
        ));
        let key = CacheKey::get("/img/a.png");

        for round in 0..25 {
            let writers: Vec<_> = ["a", "b", "c"]
                .into_iter()
                .map(|tag| {
                    let p = p.clone();
                    let key = key.clone();
                    tokio::spawn(async move { p.put(key, tagged(tag)).await })
                })
                .collect();
            for writer in writers {
                writer.await.expect("join").expect("put");
            }

            let in_memory = p.get(&key).expect("hit");
            assert_consistent(&in_memory);

            let reopened = Partition::new(
                "dynamic-v2".into(),
                0,
                Some(DiskPartition::new(dir.path(), "dynamic-v2")),
            );
            assert_eq!(reopened.restore().await.expect("restore"), 1, "round {round}");
            let on_disk = reopened.get(&key).expect("restored");
            assert_consistent(&on_disk);
            assert_eq!(
                on_disk.response.header_str("x-writer"),
                in_memory.response.header_str("x-writer"),
                "memory and disk disagree in round {round}"
            );
        }

        let files = std::fs::read_dir(dir.path().join("dynamic-v2"))
            .expect("read_dir")
            .count();
        assert_eq!(files, 2, "one meta and one body file remain");
    }

    #[tokio::test]
    async fn writes_after_destroy_are_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let p = Partition::new(
            "static-v1".into(),
            0,
            Some(DiskPartition::new(dir.path(), "static-v1")),
        );
        p.put(CacheKey::get("/"), entry(b"home")).await.expect("put");
        p.destroy().await.expect("destroy");

        p.put(CacheKey::get("/late.css"), entry(b"late"))
            .await
            .expect("put");
        assert!(p.is_empty());
        assert!(!dir.path().join("static-v1").exists());
        assert!(!p.delete(&CacheKey::get("/")).await.expect("delete"));
    }
}
