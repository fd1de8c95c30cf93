use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::{
    CacheEntry, CacheError, CacheKey,
    disk::{DiskPartition, list_partitions},
    store::Partition,
};

/// The set of named partitions, the equivalent of `CacheStorage` in a
/// browser. Partitions are created lazily by [`CacheStorage::open`].
#[derive(Debug)]
pub struct CacheStorage {
    partitions: DashMap<String, Arc<Partition>>,
    root: Option<PathBuf>,
    next_seq: AtomicU64,
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CacheStorage {
    pub fn in_memory() -> Self {
        Self {
            partitions: DashMap::new(),
            root: None,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Storage mirrored under `root`; partitions found there are restored.
    pub async fn persistent(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| CacheError::io(&root, e))?;

        let storage = Self {
            partitions: DashMap::new(),
            root: Some(root.clone()),
            next_seq: AtomicU64::new(0),
        };

        for name in list_partitions(&root).await? {
            if !is_valid_name(&name) {
                continue;
            }
            let partition = storage.open(&name)?;
            let restored = partition.restore().await?;
            info!(
                target: "swcache::cache",
                partition = %name,
                entries = restored,
                "Restored partition from disk"
            );
        }

        Ok(storage)
    }

    /// Open a partition, creating it if missing.
    pub fn open(&self, name: &str) -> Result<Arc<Partition>, CacheError> {
        if let Some(existing) = self.partitions.get(name) {
            return Ok(existing.clone());
        }
        if !is_valid_name(name) {
            return Err(CacheError::PartitionName(name.to_string()));
        }

        let partition = self
            .partitions
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(target: "swcache::cache", partition = %name, "Creating partition");
                let disk = self.root.as_deref().map(|r| DiskPartition::new(r, name));
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                Arc::new(Partition::new(name.to_string(), seq, disk))
            })
            .clone();
        Ok(partition)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Partition>> {
        self.partitions.get(name).map(|p| p.clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.partitions.contains_key(name)
    }

    /// Partitions in creation order.
    pub fn partitions(&self) -> Vec<Arc<Partition>> {
        let mut all: Vec<Arc<Partition>> =
            self.partitions.iter().map(|p| p.value().clone()).collect();
        all.sort_by_key(|p| p.seq());
        all
    }

    /// Partition names in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.partitions()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Drop a whole partition. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let Some((_, partition)) = self.partitions.remove(name) else {
            return Ok(false);
        };
        partition.destroy().await?;
        info!(target: "swcache::cache", partition = %name, "Deleted partition");
        Ok(true)
    }

    /// First match across partitions, in creation order.
    pub fn match_any(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.partitions().iter().find_map(|p| p.get(key))
    }

    /// Delete every partition. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for name in self.keys() {
            if self.delete(&name).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
