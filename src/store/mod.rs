//! In-memory catalog cache.
//!
//! [`CatalogStore`] holds the manifest, the per-catalog item listings, and
//! the per-item metadata records behind interior read-write locks. The
//! refresh cycle is the sole catalog writer; request paths are readers plus
//! the narrow [`merge_metas`](CatalogStore::merge_metas) writer. The raw
//! maps are never handed out.
//!
//! Catalog updates are committed in fixed-size chunks so a mid-update
//! failure leaves a partially-updated but internally consistent store:
//! readers observe either the pre-update or the fully-committed-chunk state,
//! never a torn chunk.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use crate::model::{CatalogEntry, Manifest, MetaRecord};

/// Default number of catalog keys committed per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Commit failures surfaced by [`CatalogStore::update_catalogs`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A chunk contained an entry that cannot be committed. Chunks already
    /// written stay committed; the remaining chunks are abandoned.
    #[error("invalid catalog entry in chunk {chunk}: {reason}")]
    InvalidChunk { chunk: usize, reason: String },
}

/// Point-in-time copy of the two cache maps, taken before a refresh begins.
/// Owned exclusively by the in-flight refresh that created it.
pub struct CacheSnapshot {
    catalogs: HashMap<String, CatalogEntry>,
    metas: HashMap<String, MetaRecord>,
}

pub struct CatalogStore {
    manifest: RwLock<Manifest>,
    catalogs: RwLock<HashMap<String, CatalogEntry>>,
    metas: RwLock<HashMap<String, MetaRecord>>,
    chunk_size: usize,
}

impl CatalogStore {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            manifest: RwLock::new(Manifest::default()),
            catalogs: RwLock::new(HashMap::new()),
            metas: RwLock::new(HashMap::new()),
            chunk_size,
        }
    }

    /// True when no catalogs have ever been committed. Drives the
    /// scheduler's immediate first refresh.
    pub fn is_empty(&self) -> bool {
        self.catalogs.read().is_empty()
    }

    pub fn catalog_count(&self) -> usize {
        self.catalogs.read().len()
    }

    pub fn manifest(&self) -> Manifest {
        self.manifest.read().clone()
    }

    /// Replace the manifest. Called only by the refresh cycle.
    pub fn set_manifest(&self, manifest: Manifest) {
        *self.manifest.write() = manifest;
    }

    /// Look up a single catalog listing. Unknown ids are simply absent.
    pub fn get(&self, catalog_id: &str) -> Option<CatalogEntry> {
        self.catalogs.read().get(catalog_id).cloned()
    }

    /// Fetch cached metadata records for `ids`. Missing ids are absent from
    /// the result, not an error.
    pub fn get_metas(&self, ids: &[String]) -> HashMap<String, MetaRecord> {
        let metas = self.metas.read();
        ids.iter()
            .filter_map(|id| metas.get(id).map(|m| (id.clone(), m.clone())))
            .collect()
    }

    /// Merge freshly resolved records into the cache. Each record lands
    /// whole; existing records are replaced, never partially overwritten.
    pub fn merge_metas(&self, new_metas: HashMap<String, MetaRecord>) {
        if new_metas.is_empty() {
            return;
        }
        let mut metas = self.metas.write();
        metas.extend(new_metas);
    }

    /// Merge `new_catalogs` into the store in chunks of `chunk_size` keys.
    ///
    /// Each chunk is validated and then committed under a single write lock.
    /// A failing chunk aborts the remaining chunks and surfaces the error;
    /// chunks committed before the failure stay committed.
    pub fn update_catalogs(
        &self,
        new_catalogs: HashMap<String, CatalogEntry>,
    ) -> Result<(), StoreError> {
        let mut keys: Vec<String> = new_catalogs.keys().cloned().collect();
        keys.sort();

        let total_chunks = keys.len().div_ceil(self.chunk_size).max(1);

        for (chunk_idx, chunk_keys) in keys.chunks(self.chunk_size).enumerate() {
            for key in chunk_keys {
                let entry = &new_catalogs[key];
                validate_entry(key, entry).map_err(|reason| StoreError::InvalidChunk {
                    chunk: chunk_idx + 1,
                    reason,
                })?;
            }

            {
                let mut catalogs = self.catalogs.write();
                for key in chunk_keys {
                    catalogs.insert(key.clone(), new_catalogs[key].clone());
                }
            }

            info!(
                chunk = chunk_idx + 1,
                total_chunks,
                keys = chunk_keys.len(),
                "Committed catalog chunk"
            );
        }

        Ok(())
    }

    /// Shallow copy of both maps for rollback.
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            catalogs: self.catalogs.read().clone(),
            metas: self.metas.read().clone(),
        }
    }

    /// Replace both maps wholesale. Used only on refresh failure.
    pub fn restore(&self, snapshot: CacheSnapshot) {
        *self.catalogs.write() = snapshot.catalogs;
        *self.metas.write() = snapshot.metas;
    }
}

fn validate_entry(key: &str, entry: &CatalogEntry) -> Result<(), String> {
    if key.trim().is_empty() {
        return Err("empty catalog id".to_string());
    }
    if let Some(item) = entry.items.iter().find(|i| i.id.trim().is_empty()) {
        return Err(format!(
            "catalog '{}' contains an item with an empty id: {:?}",
            key, item
        ));
    }
    Ok(())
}
