//! Request-path orchestration.
//!
//! [`CatalogService`] ties the store, the gateway, and the poster client
//! together behind the operations the HTTP layer exposes: configured
//! manifests, configured catalogs, single-meta lookups, the catalog tree,
//! and the recent-changes report.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::model::{CatalogResponse, ChangeLogEntry};
use crate::posters::PosterClient;
use crate::provider::CatalogGateway;
use crate::query::tree::{build_tree, CatalogTreeNode};
use crate::query::{filter_items, parse_extras, reorder_metas, resolve_metas, ExtrasError};
use crate::store::CatalogStore;

/// Id prefix used by this addon's own meta ids.
const META_ID_PREFIX: &str = "cinefeed:";

/// Length of the md5 prefix identifying a catalog in user configuration.
const SELECTION_HASH_LEN: usize = 5;

// ---------------------------------------------------------------------------
// User configuration string
// ---------------------------------------------------------------------------

/// Parsed pipe-delimited user configuration
/// (`catalogs=ab12c,de34f|rpdb=KEY|lang=en`). Malformed tokens are skipped
/// silently; unknown keys are retained but unused.
#[derive(Debug, Clone, Default)]
pub struct UserConfig {
    values: HashMap<String, String>,
}

impl UserConfig {
    pub fn parse(configs: &str) -> Self {
        let mut values = HashMap::new();
        for token in configs.split('|') {
            let parts: Vec<&str> = token.split('=').collect();
            if parts.len() != 2 {
                continue;
            }
            values.insert(parts[0].to_string(), parts[1].to_string());
        }
        Self { values }
    }

    /// Selected catalog hash prefixes, in the order the user listed them.
    /// An empty value still yields one (empty) token, which selects nothing
    /// but counts as a supplied selection.
    pub fn catalog_selection(&self) -> Option<Vec<&str>> {
        self.values.get("catalogs").map(|v| v.split(',').collect())
    }

    pub fn rpdb_key(&self) -> Option<&str> {
        self.values.get("rpdb").map(String::as_str)
    }

    pub fn lang(&self) -> &str {
        self.values.get("lang").map(String::as_str).unwrap_or("en")
    }
}

/// First five hex characters of the md5 of a catalog id; the form catalog
/// selections are expressed in.
pub fn selection_hash(catalog_id: &str) -> String {
    format!("{:x}", md5::compute(catalog_id.as_bytes()))[..SELECTION_HASH_LEN].to_string()
}

// ---------------------------------------------------------------------------
// Recent-changes report
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ChangeReport {
    pub summary: ChangeSummary,
    pub changes_by_table: BTreeMap<String, TableChanges>,
    pub details: Vec<ChangeLogEntry>,
}

#[derive(Debug, Serialize)]
pub struct ChangeSummary {
    pub total_changes: usize,
    pub last_update: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct TableChanges {
    pub insertions: usize,
    pub updates: usize,
    pub deletions: usize,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct CatalogService {
    store: Arc<CatalogStore>,
    gateway: Arc<dyn CatalogGateway>,
    posters: PosterClient,
    app_name: String,
    last_update: Arc<RwLock<DateTime<Utc>>>,
}

impl CatalogService {
    pub fn new(
        store: Arc<CatalogStore>,
        gateway: Arc<dyn CatalogGateway>,
        posters: PosterClient,
        app_name: String,
        last_update: Arc<RwLock<DateTime<Utc>>>,
    ) -> Self {
        Self {
            store,
            gateway,
            posters,
            app_name,
            last_update,
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        *self.last_update.read()
    }

    /// The cached manifest shaped for a specific request: runtime name,
    /// artwork URLs, timestamps, and the catalog list narrowed to the
    /// user's selection (empty without a configuration).
    pub fn configured_manifest(&self, base_url: &str, configs: Option<&str>) -> Value {
        let manifest = self.store.manifest();
        let base = base_url.trim_end_matches('/');

        let mut body = match serde_json::to_value(&manifest) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };

        body.insert("name".to_string(), json!(self.app_name));
        body.insert("logo".to_string(), json!(format!("{base}/logo.png")));
        body.insert(
            "background".to_string(),
            json!(format!("{base}/background.png")),
        );
        body.insert("version".to_string(), json!(manifest.version));
        body.insert(
            "last_update".to_string(),
            json!(self.last_update().to_rfc3339()),
        );

        let selection = configs
            .map(UserConfig::parse)
            .and_then(|c| c.catalog_selection().map(|s| s.iter().map(|v| v.to_string()).collect::<Vec<_>>()));

        let Some(selection) = selection else {
            body.insert("catalogs".to_string(), json!([]));
            return Value::Object(body);
        };

        let mut selected = Vec::new();
        for value in &selection {
            for descriptor in &manifest.catalogs {
                if selection_hash(&descriptor.id) == *value {
                    selected.push(descriptor.clone());
                }
            }
        }

        // A supplied `catalogs` key marks the manifest configurable even
        // when none of its values match a catalog.
        body.insert(
            "behaviorHints".to_string(),
            json!({"configurable": true, "configurationRequired": false}),
        );
        body.insert(
            "catalogs".to_string(),
            serde_json::to_value(&selected).unwrap_or_else(|_| json!([])),
        );
        Value::Object(body)
    }

    /// The full catalog request path: read the cached listing, filter and
    /// paginate, resolve missing records through the gateway, restore the
    /// listing order, and optionally enrich posters.
    ///
    /// Unknown catalog ids produce an empty response, not an error; only a
    /// malformed `extras` string fails.
    pub async fn configured_catalog(
        &self,
        id: &str,
        extras: Option<&str>,
        configs: Option<&str>,
    ) -> Result<CatalogResponse, ExtrasError> {
        let Some(entry) = self.store.get(id) else {
            return Ok(CatalogResponse::empty());
        };

        let parsed = parse_extras(extras)?;

        // Numeric genres are year filters; everything else goes through the
        // external simplification lookup with the raw string as fallback.
        let genre = match parsed.genre {
            Some(g) if g.parse::<u16>().is_err() => {
                Some(self.gateway.simplified_genre(&g).await.unwrap_or(g))
            }
            other => other,
        };

        let filtered = filter_items(&entry.items, genre.as_deref(), parsed.skip);

        let (mut resolved, missing) = resolve_metas(&filtered, &self.store);
        if !missing.is_empty() {
            match self.gateway.resolve_metas(&missing).await {
                Ok(new_metas) => {
                    self.store.merge_metas(new_metas.clone());
                    resolved.extend(new_metas.into_values());
                }
                Err(e) => {
                    // Serve what the cache already has rather than failing
                    // the whole request.
                    warn!(catalog = id, error = %e, "Failed to resolve uncached metas");
                }
            }
        }

        let mut ordered = reorder_metas(resolved, &filtered);

        let user = configs.map(UserConfig::parse).unwrap_or_default();
        if let Some(key) = user.rpdb_key() {
            ordered = self.posters.replace_posters(ordered, key, user.lang()).await;
        }

        Ok(CatalogResponse::new(ordered))
    }

    /// Single-record lookup; the store first, then the gateway. A missing
    /// id yields an empty meta object.
    pub async fn meta(&self, id: &str) -> Value {
        let id = id.strip_prefix(META_ID_PREFIX).unwrap_or(id).to_string();

        let cached = self.store.get_metas(std::slice::from_ref(&id));
        if let Some(meta) = cached.get(&id) {
            return json!({ "meta": meta });
        }

        match self.gateway.resolve_metas(std::slice::from_ref(&id)).await {
            Ok(metas) => match metas.get(&id) {
                Some(meta) => {
                    self.store
                        .merge_metas(HashMap::from([(id.clone(), meta.clone())]));
                    json!({ "meta": meta })
                }
                None => json!({ "meta": {} }),
            },
            Err(e) => {
                warn!(meta_id = %id, error = %e, "Meta resolution failed");
                json!({ "meta": {} })
            }
        }
    }

    /// Nested catalog hierarchy for configuration UIs, rebuilt from the
    /// cached manifest on every call.
    pub fn catalog_tree(&self) -> Vec<CatalogTreeNode> {
        build_tree(&self.store.manifest().catalogs).to_nodes()
    }

    /// Aggregate the upstream change log into per-table counts.
    pub async fn recent_changes(&self) -> Result<ChangeReport> {
        let changes = self.gateway.recent_changes().await?;

        let mut by_table: BTreeMap<String, TableChanges> = BTreeMap::new();
        for change in &changes {
            let entry = by_table.entry(change.table_name.clone()).or_default();
            entry.insertions += change.inserted_keys.len();
            entry.updates += change.updated_keys.len();
            entry.deletions += change.deleted_keys.len();
        }

        Ok(ChangeReport {
            summary: ChangeSummary {
                total_changes: changes.len(),
                last_update: changes.first().map(|c| c.timestamp.clone()),
            },
            changes_by_table: by_table,
            details: changes,
        })
    }

    /// Enriched record count placeholder used by health reporting.
    pub fn is_ready(&self) -> bool {
        !self.store.is_empty()
    }
}
