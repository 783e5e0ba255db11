//! Core data shapes shared between the store, the query engine, and the
//! HTTP surface.
//!
//! Two distinct shapes represent a media entity: a [`CatalogItem`] is the
//! lightweight reference carried inside a catalog listing, while a
//! [`MetaRecord`] is the fully resolved metadata keyed by the same id. The
//! split is decided once at the gateway boundary; nothing downstream needs
//! to inspect a value to tell the shapes apart.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Addon manifest: name, version and the catalog descriptors it exposes.
///
/// Replaced wholesale by a successful refresh; request paths only clone it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub catalogs: Vec<CatalogDescriptor>,
    /// Fields we pass through without interpreting.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A single catalog listed in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDescriptor {
    /// Dot-delimited catalog identifier, e.g. `netflix.popular.movie`.
    pub id: String,
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Catalog entries and items
// ---------------------------------------------------------------------------

/// An ordered catalog listing. Item order is significant and must survive
/// every query-engine pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub items: Vec<CatalogItem>,
}

/// Lightweight reference to a media entity within a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Fully resolved metadata for a media entity, keyed by id and shared
/// across catalogs. Resolution is all-or-nothing per id; a record is never
/// partially overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Catalog response body: `{ "metas": [...], "total": n }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub metas: Vec<MetaRecord>,
    pub total: usize,
}

impl CatalogResponse {
    pub fn new(metas: Vec<MetaRecord>) -> Self {
        let total = metas.len();
        Self { metas, total }
    }

    pub fn empty() -> Self {
        Self {
            metas: Vec::new(),
            total: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Change log
// ---------------------------------------------------------------------------

/// One entry from the upstream change log, as supplied by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub table_name: String,
    pub timestamp: String,
    #[serde(default)]
    pub inserted_keys: Vec<String>,
    #[serde(default)]
    pub updated_keys: Vec<String>,
    #[serde(default)]
    pub deleted_keys: Vec<String>,
}
