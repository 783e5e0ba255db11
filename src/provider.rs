//! Upstream catalog gateway.
//!
//! [`CatalogGateway`] is the seam between the refresh/query engine and the
//! external catalog source. The backend behind it (aggregated providers,
//! durable storage) is an external collaborator; the trait is the narrow
//! get/put interface this crate depends on. Tests substitute stub
//! implementations.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::model::{CatalogEntry, ChangeLogEntry, Manifest, MetaRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a full refresh pulls from upstream in one go.
#[derive(Debug, Clone, Default)]
pub struct CatalogFetch {
    pub manifest: Manifest,
    pub catalogs: HashMap<String, CatalogEntry>,
}

/// Async interface to the upstream catalog/metadata source.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Fetch the manifest and every catalog listing. An empty catalog set is
    /// treated as a refresh failure by the caller.
    async fn fetch_all_catalogs(&self) -> anyhow::Result<CatalogFetch>;

    /// Resolve full metadata records for `ids`. Ids the upstream cannot
    /// resolve are absent from the result.
    async fn resolve_metas(&self, ids: &[String]) -> anyhow::Result<HashMap<String, MetaRecord>>;

    /// Map a display genre to its simplified canonical form, when the
    /// upstream knows one. Callers fall back to the raw string.
    async fn simplified_genre(&self, genre: &str) -> Option<String>;

    /// Recent insert/update/delete activity from the upstream change log.
    async fn recent_changes(&self) -> anyhow::Result<Vec<ChangeLogEntry>>;
}

/// HTTP-backed gateway talking to the upstream aggregation service.
pub struct HttpCatalogGateway {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ResolveRequest<'a> {
    keys: &'a [String],
}

impl HttpCatalogGateway {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl CatalogGateway for HttpCatalogGateway {
    async fn fetch_all_catalogs(&self) -> anyhow::Result<CatalogFetch> {
        let manifest_url = self.url("/manifest");
        debug!(url = %manifest_url, "Fetching upstream manifest");
        let manifest: Manifest = self
            .client
            .get(&manifest_url)
            .send()
            .await
            .with_context(|| format!("upstream request failed: {manifest_url}"))?
            .error_for_status()
            .context("upstream manifest request returned error")?
            .json()
            .await
            .context("failed to parse upstream manifest")?;

        let catalogs_url = self.url("/catalogs");
        debug!(url = %catalogs_url, "Fetching upstream catalogs");
        let catalogs: HashMap<String, CatalogEntry> = self
            .client
            .get(&catalogs_url)
            .send()
            .await
            .with_context(|| format!("upstream request failed: {catalogs_url}"))?
            .error_for_status()
            .context("upstream catalogs request returned error")?
            .json()
            .await
            .context("failed to parse upstream catalogs")?;

        Ok(CatalogFetch { manifest, catalogs })
    }

    async fn resolve_metas(&self, ids: &[String]) -> anyhow::Result<HashMap<String, MetaRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = self.url("/metas");
        debug!(url = %url, count = ids.len(), "Resolving metadata records");
        let metas: HashMap<String, MetaRecord> = self
            .client
            .post(&url)
            .json(&ResolveRequest { keys: ids })
            .send()
            .await
            .with_context(|| format!("upstream request failed: {url}"))?
            .error_for_status()
            .context("upstream metas request returned error")?
            .json()
            .await
            .context("failed to parse upstream metas")?;

        Ok(metas)
    }

    async fn simplified_genre(&self, genre: &str) -> Option<String> {
        let url = self.url("/genres/simplified");
        let resp = self
            .client
            .get(&url)
            .query(&[("name", genre)])
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;

        let body: serde_json::Value = resp.json().await.ok()?;
        body.get("simplified")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    async fn recent_changes(&self) -> anyhow::Result<Vec<ChangeLogEntry>> {
        let url = self.url("/changes");
        debug!(url = %url, "Fetching upstream change log");
        let changes: Vec<ChangeLogEntry> = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("upstream request failed: {url}"))?
            .error_for_status()
            .context("upstream changes request returned error")?
            .json()
            .await
            .context("failed to parse upstream change log")?;

        Ok(changes)
    }
}
