//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires a seeded [`CatalogStore`], a stub
//! gateway, and a full [`CatalogService`]. The [`with_server`] constructor
//! starts Axum on a random port for HTTP-level testing.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use cinefeed::model::{
    CatalogDescriptor, CatalogEntry, CatalogItem, ChangeLogEntry, Manifest, MetaRecord,
};
use cinefeed::posters::{PosterClient, DEFAULT_WORKERS};
use cinefeed::provider::{CatalogFetch, CatalogGateway};
use cinefeed::server::{create_router, AppContext};
use cinefeed::service::CatalogService;
use cinefeed::store::{CatalogStore, DEFAULT_CHUNK_SIZE};

/// Gateway stub with canned meta records; no network.
#[derive(Default)]
pub struct StubGateway {
    pub metas: HashMap<String, MetaRecord>,
    pub changes: Vec<ChangeLogEntry>,
}

#[async_trait]
impl CatalogGateway for StubGateway {
    async fn fetch_all_catalogs(&self) -> anyhow::Result<CatalogFetch> {
        Ok(CatalogFetch::default())
    }

    async fn resolve_metas(&self, ids: &[String]) -> anyhow::Result<HashMap<String, MetaRecord>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.metas.get(id).map(|m| (id.clone(), m.clone())))
            .collect())
    }

    async fn simplified_genre(&self, _genre: &str) -> Option<String> {
        None
    }

    async fn recent_changes(&self) -> anyhow::Result<Vec<ChangeLogEntry>> {
        Ok(self.changes.clone())
    }
}

/// Test harness wrapping a fully-constructed [`CatalogService`] backed by a
/// seeded in-memory store.
pub struct TestHarness {
    pub service: Arc<CatalogService>,
    pub store: Arc<CatalogStore>,
}

impl TestHarness {
    /// Harness with a seeded store: one three-item catalog, a two-entry
    /// manifest, and gateway-resolvable metas for every item.
    pub fn seeded() -> Self {
        let store = Arc::new(CatalogStore::new(DEFAULT_CHUNK_SIZE));

        let mut catalogs = HashMap::new();
        catalogs.insert(
            "netflix.popular.movie".to_string(),
            CatalogEntry {
                items: vec![
                    item("tt1", 2020, &["Drama"]),
                    item("tt2", 2021, &["Comedy"]),
                    item("tt3", 2020, &["Drama"]),
                ],
            },
        );
        store
            .update_catalogs(catalogs)
            .expect("seed catalogs are valid");

        let mut manifest = Manifest::default();
        manifest.version = "2.0.0".to_string();
        manifest.catalogs = vec![
            descriptor("netflix.popular.movie", "movie", "Popular"),
            descriptor("hulu.top.series", "series", "Top"),
        ];
        store.set_manifest(manifest);

        let mut gateway = StubGateway::default();
        for (id, title) in [("tt1", "One"), ("tt2", "Two"), ("tt3", "Three")] {
            gateway.metas.insert(
                id.to_string(),
                MetaRecord {
                    id: id.to_string(),
                    title: title.to_string(),
                    poster: None,
                    extra: HashMap::new(),
                },
            );
        }

        Self::with_parts(store, gateway)
    }

    /// Harness over an empty store; health checks should report degraded.
    pub fn empty() -> Self {
        let store = Arc::new(CatalogStore::new(DEFAULT_CHUNK_SIZE));
        Self::with_parts(store, StubGateway::default())
    }

    pub fn with_parts(store: Arc<CatalogStore>, gateway: StubGateway) -> Self {
        let service = Arc::new(CatalogService::new(
            store.clone(),
            Arc::new(gateway),
            PosterClient::new(Some("http://127.0.0.1:9".to_string()), DEFAULT_WORKERS),
            "Cinefeed Catalog".to_string(),
            Arc::new(RwLock::new(Utc::now())),
        ));
        Self { service, store }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::serve(Self::seeded()).await
    }

    /// Start a server over an empty store.
    pub async fn with_empty_server() -> (Self, SocketAddr) {
        Self::serve(Self::empty()).await
    }

    async fn serve(harness: Self) -> (Self, SocketAddr) {
        let app = create_router(AppContext {
            service: harness.service.clone(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}

fn item(id: &str, year: u16, genres: &[&str]) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        year: Some(year),
        genres: genres.iter().map(|g| g.to_string()).collect(),
    }
}

fn descriptor(id: &str, media_type: &str, name: &str) -> CatalogDescriptor {
    CatalogDescriptor {
        id: id.to_string(),
        media_type: media_type.to_string(),
        name: name.to_string(),
        extra: HashMap::new(),
    }
}
