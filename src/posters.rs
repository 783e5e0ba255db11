//! Poster enrichment against the rating-poster provider.
//!
//! Enrichment is gated on the provider's remaining request quota: a batch
//! larger than the remaining quota is returned untouched (all-or-nothing,
//! never partially enriched). Quota lookup failures count as zero
//! remaining. Enrichment itself runs with bounded parallelism and preserves
//! input order by index.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::model::MetaRecord;

const DEFAULT_BASE_URL: &str = "https://api.ratingposterdb.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// API keys with this prefix get poster URLs without a `lang` parameter.
const NO_LANG_KEY_PREFIX: &str = "t1-";

/// Default bound on concurrent enrichment work.
pub const DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    req: u64,
    limit: u64,
}

/// Client for the poster provider.
pub struct PosterClient {
    client: reqwest::Client,
    base_url: String,
    workers: usize,
}

impl PosterClient {
    pub fn new(base_url: Option<String>, workers: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            workers: workers.max(1),
        }
    }

    /// Check whether `api_key` is accepted by the provider.
    pub async fn validate_key(&self, api_key: &str) -> bool {
        if api_key.is_empty() {
            return false;
        }
        let url = format!("{}/{}/isValid", self.base_url, api_key);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Poster key validation request failed");
                false
            }
        }
    }

    /// Remaining request quota for `api_key`. Any failure (network error,
    /// non-success status, malformed body) is treated as zero remaining.
    pub async fn requests_left(&self, api_key: &str) -> u64 {
        let url = format!("{}/{}/requests", self.base_url, api_key);

        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "Poster quota request failed");
                return 0;
            }
        };

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "Poster quota request returned non-success");
            return 0;
        }

        match resp.json::<QuotaResponse>().await {
            Ok(quota) => quota.limit.saturating_sub(quota.req),
            Err(e) => {
                warn!(error = %e, "Failed to parse poster quota response");
                0
            }
        }
    }

    /// Deterministic poster URL for an item. The `lang` parameter is
    /// omitted for keys with the recognized no-lang prefix.
    pub fn poster_url(&self, imdb_id: &str, api_key: &str, lang: &str) -> String {
        let url = format!(
            "{}/{}/imdb/poster-default/{}.jpg?fallback=true",
            self.base_url, api_key, imdb_id
        );
        if api_key.starts_with(NO_LANG_KEY_PREFIX) {
            url
        } else {
            format!("{url}&lang={lang}")
        }
    }

    /// Replace the poster field on every record in `metas`.
    ///
    /// Skipped entirely when the remaining quota is smaller than the batch;
    /// the input is returned unchanged. Work is bounded to a fixed number
    /// of concurrent units and the result preserves input order.
    pub async fn replace_posters(
        &self,
        metas: Vec<MetaRecord>,
        api_key: &str,
        lang: &str,
    ) -> Vec<MetaRecord> {
        if metas.is_empty() {
            return metas;
        }

        let remaining = self.requests_left(api_key).await;
        if remaining < metas.len() as u64 {
            info!(
                remaining,
                batch = metas.len(),
                "Insufficient poster quota, skipping enrichment"
            );
            return metas;
        }

        stream::iter(metas.into_iter().map(|mut meta| {
            let poster = self.poster_url(&meta.id, api_key, lang);
            async move {
                meta.poster = Some(poster);
                meta
            }
        }))
        // `buffered` keeps completion order equal to input order.
        .buffered(self.workers)
        .collect()
        .await
    }
}
