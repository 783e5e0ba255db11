use crate::server::AppContext;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

/// Cache duration classes for response headers.
#[derive(Debug, Clone, Copy)]
enum CacheClass {
    Short,    // 15 minutes
    Medium,   // 4 hours
    VeryLong, // 7 days
}

impl CacheClass {
    fn max_age(self) -> u64 {
        match self {
            CacheClass::Short => 60 * 15,
            CacheClass::Medium => 60 * 60 * 4,
            CacheClass::VeryLong => 60 * 60 * 24 * 7,
        }
    }
}

/// JSON response with a Cache-Control policy derived from the duration
/// class: half the max-age as stale-while-revalidate, double as
/// stale-if-error.
fn cached_json<T: Serialize>(class: CacheClass, body: T) -> Response {
    let max_age = class.max_age();
    let policy = format!(
        "public, max-age={max_age}, stale-while-revalidate={}, stale-if-error={}",
        max_age / 2,
        max_age * 2
    );
    (
        [
            (header::CACHE_CONTROL, policy),
            (header::VARY, "Accept-Encoding".to_string()),
        ],
        Json(body),
    )
        .into_response()
}

/// Route segments arrive with their literal `.json` suffix attached.
fn strip_json_suffix(segment: &str) -> &str {
    segment.strip_suffix(".json").unwrap_or(segment)
}

/// The request's own base URL, reconstructed from the Host header.
fn base_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}/")
}

pub fn addon_routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/manifest.json", get(manifest))
        .route("/c/{configs}/manifest.json", get(configured_manifest))
        .route("/catalog/{type}/{id}", get(catalog))
        .route("/catalog/{type}/{id}/{extras}", get(catalog_with_extras))
        .route("/c/{configs}/catalog/{type}/{id}", get(configured_catalog))
        .route(
            "/c/{configs}/catalog/{type}/{id}/{extras}",
            get(configured_catalog_with_extras),
        )
        .route("/meta/{type}/{id}", get(meta))
        .route("/c/{configs}/meta/{type}/{id}", get(configured_meta))
        .route("/last_update.txt", get(last_update))
        .route("/recent_changes.json", get(recent_changes))
        .route("/catalog_tree.json", get(catalog_tree))
}

async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    if ctx.service.is_ready() {
        (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "error"})),
        )
    }
}

async fn manifest(State(ctx): State<AppContext>, headers: HeaderMap) -> Response {
    let body = ctx.service.configured_manifest(&base_url(&headers), None);
    cached_json(CacheClass::Short, body)
}

async fn configured_manifest(
    State(ctx): State<AppContext>,
    Path(configs): Path<String>,
    headers: HeaderMap,
) -> Response {
    let body = ctx
        .service
        .configured_manifest(&base_url(&headers), Some(&configs));
    cached_json(CacheClass::Short, body)
}

async fn catalog(
    State(ctx): State<AppContext>,
    Path((media_type, id)): Path<(String, String)>,
) -> Response {
    serve_catalog(&ctx, &media_type, &id, None, None).await
}

async fn catalog_with_extras(
    State(ctx): State<AppContext>,
    Path((media_type, id, extras)): Path<(String, String, String)>,
) -> Response {
    serve_catalog(&ctx, &media_type, &id, Some(extras), None).await
}

async fn configured_catalog(
    State(ctx): State<AppContext>,
    Path((configs, media_type, id)): Path<(String, String, String)>,
) -> Response {
    serve_catalog(&ctx, &media_type, &id, None, Some(configs)).await
}

async fn configured_catalog_with_extras(
    State(ctx): State<AppContext>,
    Path((configs, media_type, id, extras)): Path<(String, String, String, String)>,
) -> Response {
    serve_catalog(&ctx, &media_type, &id, Some(extras), Some(configs)).await
}

async fn serve_catalog(
    ctx: &AppContext,
    _media_type: &str,
    id: &str,
    extras: Option<String>,
    configs: Option<String>,
) -> Response {
    let id = strip_json_suffix(id);
    let extras = extras.as_deref().map(strip_json_suffix);

    match ctx
        .service
        .configured_catalog(id, extras, configs.as_deref())
        .await
    {
        Ok(body) => cached_json(CacheClass::Medium, body),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn meta(
    State(ctx): State<AppContext>,
    Path((media_type, id)): Path<(String, String)>,
) -> Response {
    serve_meta(&ctx, &media_type, &id).await
}

async fn configured_meta(
    State(ctx): State<AppContext>,
    Path((_configs, media_type, id)): Path<(String, String, String)>,
) -> Response {
    serve_meta(&ctx, &media_type, &id).await
}

async fn serve_meta(ctx: &AppContext, _media_type: &str, id: &str) -> Response {
    let body = ctx.service.meta(strip_json_suffix(id)).await;
    cached_json(CacheClass::VeryLong, body)
}

async fn last_update(State(ctx): State<AppContext>) -> impl IntoResponse {
    ctx.service
        .last_update()
        .format("%m/%d/%Y, %H:%M:%S")
        .to_string()
}

async fn recent_changes(State(ctx): State<AppContext>) -> Response {
    match ctx.service.recent_changes().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch recent changes: {e:#}");
            (StatusCode::BAD_GATEWAY, "upstream change log unavailable").into_response()
        }
    }
}

async fn catalog_tree(State(ctx): State<AppContext>) -> Response {
    cached_json(CacheClass::Medium, ctx.service.catalog_tree())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_suffix_is_stripped_once() {
        assert_eq!(strip_json_suffix("netflix.popular.json"), "netflix.popular");
        assert_eq!(strip_json_suffix("genre=Drama.json"), "genre=Drama");
        assert_eq!(strip_json_suffix("plain"), "plain");
    }

    #[test]
    fn cache_policy_scales_with_class() {
        let resp = cached_json(CacheClass::Short, serde_json::json!({}));
        let policy = resp
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(policy.contains("max-age=900"));
        assert!(policy.contains("stale-while-revalidate=450"));
        assert!(policy.contains("stale-if-error=1800"));
    }

    #[test]
    fn base_url_falls_back_without_host() {
        let headers = HeaderMap::new();
        assert_eq!(base_url(&headers), "http://localhost/");
    }
}
