//! Shared-cache layer for rendered pages.
//!
//! Page requests are looked up by URL and, on a miss, a sanitised copy of a
//! successful origin response is written back from a detached task. Fragment
//! requests never touch the page cache.

use axum::{
    body::{Body, HttpBody as _},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use metrics::counter;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;

use super::auth_guard::USER_HEADER_PREFIX;
use crate::config::{CacheConfig, CacheKeyPolicy, FragmentPolicy};
use crate::services::{CachedResponse, ResponseCache};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Partial-render request, marked by the fragment header.
    Fragment,
    /// Full page load eligible for the shared page cache.
    Page,
    /// Never cached: unsafe methods, excluded paths, personalised requests.
    Bypass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Hit,
    Miss,
    Bypass,
    Fragment,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Outcome::Hit => "hit",
            Outcome::Miss => "miss",
            Outcome::Bypass => "bypass",
            Outcome::Fragment => "fragment",
        }
    }

    /// Diagnostic header value; fragments never come from the page cache.
    fn header_value(self) -> &'static str {
        match self {
            Outcome::Hit => "HIT",
            Outcome::Miss => "MISS",
            Outcome::Bypass | Outcome::Fragment => "BYPASS",
        }
    }
}

pub fn classify_request(config: &CacheConfig, session_cookie: &str, req: &Request) -> RequestKind {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return RequestKind::Bypass;
    }

    let path = req.uri().path();
    if config
        .excluded_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return RequestKind::Bypass;
    }

    if CookieJar::from_headers(req.headers())
        .get(session_cookie)
        .is_some()
    {
        return RequestKind::Bypass;
    }

    let is_fragment = req
        .headers()
        .get(config.fragment_header.as_str())
        .is_some_and(|v| !v.is_empty());

    if is_fragment {
        RequestKind::Fragment
    } else {
        RequestKind::Page
    }
}

/// Cache key for a page request: `scheme://host/path?query`.
pub fn cache_key(policy: CacheKeyPolicy, req: &Request) -> String {
    let uri = req.uri();
    let headers = req.headers();

    let scheme = uri
        .scheme_str()
        .or_else(|| header_str(headers, "x-forwarded-proto"))
        .unwrap_or("http");
    let host = uri
        .host()
        .or_else(|| header_str(headers, header::HOST.as_str()))
        .unwrap_or("localhost");

    let mut key = format!("{}://{}{}", scheme, host, uri.path());
    if let Some(query) = uri.query().filter(|q| !q.is_empty()) {
        key.push('?');
        match policy {
            CacheKeyPolicy::FullUrl => key.push_str(query),
            CacheKeyPolicy::NormalizedQuery => key.push_str(&normalize_query(query)),
        }
    }
    key
}

fn normalize_query(query: &str) -> String {
    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(mut pairs) => {
            pairs.sort();
            serde_urlencoded::to_string(&pairs).unwrap_or_else(|_| query.to_string())
        }
        Err(_) => query.to_string(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn shared_cache_control(ttl: u64, stale_while_revalidate: u64) -> HeaderValue {
    let value = format!(
        "public, s-maxage={}, stale-while-revalidate={}",
        ttl, stale_while_revalidate
    );
    HeaderValue::from_str(&value).unwrap_or(HeaderValue::from_static("public"))
}

/// Headers that may enter the shared cache: no `Vary`, no cookies and no
/// per-user mirrors. `None` when a kept value is not visible ASCII, since a
/// hit could not replay it.
fn sanitized_headers(headers: &HeaderMap) -> Option<Vec<(String, String)>> {
    headers
        .iter()
        .filter(|(name, _)| {
            *name != header::VARY
                && *name != header::SET_COOKIE
                && !name.as_str().starts_with(USER_HEADER_PREFIX)
        })
        .map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn stamp(response: &mut Response, config: &CacheConfig, outcome: Outcome) {
    counter!("edge_cache_requests_total", "outcome" => outcome.label()).increment(1);
    if config.status_header.is_empty() {
        return;
    }
    if let Ok(name) = HeaderName::from_bytes(config.status_header.as_bytes()) {
        response
            .headers_mut()
            .insert(name, HeaderValue::from_static(outcome.header_value()));
    }
}

fn cached_response(entry: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(entry.body));
    *response.status_mut() = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);

    let headers = response.headers_mut();
    for (name, value) in entry.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.append(name, value);
        }
    }
    response
}

pub async fn edge_cache_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let config = &state.config.cache;
    if !config.enabled {
        return next.run(req).await;
    }

    match classify_request(config, &state.config.session.cookie_name, &req) {
        RequestKind::Bypass => {
            let mut response = next.run(req).await;
            stamp(&mut response, config, Outcome::Bypass);
            response
        }
        RequestKind::Fragment => {
            let mut response = next.run(req).await;
            apply_fragment_policy(&mut response, config);
            stamp(&mut response, config, Outcome::Fragment);
            response
        }
        RequestKind::Page => serve_page(state.cache.clone(), config, req, next).await,
    }
}

fn apply_fragment_policy(response: &mut Response, config: &CacheConfig) {
    let success = response.status().is_success();
    let headers = response.headers_mut();
    match config.fragment_policy {
        FragmentPolicy::ShortTtl if !success => {}
        FragmentPolicy::ShortTtl => {
            headers.remove(header::VARY);
            headers.insert(
                header::CACHE_CONTROL,
                shared_cache_control(
                    config.fragment_ttl_seconds,
                    config.stale_while_revalidate_seconds,
                ),
            );
        }
        FragmentPolicy::Bypass => {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        }
    }
}

async fn serve_page(
    cache: Arc<dyn ResponseCache>,
    config: &CacheConfig,
    req: Request,
    next: Next,
) -> Response {
    let key = cache_key(config.key_policy, &req);
    // HEAD responses carry no body, so they may read the cache but never fill it.
    let writable = req.method() == Method::GET;

    match cache.get(&key).await {
        Ok(Some(entry)) => {
            tracing::debug!(key = %key, "Edge cache hit");
            let mut response = cached_response(entry);
            stamp(&mut response, config, Outcome::Hit);
            return response;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Edge cache lookup failed, treating as miss");
        }
    }

    let mut response = next.run(req).await;
    if !writable || !response.status().is_success() {
        stamp(&mut response, config, Outcome::Miss);
        return response;
    }

    let length = response
        .body()
        .size_hint()
        .exact()
        .or_else(|| {
            header_str(response.headers(), header::CONTENT_LENGTH.as_str())
                .and_then(|v| v.parse::<u64>().ok())
        });
    let cacheable = length.is_some_and(|len| len <= config.max_body_bytes as u64);
    if !cacheable {
        tracing::debug!(key = %key, ?length, "Response not cacheable by size");
        stamp(&mut response, config, Outcome::Miss);
        return response;
    }

    if sanitized_headers(response.headers()).is_none() {
        tracing::debug!(key = %key, "Response has opaque header values, not caching");
        stamp(&mut response, config, Outcome::Miss);
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Failed to buffer origin response");
            return AppError::InternalError(anyhow::anyhow!("Failed to read response body"))
                .into_response();
        }
    };

    parts.headers.remove(header::VARY);
    parts.headers.insert(
        header::CACHE_CONTROL,
        shared_cache_control(config.page_ttl_seconds, config.stale_while_revalidate_seconds),
    );

    let entry = CachedResponse {
        status: parts.status.as_u16(),
        headers: sanitized_headers(&parts.headers).unwrap_or_default(),
        body: bytes.to_vec(),
        stored_at: Utc::now(),
    };
    let ttl = Duration::from_secs(config.page_ttl_seconds);

    // Detached: the caller never waits on the cache write.
    tokio::spawn(async move {
        if let Err(e) = cache.put(&key, &entry, ttl).await {
            counter!("edge_cache_store_failures_total").increment(1);
            tracing::warn!(key = %key, error = %e, "Edge cache write failed");
        }
    });

    let mut response = Response::from_parts(parts, Body::from(bytes));
    stamp(&mut response, config, Outcome::Miss);
    response
}
