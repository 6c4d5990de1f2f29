// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Static route table and the downstream forwarder.
//!
//! Requests that get past the gateway filter land here. The path selects a
//! route by longest prefix, the route hands out its instances round-robin,
//! and the request is replayed against the chosen instance with `reqwest`.
//! Every failure on the way is returned as a [`GatewayError`] for the error
//! boundary to classify.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode, Uri},
    response::Response,
};
use futures::TryStreamExt;
use url::Url;

use crate::config::{GatewayConfig, RouteConfig};
use crate::error::GatewayError;
use crate::policy::has_dot_segment;
use crate::response::ResponseWriter;

/// Connection-scoped headers that never cross a proxy.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// A path prefix served by one named service.
#[derive(Debug)]
pub struct Route {
    service: String,
    prefix: String,
    instances: Vec<Url>,
    cursor: AtomicUsize,
}

impl Route {
    pub fn new(service: impl Into<String>, prefix: impl Into<String>, instances: Vec<Url>) -> Self {
        Self {
            service: service.into(),
            prefix: prefix.into(),
            instances,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn instances(&self) -> &[Url] {
        &self.instances
    }

    /// Whether `path` falls under this route's prefix on a segment boundary.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix.ends_with('/') {
            return path.starts_with(self.prefix.as_str());
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Next instance in round-robin order.
    pub fn next_instance(&self) -> Option<&Url> {
        if self.instances.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.instances.len();
        self.instances.get(i)
    }
}

/// All configured routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn from_config(routes: &[RouteConfig]) -> Self {
        Self::new(
            routes
                .iter()
                .map(|r| Route::new(&r.service, &r.prefix, r.instances.clone()))
                .collect(),
        )
    }

    /// Route with the longest prefix matching `path`.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|route| route.matches(path))
            .max_by_key(|route| route.prefix.len())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Whether at least one route can actually be served.
    pub fn has_instances(&self) -> bool {
        self.routes.iter().any(|r| !r.instances.is_empty())
    }
}

/// Forwarding state: routes, HTTP client and body limit.
#[derive(Debug)]
pub struct Proxy {
    routes: RouteTable,
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl Proxy {
    pub fn new(routes: RouteTable, client: reqwest::Client, max_body_bytes: usize) -> Self {
        Self {
            routes,
            client,
            max_body_bytes,
        }
    }

    /// Build the proxy and its client from configuration.
    ///
    /// Redirects are handed back to the caller, never followed.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .connect_timeout(config.upstream_connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self::new(
            RouteTable::from_config(&config.routes),
            client,
            config.max_body_bytes,
        ))
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

/// Target URL on `instance` for the inbound `uri`.
fn target_url(instance: &Url, uri: &Uri) -> Url {
    let mut url = instance.clone();
    let base = instance.path().trim_end_matches('/');
    url.set_path(&format!("{base}{}", uri.path()));
    url.set_query(uri.query());
    url
}

/// End-to-end headers of `headers`. `Host` and `Content-Length` are set by
/// the client for the new connection.
fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Fallback handler: forward the request to its route's next instance.
pub async fn forward(
    State(proxy): State<Arc<Proxy>>,
    request: Request,
) -> Result<Response, GatewayError> {
    let writer = request.extensions().get::<ResponseWriter>().cloned();
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();

    // The target URL resolves dot segments, so only canonical paths are sent.
    if has_dot_segment(path) {
        return Err(GatewayError::status(
            StatusCode::BAD_REQUEST,
            format!("Path {path} contains dot segments"),
        ));
    }

    let route = proxy.routes.resolve(path).ok_or_else(|| {
        GatewayError::NotFound(format!("No route matched {} {}", parts.method, path))
    })?;
    let instance = route.next_instance().ok_or_else(|| {
        GatewayError::NoInstance(format!("Unable to find instance for {}", route.service))
    })?;

    let declared = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > proxy.max_body_bytes) {
        return Err(GatewayError::status(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Request body exceeds {} bytes", proxy.max_body_bytes),
        ));
    }
    let body = to_bytes(body, proxy.max_body_bytes)
        .await
        .map_err(|e| GatewayError::status(StatusCode::BAD_REQUEST, e.to_string()))?;

    let target = target_url(instance, &parts.uri);
    tracing::debug!(service = %route.service, %target, method = %parts.method, "Forwarding request");

    let upstream = proxy
        .client
        .request(parts.method.clone(), target.clone())
        .headers(end_to_end(&parts.headers))
        .body(body)
        .send()
        .await
        .map_err(|e| {
            let err = GatewayError::from(e);
            tracing::warn!(service = %route.service, %target, error = %err, "Downstream call failed");
            err
        })?;

    // From here on the downstream owns the response.
    if let Some(writer) = &writer {
        writer.commit();
    }

    let status = upstream.status();
    let mut response = Response::builder().status(status);
    if let Some(headers) = response.headers_mut() {
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    let service = route.service.clone();
    let stream = upstream.bytes_stream().map_err(move |e| {
        tracing::warn!(%service, error = %e, "Downstream body failed after commit");
        e
    });

    response
        .body(Body::from_stream(stream))
        .map_err(|e| GatewayError::Internal(e.to_string()))
}
