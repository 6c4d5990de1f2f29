// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request response writing and the centralized error boundary.
//!
//! Each request gets one [`ResponseWriter`]. Whoever commits it first owns
//! the response: a local rejection, the error boundary, or the proxy when it
//! starts streaming a downstream response. A later attempt to write an error
//! envelope is refused and the in-flight failure is propagated instead.

use std::any::Any;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::stream;

use crate::error::{ErrorEnvelope, GatewayError};
use crate::headers::{request_id, X_REQUEST_ID};

/// Returned when an envelope is written after the response was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response already committed")]
pub struct AlreadyCommitted;

/// Writes the error envelope for one request, at most once.
///
/// Clones share the commit flag, so the writer can travel in request
/// extensions and be used from any stage of the pipeline.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    request_id: Option<String>,
    committed: Arc<AtomicBool>,
}

impl ResponseWriter {
    pub fn new(request_id: Option<String>) -> Self {
        Self {
            request_id,
            committed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Writer for a request, echoing its correlation id.
    pub fn for_request(request: &Request) -> Self {
        Self::new(request_id(request.headers()))
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Mark the response as started. Returns `false` if it already was.
    pub fn commit(&self) -> bool {
        self.committed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Serialize `envelope` as the response.
    ///
    /// The envelope's `requestId` is filled from the inbound request. Fails
    /// without side effects if the response was already committed.
    pub fn write(&self, envelope: ErrorEnvelope) -> Result<Response, AlreadyCommitted> {
        if !self.commit() {
            return Err(AlreadyCommitted);
        }

        let envelope = envelope.with_request_id(self.request_id.clone());
        let mut response = envelope.into_response();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(id) = self.request_id.as_deref().and_then(|id| HeaderValue::from_str(id).ok()) {
            headers.insert(X_REQUEST_ID, id);
        }
        Ok(response)
    }
}

/// Outermost middleware: the single place failures become envelopes.
///
/// Installs the request's [`ResponseWriter`], runs the rest of the stack,
/// and when a handler surfaced a [`GatewayError`] classifies it and writes
/// exactly one envelope.
pub async fn error_boundary(mut request: Request, next: Next) -> Response {
    let writer = ResponseWriter::for_request(&request);
    request.extensions_mut().insert(writer.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;
    let Some(failure) = response.extensions().get::<GatewayError>().cloned() else {
        return response;
    };

    let envelope = failure.envelope(None);
    let status = envelope.status();
    if status.is_server_error() {
        tracing::error!(
            request_id = writer.request_id(),
            %method,
            %path,
            status = status.as_u16(),
            code = %envelope.code,
            message = %failure,
            "Gateway error"
        );
    } else {
        tracing::warn!(
            request_id = writer.request_id(),
            %method,
            %path,
            status = status.as_u16(),
            code = %envelope.code,
            message = %failure,
            "Gateway rejected request"
        );
    }

    match writer.write(envelope) {
        Ok(written) => written,
        Err(AlreadyCommitted) => {
            tracing::warn!(
                request_id = writer.request_id(),
                %path,
                "Response already committed, propagating failure"
            );
            abort_committed(response)
        }
    }
}

/// Replace the body of `response` with one that fails on first poll.
///
/// Used once the writer is committed: the server aborts the connection
/// instead of sending a second envelope.
pub fn abort_committed(response: Response) -> Response {
    let (parts, _) = response.into_parts();
    let body = Body::from_stream(stream::once(async {
        Err::<Bytes, _>(std::io::Error::other(AlreadyCommitted))
    }));
    Response::from_parts(parts, body)
}

/// Handler for panics below the error boundary.
///
/// The failure travels in the response extensions like any other
/// [`GatewayError`], so the boundary writes the final envelope.
pub fn panic_envelope(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "panic".to_string()
    };
    tracing::error!(%details, "Request handler panicked");

    GatewayError::Internal(details).into_response()
}
