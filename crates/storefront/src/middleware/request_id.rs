//! Request ID middleware for request tracing and correlation.
//!
//! An `x-request-id` supplied by an upstream proxy is reused when it looks
//! sane; otherwise a UUID v4 is generated. The ID is recorded on the request
//! span, tagged on the Sentry scope, stored as a [`RequestId`] extension and
//! echoed in the response headers.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest upstream request ID accepted as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// The request's correlation ID, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Borrow the ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Accept an upstream ID only if it is short, non-empty, visible ASCII.
fn accept_upstream(value: &HeaderValue) -> Option<String> {
    let value = value.to_str().ok()?.trim();
    let valid = !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value.bytes().all(|b| b.is_ascii_graphic());
    valid.then(|| value.to_string())
}

/// Middleware that ensures every request has a request ID.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(accept_upstream)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Span::current().record("request_id", request_id.as_str());

    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Extension, Router, body::Body, http::Request, middleware::from_fn, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        Router::new()
            .route(
                "/",
                get(|Extension(id): Extension<RequestId>| async move { id.0 }),
            )
            .layer(from_fn(request_id_middleware))
    }

    async fn echoed(request: Request<Body>) -> (String, String) {
        let response = app().oneshot(request).await.unwrap();
        let header = response.headers()[REQUEST_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (header, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_generates_id_when_absent() {
        let (header, body) = echoed(Request::get("/").body(Body::empty()).unwrap()).await;
        assert!(Uuid::parse_str(&header).is_ok());
        assert_eq!(header, body);
    }

    #[tokio::test]
    async fn test_reuses_upstream_id() {
        let request = Request::get("/")
            .header(REQUEST_ID_HEADER, "edge-7f3a")
            .body(Body::empty())
            .unwrap();
        let (header, body) = echoed(request).await;
        assert_eq!(header, "edge-7f3a");
        assert_eq!(body, "edge-7f3a");
    }

    #[tokio::test]
    async fn test_replaces_oversized_upstream_id() {
        let request = Request::get("/")
            .header(REQUEST_ID_HEADER, "a".repeat(MAX_REQUEST_ID_LEN + 1))
            .body(Body::empty())
            .unwrap();
        let (header, _) = echoed(request).await;
        assert!(Uuid::parse_str(&header).is_ok());
    }

    #[test]
    fn test_rejects_embedded_spaces() {
        let value = HeaderValue::from_static("two words");
        assert!(accept_upstream(&value).is_none());
    }
}
