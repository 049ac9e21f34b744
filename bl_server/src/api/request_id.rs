//! Per-request correlation ids.
//!
//! Every request entering the router gets an id, either the caller's own
//! `x-request-id` or a freshly minted UUID. The id is echoed back on the
//! response and attached to the start/finish log lines, so a client-reported
//! ledger discrepancy can be matched to its server-side trail.

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The id assigned to the current request, available to handlers through
/// request extensions.
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub struct RequestId(pub String);

impl RequestId {
    #[allow(dead_code)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> axum::extract::FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestId>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "request id middleware not installed",
        ))
    }
}

/// Reuse the caller's id when it is readable, otherwise mint one. Callers
/// that retry a budget operation under the same id make the retry trivially
/// findable in the logs.
fn incoming_or_minted(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Tag the request with an id, log both ends of it, and echo the id on the
/// response.
pub async fn request_id_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let request_id = incoming_or_minted(request.headers());
    request.extensions_mut().insert(RequestId(request_id.clone()));

    tracing::info!(
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
        "Request started"
    );

    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    tracing::info!(
        request_id = %request_id,
        status = %parts.status,
        "Request completed"
    );

    Ok(Response::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::HeaderMap;

    #[test]
    fn test_caller_supplied_id_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("credit-retry-7"));
        assert_eq!(incoming_or_minted(&headers), "credit-retry-7");
    }

    #[test]
    fn test_missing_id_is_minted_as_uuid() {
        let minted = incoming_or_minted(&HeaderMap::new());
        assert!(Uuid::parse_str(&minted).is_ok());
    }

    #[test]
    fn test_unreadable_id_is_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(
            REQUEST_ID_HEADER,
            HeaderValue::from_bytes(b"\xffbad").expect("opaque bytes are a legal header value"),
        );
        assert!(Uuid::parse_str(&incoming_or_minted(&headers)).is_ok());
    }

    #[test]
    fn test_request_id_as_str() {
        let request_id = RequestId("ledger-req-1".to_string());
        assert_eq!(request_id.as_str(), "ledger-req-1");
    }
}
