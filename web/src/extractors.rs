//! Custom Axum extractors.

use crate::middleware::REQUEST_ID_HEADER;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use orderflow_core::order::RequestId;

/// Request id of the current request.
///
/// Reads the id stored by [`crate::middleware::request_id_layer`]. Without
/// the middleware it falls back to the raw `X-Request-ID` header, and to an
/// empty id when that is missing too.
///
/// # Example
///
/// ```
/// use orderflow_web::ReqId;
///
/// async fn handler(ReqId(request_id): ReqId) -> String {
///     format!("Request ID: {request_id}")
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ReqId(pub RequestId);

#[async_trait]
impl<S> FromRequestParts<S> for ReqId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<RequestId>() {
            return Ok(Self(id.clone()));
        }

        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(RequestId::new)
            .unwrap_or_default();
        Ok(Self(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn falls_back_to_header_without_middleware() {
        let (mut parts, ()) = Request::builder()
            .header(REQUEST_ID_HEADER, "abc")
            .body(())
            .unwrap()
            .into_parts();

        let ReqId(id) = ReqId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(id.as_str(), "abc");
    }

    #[tokio::test]
    async fn empty_when_nothing_is_available() {
        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();

        let ReqId(id) = ReqId::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(id.is_empty());
    }
}
