//! Error types for range negotiation.

use axum::http::header::CONTENT_RANGE;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::range::{unsatisfied_content_range, ResourceLength};

/// Why a request's `Range` header could not be honoured.
#[derive(Error, Debug)]
pub enum RangeError {
    #[error("malformed range header: {0:?}")]
    Malformed(String),

    #[error("range {start}-{end} not satisfiable for resource of length {length}")]
    Unsatisfiable {
        start: u64,
        end: u64,
        length: ResourceLength,
    },

    #[error("range requests are not supported for {0}")]
    MethodNotRangeable(Method),

    #[error("failed to read response body: {0}")]
    Body(#[from] axum::Error),
}

impl RangeError {
    /// The status code this error surfaces as.
    pub fn status(&self) -> StatusCode {
        match self {
            RangeError::Malformed(_) | RangeError::Unsatisfiable { .. } => {
                StatusCode::RANGE_NOT_SATISFIABLE
            }
            RangeError::MethodNotRangeable(_) => StatusCode::BAD_REQUEST,
            RangeError::Body(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client input errors are never retried or escalated.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

/// Status with an empty body. Unsatisfiable ranges also carry the
/// resource length in `Content-Range`.
impl IntoResponse for RangeError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), ()).into_response();
        if let RangeError::Unsatisfiable { length, .. } = self {
            let value = unsatisfied_content_range(length);
            crate::insert_header(response.headers_mut(), CONTENT_RANGE, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StatusCode::RANGE_NOT_SATISFIABLE,
            RangeError::Malformed("bytes".into()).status()
        );
        let err = RangeError::Unsatisfiable {
            start: 400,
            end: 300,
            length: ResourceLength::Known(1024),
        };
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, err.status());
        assert!(err.is_client_error());
        assert_eq!(StatusCode::BAD_REQUEST, RangeError::MethodNotRangeable(Method::PUT).status());
        assert!(!RangeError::Body(axum::Error::new("boom")).is_client_error());
    }

    #[test]
    fn test_into_response() {
        let response = RangeError::MethodNotRangeable(Method::PUT).into_response();
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        assert!(response.headers().get(CONTENT_RANGE).is_none());

        let err = RangeError::Unsatisfiable { start: 5, end: 1, length: ResourceLength::Known(9) };
        let response = err.into_response();
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, response.status());
        assert_eq!("bytes */9", response.headers()[CONTENT_RANGE]);
    }

    #[test]
    fn test_display() {
        let err = RangeError::Unsatisfiable { start: 10, end: 20, length: ResourceLength::Unknown };
        assert_eq!("range 10-20 not satisfiable for resource of length *", err.to_string());
    }
}
