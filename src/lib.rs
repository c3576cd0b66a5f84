//! # axum-range-layer
//!
//! HTTP byte-range responses for [`axum`][1], as a single middleware.
//!
//! The [`range`] middleware advertises `Accept-Ranges: bytes` on every
//! response, lets the wrapped handler produce its full response, and then
//! serves the requested `bytes=<start>-<end>` span from it as
//! `206 Partial Content`. Malformed or unsatisfiable ranges get
//! `416 Range Not Satisfiable`. Bounds are inclusive: `bytes=0-5` is six bytes.
//!
//! Any response body works. Bodies of known size are sliced in memory (text
//! and JSON keep their content type), bodies without a known size are sliced
//! as a stream and sent chunked with `Content-Range: bytes <start>-<end>/*`.
//!
//! ```
//! use axum::{middleware, routing::get, Json, Router};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let _app: Router = Router::new()
//!         .route("/string", get(|| async { "koa-range" }))
//!         .route("/json", get(|| async { Json(json!({"foo": "bar"})) }))
//!         .layer(middleware::from_fn(axum_range_layer::range));
//!
//!     // run it with hyper on localhost:3000
//!     #[cfg(feature = "run_server_in_example")]
//!     {
//!         let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!         axum::serve(listener, _app).await.unwrap();
//!     }
//! }
//! ```
//!
//! Handlers that do their own negotiation can return [`Ranged`] instead.
//!
//! [1]: https://docs.rs/axum

mod body;
mod config;
mod error;
mod middleware;
mod range;
mod stream;

use axum::http::header::{HeaderName, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::response::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, ContentLength, HeaderMapExt};
use tracing::error;

pub use body::{BodyStream, ResponseBody};
pub use config::{RangeConfig, DEFAULT_BUFFER_LIMIT};
pub use error::RangeError;
pub use middleware::{range, range_with_config};
pub use range::{
    resolve, unsatisfied_content_range, Outcome, ParsedRange, ResourceLength, SatisfiableRange,
};
pub use stream::RangedStream;

/// Handler-level responder. Implements [`IntoResponse`].
///
/// Useful when a route is not behind the [`range`] middleware, or when the
/// body is built by the handler anyway.
#[derive(Debug)]
pub struct Ranged {
    range: Option<String>,
    body: ResponseBody,
}

impl Ranged {
    /// Construct a ranged response over a body and the raw `Range` header
    /// value, if the request carried one.
    pub fn new(range: Option<String>, body: impl Into<ResponseBody>) -> Self {
        Ranged { range, body: body.into() }
    }

    /// Takes the `Range` header from request headers.
    pub fn from_headers(headers: &HeaderMap, body: impl Into<ResponseBody>) -> Self {
        let range = headers
            .get(RANGE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
        Ranged::new(range, body)
    }

    /// Responds to the request. Returns [`RangeNotSatisfiable`] if the
    /// requested range was malformed or out of bounds.
    pub fn try_respond(self) -> Result<Response, RangeNotSatisfiable> {
        let (mut parts, ()) = Response::new(()).into_parts();
        if let Some(content_type) = self.body.content_type() {
            parts.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        parts.headers.typed_insert(AcceptRanges::bytes());

        match resolve(self.range.as_deref(), self.body) {
            Outcome::MalformedRange(length) | Outcome::UnsatisfiableRange(length) => {
                Err(RangeNotSatisfiable(length))
            }
            outcome => Ok(assemble(parts, outcome)),
        }
    }
}

impl IntoResponse for Ranged {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Error type indicating that the requested range was not satisfiable. Implements [`IntoResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeNotSatisfiable(pub ResourceLength);

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let (mut parts, ()) = Response::new(()).into_parts();
        parts.headers.typed_insert(AcceptRanges::bytes());
        assemble(parts, Outcome::UnsatisfiableRange(self.0))
    }
}

/// Builds the final response from the downstream head and the resolved
/// outcome. Downstream headers such as `Content-Type` are kept except where
/// the outcome overrides them.
pub(crate) fn assemble(mut parts: Parts, outcome: Outcome) -> Response {
    match outcome {
        Outcome::Passthrough(body) => Response::from_parts(parts, body.into_body()),
        Outcome::Partial(range, body) => {
            parts.status = StatusCode::PARTIAL_CONTENT;
            insert_header(&mut parts.headers, CONTENT_RANGE, range.content_range());
            match body.resource_length() {
                ResourceLength::Known(len) => parts.headers.typed_insert(ContentLength(len)),
                // left to chunked transfer
                ResourceLength::Unknown => {
                    parts.headers.remove(CONTENT_LENGTH);
                }
            }
            Response::from_parts(parts, body.into_body())
        }
        Outcome::MalformedRange(length) | Outcome::UnsatisfiableRange(length) => {
            parts.status = StatusCode::RANGE_NOT_SATISFIABLE;
            insert_header(&mut parts.headers, CONTENT_RANGE, unsatisfied_content_range(length));
            parts.headers.remove(CONTENT_TYPE);
            parts.headers.typed_insert(ContentLength(0));
            Response::from_parts(parts, axum::body::Body::empty())
        }
    }
}

pub(crate) fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: String) {
    match HeaderValue::try_from(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(err) => error!(%err, %name, "dropping invalid header value"),
    }
}
