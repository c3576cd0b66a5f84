//! The shapes a full response body can take before it is sliced.

use std::fmt;
use std::pin::Pin;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::response::Parts;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::BoxError;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http_body::Body as _;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::error::RangeError;
use crate::range::{ResourceLength, SatisfiableRange};
use crate::stream::RangedStream;

/// Boxed byte stream used for bodies of unknown (or unbuffered) length.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, axum::Error>> + Send>>;

/// A full response body, tagged by shape. Each shape has its own slicing
/// strategy, see [`ResponseBody::resource_length`].
pub enum ResponseBody {
    /// Fixed byte buffer.
    Buffer(Bytes),
    /// Text, sliced on byte offsets rather than characters.
    Text(String),
    /// A structured value held in its serialized form, so that slicing sees
    /// exactly the bytes that go over the wire.
    Json(Box<RawValue>),
    /// Byte stream, read incrementally and never buffered whole.
    Stream(BodyStream, ResourceLength),
}

impl ResponseBody {
    /// Serializes `value` as the body of an `application/json` response.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::value::to_raw_value(value).map(ResponseBody::Json)
    }

    /// An open stream whose total length is not known.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        ResponseBody::Stream(Box::pin(stream.map_err(axum::Error::new)), ResourceLength::Unknown)
    }

    /// A stream known to produce exactly `length` bytes.
    pub fn sized_stream<S, E>(stream: S, length: u64) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        ResponseBody::Stream(
            Box::pin(stream.map_err(axum::Error::new)),
            ResourceLength::Known(length),
        )
    }

    pub fn resource_length(&self) -> ResourceLength {
        match self {
            ResponseBody::Buffer(bytes) => ResourceLength::Known(bytes.len() as u64),
            ResponseBody::Text(text) => ResourceLength::Known(text.len() as u64),
            ResponseBody::Json(raw) => ResourceLength::Known(raw.get().len() as u64),
            ResponseBody::Stream(_, length) => *length,
        }
    }

    /// Default `Content-Type` for the shape, when it implies one.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            ResponseBody::Buffer(_) => Some("application/octet-stream"),
            ResponseBody::Text(_) => Some("text/plain; charset=utf-8"),
            ResponseBody::Json(_) => Some("application/json"),
            ResponseBody::Stream(..) => None,
        }
    }

    /// Classifies a downstream response body.
    ///
    /// Bodies with an exact size no larger than `buffer_limit` are collected
    /// and tagged by content type. Larger bodies stay streams that keep their
    /// known length, and bodies without an exact size become streams of
    /// unknown length.
    pub async fn from_response(
        parts: &Parts,
        body: Body,
        buffer_limit: usize,
    ) -> Result<Self, RangeError> {
        let exact = body.size_hint().exact();

        let size = match exact.and_then(|size| usize::try_from(size).ok()) {
            Some(size) if size <= buffer_limit => size,
            _ => {
                let length = exact.map_or(ResourceLength::Unknown, ResourceLength::Known);
                return Ok(ResponseBody::Stream(Box::pin(body.into_data_stream()), length));
            }
        };

        let bytes = axum::body::to_bytes(body, size).await?;

        let mime = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(essence)
            .unwrap_or_default();

        if is_json(&mime) {
            if let Ok(text) = std::str::from_utf8(&bytes) {
                // from_string trims surrounding whitespace, only keep exact matches
                if let Ok(raw) = RawValue::from_string(text.to_owned()) {
                    if raw.get().len() == bytes.len() {
                        return Ok(ResponseBody::Json(raw));
                    }
                }
            }
        } else if mime.starts_with("text/") {
            if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                return Ok(ResponseBody::Text(text));
            }
        }

        Ok(ResponseBody::Buffer(bytes))
    }

    /// Cuts the body down to `range`. The range must have been validated
    /// against this body's [`resource_length`](Self::resource_length).
    pub(crate) fn slice(self, range: &SatisfiableRange) -> ResponseBody {
        match self {
            ResponseBody::Buffer(bytes) => ResponseBody::Buffer(slice_bytes(bytes, range)),
            ResponseBody::Text(text) => ResponseBody::Buffer(slice_bytes(Bytes::from(text), range)),
            ResponseBody::Json(raw) => {
                let text = Box::<str>::from(raw).into_string();
                ResponseBody::Buffer(slice_bytes(Bytes::from(text), range))
            }
            ResponseBody::Stream(stream, length) => {
                let sliced = RangedStream::new(stream, range.start, range.byte_count());
                let length = match length {
                    ResourceLength::Known(_) => ResourceLength::Known(range.byte_count()),
                    ResourceLength::Unknown => ResourceLength::Unknown,
                };
                ResponseBody::Stream(Box::pin(sliced), length)
            }
        }
    }

    pub fn into_body(self) -> Body {
        match self {
            ResponseBody::Buffer(bytes) => Body::from(bytes),
            ResponseBody::Text(text) => Body::from(text),
            ResponseBody::Json(raw) => Body::from(Box::<str>::from(raw).into_string()),
            ResponseBody::Stream(stream, _) => Body::from_stream(stream),
        }
    }
}

fn slice_bytes(bytes: Bytes, range: &SatisfiableRange) -> Bytes {
    // end < bytes.len(), so both bounds fit in usize
    bytes.slice(range.start as usize..=range.end as usize)
}

/// `type/subtype` without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(mime: &str) -> bool {
    mime == "application/json" || mime.ends_with("+json")
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Buffer(bytes) => f.debug_tuple("Buffer").field(bytes).finish(),
            ResponseBody::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ResponseBody::Json(raw) => f.debug_tuple("Json").field(&raw.get()).finish(),
            ResponseBody::Stream(_, length) => f.debug_tuple("Stream").field(length).finish(),
        }
    }
}

impl IntoResponse for ResponseBody {
    fn into_response(self) -> Response {
        let content_type = self.content_type();
        let mut response = Response::new(self.into_body());
        if let Some(content_type) = content_type {
            response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        response
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        ResponseBody::Buffer(bytes)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        ResponseBody::Buffer(Bytes::from(bytes))
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        ResponseBody::Text(text)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(text: &'static str) -> Self {
        ResponseBody::Text(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::http::StatusCode;
    use axum::Json;
    use futures::StreamExt;

    use super::*;

    async fn classify(response: Response) -> ResponseBody {
        let (parts, body) = response.into_parts();
        ResponseBody::from_response(&parts, body, 1024).await.unwrap()
    }

    #[tokio::test]
    async fn test_classify_text() {
        assert_matches!(classify("koa-range".into_response()).await, ResponseBody::Text(text) => {
            assert_eq!("koa-range", text);
        });
    }

    #[tokio::test]
    async fn test_classify_json() {
        let response = Json(serde_json::json!({"foo": "bar"})).into_response();
        assert_matches!(classify(response).await, ResponseBody::Json(raw) => {
            assert_eq!(r#"{"foo":"bar"}"#, raw.get());
        });
    }

    #[tokio::test]
    async fn test_classify_json_with_trailing_newline_stays_buffer() {
        let response = ([(CONTENT_TYPE, "application/json")], "{\"a\":1}\n").into_response();
        assert_matches!(classify(response).await, ResponseBody::Buffer(bytes) => {
            assert_eq!(8, bytes.len());
        });
    }

    #[tokio::test]
    async fn test_classify_buffer() {
        let response = vec![0u8; 16].into_response();
        assert_matches!(classify(response).await, ResponseBody::Buffer(bytes) => {
            assert_eq!(16, bytes.len());
        });

        // invalid utf-8 under a text type is still served as bytes
        let response = ([(CONTENT_TYPE, "text/plain")], vec![0xffu8, 0xfe]).into_response();
        assert_matches!(classify(response).await, ResponseBody::Buffer(_));
    }

    #[tokio::test]
    async fn test_classify_over_limit_keeps_known_length() {
        let response = vec![1u8; 2048].into_response();
        assert_matches!(
            classify(response).await,
            ResponseBody::Stream(_, ResourceLength::Known(2048))
        );
    }

    #[tokio::test]
    async fn test_classify_stream() {
        let chunks = vec![Ok::<_, std::io::Error>(Bytes::from_static(b"abc"))];
        let chunks = futures::stream::iter(chunks);
        let response = Body::from_stream(chunks).into_response();
        let body = classify(response).await;
        assert_matches!(body, ResponseBody::Stream(stream, ResourceLength::Unknown) => {
            let chunks: Vec<_> = stream.collect().await;
            assert_eq!(1, chunks.len());
        });
    }

    #[tokio::test]
    async fn test_into_response_content_types() {
        let response = ResponseBody::json(&[1, 2, 3]).unwrap().into_response();
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!("application/json", response.headers()[CONTENT_TYPE]);

        let response = ResponseBody::from("hi").into_response();
        assert_eq!("text/plain; charset=utf-8", response.headers()[CONTENT_TYPE]);

        let empty = futures::stream::empty::<Result<Bytes, std::io::Error>>();
        let response = ResponseBody::stream(empty).into_response();
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }
}
