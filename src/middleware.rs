//! The request pipeline stage: advertise range support, run the downstream
//! handler, then rewrite its response for the requested range.

use axum::extract::{Request, State};
use axum::http::header::{CONTENT_RANGE, RANGE};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, HeaderMapExt};
use tracing::{debug, error};

use crate::body::ResponseBody;
use crate::config::RangeConfig;
use crate::error::RangeError;
use crate::range::resolve;

/// Range middleware with the default [`RangeConfig`].
///
/// ```
/// use axum::{middleware, routing::get, Router};
///
/// let app: Router = Router::new()
///     .route("/", get(|| async { "koa-range" }))
///     .layer(middleware::from_fn(axum_range_layer::range));
/// ```
pub async fn range(req: Request, next: Next) -> Response {
    range_with_config(State(RangeConfig::default()), req, next).await
}

/// Range middleware with an explicit [`RangeConfig`], for use with
/// [`axum::middleware::from_fn_with_state`].
pub async fn range_with_config(
    State(config): State<RangeConfig>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let header = req
        .headers()
        .get(RANGE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    let response = next.run(req).await;

    let mut response = negotiate(&config, method, header, response).await;
    response.headers_mut().typed_insert(AcceptRanges::bytes());
    response
}

async fn negotiate(
    config: &RangeConfig,
    method: Method,
    header: Option<String>,
    response: Response,
) -> Response {
    let Some(header) = header else {
        return response;
    };

    if method != Method::GET {
        let unrouted = matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
        );
        if config.reject_unrouted && unrouted {
            let err = RangeError::MethodNotRangeable(method);
            debug!(%err, "rejecting range request");
            return err.into_response();
        }
        debug!(%method, "ignoring range on non-GET request");
        return response;
    }

    if response.status() != StatusCode::OK {
        debug!(status = %response.status(), "not ranging non-200 response");
        return response;
    }

    if response.headers().contains_key(CONTENT_RANGE) {
        debug!("response is already partial");
        return response;
    }

    let (parts, body) = response.into_parts();

    let body = match ResponseBody::from_response(&parts, body, config.buffer_limit).await {
        Ok(body) => body,
        Err(err) => {
            error!(%err, "could not read downstream response");
            return err.into_response();
        }
    };

    crate::assemble(parts, resolve(Some(&header), body))
}
