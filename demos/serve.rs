use std::io;

use async_stream::try_stream;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures::Stream;
use serde_json::json;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use axum_range_layer::{range_with_config, RangeConfig, ResponseBody};

const IO_BUFFER_SIZE: usize = 64 * 1024;

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("axum_range_layer=debug")),
        )
        .init();

    let config = RangeConfig::default();

    let router = Router::new()
        .route("/", get(|| async { vec![0u8; 1024] }).post(|| async { StatusCode::OK }))
        .route("/json", get(|| async { Json(json!({"foo": "bar"})) }))
        .route("/string", get(|| async { "koa-range" }))
        .route("/stream", get(readme))
        .layer(middleware::from_fn_with_state(config, range_with_config));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await
}

/// Streams `README.md` without announcing its length.
async fn readme() -> Response {
    match File::open("README.md").await {
        Ok(file) => ResponseBody::stream(read_chunks(file)).into_response(),
        Err(err) => (StatusCode::NOT_FOUND, format!("An error occurred: {}", err)).into_response(),
    }
}

fn read_chunks(mut file: File) -> impl Stream<Item = io::Result<Bytes>> {
    try_stream! {
        let mut buffer = vec![0u8; IO_BUFFER_SIZE];
        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buffer[..n]);
        }
    }
}
