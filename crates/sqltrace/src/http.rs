//! HTTP capture endpoint.
//!
//! One handler: `GET ?seconds=N` (default 30) opens a capture window for N
//! seconds and answers with the gzip-compressed record stream as the
//! response body. Binding, routing prefix and authentication are the
//! host's concern; [`CaptureEndpoint::router`] returns a single-route
//! router to mount wherever profiling should be reachable.
//!
//! Only one window may be open at a time; a second request while a window
//! is in progress is answered with `409 Conflict` rather than corrupting
//! the stream. The window always runs for its full duration, regardless of
//! client disconnection.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Deserialize;
use tracing::{info, warn};

use crate::gate::CaptureGate;

/// Window length when the `seconds` parameter is absent or empty.
pub const DEFAULT_WINDOW_SECS: u64 = 30;

/// Handle returned by [`crate::install`]; owns the capture gate and exposes
/// it only through the HTTP surface.
#[derive(Clone)]
pub struct CaptureEndpoint {
    gate: Arc<CaptureGate>,
}

impl CaptureEndpoint {
    pub(crate) fn new(gate: Arc<CaptureGate>) -> Self {
        Self { gate }
    }

    /// A router serving the capture handler at `/`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(capture_window))
            .with_state(Arc::clone(&self.gate))
    }
}

#[derive(Deserialize)]
struct CaptureParams {
    seconds: Option<String>,
}

async fn capture_window(
    State(gate): State<Arc<CaptureGate>>,
    Query(params): Query<CaptureParams>,
) -> Response {
    let seconds = match parse_seconds(params.seconds.as_deref()) {
        Ok(seconds) => seconds,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    if !gate.try_reserve() {
        return (
            StatusCode::CONFLICT,
            "capture window already open\n".to_string(),
        )
            .into_response();
    }

    info!("capture window open for {seconds}s");
    gate.open_window(Box::new(GzEncoder::new(Vec::new(), Compression::default())));
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    let sink = gate.close_window();
    gate.release();
    info!("capture window closed");

    let Some(sink) = sink else {
        warn!("capture window closed with no sink installed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "capture sink missing\n".to_string(),
        )
            .into_response();
    };
    match sink.finish() {
        Ok(body) => body.into_response(),
        Err(e) => {
            warn!("finishing capture stream failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("finishing capture stream: {e}\n"),
            )
                .into_response()
        }
    }
}

/// `None` and the empty string fall back to the default; anything else must
/// be a positive integer.
fn parse_seconds(raw: Option<&str>) -> Result<u64, String> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_WINDOW_SECS);
    };
    if raw.is_empty() {
        return Ok(DEFAULT_WINDOW_SECS);
    }
    match raw.parse::<i64>() {
        Ok(seconds) if seconds > 0 => Ok(seconds as u64),
        _ => Err(format!("bad seconds: {raw:?}\n")),
    }
}
