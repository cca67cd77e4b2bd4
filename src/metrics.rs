//! Prometheus metrics for the history job.
//!
//! Exposes:
//! - `telegram_history_pages_total` (counter)
//! - `telegram_history_messages_total` (counter)
//! - `telegram_history_attachments_total` (counter)
//! - `telegram_history_cursor_offset` (gauge per channel)
//! - `telegram_history_run_duration_seconds` (histogram with status)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter, register_int_gauge_vec,
    Encoder, HistogramVec, IntCounter, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::models::BatchReport;

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static PAGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "telegram_history_pages_total",
        "History pages persisted"
    )
    .expect("failed to register pages counter")
});

static MESSAGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "telegram_history_messages_total",
        "Message rows upserted"
    )
    .expect("failed to register messages counter")
});

static ATTACHMENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "telegram_history_attachments_total",
        "Attachment rows upserted"
    )
    .expect("failed to register attachments counter")
});

static CURSOR_OFFSET: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "telegram_history_cursor_offset",
        "Last persisted offset_id per channel",
        &["channel"]
    )
    .expect("failed to register cursor gauge")
});

static RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 1s up to ~9 hours.
    let buckets =
        prometheus::exponential_buckets(1.0, 2.0, 16).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "telegram_history_run_duration_seconds",
        "Job run duration in seconds",
        &["status"],
        buckets
    )
    .expect("failed to register run duration histogram")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&PAGES_TOTAL);
    Lazy::force(&MESSAGES_TOTAL);
    Lazy::force(&ATTACHMENTS_TOTAL);
    Lazy::force(&CURSOR_OFFSET);
    Lazy::force(&RUN_DURATION);
}

/// Count one persisted page.
pub fn record_page(report: BatchReport) {
    init_collectors();
    PAGES_TOTAL.inc();
    MESSAGES_TOTAL.inc_by(report.messages as u64);
    ATTACHMENTS_TOTAL.inc_by(report.attachments as u64);
}

pub fn record_cursor(channel: &str, offset_id: i32) {
    init_collectors();
    CURSOR_OFFSET
        .with_label_values(&[channel])
        .set(i64::from(offset_id));
}

/// Record how a whole run ended.
pub fn record_run_result(duration: Duration, success: bool) {
    init_collectors();
    RUN_DURATION
        .with_label_values(&[if success { "ok" } else { "error" }])
        .observe(duration.as_secs_f64());
}

fn plain_response(status: StatusCode, body: Full<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            Full::from("encode error"),
        ));
    }

    let mut response = plain_response(StatusCode::OK, Full::from(buffer));
    if let Ok(value) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(plain_response(StatusCode::NOT_FOUND, Full::new(Bytes::new()))),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
