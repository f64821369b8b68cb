use crate::errors::ErrorHandler;
use crate::lifecycle::Lifecycle;
use crate::metrics::Metrics;
use crate::session::{SessionState, SessionStatus};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::codec::{BytesCodec, FramedRead};

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

static NOTFOUND: &[u8] = b"{\"error\":\"Not Found\"}";

#[derive(Serialize)]
struct StreamListResponse {
    streams: Vec<SessionStatus>,
    count: usize,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    active_streams: usize,
    total_streams: usize,
    timestamp: i64,
}

pub struct Service {
    lifecycle: Arc<Lifecycle>,
    metrics: Arc<Metrics>,
}

impl Service {
    pub fn new(lifecycle: Arc<Lifecycle>, metrics: Arc<Metrics>) -> Self {
        Self { lifecycle, metrics }
    }

    pub async fn run(&self, port: i32) {
        let lifecycle = self.lifecycle.clone();
        let metrics = self.metrics.clone();
        let make_service = make_service_fn(move |_| {
            let lifecycle = lifecycle.clone();
            let metrics = metrics.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    handle_request(lifecycle.clone(), metrics.clone(), req)
                }))
            }
        });
        let addr = format!("[::]:{}", port).parse().unwrap();
        let server = Server::bind(&addr).serve(make_service);
        log::info!("HTTP service listening on http://{}", addr);
        _ = server.await;
    }
}

async fn handle_request(
    lifecycle: Arc<Lifecycle>,
    metrics: Arc<Metrics>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    metrics.record_http_request();

    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let response = match segments.as_slice() {
        ["api", "v1", "streams"] if method == Method::GET => {
            let streams = lifecycle.list().await;
            let count = streams.len();
            ErrorHandler::handle_success(StreamListResponse { streams, count })
        }
        ["api", "v1", "streams", app, name] if method == Method::GET => {
            respond(lifecycle.get(&crate::session_id(app, name)).await)
        }
        ["api", "v1", "streams", app, name] if method == Method::DELETE => {
            match lifecycle.delete(&crate::session_id(app, name)).await {
                Ok(()) => ErrorHandler::handle_success(MessageResponse {
                    message: "Stream deleted",
                }),
                Err(err) => ErrorHandler::handle_error(&err),
            }
        }
        ["api", "v1", "streams", app, name, "start"] if method == Method::POST => {
            respond(lifecycle.start(&crate::session_id(app, name)).await)
        }
        ["api", "v1", "streams", app, name, "stop"] if method == Method::POST => {
            respond(lifecycle.stop(&crate::session_id(app, name)).await)
        }
        ["hls", app, name, file] if method == Method::GET => {
            serve_media(&lifecycle, &metrics, app, name, file).await
        }
        ["health"] if method == Method::GET => health(&lifecycle).await,
        ["metrics"] if method == Method::GET => ErrorHandler::handle_success(metrics.snapshot()),
        _ => not_found(),
    };

    Ok(response)
}

fn respond<T: Serialize>(result: crate::errors::Result<T>) -> Response<Body> {
    match result {
        Ok(data) => ErrorHandler::handle_success(data),
        Err(err) => ErrorHandler::handle_error(&err),
    }
}

/// Media files come straight off the session's output directory; the
/// transcoder owns their names and contents.
async fn serve_media(
    lifecycle: &Arc<Lifecycle>,
    metrics: &Arc<Metrics>,
    app: &str,
    name: &str,
    file: &str,
) -> Response<Body> {
    let session = match lifecycle.registry().get(&crate::session_id(app, name)).await {
        Some(session) => session,
        None => return not_found(),
    };

    if file == crate::transcode::PLAYLIST_FILE {
        metrics.record_playlist_request();
        return serve_file(session.output_dir().join(file), PLAYLIST_CONTENT_TYPE).await;
    }

    if file.starts_with("segment_") && file.ends_with(".ts") {
        metrics.record_segment_request();
        return serve_file(session.output_dir().join(file), SEGMENT_CONTENT_TYPE).await;
    }

    not_found()
}

async fn serve_file(path: PathBuf, content_type: &str) -> Response<Body> {
    match File::open(&path).await {
        Ok(file) => {
            let stream = FramedRead::new(file, BytesCodec::new());
            Response::builder()
                .header("Content-Type", content_type)
                .header("Access-Control-Allow-Origin", "*")
                .header("Access-Control-Allow-Methods", "GET, OPTIONS")
                .header("Access-Control-Allow-Headers", "Content-Type, Range")
                .body(Body::wrap_stream(stream))
                .unwrap()
        }
        Err(_) => not_found(),
    }
}

async fn health(lifecycle: &Arc<Lifecycle>) -> Response<Body> {
    let streams = lifecycle.list().await;
    let active = streams
        .iter()
        .filter(|s| s.state == SessionState::Active)
        .count();

    ErrorHandler::handle_success(HealthResponse {
        status: "healthy",
        active_streams: active,
        total_streams: streams.len(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

fn not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(NOTFOUND.into())
        .unwrap()
}
