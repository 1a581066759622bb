//! One-request HTTP server.
//!
//! The listener is bound up front so the playback URL can be handed out
//! before anything connects. The first GET flips the shutdown signal: axum
//! stops accepting, lets that response stream to completion, and the serve
//! task returns. GETs that still sneak in are answered `410 Gone`.
//!
//! HEAD probes (cast tooling checks the URL before the device fetches it)
//! are answered from headers alone and leave the shot unused.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::handler::{HandlerContext, StreamHandler};
use super::path_codec::decode_media_path;
use super::{StreamingError, StreamingResult};

/// State shared with the request handler.
struct ServerState {
    handler: StreamHandler,
    context: HandlerContext,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

/// A bound, not yet serving, single-shot streaming server.
pub struct StreamingServer {
    listener: TcpListener,
    handler: StreamHandler,
    context: HandlerContext,
}

impl StreamingServer {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// - `StreamingError::Bind` - Address unavailable or port in use
    pub async fn bind(
        addr: SocketAddr,
        handler: StreamHandler,
        context: HandlerContext,
    ) -> StreamingResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StreamingError::Bind { addr, source })?;

        Ok(Self {
            listener,
            handler,
            context,
        })
    }

    /// Address actually bound, including an ephemeral port.
    ///
    /// # Errors
    ///
    /// - `StreamingError::LocalAddress` - Socket address could not be queried
    pub fn local_addr(&self) -> StreamingResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(StreamingError::LocalAddress)
    }

    /// Serves exactly one request on a background task.
    pub fn spawn(self) -> JoinHandle<StreamingResult<()>> {
        tokio::spawn(self.serve())
    }

    /// Serves exactly one request, returning once its response is complete.
    ///
    /// # Errors
    ///
    /// - `StreamingError::Serve` - Accept loop failed
    pub async fn serve(self) -> StreamingResult<()> {
        let addr = self.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let app = router(Arc::new(ServerState {
            handler: self.handler,
            context: self.context,
            shutdown: Mutex::new(Some(shutdown_tx)),
        }));

        info!("Streaming server listening on http://{addr} ({})", self.handler);

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(StreamingError::Serve)?;

        info!("Streaming server on {addr} finished");
        Ok(())
    }
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/{*path}", get(serve_media).head(probe_media))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Headers a GET would produce, without consuming the single response.
async fn probe_media(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    debug!("HEAD {}", uri.path());
    let status = if state.shutdown.lock().is_some() {
        StatusCode::OK
    } else {
        StatusCode::GONE
    };
    (status, [(header::CONTENT_TYPE, state.context.content_type)]).into_response()
}

async fn serve_media(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let Some(shutdown) = state.shutdown.lock().take() else {
        warn!("Rejecting additional request for {}", uri.path());
        return StatusCode::GONE.into_response();
    };
    // Stop accepting; this response still streams to completion
    let _ = shutdown.send(());

    let file = decode_media_path(uri.path());
    info!("Serving {} ({})", file.display(), state.handler);

    state.handler.produce_stream(&file, &state.context).await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{ServerConfig, TranscoderConfig};
    use crate::quality::QualityStore;
    use crate::streaming::path_codec::encode_media_path;

    fn context_in(dir: &TempDir) -> HandlerContext {
        HandlerContext::new(
            &ServerConfig::default(),
            QualityStore::new(dir.path().join("quality")),
            TranscoderConfig::default(),
        )
    }

    fn state_in(dir: &TempDir) -> (Arc<ServerState>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let state = Arc::new(ServerState {
            handler: StreamHandler::Direct,
            context: context_in(dir),
            shutdown: Mutex::new(Some(tx)),
        });
        (state, rx)
    }

    #[tokio::test]
    async fn test_request_path_is_decoded() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("my clip+1.mp4");
        std::fs::write(&file, b"moov").unwrap();
        let (state, mut shutdown) = state_in(&dir);

        let request = Request::get(encode_media_path(&file))
            .body(Body::empty())
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"moov");
        assert!(shutdown.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_second_request_is_gone() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"moov").unwrap();
        let (state, _shutdown) = state_in(&dir);
        let app = router(state);

        let first = app
            .clone()
            .oneshot(Request::get(encode_media_path(&file)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let second = app
            .oneshot(Request::get(encode_media_path(&file)).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_head_leaves_get_available() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, vec![3u8; 70_000]).unwrap();
        let (state, mut shutdown) = state_in(&dir);
        let app = router(state);

        let head = app
            .clone()
            .oneshot(Request::head(encode_media_path(&file)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(head.headers()[header::CONTENT_TYPE], "video/mp4");
        assert!(shutdown.try_recv().is_err());

        let get = app
            .oneshot(Request::get(encode_media_path(&file)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(get.status(), StatusCode::OK);
        let body = axum::body::to_bytes(get.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), 70_000);
        assert!(shutdown.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_head_after_get_is_gone() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"moov").unwrap();
        let (state, _shutdown) = state_in(&dir);
        let app = router(state);

        app.clone()
            .oneshot(Request::get(encode_media_path(&file)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let head = app
            .oneshot(Request::head(encode_media_path(&file)).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(head.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_only_get_is_routed() {
        let dir = TempDir::new().unwrap();
        let (state, _shutdown) = state_in(&dir);

        let request = Request::post("/media/clip.mp4").body(Body::empty()).unwrap();
        let response = router(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_listener_errors_are_distinguished() {
        let dir = TempDir::new().unwrap();
        let first = StreamingServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            StreamHandler::Direct,
            context_in(&dir),
        )
        .await
        .unwrap();
        let addr = first.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let taken = StreamingServer::bind(addr, StreamHandler::Direct, context_in(&dir)).await;
        assert!(matches!(taken, Err(StreamingError::Bind { addr: a, .. }) if a == addr));

        let query = StreamingError::LocalAddress(std::io::Error::other("closed"));
        assert_eq!(query.to_string(), "cannot query listener address: closed");
    }

    #[tokio::test]
    async fn test_server_finishes_after_one_request() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, vec![7u8; 200_000]).unwrap();

        let server = StreamingServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            StreamHandler::Direct,
            context_in(&dir),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let task = server.spawn();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n",
            encode_media_path(&file)
        );
        tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes())
            .await
            .unwrap();
        let mut response = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut response)
            .await
            .unwrap();

        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 200 OK"));
        assert!(text.to_ascii_lowercase().contains("content-type: video/mp4"));

        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
