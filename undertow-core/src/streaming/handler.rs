//! Response strategies for the single streaming request.

use std::fmt;
use std::io;
use std::path::Path;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{error, warn};

use crate::config::{ServerConfig, TranscoderConfig};
use crate::quality::QualityStore;
use crate::transcoder::{self, Backend};

/// Everything a handler needs besides the file path.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub content_type: &'static str,
    pub chunk_size: usize,
    pub quality_store: QualityStore,
    pub transcoder: TranscoderConfig,
}

impl HandlerContext {
    pub fn new(
        server: &ServerConfig,
        quality_store: QualityStore,
        transcoder: TranscoderConfig,
    ) -> Self {
        Self {
            content_type: server.content_type,
            chunk_size: server.chunk_size,
            quality_store,
            transcoder,
        }
    }
}

/// How the requested file is turned into a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHandler {
    /// File bytes verbatim.
    Direct,
    /// Output of the given encoder reading the file.
    Transcode(Backend),
}

impl StreamHandler {
    /// Produces the streaming response for `file`.
    ///
    /// Both strategies answer `200` with the configured content type and a
    /// body that is generated chunk by chunk.
    pub async fn produce_stream(&self, file: &Path, context: &HandlerContext) -> Response {
        match self {
            StreamHandler::Direct => Self::stream_file(file, context).await,
            StreamHandler::Transcode(backend) => {
                Self::stream_transcoded(*backend, file, context).await
            }
        }
    }

    async fn stream_file(file: &Path, context: &HandlerContext) -> Response {
        let source = match File::open(file).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Cannot open {} for streaming: {e}", file.display());
                return StatusCode::NOT_FOUND.into_response();
            }
        };

        let chunk_size = context.chunk_size;
        let chunks = stream::unfold(Some(source), move |source| async move {
            let mut source = source?;
            let mut buffer = vec![0u8; chunk_size];

            match source.read(&mut buffer).await {
                Ok(0) => None,
                Ok(n) => {
                    buffer.truncate(n);
                    Some((Ok(Bytes::from(buffer)), Some(source)))
                }
                Err(e) => Some((Err(e), None)),
            }
        });

        Self::media_response(context, Body::from_stream(chunks))
    }

    async fn stream_transcoded(
        backend: Backend,
        file: &Path,
        context: &HandlerContext,
    ) -> Response {
        let quality = context.quality_store.load().await;
        let command = transcoder::build_command(backend, &context.transcoder, file, &quality);

        let body = match transcoder::stream_output(&command) {
            Ok(output) => Body::from_stream(output),
            Err(e) => {
                // Headers still go out; the body aborts immediately
                error!("Transcoder failed to start: {e}");
                Body::from_stream(stream::once(async move {
                    Err::<Bytes, io::Error>(io::Error::other(e))
                }))
            }
        };

        Self::media_response(context, body)
    }

    fn media_response(context: &HandlerContext, body: Body) -> Response {
        ([(header::CONTENT_TYPE, context.content_type)], body).into_response()
    }
}

impl fmt::Display for StreamHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamHandler::Direct => write!(f, "direct"),
            StreamHandler::Transcode(backend) => write!(f, "{backend} transcode"),
        }
    }
}
