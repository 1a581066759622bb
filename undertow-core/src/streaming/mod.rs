//! Single-shot HTTP streaming of one media file.
//!
//! The server answers exactly one GET whose path is the encoded absolute file
//! path, using the handler strategy chosen when the session started. Direct
//! streaming copies the file from disk; transcoding relays encoder output.
//! Either way the body is produced incrementally and advertised as
//! `video/mp4`.

pub mod handler;
pub mod path_codec;
pub mod server;

use std::net::SocketAddr;

pub use handler::{HandlerContext, StreamHandler};
pub use path_codec::{decode_media_path, encode_media_path, playback_url};
pub use server::StreamingServer;
use thiserror::Error;

/// Errors raised while running the streaming server.
#[derive(Debug, Error)]
pub enum StreamingError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot query listener address: {0}")]
    LocalAddress(#[source] std::io::Error),

    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server task ended abnormally: {reason}")]
    ServerTask { reason: String },

    #[error("cannot build playback URL: {reason}")]
    InvalidUrl { reason: String },
}

pub type StreamingResult<T> = Result<T, StreamingError>;
