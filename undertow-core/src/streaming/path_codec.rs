//! Encoding of filesystem paths into request paths and back.
//!
//! Each `/`-separated segment is percent-encoded with spaces written as `+`;
//! the separators themselves stay literal. Decoding turns `+` back into a
//! space before percent-decoding, so a literal `+` in a file name must travel
//! as `%2B`, which the encoder guarantees. Paths are handled as raw bytes,
//! so names that are not valid UTF-8 survive the round trip.

use std::ffi::OsStr;
use std::net::SocketAddr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use url::Url;

use super::{StreamingError, StreamingResult};

/// Encodes an absolute path for use as the request path.
pub fn encode_media_path(path: &Path) -> String {
    path.as_os_str()
        .as_bytes()
        .split(|byte| *byte == b'/')
        .map(|segment| urlencoding::encode_binary(segment).replace("%20", "+"))
        .collect::<Vec<_>>()
        .join("/")
}

/// Decodes a request path back into the filesystem path it names.
pub fn decode_media_path(encoded: &str) -> PathBuf {
    let spaced: Vec<u8> = encoded
        .bytes()
        .map(|byte| if byte == b'+' { b' ' } else { byte })
        .collect();
    let decoded = urlencoding::decode_binary(&spaced);

    PathBuf::from(OsStr::from_bytes(&decoded))
}

/// Builds the URL a receiver fetches to play `path` from `addr`.
///
/// # Errors
///
/// - `StreamingError::InvalidUrl` - Path is relative or the result does not parse
pub fn playback_url(addr: SocketAddr, path: &Path) -> StreamingResult<Url> {
    if !path.is_absolute() {
        return Err(StreamingError::InvalidUrl {
            reason: format!("{} is not absolute", path.display()),
        });
    }

    let raw = format!("http://{addr}{}", encode_media_path(path));
    Url::parse(&raw).map_err(|e| StreamingError::InvalidUrl {
        reason: format!("{raw}: {e}"),
    })
}
