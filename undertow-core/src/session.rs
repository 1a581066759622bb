//! Playback session orchestration.
//!
//! A play request walks `Idle → Resolving → HandlerSelected → Listening →
//! Serving → Done`. Everything that can be validated up front (the source
//! file, transcoder availability) is checked before the server binds or the
//! receiver is told to load anything. The server runs on its own task; the
//! caller gets a `PlaybackSession` it may await to know when the single
//! request has been served.
//!
//! Pause, continue and stop are one-shot pass-throughs to the receiver,
//! each followed by a settle delay so receiver-side state catches up.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;
use uuid::Uuid;

use crate::config::UndertowConfig;
use crate::process_guard::ProcessGuard;
use crate::quality::QualityStore;
use crate::receiver::{Receiver, ReceiverProvider};
use crate::streaming::{
    HandlerContext, StreamHandler, StreamingError, StreamingResult, StreamingServer, playback_url,
};
use crate::transcoder::{self, Backend};
use crate::{Result, UndertowError};

/// Lifecycle of a play request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    HandlerSelected,
    Listening,
    Serving,
    Done,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Resolving => "resolving",
            SessionState::HandlerSelected => "handler selected",
            SessionState::Listening => "listening",
            SessionState::Serving => "serving",
            SessionState::Done => "done",
        };
        f.write_str(name)
    }
}

/// A file being served to a receiver.
pub struct PlaybackSession {
    id: Uuid,
    file: PathBuf,
    handler: StreamHandler,
    address: SocketAddr,
    url: Url,
    state: SessionState,
    server: JoinHandle<StreamingResult<()>>,
}

impl PlaybackSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Absolute path of the source file.
    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn handler(&self) -> StreamHandler {
        self.handler
    }

    /// Address the server is listening on.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// URL handed to the receiver.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Waits until the single request has been served.
    ///
    /// # Errors
    ///
    /// - `StreamingError::Serve` - Server failed while serving
    /// - `StreamingError::ServerTask` - Server task panicked or was cancelled
    pub async fn finished(mut self) -> Result<()> {
        let outcome = (&mut self.server)
            .await
            .map_err(|e| StreamingError::ServerTask {
                reason: e.to_string(),
            })?;
        outcome?;

        advance(&mut self.state, SessionState::Done);
        info!("Session {} done", self.id);
        Ok(())
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("handler", &self.handler)
            .field("address", &self.address)
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .finish()
    }
}

fn advance(state: &mut SessionState, next: SessionState) {
    debug!("Session state: {state} -> {next}");
    *state = next;
}

/// Drives play and remote-control requests against a receiver.
pub struct SessionOrchestrator<P> {
    config: UndertowConfig,
    provider: P,
}

impl<P: ReceiverProvider> SessionOrchestrator<P> {
    pub fn new(config: UndertowConfig, provider: P) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &UndertowConfig {
        &self.config
    }

    /// Store holding the transcode quality used by transcoding handlers.
    pub fn quality_store(&self) -> QualityStore {
        QualityStore::new(&self.config.paths.quality_file)
    }

    /// Starts serving `file` and tells the receiver to play it.
    ///
    /// Returns once the receiver has been handed the URL; the server keeps
    /// running in the background until it has answered one request.
    ///
    /// # Errors
    ///
    /// - `UndertowError::FileNotFound` - Source missing or not a regular file
    /// - `UndertowError::TranscoderUnavailable` - Neither backend installed
    /// - `UndertowError::Io` - PID file could not be written
    /// - `UndertowError::Receiver` - Receiver lookup or command failed
    /// - `UndertowError::Streaming` - Server could not bind
    pub async fn play(&self, file: &Path, transcoder: Option<Backend>) -> Result<PlaybackSession> {
        let id = Uuid::new_v4();
        self.run_play(id, file, transcoder)
            .instrument(info_span!("session", %id))
            .await
    }

    async fn run_play(
        &self,
        id: Uuid,
        file: &Path,
        transcoder: Option<Backend>,
    ) -> Result<PlaybackSession> {
        let mut state = SessionState::Idle;

        let file = resolve_source(file).await?;
        advance(&mut state, SessionState::Resolving);
        info!("Playing: {}", file.display());

        ProcessGuard::new(&self.config.paths.pid_file)
            .replace_previous()
            .await?;

        let receiver = self.provider.get_device().await?;
        let local = receiver.local_address();
        info!("Local address towards {}: {local}", receiver.name());

        let handler = match transcoder {
            Some(requested) => {
                let backend = transcoder::select_backend(requested, &self.config.transcoder)
                    .await
                    .ok_or(UndertowError::TranscoderUnavailable {
                        requested,
                        fallback: requested.fallback(),
                    })?;
                StreamHandler::Transcode(backend)
            }
            None => {
                warn_if_not_mp4(&file);
                StreamHandler::Direct
            }
        };
        advance(&mut state, SessionState::HandlerSelected);

        if !receiver.is_idle().await? {
            info!("Killing current running app on {}", receiver.name());
            receiver.quit_app().await?;
            tokio::time::sleep(self.config.timing.quit_grace).await;
        }

        let context = HandlerContext::new(
            &self.config.server,
            self.quality_store(),
            self.config.transcoder.clone(),
        );
        let server = StreamingServer::bind(
            SocketAddr::new(local, self.config.server.port),
            handler,
            context,
        )
        .await?;
        let address = server.local_addr()?;
        let server = server.spawn();
        advance(&mut state, SessionState::Listening);

        let url = match playback_url(address, &file) {
            Ok(url) => url,
            Err(e) => {
                server.abort();
                return Err(e.into());
            }
        };
        info!("Serving media from: {url}");

        if let Err(e) = receiver
            .load_media(url.as_str(), self.config.server.content_type)
            .await
        {
            server.abort();
            return Err(e.into());
        }
        advance(&mut state, SessionState::Serving);

        Ok(PlaybackSession {
            id,
            file,
            handler,
            address,
            url,
            state,
            server,
        })
    }

    /// Pauses playback.
    ///
    /// # Errors
    ///
    /// - `UndertowError::Receiver` - Receiver lookup or command failed
    pub async fn pause(&self) -> Result<()> {
        let receiver = self.provider.get_device().await?;
        info!("Pausing {}", receiver.name());
        receiver.pause().await?;
        self.settle().await;
        Ok(())
    }

    /// Continues paused playback.
    ///
    /// # Errors
    ///
    /// - `UndertowError::Receiver` - Receiver lookup or command failed
    pub async fn resume(&self) -> Result<()> {
        let receiver = self.provider.get_device().await?;
        info!("Continuing playback on {}", receiver.name());
        receiver.resume().await?;
        self.settle().await;
        Ok(())
    }

    /// Stops playback and quits the receiver's media app.
    ///
    /// # Errors
    ///
    /// - `UndertowError::Receiver` - Receiver lookup or command failed
    pub async fn stop(&self) -> Result<()> {
        let receiver = self.provider.get_device().await?;
        info!("Stopping playback on {}", receiver.name());
        receiver.stop().await?;
        self.settle().await;
        receiver.quit_app().await?;
        Ok(())
    }

    async fn settle(&self) {
        tokio::time::sleep(self.config.timing.settle_delay).await;
    }
}

/// Makes `file` absolute, failing when it is not an existing regular file.
async fn resolve_source(file: &Path) -> Result<PathBuf> {
    let not_found = || UndertowError::FileNotFound {
        path: file.to_path_buf(),
    };

    match tokio::fs::metadata(file).await {
        Ok(metadata) if metadata.is_file() => {}
        _ => return Err(not_found()),
    }

    tokio::fs::canonicalize(file).await.map_err(|_| not_found())
}

/// Direct streaming always claims `video/mp4`; flag sources that are not.
fn warn_if_not_mp4(file: &Path) {
    if let Some(guessed) = mime_guess::from_path(file).first()
        && guessed.essence_str() != "video/mp4"
    {
        warn!(
            "{} looks like {guessed}; the receiver may need --ffmpeg to play it",
            file.display()
        );
    }
}
