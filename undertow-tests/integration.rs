//! Integration tests for Undertow
//!
//! These drive whole play sessions against a real listening server, with a
//! `MockReceiver` standing in for the cast device and shell scripts standing
//! in for the transcoder.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/direct_playback.rs"]
mod direct_playback;
#[path = "integration/process_replacement.rs"]
mod process_replacement;
#[path = "integration/quality_commands.rs"]
mod quality_commands;
#[path = "integration/remote_control.rs"]
mod remote_control;
#[path = "integration/transcoded_playback.rs"]
mod transcoded_playback;
