// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio output for the jukebox.
//!
//! This module provides:
//! - The `PlaybackSink` capability: a single-slot live audio output
//! - A process-backed sink that hands each song to an external player

pub mod output;

pub use output::ProcessSink;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Audio sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// No output session is connected
    #[error("no active output session")]
    Unavailable,
    /// The player could not be started
    #[error("failed to start player: {0}")]
    StartFailed(String),
    /// Controlling the running player failed
    #[error("player control failed: {0}")]
    ControlFailed(String),
}

/// Live audio output. Plays at most one source at a time.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Open the output session
    async fn connect(&self) -> Result<(), SinkError>;

    /// Start playing an audio file. Fails if something is already playing.
    async fn start(&self, audio: &Path) -> Result<(), SinkError>;

    /// Stop the current source, if any
    async fn stop(&self) -> Result<(), SinkError>;

    /// Pause the current source
    async fn pause(&self) -> Result<(), SinkError>;

    /// Resume a paused source
    async fn resume(&self) -> Result<(), SinkError>;

    /// Stop playback and close the output session
    async fn disconnect(&self) -> Result<(), SinkError>;

    /// Whether the output session is open
    fn is_connected(&self) -> bool;

    /// Whether a source is audibly playing
    fn is_playing(&self) -> bool;

    /// Whether a source is loaded but paused
    fn is_paused(&self) -> bool;

    /// Wait until the sink is neither playing nor paused
    async fn wait_idle(&self, poll: Duration) {
        while self.is_playing() || self.is_paused() {
            tokio::time::sleep(poll).await;
        }
    }
}

/// Start `audio`, stopping whatever the sink was playing first
pub async fn replace_source(sink: &dyn PlaybackSink, audio: &Path) -> Result<(), SinkError> {
    if sink.is_playing() || sink.is_paused() {
        sink.stop().await?;
    }
    sink.start(audio).await
}
