// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio output via an external player process.
//!
//! Each song is handed to a configured player command (for example
//! `ffplay -nodisp -autoexit {audio}`). Pausing suspends the player with
//! SIGSTOP and resuming continues it with SIGCONT.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{PlaybackSink, SinkError};
use crate::command::CommandTemplate;

#[derive(Default)]
struct PlayerState {
    child: Option<Child>,
    paused: bool,
    current: Option<PathBuf>,
}

impl PlayerState {
    /// Forget a player that exited on its own
    fn reap(&mut self) {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    debug!(?status, track = ?self.current, "Player finished");
                    self.child = None;
                    self.paused = false;
                    self.current = None;
                }
                Err(e) => {
                    warn!("Failed to poll player: {}", e);
                    self.child = None;
                    self.paused = false;
                    self.current = None;
                }
            }
        }
    }

    fn alive(&mut self) -> bool {
        self.reap();
        self.child.is_some()
    }
}

/// Playback sink backed by one external player process per song
pub struct ProcessSink {
    template: CommandTemplate,
    state: Mutex<PlayerState>,
    connected: AtomicBool,
}

impl ProcessSink {
    /// Create a sink that plays songs with `template`
    pub fn new(template: CommandTemplate) -> Self {
        Self {
            template,
            state: Mutex::new(PlayerState::default()),
            connected: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, PlayerState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn signal(&self, signal: &str) -> Result<(), SinkError> {
        let pid = {
            let mut state = self.state();
            if !state.alive() {
                return Ok(());
            }
            state.child.as_ref().and_then(|c| c.id())
        };
        let Some(pid) = pid else {
            return Ok(());
        };
        let status = Command::new("kill")
            .arg(format!("-{}", signal))
            .arg(pid.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| SinkError::ControlFailed(e.to_string()))?;
        if !status.success() {
            return Err(SinkError::ControlFailed(format!(
                "kill -{} {} exited with {}",
                signal, pid, status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PlaybackSink for ProcessSink {
    async fn connect(&self) -> Result<(), SinkError> {
        if self.template.is_empty() {
            return Err(SinkError::StartFailed("no player command configured".into()));
        }
        if !self.connected.swap(true, Ordering::SeqCst) {
            info!("Output session connected");
        }
        Ok(())
    }

    async fn start(&self, audio: &Path) -> Result<(), SinkError> {
        if !self.is_connected() {
            return Err(SinkError::Unavailable);
        }
        let vars = HashMap::from([("audio", audio.display().to_string())]);
        let mut command = self
            .template
            .command(&vars)
            .map_err(|e| SinkError::StartFailed(e.to_string()))?;
        command.stdout(Stdio::null()).stderr(Stdio::null());

        let mut state = self.state();
        if state.alive() {
            return Err(SinkError::StartFailed("a source is already playing".into()));
        }
        let child = command
            .spawn()
            .map_err(|e| SinkError::StartFailed(e.to_string()))?;
        state.child = Some(child);
        state.paused = false;
        state.current = Some(audio.to_path_buf());
        debug!(?audio, "Player started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SinkError> {
        let child = {
            let mut state = self.state();
            state.paused = false;
            state.current = None;
            state.child.take()
        };
        if let Some(mut child) = child {
            child
                .kill()
                .await
                .map_err(|e| SinkError::ControlFailed(e.to_string()))?;
            debug!("Player stopped");
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), SinkError> {
        if !self.is_connected() {
            return Err(SinkError::Unavailable);
        }
        if !self.is_playing() {
            return Ok(());
        }
        self.signal("STOP").await?;
        self.state().paused = true;
        Ok(())
    }

    async fn resume(&self) -> Result<(), SinkError> {
        if !self.is_connected() {
            return Err(SinkError::Unavailable);
        }
        if !self.is_paused() {
            return Ok(());
        }
        self.signal("CONT").await?;
        self.state().paused = false;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SinkError> {
        self.stop().await?;
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Output session disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        let mut state = self.state();
        state.alive() && !state.paused
    }

    fn is_paused(&self) -> bool {
        let mut state = self.state();
        state.alive() && state.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sleeper() -> ProcessSink {
        ProcessSink::new(CommandTemplate::new(["sleep", "30"]))
    }

    #[tokio::test]
    async fn test_start_requires_connection() {
        let sink = sleeper();
        let result = sink.start(Path::new("song.mp3")).await;
        assert!(matches!(result, Err(SinkError::Unavailable)));
    }

    #[tokio::test]
    async fn test_connect_requires_player() {
        let sink = ProcessSink::new(CommandTemplate::new(Vec::<String>::new()));
        assert!(sink.connect().await.is_err());
        assert!(!sink.is_connected());
    }

    #[tokio::test]
    async fn test_single_slot() {
        let sink = sleeper();
        sink.connect().await.unwrap();
        sink.start(Path::new("a.mp3")).await.unwrap();
        assert!(sink.is_playing());

        assert!(sink.start(Path::new("b.mp3")).await.is_err());

        sink.stop().await.unwrap();
        assert!(!sink.is_playing());
        sink.start(Path::new("b.mp3")).await.unwrap();
        sink.disconnect().await.unwrap();
        assert!(!sink.is_playing());
        assert!(!sink.is_connected());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let sink = sleeper();
        sink.connect().await.unwrap();
        sink.start(Path::new("a.mp3")).await.unwrap();

        sink.pause().await.unwrap();
        assert!(sink.is_paused());
        assert!(!sink.is_playing());

        sink.resume().await.unwrap();
        assert!(sink.is_playing());
        sink.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_finished_player_is_idle() {
        let sink = ProcessSink::new(CommandTemplate::new(["true"]));
        sink.connect().await.unwrap();
        sink.start(Path::new("a.mp3")).await.unwrap();
        sink.wait_idle(Duration::from_millis(10)).await;
        assert!(!sink.is_playing());
        assert!(!sink.is_paused());
    }
}
