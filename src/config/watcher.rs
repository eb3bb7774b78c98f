// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! File watcher for hot-reload configuration.
//!
//! Edits to the config file are picked up without restarting the jukebox;
//! a reload changes the model and instrument used by the next generation.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use super::{ConfigFormat, JukeboxConfig};

/// Events emitted by the config watcher
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// Configuration file was modified and successfully reloaded
    Reloaded(Box<JukeboxConfig>),
    /// Configuration file was modified but failed to load
    Error(String),
}

/// Configuration file watcher with debouncing and validation
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    event_receiver: Receiver<ConfigEvent>,
    watched_path: PathBuf,
}

impl ConfigWatcher {
    /// Create a new config watcher for the specified file
    ///
    /// # Arguments
    /// * `path` - Config file to watch
    /// * `debounce_ms` - Debounce duration in milliseconds (default: 500)
    pub fn new<P: AsRef<Path>>(path: P, debounce_ms: Option<u64>) -> Result<Self> {
        let watched_path = path.as_ref().to_path_buf();
        let debounce_duration = Duration::from_millis(debounce_ms.unwrap_or(500));

        let (event_tx, event_rx): (Sender<ConfigEvent>, Receiver<ConfigEvent>) = mpsc::channel();
        let (notify_tx, notify_rx): (Sender<Event>, Receiver<Event>) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(|e| anyhow!("Failed to create file watcher: {}", e))?;

        // Editors often replace the file, so watch its directory.
        let watch_dir = watched_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| anyhow!("Failed to watch path {:?}: {}", watch_dir, e))?;

        let target = watched_path.clone();
        std::thread::spawn(move || debounce_loop(target, debounce_duration, notify_rx, event_tx));

        Ok(Self {
            _watcher: watcher,
            event_receiver: event_rx,
            watched_path,
        })
    }

    /// Try to receive the next config event (non-blocking)
    pub fn try_recv(&self) -> Option<ConfigEvent> {
        self.event_receiver.try_recv().ok()
    }

    /// Receive all pending config events
    pub fn recv_all(&self) -> Vec<ConfigEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Get the path being watched
    pub fn watched_path(&self) -> &Path {
        &self.watched_path
    }
}

fn is_target(path: &Path, target: &Path) -> bool {
    path == target || (path.file_name() == target.file_name() && ConfigFormat::is_config_file(path))
}

fn debounce_loop(
    target: PathBuf,
    debounce: Duration,
    notify_rx: Receiver<Event>,
    event_tx: Sender<ConfigEvent>,
) {
    let mut last_event_time: Option<Instant> = None;

    loop {
        match notify_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    && event.paths.iter().any(|p| is_target(p, &target));
                if relevant {
                    last_event_time = Some(Instant::now());
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let Some(last_time) = last_event_time else {
                    continue;
                };
                if last_time.elapsed() < debounce {
                    continue;
                }
                last_event_time = None;
                let event = match JukeboxConfig::load(&target) {
                    Ok(config) => ConfigEvent::Reloaded(Box::new(config)),
                    Err(e) => ConfigEvent::Error(format!("Failed to load {:?}: {:#}", target, e)),
                };
                debug!(?target, "Config change detected");
                if event_tx.send(event).is_err() {
                    break;
                }
            }
            // Watcher was dropped
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Validate a configuration without applying it
pub fn validate_config<P: AsRef<Path>>(path: P) -> Result<JukeboxConfig> {
    JukeboxConfig::load(path)
}
