// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Song generation and rendering capabilities.
//!
//! This module provides:
//! - The `SongGenerator` and `Renderer` capability traits
//! - A generation lane that keeps generation calls strictly sequential
//! - Command-line adapters for an offline model and a soundfont renderer

pub mod command;

pub use command::{CommandGenerator, CommandRenderer};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::command::CommandError;
use crate::song::{Instrument, Song, SongId};

/// A model checkpoint that can generate songs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Model name, also its artifact namespace
    pub name: String,
    /// Checkpoint file loaded by the generator
    pub checkpoint: PathBuf,
}

impl ModelSpec {
    /// Create a model spec
    pub fn new(name: impl Into<String>, checkpoint: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            checkpoint: checkpoint.into(),
        }
    }
}

/// Model inference failures
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The generator process failed
    #[error("generator command failed: {0}")]
    Command(#[from] CommandError),
    /// The generator ran but its output could not be understood
    #[error("unexpected generator output: {0:?}")]
    BadOutput(String),
    /// The generator reported artifacts that are not on disk
    #[error("generated artifact missing: {0:?}")]
    MissingArtifact(PathBuf),
    /// Moving the artifact into the store failed
    #[error("failed to store artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Rendering failures
#[derive(Debug, Error)]
pub enum RenderError {
    /// The source song has no midi to render
    #[error("no midi artifact for {0}")]
    MissingMidi(SongId),
    /// The renderer process failed
    #[error("renderer command failed: {0}")]
    Command(#[from] CommandError),
    /// The renderer finished without producing audio
    #[error("renderer produced no audio at {0:?}")]
    NoOutput(PathBuf),
}

/// Produces new songs from a model. Long-running.
#[async_trait]
pub trait SongGenerator: Send + Sync {
    /// Generate one song rendered with `instrument`
    async fn generate(&self, model: &ModelSpec, instrument: Instrument)
        -> Result<Song, GenerationError>;
}

/// Renders an existing song's midi with another instrument
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `source` with `instrument`, producing the derived song
    async fn render(&self, source: &Song, instrument: Instrument) -> Result<Song, RenderError>;
}

/// Serializes every generation call, queued or one-off.
///
/// Only one generation may run at a time; callers wait their turn.
pub struct GenerationLane {
    generator: Arc<dyn SongGenerator>,
    turn: Mutex<()>,
    completed: AtomicU64,
}

impl GenerationLane {
    /// Wrap a generator
    pub fn new(generator: Arc<dyn SongGenerator>) -> Self {
        Self {
            generator,
            turn: Mutex::new(()),
            completed: AtomicU64::new(0),
        }
    }

    /// Generate a song once no other generation is running
    pub async fn generate(
        &self,
        model: &ModelSpec,
        instrument: Instrument,
    ) -> Result<Song, GenerationError> {
        let _turn = self.turn.lock().await;
        debug!(model = %model.name, %instrument, "Generation started");
        let song = self.generator.generate(model, instrument).await?;
        let total = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        info!(model = %model.name, song = %song.id, total, "Generated song");
        Ok(song)
    }

    /// Number of successful generations so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Generator that records how many calls overlap
    struct SlowGenerator {
        running: AtomicUsize,
        max_running: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SongGenerator for SlowGenerator {
        async fn generate(
            &self,
            model: &ModelSpec,
            instrument: Instrument,
        ) -> Result<Song, GenerationError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let code = format!("song{}", n);
            Ok(Song::new(&model.name, &code, instrument, "a.mid", "a.mp3"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lane_never_overlaps_generations() {
        let generator = Arc::new(SlowGenerator {
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let lane = Arc::new(GenerationLane::new(generator.clone()));
        let model = ModelSpec::new("lofi", "lofi.pt");

        let mut handles = Vec::new();
        for _ in 0..3 {
            let lane = lane.clone();
            let model = model.clone();
            handles.push(tokio::spawn(async move {
                lane.generate(&model, Instrument::PIANO).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(generator.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(lane.completed(), 3);
    }
}
