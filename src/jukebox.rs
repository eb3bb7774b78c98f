// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The jukebox service: "generate and play", continuous playback and the
//! operator commands around them.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{info, warn};

use crate::artifacts::{ArtifactError, ArtifactStore, DirArtifactStore};
use crate::audio::{PlaybackSink, ProcessSink, SinkError};
use crate::config::JukeboxConfig;
use crate::control::{InteractionSource, UserId};
use crate::generators::{CommandGenerator, CommandRenderer, GenerationError, ModelSpec};
use crate::queue::SongQueue;
use crate::session::{Capabilities, Ending, LoopSupervisor, Selection, SessionContext, SessionController};
use crate::song::{Instrument, Song, SongId};
use crate::stats::{JsonStatsStore, StatsError, StatsStore};

/// Jukebox service errors
#[derive(Debug, Error)]
pub enum JukeboxError {
    #[error("song not found: {0}")]
    SongNotFound(String),
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("invalid instrument {0}: must be 0-127")]
    InvalidInstrument(u32),
    #[error("nothing left to rate")]
    NothingToRate,
    #[error("no songs generated with model {0} yet")]
    NoSongs(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Artifacts(#[from] ArtifactError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

/// Top-level entry point tying sessions, loops and configuration together
pub struct Jukebox {
    ctx: Arc<SessionContext>,
    supervisor: LoopSupervisor,
    config: Mutex<JukeboxConfig>,
    config_path: Option<PathBuf>,
}

impl Jukebox {
    /// Assemble a jukebox over explicit capabilities
    pub fn new(capabilities: Capabilities, config: JukeboxConfig, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let selection = config.selection()?;
        let ctx = Arc::new(SessionContext::new(capabilities, selection, config.timings()));
        let queue = SongQueue::new(config.queue.watermark);
        let supervisor = LoopSupervisor::new(Arc::clone(&ctx), queue, UserId::new(config.owner.clone()));
        Ok(Self {
            ctx,
            supervisor,
            config: Mutex::new(config),
            config_path,
        })
    }

    /// Assemble a jukebox running the configured external commands
    pub fn from_config(
        config: JukeboxConfig,
        config_path: Option<PathBuf>,
        interactions: Arc<dyn InteractionSource>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let layout = config.layout();
        let capabilities = Capabilities {
            generator: Arc::new(CommandGenerator::new(config.commands.generate.clone(), layout.clone())),
            renderer: Arc::new(CommandRenderer::new(config.commands.render.clone(), layout.clone())),
            sink: Arc::new(ProcessSink::new(config.commands.player.clone())),
            interactions,
            stats: Arc::new(JsonStatsStore::new(config.paths.stats.clone())),
            artifacts: Arc::new(DirArtifactStore::new(layout)),
        };
        Self::new(capabilities, config, config_path)
    }

    fn config(&self) -> MutexGuard<'_, JukeboxConfig> {
        self.config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    pub fn selection(&self) -> Selection {
        self.ctx.selection()
    }

    /// Open the output session if it is not open yet
    pub async fn ensure_connected(&self) -> Result<(), SinkError> {
        if !self.ctx.sink.is_connected() {
            self.ctx.sink.connect().await?;
        }
        Ok(())
    }

    /// Play a stored song, or a freshly generated one, in a session for `owner`
    pub async fn play(&self, owner: &UserId, id: Option<&str>) -> Result<Ending, JukeboxError> {
        self.ensure_connected().await?;
        let song = match id {
            Some(raw) => self.get(raw)?,
            None => {
                self.ctx.interactions.message(owner, "Generating...").await;
                match self.ctx.generate_current().await {
                    Ok(song) => song,
                    Err(e) => {
                        self.ctx
                            .interactions
                            .message(owner, &format!("Generation failed: {}", e))
                            .await;
                        return Err(e.into());
                    }
                }
            }
        };
        Ok(self.session(owner, song).await)
    }

    /// Play a random song `owner` has not rated yet
    pub async fn pick(&self, owner: &UserId) -> Result<Ending, JukeboxError> {
        self.ensure_connected().await?;
        let model = self.selection().model.name;
        let Some(song) = self.ctx.pick_unrated(&model, owner, None) else {
            self.ctx.interactions.message(owner, "Nothing left to rate.").await;
            return Err(JukeboxError::NothingToRate);
        };
        Ok(self.session(owner, song).await)
    }

    async fn session(&self, owner: &UserId, song: Song) -> Ending {
        SessionController::new(Arc::clone(&self.ctx), owner.clone())
            .play(song)
            .await
    }

    /// Start continuous playback. Returns false if it was already running.
    pub async fn start_loop(&self) -> Result<bool, JukeboxError> {
        self.ensure_connected().await?;
        Ok(self.supervisor.start().await)
    }

    /// Stop continuous playback. Returns false if it was not running.
    pub async fn stop_loop(&self) -> bool {
        self.supervisor.stop().await
    }

    pub async fn is_looping(&self) -> bool {
        self.supervisor.is_running().await
    }

    /// Ids waiting in the generation queue
    pub fn queued(&self) -> Vec<SongId> {
        self.supervisor.queue().ids()
    }

    /// Stored songs of the current model
    pub fn list(&self) -> Result<Vec<SongId>, JukeboxError> {
        let model = self.selection().model.name;
        Ok(self.ctx.artifacts.list(&model)?)
    }

    /// Resolve a stored song of the current model
    pub fn get(&self, raw: &str) -> Result<Song, JukeboxError> {
        let model = self.selection().model.name;
        SongId::from_raw(raw)
            .and_then(|id| self.ctx.artifacts.resolve(&model, &id))
            .ok_or_else(|| JukeboxError::SongNotFound(raw.to_string()))
    }

    /// The most recently generated song of the current model
    pub fn latest(&self) -> Result<Song, JukeboxError> {
        let model = self.selection().model.name;
        self.ctx
            .artifacts
            .newest(&model)
            .ok_or(JukeboxError::NoSongs(model))
    }

    /// Rated songs of the current model, best first
    pub fn ranking(&self) -> Result<Vec<(SongId, f64)>, JukeboxError> {
        let model = self.selection().model.name;
        Ok(self.ctx.stats.ranking(&model)?)
    }

    /// Switch the model used for new generations
    pub fn select_model(&self, name: &str) -> Result<ModelSpec, JukeboxError> {
        let mut config = self.config();
        let model = config
            .model_spec(name)
            .ok_or_else(|| JukeboxError::UnknownModel(name.to_string()))?;
        config.model = name.to_string();
        let instrument = self.selection().instrument;
        self.ctx.set_selection(Selection::new(model.clone(), instrument));
        self.persist(&config)?;
        info!(model = %name, "Model selected");
        Ok(model)
    }

    /// Switch the instrument used for new generations
    pub fn select_instrument(&self, program: u32) -> Result<Instrument, JukeboxError> {
        let instrument = u8::try_from(program)
            .ok()
            .and_then(Instrument::new)
            .ok_or(JukeboxError::InvalidInstrument(program))?;
        let mut config = self.config();
        config.instrument = instrument;
        let model = self.selection().model;
        self.ctx.set_selection(Selection::new(model, instrument));
        self.persist(&config)?;
        info!(%instrument, "Instrument selected");
        Ok(instrument)
    }

    /// Adopt a reloaded configuration's selection
    pub fn apply_config(&self, reloaded: JukeboxConfig) -> Result<(), JukeboxError> {
        let selection = reloaded.selection()?;
        if selection != self.selection() {
            info!(model = %selection.model.name, instrument = %selection.instrument, "Selection reloaded");
            self.ctx.set_selection(selection);
        }
        *self.config() = reloaded;
        Ok(())
    }

    fn persist(&self, config: &JukeboxConfig) -> Result<(), JukeboxError> {
        if let Some(path) = &self.config_path {
            config.save(path)?;
        }
        Ok(())
    }

    /// Stop playback and close the output session
    pub async fn disconnect(&self) -> Result<(), JukeboxError> {
        if self.supervisor.stop().await {
            info!("Continuous playback stopped for disconnect");
        }
        if let Err(e) = self.ctx.sink.disconnect().await {
            warn!("Disconnect failed: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}
