// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Playback sessions and the state they share.
//!
//! This module provides:
//! - `SessionContext`: capabilities, timings and the current selection,
//!   shared by the feeder, drain loop and sessions
//! - The session state machine and its driver
//! - The supervisor that starts and stops continuous playback

pub mod controller;
pub mod machine;
pub mod supervisor;

pub use controller::SessionController;
pub use machine::{transition, Cue, Effect, Ending, SessionEvent, SessionState};
pub use supervisor::LoopSupervisor;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::artifacts::ArtifactStore;
use crate::audio::PlaybackSink;
use crate::control::{InteractionSource, UserId};
use crate::generators::{GenerationError, GenerationLane, ModelSpec, Renderer, SongGenerator};
use crate::song::{Instrument, Song, SongId};
use crate::stats::StatsStore;

/// Model and instrument used for new generations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub model: ModelSpec,
    pub instrument: Instrument,
}

impl Selection {
    pub fn new(model: ModelSpec, instrument: Instrument) -> Self {
        Self { model, instrument }
    }
}

/// Session and loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// How long a menu waits for the owner
    pub interaction_timeout: Duration,
    /// Pause after a failed generation and between sink idle checks
    pub idle_poll: Duration,
    /// Delay between starting a queued song and deleting its artifacts
    pub settle_delay: Duration,
    /// Wait after cancelling the loops before they are joined
    pub stop_grace: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            interaction_timeout: Duration::from_secs(180),
            idle_poll: Duration::from_millis(500),
            settle_delay: Duration::from_secs(3),
            stop_grace: Duration::from_secs(2),
        }
    }
}

/// External capabilities a session runs against
#[derive(Clone)]
pub struct Capabilities {
    pub generator: Arc<dyn SongGenerator>,
    pub renderer: Arc<dyn Renderer>,
    pub sink: Arc<dyn PlaybackSink>,
    pub interactions: Arc<dyn InteractionSource>,
    pub stats: Arc<dyn StatsStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

/// State shared by the feeder, the drain loop and every session
pub struct SessionContext {
    pub timings: Timings,
    pub lane: GenerationLane,
    pub renderer: Arc<dyn Renderer>,
    pub sink: Arc<dyn PlaybackSink>,
    pub interactions: Arc<dyn InteractionSource>,
    pub stats: Arc<dyn StatsStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    selection: RwLock<Selection>,
}

impl SessionContext {
    pub fn new(capabilities: Capabilities, selection: Selection, timings: Timings) -> Self {
        Self {
            timings,
            lane: GenerationLane::new(capabilities.generator),
            renderer: capabilities.renderer,
            sink: capabilities.sink,
            interactions: capabilities.interactions,
            stats: capabilities.stats,
            artifacts: capabilities.artifacts,
            selection: RwLock::new(selection),
        }
    }

    /// Snapshot of the current selection
    pub fn selection(&self) -> Selection {
        self.selection
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the selection used by the next generation
    pub fn set_selection(&self, selection: Selection) {
        debug!(model = %selection.model.name, instrument = %selection.instrument, "Selection changed");
        *self
            .selection
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = selection;
    }

    /// Generate one song with the current selection
    pub async fn generate_current(&self) -> Result<Song, GenerationError> {
        let selection = self.selection();
        self.lane
            .generate(&selection.model, selection.instrument)
            .await
    }

    /// A random song of `model` that `owner` has not rated, other than `exclude`
    pub fn pick_unrated(&self, model: &str, owner: &UserId, exclude: Option<&SongId>) -> Option<Song> {
        let ids = match self.artifacts.list(model) {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to list songs of {}: {}", model, e);
                return None;
            }
        };
        let rated = match self.stats.rated_by(model, owner.as_str()) {
            Ok(rated) => rated,
            Err(e) => {
                warn!("Failed to read ratings of {}: {}", model, e);
                HashSet::new()
            }
        };
        let id = choose_unrated(&ids, &rated, exclude, &mut rand::thread_rng())?;
        self.artifacts.resolve(model, &id)
    }
}

/// Pick uniformly among `ids` that are neither rated nor excluded
pub fn choose_unrated<R: Rng + ?Sized>(
    ids: &[SongId],
    rated: &HashSet<SongId>,
    exclude: Option<&SongId>,
    rng: &mut R,
) -> Option<SongId> {
    let candidates: Vec<&SongId> = ids
        .iter()
        .filter(|id| !rated.contains(*id) && Some(*id) != exclude)
        .collect();
    candidates.choose(rng).map(|id| (*id).clone())
}
