// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Lo-fi jukebox: generate songs with an external model, play them, and
//! collect listener ratings.
//!
//! A session plays one song and waits for the owner to rate, replay,
//! re-render, skip or quit. Continuous playback runs a generation loop
//! filling a bounded queue and a drain loop playing it.

pub mod artifacts;
pub mod audio;
pub mod command;
pub mod config;
pub mod control;
pub mod generators;
pub mod jukebox;
pub mod logging;
pub mod queue;
pub mod session;
pub mod song;
pub mod stats;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::JukeboxConfig;
pub use jukebox::{Jukebox, JukeboxError};
pub use song::{Instrument, Song, SongId};
