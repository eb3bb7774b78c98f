// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Generated songs and their identifiers.
//!
//! A song is one midi artifact rendered to audio with one instrument.
//! Several songs can share a generation code (one midi, many renders).

pub mod instrument;

pub use instrument::{catalog, Instrument};

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifier of a rendered song: `<code>_<instrument>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(String);

impl SongId {
    /// Build the id of `code` rendered with `instrument`
    pub fn new(code: &str, instrument: Instrument) -> Self {
        Self(format!("{}_{}", code, instrument.program()))
    }

    /// Parse an id back into its generation code and instrument.
    ///
    /// Codes may themselves contain underscores; the instrument is always
    /// the segment after the last one.
    pub fn parse(raw: &str) -> Option<(String, Instrument)> {
        let (code, program) = raw.rsplit_once('_')?;
        if code.is_empty() {
            return None;
        }
        let instrument = program.parse::<Instrument>().ok()?;
        Some((code.to_string(), instrument))
    }

    /// Wrap a raw id if it is well formed
    pub fn from_raw(raw: &str) -> Option<Self> {
        Self::parse(raw).map(|_| Self(raw.to_string()))
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The same generation code rendered with another instrument
    pub fn with_instrument(&self, instrument: Instrument) -> Option<Self> {
        Self::parse(&self.0).map(|(code, _)| Self::new(&code, instrument))
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One generated artifact pair plus its metadata. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// `<code>_<instrument>`
    pub id: SongId,
    /// Generation batch identifier (the midi file stem)
    pub code: String,
    /// Instrument the audio was rendered with
    pub instrument: Instrument,
    /// Symbolic artifact
    pub midi: PathBuf,
    /// Rendered audio artifact
    pub audio: PathBuf,
    /// Audio length, 0 when unknown
    pub duration_secs: u32,
    /// Model whose artifact namespace holds this song
    pub model: String,
}

impl Song {
    /// Create a song, deriving its id from code and instrument
    pub fn new(
        model: impl Into<String>,
        code: impl Into<String>,
        instrument: Instrument,
        midi: impl Into<PathBuf>,
        audio: impl Into<PathBuf>,
    ) -> Self {
        let code = code.into();
        Self {
            id: SongId::new(&code, instrument),
            code,
            instrument,
            midi: midi.into(),
            audio: audio.into(),
            duration_secs: 0,
            model: model.into(),
        }
    }

    /// Set the audio duration
    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Duration formatted as `mm:ss`, `--:--` when unknown
    pub fn duration_label(&self) -> String {
        if self.duration_secs == 0 {
            return "--:--".to_string();
        }
        format!("{:02}:{:02}", self.duration_secs / 60, self.duration_secs % 60)
    }
}
