// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! On-disk song artifacts.
//!
//! Every model owns a directory under the generated-songs root:
//! `<root>/<model>/<code>.mid` holds the symbolic song and
//! `<root>/<model>/<code>_<instrument>.<ext>` holds each rendering and
//! `<root>/<model>/<code>_<instrument>.json` its metadata.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::song::{Instrument, Song, SongId};

/// Artifact store errors
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Filesystem failure on a specific path
    #[error("artifact I/O failed on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Metadata sidecar could not be encoded
    #[error("song metadata {path:?}: {source}")]
    Meta {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Metadata kept next to a rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SongMeta {
    /// Audio length in seconds
    #[serde(default)]
    pub duration_secs: u32,
}

/// Lists, resolves and deletes song artifacts of a model namespace
pub trait ArtifactStore: Send + Sync {
    /// Ids of all rendered songs of a model, sorted
    fn list(&self, model: &str) -> Result<Vec<SongId>, ArtifactError>;

    /// Whether the rendered audio (and its midi) for `id` exist
    fn exists(&self, model: &str, id: &SongId) -> bool;

    /// Build the `Song` for an existing artifact pair
    fn resolve(&self, model: &str, id: &SongId) -> Option<Song>;

    /// Remove a rendered song. Deleting a missing song is not an error.
    fn delete(&self, model: &str, id: &SongId) -> Result<(), ArtifactError>;

    /// Most recently produced song of a model
    fn newest(&self, model: &str) -> Option<Song>;
}

/// Path layout of the generated-songs directory
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactLayout {
    root: PathBuf,
    audio_extension: String,
}

impl ArtifactLayout {
    /// Create a layout rooted at `root` whose renders use `audio_extension`
    pub fn new(root: impl Into<PathBuf>, audio_extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            audio_extension: audio_extension.into(),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extension of rendered audio files (without the dot)
    pub fn audio_extension(&self) -> &str {
        &self.audio_extension
    }

    /// Directory holding a model's artifacts
    pub fn model_dir(&self, model: &str) -> PathBuf {
        self.root.join(model)
    }

    /// Midi file of a generation code
    pub fn midi_path(&self, model: &str, code: &str) -> PathBuf {
        self.model_dir(model).join(format!("{}.mid", code))
    }

    /// Audio file of a code rendered with an instrument
    pub fn audio_path(&self, model: &str, code: &str, instrument: Instrument) -> PathBuf {
        let id = SongId::new(code, instrument);
        self.model_dir(model)
            .join(format!("{}.{}", id, self.audio_extension))
    }

    /// Metadata sidecar of a rendering
    pub fn meta_path(&self, model: &str, id: &SongId) -> PathBuf {
        self.model_dir(model).join(format!("{}.json", id))
    }

    /// Write the sidecar of `song`
    pub fn save_meta(&self, song: &Song) -> Result<(), ArtifactError> {
        let path = self.meta_path(&song.model, &song.id);
        let meta = SongMeta {
            duration_secs: song.duration_secs,
        };
        let json = serde_json::to_string(&meta).map_err(|source| ArtifactError::Meta {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| ArtifactError::Io { path, source })
    }

    /// Read the sidecar of a rendering; missing or unreadable yields `None`
    pub fn load_meta(&self, model: &str, id: &SongId) -> Option<SongMeta> {
        let path = self.meta_path(model, id);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(?path, "Ignoring malformed song metadata: {}", e);
                None
            }
        }
    }

    /// The song an artifact pair would describe, whether or not it exists
    pub fn song(&self, model: &str, code: &str, instrument: Instrument) -> Song {
        Song::new(
            model,
            code,
            instrument,
            self.midi_path(model, code),
            self.audio_path(model, code, instrument),
        )
    }
}

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct DirArtifactStore {
    layout: ArtifactLayout,
}

impl DirArtifactStore {
    /// Create a store over a layout
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    /// The store's layout
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    fn renders_of(&self, model: &str, code: &str) -> Result<usize, ArtifactError> {
        Ok(self
            .list(model)?
            .iter()
            .filter_map(|id| SongId::parse(id.as_str()))
            .filter(|(other, _)| other == code)
            .count())
    }
}

fn remove_if_present(path: &Path) -> Result<bool, ArtifactError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl ArtifactStore for DirArtifactStore {
    fn list(&self, model: &str) -> Result<Vec<SongId>, ArtifactError> {
        let dir = self.layout.model_dir(model);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ArtifactError::Io { path: dir, source }),
        };

        let mut ids = BTreeSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_audio = path
                .extension()
                .map(|ext| ext == self.layout.audio_extension.as_str())
                .unwrap_or(false);
            if !is_audio {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(id) = SongId::from_raw(stem) {
                ids.insert(id);
            }
        }
        Ok(ids.into_iter().collect())
    }

    fn exists(&self, model: &str, id: &SongId) -> bool {
        match SongId::parse(id.as_str()) {
            Some((code, instrument)) => {
                let song = self.layout.song(model, &code, instrument);
                song.audio.is_file() && song.midi.is_file()
            }
            None => false,
        }
    }

    fn resolve(&self, model: &str, id: &SongId) -> Option<Song> {
        let (code, instrument) = SongId::parse(id.as_str())?;
        let song = self.layout.song(model, &code, instrument);
        if !(song.audio.is_file() && song.midi.is_file()) {
            return None;
        }
        let duration = self.layout.load_meta(model, id).unwrap_or_default().duration_secs;
        Some(song.with_duration(duration))
    }

    fn delete(&self, model: &str, id: &SongId) -> Result<(), ArtifactError> {
        let Some((code, instrument)) = SongId::parse(id.as_str()) else {
            return Ok(());
        };
        let song = self.layout.song(model, &code, instrument);
        remove_if_present(&song.audio)?;
        remove_if_present(&self.layout.meta_path(model, id))?;

        // The midi is shared by every rendering of the code.
        if self.renders_of(model, &code)? == 0 {
            remove_if_present(&song.midi)?;
        }
        debug!(model, song = %id, "Deleted artifacts");
        Ok(())
    }

    fn newest(&self, model: &str) -> Option<Song> {
        let ids = match self.list(model) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(model, "Failed to list songs: {}", e);
                return None;
            }
        };
        let mut newest: Option<(SystemTime, SongId)> = None;
        for id in ids {
            let Some((code, instrument)) = SongId::parse(id.as_str()) else {
                continue;
            };
            let audio = self.layout.audio_path(model, &code, instrument);
            let Ok(modified) = fs::metadata(&audio).and_then(|m| m.modified()) else {
                continue;
            };
            // Ties go to the later id
            if newest.as_ref().map(|(at, _)| modified >= *at).unwrap_or(true) {
                newest = Some((modified, id));
            }
        }
        newest.and_then(|(_, id)| self.resolve(model, &id))
    }
}
