// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Command-line generation and rendering adapters.
//!
//! The generator command receives `{checkpoint}`, `{out}` and `{instrument}`
//! and must print `<midi path> <audio path> [duration secs]` as the last line
//! of its stdout. The renderer command receives `{midi}`, `{audio}`,
//! `{instrument}` and `{code}` and must write the audio file it was given.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{GenerationError, ModelSpec, RenderError, Renderer, SongGenerator};
use crate::artifacts::ArtifactLayout;
use crate::command::CommandTemplate;
use crate::song::{Instrument, Song};

/// What a generator run reported on stdout
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorOutput {
    /// Produced midi file
    pub midi: PathBuf,
    /// Produced audio file
    pub audio: PathBuf,
    /// Audio length if reported
    pub duration_secs: Option<u32>,
}

/// Parse the last non-empty stdout line of a generator run
pub fn parse_generator_output(stdout: &str) -> Result<GeneratorOutput, GenerationError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| GenerationError::BadOutput(stdout.to_string()))?;

    let mut parts = line.split_whitespace();
    let (Some(midi), Some(audio)) = (parts.next(), parts.next()) else {
        return Err(GenerationError::BadOutput(line.to_string()));
    };
    let duration_secs = match parts.next() {
        Some(raw) => Some(
            raw.parse::<f64>()
                .map(|secs| secs.max(0.0).round() as u32)
                .map_err(|_| GenerationError::BadOutput(line.to_string()))?,
        ),
        None => None,
    };

    Ok(GeneratorOutput {
        midi: PathBuf::from(midi),
        audio: PathBuf::from(audio),
        duration_secs,
    })
}

/// Move a file, copying when a rename crosses filesystems
async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if from == to {
        return Ok(());
    }
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

/// Generates songs by running an external inference command
pub struct CommandGenerator {
    template: CommandTemplate,
    layout: ArtifactLayout,
}

impl CommandGenerator {
    /// Create a generator storing its artifacts under `layout`
    pub fn new(template: CommandTemplate, layout: ArtifactLayout) -> Self {
        Self { template, layout }
    }
}

#[async_trait]
impl SongGenerator for CommandGenerator {
    async fn generate(
        &self,
        model: &ModelSpec,
        instrument: Instrument,
    ) -> Result<Song, GenerationError> {
        let out_dir = self.layout.model_dir(&model.name);
        tokio::fs::create_dir_all(&out_dir).await?;

        let vars = HashMap::from([
            ("checkpoint", model.checkpoint.display().to_string()),
            ("out", out_dir.display().to_string()),
            ("instrument", instrument.program().to_string()),
        ]);
        let stdout = self.template.run(&vars).await?;
        let output = parse_generator_output(&stdout)?;

        for path in [&output.midi, &output.audio] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(GenerationError::MissingArtifact(path.clone()));
            }
        }

        let code = output
            .midi
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| GenerationError::BadOutput(output.midi.display().to_string()))?
            .to_string();

        let song = self.layout.song(&model.name, &code, instrument);
        move_file(&output.midi, &song.midi).await?;
        move_file(&output.audio, &song.audio).await?;
        debug!(song = %song.id, audio = ?song.audio, "Stored generated artifacts");

        let song = match output.duration_secs {
            Some(secs) => song.with_duration(secs),
            None => song,
        };
        if let Err(e) = self.layout.save_meta(&song) {
            warn!(song = %song.id, "Failed to store song metadata: {}", e);
        }
        Ok(song)
    }
}

/// Renders midi with an instrument by running an external synth command
pub struct CommandRenderer {
    template: CommandTemplate,
    layout: ArtifactLayout,
}

impl CommandRenderer {
    /// Create a renderer writing into `layout`
    pub fn new(template: CommandTemplate, layout: ArtifactLayout) -> Self {
        Self { template, layout }
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, source: &Song, instrument: Instrument) -> Result<Song, RenderError> {
        if !tokio::fs::try_exists(&source.midi).await.unwrap_or(false) {
            return Err(RenderError::MissingMidi(source.id.clone()));
        }

        let target = self.layout.song(&source.model, &source.code, instrument);
        let vars = HashMap::from([
            ("midi", source.midi.display().to_string()),
            ("audio", target.audio.display().to_string()),
            ("instrument", instrument.program().to_string()),
            ("code", source.code.clone()),
        ]);
        let stdout = self.template.run(&vars).await?;

        if !tokio::fs::try_exists(&target.audio).await.unwrap_or(false) {
            return Err(RenderError::NoOutput(target.audio));
        }

        let duration = stdout
            .lines()
            .rev()
            .find_map(|l| l.trim().parse::<f64>().ok());
        if duration.is_none() && !stdout.trim().is_empty() {
            warn!(song = %target.id, "Renderer output carried no duration");
        }
        debug!(from = %source.id, to = %target.id, "Rendered song");

        // Same music, so the source length holds when the synth reports none
        let secs = duration
            .map(|secs| secs.max(0.0).round() as u32)
            .unwrap_or(source.duration_secs);
        let song = target.with_duration(secs);
        if let Err(e) = self.layout.save_meta(&song) {
            warn!(song = %song.id, "Failed to store song metadata: {}", e);
        }
        Ok(song)
    }
}
