// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration system for the jukebox.
//!
//! This module provides data structures for loading and saving the
//! jukebox configuration: models, artifact locations, queue depth,
//! timings and the external commands. YAML and TOML are both accepted,
//! chosen by file extension.

pub mod watcher;

pub use watcher::{validate_config, ConfigEvent, ConfigWatcher};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactLayout;
use crate::command::CommandTemplate;
use crate::generators::ModelSpec;
use crate::session::{Selection, Timings};
use crate::song::Instrument;

/// On-disk format of a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Format implied by a file extension; YAML when unknown
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }

    /// Whether the path looks like a config file
    pub fn is_config_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml") | Some("toml")
        )
    }
}

/// Root jukebox configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JukeboxConfig {
    /// Model used for new generations
    #[serde(default = "default_model")]
    pub model: String,
    /// Instrument used for new generations (General MIDI program)
    #[serde(default)]
    pub instrument: Instrument,
    /// Listener the terminal surface acts as
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Model name to checkpoint path
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

fn default_model() -> String {
    "lofi".to_string()
}
fn default_owner() -> String {
    "local".to_string()
}
fn default_models() -> BTreeMap<String, PathBuf> {
    BTreeMap::from([("lofi".to_string(), PathBuf::from("checkpoints/lofi.ckpt"))])
}

impl Default for JukeboxConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            instrument: Instrument::default(),
            owner: default_owner(),
            models: default_models(),
            paths: PathsConfig::default(),
            queue: QueueConfig::default(),
            timing: TimingConfig::default(),
            commands: CommandsConfig::default(),
        }
    }
}

impl JukeboxConfig {
    /// Load a configuration file, YAML or TOML by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = match ConfigFormat::from_path(path) {
            ConfigFormat::Yaml => Self::from_yaml(&contents)?,
            ConfigFormat::Toml => Self::from_toml(&contents)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Parse a configuration from TOML string
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML configuration")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Save configuration, format chosen by extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = match ConfigFormat::from_path(path) {
            ConfigFormat::Yaml => self.to_yaml()?,
            ConfigFormat::Toml => self.to_toml()?,
        };
        fs::write(path, text).with_context(|| format!("Failed to write config file: {:?}", path))
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if !self.models.contains_key(&self.model) {
            bail!("Current model {:?} is not listed under models", self.model);
        }
        if self.queue.watermark == 0 {
            bail!("queue.watermark must be at least 1");
        }
        for (name, template) in [
            ("generate", &self.commands.generate),
            ("render", &self.commands.render),
            ("player", &self.commands.player),
        ] {
            if template.is_empty() {
                bail!("commands.{} is empty", name);
            }
        }
        Ok(())
    }

    /// Checkpoint spec of a named model
    pub fn model_spec(&self, name: &str) -> Option<ModelSpec> {
        self.models
            .get(name)
            .map(|checkpoint| ModelSpec::new(name, checkpoint.clone()))
    }

    /// Current model and instrument
    pub fn selection(&self) -> Result<Selection> {
        let model = self
            .model_spec(&self.model)
            .ok_or_else(|| anyhow!("Unknown model: {}", self.model))?;
        Ok(Selection::new(model, self.instrument))
    }

    /// Artifact layout under the generated-songs root
    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(self.paths.generated.clone(), self.paths.audio_extension.clone())
    }

    pub fn timings(&self) -> Timings {
        self.timing.to_timings()
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Root of generated songs, one directory per model
    #[serde(default = "default_generated")]
    pub generated: PathBuf,
    /// Directory of per-model stats files
    #[serde(default = "default_stats")]
    pub stats: PathBuf,
    /// Directory of the log file
    #[serde(default = "default_logs")]
    pub logs: PathBuf,
    /// Extension of rendered audio
    #[serde(default = "default_audio_extension")]
    pub audio_extension: String,
}

fn default_generated() -> PathBuf {
    PathBuf::from("generated")
}
fn default_stats() -> PathBuf {
    PathBuf::from("stats")
}
fn default_logs() -> PathBuf {
    PathBuf::from("logs")
}
fn default_audio_extension() -> String {
    "mp3".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            generated: default_generated(),
            stats: default_stats(),
            logs: default_logs(),
            audio_extension: default_audio_extension(),
        }
    }
}

/// Queue settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Songs generated ahead of playback
    #[serde(default = "default_watermark")]
    pub watermark: usize,
}

fn default_watermark() -> usize {
    3
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            watermark: default_watermark(),
        }
    }
}

/// Timing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    /// Seconds a menu waits for the owner
    #[serde(default = "default_interaction_timeout")]
    pub interaction_timeout_secs: u64,
    /// Milliseconds between idle checks and generation retries
    #[serde(default = "default_idle_poll")]
    pub idle_poll_ms: u64,
    /// Milliseconds between starting a queued song and deleting it
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    /// Milliseconds a loop stop waits before joining the old loops
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
}

fn default_interaction_timeout() -> u64 {
    180
}
fn default_idle_poll() -> u64 {
    500
}
fn default_settle_delay() -> u64 {
    3000
}
fn default_stop_grace() -> u64 {
    2000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            interaction_timeout_secs: default_interaction_timeout(),
            idle_poll_ms: default_idle_poll(),
            settle_delay_ms: default_settle_delay(),
            stop_grace_ms: default_stop_grace(),
        }
    }
}

impl TimingConfig {
    pub fn to_timings(&self) -> Timings {
        Timings {
            interaction_timeout: Duration::from_secs(self.interaction_timeout_secs),
            idle_poll: Duration::from_millis(self.idle_poll_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        }
    }
}

/// External command templates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandsConfig {
    /// Model inference: `{checkpoint}`, `{out}`, `{instrument}`
    #[serde(default = "default_generate")]
    pub generate: CommandTemplate,
    /// Soundfont rendering: `{midi}`, `{audio}`, `{instrument}`, `{code}`
    #[serde(default = "default_render")]
    pub render: CommandTemplate,
    /// Audio player: `{audio}`
    #[serde(default = "default_player")]
    pub player: CommandTemplate,
}

fn default_generate() -> CommandTemplate {
    CommandTemplate::new([
        "python3",
        "generate.py",
        "--checkpoint",
        "{checkpoint}",
        "--out",
        "{out}",
        "--instrument",
        "{instrument}",
    ])
}
fn default_render() -> CommandTemplate {
    CommandTemplate::new(["python3", "render.py", "{midi}", "{audio}", "--instrument", "{instrument}"])
}
fn default_player() -> CommandTemplate {
    CommandTemplate::new(["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet", "{audio}"])
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            generate: default_generate(),
            render: default_render(),
            player: default_player(),
        }
    }
}
