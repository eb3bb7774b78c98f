// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use lofi_jukebox::config::{ConfigEvent, ConfigWatcher};
use lofi_jukebox::control::{ChannelInteractions, InteractionSource, TerminalInteractions, UserId};
use lofi_jukebox::session::Ending;
use lofi_jukebox::song::catalog;
use lofi_jukebox::{logging, Jukebox, JukeboxConfig};

const CONFIG_POLL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "lofi-jukebox", version, about = "Generate, play and rate lo-fi songs")]
struct Cli {
    /// Configuration file, YAML or TOML
    #[arg(short, long, default_value = "jukebox.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a stored song, or generate a new one when no id is given
    Play { id: Option<String> },

    /// Play a random song you have not rated yet
    Pick,

    /// Generate and play songs continuously until 'q' is pressed
    Loop,

    /// List stored songs of the current model
    List,

    /// Show the artifact paths of a stored song, the latest one by default
    Get { id: Option<String> },

    /// Show rated songs, best first
    Ranking,

    /// Show or switch the model used for generation
    Model { name: Option<String> },

    /// Show or switch the instrument program (0-127) used for rendering
    Instrument { program: Option<u32> },

    /// List the instruments offered for re-rendering
    Instruments,

    /// Check the configuration file and exit
    Validate,
}

impl Command {
    fn is_interactive(&self) -> bool {
        matches!(self, Command::Play { .. } | Command::Pick | Command::Loop)
    }
}

fn load_config(path: &Path) -> Result<JukeboxConfig> {
    if path.exists() {
        JukeboxConfig::load(path)
    } else {
        Ok(JukeboxConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    if let Command::Validate = cli.command {
        println!("{:?}: ok (model {}, instrument {})", cli.config, config.model, config.instrument);
        return Ok(());
    }

    let log_file = logging::init(&config.paths.logs)?;
    info!(config = ?cli.config, log = ?log_file, "Jukebox starting");
    let owner = UserId::new(config.owner.clone());

    if !cli.command.is_interactive() {
        let (interactions, _feed, _surface) = ChannelInteractions::new();
        let jukebox = Jukebox::from_config(config, Some(cli.config.clone()), Arc::new(interactions))?;
        return run_offline(&jukebox, cli.command);
    }

    let terminal = Arc::new(TerminalInteractions::new(owner.clone()).context("Failed to set up the terminal")?);
    let jukebox = Jukebox::from_config(
        config,
        Some(cli.config.clone()),
        Arc::clone(&terminal) as Arc<dyn InteractionSource>,
    )?;
    let watcher = if cli.config.exists() {
        ConfigWatcher::new(&cli.config, None)
            .map_err(|e| warn!("Config hot reload disabled: {:#}", e))
            .ok()
    } else {
        None
    };

    let outcome = tokio::select! {
        result = run_interactive(&jukebox, &terminal, &owner, cli.command) => result,
        _ = watch_config(&jukebox, watcher) => Ok(None),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(None)
        }
    };

    if let Err(e) = jukebox.disconnect().await {
        warn!("Shutdown: {}", e);
    }
    drop(jukebox);
    // Leave raw mode before printing
    drop(terminal);

    if let Some(ending) = outcome? {
        println!("Session ended: {:?}", ending);
    }
    info!("Jukebox stopped");
    Ok(())
}

async fn run_interactive(
    jukebox: &Jukebox,
    terminal: &TerminalInteractions,
    owner: &UserId,
    command: Command,
) -> Result<Option<Ending>> {
    match command {
        Command::Play { id } => Ok(Some(jukebox.play(owner, id.as_deref()).await?)),
        Command::Pick => Ok(Some(jukebox.pick(owner).await?)),
        Command::Loop => {
            jukebox.start_loop().await?;
            terminal.message(owner, "Continuous playback started. Press q to stop.").await;
            terminal.quit_requested().await;
            jukebox.stop_loop().await;
            Ok(None)
        }
        _ => Ok(None),
    }
}

async fn watch_config(jukebox: &Jukebox, watcher: Option<ConfigWatcher>) {
    let Some(watcher) = watcher else {
        return std::future::pending().await;
    };
    let mut interval = tokio::time::interval(CONFIG_POLL);
    loop {
        interval.tick().await;
        for event in watcher.recv_all() {
            match event {
                ConfigEvent::Reloaded(config) => {
                    if let Err(e) = jukebox.apply_config(*config) {
                        warn!("Ignoring reloaded config: {}", e);
                    }
                }
                ConfigEvent::Error(e) => warn!("{}", e),
            }
        }
    }
}

fn run_offline(jukebox: &Jukebox, command: Command) -> Result<()> {
    match command {
        Command::List => {
            let songs = jukebox.list()?;
            if songs.is_empty() {
                println!("No songs for model {}", jukebox.selection().model.name);
            }
            for id in songs {
                println!("{}", id);
            }
        }
        Command::Get { id } => {
            let song = match id {
                Some(id) => jukebox.get(&id)?,
                None => jukebox.latest()?,
            };
            println!("{}  [{}]", song.id, song.duration_label());
            println!("  midi:  {}", song.midi.display());
            println!("  audio: {}", song.audio.display());
        }
        Command::Ranking => {
            for (rank, (id, score)) in jukebox.ranking()?.into_iter().enumerate() {
                println!("{:>3}. {:<16} {:.2}", rank + 1, id.as_str(), score);
            }
        }
        Command::Model { name: Some(name) } => {
            let model = jukebox.select_model(&name)?;
            println!("Model set to {} ({:?})", model.name, model.checkpoint);
        }
        Command::Model { name: None } => {
            let model = jukebox.selection().model;
            println!("{} ({:?})", model.name, model.checkpoint);
        }
        Command::Instrument { program: Some(program) } => {
            let instrument = jukebox.select_instrument(program)?;
            println!("Instrument set to {}", instrument);
        }
        Command::Instrument { program: None } => {
            println!("{}", jukebox.selection().instrument);
        }
        Command::Instruments => {
            for instrument in catalog() {
                println!("{:>3}  {}", instrument.program(), instrument.name());
            }
        }
        Command::Play { .. } | Command::Pick | Command::Loop | Command::Validate => {}
    }
    Ok(())
}
