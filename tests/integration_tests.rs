// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Integration tests for the jukebox
//!
//! These tests drive the public `Jukebox` API with in-memory capabilities
//! and, where noted, the filesystem-backed stores.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lofi_jukebox::artifacts::{ArtifactLayout, ArtifactStore, DirArtifactStore};
use lofi_jukebox::audio::PlaybackSink;
use lofi_jukebox::control::{Action, SurfaceEvent, UserId};
use lofi_jukebox::session::{Capabilities, Ending};
use lofi_jukebox::stats::{JsonStatsStore, StatsStore};
use lofi_jukebox::testing::{
    FakeGenerator, FakeRenderer, MemoryArtifacts, MemoryStats, RecordingSink, ScriptedInteractions, SinkCall,
};
use lofi_jukebox::{Instrument, Jukebox, JukeboxConfig, JukeboxError, Song};
use tempfile::tempdir;

struct Rig {
    jukebox: Arc<Jukebox>,
    generator: Arc<FakeGenerator>,
    renderer: Arc<FakeRenderer>,
    sink: Arc<RecordingSink>,
    stats: Arc<MemoryStats>,
    artifacts: Arc<MemoryArtifacts>,
    ui: Arc<ScriptedInteractions>,
}

fn rig(sink: RecordingSink, generation_time: Duration) -> Rig {
    let artifacts = Arc::new(MemoryArtifacts::new());
    let generator = Arc::new(FakeGenerator::new(Arc::clone(&artifacts), generation_time));
    let renderer = Arc::new(FakeRenderer::new(Arc::clone(&artifacts)));
    let sink = Arc::new(sink);
    let stats = Arc::new(MemoryStats::new());
    let ui = Arc::new(ScriptedInteractions::new());
    let capabilities = Capabilities {
        generator: generator.clone(),
        renderer: renderer.clone(),
        sink: sink.clone(),
        interactions: ui.clone(),
        stats: stats.clone(),
        artifacts: artifacts.clone(),
    };
    let config = JukeboxConfig {
        owner: "alice".into(),
        ..JukeboxConfig::default()
    };
    let jukebox = Arc::new(Jukebox::new(capabilities, config, None).unwrap());
    Rig { jukebox, generator, renderer, sink, stats, artifacts, ui }
}

fn alice() -> UserId {
    UserId::new("alice")
}

fn stored(artifacts: &MemoryArtifacts, code: &str, program: u8) -> Song {
    let instrument = Instrument::new(program).unwrap();
    let song = Song::new("lofi", code, instrument, format!("{}.mid", code), format!("{}_{}.mp3", code, program));
    artifacts.insert(song.clone());
    song
}

/// Generate, listen, rate and quit
#[tokio::test(start_paused = true)]
async fn test_generate_rate_and_quit() {
    let r = rig(RecordingSink::new(), Duration::from_secs(20));
    r.ui.answer_with(&alice(), [Action::Rate(5), Action::Quit]);

    let ending = r.jukebox.play(&alice(), None).await.unwrap();
    assert_eq!(ending, Ending::Quit);
    assert_eq!(r.generator.generated(), 1);
    assert_eq!(r.sink.started(), vec![PathBuf::from("gen0001_0.mp3")]);

    let ranking = r.jukebox.ranking().unwrap();
    assert_eq!(ranking.len(), 1);
    assert_eq!(ranking[0].0.as_str(), "gen0001_0");
    assert_eq!(ranking[0].1, 5.0);

    let events = r.ui.events();
    assert_eq!(
        events.first(),
        Some(&SurfaceEvent::Message { owner: alice(), text: "Generating...".into() })
    );
}

/// Re-rendering a stored song with another instrument plays the new render
#[tokio::test(start_paused = true)]
async fn test_rerender_stored_song() {
    let r = rig(RecordingSink::new(), Duration::from_secs(20));
    stored(&r.artifacts, "abcd12", 0);
    let violin = Instrument::new(40).unwrap();
    r.ui.answer_with(
        &alice(),
        [Action::Rerender, Action::Instrument(violin), Action::Rate(3), Action::Quit],
    );

    let ending = r.jukebox.play(&alice(), Some("abcd12_0")).await.unwrap();
    assert_eq!(ending, Ending::Quit);
    assert_eq!(r.renderer.calls(), 1);
    assert_eq!(
        r.sink.started(),
        vec![PathBuf::from("abcd12_0.mp3"), PathBuf::from("abcd12_40.mp3")]
    );

    // The vote lands on the re-rendered song, which is now stored too
    let rendered = r.jukebox.get("abcd12_40").unwrap();
    assert_eq!(rendered.instrument, violin);
    let stats = r.stats.stats("lofi", &rendered.id).unwrap().unwrap();
    assert_eq!(stats.rate[0].vote, 3);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_song() {
    let r = rig(RecordingSink::new(), Duration::from_secs(20));
    let result = r.jukebox.play(&alice(), Some("zzzz99_0")).await;
    assert!(matches!(result, Err(JukeboxError::SongNotFound(id)) if id == "zzzz99_0"));
    assert!(r.sink.started().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pick_skips_rated_songs() {
    let r = rig(RecordingSink::new(), Duration::from_secs(20));
    let rated = stored(&r.artifacts, "aaaa00", 0);
    let unrated = stored(&r.artifacts, "bbbb00", 0);
    r.stats.record("lofi", &rated.id, "alice", 4).unwrap();
    r.ui.answer_with(&alice(), [Action::Quit]);

    let ending = r.jukebox.pick(&alice()).await.unwrap();
    assert_eq!(ending, Ending::Quit);
    assert_eq!(r.sink.started(), vec![unrated.audio.clone()]);

    r.stats.record("lofi", &unrated.id, "alice", 2).unwrap();
    assert!(matches!(r.jukebox.pick(&alice()).await, Err(JukeboxError::NothingToRate)));
}

/// Continuous playback never generates past the queue watermark and plays
/// songs in generation order
#[tokio::test(start_paused = true)]
async fn test_continuous_playback() {
    let r = rig(RecordingSink::with_play_time(Duration::from_secs(30)), Duration::from_secs(10));
    let weak = Arc::downgrade(&r.jukebox);
    r.generator
        .sample_on_start(move || weak.upgrade().map(|j| j.queued().len()).unwrap_or(0));

    assert!(r.jukebox.start_loop().await.unwrap());
    tokio::time::sleep(Duration::from_secs(300)).await;

    let samples = r.generator.samples();
    assert!(!samples.is_empty());
    assert!(samples.iter().all(|&len| len < 3), "generation started with a full queue: {:?}", samples);
    assert_eq!(r.generator.max_concurrent(), 1);

    let started = r.sink.started();
    assert!(started.len() >= 5);
    for (index, path) in started.iter().enumerate() {
        assert_eq!(path, &PathBuf::from(format!("gen{:04}_0.mp3", index + 1)));
    }
    assert!(r.artifacts.deleted().len() >= started.len() - 1);

    assert!(r.jukebox.stop_loop().await);
    assert!(!r.jukebox.is_looping().await);
    assert!(r.sink.calls().contains(&SinkCall::Stop));
    assert!(!r.jukebox.stop_loop().await);

    let now_playing = r
        .ui
        .events()
        .into_iter()
        .filter(|e| matches!(e, SurfaceEvent::Message { text, .. } if text.starts_with("Now playing: ")))
        .count();
    assert_eq!(now_playing, started.len());
}

#[tokio::test(start_paused = true)]
async fn test_loop_restarts_cleanly() {
    let r = rig(RecordingSink::with_play_time(Duration::from_secs(30)), Duration::from_secs(10));
    for _ in 0..3 {
        assert!(r.jukebox.start_loop().await.unwrap());
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(r.jukebox.stop_loop().await);
    }
    assert_eq!(r.generator.max_concurrent(), 1);
}

fn write_song(layout: &ArtifactLayout, code: &str, program: u8) -> Song {
    let song = layout.song("lofi", code, Instrument::new(program).unwrap());
    fs::create_dir_all(layout.model_dir("lofi")).unwrap();
    fs::write(&song.midi, b"MThd").unwrap();
    fs::write(&song.audio, b"ID3").unwrap();
    song
}

fn disk_jukebox(root: &Path, sink: Arc<RecordingSink>) -> (Jukebox, Arc<ScriptedInteractions>) {
    let layout = ArtifactLayout::new(root.join("generated"), "mp3");
    let artifacts = Arc::new(MemoryArtifacts::new());
    let ui = Arc::new(ScriptedInteractions::new());
    let capabilities = Capabilities {
        generator: Arc::new(FakeGenerator::new(Arc::clone(&artifacts), Duration::from_secs(1))),
        renderer: Arc::new(FakeRenderer::new(artifacts)),
        sink,
        interactions: ui.clone(),
        stats: Arc::new(JsonStatsStore::new(root.join("stats"))),
        artifacts: Arc::new(DirArtifactStore::new(layout)),
    };
    let config = JukeboxConfig {
        owner: "alice".into(),
        ..JukeboxConfig::default()
    };
    (Jukebox::new(capabilities, config, None).unwrap(), ui)
}

/// Votes cast through a session survive in the per-model stats file
#[tokio::test(start_paused = true)]
async fn test_votes_persist_on_disk() {
    let dir = tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path().join("generated"), "mp3");
    let first = write_song(&layout, "abcd12", 0);
    write_song(&layout, "ffee00", 11);

    let sink = Arc::new(RecordingSink::new());
    let (jukebox, ui) = disk_jukebox(dir.path(), Arc::clone(&sink));
    assert_eq!(jukebox.list().unwrap().len(), 2);

    ui.answer_with(&alice(), [Action::Rate(4), Action::Quit]);
    jukebox.play(&alice(), Some("abcd12_0")).await.unwrap();
    assert_eq!(sink.started(), vec![first.audio.clone()]);

    let reopened = JsonStatsStore::new(dir.path().join("stats"));
    assert!(reopened.path_for("lofi").is_file());
    assert_eq!(reopened.ranking("lofi").unwrap(), vec![(first.id.clone(), 4.0)]);

    let store = DirArtifactStore::new(layout);
    store.delete("lofi", &first.id).unwrap();
    assert!(!first.midi.exists());
    assert!(jukebox.get("abcd12_0").is_err());
    assert!(jukebox.get("ffee00_11").is_ok());
}

/// Two owners run sessions side by side; each press reaches its own session
#[tokio::test(start_paused = true)]
async fn test_concurrent_sessions() {
    let r = rig(RecordingSink::new(), Duration::from_secs(20));
    let bob = UserId::new("bob");
    let first = stored(&r.artifacts, "aaaa00", 0);
    let second = stored(&r.artifacts, "bbbb00", 0);
    r.ui.answer(&alice(), [(alice(), Action::Rate(5))]);
    r.ui.answer(&bob, [(bob.clone(), Action::Rate(1))]);

    let sessions: Vec<_> = [(alice(), "aaaa00_0"), (bob.clone(), "bbbb00_0")]
        .into_iter()
        .map(|(owner, id)| {
            let jukebox = Arc::clone(&r.jukebox);
            tokio::spawn(async move { jukebox.play(&owner, Some(id)).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_secs(1)).await;
    // A stranger on alice's menu is warned, not obeyed
    assert!(r.ui.press(&alice(), &bob, Action::Quit));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(r.ui.feed().open_menus().len(), 2);

    assert!(r.ui.press(&alice(), &alice(), Action::Quit));
    assert!(r.ui.press(&bob, &bob, Action::Quit));
    for session in sessions {
        assert_eq!(session.await.unwrap().unwrap(), Ending::Quit);
    }

    let ranking = r.jukebox.ranking().unwrap();
    assert_eq!(ranking, vec![(first.id.clone(), 5.0), (second.id.clone(), 1.0)]);
    assert!(r.ui.events().contains(&SurfaceEvent::Ephemeral {
        user: bob,
        text: "You're not the votable user.".into(),
    }));
}

/// `get` without an id shows the latest generated song with its length
#[tokio::test(start_paused = true)]
async fn test_latest_generated_song() {
    let dir = tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path().join("generated"), "mp3");
    let (jukebox, _ui) = disk_jukebox(dir.path(), Arc::new(RecordingSink::new()));
    assert!(matches!(jukebox.latest(), Err(JukeboxError::NoSongs(_))));

    let song = write_song(&layout, "abcd12", 0).with_duration(125);
    layout.save_meta(&song).unwrap();

    let latest = jukebox.latest().unwrap();
    assert_eq!(latest.id, song.id);
    assert_eq!(latest.duration_label(), "02:05");
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_closes_sink() {
    let r = rig(RecordingSink::new(), Duration::from_secs(10));
    r.jukebox.ensure_connected().await.unwrap();
    assert!(r.sink.is_connected());

    r.jukebox.disconnect().await.unwrap();
    assert!(!r.sink.is_connected());
    assert_eq!(r.sink.calls().last(), Some(&SinkCall::Disconnect));
}

#[test]
fn test_config_drives_selection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("jukebox.toml");
    fs::write(
        &path,
        "model = \"jazz\"\ninstrument = 40\n\n[models]\njazz = \"checkpoints/jazz.ckpt\"\n",
    )
    .unwrap();

    let config = JukeboxConfig::load(&path).unwrap();
    let selection = config.selection().unwrap();
    assert_eq!(selection.model.name, "jazz");
    assert_eq!(selection.instrument.name(), "Violin");
}
