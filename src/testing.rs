// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! In-memory capabilities for exercising sessions and loops without
//! external processes or a filesystem.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::audio::{PlaybackSink, SinkError};
use crate::control::{
    Action, ChannelInteractions, Interaction, InteractionFeed, InteractionSource, Menu, MenuToken, SurfaceEvent,
    UserId,
};
use crate::generators::{GenerationError, ModelSpec, RenderError, Renderer, SongGenerator};
use crate::song::{Instrument, Song, SongId};
use crate::stats::{SongStats, StatsBook, StatsError, StatsStore, MAX_VOTE, MIN_VOTE};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Artifact store kept in a map
#[derive(Default)]
pub struct MemoryArtifacts {
    songs: Mutex<BTreeMap<(String, SongId), Song>>,
    inserted: Mutex<Vec<(String, SongId)>>,
    deleted: Mutex<Vec<SongId>>,
}

impl MemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a song's artifacts
    pub fn insert(&self, song: Song) {
        let key = (song.model.clone(), song.id.clone());
        lock(&self.inserted).push(key.clone());
        lock(&self.songs).insert(key, song);
    }

    /// Forget a song without recording a deletion
    pub fn remove(&self, model: &str, id: &SongId) {
        lock(&self.songs).remove(&(model.to_string(), id.clone()));
    }

    /// Ids deleted through the store, in order
    pub fn deleted(&self) -> Vec<SongId> {
        lock(&self.deleted).clone()
    }
}

impl ArtifactStore for MemoryArtifacts {
    fn list(&self, model: &str) -> Result<Vec<SongId>, ArtifactError> {
        Ok(lock(&self.songs)
            .keys()
            .filter(|(m, _)| m == model)
            .map(|(_, id)| id.clone())
            .collect())
    }

    fn exists(&self, model: &str, id: &SongId) -> bool {
        lock(&self.songs).contains_key(&(model.to_string(), id.clone()))
    }

    fn resolve(&self, model: &str, id: &SongId) -> Option<Song> {
        lock(&self.songs).get(&(model.to_string(), id.clone())).cloned()
    }

    fn delete(&self, model: &str, id: &SongId) -> Result<(), ArtifactError> {
        lock(&self.songs).remove(&(model.to_string(), id.clone()));
        lock(&self.deleted).push(id.clone());
        Ok(())
    }

    fn newest(&self, model: &str) -> Option<Song> {
        let songs = lock(&self.songs);
        lock(&self.inserted)
            .iter()
            .rev()
            .filter(|(m, _)| m == model)
            .find_map(|key| songs.get(key).cloned())
    }
}

/// Stats store kept in memory
#[derive(Default)]
pub struct MemoryStats {
    books: Mutex<HashMap<String, StatsBook>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatsStore for MemoryStats {
    fn record(&self, model: &str, id: &SongId, user: &str, vote: u8) -> Result<(), StatsError> {
        if !(MIN_VOTE..=MAX_VOTE).contains(&vote) {
            return Err(StatsError::InvalidVote(vote));
        }
        lock(&self.books)
            .entry(model.to_string())
            .or_default()
            .record(id, user, vote);
        Ok(())
    }

    fn stats(&self, model: &str, id: &SongId) -> Result<Option<SongStats>, StatsError> {
        Ok(lock(&self.books)
            .get(model)
            .and_then(|book| book.songs.get(id.as_str()).cloned()))
    }

    fn ranking(&self, model: &str) -> Result<Vec<(SongId, f64)>, StatsError> {
        Ok(lock(&self.books)
            .get(model)
            .map(StatsBook::ranking)
            .unwrap_or_default())
    }

    fn rated_by(&self, model: &str, user: &str) -> Result<HashSet<SongId>, StatsError> {
        Ok(lock(&self.books)
            .get(model)
            .map(|book| book.rated_by(user))
            .unwrap_or_default())
    }
}

/// Generator producing numbered songs after a fixed delay
pub struct FakeGenerator {
    artifacts: Arc<MemoryArtifacts>,
    delay: Duration,
    next: AtomicUsize,
    failures_left: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    queue_sampler: Mutex<Option<Box<dyn Fn() -> usize + Send + Sync>>>,
    samples: Mutex<Vec<usize>>,
}

impl FakeGenerator {
    /// Generator storing its songs in `artifacts`
    pub fn new(artifacts: Arc<MemoryArtifacts>, delay: Duration) -> Self {
        Self {
            artifacts,
            delay,
            next: AtomicUsize::new(1),
            failures_left: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            queue_sampler: Mutex::new(None),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `count` calls
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Sample a value (usually a queue length) at the start of every call
    pub fn sample_on_start(&self, sampler: impl Fn() -> usize + Send + Sync + 'static) {
        *lock(&self.queue_sampler) = Some(Box::new(sampler));
    }

    /// Values sampled at each generation start
    pub fn samples(&self) -> Vec<usize> {
        lock(&self.samples).clone()
    }

    /// Number of songs produced
    pub fn generated(&self) -> usize {
        self.next.load(Ordering::SeqCst) - 1
    }

    /// Most calls that were ever in flight together
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SongGenerator for FakeGenerator {
    async fn generate(&self, model: &ModelSpec, instrument: Instrument) -> Result<Song, GenerationError> {
        if let Some(sampler) = lock(&self.queue_sampler).as_ref() {
            let value = sampler();
            lock(&self.samples).push(value);
        }
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GenerationError::BadOutput("model crashed".into()));
        }

        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let code = format!("gen{:04}", n);
        let song = Song::new(
            model.name.clone(),
            code.clone(),
            instrument,
            format!("{}.mid", code),
            format!("{}_{}.mp3", code, instrument.program()),
        )
        .with_duration(60);
        self.artifacts.insert(song.clone());
        Ok(song)
    }
}

/// Renderer deriving a new audio path from the source song
pub struct FakeRenderer {
    artifacts: Arc<MemoryArtifacts>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeRenderer {
    pub fn new(artifacts: Arc<MemoryArtifacts>) -> Self {
        Self {
            artifacts,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every render fail
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, source: &Song, instrument: Instrument) -> Result<Song, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RenderError::NoOutput(PathBuf::from("missing.mp3")));
        }
        let song = Song::new(
            source.model.clone(),
            source.code.clone(),
            instrument,
            source.midi.clone(),
            format!("{}_{}.mp3", source.code, instrument.program()),
        )
        .with_duration(source.duration_secs);
        self.artifacts.insert(song.clone());
        Ok(song)
    }
}

/// Sink call log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Connect,
    Start(PathBuf),
    Stop,
    Pause,
    Resume,
    Disconnect,
}

#[derive(Default)]
struct FakeSinkState {
    playing: Option<(PathBuf, Instant)>,
    paused: bool,
    calls: Vec<SinkCall>,
}

/// Sink recording every call; songs end after `play_time`
pub struct RecordingSink {
    connected: AtomicBool,
    play_time: Option<Duration>,
    state: Mutex<FakeSinkState>,
}

impl RecordingSink {
    /// A sink whose songs play until stopped
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            play_time: None,
            state: Mutex::new(FakeSinkState::default()),
        }
    }

    /// A sink whose songs finish on their own
    pub fn with_play_time(play_time: Duration) -> Self {
        Self {
            play_time: Some(play_time),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        lock(&self.state).calls.clone()
    }

    /// Audio files started, in order
    pub fn started(&self) -> Vec<PathBuf> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Start(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    fn loaded(&self) -> bool {
        let mut state = lock(&self.state);
        if let (Some((_, since)), Some(play_time)) = (state.playing.as_ref(), self.play_time) {
            if !state.paused && since.elapsed() >= play_time {
                state.playing = None;
            }
        }
        state.playing.is_some()
    }

    fn log(&self, call: SinkCall) {
        lock(&self.state).calls.push(call);
    }

    fn require_connection(&self) -> Result<(), SinkError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SinkError::Unavailable)
        }
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackSink for RecordingSink {
    async fn connect(&self) -> Result<(), SinkError> {
        self.connected.store(true, Ordering::SeqCst);
        self.log(SinkCall::Connect);
        Ok(())
    }

    async fn start(&self, audio: &Path) -> Result<(), SinkError> {
        self.require_connection()?;
        if self.loaded() {
            return Err(SinkError::StartFailed("a source is already playing".into()));
        }
        let mut state = lock(&self.state);
        state.playing = Some((audio.to_path_buf(), Instant::now()));
        state.paused = false;
        state.calls.push(SinkCall::Start(audio.to_path_buf()));
        Ok(())
    }

    async fn stop(&self) -> Result<(), SinkError> {
        let mut state = lock(&self.state);
        state.playing = None;
        state.paused = false;
        state.calls.push(SinkCall::Stop);
        Ok(())
    }

    async fn pause(&self) -> Result<(), SinkError> {
        self.require_connection()?;
        let mut state = lock(&self.state);
        state.paused = state.playing.is_some();
        state.calls.push(SinkCall::Pause);
        Ok(())
    }

    async fn resume(&self) -> Result<(), SinkError> {
        self.require_connection()?;
        let mut state = lock(&self.state);
        state.paused = false;
        state.calls.push(SinkCall::Resume);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SinkError> {
        self.connected.store(false, Ordering::SeqCst);
        let mut state = lock(&self.state);
        state.playing = None;
        state.paused = false;
        state.calls.push(SinkCall::Disconnect);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.loaded() && !lock(&self.state).paused
    }

    fn is_paused(&self) -> bool {
        self.loaded() && lock(&self.state).paused
    }
}

/// Presses made on one menu
type Turn = Vec<(UserId, Action)>;

/// Channel surface that answers each presented menu from a script.
///
/// Every surface event is kept for inspection. A menu with no scripted
/// turn left waits for `press` or its deadline.
pub struct ScriptedInteractions {
    inner: ChannelInteractions,
    feed: InteractionFeed,
    surface: Mutex<UnboundedReceiver<SurfaceEvent>>,
    events: Mutex<Vec<SurfaceEvent>>,
    turns: Mutex<HashMap<UserId, VecDeque<Turn>>>,
    shown: Mutex<HashMap<UserId, MenuToken>>,
}

impl ScriptedInteractions {
    pub fn new() -> Self {
        let (inner, feed, surface) = ChannelInteractions::new();
        Self {
            inner,
            feed,
            surface: Mutex::new(surface),
            events: Mutex::new(Vec::new()),
            turns: Mutex::new(HashMap::new()),
            shown: Mutex::new(HashMap::new()),
        }
    }

    /// Presses made on the next menu presented to `owner`
    pub fn answer(&self, owner: &UserId, presses: impl IntoIterator<Item = (UserId, Action)>) {
        lock(&self.turns)
            .entry(owner.clone())
            .or_default()
            .push_back(presses.into_iter().collect());
    }

    /// `owner` answers its next menus with `actions`, one per menu
    pub fn answer_with(&self, owner: &UserId, actions: impl IntoIterator<Item = Action>) {
        for action in actions {
            self.answer(owner, [(owner.clone(), action)]);
        }
    }

    /// Press on the menu currently shown to `owner`. False when none is open.
    pub fn press(&self, owner: &UserId, user: &UserId, action: Action) -> bool {
        let token = lock(&self.shown).get(owner).copied();
        match token {
            Some(token) => self.feed.press(token, user, action),
            None => false,
        }
    }

    pub fn feed(&self) -> &InteractionFeed {
        &self.feed
    }

    /// Surface events so far, oldest first
    pub fn events(&self) -> Vec<SurfaceEvent> {
        let mut events = lock(&self.events);
        let mut surface = lock(&self.surface);
        while let Ok(event) = surface.try_recv() {
            events.push(event);
        }
        events.clone()
    }
}

impl Default for ScriptedInteractions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InteractionSource for ScriptedInteractions {
    async fn present(&self, owner: &UserId, menu: &Menu) -> MenuToken {
        let token = self.inner.present(owner, menu).await;
        lock(&self.shown).insert(owner.clone(), token);
        let turn = lock(&self.turns).get_mut(owner).and_then(VecDeque::pop_front);
        for (user, action) in turn.unwrap_or_default() {
            self.feed.press(token, &user, action);
        }
        token
    }

    async fn next_interaction(&self, token: MenuToken) -> Option<Interaction> {
        self.inner.next_interaction(token).await
    }

    async fn clear(&self, owner: &UserId, token: MenuToken) {
        {
            let mut shown = lock(&self.shown);
            if shown.get(owner) == Some(&token) {
                shown.remove(owner);
            }
        }
        self.inner.clear(owner, token).await;
    }

    async fn message(&self, owner: &UserId, text: &str) {
        self.inner.message(owner, text).await;
    }

    async fn ephemeral(&self, user: &UserId, text: &str) {
        self.inner.ephemeral(user, text).await;
    }
}
