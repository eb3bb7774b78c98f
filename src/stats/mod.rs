// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Listener statistics: view counts, ratings and rankings.
//!
//! Each model has its own stats file mapping song id to
//! `{ "view": n, "rate": [{ "user": .., "vote": .. }], "score": .. }`.
//! The score is derived from the votes; a stored score is only written
//! for readers of the file and is recomputed on every read.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::song::SongId;

/// Lowest accepted vote
pub const MIN_VOTE: u8 = 1;
/// Highest accepted vote
pub const MAX_VOTE: u8 = 5;

/// Stats store errors
#[derive(Debug, Error)]
pub enum StatsError {
    /// Vote outside 1..=5
    #[error("vote out of range: {0}")]
    InvalidVote(u8),
    /// Stats file could not be read or written
    #[error("stats file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Stats file is not valid JSON
    #[error("stats file {path:?} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Internal lock was poisoned
    #[error("stats store lock poisoned")]
    LockFailed,
}

/// One listener's rating of a song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Who voted
    pub user: String,
    /// Rating value (1-5)
    pub vote: u8,
}

/// Per-song statistics
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SongStats {
    /// Number of recorded listens
    #[serde(default)]
    pub view: u32,
    /// Votes in the order they were cast
    #[serde(default)]
    pub rate: Vec<Vote>,
    /// Cached mean vote, refreshed on write
    #[serde(default)]
    pub score: Option<f64>,
}

impl SongStats {
    /// Mean of all votes, `None` when unrated
    pub fn aggregate_score(&self) -> Option<f64> {
        if self.rate.is_empty() {
            return None;
        }
        let total: u32 = self.rate.iter().map(|v| v.vote as u32).sum();
        Some(total as f64 / self.rate.len() as f64)
    }

    /// Whether `user` has voted on this song
    pub fn rated_by(&self, user: &str) -> bool {
        self.rate.iter().any(|v| v.user == user)
    }

    fn record(&mut self, user: &str, vote: u8) {
        self.view += 1;
        self.rate.push(Vote {
            user: user.to_string(),
            vote,
        });
        self.score = self.aggregate_score();
    }
}

/// All stats of one model, keyed by song id
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsBook {
    /// Stats per song id
    pub songs: BTreeMap<String, SongStats>,
}

impl StatsBook {
    /// Parse a stats file body
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut book: StatsBook = serde_json::from_str(json)?;
        book.refresh_scores();
        Ok(book)
    }

    /// Serialize with scores refreshed
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Record a vote, creating the entry on first view
    pub fn record(&mut self, id: &SongId, user: &str, vote: u8) {
        self.songs
            .entry(id.to_string())
            .or_default()
            .record(user, vote);
    }

    /// Rated songs, best first; ties ordered by id
    pub fn ranking(&self) -> Vec<(SongId, f64)> {
        let mut ranked: Vec<(SongId, f64)> = self
            .songs
            .iter()
            .filter_map(|(id, stats)| {
                let score = stats.aggregate_score()?;
                Some((SongId::from_raw(id)?, score))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// Ids `user` has voted on
    pub fn rated_by(&self, user: &str) -> HashSet<SongId> {
        self.songs
            .iter()
            .filter(|(_, stats)| stats.rated_by(user))
            .filter_map(|(id, _)| SongId::from_raw(id))
            .collect()
    }

    fn refresh_scores(&mut self) {
        for stats in self.songs.values_mut() {
            stats.score = stats.aggregate_score();
        }
    }
}

/// Records ratings and answers ranking queries, per model
pub trait StatsStore: Send + Sync {
    /// Record `user`'s vote on a song and persist
    fn record(&self, model: &str, id: &SongId, user: &str, vote: u8) -> Result<(), StatsError>;

    /// Stats of a single song
    fn stats(&self, model: &str, id: &SongId) -> Result<Option<SongStats>, StatsError>;

    /// Rated songs of a model ordered by score, descending
    fn ranking(&self, model: &str) -> Result<Vec<(SongId, f64)>, StatsError>;

    /// Songs `user` has already rated
    fn rated_by(&self, model: &str, user: &str) -> Result<HashSet<SongId>, StatsError>;
}

/// JSON-file stats store, one file per model, cached in memory
#[derive(Debug)]
pub struct JsonStatsStore {
    dir: PathBuf,
    books: Mutex<HashMap<String, StatsBook>>,
}

impl JsonStatsStore {
    /// Create a store writing `<dir>/<model>.json`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            books: Mutex::new(HashMap::new()),
        }
    }

    /// Stats file of a model
    pub fn path_for(&self, model: &str) -> PathBuf {
        self.dir.join(format!("{}.json", model))
    }

    fn load(&self, model: &str) -> Result<StatsBook, StatsError> {
        let path = self.path_for(model);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(model, "No stats file yet");
                return Ok(StatsBook::default());
            }
            Err(source) => return Err(StatsError::Io { path, source }),
        };
        StatsBook::from_json(&contents).map_err(|source| StatsError::Malformed { path, source })
    }

    fn persist(&self, model: &str, book: &StatsBook) -> Result<(), StatsError> {
        let path = self.path_for(model);
        fs::create_dir_all(&self.dir).map_err(|source| StatsError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let json = book.to_json().map_err(|source| StatsError::Malformed {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| StatsError::Io { path, source })
    }

    fn with_books<T>(
        &self,
        model: &str,
        f: impl FnOnce(&mut HashMap<String, StatsBook>) -> Result<T, StatsError>,
    ) -> Result<T, StatsError> {
        let mut books = self.books.lock().map_err(|_| StatsError::LockFailed)?;
        if !books.contains_key(model) {
            let book = self.load(model)?;
            books.insert(model.to_string(), book);
        }
        f(&mut books)
    }

    fn with_book<T>(&self, model: &str, f: impl FnOnce(&StatsBook) -> T) -> Result<T, StatsError> {
        self.with_books(model, |books| {
            books.get(model).map(f).ok_or(StatsError::LockFailed)
        })
    }
}

impl StatsStore for JsonStatsStore {
    fn record(&self, model: &str, id: &SongId, user: &str, vote: u8) -> Result<(), StatsError> {
        if !(MIN_VOTE..=MAX_VOTE).contains(&vote) {
            return Err(StatsError::InvalidVote(vote));
        }
        // Written under the lock; the cache only follows a successful write.
        self.with_books(model, |books| {
            let mut updated = books.get(model).cloned().unwrap_or_default();
            updated.record(id, user, vote);
            if let Err(e) = self.persist(model, &updated) {
                warn!(model, "Failed to persist stats: {}", e);
                return Err(e);
            }
            books.insert(model.to_string(), updated);
            Ok(())
        })?;
        debug!(model, song = %id, user, vote, "Recorded vote");
        Ok(())
    }

    fn stats(&self, model: &str, id: &SongId) -> Result<Option<SongStats>, StatsError> {
        self.with_book(model, |book| book.songs.get(id.as_str()).cloned())
    }

    fn ranking(&self, model: &str) -> Result<Vec<(SongId, f64)>, StatsError> {
        self.with_book(model, |book| book.ranking())
    }

    fn rated_by(&self, model: &str, user: &str) -> Result<HashSet<SongId>, StatsError> {
        self.with_book(model, |book| book.rated_by(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(raw: &str) -> SongId {
        SongId::from_raw(raw).unwrap()
    }

    #[test]
    fn test_first_vote_creates_entry() {
        let mut book = StatsBook::default();
        book.record(&id("abcd12_0"), "alice", 4);

        let stats = &book.songs["abcd12_0"];
        assert_eq!(stats.view, 1);
        assert_eq!(stats.rate, vec![Vote { user: "alice".into(), vote: 4 }]);
        assert_eq!(stats.score, Some(4.0));
    }

    #[test]
    fn test_later_votes_increment_views() {
        let mut book = StatsBook::default();
        book.record(&id("abcd12_0"), "alice", 4);
        book.record(&id("abcd12_0"), "bob", 1);

        let stats = &book.songs["abcd12_0"];
        assert_eq!(stats.view, 2);
        assert_eq!(stats.rate.len(), 2);
        assert_eq!(stats.aggregate_score(), Some(2.5));
    }

    #[test]
    fn test_ranking_descending_excludes_unrated() {
        let mut book = StatsBook::default();
        book.record(&id("low_0"), "alice", 2);
        book.record(&id("high_0"), "alice", 5);
        book.record(&id("mid_0"), "alice", 3);
        book.songs.insert("unrated_0".into(), SongStats { view: 3, ..Default::default() });

        let ranking: Vec<String> = book.ranking().into_iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(ranking, vec!["high_0", "mid_0", "low_0"]);
    }

    #[test]
    fn test_stored_score_is_not_trusted() {
        let json = r#"{"abcd12_0": {"view": 2, "rate": [{"user": "a", "vote": 2}, {"user": "b", "vote": 4}], "score": 5.0}}"#;
        let book = StatsBook::from_json(json).unwrap();
        assert_eq!(book.songs["abcd12_0"].score, Some(3.0));
    }

    #[test]
    fn test_file_field_names() {
        let mut book = StatsBook::default();
        book.record(&id("abcd12_0"), "alice", 5);
        let value: serde_json::Value = serde_json::from_str(&book.to_json().unwrap()).unwrap();

        let entry = &value["abcd12_0"];
        assert_eq!(entry["view"], 1);
        assert_eq!(entry["rate"][0]["user"], "alice");
        assert_eq!(entry["rate"][0]["vote"], 5);
        assert_eq!(entry["score"], 5.0);
    }

    #[test]
    fn test_json_store_persists_per_model() {
        let dir = tempdir().unwrap();
        let store = JsonStatsStore::new(dir.path());
        store.record("lofi", &id("abcd12_0"), "alice", 3).unwrap();

        assert!(store.path_for("lofi").exists());
        assert!(!store.path_for("jazz").exists());

        let reopened = JsonStatsStore::new(dir.path());
        let stats = reopened.stats("lofi", &id("abcd12_0")).unwrap().unwrap();
        assert_eq!(stats.view, 1);
        assert!(reopened.rated_by("lofi", "alice").unwrap().contains(&id("abcd12_0")));
        assert!(reopened.rated_by("lofi", "bob").unwrap().is_empty());
    }

    #[test]
    fn test_json_store_rejects_out_of_range_votes() {
        let dir = tempdir().unwrap();
        let store = JsonStatsStore::new(dir.path());
        assert!(matches!(
            store.record("lofi", &id("abcd12_0"), "alice", 0),
            Err(StatsError::InvalidVote(0))
        ));
        assert!(store.record("lofi", &id("abcd12_0"), "alice", 6).is_err());
        assert!(!store.path_for("lofi").exists());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let store = JsonStatsStore::new(dir.path());
        fs::write(store.path_for("lofi"), "not json").unwrap();
        assert!(matches!(store.ranking("lofi"), Err(StatsError::Malformed { .. })));
    }

    #[test]
    fn test_failed_write_leaves_stats_unchanged() {
        let dir = tempdir().unwrap();
        let stats_dir = dir.path().join("stats");
        let store = JsonStatsStore::new(&stats_dir);
        store.record("lofi", &id("abcd12_0"), "alice", 3).unwrap();

        // Replace the stats directory with a plain file
        fs::remove_dir_all(&stats_dir).unwrap();
        fs::write(&stats_dir, b"in the way").unwrap();

        assert!(matches!(
            store.record("lofi", &id("abcd12_0"), "bob", 5),
            Err(StatsError::Io { .. })
        ));
        let stats = store.stats("lofi", &id("abcd12_0")).unwrap().unwrap();
        assert_eq!(stats.view, 1);
        assert_eq!(stats.rate, vec![Vote { user: "alice".into(), vote: 3 }]);
        assert!(store.rated_by("lofi", "bob").unwrap().is_empty());
    }
}
