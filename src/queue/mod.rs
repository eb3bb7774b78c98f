// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Generation queue and the loops around it.
//!
//! This module provides:
//! - `GenerationQueue`: a bounded FIFO of songs waiting to be played
//! - `SongQueue`: the shared handle with space/item signaling and
//!   single producer / single consumer guards
//! - The feeder that fills the queue and the drain loop that plays it

pub mod drain;
pub mod feeder;

pub use drain::DrainLoop;
pub use feeder::QueueFeeder;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::Notify;

use crate::audio::SinkError;
use crate::song::{Song, SongId};

/// Queue errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Enqueue while already holding `watermark` songs
    #[error("queue is full ({watermark} songs)")]
    CapacityExceeded { watermark: usize },
    /// Dequeue from an empty queue
    #[error("queue is empty")]
    Empty,
    /// Another feeder is already filling the queue
    #[error("a producer is already attached")]
    ProducerAttached,
    /// Another drain loop is already consuming the queue
    #[error("a consumer is already attached")]
    ConsumerAttached,
}

/// Errors that end a background loop
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("playback failed: {0}")]
    Sink(#[from] SinkError),
}

/// Bounded FIFO of generated songs, in generation order
#[derive(Debug, Clone)]
pub struct GenerationQueue {
    songs: VecDeque<Song>,
    watermark: usize,
}

impl GenerationQueue {
    /// Create an empty queue holding at most `watermark` songs (at least one)
    pub fn new(watermark: usize) -> Self {
        let watermark = watermark.max(1);
        Self {
            songs: VecDeque::with_capacity(watermark),
            watermark,
        }
    }

    /// Append a song at the tail
    pub fn enqueue(&mut self, song: Song) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::CapacityExceeded {
                watermark: self.watermark,
            });
        }
        self.songs.push_back(song);
        Ok(())
    }

    /// Remove and return the head
    pub fn dequeue_head(&mut self) -> Result<Song, QueueError> {
        self.songs.pop_front().ok_or(QueueError::Empty)
    }

    /// Look at the head without removing it
    pub fn peek_head(&self) -> Option<&Song> {
        self.songs.front()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Whether the queue holds `watermark` songs
    pub fn is_full(&self) -> bool {
        self.songs.len() >= self.watermark
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Ids in queue order
    pub fn ids(&self) -> Vec<SongId> {
        self.songs.iter().map(|s| s.id.clone()).collect()
    }
}

struct Shared {
    queue: Mutex<GenerationQueue>,
    space: Notify,
    items: Notify,
    producer: AtomicBool,
    consumer: AtomicBool,
}

/// Shared handle to a generation queue.
///
/// The internal lock is only held for the duration of a single queue
/// operation, never across an await.
#[derive(Clone)]
pub struct SongQueue {
    shared: Arc<Shared>,
}

impl SongQueue {
    /// Create an empty shared queue
    pub fn new(watermark: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(GenerationQueue::new(watermark)),
                space: Notify::new(),
                items: Notify::new(),
                producer: AtomicBool::new(false),
                consumer: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GenerationQueue> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Become the only producer
    pub fn attach_producer(&self) -> Result<ProducerGuard, QueueError> {
        self.shared
            .producer
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| QueueError::ProducerAttached)?;
        Ok(ProducerGuard {
            queue: self.clone(),
        })
    }

    /// Become the only consumer
    pub fn attach_consumer(&self) -> Result<ConsumerGuard, QueueError> {
        self.shared
            .consumer
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| QueueError::ConsumerAttached)?;
        Ok(ConsumerGuard {
            queue: self.clone(),
        })
    }

    fn push(&self, song: Song) -> Result<(), QueueError> {
        self.lock().enqueue(song)?;
        self.shared.items.notify_one();
        Ok(())
    }

    fn pop(&self) -> Result<Song, QueueError> {
        let song = self.lock().dequeue_head()?;
        self.shared.space.notify_one();
        Ok(song)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lock().is_full()
    }

    pub fn watermark(&self) -> usize {
        self.lock().watermark()
    }

    /// Copy of the head song
    pub fn peek_head(&self) -> Option<Song> {
        self.lock().peek_head().cloned()
    }

    /// Ids in queue order
    pub fn ids(&self) -> Vec<SongId> {
        self.lock().ids()
    }

    /// Wait until the queue is below its watermark
    pub async fn wait_for_space(&self) {
        while self.is_full() {
            self.shared.space.notified().await;
        }
    }

    /// Wait until the queue holds at least one song
    pub async fn wait_for_item(&self) {
        while self.is_empty() {
            self.shared.items.notified().await;
        }
    }
}

/// Exclusive right to enqueue. Released on drop.
pub struct ProducerGuard {
    queue: SongQueue,
}

impl ProducerGuard {
    /// Append a song and wake the consumer
    pub fn push(&self, song: Song) -> Result<(), QueueError> {
        self.queue.push(song)
    }
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        self.queue.shared.producer.store(false, Ordering::Release);
    }
}

/// Exclusive right to dequeue. Released on drop.
pub struct ConsumerGuard {
    queue: SongQueue,
}

impl ConsumerGuard {
    /// Remove the head and wake the producer
    pub fn pop(&self) -> Result<Song, QueueError> {
        self.queue.pop()
    }
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.queue.shared.consumer.store(false, Ordering::Release);
    }
}
