// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Starts and stops the feeder and drain loop as a pair.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::SessionContext;
use crate::audio::PlaybackSink;
use crate::control::UserId;
use crate::queue::{DrainLoop, LoopError, QueueError, QueueFeeder, SongQueue};

struct LoopTasks {
    token: CancellationToken,
    feeder: JoinHandle<Result<u64, QueueError>>,
    drain: JoinHandle<Result<u64, LoopError>>,
}

impl LoopTasks {
    fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !(self.feeder.is_finished() && self.drain.is_finished())
    }
}

/// Owns the continuous playback loops.
///
/// Every run gets its own cancellation token. Start and stop share one
/// lock, so a start issued during the stop grace period waits for the old
/// loops to be joined.
pub struct LoopSupervisor {
    ctx: Arc<SessionContext>,
    queue: SongQueue,
    audience: UserId,
    tasks: Mutex<Option<LoopTasks>>,
}

impl LoopSupervisor {
    pub fn new(ctx: Arc<SessionContext>, queue: SongQueue, audience: UserId) -> Self {
        Self {
            ctx,
            queue,
            audience,
            tasks: Mutex::new(None),
        }
    }

    /// The queue the loops work on
    pub fn queue(&self) -> &SongQueue {
        &self.queue
    }

    /// Start both loops. Returns false if they are already running.
    pub async fn start(&self) -> bool {
        let mut tasks = self.tasks.lock().await;
        if let Some(running) = tasks.take() {
            if running.is_running() {
                *tasks = Some(running);
                return false;
            }
            // Leftovers from loops that ended on their own
            running.token.cancel();
            join(running).await;
        }

        let token = CancellationToken::new();
        let feeder = QueueFeeder::new(Arc::clone(&self.ctx), self.queue.clone(), token.clone());
        let drain = DrainLoop::new(
            Arc::clone(&self.ctx),
            self.queue.clone(),
            self.audience.clone(),
            token.clone(),
        );
        *tasks = Some(LoopTasks {
            token,
            feeder: tokio::spawn(feeder.run()),
            drain: tokio::spawn(drain.run()),
        });
        info!(watermark = self.queue.watermark(), "Continuous playback started");
        true
    }

    /// Cancel the loops, stop the sink, wait the grace period and join
    /// both loops. Returns false if nothing was running.
    pub async fn stop(&self) -> bool {
        let mut tasks = self.tasks.lock().await;
        let Some(running) = tasks.take() else {
            return false;
        };

        running.token.cancel();
        if let Err(e) = self.ctx.sink.stop().await {
            warn!("Failed to stop playback: {}", e);
        }
        tokio::time::sleep(self.ctx.timings.stop_grace).await;
        join(running).await;
        info!(queued = self.queue.len(), "Continuous playback stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        let tasks = self.tasks.lock().await;
        tasks.as_ref().map(LoopTasks::is_running).unwrap_or(false)
    }
}

async fn join(tasks: LoopTasks) {
    match tasks.feeder.await {
        Ok(Ok(queued)) => debug!(queued, "Feeder joined"),
        Ok(Err(e)) => warn!("Feeder ended with error: {}", e),
        Err(e) => error!("Feeder task failed: {}", e),
    }
    match tasks.drain.await {
        Ok(Ok(played)) => debug!(played, "Drain loop joined"),
        Ok(Err(e)) => warn!("Drain loop ended with error: {}", e),
        Err(e) => error!("Drain loop task failed: {}", e),
    }
}
