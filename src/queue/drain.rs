// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Background loop playing queued songs in order.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{LoopError, QueueError, SongQueue};
use crate::artifacts::ArtifactStore;
use crate::audio::PlaybackSink;
use crate::control::{InteractionSource, UserId};
use crate::session::SessionContext;

/// Consumes the queue into the playback sink, one song at a time.
///
/// Artifacts are deleted a fixed settle delay after playback starts, not
/// when playback ends.
pub struct DrainLoop {
    ctx: Arc<SessionContext>,
    queue: SongQueue,
    audience: UserId,
    token: CancellationToken,
}

impl DrainLoop {
    /// `audience` receives the "Now playing" messages
    pub fn new(ctx: Arc<SessionContext>, queue: SongQueue, audience: UserId, token: CancellationToken) -> Self {
        Self {
            ctx,
            queue,
            audience,
            token,
        }
    }

    /// Run until the token is cancelled or the sink fails.
    /// Returns the number of songs started.
    pub async fn run(self) -> Result<u64, LoopError> {
        let consumer = self.queue.attach_consumer()?;
        let token = &self.token;
        let sink = &self.ctx.sink;
        let mut played = 0u64;
        info!("Drain loop started");

        while !token.is_cancelled() {
            if self.queue.is_empty() {
                tokio::select! {
                    _ = self.queue.wait_for_item() => {}
                    _ = token.cancelled() => break,
                }
                continue;
            }
            if sink.is_playing() || sink.is_paused() {
                tokio::select! {
                    _ = sink.wait_idle(self.ctx.timings.idle_poll) => {}
                    _ = token.cancelled() => break,
                }
                continue;
            }

            let song = match consumer.pop() {
                Ok(song) => song,
                Err(QueueError::Empty) => continue,
                Err(e) => return Err(e.into()),
            };
            if !self.ctx.artifacts.exists(&song.model, &song.id) {
                debug!(song = %song.id, "Queued song vanished, skipping");
                continue;
            }

            self.ctx
                .interactions
                .message(&self.audience, &format!("Now playing: {}", song.id))
                .await;
            // A stop may have landed while the message was in flight.
            if token.is_cancelled() {
                debug!(song = %song.id, "Stopped before playback started");
                break;
            }
            if let Err(e) = sink.start(&song.audio).await {
                error!(song = %song.id, "Drain loop aborted: {}", e);
                return Err(e.into());
            }
            played += 1;

            tokio::time::sleep(self.ctx.timings.settle_delay).await;
            if let Err(e) = self.ctx.artifacts.delete(&song.model, &song.id) {
                warn!(song = %song.id, "Failed to delete played song: {}", e);
            }
        }

        info!(played, "Drain loop stopped");
        Ok(played)
    }
}
