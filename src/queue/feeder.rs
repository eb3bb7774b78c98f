// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Background loop keeping the generation queue filled.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{QueueError, SongQueue};
use crate::session::SessionContext;

/// Generates songs until the queue reaches its watermark, then waits for
/// the drain loop to make room.
pub struct QueueFeeder {
    ctx: Arc<SessionContext>,
    queue: SongQueue,
    token: CancellationToken,
}

impl QueueFeeder {
    pub fn new(ctx: Arc<SessionContext>, queue: SongQueue, token: CancellationToken) -> Self {
        Self { ctx, queue, token }
    }

    /// Run until the token is cancelled. Returns the number of songs queued.
    pub async fn run(self) -> Result<u64, QueueError> {
        let producer = self.queue.attach_producer()?;
        let token = &self.token;
        let mut queued = 0u64;
        info!(watermark = self.queue.watermark(), "Queue feeder started");

        while !token.is_cancelled() {
            if self.queue.is_full() {
                debug!(len = self.queue.len(), "Queue full, waiting for space");
                tokio::select! {
                    _ = self.queue.wait_for_space() => {}
                    _ = token.cancelled() => break,
                }
                continue;
            }

            match self.ctx.generate_current().await {
                Ok(song) => {
                    let id = song.id.clone();
                    // A finished song is kept even if a stop arrived meanwhile.
                    match producer.push(song) {
                        Ok(()) => {
                            queued += 1;
                            debug!(song = %id, len = self.queue.len(), "Queued song");
                        }
                        Err(e) => warn!(song = %id, "Dropping generated song: {}", e),
                    }
                }
                Err(e) => {
                    warn!("Generation failed, retrying: {}", e);
                    tokio::select! {
                        _ = tokio::time::sleep(self.ctx.timings.idle_poll) => {}
                        _ = token.cancelled() => break,
                    }
                }
            }
        }

        info!(queued, "Queue feeder stopped");
        Ok(queued)
    }
}
