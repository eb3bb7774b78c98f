// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Session driver: waits for events, runs the state machine and carries
//! out its effects.

use std::mem::{discriminant, Discriminant};
use std::sync::Arc;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::machine::{transition, Cue, Effect, Ending, SessionEvent, SessionState};
use super::SessionContext;
use crate::artifacts::ArtifactStore;
use crate::audio::{replace_source, PlaybackSink, SinkError};
use crate::control::{InteractionSource, MenuToken, UserId};
use crate::generators::Renderer;
use crate::stats::StatsStore;
use crate::song::{Instrument, Song};

/// Drives one playback session for one owner until it ends
pub struct SessionController {
    ctx: Arc<SessionContext>,
    owner: UserId,
}

impl SessionController {
    pub fn new(ctx: Arc<SessionContext>, owner: UserId) -> Self {
        Self { ctx, owner }
    }

    /// Play `song` with fresh flags and run the session to its end
    pub async fn play(&self, song: Song) -> Ending {
        self.run(Cue::new(song, self.owner.clone())).await
    }

    /// Run the session starting from `cue`
    pub async fn run(&self, cue: Cue) -> Ending {
        info!(owner = %self.owner, song = %cue.song.id, "Session started");
        let mut state = SessionState::Announcing(cue);
        let mut deadline: Option<(Discriminant<SessionState>, Instant)> = None;
        let mut menu: Option<MenuToken> = None;

        loop {
            if let SessionState::Finished(ending) = state {
                if let Some(token) = menu.take() {
                    self.ctx.interactions.clear(&self.owner, token).await;
                }
                info!(owner = %self.owner, ?ending, "Session ended");
                return ending;
            }

            // The deadline survives rejected interactions but not a change of menu.
            if state.awaits_owner() {
                let kind = discriminant(&state);
                if deadline.map(|(armed, _)| armed != kind).unwrap_or(true) {
                    let at = Instant::now() + self.ctx.timings.interaction_timeout;
                    deadline = Some((kind, at));
                }
            } else {
                deadline = None;
            }

            let event = self.next_event(&state, menu, deadline.map(|(_, at)| at)).await;
            debug!(?event, "Session event");
            let (next, effects) = transition(state, event);
            state = next;

            for effect in effects {
                match self.execute(effect, &mut menu).await {
                    Ok(()) => {}
                    Err(SinkError::Unavailable) => {
                        warn!(owner = %self.owner, "Output session gone, ending session");
                        let (next, effects) = transition(state, SessionEvent::SinkUnavailable);
                        state = next;
                        for effect in effects {
                            // Only surface effects remain here.
                            let _ = self.execute(effect, &mut menu).await;
                        }
                        break;
                    }
                    Err(e) => warn!(owner = %self.owner, "Playback control failed: {}", e),
                }
            }
        }
    }

    async fn next_event(&self, state: &SessionState, menu: Option<MenuToken>, deadline: Option<Instant>) -> SessionEvent {
        match state {
            SessionState::Announcing(_) => SessionEvent::Announce,
            SessionState::AwaitingInteraction(_) | SessionState::ChoosingInstrument(_) => {
                let Some(token) = menu else {
                    warn!(owner = %self.owner, "Waiting without a menu, closing session");
                    return SessionEvent::TimedOut;
                };
                let next = self.ctx.interactions.next_interaction(token);
                let received = match deadline {
                    Some(at) => timeout_at(at, next).await.ok().flatten(),
                    None => next.await,
                };
                match received {
                    Some(interaction) => {
                        debug!(%token, user = %interaction.user, action = %interaction.action.label(), "Pressed");
                        SessionEvent::Interaction(interaction)
                    }
                    None => {
                        info!(owner = %self.owner, "No answer, closing controls");
                        SessionEvent::TimedOut
                    }
                }
            }
            SessionState::Rerendering(cue, instrument) => self.rerender(cue, *instrument).await,
            SessionState::Picking(cue) => {
                let song = self
                    .ctx
                    .pick_unrated(&cue.song.model, &self.owner, Some(&cue.song.id));
                SessionEvent::Picked(song)
            }
            SessionState::Generating(_) => match self.ctx.generate_current().await {
                Ok(song) => SessionEvent::Generated(song),
                Err(e) => {
                    warn!(owner = %self.owner, "Generation failed: {}", e);
                    SessionEvent::GenerationFailed(format!("Generation failed: {}", e))
                }
            },
            // Finished is handled before waiting
            SessionState::Finished(_) => SessionEvent::TimedOut,
        }
    }

    async fn rerender(&self, cue: &Cue, instrument: Instrument) -> SessionEvent {
        let source = &cue.song;
        let Some(derived) = source.id.with_instrument(instrument) else {
            return SessionEvent::RenderFailed(format!("Cannot re-render {}", source.id));
        };
        if let Some(existing) = self.ctx.artifacts.resolve(&source.model, &derived) {
            debug!(song = %derived, "Reusing existing rendering");
            return SessionEvent::Rendered(existing);
        }
        match self.ctx.renderer.render(source, instrument).await {
            Ok(song) => {
                info!(song = %song.id, "Rendered song");
                SessionEvent::Rendered(song)
            }
            Err(e) => {
                warn!(song = %derived, "Rendering failed: {}", e);
                SessionEvent::RenderFailed(format!("Rendering {} failed: {}", derived, e))
            }
        }
    }

    async fn execute(&self, effect: Effect, menu: &mut Option<MenuToken>) -> Result<(), SinkError> {
        let ui = &self.ctx.interactions;
        let sink = &self.ctx.sink;
        match effect {
            Effect::Present(next) => {
                if let Some(stale) = menu.take() {
                    ui.clear(&self.owner, stale).await;
                }
                *menu = Some(ui.present(&self.owner, &next).await);
            }
            Effect::Play(song) => {
                debug!(song = %song.id, "Playing");
                replace_source(&**sink, &song.audio).await?;
            }
            Effect::Pause => sink.pause().await?,
            Effect::Stop => sink.stop().await?,
            Effect::Disconnect => sink.disconnect().await?,
            Effect::ClearControls => {
                if let Some(token) = menu.take() {
                    ui.clear(&self.owner, token).await;
                }
            }
            Effect::Message(text) => ui.message(&self.owner, &text).await,
            Effect::Ephemeral(user, text) => ui.ephemeral(&user, &text).await,
            Effect::RecordVote { song, user, vote } => {
                if let Err(e) = self.ctx.stats.record(&song.model, &song.id, user.as_str(), vote) {
                    warn!(song = %song.id, "Failed to record vote: {}", e);
                    ui.ephemeral(&user, "Your rating could not be saved.").await;
                }
            }
        }
        Ok(())
    }
}
