// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Session state machine.
//!
//! `transition` is pure: it maps a state and an event to the next state and
//! the effects the driver must carry out. All I/O lives in the controller.

use crate::control::{Action, Interaction, Menu, UserId};
use crate::song::{catalog, Instrument, Song};
use crate::stats::{MAX_VOTE, MIN_VOTE};

/// Warning shown to anyone pressing another user's menu
pub const NOT_OWNER: &str = "You're not the votable user.";
/// Shown when the owner tries to rate twice
pub const ALREADY_RATED: &str = "You already rated this song.";
/// Shown when a pick finds nothing
pub const NOTHING_TO_RATE: &str = "Nothing left to rate.";

/// The song being played plus the flags in force for it
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub song: Song,
    pub owner: UserId,
    /// Start playback when the menu is presented
    pub play_music: bool,
    /// Whether a rating is still accepted
    pub votable: bool,
}

impl Cue {
    /// Fresh cue: play it and accept a rating
    pub fn new(song: Song, owner: UserId) -> Self {
        Self {
            song,
            owner,
            play_music: true,
            votable: true,
        }
    }

    fn fresh(&self, song: Song) -> Self {
        Self::new(song, self.owner.clone())
    }

    fn with_music(self, play_music: bool) -> Self {
        Self { play_music, ..self }
    }

    fn rated(self) -> Self {
        Self {
            play_music: false,
            votable: false,
            ..self
        }
    }

    fn controls(&self) -> Menu {
        Menu::Controls {
            song: self.song.clone(),
            votable: self.votable,
        }
    }

    fn instruments(&self) -> Menu {
        Menu::Instruments {
            song: self.song.clone(),
            choices: catalog(),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// No answer before the deadline, or the source closed
    TimedOut,
    /// Owner quit
    Quit,
    /// Pick found no unrated song
    NothingToRate,
    /// Skip could not generate a new song
    GenerationFailed,
    /// Re-render failed
    RenderFailed,
    /// Output session went away
    SinkUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Menu about to be presented
    Announcing(Cue),
    /// Waiting for the owner on the control menu
    AwaitingInteraction(Cue),
    /// Waiting for the owner on the instrument menu
    ChoosingInstrument(Cue),
    /// Producing the song with another instrument
    Rerendering(Cue, Instrument),
    /// Looking for an unrated song
    Picking(Cue),
    /// Generating a fresh song
    Generating(Cue),
    Finished(Ending),
}

impl SessionState {
    /// Whether the state waits on the owner
    pub fn awaits_owner(&self) -> bool {
        matches!(
            self,
            SessionState::AwaitingInteraction(_) | SessionState::ChoosingInstrument(_)
        )
    }

    pub fn cue(&self) -> Option<&Cue> {
        match self {
            SessionState::Announcing(cue)
            | SessionState::AwaitingInteraction(cue)
            | SessionState::ChoosingInstrument(cue)
            | SessionState::Rerendering(cue, _)
            | SessionState::Picking(cue)
            | SessionState::Generating(cue) => Some(cue),
            SessionState::Finished(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The driver is ready to announce the cue
    Announce,
    Interaction(Interaction),
    /// Deadline passed or the source closed
    TimedOut,
    Rendered(Song),
    RenderFailed(String),
    Picked(Option<Song>),
    Generated(Song),
    GenerationFailed(String),
    /// A playback effect found no output session
    SinkUnavailable,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Present(Menu),
    /// Stop whatever plays and start this song
    Play(Song),
    Pause,
    Stop,
    Disconnect,
    ClearControls,
    Message(String),
    Ephemeral(UserId, String),
    RecordVote { song: Song, user: UserId, vote: u8 },
}

/// Next state and effects for `event` in `state`
pub fn transition(state: SessionState, event: SessionEvent) -> (SessionState, Vec<Effect>) {
    use SessionEvent as Ev;
    use SessionState as St;

    match (state, event) {
        (St::Finished(ending), _) => (St::Finished(ending), Vec::new()),

        (_, Ev::SinkUnavailable) => (St::Finished(Ending::SinkUnavailable), vec![Effect::ClearControls]),

        (St::Announcing(cue), Ev::Announce) => {
            let mut effects = vec![Effect::Present(cue.controls())];
            if cue.play_music {
                effects.push(Effect::Play(cue.song.clone()));
            }
            (St::AwaitingInteraction(cue), effects)
        }

        (St::AwaitingInteraction(_) | St::ChoosingInstrument(_), Ev::TimedOut) => {
            (St::Finished(Ending::TimedOut), vec![Effect::ClearControls])
        }

        (St::AwaitingInteraction(cue), Ev::Interaction(interaction)) => on_control(cue, interaction),

        (St::ChoosingInstrument(cue), Ev::Interaction(interaction)) => on_instrument(cue, interaction),

        (St::Rerendering(cue, _), Ev::Rendered(song)) | (St::Generating(cue), Ev::Generated(song)) => {
            (St::Announcing(cue.fresh(song)), Vec::new())
        }
        (St::Rerendering(_, _), Ev::RenderFailed(reason)) => {
            (St::Finished(Ending::RenderFailed), vec![Effect::Message(reason)])
        }
        (St::Generating(_), Ev::GenerationFailed(reason)) => {
            (St::Finished(Ending::GenerationFailed), vec![Effect::Message(reason)])
        }

        (St::Picking(cue), Ev::Picked(Some(song))) => (St::Announcing(cue.fresh(song)), Vec::new()),
        (St::Picking(_), Ev::Picked(None)) => (
            St::Finished(Ending::NothingToRate),
            vec![Effect::Message(NOTHING_TO_RATE.to_string())],
        ),

        // Events that do not belong to the state change nothing.
        (state, _) => (state, Vec::new()),
    }
}

fn reject_stranger(state: SessionState, interaction: &Interaction) -> (SessionState, Vec<Effect>) {
    (
        state,
        vec![Effect::Ephemeral(interaction.user.clone(), NOT_OWNER.to_string())],
    )
}

fn quit() -> (SessionState, Vec<Effect>) {
    (
        SessionState::Finished(Ending::Quit),
        vec![Effect::Stop, Effect::Disconnect, Effect::ClearControls],
    )
}

fn on_control(cue: Cue, interaction: Interaction) -> (SessionState, Vec<Effect>) {
    if interaction.user != cue.owner {
        return reject_stranger(SessionState::AwaitingInteraction(cue), &interaction);
    }
    if !cue.controls().offers(&interaction.action) {
        return (SessionState::AwaitingInteraction(cue), Vec::new());
    }

    match interaction.action {
        Action::Rate(vote) if !(MIN_VOTE..=MAX_VOTE).contains(&vote) => {
            (SessionState::AwaitingInteraction(cue), Vec::new())
        }
        Action::Rate(_) if !cue.votable => {
            let effects = vec![Effect::Ephemeral(cue.owner.clone(), ALREADY_RATED.to_string())];
            (SessionState::AwaitingInteraction(cue), effects)
        }
        Action::Rate(vote) => {
            let effects = vec![
                Effect::RecordVote {
                    song: cue.song.clone(),
                    user: cue.owner.clone(),
                    vote,
                },
                Effect::Ephemeral(cue.owner.clone(), format!("You rated {} a {}.", cue.song.id, vote)),
                Effect::ClearControls,
            ];
            (SessionState::Announcing(cue.rated()), effects)
        }
        Action::Pick => (SessionState::Picking(cue), vec![Effect::ClearControls]),
        Action::Replay => (
            SessionState::Announcing(cue.with_music(true)),
            vec![Effect::ClearControls],
        ),
        Action::Stop => (
            SessionState::Announcing(cue.with_music(false)),
            vec![Effect::Pause, Effect::ClearControls],
        ),
        Action::Quit => quit(),
        Action::Skip => (
            SessionState::Generating(cue),
            vec![Effect::ClearControls, Effect::Message("Generating...".to_string())],
        ),
        Action::Rerender => {
            let menu = cue.instruments();
            (
                SessionState::ChoosingInstrument(cue),
                vec![Effect::ClearControls, Effect::Present(menu)],
            )
        }
        // Not on the control menu
        Action::Instrument(_) => (SessionState::AwaitingInteraction(cue), Vec::new()),
    }
}

fn on_instrument(cue: Cue, interaction: Interaction) -> (SessionState, Vec<Effect>) {
    if interaction.user != cue.owner {
        return reject_stranger(SessionState::ChoosingInstrument(cue), &interaction);
    }

    match interaction.action {
        // Ctrl+C on the instrument menu
        Action::Quit => quit(),
        Action::Instrument(instrument) if cue.instruments().offers(&interaction.action) => {
            let effects = vec![
                Effect::ClearControls,
                Effect::Message(format!("Rendering {} with {}...", cue.song.code, instrument.name())),
            ];
            (SessionState::Rerendering(cue, instrument), effects)
        }
        _ => (SessionState::ChoosingInstrument(cue), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MenuToken;

    fn owner() -> UserId {
        UserId::new("alice")
    }

    fn song(code: &str, program: u8) -> Song {
        let instrument = Instrument::new(program).unwrap();
        Song::new("lofi", code, instrument, format!("{}.mid", code), format!("{}_{}.mp3", code, program))
    }

    fn awaiting() -> SessionState {
        SessionState::AwaitingInteraction(Cue::new(song("abcd12", 0), owner()))
    }

    fn press(action: Action) -> SessionEvent {
        SessionEvent::Interaction(Interaction::new(MenuToken::new(1), owner(), action))
    }

    #[test]
    fn test_announce_presents_and_plays() {
        let cue = Cue::new(song("abcd12", 0), owner());
        let (next, effects) = transition(SessionState::Announcing(cue.clone()), SessionEvent::Announce);

        assert_eq!(next, SessionState::AwaitingInteraction(cue.clone()));
        assert_eq!(
            effects,
            vec![
                Effect::Present(Menu::Controls { song: cue.song.clone(), votable: true }),
                Effect::Play(cue.song.clone()),
            ]
        );
    }

    #[test]
    fn test_parked_announce_does_not_play() {
        let cue = Cue::new(song("abcd12", 0), owner()).with_music(false);
        let (_, effects) = transition(SessionState::Announcing(cue), SessionEvent::Announce);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::Present(_)));
    }

    #[test]
    fn test_rate_records_once() {
        let (next, effects) = transition(awaiting(), press(Action::Rate(4)));

        let SessionState::Announcing(cue) = next.clone() else {
            panic!("expected Announcing, got {:?}", next);
        };
        assert!(!cue.votable);
        assert!(!cue.play_music);
        assert!(matches!(effects[0], Effect::RecordVote { vote: 4, .. }));
        assert_eq!(effects.last(), Some(&Effect::ClearControls));

        // Re-announced menu rejects a second vote
        let (next, _) = transition(next, SessionEvent::Announce);
        let (after, effects) = transition(next.clone(), press(Action::Rate(5)));
        assert_eq!(after, next);
        assert_eq!(effects, vec![Effect::Ephemeral(owner(), ALREADY_RATED.to_string())]);
    }

    #[test]
    fn test_stranger_is_warned() {
        let state = awaiting();
        let bob = UserId::new("bob");
        let event = SessionEvent::Interaction(Interaction::new(MenuToken::new(1), bob.clone(), Action::Quit));
        let (next, effects) = transition(state.clone(), event);

        assert_eq!(next, state);
        assert_eq!(effects, vec![Effect::Ephemeral(bob, NOT_OWNER.to_string())]);
    }

    #[test]
    fn test_timeout_ends_session() {
        let (next, effects) = transition(awaiting(), SessionEvent::TimedOut);
        assert_eq!(next, SessionState::Finished(Ending::TimedOut));
        assert_eq!(effects, vec![Effect::ClearControls]);
    }

    #[test]
    fn test_replay_preserves_votable() {
        let cue = Cue::new(song("abcd12", 0), owner()).rated();
        let (next, _) = transition(SessionState::AwaitingInteraction(cue), press(Action::Replay));
        let SessionState::Announcing(cue) = next else {
            panic!("expected Announcing");
        };
        assert!(cue.play_music);
        assert!(!cue.votable);
    }

    #[test]
    fn test_stop_parks_song() {
        let (next, effects) = transition(awaiting(), press(Action::Stop));
        assert!(matches!(next, SessionState::Announcing(Cue { play_music: false, votable: true, .. })));
        assert_eq!(effects, vec![Effect::Pause, Effect::ClearControls]);
    }

    #[test]
    fn test_quit_disconnects() {
        let (next, effects) = transition(awaiting(), press(Action::Quit));
        assert_eq!(next, SessionState::Finished(Ending::Quit));
        assert_eq!(effects, vec![Effect::Stop, Effect::Disconnect, Effect::ClearControls]);
    }

    #[test]
    fn test_rerender_flow() {
        let (choosing, effects) = transition(awaiting(), press(Action::Rerender));
        assert!(matches!(choosing, SessionState::ChoosingInstrument(_)));
        assert!(matches!(effects[1], Effect::Present(Menu::Instruments { .. })));

        // Control actions are not on this menu
        let (same, effects) = transition(choosing.clone(), press(Action::Skip));
        assert_eq!(same, choosing);
        assert!(effects.is_empty());

        let violin = Instrument::new(40).unwrap();
        let (rendering, _) = transition(choosing, press(Action::Instrument(violin)));
        assert!(matches!(rendering, SessionState::Rerendering(_, i) if i == violin));

        let (next, _) = transition(rendering, SessionEvent::Rendered(song("abcd12", 40)));
        let SessionState::Announcing(cue) = next else {
            panic!("expected Announcing");
        };
        assert_eq!(cue.song.id.as_str(), "abcd12_40");
        assert!(cue.play_music && cue.votable);
    }

    #[test]
    fn test_render_failure_ends_session() {
        let state = SessionState::Rerendering(Cue::new(song("abcd12", 0), owner()), Instrument::PIANO);
        let (next, effects) = transition(state, SessionEvent::RenderFailed("boom".into()));
        assert_eq!(next, SessionState::Finished(Ending::RenderFailed));
        assert_eq!(effects, vec![Effect::Message("boom".into())]);
    }

    #[test]
    fn test_pick_outcomes() {
        let (picking, effects) = transition(awaiting(), press(Action::Pick));
        assert!(matches!(picking, SessionState::Picking(_)));
        assert_eq!(effects, vec![Effect::ClearControls]);

        let (next, _) = transition(picking.clone(), SessionEvent::Picked(Some(song("ffff00", 0))));
        assert!(matches!(next, SessionState::Announcing(ref cue) if cue.song.code == "ffff00"));

        let (next, effects) = transition(picking, SessionEvent::Picked(None));
        assert_eq!(next, SessionState::Finished(Ending::NothingToRate));
        assert_eq!(effects, vec![Effect::Message(NOTHING_TO_RATE.to_string())]);
    }

    #[test]
    fn test_skip_generates() {
        let (generating, _) = transition(awaiting(), press(Action::Skip));
        assert!(matches!(generating, SessionState::Generating(_)));

        let (next, effects) = transition(generating, SessionEvent::GenerationFailed("no model".into()));
        assert_eq!(next, SessionState::Finished(Ending::GenerationFailed));
        assert_eq!(effects, vec![Effect::Message("no model".into())]);
    }

    #[test]
    fn test_instrument_on_control_menu_is_ignored() {
        let state = awaiting();
        let (next, effects) = transition(state.clone(), press(Action::Instrument(Instrument::PIANO)));
        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_sink_unavailable_ends_any_state() {
        let (next, effects) = transition(awaiting(), SessionEvent::SinkUnavailable);
        assert_eq!(next, SessionState::Finished(Ending::SinkUnavailable));
        assert_eq!(effects, vec![Effect::ClearControls]);
    }

    #[test]
    fn test_quit_from_instrument_menu() {
        let (choosing, _) = transition(awaiting(), press(Action::Rerender));
        let (next, effects) = transition(choosing, press(Action::Quit));
        assert_eq!(next, SessionState::Finished(Ending::Quit));
        assert_eq!(effects, vec![Effect::Stop, Effect::Disconnect, Effect::ClearControls]);
    }

    #[test]
    fn test_instrument_outside_catalog_is_ignored() {
        let (choosing, _) = transition(awaiting(), press(Action::Rerender));
        let harp = Instrument::new(46).unwrap();
        assert!(!catalog().contains(&harp));
        let (next, effects) = transition(choosing.clone(), press(Action::Instrument(harp)));
        assert_eq!(next, choosing);
        assert!(effects.is_empty());
    }
}
