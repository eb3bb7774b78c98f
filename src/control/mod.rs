// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Control surface and user interactions.
//!
//! This module provides:
//! - The actions a listener can take on the song being played
//! - The `InteractionSource` capability that shows menus and yields choices
//! - A channel-backed source for chat front-ends and a terminal source

pub mod channel;
pub mod keyboard;
pub mod terminal;

pub use channel::{ChannelInteractions, InteractionFeed, SurfaceEvent};
pub use keyboard::{KeyBinding, KeyboardController, Shortcut};
pub use terminal::TerminalInteractions;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::song::{Instrument, Song};

/// Identity of a listener
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Action a listener can take from a menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Rate the current song (1-5)
    Rate(u8),
    /// Abandon the song and play one not yet rated
    Pick,
    /// Play the song again from the start
    Replay,
    /// Pause and park the song
    Stop,
    /// Stop and leave the output session
    Quit,
    /// Generate a fresh song
    Skip,
    /// Ask for the instrument menu
    Rerender,
    /// Instrument chosen from the instrument menu
    Instrument(Instrument),
}

impl Action {
    /// Whether this action belongs on the song control menu
    pub fn is_control(&self) -> bool {
        !matches!(self, Action::Instrument(_))
    }

    /// Short label for menus and logs
    pub fn label(&self) -> String {
        match self {
            Action::Rate(v) => v.to_string(),
            Action::Pick => "Pick".to_string(),
            Action::Replay => "Replay".to_string(),
            Action::Stop => "Stop".to_string(),
            Action::Quit => "Quit".to_string(),
            Action::Skip => "Skip".to_string(),
            Action::Rerender => "Re-render".to_string(),
            Action::Instrument(i) => i.name(),
        }
    }
}

/// Handle of one presented menu.
///
/// Presses are delivered per token, so concurrent sessions never see each
/// other's input and presses on a cleared menu go nowhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MenuToken(u64);

impl MenuToken {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MenuToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "menu#{}", self.0)
    }
}

/// One user's choice on a presented menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    /// Menu the press was made on
    pub token: MenuToken,
    /// Who pressed
    pub user: UserId,
    /// What they chose
    pub action: Action,
}

impl Interaction {
    /// Create an interaction
    pub fn new(token: MenuToken, user: UserId, action: Action) -> Self {
        Self { token, user, action }
    }
}

/// A menu shown on the control surface
#[derive(Debug, Clone, PartialEq)]
pub enum Menu {
    /// "Now playing" controls for a song
    Controls {
        /// Song being controlled
        song: Song,
        /// Whether rating buttons are live
        votable: bool,
    },
    /// Instrument selection for re-rendering a song
    Instruments {
        /// Song to re-render
        song: Song,
        /// Instruments on offer
        choices: Vec<Instrument>,
    },
}

impl Menu {
    /// Song the menu is about
    pub fn song(&self) -> &Song {
        match self {
            Menu::Controls { song, .. } | Menu::Instruments { song, .. } => song,
        }
    }

    /// Whether `action` can be chosen from this menu
    pub fn offers(&self, action: &Action) -> bool {
        match (self, action) {
            (Menu::Controls { .. }, a) => a.is_control(),
            (Menu::Instruments { choices, .. }, Action::Instrument(i)) => choices.contains(i),
            (Menu::Instruments { .. }, _) => false,
        }
    }
}

/// Presents menus to listeners and yields their choices.
///
/// Implementations must not filter by identity; authorization is the
/// session's job. They must route every press to the menu it was made on.
#[async_trait]
pub trait InteractionSource: Send + Sync {
    /// Show a menu addressed to `owner` and return its token
    async fn present(&self, owner: &UserId, menu: &Menu) -> MenuToken;

    /// Next choice from anyone on the menu `token`, `None` once the menu
    /// is cleared or the source is closed
    async fn next_interaction(&self, token: MenuToken) -> Option<Interaction>;

    /// Remove the owner's menu; later presses on it are dropped
    async fn clear(&self, owner: &UserId, token: MenuToken);

    /// Visible message in the session
    async fn message(&self, owner: &UserId, text: &str);

    /// Message only `user` can see
    async fn ephemeral(&self, user: &UserId, text: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> Song {
        Song::new("lofi", "abcd12", Instrument::PIANO, "a.mid", "a.mp3")
    }

    #[test]
    fn test_control_menu_offers() {
        let menu = Menu::Controls { song: song(), votable: true };
        assert!(menu.offers(&Action::Rate(3)));
        assert!(menu.offers(&Action::Quit));
        assert!(!menu.offers(&Action::Instrument(Instrument::PIANO)));
    }

    #[test]
    fn test_instrument_menu_offers() {
        let violin = Instrument::new(40).unwrap();
        let menu = Menu::Instruments { song: song(), choices: vec![violin] };
        assert!(menu.offers(&Action::Instrument(violin)));
        assert!(!menu.offers(&Action::Instrument(Instrument::PIANO)));
        assert!(!menu.offers(&Action::Skip));
        assert_eq!(menu.song().id.as_str(), "abcd12_0");
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(Action::Rate(4).label(), "4");
        assert_eq!(Action::Rerender.label(), "Re-render");
        assert_eq!(Action::Instrument(Instrument::new(40).unwrap()).label(), "Violin");
    }
}
