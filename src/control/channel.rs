// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Channel-backed interaction source.
//!
//! A chat gateway (or a test) pushes button presses into an `InteractionFeed`
//! and renders the `SurfaceEvent`s coming out the other side. Every presented
//! menu gets its own mailbox, keyed by its `MenuToken`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{Action, Interaction, InteractionSource, Menu, MenuToken, UserId};

/// Something the session wants shown to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// A menu was posted for `owner`
    Presented { owner: UserId, token: MenuToken, menu: Menu },
    /// The owner's menu was removed
    Cleared { owner: UserId, token: MenuToken },
    /// Visible message
    Message { owner: UserId, text: String },
    /// Message only `user` sees
    Ephemeral { user: UserId, text: String },
}

struct Mailbox {
    tx: mpsc::UnboundedSender<Interaction>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Interaction>>>,
}

#[derive(Default)]
struct Mailboxes {
    next: AtomicU64,
    open: Mutex<HashMap<MenuToken, Mailbox>>,
}

impl Mailboxes {
    fn open(&self) -> MutexGuard<'_, HashMap<MenuToken, Mailbox>> {
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create(&self) -> MenuToken {
        let token = MenuToken::new(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        let mailbox = Mailbox {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        };
        self.open().insert(token, mailbox);
        token
    }

    fn deliver(&self, interaction: Interaction) -> bool {
        match self.open().get(&interaction.token) {
            Some(mailbox) => mailbox.tx.send(interaction).is_ok(),
            None => {
                debug!(token = %interaction.token, user = %interaction.user, "Press on a closed menu dropped");
                false
            }
        }
    }
}

/// Sending half used by the front-end to deliver button presses
#[derive(Clone)]
pub struct InteractionFeed {
    boxes: Arc<Mailboxes>,
}

impl InteractionFeed {
    /// Deliver a press on the menu `token`. Returns false when that menu
    /// was already cleared or never existed.
    pub fn press(&self, token: MenuToken, user: &UserId, action: Action) -> bool {
        self.boxes
            .deliver(Interaction::new(token, user.clone(), action))
    }

    /// Tokens of the menus still accepting presses
    pub fn open_menus(&self) -> Vec<MenuToken> {
        let mut tokens: Vec<MenuToken> = self.boxes.open().keys().copied().collect();
        tokens.sort();
        tokens
    }
}

/// Interaction source fed through channels
pub struct ChannelInteractions {
    boxes: Arc<Mailboxes>,
    surface: mpsc::UnboundedSender<SurfaceEvent>,
}

impl ChannelInteractions {
    /// Create a source, its feed and its surface event stream
    pub fn new() -> (Self, InteractionFeed, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let boxes = Arc::new(Mailboxes::default());
        let (surface_tx, surface_rx) = mpsc::unbounded_channel();
        let source = Self {
            boxes: Arc::clone(&boxes),
            surface: surface_tx,
        };
        (source, InteractionFeed { boxes }, surface_rx)
    }

    fn emit(&self, event: SurfaceEvent) {
        trace!(?event, "Surface event");
        // Nobody rendering the surface is fine.
        let _ = self.surface.send(event);
    }
}

#[async_trait]
impl InteractionSource for ChannelInteractions {
    async fn present(&self, owner: &UserId, menu: &Menu) -> MenuToken {
        let token = self.boxes.create();
        self.emit(SurfaceEvent::Presented {
            owner: owner.clone(),
            token,
            menu: menu.clone(),
        });
        token
    }

    async fn next_interaction(&self, token: MenuToken) -> Option<Interaction> {
        let rx = self.boxes.open().get(&token).map(|mailbox| Arc::clone(&mailbox.rx))?;
        let mut rx = rx.lock().await;
        rx.recv().await
    }

    async fn clear(&self, owner: &UserId, token: MenuToken) {
        // Dropping the sender wakes a pending next_interaction with None.
        self.boxes.open().remove(&token);
        self.emit(SurfaceEvent::Cleared {
            owner: owner.clone(),
            token,
        });
    }

    async fn message(&self, owner: &UserId, text: &str) {
        self.emit(SurfaceEvent::Message {
            owner: owner.clone(),
            text: text.to_string(),
        });
    }

    async fn ephemeral(&self, user: &UserId, text: &str) {
        self.emit(SurfaceEvent::Ephemeral {
            user: user.clone(),
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::{Instrument, Song};

    fn menu() -> Menu {
        Menu::Controls {
            song: Song::new("lofi", "abcd12", Instrument::PIANO, "a.mid", "a.mp3"),
            votable: true,
        }
    }

    #[tokio::test]
    async fn test_feed_delivers_in_order() {
        let (source, feed, _surface) = ChannelInteractions::new();
        let alice = UserId::new("alice");
        let token = source.present(&alice, &menu()).await;
        assert!(feed.press(token, &alice, Action::Rate(5)));
        assert!(feed.press(token, &alice, Action::Quit));

        assert_eq!(source.next_interaction(token).await.unwrap().action, Action::Rate(5));
        assert_eq!(source.next_interaction(token).await.unwrap().action, Action::Quit);
    }

    #[tokio::test]
    async fn test_menus_have_separate_mailboxes() {
        let (source, feed, _surface) = ChannelInteractions::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let first = source.present(&alice, &menu()).await;
        let second = source.present(&bob, &menu()).await;
        assert_ne!(first, second);

        feed.press(second, &bob, Action::Skip);
        feed.press(first, &alice, Action::Rate(3));

        let got = source.next_interaction(first).await.unwrap();
        assert_eq!((got.user, got.action), (alice, Action::Rate(3)));
        let got = source.next_interaction(second).await.unwrap();
        assert_eq!((got.user, got.action), (bob, Action::Skip));
    }

    #[tokio::test]
    async fn test_cleared_menu_drops_presses() {
        let (source, feed, _surface) = ChannelInteractions::new();
        let alice = UserId::new("alice");
        let token = source.present(&alice, &menu()).await;
        assert_eq!(feed.open_menus(), vec![token]);

        source.clear(&alice, token).await;
        assert!(!feed.press(token, &alice, Action::Skip));
        assert!(feed.open_menus().is_empty());
        assert!(source.next_interaction(token).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_wakes_waiter() {
        let (source, _feed, _surface) = ChannelInteractions::new();
        let source = Arc::new(source);
        let alice = UserId::new("alice");
        let token = source.present(&alice, &menu()).await;

        let waiter = {
            let source = Arc::clone(&source);
            tokio::spawn(async move { source.next_interaction(token).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        source.clear(&alice, token).await;
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_surface_events() {
        let (source, _feed, mut surface) = ChannelInteractions::new();
        let alice = UserId::new("alice");
        source.message(&alice, "Generating...").await;
        let token = source.present(&alice, &menu()).await;
        source.clear(&alice, token).await;

        assert_eq!(
            surface.recv().await,
            Some(SurfaceEvent::Message { owner: alice.clone(), text: "Generating...".into() })
        );
        assert!(matches!(surface.recv().await, Some(SurfaceEvent::Presented { token: t, .. }) if t == token));
        assert_eq!(surface.recv().await, Some(SurfaceEvent::Cleared { owner: alice, token }));
    }
}
