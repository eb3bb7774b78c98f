// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Terminal control surface.
//!
//! Menus are printed to stdout and keys are read in raw mode on a dedicated
//! thread, so the async runtime is never blocked on the terminal.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::{queue, terminal};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::keyboard::{format_shortcut, instrument_key, KeyboardController};
use super::{Action, Interaction, InteractionSource, Menu, MenuToken, UserId};

const KEY_POLL: Duration = Duration::from_millis(100);
const CATEGORY_ORDER: [&str; 3] = ["Rating", "Playback", "Session"];

/// Interaction source reading the local keyboard.
///
/// Every key press is attributed to the configured owner.
pub struct TerminalInteractions {
    owner: UserId,
    controller: KeyboardController,
    keys: tokio::sync::Mutex<mpsc::UnboundedReceiver<KeyEvent>>,
    next_token: AtomicU64,
    menu: Mutex<Option<(MenuToken, Menu)>>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl TerminalInteractions {
    /// Enter raw mode and start reading keys for `owner`
    pub fn new(owner: UserId) -> io::Result<Self> {
        terminal::enable_raw_mode()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let reader = thread::Builder::new()
            .name("key-reader".into())
            .spawn(move || read_keys(flag, tx))?;

        Ok(Self {
            owner,
            controller: KeyboardController::with_defaults(),
            keys: tokio::sync::Mutex::new(rx),
            next_token: AtomicU64::new(0),
            menu: Mutex::new(None),
            running,
            reader: Some(reader),
        })
    }

    fn current_menu(&self) -> Option<(MenuToken, Menu)> {
        self.menu
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_menu(&self, menu: Option<(MenuToken, Menu)>) {
        *self.menu.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = menu;
    }

    fn is_current(&self, token: MenuToken) -> bool {
        self.current_menu().map(|(current, _)| current == token).unwrap_or(false)
    }

    fn action_for(&self, key: &KeyEvent) -> Option<Action> {
        match self.current_menu() {
            Some((_, menu)) => self.controller.action_for(&menu, key.code, key.modifiers),
            None => quit_key(key).then_some(Action::Quit),
        }
    }

    /// Wait for 'q' or Ctrl+C while no menu is shown. Returns once the key
    /// reader has stopped as well.
    pub async fn quit_requested(&self) {
        let mut keys = self.keys.lock().await;
        while let Some(key) = keys.recv().await {
            if self.current_menu().is_none() && quit_key(&key) {
                return;
            }
        }
    }
}

/// Without a menu only quitting is possible
fn quit_key(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('q') || (key.code == KeyCode::Char('c') && key.modifiers == KeyModifiers::CONTROL)
}

impl Drop for TerminalInteractions {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("Failed to restore terminal: {}", e);
        }
    }
}

fn read_keys(running: Arc<AtomicBool>, tx: mpsc::UnboundedSender<KeyEvent>) {
    while running.load(Ordering::SeqCst) {
        match event::poll(KEY_POLL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if tx.send(key).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Key reader stopped: {}", e);
                    break;
                }
            },
            Ok(false) => {}
            Err(e) => {
                warn!("Key reader stopped: {}", e);
                break;
            }
        }
    }
    debug!("Key reader exited");
}

/// Text lines for a menu
pub fn menu_lines(menu: &Menu, controller: &KeyboardController) -> Vec<String> {
    let mut lines = Vec::new();
    match menu {
        Menu::Controls { song, votable } => {
            lines.push(format!("Now playing {} [{}]", song.id, song.duration_label()));
            let grouped = controller.bindings_by_category();
            for category in CATEGORY_ORDER {
                if category == "Rating" && !*votable {
                    lines.push("  Rating: already rated".to_string());
                    continue;
                }
                let Some(bindings) = grouped.get(category) else {
                    continue;
                };
                let keys: Vec<String> = bindings
                    .iter()
                    .map(|b| format!("[{}] {}", format_shortcut(&b.shortcut), b.description))
                    .collect();
                lines.push(format!("  {}: {}", category, keys.join("  ")));
            }
        }
        Menu::Instruments { song, choices } => {
            lines.push(format!("Re-render {} with:", song.id));
            for (index, instrument) in choices.iter().enumerate() {
                if let Some(key) = instrument_key(index) {
                    lines.push(format!("  [{}] {}", key, instrument.name()));
                }
            }
        }
    }
    lines
}

fn print_lines(lines: &[String], color: Option<Color>, dim: bool) {
    let mut stdout = io::stdout();
    let result = (|| -> io::Result<()> {
        if let Some(color) = color {
            queue!(stdout, SetForegroundColor(color))?;
        }
        if dim {
            queue!(stdout, SetAttribute(Attribute::Dim))?;
        }
        for line in lines {
            // Raw mode does not translate newlines
            queue!(stdout, Print(line), Print("\r\n"))?;
        }
        queue!(stdout, SetAttribute(Attribute::Reset), ResetColor)?;
        stdout.flush()
    })();
    if let Err(e) = result {
        warn!("Failed to write to terminal: {}", e);
    }
}

#[async_trait]
impl InteractionSource for TerminalInteractions {
    async fn present(&self, _owner: &UserId, menu: &Menu) -> MenuToken {
        let token = MenuToken::new(self.next_token.fetch_add(1, Ordering::SeqCst) + 1);
        print_lines(&menu_lines(menu, &self.controller), Some(Color::Cyan), false);
        self.set_menu(Some((token, menu.clone())));
        token
    }

    async fn next_interaction(&self, token: MenuToken) -> Option<Interaction> {
        let mut keys = self.keys.lock().await;
        loop {
            if !self.is_current(token) {
                return None;
            }
            let key = keys.recv().await?;
            if !self.is_current(token) {
                debug!(%token, "Key arrived after the menu closed");
                return None;
            }
            if let Some(action) = self.action_for(&key) {
                return Some(Interaction::new(token, self.owner.clone(), action));
            }
        }
    }

    async fn clear(&self, _owner: &UserId, token: MenuToken) {
        if self.is_current(token) {
            self.set_menu(None);
        }
    }

    async fn message(&self, _owner: &UserId, text: &str) {
        print_lines(&[text.to_string()], None, false);
    }

    async fn ephemeral(&self, _user: &UserId, text: &str) {
        print_lines(&[text.to_string()], Some(Color::Yellow), true);
    }
}
