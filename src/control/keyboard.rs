// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Keyboard shortcut handling.
//!
//! Maps terminal keys to session actions: number keys rate, letters drive
//! playback, and the instrument menu is addressed with `a`, `b`, `c`...

use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyModifiers};

use super::{Action, Menu};
use crate::song::Instrument;

/// A keyboard shortcut definition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shortcut {
    /// Key code
    pub code: KeyCode,
    /// Required modifiers
    pub modifiers: KeyModifiers,
}

impl Shortcut {
    /// Create a new shortcut
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    /// Create a shortcut with no modifiers
    pub fn key(code: KeyCode) -> Self {
        Self::new(code, KeyModifiers::NONE)
    }

    /// Create a shortcut with Ctrl modifier
    pub fn ctrl(code: KeyCode) -> Self {
        Self::new(code, KeyModifiers::CONTROL)
    }
}

/// A keyboard binding (shortcut to action)
#[derive(Debug, Clone)]
pub struct KeyBinding {
    /// The shortcut
    pub shortcut: Shortcut,
    /// The action to perform
    pub action: Action,
    /// Description for help display
    pub description: String,
    /// Category for grouping in help
    pub category: String,
}

impl KeyBinding {
    /// Create a new key binding
    pub fn new(shortcut: Shortcut, action: Action, description: impl Into<String>) -> Self {
        Self {
            shortcut,
            action,
            description: description.into(),
            category: "General".to_string(),
        }
    }

    /// Set the category
    pub fn category(mut self, cat: impl Into<String>) -> Self {
        self.category = cat.into();
        self
    }
}

/// Keyboard controller for the song control menu
pub struct KeyboardController {
    bindings: HashMap<Shortcut, KeyBinding>,
}

impl KeyboardController {
    /// Create an empty keyboard controller
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Create a keyboard controller with default bindings
    pub fn with_defaults() -> Self {
        let mut controller = Self::new();
        controller.add_default_bindings();
        controller
    }

    fn add_default_bindings(&mut self) {
        for vote in 1..=5u8 {
            let c = char::from(b'0' + vote);
            self.add(
                KeyBinding::new(Shortcut::key(KeyCode::Char(c)), Action::Rate(vote), format!("Rate {}", vote))
                    .category("Rating"),
            );
        }

        self.add(KeyBinding::new(Shortcut::key(KeyCode::Char('r')), Action::Replay, "Replay").category("Playback"));
        self.add(KeyBinding::new(Shortcut::key(KeyCode::Char('s')), Action::Stop, "Stop").category("Playback"));
        self.add(KeyBinding::new(Shortcut::key(KeyCode::Char('n')), Action::Skip, "Skip").category("Playback"));
        self.add(
            KeyBinding::new(Shortcut::key(KeyCode::Char('e')), Action::Rerender, "Re-render").category("Playback"),
        );
        self.add(
            KeyBinding::new(Shortcut::key(KeyCode::Char('p')), Action::Pick, "Pick a song to rate").category("Session"),
        );
        self.add(KeyBinding::new(Shortcut::key(KeyCode::Char('q')), Action::Quit, "Quit").category("Session"));
        self.add(KeyBinding::new(Shortcut::ctrl(KeyCode::Char('c')), Action::Quit, "Quit").category("Session"));
    }

    /// Add a key binding
    pub fn add(&mut self, binding: KeyBinding) {
        self.bindings.insert(binding.shortcut.clone(), binding);
    }

    /// Remove a key binding
    pub fn remove(&mut self, shortcut: &Shortcut) -> Option<KeyBinding> {
        self.bindings.remove(shortcut)
    }

    /// Get action for a key event on the control menu
    pub fn get_action(&self, code: KeyCode, modifiers: KeyModifiers) -> Option<Action> {
        let shortcut = Shortcut::new(code, modifiers);
        self.bindings.get(&shortcut).map(|b| b.action)
    }

    /// Map a key event against whatever menu is showing
    pub fn action_for(&self, menu: &Menu, code: KeyCode, modifiers: KeyModifiers) -> Option<Action> {
        match menu {
            Menu::Controls { .. } => self.get_action(code, modifiers),
            Menu::Instruments { choices, .. } => {
                if Shortcut::ctrl(KeyCode::Char('c')) == Shortcut::new(code, modifiers) {
                    return Some(Action::Quit);
                }
                match code {
                    KeyCode::Char(c) if modifiers == KeyModifiers::NONE => {
                        instrument_for_key(c, choices).map(Action::Instrument)
                    }
                    _ => None,
                }
            }
        }
    }

    /// Get bindings grouped by category, each group in key order
    pub fn bindings_by_category(&self) -> HashMap<String, Vec<&KeyBinding>> {
        let mut grouped: HashMap<String, Vec<&KeyBinding>> = HashMap::new();

        for binding in self.bindings.values() {
            grouped
                .entry(binding.category.clone())
                .or_default()
                .push(binding);
        }
        for group in grouped.values_mut() {
            group.sort_by_key(|b| format_shortcut(&b.shortcut));
        }

        grouped
    }
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Key that selects the `index`-th instrument of a menu
pub fn instrument_key(index: usize) -> Option<char> {
    (index < 26).then(|| char::from(b'a' + index as u8))
}

/// Instrument selected by key `c`
pub fn instrument_for_key(c: char, choices: &[Instrument]) -> Option<Instrument> {
    if !c.is_ascii_lowercase() {
        return None;
    }
    choices.get((c as u8 - b'a') as usize).copied()
}

/// Format a shortcut for display
pub fn format_shortcut(shortcut: &Shortcut) -> String {
    let mut parts = Vec::new();

    if shortcut.modifiers.contains(KeyModifiers::CONTROL) {
        parts.push("Ctrl".to_string());
    }

    let key = match shortcut.code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_uppercase().to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        _ => "?".to_string(),
    };

    parts.push(key);
    parts.join("+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::Song;

    fn song() -> Song {
        Song::new("lofi", "abcd12", Instrument::PIANO, "a.mid", "a.mp3")
    }

    #[test]
    fn test_keyboard_controller_defaults() {
        let controller = KeyboardController::with_defaults();

        for vote in 1..=5u8 {
            let c = char::from(b'0' + vote);
            assert_eq!(controller.get_action(KeyCode::Char(c), KeyModifiers::NONE), Some(Action::Rate(vote)));
        }
        assert_eq!(controller.get_action(KeyCode::Char('r'), KeyModifiers::NONE), Some(Action::Replay));
        assert_eq!(controller.get_action(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(Action::Quit));
        assert_eq!(controller.get_action(KeyCode::Char('6'), KeyModifiers::NONE), None);
    }

    #[test]
    fn test_instrument_menu_keys() {
        let controller = KeyboardController::with_defaults();
        let violin = Instrument::new(40).unwrap();
        let menu = Menu::Instruments { song: song(), choices: vec![Instrument::PIANO, violin] };

        assert_eq!(
            controller.action_for(&menu, KeyCode::Char('b'), KeyModifiers::NONE),
            Some(Action::Instrument(violin))
        );
        assert_eq!(controller.action_for(&menu, KeyCode::Char('c'), KeyModifiers::NONE), None);
        // Control keys mean nothing on the instrument menu
        assert_eq!(controller.action_for(&menu, KeyCode::Char('1'), KeyModifiers::NONE), None);
    }

    #[test]
    fn test_instrument_key_round_trip() {
        let choices = crate::song::catalog();
        for (index, instrument) in choices.iter().enumerate() {
            let key = instrument_key(index).unwrap();
            assert_eq!(instrument_for_key(key, &choices), Some(*instrument));
        }
        assert_eq!(instrument_key(26), None);
    }

    #[test]
    fn test_add_remove_binding() {
        let mut controller = KeyboardController::new();

        controller.add(KeyBinding::new(Shortcut::key(KeyCode::Char('x')), Action::Stop, "Custom Stop"));
        assert!(controller.get_action(KeyCode::Char('x'), KeyModifiers::NONE).is_some());

        controller.remove(&Shortcut::key(KeyCode::Char('x')));
        assert!(controller.get_action(KeyCode::Char('x'), KeyModifiers::NONE).is_none());
    }

    #[test]
    fn test_format_shortcut() {
        assert_eq!(format_shortcut(&Shortcut::key(KeyCode::Char('q'))), "Q");
        assert_eq!(format_shortcut(&Shortcut::ctrl(KeyCode::Char('c'))), "Ctrl+C");
    }

    #[test]
    fn test_bindings_by_category() {
        let controller = KeyboardController::with_defaults();
        let grouped = controller.bindings_by_category();

        assert_eq!(grouped["Rating"].len(), 5);
        assert!(grouped.contains_key("Playback"));
        assert!(grouped.contains_key("Session"));
    }
}
