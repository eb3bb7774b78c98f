// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! General MIDI instruments used to render generated songs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A General MIDI program number (0-127)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Instrument(u8);

impl Instrument {
    /// Highest valid General MIDI program
    pub const MAX_PROGRAM: u8 = 127;

    /// Acoustic Grand Piano, the renderer's default
    pub const PIANO: Instrument = Instrument(0);

    /// Create an instrument from a program number
    pub fn new(program: u8) -> Option<Self> {
        (program <= Self::MAX_PROGRAM).then_some(Self(program))
    }

    /// Program number
    pub fn program(self) -> u8 {
        self.0
    }

    /// Display name from the menu catalog, or a generic program label
    pub fn name(self) -> String {
        CATALOG
            .iter()
            .find(|(program, _)| *program == self.0)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("Program {}", self.0))
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Self::PIANO
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Instrument {
    type Error = String;

    fn try_from(program: u8) -> Result<Self, Self::Error> {
        Self::new(program).ok_or_else(|| format!("MIDI program out of range: {}", program))
    }
}

impl From<Instrument> for u8 {
    fn from(instrument: Instrument) -> Self {
        instrument.0
    }
}

impl FromStr for Instrument {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let program: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("Invalid MIDI program: {}", s))?;
        Self::try_from(program)
    }
}

/// Instruments offered in the re-render menu, in menu order.
const CATALOG: &[(u8, &str)] = &[
    (0, "Acoustic Grand Piano"),
    (4, "Electric Piano 1"),
    (11, "Vibraphone"),
    (19, "Church Organ"),
    (24, "Acoustic Guitar (nylon)"),
    (26, "Electric Guitar (jazz)"),
    (32, "Acoustic Bass"),
    (40, "Violin"),
    (48, "String Ensemble 1"),
    (56, "Trumpet"),
    (65, "Alto Sax"),
    (73, "Flute"),
    (88, "Pad 1 (new age)"),
    (108, "Kalimba"),
];

/// All instruments offered for re-rendering
pub fn catalog() -> Vec<Instrument> {
    CATALOG
        .iter()
        .map(|(program, _)| Instrument(*program))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_range() {
        assert!(Instrument::new(0).is_some());
        assert!(Instrument::new(127).is_some());
        assert!(Instrument::new(128).is_none());
    }

    #[test]
    fn test_parse_instrument() {
        assert_eq!("40".parse::<Instrument>().unwrap().program(), 40);
        assert!(" 200".parse::<Instrument>().is_err());
        assert!("violin".parse::<Instrument>().is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(Instrument::PIANO.name(), "Acoustic Grand Piano");
        assert_eq!(Instrument::new(40).unwrap().name(), "Violin");
        assert_eq!(Instrument::new(3).unwrap().name(), "Program 3");
    }

    #[test]
    fn test_catalog_starts_with_piano() {
        let instruments = catalog();
        assert_eq!(instruments[0], Instrument::PIANO);
        assert!(instruments.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_serde_rejects_out_of_range() {
        let ok: Instrument = serde_yaml::from_str("24").unwrap();
        assert_eq!(ok.program(), 24);
        assert!(serde_yaml::from_str::<Instrument>("300").is_err());
    }
}
