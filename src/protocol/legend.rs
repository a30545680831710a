//! Session-scoped legend issuance: the fixed color → direction mapping that
//! scores every challenge of every pot registered under a session.

use crate::protocol::error::PotError;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// The four canonical colors. Serialized lowercase so they double as the
/// JSON keys of a challenge's `colorGroups`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Green,
    Blue,
    Yellow,
}

impl Color {
    pub const ALL: [Color; 4] = [Color::Red, Color::Green, Color::Blue, Color::Yellow];

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Blue => "blue",
            Color::Yellow => "yellow",
        }
    }

    /// Display hex used by clients when rendering the color swatches.
    pub fn swatch(self) -> &'static str {
        match self {
            Color::Red => "#ef4444",
            Color::Green => "#22c55e",
            Color::Blue => "#3b82f6",
            Color::Yellow => "#eab308",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed directional answer alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "U")]
    Up,
    #[serde(rename = "D")]
    Down,
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
    #[serde(rename = "S")]
    Stay,
}

impl Direction {
    pub const ALL: [Direction; 5] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::Stay,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Direction::Up => "U",
            Direction::Down => "D",
            Direction::Left => "L",
            Direction::Right => "R",
            Direction::Stay => "S",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Direction> {
        match s {
            "U" => Some(Direction::Up),
            "D" => Some(Direction::Down),
            "L" => Some(Direction::Left),
            "R" => Some(Direction::Right),
            "S" => Some(Direction::Stay),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Bijective map of the four colors to directional symbols.
///
/// Serializes as the wire form clients sign inside registration payloads:
/// `{"red":"U","green":"D","blue":"L","yellow":"R"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Legend {
    pub red: Direction,
    pub green: Direction,
    pub blue: Direction,
    pub yellow: Direction,
}

impl Legend {
    /// Build a legend, rejecting any direction used twice.
    pub fn new(
        red: Direction,
        green: Direction,
        blue: Direction,
        yellow: Direction,
    ) -> Result<Legend, PotError> {
        let legend = Legend {
            red,
            green,
            blue,
            yellow,
        };
        legend.validate()?;
        Ok(legend)
    }

    /// The mapping must be injective over the four colors.
    pub fn validate(&self) -> Result<(), PotError> {
        let dirs = [self.red, self.green, self.blue, self.yellow];
        for i in 0..dirs.len() {
            for j in i + 1..dirs.len() {
                if dirs[i] == dirs[j] {
                    return Err(PotError::InvalidPayload(format!(
                        "legend is not bijective: direction {} assigned twice",
                        dirs[i]
                    )));
                }
            }
        }
        Ok(())
    }

    /// Random bijection: four distinct directions drawn from the alphabet.
    pub fn random<R: rand::Rng>(rng: &mut R) -> Legend {
        let mut dirs = Direction::ALL;
        dirs.shuffle(rng);
        Legend {
            red: dirs[0],
            green: dirs[1],
            blue: dirs[2],
            yellow: dirs[3],
        }
    }

    pub fn direction_for(&self, color: Color) -> Direction {
        match color {
            Color::Red => self.red,
            Color::Green => self.green,
            Color::Blue => self.blue,
            Color::Yellow => self.yellow,
        }
    }
}

/// Process-wide, session-scoped legend cache.
///
/// A legend is generated the first time a session asks for one and reused
/// unchanged for the session's lifetime; regenerating it would invalidate
/// challenge semantics for every pot already registered under the session.
pub struct LegendRegistry {
    sessions: Mutex<HashMap<String, Arc<Legend>>>,
}

impl LegendRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Issue (or re-fetch) the session's legend.
    pub fn issue(&self, session_id: &str) -> Arc<Legend> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Legend::random(&mut rand::thread_rng())))
            .clone()
    }
}

impl Default for LegendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_direction_rejected() {
        let err = Legend::new(
            Direction::Up,
            Direction::Up,
            Direction::Left,
            Direction::Right,
        );
        assert!(err.is_err());
    }

    #[test]
    fn random_legend_is_bijective() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            Legend::random(&mut rng).validate().unwrap();
        }
    }

    #[test]
    fn registry_reuses_session_legend() {
        let registry = LegendRegistry::new();
        let a = registry.issue("s1");
        let b = registry.issue("s1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, *b);
    }

    #[test]
    fn distinct_sessions_are_independent() {
        let registry = LegendRegistry::new();
        let a = registry.issue("s1");
        let b = registry.issue("s2");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn legend_wire_form() {
        let legend = Legend::new(
            Direction::Up,
            Direction::Down,
            Direction::Left,
            Direction::Right,
        )
        .unwrap();
        let json = serde_json::to_string(&legend).unwrap();
        assert_eq!(json, r#"{"red":"U","green":"D","blue":"L","yellow":"R"}"#);
        let back: Legend = serde_json::from_str(&json).unwrap();
        assert_eq!(back, legend);
    }
}
