//! Puzzle engine: per-round random partitions of the password alphabet.
//!
//! Each round independently partitions `A..=Z` into the four color groups, so
//! the password character lands in exactly one group every round. Composing
//! that group with the session legend yields the round's correct direction —
//! recoverable only by someone who knows the password character. Without it,
//! a blind guess hits with probability ~1/4 per round, and all-rounds-must-
//! match scoring drives the overall guess probability to (1/4)^rounds.

use crate::protocol::legend::{Color, Direction, Legend};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The password alphabet.
pub const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// One round's color partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub round: usize,
    /// Each alphabet character appears in exactly one color's group.
    #[serde(rename = "colorGroups")]
    pub color_groups: BTreeMap<Color, String>,
}

impl Challenge {
    /// Generate a uniformly random partition for `round`.
    pub fn generate<R: Rng>(round: usize, rng: &mut R) -> Challenge {
        let mut groups: BTreeMap<Color, String> =
            Color::ALL.iter().map(|&c| (c, String::new())).collect();
        for ch in ALPHABET.chars() {
            let color = Color::ALL[rng.gen_range(0..Color::ALL.len())];
            groups.entry(color).or_default().push(ch);
        }
        Challenge {
            round,
            color_groups: groups,
        }
    }

    /// Which color group holds `ch`, if it is an alphabet character.
    pub fn color_of(&self, ch: char) -> Option<Color> {
        self.color_groups
            .iter()
            .find(|(_, chars)| chars.contains(ch))
            .map(|(&color, _)| color)
    }

    /// The direction a password-holder derives for this round.
    pub fn expected_direction(&self, password: char, legend: &Legend) -> Option<Direction> {
        self.color_of(password).map(|c| legend.direction_for(c))
    }

    /// A partition is well-formed when every alphabet character appears in
    /// exactly one group and no foreign characters appear.
    pub fn is_well_formed(&self) -> bool {
        let mut seen = [false; 26];
        for chars in self.color_groups.values() {
            for ch in chars.chars() {
                let Some(idx) = (ch as usize).checked_sub('A' as usize) else {
                    return false;
                };
                if idx >= 26 || seen[idx] {
                    return false;
                }
                seen[idx] = true;
            }
        }
        seen.iter().all(|&s| s)
    }
}

/// Generate the full ordered challenge sequence for one attempt.
pub fn generate_challenges<R: Rng>(rounds: usize, rng: &mut R) -> Vec<Challenge> {
    (0..rounds).map(|r| Challenge::generate(r, rng)).collect()
}
