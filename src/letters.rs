//! Round letter allocation.
//!
//! Letters are drawn without replacement; once every letter has been used the
//! pool is refilled so games longer than 26 rounds keep going.

use rand::Rng;

const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone)]
pub struct LetterPool {
    remaining: Vec<char>,
}

impl Default for LetterPool {
    fn default() -> Self {
        Self::new()
    }
}

impl LetterPool {
    pub fn new() -> Self {
        Self {
            remaining: ALPHABET.chars().collect(),
        }
    }

    /// Draw a random letter and remove it from the pool
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> char {
        if self.remaining.is_empty() {
            tracing::debug!("Letter pool exhausted, refilling");
            self.remaining = ALPHABET.chars().collect();
        }
        let index = rng.random_range(0..self.remaining.len());
        self.remaining.swap_remove(index)
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}
