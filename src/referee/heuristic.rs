use super::{Arbiter, ArbiterError};
use crate::types::*;
use async_trait::async_trait;

/// Offline last resort: an answer counts if it is non-blank and starts with the letter.
///
/// No category knowledge at all; it only keeps the game moving.
pub struct HeuristicArbiter;

pub fn first_letter_mask(inputs: &FrozenInputs, letter: char) -> ValidationMask {
    inputs
        .iter()
        .map(|(player_id, answers)| {
            let verdicts = Category::ALL
                .into_iter()
                .map(|category| {
                    let valid = answers
                        .get(&category)
                        .map(|value| starts_with_letter(value, letter))
                        .unwrap_or(false);
                    (category, valid)
                })
                .collect();
            (player_id.clone(), verdicts)
        })
        .collect()
}

fn starts_with_letter(value: &str, letter: char) -> bool {
    value
        .trim()
        .chars()
        .next()
        .map(|first| first.to_lowercase().eq(letter.to_lowercase()))
        .unwrap_or(false)
}

#[async_trait]
impl Arbiter for HeuristicArbiter {
    async fn attempt(
        &self,
        inputs: &FrozenInputs,
        letter: char,
    ) -> Result<ValidationMask, ArbiterError> {
        Ok(first_letter_mask(inputs, letter))
    }

    fn name(&self) -> String {
        "heuristic".to_string()
    }
}
