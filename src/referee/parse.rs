//! Tolerant parsing of arbiter verdicts.
//!
//! Models like to wrap JSON in markdown fences or chat around it, so the
//! outermost balanced `{...}` is cut out before handing it to serde.

use super::ArbiterError;
use crate::types::*;
use serde_json::Value;

/// Extract the first balanced top-level JSON object from free-form text
pub fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Turn raw arbiter text into a mask covering exactly the players that were asked about.
///
/// Players the arbiter skipped (or renamed) get all categories invalid; category
/// keys are matched case-insensitively and anything that is not a boolean `true`
/// counts as invalid.
pub fn parse_mask(text: &str, inputs: &FrozenInputs) -> Result<ValidationMask, ArbiterError> {
    let object = extract_object(text)
        .ok_or_else(|| ArbiterError::Malformed("no JSON object in response".to_string()))?;

    let value: Value =
        serde_json::from_str(object).map_err(|e| ArbiterError::Malformed(e.to_string()))?;

    let Value::Object(players) = value else {
        return Err(ArbiterError::Malformed(
            "top-level value is not an object".to_string(),
        ));
    };

    let mut mask = ValidationMask::new();
    let mut missing = 0usize;

    for player_id in inputs.keys() {
        let verdicts = match players.get(player_id) {
            Some(Value::Object(fields)) => {
                let mut verdicts = all_invalid();
                for (key, verdict) in fields {
                    if let Some(category) = Category::parse(key) {
                        verdicts.insert(category, verdict.as_bool().unwrap_or(false));
                    }
                }
                verdicts
            }
            _ => {
                missing += 1;
                all_invalid()
            }
        };
        mask.insert(player_id.clone(), verdicts);
    }

    if missing > 0 {
        tracing::warn!(
            "Arbiter response missing {} of {} players, marking them invalid",
            missing,
            inputs.len()
        );
    }

    Ok(mask)
}
