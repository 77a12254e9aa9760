use crate::types::FrozenInputs;

/// Referee instructions sent as the system message
pub const REFEREE_SYSTEM_PROMPT: &str = r#"You are the referee for the word game "Name Place Animal Thing".
You judge whether each answer is acceptable and reply with JSON only."#;

/// Build the user message for one round: the rules, the letter and every player's answers
pub fn build_prompt(inputs: &FrozenInputs, letter: char) -> String {
    let inputs_json = serde_json::to_string(inputs).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"Current Letter: "{letter}"

STRICT RULES:
1. Starts With: All answers MUST start with the letter "{letter}".
2. NAME: Must be a valid human name.
3. PLACE:
   - ACCEPT: Countries, Cities, States, Continents.
   - REJECT: Monuments, Local Streets, Shops, Buildings.
4. ANIMAL:
   - ACCEPT: Any living creature.
5. THING: Must be a non-living object.

Input JSON:
{inputs_json}

Task:
Return a JSON object mapping every player ID to an object with the keys "name", "place", "animal" and "thing", where every value is strictly boolean (true = valid, false = invalid). Missing or empty answers are false.
You MUST use the exact same ID keys from the Input JSON in your output. Do not rename them.
RETURN ONLY RAW JSON. NO MARKDOWN."#
    )
}
