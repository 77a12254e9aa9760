use crate::types::*;
use std::collections::{BTreeMap, HashMap};

/// Normalize an answer for duplicate comparison (trim whitespace, lowercase)
fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// One player's graded round, before it is added to their running total
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRoundScore {
    pub round_score: u32,
    pub breakdown: BTreeMap<Category, CategoryScore>,
    pub validation: Verdicts,
}

/// Score a frozen round against the referee's verdicts.
///
/// A valid answer nobody else gave is worth 10, a valid answer shared with
/// any other valid answer in the same category is worth 5, and anything
/// invalid or blank is worth 0. Frequencies are counted across all players.
pub fn score_round(
    inputs: &FrozenInputs,
    mask: &ValidationMask,
) -> BTreeMap<PlayerId, PlayerRoundScore> {
    let is_valid = |player_id: &PlayerId, category: Category| {
        mask.get(player_id)
            .and_then(|v| v.get(&category))
            .copied()
            .unwrap_or(false)
    };

    let mut frequency: HashMap<(Category, String), u32> = HashMap::new();
    for (player_id, answers) in inputs {
        for (category, value) in answers {
            let normalized = normalize(value);
            if !normalized.is_empty() && is_valid(player_id, *category) {
                *frequency.entry((*category, normalized)).or_default() += 1;
            }
        }
    }

    inputs
        .iter()
        .map(|(player_id, answers)| {
            let mut breakdown = BTreeMap::new();
            let mut validation = Verdicts::new();

            for category in Category::ALL {
                let valid = is_valid(player_id, category);
                let normalized = answers.get(&category).map(|v| normalize(v)).unwrap_or_default();

                let grade = if normalized.is_empty() {
                    AnswerGrade::Empty
                } else if !valid {
                    AnswerGrade::Invalid
                } else if frequency.get(&(category, normalized)).copied() == Some(1) {
                    AnswerGrade::Unique
                } else {
                    AnswerGrade::Duplicate
                };

                validation.insert(category, valid);
                breakdown.insert(
                    category,
                    CategoryScore {
                        grade,
                        points: grade.points(),
                    },
                );
            }

            let round_score = breakdown.values().map(|s| s.points).sum();
            (
                player_id.clone(),
                PlayerRoundScore {
                    round_score,
                    breakdown,
                    validation,
                },
            )
        })
        .collect()
}

/// Leaderboard order: cumulative score descending, ties keep seating order
pub fn standings(players: &[Player]) -> Vec<PlayerView> {
    let mut views: Vec<PlayerView> = players.iter().map(Player::view).collect();
    views.sort_by(|a, b| b.score.cmp(&a.score));
    views
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(values: [&str; 4]) -> Answers {
        Category::ALL
            .into_iter()
            .zip(values)
            .map(|(c, v)| (c, v.to_string()))
            .collect()
    }

    fn accept_all_but(inputs: &FrozenInputs, rejected: &[(&str, Category)]) -> ValidationMask {
        inputs
            .keys()
            .map(|id| {
                let verdicts = Category::ALL
                    .into_iter()
                    .map(|c| (c, !rejected.contains(&(id.as_str(), c))))
                    .collect();
                (id.clone(), verdicts)
            })
            .collect()
    }

    fn letter_i_round() -> FrozenInputs {
        let mut inputs = FrozenInputs::new();
        inputs.insert(
            "isha".to_string(),
            answers(["Isha", "India Gate", "Iguana", "Ink"]),
        );
        inputs.insert(
            "ishant".to_string(),
            answers(["Ishant", "India", "Iguana", "Ice"]),
        );
        inputs.insert(
            "ibrahim".to_string(),
            answers(["Ibrahim", "India", "Impala", "Igloo"]),
        );
        inputs
    }

    #[test]
    fn test_letter_i_scenario() {
        let inputs = letter_i_round();
        let mask = accept_all_but(&inputs, &[("isha", Category::Place)]);
        let scores = score_round(&inputs, &mask);

        let isha = &scores["isha"];
        assert_eq!(isha.breakdown[&Category::Name].points, 10);
        assert_eq!(isha.breakdown[&Category::Place].grade, AnswerGrade::Invalid);
        assert_eq!(isha.breakdown[&Category::Place].points, 0);
        assert_eq!(isha.breakdown[&Category::Animal].grade, AnswerGrade::Duplicate);
        assert_eq!(isha.breakdown[&Category::Thing].points, 10);
        assert_eq!(isha.round_score, 25);
        assert!(!isha.validation[&Category::Place]);

        // "India" is shared by two valid answers; the rejected "India Gate" does not count
        let ishant = &scores["ishant"];
        assert_eq!(ishant.breakdown[&Category::Place].points, 5);
        assert_eq!(ishant.breakdown[&Category::Animal].points, 5);
        assert_eq!(ishant.round_score, 30);

        let ibrahim = &scores["ibrahim"];
        assert_eq!(ibrahim.breakdown[&Category::Place].points, 5);
        assert_eq!(ibrahim.breakdown[&Category::Animal].grade, AnswerGrade::Unique);
        assert_eq!(ibrahim.round_score, 35);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let inputs = letter_i_round();
        let mask = accept_all_but(&inputs, &[("ibrahim", Category::Thing)]);
        assert_eq!(score_round(&inputs, &mask), score_round(&inputs, &mask));
    }

    #[test]
    fn test_duplicates_are_case_and_space_insensitive() {
        let mut inputs = FrozenInputs::new();
        inputs.insert("a".to_string(), answers(["", "", "", " INK "]));
        inputs.insert("b".to_string(), answers(["", "", "", "ink"]));
        let mask = accept_all_but(&inputs, &[]);
        let scores = score_round(&inputs, &mask);

        assert_eq!(scores["a"].breakdown[&Category::Thing].grade, AnswerGrade::Duplicate);
        assert_eq!(scores["b"].round_score, 5);
        assert_eq!(scores["a"].breakdown[&Category::Name].grade, AnswerGrade::Empty);
    }

    #[test]
    fn test_invalid_answers_score_zero_and_do_not_count() {
        let mut inputs = FrozenInputs::new();
        inputs.insert("a".to_string(), answers(["", "", "", "Ink"]));
        inputs.insert("b".to_string(), answers(["", "", "", "Ink"]));
        inputs.insert("c".to_string(), answers(["", "", "", "Ink"]));
        let mask = accept_all_but(&inputs, &[("b", Category::Thing), ("c", Category::Thing)]);
        let scores = score_round(&inputs, &mask);

        assert_eq!(scores["a"].breakdown[&Category::Thing].grade, AnswerGrade::Unique);
        assert_eq!(scores["a"].round_score, 10);
        assert_eq!(scores["b"].round_score, 0);
        assert_eq!(scores["c"].round_score, 0);
    }

    #[test]
    fn test_missing_mask_entry_is_invalid() {
        let mut inputs = FrozenInputs::new();
        inputs.insert("a".to_string(), answers(["Ada", "", "", ""]));
        let scores = score_round(&inputs, &ValidationMask::new());
        assert_eq!(scores["a"].round_score, 0);
        assert_eq!(scores["a"].breakdown[&Category::Name].grade, AnswerGrade::Invalid);
    }

    #[test]
    fn test_standings_are_stable() {
        let mut players: Vec<Player> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|id| Player::new(id.to_string(), id.to_uppercase(), Avatar::default()))
            .collect();
        players[0].score = 10;
        players[1].score = 30;
        players[2].score = 10;
        players[3].score = 30;

        let order: Vec<String> = standings(&players).into_iter().map(|p| p.id).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }
}
