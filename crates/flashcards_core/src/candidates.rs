//! crates/flashcards_core/src/candidates.rs
//!
//! Turns the raw text returned by the model into a strict list of candidates.

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::domain::CandidateFlashcard;
use crate::validation::validate_card_content;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("AI response is not valid JSON")]
    InvalidJson,
    #[error("AI response has no 'candidates' array")]
    InvalidStructure,
    #[error("Candidate {0} is missing a string 'front' or 'back'")]
    InvalidCandidate(usize),
    #[error("AI response contains no candidates")]
    NoCandidates,
}

/// Parses `{"candidates": [{"front": .., "back": ..}, ..]}`.
///
/// Fields are trimmed and every candidate receives a freshly generated id; any id
/// the model may have produced is ignored.
///
/// A candidate that could never be saved (a side empty after trimming, or longer
/// than the flashcard limits) is dropped. If nothing usable is left the response
/// counts as having no candidates.
pub fn parse_candidates(raw: &str) -> Result<Vec<CandidateFlashcard>, ParseError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ParseError::InvalidJson)?;

    let items = value
        .get("candidates")
        .and_then(Value::as_array)
        .ok_or(ParseError::InvalidStructure)?;

    let mut candidates = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let front = item.get("front").and_then(Value::as_str);
        let back = item.get("back").and_then(Value::as_str);
        let (Some(front), Some(back)) = (front, back) else {
            return Err(ParseError::InvalidCandidate(index));
        };
        let card = match validate_card_content(front, back) {
            Ok(card) => card,
            Err(errors) => {
                let fields: Vec<_> = errors.fields().keys().collect();
                warn!(index, ?fields, "Dropping unusable candidate");
                continue;
            }
        };
        candidates.push(CandidateFlashcard {
            temp_id: Uuid::new_v4(),
            front: card.front,
            back: card.back,
        });
    }

    if candidates.is_empty() {
        return Err(ParseError::NoCandidates);
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parses_and_trims_single_candidate() {
        let raw = serde_json::json!({"candidates": [{"front": "  Q ", "back": "A\n"}]}).to_string();
        let parsed = parse_candidates(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].front, "Q");
        assert_eq!(parsed[0].back, "A");
    }

    #[test]
    fn ignores_ids_from_the_model() {
        let fixed = "00000000-0000-0000-0000-000000000001";
        let raw = format!(
            r#"{{"candidates":[{{"temp_id":"{0}","id":"{0}","front":"Q","back":"A"}},{{"temp_id":"{0}","front":"Q2","back":"A2"}}]}}"#,
            fixed
        );
        let parsed = parse_candidates(&raw).unwrap();
        let ids: HashSet<_> = parsed.iter().map(|c| c.temp_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&Uuid::parse_str(fixed).unwrap()));
    }

    #[test]
    fn rejects_malformed_output() {
        assert_eq!(parse_candidates("not json"), Err(ParseError::InvalidJson));
        assert_eq!(parse_candidates(r#"{"cards":[]}"#), Err(ParseError::InvalidStructure));
        assert_eq!(parse_candidates(r#"{"candidates":{}}"#), Err(ParseError::InvalidStructure));
        assert_eq!(parse_candidates(r#"{"candidates":[]}"#), Err(ParseError::NoCandidates));
        assert_eq!(
            parse_candidates(r#"{"candidates":[{"front":"Q"}]}"#),
            Err(ParseError::InvalidCandidate(0))
        );
        assert_eq!(
            parse_candidates(r#"{"candidates":[{"front":"Q","back":"A"},{"front":1,"back":"A"}]}"#),
            Err(ParseError::InvalidCandidate(1))
        );
    }

    #[test]
    fn drops_candidates_that_could_not_be_saved() {
        let raw = serde_json::json!({
            "candidates": [
                { "front": "x".repeat(300), "back": "A" },
                { "front": "   ", "back": "A" },
                { "front": "Q", "back": "b".repeat(501) },
                { "front": " Kept? ", "back": "Yes" },
            ]
        })
        .to_string();
        let parsed = parse_candidates(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].front, "Kept?");
        assert_eq!(parsed[0].back, "Yes");
    }

    #[test]
    fn only_unusable_candidates_means_none() {
        let raw = serde_json::json!({
            "candidates": [
                { "front": "x".repeat(201), "back": "A" },
                { "front": "Q", "back": "\n\t " },
            ]
        })
        .to_string();
        assert_eq!(parse_candidates(&raw), Err(ParseError::NoCandidates));
    }

    #[test]
    fn limits_count_characters_not_bytes() {
        let raw = serde_json::json!({
            "candidates": [{ "front": "é".repeat(200), "back": "ü".repeat(500) }]
        })
        .to_string();
        assert_eq!(parse_candidates(&raw).unwrap().len(), 1);
    }
}
