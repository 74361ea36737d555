//! crates/flashcards_core/src/validation.rs
//!
//! Typed boundary validation. Every validator either returns the normalized,
//! typed value or a `ValidationErrors` map of field name → messages, which the
//! delivery layer renders uniformly as a 400.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::domain::{
    DecisionAction, FlashcardDecision, FlashcardPatch, NewFlashcard, SetListQuery, SortField,
    SortOrder,
};

pub const SOURCE_TEXT_MIN_CHARS: usize = 1000;
pub const SOURCE_TEXT_MAX_CHARS: usize = 10000;
pub const FRONT_MAX_CHARS: usize = 200;
pub const BACK_MAX_CHARS: usize = 500;
pub const TITLE_MAX_CHARS: usize = 200;
pub const PASSWORD_MIN_CHARS: usize = 8;
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

//=========================================================================================
// Error collection
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    /// `Ok(value)` when nothing was recorded.
    pub fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, msgs)| format!("{}: {}", field, msgs.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

//=========================================================================================
// Field helpers
//=========================================================================================

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Trims and checks `1..=max` characters, recording problems under `field`.
fn bounded_text(
    errors: &mut ValidationErrors,
    field: &str,
    label: &str,
    raw: &str,
    max: usize,
) -> String {
    let trimmed = raw.trim().to_string();
    if trimmed.is_empty() {
        errors.add(field, format!("{} is required", label));
    } else if char_len(&trimmed) > max {
        errors.add(
            field,
            format!("{} must be at most {} characters", label, max),
        );
    }
    trimmed
}

//=========================================================================================
// Validators
//=========================================================================================

/// Source text for generation, counted in characters. Not trimmed: the text is
/// passed to the model exactly as submitted.
pub fn validate_source_text(text: &str) -> Result<String, ValidationErrors> {
    let len = char_len(text);
    let mut errors = ValidationErrors::new();
    if len < SOURCE_TEXT_MIN_CHARS {
        errors.add(
            "source_text",
            format!(
                "Text must be at least {} characters long",
                SOURCE_TEXT_MIN_CHARS
            ),
        );
    } else if len > SOURCE_TEXT_MAX_CHARS {
        errors.add(
            "source_text",
            format!(
                "Text must be at most {} characters long",
                SOURCE_TEXT_MAX_CHARS
            ),
        );
    }
    errors.finish(text.to_string())
}

pub fn validate_title(raw: &str) -> Result<String, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let title = bounded_text(&mut errors, "title", "Title", raw, TITLE_MAX_CHARS);
    errors.finish(title)
}

pub fn validate_card_content(front: &str, back: &str) -> Result<NewFlashcard, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let front = bounded_text(&mut errors, "front", "Front", front, FRONT_MAX_CHARS);
    let back = bounded_text(&mut errors, "back", "Back", back, BACK_MAX_CHARS);
    errors.finish(NewFlashcard { front, back })
}

/// At least one side must be present; present sides obey the usual limits.
pub fn validate_patch(
    front: Option<&str>,
    back: Option<&str>,
) -> Result<FlashcardPatch, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if front.is_none() && back.is_none() {
        errors.add("body", "At least one of front or back must be provided");
        return Err(errors);
    }
    let front = front.map(|f| bounded_text(&mut errors, "front", "Front", f, FRONT_MAX_CHARS));
    let back = back.map(|b| bounded_text(&mut errors, "back", "Back", b, BACK_MAX_CHARS));
    errors.finish(FlashcardPatch { front, back })
}

/// Raw query-string values as they arrive, before any parsing.
#[derive(Debug, Clone, Default)]
pub struct RawListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

pub fn validate_list_query(raw: &RawListQuery) -> Result<SetListQuery, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut query = SetListQuery::default();

    if let Some(page) = raw.page.as_deref() {
        match page.trim().parse::<u32>() {
            Ok(p) if p >= 1 => query.page = p,
            _ => errors.add("page", "Page must be a positive integer"),
        }
    }
    if let Some(limit) = raw.limit.as_deref() {
        match limit.trim().parse::<u32>() {
            Ok(l) if (1..=MAX_PAGE_LIMIT).contains(&l) => query.limit = l,
            _ => errors.add(
                "limit",
                format!("Limit must be an integer between 1 and {}", MAX_PAGE_LIMIT),
            ),
        }
    }
    query.search = raw
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if let Some(sort) = raw.sort.as_deref() {
        match sort {
            "created_at" => query.sort = SortField::CreatedAt,
            "updated_at" => query.sort = SortField::UpdatedAt,
            "title" => query.sort = SortField::Title,
            _ => errors.add("sort", "Sort must be one of: created_at, updated_at, title"),
        }
    }
    if let Some(order) = raw.order.as_deref() {
        match order {
            "asc" => query.order = SortOrder::Asc,
            "desc" => query.order = SortOrder::Desc,
            _ => errors.add("order", "Order must be one of: asc, desc"),
        }
    }
    errors.finish(query)
}

/// One decision as it arrives on the wire; `action` is kept as text so an
/// unknown value becomes a field error rather than a body rejection.
#[derive(Debug, Clone, Default)]
pub struct DecisionInput {
    pub temp_id: String,
    pub front: String,
    pub back: String,
    pub action: String,
    pub was_edited: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateSetCommand {
    Manual {
        title: String,
    },
    FromGeneration {
        title: String,
        generation_session_id: i64,
        decisions: Vec<FlashcardDecision>,
    },
}

pub fn validate_create_set(
    title: &str,
    generation_session_id: Option<i64>,
    flashcards: Option<&[DecisionInput]>,
) -> Result<CreateSetCommand, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let title = bounded_text(&mut errors, "title", "Title", title, TITLE_MAX_CHARS);

    match (generation_session_id, flashcards) {
        (None, None) => errors.finish(CreateSetCommand::Manual { title }),
        (Some(_), None) | (None, Some(_)) => {
            errors.add(
                "generation_session_id",
                "generation_session_id and flashcards must be provided together",
            );
            Err(errors)
        }
        (Some(session_id), Some(inputs)) => {
            if session_id <= 0 {
                errors.add(
                    "generation_session_id",
                    "generation_session_id must be a positive integer",
                );
            }
            let mut decisions = Vec::with_capacity(inputs.len());
            for (i, input) in inputs.iter().enumerate() {
                if let Some(decision) = validate_decision(&mut errors, i, input) {
                    decisions.push(decision);
                }
            }
            if inputs.is_empty() {
                errors.add("flashcards", "At least one flashcard decision is required");
            } else if errors.is_empty() && !decisions.iter().any(|d| d.action.is_kept()) {
                errors.add(
                    "flashcards",
                    "At least one flashcard must be accepted or edited",
                );
            }
            errors.finish(CreateSetCommand::FromGeneration {
                title,
                generation_session_id: session_id,
                decisions,
            })
        }
    }
}

fn validate_decision(
    errors: &mut ValidationErrors,
    index: usize,
    input: &DecisionInput,
) -> Option<FlashcardDecision> {
    let before = errors.fields().len();
    let prefix = format!("flashcards[{}]", index);
    if input.temp_id.trim().is_empty() {
        errors.add(&format!("{}.temp_id", prefix), "temp_id is required");
    }
    let front = bounded_text(
        errors,
        &format!("{}.front", prefix),
        "Front",
        &input.front,
        FRONT_MAX_CHARS,
    );
    let back = bounded_text(
        errors,
        &format!("{}.back", prefix),
        "Back",
        &input.back,
        BACK_MAX_CHARS,
    );
    let action = match input.action.as_str() {
        "accepted" => Some(DecisionAction::Accepted),
        "edited" => Some(DecisionAction::Edited),
        "rejected" => Some(DecisionAction::Rejected),
        _ => {
            errors.add(
                &format!("{}.action", prefix),
                "Action must be one of: accepted, edited, rejected",
            );
            None
        }
    };
    if errors.fields().len() != before {
        return None;
    }
    Some(FlashcardDecision {
        temp_id: input.temp_id.clone(),
        front,
        back,
        action: action?,
        was_edited: input.was_edited.unwrap_or(false),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

fn is_valid_email(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn validate_email(errors: &mut ValidationErrors, raw: &str) -> String {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        errors.add("email", "Email is required");
    } else if !is_valid_email(&email) {
        errors.add("email", "Invalid email address");
    }
    email
}

pub fn validate_registration(
    email: &str,
    password: &str,
    confirm: &str,
) -> Result<Credentials, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let email = validate_email(&mut errors, email);
    if char_len(password) < PASSWORD_MIN_CHARS {
        errors.add(
            "password",
            format!(
                "Password must be at least {} characters long",
                PASSWORD_MIN_CHARS
            ),
        );
    }
    if password != confirm {
        errors.add("confirm", "Passwords do not match");
    }
    errors.finish(Credentials {
        email,
        password: password.to_string(),
    })
}

pub fn validate_login(email: &str, password: &str) -> Result<Credentials, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let email = validate_email(&mut errors, email);
    if password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.finish(Credentials {
        email,
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_text_length_boundaries() {
        assert!(validate_source_text(&"a".repeat(999)).is_err());
        assert!(validate_source_text(&"a".repeat(1000)).is_ok());
        assert!(validate_source_text(&"a".repeat(10000)).is_ok());
        assert!(validate_source_text(&"a".repeat(10001)).is_err());
    }

    #[test]
    fn source_text_counts_characters_not_bytes() {
        // 1000 two-byte characters
        assert!(validate_source_text(&"é".repeat(1000)).is_ok());
    }

    #[test]
    fn title_is_trimmed_and_bounded() {
        assert_eq!(validate_title("  My Set ").unwrap(), "My Set");
        assert!(validate_title("   ").unwrap_err().contains("title"));
        assert!(validate_title(&"t".repeat(200)).is_ok());
        assert!(validate_title(&"t".repeat(201)).is_err());
    }

    #[test]
    fn card_content_limits() {
        assert!(validate_card_content(&"f".repeat(200), &"b".repeat(500)).is_ok());
        let err = validate_card_content(&"f".repeat(201), " ").unwrap_err();
        assert!(err.contains("front"));
        assert!(err.contains("back"));
    }

    #[test]
    fn patch_requires_a_field() {
        assert!(validate_patch(None, None).unwrap_err().contains("body"));
        let patch = validate_patch(Some(" Q "), None).unwrap();
        assert_eq!(patch.front.as_deref(), Some("Q"));
        assert_eq!(patch.back, None);
        assert!(validate_patch(None, Some("")).is_err());
    }

    #[test]
    fn list_query_defaults_and_bounds() {
        let q = validate_list_query(&RawListQuery::default()).unwrap();
        assert_eq!(q, SetListQuery::default());

        let q = validate_list_query(&RawListQuery {
            page: Some("3".into()),
            limit: Some("100".into()),
            search: Some("  bio ".into()),
            sort: Some("title".into()),
            order: Some("asc".into()),
        })
        .unwrap();
        assert_eq!(q.page, 3);
        assert_eq!(q.limit, 100);
        assert_eq!(q.search.as_deref(), Some("bio"));
        assert_eq!(q.sort, SortField::Title);
        assert_eq!(q.order, SortOrder::Asc);

        let err = validate_list_query(&RawListQuery {
            page: Some("0".into()),
            limit: Some("101".into()),
            sort: Some("cards_count".into()),
            order: Some("up".into()),
            ..Default::default()
        })
        .unwrap_err();
        for field in ["page", "limit", "sort", "order"] {
            assert!(err.contains(field), "missing {}", field);
        }
    }

    fn decision(action: &str) -> DecisionInput {
        DecisionInput {
            temp_id: "t1".into(),
            front: "Q".into(),
            back: "A".into(),
            action: action.into(),
            was_edited: None,
        }
    }

    #[test]
    fn create_set_modes() {
        assert_eq!(
            validate_create_set(" Bio ", None, None).unwrap(),
            CreateSetCommand::Manual {
                title: "Bio".into()
            }
        );

        let inputs = [decision("accepted"), decision("rejected")];
        match validate_create_set("Bio", Some(4), Some(&inputs)).unwrap() {
            CreateSetCommand::FromGeneration {
                generation_session_id,
                decisions,
                ..
            } => {
                assert_eq!(generation_session_id, 4);
                assert_eq!(decisions.len(), 2);
                assert!(!decisions[0].was_edited);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn create_set_requires_session_and_flashcards_together() {
        assert!(validate_create_set("Bio", Some(1), None).is_err());
        assert!(validate_create_set("Bio", None, Some(&[decision("accepted")])).is_err());
    }

    #[test]
    fn create_set_requires_a_kept_decision() {
        let err = validate_create_set("Bio", Some(1), Some(&[decision("rejected")])).unwrap_err();
        assert!(err.contains("flashcards"));
        assert!(validate_create_set("Bio", Some(1), Some(&[])).is_err());
    }

    #[test]
    fn create_set_rejects_unknown_action() {
        let err = validate_create_set("Bio", Some(1), Some(&[decision("maybe")])).unwrap_err();
        assert_eq!(
            err.fields()["flashcards[0].action"],
            vec!["Action must be one of: accepted, edited, rejected".to_string()]
        );
    }

    #[test]
    fn registration_rules() {
        let ok = validate_registration(" Ann@Example.com ", "password1", "password1").unwrap();
        assert_eq!(ok.email, "ann@example.com");

        let err = validate_registration("not-an-email", "short", "other").unwrap_err();
        assert!(err.contains("email"));
        assert!(err.contains("password"));
        assert!(err.contains("confirm"));
    }

    #[test]
    fn email_shapes() {
        for good in ["a@b.co", "first.last@sub.example.org"] {
            assert!(is_valid_email(good), "{}", good);
        }
        for bad in ["a@b", "@b.co", "a@.co", "a b@c.de", "a@b@c.de", "a@b."] {
            assert!(!is_valid_email(bad), "{}", bad);
        }
    }
}
