//! crates/flashcards_core/src/review.rs
//!
//! The review session: a synchronous reducer over the candidates of one
//! generation. Each candidate moves between `Pending` and one of
//! `Accepted`/`Rejected`/`Edited`; counters are a projection of those actions
//! and are recomputed from scratch after every applied action.

use uuid::Uuid;

use crate::domain::{
    CandidateFlashcard, DecisionAction, FlashcardDecision, GenerationSessionResult,
};
use crate::validation::{validate_card_content, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateAction {
    Pending,
    Accepted,
    Rejected,
    Edited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewCandidate {
    pub id: Uuid,
    pub front: String,
    pub back: String,
    pub original_front: String,
    pub original_back: String,
    pub action: CandidateAction,
    /// Sticky: once set by an edit, nothing but a new session clears it.
    pub was_edited: bool,
}

impl ReviewCandidate {
    fn from_candidate(c: &CandidateFlashcard) -> Self {
        Self {
            id: c.temp_id,
            front: c.front.clone(),
            back: c.back.clone(),
            original_front: c.front.clone(),
            original_back: c.back.clone(),
            action: CandidateAction::Pending,
            was_edited: false,
        }
    }

    /// Edited and accepted both count as kept.
    pub fn is_kept(&self) -> bool {
        matches!(self.action, CandidateAction::Accepted | CandidateAction::Edited)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewCounters {
    pub accepted: usize,
    pub rejected: usize,
    pub remaining: usize,
}

impl ReviewCounters {
    fn tally(candidates: &[ReviewCandidate]) -> Self {
        candidates
            .iter()
            .fold(ReviewCounters::default(), |mut c, candidate| {
                match candidate.action {
                    CandidateAction::Accepted | CandidateAction::Edited => c.accepted += 1,
                    CandidateAction::Rejected => c.rejected += 1,
                    CandidateAction::Pending => c.remaining += 1,
                }
                c
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Accept(Uuid),
    Reject(Uuid),
    Undo(Uuid),
    Edit { id: Uuid, front: String, back: String },
    AcceptAll,
    OpenEditModal(Uuid),
    CloseEditModal,
    OpenTitleModal,
    CloseTitleModal,
    SetSaving(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("Invalid flashcard content: {0}")]
    InvalidEdit(ValidationErrors),
    #[error("Candidate {0} is already edited; undo it before editing again")]
    AlreadyEdited(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewState {
    pub session_id: i64,
    candidates: Vec<ReviewCandidate>,
    counters: ReviewCounters,
    /// The candidate currently open in the edit dialog.
    pub edit_modal: Option<Uuid>,
    pub title_modal_open: bool,
    pub is_saving: bool,
}

impl ReviewState {
    pub fn new(result: &GenerationSessionResult) -> Self {
        let candidates: Vec<ReviewCandidate> = result
            .candidates
            .iter()
            .map(ReviewCandidate::from_candidate)
            .collect();
        let counters = ReviewCounters::tally(&candidates);
        Self {
            session_id: result.generation_session_id,
            candidates,
            counters,
            edit_modal: None,
            title_modal_open: false,
            is_saving: false,
        }
    }

    /// The review page is fed from a client-side cache that may be empty; an
    /// empty cache is a "no session data" state, not an error.
    pub fn from_cache(cached: Option<&GenerationSessionResult>) -> Option<Self> {
        cached.map(Self::new)
    }

    pub fn candidates(&self) -> &[ReviewCandidate] {
        &self.candidates
    }

    pub fn candidate(&self, id: Uuid) -> Option<&ReviewCandidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn counters(&self) -> ReviewCounters {
        self.counters
    }

    pub fn can_save(&self) -> bool {
        self.counters.accepted > 0 && !self.is_saving
    }

    pub fn can_accept_all(&self) -> bool {
        self.counters.remaining > 0
    }

    /// Applies one action. Actions naming an unknown candidate do nothing.
    pub fn apply(&mut self, action: ReviewAction) -> Result<(), ReviewError> {
        match action {
            ReviewAction::Accept(id) => {
                if let Some(c) = self.candidate_mut(id) {
                    c.action = if c.was_edited {
                        CandidateAction::Edited
                    } else {
                        CandidateAction::Accepted
                    };
                }
            }
            ReviewAction::Reject(id) => {
                if let Some(c) = self.candidate_mut(id) {
                    c.action = CandidateAction::Rejected;
                }
            }
            ReviewAction::Undo(id) => {
                if let Some(c) = self.candidate_mut(id) {
                    c.action = CandidateAction::Pending;
                }
            }
            ReviewAction::Edit { id, front, back } => self.edit(id, &front, &back)?,
            ReviewAction::AcceptAll => {
                for c in self
                    .candidates
                    .iter_mut()
                    .filter(|c| c.action == CandidateAction::Pending)
                {
                    c.action = if c.was_edited {
                        CandidateAction::Edited
                    } else {
                        CandidateAction::Accepted
                    };
                }
            }
            ReviewAction::OpenEditModal(id) => {
                if self.candidate(id).is_some() {
                    self.edit_modal = Some(id);
                }
            }
            ReviewAction::CloseEditModal => self.edit_modal = None,
            ReviewAction::OpenTitleModal => self.title_modal_open = true,
            ReviewAction::CloseTitleModal => self.title_modal_open = false,
            ReviewAction::SetSaving(saving) => self.is_saving = saving,
        }
        self.counters = ReviewCounters::tally(&self.candidates);
        Ok(())
    }

    fn edit(&mut self, id: Uuid, front: &str, back: &str) -> Result<(), ReviewError> {
        let Some(index) = self.candidates.iter().position(|c| c.id == id) else {
            return Ok(());
        };
        if self.candidates[index].action == CandidateAction::Edited {
            return Err(ReviewError::AlreadyEdited(id));
        }
        let content = validate_card_content(front, back).map_err(ReviewError::InvalidEdit)?;

        let c = &mut self.candidates[index];
        let unchanged = content.front == c.original_front && content.back == c.original_back;
        c.front = content.front;
        c.back = content.back;
        if unchanged && !c.was_edited {
            c.action = CandidateAction::Accepted;
        } else {
            c.action = CandidateAction::Edited;
            c.was_edited = true;
        }
        if self.edit_modal == Some(id) {
            self.edit_modal = None;
        }
        Ok(())
    }

    fn candidate_mut(&mut self, id: Uuid) -> Option<&mut ReviewCandidate> {
        self.candidates.iter_mut().find(|c| c.id == id)
    }

    /// Every decided candidate, in review order, ready for finalization.
    pub fn decisions(&self) -> Vec<FlashcardDecision> {
        self.candidates
            .iter()
            .filter_map(|c| {
                let action = match c.action {
                    CandidateAction::Pending => return None,
                    CandidateAction::Accepted => DecisionAction::Accepted,
                    CandidateAction::Edited => DecisionAction::Edited,
                    CandidateAction::Rejected => DecisionAction::Rejected,
                };
                Some(FlashcardDecision {
                    temp_id: c.id.to_string(),
                    front: c.front.clone(),
                    back: c.back.clone(),
                    action,
                    was_edited: c.was_edited,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn session(n: usize) -> GenerationSessionResult {
        GenerationSessionResult {
            generation_session_id: 7,
            input_length: 1500,
            candidates_generated: n as i32,
            generation_time_ms: 10,
            candidates: (0..n)
                .map(|i| CandidateFlashcard {
                    temp_id: Uuid::new_v4(),
                    front: format!("Q{}", i),
                    back: format!("A{}", i),
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    fn ids(state: &ReviewState) -> Vec<Uuid> {
        state.candidates().iter().map(|c| c.id).collect()
    }

    fn edit(id: Uuid, front: &str, back: &str) -> ReviewAction {
        ReviewAction::Edit {
            id,
            front: front.to_string(),
            back: back.to_string(),
        }
    }

    #[test]
    fn starts_all_pending() {
        let state = ReviewState::new(&session(4));
        assert_eq!(
            state.counters(),
            ReviewCounters {
                accepted: 0,
                rejected: 0,
                remaining: 4
            }
        );
        assert!(!state.can_save());
        assert!(state.can_accept_all());
    }

    #[test]
    fn accept_reject_and_undo() {
        let mut state = ReviewState::new(&session(3));
        let ids = ids(&state);
        let original = state.candidate(ids[0]).cloned().unwrap();

        state.apply(ReviewAction::Accept(ids[0])).unwrap();
        state.apply(ReviewAction::Reject(ids[1])).unwrap();
        assert_eq!(
            state.counters(),
            ReviewCounters {
                accepted: 1,
                rejected: 1,
                remaining: 1
            }
        );
        assert!(state.can_save());

        state.apply(ReviewAction::Undo(ids[0])).unwrap();
        assert_eq!(state.candidate(ids[0]), Some(&original));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut state = ReviewState::new(&session(2));
        let before = state.clone();
        let ghost = Uuid::new_v4();
        state.apply(ReviewAction::Accept(ghost)).unwrap();
        state.apply(ReviewAction::Reject(ghost)).unwrap();
        state.apply(ReviewAction::Undo(ghost)).unwrap();
        state.apply(edit(ghost, "F", "B")).unwrap();
        state.apply(ReviewAction::OpenEditModal(ghost)).unwrap();
        assert_eq!(state, before);
    }

    #[test]
    fn edit_marks_candidate_and_sticks() {
        let mut state = ReviewState::new(&session(2));
        let id = ids(&state)[0];
        state.apply(ReviewAction::OpenEditModal(id)).unwrap();
        state.apply(edit(id, " X2 ", "Y2")).unwrap();

        let c = state.candidate(id).unwrap();
        assert_eq!((c.front.as_str(), c.back.as_str()), ("X2", "Y2"));
        assert_eq!(c.action, CandidateAction::Edited);
        assert!(c.was_edited);
        assert_eq!(state.edit_modal, None);
        assert_eq!(state.counters().accepted, 1);

        for action in [
            ReviewAction::Undo(id),
            ReviewAction::Reject(id),
            ReviewAction::Accept(id),
        ] {
            state.apply(action).unwrap();
            assert!(state.candidate(id).unwrap().was_edited);
        }
        // edited content accepted again stays an edit
        assert_eq!(state.candidate(id).unwrap().action, CandidateAction::Edited);
    }

    #[test]
    fn editing_an_edited_candidate_requires_undo() {
        let mut state = ReviewState::new(&session(1));
        let id = ids(&state)[0];
        state.apply(edit(id, "F1", "B")).unwrap();
        assert_eq!(
            state.apply(edit(id, "F2", "B")),
            Err(ReviewError::AlreadyEdited(id))
        );
        state.apply(ReviewAction::Undo(id)).unwrap();
        state.apply(edit(id, "F2", "B")).unwrap();
        assert_eq!(state.candidate(id).unwrap().front, "F2");
    }

    #[test]
    fn invalid_edit_changes_nothing() {
        let mut state = ReviewState::new(&session(1));
        let id = ids(&state)[0];
        let before = state.clone();
        let err = state.apply(edit(id, "  ", &"b".repeat(501))).unwrap_err();
        match err {
            ReviewError::InvalidEdit(fields) => {
                assert!(fields.contains("front"));
                assert!(fields.contains("back"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(state, before);
    }

    #[test]
    fn edit_with_original_content_is_an_accept() {
        let mut state = ReviewState::new(&session(1));
        let id = ids(&state)[0];
        state.apply(edit(id, "Q0", "A0")).unwrap();
        let c = state.candidate(id).unwrap();
        assert_eq!(c.action, CandidateAction::Accepted);
        assert!(!c.was_edited);
    }

    #[test]
    fn accept_all_only_touches_pending() {
        let mut state = ReviewState::new(&session(4));
        let ids = ids(&state);
        state.apply(ReviewAction::Reject(ids[0])).unwrap();
        state.apply(edit(ids[1], "E", "E")).unwrap();
        state.apply(ReviewAction::AcceptAll).unwrap();

        let actions: Vec<_> = state.candidates().iter().map(|c| c.action).collect();
        assert_eq!(
            actions,
            [
                CandidateAction::Rejected,
                CandidateAction::Edited,
                CandidateAction::Accepted,
                CandidateAction::Accepted
            ]
        );
        assert!(!state.can_accept_all());
    }

    #[test]
    fn decisions_skip_pending_and_keep_edits() {
        let mut state = ReviewState::new(&session(3));
        let ids = ids(&state);
        state.apply(ReviewAction::Reject(ids[0])).unwrap();
        state.apply(edit(ids[1], "X2", "Y2")).unwrap();

        let decisions = state.decisions();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].action, DecisionAction::Rejected);
        assert_eq!(decisions[1].action, DecisionAction::Edited);
        assert_eq!(decisions[1].front, "X2");
        assert_eq!(decisions[1].temp_id, ids[1].to_string());
        assert!(decisions[1].was_edited);
    }

    #[test]
    fn saving_disables_save() {
        let mut state = ReviewState::new(&session(1));
        state.apply(ReviewAction::AcceptAll).unwrap();
        state.apply(ReviewAction::OpenTitleModal).unwrap();
        assert!(state.can_save());
        state.apply(ReviewAction::SetSaving(true)).unwrap();
        assert!(!state.can_save());
    }

    #[test]
    fn empty_cache_is_no_session() {
        assert!(ReviewState::from_cache(None).is_none());
        let result = session(2);
        assert_eq!(ReviewState::from_cache(Some(&result)).unwrap().session_id, 7);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Accept(usize),
        Reject(usize),
        Undo(usize),
        Edit(usize, String),
        AcceptAll,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..12usize).prop_map(Op::Accept),
            (0..12usize).prop_map(Op::Reject),
            (0..12usize).prop_map(Op::Undo),
            (0..12usize, "[a-z]{1,8}").prop_map(|(i, s)| Op::Edit(i, s)),
            Just(Op::AcceptAll),
        ]
    }

    proptest! {
        #[test]
        fn counters_always_match_candidates(n in 1..10usize, ops in prop::collection::vec(op(), 0..40)) {
            let mut state = ReviewState::new(&session(n));
            let ids = ids(&state);
            // indices past the end stand in for unknown ids
            let id_at = |i: usize| ids.get(i).copied().unwrap_or_else(Uuid::new_v4);
            let mut edited = std::collections::HashSet::new();

            for op in ops {
                let action = match op {
                    Op::Accept(i) => ReviewAction::Accept(id_at(i)),
                    Op::Reject(i) => ReviewAction::Reject(id_at(i)),
                    Op::Undo(i) => ReviewAction::Undo(id_at(i)),
                    Op::Edit(i, s) => edit(id_at(i), &s, &s),
                    Op::AcceptAll => ReviewAction::AcceptAll,
                };
                let _ = state.apply(action);
                for c in state.candidates().iter().filter(|c| c.was_edited) {
                    edited.insert(c.id);
                }

                let counters = state.counters();
                prop_assert_eq!(counters.accepted + counters.rejected + counters.remaining, n);
                prop_assert_eq!(counters, ReviewCounters::tally(state.candidates()));
                for c in state.candidates() {
                    if c.action == CandidateAction::Edited {
                        prop_assert!(c.is_kept());
                        prop_assert!(c.was_edited);
                    }
                    if edited.contains(&c.id) {
                        prop_assert!(c.was_edited);
                    }
                }
            }
        }
    }
}
