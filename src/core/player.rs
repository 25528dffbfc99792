//! Player identity and per-player progression.
//!
//! ## PlayerId
//!
//! Caller-assigned opaque identifier, stable across reconnects. Ordered
//! lexicographically: turn rotation and the deterministic first-holder
//! choice rely on this ordering.
//!
//! ## Advance
//!
//! Per-player progression: one success flag per category, the ordered
//! review of every question the player faced, and up to
//! [`MAX_MARKED`] question ids the player flagged for remedial practice.

use im::Vector;
use serde::{Deserialize, Serialize};

use super::category::{Category, CATEGORY_COUNT};
use crate::questions::QuestionId;

/// Maximum number of questions a player may mark for remedial review.
pub const MAX_MARKED: usize = 3;

/// Caller-assigned opaque player identifier.
///
/// Stable across reconnects. Lexicographic `Ord` drives turn rotation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Create a player id from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A player: identity plus display pseudo.
///
/// The pseudo may change on reconnect; the id never does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable identifier.
    pub id: PlayerId,
    /// Display name, mutable across reconnects.
    pub pseudo: String,
}

impl Player {
    /// Create a player.
    #[must_use]
    pub fn new(id: impl Into<String>, pseudo: impl Into<String>) -> Self {
        Self {
            id: PlayerId::new(id),
            pseudo: pseudo.into(),
        }
    }
}

/// One entry of a player's question history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    /// The question the player faced.
    pub question: QuestionId,
    /// Whether the recorded verdict was correct.
    pub correct: bool,
}

/// Per-player progression through the game.
///
/// The review history uses a persistent vector: it is cloned into every
/// broadcast snapshot and into the final replay, so clones must be O(1).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advance {
    /// One success flag per category, indexed by `Category::index`.
    pub success: [bool; CATEGORY_COUNT],
    /// Ordered history of (question, verdict) for every resolved question.
    pub review: Vector<ReviewEntry>,
    /// Question ids the player marked for remedial practice, in mark order.
    pub marked: Vec<QuestionId>,
}

impl Advance {
    /// True iff the player has succeeded in every category.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.success.iter().all(|&s| s)
    }

    /// Record a resolved question: append to the review and, on success,
    /// set the category flag.
    pub fn record(&mut self, question: QuestionId, category: Category, correct: bool) {
        self.review.push_back(ReviewEntry { question, correct });
        if correct {
            self.success[category.index()] = true;
        }
    }

    /// Whether the player may still mark a question for remedial review.
    #[must_use]
    pub fn can_mark(&self) -> bool {
        self.marked.len() < MAX_MARKED
    }

    /// Mark a question for remedial review.
    ///
    /// Returns false (and records nothing) when the cap is reached or the
    /// question is already marked.
    pub fn mark(&mut self, question: QuestionId) -> bool {
        if !self.can_mark() || self.marked.contains(&question) {
            return false;
        }
        self.marked.push(question);
        true
    }

    /// True iff the last `n` review entries exist and are all correct.
    #[must_use]
    pub fn streak(&self, n: usize) -> bool {
        self.review.len() >= n && self.review.iter().rev().take(n).all(|e| e.correct)
    }

    /// Remedial question selection: marked questions first (mark order),
    /// then wrong answers most recent first, de-duplicated, capped at
    /// [`MAX_MARKED`].
    #[must_use]
    pub fn remedial(&self) -> Vec<QuestionId> {
        let mut picks: Vec<QuestionId> = Vec::with_capacity(MAX_MARKED);
        for &q in &self.marked {
            if picks.len() == MAX_MARKED {
                return picks;
            }
            if !picks.contains(&q) {
                picks.push(q);
            }
        }
        for entry in self.review.iter().rev() {
            if picks.len() == MAX_MARKED {
                break;
            }
            if !entry.correct && !picks.contains(&entry.question) {
                picks.push(entry.question);
            }
        }
        picks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: u32) -> QuestionId {
        QuestionId(n)
    }

    #[test]
    fn done_requires_all_five() {
        let mut adv = Advance::default();
        assert!(!adv.is_done());
        for cat in &Category::ALL[..4] {
            adv.record(q(cat.index() as u32), *cat, true);
        }
        assert!(!adv.is_done());
        adv.record(q(99), Category::Logic, true);
        assert!(adv.is_done());
    }

    #[test]
    fn failure_does_not_set_category() {
        let mut adv = Advance::default();
        adv.record(q(1), Category::Geometry, false);
        assert!(!adv.success[Category::Geometry.index()]);
        assert_eq!(adv.review.len(), 1);
    }

    #[test]
    fn mark_cap_and_dedup() {
        let mut adv = Advance::default();
        assert!(adv.mark(q(1)));
        assert!(!adv.mark(q(1)), "duplicate mark rejected");
        assert!(adv.mark(q(2)));
        assert!(adv.mark(q(3)));
        assert!(!adv.can_mark());
        assert!(!adv.mark(q(4)), "cap of 3 enforced");
        assert_eq!(adv.marked, vec![q(1), q(2), q(3)]);
    }

    #[test]
    fn streak_counts_trailing_entries_only() {
        let mut adv = Advance::default();
        adv.record(q(1), Category::Arithmetic, false);
        adv.record(q(2), Category::Geometry, true);
        adv.record(q(3), Category::Logic, true);
        assert!(!adv.streak(3));
        adv.record(q(4), Category::Measures, true);
        assert!(adv.streak(3));
        assert!(!adv.streak(4));
    }

    #[test]
    fn remedial_prefers_marks_then_recent_wrong() {
        let mut adv = Advance::default();
        adv.record(q(1), Category::Arithmetic, false);
        adv.record(q(2), Category::Geometry, false);
        adv.record(q(3), Category::Logic, false);
        adv.mark(q(7));
        assert_eq!(adv.remedial(), vec![q(7), q(3), q(2)]);
    }

    #[test]
    fn remedial_dedups_marked_wrong_answers() {
        let mut adv = Advance::default();
        adv.record(q(1), Category::Arithmetic, false);
        adv.record(q(2), Category::Geometry, false);
        adv.mark(q(1));
        assert_eq!(adv.remedial(), vec![q(1), q(2)]);
    }
}
