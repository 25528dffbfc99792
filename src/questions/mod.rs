//! Weighted, repeat-avoiding question pools.
//!
//! Question *content* is an external capability: the pool stores, per
//! category, entries pairing an id and a sampling weight with an opaque
//! [`QuestionContent`] that knows how to instantiate its parameters and
//! evaluate a submitted answer. The engine never looks inside the
//! instantiated content; it ferries it to clients as JSON.
//!
//! ## Sampling policy
//!
//! [`QuestionPool::draw`] performs a weighted draw restricted to entries
//! the room has not yet seen; once every entry of a category has been
//! seen it degrades to a weighted draw over the full set (repeats
//! allowed). It never fails while the category has at least one entry.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::core::{Category, GameRng, CATEGORY_COUNT};

/// Identifier of a question within the external content system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub u32);

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "question {}", self.0)
    }
}

/// External capability: randomized content instantiation and answer
/// evaluation for one question.
pub trait QuestionContent: Send + Sync {
    /// Instantiate the question's parameters; the returned JSON is sent
    /// verbatim to clients inside the show-question broadcast.
    fn instantiate(&self, rng: &mut GameRng) -> serde_json::Value;

    /// Evaluate a submitted response against an instance produced by
    /// [`instantiate`](Self::instantiate).
    fn evaluate(&self, instance: &serde_json::Value, submitted: &serde_json::Value) -> bool;
}

/// One pool entry: a question plus its sampling weight.
#[derive(Clone)]
pub struct QuestionEntry {
    /// External question id.
    pub id: QuestionId,
    /// Sampling weight; a category's weights conventionally sum to 1.
    pub weight: f32,
    /// Instantiation/evaluation capability.
    pub content: Arc<dyn QuestionContent>,
}

impl std::fmt::Debug for QuestionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionEntry")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

/// Per-category weighted question sets.
#[derive(Clone, Debug, Default)]
pub struct QuestionPool {
    by_category: [Vec<QuestionEntry>; CATEGORY_COUNT],
}

impl QuestionPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to a category.
    pub fn push(
        &mut self,
        category: Category,
        id: QuestionId,
        weight: f32,
        content: Arc<dyn QuestionContent>,
    ) {
        self.by_category[category.index()].push(QuestionEntry {
            id,
            weight,
            content,
        });
    }

    /// Builder-style [`push`](Self::push).
    #[must_use]
    pub fn with(
        mut self,
        category: Category,
        id: QuestionId,
        weight: f32,
        content: Arc<dyn QuestionContent>,
    ) -> Self {
        self.push(category, id, weight, content);
        self
    }

    /// Number of entries in a category.
    #[must_use]
    pub fn len(&self, category: Category) -> usize {
        self.by_category[category.index()].len()
    }

    /// True iff every category is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_category.iter().all(Vec::is_empty)
    }

    /// Draw a question for a category.
    ///
    /// Weighted draw over entries not in `seen`; over the full category
    /// once everything has been seen. Entries with non-positive weights
    /// fall back to a uniform draw among the candidates. Returns `None`
    /// only for a category with no entries at all.
    pub fn draw(
        &self,
        category: Category,
        seen: &FxHashSet<QuestionId>,
        rng: &mut GameRng,
    ) -> Option<&QuestionEntry> {
        let entries = &self.by_category[category.index()];
        if entries.is_empty() {
            return None;
        }

        let unseen: Vec<&QuestionEntry> =
            entries.iter().filter(|e| !seen.contains(&e.id)).collect();
        let candidates: Vec<&QuestionEntry> = if unseen.is_empty() {
            entries.iter().collect()
        } else {
            unseen
        };

        let weights: Vec<f32> = candidates.iter().map(|e| e.weight).collect();
        let pick = match rng.choose_weighted(&weights) {
            Some(i) => i,
            None => rng.gen_range_usize(0..candidates.len()),
        };
        Some(candidates[pick])
    }
}
