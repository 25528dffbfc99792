//! The turn state machine for one room.
//!
//! Every mutating method is a guarded transition: a call that does not
//! match the current phase or sender returns a [`Rejection`] and leaves
//! the state untouched. The room worker logs rejections and never
//! broadcasts them; no client input can reach an invalid state.
//!
//! The machine knows nothing about connections. The worker feeds it the
//! current set of *active* players where a transition depends on it, and
//! applies roster/advance effects itself.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use super::{Phase, DIE_FACES};
use crate::board::{Board, TileId, TilePath};
use crate::core::{Category, GameRng, PlayerId};
use crate::questions::{QuestionContent, QuestionId, QuestionPool};

/// A protocol violation: the event does not fit the current phase or
/// sender. Logged by the worker, never broadcast, never fatal.
#[derive(Debug, Error)]
pub enum Rejection {
    /// Event arrived in the wrong phase.
    #[error("wrong phase: {actual}, expected {expected}")]
    WrongPhase {
        /// Phase the event is valid in.
        expected: Phase,
        /// Phase the machine is in.
        actual: Phase,
    },
    /// Sender is not the current turn holder.
    #[error("{0} is not the turn holder")]
    NotTurnHolder(PlayerId),
    /// Chosen tile is not in the reachable set.
    #[error("{0} is not reachable with the current roll")]
    UnreachableTile(TileId),
    /// Player already answered the open question.
    #[error("{0} already answered")]
    AlreadyAnswered(PlayerId),
    /// Player already signalled readiness.
    #[error("{0} already signalled ready")]
    AlreadyReady(PlayerId),
    /// No question exists for the landing category.
    #[error("no question available for category {0}")]
    NoQuestion(Category),
    /// A transition needing a turn holder found no active players.
    #[error("no active players")]
    NoActivePlayers,
}

/// The question currently open, with its evaluation capability.
pub struct ActiveQuestion {
    /// External question id.
    pub id: QuestionId,
    /// Category it was drawn for.
    pub category: Category,
    /// Instantiated content, as broadcast to clients.
    pub content: serde_json::Value,
    capability: Arc<dyn QuestionContent>,
}

impl std::fmt::Debug for ActiveQuestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveQuestion")
            .field("id", &self.id)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Result of a successful tile choice: the move and the opened question.
#[derive(Debug)]
pub struct ShownQuestion {
    /// Path the pawn took.
    pub path: TilePath,
    /// External question id.
    pub question: QuestionId,
    /// Landing category.
    pub category: Category,
    /// Instantiated content.
    pub content: serde_json::Value,
}

/// One room's authoritative game state.
#[derive(Debug)]
pub struct Game {
    phase: Phase,
    pawn: TileId,
    holder: Option<PlayerId>,
    dice: Option<u8>,
    reachable: FxHashMap<TileId, TilePath>,
    question: Option<ActiveQuestion>,
    /// Verdicts for the open question, keyed by player.
    verdicts: FxHashMap<PlayerId, bool>,
    /// Active players captured when the question was shown; completion
    /// requires an answer from each. Reconnects never extend it.
    expected: BTreeSet<PlayerId>,
    ready: BTreeSet<PlayerId>,
    seen: FxHashSet<QuestionId>,
    /// Bumped on every new question; stale timer messages carry an old
    /// value and are dropped.
    question_seq: u64,
    rng: GameRng,
}

impl Game {
    /// Fresh game in the lobby, pawn on the start tile.
    #[must_use]
    pub fn new(rng: GameRng) -> Self {
        Self {
            phase: Phase::Lobby,
            pawn: TileId::START,
            holder: None,
            dice: None,
            reachable: FxHashMap::default(),
            question: None,
            verdicts: FxHashMap::default(),
            expected: BTreeSet::new(),
            ready: BTreeSet::new(),
            seen: FxHashSet::default(),
            question_seq: 0,
            rng,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Pawn position.
    #[must_use]
    pub fn pawn(&self) -> TileId {
        self.pawn
    }

    /// Current turn holder.
    #[must_use]
    pub fn holder(&self) -> Option<&PlayerId> {
        self.holder.as_ref()
    }

    /// Last dice roll, while a tile choice is pending.
    #[must_use]
    pub fn dice(&self) -> Option<u8> {
        self.dice
    }

    /// The open question, if any.
    #[must_use]
    pub fn question(&self) -> Option<&ActiveQuestion> {
        self.question.as_ref()
    }

    /// Sequence number of the current question.
    #[must_use]
    pub fn question_seq(&self) -> u64 {
        self.question_seq
    }

    /// Tiles currently reachable, sorted.
    #[must_use]
    pub fn reachable_tiles(&self) -> Vec<TileId> {
        let mut tiles: Vec<TileId> = self.reachable.keys().copied().collect();
        tiles.sort();
        tiles
    }

    /// Lobby → TurnStarted. Picks the first holder deterministically.
    pub fn start(&mut self, actives: &BTreeSet<PlayerId>) -> Result<PlayerId, Rejection> {
        if self.phase != Phase::Lobby {
            return Err(Rejection::WrongPhase {
                expected: Phase::Lobby,
                actual: self.phase,
            });
        }
        self.begin_turn(actives).ok_or(Rejection::NoActivePlayers)
    }

    /// Open a fresh turn: clear per-turn bookkeeping, rotate the holder
    /// to the lexicographically-next active id (wrapping), enter
    /// `TurnStarted`. Returns the new holder, `None` when no one is
    /// active (the caller must not have transitioned in that case).
    pub fn begin_turn(&mut self, actives: &BTreeSet<PlayerId>) -> Option<PlayerId> {
        let next = next_holder(self.holder.as_ref(), actives)?;
        self.dice = None;
        self.reachable.clear();
        self.question = None;
        self.verdicts.clear();
        self.expected.clear();
        self.ready.clear();
        self.holder = Some(next.clone());
        self.phase = Phase::TurnStarted;
        Some(next)
    }

    /// Drop the turn holder without changing phase. Used when the
    /// holder disconnects and nobody is left to take over; the room
    /// stays frozen until a join opens a fresh turn.
    pub fn clear_holder(&mut self) {
        self.holder = None;
    }

    /// TurnStarted → ChoosingTile: the holder rolls the die.
    pub fn throw_dice(
        &mut self,
        sender: &PlayerId,
        board: &Board,
    ) -> Result<(u8, Vec<TileId>), Rejection> {
        self.guard_holder(Phase::TurnStarted, sender)?;
        let face = self.rng.die_roll(DIE_FACES);
        self.dice = Some(face);
        self.reachable = board.choices(self.pawn, face);
        self.phase = Phase::ChoosingTile;
        Ok((face, self.reachable_tiles()))
    }

    /// ChoosingTile → DoingQuestion: the holder picks a reachable tile;
    /// the pawn moves and a question opens for everyone active.
    ///
    /// A destination whose category has no pool entries is rejected
    /// before anything moves: the roll stays pending and the holder may
    /// pick another tile.
    pub fn choose_tile(
        &mut self,
        sender: &PlayerId,
        destination: TileId,
        board: &Board,
        pool: &QuestionPool,
        actives: &BTreeSet<PlayerId>,
    ) -> Result<ShownQuestion, Rejection> {
        self.guard_holder(Phase::ChoosingTile, sender)?;
        let path = self
            .reachable
            .get(&destination)
            .cloned()
            .ok_or(Rejection::UnreachableTile(destination))?;

        // Draw before committing anything: an empty category must
        // reject without moving the pawn.
        let category = board.category(destination);
        let entry = pool
            .draw(category, &self.seen, &mut self.rng)
            .ok_or(Rejection::NoQuestion(category))?;
        let id = entry.id;
        let capability = Arc::clone(&entry.content);
        let content = capability.instantiate(&mut self.rng);

        self.pawn = destination;
        self.dice = None;
        self.reachable.clear();
        self.seen.insert(id);
        self.question = Some(ActiveQuestion {
            id,
            category,
            content: content.clone(),
            capability,
        });
        self.verdicts.clear();
        self.expected = actives.clone();
        self.ready.clear();
        self.question_seq += 1;
        self.phase = Phase::DoingQuestion;

        Ok(ShownQuestion {
            path,
            question: id,
            category,
            content,
        })
    }

    /// Record one player's answer. Returns true when every expected
    /// player has now answered (the question should resolve).
    ///
    /// Players outside the expectation set (reconnected mid-question)
    /// may still answer; they just never block completion.
    pub fn submit_answer(
        &mut self,
        sender: &PlayerId,
        response: &serde_json::Value,
    ) -> Result<bool, Rejection> {
        if self.phase != Phase::DoingQuestion {
            return Err(Rejection::WrongPhase {
                expected: Phase::DoingQuestion,
                actual: self.phase,
            });
        }
        if self.verdicts.contains_key(sender) {
            return Err(Rejection::AlreadyAnswered(sender.clone()));
        }
        let Some(question) = self.question.as_ref() else {
            // DoingQuestion always has an open question; defensive.
            return Err(Rejection::WrongPhase {
                expected: Phase::DoingQuestion,
                actual: self.phase,
            });
        };
        let verdict = question.capability.evaluate(&question.content, response);
        self.verdicts.insert(sender.clone(), verdict);
        Ok(self.answers_complete())
    }

    /// Remove a leaver from the answer expectation. Returns true when
    /// the question should now resolve.
    pub fn drop_expectation(&mut self, player: &PlayerId) -> bool {
        if self.phase != Phase::DoingQuestion {
            return false;
        }
        self.expected.remove(player);
        self.answers_complete()
    }

    /// DoingQuestion → QuestionResult. Returns the verdict for every
    /// currently active player, unanswered counting as false.
    pub fn resolve_question(&mut self, actives: &BTreeSet<PlayerId>) -> Vec<(PlayerId, bool)> {
        let results = actives
            .iter()
            .map(|p| (p.clone(), self.verdicts.get(p).copied().unwrap_or(false)))
            .collect();
        self.verdicts.clear();
        self.expected.clear();
        self.ready.clear();
        self.phase = Phase::QuestionResult;
        results
    }

    /// Record one player's ready signal. Returns true when every active
    /// player is ready (the round should close).
    ///
    /// An empty active set never completes: a frozen room waits for a
    /// join instead of advancing by itself.
    pub fn mark_ready(
        &mut self,
        sender: &PlayerId,
        actives: &BTreeSet<PlayerId>,
    ) -> Result<bool, Rejection> {
        if self.phase != Phase::QuestionResult {
            return Err(Rejection::WrongPhase {
                expected: Phase::QuestionResult,
                actual: self.phase,
            });
        }
        if self.ready.contains(sender) {
            return Err(Rejection::AlreadyReady(sender.clone()));
        }
        self.ready.insert(sender.clone());
        Ok(self.all_ready(actives))
    }

    /// Whether every active player has signalled ready. False for an
    /// empty active set.
    #[must_use]
    pub fn all_ready(&self, actives: &BTreeSet<PlayerId>) -> bool {
        !actives.is_empty() && actives.iter().all(|p| self.ready.contains(p))
    }

    /// Active players that have not signalled ready yet.
    #[must_use]
    pub fn pending_ready(&self, actives: &BTreeSet<PlayerId>) -> Vec<PlayerId> {
        actives
            .iter()
            .filter(|p| !self.ready.contains(*p))
            .cloned()
            .collect()
    }

    /// QuestionResult → GameOver.
    pub fn finish(&mut self) {
        self.question = None;
        self.phase = Phase::GameOver;
    }

    fn answers_complete(&self) -> bool {
        self.expected.iter().all(|p| self.verdicts.contains_key(p))
    }

    fn guard_holder(&self, expected: Phase, sender: &PlayerId) -> Result<(), Rejection> {
        if self.phase != expected {
            return Err(Rejection::WrongPhase {
                expected,
                actual: self.phase,
            });
        }
        if self.holder.as_ref() != Some(sender) {
            return Err(Rejection::NotTurnHolder(sender.clone()));
        }
        Ok(())
    }
}

/// Lexicographically-next active id strictly after `prev`, wrapping;
/// the smallest active id when there is no previous holder.
fn next_holder(prev: Option<&PlayerId>, actives: &BTreeSet<PlayerId>) -> Option<PlayerId> {
    match prev {
        Some(prev) => actives
            .range((Bound::Excluded(prev), Bound::Unbounded))
            .next()
            .or_else(|| actives.iter().next())
            .cloned(),
        None => actives.iter().next().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::QuestionPool;

    struct Always(bool);

    impl QuestionContent for Always {
        fn instantiate(&self, _rng: &mut GameRng) -> serde_json::Value {
            serde_json::json!({ "accepts": self.0 })
        }

        fn evaluate(&self, _instance: &serde_json::Value, _submitted: &serde_json::Value) -> bool {
            self.0
        }
    }

    fn pool() -> QuestionPool {
        let mut pool = QuestionPool::new();
        for (i, cat) in Category::ALL.iter().enumerate() {
            for j in 0..3u32 {
                pool.push(
                    *cat,
                    QuestionId(i as u32 * 10 + j),
                    1.0 / 3.0,
                    Arc::new(Always(true)),
                );
            }
        }
        pool
    }

    fn actives(ids: &[&str]) -> BTreeSet<PlayerId> {
        ids.iter().map(|&id| PlayerId::from(id)).collect()
    }

    fn started_game(ids: &[&str]) -> Game {
        let mut game = Game::new(GameRng::new(42));
        game.start(&actives(ids)).unwrap();
        game
    }

    #[test]
    fn first_holder_is_smallest_id() {
        let game = started_game(&["p2", "p1", "p3"]);
        assert_eq!(game.holder(), Some(&PlayerId::from("p1")));
        assert_eq!(game.phase(), Phase::TurnStarted);
    }

    #[test]
    fn rotation_wraps_lexicographically() {
        let ids = actives(&["p1", "p2", "p3"]);
        let mut game = started_game(&["p1", "p2", "p3"]);
        assert_eq!(game.begin_turn(&ids), Some(PlayerId::from("p2")));
        assert_eq!(game.begin_turn(&ids), Some(PlayerId::from("p3")));
        assert_eq!(game.begin_turn(&ids), Some(PlayerId::from("p1")));
    }

    #[test]
    fn rotation_skips_inactive() {
        let mut game = started_game(&["p1", "p2", "p3"]);
        // p2 gone; next after p1 is p3.
        assert_eq!(
            game.begin_turn(&actives(&["p1", "p3"])),
            Some(PlayerId::from("p3"))
        );
    }

    #[test]
    fn start_outside_lobby_rejected() {
        let mut game = started_game(&["p1"]);
        assert!(matches!(
            game.start(&actives(&["p1"])),
            Err(Rejection::WrongPhase { .. })
        ));
    }

    #[test]
    fn dice_rejected_for_non_holder() {
        let board = Board::standard();
        let mut game = started_game(&["p1", "p2"]);
        assert!(matches!(
            game.throw_dice(&PlayerId::from("p2"), &board),
            Err(Rejection::NotTurnHolder(_))
        ));
        assert_eq!(game.phase(), Phase::TurnStarted, "no state change");
        assert_eq!(game.dice(), None);
    }

    #[test]
    fn dice_moves_to_choosing_tile() {
        let board = Board::standard();
        let mut game = started_game(&["p1", "p2"]);
        let (face, tiles) = game.throw_dice(&PlayerId::from("p1"), &board).unwrap();
        assert!((1..=DIE_FACES).contains(&face));
        assert_eq!(game.phase(), Phase::ChoosingTile);
        assert_eq!(game.dice(), Some(face));
        assert_eq!(tiles, game.reachable_tiles());
        assert!(!tiles.is_empty());
    }

    #[test]
    fn unreachable_tile_rejected() {
        let board = Board::standard();
        let ids = actives(&["p1", "p2"]);
        let mut game = started_game(&["p1", "p2"]);
        game.throw_dice(&PlayerId::from("p1"), &board).unwrap();

        let unreachable = (0..17)
            .map(TileId)
            .find(|t| !game.reachable_tiles().contains(t))
            .unwrap();
        assert!(matches!(
            game.choose_tile(&PlayerId::from("p1"), unreachable, &board, &pool(), &ids),
            Err(Rejection::UnreachableTile(_))
        ));
        assert_eq!(game.phase(), Phase::ChoosingTile, "no state change");
    }

    #[test]
    fn empty_category_rejected_without_state_change() {
        // Every tile is Geometry; the pool only stocks Arithmetic.
        let categories = vec![Category::Geometry; 3];
        let board = Board::new(categories, &[(0, 1), (1, 2), (2, 0)]).unwrap();
        let mut bare = QuestionPool::new();
        bare.push(
            Category::Arithmetic,
            QuestionId(1),
            1.0,
            Arc::new(Always(true)),
        );

        let ids = actives(&["p1"]);
        let mut game = started_game(&["p1"]);
        let (face, tiles) = game.throw_dice(&PlayerId::from("p1"), &board).unwrap();

        assert!(matches!(
            game.choose_tile(&PlayerId::from("p1"), tiles[0], &board, &bare, &ids),
            Err(Rejection::NoQuestion(Category::Geometry))
        ));
        assert_eq!(game.pawn(), TileId::START, "pawn not moved");
        assert_eq!(game.dice(), Some(face), "roll still pending");
        assert_eq!(game.phase(), Phase::ChoosingTile);

        // The same choice goes through once the category has entries.
        let mut stocked = QuestionPool::new();
        stocked.push(
            Category::Geometry,
            QuestionId(2),
            1.0,
            Arc::new(Always(true)),
        );
        let shown = game
            .choose_tile(&PlayerId::from("p1"), tiles[0], &board, &stocked, &ids)
            .unwrap();
        assert_eq!(shown.question, QuestionId(2));
        assert_eq!(game.phase(), Phase::DoingQuestion);
    }

    fn into_question(game: &mut Game, board: &Board, ids: &BTreeSet<PlayerId>) -> ShownQuestion {
        let holder = game.holder().unwrap().clone();
        let (_, tiles) = game.throw_dice(&holder, board).unwrap();
        game.choose_tile(&holder, tiles[0], board, &pool(), ids)
            .unwrap()
    }

    #[test]
    fn choose_tile_opens_question() {
        let board = Board::standard();
        let ids = actives(&["p1", "p2"]);
        let mut game = started_game(&["p1", "p2"]);
        let shown = into_question(&mut game, &board, &ids);

        assert_eq!(game.phase(), Phase::DoingQuestion);
        assert_eq!(game.pawn(), *shown.path.last().unwrap());
        assert_eq!(game.dice(), None, "dice cleared on move");
        assert_eq!(shown.category, board.category(game.pawn()));
        assert_eq!(game.question().unwrap().id, shown.question);
        assert_eq!(game.question_seq(), 1);
    }

    #[test]
    fn question_resolves_when_all_expected_answer() {
        let board = Board::standard();
        let ids = actives(&["p1", "p2"]);
        let mut game = started_game(&["p1", "p2"]);
        into_question(&mut game, &board, &ids);

        let answer = serde_json::json!("whatever");
        assert!(!game.submit_answer(&PlayerId::from("p1"), &answer).unwrap());
        assert!(game.submit_answer(&PlayerId::from("p2"), &answer).unwrap());

        let results = game.resolve_question(&ids);
        assert_eq!(game.phase(), Phase::QuestionResult);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, correct)| *correct));
    }

    #[test]
    fn duplicate_answer_rejected() {
        let board = Board::standard();
        let ids = actives(&["p1", "p2"]);
        let mut game = started_game(&["p1", "p2"]);
        into_question(&mut game, &board, &ids);

        let answer = serde_json::json!("x");
        game.submit_answer(&PlayerId::from("p1"), &answer).unwrap();
        assert!(matches!(
            game.submit_answer(&PlayerId::from("p1"), &answer),
            Err(Rejection::AlreadyAnswered(_))
        ));
    }

    #[test]
    fn unanswered_counts_as_false() {
        let board = Board::standard();
        let ids = actives(&["p1", "p2"]);
        let mut game = started_game(&["p1", "p2"]);
        into_question(&mut game, &board, &ids);

        // Timer fires with p2 silent.
        let results = game.resolve_question(&ids);
        let p2 = results
            .iter()
            .find(|(p, _)| p == &PlayerId::from("p2"))
            .unwrap();
        assert!(!p2.1);
    }

    #[test]
    fn late_joiner_never_blocks_completion() {
        let board = Board::standard();
        let ids = actives(&["p1", "p2"]);
        let mut game = started_game(&["p1", "p2"]);
        into_question(&mut game, &board, &ids);

        // p3 reconnects mid-question: active now, but not expected.
        let with_p3 = actives(&["p1", "p2", "p3"]);
        let answer = serde_json::json!("x");
        game.submit_answer(&PlayerId::from("p1"), &answer).unwrap();
        let complete = game.submit_answer(&PlayerId::from("p2"), &answer).unwrap();
        assert!(complete, "p3 does not block resolution");

        let results = game.resolve_question(&with_p3);
        assert_eq!(results.len(), 3, "p3 still gets a verdict");
    }

    #[test]
    fn leaver_unblocks_completion() {
        let board = Board::standard();
        let ids = actives(&["p1", "p2"]);
        let mut game = started_game(&["p1", "p2"]);
        into_question(&mut game, &board, &ids);

        let answer = serde_json::json!("x");
        game.submit_answer(&PlayerId::from("p1"), &answer).unwrap();
        assert!(game.drop_expectation(&PlayerId::from("p2")));
    }

    #[test]
    fn readiness_completes_only_with_all_actives() {
        let board = Board::standard();
        let ids = actives(&["p1", "p2"]);
        let mut game = started_game(&["p1", "p2"]);
        into_question(&mut game, &board, &ids);
        game.resolve_question(&ids);

        assert!(!game.mark_ready(&PlayerId::from("p1"), &ids).unwrap());
        assert_eq!(game.pending_ready(&ids), vec![PlayerId::from("p2")]);
        assert!(game.mark_ready(&PlayerId::from("p2"), &ids).unwrap());
        assert!(matches!(
            game.mark_ready(&PlayerId::from("p2"), &ids),
            Err(Rejection::AlreadyReady(_))
        ));
    }

    #[test]
    fn empty_active_set_never_completes_readiness() {
        let board = Board::standard();
        let ids = actives(&["p1"]);
        let mut game = started_game(&["p1"]);
        into_question(&mut game, &board, &ids);
        game.resolve_question(&ids);

        assert!(!game.all_ready(&BTreeSet::new()), "frozen room stays put");
    }

    #[test]
    fn new_turn_clears_bookkeeping() {
        let board = Board::standard();
        let ids = actives(&["p1", "p2"]);
        let mut game = started_game(&["p1", "p2"]);
        into_question(&mut game, &board, &ids);
        game.submit_answer(&PlayerId::from("p1"), &serde_json::json!("x"))
            .unwrap();
        game.resolve_question(&ids);
        game.mark_ready(&PlayerId::from("p1"), &ids).unwrap();

        game.begin_turn(&ids);
        assert_eq!(game.phase(), Phase::TurnStarted);
        assert!(game.question().is_none());
        assert!(game.pending_ready(&ids).len() == 2, "ready set cleared");
    }

    #[test]
    fn seen_questions_not_redrawn_until_exhausted() {
        let board = Board::standard();
        let ids = actives(&["p1"]);
        let mut game = started_game(&["p1"]);

        let mut drawn: Vec<QuestionId> = Vec::new();
        // 3 questions per category and ids unique across categories, so
        // the first 3 draws can never contain a repeat.
        for _ in 0..3 {
            let shown = into_question(&mut game, &board, &ids);
            drawn.push(shown.question);
            game.resolve_question(&ids);
            game.mark_ready(&PlayerId::from("p1"), &ids).unwrap();
            game.begin_turn(&ids);
        }
        let mut unique = drawn.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), drawn.len(), "no repeats before exhaustion");
    }
}
