//! # quizboard
//!
//! Real-time engine for one instance of a multiplayer trivia-board
//! game room: a shared pawn on a 17-tile board, a randomized question
//! on every landing, and a win for the first players to succeed in all
//! five categories.
//!
//! ## Design Principles
//!
//! 1. **One worker per room**: every game-mutating event funnels into a
//!    single tokio task, so the state machine needs no internal locking
//!    and broadcasts are totally ordered.
//!
//! 2. **Defensive transitions**: client input that does not fit the
//!    current phase or sender is rejected and logged, never fatal.
//!
//! 3. **Opaque collaborators**: question content instantiation and
//!    answer evaluation, transport delivery, and reward scoring are
//!    trait capabilities supplied by the caller.
//!
//! 4. **Deterministic when seeded**: die faces and question draws flow
//!    through one ChaCha8 stream; a seeded room replays identically for
//!    the same event order.
//!
//! ## Modules
//!
//! - `core`: player identity, per-player advance, categories, RNG
//! - `board`: static tile graph and the reachable-tile path search
//! - `questions`: weighted, repeat-avoiding question pools
//! - `game`: the phase state machine and room options
//! - `room`: the concurrency coordinator and its public surface
//! - `protocol`: closed server/client event vocabularies and read views
//! - `scoring`: the external success handler seam

pub mod board;
pub mod core;
pub mod game;
pub mod protocol;
pub mod questions;
pub mod room;
pub mod scoring;

// Re-export commonly used types
pub use crate::core::{Advance, Category, GameRng, Player, PlayerId, ReviewEntry, CATEGORY_COUNT};

pub use crate::board::{Board, BoardError, TileId, TilePath, STANDARD_TILE_COUNT};

pub use crate::questions::{QuestionContent, QuestionEntry, QuestionId, QuestionPool};

pub use crate::game::{Game, Launch, Options, Phase, Rejection, DIE_FACES};

pub use crate::protocol::{
    AnswerResult, ClientEvent, Envelope, PlayerView, QuestionMeta, QuestionView, Replay,
    ServerEvent, Snapshot, Summary,
};

pub use crate::room::{
    Connection, ConnectionError, JoinError, OutcomeError, Room, RoomOutcome, StartError,
};

pub use crate::scoring::{NoopScoring, RewardNotice, ScoringError, SuccessHandler};
