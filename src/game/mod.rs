//! Game state: phases, options, and the turn state machine.
//!
//! ## Modules
//!
//! - `machine`: the [`Game`] state machine itself
//!
//! The types here are the immutable configuration surrounding it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::questions::QuestionPool;

pub mod machine;

pub use machine::{Game, Rejection, ShownQuestion};

/// Faces on the game die. Rolls are uniform in `1..=DIE_FACES`.
pub const DIE_FACES: u8 = 3;

/// Current step of the room's state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Waiting for players; the only phase that accepts unknown joins.
    Lobby,
    /// A turn holder is chosen and may roll the die.
    TurnStarted,
    /// Die rolled; the holder picks a reachable tile.
    ChoosingTile,
    /// A question is open; active players answer.
    DoingQuestion,
    /// Verdicts are out; active players signal readiness.
    QuestionResult,
    /// Terminal: winners found, stream ended naturally.
    GameOver,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Lobby => "lobby",
            Phase::TurnStarted => "turnStarted",
            Phase::ChoosingTile => "choosingTile",
            Phase::DoingQuestion => "doingQuestion",
            Phase::QuestionResult => "questionResult",
            Phase::GameOver => "gameOver",
        };
        f.write_str(name)
    }
}

/// How the game leaves the lobby.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Launch {
    /// An explicit `start_game` call launches (requires at least one
    /// player).
    Manual,
    /// The game launches by itself when the roster reaches `players`;
    /// the roster is also capped at that size.
    Automatic {
        /// Launch target and roster cap.
        players: usize,
    },
}

/// Immutable per-room configuration.
#[derive(Clone, Debug)]
pub struct Options {
    /// The board to play on.
    pub board: Board,
    /// Question pool, one weighted set per category.
    pub pool: QuestionPool,
    /// Launch strategy.
    pub launch: Launch,
    /// Answer window per question.
    pub question_timeout: Duration,
    /// Whether to compute per-player remedial lists at game end.
    pub compute_remedial: bool,
    /// Coarse bound on the room's lifetime; firing behaves like an
    /// explicit terminate.
    pub session_timeout: Duration,
    /// RNG seed; a seeded room replays deterministically. Entropy when
    /// unset.
    pub seed: Option<u64>,
}

impl Options {
    /// Options with defaults: manual launch, 30 s questions, remedial
    /// lists on, 2 h session bound, entropy seed.
    #[must_use]
    pub fn new(board: Board, pool: QuestionPool) -> Self {
        Self {
            board,
            pool,
            launch: Launch::Manual,
            question_timeout: Duration::from_secs(30),
            compute_remedial: true,
            session_timeout: Duration::from_secs(2 * 60 * 60),
            seed: None,
        }
    }

    /// Set the launch strategy.
    #[must_use]
    pub fn with_launch(mut self, launch: Launch) -> Self {
        self.launch = launch;
        self
    }

    /// Set the per-question answer window.
    #[must_use]
    pub fn with_question_timeout(mut self, timeout: Duration) -> Self {
        self.question_timeout = timeout;
        self
    }

    /// Enable or disable end-of-game remedial lists.
    #[must_use]
    pub fn with_remedial(mut self, compute: bool) -> Self {
        self.compute_remedial = compute;
        self
    }

    /// Set the session lifetime bound.
    #[must_use]
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Pin the RNG seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Roster cap, when the launch strategy imposes one.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        match self.launch {
            Launch::Manual => None,
            Launch::Automatic { players } => Some(players),
        }
    }
}
