//! Protocol vocabulary: server/client events and derived read views.
//!
//! Both event sets are closed tagged unions, matched exhaustively at
//! compile time. Every server event is broadcast wrapped in an
//! [`Envelope`] carrying a full [`Snapshot`], so a client can always
//! re-render from the latest message alone.

use std::collections::BTreeMap;

use im::Vector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::TileId;
use crate::core::{Category, PlayerId, ReviewEntry, CATEGORY_COUNT};
use crate::game::Phase;
use crate::questions::QuestionId;
use crate::scoring::RewardNotice;

/// Per-player roster line inside a snapshot or lobby update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Stable identifier.
    pub id: PlayerId,
    /// Display pseudo.
    pub pseudo: String,
    /// Whether the player currently holds a connection.
    pub connected: bool,
    /// Per-category success flags.
    pub success: [bool; CATEGORY_COUNT],
}

/// The question currently shown, as clients see it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    /// External question id.
    pub question: QuestionId,
    /// Category of the landing tile.
    pub category: Category,
    /// Answer window in seconds.
    pub timeout_secs: u64,
    /// Instantiated content, forwarded verbatim from the pool.
    pub content: serde_json::Value,
}

/// Per-player outcome of a resolved question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    /// The player this verdict belongs to.
    pub player: PlayerId,
    /// Recorded verdict (unanswered counts as false).
    pub correct: bool,
    /// Whether the player may still flag this question for remedial
    /// review (failing players under the mark cap only).
    pub may_flag: bool,
}

/// Full state as of one processed event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Current phase.
    pub phase: Phase,
    /// Pawn position.
    pub pawn: TileId,
    /// Current turn holder, if any.
    pub turn_holder: Option<PlayerId>,
    /// Last dice roll, if a tile choice is pending.
    pub dice: Option<u8>,
    /// Roster ordered by player id.
    pub players: Vec<PlayerView>,
    /// Question being played, if any.
    pub question: Option<QuestionView>,
}

/// One broadcast: the event plus the snapshot it resulted in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// What happened.
    pub event: ServerEvent,
    /// State exactly as of this event.
    pub snapshot: Snapshot,
}

/// Server-emitted events. Closed set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A new player entered the lobby.
    PlayerJoined { player: PlayerId, pseudo: String },
    /// A known player reattached a connection.
    PlayerReconnected { player: PlayerId, pseudo: String },
    /// Roster change while in the lobby.
    LobbyUpdate {
        roster: Vec<PlayerView>,
        changed: PlayerId,
    },
    /// The game left the lobby.
    GameStart,
    /// A player's connection went away.
    PlayerLeft { player: PlayerId },
    /// Next turn holder.
    PlayerTurn { player: PlayerId },
    /// Die face sampled for the current turn.
    DiceThrown { face: u8 },
    /// Pawn moved along `path` to `destination`.
    Move {
        destination: TileId,
        path: Vec<TileId>,
    },
    /// Tiles the turn holder may move to.
    PossibleMoves { tiles: Vec<TileId> },
    /// A question opened for everyone.
    ShowQuestion {
        timeout_secs: u64,
        category: Category,
        question: QuestionId,
        content: serde_json::Value,
    },
    /// Verdicts for a resolved question.
    PlayerAnswerResults {
        results: Vec<AnswerResult>,
        rewards: Vec<RewardNotice>,
    },
    /// Players that have not signalled ready for the next turn.
    PlayersStillPending { pending: Vec<PlayerId> },
    /// Natural end of the game.
    GameEnd {
        winners: Vec<PlayerId>,
        remedial: BTreeMap<PlayerId, Vec<QuestionId>>,
        rewards: Vec<RewardNotice>,
    },
    /// Forced end of the room; no natural replay follows.
    GameTerminated,
}

/// Client-sent events. Closed set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Move the pawn to a reachable tile.
    Move { destination: TileId },
    /// Submit an answer to the open question.
    Answer { response: serde_json::Value },
    /// Request a dice roll.
    DiceClick,
    /// Signal readiness for the next turn, optionally flagging the
    /// just-resolved question for remedial review.
    WantNextTurn {
        #[serde(default)]
        mark_question: bool,
    },
    /// Keep-alive, ignored by the worker.
    Ping,
}

/// Monitoring view, readable at any time without disturbing the stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Current turn holder.
    pub turn_holder: Option<PlayerId>,
    /// Per-player success flags.
    pub players: BTreeMap<PlayerId, [bool; CATEGORY_COUNT]>,
    /// Currently connected player count.
    pub occupancy: usize,
    /// Maximum roster size (automatic launch mode only).
    pub capacity: Option<usize>,
    /// Metadata of the latest question, if one is open.
    pub question: Option<QuestionMeta>,
}

/// Latest-question metadata inside a [`Summary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionMeta {
    /// External question id.
    pub question: QuestionId,
    /// Category it was drawn for.
    pub category: Category,
}

/// End-of-game record handed to the caller for downstream scoring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replay {
    /// The room this replay belongs to.
    pub room: Uuid,
    /// Per-player question review, in play order.
    pub reviews: BTreeMap<PlayerId, Vector<ReviewEntry>>,
}
