//! Scoring glue: the external success handler.
//!
//! The room invokes the handler synchronously when a player's answer is
//! scored and when a player wins. The returned payload, if any, is
//! folded into the next broadcast as a [`RewardNotice`]. A failing call
//! is logged by the worker and the notice simply omitted; it never
//! touches game state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Player, PlayerId};

/// A serializable reward produced by the success handler, attached to
/// the broadcast that follows its cause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardNotice {
    /// The rewarded player.
    pub player: PlayerId,
    /// Handler-defined payload, forwarded verbatim.
    pub payload: serde_json::Value,
}

/// Failure reported by a success handler call.
#[derive(Debug, Error)]
#[error("success handler failed: {0}")]
pub struct ScoringError(pub String);

/// External collaborator scoring question resolutions and wins.
pub trait SuccessHandler: Send + Sync {
    /// Called once per active player when a question resolves.
    ///
    /// `streak3` is true when this verdict completes three consecutive
    /// correct answers for the player.
    fn on_question(
        &self,
        player: &Player,
        correct: bool,
        streak3: bool,
    ) -> Result<Option<serde_json::Value>, ScoringError>;

    /// Called once per winner when the game ends naturally.
    fn on_win(&self, player: &Player) -> Result<Option<serde_json::Value>, ScoringError>;
}

/// Handler that never produces rewards. Useful for tests and rooms
/// without a progression backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopScoring;

impl SuccessHandler for NoopScoring {
    fn on_question(
        &self,
        _player: &Player,
        _correct: bool,
        _streak3: bool,
    ) -> Result<Option<serde_json::Value>, ScoringError> {
        Ok(None)
    }

    fn on_win(&self, _player: &Player) -> Result<Option<serde_json::Value>, ScoringError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_produces_nothing() {
        let player = Player::new("p1", "Ada");
        let handler = NoopScoring;
        assert!(handler.on_question(&player, true, false).unwrap().is_none());
        assert!(handler.on_win(&player).unwrap().is_none());
    }
}
