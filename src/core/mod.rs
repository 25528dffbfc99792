//! Core types: categories, players, per-player advance, RNG.
//!
//! These are the building blocks shared by the board, the state machine
//! and the room coordinator.

pub mod category;
pub mod player;
pub mod rng;

pub use category::{Category, CATEGORY_COUNT};
pub use player::{Advance, Player, PlayerId, ReviewEntry, MAX_MARKED};
pub use rng::GameRng;
