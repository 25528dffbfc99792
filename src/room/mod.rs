//! The room: concurrency coordinator for one game.
//!
//! Exactly one tokio task (the worker, see `worker`) processes every
//! game-mutating event, serializing all writes to the [`Game`] and the
//! seat table. Four trigger sources feed it: a terminate signal, the
//! leave queue, the client-action queue, and the per-question timer;
//! the coarse session timeout rides along as a fifth.
//!
//! [`Room::join`] and [`Room::summary`] are the side doors: both take
//! the seat-table mutex that the worker also takes for its roster
//! reads, so a join re-checks the started flag synchronously and a
//! summary never observes a half-applied event.
//!
//! [`Game`]: crate::game::Game

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::{Advance, GameRng, Player, PlayerId};
use crate::game::{Launch, Options};
use crate::protocol::{ClientEvent, Envelope, QuestionMeta, Replay, Summary};
use crate::scoring::SuccessHandler;

mod worker;

/// Transport capability: deliver one structured message to a player.
///
/// The transport serializes writes per connection on its own (at most
/// one in-flight write). A failed delivery is only logged by the room;
/// it never marks the player disconnected.
pub trait Connection: Send + Sync {
    /// Deliver a broadcast envelope to this player.
    fn deliver(&self, envelope: &Envelope) -> Result<(), ConnectionError>;
}

/// Delivery failure reported by a [`Connection`].
#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct ConnectionError(pub String);

/// Synchronous join failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    /// Unknown player joining outside the lobby.
    #[error("game already started")]
    AlreadyStarted,
    /// Automatic mode roster cap reached.
    #[error("room is full")]
    RoomFull,
    /// The worker has already exited.
    #[error("room is closed")]
    RoomClosed,
}

/// Synchronous manual-start failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    /// `start_game` on an automatic-launch room.
    #[error("wrong launch mode")]
    WrongLaunchMode,
    /// No player present.
    #[error("no players present")]
    NoPlayers,
    /// The game already left the lobby.
    #[error("game already started")]
    AlreadyStarted,
    /// The worker has already exited.
    #[error("room is closed")]
    RoomClosed,
}

/// The worker exited abnormally (panic or runtime shutdown).
#[derive(Debug, Error)]
#[error("room worker aborted")]
pub struct OutcomeError;

/// Terminal result of the room's event loop.
#[derive(Clone, Debug)]
pub struct RoomOutcome {
    /// Question history for downstream scoring; built for both exit
    /// paths.
    pub replay: Replay,
    /// True when the game reached `GameOver` by play, false for
    /// terminate and session timeout.
    pub natural: bool,
}

/// One roster slot: player, transport handle, progression.
pub(crate) struct Seat {
    pub player: Player,
    /// None while disconnected; the seat itself is retained.
    pub conn: Option<Arc<dyn Connection>>,
    pub advance: Advance,
}

/// Shared seat table plus the worker-published monitoring fields.
pub(crate) struct Table {
    pub seats: BTreeMap<PlayerId, Seat>,
    /// Set under the lock by `join` (automatic launch) or `start_game`;
    /// re-checked by both.
    pub started: bool,
    pub turn_holder: Option<PlayerId>,
    pub question: Option<QuestionMeta>,
}

impl Table {
    fn new() -> Self {
        Self {
            seats: BTreeMap::new(),
            started: false,
            turn_holder: None,
            question: None,
        }
    }

    pub fn actives(&self) -> BTreeSet<PlayerId> {
        self.seats
            .iter()
            .filter(|(_, seat)| seat.conn.is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.seats.values().filter(|s| s.conn.is_some()).count()
    }
}

/// Messages on the worker's client-action queue.
pub(crate) enum RoomMsg {
    /// A join was applied to the table; announce it.
    Joined { player: PlayerId, reconnect: bool },
    /// A manual start was validated; run the transition.
    StartRequested,
    /// A validated client action with sender identity.
    Client {
        sender: PlayerId,
        event: ClientEvent,
    },
}

/// Handle to one running room.
pub struct Room {
    id: Uuid,
    options: Arc<Options>,
    table: Arc<Mutex<Table>>,
    cmd_tx: mpsc::Sender<RoomMsg>,
    leave_tx: mpsc::Sender<PlayerId>,
    term_tx: watch::Sender<bool>,
    task: JoinHandle<RoomOutcome>,
}

impl Room {
    /// Spawn a room worker and return its handle.
    #[must_use]
    pub fn spawn(options: Options, scoring: Arc<dyn SuccessHandler>) -> Self {
        let id = Uuid::new_v4();
        let options = Arc::new(options);
        let table = Arc::new(Mutex::new(Table::new()));

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (leave_tx, leave_rx) = mpsc::channel(64);
        let (term_tx, term_rx) = watch::channel(false);
        let (timer_tx, timer_rx) = mpsc::channel(4);

        let rng = match options.seed {
            Some(seed) => GameRng::new(seed),
            None => GameRng::from_entropy(),
        };

        let worker = worker::Worker::new(
            id,
            Arc::clone(&options),
            Arc::clone(&table),
            scoring,
            timer_tx,
            rng,
        );
        let span = tracing::info_span!("room", id = %id);
        let task = tokio::spawn(worker.run(cmd_rx, leave_rx, term_rx, timer_rx).instrument(span));

        Self {
            id,
            options,
            table,
            cmd_tx,
            leave_tx,
            term_tx,
            task,
        }
    }

    /// Room identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Read-only room configuration.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Join a fresh connection or reconnection.
    ///
    /// The table mutation and its validation happen synchronously under
    /// the seat-table lock; the worker then announces the join to
    /// everyone. An unknown player is rejected once the game has left
    /// the lobby; automatic mode additionally caps the roster.
    pub async fn join(
        &self,
        player: Player,
        conn: Arc<dyn Connection>,
    ) -> Result<(), JoinError> {
        let id = player.id.clone();
        let reconnect = {
            let mut table = lock(&self.table);
            let reconnect = match table.seats.get_mut(&id) {
                Some(seat) => {
                    seat.player.pseudo = player.pseudo;
                    seat.conn = Some(conn);
                    true
                }
                None => {
                    if table.started {
                        return Err(JoinError::AlreadyStarted);
                    }
                    if let Some(max) = self.options.capacity() {
                        if table.seats.len() >= max {
                            return Err(JoinError::RoomFull);
                        }
                    }
                    table.seats.insert(
                        id.clone(),
                        Seat {
                            player,
                            conn: Some(conn),
                            advance: Advance::default(),
                        },
                    );
                    false
                }
            };
            // Automatic launch: flag flipped under the same lock that
            // rejects racing unknown joins.
            if !table.started {
                if let Some(target) = self.options.capacity() {
                    if table.active_count() >= target {
                        table.started = true;
                    }
                }
            }
            reconnect
        };

        self.cmd_tx
            .send(RoomMsg::Joined { player: id, reconnect })
            .await
            .map_err(|_| JoinError::RoomClosed)
    }

    /// Launch a manual-mode game. Requires at least one player.
    pub async fn start_game(&self) -> Result<(), StartError> {
        {
            let mut table = lock(&self.table);
            if self.options.launch != Launch::Manual {
                return Err(StartError::WrongLaunchMode);
            }
            if table.started {
                return Err(StartError::AlreadyStarted);
            }
            if table.active_count() == 0 {
                return Err(StartError::NoPlayers);
            }
            table.started = true;
        }
        self.cmd_tx
            .send(RoomMsg::StartRequested)
            .await
            .map_err(|_| StartError::RoomClosed)
    }

    /// Submit a client action. Blocks while the worker is busy.
    pub async fn client_event(&self, sender: PlayerId, event: ClientEvent) {
        if self.cmd_tx.send(RoomMsg::Client { sender, event }).await.is_err() {
            tracing::debug!("client event dropped, room closed");
        }
    }

    /// Notify that a player's connection went away.
    pub async fn leave(&self, player: PlayerId) {
        if self.leave_tx.send(player).await.is_err() {
            tracing::debug!("leave notice dropped, room closed");
        }
    }

    /// Force the room to end. The worker broadcasts `gameTerminated`
    /// and exits without a natural replay.
    pub fn terminate(&self) {
        let _ = self.term_tx.send(true);
    }

    /// Monitoring view; safe at any time, never disturbs the stream.
    #[must_use]
    pub fn summary(&self) -> Summary {
        let table = lock(&self.table);
        Summary {
            turn_holder: table.turn_holder.clone(),
            players: table
                .seats
                .iter()
                .map(|(id, seat)| (id.clone(), seat.advance.success))
                .collect(),
            occupancy: table.active_count(),
            capacity: self.options.capacity(),
            question: table.question,
        }
    }

    /// Wait for the loop's terminal result.
    pub async fn outcome(self) -> Result<RoomOutcome, OutcomeError> {
        self.task.await.map_err(|_| OutcomeError)
    }
}

/// Lock the seat table, recovering from poisoning: the table holds no
/// invariants a panicked writer could break halfway.
pub(crate) fn lock(table: &Mutex<Table>) -> MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
