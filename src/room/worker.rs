//! The room worker: one task owning the game state machine.
//!
//! The worker selects over its trigger sources and applies one event at
//! a time; every broadcast reflects state exactly as of the event just
//! processed. Protocol violations come back from the machine as
//! [`Rejection`]s and are logged, never broadcast.
//!
//! The per-question timer is itself an event source: arming spawns a
//! sleeper that posts the question's sequence number into the timer
//! channel, and a stale sequence (question already closed) is drained
//! silently.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{lock, RoomMsg, RoomOutcome, Table};
use crate::board::TileId;
use crate::core::{GameRng, Player, PlayerId};
use crate::game::{Game, Options, Phase, Rejection};
use crate::protocol::{
    AnswerResult, ClientEvent, Envelope, PlayerView, QuestionMeta, QuestionView, Replay,
    ServerEvent, Snapshot,
};
use crate::scoring::{RewardNotice, SuccessHandler};

pub(crate) struct Worker {
    room_id: Uuid,
    options: Arc<Options>,
    table: Arc<Mutex<Table>>,
    scoring: Arc<dyn SuccessHandler>,
    game: Game,
    timer_tx: mpsc::Sender<u64>,
    timer_cancel: Option<watch::Sender<bool>>,
    /// True while the game is underway with zero active players. Only
    /// the join that clears it opens a fresh turn, so several rejoins
    /// committing before the first notice is processed still unfreeze
    /// exactly once.
    frozen: bool,
}

impl Worker {
    pub fn new(
        room_id: Uuid,
        options: Arc<Options>,
        table: Arc<Mutex<Table>>,
        scoring: Arc<dyn SuccessHandler>,
        timer_tx: mpsc::Sender<u64>,
        rng: GameRng,
    ) -> Self {
        Self {
            room_id,
            options,
            table,
            scoring,
            game: Game::new(rng),
            timer_tx,
            timer_cancel: None,
            frozen: false,
        }
    }

    /// The serialized event loop. Returns the terminal result.
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<RoomMsg>,
        mut leave_rx: mpsc::Receiver<PlayerId>,
        mut term_rx: watch::Receiver<bool>,
        mut timer_rx: mpsc::Receiver<u64>,
    ) -> RoomOutcome {
        let session = tokio::time::sleep(self.options.session_timeout);
        tokio::pin!(session);

        loop {
            tokio::select! {
                _ = term_rx.changed() => {
                    info!("room terminated");
                    self.broadcast(ServerEvent::GameTerminated);
                    return self.outcome(false);
                }
                () = &mut session => {
                    warn!("session timeout reached");
                    self.broadcast(ServerEvent::GameTerminated);
                    return self.outcome(false);
                }
                notice = leave_rx.recv() => match notice {
                    Some(player) => self.handle_leave(player),
                    // Handle dropped: exit quietly.
                    None => return self.outcome(false),
                },
                msg = cmd_rx.recv() => match msg {
                    Some(msg) => self.handle_msg(msg),
                    None => return self.outcome(false),
                },
                Some(seq) = timer_rx.recv() => self.handle_timeout(seq),
            }

            if self.game.phase() == Phase::GameOver {
                info!("game over");
                return self.outcome(true);
            }
        }
    }

    fn handle_msg(&mut self, msg: RoomMsg) {
        match msg {
            RoomMsg::Joined { player, reconnect } => self.handle_joined(&player, reconnect),
            RoomMsg::StartRequested => self.launch(),
            RoomMsg::Client { sender, event } => self.handle_client(&sender, event),
        }
    }

    fn handle_joined(&mut self, player: &PlayerId, reconnect: bool) {
        let (pseudo, actives, started) = {
            let table = lock(&self.table);
            let pseudo = table
                .seats
                .get(player)
                .map(|s| s.player.pseudo.clone())
                .unwrap_or_default();
            (pseudo, table.actives(), table.started)
        };
        info!(player = %player, reconnect, "player joined");

        let event = if reconnect {
            ServerEvent::PlayerReconnected {
                player: player.clone(),
                pseudo,
            }
        } else {
            ServerEvent::PlayerJoined {
                player: player.clone(),
                pseudo,
            }
        };
        self.broadcast(event);

        match self.game.phase() {
            Phase::Lobby => {
                self.broadcast(ServerEvent::LobbyUpdate {
                    roster: self.roster(),
                    changed: player.clone(),
                });
                if started {
                    self.launch();
                }
            }
            Phase::GameOver => {}
            _ => {
                // A join into a frozen room opens exactly one fresh
                // turn; next_turn clears the flag.
                if self.frozen {
                    self.next_turn(&actives);
                }
            }
        }
    }

    /// Lobby → TurnStarted, for both launch modes.
    fn launch(&mut self) {
        let actives = self.actives();
        match self.game.start(&actives) {
            Ok(holder) => {
                info!(holder = %holder, "game started");
                self.publish_holder(Some(&holder));
                self.broadcast(ServerEvent::GameStart);
                self.broadcast(ServerEvent::PlayerTurn { player: holder });
            }
            Err(rejection) => warn!(%rejection, "start rejected"),
        }
    }

    fn handle_client(&mut self, sender: &PlayerId, event: ClientEvent) {
        let active = lock(&self.table)
            .seats
            .get(sender)
            .is_some_and(|s| s.conn.is_some());
        if !active {
            warn!(sender = %sender, "event from unknown or disconnected player");
            return;
        }

        match event {
            ClientEvent::Ping => {}
            ClientEvent::DiceClick => self.on_dice_click(sender),
            ClientEvent::Move { destination } => self.on_move(sender, destination),
            ClientEvent::Answer { response } => self.on_answer(sender, &response),
            ClientEvent::WantNextTurn { mark_question } => {
                self.on_want_next_turn(sender, mark_question);
            }
        }
    }

    fn on_dice_click(&mut self, sender: &PlayerId) {
        match self.game.throw_dice(sender, &self.options.board) {
            Ok((face, tiles)) => {
                self.broadcast(ServerEvent::DiceThrown { face });
                self.broadcast(ServerEvent::PossibleMoves { tiles });
            }
            Err(rejection) => self.reject(sender, &rejection),
        }
    }

    fn on_move(&mut self, sender: &PlayerId, destination: TileId) {
        let actives = self.actives();
        match self.game.choose_tile(
            sender,
            destination,
            &self.options.board,
            &self.options.pool,
            &actives,
        ) {
            Ok(shown) => {
                self.publish_question(QuestionMeta {
                    question: shown.question,
                    category: shown.category,
                });
                self.broadcast(ServerEvent::Move {
                    destination,
                    path: shown.path.to_vec(),
                });
                self.broadcast(ServerEvent::ShowQuestion {
                    timeout_secs: self.options.question_timeout.as_secs(),
                    category: shown.category,
                    question: shown.question,
                    content: shown.content,
                });
                self.arm_timer();
            }
            Err(rejection) => self.reject(sender, &rejection),
        }
    }

    fn on_answer(&mut self, sender: &PlayerId, response: &serde_json::Value) {
        match self.game.submit_answer(sender, response) {
            Ok(true) => self.resolve_question(),
            Ok(false) => {}
            Err(rejection) => self.reject(sender, &rejection),
        }
    }

    fn on_want_next_turn(&mut self, sender: &PlayerId, mark_question: bool) {
        if mark_question {
            self.try_mark(sender);
        }
        let actives = self.actives();
        match self.game.mark_ready(sender, &actives) {
            Ok(true) => self.close_round(),
            Ok(false) => {
                let pending = self.game.pending_ready(&actives);
                self.broadcast(ServerEvent::PlayersStillPending { pending });
            }
            Err(rejection) => self.reject(sender, &rejection),
        }
    }

    /// Flag the just-resolved question for remedial review. Only a
    /// player who failed it, under the mark cap, may do so.
    fn try_mark(&mut self, sender: &PlayerId) {
        if self.game.phase() != Phase::QuestionResult {
            debug!(sender = %sender, "flag outside question result ignored");
            return;
        }
        let Some(question) = self.game.question().map(|q| q.id) else {
            debug!(sender = %sender, "flag with no question ignored");
            return;
        };
        let mut table = lock(&self.table);
        let Some(seat) = table.seats.get_mut(sender) else {
            return;
        };
        let failed_it = seat
            .advance
            .review
            .last()
            .is_some_and(|e| e.question == question && !e.correct);
        if failed_it && seat.advance.mark(question) {
            debug!(sender = %sender, %question, "question marked for remedial review");
        } else {
            debug!(sender = %sender, %question, "ineligible flag ignored");
        }
    }

    /// DoingQuestion → QuestionResult, whether by last answer, timer,
    /// or last expected player leaving.
    fn resolve_question(&mut self) {
        self.stop_timer();
        let actives = self.actives();
        let Some((question, category)) = self.game.question().map(|q| (q.id, q.category)) else {
            warn!("resolve with no open question");
            return;
        };
        let verdicts = self.game.resolve_question(&actives);

        let mut results = Vec::with_capacity(verdicts.len());
        let mut scored: Vec<(Player, bool, bool)> = Vec::with_capacity(verdicts.len());
        {
            let mut table = lock(&self.table);
            for (player, correct) in &verdicts {
                let Some(seat) = table.seats.get_mut(player) else {
                    continue;
                };
                seat.advance.record(question, category, *correct);
                results.push(AnswerResult {
                    player: player.clone(),
                    correct: *correct,
                    may_flag: !correct && seat.advance.can_mark(),
                });
                scored.push((seat.player.clone(), *correct, seat.advance.streak(3)));
            }
        }

        let mut rewards = Vec::new();
        for (player, correct, streak3) in scored {
            match self.scoring.on_question(&player, correct, streak3) {
                Ok(Some(payload)) => rewards.push(RewardNotice {
                    player: player.id,
                    payload,
                }),
                Ok(None) => {}
                Err(error) => warn!(player = %player.id, %error, "success handler failed"),
            }
        }

        self.broadcast(ServerEvent::PlayerAnswerResults { results, rewards });
    }

    /// QuestionResult → TurnStarted or GameOver, once everyone active
    /// is ready.
    fn close_round(&mut self) {
        let winners: Vec<PlayerId> = {
            let table = lock(&self.table);
            table
                .seats
                .iter()
                .filter(|(_, seat)| seat.advance.is_done())
                .map(|(id, _)| id.clone())
                .collect()
        };

        if winners.is_empty() {
            let actives = self.actives();
            self.next_turn(&actives);
            return;
        }

        let (remedial, winner_players) = {
            let table = lock(&self.table);
            let remedial = if self.options.compute_remedial {
                table
                    .seats
                    .iter()
                    .map(|(id, seat)| (id.clone(), seat.advance.remedial()))
                    .filter(|(_, picks)| !picks.is_empty())
                    .collect()
            } else {
                Default::default()
            };
            let winner_players: Vec<Player> = winners
                .iter()
                .filter_map(|id| table.seats.get(id).map(|s| s.player.clone()))
                .collect();
            (remedial, winner_players)
        };

        let mut rewards = Vec::new();
        for player in winner_players {
            match self.scoring.on_win(&player) {
                Ok(Some(payload)) => rewards.push(RewardNotice {
                    player: player.id,
                    payload,
                }),
                Ok(None) => {}
                Err(error) => warn!(player = %player.id, %error, "success handler failed"),
            }
        }

        info!(?winners, "game won");
        self.game.finish();
        self.publish_holder(None);
        self.broadcast(ServerEvent::GameEnd {
            winners,
            remedial,
            rewards,
        });
    }

    fn handle_leave(&mut self, player: PlayerId) {
        let was_connected = {
            let mut table = lock(&self.table);
            table
                .seats
                .get_mut(&player)
                .and_then(|seat| seat.conn.take())
                .is_some()
        };
        if !was_connected {
            debug!(player = %player, "leave for unknown or already disconnected player");
            return;
        }
        info!(player = %player, "player left");
        self.broadcast(ServerEvent::PlayerLeft {
            player: player.clone(),
        });

        let actives = self.actives();
        match self.game.phase() {
            Phase::Lobby => {
                self.broadcast(ServerEvent::LobbyUpdate {
                    roster: self.roster(),
                    changed: player,
                });
            }
            Phase::TurnStarted | Phase::ChoosingTile
                if self.game.holder() == Some(&player) =>
            {
                // Hand the turn to the next active player, or freeze.
                self.next_turn(&actives);
            }
            Phase::DoingQuestion => {
                if self.game.drop_expectation(&player) {
                    self.resolve_question();
                }
            }
            Phase::QuestionResult => {
                if self.game.all_ready(&actives) {
                    self.close_round();
                }
            }
            _ => {}
        }

        // Freezes reached through the question phases do not go
        // through next_turn; mark them here.
        if !matches!(self.game.phase(), Phase::Lobby | Phase::GameOver)
            && self.actives().is_empty()
        {
            self.frozen = true;
        }
    }

    fn handle_timeout(&mut self, seq: u64) {
        if self.game.phase() == Phase::DoingQuestion && seq == self.game.question_seq() {
            debug!(seq, "question timer fired");
            self.resolve_question();
        } else {
            debug!(seq, "stale timer drained");
        }
    }

    /// Open a fresh turn, or freeze with no holder when nobody is
    /// active.
    fn next_turn(&mut self, actives: &BTreeSet<PlayerId>) {
        match self.game.begin_turn(actives) {
            Some(holder) => {
                self.frozen = false;
                self.publish_holder(Some(&holder));
                self.broadcast(ServerEvent::PlayerTurn { player: holder });
            }
            None => {
                debug!("no active players, room frozen");
                self.frozen = true;
                self.game.clear_holder();
                self.publish_holder(None);
            }
        }
    }

    fn arm_timer(&mut self) {
        self.stop_timer();
        let seq = self.game.question_seq();
        let timeout = self.options.question_timeout;
        let tx = self.timer_tx.clone();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        self.timer_cancel = Some(cancel_tx);
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(timeout) => {
                    let _ = tx.send(seq).await;
                }
                _ = cancel_rx.changed() => {}
            }
        });
    }

    fn stop_timer(&mut self) {
        if let Some(cancel) = self.timer_cancel.take() {
            let _ = cancel.send(true);
        }
    }

    fn reject(&self, sender: &PlayerId, rejection: &Rejection) {
        warn!(sender = %sender, %rejection, "client event rejected");
    }

    fn actives(&self) -> BTreeSet<PlayerId> {
        lock(&self.table).actives()
    }

    fn roster(&self) -> Vec<PlayerView> {
        lock(&self.table)
            .seats
            .values()
            .map(|seat| PlayerView {
                id: seat.player.id.clone(),
                pseudo: seat.player.pseudo.clone(),
                connected: seat.conn.is_some(),
                success: seat.advance.success,
            })
            .collect()
    }

    fn publish_holder(&self, holder: Option<&PlayerId>) {
        lock(&self.table).turn_holder = holder.cloned();
    }

    /// Summary keeps the *latest* question; it is never cleared, only
    /// replaced.
    fn publish_question(&self, meta: QuestionMeta) {
        lock(&self.table).question = Some(meta);
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.game.phase(),
            pawn: self.game.pawn(),
            turn_holder: self.game.holder().cloned(),
            dice: self.game.dice(),
            players: self.roster(),
            question: self.game.question().map(|q| QuestionView {
                question: q.id,
                category: q.category,
                timeout_secs: self.options.question_timeout.as_secs(),
                content: q.content.clone(),
            }),
        }
    }

    /// Broadcast one event with the state exactly as of now. Delivery
    /// failures are logged and never affect the other players.
    fn broadcast(&self, event: ServerEvent) {
        let envelope = Envelope {
            event,
            snapshot: self.snapshot(),
        };
        let conns: Vec<(PlayerId, Arc<dyn super::Connection>)> = {
            let table = lock(&self.table);
            table
                .seats
                .iter()
                .filter_map(|(id, seat)| {
                    seat.conn.as_ref().map(|c| (id.clone(), Arc::clone(c)))
                })
                .collect()
        };
        for (player, conn) in conns {
            if let Err(error) = conn.deliver(&envelope) {
                warn!(player = %player, %error, "delivery failed");
            }
        }
    }

    fn outcome(&mut self, natural: bool) -> RoomOutcome {
        self.stop_timer();
        let reviews = {
            let table = lock(&self.table);
            table
                .seats
                .iter()
                .map(|(id, seat)| (id.clone(), seat.advance.review.clone()))
                .collect()
        };
        RoomOutcome {
            replay: Replay {
                room: self.room_id,
                reviews,
            },
            natural,
        }
    }
}
