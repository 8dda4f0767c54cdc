//! Event reconciliation for independently clocked units
//!
//! Units report gameplay events with their own timestamps over separate
//! connections, so events reach the server out of order. The engine keeps:
//!
//! - a **checkpoint**: a game state snapshot plus a watermark timestamp,
//! - the **sender clock**: the last timestamp seen from each sender,
//! - the **pending log**: events received since the checkpoint, sorted by
//!   timestamp with arrival order breaking ties.
//!
//! Every ingested event is inserted into the pending log and the live state is
//! rebuilt by replaying the whole log on a copy of the checkpoint state. A late
//! event therefore lands in its correct position and the replay derives the
//! state as if it had arrived in order.
//!
//! The watermark is the minimum of the sender clock. It relies on each sender
//! emitting non-decreasing timestamps: once every sender has moved past a
//! point in time, nothing earlier can still arrive. When the watermark has
//! moved more than `min_checkpoint_interval` past the checkpoint, the replayed
//! state becomes the new checkpoint and the pending log is discarded.
//!
//! Join reports bind connections and allocate roster slots, which must happen
//! once per event however often it is replayed. Each pending event carries an
//! [`EventStatus`] tag recording whether its side effects already fired.
//!
//! Match control and roster edits from the operator (start, stop, reset, move,
//! delete) enter the pending log as [`Control`] entries stamped with the latest
//! time any sender has reported. A late event that happened before the action
//! is sorted in front of it and replays as if it had arrived in time.

use crate::clock::{Expiry, GameClock};
use crate::config::ServerConfig;
use crate::error::GameError;
use crate::game::GameState;
use crate::observer::Observer;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::rules;
use log::{debug, error, info, trace, warn};
use shared::{
    parse_actions, Action, EventEnvelope, Hello, PlayerId, SenderId, ServerMessage, Timestamp,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Whether an event's external side effects have fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Unprocessed,
    /// Side effects fired. `identity` is the roster slot a join bound, so
    /// later replays can recreate the player without repeating the join.
    SideEffectsApplied { identity: Option<PlayerId> },
}

/// A received line with the bookkeeping the engine needs to replay it.
#[derive(Debug, Clone)]
pub struct Event {
    pub sender: SenderId,
    pub timestamp: Timestamp,
    pub message: String,
    pub origin: ConnectionId,
    pub status: EventStatus,
    actions: Vec<Action>,
}

impl Event {
    fn new(origin: ConnectionId, envelope: EventEnvelope) -> Self {
        let actions = parse_actions(&envelope.message);
        Self {
            sender: envelope.sender,
            timestamp: envelope.timestamp,
            message: envelope.message,
            origin,
            status: EventStatus::Unprocessed,
            actions,
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

/// An operator action, replayed at its position in the pending log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Start,
    Stop,
    Reset,
    Move { src: PlayerId, dst: PlayerId },
    Delete(PlayerId),
}

/// One entry of the pending log.
#[derive(Debug, Clone)]
pub enum Entry {
    Event(Event),
    Control {
        timestamp: Timestamp,
        control: Control,
    },
}

impl Entry {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Entry::Event(event) => event.timestamp,
            Entry::Control { timestamp, .. } => *timestamp,
        }
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            Entry::Event(event) => Some(event),
            Entry::Control { .. } => None,
        }
    }
}

/// Last state known to be complete, and the time it covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub state: GameState,
    pub watermark: Timestamp,
}

/// Collaborators and match facts a replay needs besides the state itself.
struct Replay<'a> {
    registry: &'a dyn ConnectionRegistry,
    target_team_count: u32,
    time_remaining: Option<Duration>,
}

pub struct ReconciliationEngine {
    min_checkpoint_interval: u64,
    target_team_count: u32,
    state: GameState,
    checkpoint: Checkpoint,
    sender_clock: HashMap<SenderId, Timestamp>,
    pending: Vec<Entry>,
    clock: GameClock,
    registry: Arc<dyn ConnectionRegistry>,
    observer: Arc<dyn Observer>,
}

impl ReconciliationEngine {
    pub fn new(
        config: &ServerConfig,
        registry: Arc<dyn ConnectionRegistry>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            min_checkpoint_interval: config.min_checkpoint_interval,
            target_team_count: config.target_team_count,
            state: GameState::new(),
            checkpoint: Checkpoint::default(),
            sender_clock: HashMap::new(),
            pending: Vec::new(),
            clock: GameClock::new(config.game_duration),
            registry,
            observer,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn watermark(&self) -> Timestamp {
        self.checkpoint.watermark
    }

    pub fn pending(&self) -> &[Entry] {
        &self.pending
    }

    pub fn last_seen(&self, sender: SenderId) -> Option<Timestamp> {
        self.sender_clock.get(&sender).copied()
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    pub fn target_team_count(&self) -> u32 {
        self.target_team_count
    }

    pub fn set_target_team_count(&mut self, teams: u32) {
        info!("Target team count set to {}", teams);
        self.target_team_count = teams;
    }

    pub fn set_game_duration(&mut self, duration: Duration) {
        self.clock.set_duration(duration);
    }

    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        self.clock.remaining(now)
    }

    /// Processes one inbound line and returns the acknowledgement for its sender.
    ///
    /// Malformed lines are logged and acknowledged without touching state.
    /// Errors are fatal: they mean the roster ran out of slots.
    pub fn ingest(
        &mut self,
        origin: ConnectionId,
        line: &str,
    ) -> Result<ServerMessage, GameError> {
        self.observer.on_line_received(line);

        let envelope = match EventEnvelope::parse(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring line from connection {}: {}", origin, e);
                return Ok(ServerMessage::Ack);
            }
        };
        let event = Event::new(origin, envelope);

        let known = self.sender_clock.get(&event.sender).copied();
        if breaks_sender_order(self.checkpoint.watermark, known, event.timestamp) {
            warn!(
                "Sender {} went back in time: event at {} after watermark {} and last report {:?}",
                event.sender, event.timestamp, self.checkpoint.watermark, known
            );
        }

        // Overwrite: each sender's timestamps are assumed non-decreasing.
        self.sender_clock.insert(event.sender, event.timestamp);
        let candidate = self
            .sender_clock
            .values()
            .copied()
            .min()
            .unwrap_or(event.timestamp);
        let advance = candidate
            > self
                .checkpoint
                .watermark
                .saturating_add(self.min_checkpoint_interval);

        let position = self
            .pending
            .partition_point(|pending| pending.timestamp() <= event.timestamp);
        self.pending.insert(position, Entry::Event(event));

        self.replay(Instant::now())?;

        if advance {
            debug!(
                "Checkpoint advanced from {} to {} ({} events folded)",
                self.checkpoint.watermark,
                candidate,
                self.pending.len()
            );
            self.checkpoint = Checkpoint {
                state: self.state.clone(),
                watermark: candidate,
            };
            self.pending.clear();
        }

        Ok(ServerMessage::Ack)
    }

    /// Rebuilds the live state from the checkpoint and the pending log.
    fn replay(&mut self, now: Instant) -> Result<(), GameError> {
        let previous = std::mem::replace(&mut self.state, self.checkpoint.state.clone());
        let replay = Replay {
            registry: self.registry.as_ref(),
            target_team_count: self.target_team_count,
            time_remaining: self.clock.remaining(now),
        };

        let mut result = Ok(());
        for entry in self.pending.iter_mut() {
            match entry {
                Entry::Event(event) => {
                    if let Err(e) = dispatch(&mut self.state, event, &replay) {
                        result = Err(e);
                        break;
                    }
                }
                Entry::Control { control, .. } => apply_control(&mut self.state, *control),
            }
        }

        self.publish(&previous);
        result
    }

    /// Tells the observer what changed between `previous` and the live state.
    fn publish(&self, previous: &GameState) {
        for (id, player) in &self.state.players {
            match previous.players.get(id) {
                None => self.observer.on_player_added(player),
                Some(old) if old != player => self.observer.on_player_updated(player),
                Some(_) => {}
            }
        }
        for id in previous.players.keys() {
            if !self.state.players.contains_key(id) {
                self.observer.on_player_removed(*id);
            }
        }
    }

    /// Appends an operator action to the pending log and replays.
    ///
    /// The action is stamped with the latest time seen from any sender, so
    /// it replays after everything received so far.
    fn control(&mut self, control: Control, now: Instant) {
        let timestamp = self
            .sender_clock
            .values()
            .copied()
            .chain(self.pending.last().map(Entry::timestamp))
            .fold(self.checkpoint.watermark, Timestamp::max);
        self.pending.push(Entry::Control { timestamp, control });

        if let Err(e) = self.replay(now) {
            error!("Replay after {:?} failed: {}", control, e);
        }
    }

    /// Starts the match clock and returns the deadline for the automatic stop.
    pub fn start_match(&mut self, now: Instant) -> Result<Instant, GameError> {
        let deadline = self.clock.start(now)?;
        self.control(Control::Start, now);

        let seconds = self.clock.duration().as_secs();
        info!("Match started for {}s", seconds);
        self.registry.broadcast(ServerMessage::StartGame { seconds });
        Ok(deadline)
    }

    pub fn arm_auto_stop(&mut self, task: JoinHandle<()>) {
        self.clock.arm(task);
    }

    pub fn stop_match(&mut self) {
        self.clock.stop();
        self.control(Control::Stop, Instant::now());

        info!("Match stopped");
        self.registry.broadcast(ServerMessage::StopGame);
    }

    /// Called by the automatic stop task once its deadline has passed.
    pub fn expire_match(&mut self, now: Instant) -> Result<(), GameError> {
        match self.clock.check_expiry(now)? {
            Expiry::Due => {
                self.clock.disarm();
                info!("Match time is up");
                self.stop_match();
            }
            Expiry::Idle => debug!("Automatic stop fired with no match running"),
        }
        Ok(())
    }

    pub fn reset_match(&mut self) {
        self.registry.broadcast(ServerMessage::ResetGame);
        self.control(Control::Reset, Instant::now());
        info!("Match reset");
    }

    /// Moves the player at `src` to the free slot `dst`.
    ///
    /// Nothing is recorded when `dst` is taken or nobody is at `src`.
    pub fn move_player(&mut self, src: PlayerId, dst: PlayerId) -> Result<(), GameError> {
        if self.state.player(dst).is_some() {
            return Err(GameError::SlotOccupied(dst));
        }
        if self.state.player(src).is_none() {
            debug!("No player at {} to move", src);
            return Ok(());
        }

        self.control(Control::Move { src, dst }, Instant::now());
        self.registry.rebind(src, dst);
        info!("Moved player {} to {}", src, dst);
        Ok(())
    }

    pub fn delete_player(&mut self, id: PlayerId) {
        if self.state.player(id).is_none() {
            debug!("No player at {} to delete", id);
            return;
        }

        self.control(Control::Delete(id), Instant::now());
        self.registry.send(id, ServerMessage::Deleted);
        self.registry.unbind(id);
        info!("Deleted player {}", id);
    }
}

/// Whether an event at `timestamp` contradicts the non-decreasing timestamps
/// every sender is expected to emit.
fn breaks_sender_order(
    watermark: Timestamp,
    last: Option<Timestamp>,
    timestamp: Timestamp,
) -> bool {
    timestamp < watermark || last.is_some_and(|last| timestamp < last)
}

fn apply_control(state: &mut GameState, control: Control) {
    match control {
        Control::Start => state.started = true,
        Control::Stop => state.started = false,
        Control::Reset => state.reset_players(),
        Control::Move { src, dst } => {
            // A late event may have claimed `dst` ahead of the move.
            if let Err(e) = state.move_player(src, dst) {
                warn!("Skipping replayed move of {}: {}", src, e);
            }
        }
        Control::Delete(id) => {
            state.delete_player(id);
        }
    }
}

/// Applies every action an event carries, in order, to `state`.
fn dispatch(
    state: &mut GameState,
    event: &mut Event,
    replay: &Replay<'_>,
) -> Result<(), GameError> {
    let mut joined = None;

    for action in &event.actions {
        match *action {
            Action::Hit {
                target,
                source,
                damage,
            } => {
                let started = state.started;
                let player = state.get_or_create(target);
                if rules::apply_hit(started, player, source.team, source.slot, damage) {
                    trace!("{} hit {} for {}", source, target, damage);
                }
            }
            Action::Trigger { target } => {
                rules::apply_trigger(state.get_or_create(target));
            }
            Action::FullAmmo { target } => {
                rules::apply_full_ammo(state.get_or_create(target));
            }
            Action::Hello(hello) => match event.status {
                EventStatus::Unprocessed => {
                    joined = Some(join(state, event.origin, hello, replay)?);
                }
                EventStatus::SideEffectsApplied {
                    identity: Some(identity),
                } => {
                    state.get_or_create(identity);
                }
                EventStatus::SideEffectsApplied { identity: None } => {}
            },
        }
    }

    if event.status == EventStatus::Unprocessed {
        event.status = EventStatus::SideEffectsApplied { identity: joined };
    }
    Ok(())
}

/// Allocates or adopts an identity for a joining unit and announces it.
fn join(
    state: &mut GameState,
    origin: ConnectionId,
    hello: Hello,
    replay: &Replay<'_>,
) -> Result<PlayerId, GameError> {
    let (id, reply) = match hello {
        Hello::Unknown => {
            let id = state.create_new(replay.target_team_count)?;
            (id, ServerMessage::TeamPlayer(id))
        }
        Hello::Existing(id) => {
            state.get_or_create(id);
            (id, ServerMessage::Ack)
        }
    };

    replay.registry.bind_identity(origin, id);
    replay.registry.send(id, reply);
    if let Some(remaining) = replay.time_remaining {
        replay.registry.send(
            id,
            ServerMessage::StartGame {
                seconds: remaining.as_secs(),
            },
        );
    }

    info!("Connection {} joined as {}", origin, id);
    Ok(id)
}
