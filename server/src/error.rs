use shared::PlayerId;
use std::time::Duration;
use thiserror::Error;

/// Conditions the game core cannot recover from locally.
///
/// Protocol problems never show up here: a malformed line is logged and
/// acknowledged by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("no free roster slot across {teams} teams of {slots} slots")]
    CapacityExceeded { teams: u32, slots: u32 },
    #[error("cannot move a player into occupied slot {0}")]
    SlotOccupied(PlayerId),
    #[error("match is already running")]
    MatchAlreadyRunning,
    #[error("match stop fired {early_by:?} before its deadline")]
    SchedulingInvariantViolation { early_by: Duration },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
    #[error("game error: {0}")]
    Game(#[from] GameError),
}
