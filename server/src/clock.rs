//! Match clock with a cancellable automatic stop.
//!
//! The clock itself never spawns anything: [`crate::handle::GameHandle`]
//! schedules the deferred stop and hands the task back via [`GameClock::arm`]
//! so a manual stop or restart can abort it while holding the engine lock.

use crate::error::GameError;
use log::debug;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What a fired auto-stop timer should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The match reached its deadline and must stop.
    Due,
    /// No match is running any more.
    Idle,
}

#[derive(Debug)]
pub struct GameClock {
    duration: Duration,
    started_at: Option<Instant>,
    pending_stop: Option<JoinHandle<()>>,
}

impl GameClock {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started_at: None,
            pending_stop: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    /// Starts the clock and returns the instant the match should end.
    pub fn start(&mut self, now: Instant) -> Result<Instant, GameError> {
        if self.is_running() {
            return Err(GameError::MatchAlreadyRunning);
        }
        self.started_at = Some(now);
        Ok(now + self.duration)
    }

    /// Takes ownership of the task that will stop the current match.
    pub fn arm(&mut self, stop_task: JoinHandle<()>) {
        if let Some(stale) = self.pending_stop.replace(stop_task) {
            stale.abort();
        }
    }

    /// Forgets the pending stop without aborting it. Used by the stop task itself.
    pub fn disarm(&mut self) {
        self.pending_stop = None;
    }

    /// Stops the clock, cancelling any pending automatic stop.
    pub fn stop(&mut self) {
        if let Some(task) = self.pending_stop.take() {
            debug!("Cancelling scheduled match stop");
            task.abort();
        }
        self.started_at = None;
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let started_at = self.started_at?;
        Some((started_at + self.duration).saturating_duration_since(now))
    }

    /// Checks a fired auto-stop against the running match.
    ///
    /// A timer firing before the current deadline belongs to an earlier start
    /// that should have been cancelled, which is reported as an error.
    pub fn check_expiry(&self, now: Instant) -> Result<Expiry, GameError> {
        let Some(started_at) = self.started_at else {
            return Ok(Expiry::Idle);
        };

        let deadline = started_at + self.duration;
        if deadline > now {
            return Err(GameError::SchedulingInvariantViolation {
                early_by: deadline - now,
            });
        }
        Ok(Expiry::Due)
    }
}
