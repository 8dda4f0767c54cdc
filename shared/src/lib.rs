//! Types and wire protocol shared between the laser-tag server and the
//! hardware units (or simulated units) that talk to it.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod protocol;

pub use protocol::{
    parse_actions, Action, EventEnvelope, Hello, ParseError, Report, ServerMessage,
};

pub const MAX_HEALTH: u32 = 5;
pub const MAX_AMMO: u32 = 100;
/// Highest slot number a team can hold.
pub const MAX_SLOTS: u32 = 32;
pub const DEFAULT_TEAM_COUNT: u32 = 2;
/// Match length in seconds (20 minutes).
pub const DEFAULT_GAME_TIME: u64 = 1200;
/// Minimum distance, in sender time units, between two checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 10;
pub const DEFAULT_PORT: u16 = 8080;

/// Identifies a connected unit independently of the roster slot it occupies.
pub type SenderId = u32;
/// Sender-local event time. Each sender's own stream is non-decreasing.
pub type Timestamp = u64;

/// A roster slot: the `(team, slot)` pair a unit is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId {
    pub team: u32,
    pub slot: u32,
}

impl PlayerId {
    pub fn new(team: u32, slot: u32) -> Self {
        Self { team, slot }
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.team, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub team: u32,
    pub slot: u32,
    pub health: u32,
    pub ammo: u32,
}

impl Player {
    pub fn new(team: u32, slot: u32) -> Self {
        Self {
            team,
            slot,
            health: MAX_HEALTH,
            ammo: MAX_AMMO,
        }
    }

    pub fn id(&self) -> PlayerId {
        PlayerId::new(self.team, self.slot)
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Restores health and ammo without touching identity.
    pub fn reset(&mut self) {
        self.health = MAX_HEALTH;
        self.ammo = MAX_AMMO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_creation() {
        let player = Player::new(2, 7);
        assert_eq!(player.team, 2);
        assert_eq!(player.slot, 7);
        assert_eq!(player.health, MAX_HEALTH);
        assert_eq!(player.ammo, MAX_AMMO);
        assert!(player.is_alive());
        assert_eq!(player.id(), PlayerId::new(2, 7));
    }

    #[test]
    fn test_player_reset_keeps_identity() {
        let mut player = Player::new(1, 3);
        player.health = 0;
        player.ammo = 12;
        assert!(!player.is_alive());

        player.reset();

        assert_eq!(player.id(), PlayerId::new(1, 3));
        assert_eq!(player.health, MAX_HEALTH);
        assert_eq!(player.ammo, MAX_AMMO);
    }

    #[test]
    fn test_player_id_ordering_is_team_major() {
        let mut ids = vec![
            PlayerId::new(2, 1),
            PlayerId::new(1, 2),
            PlayerId::new(1, 1),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![PlayerId::new(1, 1), PlayerId::new(1, 2), PlayerId::new(2, 1)]
        );
        assert_eq!(PlayerId::new(3, 4).to_string(), "(3,4)");
    }
}
