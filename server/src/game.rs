use crate::error::GameError;
use log::{debug, info};
use shared::{Player, PlayerId, MAX_SLOTS};
use std::collections::BTreeMap;

/// Roster and match flag reconstructed by the reconciliation engine.
///
/// `team_count` and `largest_slot` are display bounds. They never fall below
/// the highest team/slot present but can stay high after a removal until a
/// boundary player leaves and they are recomputed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameState {
    pub players: BTreeMap<PlayerId, Player>,
    pub team_count: u32,
    pub largest_slot: u32,
    pub started: bool,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn get_or_create(&mut self, id: PlayerId) -> &mut Player {
        if !self.players.contains_key(&id) {
            self.grow_bounds(id);
        }
        self.players
            .entry(id)
            .or_insert_with(|| Player::new(id.team, id.slot))
    }

    /// Places a new player in the lowest free slot number, spreading players
    /// across teams before using the next slot number.
    pub fn create_new(&mut self, target_team_count: u32) -> Result<PlayerId, GameError> {
        for slot in 1..=MAX_SLOTS {
            for team in 1..=target_team_count {
                let id = PlayerId::new(team, slot);
                if !self.players.contains_key(&id) {
                    self.get_or_create(id);
                    info!("Assigned new player to {}", id);
                    return Ok(id);
                }
            }
        }

        Err(GameError::CapacityExceeded {
            teams: target_team_count,
            slots: MAX_SLOTS,
        })
    }

    /// Relocates the player at `src` to `dst`.
    ///
    /// Returns `Ok(false)` when there is nobody at `src`.
    pub fn move_player(&mut self, src: PlayerId, dst: PlayerId) -> Result<bool, GameError> {
        if self.players.contains_key(&dst) {
            return Err(GameError::SlotOccupied(dst));
        }
        let Some(mut player) = self.players.remove(&src) else {
            return Ok(false);
        };

        player.team = dst.team;
        player.slot = dst.slot;
        self.players.insert(dst, player);
        self.grow_bounds(dst);
        self.shrink_bounds(src);

        debug!("Moved player {} to {}", src, dst);
        Ok(true)
    }

    pub fn delete_player(&mut self, id: PlayerId) -> Option<Player> {
        let player = self.players.remove(&id)?;
        self.shrink_bounds(id);
        debug!("Removed player {}", id);
        Some(player)
    }

    /// Restores every player's health and ammo.
    pub fn reset_players(&mut self) {
        for player in self.players.values_mut() {
            player.reset();
        }
    }

    fn grow_bounds(&mut self, id: PlayerId) {
        self.team_count = self.team_count.max(id.team);
        self.largest_slot = self.largest_slot.max(id.slot);
    }

    fn shrink_bounds(&mut self, removed: PlayerId) {
        if removed.team == self.team_count {
            self.recalculate_team_count();
        }
        if removed.slot == self.largest_slot {
            self.recalculate_largest_slot();
        }
    }

    fn recalculate_team_count(&mut self) {
        for team in (1..=self.team_count).rev() {
            for slot in (1..=self.largest_slot).rev() {
                if self.players.contains_key(&PlayerId::new(team, slot)) {
                    self.team_count = team;
                    return;
                }
            }
        }
        if self.players.is_empty() {
            self.team_count = 0;
        }
    }

    fn recalculate_largest_slot(&mut self) {
        for slot in (1..=self.largest_slot).rev() {
            for team in (1..=self.team_count).rev() {
                if self.players.contains_key(&PlayerId::new(team, slot)) {
                    self.largest_slot = slot;
                    return;
                }
            }
        }
        if self.players.is_empty() {
            self.largest_slot = 0;
        }
    }
}
