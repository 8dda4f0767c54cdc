//! Standard game rules: how hits, trigger pulls and ammo refills change a player.
//!
//! Every function here only touches the player it is given, so the engine can
//! run them again on a fresh copy of the checkpoint each time history is
//! replayed. Each returns whether the player actually changed.

use shared::{Player, MAX_AMMO};

/// Applies `damage` from the gun bound to `(source_team, source_slot)`.
///
/// Nothing happens before the match starts or when the shooter is on the
/// target's team, which includes the target shooting its own slot.
pub fn apply_hit(
    started: bool,
    target: &mut Player,
    source_team: u32,
    _source_slot: u32,
    damage: u32,
) -> bool {
    if !started || source_team == target.team {
        return false;
    }

    let before = target.health;
    target.health = target.health.saturating_sub(damage);
    target.health != before
}

/// Spends one round. An empty gun stays empty and reports no change.
pub fn apply_trigger(target: &mut Player) -> bool {
    if target.ammo == 0 {
        return false;
    }
    target.ammo -= 1;
    true
}

pub fn apply_full_ammo(target: &mut Player) -> bool {
    if target.ammo == MAX_AMMO {
        return false;
    }
    target.ammo = MAX_AMMO;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MAX_HEALTH;

    #[test]
    fn test_hit_while_match_stopped() {
        let mut player = Player::new(1, 1);
        assert!(!apply_hit(false, &mut player, 2, 1, 2));
        assert_eq!(player.health, MAX_HEALTH);
    }

    #[test]
    fn test_simple_hit() {
        let mut player = Player::new(1, 1);
        assert!(apply_hit(true, &mut player, 2, 1, 2));
        assert_eq!(player.health, MAX_HEALTH - 2);
    }

    #[test]
    fn test_self_hit() {
        let mut player = Player::new(1, 1);
        assert!(!apply_hit(true, &mut player, 1, 1, 2));
        assert_eq!(player.health, MAX_HEALTH);
    }

    #[test]
    fn test_friendly_fire_never_damages() {
        for damage in [0, 1, 2, MAX_HEALTH, MAX_HEALTH + 1, u32::MAX] {
            let mut player = Player::new(1, 1);
            assert!(!apply_hit(true, &mut player, 1, 2, damage));
            assert_eq!(player.health, MAX_HEALTH);
        }
    }

    #[test]
    fn test_shot_until_dead() {
        let mut player = Player::new(1, 1);
        let damage = MAX_HEALTH / 2 + 1;

        assert!(apply_hit(true, &mut player, 2, 1, damage));
        assert_eq!(player.health, MAX_HEALTH - damage);

        assert!(apply_hit(true, &mut player, 2, 1, damage));
        assert_eq!(player.health, 0);
        assert!(!player.is_alive());

        assert!(!apply_hit(true, &mut player, 2, 1, damage));
        assert_eq!(player.health, 0);
    }

    #[test]
    fn test_zero_damage_reports_no_change() {
        let mut player = Player::new(1, 1);
        assert!(!apply_hit(true, &mut player, 2, 1, 0));
    }

    #[test]
    fn test_trigger_floors_at_zero() {
        let mut player = Player::new(1, 1);
        player.ammo = 2;

        assert!(apply_trigger(&mut player));
        assert!(apply_trigger(&mut player));
        assert_eq!(player.ammo, 0);

        assert!(!apply_trigger(&mut player));
        assert_eq!(player.ammo, 0);
    }

    #[test]
    fn test_full_ammo_restores_maximum() {
        let mut player = Player::new(1, 1);
        assert!(!apply_full_ammo(&mut player));

        player.ammo = 3;
        assert!(apply_full_ammo(&mut player));
        assert_eq!(player.ammo, MAX_AMMO);
    }
}
