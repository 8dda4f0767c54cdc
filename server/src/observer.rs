//! Change notifications for dashboards and other passive watchers.

use log::{debug, info, warn};
use shared::{Player, PlayerId};

/// Fire-and-forget roster notifications.
///
/// Called while the engine lock is held, so implementations must return
/// quickly and must not call back into the game handle.
pub trait Observer: Send + Sync {
    fn on_player_added(&self, player: &Player);

    fn on_player_updated(&self, player: &Player);

    fn on_player_removed(&self, _id: PlayerId) {}

    /// Every inbound line, before it is parsed.
    fn on_line_received(&self, _line: &str) {}
}

/// Writes roster changes to the log as JSON player snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

fn snapshot(player: &Player) -> String {
    serde_json::to_string(player).unwrap_or_else(|e| {
        warn!("Failed to serialize player {}: {}", player.id(), e);
        format!("{:?}", player)
    })
}

impl Observer for LogObserver {
    fn on_player_added(&self, player: &Player) {
        info!("Player added {}", snapshot(player));
    }

    fn on_player_updated(&self, player: &Player) {
        info!("Player updated {}", snapshot(player));
    }

    fn on_player_removed(&self, id: PlayerId) {
        info!("Player removed {}", id);
    }

    fn on_line_received(&self, line: &str) {
        debug!("<- {}", line);
    }
}
