use crate::engine::ReconciliationEngine;
use crate::error::GameError;
use crate::game::GameState;
use crate::registry::ConnectionId;
use log::error;
use shared::{PlayerId, SenderId, ServerMessage, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep_until, Instant};

/// Cloneable handle to the one reconciliation engine of a server.
///
/// Every call takes the same exclusive lock, so ingestion from all
/// connections, operator commands and the automatic match stop are serialized.
#[derive(Clone)]
pub struct GameHandle {
    engine: Arc<Mutex<ReconciliationEngine>>,
    fatal_tx: mpsc::UnboundedSender<GameError>,
}

impl GameHandle {
    /// Wraps `engine`. Errors raised by background tasks, such as a misfired
    /// automatic stop, arrive on the returned receiver.
    pub fn new(engine: ReconciliationEngine) -> (Self, mpsc::UnboundedReceiver<GameError>) {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let handle = Self {
            engine: Arc::new(Mutex::new(engine)),
            fatal_tx,
        };
        (handle, fatal_rx)
    }

    pub async fn ingest(
        &self,
        origin: ConnectionId,
        line: &str,
    ) -> Result<ServerMessage, GameError> {
        self.engine.lock().await.ingest(origin, line)
    }

    /// Starts the match and schedules its automatic stop.
    pub async fn start_match(&self) -> Result<(), GameError> {
        let mut engine = self.engine.lock().await;
        let deadline = engine.start_match(Instant::now())?;

        let handle = self.clone();
        let stop_task = tokio::spawn(async move {
            sleep_until(deadline).await;
            handle.expire_match().await;
        });
        engine.arm_auto_stop(stop_task);
        Ok(())
    }

    pub async fn stop_match(&self) {
        self.engine.lock().await.stop_match();
    }

    async fn expire_match(&self) {
        let result = self.engine.lock().await.expire_match(Instant::now());
        if let Err(e) = result {
            error!("Automatic match stop failed: {}", e);
            if self.fatal_tx.send(e).is_err() {
                error!("Nobody is listening for fatal errors");
            }
        }
    }

    pub async fn reset_match(&self) {
        self.engine.lock().await.reset_match();
    }

    pub async fn move_player(&self, src: PlayerId, dst: PlayerId) -> Result<(), GameError> {
        self.engine.lock().await.move_player(src, dst)
    }

    pub async fn delete_player(&self, id: PlayerId) {
        self.engine.lock().await.delete_player(id);
    }

    pub async fn set_target_team_count(&self, teams: u32) {
        self.engine.lock().await.set_target_team_count(teams);
    }

    pub async fn set_game_duration(&self, duration: Duration) {
        self.engine.lock().await.set_game_duration(duration);
    }

    /// Reports an error from outside the engine that must bring the server down.
    pub fn report_fatal(&self, error: GameError) {
        if self.fatal_tx.send(error).is_err() {
            error!("Nobody is listening for fatal errors");
        }
    }

    pub async fn snapshot(&self) -> GameState {
        self.engine.lock().await.state().clone()
    }

    pub async fn watermark(&self) -> Timestamp {
        self.engine.lock().await.watermark()
    }

    pub async fn last_seen(&self, sender: SenderId) -> Option<Timestamp> {
        self.engine.lock().await.last_seen(sender)
    }

    pub async fn time_remaining(&self) -> Option<Duration> {
        self.engine.lock().await.time_remaining(Instant::now())
    }

    pub async fn is_running(&self) -> bool {
        self.engine.lock().await.clock().is_running()
    }
}
