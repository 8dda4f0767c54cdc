use shared::{
    DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_GAME_TIME, DEFAULT_PORT, DEFAULT_TEAM_COUNT,
};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Watermark must pass the current checkpoint by more than this before a new one is taken.
    pub min_checkpoint_interval: u64,
    /// Number of teams new players are spread across.
    pub target_team_count: u32,
    pub game_duration: Duration,
    pub auto_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            min_checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            target_team_count: DEFAULT_TEAM_COUNT,
            game_duration: Duration::from_secs(DEFAULT_GAME_TIME),
            auto_start: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.min_checkpoint_interval, 10);
        assert_eq!(config.target_team_count, 2);
        assert_eq!(config.game_duration, Duration::from_secs(1200));
        assert!(!config.auto_start);
    }
}
