use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::console;
use server::network::{Server, ServerEvent};
use server::observer::LogObserver;
use shared::{DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_GAME_TIME, DEFAULT_PORT, DEFAULT_TEAM_COUNT};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// How far the watermark must move before a new checkpoint is taken
    #[arg(short, long, default_value_t = DEFAULT_CHECKPOINT_INTERVAL)]
    checkpoint_interval: u64,

    /// Number of teams new players are spread across
    #[arg(short, long, default_value_t = DEFAULT_TEAM_COUNT)]
    teams: u32,

    /// Match length in seconds
    #[arg(short, long, default_value_t = DEFAULT_GAME_TIME)]
    game_time: u64,

    /// Start the first match as soon as the server is up
    #[arg(short, long)]
    auto_start: bool,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            min_checkpoint_interval: args.checkpoint_interval,
            target_team_count: args.teams.max(1),
            game_duration: Duration::from_secs(args.game_time),
            auto_start: args.auto_start,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());

    info!("Starting laser tag server...");
    info!(
        "Teams: {}, match length: {}s, checkpoint interval: {}",
        config.target_team_count,
        config.game_duration.as_secs(),
        config.min_checkpoint_interval
    );

    let mut server = Server::bind(&config, Arc::new(LogObserver)).await?;

    if config.auto_start {
        server.game().start_match().await?;
    }

    let events = server.events();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Received Ctrl+C, shutting down gracefully...");
        let _ = events.send(ServerEvent::Shutdown);
    });

    info!("Commands: start, stop, reset, status, move, delete, teams, time");
    tokio::spawn(console::run(
        server.game(),
        BufReader::new(tokio::io::stdin()),
    ));

    server.run().await?;

    Ok(())
}
