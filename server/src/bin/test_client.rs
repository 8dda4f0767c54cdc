//! Simulated laser tag unit for manual end-to-end testing.
//!
//! Joins the server as an unknown unit, waits for its roster slot and then
//! reports random hits, trigger pulls and reloads stamped with its own clock.

use clap::Parser;
use log::{info, warn};
use rand::Rng;
use shared::{EventEnvelope, Hello, PlayerId, Report, SenderId, ServerMessage, Timestamp};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Sender id this unit stamps on its events
    #[arg(short = 'i', long, default_value = "1")]
    sender: SenderId,

    /// Milliseconds between reports
    #[arg(short = 'r', long, default_value = "500")]
    rate: u64,

    /// Number of teams to aim shots from
    #[arg(short = 't', long, default_value = "2")]
    teams: u32,

    /// Number of reports to send before disconnecting, 0 for no limit
    #[arg(short = 'n', long, default_value = "0")]
    count: u64,
}

// Get current timestamp in milliseconds
fn get_timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as Timestamp
}

/// Picks something plausible for a unit to have seen since its last report
fn random_reports(rng: &mut impl Rng, teams: u32) -> Vec<Report> {
    match rng.gen_range(0..10) {
        0..=3 => vec![Report::Trigger, Report::TriggerRelease],
        4..=7 => vec![Report::Hit {
            source: PlayerId::new(rng.gen_range(1..=teams), rng.gen_range(1..=4)),
            damage: rng.gen_range(1..=2),
        }],
        8 => vec![
            Report::Hit {
                source: PlayerId::new(rng.gen_range(1..=teams), rng.gen_range(1..=4)),
                damage: 1,
            },
            Report::Trigger,
        ],
        _ => vec![Report::FullAmmo],
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let teams = args.teams.max(1);

    info!("Connecting to {}", args.server);
    let stream = TcpStream::connect(&args.server).await?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let hello = EventEnvelope::new(args.sender, get_timestamp(), Hello::Unknown.to_string());
    writer.write_all(format!("{}\n", hello).as_bytes()).await?;

    // Wait for the roster slot; acks and match messages may arrive first
    let identity = loop {
        let Some(line) = lines.next_line().await? else {
            return Err("server closed the connection before assigning a slot".into());
        };
        match line.parse::<ServerMessage>() {
            Ok(ServerMessage::TeamPlayer(id)) => break id,
            Ok(message) => info!("Server: {}", message),
            Err(e) => warn!("Unexpected line {:?}: {}", line, e),
        }
    };
    info!("Playing as {}", identity);

    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            match line.parse::<ServerMessage>() {
                Ok(ServerMessage::Ack) => {}
                Ok(message) => info!("Server: {}", message),
                Err(e) => warn!("Unexpected line {:?}: {}", line, e),
            }
        }
        info!("Server closed the connection");
    });

    let mut ticker = interval(Duration::from_millis(args.rate.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut rng = rand::thread_rng();
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reports = random_reports(&mut rng, teams);
                let event = EventEnvelope::new(
                    args.sender,
                    get_timestamp(),
                    Report::recv(identity, &reports),
                );
                writer.write_all(format!("{}\n", event).as_bytes()).await?;

                sent += 1;
                if args.count > 0 && sent >= args.count {
                    info!("Sent {} reports, disconnecting", sent);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, disconnecting");
                break;
            }
        }
    }

    Ok(())
}
