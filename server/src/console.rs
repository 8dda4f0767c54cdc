//! Operator commands read from standard input
//!
//! The console is the server's control surface for match and roster management:
//!
//! ```text
//! start | stop | reset | status
//! move <team> <slot> <team> <slot>
//! delete <team> <slot>
//! teams <count>
//! time <seconds>
//! ```

use crate::error::GameError;
use crate::handle::GameHandle;
use log::{error, info, warn};
use shared::PlayerId;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    Status,
    Move { src: PlayerId, dst: PlayerId },
    Delete(PlayerId),
    Teams(u32),
    Time(Duration),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

fn numbers<T: FromStr>(args: &[&str], usage: &'static str) -> Result<Vec<T>, CommandError> {
    args.iter()
        .map(|arg| arg.parse().map_err(|_| CommandError::Usage(usage)))
        .collect()
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(CommandError::Empty)?;
        let args: Vec<&str> = words.collect();

        let command = match (name.to_ascii_lowercase().as_str(), args.len()) {
            ("start", 0) => Command::Start,
            ("stop", 0) => Command::Stop,
            ("reset", 0) => Command::Reset,
            ("status", 0) => Command::Status,
            ("move", 4) => {
                const USAGE: &str = "move <team> <slot> <team> <slot>";
                let n: Vec<u32> = numbers(&args, USAGE)?;
                Command::Move {
                    src: PlayerId::new(n[0], n[1]),
                    dst: PlayerId::new(n[2], n[3]),
                }
            }
            ("delete", 2) => {
                let n: Vec<u32> = numbers(&args, "delete <team> <slot>")?;
                Command::Delete(PlayerId::new(n[0], n[1]))
            }
            ("teams", 1) => {
                let n: Vec<u32> = numbers(&args, "teams <count>")?;
                if n[0] == 0 {
                    return Err(CommandError::Usage("teams <count>"));
                }
                Command::Teams(n[0])
            }
            ("time", 1) => {
                let n: Vec<u64> = numbers(&args, "time <seconds>")?;
                Command::Time(Duration::from_secs(n[0]))
            }
            ("move", _) => return Err(CommandError::Usage("move <team> <slot> <team> <slot>")),
            ("delete", _) => return Err(CommandError::Usage("delete <team> <slot>")),
            ("teams", _) => return Err(CommandError::Usage("teams <count>")),
            ("time", _) => return Err(CommandError::Usage("time <seconds>")),
            _ => return Err(CommandError::Unknown(line.trim().to_string())),
        };
        Ok(command)
    }
}

/// Runs one operator command. Errors here are reported to the operator, never fatal.
pub async fn execute(game: &GameHandle, command: Command) -> Result<(), GameError> {
    match command {
        Command::Start => game.start_match().await?,
        Command::Stop => game.stop_match().await,
        Command::Reset => game.reset_match().await,
        Command::Status => {
            let state = game.snapshot().await;
            let remaining = game.time_remaining().await;
            info!(
                "{} players on {} teams, started: {}, remaining: {:?}, watermark: {}",
                state.players.len(),
                state.team_count,
                state.started,
                remaining.map(|r| r.as_secs()),
                game.watermark().await
            );
            for player in state.players.values() {
                info!(
                    "  {} health {} ammo {}",
                    player.id(),
                    player.health,
                    player.ammo
                );
            }
        }
        Command::Move { src, dst } => game.move_player(src, dst).await?,
        Command::Delete(id) => game.delete_player(id).await,
        Command::Teams(count) => game.set_target_team_count(count).await,
        Command::Time(duration) => game.set_game_duration(duration).await,
    }
    Ok(())
}

/// Reads commands from `input` until it closes.
pub async fn run<R>(game: GameHandle, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read operator input: {}", e);
                break;
            }
        };

        match line.parse::<Command>() {
            Ok(command) => {
                if let Err(e) = execute(&game, command).await {
                    warn!("Command `{}` failed: {}", line.trim(), e);
                }
            }
            Err(CommandError::Empty) => {}
            Err(e) => warn!("{}", e),
        }
    }
}
