//! Line-oriented text protocol spoken between units and the server.
//!
//! Every inbound line is an event envelope `E(sender,timestamp,message)`. The
//! message is either a receive report `Recv(team,slot,actions)` describing
//! what happened to the unit bound to `(team,slot)`, or a join report
//! `Hello(team,slot)`. Actions are `;`-separated segments:
//!
//! - `H<team>,<slot>,<damage>`: hit by the gun bound to `(team,slot)`
//! - `T`: trigger pulled
//! - `t`: trigger released (carries no rule effect)
//! - `FA`: ammo refilled
//!
//! Segments are interpreted independently. A segment that matches no action
//! kind is ignored rather than failing the whole line.

use crate::{PlayerId, SenderId, Timestamp};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Team value a unit sends in `Hello` when it has no identity yet.
pub const UNKNOWN_TEAM: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("not an event envelope: {0:?}")]
    NotAnEnvelope(String),
    #[error("missing {field} in {line:?}")]
    MissingField { field: &'static str, line: String },
    #[error("invalid {field} in {line:?}")]
    InvalidField { field: &'static str, line: String },
    #[error("unknown server message: {0:?}")]
    UnknownMessage(String),
}

/// Returns the argument text of `name(...)` when the call spans all of `text`.
fn call_args<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    text.trim()
        .strip_prefix(name)?
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn field<T: FromStr>(
    raw: Option<&str>,
    name: &'static str,
    line: &str,
) -> Result<T, ParseError> {
    let raw = raw.ok_or_else(|| ParseError::MissingField {
        field: name,
        line: line.to_string(),
    })?;
    raw.trim().parse().map_err(|_| ParseError::InvalidField {
        field: name,
        line: line.to_string(),
    })
}

/// An inbound line split into its sender bookkeeping and the inner message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub sender: SenderId,
    pub timestamp: Timestamp,
    pub message: String,
}

impl EventEnvelope {
    pub fn new(sender: SenderId, timestamp: Timestamp, message: impl Into<String>) -> Self {
        Self {
            sender,
            timestamp,
            message: message.into(),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let args =
            call_args(line, "E").ok_or_else(|| ParseError::NotAnEnvelope(line.to_string()))?;

        let mut parts = args.splitn(3, ',');
        let sender = field(parts.next(), "sender", line)?;
        let timestamp = field(parts.next(), "timestamp", line)?;
        let message = parts
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ParseError::MissingField {
                field: "message",
                line: line.to_string(),
            })?;

        Ok(Self::new(sender, timestamp, message))
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E({},{},{})", self.sender, self.timestamp, self.message)
    }
}

/// Identity a unit declares when it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hello {
    Unknown,
    Existing(PlayerId),
}

impl Hello {
    pub fn parse(message: &str) -> Result<Self, ParseError> {
        let args = call_args(message, "Hello")
            .ok_or_else(|| ParseError::UnknownMessage(message.to_string()))?;
        let mut parts = args.splitn(2, ',');
        let team: i64 = field(parts.next(), "team", message)?;
        if team == UNKNOWN_TEAM {
            return Ok(Hello::Unknown);
        }
        let team = u32::try_from(team).map_err(|_| ParseError::InvalidField {
            field: "team",
            line: message.to_string(),
        })?;
        let slot = field(parts.next(), "slot", message)?;
        Ok(Hello::Existing(PlayerId::new(team, slot)))
    }
}

impl fmt::Display for Hello {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hello::Unknown => write!(f, "Hello({},{})", UNKNOWN_TEAM, UNKNOWN_TEAM),
            Hello::Existing(id) => write!(f, "Hello({},{})", id.team, id.slot),
        }
    }
}

/// One action segment of a receive report, as a unit would send it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Hit { source: PlayerId, damage: u32 },
    Trigger,
    TriggerRelease,
    FullAmmo,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Hit { source, damage } => {
                write!(f, "H{},{},{}", source.team, source.slot, damage)
            }
            Report::Trigger => write!(f, "T"),
            Report::TriggerRelease => write!(f, "t"),
            Report::FullAmmo => write!(f, "FA"),
        }
    }
}

impl Report {
    /// Formats a `Recv(...)` message carrying `reports` for the unit at `target`.
    pub fn recv(target: PlayerId, reports: &[Report]) -> String {
        let segments: Vec<String> = reports.iter().map(Report::to_string).collect();
        format!("Recv({},{},{})", target.team, target.slot, segments.join(";"))
    }
}

/// A rule-relevant interpretation of an event message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hit {
        target: PlayerId,
        source: PlayerId,
        damage: u32,
    },
    Trigger {
        target: PlayerId,
    },
    FullAmmo {
        target: PlayerId,
    },
    Hello(Hello),
}

fn parse_recv(message: &str) -> Option<(PlayerId, &str)> {
    let args = call_args(message, "Recv")?;
    let mut parts = args.splitn(3, ',');
    let team = parts.next()?.trim().parse().ok()?;
    let slot = parts.next()?.trim().parse().ok()?;
    Some((PlayerId::new(team, slot), parts.next().unwrap_or("")))
}

fn parse_hit(segment: &str) -> Option<(PlayerId, u32)> {
    let mut parts = segment.strip_prefix('H')?.split(',');
    let team = parts.next()?.trim().parse().ok()?;
    let slot = parts.next()?.trim().parse().ok()?;
    let damage = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((PlayerId::new(team, slot), damage))
}

/// Interprets `message` as every action kind it matches.
///
/// Kinds are tried independently in a fixed order (hits, trigger pulls, ammo
/// refills, join) so a composite message yields several actions and a
/// malformed segment only drops itself.
pub fn parse_actions(message: &str) -> Vec<Action> {
    let mut actions = Vec::new();

    if let Some((target, rest)) = parse_recv(message) {
        let segments: Vec<&str> = rest.split(';').map(str::trim).collect();

        actions.extend(
            segments
                .iter()
                .filter_map(|s| parse_hit(s))
                .map(|(source, damage)| Action::Hit {
                    target,
                    source,
                    damage,
                }),
        );
        actions.extend(
            segments
                .iter()
                .filter(|s| **s == "T")
                .map(|_| Action::Trigger { target }),
        );
        actions.extend(
            segments
                .iter()
                .filter(|s| **s == "FA")
                .map(|_| Action::FullAmmo { target }),
        );
    }

    if let Ok(hello) = Hello::parse(message) {
        actions.push(Action::Hello(hello));
    }

    actions
}

/// Messages the server queues for units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    Ack,
    TeamPlayer(PlayerId),
    StartGame { seconds: u64 },
    StopGame,
    ResetGame,
    Deleted,
}

impl ServerMessage {
    /// The message as a newline-terminated wire line.
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Ack => write!(f, "Ack()"),
            ServerMessage::TeamPlayer(id) => write!(f, "TeamPlayer({},{})", id.team, id.slot),
            ServerMessage::StartGame { seconds } => write!(f, "StartGame({})", seconds),
            ServerMessage::StopGame => write!(f, "StopGame()"),
            ServerMessage::ResetGame => write!(f, "ResetGame()"),
            ServerMessage::Deleted => write!(f, "Deleted()"),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let unknown = || ParseError::UnknownMessage(line.to_string());

        if let Some(args) = call_args(line, "TeamPlayer") {
            let mut parts = args.splitn(2, ',');
            let team = field(parts.next(), "team", line)?;
            let slot = field(parts.next(), "slot", line)?;
            return Ok(ServerMessage::TeamPlayer(PlayerId::new(team, slot)));
        }
        if let Some(args) = call_args(line, "StartGame") {
            let seconds = field(Some(args), "seconds", line)?;
            return Ok(ServerMessage::StartGame { seconds });
        }

        match line {
            "Ack()" => Ok(ServerMessage::Ack),
            "StopGame()" => Ok(ServerMessage::StopGame),
            "ResetGame()" => Ok(ServerMessage::ResetGame),
            "Deleted()" => Ok(ServerMessage::Deleted),
            _ => Err(unknown()),
        }
    }
}
