//! # Laser Tag Server Library
//!
//! This library provides the authoritative server for a laser tag arena. Hardware
//! units (guns and vests) connect over TCP, report gameplay events stamped with
//! their own clocks, and receive roster assignments and match control messages.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game State
//! The server owns the roster of `(team, slot)` players with their health and
//! ammunition. Units never decide the outcome of a hit themselves; they report
//! what they observed and the server applies the game rules.
//!
//! ### Event Reconciliation
//! Units are clocked independently and reach the server over separate
//! connections, so reports arrive out of order. The engine keeps a checkpoint
//! and replays every newer event in timestamp order whenever one arrives, so
//! late reports land where they belong:
//! - Per-sender clocks give a watermark below which nothing can still arrive
//! - The checkpoint advances once the watermark moves far enough ahead
//! - Join side effects fire once however often an event is replayed
//!
//! ### Match Control
//! Matches are started, stopped and reset by the operator. A running match
//! stops itself when its time is up, and late joiners learn how much is left.
//!
//! ## Architecture Design
//!
//! ### One Lock, Many Connections
//! Each connection gets its own reader and writer task. All of them, the
//! operator console and the match timer share a single [`handle::GameHandle`]
//! whose lock serializes every change to the game.
//!
//! ### Line Protocol
//! Messages are single text lines such as `E(3,1042,Recv(1,2,H2,1,1))` and
//! `TeamPlayer(1,2)`. The grammar lives in the `shared` crate so the test
//! client speaks exactly what the server parses.
//!
//! ### Pluggable Boundaries
//! The engine talks to the transport through [`registry::ConnectionRegistry`]
//! and to passive watchers through [`observer::Observer`], which keeps it
//! testable without sockets.
//!
//! ## Module Organization
//!
//! ### Rules Module (`rules`)
//! Pure functions applying a hit, a trigger pull or a reload to one player.
//!
//! ### Game Module (`game`)
//! The roster with its team and slot bounds, joins, moves and deletions.
//!
//! ### Engine Module (`engine`)
//! Checkpointing, the pending log and replay, plus match control barriers.
//!
//! ### Clock Module (`clock`)
//! Match timing and the cancellable automatic stop.
//!
//! ### Registry Module (`registry`)
//! Connection bookkeeping and outbound message routing by identity.
//!
//! ### Network Module (`network`)
//! TCP accept loop, line framing and per-connection tasks.
//!
//! ### Console Module (`console`)
//! Operator commands read from standard input.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::observer::LogObserver;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let mut server = Server::bind(&config, Arc::new(LogObserver)).await?;
//!
//!     // Start the first match right away
//!     server.game().start_match().await?;
//!
//!     // Accepts units until shutdown or a fatal error
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod game;
pub mod handle;
pub mod network;
pub mod observer;
pub mod registry;
pub mod rules;
