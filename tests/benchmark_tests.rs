//! Performance benchmarks and stress tests for event reconciliation

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use server::config::ServerConfig;
use server::engine::ReconciliationEngine;
use server::game::GameState;
use server::observer::LogObserver;
use server::registry::{ClientRegistry, ConnectionId};
use shared::{EventEnvelope, PlayerId, Report, SenderId, Timestamp, MAX_HEALTH};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

const SENDERS: u32 = 6;

/// Benchmarks ingest with the checkpoint advancing as it would in a match
#[test]
fn benchmark_ingest_throughput() {
    let mut engine = started_engine(ServerConfig::default());
    let mut rng = StdRng::seed_from_u64(7);
    let events = generate_events(&mut rng, 5_000, random_report);

    let start = Instant::now();
    for (sender, line) in &events {
        engine.ingest(ConnectionId(*sender as u64), line).unwrap();
    }
    let duration = start.elapsed();

    println!(
        "Ingest: {} events in {:?} ({:.2} μs/event), {} pending at the end",
        events.len(),
        duration,
        duration.as_micros() as f64 / events.len() as f64,
        engine.pending().len()
    );

    // Round-robin delivery keeps the watermark moving, so the log stays short
    assert!(engine.pending().len() < 100);
    assert!(duration.as_secs() < 5);
}

/// Benchmarks a replay over a long pending log that never checkpoints
#[test]
fn benchmark_long_replay() {
    let config = ServerConfig {
        min_checkpoint_interval: u64::MAX,
        ..ServerConfig::default()
    };
    let mut engine = started_engine(config);
    let mut rng = StdRng::seed_from_u64(11);
    let events = generate_events(&mut rng, 500, random_report);

    let start = Instant::now();
    for (sender, line) in &events {
        engine.ingest(ConnectionId(*sender as u64), line).unwrap();
    }
    let duration = start.elapsed();

    println!(
        "Uncheckpointed replay: {} events in {:?}",
        events.len(),
        duration
    );

    let replayed = engine
        .pending()
        .iter()
        .filter(|entry| entry.event().is_some())
        .count();
    assert_eq!(replayed, events.len());
    assert!(duration.as_secs() < 10);
}

/// Tests that any delivery order preserving each sender's own order converges
#[test]
fn replay_is_independent_of_delivery_order() {
    let config = ServerConfig {
        min_checkpoint_interval: u64::MAX,
        ..ServerConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(42);
    let events = generate_events(&mut rng, 400, random_report);

    let reference = deliver(started_engine(config.clone()), events.iter().cloned());

    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(seed);
        let shuffled = interleave(&mut rng, &events);
        let state = deliver(started_engine(config.clone()), shuffled.into_iter());
        assert_eq!(state, reference, "delivery order {} diverged", seed);
    }
}

/// Tests that hits converge under shuffled delivery even with checkpointing
#[test]
fn hits_converge_with_checkpoints() {
    let mut rng = StdRng::seed_from_u64(3);
    let events = generate_events(&mut rng, 300, random_hit);

    let reference = deliver(
        started_engine(ServerConfig::default()),
        events.iter().cloned(),
    );
    assert!(reference
        .players
        .values()
        .any(|player| player.health < MAX_HEALTH));

    for seed in 10..15 {
        let mut rng = StdRng::seed_from_u64(seed);
        let shuffled = interleave(&mut rng, &events);
        let state = deliver(started_engine(ServerConfig::default()), shuffled.into_iter());
        assert_eq!(state, reference, "delivery order {} diverged", seed);
    }
}

/// Tests that the watermark never moves backwards or past the slowest sender
#[test]
fn watermark_is_monotonic_and_bounded() {
    let mut engine = started_engine(ServerConfig::default());
    let mut rng = StdRng::seed_from_u64(99);
    let events = generate_events(&mut rng, 2_000, random_report);
    let shuffled = interleave(&mut rng, &events);

    // Every unit reports in before the match traffic starts
    for sender in 1..=SENDERS {
        let message = Report::recv(PlayerId::new(1, 1), &[Report::TriggerRelease]);
        let line = EventEnvelope::new(sender, 0, message).to_string();
        engine.ingest(ConnectionId(sender as u64), &line).unwrap();
    }

    let mut previous = engine.watermark();
    for (sender, line) in shuffled {
        engine.ingest(ConnectionId(sender as u64), &line).unwrap();

        let watermark = engine.watermark();
        let slowest = (1..=SENDERS)
            .filter_map(|sender| engine.last_seen(sender))
            .min()
            .unwrap();

        assert!(watermark >= previous, "watermark moved backwards");
        assert!(watermark <= slowest, "watermark passed the slowest sender");
        previous = watermark;
    }
    assert!(previous > 0);
}

// HELPER FUNCTIONS

fn started_engine(config: ServerConfig) -> ReconciliationEngine {
    let mut engine = ReconciliationEngine::new(
        &config,
        Arc::new(ClientRegistry::new()),
        Arc::new(LogObserver),
    );
    engine.start_match(tokio::time::Instant::now()).unwrap();
    engine
}

fn random_target(rng: &mut StdRng) -> PlayerId {
    PlayerId::new(rng.gen_range(1..=2), rng.gen_range(1..=3))
}

fn random_hit(rng: &mut StdRng) -> Report {
    Report::Hit {
        source: random_target(rng),
        damage: rng.gen_range(0..=2),
    }
}

fn random_report(rng: &mut StdRng) -> Report {
    match rng.gen_range(0..10) {
        0..=3 => random_hit(rng),
        4..=7 => Report::Trigger,
        8 => Report::TriggerRelease,
        _ => Report::FullAmmo,
    }
}

/// Builds `count` event lines in global timestamp order.
///
/// Timestamps are unique across senders so the replay order is fully
/// determined by the timestamps alone.
fn generate_events(
    rng: &mut StdRng,
    count: usize,
    report: fn(&mut StdRng) -> Report,
) -> Vec<(SenderId, String)> {
    (0..count)
        .map(|i| {
            let sender = (i as u32 % SENDERS) + 1;
            let timestamp = (i as Timestamp + 1) * 3;
            let message = Report::recv(random_target(rng), &[report(rng)]);
            let line = EventEnvelope::new(sender, timestamp, message).to_string();
            (sender, line)
        })
        .collect()
}

/// Randomly interleaves the senders' streams, keeping each stream in order.
fn interleave(rng: &mut StdRng, events: &[(SenderId, String)]) -> Vec<(SenderId, String)> {
    let mut queues: Vec<VecDeque<(SenderId, String)>> = vec![VecDeque::new(); SENDERS as usize];
    for event in events {
        queues[(event.0 - 1) as usize].push_back(event.clone());
    }

    let mut delivered = Vec::with_capacity(events.len());
    while delivered.len() < events.len() {
        let queue = rng.gen_range(0..queues.len());
        if let Some(event) = queues[queue].pop_front() {
            delivered.push(event);
        }
    }
    delivered
}

fn deliver(
    mut engine: ReconciliationEngine,
    events: impl Iterator<Item = (SenderId, String)>,
) -> GameState {
    for (sender, line) in events {
        engine.ingest(ConnectionId(sender as u64), &line).unwrap();
    }
    engine.state().clone()
}
