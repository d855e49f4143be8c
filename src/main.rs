//! # Muse Graph
//!
//! Command-line driver for the graph-based next-track recommender. The
//! engine itself lives in the `muse_graph` library; this binary loads a
//! catalog, opens the engine on a snapshot and feeds it requests.
//!
//! ## Usage
//!
//! ```bash
//! # Learn from a listening log and see where recommendations came from
//! muse-graph replay events.jsonl --catalog catalog.jsonl
//!
//! # One recommendation for user 7, who just played 150 s of track 12
//! muse-graph recommend --catalog catalog.jsonl --user 7 --track 12 --time 150
//!
//! # Inspect the saved model
//! muse-graph stats --top 20
//! ```

mod cli;
mod completion;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use serde::Deserialize;

use muse_graph::{config, EngineConfig, GraphEngine, InMemoryCatalog, Snapshot, Source, TrackId, UserId};

/// One line of a replay file: the play that just ended.
#[derive(Debug, Deserialize)]
struct ListenEvent {
    user: UserId,
    #[serde(default)]
    track: Option<TrackId>,
    #[serde(default)]
    time: f64,
}

fn resolve_snapshot_path(snapshot: Option<PathBuf>) -> Result<PathBuf> {
    match snapshot {
        Some(path) => Ok(path),
        None => config::get_snapshot_path().context("Failed to determine the default snapshot path"),
    }
}

/// Load catalog and config, then open the engine on the snapshot.
fn open_engine(opts: &cli::EngineOpts) -> Result<GraphEngine> {
    let catalog = InMemoryCatalog::from_jsonl(&opts.catalog)
        .with_context(|| format!("Failed to load catalog {}", opts.catalog.display()))?;

    let mut engine_config = match &opts.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if opts.snapshot.is_some() || engine_config.snapshot_path.is_none() {
        engine_config.snapshot_path = Some(resolve_snapshot_path(opts.snapshot.clone())?);
    }

    Ok(GraphEngine::open(engine_config, Arc::new(catalog)))
}

fn source_label(source: &Source) -> String {
    match source {
        Source::Graph => "graph".to_string(),
        Source::GlobalRank { .. } => "graph (global rank)".to_string(),
        Source::Fallback { tier, .. } => tier.to_string(),
    }
}

fn replay(events: &Path, opts: &cli::EngineOpts, print: bool) -> Result<()> {
    let engine = open_engine(opts)?;
    let file = File::open(events).with_context(|| format!("Failed to open events {}", events.display()))?;

    let mut sources: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0usize;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", events.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ListenEvent = serde_json::from_str(&line)
            .with_context(|| format!("Malformed event on line {} of {}", index + 1, events.display()))?;

        let rec = engine.recommend(event.user, event.track, event.time);
        if print {
            println!("user {} -> {} ({})", event.user, rec.track, source_label(&rec.source));
        }
        *sources.entry(source_label(&rec.source)).or_default() += 1;
        total += 1;
    }

    info!("Replayed {total} events from {}", events.display());
    println!("Replayed {total} events");
    for (label, count) in &sources {
        let share = if total > 0 { 100.0 * *count as f64 / total as f64 } else { 0.0 };
        println!("  {label:<16} {count:>8} ({share:.1}%)");
    }

    let stats = engine.stats();
    println!(
        "Graph: {} tracks, {} transitions; {} artists, {} artist transitions; {} users",
        stats.track_nodes, stats.track_edges, stats.artist_nodes, stats.artist_edges, stats.users
    );
    engine.shutdown();
    Ok(())
}

fn show_stats(snapshot: Option<PathBuf>, top: usize) -> Result<()> {
    let path = resolve_snapshot_path(snapshot)?;
    let snapshot = Snapshot::load(&path).with_context(|| format!("Failed to load snapshot {}", path.display()))?;

    println!("Snapshot {} (version {})", path.display(), snapshot.version);
    println!(
        "  tracks: {} nodes, {} edges",
        snapshot.track_graph.node_count(),
        snapshot.track_graph.edge_count()
    );
    println!(
        "  artists: {} nodes, {} edges",
        snapshot.artist_graph.node_count(),
        snapshot.artist_graph.edge_count()
    );
    println!("  users with history: {}", snapshot.user_history.len());
    println!("  tracks with listen samples: {}", snapshot.listen_times.len());

    if snapshot.track_ranks.is_empty() {
        println!("  no global rank yet");
    } else {
        println!("  top {} of {} ranked tracks:", top, snapshot.track_ranks.len());
        for (position, (track, score)) in snapshot.track_ranks.top(top).into_iter().enumerate() {
            println!("  {:>3}. {track:<12} {score:.6}", position + 1);
        }
    }
    Ok(())
}

/// Main entry point for the muse-graph binary.
///
/// Logging goes through `env_logger`, controlled via `RUST_LOG`:
/// - `RUST_LOG=debug muse-graph replay ...` - Show every fallback taken
/// - `RUST_LOG=muse_graph::rank=debug muse-graph rerank ...` - Rank solver only
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Replay { events, engine, print } => {
            replay(&events, &engine, print)?;
        }
        cli::Command::Recommend { engine: opts, user, track, time } => {
            let engine = open_engine(&opts)?;
            let rec = engine.recommend(user, track, time);
            debug!("Recommendation for user {user}: {rec:?}");
            println!("{}", rec.track);
            match &rec.source {
                Source::Graph => {}
                Source::GlobalRank { reason } => eprintln!("via graph successors on the global rank: {reason}"),
                Source::Fallback { tier, reason } => eprintln!("via {tier} fallback: {reason}"),
            }
            engine.shutdown();
        }
        cli::Command::Stats { snapshot, top } => {
            show_stats(snapshot, top)?;
        }
        cli::Command::Rerank { engine: opts } => {
            let engine = open_engine(&opts)?;
            engine.refresh_now();
            let ranked = engine.global_rank().len();
            if ranked == 0 {
                println!("Graph too small to rank ({} tracks)", engine.stats().track_nodes);
            } else {
                println!("Ranked {ranked} tracks");
            }
            engine.shutdown();
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
    }

    Ok(())
}
