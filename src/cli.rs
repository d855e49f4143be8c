//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `muse-graph` binary. The binary drives a
//! [`muse_graph::GraphEngine`] from files: a JSONL catalog, a JSONL stream of
//! listen events, and the snapshot the engine persists between runs.
//!
//! ## Commands
//!
//! - `replay`: Feed listen events through the engine and summarise the results
//! - `recommend`: Ask for one next track
//! - `stats`: Describe a snapshot
//! - `rerank`: Recompute the global rank and save
//! - `completion`: Print a shell completion script
//!
//! ## Examples
//!
//! ```bash
//! muse-graph replay events.jsonl --catalog catalog.jsonl
//! muse-graph recommend --catalog catalog.jsonl --user 7 --track 12 --time 150
//! muse-graph stats
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser)]
#[command(name = "muse-graph")]
#[command(about = "Muse Graph: next-track recommendations from listening transitions")]
#[command(version)]
pub struct Args {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command that builds an engine.
#[derive(clap::Args, Debug, Clone)]
pub struct EngineOpts {
    /// JSONL catalog, one `{"track", "artist", "duration"}` object per line
    #[arg(long, env = "MUSE_GRAPH_CATALOG")]
    pub catalog: PathBuf,

    /// Snapshot file (defaults to the platform data directory)
    #[arg(long, env = "MUSE_GRAPH_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// JSON engine config; unset fields keep their defaults
    #[arg(long, env = "MUSE_GRAPH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Replay listen events through the engine
    ///
    /// Each line of the events file is `{"user": id, "track": id, "time": seconds}`.
    /// The track and time describe the play that just ended; the engine
    /// learns from it and recommends what comes next. A summary of where the
    /// recommendations came from is printed at the end and the snapshot is saved.
    Replay {
        /// JSONL file of listen events
        events: PathBuf,

        #[command(flatten)]
        engine: EngineOpts,

        /// Print every recommendation as it is made
        #[arg(long)]
        print: bool,
    },

    /// Recommend one next track
    Recommend {
        #[command(flatten)]
        engine: EngineOpts,

        /// User to recommend for
        #[arg(long)]
        user: u64,

        /// Track the user just played; omit for a cold start
        #[arg(long)]
        track: Option<u64>,

        /// Seconds of that track the user listened to
        #[arg(long, default_value = "0")]
        time: f64,
    },

    /// Show graph, user and rank statistics for a snapshot
    Stats {
        /// Snapshot file (defaults to the platform data directory)
        #[arg(long, env = "MUSE_GRAPH_SNAPSHOT")]
        snapshot: Option<PathBuf>,

        /// How many top-ranked tracks to list
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Recompute the global rank and save the snapshot
    Rerank {
        #[command(flatten)]
        engine: EngineOpts,
    },

    /// Generate shell completion scripts
    ///
    /// ```bash
    /// muse-graph completion bash > ~/.local/share/bash-completion/completions/muse-graph
    /// ```
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}
