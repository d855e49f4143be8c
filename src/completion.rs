//! # Shell Completion Module
//!
//! Completion scripts for `muse-graph`, generated by clap_complete from the
//! clap command definition.
//!
//! ```bash
//! muse-graph completion zsh > ~/.config/zsh/completions/_muse-graph
//! ```

use crate::cli::Shell;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io;

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
pub fn shell_to_completion_shell(shell: &Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}
