//! CLI flags plus an optional TOML file for ambient tunables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[clap(version = clap::crate_version!(), author = clap::crate_authors!())]
pub struct Args {
    /// Turn debugging information on
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Optional path to a TOML file of ambient tunables; every field defaults when the file is
    /// absent or a key is missing from it.
    #[clap(long)]
    pub config: Option<PathBuf>,
}

/// Ambient tunables for the coordinator and its channel actors. Nothing here changes the core's
/// observable command semantics; it only shapes how much concurrency and buffering the
/// plumbing around it gets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of actix arbiters channel actors (and their party-flow forwarding tasks) are
    /// spread across, so one busy channel's fan-out can't starve another's mailbox.
    pub channel_threads: usize,

    /// Capacity of each subscriber's outbound fan-out sink. A full sink drops that one delivery
    /// rather than blocking the other subscribers.
    pub outbound_buffer_capacity: usize,

    /// How long a party flow may sit idle before a transport should consider its kill switch
    /// abandoned. The core never acts on this itself; it's exposed so every transport
    /// built against this crate starts from the same default instead of inventing its own.
    #[serde(with = "serde_humantime")]
    pub party_idle_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_threads: 4,
            outbound_buffer_capacity: 32,
            party_idle_grace: Duration::from_secs(120),
        }
    }
}

impl Config {
    /// Loads tunables from an optional TOML file. `None` (no `--config` flag) yields the plain
    /// defaults; a present file only needs to set the keys it wants to override.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
