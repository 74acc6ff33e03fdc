//! Bridge-crossing peer.
//!
//! `peer drive` runs one mutual-exclusion node over UDP and drives a car
//! around a figure-eight track whose single-lane bridge is the critical
//! section. `peer bench` runs whole clusters in-process and compares the
//! message cost and waiting time of the four algorithms.

#![warn(clippy::pedantic)]

mod bench;
mod car;
mod cli;
mod display;
mod drive;
mod track;

use std::fmt;

use clap::Parser;
use error_stack::Report;

use crate::cli::{Cli, Command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerError {
    /// Arguments do not describe a usable cluster.
    Config,
    /// The peer socket could not be bound.
    Bind,
    /// Position reports could not be delivered.
    Display,
    /// The receive loop stopped with an error.
    Transport,
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::Config => f.write_str("invalid peer configuration"),
            PeerError::Bind => f.write_str("failed to bind peer socket"),
            PeerError::Display => f.write_str("failed to report position"),
            PeerError::Transport => f.write_str("peer transport failed"),
        }
    }
}

impl std::error::Error for PeerError {}

#[tokio::main]
async fn main() -> Result<(), Report<PeerError>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Drive(args) => drive::run(args).await,
        Command::Bench(args) => {
            bench::run(&args).await;
            Ok(())
        }
    }
}
