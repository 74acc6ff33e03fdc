//! Command-line interface.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use clap::{Args, Parser, Subcommand, ValueEnum};
use dlock_core::{GroupId, NodeConfig, NodeId};

use crate::track::Direction;

#[derive(Parser, Debug)]
#[command(name = "peer")]
#[command(about = "Distributed bridge-crossing peer and lock benchmark")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one node over UDP and drive a car around the track
    Drive(DriveArgs),
    /// Run whole clusters in-process and compare the algorithms
    Bench(BenchArgs),
}

#[derive(Args, Debug)]
pub struct DriveArgs {
    /// Id of this peer; it listens on `base-port + id`
    #[arg(short, long)]
    pub id: u32,

    #[arg(short, long, value_enum, default_value_t = AlgorithmKind::Lamport)]
    pub algorithm: AlgorithmKind,

    /// Number of peers in the cluster
    #[arg(short, long, default_value_t = 4)]
    pub nodes: u32,

    /// Initial privilege holder (defaults to the topology's root)
    #[arg(long)]
    pub holder: Option<u32>,

    /// Tokens in the system (raymond-k-entry)
    #[arg(short, long, default_value_t = 2)]
    pub tokens: usize,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(long, default_value_t = 7000)]
    pub base_port: u16,

    /// Where position reports are sent
    #[arg(long, default_value = "127.0.0.1:7500")]
    pub display: SocketAddr,

    /// Do not send position reports
    #[arg(long)]
    pub no_display: bool,

    #[arg(long, default_value_t = 5)]
    pub laps: usize,

    /// Pause after each position report, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub step_ms: u64,

    /// Start-up delay range in seconds, so the other peers can boot
    #[arg(long, default_value_t = 6)]
    pub min_start_delay: u64,

    #[arg(long, default_value_t = 11)]
    pub max_start_delay: u64,
}

#[derive(Args, Debug, Clone)]
pub struct BenchArgs {
    /// Cluster sizes to measure
    #[arg(long, value_delimiter = ',', default_values_t = [3, 6, 9, 12])]
    pub sizes: Vec<u32>,

    #[arg(long, value_enum, value_delimiter = ',', default_values_t = AlgorithmKind::ALL)]
    pub algorithms: Vec<AlgorithmKind>,

    /// Sections entered per node
    #[arg(short, long, default_value_t = 5)]
    pub iterations: usize,

    /// Tokens in the system (raymond-k-entry)
    #[arg(short, long, default_value_t = 2)]
    pub tokens: usize,

    /// Time spent inside the section, in milliseconds
    #[arg(long, default_value_t = 5)]
    pub hold_ms: u64,

    /// Give up on an entry after this many seconds
    #[arg(long, default_value_t = 5)]
    pub patience_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmKind {
    Lamport,
    LamportKEntry,
    Raymond,
    RaymondKEntry,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 4] = [
        AlgorithmKind::Lamport,
        AlgorithmKind::LamportKEntry,
        AlgorithmKind::Raymond,
        AlgorithmKind::RaymondKEntry,
    ];

    /// Raymond runs over a binary tree, everything else over a full mesh.
    pub fn config<A>(
        self,
        id: NodeId,
        size: u32,
        tokens: usize,
        addr: impl Fn(NodeId) -> A,
    ) -> NodeConfig<A> {
        match self {
            AlgorithmKind::Raymond => NodeConfig::binary_tree(id, size, addr),
            _ => NodeConfig::full_mesh(id, size, addr).with_tokens(tokens),
        }
    }

    /// Group a node asks for when it does not drive a car.
    #[must_use]
    pub fn default_group(self, id: NodeId) -> GroupId {
        match self {
            AlgorithmKind::LamportKEntry | AlgorithmKind::RaymondKEntry => {
                Direction::initial(id).group()
            }
            AlgorithmKind::Lamport | AlgorithmKind::Raymond => GroupId::UNTAGGED,
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.pad(value.get_name()),
            None => write!(f, "{self:?}"),
        }
    }
}
