//! `peer bench`: whole clusters on one in-memory network.
//!
//! Every node enters the section `iterations` times. Reported per algorithm
//! and cluster size: datagrams sent per node per entry, and the medians of
//! the time from request to entry and from request to exit.

use std::sync::Arc;
use std::time::Duration;

use dlock_core::{
    Algorithm, LamportKEntryNode, LamportNode, MemoryNetwork, MemoryTransport, NodeConfig, NodeId,
    RaymondKEntryNode, RaymondNode,
};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::cli::{AlgorithmKind, BenchArgs};

#[derive(Debug, Clone, Copy)]
struct Sample {
    wait: Duration,
    total: Duration,
}

#[derive(Debug, Clone)]
pub struct BenchResult {
    pub algorithm: AlgorithmKind,
    pub nodes: u32,
    pub messages_per_entry: f64,
    pub median_wait: Option<Duration>,
    pub median_total: Option<Duration>,
    /// Nodes that gave up on an entry and withdrew.
    pub stalled: usize,
}

pub async fn run(args: &BenchArgs) {
    println!(
        "{:<16} {:>5} {:>14} {:>12} {:>12} {:>7}",
        "algorithm", "nodes", "msgs/node/iter", "wait (ms)", "total (ms)", "stalled"
    );
    for &nodes in &args.sizes {
        for &algorithm in &args.algorithms {
            let result = bench(algorithm, nodes, args).await;
            println!(
                "{:<16} {:>5} {:>14.2} {:>12} {:>12} {:>7}",
                result.algorithm,
                result.nodes,
                result.messages_per_entry,
                millis(result.median_wait),
                millis(result.median_total),
                result.stalled,
            );
        }
    }
}

#[instrument(skip(args))]
pub async fn bench(algorithm: AlgorithmKind, nodes: u32, args: &BenchArgs) -> BenchResult {
    let network = MemoryNetwork::new();
    let config = |id| algorithm.config(id, nodes, args.tokens, |n| n);
    let (samples, stalled) = match algorithm {
        AlgorithmKind::Lamport => {
            measure(algorithm, cluster(&network, nodes, config, LamportNode::new), args).await
        }
        AlgorithmKind::LamportKEntry => {
            let cluster = cluster(&network, nodes, config, LamportKEntryNode::new);
            measure(algorithm, cluster, args).await
        }
        AlgorithmKind::Raymond => {
            measure(algorithm, cluster(&network, nodes, config, RaymondNode::new), args).await
        }
        AlgorithmKind::RaymondKEntry => {
            let cluster = cluster(&network, nodes, config, RaymondKEntryNode::new);
            measure(algorithm, cluster, args).await
        }
    };

    let entries = samples.len().max(1);
    #[expect(clippy::cast_precision_loss)]
    let messages_per_entry = network.messages_sent() as f64 / entries as f64;
    let result = BenchResult {
        algorithm,
        nodes,
        messages_per_entry,
        median_wait: median(samples.iter().map(|s| s.wait).collect()),
        median_total: median(samples.iter().map(|s| s.total).collect()),
        stalled,
    };
    info!(?result, "measured");
    result
}

fn cluster<A>(
    network: &MemoryNetwork,
    nodes: u32,
    config: impl Fn(NodeId) -> NodeConfig<NodeId>,
    node: impl Fn(NodeConfig<NodeId>, Arc<MemoryTransport>) -> A,
) -> Vec<Arc<A>> {
    (0..nodes)
        .map(NodeId)
        .map(|id| Arc::new(node(config(id), Arc::new(network.join(id)))))
        .collect()
}

/// Runs every node through its iterations and collects one sample per entry.
async fn measure<A: Algorithm>(
    algorithm: AlgorithmKind,
    nodes: Vec<Arc<A>>,
    args: &BenchArgs,
) -> (Vec<Sample>, usize) {
    let loops: Vec<_> = nodes
        .iter()
        .map(|node| tokio::spawn(Arc::clone(node).run()))
        .collect();

    let hold = Duration::from_millis(args.hold_ms);
    let patience = Duration::from_secs(args.patience_secs);
    let drivers: Vec<_> = nodes
        .into_iter()
        .map(|node| {
            let group = algorithm.default_group(node.id());
            let iterations = args.iterations;
            tokio::spawn(async move {
                let mut samples = Vec::with_capacity(iterations);
                for _ in 0..iterations {
                    let started = Instant::now();
                    node.request_entry(group.clone()).await;
                    if tokio::time::timeout(patience, node.await_entry()).await.is_err() {
                        warn!(node = %node.id(), "no entry granted, withdrawing");
                        node.leave_section().await;
                        return (samples, true);
                    }
                    let wait = started.elapsed();

                    node.enter_section().await;
                    tokio::time::sleep(hold).await;
                    node.leave_section().await;
                    samples.push(Sample {
                        wait,
                        total: started.elapsed(),
                    });
                }
                (samples, false)
            })
        })
        .collect();

    let mut samples = Vec::new();
    let mut stalled = 0;
    for result in futures::future::join_all(drivers).await {
        match result {
            Ok((node_samples, gave_up)) => {
                samples.extend(node_samples);
                stalled += usize::from(gave_up);
            }
            Err(error) => {
                warn!(?error, "benchmark driver failed");
                stalled += 1;
            }
        }
    }
    for handle in loops {
        handle.abort();
    }
    (samples, stalled)
}

fn median(mut values: Vec<Duration>) -> Option<Duration> {
    values.sort_unstable();
    values.get(values.len() / 2).copied()
}

fn millis(value: Option<Duration>) -> String {
    value.map_or_else(|| "-".to_owned(), |d| format!("{:.1}", d.as_secs_f64() * 1000.0))
}
