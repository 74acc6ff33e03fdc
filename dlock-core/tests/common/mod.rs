//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dlock_core::{Algorithm, GroupId, MemoryNetwork, MemoryTransport, NodeConfig, NodeId};

/// Initialize tracing for tests. Call at the start of each test.
/// Uses `RUST_LOG` for filtering (defaults to debug for this crate).
pub fn init_tracing() -> impl Sized {
    use tracing::Dispatch;
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dlock_core=debug")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_test_writer()
        .finish();

    // thread-local default; the guard restores the previous one on drop
    let dispatch = Dispatch::new(subscriber);
    tracing::dispatcher::set_default(&dispatch)
}

/// Builds `size` nodes on one in-memory network using `config` for each id.
pub fn cluster<A>(
    size: u32,
    config: impl Fn(NodeId) -> NodeConfig<NodeId>,
    node: impl Fn(NodeConfig<NodeId>, Arc<MemoryTransport>) -> A,
) -> (MemoryNetwork, Vec<Arc<A>>) {
    let network = MemoryNetwork::new();
    let nodes = (0..size)
        .map(NodeId)
        .map(|id| {
            let transport = Arc::new(network.join(id));
            Arc::new(node(config(id), transport))
        })
        .collect();
    (network, nodes)
}

pub fn mesh(size: u32) -> impl Fn(NodeId) -> NodeConfig<NodeId> {
    move |id| NodeConfig::full_mesh(id, size, |n| n)
}

pub fn tree(size: u32) -> impl Fn(NodeId) -> NodeConfig<NodeId> {
    move |id| NodeConfig::binary_tree(id, size, |n| n)
}

/// Delivers every queued datagram, node by node, until the network is quiet.
/// Returns the number of datagrams delivered.
pub async fn settle<A>(nodes: &[Arc<A>]) -> usize
where
    A: Algorithm<Transport = MemoryTransport>,
{
    let mut total = 0;
    loop {
        let mut delivered = 0;
        for node in nodes {
            while let Some(payload) = node.transport().try_recv() {
                node.on_message(&payload).await;
                delivered += 1;
            }
        }
        if delivered == 0 {
            return total;
        }
        total += delivered;
    }
}

/// Whether `await_entry` completes within a second of (virtual) time.
pub async fn enters<A: Algorithm>(node: &A) -> bool {
    tokio::time::timeout(Duration::from_secs(1), node.await_entry())
        .await
        .is_ok()
}

/// Tracks how many nodes are inside the section at once.
#[derive(Debug, Default)]
pub struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
    entries: AtomicUsize,
}

impl Occupancy {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.entries.fetch_add(1, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn entries(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }
}

/// Runs every node's receive loop and has each node pass through the section
/// `iterations` times. `group_of` picks a node's group; nodes it maps to
/// `None` only relay messages.
pub async fn drive_all<A>(
    nodes: &[Arc<A>],
    iterations: usize,
    group_of: impl Fn(NodeId) -> Option<GroupId>,
) -> Arc<Occupancy>
where
    A: Algorithm,
{
    let occupancy = Arc::new(Occupancy::default());
    let loops: Vec<_> = nodes
        .iter()
        .map(|node| tokio::spawn(Arc::clone(node).run()))
        .collect();

    let drivers: Vec<_> = nodes
        .iter()
        .filter_map(|node| Some((Arc::clone(node), group_of(node.id())?)))
        .map(|(node, group)| {
            let occupancy = Arc::clone(&occupancy);
            tokio::spawn(async move {
                for _ in 0..iterations {
                    node.request_entry(group.clone()).await;
                    node.await_entry().await;
                    node.enter_section().await;
                    assert!(node.in_section().await);
                    occupancy.enter();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    occupancy.leave();
                    node.leave_section().await;
                }
            })
        })
        .collect();

    let all = futures::future::join_all(drivers);
    let results = tokio::time::timeout(Duration::from_secs(600), all)
        .await
        .expect("every node finishes its iterations");
    for result in results {
        result.expect("driver task panicked");
    }

    for handle in loops {
        handle.abort();
    }
    occupancy
}

/// Tracks which groups are inside the section. Entering while a node of
/// another group is inside counts as a conflict.
#[derive(Debug, Default)]
pub struct GroupOccupancy {
    inside: Mutex<BTreeMap<GroupId, usize>>,
    conflicts: AtomicUsize,
    entries: AtomicUsize,
}

impl GroupOccupancy {
    pub fn enter(&self, group: &GroupId) {
        let mut inside = self.inside.lock().unwrap();
        if inside.iter().any(|(g, &n)| g != group && n > 0) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        *inside.entry(group.clone()).or_default() += 1;
        self.entries.fetch_add(1, Ordering::SeqCst);
    }

    pub fn leave(&self, group: &GroupId) {
        let mut inside = self.inside.lock().unwrap();
        if let Some(n) = inside.get_mut(group) {
            *n -= 1;
        }
    }

    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    pub fn entries(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }
}

/// Like [`drive_all`], but node `id` starts after `3 * id` ms and gives up
/// on an entry after `patience(id)`: it withdraws with `leave_section` and
/// stops iterating. Returns the occupancy and the number of nodes that gave
/// up.
pub async fn drive_with_patience<A>(
    nodes: &[Arc<A>],
    iterations: usize,
    group_of: impl Fn(NodeId) -> GroupId,
    patience: impl Fn(NodeId) -> Duration,
) -> (Arc<GroupOccupancy>, usize)
where
    A: Algorithm,
{
    let occupancy = Arc::new(GroupOccupancy::default());
    let loops: Vec<_> = nodes
        .iter()
        .map(|node| tokio::spawn(Arc::clone(node).run()))
        .collect();

    let drivers: Vec<_> = nodes
        .iter()
        .map(|node| {
            let node = Arc::clone(node);
            let occupancy = Arc::clone(&occupancy);
            let group = group_of(node.id());
            let patience = patience(node.id());
            let stagger = Duration::from_millis(3 * u64::from(node.id().0));
            tokio::spawn(async move {
                tokio::time::sleep(stagger).await;
                for _ in 0..iterations {
                    node.request_entry(group.clone()).await;
                    if tokio::time::timeout(patience, node.await_entry()).await.is_err() {
                        node.leave_section().await;
                        return true;
                    }
                    node.enter_section().await;
                    occupancy.enter(&group);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    occupancy.leave(&group);
                    node.leave_section().await;
                }
                false
            })
        })
        .collect();

    let all = futures::future::join_all(drivers);
    let results = tokio::time::timeout(Duration::from_secs(600), all)
        .await
        .expect("every node finishes or gives up");
    let gave_up = results
        .into_iter()
        .map(|r| r.expect("driver task panicked"))
        .filter(|&gave_up| gave_up)
        .count();

    for handle in loops {
        handle.abort();
    }
    (occupancy, gave_up)
}
