//! Simulated-UDP runs using turmoil.
//!
//! Every node is a turmoil client with its own UDP socket. Link latency is
//! fixed so datagrams between two hosts keep their order.

mod common;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use common::{Occupancy, init_tracing};
use dlock_core::error::TransportError;
use dlock_core::transport::MAX_DATAGRAM;
use dlock_core::{
    Algorithm, GroupId, LamportNode, NodeConfig, NodeId, RaymondNode, Transport,
};
use error_stack::{Report, ResultExt};
use turmoil::Builder;

const PORT: u16 = 7000;

/// Turmoil's UDP socket behind the crate's transport trait.
struct SimUdp(turmoil::net::UdpSocket);

impl SimUdp {
    async fn bind() -> std::io::Result<Self> {
        turmoil::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, PORT))
            .await
            .map(Self)
    }
}

impl Transport for SimUdp {
    type Addr = SocketAddr;

    async fn send(&self, to: &SocketAddr, payload: Bytes) -> Result<(), Report<TransportError>> {
        self.0
            .send_to(&payload, *to)
            .await
            .change_context(TransportError::Io)?;
        Ok(())
    }

    async fn recv(&self) -> Result<Bytes, Report<TransportError>> {
        let mut buf = vec![0; MAX_DATAGRAM];
        let (len, _) = self
            .0
            .recv_from(&mut buf)
            .await
            .change_context(TransportError::Io)?;
        buf.truncate(len);
        Ok(Bytes::from(buf))
    }
}

fn host_name(id: NodeId) -> String {
    format!("node-{id}")
}

fn sim_addr(id: NodeId) -> SocketAddr {
    SocketAddr::from((turmoil::lookup(host_name(id)), PORT))
}

/// Passes node through the section `iterations` times, then keeps its receive
/// loop alive until every node is done so it can still relay messages.
async fn drive<A: Algorithm>(
    node: Arc<A>,
    iterations: usize,
    occupancy: Arc<Occupancy>,
    finished: Arc<AtomicUsize>,
    total: usize,
) {
    let receive_loop = tokio::spawn(Arc::clone(&node).run());

    // let every host bind before the first request
    tokio::time::sleep(Duration::from_millis(100)).await;

    for _ in 0..iterations {
        node.request_entry(GroupId::UNTAGGED).await;
        node.await_entry().await;
        node.enter_section().await;
        occupancy.enter();
        tokio::time::sleep(Duration::from_millis(20)).await;
        occupancy.leave();
        node.leave_section().await;
    }

    finished.fetch_add(1, Ordering::SeqCst);
    while finished.load(Ordering::SeqCst) < total {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    receive_loop.abort();
}

fn simulation() -> turmoil::Sim<'static> {
    Builder::new()
        .simulation_duration(Duration::from_secs(120))
        .min_message_latency(Duration::from_millis(2))
        .max_message_latency(Duration::from_millis(2))
        .build()
}

#[test]
fn turmoil_raymond_tree() {
    let _guard = init_tracing();
    let mut sim = simulation();

    const NODES: u32 = 5;
    let occupancy = Arc::new(Occupancy::default());
    let finished = Arc::new(AtomicUsize::new(0));

    for id in (0..NODES).map(NodeId) {
        let occupancy = Arc::clone(&occupancy);
        let finished = Arc::clone(&finished);
        sim.client(host_name(id), async move {
            let transport = Arc::new(SimUdp::bind().await?);
            let config = NodeConfig::binary_tree(id, NODES, sim_addr);
            let node = Arc::new(RaymondNode::new(config, transport));
            drive(node, 2, occupancy, finished, NODES as usize).await;
            Ok(())
        });
    }

    sim.run().unwrap();
    assert_eq!(occupancy.peak(), 1);
    assert_eq!(occupancy.entries(), 10);
}

#[test]
fn turmoil_lamport_mesh() {
    let _guard = init_tracing();
    let mut sim = simulation();

    const NODES: u32 = 3;
    let occupancy = Arc::new(Occupancy::default());
    let finished = Arc::new(AtomicUsize::new(0));

    for id in (0..NODES).map(NodeId) {
        let occupancy = Arc::clone(&occupancy);
        let finished = Arc::clone(&finished);
        sim.client(host_name(id), async move {
            let transport = Arc::new(SimUdp::bind().await?);
            let config = NodeConfig::full_mesh(id, NODES, sim_addr);
            let node = Arc::new(LamportNode::new(config, transport));
            drive(node, 2, occupancy, finished, NODES as usize).await;
            Ok(())
        });
    }

    sim.run().unwrap();
    assert_eq!(occupancy.peak(), 1);
    assert_eq!(occupancy.entries(), 6);
}
