//! `peer drive`: one node over UDP behind a car.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use dlock_core::{
    Algorithm, LamportKEntryNode, LamportNode, NodeId, RaymondKEntryNode, RaymondNode,
    UdpTransport,
};
use error_stack::{Report, ResultExt};
use rand::Rng;
use tracing::{info, instrument};

use crate::PeerError;
use crate::car::Car;
use crate::cli::{AlgorithmKind, DriveArgs};
use crate::display::DisplayReporter;
use crate::track::Track;

pub async fn run(args: DriveArgs) -> Result<(), Report<PeerError>> {
    let id = NodeId(args.id);
    if args.id >= args.nodes {
        return Err(Report::new(PeerError::Config)
            .attach(format!("id {} is outside a cluster of {}", args.id, args.nodes)));
    }
    let addrs = (0..args.nodes)
        .map(|n| peer_addr(args.host, args.base_port, NodeId(n)))
        .collect::<Result<Vec<_>, _>>()?;
    let listen = addrs[args.id as usize];
    info!(%id, %listen, algorithm = %args.algorithm, "starting peer");

    let mut config = args
        .algorithm
        .config(id, args.nodes, args.tokens, |n| addrs[n.0 as usize]);
    if let Some(holder) = args.holder {
        config = config.with_holder(NodeId(holder));
    }

    let transport = Arc::new(
        UdpTransport::bind(listen)
            .await
            .change_context(PeerError::Bind)
            .attach_with(|| format!("listen address: {listen}"))?,
    );
    let display = if args.no_display {
        None
    } else {
        Some(DisplayReporter::connect(args.display).await?)
    };

    match args.algorithm {
        AlgorithmKind::Lamport => {
            drive(Arc::new(LamportNode::new(config, transport)), &args, display).await
        }
        AlgorithmKind::LamportKEntry => {
            drive(Arc::new(LamportKEntryNode::new(config, transport)), &args, display).await
        }
        AlgorithmKind::Raymond => {
            drive(Arc::new(RaymondNode::new(config, transport)), &args, display).await
        }
        AlgorithmKind::RaymondKEntry => {
            drive(Arc::new(RaymondKEntryNode::new(config, transport)), &args, display).await
        }
    }
}

#[instrument(skip_all, fields(node = %node.id()))]
async fn drive<A: Algorithm>(
    node: Arc<A>,
    args: &DriveArgs,
    display: Option<DisplayReporter>,
) -> Result<(), Report<PeerError>> {
    let receive_loop = tokio::spawn(Arc::clone(&node).run());

    let max_delay = args.max_start_delay.max(args.min_start_delay);
    let delay = rand::rng().random_range(args.min_start_delay..=max_delay);
    info!(delay_secs = delay, "waiting for the other peers");
    tokio::time::sleep(Duration::from_secs(delay)).await;

    let track = Arc::new(Track::generate());
    let mut car = Car::new(node, Arc::clone(&track), display)
        .with_step_delay(Duration::from_millis(args.step_ms));
    let start = track.random_start(car.direction(), &mut rand::rng());
    info!(start, direction = ?car.direction(), "starting position");

    for lap in 0..args.laps {
        info!(lap, "starting lap");
        car.lap(if lap == 0 { start } else { 0 }).await;
    }
    info!("done driving, still relaying for the other peers");

    match receive_loop.await {
        Ok(result) => result.change_context(PeerError::Transport),
        Err(join) => Err(Report::new(join).change_context(PeerError::Transport)),
    }
}

fn peer_addr(host: IpAddr, base_port: u16, id: NodeId) -> Result<SocketAddr, Report<PeerError>> {
    u16::try_from(id.0)
        .ok()
        .and_then(|offset| base_port.checked_add(offset))
        .map(|port| SocketAddr::new(host, port))
        .ok_or_else(|| {
            Report::new(PeerError::Config)
                .attach(format!("no port for peer {id} above base port {base_port}"))
        })
}
