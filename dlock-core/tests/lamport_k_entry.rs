//! Lamport k-entry node scenarios on the in-memory network.

mod common;

use std::time::Duration;

use common::{cluster, drive_all, drive_with_patience, enters, init_tracing, mesh, settle};
use dlock_core::{Algorithm, GroupId, LamportKEntryNode, Message, NodeId};

#[tokio::test(start_paused = true)]
async fn same_group_shares_the_section() {
    let _guard = init_tracing();
    let (_network, nodes) = cluster(3, mesh(3), LamportKEntryNode::new);
    let east = GroupId::new("east");

    nodes[0].request_entry(east.clone()).await;
    settle(&nodes).await;
    assert!(enters(&*nodes[0]).await);
    nodes[0].enter_section().await;

    nodes[1].request_entry(east).await;
    settle(&nodes).await;
    assert_eq!(nodes[0].deferred_replies().await, 0);
    assert!(enters(&*nodes[1]).await);
    nodes[1].enter_section().await;

    assert!(nodes[0].in_section().await);
    assert!(nodes[1].in_section().await);
}

#[tokio::test(start_paused = true)]
async fn other_group_waits_for_exit() {
    let _guard = init_tracing();
    let (_network, nodes) = cluster(3, mesh(3), LamportKEntryNode::new);

    nodes[0].request_entry(GroupId::new("east")).await;
    settle(&nodes).await;
    assert!(enters(&*nodes[0]).await);
    nodes[0].enter_section().await;

    nodes[1].request_entry(GroupId::new("west")).await;
    settle(&nodes).await;
    assert_eq!(nodes[0].deferred_replies().await, 1);
    assert!(!enters(&*nodes[1]).await);

    nodes[0].leave_section().await;
    assert_eq!(nodes[0].active_group().await, None);
    settle(&nodes).await;

    assert!(enters(&*nodes[1]).await);
    assert_eq!(nodes[1].active_group().await, Some(GroupId::new("west")));
}

#[tokio::test(start_paused = true)]
async fn waiting_node_defers_newer_request_of_other_group() {
    let _guard = init_tracing();
    let (_network, nodes) = cluster(4, mesh(4), LamportKEntryNode::new);
    let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);

    b.request_entry(GroupId::new("west")).await;
    settle(&nodes).await;
    assert!(enters(&**b).await);
    b.enter_section().await;

    a.request_entry(GroupId::new("east")).await;
    settle(&nodes).await;
    assert_eq!(b.deferred_replies().await, 1);
    assert!(!enters(&**a).await);

    // c learns of a much later event that a has not seen
    let late = Message::release(NodeId(3), 100).encode().unwrap();
    c.on_message(&late).await;
    assert!(c.clock().await > a.clock().await);

    // a still waits for east, so the newer west request is held back
    c.request_entry(GroupId::new("west")).await;
    settle(&nodes).await;
    assert_eq!(a.deferred_replies().await, 1);
    assert!(!enters(&**c).await);

    b.leave_section().await;
    settle(&nodes).await;
    assert!(enters(&**a).await);
    a.enter_section().await;
    assert!(!enters(&**c).await);

    a.leave_section().await;
    settle(&nodes).await;
    assert!(enters(&**c).await);
}

#[tokio::test(start_paused = true)]
async fn one_group_cluster_completes() {
    let _guard = init_tracing();
    let (_network, nodes) = cluster(4, mesh(4), LamportKEntryNode::new);

    let occupancy = drive_all(&nodes, 2, |_| Some(GroupId::new("east"))).await;
    assert_eq!(occupancy.entries(), 8);
    for node in &nodes {
        assert!(!node.in_section().await);
        assert_eq!(node.active_group().await, None);
    }
}

#[tokio::test(start_paused = true)]
async fn groups_never_share_the_section() {
    let _guard = init_tracing();
    let (_network, nodes) = cluster(6, mesh(6), LamportKEntryNode::new);

    // crossing requests of two groups wait on each other forever; staggered
    // patience lets them back out one at a time
    let (occupancy, gave_up) = drive_with_patience(
        &nodes,
        3,
        |id| GroupId::new(if id.0 % 2 == 0 { "east" } else { "west" }),
        |id| Duration::from_millis(500 + 137 * u64::from(id.0)),
    )
    .await;

    assert_eq!(occupancy.conflicts(), 0);
    assert!(gave_up < nodes.len());
    assert!(occupancy.entries() >= 3);
}
