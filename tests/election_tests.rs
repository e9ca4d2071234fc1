
use drover::store::NodeRegistry;

use test_harness::{enqueue, place_running, scheduled_job, TestCluster};

/// The oldest active node wins leadership; everyone else follows.
#[tokio::test]
async fn test_election_by_age() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-a", 120).await;
    cluster.add_node("node-b", 60).await;
    cluster.add_node("node-c", 0).await;

    cluster.elect_all().await;

    assert!(cluster.duties("node-a").state.is_leader().await);
    assert!(!cluster.duties("node-b").state.is_leader().await);
    assert!(!cluster.duties("node-c").state.is_leader().await);
}

/// A group whose oldest node is still younger than the minimum leader
/// age elects nobody.
#[tokio::test]
async fn test_election_blocked_by_youth() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-a", 2).await;
    cluster.add_node("node-b", 1).await;

    cluster.elect_all().await;

    assert!(cluster.leader_ids().await.is_empty());
}

/// At most one leader after all nodes ran election over one registry
/// snapshot.
#[tokio::test]
async fn test_leader_singleton() {
    let mut cluster = TestCluster::new();
    for (id, age) in [("n1", 400), ("n2", 300), ("n3", 200), ("n4", 100)] {
        cluster.add_node(id, age).await;
    }

    cluster.elect_all().await;

    assert_eq!(cluster.leader_ids().await, vec!["n1".to_string()]);
}

/// Equal join times fall back to the node-id order.
#[tokio::test]
async fn test_election_tie_breaks_on_node_id() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-b", 60).await;
    cluster.add_node("node-a", 60).await;

    cluster.elect_all().await;

    assert_eq!(cluster.leader_ids().await, vec!["node-a".to_string()]);
}

/// Taking leadership loads the schedule and job mirrors in one step;
/// losing it clears them in one step.
#[tokio::test]
async fn test_leadership_transition_swaps_mirror() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-a", 120).await;
    cluster.add_node("node-b", 60).await;

    cluster
        .schedule_source
        .replace(vec![scheduled_job("j1", 10, 1), scheduled_job("j2", 10, 2)])
        .await;
    enqueue(&cluster, &scheduled_job("j3", 10, 3)).await;
    place_running(&cluster, &scheduled_job("j4", 10, 4), "node-b").await;

    cluster.elect_all().await;

    let state = &cluster.duties("node-a").state;
    assert!(state.is_leader().await);
    assert_eq!(state.schedule().await.len(), 2);
    assert_eq!(state.queued_jobs().await.len(), 1);
    assert_eq!(state.running_jobs().await.len(), 1);

    // Drain node-a out of the group; the next election resigns it.
    cluster
        .registry
        .update_node_status("node-a", false)
        .await
        .unwrap();
    cluster
        .duties("node-a")
        .elect_cluster_leader()
        .await
        .unwrap();

    assert!(!state.is_leader().await);
    assert!(state.schedule().await.is_empty());
    assert!(state.queued_jobs().await.is_empty());
    assert!(state.running_jobs().await.is_empty());

    // And the next-oldest node takes over.
    cluster
        .duties("node-b")
        .elect_cluster_leader()
        .await
        .unwrap();
    assert_eq!(cluster.leader_ids().await, vec!["node-b".to_string()]);
}

/// Re-running election without a membership change keeps the mirror
/// untouched.
#[tokio::test]
async fn test_unchanged_election_keeps_mirror() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-a", 120).await;

    cluster.elect_all().await;
    let queued = enqueue(&cluster, &scheduled_job("late", 10, 1)).await;
    cluster.duties("node-a").state.insert_queued(queued).await;

    // A second election tick must not reload or clear anything.
    cluster.elect_all().await;
    assert_eq!(
        cluster.duties("node-a").state.queued_jobs().await.len(),
        1
    );
}
