
use drover::config::{LeaderConfig, ScaleConfig};
use drover::store::{JobStore, NodeRegistry};

use test_harness::{enqueue, place_running, scheduled_job, TestCluster};

/// Four weight-100 jobs, two empty weight-100 nodes: the two highest
/// priorities land (one per node) and the rest stay queued because both
/// nodes are full.
#[tokio::test]
async fn test_capacity_respected() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-1", 120).await;
    cluster.add_node("node-2", 60).await;
    cluster.elect_all().await;

    enqueue(&cluster, &scheduled_job("j1", 100, 2)).await;
    enqueue(&cluster, &scheduled_job("j2", 100, 3)).await;
    enqueue(&cluster, &scheduled_job("j3", 100, 2)).await;
    enqueue(&cluster, &scheduled_job("j4", 100, 1)).await;

    cluster.duties("node-1").assign_queued_jobs().await.unwrap();

    // j4 (priority 1) went first and the capacity tie broke to node-1;
    // j1 (priority 2, id before j3) filled node-2.
    let running = cluster.running_by_node().await;
    assert_eq!(running["node-1"].len(), 1);
    assert_eq!(running["node-1"][0].job.job_id, "j4");
    assert_eq!(running["node-2"].len(), 1);
    assert_eq!(running["node-2"][0].job.job_id, "j1");

    let queued = cluster.queued_locks().await;
    assert_eq!(queued.len(), 2);
    assert!(queued.contains("j2-lock"));
    assert!(queued.contains("j3-lock"));

    // No node exceeds its weight limit.
    for jobs in running.values() {
        let total: u32 = jobs.iter().map(|j| j.job.weight).sum();
        assert!(total <= 100);
    }
}

/// With both nodes already full, an assign pass is a no-op: the running
/// jobs stay exactly where they are and the leftover firings stay
/// queued.
#[tokio::test]
async fn test_full_cluster_assignment_is_a_no_op() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-1", 120).await;
    cluster.add_node("node-2", 60).await;

    // The priority-1 and priority-2 instances already run and fill both
    // nodes to the brim.
    let j1 = scheduled_job("j1", 100, 2);
    let j2 = scheduled_job("j2", 100, 3);
    let j3 = scheduled_job("j3", 100, 2);
    let j4 = scheduled_job("j4", 100, 1);
    let pre_j4 = place_running(&cluster, &j4, "node-1").await;
    let pre_j1 = place_running(&cluster, &j1, "node-2").await;

    cluster
        .schedule_source
        .replace(vec![j1, j2, j3, j4])
        .await;
    cluster.elect_all().await;

    let duties = cluster.duties("node-1");
    duties.queue_scheduled_jobs().await.unwrap();
    duties.assign_queued_jobs().await.unwrap();

    // Only j2 and j3 were queueable (the other locks are running), and
    // neither node has room for them.
    let queued = cluster.queued_locks().await;
    assert_eq!(queued.len(), 2);
    assert!(queued.contains("j2-lock"));
    assert!(queued.contains("j3-lock"));

    // The pre-existing instances are untouched, down to the instance id
    // and attempt count.
    let running = cluster.running_by_node().await;
    assert_eq!(running["node-1"].len(), 1);
    assert_eq!(running["node-1"][0].job.instance_id, pre_j4.job.instance_id);
    assert_eq!(running["node-1"][0].job.attempts, 1);
    assert_eq!(running["node-2"].len(), 1);
    assert_eq!(running["node-2"][0].job.instance_id, pre_j1.job.instance_id);
    assert_eq!(running["node-2"][0].job.attempts, 1);
}

/// Placement picks the node with the most remaining capacity and keeps
/// counting within the pass.
#[tokio::test]
async fn test_in_pass_capacity_accounting() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-1", 120).await;
    cluster.add_node("node-2", 60).await;
    cluster.elect_all().await;

    place_running(&cluster, &scheduled_job("preload", 30, 1), "node-2").await;
    enqueue(&cluster, &scheduled_job("a", 40, 1)).await;
    enqueue(&cluster, &scheduled_job("b", 40, 2)).await;
    enqueue(&cluster, &scheduled_job("c", 40, 3)).await;

    cluster.duties("node-1").assign_queued_jobs().await.unwrap();

    // a -> node-1 (100 vs 70), b -> node-2 (60 vs 70), c -> node-1 (60 vs 30).
    let running = cluster.running_by_node().await;
    let ids = |node: &str| -> Vec<String> {
        let mut ids: Vec<String> = running[node].iter().map(|j| j.job.job_id.clone()).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids("node-1"), vec!["a".to_string(), "c".to_string()]);
    assert_eq!(ids("node-2"), vec!["b".to_string(), "preload".to_string()]);
    assert!(cluster.queued_locks().await.is_empty());
}

/// A job heavier than any node's total capacity stays queued; the pass
/// carries on and reports no error.
#[tokio::test]
async fn test_oversize_job_stays_queued() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-1", 120).await;
    cluster.elect_all().await;

    enqueue(&cluster, &scheduled_job("whale", 150, 1)).await;
    enqueue(&cluster, &scheduled_job("minnow", 10, 2)).await;

    cluster.duties("node-1").assign_queued_jobs().await.unwrap();

    assert_eq!(cluster.queued_locks().await.len(), 1);
    assert!(cluster.queued_locks().await.contains("whale-lock"));
    let running = cluster.running_by_node().await;
    assert_eq!(running["node-1"][0].job.job_id, "minnow");
}

/// Version requirements gate eligibility even when the older node has
/// more room.
#[tokio::test]
async fn test_version_requirement_gates_placement() {
    let mut cluster = TestCluster::new();
    cluster.add_node_versioned("node-1", 120, "2024.05.01").await;
    cluster.add_node_versioned("node-2", 60, "2024.07.01").await;
    cluster.elect_all().await;

    place_running(&cluster, &scheduled_job("preload", 50, 1), "node-2").await;

    let mut gated = scheduled_job("gated", 20, 1);
    gated.min_version = Some("2024.06.01".to_string());
    enqueue(&cluster, &gated).await;

    let mut unplaceable = scheduled_job("unplaceable", 20, 2);
    unplaceable.min_version = Some("2025.01.01".to_string());
    enqueue(&cluster, &unplaceable).await;

    cluster.duties("node-1").assign_queued_jobs().await.unwrap();

    let running = cluster.running_by_node().await;
    assert!(running["node-2"].iter().any(|j| j.job.job_id == "gated"));
    assert!(!running.contains_key("node-1"));
    assert!(cluster.queued_locks().await.contains("unplaceable-lock"));
}

/// With leader_also_worker off, the leader's own node receives nothing.
#[tokio::test]
async fn test_leader_excluded_when_not_worker() {
    let mut cluster = TestCluster::new();
    let picky = LeaderConfig {
        leader_also_worker: false,
        ..LeaderConfig::default()
    };
    cluster
        .add_node_configured("node-1", 120, "1.0.0", picky, ScaleConfig::default())
        .await;
    cluster.add_node("node-2", 60).await;
    cluster.elect_all().await;

    enqueue(&cluster, &scheduled_job("a", 30, 1)).await;
    enqueue(&cluster, &scheduled_job("b", 30, 2)).await;

    cluster.duties("node-1").assign_queued_jobs().await.unwrap();

    let running = cluster.running_by_node().await;
    assert!(!running.contains_key("node-1"));
    assert_eq!(running["node-2"].len(), 2);
}

/// Placement holds back until the group has its minimum of active nodes.
#[tokio::test]
async fn test_min_active_nodes_guard() {
    let mut cluster = TestCluster::new();
    let cautious = LeaderConfig {
        min_active_nodes: 2,
        ..LeaderConfig::default()
    };
    cluster
        .add_node_configured("node-1", 120, "1.0.0", cautious, ScaleConfig::default())
        .await;
    cluster.elect_all().await;

    enqueue(&cluster, &scheduled_job("waiting", 10, 1)).await;
    cluster.duties("node-1").assign_queued_jobs().await.unwrap();
    assert_eq!(cluster.queued_locks().await.len(), 1);

    // A second node arriving unblocks the next pass.
    cluster.add_node("node-2", 60).await;
    cluster.duties("node-1").assign_queued_jobs().await.unwrap();
    assert!(cluster.queued_locks().await.is_empty());
}

/// Inactive nodes receive no new work.
#[tokio::test]
async fn test_draining_node_receives_nothing() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-1", 120).await;
    cluster.add_node("node-2", 60).await;
    cluster.elect_all().await;
    cluster
        .registry
        .update_node_status("node-2", false)
        .await
        .unwrap();

    enqueue(&cluster, &scheduled_job("a", 30, 1)).await;
    cluster.duties("node-1").assign_queued_jobs().await.unwrap();

    let running = cluster.running_by_node().await;
    assert_eq!(running["node-1"].len(), 1);
    assert!(!running.contains_key("node-2"));
}

/// Followers never assign.
#[tokio::test]
async fn test_follower_does_not_assign() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-1", 120).await;
    cluster.add_node("node-2", 60).await;
    cluster.elect_all().await;

    enqueue(&cluster, &scheduled_job("a", 30, 1)).await;
    cluster.duties("node-2").assign_queued_jobs().await.unwrap();
    assert_eq!(cluster.queued_locks().await.len(), 1);
    assert!(cluster.job_store.get_running_jobs().await.unwrap().is_empty());
}

/// An empty queue is a clean no-op.
#[tokio::test]
async fn test_empty_queue_no_writes() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-1", 120).await;
    cluster.elect_all().await;

    cluster.duties("node-1").assign_queued_jobs().await.unwrap();
    assert!(cluster.job_store.get_running_jobs().await.unwrap().is_empty());
}
