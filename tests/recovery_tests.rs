
use drover::job::JobResult;
use drover::store::{JobStore, NodeRegistry};

use test_harness::{place_running, scheduled_job, TestCluster};

/// Jobs on a vanished node are requeued while attempts remain and failed
/// once they are exhausted; jobs on live nodes are untouched.
#[tokio::test]
async fn test_dead_node_recovery() {
    let mut cluster = TestCluster::new();
    cluster.add_node("test-node-1", 120).await;
    cluster.add_node("test-node-2", 60).await;
    cluster.elect_all().await;

    place_running(&cluster, &scheduled_job("r1", 10, 1), "test-node-1").await;
    place_running(&cluster, &scheduled_job("r2", 10, 2), "test-node-2").await;
    let mut last_try = scheduled_job("r3", 10, 3);
    last_try.max_attempts = 1;
    place_running(&cluster, &last_try, "test-node-2").await;

    let duties = cluster.duties("test-node-1");

    // Both nodes alive: nothing to recover.
    duties.clean_dead_nodes_jobs().await.unwrap();
    assert_eq!(cluster.job_store.get_running_jobs().await.unwrap().len(), 3);
    assert!(cluster.job_store.get_queued_jobs().await.unwrap().is_empty());

    assert!(cluster.registry.remove("test-node-2").await);
    duties.clean_dead_nodes_jobs().await.unwrap();

    // r1 keeps running, r2 is back in the queue with its attempt spent,
    // r3 is out of attempts and failed.
    let running = cluster.job_store.get_running_jobs().await.unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].job.job_id, "r1");

    let queued = cluster.job_store.get_queued_jobs().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].job_id, "r2");
    assert_eq!(queued[0].attempts, 1);

    let finished = cluster.job_store.get_finished_jobs().await;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].job.job_id, "r3");
    assert_eq!(finished[0].result, JobResult::Failure);
    assert_eq!(
        finished[0].message.as_deref(),
        Some("test-node-2 is dead and max attempts has been reached")
    );
}

/// A requeued job's next placement consumes another attempt, and the
/// attempt ceiling turns the last death into a failure.
#[tokio::test]
async fn test_retry_bound() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-1", 120).await;
    cluster.elect_all().await;

    let mut fragile = scheduled_job("fragile", 10, 1);
    fragile.max_attempts = 2;
    place_running(&cluster, &fragile, "node-9").await;

    let duties = cluster.duties("node-1");

    // First death: one attempt spent, one left.
    duties.clean_dead_nodes_jobs().await.unwrap();
    let queued = cluster.job_store.get_queued_jobs().await.unwrap();
    assert_eq!(queued[0].attempts, 1);

    // Second placement and death: the ceiling is reached.
    duties.assign_queued_jobs().await.unwrap();
    let running = cluster.job_store.get_running_jobs().await.unwrap();
    assert_eq!(running[0].job.attempts, 2);
    assert_eq!(running[0].assigned_node_id, "node-1");

    assert!(cluster.registry.remove("node-1").await);
    duties.clean_dead_nodes_jobs().await.unwrap();

    let finished = cluster.job_store.get_finished_jobs().await;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].result, JobResult::Failure);
    assert_eq!(finished[0].job.attempts, 2);
    assert!(cluster.job_store.get_queued_jobs().await.unwrap().is_empty());
}

/// A drained (inactive but present) node counts as gone for recovery:
/// its jobs move on so the machine can be reaped.
#[tokio::test]
async fn test_drained_node_jobs_recovered() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-1", 120).await;
    cluster.add_node("node-2", 60).await;
    cluster.elect_all().await;

    place_running(&cluster, &scheduled_job("j1", 10, 1), "node-2").await;
    cluster
        .registry
        .update_node_status("node-2", false)
        .await
        .unwrap();

    cluster
        .duties("node-1")
        .clean_dead_nodes_jobs()
        .await
        .unwrap();

    let queued = cluster.job_store.get_queued_jobs().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].job_id, "j1");
}

/// Followers never recover.
#[tokio::test]
async fn test_follower_does_not_recover() {
    let mut cluster = TestCluster::new();
    cluster.add_node("node-1", 120).await;
    cluster.add_node("node-2", 60).await;
    cluster.elect_all().await;

    place_running(&cluster, &scheduled_job("j1", 10, 1), "node-9").await;
    cluster
        .duties("node-2")
        .clean_dead_nodes_jobs()
        .await
        .unwrap();

    assert_eq!(cluster.job_store.get_running_jobs().await.unwrap().len(), 1);
}
