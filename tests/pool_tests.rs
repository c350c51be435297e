
use std::collections::HashSet;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use tokio::sync::mpsc;

use claim_scheduler::scheduler::{priority_fifo, Job, JobKey, JobNode, JobPool, JobState};
use test_harness::{epoch, test_job, with_state};

/// Drain any queued schedule signal, reporting whether one was there.
fn take_signal(rx: &mut mpsc::Receiver<()>) -> bool {
    rx.try_recv().is_ok()
}

async fn set_sizes(pool: &JobPool) -> (usize, usize) {
    let state = pool.lock().await;
    (state.pending().len(), state.running().len())
}

fn seven_jobs() -> Vec<Job> {
    (0..7).map(|i| test_job(&format!("job-{}", i), 1)).collect()
}

#[tokio::test]
async fn test_seven_pending_jobs() {
    let (pool, _rx) = JobPool::new();
    for job in seven_jobs() {
        pool.sync_job(&job).await;
    }

    assert_eq!(set_sizes(&pool).await, (7, 0));
}

#[tokio::test]
async fn test_one_job_moves_to_running() {
    let (pool, _rx) = JobPool::new();
    let jobs = seven_jobs();
    for job in &jobs {
        pool.sync_job(job).await;
    }

    pool.sync_job(&with_state(&jobs[3], JobState::Running)).await;

    assert_eq!(set_sizes(&pool).await, (6, 1));
}

#[tokio::test]
async fn test_completed_job_leaves_pool() {
    let (pool, _rx) = JobPool::new();
    let jobs = seven_jobs();
    for job in &jobs {
        pool.sync_job(job).await;
    }

    pool.sync_job(&with_state(&jobs[3], JobState::Running)).await;
    pool.sync_job(&with_state(&jobs[3], JobState::Completed)).await;

    assert_eq!(set_sizes(&pool).await, (6, 0));
    let state = pool.lock().await;
    let node = JobNode::new(&jobs[3]);
    assert!(!state.pending().contains(&node));
    assert!(!state.running().contains(&node));
    assert!(!state.contains(&jobs[3].key()));
}

#[tokio::test]
async fn test_new_job_signals_scheduler() {
    let (pool, mut rx) = JobPool::new();

    assert!(pool.sync_job(&test_job("a", 1)).await);
    assert!(take_signal(&mut rx));
}

#[tokio::test]
async fn test_signals_coalesce() {
    let (pool, mut rx) = JobPool::new();
    for job in seven_jobs() {
        pool.sync_job(&job).await;
    }

    // Seven arrivals, one queued wake-up.
    assert!(take_signal(&mut rx));
    assert!(!take_signal(&mut rx));
}

#[tokio::test]
async fn test_unchanged_state_is_idempotent() {
    let (pool, mut rx) = JobPool::new();
    let job = test_job("a", 1);
    pool.sync_job(&job).await;
    take_signal(&mut rx);

    assert!(!pool.sync_job(&job).await);
    assert!(!take_signal(&mut rx));
    assert_eq!(set_sizes(&pool).await, (1, 0));
}

#[tokio::test]
async fn test_unchanged_state_updates_snapshot_and_order() {
    let (pool, _rx) = JobPool::new();
    let a = test_job("a", 1);
    let b = test_job("b", 5);
    pool.sync_job(&a).await;
    pool.sync_job(&b).await;

    let mut bumped = a.clone();
    bumped.priority = 10;
    pool.sync_job(&bumped).await;

    let state = pool.lock().await;
    let order: Vec<String> = state.pending().iter().map(|n| n.key().name.clone()).collect();
    assert_eq!(order, vec!["a", "b"]);
    assert_eq!(state.get(&a.key()).map(|n| n.priority()), Some(10));
}

#[tokio::test]
async fn test_job_without_state_is_ignored() {
    let (pool, mut rx) = JobPool::new();
    let mut job = test_job("a", 1);
    job.state = None;

    assert!(!pool.sync_job(&job).await);
    assert!(!take_signal(&mut rx));
    assert_eq!(set_sizes(&pool).await, (0, 0));
}

#[tokio::test]
async fn test_new_running_job_goes_to_running() {
    let (pool, mut rx) = JobPool::new();
    pool.sync_job(&test_job("a", 1).with_state(JobState::Running)).await;

    assert_eq!(set_sizes(&pool).await, (0, 1));
    assert!(take_signal(&mut rx));
}

#[tokio::test]
async fn test_new_terminal_job_is_not_indexed() {
    let (pool, mut rx) = JobPool::new();
    pool.sync_job(&test_job("done", 1).with_state(JobState::Completed)).await;
    pool.sync_job(&test_job("broken", 1).with_state(JobState::Failed)).await;

    assert_eq!(set_sizes(&pool).await, (0, 0));
    assert!(pool.lock().await.is_empty());
    assert!(!take_signal(&mut rx));
}

#[tokio::test]
async fn test_pending_to_running_does_not_signal() {
    let (pool, mut rx) = JobPool::new();
    let job = test_job("a", 1);
    pool.sync_job(&job).await;
    take_signal(&mut rx);

    assert!(!pool.sync_job(&with_state(&job, JobState::Running)).await);
    assert!(!take_signal(&mut rx));
}

#[tokio::test]
async fn test_pending_to_failed_drops_without_signal() {
    let (pool, mut rx) = JobPool::new();
    let job = test_job("a", 1);
    pool.sync_job(&job).await;
    take_signal(&mut rx);

    assert!(!pool.sync_job(&with_state(&job, JobState::Failed)).await);
    assert!(!take_signal(&mut rx));
    assert_eq!(set_sizes(&pool).await, (0, 0));
}

#[tokio::test]
async fn test_running_to_terminal_signals() {
    let (pool, mut rx) = JobPool::new();
    let job = test_job("a", 1).with_state(JobState::Running);
    pool.sync_job(&job).await;
    take_signal(&mut rx);

    assert!(pool.sync_job(&with_state(&job, JobState::Failed)).await);
    assert!(take_signal(&mut rx));
    assert_eq!(set_sizes(&pool).await, (0, 0));
}

#[tokio::test]
async fn test_running_back_to_pending_requeues() {
    let (pool, mut rx) = JobPool::new();
    let job = test_job("a", 1).with_state(JobState::Running);
    pool.sync_job(&job).await;
    take_signal(&mut rx);

    assert!(pool.sync_job(&with_state(&job, JobState::Pending)).await);
    assert!(take_signal(&mut rx));
    assert_eq!(set_sizes(&pool).await, (1, 0));
}

#[tokio::test]
async fn test_deletion_removes_from_any_state() {
    let (pool, mut rx) = JobPool::new();
    let pending = test_job("p", 1);
    let running = test_job("r", 1).with_state(JobState::Running);
    pool.sync_job(&pending).await;
    pool.sync_job(&running).await;
    take_signal(&mut rx);

    for job in [&pending, &running] {
        let mut deleted = job.clone();
        deleted.deletion_timestamp = Some(Utc::now());
        assert!(pool.sync_job(&deleted).await);
        assert!(take_signal(&mut rx));
    }

    assert_eq!(set_sizes(&pool).await, (0, 0));
    assert!(pool.lock().await.is_empty());
}

#[tokio::test]
async fn test_deletion_of_unknown_job_still_signals() {
    let (pool, mut rx) = JobPool::new();
    let mut job = test_job("ghost", 1);
    job.deletion_timestamp = Some(Utc::now());

    assert!(pool.sync_job(&job).await);
    assert!(take_signal(&mut rx));
    assert!(pool.lock().await.is_empty());
}

#[tokio::test]
async fn test_stale_snapshot_is_ignored() {
    let (pool, _rx) = JobPool::new();
    let mut job = test_job("a", 1).with_state(JobState::Running);
    job.resource_version = 5;
    pool.sync_job(&job).await;

    let mut stale = with_state(&job, JobState::Pending);
    stale.resource_version = 4;
    assert!(!pool.sync_job(&stale).await);

    assert_eq!(set_sizes(&pool).await, (0, 1));
}

#[tokio::test]
async fn test_admission_mark_survives_same_snapshot_only() {
    let (pool, _rx) = JobPool::new();
    let mut job = test_job("a", 1);
    job.resource_version = 1;
    pool.sync_job(&job).await;
    assert!(pool.lock().await.mark_admitted(&job.key()));

    // Re-observing the same version keeps the mark.
    pool.sync_job(&job).await;
    assert!(pool.lock().await.is_admitted(&job.key()));

    let mut newer = job.clone();
    newer.resource_version = 2;
    pool.sync_job(&newer).await;
    assert!(!pool.lock().await.is_admitted(&job.key()));
}

#[tokio::test]
async fn test_admission_mark_unknown_job() {
    let (pool, _rx) = JobPool::new();
    let mut state = pool.lock().await;
    assert!(!state.mark_admitted(&JobKey::new("default", "nobody")));
    assert!(!state.is_admitted(&JobKey::new("default", "nobody")));
}

#[tokio::test]
async fn test_admission_mark_cleared_on_removal() {
    let (pool, _rx) = JobPool::new();
    let mut job = test_job("again", 1);
    job.resource_version = 3;
    pool.sync_job(&job).await;
    pool.lock().await.mark_admitted(&job.key());

    let mut deleted = job.clone();
    deleted.deletion_timestamp = Some(Utc::now());
    pool.sync_job(&deleted).await;
    assert!(!pool.lock().await.is_admitted(&job.key()));

    // A re-created object starts over at a lower version and is admissible.
    let mut recreated = test_job("again", 1);
    recreated.resource_version = 1;
    assert!(pool.sync_job(&recreated).await);
    assert!(!pool.lock().await.is_admitted(&job.key()));

    // Pruning and state transitions drop the mark too.
    pool.lock().await.mark_admitted(&job.key());
    pool.prune(&HashSet::new()).await;
    assert!(pool.lock().await.is_empty());
    assert!(!pool.lock().await.is_admitted(&job.key()));

    pool.sync_job(&recreated).await;
    pool.lock().await.mark_admitted(&job.key());
    let mut running = with_state(&recreated, JobState::Running);
    running.resource_version = 2;
    pool.sync_job(&running).await;
    assert!(!pool.lock().await.is_admitted(&job.key()));
}

#[tokio::test]
async fn test_pool_copies_are_independent() {
    let (pool, _rx) = JobPool::new();
    let mut job = test_job("a", 1);
    pool.sync_job(&job).await;

    job.priority = 99;
    job.name = "renamed".to_string();

    let state = pool.lock().await;
    let stored = state.get(&JobKey::new("default", "a")).unwrap();
    assert_eq!(stored.priority(), 1);
    assert_eq!(stored.job().name, "a");
}

#[tokio::test]
async fn test_prune_removes_unknown_jobs() {
    let (pool, mut rx) = JobPool::new();
    let keep = test_job("keep", 1);
    let drop_pending = test_job("gone", 1);
    let drop_running = test_job("gone-running", 1).with_state(JobState::Running);
    for job in [&keep, &drop_pending, &drop_running] {
        pool.sync_job(job).await;
    }
    take_signal(&mut rx);

    let live: HashSet<JobKey> = [keep.key()].into_iter().collect();
    assert_eq!(pool.prune(&live).await, 2);
    assert!(take_signal(&mut rx));
    assert_eq!(set_sizes(&pool).await, (1, 0));

    assert_eq!(pool.prune(&live).await, 0);
    assert!(!take_signal(&mut rx));
}

#[test]
fn test_comparator_priority_then_time_then_name() {
    let high = JobNode::new(&test_job("z", 10));
    let low = JobNode::new(&test_job("a", 5));
    assert!(priority_fifo(&high, &low));
    assert!(!priority_fifo(&low, &high));

    let early = JobNode::new(&test_job("z", 1));
    let late = JobNode::new(&test_job("a", 1).with_created_at(epoch() + Duration::seconds(1)));
    assert!(priority_fifo(&early, &late));
    assert!(!priority_fifo(&late, &early));

    let first = JobNode::new(&test_job("a", 1));
    let second = JobNode::new(&test_job("b", 1));
    assert!(priority_fifo(&first, &second));
    assert!(!priority_fifo(&second, &first));
}

#[tokio::test]
async fn test_pending_order_under_mixed_arrivals() {
    let (pool, _rx) = JobPool::new();
    let jobs = vec![
        test_job("c", 1),
        test_job("b", 1),
        test_job("late-high", 10).with_created_at(epoch() + Duration::seconds(30)),
        test_job("early-high", 10),
        test_job("a", 1),
    ];
    for job in &jobs {
        pool.sync_job(job).await;
    }

    let state = pool.lock().await;
    let mut order = Vec::new();
    state.pending().for_each(|n| order.push(n.key().name.clone()));
    assert_eq!(order, vec!["early-high", "late-high", "a", "b", "c"]);
}

fn arb_state() -> impl Strategy<Value = Option<JobState>> {
    prop_oneof![
        Just(None),
        Just(Some(JobState::Pending)),
        Just(Some(JobState::Running)),
        Just(Some(JobState::Completed)),
        Just(Some(JobState::Failed)),
    ]
}

proptest! {
    /// Property: any notification sequence keeps each identity in at most one set,
    /// and every set member indexed.
    #[test]
    fn prop_identity_in_at_most_one_set(
        events in proptest::collection::vec((0usize..6, arb_state(), any::<bool>()), 1..80),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let (pool, _rx) = JobPool::new();
            for (idx, state, delete) in events {
                let mut job = test_job(&format!("job-{}", idx), idx as i32);
                job.state = state;
                if delete {
                    job.deletion_timestamp = Some(Utc::now());
                }
                pool.sync_job(&job).await;

                let guard = pool.lock().await;
                for n in 0..6 {
                    let node = JobNode::new(&test_job(&format!("job-{}", n), 0));
                    let in_pending = guard.pending().contains(&node);
                    let in_running = guard.running().contains(&node);
                    prop_assert!(!(in_pending && in_running));
                    prop_assert_eq!(in_pending || in_running, guard.contains(node.key()));
                }
                prop_assert_eq!(guard.len(), guard.pending().len() + guard.running().len());
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Property: repeating a notification never changes set sizes or signals.
    #[test]
    fn prop_repeat_notification_is_idempotent(
        priorities in proptest::collection::vec(-5i32..5, 1..10),
        running_mask in any::<u16>(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let (pool, mut rx) = JobPool::new();
            let jobs: Vec<Job> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let state = if running_mask & (1 << i) != 0 { JobState::Running } else { JobState::Pending };
                    test_job(&format!("job-{}", i), *p).with_state(state)
                })
                .collect();
            for job in &jobs {
                pool.sync_job(job).await;
            }
            let _ = rx.try_recv();
            let before = set_sizes(&pool).await;

            for job in &jobs {
                prop_assert!(!pool.sync_job(job).await);
            }
            prop_assert!(rx.try_recv().is_err());
            prop_assert_eq!(set_sizes(&pool).await, before);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Property: distinct jobs are strictly ordered one way or the other.
    #[test]
    fn prop_comparator_is_total(
        pa in -3i32..3, pb in -3i32..3,
        ta in 0i64..3, tb in 0i64..3,
        na in "[a-c]{1,2}", nb in "[a-c]{1,2}",
    ) {
        prop_assume!(na != nb);
        let a = JobNode::new(&test_job(&na, pa).with_created_at(epoch() + Duration::seconds(ta)));
        let b = JobNode::new(&test_job(&nb, pb).with_created_at(epoch() + Duration::seconds(tb)));
        prop_assert!(priority_fifo(&a, &b) ^ priority_fifo(&b, &a));
    }
}
