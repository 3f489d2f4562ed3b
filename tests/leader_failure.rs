//! The leader goes away mid-agreement and a new leader takes over and
//! keeps committing.

mod common;

use std::time::Duration;

use common::{build_cluster, fast_config, find_leader, wait_for};
use raft::Delivered;

#[tokio::test]
async fn new_leader_commits_after_old_leader_crashes() {
    let ids = [0, 1, 2, 3, 4];
    let (rafts, mut receivers, _partitions) = build_cluster(&ids, fast_config()).await;

    let first_leader = wait_for(Duration::from_secs(2), || async { find_leader(&rafts).await }).await;
    rafts[first_leader].submit("a".to_string()).await.unwrap();

    // The old leader crashes before the cluster necessarily finishes
    // replicating "a": stop driving it entirely.
    rafts[first_leader].shutdown().await;

    let second_leader = wait_for(Duration::from_secs(2), || async {
        let found = find_leader(&rafts).await;
        match found {
            Some(i) if i != first_leader => Some(i),
            _ => None,
        }
    })
    .await;

    let outcome = rafts[second_leader].submit("b".to_string()).await.unwrap();
    assert!(outcome.is_leader);

    for (i, rx) in receivers.iter_mut().enumerate() {
        if i == first_leader {
            continue;
        }
        // "b" must show up; "a" may or may not, but if present it precedes "b".
        let mut saw_b = false;
        while !saw_b {
            let delivered = wait_for(Duration::from_secs(2), || async { rx.try_recv().ok() }).await;
            match delivered {
                Delivered::Entry { command, .. } if command == "b" => saw_b = true,
                Delivered::Entry { command, .. } if command == "a" => {
                    assert!(!saw_b, "'a' must not be delivered after 'b'");
                }
                _ => {}
            }
        }
    }
}
