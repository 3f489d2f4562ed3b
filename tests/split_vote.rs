//! Even with one peer down (so every election needs all three survivors'
//! votes to reach a majority of the full four-peer roster), the cluster
//! converges on exactly one leader per term and eventually elects one,
//! despite any split votes along the way.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::{build_cluster, fast_config};

#[tokio::test]
async fn at_most_one_leader_per_term_and_eventual_election() {
    let ids = [0, 1, 2, 3];
    let (rafts, _receivers, partitions) = build_cluster(&ids, fast_config()).await;

    // Peer 3 is down: cut it off from everyone else.
    for &other in &[0, 1, 2] {
        partitions.cut(ids[3], ids[other]).await;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let mut leader_by_term: HashMap<u64, usize> = HashMap::new();
    let mut elected = false;

    while tokio::time::Instant::now() < deadline {
        let mut leaders_this_round = Vec::new();
        for (i, raft) in rafts.iter().enumerate() {
            let (term, is_leader) = raft.get_state().await;
            if is_leader {
                leaders_this_round.push((term, i));
            }
        }

        for (term, i) in &leaders_this_round {
            match leader_by_term.get(term) {
                Some(existing) => assert_eq!(
                    *existing, *i,
                    "two different peers both believe themselves leader in term {term}"
                ),
                None => {
                    leader_by_term.insert(*term, *i);
                }
            }
        }

        if !leaders_this_round.is_empty() {
            elected = true;
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(elected, "no peer ever became leader despite randomized retries");
}
