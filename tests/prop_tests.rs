use std::collections::HashSet;

use proptest::prelude::*;

use livepoll::error::PollError;
use livepoll::memory::MemoryPollStore;
use livepoll::poll::{NewPoll, PollStore};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

fn option_text() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,15}"
}

proptest! {
    /// Valid input yields one zeroed option per input option.
    #[test]
    fn creation_zeroes_every_option(
        question in "[A-Za-z][A-Za-z ?]{0,30}",
        options in prop::collection::vec(option_text(), 2..8),
    ) {
        let poll = block_on(async {
            let store = MemoryPollStore::new();
            let new_poll = NewPoll::parse(&question, &options).unwrap();
            store.create(new_poll).await.unwrap()
        });

        prop_assert_eq!(poll.options.len(), options.len());
        prop_assert!(poll.options.iter().all(|o| o.votes == 0));
        prop_assert!(poll.voter_addresses.is_empty());
    }

    /// A second vote from the same address never adds a second increment.
    #[test]
    fn one_increment_per_address(
        options in prop::collection::vec(option_text(), 2..6),
        first in 0usize..6,
        second in 0usize..6,
        voter in "[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}",
    ) {
        let n = options.len();
        let (first, second) = (first % n, second % n);

        let (repeat, poll) = block_on(async {
            let store = MemoryPollStore::new();
            let poll = store.create(NewPoll::parse("Q", &options).unwrap()).await.unwrap();
            store.record_vote(&poll.id, first, &voter).await.unwrap();
            let repeat = store.record_vote(&poll.id, second, &voter).await;
            (repeat, store.get(&poll.id).await.unwrap())
        });

        prop_assert_eq!(repeat, Err(PollError::AlreadyVoted));
        prop_assert_eq!(poll.total_votes(), 1);
        prop_assert_eq!(poll.options[first].votes, 1);
    }

    /// Out-of-range indexes are rejected without touching the poll.
    #[test]
    fn out_of_range_index_is_inert(
        options in prop::collection::vec(option_text(), 2..6),
        overshoot in 0usize..1000,
    ) {
        let index = options.len() + overshoot;

        let (result, before, after) = block_on(async {
            let store = MemoryPollStore::new();
            let before = store.create(NewPoll::parse("Q", &options).unwrap()).await.unwrap();
            let result = store.record_vote(&before.id, index, "10.0.0.1").await;
            let after = store.get(&before.id).await.unwrap();
            (result, before, after)
        });

        prop_assert_eq!(result, Err(PollError::InvalidOption));
        prop_assert_eq!(before, after);
    }

    /// Total votes always equal the number of distinct voters.
    #[test]
    fn tally_matches_voter_set(
        ballots in prop::collection::vec((0u8..20, 0usize..3), 1..60),
    ) {
        let options = vec!["Red".to_string(), "Blue".to_string(), "Green".to_string()];

        let poll = block_on(async {
            let store = MemoryPollStore::new();
            let poll = store.create(NewPoll::parse("Q", &options).unwrap()).await.unwrap();
            for (voter, index) in &ballots {
                let _ = store.record_vote(&poll.id, *index, &format!("10.0.0.{voter}")).await;
            }
            store.get(&poll.id).await.unwrap()
        });

        let distinct: HashSet<u8> = ballots.iter().map(|(voter, _)| *voter).collect();
        prop_assert_eq!(poll.total_votes(), distinct.len() as i64);
        prop_assert_eq!(poll.voter_addresses.len(), distinct.len());
    }
}
