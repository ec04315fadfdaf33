use std::time::Duration;

use charter_core::{ContentType, Creator, UserId};
use chrono::Utc;
use proptest::prelude::*;

use crate::attribution::fork_local;
use crate::backoff::RetryPolicy;

fn creator(n: usize) -> Creator {
    let id = format!("u{n}");
    Creator::new(UserId::new(id.clone()).unwrap(), id)
}

proptest! {
    #[test]
    fn test_backoff_never_decreases(
        base_ms in 1u64..10_000,
        multiplier in 1.0f64..10.0,
        max_ms in 1u64..600_000,
        attempts in 2u32..40
    ) {
        let policy = RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(base_ms),
            multiplier,
            max_delay: Duration::from_millis(max_ms),
            fork_notify_max_attempts: 2
        };

        let mut previous = Duration::ZERO;
        for attempt in 1..=attempts {
            let delay = policy.delay_for(attempt);
            prop_assert!(delay >= previous);
            prop_assert!(delay <= policy.max_delay);
            previous = delay;
        }
    }

    #[test]
    fn test_fork_chain_keeps_root_creator(depth in 1usize..12) {
        let root = charter_core::SyncableContent::new(
            "Passage plan",
            ContentType::Guide,
            serde_json::json!({"legs": 3}),
            creator(0),
            Utc::now()
        );

        let mut current = root.clone();
        for n in 1..=depth {
            let before = current.clone();
            let fork = fork_local(&current, creator(n), Utc::now());
            prop_assert_eq!(
                fork.original_creator.as_ref().map(|c| &c.id),
                Some(&root.creator.id)
            );
            prop_assert_eq!(&current, &before);
            current = fork;
        }
        prop_assert_eq!(current.attribution_root().id.as_str(), "u0");
    }
}
