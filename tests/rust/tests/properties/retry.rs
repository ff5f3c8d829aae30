//! Backoff delays never decrease and never exceed the cap

use std::time::Duration;

use proptest::prelude::*;
use svcmux_core::{RetryPolicy, RetrySettings};

fn settings() -> impl Strategy<Value = RetrySettings> {
    (1u64..5_000, 1u64..20, 1.0f64..4.0, 1u32..30, 0.0f64..=1.0).prop_map(
        |(initial, factor, multiplier, max_attempts, jitter)| RetrySettings {
            initial_delay_ms: initial,
            max_delay_ms: initial * factor,
            multiplier,
            max_attempts,
            jitter_ratio: jitter,
        },
    )
}

proptest! {
    #[test]
    fn base_delay_is_monotonic_and_capped(settings in settings()) {
        let mut policy = RetryPolicy::new(settings);
        let mut previous = policy.current_delay();
        prop_assert_eq!(previous, settings.initial_delay());

        while !policy.is_exhausted() {
            let jittered = policy.next_delay();
            prop_assert!(jittered >= policy.current_delay());
            // Allow float rounding in the jitter arithmetic
            prop_assert!(jittered <= policy.max_jittered_delay() + Duration::from_micros(1));

            policy.advance();
            let current = policy.current_delay();
            prop_assert!(current >= previous, "{:?} < {:?}", current, previous);
            prop_assert!(current <= settings.max_delay());
            previous = current;
        }
        prop_assert_eq!(policy.attempt(), settings.max_attempts);

        policy.reset();
        prop_assert_eq!(policy.attempt(), 0);
        prop_assert_eq!(policy.current_delay(), settings.initial_delay());
    }
}
