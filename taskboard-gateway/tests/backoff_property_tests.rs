//! Property-based tests for the realtime reconnect schedule.

use proptest::prelude::*;
use taskboard_gateway::{Backoff, ReconnectConfig};

fn arb_reconnect() -> impl Strategy<Value = ReconnectConfig> {
    (1u64..5_000, 0u64..60_000, 1.0f64..4.0, 0u64..1_000).prop_map(
        |(initial_ms, extra, multiplier, jitter_ms)| ReconnectConfig {
            initial_ms,
            max_ms: initial_ms + extra,
            multiplier,
            jitter_ms,
        },
    )
}

proptest! {
    #[test]
    fn delays_stay_within_bounds(config in arb_reconnect(), attempts in 1usize..40) {
        let mut backoff = Backoff::new(config.clone());
        for _ in 0..attempts {
            let base = backoff.current_ms();
            let delay = backoff.next_delay().as_millis() as u64;
            prop_assert!(base >= config.initial_ms);
            prop_assert!(base <= config.max_ms);
            prop_assert!(delay >= base);
            prop_assert!(delay <= base + config.jitter_ms);
        }
    }

    #[test]
    fn base_delay_never_shrinks_until_reset(config in arb_reconnect(), attempts in 1usize..40) {
        let mut backoff = Backoff::new(config.clone());
        let mut previous = backoff.current_ms();
        for _ in 0..attempts {
            backoff.next_delay();
            prop_assert!(backoff.current_ms() >= previous);
            previous = backoff.current_ms();
        }
        backoff.reset();
        prop_assert_eq!(backoff.current_ms(), config.initial_ms);
    }
}

#[test]
fn growth_caps_at_max() {
    let mut backoff = Backoff::new(ReconnectConfig {
        initial_ms: 100,
        max_ms: 1_000,
        multiplier: 2.0,
        jitter_ms: 0,
    });
    let delays: Vec<u64> = (0..6)
        .map(|_| backoff.next_delay().as_millis() as u64)
        .collect();
    assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
}
