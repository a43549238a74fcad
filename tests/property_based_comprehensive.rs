//! Property-based tests for policy derivation and tick conversion
//!
//! Core properties:
//! 1. Duty-cycle budget ordering for any positive work period
//! 2. Tick conversion factor is positive and invertible
//! 3. Derived policies always satisfy computation <= constraint <= period
//! 4. Config validation never panics

use machrt::config::RealtimeConfig;
use machrt::policy::{CycleBudget, TimeConstraintPolicy};
use machrt::timebase::Timebase;
use proptest::prelude::*;

fn timebase_strategy() -> impl Strategy<Value = Timebase> {
    prop_oneof![
        Just(Timebase::NANOSECONDS),
        Just(Timebase::APPLE_SILICON),
        (1u32..1_000, 1u32..1_000).prop_map(|(n, d)| Timebase { numer: n, denom: d }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_budget_ordering(work_period in 1e-6f64..10.0) {
        // Property: guaranteed <= max <= quantum, quantum = period * 1000
        let budget = CycleBudget::new(work_period, 0.75, 0.85);
        prop_assert!((budget.quantum_ms - work_period * 1000.0).abs() < 1e-9);
        prop_assert!((budget.guaranteed_ms - 0.75 * budget.quantum_ms).abs() < 1e-9);
        prop_assert!((budget.max_ms - 0.85 * budget.quantum_ms).abs() < 1e-9);
        prop_assert!(budget.guaranteed_ms <= budget.max_ms);
        prop_assert!(budget.max_ms <= budget.quantum_ms);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_tick_factor_invertible(timebase in timebase_strategy(), ms in 0.001f64..1000.0) {
        // Property: ticks / factor recovers the millisecond duration
        let factor = timebase.ticks_per_ms();
        prop_assert!(factor > 0.0);
        let ticks = timebase.ms_to_ticks(ms);
        let back = timebase.ticks_to_ms(ticks);
        prop_assert!((back - ms).abs() <= ms * 1e-12);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_derived_policy_ordered(
        timebase in timebase_strategy(),
        work_period in 1e-4f64..0.5,
        guaranteed in 0.05f64..1.0,
        headroom in 0.0f64..1.0,
    ) {
        // Property: any accepted policy honours computation <= constraint <= period
        let max = guaranteed + (1.0 - guaranteed) * headroom;
        let config = RealtimeConfig {
            guaranteed_duty_cycle: guaranteed,
            max_duty_cycle: max,
            ..RealtimeConfig::default()
        };
        if let Ok(policy) = TimeConstraintPolicy::from_work_period(work_period, timebase, &config) {
            prop_assert!(policy.period > 0);
            prop_assert!(policy.computation <= policy.constraint);
            prop_assert!(policy.constraint <= policy.period);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_config_validation_never_panics(
        guaranteed in proptest::num::f64::ANY,
        max in proptest::num::f64::ANY,
        interval in proptest::num::f64::ANY,
    ) {
        let config = RealtimeConfig {
            guaranteed_duty_cycle: guaranteed,
            max_duty_cycle: max,
            io_interval_secs: interval,
            ..RealtimeConfig::default()
        };
        if config.validate().is_ok() {
            prop_assert!(guaranteed > 0.0 && guaranteed <= max && max <= 1.0);
            prop_assert!(interval > 0.0);
        }
    }
}
