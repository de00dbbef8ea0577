//! Property tests for numeric operator input.

use proptest::prelude::*;

use diagmenu::console::{input_number, parse_number, throughput_mb_per_sec, Input, ScriptedConsole};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: hex values parse with or without the `0x` prefix.
    #[test]
    fn property_hex_prefix_is_optional(value in any::<u64>()) {
        prop_assert_eq!(parse_number(&format!("{:x}", value), true), Some(value));
        prop_assert_eq!(parse_number(&format!("0x{:X}", value), true), Some(value));
        prop_assert_eq!(parse_number(&value.to_string(), false), Some(value));
    }

    /// PROPERTY: an accepted value always lies in the requested range.
    #[test]
    fn property_range_is_enforced(
        min in 0u64..1000,
        span in 1u64..1000,
        typed in 0u64..3000
    ) {
        let max = min + span;
        let mut console = ScriptedConsole::scripted(format!("{}\n", typed));
        let result = input_number(&mut console, "Value", false, min, max).unwrap();
        match result {
            Input::Value(v) => prop_assert!((min..=max).contains(&v)),
            Input::Invalid => {
                prop_assert!(typed < min || typed > max);
                prop_assert!(console.output().contains("Input must be between"));
            }
            Input::Cancelled => prop_assert!(false, "numeric input cannot cancel"),
        }
    }

    /// PROPERTY: throughput never decreases with more bytes in the same time.
    #[test]
    fn property_throughput_monotonic(
        bytes in 0u64..u64::MAX / 2,
        extra in 0u64..1 << 40,
        elapsed in 0u64..100_000
    ) {
        prop_assert!(
            throughput_mb_per_sec(bytes, elapsed) <= throughput_mb_per_sec(bytes + extra, elapsed)
        );
    }
}
