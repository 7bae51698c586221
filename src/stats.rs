//! Statistics helpers shared by the probers and the gauge.

use std::time::Duration;

/// Upper bound of the gauge scale in Mbps. Faster speeds pin the needle.
pub const GAUGE_CAP_MBPS: f64 = 2000.0;

/// Median of `values`. Even-length input averages the two middle values,
/// empty input yields 0. The input is left untouched.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;

    if sorted.len() % 2 == 0 {
        mean(&sorted[mid - 1..=mid])
    } else {
        sorted[mid]
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by N). Fewer than two samples
/// yield 0.
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let mean = mean(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / values.len() as f64;

    variance.sqrt()
}

/// Map a speed onto the gauge's logarithmic [0, 1] scale.
///
/// `log10(min(speed, cap) + 1) / log10(cap + 1)`, so 0 Mbps sits at the
/// start of the arc and anything at or above [`GAUGE_CAP_MBPS`] at the end.
pub fn speed_to_position(speed_mbps: f64) -> f64 {
    if speed_mbps.is_nan() || speed_mbps <= 0.0 {
        return 0.0;
    }

    let capped = speed_mbps.min(GAUGE_CAP_MBPS);

    ((capped + 1.0).log10() / (GAUGE_CAP_MBPS + 1.0).log10()).min(1.0)
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Convert a byte count transferred over `elapsed` into megabits per second.
pub fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }

    (bytes as f64 * 8.0) / seconds / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[7.5]), 7.5);
        assert_eq!(median(&[1.0, 3.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
    }

    #[test]
    fn test_median_does_not_mutate_input() {
        let values = vec![5.0, 1.0, 4.0, 2.0];
        let _ = median(&values);
        assert_eq!(values, vec![5.0, 1.0, 4.0, 2.0]);
    }

    #[test]
    fn test_median_resists_outliers() {
        let samples = [20.0, 22.0, 21.0, 1000.0];
        let ping = median(&samples).round();

        assert!(ping == 21.0 || ping == 22.0, "ping was {}", ping);
        assert!(mean(&samples) > 200.0);
    }

    #[test]
    fn test_stddev() {
        assert_eq!(stddev(&[]), 0.0);
        assert_eq!(stddev(&[42.0]), 0.0);
        assert_eq!(stddev(&[2.0, 2.0, 2.0]), 0.0);
        assert!(stddev(&[1.0, 2.0, 3.0]) > 0.0);
    }

    #[test]
    fn test_stddev_is_population() {
        // sqrt(((1-2)^2 + 0 + (3-2)^2) / 3)
        let expected = (2.0f64 / 3.0).sqrt();
        assert!((stddev(&[1.0, 2.0, 3.0]) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_speed_to_position_bounds() {
        assert_eq!(speed_to_position(0.0), 0.0);
        assert_eq!(speed_to_position(GAUGE_CAP_MBPS), 1.0);
        assert_eq!(speed_to_position(5000.0), speed_to_position(2000.0));
        assert_eq!(speed_to_position(-3.0), 0.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(12.345, 1), 12.3);
        assert_eq!(round_to(12.35, 0), 12.0);
        assert_eq!(round_to(21.5, 0), 22.0);
        assert_eq!(round_to(0.05, 1), 0.1);
    }

    #[test]
    fn test_mbps() {
        // 12.5 MB in one second is 100 Mbps
        assert_eq!(mbps(12_500_000, Duration::from_secs(1)), 100.0);
        assert_eq!(mbps(1_000, Duration::ZERO), 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn speed_to_position_is_monotonic(
            a in 0.0f64..10_000.0,
            b in 0.0f64..10_000.0,
        ) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(speed_to_position(low) <= speed_to_position(high));
        }

        #[test]
        fn speed_to_position_stays_normalized(
            speed in proptest::num::f64::ANY,
        ) {
            let position = speed_to_position(speed);
            prop_assert!((0.0..=1.0).contains(&position));
        }

        #[test]
        fn median_lies_within_sample_range(
            values in prop::collection::vec(0.0f64..10_000.0, 1..64),
        ) {
            let m = median(&values);
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(m >= min && m <= max);
        }

        #[test]
        fn stddev_is_non_negative(
            values in prop::collection::vec(-1e6f64..1e6, 0..64),
        ) {
            prop_assert!(stddev(&values) >= 0.0);
        }
    }
}
