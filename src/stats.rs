//! Order statistics over band samples.
//!
//! Both functions use linear interpolation between the two closest ranks:
//! the `q`-th percentile of `n` sorted values sits at rank `q / 100 * (n - 1)`.

/// Percentile of `values`; NaN if any value is NaN or the slice is empty.
///
/// Reorders `values` in place.
pub fn percentile(values: &mut [f32], q: f64) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    interpolate(values, q)
}

/// Percentile of the non-NaN entries of `values`; NaN if none remain.
pub fn nan_percentile(values: &[f32], q: f64) -> f64 {
    let mut finite: Vec<f32> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    interpolate(&mut finite, q)
}

fn interpolate(values: &mut [f32], q: f64) -> f64 {
    let rank = q.clamp(0.0, 100.0) / 100.0 * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    let (_, &mut low, above) = values.select_nth_unstable_by(lower, f32::total_cmp);
    let low = f64::from(low);
    if upper == lower {
        return low;
    }
    // the next rank up is the minimum of the partition above `lower`
    let high = above
        .iter()
        .copied()
        .min_by(f32::total_cmp)
        .map_or(low, f64::from);
    low + (high - low) * fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates_between_ranks() {
        let mut values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        // rank 0.9 * 9 = 8.1 -> 9 + 0.1 * (10 - 9)
        assert!((percentile(&mut values, 90.0) - 9.1).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_is_order_independent() {
        let mut shuffled = vec![7.0, 3.0, 10.0, 1.0, 9.0, 2.0, 8.0, 5.0, 4.0, 6.0];
        assert!((percentile(&mut shuffled, 90.0) - 9.1).abs() < 1e-9);
        let mut shuffled = vec![7.0, 3.0, 10.0, 1.0, 9.0, 2.0, 8.0, 5.0, 4.0, 6.0];
        assert_eq!(percentile(&mut shuffled, 0.0), 1.0);
        let mut shuffled = vec![7.0, 3.0, 10.0, 1.0, 9.0, 2.0, 8.0, 5.0, 4.0, 6.0];
        assert_eq!(percentile(&mut shuffled, 100.0), 10.0);
    }

    #[test]
    fn test_percentile_of_constant_values() {
        let mut values = vec![50.0; 64];
        assert_eq!(percentile(&mut values, 90.0), 50.0);
    }

    #[test]
    fn test_percentile_propagates_nan() {
        let mut values = vec![1.0, f32::NAN, 3.0];
        assert!(percentile(&mut values, 90.0).is_nan());
        assert!(percentile(&mut [], 90.0).is_nan());
    }

    #[test]
    fn test_nan_percentile_skips_nan() {
        let values = [f32::NAN, 0.0, 10.0, f32::NAN];
        assert!((nan_percentile(&values, 50.0) - 5.0).abs() < 1e-9);
        assert!(nan_percentile(&[f32::NAN], 50.0).is_nan());
    }
}
