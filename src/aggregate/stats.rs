// Cross-host statistics. Absent (NaN) values are skipped, never treated as zero.

/// Mean of the present values; NaN when none are present.
pub fn mean(values: &[f64]) -> f64 {
    let (sum, n) = present_sum(values);
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// Unbiased sample standard deviation (n - 1); NaN with fewer than two present values.
pub fn sample_std(values: &[f64]) -> f64 {
    let (sum, n) = present_sum(values);
    if n < 2 {
        return f64::NAN;
    }
    let avg = sum / n as f64;
    let squares: f64 = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - avg).powi(2))
        .sum();
    (squares / (n - 1) as f64).sqrt()
}

/// Sum of the present values; NaN when none are present.
pub fn sum(values: &[f64]) -> f64 {
    let (sum, n) = present_sum(values);
    if n == 0 { f64::NAN } else { sum }
}

/// Running total over a series. Absent entries stay absent but do not reset the total.
pub fn cumulative_sum(series: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    series
        .iter()
        .map(|v| {
            if v.is_nan() {
                f64::NAN
            } else {
                total += v;
                total
            }
        })
        .collect()
}

fn present_sum(values: &[f64]) -> (f64, usize) {
    values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0), |(s, n), v| (s + v, n + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_skips_absent() {
        assert_eq!(mean(&[10.0, f64::NAN, 30.0]), 20.0);
        assert!(mean(&[f64::NAN]).is_nan());
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn std_is_unbiased() {
        let s = sample_std(&[10.0, 30.0]);
        assert!((s - 200f64.sqrt()).abs() < 1e-9);
        assert!(sample_std(&[10.0]).is_nan());
        assert!(sample_std(&[10.0, f64::NAN]).is_nan());
    }

    #[test]
    fn cumsum_carries_over_gaps() {
        let c = cumulative_sum(&[40.0, f64::NAN, 60.0]);
        assert_eq!(c[0], 40.0);
        assert!(c[1].is_nan());
        assert_eq!(c[2], 100.0);
    }
}
