//! Small numeric helpers shared by the analyzers.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance dividing by `n`.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64
}

/// Variance dividing by `n - 1`; zero for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Value at `floor(len * fraction)` of an ascending slice.
pub fn quantile_floor(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * fraction).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Ordinary least squares of `values` against their 0-based index.
pub fn linear_fit(values: &[f64]) -> LinearFit {
    let n = values.len() as f64;
    if values.is_empty() {
        return LinearFit {
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
        };
    }

    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_xx: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    let slope = if denominator == 0.0 {
        0.0
    } else {
        (n * sum_xy - sum_x * sum_y) / denominator
    };
    let intercept = (sum_y - slope * sum_x) / n;

    let y_mean = sum_y / n;
    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| (y - (slope * i as f64 + intercept)).powi(2))
        .sum();
    let ss_tot: f64 = values.iter().map(|y| (y - y_mean).powi(2)).sum();
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    };

    LinearFit {
        slope,
        intercept,
        r_squared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variances() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1e-12);
        assert!((population_variance(&values) - 4.0).abs() < 1e-12);
        assert!((sample_variance(&values) - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(sample_variance(&[3.0]), 0.0);
    }

    #[test]
    fn test_quantile_floor() {
        let sorted = [98.0, 99.0, 100.0, 101.0, 102.0, 105.0, 5000.0];
        assert_eq!(quantile_floor(&sorted, 0.25), 99.0);
        assert_eq!(quantile_floor(&sorted, 0.75), 105.0);
    }

    #[test]
    fn test_linear_fit_perfect_line() {
        let fit = linear_fit(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        assert!((fit.slope - 10.0).abs() < 1e-9);
        assert!((fit.intercept - 10.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert!((fit.predict(5.0) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_fit_single_point_is_flat() {
        let fit = linear_fit(&[42.0]);
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 42.0);
        assert_eq!(fit.r_squared, 0.0);
    }
}
