use crate::aggregator::HistoricalPoint;
use crate::forecast::{ConfidenceInterval, ForecastPeriod};
use crate::stats::sample_variance;

pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;
const DEFAULT_Z_SCORE: f64 = 1.96;

const Z_SCORES: [(f64, f64); 4] = [(0.8, 1.28), (0.9, 1.645), (0.95, 1.96), (0.99, 2.576)];

/// Z-score for a supported confidence level, `None` otherwise.
pub fn z_score_for(level: f64) -> Option<f64> {
    Z_SCORES
        .iter()
        .find(|(l, _)| (l - level).abs() < 1e-9)
        .map(|(_, z)| *z)
}

pub fn is_supported_level(level: f64) -> bool {
    z_score_for(level).is_some()
}

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceIntervalCalculator {
    z_score: f64,
}

impl Default for ConfidenceIntervalCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_LEVEL)
    }
}

impl ConfidenceIntervalCalculator {
    /// Unsupported levels fall back to the 95% z-score.
    pub fn new(confidence_level: f64) -> Self {
        Self {
            z_score: z_score_for(confidence_level).unwrap_or(DEFAULT_Z_SCORE),
        }
    }

    pub fn z_score(&self) -> f64 {
        self.z_score
    }

    /// Standard error from the sample variance of the historical values.
    pub fn standard_error(history: &[HistoricalPoint]) -> f64 {
        let values: Vec<f64> = history.iter().map(|p| p.value).collect();
        sample_variance(&values).sqrt()
    }

    /// Margin for the 0-based horizon index; grows with `sqrt(index + 1)`.
    pub fn margin(&self, standard_error: f64, index: usize) -> f64 {
        self.z_score * standard_error * ((index + 1) as f64).sqrt()
    }

    pub fn apply(
        &self,
        periods: &[ForecastPeriod],
        history: &[HistoricalPoint],
    ) -> Vec<ForecastPeriod> {
        let standard_error = Self::standard_error(history);

        periods
            .iter()
            .enumerate()
            .map(|(index, period)| {
                let margin = self.margin(standard_error, index);
                ForecastPeriod {
                    confidence_interval: Some(ConfidenceInterval {
                        lower: (period.value - margin).max(0.0),
                        upper: period.value + margin,
                    }),
                    ..period.clone()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::monthly_series;
    use crate::schema::ForecastAlgorithm;
    use crate::forecast::ForecastGenerator;
    use chrono::NaiveDate;

    fn history() -> Vec<HistoricalPoint> {
        monthly_series(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            &[100.0, 120.0, 90.0, 130.0, 110.0, 95.0],
        )
        .unwrap()
    }

    #[test]
    fn test_z_score_lookup() {
        assert_eq!(ConfidenceIntervalCalculator::new(0.8).z_score(), 1.28);
        assert_eq!(ConfidenceIntervalCalculator::new(0.9).z_score(), 1.645);
        assert_eq!(ConfidenceIntervalCalculator::new(0.99).z_score(), 2.576);
        assert_eq!(ConfidenceIntervalCalculator::new(0.42).z_score(), 1.96);
        assert!(!is_supported_level(0.42));
    }

    #[test]
    fn test_interval_width_grows_with_horizon() {
        let history = history();
        let periods = ForecastGenerator::new(ForecastAlgorithm::MovingAverage)
            .generate(&history, 8)
            .unwrap();
        let with_ci = ConfidenceIntervalCalculator::default().apply(&periods, &history);

        let widths: Vec<f64> = with_ci
            .iter()
            .map(|p| {
                let ci = p.confidence_interval.unwrap();
                ci.upper - p.value
            })
            .collect();
        assert!(widths.windows(2).all(|w| w[1] >= w[0]));

        let se = ConfidenceIntervalCalculator::standard_error(&history);
        assert!((widths[3] - 1.96 * se * 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_lower_bound_clamped_at_zero() {
        let history = history();
        let periods = vec![ForecastPeriod {
            period: "2023-07".to_string(),
            date: NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            value: 5.0,
            confidence_interval: None,
            components: None,
        }];
        let with_ci = ConfidenceIntervalCalculator::default().apply(&periods, &history);
        assert_eq!(with_ci[0].confidence_interval.unwrap().lower, 0.0);
    }

    #[test]
    fn test_single_point_history_has_zero_margin() {
        let history = monthly_series(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), &[50.0]).unwrap();
        assert_eq!(ConfidenceIntervalCalculator::standard_error(&history), 0.0);
    }
}
