use crate::aggregator::HistoricalPoint;
use crate::stats::{mean, population_variance};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MIN_PERIODS: usize = 12;

/// Observations of a month needed for full confidence.
const FULL_CONFIDENCE_OBSERVATIONS: f64 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeasonalPattern {
    /// Calendar month, 1-12.
    pub month: u32,
    /// Ratio of the month's average to the overall average.
    pub factor: f64,
    pub confidence: f64,
    pub historical_average: f64,
    pub variance: f64,
}

/// Factor for `month`, or 1.0 when no pattern covers it.
pub fn seasonal_factor(patterns: &[SeasonalPattern], month: u32) -> f64 {
    find_pattern(patterns, month).map_or(1.0, |p| p.factor)
}

pub fn find_pattern(patterns: &[SeasonalPattern], month: u32) -> Option<&SeasonalPattern> {
    patterns.iter().find(|p| p.month == month)
}

#[derive(Debug, Clone, Copy)]
pub struct SeasonalityDetector {
    min_periods: usize,
}

impl Default for SeasonalityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PERIODS)
    }
}

impl SeasonalityDetector {
    pub fn new(min_periods: usize) -> Self {
        Self { min_periods }
    }

    pub fn min_periods(&self) -> usize {
        self.min_periods
    }

    pub fn has_enough_history(&self, points: &[HistoricalPoint]) -> bool {
        points.len() >= self.min_periods
    }

    /// One pattern per calendar month observed, ordered by month. Empty when
    /// the series is shorter than the configured minimum.
    pub fn detect(&self, points: &[HistoricalPoint]) -> Vec<SeasonalPattern> {
        if !self.has_enough_history(points) {
            debug!(
                "Seasonality skipped: {} points, {} required",
                points.len(),
                self.min_periods
            );
            return Vec::new();
        }

        let mut by_month: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for point in points {
            by_month.entry(point.month()).or_default().push(point.value);
        }

        let all_values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let overall_average = mean(&all_values);

        by_month
            .into_iter()
            .map(|(month, values)| {
                let average = mean(&values);
                SeasonalPattern {
                    month,
                    factor: if overall_average > 0.0 {
                        average / overall_average
                    } else {
                        1.0
                    },
                    confidence: (values.len() as f64 / FULL_CONFIDENCE_OBSERVATIONS).min(1.0),
                    historical_average: average,
                    variance: population_variance(&values),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::monthly_series;
    use chrono::NaiveDate;

    fn series(start_month: u32, values: &[f64]) -> Vec<HistoricalPoint> {
        monthly_series(NaiveDate::from_ymd_opt(2022, start_month, 1).unwrap(), values).unwrap()
    }

    #[test]
    fn test_short_history_yields_no_patterns() {
        let points = series(1, &[100.0; 11]);
        assert!(SeasonalityDetector::default().detect(&points).is_empty());
    }

    #[test]
    fn test_flat_year_has_unit_factors() {
        let points = series(1, &[100.0; 12]);
        let patterns = SeasonalityDetector::default().detect(&points);

        assert_eq!(patterns.len(), 12);
        for (i, p) in patterns.iter().enumerate() {
            assert_eq!(p.month, i as u32 + 1);
            assert!((p.factor - 1.0).abs() < 1e-12);
            assert!((p.confidence - 1.0 / 3.0).abs() < 1e-12);
            assert_eq!(p.variance, 0.0);
        }
    }

    #[test]
    fn test_december_peak_over_three_years() {
        let mut values = Vec::new();
        for year in 0..3 {
            for month in 1..=12 {
                let base = 100.0 + year as f64 * 10.0;
                values.push(if month == 12 { base * 2.0 } else { base });
            }
        }
        let patterns = SeasonalityDetector::default().detect(&series(1, &values));

        let december = find_pattern(&patterns, 12).unwrap();
        assert!(december.factor > 1.8);
        assert_eq!(december.confidence, 1.0);
        assert!((december.historical_average - 220.0).abs() < 1e-9);
        assert!((december.variance - 800.0 / 3.0).abs() < 1e-9);
        assert!(seasonal_factor(&patterns, 6) < 1.0);
    }

    #[test]
    fn test_missing_month_defaults_to_unit_factor() {
        assert_eq!(seasonal_factor(&[], 4), 1.0);
    }
}
