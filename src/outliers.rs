use crate::aggregator::HistoricalPoint;
use crate::stats::quantile_floor;
use log::info;

pub const DEFAULT_IQR_THRESHOLD: f64 = 1.5;

/// Interquartile-range filter. Quartiles are read at `floor(n * 0.25)` and
/// `floor(n * 0.75)` of the sorted values.
#[derive(Debug, Clone, Copy)]
pub struct OutlierFilter {
    threshold: f64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self::new(DEFAULT_IQR_THRESHOLD)
    }
}

impl OutlierFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `(lower, upper)` bounds for `values`, or `None` below four points.
    pub fn bounds(&self, values: &[f64]) -> Option<(f64, f64)> {
        if values.len() < 4 {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let q1 = quantile_floor(&sorted, 0.25);
        let q3 = quantile_floor(&sorted, 0.75);
        let iqr = q3 - q1;

        Some((q1 - self.threshold * iqr, q3 + self.threshold * iqr))
    }

    /// Returns a new series without the points outside the IQR bounds.
    pub fn filter(&self, points: &[HistoricalPoint]) -> Vec<HistoricalPoint> {
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let Some((lower, upper)) = self.bounds(&values) else {
            return points.to_vec();
        };

        let kept: Vec<HistoricalPoint> = points
            .iter()
            .filter(|p| p.value >= lower && p.value <= upper)
            .cloned()
            .collect();

        if kept.len() < points.len() {
            info!(
                "Outliers removed: original={}, filtered={}, removed={}",
                points.len(),
                kept.len(),
                points.len() - kept.len()
            );
        }

        kept
    }
}
