use crate::aggregator::HistoricalPoint;
use crate::stats::linear_fit;
use serde::{Deserialize, Serialize};

/// Slopes with a smaller magnitude are reported as stable.
pub const STABLE_SLOPE: f64 = 0.01;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    pub strength: f64,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub significance: f64,
}

impl TrendAnalysis {
    pub fn flat() -> Self {
        Self {
            direction: TrendDirection::Stable,
            strength: 0.0,
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
            significance: 0.0,
        }
    }
}

/// Three-tier significance lookup keyed on trend strength.
pub fn significance_for(strength: f64) -> f64 {
    if strength > 0.5 {
        0.95
    } else if strength > 0.3 {
        0.8
    } else {
        0.5
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrendAnalyzer;

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// OLS of value against the 0-based index; needs at least three points.
    pub fn analyze(&self, points: &[HistoricalPoint]) -> TrendAnalysis {
        if points.len() < 3 {
            return TrendAnalysis::flat();
        }

        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let fit = linear_fit(&values);

        let direction = if fit.slope.abs() < STABLE_SLOPE {
            TrendDirection::Stable
        } else if fit.slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };
        let strength = fit.r_squared.abs().min(1.0);

        TrendAnalysis {
            direction,
            strength,
            slope: fit.slope,
            intercept: fit.intercept,
            r_squared: fit.r_squared,
            significance: significance_for(strength),
        }
    }
}
