use crate::aggregator::HistoricalPoint;
use crate::error::Result;
use crate::forecast::ForecastGenerator;
use crate::schema::{AlgorithmParams, ForecastAlgorithm};
use log::debug;
use serde::{Deserialize, Serialize};

/// Below this many points the backtest is skipped.
pub const MIN_BACKTEST_POINTS: usize = 4;
const HOLDOUT_FRACTION: f64 = 0.2;
const DEFAULT_MAPE: f64 = 0.2;
const DEFAULT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccuracyMetrics {
    pub mape: f64,
    pub rmse: f64,
    pub mae: f64,
}

impl AccuracyMetrics {
    pub fn insufficient_data() -> Self {
        Self {
            mape: DEFAULT_MAPE,
            rmse: 0.0,
            mae: 0.0,
        }
    }

    /// `1 - mape` floored at zero; a zero MAPE reports the default 0.8.
    pub fn confidence(&self) -> f64 {
        if self.mape > 0.0 {
            (1.0 - self.mape).max(0.0)
        } else {
            DEFAULT_CONFIDENCE
        }
    }
}

/// Number of trailing points held out for testing.
pub fn holdout_size(len: usize) -> usize {
    ((len as f64 * HOLDOUT_FRACTION).floor() as usize).max(1)
}

#[derive(Debug, Clone)]
pub struct AccuracyEvaluator {
    algorithm: ForecastAlgorithm,
    params: AlgorithmParams,
}

impl AccuracyEvaluator {
    pub fn new(algorithm: ForecastAlgorithm) -> Self {
        Self {
            algorithm,
            params: AlgorithmParams::default(),
        }
    }

    pub fn with_params(mut self, params: AlgorithmParams) -> Self {
        self.params = params;
        self
    }

    /// Trains on the leading 80% of the series and scores the predictions
    /// for the held-out tail, one step further ahead for each point.
    pub fn evaluate(&self, series: &[HistoricalPoint]) -> Result<AccuracyMetrics> {
        if series.len() < MIN_BACKTEST_POINTS {
            return Ok(AccuracyMetrics::insufficient_data());
        }

        let test_size = holdout_size(series.len());
        let (train, test) = series.split_at(series.len() - test_size);

        let predictions = ForecastGenerator::new(self.algorithm)
            .with_params(self.params.clone())
            .generate(train, test_size)?;

        let mut abs_error = 0.0;
        let mut squared_error = 0.0;
        let mut percentage_error = 0.0;

        for (actual, predicted) in test.iter().zip(&predictions) {
            let error = (actual.value - predicted.value).abs();
            abs_error += error;
            squared_error += error * error;
            if actual.value != 0.0 {
                percentage_error += error / actual.value.abs();
            }
        }

        let n = test.len() as f64;
        let metrics = AccuracyMetrics {
            mape: percentage_error / n,
            rmse: (squared_error / n).sqrt(),
            mae: abs_error / n,
        };

        debug!(
            "Backtest of {} on {} train / {} test points: mape={:.4}",
            self.algorithm,
            train.len(),
            test.len(),
            metrics.mape
        );

        Ok(metrics)
    }
}
