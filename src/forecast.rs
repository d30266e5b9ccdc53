//! Per-period value synthesis for the five forecasting algorithms.

use crate::aggregator::HistoricalPoint;
use crate::error::{AnalyticsError, Result};
use crate::schema::{AlgorithmParams, ForecastAlgorithm, ScenarioParams};
use crate::seasonality::{find_pattern, SeasonalPattern};
use crate::stats::linear_fit;
use crate::trend::{TrendAnalysis, TrendAnalyzer};
use crate::utils::{add_months, period_key};
use chrono::{Datelike, NaiveDate};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW_SIZE: usize = 3;
pub const DEFAULT_ALPHA: f64 = 0.3;
pub const DEFAULT_BETA: f64 = 0.1;

/// Weight of the quadratic term when `polynomialDegree == 2`.
const ACCELERATION_FACTOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ForecastComponents {
    pub trend: f64,
    pub seasonal: f64,
    pub residual: f64,
}

impl ForecastComponents {
    fn is_zero(&self) -> bool {
        self.trend == 0.0 && self.seasonal == 0.0 && self.residual == 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    /// "YYYY-MM"
    pub period: String,
    pub date: NaiveDate,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<ForecastComponents>,
}

/// OLS line projected to index `n + periods_ahead - 1`. Degree 2 adds
/// `0.1 * slope * x^2`, a fixed acceleration heuristic rather than a fit.
pub fn linear_regression_forecast(
    values: &[f64],
    periods_ahead: usize,
    polynomial_degree: Option<u32>,
) -> f64 {
    let fit = linear_fit(values);
    let future_x = (values.len() + periods_ahead) as f64 - 1.0;

    if polynomial_degree == Some(2) {
        let acceleration = fit.slope * ACCELERATION_FACTOR;
        return fit.predict(future_x) + acceleration * future_x * future_x;
    }

    fit.predict(future_x)
}

/// Mean of the last `window_size` values (clamped to the series length).
/// The window does not roll forward, so every period gets the same value.
pub fn moving_average_forecast(values: &[f64], window_size: usize) -> f64 {
    let window = window_size.clamp(1, values.len().max(1));
    let recent = &values[values.len().saturating_sub(window)..];
    if recent.is_empty() {
        return 0.0;
    }
    recent.iter().sum::<f64>() / recent.len() as f64
}

/// Holt's linear method.
pub fn exponential_smoothing_forecast(
    values: &[f64],
    periods_ahead: usize,
    alpha: f64,
    beta: f64,
) -> f64 {
    let Some(&first) = values.first() else {
        return 0.0;
    };

    let mut level = first;
    let mut trend = if values.len() > 1 {
        values[1] - values[0]
    } else {
        0.0
    };

    for &value in &values[1..] {
        let prev_level = level;
        level = alpha * value + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
    }

    level + periods_ahead as f64 * trend
}

/// `last + slope * ahead + (factor - 1) * last`, where the seasonal term is
/// zero when no pattern covers `target_month`.
pub fn seasonal_decomposition_forecast(
    last_value: f64,
    periods_ahead: usize,
    target_month: u32,
    patterns: &[SeasonalPattern],
    slope: f64,
) -> (f64, ForecastComponents) {
    let trend_component = slope * periods_ahead as f64;
    let seasonal_component =
        find_pattern(patterns, target_month).map_or(0.0, |p| (p.factor - 1.0) * last_value);

    (
        last_value + trend_component + seasonal_component,
        ForecastComponents {
            trend: trend_component,
            seasonal: seasonal_component,
            residual: 0.0,
        },
    )
}

/// Growth compounding, volatility perturbation and external factors.
pub fn apply_scenario_params<R: Rng + ?Sized>(
    value: f64,
    params: &ScenarioParams,
    periods_ahead: usize,
    rng: &mut R,
) -> f64 {
    let mut adjusted = value;

    if let Some(growth) = params.growth_rate {
        adjusted *= (1.0 + growth).powi(periods_ahead as i32);
    }

    if let Some(volatility) = params.volatility.filter(|v| *v != 0.0) {
        let draw: f64 = rng.gen();
        adjusted *= 1.0 + (draw - 0.5) * volatility;
    }

    if let Some(factors) = &params.external_factors {
        if let Some(growth) = factors.economic_growth {
            adjusted *= 1.0 + growth;
        }
        if let Some(inflation) = factors.inflation {
            adjusted *= 1.0 + inflation;
        }
        if let Some(conditions) = factors.market_conditions {
            adjusted *= conditions.multiplier();
        }
    }

    adjusted
}

#[derive(Debug, Clone)]
pub struct ForecastGenerator {
    algorithm: ForecastAlgorithm,
    params: AlgorithmParams,
    seasonal_patterns: Vec<SeasonalPattern>,
    trend: Option<TrendAnalysis>,
    scenario: Option<ScenarioParams>,
}

impl ForecastGenerator {
    pub fn new(algorithm: ForecastAlgorithm) -> Self {
        Self {
            algorithm,
            params: AlgorithmParams::default(),
            seasonal_patterns: Vec::new(),
            trend: None,
            scenario: None,
        }
    }

    pub fn with_params(mut self, params: AlgorithmParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_seasonality(mut self, patterns: Vec<SeasonalPattern>) -> Self {
        self.seasonal_patterns = patterns;
        self
    }

    pub fn with_trend(mut self, trend: TrendAnalysis) -> Self {
        self.trend = Some(trend);
        self
    }

    pub fn with_scenario(mut self, scenario: Option<ScenarioParams>) -> Self {
        self.scenario = scenario;
        self
    }

    pub fn algorithm(&self) -> ForecastAlgorithm {
        self.algorithm
    }

    pub fn generate(
        &self,
        series: &[HistoricalPoint],
        horizon: usize,
    ) -> Result<Vec<ForecastPeriod>> {
        self.generate_with_rng(series, horizon, &mut thread_rng())
    }

    /// Same as [`generate`](Self::generate) with an explicit random source
    /// for the volatility perturbation.
    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        series: &[HistoricalPoint],
        horizon: usize,
        rng: &mut R,
    ) -> Result<Vec<ForecastPeriod>> {
        let last = series.last().ok_or_else(|| {
            AnalyticsError::Computation("Cannot forecast from an empty series".to_string())
        })?;
        let values: Vec<f64> = series.iter().map(|p| p.value).collect();

        let trend = match self.trend {
            Some(trend) => trend,
            None => TrendAnalyzer::new().analyze(series),
        };

        let mut periods = Vec::with_capacity(horizon);

        for ahead in 1..=horizon {
            let date = add_months(last.date, ahead as i32)?;
            let month = date.month();
            let mut components = ForecastComponents::default();

            let mut value = match self.algorithm {
                ForecastAlgorithm::LinearRegression => {
                    linear_regression_forecast(&values, ahead, self.params.polynomial_degree)
                }
                ForecastAlgorithm::MovingAverage => moving_average_forecast(
                    &values,
                    self.params.window_size.unwrap_or(DEFAULT_WINDOW_SIZE),
                ),
                ForecastAlgorithm::ExponentialSmoothing => exponential_smoothing_forecast(
                    &values,
                    ahead,
                    self.params.alpha.unwrap_or(DEFAULT_ALPHA),
                    self.params.beta.unwrap_or(DEFAULT_BETA),
                ),
                ForecastAlgorithm::SeasonalDecomposition => {
                    let (value, parts) = seasonal_decomposition_forecast(
                        last.value,
                        ahead,
                        month,
                        &self.seasonal_patterns,
                        trend.slope,
                    );
                    components = parts;
                    value
                }
                // Served by the plain OLS projection.
                ForecastAlgorithm::Arima => linear_regression_forecast(&values, ahead, None),
            };

            if self.algorithm != ForecastAlgorithm::SeasonalDecomposition {
                if let Some(pattern) = find_pattern(&self.seasonal_patterns, month) {
                    value *= pattern.factor;
                    components.seasonal = value * (pattern.factor - 1.0);
                }
            }

            if let Some(scenario) = &self.scenario {
                value = apply_scenario_params(value, scenario, ahead, rng);
            }

            if !value.is_finite() {
                return Err(AnalyticsError::Computation(format!(
                    "{} produced a non-finite value for {}",
                    self.algorithm,
                    period_key(date)
                )));
            }

            periods.push(ForecastPeriod {
                period: period_key(date),
                date,
                value: value.max(0.0),
                confidence_interval: None,
                components: (!components.is_zero()).then_some(components),
            });
        }

        Ok(periods)
    }
}
