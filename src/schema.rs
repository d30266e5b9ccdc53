use crate::error::{AnalyticsError, Result};
use crate::ingestion::Nature;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ForecastType {
    #[schemars(description = "Revenue records only")]
    Revenue,

    #[schemars(description = "Cost and expense records")]
    Cost,

    #[schemars(description = "Revenue minus costs and expenses, per month")]
    Profit,

    #[schemars(description = "Every record with its signed amount")]
    Cashflow,

    #[schemars(description = "Every record with its signed amount (all natures)")]
    Comprehensive,
}

impl ForecastType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::Cost => "cost",
            Self::Profit => "profit",
            Self::Cashflow => "cashflow",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for ForecastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ForecastAlgorithm {
    #[schemars(description = "Ordinary least squares line projected forward")]
    LinearRegression,

    #[schemars(description = "Mean of the most recent window, held constant over the horizon")]
    MovingAverage,

    #[schemars(description = "Holt's two-parameter smoothing (level and trend)")]
    ExponentialSmoothing,

    #[schemars(description = "Served by the linear regression projection")]
    Arima,

    #[schemars(description = "Last value plus trend slope plus a monthly seasonal adjustment")]
    SeasonalDecomposition,
}

impl ForecastAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinearRegression => "linear_regression",
            Self::MovingAverage => "moving_average",
            Self::ExponentialSmoothing => "exponential_smoothing",
            Self::Arima => "arima",
            Self::SeasonalDecomposition => "seasonal_decomposition",
        }
    }
}

impl fmt::Display for ForecastAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ForecastFilters {
    pub account_codes: Vec<String>,
    pub departments: Vec<String>,
    pub cost_centers: Vec<String>,
    pub natures: Vec<Nature>,
    pub summaries: Vec<String>,
}

impl ForecastFilters {
    /// Names of list filters that contain blank entries.
    pub fn blank_fields(&self) -> Vec<&'static str> {
        let lists: [(&'static str, &Vec<String>); 4] = [
            ("accountCodes", &self.account_codes),
            ("departments", &self.departments),
            ("costCenters", &self.cost_centers),
            ("summaries", &self.summaries),
        ];

        lists
            .into_iter()
            .filter(|(_, values)| values.iter().any(|v| v.trim().is_empty()))
            .map(|(name, _)| name)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmParams {
    #[schemars(description = "Moving average window, 2-12 months (default 3)")]
    pub window_size: Option<usize>,

    #[schemars(description = "Level smoothing factor, 0-1 (default 0.3)")]
    pub alpha: Option<f64>,

    #[schemars(description = "Trend smoothing factor, 0-1 (default 0.1)")]
    pub beta: Option<f64>,

    #[schemars(description = "Seasonal smoothing factor, 0-1")]
    pub gamma: Option<f64>,

    #[schemars(description = "1-3; degree 2 adds a 0.1 * slope * x^2 acceleration term")]
    pub polynomial_degree: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MarketConditions {
    Optimistic,
    Neutral,
    Pessimistic,
}

impl MarketConditions {
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Optimistic => 1.1,
            Self::Neutral => 1.0,
            Self::Pessimistic => 0.9,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalFactors {
    pub economic_growth: Option<f64>,
    pub inflation: Option<f64>,
    pub market_conditions: Option<MarketConditions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioParams {
    #[schemars(description = "Per-period growth compounded over the horizon (recommended -1 to 1)")]
    pub growth_rate: Option<f64>,

    #[schemars(description = "Width of the uniform random perturbation (non-negative)")]
    pub volatility: Option<f64>,

    pub external_factors: Option<ExternalFactors>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ForecastOptions {
    pub include_confidence_intervals: bool,
    #[schemars(description = "One of 0.8, 0.9, 0.95, 0.99")]
    pub confidence_level: Option<f64>,
    pub include_scenarios: bool,
    pub generate_insights: bool,
    pub save_to_database: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRequest {
    pub forecast_type: ForecastType,

    #[schemars(description = "Number of months to forecast (1-24)")]
    pub periods: u32,

    pub algorithm: ForecastAlgorithm,

    #[schemars(description = "First month of history, YYYY-MM or YYYY-MM-DD")]
    #[serde(default)]
    pub start_date: Option<String>,

    #[schemars(description = "Last month of history, YYYY-MM or YYYY-MM-DD")]
    #[serde(default)]
    pub end_date: Option<String>,

    #[serde(default)]
    pub filters: Option<ForecastFilters>,

    #[serde(default)]
    pub algorithm_params: Option<AlgorithmParams>,

    #[serde(default)]
    pub scenario_params: Option<ScenarioParams>,

    #[serde(default)]
    pub options: Option<ForecastOptions>,
}

impl ForecastRequest {
    pub fn new(forecast_type: ForecastType, algorithm: ForecastAlgorithm, periods: u32) -> Self {
        Self {
            forecast_type,
            periods,
            algorithm,
            start_date: None,
            end_date: None,
            filters: None,
            algorithm_params: None,
            scenario_params: None,
            options: None,
        }
    }

    /// Parses a request body; malformed JSON and unknown enum values become
    /// validation errors rather than serialization errors.
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| AnalyticsError::validation(e.to_string()))
    }

    pub fn params(&self) -> AlgorithmParams {
        self.algorithm_params.clone().unwrap_or_default()
    }

    pub fn options(&self) -> ForecastOptions {
        self.options.clone().unwrap_or_default()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ForecastRequest)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Revenue,
    Costs,
    Margin,
    Forecast,
    Summary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsFilters {
    pub account_summary: Vec<String>,
    pub nature: Vec<Nature>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRequest {
    pub project_id: String,
    #[schemars(description = "YYYY-MM or YYYY-MM-DD")]
    pub start_date: String,
    #[schemars(description = "YYYY-MM or YYYY-MM-DD")]
    pub end_date: String,
    pub metrics: Vec<MetricKind>,
    #[serde(default)]
    pub filters: Option<MetricsFilters>,
}

impl MetricsRequest {
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| AnalyticsError::validation(e.to_string()))
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(MetricsRequest)
    }
}
