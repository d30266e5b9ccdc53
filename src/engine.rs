use crate::accuracy::{AccuracyEvaluator, AccuracyMetrics};
use crate::aggregator::{
    DateRange, HistoricalDataAggregator, HistoricalDataSource, HistoricalPoint, HistoricalQuery,
};
use crate::cancellation::CancellationToken;
use crate::confidence::ConfidenceIntervalCalculator;
use crate::config::EngineConfig;
use crate::error::{AnalyticsError, Result};
use crate::forecast::{ForecastGenerator, ForecastPeriod};
use crate::insights::{ForecastInsight, InsightGenerator};
use crate::outliers::OutlierFilter;
use crate::scenarios::{ForecastScenarios, ScenarioGenerator};
use crate::schema::{AlgorithmParams, ForecastAlgorithm, ForecastRequest, ForecastType};
use crate::seasonality::{SeasonalPattern, SeasonalityDetector};
use crate::trend::{TrendAnalysis, TrendAnalyzer};
use crate::utils::{month_start, parse_month};
use crate::validation::validate_request;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForecastMetadata {
    pub generated_at: DateTime<Utc>,
    /// First and last month of the cleaned history.
    pub data_range: Option<DataRange>,
    pub algorithm_params: AlgorithmParams,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResult {
    pub forecast_type: ForecastType,
    pub algorithm: ForecastAlgorithm,
    pub periods: Vec<ForecastPeriod>,
    pub confidence: f64,
    pub historical_data_points: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<ForecastScenarios>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<Vec<ForecastInsight>>,
    pub accuracy: AccuracyMetrics,
    pub trend: TrendAnalysis,
    pub seasonal_patterns: Vec<SeasonalPattern>,
    pub metadata: ForecastMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub generated_at: DateTime<Utc>,
    pub generated_by: String,
    pub algorithm: ForecastAlgorithm,
    pub confidence: f64,
    pub data_points: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastResponse {
    pub success: bool,
    pub message: String,
    pub data: ForecastResult,
    pub metadata: ResponseMetadata,
}

impl ForecastResponse {
    pub fn new(data: ForecastResult, user_id: &str) -> Self {
        let metadata = ResponseMetadata {
            generated_at: data.metadata.generated_at,
            generated_by: user_id.to_string(),
            algorithm: data.algorithm,
            confidence: data.confidence,
            data_points: data.historical_data_points,
        };
        Self {
            success: true,
            message: format!("{} forecast generated successfully", data.forecast_type),
            data,
            metadata,
        }
    }
}

/// Persistence collaborator for generated forecasts.
pub trait ForecastStore: Send + Sync {
    fn save(&self, result: &ForecastResult, user_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredForecast {
    pub user_id: String,
    pub result: ForecastResult,
}

/// Keeps saved forecasts in memory.
#[derive(Debug, Default)]
pub struct InMemoryForecastStore {
    saved: Mutex<Vec<StoredForecast>>,
}

impl InMemoryForecastStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<StoredForecast> {
        self.saved.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.saved.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ForecastStore for InMemoryForecastStore {
    fn save(&self, result: &ForecastResult, user_id: &str) -> Result<()> {
        self.saved.lock().push(StoredForecast {
            user_id: user_id.to_string(),
            result: result.clone(),
        });
        Ok(())
    }
}

/// Runs the forecast pipeline against a historical data source.
pub struct ForecastEngine {
    config: EngineConfig,
    source: Arc<dyn HistoricalDataSource>,
    store: Option<Arc<dyn ForecastStore>>,
}

impl ForecastEngine {
    pub fn new(source: Arc<dyn HistoricalDataSource>) -> Self {
        Self {
            config: EngineConfig::default(),
            source,
            store: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_store(mut self, store: Arc<dyn ForecastStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolves the history window: explicit dates win, otherwise the
    /// configured number of months ending with the current month.
    pub fn history_query(&self, request: &ForecastRequest) -> Result<HistoricalQuery> {
        let end = match &request.end_date {
            Some(raw) => parse_month(raw)?,
            None => month_start(Utc::now().date_naive()),
        };
        let range = match &request.start_date {
            Some(raw) => DateRange::from_months(parse_month(raw)?, end)?,
            None => DateRange::trailing_months(end, self.config.default_history_months)?,
        };

        Ok(HistoricalQuery::new(range).with_filters(request.filters.clone().unwrap_or_default()))
    }

    pub fn generate(&self, request: &ForecastRequest, user_id: &str) -> Result<ForecastResponse> {
        self.generate_with(request, user_id, &CancellationToken::new(), &mut thread_rng())
    }

    /// [`generate`](Self::generate) with an explicit cancellation token and
    /// random source.
    pub fn generate_with<R: Rng + ?Sized>(
        &self,
        request: &ForecastRequest,
        user_id: &str,
        token: &CancellationToken,
        rng: &mut R,
    ) -> Result<ForecastResponse> {
        info!(
            "Generating {} forecast: algorithm={}, periods={}, user={}",
            request.forecast_type, request.algorithm, request.periods, user_id
        );

        self.run(request, user_id, token, rng)
            .map(|result| ForecastResponse::new(result, user_id))
            .map_err(|e| {
                match &e {
                    AnalyticsError::Validation { errors } => {
                        warn!("Rejected forecast request: {}", errors.join("; "))
                    }
                    AnalyticsError::Cancelled(stage) => warn!("Forecast cancelled during {}", stage),
                    other => error!(
                        "Forecast generation failed for {} / {}: {}",
                        request.forecast_type, request.algorithm, other
                    ),
                }
                e
            })
    }

    fn run<R: Rng + ?Sized>(
        &self,
        request: &ForecastRequest,
        user_id: &str,
        token: &CancellationToken,
        rng: &mut R,
    ) -> Result<ForecastResult> {
        let validation = validate_request(request).into_result()?;
        let mut warnings = validation.warnings;
        let options = request.options();
        let params = request.params();
        token.check("validation")?;

        let query = self.history_query(request)?;
        let points = HistoricalDataAggregator::new(self.source.as_ref())
            .collect(&query, request.forecast_type)?;
        if points.is_empty() {
            return Err(AnalyticsError::DataSource(format!(
                "No historical {} data between {} and {} for the given filters",
                request.forecast_type, query.range.start, query.range.end
            )));
        }
        token.check("aggregation")?;

        let cleaned = self.clean(points);
        token.check("outlier filtering")?;

        let detector = SeasonalityDetector::new(self.config.seasonality.min_periods);
        let seasonal_patterns = if self.config.seasonality.enabled {
            if !detector.has_enough_history(&cleaned) {
                warnings.push(format!(
                    "Seasonality not applied: {} months of history, {} required",
                    cleaned.len(),
                    detector.min_periods()
                ));
            }
            detector.detect(&cleaned)
        } else {
            Vec::new()
        };
        let trend = TrendAnalyzer::new().analyze(&cleaned);
        token.check("analysis")?;

        let mut periods = ForecastGenerator::new(request.algorithm)
            .with_params(params.clone())
            .with_seasonality(seasonal_patterns.clone())
            .with_trend(trend)
            .with_scenario(request.scenario_params.clone())
            .generate_with_rng(&cleaned, request.periods as usize, rng)?;
        token.check("forecast synthesis")?;

        if options.include_confidence_intervals {
            let level = options
                .confidence_level
                .unwrap_or(self.config.confidence_level);
            periods = ConfidenceIntervalCalculator::new(level).apply(&periods, &cleaned);
        }

        let scenarios = options
            .include_scenarios
            .then(|| ScenarioGenerator::new().generate(&periods));
        let insights = options.generate_insights.then(|| {
            InsightGenerator::new().generate(&periods, &cleaned, &trend, &seasonal_patterns)
        });
        token.check("insights")?;

        let accuracy = AccuracyEvaluator::new(request.algorithm)
            .with_params(params.clone())
            .evaluate(&cleaned)?;
        let confidence = accuracy.confidence();
        if confidence < self.config.accuracy_threshold {
            warnings.push(format!(
                "Backtest confidence {:.2} is below the configured threshold {:.2}",
                confidence, self.config.accuracy_threshold
            ));
        }
        token.check("accuracy evaluation")?;

        if options.save_to_database && self.store.is_none() {
            warnings.push("saveToDatabase requested but no forecast store is configured".to_string());
        }

        let result = ForecastResult {
            forecast_type: request.forecast_type,
            algorithm: request.algorithm,
            periods,
            confidence,
            historical_data_points: cleaned.len(),
            scenarios,
            insights,
            accuracy,
            trend,
            seasonal_patterns,
            metadata: ForecastMetadata {
                generated_at: Utc::now(),
                data_range: data_range(&cleaned),
                algorithm_params: params,
                warnings,
                suggestions: validation.suggestions,
            },
        };

        if options.save_to_database {
            if let Some(store) = &self.store {
                store.save(&result, user_id)?;
                debug!("Saved {} forecast for {}", result.forecast_type, user_id);
            }
        }

        info!(
            "Forecast generated: {} periods, confidence {:.2}, {} data points",
            result.periods.len(),
            result.confidence,
            result.historical_data_points
        );

        Ok(result)
    }

    fn clean(&self, points: Vec<HistoricalPoint>) -> Vec<HistoricalPoint> {
        if self.config.outliers.enabled {
            OutlierFilter::new(self.config.outliers.threshold).filter(&points)
        } else {
            points
        }
    }
}

fn data_range(points: &[HistoricalPoint]) -> Option<DataRange> {
    Some(DataRange {
        start_date: points.first()?.date,
        end_date: points.last()?.date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::InMemoryLedger;
    use crate::ingestion::{Nature, Transaction};
    use crate::insights::InsightType;
    use crate::schema::{ForecastFilters, ForecastOptions};
    use crate::utils::add_months;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ledger(values: &[f64]) -> Arc<dyn HistoricalDataSource> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        let transactions = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let date = add_months(start, i as i32).unwrap();
                Transaction::new(date, v, Nature::Revenue).with_department("Sales")
            })
            .collect();
        Arc::new(InMemoryLedger::from_transactions(transactions))
    }

    fn ramp_request(periods: u32) -> ForecastRequest {
        let mut request =
            ForecastRequest::new(ForecastType::Revenue, ForecastAlgorithm::LinearRegression, periods);
        request.start_date = Some("2023-01".to_string());
        request.end_date = Some("2023-12".to_string());
        request
    }

    fn ramp() -> Vec<f64> {
        (0..12).map(|i| 100.0 + 10.0 * i as f64).collect()
    }

    #[test]
    fn test_ramp_forecast() {
        let mut config = EngineConfig::default();
        config.seasonality.enabled = false;
        let engine = ForecastEngine::new(ledger(&ramp())).with_config(config).unwrap();
        let response = engine.generate(&ramp_request(3), "analyst").unwrap();

        assert!(response.success);
        assert_eq!(response.metadata.generated_by, "analyst");
        let data = &response.data;
        assert_eq!(data.historical_data_points, 12);
        let values: Vec<f64> = data.periods.iter().map(|p| p.value).collect();
        for (value, expected) in values.iter().zip([220.0, 230.0, 240.0]) {
            assert!((value - expected).abs() < 1e-6, "{} != {}", value, expected);
        }
        assert_eq!(data.periods[0].period, "2024-01");
        assert!(data.scenarios.is_none());
        assert!(data.insights.is_none());
        assert!(data.periods[0].confidence_interval.is_none());
        assert!(data.confidence >= 0.8);
        assert!(data.seasonal_patterns.is_empty());
    }

    #[test]
    fn test_one_year_of_history_applies_monthly_factors() {
        let engine = ForecastEngine::new(ledger(&ramp()));
        let data = engine.generate(&ramp_request(1), "u").unwrap().data;

        assert_eq!(data.seasonal_patterns.len(), 12);
        let january = data.seasonal_patterns[0].factor;
        assert!((data.periods[0].value - 220.0 * january).abs() < 1e-6);
    }

    #[test]
    fn test_options_enable_intervals_scenarios_and_insights() {
        let engine = ForecastEngine::new(ledger(&ramp()));
        let mut request = ramp_request(4);
        request.options = Some(ForecastOptions {
            include_confidence_intervals: true,
            confidence_level: Some(0.9),
            include_scenarios: true,
            generate_insights: true,
            save_to_database: false,
        });

        let data = engine.generate(&request, "u").unwrap().data;
        assert!(data.periods.iter().all(|p| p.confidence_interval.is_some()));

        let scenarios = data.scenarios.unwrap();
        assert_eq!(scenarios.optimistic[0].value, data.periods[0].value * 1.2);
        assert_eq!(scenarios.most_likely, data.periods);

        let insights = data.insights.unwrap();
        assert!(insights
            .iter()
            .any(|i| i.insight_type == InsightType::Trend));
    }

    #[test]
    fn test_validation_errors_are_returned() {
        let engine = ForecastEngine::new(ledger(&ramp()));
        let err = engine.generate(&ramp_request(0), "u").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_empty_history_is_a_data_source_error() {
        let engine = ForecastEngine::new(ledger(&ramp()));
        let mut request = ramp_request(3);
        request.filters = Some(ForecastFilters {
            departments: vec!["Legal".to_string()],
            ..Default::default()
        });
        let err = engine.generate(&request, "u").unwrap_err();
        assert!(matches!(err, AnalyticsError::DataSource(_)));
    }

    #[test]
    fn test_short_history_warns_about_seasonality() {
        let engine = ForecastEngine::new(ledger(&[100.0, 120.0, 110.0, 130.0, 125.0]));
        let mut request = ramp_request(2);
        request.algorithm = ForecastAlgorithm::SeasonalDecomposition;

        let data = engine.generate(&request, "u").unwrap().data;
        assert!(data.seasonal_patterns.is_empty());
        assert!(data
            .metadata
            .warnings
            .iter()
            .any(|w| w.starts_with("Seasonality not applied")));
    }

    #[test]
    fn test_save_to_store() {
        let store = Arc::new(InMemoryForecastStore::new());
        let engine = ForecastEngine::new(ledger(&ramp())).with_store(store.clone());
        let mut request = ramp_request(2);
        request.options = Some(ForecastOptions {
            save_to_database: true,
            ..Default::default()
        });

        engine.generate(&request, "planner").unwrap();
        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].user_id, "planner");
        assert_eq!(saved[0].result.periods.len(), 2);
    }

    #[test]
    fn test_save_without_store_warns() {
        let engine = ForecastEngine::new(ledger(&ramp()));
        let mut request = ramp_request(2);
        request.options = Some(ForecastOptions {
            save_to_database: true,
            ..Default::default()
        });
        let data = engine.generate(&request, "u").unwrap().data;
        assert!(data
            .metadata
            .warnings
            .iter()
            .any(|w| w.contains("no forecast store")));
    }

    #[test]
    fn test_cancelled_token_stops_pipeline() {
        let engine = ForecastEngine::new(ledger(&ramp()));
        let token = CancellationToken::new();
        token.cancel();

        let err = engine
            .generate_with(&ramp_request(3), "u", &token, &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Cancelled(ref stage) if stage == "validation"));
        assert_eq!(err.status_code(), 408);
    }

    #[test]
    fn test_default_history_window() {
        let engine = ForecastEngine::new(ledger(&ramp()));
        let mut request = ramp_request(1);
        request.start_date = None;
        request.end_date = Some("2024-12".to_string());

        let query = engine.history_query(&request).unwrap();
        assert_eq!(query.range.start, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(query.range.end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.outliers.threshold = -1.0;
        assert!(ForecastEngine::new(ledger(&ramp())).with_config(config).is_err());
    }
}
