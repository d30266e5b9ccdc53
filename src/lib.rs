//! # Financial Forecast Engine
//!
//! A library for turning dated, signed accounting transactions into monthly
//! revenue/cost/margin metrics and multi-algorithm forecasts.
//!
//! ## Core Concepts
//!
//! - **Historical Points**: Transactions aggregated into one value per month (optionally per dimension)
//! - **Cleaning**: IQR outlier rejection runs once per request; everything downstream sees the cleaned series
//! - **Signals**: Per-month seasonal factors and an OLS trend over the cleaned series
//! - **Forecasts**: Linear regression, moving average, Holt smoothing, seasonal decomposition (and `arima`, served by linear regression)
//! - **Enrichment**: Confidence intervals, fixed-multiplier scenarios, rule-based insights and a holdout backtest
//! - **Metrics**: Revenue, cost and margin breakdowns with growth rates, read through a TTL cache
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_forecast_engine::*;
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! let ledger = InMemoryLedger::from_transactions(vec![
//!     Transaction::new(NaiveDate::from_ymd_opt(2023, 1, 5).unwrap(), 1000.0, Nature::Revenue),
//!     Transaction::new(NaiveDate::from_ymd_opt(2023, 2, 5).unwrap(), 1100.0, Nature::Revenue),
//!     Transaction::new(NaiveDate::from_ymd_opt(2023, 3, 5).unwrap(), 1250.0, Nature::Revenue),
//! ]);
//!
//! let mut request = ForecastRequest::new(ForecastType::Revenue, ForecastAlgorithm::LinearRegression, 3);
//! request.start_date = Some("2023-01".to_string());
//! request.end_date = Some("2023-03".to_string());
//!
//! let response = generate_forecast(Arc::new(ledger), &request, "analyst").unwrap();
//! ```

pub mod accuracy;
pub mod aggregator;
pub mod cache;
pub mod cancellation;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod ingestion;
pub mod insights;
pub mod metrics;
pub mod outliers;
pub mod scenarios;
pub mod schema;
pub mod seasonality;
pub mod stats;
pub mod trend;
pub mod utils;
pub mod validation;

pub use accuracy::{AccuracyEvaluator, AccuracyMetrics};
pub use aggregator::{
    DateRange, Dimension, HistoricalDataAggregator, HistoricalDataSource, HistoricalPoint,
    HistoricalQuery, InMemoryLedger, PointDimensions,
};
pub use cache::{cache_key, CacheStats, TtlCache};
pub use cancellation::CancellationToken;
pub use confidence::ConfidenceIntervalCalculator;
pub use config::{Benchmarks, CacheConfig, EngineConfig};
pub use engine::{
    ForecastEngine, ForecastMetadata, ForecastResponse, ForecastResult, ForecastStore,
    InMemoryForecastStore,
};
pub use error::{AnalyticsError, Result};
pub use forecast::{ConfidenceInterval, ForecastComponents, ForecastGenerator, ForecastPeriod};
pub use ingestion::*;
pub use insights::{ForecastInsight, Impact, InsightGenerator, InsightType};
pub use metrics::{
    CalculationContext, CostMetrics, FinancialMetrics, MarginMetrics, MetricsCalculator,
    MetricsService, ProjectSummary, QuickForecast, RevenueMetrics,
};
pub use outliers::OutlierFilter;
pub use scenarios::{ForecastScenarios, ScenarioGenerator};
pub use schema::*;
pub use seasonality::{SeasonalPattern, SeasonalityDetector};
pub use trend::{TrendAnalysis, TrendAnalyzer, TrendDirection};
pub use validation::{validate_request, RequestValidation};

use log::info;
use std::sync::Arc;

pub struct FinancialAnalytics;

impl FinancialAnalytics {
    pub fn forecast(
        source: Arc<dyn HistoricalDataSource>,
        request: &ForecastRequest,
        user_id: &str,
    ) -> Result<ForecastResponse> {
        ForecastEngine::new(source).generate(request, user_id)
    }

    pub fn forecast_with_config(
        source: Arc<dyn HistoricalDataSource>,
        config: EngineConfig,
        request: &ForecastRequest,
        user_id: &str,
    ) -> Result<ForecastResponse> {
        ForecastEngine::new(source)
            .with_config(config)?
            .generate(request, user_id)
    }

    pub fn metrics(
        source: &dyn HistoricalDataSource,
        request: &MetricsRequest,
    ) -> Result<FinancialMetrics> {
        info!(
            "Calculating {:?} for project {}",
            request.metrics, request.project_id
        );
        let metrics = MetricsService::new(source).calculate(request, None)?;
        Ok(Arc::unwrap_or_clone(metrics))
    }
}

pub fn generate_forecast(
    source: Arc<dyn HistoricalDataSource>,
    request: &ForecastRequest,
    user_id: &str,
) -> Result<ForecastResponse> {
    FinancialAnalytics::forecast(source, request, user_id)
}

pub fn calculate_metrics(
    source: &dyn HistoricalDataSource,
    request: &MetricsRequest,
) -> Result<FinancialMetrics> {
    FinancialAnalytics::metrics(source, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ledger() -> InMemoryLedger {
        let month = |m: u32| NaiveDate::from_ymd_opt(2023, m, 5).unwrap();
        InMemoryLedger::from_transactions(vec![
            Transaction::new(month(1), 1000.0, Nature::Revenue).with_project("P1"),
            Transaction::new(month(1), -600.0, Nature::Cost)
                .with_project("P1")
                .with_summary("SALÁRIOS CLT"),
            Transaction::new(month(2), 1200.0, Nature::Revenue).with_project("P1"),
            Transaction::new(month(2), -700.0, Nature::Cost).with_project("P1"),
            Transaction::new(month(3), 1300.0, Nature::Revenue).with_project("P1"),
            Transaction::new(month(3), 999.0, Nature::Revenue).with_project("P2"),
        ])
    }

    #[test]
    fn test_end_to_end_forecast() {
        let mut request =
            ForecastRequest::new(ForecastType::Revenue, ForecastAlgorithm::MovingAverage, 2);
        request.start_date = Some("2023-01".to_string());
        request.end_date = Some("2023-03".to_string());

        let response = generate_forecast(Arc::new(ledger()), &request, "analyst").unwrap();
        assert_eq!(response.data.periods.len(), 2);
        // Revenue across both projects: 1000, 1200, 2299.
        let expected = (1000.0 + 1200.0 + 2299.0) / 3.0;
        assert!((response.data.periods[0].value - expected).abs() < 1e-9);
        assert!(response
            .data
            .metadata
            .suggestions
            .iter()
            .any(|s| s.contains("revenue")));
    }

    #[test]
    fn test_end_to_end_metrics() {
        let request = MetricsRequest::from_json(
            r#"{
                "projectId": "P1",
                "startDate": "2023-01",
                "endDate": "2023-03",
                "metrics": ["revenue", "costs", "summary"]
            }"#,
        )
        .unwrap();

        let metrics = calculate_metrics(&ledger(), &request).unwrap();
        assert_eq!(metrics.revenue.unwrap().total, 3500.0);
        assert_eq!(metrics.costs.unwrap().clt_costs, 600.0);
        let summary = metrics.summary.unwrap();
        assert_eq!(summary.net_margin, 2200.0);
        assert!(metrics.margin.is_none());
    }
}
