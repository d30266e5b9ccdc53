use crate::confidence::is_supported_level;
use crate::error::{AnalyticsError, Result};
use crate::schema::{ForecastAlgorithm, ForecastRequest, ForecastType};
use crate::utils::parse_month;
use serde::{Deserialize, Serialize};

pub const MIN_PERIODS: u32 = 1;
pub const MAX_PERIODS: u32 = 24;

/// Outcome of checking a request: `errors` reject it, the rest travel with
/// the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl RequestValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Converts collected errors into a single `Validation` error.
    pub fn into_result(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(AnalyticsError::Validation {
                errors: self.errors,
            })
        }
    }
}

pub fn validate_request(request: &ForecastRequest) -> RequestValidation {
    let mut v = RequestValidation::default();

    if !(MIN_PERIODS..=MAX_PERIODS).contains(&request.periods) {
        v.errors.push(format!(
            "periods must be between {} and {}, got {}",
            MIN_PERIODS, MAX_PERIODS, request.periods
        ));
    }

    check_dates(request, &mut v.errors);

    if let Some(filters) = &request.filters {
        for field in filters.blank_fields() {
            v.errors
                .push(format!("filters.{} must not contain blank entries", field));
        }
    }

    check_algorithm_params(request, &mut v.errors);

    if let Some(scenario) = &request.scenario_params {
        if scenario.volatility.is_some_and(|vol| vol < 0.0) {
            v.errors
                .push("scenarioParams.volatility must not be negative".to_string());
        }
        if scenario
            .growth_rate
            .is_some_and(|g| !(-1.0..=1.0).contains(&g))
        {
            v.warnings
                .push("scenarioParams.growthRate outside -1..1 compounds aggressively".to_string());
        }
    }

    if let Some(level) = request.options.as_ref().and_then(|o| o.confidence_level) {
        if !is_supported_level(level) {
            v.warnings.push(format!(
                "confidenceLevel {} is not one of 0.8, 0.9, 0.95, 0.99; using 0.95",
                level
            ));
        }
    }

    if request.algorithm == ForecastAlgorithm::Arima {
        v.warnings
            .push("arima is served by linear regression".to_string());
    }

    if request.algorithm == ForecastAlgorithm::MovingAverage {
        if request.forecast_type == ForecastType::Revenue {
            v.suggestions.push(
                "For revenue forecasts consider linear_regression or exponential_smoothing"
                    .to_string(),
            );
        }
        if request.periods > 12 {
            v.suggestions.push(
                "For horizons beyond 12 months consider a trend-aware algorithm".to_string(),
            );
        }
    }

    v
}

fn check_dates(request: &ForecastRequest, errors: &mut Vec<String>) {
    let parse = |field: &str, value: &Option<String>, errors: &mut Vec<String>| {
        value.as_ref().and_then(|raw| match parse_month(raw) {
            Ok(date) => Some(date),
            Err(_) => {
                errors.push(format!(
                    "{} must be YYYY-MM or YYYY-MM-DD, got '{}'",
                    field, raw
                ));
                None
            }
        })
    };

    let start = parse("startDate", &request.start_date, errors);
    let end = parse("endDate", &request.end_date, errors);

    if let (Some(start), Some(end)) = (start, end) {
        if end <= start {
            errors.push("endDate must be after startDate".to_string());
        }
    }
}

fn check_algorithm_params(request: &ForecastRequest, errors: &mut Vec<String>) {
    let Some(params) = &request.algorithm_params else {
        return;
    };
    let unit = |name: &str, value: Option<f64>, errors: &mut Vec<String>| {
        if value.is_some_and(|x| !(0.0..=1.0).contains(&x)) {
            errors.push(format!("algorithmParams.{} must be between 0 and 1", name));
        }
    };

    match request.algorithm {
        ForecastAlgorithm::MovingAverage => {
            if params.window_size.is_some_and(|w| !(2..=12).contains(&w)) {
                errors.push("algorithmParams.windowSize must be between 2 and 12".to_string());
            }
        }
        ForecastAlgorithm::ExponentialSmoothing => {
            unit("alpha", params.alpha, errors);
            unit("beta", params.beta, errors);
            unit("gamma", params.gamma, errors);
        }
        ForecastAlgorithm::LinearRegression => {
            if params
                .polynomial_degree
                .is_some_and(|d| !(1..=3).contains(&d))
            {
                errors
                    .push("algorithmParams.polynomialDegree must be between 1 and 3".to_string());
            }
        }
        ForecastAlgorithm::Arima | ForecastAlgorithm::SeasonalDecomposition => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AlgorithmParams, ForecastFilters, ForecastOptions, ScenarioParams};

    fn request(algorithm: ForecastAlgorithm) -> ForecastRequest {
        ForecastRequest::new(ForecastType::Cost, algorithm, 6)
    }

    #[test]
    fn test_valid_request() {
        let v = validate_request(&request(ForecastAlgorithm::LinearRegression));
        assert!(v.is_valid());
        assert!(v.warnings.is_empty());
        assert!(v.suggestions.is_empty());
    }

    #[test]
    fn test_period_bounds() {
        let mut req = request(ForecastAlgorithm::LinearRegression);
        req.periods = 0;
        assert_eq!(validate_request(&req).errors.len(), 1);
        req.periods = 25;
        assert!(!validate_request(&req).is_valid());
        req.periods = 24;
        assert!(validate_request(&req).is_valid());
    }

    #[test]
    fn test_each_violation_is_reported() {
        let mut req = request(ForecastAlgorithm::ExponentialSmoothing);
        req.periods = 30;
        req.start_date = Some("2024-13".to_string());
        req.algorithm_params = Some(AlgorithmParams {
            alpha: Some(1.5),
            beta: Some(-0.1),
            ..Default::default()
        });

        let err = validate_request(&req).into_result().unwrap_err();
        match err {
            AnalyticsError::Validation { errors } => assert_eq!(errors.len(), 4),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_window_and_degree_ranges() {
        let mut ma = request(ForecastAlgorithm::MovingAverage);
        ma.algorithm_params = Some(AlgorithmParams {
            window_size: Some(1),
            ..Default::default()
        });
        assert!(!validate_request(&ma).is_valid());

        let mut lr = request(ForecastAlgorithm::LinearRegression);
        lr.algorithm_params = Some(AlgorithmParams {
            polynomial_degree: Some(4),
            ..Default::default()
        });
        assert!(!validate_request(&lr).is_valid());
    }

    #[test]
    fn test_date_ordering() {
        let mut req = request(ForecastAlgorithm::LinearRegression);
        req.start_date = Some("2024-06".to_string());
        req.end_date = Some("2024-01-15".to_string());
        assert_eq!(
            validate_request(&req).errors,
            vec!["endDate must be after startDate".to_string()]
        );
    }

    #[test]
    fn test_blank_filters_and_negative_volatility() {
        let mut req = request(ForecastAlgorithm::LinearRegression);
        req.filters = Some(ForecastFilters {
            departments: vec!["Sales".to_string(), " ".to_string()],
            ..Default::default()
        });
        req.scenario_params = Some(ScenarioParams {
            volatility: Some(-0.2),
            ..Default::default()
        });
        assert_eq!(validate_request(&req).errors.len(), 2);
    }

    #[test]
    fn test_warnings_and_suggestions() {
        let mut req = ForecastRequest::new(ForecastType::Revenue, ForecastAlgorithm::MovingAverage, 18);
        req.options = Some(ForecastOptions {
            confidence_level: Some(0.75),
            ..Default::default()
        });
        req.scenario_params = Some(ScenarioParams {
            growth_rate: Some(1.5),
            ..Default::default()
        });

        let v = validate_request(&req);
        assert!(v.is_valid());
        assert_eq!(v.warnings.len(), 2);
        assert_eq!(v.suggestions.len(), 2);

        let arima = validate_request(&request(ForecastAlgorithm::Arima));
        assert_eq!(arima.warnings.len(), 1);
    }
}
