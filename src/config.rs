use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::error::{AnalyticsError, Result};
use crate::outliers::DEFAULT_IQR_THRESHOLD;
use crate::seasonality::DEFAULT_MIN_PERIODS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeasonalityConfig {
    pub enabled: bool,
    pub min_periods: usize,
}

impl Default for SeasonalityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_periods: DEFAULT_MIN_PERIODS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutlierConfig {
    pub enabled: bool,
    /// IQR multiplier.
    pub threshold: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_IQR_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL.as_secs(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Reference ratios, all as fractions except `target_margin` (percent).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSet {
    pub margin: f64,
    pub revenue_growth: f64,
    pub cost_efficiency: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Benchmarks {
    pub industry: BenchmarkSet,
    pub company: BenchmarkSet,
    pub target_margin: f64,
}

impl Default for Benchmarks {
    fn default() -> Self {
        Self {
            industry: BenchmarkSet {
                margin: 0.15,
                revenue_growth: 0.08,
                cost_efficiency: 0.85,
            },
            company: BenchmarkSet {
                margin: 0.18,
                revenue_growth: 0.12,
                cost_efficiency: 0.88,
            },
            target_margin: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub confidence_level: f64,
    /// Months of history fetched when a request has no start date.
    pub default_history_months: u32,
    pub accuracy_threshold: f64,
    pub seasonality: SeasonalityConfig,
    pub outliers: OutlierConfig,
    pub cache: CacheConfig,
    pub benchmarks: Benchmarks,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            default_history_months: 24,
            accuracy_threshold: 0.85,
            seasonality: SeasonalityConfig::default(),
            outliers: OutlierConfig::default(),
            cache: CacheConfig::default(),
            benchmarks: Benchmarks::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.outliers.threshold > 0.0) {
            return Err(AnalyticsError::InvalidConfig(format!(
                "outliers.threshold must be positive, got {}",
                self.outliers.threshold
            )));
        }
        if self.seasonality.min_periods == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "seasonality.min_periods must be at least 1".to_string(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(AnalyticsError::InvalidConfig(format!(
                "confidence_level must be between 0 and 1, got {}",
                self.confidence_level
            )));
        }
        if self.cache.max_entries == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }
        if self.default_history_months == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "default_history_months must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_history_months, 24);
        assert_eq!(config.seasonality.min_periods, 12);
        assert_eq!(config.outliers.threshold, 1.5);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.benchmarks.target_margin, 20.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "accuracy_threshold": 0.7, "outliers": { "threshold": 3.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.accuracy_threshold, 0.7);
        assert_eq!(config.outliers.threshold, 3.0);
        assert!(config.outliers.enabled);
        assert_eq!(config.confidence_level, 0.95);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "outliers": { "threshold": 0 } }"#).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidConfig(_)));

        let err = EngineConfig::from_json_str(r#"{ "confidence_level": 1.5 }"#).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidConfig(_)));

        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, AnalyticsError::Serialization(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("engine-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "default_history_months": 6 }"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.default_history_months, 6);

        let missing = EngineConfig::load("/nonexistent/engine.json").unwrap_err();
        assert!(matches!(missing, AnalyticsError::Io(_)));
    }
}
