use crate::aggregator::HistoricalPoint;
use crate::forecast::ForecastPeriod;
use crate::seasonality::SeasonalPattern;
use crate::stats::{mean, population_variance};
use crate::trend::{TrendAnalysis, TrendDirection};
use serde::{Deserialize, Serialize};

const TREND_STRENGTH_THRESHOLD: f64 = 0.5;
const HIGH_IMPACT_TREND_STRENGTH: f64 = 0.8;
const SEASONAL_DEVIATION_THRESHOLD: f64 = 0.2;
const VOLATILITY_THRESHOLD: f64 = 0.3;
const GROWTH_OPPORTUNITY_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Trend,
    Seasonality,
    Anomaly,
    Opportunity,
    Risk,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastInsight {
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    pub impact: Impact,
    pub confidence: f64,
    pub recommendation: String,
}

/// Fixed threshold rules over the computed forecast signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsightGenerator;

impl InsightGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(
        &self,
        periods: &[ForecastPeriod],
        history: &[HistoricalPoint],
        trend: &TrendAnalysis,
        patterns: &[SeasonalPattern],
    ) -> Vec<ForecastInsight> {
        [
            trend_insight(trend),
            seasonality_insight(patterns),
            volatility_insight(history),
            growth_insight(periods, history),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn trend_insight(trend: &TrendAnalysis) -> Option<ForecastInsight> {
    if trend.strength <= TREND_STRENGTH_THRESHOLD {
        return None;
    }

    let (title, movement, recommendation) = match trend.direction {
        TrendDirection::Increasing => (
            "Increasing trend detected",
            "growth",
            "Consider investing in additional capacity",
        ),
        TrendDirection::Decreasing => (
            "Decreasing trend detected",
            "decline",
            "Analyze the causes of the decline and take corrective action",
        ),
        TrendDirection::Stable => (
            "Stable trend detected",
            "stability",
            "Keep monitoring for changes in direction",
        ),
    };

    Some(ForecastInsight {
        insight_type: InsightType::Trend,
        title: title.to_string(),
        description: format!(
            "The data shows a trend of {} with a strength of {:.1}%",
            movement,
            trend.strength * 100.0
        ),
        impact: if trend.strength > HIGH_IMPACT_TREND_STRENGTH {
            Impact::High
        } else {
            Impact::Medium
        },
        confidence: trend.significance,
        recommendation: recommendation.to_string(),
    })
}

fn seasonality_insight(patterns: &[SeasonalPattern]) -> Option<ForecastInsight> {
    let peak = patterns
        .iter()
        .filter(|p| (p.factor - 1.0).abs() > SEASONAL_DEVIATION_THRESHOLD)
        .fold(None::<&SeasonalPattern>, |best, p| match best {
            Some(b) if b.factor >= p.factor => Some(b),
            _ => Some(p),
        })?;

    Some(ForecastInsight {
        insight_type: InsightType::Seasonality,
        title: "Seasonal pattern identified".to_string(),
        description: format!(
            "Month {} shows a seasonal peak with factor {:.2}",
            peak.month, peak.factor
        ),
        impact: Impact::Medium,
        confidence: peak.confidence,
        recommendation: "Plan resources and inventory around the seasonal cycle".to_string(),
    })
}

/// Coefficient of variation of the history, `None` when the mean is zero.
pub fn coefficient_of_variation(history: &[HistoricalPoint]) -> Option<f64> {
    let values: Vec<f64> = history.iter().map(|p| p.value).collect();
    let avg = mean(&values);
    if values.is_empty() || avg == 0.0 {
        return None;
    }
    Some(population_variance(&values).sqrt() / avg)
}

fn volatility_insight(history: &[HistoricalPoint]) -> Option<ForecastInsight> {
    let cv = coefficient_of_variation(history)?;
    if cv <= VOLATILITY_THRESHOLD {
        return None;
    }

    Some(ForecastInsight {
        insight_type: InsightType::Risk,
        title: "High volatility detected".to_string(),
        description: format!(
            "A coefficient of variation of {:.1}% indicates high volatility",
            cv * 100.0
        ),
        impact: Impact::High,
        confidence: 0.9,
        recommendation: "Consider risk mitigation strategies and contingency planning".to_string(),
    })
}

/// Relative change from the last observed value to the last forecast value.
pub fn forecast_growth(periods: &[ForecastPeriod], history: &[HistoricalPoint]) -> Option<f64> {
    let last_value = history.last()?.value;
    let last_forecast = periods.last()?.value;
    if last_value == 0.0 {
        return None;
    }
    Some((last_forecast - last_value) / last_value)
}

fn growth_insight(
    periods: &[ForecastPeriod],
    history: &[HistoricalPoint],
) -> Option<ForecastInsight> {
    let growth = forecast_growth(periods, history)?;
    if growth <= GROWTH_OPPORTUNITY_THRESHOLD {
        return None;
    }

    Some(ForecastInsight {
        insight_type: InsightType::Opportunity,
        title: "Growth opportunity".to_string(),
        description: format!(
            "The forecast indicates growth of {:.1}% over the period",
            growth * 100.0
        ),
        impact: Impact::High,
        confidence: 0.8,
        recommendation: "Prepare to capture the forecast growth".to_string(),
    })
}
