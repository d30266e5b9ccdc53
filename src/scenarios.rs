use crate::forecast::{ConfidenceInterval, ForecastPeriod};
use serde::{Deserialize, Serialize};

pub const OPTIMISTIC_MULTIPLIER: f64 = 1.2;
pub const PESSIMISTIC_MULTIPLIER: f64 = 0.8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForecastScenarios {
    pub optimistic: Vec<ForecastPeriod>,
    pub pessimistic: Vec<ForecastPeriod>,
    pub most_likely: Vec<ForecastPeriod>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioGenerator;

impl ScenarioGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, base: &[ForecastPeriod]) -> ForecastScenarios {
        ForecastScenarios {
            optimistic: scale(base, OPTIMISTIC_MULTIPLIER),
            pessimistic: scale(base, PESSIMISTIC_MULTIPLIER),
            most_likely: base.to_vec(),
        }
    }
}

fn scale(periods: &[ForecastPeriod], multiplier: f64) -> Vec<ForecastPeriod> {
    periods
        .iter()
        .map(|p| ForecastPeriod {
            value: p.value * multiplier,
            confidence_interval: p.confidence_interval.map(|ci| ConfidenceInterval {
                lower: ci.lower * multiplier,
                upper: ci.upper * multiplier,
            }),
            ..p.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn base() -> Vec<ForecastPeriod> {
        [(1, 100.0), (2, 250.5), (3, 0.0)]
            .into_iter()
            .map(|(month, value)| ForecastPeriod {
                period: format!("2024-{:02}", month),
                date: NaiveDate::from_ymd_opt(2024, month, 1).unwrap(),
                value,
                confidence_interval: (month == 1).then_some(ConfidenceInterval {
                    lower: 80.0,
                    upper: 120.0,
                }),
                components: None,
            })
            .collect()
    }

    #[test]
    fn test_fixed_multipliers() {
        let base = base();
        let scenarios = ScenarioGenerator::new().generate(&base);

        for i in 0..base.len() {
            assert_eq!(scenarios.optimistic[i].value, base[i].value * 1.2);
            assert_eq!(scenarios.pessimistic[i].value, base[i].value * 0.8);
            assert_eq!(scenarios.optimistic[i].period, base[i].period);
        }
        assert_eq!(scenarios.most_likely, base);
    }

    #[test]
    fn test_intervals_scale_proportionally() {
        let scenarios = ScenarioGenerator::new().generate(&base());

        let optimistic = scenarios.optimistic[0].confidence_interval.unwrap();
        assert_eq!(optimistic.lower, 80.0 * 1.2);
        assert_eq!(optimistic.upper, 120.0 * 1.2);

        let pessimistic = scenarios.pessimistic[0].confidence_interval.unwrap();
        assert_eq!(pessimistic.lower, 80.0 * 0.8);
        assert!(scenarios.pessimistic[1].confidence_interval.is_none());
    }
}
