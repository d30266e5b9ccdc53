//! Revenue, cost and margin metrics over a project's ledger.
//!
//! [`MetricsCalculator`] is a pure computation over a [`CalculationContext`];
//! [`MetricsService`] builds that context from a [`HistoricalDataSource`] and
//! reads results through an optional [`TtlCache`].

use crate::aggregator::{DateRange, HistoricalDataSource, HistoricalQuery};
use crate::cache::{cache_key, TtlCache};
use crate::config::{Benchmarks, EngineConfig};
use crate::error::{AnalyticsError, Result};
use crate::ingestion::{Nature, SourceRecord, Transaction};
use crate::schema::{MetricKind, MetricsFilters, MetricsRequest};
use crate::utils::{parse_month, period_key};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Account summary of the payroll tax relief line, tracked apart from revenue.
pub const TAX_RELIEF_SUMMARY: &str = "DESONERAÇÃO DA FOLHA";
/// Bucket for lines without an account summary.
pub const UNCLASSIFIED_SUMMARY: &str = "OUTROS";

const MARGIN_TREND_WINDOW: usize = 3;
const STABLE_MARGIN_CHANGE: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculationContext {
    pub project_id: String,
    pub period: DateRange,
    pub filters: Option<MetricsFilters>,
    pub transactions: Vec<Transaction>,
    pub benchmarks: Benchmarks,
}

impl CalculationContext {
    pub fn new(project_id: impl Into<String>, period: DateRange, transactions: Vec<Transaction>) -> Self {
        Self {
            project_id: project_id.into(),
            period,
            filters: None,
            transactions,
            benchmarks: Benchmarks::default(),
        }
    }

    pub fn with_filters(mut self, filters: Option<MetricsFilters>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_benchmarks(mut self, benchmarks: Benchmarks) -> Self {
        self.benchmarks = benchmarks;
        self
    }

    /// Transactions of `nature` that pass the request filters.
    fn lines(&self, nature: Nature) -> impl Iterator<Item = &Transaction> + '_ {
        self.transactions
            .iter()
            .filter(move |tx| tx.nature == nature)
            .filter(move |tx| self.passes_filters(tx))
    }

    fn passes_filters(&self, tx: &Transaction) -> bool {
        let Some(filters) = &self.filters else {
            return true;
        };
        let amount = tx.amount.abs();

        (filters.account_summary.is_empty()
            || tx
                .account_summary
                .as_ref()
                .is_some_and(|s| filters.account_summary.contains(s)))
            && (filters.nature.is_empty() || filters.nature.contains(&tx.nature))
            && filters.min_amount.map_or(true, |min| amount >= min)
            && filters.max_amount.map_or(true, |max| amount <= max)
    }
}

fn summary_of(tx: &Transaction) -> &str {
    tx.account_summary.as_deref().unwrap_or(UNCLASSIFIED_SUMMARY)
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    /// "YYYY-MM"
    pub month: String,
    pub total: f64,
    pub tax_relief: f64,
    pub net_revenue: f64,
    pub breakdown: BTreeMap<String, f64>,
    /// Percent change over the previous observed month.
    pub growth: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrowthRates {
    pub month_over_month: f64,
    pub year_over_year: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevenueMetrics {
    pub total: f64,
    pub tax_relief: f64,
    pub net_revenue: f64,
    pub monthly_breakdown: Vec<MonthlyRevenue>,
    pub average_monthly: f64,
    pub growth: GrowthRates,
    pub by_account_summary: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostCategory {
    Clt,
    Subcontractor,
    Other,
}

impl CostCategory {
    /// Case-insensitive keyword match on the account summary.
    pub fn classify(summary: &str) -> Self {
        let upper = summary.to_uppercase();
        if upper.contains("CLT") || upper.contains("SALÁRIO") {
            Self::Clt
        } else if upper.contains("TERCEIRO") || upper.contains("SUBCONTRAT") {
            Self::Subcontractor
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCost {
    pub month: String,
    pub total: f64,
    pub clt_costs: f64,
    pub subcontractor_costs: f64,
    pub other_costs: f64,
    pub breakdown: BTreeMap<String, f64>,
    /// CLT share of the month's costs, in percent.
    pub efficiency: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CostTypeBreakdown {
    pub personnel: f64,
    pub operational: f64,
    pub administrative: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostMetrics {
    pub total: f64,
    pub clt_costs: f64,
    pub subcontractor_costs: f64,
    pub other_costs: f64,
    pub monthly_breakdown: Vec<MonthlyCost>,
    pub average_monthly: f64,
    pub by_account_summary: BTreeMap<String, f64>,
    pub by_type: CostTypeBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyMargin {
    pub month: String,
    pub revenue: f64,
    pub costs: f64,
    pub gross: f64,
    pub net: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarginDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MarginTrend {
    pub direction: MarginDirection,
    /// Absolute change in points; signed while the trend is stable.
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MarginBenchmarks {
    pub industry: f64,
    pub company: f64,
    pub target: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarginMetrics {
    pub gross: f64,
    pub net: f64,
    pub percentage: f64,
    pub monthly_breakdown: Vec<MonthlyMargin>,
    pub trend: MarginTrend,
    pub benchmarks: MarginBenchmarks,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PredictionRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LinePrediction {
    pub predicted: f64,
    pub confidence: f64,
    pub range: PredictionRange,
}

impl LinePrediction {
    fn scaled(&self, factor: f64) -> Self {
        Self {
            predicted: self.predicted * factor,
            confidence: self.confidence,
            range: PredictionRange {
                min: self.range.min * factor,
                max: self.range.max * factor,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MarginPrediction {
    pub predicted: f64,
    pub percentage: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PredictionFactors {
    pub seasonal: f64,
    pub trend: f64,
    pub external: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PeriodPrediction {
    pub revenue: LinePrediction,
    pub costs: LinePrediction,
    pub margin: MarginPrediction,
    pub factors: PredictionFactors,
}

impl PeriodPrediction {
    fn new(revenue: LinePrediction, costs: LinePrediction, factors: PredictionFactors) -> Self {
        let margin = revenue.predicted - costs.predicted;
        Self {
            revenue,
            costs,
            margin: MarginPrediction {
                predicted: margin,
                percentage: percent_of(margin, revenue.predicted),
                confidence: 0.7,
            },
            factors,
        }
    }

    fn scaled(&self, months: f64) -> Self {
        Self::new(
            self.revenue.scaled(months),
            self.costs.scaled(months),
            self.factors,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastMethodology {
    pub algorithm: String,
    pub confidence: f64,
    pub factors: Vec<String>,
}

/// Growth-adjusted run-rate projection derived from the revenue and cost
/// metrics, independent of the full forecast pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuickForecast {
    pub next_month: PeriodPrediction,
    pub next_quarter: PeriodPrediction,
    pub next_year: PeriodPrediction,
    pub methodology: ForecastMethodology,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub project_id: String,
    pub total_revenue: f64,
    pub total_costs: f64,
    pub net_margin: f64,
    pub margin_percentage: f64,
    pub period: DateRange,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinancialMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<RevenueMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub costs: Option<CostMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<MarginMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<QuickForecast>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ProjectSummary>,
}

pub struct MetricsCalculator<'a> {
    context: &'a CalculationContext,
}

impl<'a> MetricsCalculator<'a> {
    pub fn new(context: &'a CalculationContext) -> Self {
        Self { context }
    }

    /// Computes each requested metric once, in request order.
    pub fn calculate(&self, metrics: &[MetricKind]) -> FinancialMetrics {
        let mut result = FinancialMetrics::default();
        for metric in metrics {
            match metric {
                MetricKind::Revenue => result.revenue = Some(self.revenue()),
                MetricKind::Costs => result.costs = Some(self.costs()),
                MetricKind::Margin => result.margin = Some(self.margin()),
                MetricKind::Forecast => result.forecast = Some(self.quick_forecast()),
                MetricKind::Summary => result.summary = Some(self.summary()),
            }
        }
        result
    }

    pub fn revenue(&self) -> RevenueMetrics {
        let mut months: BTreeMap<String, MonthlyRevenue> = BTreeMap::new();
        let mut by_account_summary: BTreeMap<String, f64> = BTreeMap::new();
        let mut total = 0.0;
        let mut tax_relief = 0.0;

        for tx in self.context.lines(Nature::Revenue) {
            let amount = tx.amount.abs();
            let summary = summary_of(tx);
            let is_relief = summary == TAX_RELIEF_SUMMARY;

            total += amount;
            if is_relief {
                tax_relief += amount;
            }
            *by_account_summary.entry(summary.to_string()).or_insert(0.0) += amount;

            let key = period_key(tx.date);
            let month = months.entry(key.clone()).or_insert_with(|| MonthlyRevenue {
                month: key,
                ..Default::default()
            });
            month.total += amount;
            *month.breakdown.entry(summary.to_string()).or_insert(0.0) += amount;
            if is_relief {
                month.tax_relief += amount;
            }
            month.net_revenue = month.total - month.tax_relief;
        }

        let mut monthly_breakdown: Vec<MonthlyRevenue> = months.into_values().collect();
        for i in 1..monthly_breakdown.len() {
            let previous = monthly_breakdown[i - 1].total;
            if previous > 0.0 {
                let current = &mut monthly_breakdown[i];
                current.growth = (current.total - previous) / previous * 100.0;
            }
        }

        let month_over_month = match monthly_breakdown.as_slice() {
            [.., _, last] => last.growth,
            _ => 0.0,
        };
        let year_over_year = year_over_year_growth(&monthly_breakdown);

        RevenueMetrics {
            total,
            tax_relief,
            net_revenue: total - tax_relief,
            average_monthly: total / monthly_breakdown.len().max(1) as f64,
            monthly_breakdown,
            growth: GrowthRates {
                month_over_month,
                year_over_year,
            },
            by_account_summary,
        }
    }

    pub fn costs(&self) -> CostMetrics {
        let mut months: BTreeMap<String, MonthlyCost> = BTreeMap::new();
        let mut by_account_summary: BTreeMap<String, f64> = BTreeMap::new();
        let mut by_type = CostTypeBreakdown::default();
        let (mut total, mut clt, mut subcontractor, mut other) = (0.0, 0.0, 0.0, 0.0);

        for tx in self.context.lines(Nature::Cost) {
            let amount = tx.amount.abs();
            let summary = summary_of(tx);
            let category = CostCategory::classify(summary);

            total += amount;
            *by_account_summary.entry(summary.to_string()).or_insert(0.0) += amount;

            let key = period_key(tx.date);
            let month = months.entry(key.clone()).or_insert_with(|| MonthlyCost {
                month: key,
                ..Default::default()
            });
            month.total += amount;
            *month.breakdown.entry(summary.to_string()).or_insert(0.0) += amount;

            match category {
                CostCategory::Clt => {
                    clt += amount;
                    by_type.personnel += amount;
                    month.clt_costs += amount;
                }
                CostCategory::Subcontractor => {
                    subcontractor += amount;
                    by_type.operational += amount;
                    month.subcontractor_costs += amount;
                }
                CostCategory::Other => {
                    other += amount;
                    by_type.administrative += amount;
                    month.other_costs += amount;
                }
            }
        }

        let monthly_breakdown: Vec<MonthlyCost> = months
            .into_values()
            .map(|mut m| {
                m.efficiency = percent_of(m.clt_costs, m.total);
                m
            })
            .collect();

        CostMetrics {
            total,
            clt_costs: clt,
            subcontractor_costs: subcontractor,
            other_costs: other,
            average_monthly: total / monthly_breakdown.len().max(1) as f64,
            monthly_breakdown,
            by_account_summary,
            by_type,
        }
    }

    pub fn margin(&self) -> MarginMetrics {
        let revenue = self.revenue();
        let costs = self.costs();

        let revenue_by_month: BTreeMap<&str, &MonthlyRevenue> = revenue
            .monthly_breakdown
            .iter()
            .map(|m| (m.month.as_str(), m))
            .collect();
        let costs_by_month: BTreeMap<&str, f64> = costs
            .monthly_breakdown
            .iter()
            .map(|m| (m.month.as_str(), m.total))
            .collect();

        let mut all_months: Vec<&str> = revenue_by_month
            .keys()
            .chain(costs_by_month.keys())
            .copied()
            .collect();
        all_months.sort_unstable();
        all_months.dedup();

        let monthly_breakdown: Vec<MonthlyMargin> = all_months
            .into_iter()
            .map(|month| {
                let (month_revenue, month_net_revenue) = revenue_by_month
                    .get(month)
                    .map_or((0.0, 0.0), |r| (r.total, r.net_revenue));
                let month_costs = costs_by_month.get(month).copied().unwrap_or(0.0);
                let gross = month_revenue - month_costs;
                MonthlyMargin {
                    month: month.to_string(),
                    revenue: month_revenue,
                    costs: month_costs,
                    gross,
                    net: month_net_revenue - month_costs,
                    percentage: percent_of(gross, month_revenue),
                }
            })
            .collect();

        let gross = revenue.total - costs.total;
        let benchmarks = &self.context.benchmarks;

        MarginMetrics {
            gross,
            net: revenue.net_revenue - costs.total,
            percentage: percent_of(gross, revenue.total),
            trend: margin_trend(&monthly_breakdown),
            monthly_breakdown,
            benchmarks: MarginBenchmarks {
                industry: benchmarks.industry.margin * 100.0,
                company: benchmarks.company.margin * 100.0,
                target: benchmarks.target_margin,
            },
        }
    }

    pub fn quick_forecast(&self) -> QuickForecast {
        let revenue = self.revenue();
        let costs = self.costs();
        let growth_rate = revenue.growth.month_over_month / 100.0;

        let next_month = PeriodPrediction::new(
            LinePrediction {
                predicted: revenue.average_monthly * (1.0 + growth_rate),
                confidence: 0.75,
                range: PredictionRange {
                    min: revenue.average_monthly * 0.9,
                    max: revenue.average_monthly * 1.2,
                },
            },
            LinePrediction {
                predicted: costs.average_monthly * (1.0 + growth_rate * 0.8),
                confidence: 0.8,
                range: PredictionRange {
                    min: costs.average_monthly * 0.95,
                    max: costs.average_monthly * 1.1,
                },
            },
            PredictionFactors {
                seasonal: 0.1,
                trend: growth_rate,
                external: 0.05,
            },
        );

        QuickForecast {
            next_quarter: next_month.scaled(3.0),
            next_year: next_month.scaled(12.0),
            next_month,
            methodology: ForecastMethodology {
                algorithm: "linear_trend".to_string(),
                confidence: 0.75,
                factors: vec![
                    "historical_trend".to_string(),
                    "seasonal_adjustment".to_string(),
                    "growth_rate".to_string(),
                ],
            },
        }
    }

    pub fn summary(&self) -> ProjectSummary {
        let total_revenue = self.revenue().total;
        let total_costs = self.costs().total;
        let net_margin = total_revenue - total_costs;

        ProjectSummary {
            project_id: self.context.project_id.clone(),
            total_revenue,
            total_costs,
            net_margin,
            margin_percentage: percent_of(net_margin, total_revenue),
            period: self.context.period,
        }
    }
}

/// Trailing 12 months against the 12 before them; 0 with fewer than 12
/// monthly buckets or an empty prior year.
pub fn year_over_year_growth(months: &[MonthlyRevenue]) -> f64 {
    if months.len() < 12 {
        return 0.0;
    }
    let split = months.len() - 12;
    let current: f64 = months[split..].iter().map(|m| m.total).sum();
    let previous: f64 = months[split.saturating_sub(12)..split]
        .iter()
        .map(|m| m.total)
        .sum();
    percent_of(current - previous, previous)
}

/// Average margin of the last three months against the three before them.
pub fn margin_trend(months: &[MonthlyMargin]) -> MarginTrend {
    let stable = MarginTrend {
        direction: MarginDirection::Stable,
        percentage: 0.0,
    };
    if months.len() < 2 {
        return stable;
    }

    let recent_start = months.len().saturating_sub(MARGIN_TREND_WINDOW);
    let older_start = recent_start.saturating_sub(MARGIN_TREND_WINDOW);
    let recent = &months[recent_start..];
    let older = &months[older_start..recent_start];
    if older.is_empty() {
        return stable;
    }

    let average = |ms: &[MonthlyMargin]| ms.iter().map(|m| m.percentage).sum::<f64>() / ms.len() as f64;
    let change = average(recent) - average(older);

    if change.abs() < STABLE_MARGIN_CHANGE {
        MarginTrend {
            direction: MarginDirection::Stable,
            percentage: change,
        }
    } else {
        MarginTrend {
            direction: if change > 0.0 {
                MarginDirection::Up
            } else {
                MarginDirection::Down
            },
            percentage: change.abs(),
        }
    }
}

/// Checks a metrics request, collecting one message per violated rule.
pub fn validate_metrics_request(request: &MetricsRequest) -> Result<DateRange> {
    let mut errors = Vec::new();

    if request.project_id.trim().is_empty() {
        errors.push("projectId is required".to_string());
    }
    if request.metrics.is_empty() {
        errors.push("metrics must name at least one metric".to_string());
    }

    let start = parse_month(&request.start_date)
        .map_err(|e| errors.push(format!("startDate: {}", e)))
        .ok();
    let end = parse_month(&request.end_date)
        .map_err(|e| errors.push(format!("endDate: {}", e)))
        .ok();

    if let Some(filters) = &request.filters {
        if let (Some(min), Some(max)) = (filters.min_amount, filters.max_amount) {
            if min > max {
                errors.push("filters.minAmount must not exceed filters.maxAmount".to_string());
            }
        }
    }

    let range = match (start, end) {
        (Some(start), Some(end)) => match DateRange::from_months(start, end) {
            Ok(range) => Some(range),
            Err(_) => {
                errors.push("endDate must not be before startDate".to_string());
                None
            }
        },
        _ => None,
    };

    match range {
        Some(range) if errors.is_empty() => Ok(range),
        _ => Err(AnalyticsError::Validation { errors }),
    }
}

/// Builds calculation contexts from a data source and serves metric requests.
pub struct MetricsService<'a> {
    source: &'a dyn HistoricalDataSource,
    benchmarks: Benchmarks,
}

impl<'a> MetricsService<'a> {
    pub fn new(source: &'a dyn HistoricalDataSource) -> Self {
        Self {
            source,
            benchmarks: Benchmarks::default(),
        }
    }

    pub fn with_benchmarks(mut self, benchmarks: Benchmarks) -> Self {
        self.benchmarks = benchmarks;
        self
    }

    /// Service using the configured benchmarks.
    pub fn from_config(source: &'a dyn HistoricalDataSource, config: &EngineConfig) -> Self {
        Self::new(source).with_benchmarks(config.benchmarks)
    }

    /// Ledger lines plus processed DRE lines for the requested project and
    /// period.
    pub fn build_context(&self, request: &MetricsRequest) -> Result<CalculationContext> {
        let range = validate_metrics_request(request)?;
        let query = HistoricalQuery::new(range).with_project(request.project_id.clone());

        let mut transactions = self.source.fetch_transactions(&query)?;
        let dre_lines = self.source.fetch_dre_records(&query)?;
        let dre_count = dre_lines.len();
        for record in dre_lines {
            if let Some(tx) = SourceRecord::Dre(record).to_transaction()? {
                transactions.push(tx);
            }
        }

        debug!(
            "Metrics context for {}: {} lines ({} DRE records)",
            request.project_id,
            transactions.len(),
            dre_count
        );

        Ok(CalculationContext::new(request.project_id.clone(), range, transactions)
            .with_filters(request.filters.clone())
            .with_benchmarks(self.benchmarks))
    }

    pub fn calculate(
        &self,
        request: &MetricsRequest,
        cache: Option<&TtlCache<FinancialMetrics>>,
    ) -> Result<Arc<FinancialMetrics>> {
        let key = cache_key("metrics", request);

        if let Some(cached) = cache.and_then(|c| c.get(&key)) {
            debug!("Metrics cache hit for {}", key);
            return Ok(cached);
        }

        let context = self.build_context(request)?;
        let metrics = MetricsCalculator::new(&context).calculate(&request.metrics);

        info!(
            "Calculated {} metrics for project {} over {} transactions",
            request.metrics.len(),
            request.project_id,
            context.transactions.len()
        );

        Ok(match cache {
            Some(cache) => cache.insert(key, metrics),
            None => Arc::new(metrics),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::InMemoryLedger;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 10).unwrap()
    }

    fn range() -> DateRange {
        DateRange::from_months(date(2023, 1), date(2023, 12)).unwrap()
    }

    fn revenue(y: i32, m: u32, amount: f64, summary: &str) -> Transaction {
        Transaction::new(date(y, m), amount, Nature::Revenue).with_summary(summary)
    }

    fn cost(y: i32, m: u32, amount: f64, summary: &str) -> Transaction {
        Transaction::new(date(y, m), amount, Nature::Cost).with_summary(summary)
    }

    fn context(transactions: Vec<Transaction>) -> CalculationContext {
        CalculationContext::new("P1", range(), transactions)
    }

    #[test]
    fn test_revenue_totals_and_tax_relief() {
        let ctx = context(vec![
            revenue(2023, 1, 1000.0, "SERVIÇOS"),
            revenue(2023, 1, -200.0, TAX_RELIEF_SUMMARY),
            revenue(2023, 2, 1500.0, "SERVIÇOS"),
            cost(2023, 2, -400.0, "SALÁRIOS CLT"),
        ]);
        let rev = MetricsCalculator::new(&ctx).revenue();

        assert_eq!(rev.total, 2700.0);
        assert_eq!(rev.tax_relief, 200.0);
        assert_eq!(rev.net_revenue, 2500.0);
        assert_eq!(rev.average_monthly, 1350.0);
        assert_eq!(rev.monthly_breakdown[0].net_revenue, 1000.0);
        assert!((rev.monthly_breakdown[1].growth - 25.0).abs() < 1e-9);
        assert!((rev.growth.month_over_month - 25.0).abs() < 1e-9);
        assert_eq!(rev.growth.year_over_year, 0.0);
        assert_eq!(rev.by_account_summary["SERVIÇOS"], 2500.0);
    }

    #[test]
    fn test_year_over_year_needs_twelve_months() {
        let mut txs = Vec::new();
        for m in 1..=12 {
            txs.push(revenue(2022, m, 100.0, "A"));
            txs.push(revenue(2023, m, 150.0, "A"));
        }
        let ctx = CalculationContext::new(
            "P1",
            DateRange::from_months(date(2022, 1), date(2023, 12)).unwrap(),
            txs,
        );
        let rev = MetricsCalculator::new(&ctx).revenue();
        assert!((rev.growth.year_over_year - 50.0).abs() < 1e-9);

        let short: Vec<MonthlyRevenue> = rev.monthly_breakdown[..11].to_vec();
        assert_eq!(year_over_year_growth(&short), 0.0);

        // Exactly twelve buckets: no prior year to compare with.
        let year: Vec<MonthlyRevenue> = rev.monthly_breakdown[12..].to_vec();
        assert_eq!(year_over_year_growth(&year), 0.0);
    }

    #[test]
    fn test_cost_classification() {
        assert_eq!(CostCategory::classify("Salário e encargos"), CostCategory::Clt);
        assert_eq!(CostCategory::classify("folha clt"), CostCategory::Clt);
        assert_eq!(CostCategory::classify("Serviços de Terceiros"), CostCategory::Subcontractor);
        assert_eq!(CostCategory::classify("SUBCONTRATAÇÃO"), CostCategory::Subcontractor);
        assert_eq!(CostCategory::classify("ALUGUEL"), CostCategory::Other);

        let ctx = context(vec![
            cost(2023, 3, -600.0, "SALÁRIOS CLT"),
            cost(2023, 3, -300.0, "TERCEIROS"),
            cost(2023, 3, -100.0, "ALUGUEL"),
            Transaction::new(date(2023, 3), -50.0, Nature::Cost),
        ]);
        let costs = MetricsCalculator::new(&ctx).costs();

        assert_eq!(costs.total, 1050.0);
        assert_eq!(costs.clt_costs, 600.0);
        assert_eq!(costs.subcontractor_costs, 300.0);
        assert_eq!(costs.other_costs, 150.0);
        assert_eq!(costs.by_type.personnel, 600.0);
        assert_eq!(costs.by_account_summary[UNCLASSIFIED_SUMMARY], 50.0);
        let march = &costs.monthly_breakdown[0];
        assert_eq!(march.month, "2023-03");
        assert!((march.efficiency - 600.0 / 1050.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_margin_basics() {
        let ctx = context(vec![revenue(2023, 5, 1000.0, "A"), cost(2023, 5, -600.0, "B")]);
        let margin = MetricsCalculator::new(&ctx).margin();

        assert_eq!(margin.gross, 400.0);
        assert_eq!(margin.net, 400.0);
        assert_eq!(margin.percentage, 40.0);
        assert_eq!(margin.benchmarks.industry, 15.0);
        assert_eq!(margin.benchmarks.company, 18.0);
        assert_eq!(margin.benchmarks.target, 20.0);
        assert_eq!(margin.trend.direction, MarginDirection::Stable);
    }

    #[test]
    fn test_margin_zero_revenue_is_guarded() {
        let ctx = context(vec![cost(2023, 5, -600.0, "B")]);
        let margin = MetricsCalculator::new(&ctx).margin();
        assert_eq!(margin.gross, -600.0);
        assert_eq!(margin.percentage, 0.0);
        assert_eq!(margin.monthly_breakdown[0].percentage, 0.0);
        assert_eq!(margin.monthly_breakdown[0].revenue, 0.0);
    }

    #[test]
    fn test_margin_trend_windows() {
        let months = |pcts: &[f64]| -> Vec<MonthlyMargin> {
            pcts.iter()
                .enumerate()
                .map(|(i, &p)| MonthlyMargin {
                    month: format!("2023-{:02}", i + 1),
                    revenue: 100.0,
                    costs: 100.0 - p,
                    gross: p,
                    net: p,
                    percentage: p,
                })
                .collect()
        };

        let up = margin_trend(&months(&[10.0, 10.0, 10.0, 20.0, 20.0, 20.0]));
        assert_eq!(up.direction, MarginDirection::Up);
        assert!((up.percentage - 10.0).abs() < 1e-9);

        let down = margin_trend(&months(&[30.0, 30.0, 30.0, 26.0, 26.0, 26.0]));
        assert_eq!(down.direction, MarginDirection::Down);
        assert!((down.percentage - 4.0).abs() < 1e-9);

        let stable = margin_trend(&months(&[20.0, 20.0, 20.0, 19.5, 19.5, 19.5]));
        assert_eq!(stable.direction, MarginDirection::Stable);
        assert!((stable.percentage + 0.5).abs() < 1e-9);

        // Two months: the older window is empty.
        assert_eq!(margin_trend(&months(&[10.0, 50.0])).direction, MarginDirection::Stable);
    }

    #[test]
    fn test_margin_covers_union_of_months() {
        let ctx = context(vec![
            revenue(2023, 1, 1000.0, "A"),
            cost(2023, 2, -300.0, "B"),
            revenue(2023, 3, 500.0, "A"),
            cost(2023, 3, -100.0, "B"),
        ]);
        let margin = MetricsCalculator::new(&ctx).margin();
        let months: Vec<&str> = margin.monthly_breakdown.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2023-01", "2023-02", "2023-03"]);
        assert_eq!(margin.monthly_breakdown[1].gross, -300.0);
        assert_eq!(margin.monthly_breakdown[2].percentage, 80.0);
    }

    #[test]
    fn test_quick_forecast() {
        let ctx = context(vec![
            revenue(2023, 1, 1000.0, "A"),
            revenue(2023, 2, 1100.0, "A"),
            cost(2023, 1, -500.0, "B"),
            cost(2023, 2, -500.0, "B"),
        ]);
        let forecast = MetricsCalculator::new(&ctx).quick_forecast();
        let next = forecast.next_month;

        assert!((next.revenue.predicted - 1050.0 * 1.1).abs() < 1e-9);
        assert!((next.costs.predicted - 500.0 * 1.08).abs() < 1e-9);
        assert!((next.revenue.range.min - 945.0).abs() < 1e-9);
        assert!((next.margin.predicted - (1155.0 - 540.0)).abs() < 1e-9);
        assert_eq!(next.margin.confidence, 0.7);
        assert!((forecast.next_quarter.revenue.predicted - next.revenue.predicted * 3.0).abs() < 1e-9);
        assert!((forecast.next_year.costs.predicted - next.costs.predicted * 12.0).abs() < 1e-9);
        assert!((forecast.next_year.margin.percentage - next.margin.percentage).abs() < 1e-9);
    }

    #[test]
    fn test_filters() {
        let ctx = context(vec![
            revenue(2023, 1, 1000.0, "A"),
            revenue(2023, 1, 50.0, "A"),
            revenue(2023, 1, 700.0, "B"),
        ])
        .with_filters(Some(MetricsFilters {
            account_summary: vec!["A".to_string()],
            min_amount: Some(100.0),
            ..Default::default()
        }));
        assert_eq!(MetricsCalculator::new(&ctx).revenue().total, 1000.0);
    }

    #[test]
    fn test_calculate_only_requested_metrics() {
        let ctx = context(vec![revenue(2023, 1, 1000.0, "A"), cost(2023, 1, -250.0, "B")]);
        let result = MetricsCalculator::new(&ctx).calculate(&[MetricKind::Summary]);

        assert!(result.revenue.is_none());
        let summary = result.summary.unwrap();
        assert_eq!(summary.project_id, "P1");
        assert_eq!(summary.net_margin, 750.0);
        assert_eq!(summary.margin_percentage, 75.0);

        let json = serde_json::to_value(MetricsCalculator::new(&ctx).calculate(&[MetricKind::Costs])).unwrap();
        assert!(json.get("revenue").is_none());
        assert!(json["costs"]["byType"].is_object());
    }

    #[test]
    fn test_metrics_request_validation() {
        let request = MetricsRequest {
            project_id: "P1".to_string(),
            start_date: "2023-06".to_string(),
            end_date: "2023-01".to_string(),
            metrics: vec![],
            filters: None,
        };
        match validate_metrics_request(&request).unwrap_err() {
            AnalyticsError::Validation { errors } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_service_uses_configured_benchmarks_and_cache() {
        let ledger = InMemoryLedger::from_transactions(vec![
            revenue(2023, 1, 1000.0, "A").with_project("P1"),
            cost(2023, 1, -600.0, "SALÁRIOS CLT").with_project("P1"),
        ]);
        let config = EngineConfig::from_json_str(
            r#"{ "benchmarks": { "targetMargin": 30.0 }, "cache": { "max_entries": 1 } }"#,
        )
        .unwrap();
        let cache: TtlCache<FinancialMetrics> = TtlCache::from_config(&config.cache);
        let service = MetricsService::from_config(&ledger, &config);

        let request = MetricsRequest::from_json(
            r#"{ "projectId": "P1", "startDate": "2023-01", "endDate": "2023-01", "metrics": ["margin"] }"#,
        )
        .unwrap();
        let margin = service
            .calculate(&request, Some(&cache))
            .unwrap()
            .margin
            .clone()
            .unwrap();
        assert_eq!(margin.benchmarks.target, 30.0);
        assert_eq!(margin.benchmarks.industry, 15.0);
        assert_eq!(margin.percentage, 40.0);

        let mut other = request.clone();
        other.end_date = "2023-02".to_string();
        service.calculate(&other, Some(&cache)).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
