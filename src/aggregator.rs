use crate::error::{AnalyticsError, Result};
use crate::ingestion::{
    CostRecord, DreRecord, LineDetails, Nature, RevenueRecord, SourceRecord, Transaction,
};
use crate::schema::{ForecastFilters, ForecastType};
use crate::utils::{
    add_months, first_day_of_month, last_day_of_month, month_start, period_key, timestamp_of,
};
use chrono::{Datelike, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PointDimensions {
    pub account_code: Option<String>,
    pub department: Option<String>,
    pub cost_center: Option<String>,
    pub nature: Option<Nature>,
    pub summary_category: Option<String>,
}

/// One monthly observation of the requested metric family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPoint {
    /// "YYYY-MM"
    pub period: String,
    /// First day of the month.
    pub date: NaiveDate,
    pub timestamp: i64,
    pub value: f64,
    pub dimensions: PointDimensions,
}

impl HistoricalPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        let date = month_start(date);
        Self {
            period: period_key(date),
            date,
            timestamp: timestamp_of(date),
            value,
            dimensions: PointDimensions::default(),
        }
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }
}

/// Builds a consecutive monthly series starting at `start`.
pub fn monthly_series(start: NaiveDate, values: &[f64]) -> Result<Vec<HistoricalPoint>> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| Ok(HistoricalPoint::new(add_months(month_start(start), i as i32)?, v)))
        .collect()
}

pub fn point_values(points: &[HistoricalPoint]) -> Vec<f64> {
    points.iter().map(|p| p.value).collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end <= start {
            return Err(AnalyticsError::DataSource(format!(
                "Invalid date range: end {} is not after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// From the first day of `start_month` to the last day of `end_month`.
    pub fn from_months(start_month: NaiveDate, end_month: NaiveDate) -> Result<Self> {
        if end_month < start_month {
            return Err(AnalyticsError::DataSource(format!(
                "Invalid date range: {} is before {}",
                period_key(end_month),
                period_key(start_month)
            )));
        }
        Self::new(
            month_start(start_month),
            last_day_of_month(end_month.year(), end_month.month())?,
        )
    }

    /// `months` months of history ending with (and including) `end_month`.
    pub fn trailing_months(end_month: NaiveDate, months: u32) -> Result<Self> {
        let start = add_months(month_start(end_month), -(months.max(1) as i32 - 1))?;
        Self::from_months(start, end_month)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    AccountCode,
    Department,
    CostCenter,
    Nature,
    Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalQuery {
    pub project_id: Option<String>,
    pub range: DateRange,
    pub filters: ForecastFilters,
    /// Dimensions that split a month into separate points; empty means one
    /// point per month.
    pub group_by: Vec<Dimension>,
}

impl HistoricalQuery {
    pub fn new(range: DateRange) -> Self {
        Self {
            project_id: None,
            range,
            filters: ForecastFilters::default(),
            group_by: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: ForecastFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn grouped_by(mut self, dimensions: Vec<Dimension>) -> Self {
        self.group_by = dimensions;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let blank = self.filters.blank_fields();
        if !blank.is_empty() {
            return Err(AnalyticsError::DataSource(format!(
                "Malformed filters (blank values in {})",
                blank.join(", ")
            )));
        }
        DateRange::new(self.range.start, self.range.end)?;
        Ok(())
    }

    /// Conjunction of every filter that is set.
    pub fn matches(&self, tx: &Transaction) -> bool {
        fn allowed(list: &[String], value: &Option<String>) -> bool {
            list.is_empty() || value.as_ref().is_some_and(|v| list.iter().any(|l| l == v))
        }

        let f = &self.filters;
        self.range.contains(tx.date)
            && self
                .project_id
                .as_ref()
                .map_or(true, |p| tx.project_id.as_ref() == Some(p))
            && allowed(&f.account_codes, &tx.account_code)
            && allowed(&f.departments, &tx.department)
            && allowed(&f.cost_centers, &tx.cost_center)
            && allowed(&f.summaries, &tx.account_summary)
            && (f.natures.is_empty() || f.natures.contains(&tx.nature))
    }

    fn dimensions_of(&self, tx: &Transaction) -> PointDimensions {
        let mut dims = PointDimensions::default();
        for dimension in &self.group_by {
            match dimension {
                Dimension::AccountCode => dims.account_code = tx.account_code.clone(),
                Dimension::Department => dims.department = tx.department.clone(),
                Dimension::CostCenter => dims.cost_center = tx.cost_center.clone(),
                Dimension::Nature => dims.nature = Some(tx.nature),
                Dimension::Summary => dims.summary_category = tx.account_summary.clone(),
            }
        }
        dims
    }
}

/// The collaborator that owns persisted accounting data.
pub trait HistoricalDataSource: Send + Sync {
    fn fetch_transactions(&self, query: &HistoricalQuery) -> Result<Vec<Transaction>>;

    fn fetch_dre_records(&self, _query: &HistoricalQuery) -> Result<Vec<DreRecord>> {
        Ok(Vec::new())
    }
}

/// A data source backed by records already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    records: Vec<SourceRecord>,
}

impl InMemoryLedger {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self { records }
    }

    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let records = transactions
            .into_iter()
            .map(|tx| {
                let details = LineDetails {
                    project_id: tx.project_id,
                    account_code: tx.account_code,
                    department: tx.department,
                    cost_center: tx.cost_center,
                    account_summary: tx.account_summary,
                };
                match tx.nature {
                    Nature::Revenue => SourceRecord::Revenue(RevenueRecord {
                        date: tx.date,
                        amount: tx.amount,
                        details,
                    }),
                    nature => SourceRecord::Cost(CostRecord {
                        date: tx.date,
                        amount: tx.amount,
                        nature,
                        details,
                    }),
                }
            })
            .collect();
        Self { records }
    }

    pub fn push(&mut self, record: SourceRecord) {
        self.records.push(record);
    }
}

impl HistoricalDataSource for InMemoryLedger {
    fn fetch_transactions(&self, query: &HistoricalQuery) -> Result<Vec<Transaction>> {
        let mut out = Vec::new();
        for record in self.records.iter().filter(|r| !r.is_dre()) {
            if let Some(tx) = record.to_transaction()? {
                if query.range.contains(tx.date)
                    && query
                        .project_id
                        .as_ref()
                        .map_or(true, |p| tx.project_id.as_ref() == Some(p))
                {
                    out.push(tx);
                }
            }
        }
        Ok(out)
    }

    fn fetch_dre_records(&self, query: &HistoricalQuery) -> Result<Vec<DreRecord>> {
        Ok(self
            .records
            .iter()
            .filter_map(|r| match r {
                SourceRecord::Dre(d) => Some(d),
                _ => None,
            })
            .filter(|d| {
                query
                    .project_id
                    .as_ref()
                    .map_or(true, |p| d.details.project_id.as_ref() == Some(p))
            })
            .filter(|d| {
                first_day_of_month(d.year, d.month)
                    .map(|date| {
                        date <= query.range.end && month_start(query.range.start) <= date
                    })
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }
}

/// Contribution of a transaction to the series of a forecast type.
fn contribution(forecast_type: ForecastType, tx: &Transaction) -> Option<f64> {
    match forecast_type {
        ForecastType::Revenue => (tx.nature == Nature::Revenue).then(|| tx.amount.abs()),
        ForecastType::Cost => tx.nature.is_outflow().then(|| tx.amount.abs()),
        ForecastType::Profit => Some(if tx.nature == Nature::Revenue {
            tx.amount.abs()
        } else {
            -tx.amount.abs()
        }),
        ForecastType::Cashflow | ForecastType::Comprehensive => Some(tx.amount),
    }
}

/// Groups matching transactions into points ordered by date (then dimensions).
pub fn aggregate_transactions(
    transactions: &[Transaction],
    query: &HistoricalQuery,
    forecast_type: ForecastType,
) -> Vec<HistoricalPoint> {
    let mut buckets: BTreeMap<(NaiveDate, PointDimensions), f64> = BTreeMap::new();

    for tx in transactions.iter().filter(|tx| query.matches(tx)) {
        if let Some(value) = contribution(forecast_type, tx) {
            *buckets
                .entry((month_start(tx.date), query.dimensions_of(tx)))
                .or_insert(0.0) += value;
        }
    }

    buckets
        .into_iter()
        .map(|((date, dimensions), value)| HistoricalPoint {
            dimensions,
            ..HistoricalPoint::new(date, value)
        })
        .collect()
}

pub struct HistoricalDataAggregator<'a> {
    source: &'a dyn HistoricalDataSource,
}

impl<'a> HistoricalDataAggregator<'a> {
    pub fn new(source: &'a dyn HistoricalDataSource) -> Self {
        Self { source }
    }

    pub fn collect(
        &self,
        query: &HistoricalQuery,
        forecast_type: ForecastType,
    ) -> Result<Vec<HistoricalPoint>> {
        query.validate()?;

        let transactions = self.source.fetch_transactions(query)?;
        let points = aggregate_transactions(&transactions, query, forecast_type);

        debug!(
            "Aggregated {} transactions into {} {} points",
            transactions.len(),
            points.len(),
            forecast_type
        );

        Ok(points)
    }
}
