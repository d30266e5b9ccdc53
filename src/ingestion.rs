//! Record kinds supplied by the accounting collaborator and their
//! normalization into [`Transaction`].

use crate::error::{AnalyticsError, Result};
use crate::utils::first_day_of_month;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Nature {
    #[serde(alias = "RECEITA", alias = "Receita", alias = "revenue")]
    Revenue,

    #[serde(alias = "CUSTO", alias = "Custo", alias = "cost")]
    Cost,

    #[serde(alias = "DESPESA", alias = "Despesa", alias = "expense")]
    Expense,
}

impl Nature {
    pub fn is_outflow(&self) -> bool {
        matches!(self, Nature::Cost | Nature::Expense)
    }
}

/// A dated, signed monetary movement in its normalized form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    #[serde(default)]
    pub project_id: Option<String>,
    pub date: NaiveDate,
    pub amount: f64,
    pub nature: Nature,
    #[serde(default)]
    pub account_code: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub cost_center: Option<String>,
    #[serde(default)]
    pub account_summary: Option<String>,
}

impl Transaction {
    pub fn new(date: NaiveDate, amount: f64, nature: Nature) -> Self {
        Self {
            project_id: None,
            date,
            amount,
            nature,
            account_code: None,
            department: None,
            cost_center: None,
            account_summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.account_summary = Some(summary.into());
        self
    }

    pub fn with_account_code(mut self, code: impl Into<String>) -> Self {
        self.account_code = Some(code.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_cost_center(mut self, cost_center: impl Into<String>) -> Self {
        self.cost_center = Some(cost_center.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineDetails {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub account_code: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub cost_center: Option<String>,
    #[serde(default)]
    pub account_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevenueRecord {
    pub date: NaiveDate,
    pub amount: f64,
    #[serde(flatten)]
    pub details: LineDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostRecord {
    pub date: NaiveDate,
    pub amount: f64,
    /// Cost or Expense; anything else is rejected on normalization.
    pub nature: Nature,
    #[serde(flatten)]
    pub details: LineDetails,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DreStatus {
    Pending,
    Processed,
    Failed,
}

/// A line of an income-statement (DRE) report, dated by year and month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DreRecord {
    pub year: i32,
    pub month: u32,
    pub amount: f64,
    pub nature: Nature,
    pub status: DreStatus,
    #[serde(flatten)]
    pub details: LineDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRecord {
    Revenue(RevenueRecord),
    Cost(CostRecord),
    Dre(DreRecord),
}

impl SourceRecord {
    /// Normalizes the record. DRE lines that are not yet processed yield `None`.
    pub fn to_transaction(&self) -> Result<Option<Transaction>> {
        let (date, amount, nature, details) = match self {
            SourceRecord::Revenue(r) => (r.date, r.amount, Nature::Revenue, &r.details),
            SourceRecord::Cost(c) => {
                if !c.nature.is_outflow() {
                    return Err(AnalyticsError::DataSource(format!(
                        "Cost record dated {} carries nature {:?}",
                        c.date, c.nature
                    )));
                }
                (c.date, c.amount, c.nature, &c.details)
            }
            SourceRecord::Dre(d) => {
                if d.status != DreStatus::Processed {
                    return Ok(None);
                }
                if !(1..=12).contains(&d.month) {
                    return Err(AnalyticsError::DataSource(format!(
                        "DRE record has invalid month {} for year {}",
                        d.month, d.year
                    )));
                }
                (
                    first_day_of_month(d.year, d.month)?,
                    d.amount,
                    d.nature,
                    &d.details,
                )
            }
        };

        Ok(Some(Transaction {
            project_id: details.project_id.clone(),
            date,
            amount,
            nature,
            account_code: details.account_code.clone(),
            department: details.department.clone(),
            cost_center: details.cost_center.clone(),
            account_summary: details.account_summary.clone(),
        }))
    }

    pub fn is_dre(&self) -> bool {
        matches!(self, SourceRecord::Dre(_))
    }
}

/// Normalizes a batch, dropping unprocessed DRE lines.
pub fn normalize_records(records: &[SourceRecord]) -> Result<Vec<Transaction>> {
    let mut transactions = Vec::with_capacity(records.len());
    for record in records {
        if let Some(tx) = record.to_transaction()? {
            transactions.push(tx);
        }
    }
    Ok(transactions)
}
