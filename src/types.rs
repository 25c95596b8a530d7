use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tabled::Tabled;

use crate::util::{display_opt_year, display_usd};

/// Which side of the aid flow a transaction line records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Spent,
    Committed,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Spent => "Spent",
            TransactionType::Committed => "Committed",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spent" => Ok(TransactionType::Spent),
            "committed" => Ok(TransactionType::Committed),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

/// Inclusive range of calendar years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    /// Builds a range, swapping the bounds if they arrive reversed.
    pub fn new(a: i32, b: i32) -> Self {
        if a <= b {
            YearRange { min: a, max: b }
        } else {
            YearRange { min: b, max: a }
        }
    }

    pub fn single(year: i32) -> Self {
        YearRange { min: year, max: year }
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }

    /// Intersection with `span`, or `None` when the two do not overlap.
    pub fn clamp_to(&self, span: YearRange) -> Option<YearRange> {
        let min = self.min.max(span.min);
        let max = self.max.min(span.max);
        if min <= max {
            Some(YearRange { min, max })
        } else {
            None
        }
    }

    /// Smallest range covering both `self` and `year`.
    pub fn extend(self, year: i32) -> YearRange {
        YearRange {
            min: self.min.min(year),
            max: self.max.max(year),
        }
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// One normalized aid disbursement or commitment line.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub transaction_type: TransactionType,
    pub donor: String,
    pub recipient: String,
    pub sector: String,
    pub flow_type: String,
    pub project_id: Option<String>,
    pub project_title: String,
    pub expected_start_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub data_collection_date: Option<NaiveDate>,
    pub final_transaction_date: Option<NaiveDate>,
    pub value_usd_constant: f64,
    /// Cells of the columns listed in `NormalizedTable::extra_columns`, same order.
    pub extras: Vec<String>,
}

impl Transaction {
    /// Year bucket key; `None` keeps the row out of every year-keyed grouping.
    pub fn year(&self) -> Option<i32> {
        self.final_transaction_date.map(|d| d.year())
    }
}

/// The full transaction table, normalized once and read-only afterwards.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub source: String,
    pub transactions: Vec<Transaction>,
    /// Headers that were not interpreted, in their original spelling.
    pub extra_columns: Vec<String>,
    /// Whether the source carried an explicit project identifier column.
    pub has_project_id: bool,
    /// Observed span of `final_transaction_date` years over the whole table.
    pub year_span: Option<YearRange>,
}

impl NormalizedTable {
    pub fn new(
        source: impl Into<String>,
        transactions: Vec<Transaction>,
        extra_columns: Vec<String>,
        has_project_id: bool,
    ) -> Self {
        let year_span = transactions
            .iter()
            .filter_map(Transaction::year)
            .fold(None, |acc: Option<YearRange>, y| {
                Some(acc.map_or(YearRange::single(y), |r| r.extend(y)))
            });
        NormalizedTable {
            source: source.into(),
            transactions,
            extra_columns,
            has_project_id,
            year_span,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct YearTotal {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value", display_with = "display_usd")]
    pub value: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct YearCategoryTotal {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value", display_with = "display_usd")]
    pub value: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct CategoryTotal {
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value", display_with = "display_usd")]
    pub value: f64,
}

/// Donor or recipient total, ranked by value.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct RankedTotal {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Name")]
    #[tabled(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value", display_with = "display_usd")]
    pub value: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct ProjectRow {
    #[serde(rename = "ProjectId")]
    #[tabled(skip)]
    pub project_id: Option<String>,
    #[serde(rename = "Title")]
    #[tabled(rename = "Title")]
    pub title: String,
    #[serde(rename = "Donor")]
    #[tabled(rename = "Donor")]
    pub donor: String,
    #[serde(rename = "Recipient")]
    #[tabled(rename = "Recipient")]
    pub recipient: String,
    #[serde(rename = "StartYear")]
    #[tabled(rename = "Start Year", display_with = "display_opt_year")]
    pub start_year: Option<i32>,
    #[serde(rename = "CompletionYear")]
    #[tabled(rename = "Completion Year", display_with = "display_opt_year")]
    pub completion_year: Option<i32>,
    #[serde(rename = "Transactions")]
    #[tabled(skip)]
    pub transactions: usize,
    #[serde(rename = "MixedAttributes")]
    #[tabled(skip)]
    pub mixed_attributes: bool,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value", display_with = "display_usd")]
    pub value: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Summary {
    pub transaction_type: TransactionType,
    pub transactions: usize,
    pub total_value: f64,
    pub donors: usize,
    pub recipients: usize,
    pub projects: usize,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
}
