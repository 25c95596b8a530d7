use crate::error::Warning;
use crate::types::{NormalizedTable, Transaction, TransactionType, YearRange};
use crate::util::Total;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What the user has selected. Empty sets mean "no restriction".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub donors: BTreeSet<String>,
    #[serde(default)]
    pub recipients: BTreeSet<String>,
    #[serde(default)]
    pub sectors: BTreeSet<String>,
    #[serde(default)]
    pub flow_types: BTreeSet<String>,
    /// `None` selects the table's full observed span.
    #[serde(default)]
    pub year_range: Option<YearRange>,
}

/// Widget cardinality of the selection controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    Single,
    #[default]
    Multi,
}

impl FilterSpec {
    pub fn new(transaction_type: TransactionType) -> Self {
        FilterSpec {
            transaction_type,
            donors: BTreeSet::new(),
            recipients: BTreeSet::new(),
            sectors: BTreeSet::new(),
            flow_types: BTreeSet::new(),
            year_range: None,
        }
    }

    pub fn with_donor(mut self, donor: impl Into<String>) -> Self {
        self.donors.insert(donor.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.insert(recipient.into());
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sectors.insert(sector.into());
        self
    }

    pub fn with_flow_type(mut self, flow_type: impl Into<String>) -> Self {
        self.flow_types.insert(flow_type.into());
        self
    }

    pub fn with_years(mut self, min: i32, max: i32) -> Self {
        self.year_range = Some(YearRange::new(min, max));
        self
    }

    /// Restrict every selection to at most one value when the controls are
    /// single-select. Keeps the lexicographically first value.
    pub fn conform(mut self, mode: SelectionMode) -> Self {
        if mode == SelectionMode::Single {
            for (name, set) in [
                ("donor", &mut self.donors),
                ("recipient", &mut self.recipients),
                ("sector", &mut self.sectors),
                ("flow type", &mut self.flow_types),
            ] {
                if set.len() > 1 {
                    warn!("single-select mode: keeping one {} of {}", name, set.len());
                    let first = set.iter().next().cloned();
                    set.retain(|v| Some(v) == first.as_ref());
                }
            }
        }
        self
    }

    fn admits(&self, tx: &Transaction, years: Option<YearRange>) -> bool {
        tx.transaction_type == self.transaction_type
            && member(&self.donors, &tx.donor)
            && member(&self.recipients, &tx.recipient)
            && member(&self.sectors, &tx.sector)
            && member(&self.flow_types, &tx.flow_type)
            && match (years, tx.year()) {
                (Some(range), Some(year)) => range.contains(year),
                _ => false,
            }
    }
}

fn member(set: &BTreeSet<String>, value: &str) -> bool {
    set.is_empty() || set.contains(value)
}

/// Rows of a table that pass one filter specification, in table order.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    rows: Vec<&'a Transaction>,
    transaction_type: TransactionType,
    year_range: Option<YearRange>,
    warnings: Vec<Warning>,
}

impl<'a> FilteredView<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a Transaction> + '_ {
        self.rows.iter().copied()
    }

    pub fn rows(&self) -> &[&'a Transaction] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    /// Year window actually applied after clamping, if any rows could pass.
    pub fn year_range(&self) -> Option<YearRange> {
        self.year_range
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn total(&self) -> f64 {
        self.iter().map(|t| t.value_usd_constant).collect::<Total>().value()
    }
}

/// Project `table` through `spec`.
///
/// The year window is intersected with the table's observed span; rows
/// without a final transaction date never pass it.
pub fn apply<'a>(table: &'a NormalizedTable, spec: &FilterSpec) -> FilteredView<'a> {
    let mut warnings = Vec::new();
    let years = match (spec.year_range, table.year_span) {
        (None, span) => span,
        (Some(requested), span) => {
            let effective = span.and_then(|s| requested.clamp_to(s));
            if effective != Some(requested) {
                let w = Warning::FilterClamped { requested, effective };
                warn!("{}", w);
                warnings.push(w);
            }
            effective
        }
    };
    let rows = table
        .transactions
        .iter()
        .filter(|tx| spec.admits(tx, years))
        .collect();
    FilteredView {
        rows,
        transaction_type: spec.transaction_type,
        year_range: years,
        warnings,
    }
}

/// Choices offered by the selection controls, sorted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOptions {
    pub donors: Vec<String>,
    pub recipients: Vec<String>,
    pub sectors: Vec<String>,
    pub flow_types: Vec<String>,
    pub year_span: Option<YearRange>,
}

impl FilterOptions {
    pub fn from_table(table: &NormalizedTable) -> Self {
        fn distinct<'t>(
            table: &'t NormalizedTable,
            field: impl Fn(&'t Transaction) -> &'t str,
        ) -> Vec<String> {
            table
                .transactions
                .iter()
                .map(field)
                .collect::<BTreeSet<&str>>()
                .into_iter()
                .map(str::to_string)
                .collect()
        }
        FilterOptions {
            donors: distinct(table, |t| t.donor.as_str()),
            recipients: distinct(table, |t| t.recipient.as_str()),
            sectors: distinct(table, |t| t.sector.as_str()),
            flow_types: distinct(table, |t| t.flow_type.as_str()),
            year_span: table.year_span,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn tx(
        kind: TransactionType,
        donor: &str,
        recipient: &str,
        sector: &str,
        year: Option<i32>,
        value: f64,
    ) -> Transaction {
        Transaction {
            transaction_type: kind,
            donor: donor.to_string(),
            recipient: recipient.to_string(),
            sector: sector.to_string(),
            flow_type: "ODA Grant".to_string(),
            project_id: None,
            project_title: format!("{} {}", donor, sector),
            expected_start_date: None,
            completion_date: None,
            data_collection_date: None,
            final_transaction_date: year.and_then(|y| NaiveDate::from_ymd_opt(y, 6, 30)),
            value_usd_constant: value,
            extras: Vec::new(),
        }
    }

    pub(crate) fn sample() -> NormalizedTable {
        use TransactionType::*;
        NormalizedTable::new(
            "sample",
            vec![
                tx(Spent, "Australia", "Fiji", "Health", Some(2010), 100.0),
                tx(Spent, "China", "Tonga", "Transport", Some(2012), 40.0),
                tx(Committed, "Australia", "Fiji", "Health", Some(2012), 500.0),
                tx(Spent, "Australia", "Samoa", "Education", Some(2015), 60.0),
                tx(Spent, "New Zealand", "Fiji", "Health", Some(2015), -10.0),
            ],
            Vec::new(),
            false,
        )
    }

    fn total_of(table: &NormalizedTable, spec: &FilterSpec) -> f64 {
        apply(table, spec).total()
    }

    #[test]
    fn defaults_only_restrict_transaction_type() {
        let table = sample();
        let view = apply(&table, &FilterSpec::new(TransactionType::Spent));
        let expected: Vec<&Transaction> = table
            .transactions
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Spent)
            .collect();
        assert_eq!(view.rows(), expected.as_slice());
        assert!(view.warnings().is_empty());
        assert_eq!(view.year_range(), Some(YearRange::new(2010, 2015)));
    }

    #[test]
    fn same_spec_same_rows() {
        let table = sample();
        let spec = FilterSpec::new(TransactionType::Spent).with_recipient("Fiji");
        assert_eq!(apply(&table, &spec).rows(), apply(&table, &spec).rows());
    }

    #[test]
    fn sets_and_years_compose() {
        let table = sample();
        let spec = FilterSpec::new(TransactionType::Spent)
            .with_donor("Australia")
            .with_donor("China")
            .with_years(2011, 2015);
        let donors: Vec<&str> = apply(&table, &spec).iter().map(|t| t.donor.as_str()).collect();
        assert_eq!(donors, vec!["China", "Australia"]);
    }

    #[test]
    fn narrowing_never_increases_total() {
        let table = sample();
        let wide = FilterSpec::new(TransactionType::Spent)
            .with_sector("Health")
            .with_sector("Transport");
        let narrow = FilterSpec::new(TransactionType::Spent).with_sector("Transport");
        assert!(total_of(&table, &narrow) <= total_of(&table, &wide));
        let narrow_years = wide.clone().with_years(2012, 2012);
        assert!(total_of(&table, &narrow_years) <= total_of(&table, &wide));
    }

    #[test]
    fn out_of_span_years_are_clamped() {
        let table = sample();
        let view = apply(&table, &FilterSpec::new(TransactionType::Spent).with_years(2000, 2012));
        assert_eq!(view.year_range(), Some(YearRange::new(2010, 2012)));
        assert_eq!(view.len(), 2);
        assert_eq!(view.warnings().len(), 1);

        let view = apply(&table, &FilterSpec::new(TransactionType::Spent).with_years(2030, 2040));
        assert!(view.is_empty());
        assert_eq!(view.year_range(), None);
    }

    #[test]
    fn undated_rows_fail_the_year_window() {
        let mut rows = sample().transactions;
        rows.push(tx(TransactionType::Spent, "Japan", "Fiji", "Health", None, 999.0));
        let table = NormalizedTable::new("undated", rows, Vec::new(), false);
        let view = apply(&table, &FilterSpec::new(TransactionType::Spent).with_donor("Japan"));
        assert!(view.is_empty());
    }

    #[test]
    fn single_select_keeps_one_value() {
        let spec = FilterSpec::new(TransactionType::Spent)
            .with_donor("China")
            .with_donor("Australia")
            .with_sector("Health")
            .conform(SelectionMode::Single);
        assert_eq!(spec.donors.len(), 1);
        assert!(spec.donors.contains("Australia"));
        assert_eq!(spec.sectors.len(), 1);
    }

    #[test]
    fn options_are_sorted_and_distinct() {
        let options = FilterOptions::from_table(&sample());
        assert_eq!(options.donors, vec!["Australia", "China", "New Zealand"]);
        assert_eq!(options.recipients, vec!["Fiji", "Samoa", "Tonga"]);
        assert_eq!(options.year_span, Some(YearRange::new(2010, 2015)));
    }
}
