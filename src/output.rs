use crate::filter::FilteredView;
use crate::reports::StackedSeries;
use crate::types::NormalizedTable;
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

pub fn write_csv<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), Box<dyn Error>> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Stacked series in wide form: a `Year` column then one column per category.
pub fn write_stacked(path: impl AsRef<Path>, series: &StackedSeries) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec!["Year".to_string()];
    header.extend(series.categories.iter().cloned());
    wtr.write_record(&header)?;
    for (year, values) in series.wide_rows() {
        let mut record = vec![year.to_string()];
        record.extend(values.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// The filtered transactions themselves, including uninterpreted columns.
pub fn write_transactions(
    path: impl AsRef<Path>,
    table: &NormalizedTable,
    view: &FilteredView,
) -> Result<(), Box<dyn Error>> {
    fn date(d: Option<chrono::NaiveDate>) -> String {
        d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
    }
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header: Vec<String> = [
        "Spent/Committed",
        "Donor",
        "Recipient",
        "Sector",
        "Flow Type",
        "Project Id",
        "Project Title",
        "Expected Start Date",
        "Completion Date",
        "Data Collection Date",
        "Final Transaction Date",
        "USD Constant - Transaction Value",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(table.extra_columns.iter().cloned());
    wtr.write_record(&header)?;
    for t in view.iter() {
        let mut record = vec![
            t.transaction_type.to_string(),
            t.donor.clone(),
            t.recipient.clone(),
            t.sector.clone(),
            t.flow_type.clone(),
            t.project_id.clone().unwrap_or_default(),
            t.project_title.clone(),
            date(t.expected_start_date),
            date(t.completion_date),
            date(t.data_collection_date),
            date(t.final_transaction_date),
            t.value_usd_constant.to_string(),
        ];
        record.extend(t.extras.iter().cloned());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn preview_table<T>(title: &str, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}\n", title);
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}", table_str);
    if rows.len() > max_rows {
        println!("... {} more row(s)", rows.len() - max_rows);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::sample;
    use crate::filter::{apply, FilterSpec};
    use crate::reports::{stack, yearly_by_sector};
    use crate::types::TransactionType;

    #[test]
    fn stacked_csv_is_wide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stacked.csv");
        let table = sample();
        let view = apply(&table, &FilterSpec::new(TransactionType::Spent));
        write_stacked(&path, &stack(&yearly_by_sector(&view))).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Year,Education,Health,Transport");
        assert_eq!(lines[1], "2010,0,100,0");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn transactions_csv_keeps_filtered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.csv");
        let table = sample();
        let view = apply(&table, &FilterSpec::new(TransactionType::Committed));
        write_transactions(&path, &table, &view).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("Committed,Australia,Fiji,Health"));
    }
}
