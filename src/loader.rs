use crate::error::{LoadError, Result, Warning};
use crate::types::{NormalizedTable, Transaction, TransactionType};
use crate::util::{parse_calendar_date, parse_f64_safe, parse_serial_date};
use csv::{ByteRecord, ReaderBuilder};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Header row plus string cells, exactly as read from the source.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub source: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Records the CSV reader could not decode at all.
    pub unreadable_rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub total_rows: usize,
    pub kept_rows: usize,
    /// Rows without donor/recipient or with an unknown transaction type.
    pub dropped_rows: usize,
    pub unreadable_rows: usize,
    /// Values that could not be read as numbers and were counted as zero.
    pub invalid_values: usize,
    /// Unparseable date cells per column.
    pub date_warnings: BTreeMap<String, usize>,
}

impl LoadReport {
    pub fn warnings(&self) -> Vec<Warning> {
        self.date_warnings
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(column, count)| Warning::DateParse {
                column: column.clone(),
                count: *count,
            })
            .collect()
    }
}

/// Interpreted fields of the source table, with their accepted header spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    TransactionType,
    Donor,
    Recipient,
    Sector,
    FlowType,
    ProjectTitle,
    ProjectId,
    ExpectedStartDate,
    CompletionDate,
    DataCollectionDate,
    FinalTransactionDate,
    Value,
}

const FIELDS: &[(Field, &[&str], bool)] = &[
    (Field::TransactionType, &["spent/committed", "transaction type", "transaction_type"], true),
    (Field::Donor, &["donor"], true),
    (Field::Recipient, &["recipient"], true),
    (Field::Sector, &["lowy sector", "sector"], true),
    (Field::FlowType, &["flow type", "aid type", "flow_type"], true),
    (Field::ProjectTitle, &["project title", "project_title", "title"], true),
    (Field::ProjectId, &["project id", "project_id", "projectid"], false),
    (Field::ExpectedStartDate, &["expectedstartdate", "expected start date"], true),
    (Field::CompletionDate, &["completiondate", "completion date"], true),
    (Field::DataCollectionDate, &["data collection date"], false),
    (Field::FinalTransactionDate, &["final transaction date", "final_transaction_date"], true),
    (Field::Value, &["usd constant - transaction value", "value_usd_constant"], true),
];

/// Where each interpreted field lives in a raw row.
struct ColumnMap {
    positions: HashMap<Field, usize>,
    extras: Vec<usize>,
}

impl ColumnMap {
    fn resolve(raw: &RawTable) -> Result<ColumnMap> {
        let folded: Vec<String> = raw.headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let mut positions = HashMap::new();
        let mut missing = Vec::new();
        for (field, aliases, required) in FIELDS {
            let found = aliases
                .iter()
                .find_map(|alias| folded.iter().position(|h| h == alias));
            match found {
                Some(idx) => {
                    positions.insert(*field, idx);
                }
                None if *required => missing.push(aliases[0].to_string()),
                None => {}
            }
        }
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns {
                source_name: raw.source.clone(),
                columns: missing,
            });
        }
        let extras = (0..raw.headers.len())
            .filter(|idx| !positions.values().any(|p| p == idx))
            .collect();
        Ok(ColumnMap { positions, extras })
    }

    fn cell<'a>(&self, row: &'a [String], field: Field) -> Option<&'a str> {
        self.positions
            .get(&field)
            .and_then(|idx| row.get(*idx))
            .map(|s| s.as_str())
    }

    fn text(&self, row: &[String], field: Field) -> Option<String> {
        self.cell(row, field)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Cells are decoded leniently: invalid UTF-8 becomes U+FFFD instead of
/// costing the whole row.
fn lossy_cells(record: &ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|cell| String::from_utf8_lossy(cell).into_owned())
        .collect()
}

pub fn read_raw<R: Read>(source: &str, reader: R) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = lossy_cells(rdr.byte_headers()?);
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(LoadError::Empty(source.to_string()));
    }
    let mut rows = Vec::new();
    let mut unreadable_rows = 0usize;
    for result in rdr.byte_records() {
        match result {
            Ok(record) => {
                let mut row = lossy_cells(&record);
                row.resize(headers.len(), String::new());
                rows.push(row);
            }
            Err(e) => {
                debug!("{}: skipping unreadable record: {}", source, e);
                unreadable_rows += 1;
            }
        }
    }
    Ok(RawTable {
        source: source.to_string(),
        headers,
        rows,
        unreadable_rows,
    })
}

pub fn read_raw_path(path: impl AsRef<Path>) -> Result<RawTable> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    read_raw(&path.display().to_string(), file)
}

/// Turn a raw table into typed transactions.
///
/// Fails only on structural problems (missing required columns); bad cells
/// become "no date", zero values or dropped rows, all counted in the report.
pub fn normalize(raw: RawTable) -> Result<(NormalizedTable, LoadReport)> {
    let columns = ColumnMap::resolve(&raw)?;
    let mut report = LoadReport {
        total_rows: raw.rows.len() + raw.unreadable_rows,
        unreadable_rows: raw.unreadable_rows,
        ..LoadReport::default()
    };
    let mut bad_dates: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut transactions = Vec::with_capacity(raw.rows.len());

    for (line, row) in raw.rows.iter().enumerate() {
        let transaction_type = match columns
            .cell(row, Field::TransactionType)
            .and_then(|s| s.parse::<TransactionType>().ok())
        {
            Some(t) => t,
            None => {
                debug!("row {}: unknown transaction type, dropped", line + 1);
                report.dropped_rows += 1;
                continue;
            }
        };
        let (donor, recipient) = match (
            columns.text(row, Field::Donor),
            columns.text(row, Field::Recipient),
        ) {
            (Some(d), Some(r)) => (d, r),
            _ => {
                debug!("row {}: missing donor or recipient, dropped", line + 1);
                report.dropped_rows += 1;
                continue;
            }
        };

        let value_usd_constant = match parse_f64_safe(columns.cell(row, Field::Value)) {
            Some(v) => v,
            None => {
                report.invalid_values += 1;
                0.0
            }
        };

        let mut serial = |field: Field, name: &'static str| {
            let cell = columns.cell(row, field);
            let date = parse_serial_date(cell);
            if date.is_none() && columns.positions.contains_key(&field) {
                debug!("row {}: no usable serial date in '{}': {:?}", line + 1, name, cell);
                *bad_dates.entry(name).or_insert(0) += 1;
            }
            date
        };
        let expected_start_date = serial(Field::ExpectedStartDate, "expectedstartdate");
        let completion_date = serial(Field::CompletionDate, "completiondate");
        let data_collection_date = serial(Field::DataCollectionDate, "data collection date");

        let final_cell = columns.cell(row, Field::FinalTransactionDate);
        let final_transaction_date = parse_calendar_date(final_cell);
        if final_transaction_date.is_none() {
            debug!("row {}: unparseable final transaction date {:?}", line + 1, final_cell);
            *bad_dates.entry("final transaction date").or_insert(0) += 1;
        }

        transactions.push(Transaction {
            transaction_type,
            donor,
            recipient,
            sector: columns
                .text(row, Field::Sector)
                .unwrap_or_else(|| "Unspecified".to_string()),
            flow_type: columns
                .text(row, Field::FlowType)
                .unwrap_or_else(|| "Unspecified".to_string()),
            project_id: columns.text(row, Field::ProjectId),
            project_title: columns
                .text(row, Field::ProjectTitle)
                .unwrap_or_else(|| "Untitled".to_string()),
            expected_start_date,
            completion_date,
            data_collection_date,
            final_transaction_date,
            value_usd_constant,
            extras: columns.extras.iter().map(|idx| row[*idx].clone()).collect(),
        });
    }

    report.kept_rows = transactions.len();
    report.date_warnings = bad_dates
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

    let extra_columns = columns
        .extras
        .iter()
        .map(|idx| raw.headers[*idx].clone())
        .collect();
    let has_project_id = columns.positions.contains_key(&Field::ProjectId);
    let table = NormalizedTable::new(raw.source, transactions, extra_columns, has_project_id);

    info!(
        "{}: {} rows read, {} kept, {} dropped, {} unreadable",
        table.source, report.total_rows, report.kept_rows, report.dropped_rows, report.unreadable_rows
    );
    for w in report.warnings() {
        warn!("{}: {}", table.source, w);
    }
    if report.invalid_values > 0 {
        warn!(
            "{}: {} transaction value(s) were not numeric and count as zero",
            table.source, report.invalid_values
        );
    }
    Ok((table, report))
}

pub fn load_and_clean(path: impl AsRef<Path>) -> Result<(NormalizedTable, LoadReport)> {
    normalize(read_raw_path(path)?)
}

/// Keeps each loaded table for the life of the process, keyed by source path.
///
/// Filter changes only ever hit the cache; the file is read and parsed once.
#[derive(Debug, Default)]
pub struct DatasetCache {
    entries: HashMap<PathBuf, (Arc<NormalizedTable>, LoadReport)>,
    /// Path as given by the caller → canonical key in `entries`.
    aliases: HashMap<PathBuf, PathBuf>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&mut self, path: impl AsRef<Path>) -> Result<(Arc<NormalizedTable>, &LoadReport)> {
        let given = path.as_ref().to_path_buf();
        let key = match self.aliases.get(&given) {
            Some(key) => {
                debug!("{}: served from cache", given.display());
                key.clone()
            }
            None => {
                let key = std::fs::canonicalize(&given).unwrap_or_else(|_| given.clone());
                if !self.entries.contains_key(&key) {
                    let (table, report) = load_and_clean(&given)?;
                    self.entries.insert(key.clone(), (Arc::new(table), report));
                }
                self.aliases.insert(given, key.clone());
                key
            }
        };
        let (table, report) = &self.entries[&key];
        Ok((Arc::clone(table), report))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
