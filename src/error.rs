use crate::types::YearRange;
use thiserror::Error;

/// Fatal problems while loading the transaction table or a geo reference.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{source_name} is missing required column(s): {}", .columns.join(", "))]
    MissingColumns {
        source_name: String,
        columns: Vec<String>,
    },

    #[error("{0} has no header row")]
    Empty(String),

    #[error("Invalid GeoJSON: {0}")]
    GeoJson(String),
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// Conditions that are absorbed locally and only reported alongside results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Warning {
    #[error("{count} value(s) in column '{column}' could not be read as dates")]
    DateParse { column: String, count: usize },

    #[error("year range {requested} adjusted to {}", describe_range(.effective))]
    FilterClamped {
        requested: YearRange,
        effective: Option<YearRange>,
    },

    #[error("no geographic match for recipient '{0}'")]
    JoinMiss(String),
}

fn describe_range(range: &Option<YearRange>) -> String {
    match range {
        Some(r) => r.to_string(),
        None => "an empty range".to_string(),
    }
}
