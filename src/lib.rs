//! Aggregation engine behind the Pacific Aid Map dashboard.
//!
//! The transaction table is loaded and normalized once ([`loader`]), each
//! user interaction projects it through a [`filter::FilterSpec`], and the
//! [`reports`] functions turn that projection into the tables the dashboard
//! draws. [`session::Session`] ties these together for one user.

pub mod config;
pub mod error;
pub mod filter;
pub mod geo;
pub mod loader;
pub mod output;
pub mod reports;
pub mod session;
pub mod types;
pub mod util;

pub use config::{DashboardConfig, GeoSource};
pub use error::{LoadError, Result, Warning};
pub use filter::{apply, FilterOptions, FilterSpec, FilteredView, SelectionMode};
pub use geo::{BoundaryReference, CoordinateReference, GeoJoin, GeoPoint, GeoReference};
pub use loader::{load_and_clean, normalize, read_raw, DatasetCache, LoadReport, RawTable};
pub use reports::{ProjectKey, StackedSeries};
pub use session::{Session, Views};
pub use types::{NormalizedTable, Transaction, TransactionType, YearRange};
