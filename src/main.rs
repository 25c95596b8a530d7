// Entry point and high-level CLI flow.
//
// The binary stands in for the dashboard's presentation layer:
// - the dataset is loaded and cleaned once, printing diagnostics,
// - flags become a filter specification,
// - every derived table is previewed as markdown and exported to CSV,
//   with a JSON summary alongside.
use clap::Parser;
use pacific_aid_map::output;
use pacific_aid_map::util;
use pacific_aid_map::{
    BoundaryReference, CoordinateReference, DashboardConfig, DatasetCache, FilterOptions,
    FilterSpec, GeoReference, GeoSource, LoadError, LoadReport, NormalizedTable, ProjectKey,
    SelectionMode, Session, TransactionType, YearRange,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "pacific-aid-map", about = "Aggregate views over the Pacific Aid Map transaction data.")]
struct Cli {
    /// JSON file with dashboard settings; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Transaction CSV
    #[arg(long)]
    data: Option<PathBuf>,
    /// CSV of recipient name, latitude and longitude for the map
    #[arg(long, conflicts_with = "boundaries")]
    coords: Option<PathBuf>,
    /// GeoJSON country boundaries for the map
    #[arg(long)]
    boundaries: Option<PathBuf>,
    /// Feature property holding the region name in --boundaries
    #[arg(long, default_value = "ADMIN")]
    name_property: String,
    /// Spent or Committed
    #[arg(long = "type", default_value = "Spent")]
    transaction_type: TransactionType,
    #[arg(long)]
    donor: Vec<String>,
    #[arg(long)]
    recipient: Vec<String>,
    #[arg(long)]
    sector: Vec<String>,
    #[arg(long = "aid-type")]
    aid_type: Vec<String>,
    /// First year (inclusive)
    #[arg(long)]
    from: Option<i32>,
    /// Last year (inclusive)
    #[arg(long)]
    to: Option<i32>,
    /// Use every year in the data instead of the default window
    #[arg(long, conflicts_with_all = ["from", "to"])]
    all_years: bool,
    /// Selection controls accept one value each
    #[arg(long)]
    single_select: bool,
    /// Group projects by title, donor and recipient even when ids exist
    #[arg(long)]
    composite_projects: bool,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Rows shown per table preview
    #[arg(long)]
    preview: Option<usize>,
    /// List the available filter values and exit
    #[arg(long)]
    options: bool,
}

fn build_config(cli: &Cli) -> Result<DashboardConfig, LoadError> {
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::from_json_path(path)?,
        None => DashboardConfig::default(),
    };
    if let Some(path) = &cli.data {
        config.data_path = path.clone();
    }
    if let Some(path) = &cli.coords {
        config.geo = Some(GeoSource::Coordinates { path: path.clone() });
    }
    if let Some(path) = &cli.boundaries {
        config.geo = Some(GeoSource::Boundaries {
            path: path.clone(),
            name_property: cli.name_property.clone(),
        });
    }
    if cli.single_select {
        config.selection = SelectionMode::Single;
    }
    if cli.composite_projects {
        config.project_key = ProjectKey::Composite;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(n) = cli.preview {
        config.preview_rows = n;
    }
    Ok(config)
}

fn build_filter(cli: &Cli, config: &DashboardConfig, table: &NormalizedTable) -> FilterSpec {
    let mut spec = FilterSpec::new(cli.transaction_type);
    spec.donors.extend(cli.donor.iter().cloned());
    spec.recipients.extend(cli.recipient.iter().cloned());
    spec.sectors.extend(cli.sector.iter().cloned());
    spec.flow_types.extend(cli.aid_type.iter().cloned());
    spec.year_range = if cli.all_years {
        None
    } else if cli.from.is_some() || cli.to.is_some() {
        let fallback = config.default_years.or(table.year_span);
        match (cli.from, cli.to, fallback) {
            (Some(a), Some(b), _) => Some(YearRange::new(a, b)),
            (Some(a), None, Some(r)) => Some(YearRange::new(a, r.max)),
            (None, Some(b), Some(r)) => Some(YearRange::new(r.min, b)),
            (Some(y), None, None) | (None, Some(y), None) => Some(YearRange::single(y)),
            (None, None, _) => None,
        }
    } else {
        config.starting_years(table.year_span)
    };
    spec.conform(config.selection)
}

fn load_geo(source: &GeoSource) -> Result<Arc<dyn GeoReference + Send + Sync>, LoadError> {
    let reference: Arc<dyn GeoReference + Send + Sync> = match source {
        GeoSource::Coordinates { path } => Arc::new(CoordinateReference::from_path(path)?),
        GeoSource::Boundaries { path, name_property } => {
            Arc::new(BoundaryReference::from_path(path, name_property)?)
        }
    };
    Ok(reference)
}

/// Print a short textual summary of what the load did.
fn print_load_report(report: &LoadReport) {
    println!(
        "Processing dataset... ({} rows read, {} kept)",
        util::format_int(report.total_rows as i64),
        util::format_int(report.kept_rows as i64)
    );
    if report.dropped_rows + report.unreadable_rows > 0 {
        println!(
            "Note: {} rows skipped (missing donor/recipient, unknown type or unreadable).",
            util::format_int((report.dropped_rows + report.unreadable_rows) as i64)
        );
    }
    for warning in report.warnings() {
        println!("Note: {}.", warning);
    }
    println!();
}

fn print_options(options: &FilterOptions) {
    let span = options
        .year_span
        .map(|r| r.to_string())
        .unwrap_or_else(|| "none".to_string());
    println!("Years: {}", span);
    for (label, values) in [
        ("Donors", &options.donors),
        ("Recipients", &options.recipients),
        ("Sectors", &options.sectors),
        ("Aid types", &options.flow_types),
    ] {
        println!("{} ({}):", label, values.len());
        for v in values {
            println!("  {}", v);
        }
    }
}

/// Preview every table, then export them all.
fn generate_reports(session: &Session, config: &DashboardConfig) {
    let kind = session.filter().transaction_type;
    let views = session.views();
    let n = config.preview_rows;
    let out = |name: &str| config.output_dir.join(name);
    let report = |result: Result<(), Box<dyn std::error::Error>>| {
        if let Err(e) = result {
            eprintln!("Write error: {}", e);
        }
    };

    for w in &views.warnings {
        if !matches!(w, pacific_aid_map::Warning::JoinMiss(_)) {
            println!("Note: {}.", w);
        }
    }
    println!(
        "{} total: {} across {} transactions\n",
        kind,
        util::humanize(views.summary.total_value),
        util::format_int(views.summary.transactions as i64)
    );
    if views.summary.transactions == 0 {
        println!("No transactions match these filters.\n");
    }

    output::preview_table(&format!("{} by year", kind), &views.yearly, n);
    report(output::write_csv(out("yearly.csv"), &views.yearly));

    output::preview_table(&format!("{} by year and aid type", kind), &views.yearly_by_flow_type.cells, n);
    report(output::write_stacked(out("yearly_by_aid_type.csv"), &views.yearly_by_flow_type));

    output::preview_table(&format!("{} by year and sector", kind), &views.yearly_by_sector.cells, n);
    report(output::write_stacked(out("yearly_by_sector.csv"), &views.yearly_by_sector));

    output::preview_table(&format!("{} by sector", kind), &views.sectors, n);
    report(output::write_csv(out("sectors.csv"), &views.sectors));

    output::preview_table(&format!("{} by aid type", kind), &views.flow_types, n);
    report(output::write_csv(out("aid_types.csv"), &views.flow_types));

    output::preview_table(&format!("{} by donor", kind), &views.donors, n);
    report(output::write_csv(out("donors.csv"), &views.donors));

    output::preview_table(&format!("{} by recipient", kind), &views.recipients, n);
    report(output::write_csv(out("recipients.csv"), &views.recipients));

    if let Some(geo) = &views.geo {
        output::preview_table(&format!("{} by recipient map", kind), &geo.points, n);
        if !geo.misses.is_empty() {
            println!("(Not on the map: {})\n", geo.misses.join(", "));
        }
        report(output::write_csv(out("geo.csv"), &geo.points));
    }

    output::preview_table(&format!("{} by project", kind), &views.projects, n);
    report(output::write_csv(out("projects.csv"), &views.projects));

    report(output::write_transactions(out("transactions.csv"), session.table(), &session.view()));
    report(output::write_json(out("summary.json"), &views.summary));
    println!("(Full tables exported to {})", config.output_dir.display());
}

fn run(cli: Cli) -> Result<(), LoadError> {
    let config = build_config(&cli)?;
    let mut cache = DatasetCache::new();
    let (table, load_report) = cache.get_or_load(&config.data_path)?;
    print_load_report(load_report);

    if cli.options {
        print_options(&FilterOptions::from_table(&table));
        return Ok(());
    }

    let spec = build_filter(&cli, &config, &table);
    let mut session = Session::new(table, spec).with_project_key(config.project_key);
    if let Some(source) = &config.geo {
        session = session.with_geo(load_geo(source)?);
    }
    generate_reports(&session, &config);
    Ok(())
}

fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
