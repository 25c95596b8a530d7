use crate::error::Warning;
use crate::filter::{apply, FilterSpec, FilteredView};
use crate::geo::{join, GeoJoin, GeoReference};
use crate::reports::{
    donor_totals, flow_type_totals, project_rollup, recipient_totals, sector_totals, stack,
    summary, yearly_by_flow_type, yearly_by_sector, yearly_totals, ProjectKey, StackedSeries,
};
use crate::types::{CategoryTotal, NormalizedTable, ProjectRow, RankedTotal, Summary, YearTotal};
use log::debug;
use once_cell::unsync::OnceCell;
use std::sync::Arc;

/// Every derived table for one filter specification.
#[derive(Debug, Clone)]
pub struct Views {
    pub summary: Summary,
    pub yearly: Vec<YearTotal>,
    pub yearly_by_flow_type: StackedSeries,
    pub yearly_by_sector: StackedSeries,
    pub sectors: Vec<CategoryTotal>,
    pub flow_types: Vec<CategoryTotal>,
    pub donors: Vec<RankedTotal>,
    pub recipients: Vec<RankedTotal>,
    pub projects: Vec<ProjectRow>,
    /// Present when the session has a geographic reference.
    pub geo: Option<GeoJoin>,
    pub warnings: Vec<Warning>,
}

impl Views {
    pub fn compute(view: &FilteredView, key: ProjectKey, geo: Option<&dyn GeoReference>) -> Self {
        let recipients = recipient_totals(view);
        let geo = geo.map(|reference| join(&recipients, reference));
        let mut warnings = view.warnings().to_vec();
        if let Some(g) = &geo {
            warnings.extend(g.misses.iter().cloned().map(Warning::JoinMiss));
        }
        Views {
            summary: summary(view, key),
            yearly: yearly_totals(view),
            yearly_by_flow_type: stack(&yearly_by_flow_type(view)),
            yearly_by_sector: stack(&yearly_by_sector(view)),
            sectors: sector_totals(view),
            flow_types: flow_type_totals(view),
            donors: donor_totals(view),
            recipients,
            projects: project_rollup(view, key),
            geo,
            warnings,
        }
    }
}

/// One user's filter state over a shared, read-only table.
///
/// Derived tables are computed on first access and reused until the filter
/// changes.
pub struct Session {
    table: Arc<NormalizedTable>,
    geo: Option<Arc<dyn GeoReference + Send + Sync>>,
    project_key: ProjectKey,
    spec: FilterSpec,
    views: OnceCell<Views>,
}

impl Session {
    pub fn new(table: Arc<NormalizedTable>, spec: FilterSpec) -> Self {
        Session {
            table,
            geo: None,
            project_key: ProjectKey::default(),
            spec,
            views: OnceCell::new(),
        }
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoReference + Send + Sync>) -> Self {
        self.geo = Some(geo);
        self.views = OnceCell::new();
        self
    }

    pub fn with_project_key(mut self, key: ProjectKey) -> Self {
        self.project_key = key;
        self.views = OnceCell::new();
        self
    }

    pub fn table(&self) -> &NormalizedTable {
        &self.table
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.spec
    }

    /// Replace the filter; cached views are dropped only if it changed.
    pub fn set_filter(&mut self, spec: FilterSpec) {
        if spec != self.spec {
            self.spec = spec;
            self.views = OnceCell::new();
        }
    }

    pub fn view(&self) -> FilteredView<'_> {
        apply(&self.table, &self.spec)
    }

    pub fn views(&self) -> &Views {
        self.views.get_or_init(|| {
            debug!("recomputing views for {:?}", self.spec);
            let view = self.view();
            let geo = self.geo.as_deref().map(|g| g as &dyn GeoReference);
            Views::compute(&view, self.project_key, geo)
        })
    }

    pub fn is_computed(&self) -> bool {
        self.views.get().is_some()
    }
}
