use crate::filter::FilteredView;
use crate::types::{
    CategoryTotal, ProjectRow, RankedTotal, Summary, Transaction, YearCategoryTotal, YearTotal,
};
use crate::util::Total;
use chrono::{Datelike, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

pub fn yearly_totals(view: &FilteredView) -> Vec<YearTotal> {
    let mut map: BTreeMap<i32, Total> = BTreeMap::new();
    for r in view.iter() {
        if let Some(year) = r.year() {
            map.entry(year).or_default().add(r.value_usd_constant);
        }
    }
    map.into_iter()
        .map(|(year, total)| YearTotal {
            year,
            value: total.value(),
        })
        .collect()
}

fn yearly_by(view: &FilteredView, category: impl Fn(&Transaction) -> &str) -> Vec<YearCategoryTotal> {
    let mut map: BTreeMap<(i32, &str), Total> = BTreeMap::new();
    for r in view.iter() {
        if let Some(year) = r.year() {
            map.entry((year, category(r)))
                .or_default()
                .add(r.value_usd_constant);
        }
    }
    map.into_iter()
        .map(|((year, category), total)| YearCategoryTotal {
            year,
            category: category.to_string(),
            value: total.value(),
        })
        .collect()
}

/// Sparse (year, flow type) sums, ordered by year then flow type.
pub fn yearly_by_flow_type(view: &FilteredView) -> Vec<YearCategoryTotal> {
    yearly_by(view, |r| r.flow_type.as_str())
}

/// Sparse (year, sector) sums, ordered by year then sector.
pub fn yearly_by_sector(view: &FilteredView) -> Vec<YearCategoryTotal> {
    yearly_by(view, |r| r.sector.as_str())
}

/// Zero-filled year × category grid for stacked bars.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StackedSeries {
    pub years: Vec<i32>,
    pub categories: Vec<String>,
    /// Exactly `years.len() * categories.len()` cells, year-major.
    pub cells: Vec<YearCategoryTotal>,
}

impl StackedSeries {
    pub fn value(&self, year: i32, category: &str) -> Option<f64> {
        let y = self.years.binary_search(&year).ok()?;
        let c = self
            .categories
            .binary_search_by(|c| c.as_str().cmp(category))
            .ok()?;
        self.cells.get(y * self.categories.len() + c).map(|cell| cell.value)
    }

    /// One row per year with a value per category, in `categories` order.
    pub fn wide_rows(&self) -> Vec<(i32, Vec<f64>)> {
        let width = self.categories.len();
        self.years
            .iter()
            .enumerate()
            .map(|(i, year)| {
                let values = self.cells[i * width..(i + 1) * width]
                    .iter()
                    .map(|c| c.value)
                    .collect();
                (*year, values)
            })
            .collect()
    }
}

/// Expand sparse long-form sums over every observed year and category.
pub fn stack(long: &[YearCategoryTotal]) -> StackedSeries {
    let years: Vec<i32> = long.iter().map(|r| r.year).collect::<BTreeSet<_>>().into_iter().collect();
    let categories: Vec<String> = long
        .iter()
        .map(|r| r.category.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut present: HashMap<(i32, &str), Total> = HashMap::new();
    for r in long {
        present.entry((r.year, r.category.as_str())).or_default().add(r.value);
    }
    let mut cells = Vec::with_capacity(years.len() * categories.len());
    for year in &years {
        for category in &categories {
            cells.push(YearCategoryTotal {
                year: *year,
                category: category.clone(),
                value: present
                    .get(&(*year, category.as_str()))
                    .map(Total::value)
                    .unwrap_or(0.0),
            });
        }
    }
    StackedSeries {
        years,
        categories,
        cells,
    }
}

fn category_totals(view: &FilteredView, category: impl Fn(&Transaction) -> &str) -> Vec<CategoryTotal> {
    let mut map: BTreeMap<&str, Total> = BTreeMap::new();
    for r in view.iter() {
        map.entry(category(r)).or_default().add(r.value_usd_constant);
    }
    map.into_iter()
        .map(|(category, total)| CategoryTotal {
            category: category.to_string(),
            value: total.value(),
        })
        .collect()
}

pub fn sector_totals(view: &FilteredView) -> Vec<CategoryTotal> {
    category_totals(view, |r| r.sector.as_str())
}

pub fn flow_type_totals(view: &FilteredView) -> Vec<CategoryTotal> {
    category_totals(view, |r| r.flow_type.as_str())
}

/// Group rows in first-encounter order so a stable sort breaks ties by encounter.
fn encounter_groups<'a, K>(
    view: &FilteredView<'a>,
    key: impl Fn(&'a Transaction) -> K,
) -> Vec<Vec<&'a Transaction>>
where
    K: Hash + Eq,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Vec<&'a Transaction>> = Vec::new();
    for r in view.iter() {
        let slot = *index.entry(key(r)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(r);
    }
    groups
}

fn group_total(rows: &[&Transaction]) -> Total {
    rows.iter().map(|r| r.value_usd_constant).collect()
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn ranked_totals(view: &FilteredView, name: impl Fn(&Transaction) -> &str) -> Vec<RankedTotal> {
    let mut groups: Vec<(&str, f64)> = encounter_groups(view, |r| name(r))
        .into_iter()
        .map(|rows| (name(rows[0]), group_total(&rows).value()))
        .collect();
    groups.sort_by(|a, b| descending(a.1, b.1));
    groups
        .into_iter()
        .enumerate()
        .map(|(idx, (name, value))| RankedTotal {
            rank: idx + 1,
            name: name.to_string(),
            value,
        })
        .collect()
}

/// Donors by total value, largest first.
pub fn donor_totals(view: &FilteredView) -> Vec<RankedTotal> {
    ranked_totals(view, |r| r.donor.as_str())
}

/// Recipients by total value, largest first.
pub fn recipient_totals(view: &FilteredView) -> Vec<RankedTotal> {
    ranked_totals(view, |r| r.recipient.as_str())
}

/// How transactions are grouped into projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKey {
    /// Project identifier where the row has one, else title/donor/recipient.
    #[default]
    Auto,
    /// Always title/donor/recipient.
    Composite,
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum GroupKey<'a> {
    Id(&'a str),
    Composite(&'a str, &'a str, &'a str),
}

fn group_key(r: &Transaction, key: ProjectKey) -> GroupKey<'_> {
    match (key, r.project_id.as_deref()) {
        (ProjectKey::Auto, Some(id)) => GroupKey::Id(id),
        _ => GroupKey::Composite(&r.project_title, &r.donor, &r.recipient),
    }
}

/// Roll transactions up into projects, largest first.
///
/// Donor, recipient and title come from the first row of each group; the
/// dates are the first non-missing ones, reduced to years. Groups whose rows
/// disagree on those attributes are flagged, not corrected.
pub fn project_rollup(view: &FilteredView, key: ProjectKey) -> Vec<ProjectRow> {
    let mut rows: Vec<ProjectRow> = encounter_groups(view, |r| group_key(r, key))
        .into_iter()
        .map(|group| rollup_group(&group, key))
        .collect();
    let mixed = rows.iter().filter(|r| r.mixed_attributes).count();
    if mixed > 0 {
        debug!("{} project group(s) have rows that disagree on donor, recipient or dates", mixed);
    }
    rows.sort_by(|a, b| descending(a.value, b.value));
    rows
}

fn rollup_group(group: &[&Transaction], key: ProjectKey) -> ProjectRow {
    let first = group[0];
    let start = group.iter().find_map(|r| r.expected_start_date);
    let completion = group.iter().find_map(|r| r.completion_date);
    let agrees = |seen: Option<NaiveDate>, date: Option<NaiveDate>| date.is_none() || date == seen;
    let mixed_attributes = group.iter().any(|r| {
        r.donor != first.donor
            || r.recipient != first.recipient
            || !agrees(start, r.expected_start_date)
            || !agrees(completion, r.completion_date)
    });
    ProjectRow {
        project_id: first.project_id.clone().filter(|_| key == ProjectKey::Auto),
        title: first.project_title.clone(),
        donor: first.donor.clone(),
        recipient: first.recipient.clone(),
        start_year: start.map(|d| d.year()),
        completion_year: completion.map(|d| d.year()),
        transactions: group.len(),
        mixed_attributes,
        value: group_total(group).value(),
    }
}

pub fn summary(view: &FilteredView, key: ProjectKey) -> Summary {
    let donors: HashSet<&str> = view.iter().map(|r| r.donor.as_str()).collect();
    let recipients: HashSet<&str> = view.iter().map(|r| r.recipient.as_str()).collect();
    let projects: HashSet<GroupKey> = view.iter().map(|r| group_key(r, key)).collect();
    let years: Vec<i32> = view.iter().filter_map(Transaction::year).collect();
    Summary {
        transaction_type: view.transaction_type(),
        transactions: view.len(),
        total_value: view.total(),
        donors: donors.len(),
        recipients: recipients.len(),
        projects: projects.len(),
        first_year: years.iter().min().copied(),
        last_year: years.iter().max().copied(),
    }
}
