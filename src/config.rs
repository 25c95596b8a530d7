use crate::error::Result;
use crate::filter::SelectionMode;
use crate::geo::DEFAULT_NAME_PROPERTY;
use crate::reports::ProjectKey;
use crate::types::YearRange;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Where the geographic view gets its positions from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum GeoSource {
    /// CSV of recipient name, latitude, longitude.
    Coordinates { path: PathBuf },
    /// GeoJSON FeatureCollection matched on `name_property`.
    Boundaries {
        path: PathBuf,
        #[serde(default = "default_name_property")]
        name_property: String,
    },
}

fn default_name_property() -> String {
    DEFAULT_NAME_PROPERTY.to_string()
}

/// Composition-time settings for one dashboard variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub data_path: PathBuf,
    pub geo: Option<GeoSource>,
    pub selection: SelectionMode,
    pub project_key: ProjectKey,
    /// Year window the controls start on; `None` means the full span.
    pub default_years: Option<YearRange>,
    pub preview_rows: usize,
    pub output_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            data_path: PathBuf::from("Pacific_Aid_Map_Database.csv"),
            geo: None,
            selection: SelectionMode::Multi,
            project_key: ProjectKey::Auto,
            default_years: Some(YearRange::new(2008, 2021)),
            preview_rows: 10,
            output_dir: PathBuf::from("."),
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// The default window narrowed to the years the data actually covers.
    ///
    /// A default that misses the data entirely is kept as is, so the empty
    /// result still reports the adjustment.
    pub fn starting_years(&self, span: Option<YearRange>) -> Option<YearRange> {
        match (self.default_years, span) {
            (Some(window), Some(span)) => Some(window.clamp_to(span).unwrap_or(window)),
            (window, _) => window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_dashboard() {
        let config = DashboardConfig::default();
        assert_eq!(config.default_years, Some(YearRange::new(2008, 2021)));
        assert_eq!(config.selection, SelectionMode::Multi);
        assert_eq!(config.project_key, ProjectKey::Auto);
        assert!(config.geo.is_none());
    }

    #[test]
    fn default_window_narrows_to_observed_years() {
        let config = DashboardConfig::default();
        assert_eq!(
            config.starting_years(Some(YearRange::new(2012, 2016))),
            Some(YearRange::new(2012, 2016))
        );
        assert_eq!(
            config.starting_years(Some(YearRange::new(2015, 2024))),
            Some(YearRange::new(2015, 2021))
        );
        assert_eq!(
            config.starting_years(Some(YearRange::new(1990, 1995))),
            Some(YearRange::new(2008, 2021))
        );
        assert_eq!(config.starting_years(None), Some(YearRange::new(2008, 2021)));

        let full_span = DashboardConfig {
            default_years: None,
            ..DashboardConfig::default()
        };
        assert_eq!(full_span.starting_years(Some(YearRange::new(2012, 2016))), None);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config = DashboardConfig::from_json_str(
            r#"{
                "data_path": "aid.csv",
                "selection": "single",
                "project_key": "composite",
                "default_years": null,
                "geo": {"kind": "boundaries", "path": "countries.geojson"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.data_path, PathBuf::from("aid.csv"));
        assert_eq!(config.selection, SelectionMode::Single);
        assert_eq!(config.project_key, ProjectKey::Composite);
        assert_eq!(config.default_years, None);
        assert_eq!(config.preview_rows, 10);
        assert_eq!(
            config.geo,
            Some(GeoSource::Boundaries {
                path: PathBuf::from("countries.geojson"),
                name_property: "ADMIN".to_string(),
            })
        );
    }
}
