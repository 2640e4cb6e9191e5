//! Application configuration
//!
//! Datasets are described in a JSON file (`~/.claimdash/config.json` unless a
//! path is given). Without one, the built-in presets for the standard claims
//! extracts are used.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{
    CardSpec, ChartKind, ChartSpec, ColumnRef, DashError, DatasetSpec, MetricColumn, MetricSet,
    RatioMetric, Result, SourceSpec, ValueFormat,
};

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "CLAIMDASH_DATA_DIR";

const DEFAULT_DATA_DIR: &str = "assets";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory source paths are resolved against
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Dataset opened first; defaults to the first one listed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<String>,
    pub datasets: Vec<DatasetSpec>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_dataset: Some("claims".to_string()),
            datasets: presets::all(),
        }
    }
}

impl AppConfig {
    /// Default config file location (`~/.claimdash/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|d| d.home_dir().join(".claimdash").join("config.json"))
    }

    /// Load from `path`, else the default location, else the presets.
    /// An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => {
                    debug!("no config file, using built-in presets");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DashError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| DashError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), datasets = config.datasets.len(), "loaded config file");
        Ok(config)
    }

    /// Apply `--data-dir` or `CLAIMDASH_DATA_DIR`; the flag wins
    pub fn with_data_dir_override(mut self, flag: Option<PathBuf>) -> Self {
        if let Some(dir) = flag.or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from)) {
            self.data_dir = dir;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(DashError::Config("no datasets configured".into()));
        }
        let mut names = HashSet::new();
        for dataset in &self.datasets {
            if !names.insert(dataset.name.as_str()) {
                return Err(DashError::Config(format!(
                    "dataset '{}' is defined twice",
                    dataset.name
                )));
            }
            dataset.validate()?;
        }
        if let Some(name) = &self.default_dataset {
            self.dataset(name)?;
        }
        Ok(())
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetSpec> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| DashError::UnknownDataset(name.to_string()))
    }

    /// Dataset selected by name, or the default one
    pub fn dataset_or_default(&self, name: Option<&str>) -> Result<&DatasetSpec> {
        match name.or(self.default_dataset.as_deref()) {
            Some(n) => self.dataset(n),
            None => self
                .datasets
                .first()
                .ok_or_else(|| DashError::Config("no datasets configured".into())),
        }
    }

    /// Position of the default dataset in `datasets`
    pub fn default_index(&self) -> usize {
        self.default_dataset
            .as_deref()
            .and_then(|name| self.datasets.iter().position(|d| d.name == name))
            .unwrap_or(0)
    }
}

/// Built-in dataset definitions for the standard extracts
pub mod presets {
    use super::*;

    pub fn all() -> Vec<DatasetSpec> {
        vec![
            claims(),
            claim_sources(),
            injuries(),
            tariff("tariff", "oic_tariff.csv", "representation_status", "Representation"),
            tariff("tariff_injury", "oic_tariff_injury.csv", "injury_type", "Injury type"),
            portal(),
        ]
    }

    fn settlement_metrics() -> MetricSet {
        MetricSet {
            metrics: vec![
                MetricColumn::count(ColumnRef::with_aliases("claims_volume", &["new_claims"])),
                MetricColumn::count(ColumnRef::with_aliases(
                    "settlement_volume",
                    &["settled_volume"],
                )),
                MetricColumn::amount(ColumnRef::with_aliases(
                    "total_settlement_value",
                    &["settlement_value"],
                )),
            ],
            ratios: vec![RatioMetric::new(
                "weighted_avg_settlement",
                "total_settlement_value",
                "settlement_volume",
            )],
        }
    }

    fn settlement_cards() -> Vec<CardSpec> {
        vec![
            CardSpec::new("claims_volume", "Total Claims", ValueFormat::Count),
            CardSpec::new("settlement_volume", "Total Settled Claims", ValueFormat::Count),
            CardSpec::new("total_settlement_value", "Total Settlement Value", ValueFormat::Money),
            CardSpec::new(
                "weighted_avg_settlement",
                "Average Settlement Amount",
                ValueFormat::MoneyPrecise,
            ),
        ]
    }

    fn settlement_charts() -> Vec<ChartSpec> {
        vec![
            ChartSpec::new("claims_volume", "New Claims Over Time", ChartKind::Line),
            ChartSpec::new("settlement_volume", "Settled Claims Over Time", ChartKind::Line),
            ChartSpec::new(
                "total_settlement_value",
                "Total Settlement Value Over Time",
                ChartKind::Line,
            ),
            ChartSpec::new(
                "weighted_avg_settlement",
                "Average Settlement Amount Over Time",
                ChartKind::Line,
            ),
        ]
    }

    fn year_month() -> ColumnRef {
        ColumnRef::with_aliases("year_month", &["period", "month"])
    }

    pub fn claims() -> DatasetSpec {
        DatasetSpec {
            name: "claims".into(),
            title: "OIC Portal Dashboard".into(),
            sources: vec![SourceSpec::new("oic_dashboard.csv")],
            period_column: year_month(),
            category_column: Some(ColumnRef::new("representation_status")),
            category_label: "Representation".into(),
            metric_set: settlement_metrics(),
            cards: settlement_cards(),
            charts: settlement_charts(),
        }
    }

    pub fn claim_sources() -> DatasetSpec {
        DatasetSpec {
            name: "claim_sources".into(),
            title: "Claims by Source".into(),
            sources: vec![SourceSpec::new("oic_claim_sources.csv")],
            period_column: year_month(),
            category_column: Some(ColumnRef::with_aliases("claim_source", &["source"])),
            category_label: "Claim source".into(),
            metric_set: MetricSet {
                metrics: vec![MetricColumn::count(ColumnRef::with_aliases(
                    "claims_volume",
                    &["new_claims"],
                ))],
                ratios: Vec::new(),
            },
            cards: vec![CardSpec::new("claims_volume", "Total Claims", ValueFormat::Count)],
            charts: vec![
                ChartSpec::new("claims_volume", "Claims by Source", ChartKind::StackedBar),
                ChartSpec::new(
                    "claims_volume",
                    "Share of Claims by Source",
                    ChartKind::PercentStackedBar,
                ),
            ],
        }
    }

    pub fn injuries() -> DatasetSpec {
        let mut metric_set = settlement_metrics();
        metric_set
            .metrics
            .push(MetricColumn::amount(ColumnRef::new("general_damages")).optional());
        DatasetSpec {
            name: "injuries".into(),
            title: "Injury Types".into(),
            sources: vec![SourceSpec::new("oic_injury_types.csv")],
            period_column: year_month(),
            category_column: Some(ColumnRef::with_aliases("injury_type", &["injury"])),
            category_label: "Injury type".into(),
            metric_set,
            cards: settlement_cards(),
            charts: vec![
                ChartSpec::new("claims_volume", "Claims by Injury Type", ChartKind::StackedBar),
                ChartSpec::new(
                    "claims_volume",
                    "Share of Claims by Injury Type",
                    ChartKind::PercentStackedBar,
                ),
                ChartSpec::new(
                    "weighted_avg_settlement",
                    "Average Settlement by Injury Type",
                    ChartKind::Line,
                ),
                ChartSpec::new("general_damages", "General Damages", ChartKind::Line),
            ],
        }
    }

    pub fn tariff(name: &str, file: &str, category: &str, category_label: &str) -> DatasetSpec {
        DatasetSpec {
            name: name.into(),
            title: format!("Tariff Breakdown ({})", category_label),
            sources: vec![SourceSpec::new(file)],
            period_column: year_month(),
            category_column: Some(ColumnRef::new(category)),
            category_label: category_label.into(),
            metric_set: MetricSet {
                metrics: vec![
                    MetricColumn::count(ColumnRef::new("tariff_volume")),
                    MetricColumn::count(ColumnRef::new("non_tariff_volume")),
                    MetricColumn::count(ColumnRef::with_aliases(
                        "tariff_uplift_volume",
                        &["tariff_plus_uplift_volume"],
                    )),
                    MetricColumn::average(ColumnRef::new("tariff_average"), "tariff_volume"),
                    MetricColumn::average(ColumnRef::new("non_tariff_average"), "non_tariff_volume"),
                    MetricColumn::average(
                        ColumnRef::with_aliases(
                            "tariff_uplift_average",
                            &["tariff_plus_uplift_average"],
                        ),
                        "tariff_uplift_volume",
                    ),
                ],
                ratios: Vec::new(),
            },
            cards: vec![
                CardSpec::new("tariff_volume", "Tariff Settlements", ValueFormat::Count),
                CardSpec::new("non_tariff_volume", "Non-tariff Settlements", ValueFormat::Count),
                CardSpec::new("tariff_uplift_volume", "Tariff + Uplift", ValueFormat::Count),
                CardSpec::new("tariff_average", "Average Tariff", ValueFormat::MoneyPrecise),
            ],
            charts: vec![
                ChartSpec::new("tariff_volume", "Tariff Volume", ChartKind::StackedBar),
                ChartSpec::new("non_tariff_volume", "Non-tariff Volume", ChartKind::StackedBar),
                ChartSpec::new("tariff_average", "Average Tariff Settlement", ChartKind::Line),
                ChartSpec::new(
                    "tariff_uplift_average",
                    "Average Tariff + Uplift Settlement",
                    ChartKind::Line,
                ),
            ],
        }
    }

    pub fn portal() -> DatasetSpec {
        DatasetSpec {
            name: "portal".into(),
            title: "Portal by Line of Business".into(),
            sources: vec![
                SourceSpec::tagged("portal_el.csv", "Employer Liability"),
                SourceSpec::tagged("portal_pl.csv", "Public Liability"),
                SourceSpec::tagged("portal_motor.csv", "Motor"),
            ],
            period_column: ColumnRef::with_aliases("period", &["month", "year_month"]),
            category_column: None,
            category_label: "Line of business".into(),
            metric_set: MetricSet {
                metrics: vec![
                    MetricColumn::count(ColumnRef::with_aliases("new_claim", &["new_claims"])),
                    MetricColumn::count(ColumnRef::with_aliases("stage1_exit", &["stage_1_exit"])),
                    MetricColumn::count(ColumnRef::with_aliases("stage2_exit", &["stage_2_exit"]))
                        .optional(),
                    MetricColumn::count(ColumnRef::with_aliases(
                        "exit_court",
                        &["exit_to_court", "court_exit"],
                    )),
                    MetricColumn::count(ColumnRef::with_aliases(
                        "settled_claims",
                        &["settled", "settlements"],
                    )),
                    MetricColumn::average(
                        ColumnRef::with_aliases("average_settlement", &["avg_settlement"]),
                        "settled_claims",
                    )
                    .optional(),
                ],
                ratios: vec![RatioMetric::percentage(
                    "litigation_percentage",
                    "exit_court",
                    &["settled_claims", "exit_court"],
                )],
            },
            cards: vec![
                CardSpec::new("new_claim", "New Claims", ValueFormat::Count),
                CardSpec::new("settled_claims", "Settled Claims", ValueFormat::Count),
                CardSpec::new("exit_court", "Exited to Court", ValueFormat::Count),
                CardSpec::new("litigation_percentage", "Litigation Rate", ValueFormat::Percent),
            ],
            charts: vec![
                ChartSpec::new("new_claim", "New Claims", ChartKind::Line),
                ChartSpec::new("settled_claims", "Settled Claims", ChartKind::StackedBar),
                ChartSpec::new("litigation_percentage", "Litigation Percentage", ChartKind::Line),
                ChartSpec::new("average_settlement", "Average Settlement", ChartKind::Line),
                ChartSpec::new("stage1_exit", "Stage 1 Exits", ChartKind::StackedBar),
                ChartSpec::new("exit_court", "Exits to Court", ChartKind::StackedBar),
            ],
        }
    }
}
