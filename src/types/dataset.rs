//! Dataset definitions: where the CSV extracts live, how their columns map to
//! canonical metrics, and which ratios and charts are derived from them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{DashError, Result};

/// A column and the historical header names it has appeared under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl ColumnRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Canonical name first, then aliases
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// How a metric is stored and combined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricKind {
    /// Integer count, summed
    Count,
    /// Decimal amount (money), summed
    Amount,
    /// Decimal mean, combined as a mean weighted by the named count metric
    Average { weight: String },
}

/// A metric column of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricColumn {
    #[serde(flatten)]
    pub column: ColumnRef,
    #[serde(flatten)]
    pub kind: MetricKind,
    /// Missing required columns fail the load; missing optional ones read as 0
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl MetricColumn {
    pub fn count(column: ColumnRef) -> Self {
        Self {
            column,
            kind: MetricKind::Count,
            required: true,
        }
    }

    pub fn amount(column: ColumnRef) -> Self {
        Self {
            column,
            kind: MetricKind::Amount,
            required: true,
        }
    }

    pub fn average(column: ColumnRef, weight: &str) -> Self {
        Self {
            column,
            kind: MetricKind::Average {
                weight: weight.to_string(),
            },
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.column.name
    }
}

/// A ratio derived after aggregation: `scale * sum(numerator) / sum(denominator)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioMetric {
    pub name: String,
    pub numerator: Vec<String>,
    pub denominator: Vec<String>,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl RatioMetric {
    pub fn new(name: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            name: name.to_string(),
            numerator: vec![numerator.to_string()],
            denominator: vec![denominator.to_string()],
            scale: 1.0,
        }
    }

    /// Ratio expressed in percent, with a denominator summed over several metrics
    pub fn percentage(name: &str, numerator: &str, denominator: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            numerator: vec![numerator.to_string()],
            denominator: denominator.iter().map(|d| d.to_string()).collect(),
            scale: 100.0,
        }
    }

    /// Evaluate against already-summed metric values.
    /// A zero (or negative) denominator yields exactly 0.
    pub fn evaluate(&self, value_of: impl Fn(&str) -> f64) -> f64 {
        let numerator: f64 = self.numerator.iter().map(|m| value_of(m)).sum();
        let denominator: f64 = self.denominator.iter().map(|m| value_of(m)).sum();
        if denominator > 0.0 {
            self.scale * numerator / denominator
        } else {
            0.0
        }
    }
}

/// Metric registry shared by the loader and the aggregator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSet {
    pub metrics: Vec<MetricColumn>,
    #[serde(default)]
    pub ratios: Vec<RatioMetric>,
}

impl MetricSet {
    pub fn count_names(&self) -> impl Iterator<Item = &str> {
        self.metrics
            .iter()
            .filter(|m| m.kind == MetricKind::Count)
            .map(MetricColumn::name)
    }

    pub fn amount_names(&self) -> impl Iterator<Item = &str> {
        self.metrics
            .iter()
            .filter(|m| m.kind == MetricKind::Amount)
            .map(MetricColumn::name)
    }

    /// `(average metric, weight metric)` pairs
    pub fn averages(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metrics.iter().filter_map(|m| match &m.kind {
            MetricKind::Average { weight } => Some((m.name(), weight.as_str())),
            _ => None,
        })
    }

    pub fn get(&self, name: &str) -> Option<&MetricColumn> {
        self.metrics.iter().find(|m| m.name() == name)
    }

    /// Whether `name` is a metric or a ratio
    pub fn knows(&self, name: &str) -> bool {
        self.get(name).is_some() || self.ratios.iter().any(|r| r.name == name)
    }

    pub fn validate(&self, dataset: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for name in self
            .metrics
            .iter()
            .map(MetricColumn::name)
            .chain(self.ratios.iter().map(|r| r.name.as_str()))
        {
            if !seen.insert(name) {
                return Err(DashError::Config(format!(
                    "{}: metric '{}' is declared twice",
                    dataset, name
                )));
            }
        }

        for (avg, weight) in self.averages() {
            match self.get(weight) {
                Some(m) if m.kind == MetricKind::Count => {}
                _ => {
                    return Err(DashError::Config(format!(
                        "{}: average '{}' must be weighted by a count metric, got '{}'",
                        dataset, avg, weight
                    )))
                }
            }
        }

        for ratio in &self.ratios {
            if ratio.numerator.is_empty() || ratio.denominator.is_empty() {
                return Err(DashError::Config(format!(
                    "{}: ratio '{}' needs a numerator and a denominator",
                    dataset, ratio.name
                )));
            }
            for part in ratio.numerator.iter().chain(&ratio.denominator) {
                if self.get(part).is_none() {
                    return Err(DashError::Config(format!(
                        "{}: ratio '{}' refers to unknown metric '{}'",
                        dataset, ratio.name, part
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Chart kind hint handed to the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[default]
    Line,
    StackedBar,
    PercentStackedBar,
}

impl ChartKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::StackedBar => "stacked bar",
            Self::PercentStackedBar => "% stacked bar",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub metric: String,
    pub title: String,
    #[serde(default)]
    pub kind: ChartKind,
}

impl ChartSpec {
    pub fn new(metric: &str, title: &str, kind: ChartKind) -> Self {
        Self {
            metric: metric.to_string(),
            title: title.to_string(),
            kind,
        }
    }
}

/// Display format of a summary value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    #[default]
    Count,
    /// Pounds, no decimals
    Money,
    /// Pounds, two decimals
    MoneyPrecise,
    Percent,
}

impl ValueFormat {
    /// Render a value for display, e.g. `1,234`, `£12,500`, `£812.50`, `12.3%`
    pub fn format(self, value: f64) -> String {
        match self {
            Self::Count => format_grouped(value.round() as i64),
            Self::Money => format!("£{}", format_grouped(value.round() as i64)),
            Self::MoneyPrecise => {
                let pence = (value * 100.0).round() as i64;
                format!("£{}.{:02}", format_grouped(pence / 100), (pence % 100).abs())
            }
            Self::Percent => format!("{:.1}%", value),
        }
    }
}

/// Thousands-separated integer
pub fn format_grouped(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let len = digits.len();
    let mut result = String::with_capacity(len + len / 3 + 1);
    if n < 0 {
        result.push('-');
    }
    // Digits are ASCII, so byte indexing is safe
    for (i, ch) in digits.bytes().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(ch as char);
    }
    result
}

/// A headline metric shown in the summary strip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSpec {
    pub metric: String,
    pub title: String,
    #[serde(default)]
    pub format: ValueFormat,
}

impl CardSpec {
    pub fn new(metric: &str, title: &str, format: ValueFormat) -> Self {
        Self {
            metric: metric.to_string(),
            title: title.to_string(),
            format,
        }
    }
}

/// One CSV file (or glob of files) feeding a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Path or glob pattern, relative to the data directory
    pub path: String,
    /// Category label stamped on every row of this source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl SourceSpec {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            category: None,
        }
    }

    pub fn tagged(path: &str, category: &str) -> Self {
        Self {
            path: path.to_string(),
            category: Some(category.to_string()),
        }
    }
}

/// A dataset family: its sources, column mapping, metrics and charts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    pub title: String,
    pub sources: Vec<SourceSpec>,
    pub period_column: ColumnRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_column: Option<ColumnRef>,
    /// Label for the category dimension in legends, e.g. "Representation"
    #[serde(default = "default_category_label")]
    pub category_label: String,
    #[serde(flatten)]
    pub metric_set: MetricSet,
    #[serde(default)]
    pub cards: Vec<CardSpec>,
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
}

fn default_category_label() -> String {
    "Category".to_string()
}

impl DatasetSpec {
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(DashError::Config(format!("{}: no sources", self.name)));
        }
        self.metric_set.validate(&self.name)?;

        let referenced = self
            .cards
            .iter()
            .map(|c| c.metric.as_str())
            .chain(self.charts.iter().map(|c| c.metric.as_str()));
        for metric in referenced {
            if !self.metric_set.knows(metric) {
                return Err(DashError::Config(format!(
                    "{}: '{}' is displayed but never defined",
                    self.name, metric
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settlement_set() -> MetricSet {
        MetricSet {
            metrics: vec![
                MetricColumn::count(ColumnRef::new("settlement_volume")),
                MetricColumn::amount(ColumnRef::new("total_settlement_value")),
            ],
            ratios: vec![RatioMetric::new(
                "weighted_avg_settlement",
                "total_settlement_value",
                "settlement_volume",
            )],
        }
    }

    // ========== RatioMetric ==========

    #[test]
    fn test_ratio_evaluate() {
        let values: HashMap<&str, f64> =
            [("total_settlement_value", 500.0), ("settlement_volume", 5.0)].into();
        let ratio = RatioMetric::new(
            "weighted_avg_settlement",
            "total_settlement_value",
            "settlement_volume",
        );
        let v = ratio.evaluate(|m| values.get(m).copied().unwrap_or(0.0));
        assert!((v - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ratio_zero_denominator_is_zero() {
        let ratio = RatioMetric::new("r", "a", "b");
        let v = ratio.evaluate(|m| if m == "a" { 10.0 } else { 0.0 });
        assert_eq!(v, 0.0);
        assert!(!v.is_nan());
    }

    #[test]
    fn test_percentage_sums_denominator() {
        let ratio = RatioMetric::percentage(
            "litigation_percentage",
            "exit_court",
            &["settled_claims", "exit_court"],
        );
        let v = ratio.evaluate(|m| match m {
            "exit_court" => 25.0,
            "settled_claims" => 75.0,
            _ => 0.0,
        });
        assert!((v - 25.0).abs() < 1e-9);
    }

    // ========== Validation ==========

    #[test]
    fn test_validate_ok() {
        assert!(settlement_set().validate("claims").is_ok());
    }

    #[test]
    fn test_validate_unknown_ratio_part() {
        let mut set = settlement_set();
        set.ratios.push(RatioMetric::new("bad", "nope", "settlement_volume"));
        let err = set.validate("claims").unwrap_err();
        assert!(err.to_string().contains("unknown metric 'nope'"));
    }

    #[test]
    fn test_validate_average_needs_count_weight() {
        let mut set = settlement_set();
        set.metrics.push(MetricColumn::average(
            ColumnRef::new("average_settlement"),
            "total_settlement_value",
        ));
        assert!(set.validate("portal").is_err());
    }

    #[test]
    fn test_validate_duplicate_name() {
        let mut set = settlement_set();
        set.metrics
            .push(MetricColumn::count(ColumnRef::new("settlement_volume")));
        assert!(set.validate("claims").is_err());
    }

    // ========== Formatting ==========

    #[test]
    fn test_format_grouped() {
        assert_eq!(format_grouped(0), "0");
        assert_eq!(format_grouped(999), "999");
        assert_eq!(format_grouped(1000), "1,000");
        assert_eq!(format_grouped(1234567), "1,234,567");
        assert_eq!(format_grouped(-45000), "-45,000");
    }

    #[test]
    fn test_value_format() {
        assert_eq!(ValueFormat::Count.format(1234.0), "1,234");
        assert_eq!(ValueFormat::Money.format(12500.4), "£12,500");
        assert_eq!(ValueFormat::MoneyPrecise.format(1812.5), "£1,812.50");
        assert_eq!(ValueFormat::MoneyPrecise.format(0.0), "£0.00");
        assert_eq!(ValueFormat::Percent.format(12.345), "12.3%");
    }

    // ========== Serde ==========

    #[test]
    fn test_metric_column_json_shape() {
        let json = r#"{"name": "stage1_exit", "aliases": ["stage_1_exit"], "kind": "count"}"#;
        let col: MetricColumn = serde_json::from_str(json).unwrap();
        assert_eq!(col.name(), "stage1_exit");
        assert_eq!(col.kind, MetricKind::Count);
        assert!(col.required);
        assert_eq!(col.column.candidates().collect::<Vec<_>>(), vec!["stage1_exit", "stage_1_exit"]);
    }

    #[test]
    fn test_average_column_json_shape() {
        let json = r#"{"name": "average_settlement", "kind": "average", "weight": "settled_claims", "required": false}"#;
        let col: MetricColumn = serde_json::from_str(json).unwrap();
        assert_eq!(
            col.kind,
            MetricKind::Average {
                weight: "settled_claims".into()
            }
        );
        assert!(!col.required);
    }

    #[test]
    fn test_chart_kind_default_is_line() {
        let chart: ChartSpec = serde_json::from_str(r#"{"metric": "m", "title": "T"}"#).unwrap();
        assert_eq!(chart.kind, ChartKind::Line);
    }
}
