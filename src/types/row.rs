//! Canonical rows, filter selections and aggregation outputs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{DashError, Month, Result};

/// Pseudo-category meaning "ignore the category dimension"
pub const COMBINED_CATEGORY: &str = "Combined";

/// Whether a selected label requests the combined view ("Combined" or "All")
pub fn is_combined_label(label: &str) -> bool {
    let label = label.trim();
    label.eq_ignore_ascii_case(COMBINED_CATEGORY) || label.eq_ignore_ascii_case("all")
}

/// One normalized source row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub month: Month,
    pub category: Option<String>,
    pub counts: BTreeMap<String, i64>,
    pub amounts: BTreeMap<String, f64>,
}

impl Row {
    pub fn new(month: Month, category: Option<&str>) -> Self {
        Self {
            month,
            category: category.map(String::from),
            counts: BTreeMap::new(),
            amounts: BTreeMap::new(),
        }
    }

    pub fn with_count(mut self, name: &str, value: i64) -> Self {
        self.counts.insert(name.to_string(), value);
        self
    }

    pub fn with_amount(mut self, name: &str, value: f64) -> Self {
        self.amounts.insert(name.to_string(), value);
        self
    }

    /// Count metric, 0 when absent
    pub fn count(&self, name: &str) -> i64 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Amount or average metric, 0.0 when absent
    pub fn amount(&self, name: &str) -> f64 {
        self.amounts.get(name).copied().unwrap_or(0.0)
    }
}

/// Date window presets offered next to the explicit range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickPick {
    /// The last `n` months of available data (n >= 1)
    LastMonths(u32),
    /// January of the latest year through the latest month
    YearToDate,
    /// Everything available
    All,
}

impl QuickPick {
    /// Resolve against the available `[first, last]` data range
    pub fn window(self, first: Month, last: Month) -> (Month, Month) {
        let start = match self {
            Self::LastMonths(n) => {
                let span = first.months_until(last).max(0) as u32;
                let back = n.max(1).saturating_sub(1).min(span) as i32;
                last.add_months(-back)
            }
            Self::YearToDate => Month::new(last.year(), 1).unwrap_or(last),
            Self::All => first,
        };
        (start.max(first).min(last), last)
    }

    pub fn label(self) -> String {
        match self {
            Self::LastMonths(n) => format!("Last {} months", n.max(1)),
            Self::YearToDate => "Year to date".to_string(),
            Self::All => "All time".to_string(),
        }
    }
}

/// Category multi-select plus inclusive date window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSelection {
    pub categories: BTreeSet<String>,
    pub start_month: Month,
    pub end_month: Month,
}

impl FilterSelection {
    /// No category breakdown
    pub fn combined(start_month: Month, end_month: Month) -> Self {
        Self {
            categories: BTreeSet::new(),
            start_month,
            end_month,
        }
    }

    pub fn with_categories<I, S>(categories: I, start_month: Month, end_month: Month) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            start_month,
            end_month,
        }
    }

    /// Empty selection or an explicit "Combined"/"All" means no breakdown
    pub fn is_combined(&self) -> bool {
        self.categories.is_empty() || self.categories.iter().any(|c| is_combined_label(c))
    }

    /// Reject `start > end`
    pub fn validate(&self) -> Result<()> {
        if self.start_month > self.end_month {
            return Err(DashError::InvalidRange {
                start: self.start_month,
                end: self.end_month,
            });
        }
        Ok(())
    }

    /// Whether a row passes the category and date filters
    pub fn matches(&self, row: &Row) -> bool {
        if row.month < self.start_month || row.month > self.end_month {
            return false;
        }
        if self.is_combined() {
            return true;
        }
        row.category
            .as_ref()
            .is_some_and(|c| self.categories.contains(c))
    }

    pub fn months(&self) -> Vec<Month> {
        Month::range_inclusive(self.start_month, self.end_month)
    }
}

/// One gap-filled point of an aggregated series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub month: Month,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub counts: BTreeMap<String, i64>,
    pub amounts: BTreeMap<String, f64>,
    pub ratios: BTreeMap<String, f64>,
}

impl SeriesPoint {
    /// Look a metric up across counts, amounts and ratios (0 when absent)
    pub fn value(&self, metric: &str) -> f64 {
        lookup(&self.counts, &self.amounts, &self.ratios, metric)
    }

    /// Convert back into a row (ratios are dropped; they are always re-derived)
    pub fn to_row(&self) -> Row {
        Row {
            month: self.month,
            category: self.category.clone(),
            counts: self.counts.clone(),
            amounts: self.amounts.clone(),
        }
    }
}

/// Gap-filled, month-ordered aggregation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSeries {
    pub start_month: Month,
    pub end_month: Month,
    /// Active categories in output order; empty for the combined view
    pub categories: Vec<String>,
    pub points: Vec<SeriesPoint>,
}

impl AggregatedSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_combined(&self) -> bool {
        self.categories.is_empty()
    }

    /// Points of one category (or all points of a combined series with `None`)
    pub fn for_category<'a>(
        &'a self,
        category: Option<&'a str>,
    ) -> impl Iterator<Item = &'a SeriesPoint> + 'a {
        self.points
            .iter()
            .filter(move |p| p.category.as_deref() == category)
    }

    pub fn to_rows(&self) -> Vec<Row> {
        self.points.iter().map(SeriesPoint::to_row).collect()
    }
}

/// Totals and derived ratios over a filtered window
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    /// Months in the window
    pub months: usize,
    /// Source rows that passed the filter
    pub row_count: usize,
    pub counts: BTreeMap<String, i64>,
    pub amounts: BTreeMap<String, f64>,
    pub ratios: BTreeMap<String, f64>,
}

impl Summary {
    pub fn value(&self, metric: &str) -> f64 {
        lookup(&self.counts, &self.amounts, &self.ratios, metric)
    }
}

fn lookup(
    counts: &BTreeMap<String, i64>,
    amounts: &BTreeMap<String, f64>,
    ratios: &BTreeMap<String, f64>,
    metric: &str,
) -> f64 {
    if let Some(v) = counts.get(metric) {
        return *v as f64;
    }
    amounts
        .get(metric)
        .or_else(|| ratios.get(metric))
        .copied()
        .unwrap_or(0.0)
}
