//! Chart data preparation
//!
//! Splits an aggregated series into one plot series per category for a
//! given chart, converting values to monthly shares for percentage charts.

use serde::Serialize;

use crate::types::{AggregatedSeries, ChartKind, ChartSpec, Month};

/// One plotted line or bar stack segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSeries {
    pub label: String,
    pub points: Vec<(Month, f64)>,
}

impl PlotSeries {
    pub fn max_value(&self) -> f64 {
        self.points.iter().map(|(_, v)| *v).fold(0.0, f64::max)
    }
}

/// Build the plot series of `chart` from `series`, in category order
pub fn plot_series(series: &AggregatedSeries, chart: &ChartSpec) -> Vec<PlotSeries> {
    let mut plots: Vec<PlotSeries> = if series.is_combined() {
        vec![PlotSeries {
            label: chart.title.clone(),
            points: series
                .for_category(None)
                .map(|p| (p.month, p.value(&chart.metric)))
                .collect(),
        }]
    } else {
        series
            .categories
            .iter()
            .map(|category| PlotSeries {
                label: category.clone(),
                points: series
                    .for_category(Some(category.as_str()))
                    .map(|p| (p.month, p.value(&chart.metric)))
                    .collect(),
            })
            .collect()
    };

    if chart.kind == ChartKind::PercentStackedBar {
        to_percent_shares(&mut plots);
    }
    plots
}

/// Replace each value with its share (0-100) of the month's total across
/// all plots; months with a zero total stay 0
pub fn to_percent_shares(plots: &mut [PlotSeries]) {
    let Some(len) = plots.first().map(|p| p.points.len()) else {
        return;
    };
    for idx in 0..len {
        let total: f64 = plots
            .iter()
            .filter_map(|p| p.points.get(idx).map(|(_, v)| *v))
            .sum();
        for plot in plots.iter_mut() {
            if let Some((_, value)) = plot.points.get_mut(idx) {
                *value = if total > 0.0 {
                    *value / total * 100.0
                } else {
                    0.0
                };
            }
        }
    }
}

/// Largest stacked height (sum over plots per month)
pub fn stacked_max(plots: &[PlotSeries]) -> f64 {
    let len = plots.iter().map(|p| p.points.len()).max().unwrap_or(0);
    (0..len)
        .map(|idx| {
            plots
                .iter()
                .filter_map(|p| p.points.get(idx).map(|(_, v)| *v))
                .sum::<f64>()
        })
        .fold(0.0, f64::max)
}
