use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::config::AppConfig;
use crate::logging;
use crate::services::{normalizer::parse_period, Aggregator, DataLoaderService, LoadResult};
use crate::types::{
    is_combined_label, AggregatedSeries, DatasetSpec, FilterSelection, MetricKind, Month,
    QuickPick, Summary, COMBINED_CATEGORY,
};

/// Terminal dashboard for monthly insurance claims extracts
#[derive(Parser)]
#[command(name = "claimdash")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.claimdash/config.json, else built-in presets)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the CSV extracts (overrides CLAIMDASH_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Commands {
    /// Launch interactive dashboard (default)
    Tui {
        /// Dataset to open first
        #[arg(long)]
        dataset: Option<String>,
    },

    /// Print headline totals for a filtered window
    Summary {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the gap-filled monthly series
    Series {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output as JSON
        #[arg(long, conflicts_with = "csv")]
        json: bool,

        /// Output as CSV
        #[arg(long)]
        csv: bool,
    },

    /// List configured datasets
    Datasets {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Dataset, category and date window selection shared by report commands
#[derive(Args, Debug, Clone, Default, PartialEq)]
struct FilterArgs {
    /// Dataset name (default: the configured default)
    #[arg(long)]
    dataset: Option<String>,

    /// Category to include; repeat for several. Omit (or pass "Combined") for totals
    #[arg(long = "category")]
    categories: Vec<String>,

    /// First month, YYYY-MM
    #[arg(long, value_parser = parse_month_arg)]
    from: Option<Month>,

    /// Last month, YYYY-MM
    #[arg(long, value_parser = parse_month_arg)]
    to: Option<Month>,

    /// Last N months of available data
    #[arg(long, conflicts_with_all = ["from", "to", "ytd"])]
    last: Option<u32>,

    /// January of the latest year through the latest month
    #[arg(long, conflicts_with_all = ["from", "to"])]
    ytd: bool,
}

fn parse_month_arg(raw: &str) -> Result<Month, String> {
    parse_period(raw).ok_or_else(|| format!("'{}' is not a month (expected YYYY-MM)", raw))
}

impl FilterArgs {
    /// Resolve the date window against the `[first, last]` months present
    fn window(&self, available: Option<(Month, Month)>) -> anyhow::Result<(Month, Month)> {
        let quick = match (self.last, self.ytd) {
            (Some(n), _) => Some(QuickPick::LastMonths(n)),
            (None, true) => Some(QuickPick::YearToDate),
            _ => None,
        };
        match (quick, available) {
            (Some(pick), Some((first, last))) => Ok(pick.window(first, last)),
            (None, available) => {
                let start = self.from.or(available.map(|(first, _)| first));
                let end = self.to.or(available.map(|(_, last)| last));
                match (start, end) {
                    (Some(start), Some(end)) => Ok((start, end)),
                    _ => bail!("no rows with a readable period; pass --from and --to"),
                }
            }
            (Some(_), None) => bail!("no rows with a readable period"),
        }
    }

    fn selection(&self, start: Month, end: Month) -> FilterSelection {
        FilterSelection::with_categories(self.categories.iter().cloned(), start, end)
    }
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let command = self
            .command
            .clone()
            .unwrap_or(Commands::Tui { dataset: None });

        // stderr logging would tear the alternate screen
        if !matches!(command, Commands::Tui { .. }) {
            logging::init(self.verbose);
        }

        let config = AppConfig::load(self.config.as_deref())
            .context("loading configuration")?
            .with_data_dir_override(self.data_dir.clone());

        match command {
            Commands::Tui { dataset } => crate::tui::run(config, dataset.as_deref()),
            report_command => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                report(&config, &report_command, &mut out)
            }
        }
    }
}

/// Run a non-interactive command, writing to `out`
fn report(config: &AppConfig, command: &Commands, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Commands::Tui { .. } => Ok(()),
        Commands::Datasets { json } => write_datasets(config, *json, out),
        Commands::Summary { filter, json } => {
            let (dataset, load, selection) = load_filtered(config, filter)?;
            let summary = Aggregator::summary(&load.rows, &selection, &dataset.metric_set)?;
            if *json {
                let report = SummaryReport {
                    dataset: &dataset.name,
                    start_month: selection.start_month,
                    end_month: selection.end_month,
                    categories: selected_categories(&selection),
                    dropped_periods: load.dropped_periods,
                    warnings: load.warnings.iter().map(ToString::to_string).collect(),
                    summary: &summary,
                };
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                write_summary(dataset, &load, &selection, &summary, out)?;
            }
            Ok(())
        }
        Commands::Series { filter, json, csv } => {
            let (dataset, load, selection) = load_filtered(config, filter)?;
            let series = Aggregator::aggregate(&load.rows, &selection, &dataset.metric_set)?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&series)?)?;
            } else if *csv {
                write_series_csv(dataset, &series, out)?;
            } else {
                write_series_table(dataset, &series, out)?;
            }
            Ok(())
        }
    }
}

/// Load the requested dataset and resolve the filter flags against it
fn load_filtered<'c>(
    config: &'c AppConfig,
    filter: &FilterArgs,
) -> anyhow::Result<(&'c DatasetSpec, Arc<LoadResult>, FilterSelection)> {
    let dataset = config.dataset_or_default(filter.dataset.as_deref())?;
    let mut loader = DataLoaderService::new(&config.data_dir);
    let load = loader
        .load(dataset)
        .map_err(|e| anyhow!("loading dataset '{}': {}", dataset.name, e.describe()))?;
    let (start, end) = filter.window(load.month_range())?;
    let selection = filter.selection(start, end);
    Ok((dataset, load, selection))
}

#[derive(Serialize)]
struct SummaryReport<'a> {
    dataset: &'a str,
    start_month: Month,
    end_month: Month,
    categories: Vec<String>,
    /// Rows skipped at load because their period was unreadable
    dropped_periods: usize,
    warnings: Vec<String>,
    #[serde(flatten)]
    summary: &'a Summary,
}

fn selected_categories(selection: &FilterSelection) -> Vec<String> {
    if selection.is_combined() {
        vec![COMBINED_CATEGORY.to_string()]
    } else {
        selection
            .categories
            .iter()
            .filter(|c| !is_combined_label(c))
            .cloned()
            .collect()
    }
}

/// Metric columns in declaration order, ratios last
fn metric_columns(dataset: &DatasetSpec) -> Vec<&str> {
    dataset
        .metric_set
        .metrics
        .iter()
        .map(|m| m.name())
        .chain(dataset.metric_set.ratios.iter().map(|r| r.name.as_str()))
        .collect()
}

fn is_count(dataset: &DatasetSpec, metric: &str) -> bool {
    dataset
        .metric_set
        .get(metric)
        .is_some_and(|m| m.kind == MetricKind::Count)
}

fn write_summary(
    dataset: &DatasetSpec,
    load: &LoadResult,
    selection: &FilterSelection,
    summary: &Summary,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    writeln!(out, "{} ({})", dataset.title, dataset.name)?;
    writeln!(
        out,
        "{} to {} | {} months | {}: {}",
        selection.start_month.short_label(),
        selection.end_month.short_label(),
        summary.months,
        dataset.category_label,
        selected_categories(selection).join(", ")
    )?;
    for warning in &load.warnings {
        writeln!(out, "warning: {}", warning)?;
    }
    writeln!(out)?;

    if dataset.cards.is_empty() {
        for metric in metric_columns(dataset) {
            writeln!(out, "  {:<32} {:>16.2}", metric, summary.value(metric))?;
        }
    } else {
        for card in &dataset.cards {
            writeln!(
                out,
                "  {:<32} {:>16}",
                card.title,
                card.format.format(summary.value(&card.metric))
            )?;
        }
    }
    Ok(())
}

fn write_series_table(
    dataset: &DatasetSpec,
    series: &AggregatedSeries,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let columns = metric_columns(dataset);
    let category_width = series
        .categories
        .iter()
        .map(|c| c.len())
        .chain(std::iter::once(dataset.category_label.len()))
        .max()
        .unwrap_or(0);

    let mut header = format!("{:<8}", "Month");
    if !series.is_combined() {
        header.push_str(&format!("  {:<w$}", dataset.category_label, w = category_width));
    }
    for column in &columns {
        header.push_str(&format!("  {:>w$}", column, w = column.len().max(12)));
    }
    writeln!(out, "{}", header)?;

    for point in &series.points {
        let mut line = format!("{:<8}", point.month.short_label());
        if let Some(category) = &point.category {
            line.push_str(&format!("  {:<w$}", category, w = category_width));
        }
        for column in &columns {
            let width = column.len().max(12);
            let value = point.value(column);
            if is_count(dataset, column) {
                line.push_str(&format!("  {:>w$}", value as i64, w = width));
            } else {
                line.push_str(&format!("  {:>w$.2}", value, w = width));
            }
        }
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

fn write_series_csv(
    dataset: &DatasetSpec,
    series: &AggregatedSeries,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let columns = metric_columns(dataset);
    let mut writer = csv::Writer::from_writer(out);

    let mut header = vec!["month".to_string()];
    if !series.is_combined() {
        header.push("category".to_string());
    }
    header.extend(columns.iter().map(|c| c.to_string()));
    writer.write_record(&header)?;

    for point in &series.points {
        let mut record = vec![point.month.to_string()];
        if let Some(category) = &point.category {
            record.push(category.clone());
        }
        for column in &columns {
            let value = point.value(column);
            record.push(if is_count(dataset, column) {
                (value as i64).to_string()
            } else {
                value.to_string()
            });
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_datasets(config: &AppConfig, json: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&config.datasets)?)?;
        return Ok(());
    }
    let default = config.default_index();
    for (idx, dataset) in config.datasets.iter().enumerate() {
        let marker = if idx == default { "*" } else { " " };
        let sources: Vec<&str> = dataset.sources.iter().map(|s| s.path.as_str()).collect();
        writeln!(
            out,
            "{} {:<16} {:<32} {}",
            marker,
            dataset.name,
            dataset.title,
            sources.join(", ")
        )?;
    }
    writeln!(out, "\nData directory: {}", config.data_dir.display())?;
    Ok(())
}
