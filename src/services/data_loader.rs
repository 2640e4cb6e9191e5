//! Dataset loading service
//!
//! Reads the CSV extracts of a dataset, resolves historical column names to
//! canonical metrics, tags per-category sources and normalizes every cell
//! into a [`Row`]. Results are memoized by source content in a [`LoadCache`].

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::services::cache::LoadCache;
use crate::services::normalizer::{normalize_header, normalize_text, parse_count, parse_money, parse_period};
use crate::types::{
    ColumnRef, DashError, DatasetSpec, LoadWarning, MetricKind, Month, Result, Row,
};

/// Result of loading one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult {
    pub dataset: String,
    /// Canonical rows from all sources, in source order
    pub rows: Vec<Row>,
    /// Rows dropped because their period could not be parsed
    pub dropped_periods: usize,
    /// Files that were read
    pub sources_read: Vec<PathBuf>,
    pub warnings: Vec<LoadWarning>,
}

impl LoadResult {
    /// Distinct row categories, sorted
    pub fn categories(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|r| r.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// First and last month present in the data
    pub fn month_range(&self) -> Option<(Month, Month)> {
        let first = self.rows.iter().map(|r| r.month).min()?;
        let last = self.rows.iter().map(|r| r.month).max()?;
        Some((first, last))
    }
}

/// Rows read from a single source
#[derive(Debug, Default)]
pub struct SourceRows {
    pub rows: Vec<Row>,
    pub dropped_periods: usize,
    pub warnings: Vec<LoadWarning>,
}

/// Column positions resolved against one source's header
struct ColumnMap {
    period: usize,
    category: Option<usize>,
    /// `(metric index in the dataset, column position)`; absent optional metrics are skipped
    metrics: Vec<(usize, usize)>,
}

fn find_column(headers: &[String], column: &ColumnRef) -> Option<usize> {
    column.candidates().find_map(|candidate| {
        let wanted = normalize_header(candidate);
        headers.iter().position(|h| *h == wanted)
    })
}

fn resolve_columns(
    headers: &StringRecord,
    dataset: &DatasetSpec,
    source_name: &str,
    tagged: bool,
    warnings: &mut Vec<LoadWarning>,
) -> Result<ColumnMap> {
    let headers: Vec<String> = headers.iter().map(normalize_header).collect();
    let missing = |column: &ColumnRef| DashError::Schema {
        source_name: source_name.to_string(),
        column: column.name.clone(),
    };

    let period = find_column(&headers, &dataset.period_column)
        .ok_or_else(|| missing(&dataset.period_column))?;

    // A tagged source carries its category in the config, not in a column
    let category = match (&dataset.category_column, tagged) {
        (Some(column), false) => Some(find_column(&headers, column).ok_or_else(|| missing(column))?),
        _ => None,
    };

    let mut metrics = Vec::with_capacity(dataset.metric_set.metrics.len());
    for (idx, metric) in dataset.metric_set.metrics.iter().enumerate() {
        match find_column(&headers, &metric.column) {
            Some(pos) => metrics.push((idx, pos)),
            None if metric.required => return Err(missing(&metric.column)),
            None => {
                debug!(source = source_name, column = %metric.name(), "optional column absent");
                warnings.push(LoadWarning::MissingOptionalColumn {
                    source_name: source_name.to_string(),
                    column: metric.name().to_string(),
                });
            }
        }
    }

    Ok(ColumnMap {
        period,
        category,
        metrics,
    })
}

/// Read one CSV source into canonical rows.
///
/// `category` tags every row with a fixed label; otherwise the dataset's
/// category column (if any) is used. Rows with unreadable periods are dropped
/// and counted; malformed numbers fail the whole source.
pub fn read_source<R: io::Read>(
    reader: R,
    source_name: &str,
    dataset: &DatasetSpec,
    category: Option<&str>,
) -> Result<SourceRows> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut out = SourceRows::default();
    let headers = csv_reader.headers()?.clone();
    let columns = resolve_columns(
        &headers,
        dataset,
        source_name,
        category.is_some(),
        &mut out.warnings,
    )?;

    for (idx, record) in csv_reader.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(idx as u64 + 2);
        let cell = |pos: usize| record.get(pos).unwrap_or("");

        if record.iter().all(|c| c.is_empty()) {
            continue;
        }

        let Some(month) = parse_period(cell(columns.period)) else {
            debug!(source = source_name, line, value = cell(columns.period), "unreadable period");
            out.dropped_periods += 1;
            continue;
        };

        let row_category = match category {
            Some(label) => Some(label.to_string()),
            None => columns
                .category
                .map(|pos| normalize_text(cell(pos)))
                .filter(|c| !c.is_empty()),
        };

        let mut row = Row::new(month, row_category.as_deref());
        for &(metric_idx, pos) in &columns.metrics {
            let metric = &dataset.metric_set.metrics[metric_idx];
            let raw = cell(pos);
            let format_error = || DashError::DataFormat {
                source_name: source_name.to_string(),
                line,
                column: metric.name().to_string(),
                value: raw.to_string(),
            };
            match metric.kind {
                MetricKind::Count => {
                    let value = parse_count(raw).ok_or_else(format_error)?;
                    row.counts.insert(metric.name().to_string(), value);
                }
                MetricKind::Amount | MetricKind::Average { .. } => {
                    let value = parse_money(raw).ok_or_else(format_error)?;
                    row.amounts.insert(metric.name().to_string(), value);
                }
            }
        }
        out.rows.push(row);
    }

    if out.dropped_periods > 0 {
        warn!(
            source = source_name,
            dropped = out.dropped_periods,
            "dropped rows with unreadable period"
        );
        out.warnings.push(LoadWarning::DroppedPeriods {
            source_name: source_name.to_string(),
            count: out.dropped_periods,
        });
    }

    Ok(out)
}

/// A resolved source file and its raw bytes
pub struct SourceFile {
    pub path: PathBuf,
    pub category: Option<String>,
    pub bytes: Vec<u8>,
}

/// Dataset loading service with content-keyed memoization
pub struct DataLoaderService {
    data_dir: PathBuf,
    cache: LoadCache,
}

impl DataLoaderService {
    /// Create a loader reading sources relative to `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: LoadCache::new(),
        }
    }

    /// Load a dataset, reusing the cached result when no source changed
    pub fn load(&mut self, dataset: &DatasetSpec) -> Result<Arc<LoadResult>> {
        let files = self.read_sources(dataset)?;
        let fingerprint = LoadCache::fingerprint(dataset, &files);

        if let Some(hit) = self.cache.get(&dataset.name, fingerprint) {
            debug!(dataset = %dataset.name, "load cache hit");
            return Ok(hit);
        }

        let result = Arc::new(Self::parse_files(dataset, &files)?);
        info!(
            dataset = %dataset.name,
            rows = result.rows.len(),
            sources = result.sources_read.len(),
            dropped = result.dropped_periods,
            "loaded dataset"
        );
        self.cache
            .insert(&dataset.name, fingerprint, Arc::clone(&result));
        Ok(result)
    }

    /// Drop every memoized result; the next `load` re-reads from disk
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Drop the memoized result of one dataset
    pub fn invalidate_dataset(&mut self, name: &str) {
        self.cache.invalidate(name);
    }

    /// Expand source globs and read every matching file
    fn read_sources(&self, dataset: &DatasetSpec) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        for source in &dataset.sources {
            // Only the source path may carry glob syntax
            let base = glob::Pattern::escape(&self.data_dir.to_string_lossy());
            let pattern = Path::new(&base).join(&source.path);
            let pattern = pattern.to_string_lossy();
            let mut paths: Vec<PathBuf> = glob::glob(&pattern)
                .map_err(|e| DashError::Config(format!("bad source pattern '{}': {}", pattern, e)))?
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file())
                .collect();

            if paths.is_empty() {
                return Err(DashError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{}: no file matches '{}'", dataset.name, pattern),
                )));
            }
            paths.sort();

            for path in paths {
                let bytes = fs::read(&path)?;
                files.push(SourceFile {
                    path,
                    category: source.category.clone(),
                    bytes,
                });
            }
        }
        Ok(files)
    }

    /// Parse already-read files and concatenate their rows
    pub fn parse_files(dataset: &DatasetSpec, files: &[SourceFile]) -> Result<LoadResult> {
        let mut result = LoadResult {
            dataset: dataset.name.clone(),
            rows: Vec::new(),
            dropped_periods: 0,
            sources_read: Vec::with_capacity(files.len()),
            warnings: Vec::new(),
        };

        for file in files {
            let source_name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.path.display().to_string());
            let source = read_source(
                file.bytes.as_slice(),
                &source_name,
                dataset,
                file.category.as_deref(),
            )?;
            result.rows.extend(source.rows);
            result.dropped_periods += source.dropped_periods;
            result.warnings.extend(source.warnings);
            result.sources_read.push(file.path.clone());
        }

        Ok(result)
    }
}
