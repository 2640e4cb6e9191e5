//! Aggregator service: filtering, duplicate collapse, monthly grouping,
//! gap-filling and ratio derivation

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{
    AggregatedSeries, FilterSelection, MetricSet, Month, RatioMetric, Result, Row, SeriesPoint,
    Summary,
};

type GroupKey = (Month, Option<String>);

/// Running totals of one group
#[derive(Debug, Default)]
struct GroupTotals {
    counts: BTreeMap<String, i64>,
    amounts: BTreeMap<String, f64>,
    /// average metric -> (sum of value * weight, sum of weight)
    weighted: BTreeMap<String, (f64, i64)>,
    rows: usize,
}

impl GroupTotals {
    fn add(&mut self, row: &Row, metrics: &MetricSet) {
        for name in metrics.count_names() {
            let total = self.counts.entry(name.to_string()).or_insert(0);
            *total = total.saturating_add(row.count(name));
        }
        for name in metrics.amount_names() {
            *self.amounts.entry(name.to_string()).or_insert(0.0) += row.amount(name);
        }
        for (name, weight) in metrics.averages() {
            let w = row.count(weight);
            let (sum, total) = self.weighted.entry(name.to_string()).or_insert((0.0, 0));
            *sum += row.amount(name) * w as f64;
            *total = total.saturating_add(w);
        }
        self.rows += 1;
    }

    /// Final values for every declared metric, zeros included
    fn finish(mut self, metrics: &MetricSet) -> (BTreeMap<String, i64>, BTreeMap<String, f64>) {
        let mut counts = BTreeMap::new();
        for name in metrics.count_names() {
            counts.insert(name.to_string(), self.counts.remove(name).unwrap_or(0));
        }
        let mut amounts = BTreeMap::new();
        for name in metrics.amount_names() {
            amounts.insert(name.to_string(), self.amounts.remove(name).unwrap_or(0.0));
        }
        for (name, _) in metrics.averages() {
            let (sum, weight) = self.weighted.remove(name).unwrap_or((0.0, 0));
            let mean = if weight > 0 { sum / weight as f64 } else { 0.0 };
            amounts.insert(name.to_string(), mean);
        }
        (counts, amounts)
    }
}

/// Deterministic ordering of rows sharing a group key, so float sums do not
/// depend on input order
fn canonical_cmp(a: &Row, b: &Row) -> Ordering {
    a.counts.cmp(&b.counts).then_with(|| {
        a.amounts
            .iter()
            .zip(b.amounts.iter())
            .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.total_cmp(vb)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.amounts.len().cmp(&b.amounts.len()))
    })
}

/// Compute every ratio from summed counts and amounts.
/// A zero denominator yields 0.
pub fn derive_ratios(
    counts: &BTreeMap<String, i64>,
    amounts: &BTreeMap<String, f64>,
    ratios: &[RatioMetric],
) -> BTreeMap<String, f64> {
    let value_of = |name: &str| -> f64 {
        counts
            .get(name)
            .map(|v| *v as f64)
            .or_else(|| amounts.get(name).copied())
            .unwrap_or(0.0)
    };
    ratios
        .iter()
        .map(|ratio| (ratio.name.clone(), ratio.evaluate(value_of)))
        .collect()
}

/// Aggregator for computing dashboard series and summaries
pub struct Aggregator;

impl Aggregator {
    /// Apply the category and date filters.
    /// Fails with `InvalidRange` before touching any row when start > end.
    pub fn filter<'a>(rows: &'a [Row], filter: &FilterSelection) -> Result<Vec<&'a Row>> {
        filter.validate()?;
        Ok(rows.iter().filter(|row| filter.matches(row)).collect())
    }

    /// Collapse rows sharing `(month, category)` into one: counts and amounts
    /// are summed, averages become weight-weighted means (0 when the weight
    /// total is 0). Output is ordered by month, then category.
    pub fn collapse_duplicates(rows: &[&Row], metrics: &MetricSet) -> Vec<Row> {
        let mut groups: BTreeMap<GroupKey, Vec<&Row>> = BTreeMap::new();
        for row in rows {
            groups
                .entry((row.month, row.category.clone()))
                .or_default()
                .push(row);
        }

        groups
            .into_iter()
            .map(|((month, category), mut members)| {
                if members.len() > 1 {
                    debug!(%month, category = ?category, rows = members.len(), "collapsing duplicate rows");
                }
                members.sort_by(|a, b| canonical_cmp(a, b));
                let mut totals = GroupTotals::default();
                for row in members {
                    totals.add(row, metrics);
                }
                let (counts, amounts) = totals.finish(metrics);
                Row {
                    month,
                    category,
                    counts,
                    amounts,
                }
            })
            .collect()
    }

    /// Aggregate rows into a gap-filled monthly series.
    ///
    /// Every month of `[start_month, end_month]` appears once per active
    /// category (once in total for the combined view), with zeros where no
    /// source row exists. Ratios are derived from the summed values.
    pub fn aggregate(
        rows: &[Row],
        filter: &FilterSelection,
        metrics: &MetricSet,
    ) -> Result<AggregatedSeries> {
        let filtered = Self::filter(rows, filter)?;
        let collapsed = Self::collapse_duplicates(&filtered, metrics);
        let combined = filter.is_combined();

        let mut groups: BTreeMap<GroupKey, GroupTotals> = BTreeMap::new();
        for row in &collapsed {
            let category = if combined { None } else { row.category.clone() };
            groups
                .entry((row.month, category))
                .or_default()
                .add(row, metrics);
        }

        let categories: Vec<String> = if combined {
            Vec::new()
        } else {
            filter.categories.iter().cloned().collect()
        };
        let grid_categories: Vec<Option<String>> = if combined {
            vec![None]
        } else {
            categories.iter().cloned().map(Some).collect()
        };

        let months = filter.months();
        let mut points = Vec::with_capacity(months.len() * grid_categories.len());
        for month in months {
            for category in &grid_categories {
                let totals = groups
                    .remove(&(month, category.clone()))
                    .unwrap_or_default();
                let (counts, amounts) = totals.finish(metrics);
                let ratios = derive_ratios(&counts, &amounts, &metrics.ratios);
                points.push(SeriesPoint {
                    month,
                    category: category.clone(),
                    counts,
                    amounts,
                    ratios,
                });
            }
        }

        debug!(
            source_rows = filtered.len(),
            points = points.len(),
            combined,
            "aggregated series"
        );

        Ok(AggregatedSeries {
            start_month: filter.start_month,
            end_month: filter.end_month,
            categories,
            points,
        })
    }

    /// Totals, weighted averages and ratios over already-filtered rows
    pub fn summarize(rows: &[&Row], metrics: &MetricSet) -> Summary {
        let mut ordered = rows.to_vec();
        ordered.sort_by(|a, b| {
            (a.month, &a.category)
                .cmp(&(b.month, &b.category))
                .then_with(|| canonical_cmp(a, b))
        });
        let mut totals = GroupTotals::default();
        for row in ordered {
            totals.add(row, metrics);
        }
        let row_count = totals.rows;
        let (counts, amounts) = totals.finish(metrics);
        let ratios = derive_ratios(&counts, &amounts, &metrics.ratios);
        let months = rows
            .iter()
            .map(|r| r.month)
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        Summary {
            months,
            row_count,
            counts,
            amounts,
            ratios,
        }
    }

    /// Filter then summarize; `months` reports the length of the window
    pub fn summary(rows: &[Row], filter: &FilterSelection, metrics: &MetricSet) -> Result<Summary> {
        let filtered = Self::filter(rows, filter)?;
        let mut summary = Self::summarize(&filtered, metrics);
        summary.months = filter.months().len();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnRef, DashError, MetricColumn};

    fn m(year: i32, month: u32) -> Month {
        Month::new(year, month).unwrap()
    }

    fn claims_metrics() -> MetricSet {
        MetricSet {
            metrics: vec![
                MetricColumn::count(ColumnRef::new("claims_volume")),
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

    fn portal_metrics() -> MetricSet {
        MetricSet {
            metrics: vec![
                MetricColumn::count(ColumnRef::new("exit_court")),
                MetricColumn::count(ColumnRef::new("settled_claims")),
                MetricColumn::average(ColumnRef::new("average_settlement"), "settled_claims"),
            ],
            ratios: vec![RatioMetric::percentage(
                "litigation_percentage",
                "exit_court",
                &["settled_claims", "exit_court"],
            )],
        }
    }

    fn claim_row(year: i32, month: u32, category: &str, claims: i64, settled: i64, value: f64) -> Row {
        Row::new(m(year, month), Some(category))
            .with_count("claims_volume", claims)
            .with_count("settlement_volume", settled)
            .with_amount("total_settlement_value", value)
    }

    fn portal_row(month: u32, lob: &str, court: i64, settled: i64, avg: f64) -> Row {
        Row::new(m(2023, month), Some(lob))
            .with_count("exit_court", court)
            .with_count("settled_claims", settled)
            .with_amount("average_settlement", avg)
    }

    fn sample_rows() -> Vec<Row> {
        vec![
            claim_row(2024, 1, "Represented", 10, 5, 500.0),
            claim_row(2024, 1, "Unrepresented", 7, 3, 240.0),
            claim_row(2024, 3, "Represented", 4, 4, 800.0),
            claim_row(2024, 4, "Unrepresented", 2, 1, 90.5),
            claim_row(2024, 4, "Unrepresented", 1, 1, 10.25),
            claim_row(2023, 12, "Represented", 3, 0, 0.0),
        ]
    }

    // ========== Scenario ==========

    #[test]
    fn test_represented_scenario_fills_february() {
        let rows = vec![
            claim_row(2024, 1, "Represented", 10, 5, 500.0),
            claim_row(2024, 3, "Represented", 4, 4, 800.0),
        ];
        let filter = FilterSelection::with_categories(["Represented"], m(2024, 1), m(2024, 3));
        let series = Aggregator::aggregate(&rows, &filter, &claims_metrics()).unwrap();

        assert_eq!(series.len(), 3);
        let months: Vec<Month> = series.points.iter().map(|p| p.month).collect();
        assert_eq!(months, vec![m(2024, 1), m(2024, 2), m(2024, 3)]);

        let feb = &series.points[1];
        assert_eq!(feb.category.as_deref(), Some("Represented"));
        assert_eq!(feb.counts["claims_volume"], 0);
        assert_eq!(feb.counts["settlement_volume"], 0);
        assert_eq!(feb.amounts["total_settlement_value"], 0.0);

        // 500 / 5 settled
        assert_eq!(series.points[0].ratios["weighted_avg_settlement"], 100.0);
        assert_eq!(feb.ratios["weighted_avg_settlement"], 0.0);
        assert_eq!(series.points[2].ratios["weighted_avg_settlement"], 200.0);
    }

    // ========== Completeness ==========

    #[test]
    fn test_one_point_per_month_per_category() {
        let rows = sample_rows();
        let metrics = claims_metrics();
        let windows = [
            (m(2023, 11), m(2024, 5)),
            (m(2024, 1), m(2024, 1)),
            (m(2022, 1), m(2024, 12)),
        ];
        let selections: [&[&str]; 3] = [&[], &["Represented"], &["Represented", "Unrepresented", "Ghost"]];

        for (start, end) in windows {
            for categories in selections {
                let filter = FilterSelection::with_categories(categories.iter().copied(), start, end);
                let series = Aggregator::aggregate(&rows, &filter, &metrics).unwrap();
                let months = Month::range_inclusive(start, end);
                let cats = categories.len().max(1);
                assert_eq!(series.len(), months.len() * cats);

                let mut keys: Vec<(Month, Option<String>)> = series
                    .points
                    .iter()
                    .map(|p| (p.month, p.category.clone()))
                    .collect();
                let before = keys.clone();
                keys.sort();
                keys.dedup();
                assert_eq!(keys.len(), series.len(), "duplicate points");
                assert_eq!(keys, before, "points not in month/category order");
            }
        }
    }

    #[test]
    fn test_unknown_category_zero_filled() {
        let filter = FilterSelection::with_categories(["Ghost"], m(2024, 1), m(2024, 2));
        let series = Aggregator::aggregate(&sample_rows(), &filter, &claims_metrics()).unwrap();
        assert_eq!(series.len(), 2);
        assert!(series
            .points
            .iter()
            .all(|p| p.counts["claims_volume"] == 0 && p.ratios["weighted_avg_settlement"] == 0.0));
    }

    #[test]
    fn test_empty_rows_still_gap_filled() {
        let filter = FilterSelection::combined(m(2024, 1), m(2024, 6));
        let series = Aggregator::aggregate(&[], &filter, &claims_metrics()).unwrap();
        assert_eq!(series.len(), 6);
        assert!(series.is_combined());
        assert!(series.points.iter().all(|p| p.category.is_none()));
    }

    // ========== Errors ==========

    #[test]
    fn test_invalid_range_rejected() {
        let filter = FilterSelection::combined(m(2024, 3), m(2024, 1));
        let err = Aggregator::aggregate(&sample_rows(), &filter, &claims_metrics()).unwrap_err();
        assert!(matches!(err, DashError::InvalidRange { .. }));
        assert!(Aggregator::summary(&sample_rows(), &filter, &claims_metrics()).is_err());
    }

    // ========== Combined view ==========

    #[test]
    fn test_combined_sums_categories() {
        let filter = FilterSelection::with_categories(["All"], m(2024, 1), m(2024, 1));
        let series = Aggregator::aggregate(&sample_rows(), &filter, &claims_metrics()).unwrap();
        assert_eq!(series.len(), 1);
        let jan = &series.points[0];
        assert_eq!(jan.category, None);
        assert_eq!(jan.counts["claims_volume"], 17);
        assert_eq!(jan.counts["settlement_volume"], 8);
        assert!((jan.ratios["weighted_avg_settlement"] - 740.0 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_matches_combined_for_additive_metrics() {
        let rows = sample_rows();
        let metrics = claims_metrics();
        let (start, end) = (m(2023, 12), m(2024, 4));
        let combined =
            Aggregator::aggregate(&rows, &FilterSelection::combined(start, end), &metrics).unwrap();
        let broken = Aggregator::aggregate(
            &rows,
            &FilterSelection::with_categories(["Represented", "Unrepresented"], start, end),
            &metrics,
        )
        .unwrap();

        for point in &combined.points {
            let parts: Vec<&SeriesPoint> = broken.points.iter().filter(|p| p.month == point.month).collect();
            assert_eq!(parts.len(), 2);
            for metric in ["claims_volume", "settlement_volume"] {
                let sum: i64 = parts.iter().map(|p| p.counts[metric]).sum();
                assert_eq!(sum, point.counts[metric]);
            }
            let value: f64 = parts.iter().map(|p| p.amounts["total_settlement_value"]).sum();
            assert!((value - point.amounts["total_settlement_value"]).abs() < 1e-9);

            // Ratios are recomputed, not summed
            let settled = point.counts["settlement_volume"];
            let expected = if settled > 0 {
                point.amounts["total_settlement_value"] / settled as f64
            } else {
                0.0
            };
            assert!((point.ratios["weighted_avg_settlement"] - expected).abs() < 1e-9);
        }
    }

    // ========== Ratio policy ==========

    #[test]
    fn test_weighted_average_never_nan() {
        let filter = FilterSelection::with_categories(["Represented"], m(2023, 1), m(2024, 12));
        let series = Aggregator::aggregate(&sample_rows(), &filter, &claims_metrics()).unwrap();
        for p in &series.points {
            let settled = p.counts["settlement_volume"];
            let expected = if settled > 0 {
                p.amounts["total_settlement_value"] / settled as f64
            } else {
                0.0
            };
            let actual = p.ratios["weighted_avg_settlement"];
            assert!(!actual.is_nan());
            assert!((actual - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ratio_is_not_mean_of_row_ratios() {
        // 1 settlement at 1000 and 9 at 100 each: weighted mean is 190, plain mean would be 550
        let rows = vec![
            claim_row(2024, 1, "Represented", 1, 1, 1000.0),
            claim_row(2024, 1, "Unrepresented", 9, 9, 900.0),
        ];
        let filter = FilterSelection::combined(m(2024, 1), m(2024, 1));
        let series = Aggregator::aggregate(&rows, &filter, &claims_metrics()).unwrap();
        assert!((series.points[0].ratios["weighted_avg_settlement"] - 190.0).abs() < 1e-9);
    }

    // ========== Duplicate collapse ==========

    #[test]
    fn test_collapse_weighted_mean() {
        let rows = vec![
            portal_row(9, "Motor", 1, 2, 100.0),
            portal_row(9, "Motor", 3, 6, 200.0),
        ];
        let refs: Vec<&Row> = rows.iter().collect();
        let collapsed = Aggregator::collapse_duplicates(&refs, &portal_metrics());

        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].count("exit_court"), 4);
        assert_eq!(collapsed[0].count("settled_claims"), 8);
        // (100*2 + 200*6) / 8
        assert!((collapsed[0].amount("average_settlement") - 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_collapse_zero_weight_is_zero() {
        let rows = vec![
            portal_row(9, "Motor", 1, 0, 100.0),
            portal_row(9, "Motor", 1, 0, 300.0),
        ];
        let refs: Vec<&Row> = rows.iter().collect();
        let collapsed = Aggregator::collapse_duplicates(&refs, &portal_metrics());
        assert_eq!(collapsed[0].amount("average_settlement"), 0.0);
    }

    #[test]
    fn test_collapse_is_order_independent() {
        let rows = vec![
            portal_row(9, "Motor", 1, 3, 101.1),
            portal_row(9, "Motor", 2, 7, 333.3),
            portal_row(9, "Employer Liability", 0, 5, 250.0),
            portal_row(10, "Motor", 4, 1, 17.7),
            portal_row(9, "Motor", 5, 11, 0.1),
            portal_row(10, "Employer Liability", 1, 2, 999.9),
        ];
        let metrics = portal_metrics();
        let filter = FilterSelection::with_categories(["Motor", "Employer Liability"], m(2023, 8), m(2023, 11));
        let expected = Aggregator::aggregate(&rows, &filter, &metrics).unwrap();

        let mut reversed = rows.clone();
        reversed.reverse();
        assert_eq!(Aggregator::aggregate(&reversed, &filter, &metrics).unwrap(), expected);

        for shift in 1..rows.len() {
            let mut rotated = rows.clone();
            rotated.rotate_left(shift);
            assert_eq!(Aggregator::aggregate(&rotated, &filter, &metrics).unwrap(), expected);
        }

        let combined = FilterSelection::combined(m(2023, 8), m(2023, 11));
        assert_eq!(
            Aggregator::aggregate(&reversed, &combined, &metrics).unwrap(),
            Aggregator::aggregate(&rows, &combined, &metrics).unwrap()
        );
    }

    #[test]
    fn test_combined_average_weighted_across_categories() {
        let rows = vec![
            portal_row(9, "Motor", 0, 1, 100.0),
            portal_row(9, "Employer Liability", 0, 3, 300.0),
        ];
        let filter = FilterSelection::combined(m(2023, 9), m(2023, 9));
        let series = Aggregator::aggregate(&rows, &filter, &portal_metrics()).unwrap();
        // (100*1 + 300*3) / 4
        assert!((series.points[0].amounts["average_settlement"] - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_litigation_percentage() {
        let rows = vec![portal_row(9, "Motor", 25, 75, 0.0)];
        let filter = FilterSelection::combined(m(2023, 9), m(2023, 10));
        let series = Aggregator::aggregate(&rows, &filter, &portal_metrics()).unwrap();
        assert!((series.points[0].ratios["litigation_percentage"] - 25.0).abs() < 1e-9);
        assert_eq!(series.points[1].ratios["litigation_percentage"], 0.0);
    }

    // ========== Idempotence ==========

    #[test]
    fn test_reaggregating_series_is_stable() {
        let metrics = portal_metrics();
        let rows = vec![
            portal_row(9, "Motor", 1, 3, 101.1),
            portal_row(9, "Motor", 2, 7, 333.3),
            portal_row(11, "Employer Liability", 0, 5, 250.0),
        ];
        let filter = FilterSelection::with_categories(["Motor", "Employer Liability"], m(2023, 9), m(2023, 12));
        let first = Aggregator::aggregate(&rows, &filter, &metrics).unwrap();
        let second = Aggregator::aggregate(&first.to_rows(), &filter, &metrics).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.points.iter().zip(&second.points) {
            assert_eq!(a.month, b.month);
            assert_eq!(a.category, b.category);
            assert_eq!(a.counts, b.counts);
            for (name, value) in &a.amounts {
                assert!((value - b.amounts[name]).abs() < 1e-9, "{name}");
            }
            for (name, value) in &a.ratios {
                assert!((value - b.ratios[name]).abs() < 1e-9, "{name}");
            }
        }
    }

    // ========== Summary ==========

    #[test]
    fn test_summary_totals_and_ratio() {
        let filter = FilterSelection::combined(m(2024, 1), m(2024, 4));
        let summary = Aggregator::summary(&sample_rows(), &filter, &claims_metrics()).unwrap();

        assert_eq!(summary.months, 4);
        assert_eq!(summary.row_count, 5);
        assert_eq!(summary.counts["claims_volume"], 24);
        assert_eq!(summary.counts["settlement_volume"], 14);
        let total = 500.0 + 240.0 + 800.0 + 90.5 + 10.25;
        assert!((summary.amounts["total_settlement_value"] - total).abs() < 1e-9);
        assert!((summary.ratios["weighted_avg_settlement"] - total / 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_empty_window_is_zero() {
        let filter = FilterSelection::with_categories(["Ghost"], m(2024, 1), m(2024, 4));
        let summary = Aggregator::summary(&sample_rows(), &filter, &claims_metrics()).unwrap();
        assert_eq!(summary.row_count, 0);
        assert_eq!(summary.counts["claims_volume"], 0);
        assert_eq!(summary.ratios["weighted_avg_settlement"], 0.0);
    }

    #[test]
    fn test_summary_matches_series_totals() {
        let rows = sample_rows();
        let metrics = claims_metrics();
        let filter = FilterSelection::with_categories(["Represented", "Unrepresented"], m(2023, 12), m(2024, 4));
        let series = Aggregator::aggregate(&rows, &filter, &metrics).unwrap();
        let summary = Aggregator::summary(&rows, &filter, &metrics).unwrap();

        let claims: i64 = series.points.iter().map(|p| p.counts["claims_volume"]).sum();
        assert_eq!(claims, summary.counts["claims_volume"]);
    }

    #[test]
    fn test_summary_is_order_independent() {
        let rows = vec![
            claim_row(2024, 1, "Represented", 1, 1, 0.1),
            claim_row(2024, 1, "Represented", 1, 1, 0.2),
            claim_row(2024, 2, "Unrepresented", 1, 1, 0.3),
        ];
        let metrics = claims_metrics();
        let filter = FilterSelection::combined(m(2024, 1), m(2024, 2));
        let forward = Aggregator::summary(&rows, &filter, &metrics).unwrap();

        let mut reversed = rows.clone();
        reversed.reverse();
        let backward = Aggregator::summary(&reversed, &filter, &metrics).unwrap();

        assert_eq!(
            forward.amounts["total_settlement_value"].to_bits(),
            backward.amounts["total_settlement_value"].to_bits()
        );
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_derive_ratios_shared_policy() {
        let counts = BTreeMap::from([("settlement_volume".to_string(), 0)]);
        let amounts = BTreeMap::from([("total_settlement_value".to_string(), 10.0)]);
        let ratios = derive_ratios(&counts, &amounts, &claims_metrics().ratios);
        assert_eq!(ratios["weighted_avg_settlement"], 0.0);
    }
}
