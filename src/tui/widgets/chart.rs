//! Chart panels - line charts and stacked bars over the aggregated series

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    symbols,
    text::Line,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Widget},
};

use crate::services::chart_data::{plot_series, stacked_max, PlotSeries};
use crate::tui::theme::Theme;
use crate::types::{AggregatedSeries, ChartKind, ChartSpec};

/// Charts shown per page (2x2 grid)
pub const CHARTS_PER_PAGE: usize = 4;

/// Widest bar slot per month, gap included
const MAX_SLOT_WIDTH: u16 = 6;

/// Compact axis label: 950, 12.5k, 3.4m
pub fn compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000.0 {
        format!("{:.1}m", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.1}k", value / 1_000.0)
    } else if abs >= 10.0 || abs == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

/// Number of chart pages for `count` charts
pub fn page_count(count: usize) -> usize {
    count.div_ceil(CHARTS_PER_PAGE).max(1)
}

/// One bordered chart
pub struct ChartPanel<'a> {
    spec: &'a ChartSpec,
    series: &'a AggregatedSeries,
    theme: Theme,
}

impl<'a> ChartPanel<'a> {
    pub fn new(spec: &'a ChartSpec, series: &'a AggregatedSeries, theme: Theme) -> Self {
        Self {
            spec,
            series,
            theme,
        }
    }

    fn value_label(&self, value: f64) -> String {
        match self.spec.kind {
            ChartKind::PercentStackedBar => format!("{:.0}%", value),
            _ => compact(value),
        }
    }

    fn render_line(&self, plots: &[PlotSeries], block: Block, area: Rect, buf: &mut Buffer) {
        let data: Vec<Vec<(f64, f64)>> = plots
            .iter()
            .map(|p| {
                p.points
                    .iter()
                    .enumerate()
                    .map(|(i, (_, v))| (i as f64, *v))
                    .collect()
            })
            .collect();

        let named = !self.series.is_combined();
        let datasets: Vec<Dataset> = plots
            .iter()
            .zip(&data)
            .enumerate()
            .map(|(i, (plot, points))| {
                let dataset = Dataset::default()
                    .marker(symbols::Marker::Braille)
                    .graph_type(GraphType::Line)
                    .style(Style::default().fg(self.theme.series_color(i)))
                    .data(points);
                if named {
                    dataset.name(plot.label.clone())
                } else {
                    dataset
                }
            })
            .collect();

        let months = self.series.start_month.months_until(self.series.end_month).max(0);
        let y_max = plots.iter().map(PlotSeries::max_value).fold(0.0, f64::max);
        let y_top = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };
        let muted = Style::default().fg(self.theme.muted());

        let chart = Chart::new(datasets)
            .block(block)
            .x_axis(
                Axis::default()
                    .style(muted)
                    .bounds([0.0, months.max(1) as f64])
                    .labels(vec![
                        self.series.start_month.short_label(),
                        self.series.end_month.short_label(),
                    ]),
            )
            .y_axis(
                Axis::default()
                    .style(muted)
                    .bounds([0.0, y_top])
                    .labels(vec![
                        "0".to_string(),
                        self.value_label(y_top / 2.0),
                        self.value_label(y_top),
                    ]),
            );
        chart.render(area, buf);
    }

    fn render_stacked(&self, plots: &[PlotSeries], inner: Rect, buf: &mut Buffer) {
        if inner.height < 3 || inner.width == 0 {
            return;
        }
        let months = plots.first().map(|p| p.points.len()).unwrap_or(0);
        if months == 0 {
            return;
        }
        let max = match self.spec.kind {
            ChartKind::PercentStackedBar => 100.0,
            _ => stacked_max(plots),
        };
        let muted = Style::default().fg(self.theme.muted());

        // Legend row, with the scale at the right edge
        let scale = self.value_label(max);
        let scale_width = scale.chars().count() as u16;
        let legend_end = inner.x + inner.width.saturating_sub(scale_width + 1);
        let mut x = inner.x;
        for (i, plot) in plots.iter().enumerate() {
            let entry = format!("■ {}", plot.label);
            let width = entry.chars().count() as u16;
            if x + width > legend_end {
                break;
            }
            buf.set_string(
                x,
                inner.y,
                &entry,
                Style::default().fg(self.theme.series_color(i)),
            );
            x += width + 2;
        }
        if scale_width < inner.width {
            buf.set_string(inner.x + inner.width - scale_width, inner.y, &scale, muted);
        }

        let bars = Rect {
            x: inner.x,
            y: inner.y + 1,
            width: inner.width,
            height: inner.height - 2,
        };
        let slot = (bars.width as usize / months).clamp(1, MAX_SLOT_WIDTH as usize) as u16;
        let visible = ((bars.width / slot) as usize).min(months);
        // Latest months win when they do not all fit
        let first = months - visible;
        let bar_width = if slot > 1 { slot - 1 } else { 1 };
        let height = bars.height as f64;

        if max > 0.0 {
            for (col, idx) in (first..months).enumerate() {
                let x = bars.x + col as u16 * slot;
                let mut cumulative = 0.0;
                let mut filled = 0u16;
                for (i, plot) in plots.iter().enumerate() {
                    cumulative += plot.points.get(idx).map(|(_, v)| *v).unwrap_or(0.0);
                    let top = ((cumulative / max) * height).round().min(height) as u16;
                    let style = Style::default().fg(self.theme.series_color(i));
                    for level in filled..top {
                        let y = bars.y + bars.height - 1 - level;
                        for dx in 0..bar_width {
                            buf.set_string(x + dx, y, "█", style);
                        }
                    }
                    filled = filled.max(top);
                }
            }
        }

        // First and last visible month under the bars
        let label_y = inner.y + inner.height - 1;
        let points = &plots[0].points;
        let first_label = points[first].0.short_label();
        buf.set_string(bars.x, label_y, &first_label, muted);
        if visible > 1 {
            let last_label = points[months - 1].0.short_label();
            let last_x = bars.x + ((visible - 1) as u16) * slot;
            let first_end = bars.x + first_label.chars().count() as u16;
            if last_x > first_end && last_x + 6 <= bars.x + bars.width {
                buf.set_string(last_x, label_y, &last_label, muted);
            }
        }
    }
}

impl Widget for ChartPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = format!(" {} ", self.spec.title);
        let block = Block::default()
            .title(Line::from(title).style(
                Style::default()
                    .fg(self.theme.text())
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.muted()));
        let inner = block.inner(area);

        let plots = plot_series(self.series, self.spec);
        if plots.is_empty() || plots.iter().all(|p| p.points.is_empty()) {
            block.render(area, buf);
            if inner.height > 0 {
                let y = inner.y + inner.height / 2;
                Paragraph::new(Line::from("No data").style(Style::default().fg(self.theme.muted())))
                    .alignment(Alignment::Center)
                    .render(Rect { y, height: 1, ..inner }, buf);
            }
            return;
        }

        match self.spec.kind {
            ChartKind::Line => self.render_line(&plots, block, area, buf),
            ChartKind::StackedBar | ChartKind::PercentStackedBar => {
                block.render(area, buf);
                self.render_stacked(&plots, inner, buf);
            }
        }
    }
}

/// Up to four charts laid out two by two
pub struct ChartGrid<'a> {
    charts: &'a [ChartSpec],
    series: &'a AggregatedSeries,
    theme: Theme,
}

impl<'a> ChartGrid<'a> {
    pub fn new(charts: &'a [ChartSpec], series: &'a AggregatedSeries, theme: Theme) -> Self {
        Self {
            charts,
            series,
            theme,
        }
    }

    /// Cell areas for `count` charts
    pub fn cells(area: Rect, count: usize) -> Vec<Rect> {
        match count {
            0 => Vec::new(),
            1 => vec![area],
            2 => Layout::horizontal([Constraint::Percentage(50); 2])
                .split(area)
                .to_vec(),
            _ => {
                let rows = Layout::vertical([Constraint::Percentage(50); 2]).split(area);
                rows.iter()
                    .flat_map(|row| {
                        Layout::horizontal([Constraint::Percentage(50); 2])
                            .split(*row)
                            .to_vec()
                    })
                    .take(count.min(CHARTS_PER_PAGE))
                    .collect()
            }
        }
    }
}

impl Widget for ChartGrid<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let charts = &self.charts[..self.charts.len().min(CHARTS_PER_PAGE)];
        for (spec, cell) in charts.iter().zip(Self::cells(area, charts.len())) {
            ChartPanel::new(spec, self.series, self.theme).render(cell, buf);
        }
    }
}
