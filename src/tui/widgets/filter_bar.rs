//! Filter bar: current category selection, date window and chart page

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

use crate::tui::theme::Theme;
use crate::types::{FilterSelection, QuickPick, COMBINED_CATEGORY};

pub struct FilterBar<'a> {
    category_label: &'a str,
    selection: &'a FilterSelection,
    breakdown: bool,
    quick_pick: Option<QuickPick>,
    page: usize,
    page_count: usize,
    dropped: usize,
    theme: Theme,
}

impl<'a> FilterBar<'a> {
    pub fn new(category_label: &'a str, selection: &'a FilterSelection, theme: Theme) -> Self {
        Self {
            category_label,
            selection,
            breakdown: false,
            quick_pick: None,
            page: 0,
            page_count: 1,
            dropped: 0,
            theme,
        }
    }

    pub fn with_breakdown(mut self, breakdown: bool) -> Self {
        self.breakdown = breakdown;
        self
    }

    pub fn with_quick_pick(mut self, pick: Option<QuickPick>) -> Self {
        self.quick_pick = pick;
        self
    }

    pub fn with_page(mut self, page: usize, page_count: usize) -> Self {
        self.page = page;
        self.page_count = page_count;
        self
    }

    /// Rows skipped at load for an unreadable period
    pub fn with_dropped(mut self, dropped: usize) -> Self {
        self.dropped = dropped;
        self
    }

    fn category_text(&self) -> String {
        if self.selection.is_combined() {
            COMBINED_CATEGORY.to_string()
        } else if self.breakdown {
            format!("All ({}), by category", self.selection.categories.len())
        } else {
            self.selection
                .categories
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    fn window_text(&self) -> String {
        let months = self.selection.months().len();
        format!(
            "{} to {} ({} month{})",
            self.selection.start_month.short_label(),
            self.selection.end_month.short_label(),
            months,
            if months == 1 { "" } else { "s" }
        )
    }
}

impl Widget for FilterBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let muted = Style::default().fg(self.theme.muted());
        let mut spans = vec![
            Span::styled(format!("{}: ", self.category_label), muted),
            Span::styled(
                self.category_text(),
                Style::default()
                    .fg(self.theme.accent())
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("  │  ", muted),
            Span::styled(self.window_text(), Style::default().fg(self.theme.date())),
        ];
        if let Some(pick) = self.quick_pick {
            spans.push(Span::styled(format!(" [{}]", pick.label()), muted));
        }
        if self.page_count > 1 {
            spans.push(Span::styled("  │  ", muted));
            spans.push(Span::styled(
                format!("Charts {}/{}", self.page + 1, self.page_count),
                Style::default().fg(self.theme.text()),
            ));
        }
        if self.dropped > 0 {
            spans.push(Span::styled("  │  ", muted));
            spans.push(Span::styled(
                format!(
                    "{} row{} dropped (bad period)",
                    self.dropped,
                    if self.dropped == 1 { "" } else { "s" }
                ),
                Style::default().fg(self.theme.error()),
            ));
        }

        Paragraph::new(Line::from(spans))
            .alignment(Alignment::Center)
            .render(area, buf);
    }
}
