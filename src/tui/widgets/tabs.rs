//! Tab bar widget for dataset navigation

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    widgets::Widget,
};

use crate::tui::theme::Theme;

/// Next tab index (wrapping)
pub fn next_index(current: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (current + 1) % len
    }
}

/// Previous tab index (wrapping)
pub fn prev_index(current: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (current + len - 1) % len
    }
}

/// Tab bar showing one tab per configured dataset
pub struct TabBar<'a> {
    labels: &'a [String],
    selected: usize,
    theme: Theme,
}

impl<'a> TabBar<'a> {
    pub fn new(labels: &'a [String], selected: usize, theme: Theme) -> Self {
        Self {
            labels,
            selected,
            theme,
        }
    }

    fn display(&self, idx: usize) -> String {
        let label = &self.labels[idx];
        if idx == self.selected {
            format!("[{}]", label)
        } else {
            label.clone()
        }
    }
}

impl Widget for TabBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 || self.labels.is_empty() {
            return;
        }

        // Total width of all tabs for centering
        let total_width: u16 = (0..self.labels.len())
            .map(|idx| self.display(idx).chars().count() as u16 + 2)
            .sum::<u16>()
            .saturating_sub(2);

        let mut x = area.x + (area.width.saturating_sub(total_width)) / 2;

        for idx in 0..self.labels.len() {
            let display = self.display(idx);
            let display_len = display.chars().count() as u16;
            if x + display_len > area.x + area.width {
                break;
            }

            let style = if idx == self.selected {
                Style::default()
                    .fg(self.theme.accent())
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.theme.muted())
            };

            buf.set_string(x, area.y, &display, style);
            x += display_len + 2;
        }
    }
}
