//! Help popup widget - displays keyboard shortcuts

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget},
};

use crate::tui::theme::Theme;

/// Version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Width and height of the help popup
const POPUP_WIDTH: u16 = 48;
const POPUP_HEIGHT: u16 = 25;

const NAVIGATION: &[(&str, &str)] = &[
    ("Tab / Shift+Tab", "Switch dataset"),
    ("j / k", "Next / previous charts"),
];

const FILTERS: &[(&str, &str)] = &[
    ("c", "Cycle category"),
    ("b", "Toggle per-category breakdown"),
    ("h / l", "Start month back / forward"),
    ("Left / Right", "End month back / forward"),
    ("3 / 6 / y", "Last 3 / 6 / 12 months"),
    ("t", "Year to date"),
    ("a", "All months"),
];

const GENERAL: &[(&str, &str)] = &[
    ("r", "Reload data files"),
    ("q / Esc", "Quit"),
    ("?", "Toggle help"),
];

/// Help popup widget showing keyboard shortcuts
pub struct HelpPopup {
    theme: Theme,
}

impl HelpPopup {
    pub fn new(theme: Theme) -> Self {
        Self { theme }
    }

    /// Calculate centered popup area
    pub fn centered_area(area: Rect) -> Rect {
        let x = area.x + (area.width.saturating_sub(POPUP_WIDTH)) / 2;
        let y = area.y + (area.height.saturating_sub(POPUP_HEIGHT)) / 2;
        Rect {
            x,
            y,
            width: POPUP_WIDTH.min(area.width),
            height: POPUP_HEIGHT.min(area.height),
        }
    }

    /// Header, separator, then one line per binding
    fn render_section(
        &self,
        rows: &[Rect],
        buf: &mut Buffer,
        header: &str,
        bindings: &[(&str, &str)],
    ) {
        let Some((header_row, rest)) = rows.split_first() else {
            return;
        };
        Paragraph::new(Line::from(Span::styled(
            header.to_string(),
            Style::default()
                .fg(self.theme.date())
                .add_modifier(Modifier::BOLD),
        )))
        .render(*header_row, buf);

        if let Some(sep_row) = rest.first().filter(|r| !r.is_empty()) {
            let sep = "─".repeat(sep_row.width as usize);
            buf.set_string(
                sep_row.x,
                sep_row.y,
                &sep,
                Style::default().fg(self.theme.muted()),
            );
        }

        for ((key, desc), row) in bindings.iter().zip(rest.iter().skip(1)) {
            render_keybinding(*row, buf, key, desc, self.theme);
        }
    }
}

impl Default for HelpPopup {
    fn default() -> Self {
        Self::new(Theme::default())
    }
}

impl Widget for HelpPopup {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Clear the area first (for overlay effect)
        Clear.render(area, buf);

        let title = format!(" claimdash v{} ", VERSION);
        let block = Block::default()
            .title(title)
            .title_alignment(Alignment::Center)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.accent()));

        let inner = block.inner(area);
        block.render(area, buf);

        let rows: Vec<Rect> = Layout::vertical([Constraint::Length(1); POPUP_HEIGHT as usize - 2])
            .split(inner)
            .to_vec();

        // padding + (header + separator + bindings) per section, blank between
        let mut offset = 1;
        for (header, bindings) in [
            ("Navigation", NAVIGATION),
            ("Filters", FILTERS),
            ("General", GENERAL),
        ] {
            let end = (offset + 2 + bindings.len()).min(rows.len());
            if offset >= end {
                break;
            }
            self.render_section(&rows[offset..end], buf, header, bindings);
            offset = end + 1;
        }

        if let Some(last) = rows.last() {
            Paragraph::new(Line::from(Span::styled(
                "Press ? to close",
                Style::default().fg(self.theme.muted()),
            )))
            .alignment(Alignment::Center)
            .render(*last, buf);
        }
    }
}

/// Render a single keybinding line
fn render_keybinding(area: Rect, buf: &mut Buffer, key: &str, desc: &str, theme: Theme) {
    let line = Line::from(vec![
        Span::styled(
            format!("  {:<18}", key),
            Style::default().fg(theme.accent()),
        ),
        Span::styled(desc.to_string(), Style::default().fg(theme.text())),
    ]);
    Paragraph::new(line)
        .alignment(Alignment::Left)
        .render(area, buf);
}
