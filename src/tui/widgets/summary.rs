//! Summary cards - headline totals for the filtered window

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Widget},
};

use crate::tui::theme::Theme;
use crate::types::{CardSpec, Summary};

/// Card dimensions
const CARD_WIDTH: u16 = 28;
pub const CARD_HEIGHT: u16 = 5;

/// Upper bound so cards stay readable on wide terminals
const MAX_COLS: usize = 4;

/// Number of cards per row for the available width
pub fn cards_per_row(width: u16) -> usize {
    let usable_width = width.saturating_sub(4);
    let cards = (usable_width / (CARD_WIDTH + 2)) as usize;
    cards.clamp(1, MAX_COLS)
}

/// Height needed to show `count` cards in `width`
pub fn grid_height(count: usize, width: u16) -> u16 {
    if count == 0 {
        return 0;
    }
    let rows = count.div_ceil(cards_per_row(width));
    rows as u16 * (CARD_HEIGHT + 1)
}

/// Card grid widget
pub struct SummaryCards<'a> {
    cards: &'a [CardSpec],
    summary: &'a Summary,
    theme: Theme,
}

impl<'a> SummaryCards<'a> {
    pub fn new(cards: &'a [CardSpec], summary: &'a Summary, theme: Theme) -> Self {
        Self {
            cards,
            summary,
            theme,
        }
    }

    fn build_cards(&self) -> Vec<StatCard> {
        self.cards
            .iter()
            .map(|spec| {
                let color = self.theme.card_color(spec.format);
                StatCard {
                    title: spec.title.clone(),
                    value: spec.format.format(self.summary.value(&spec.metric)),
                    value_color: color,
                    border_color: color,
                }
            })
            .collect()
    }

    fn render_card(&self, area: Rect, buf: &mut Buffer, card: &StatCard) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(card.border_color));
        block.render(area, buf);

        if area.height > 2 {
            let title = truncate(&card.title, area.width.saturating_sub(2) as usize);
            let title_x =
                area.x + (area.width.saturating_sub(title.chars().count() as u16)) / 2;
            buf.set_string(
                title_x,
                area.y + 1,
                &title,
                Style::default().fg(card.border_color),
            );
        }

        if area.height > 3 {
            let value = &card.value;
            let value_x =
                area.x + (area.width.saturating_sub(value.chars().count() as u16)) / 2;
            buf.set_string(
                value_x,
                area.y + 3,
                value,
                Style::default()
                    .fg(card.value_color)
                    .add_modifier(Modifier::BOLD),
            );
        }
    }
}

impl Widget for SummaryCards<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let cards = self.build_cards();
        if cards.is_empty() {
            return;
        }

        let cols = cards_per_row(area.width).min(cards.len());
        let total_width = (cols as u16) * CARD_WIDTH + (cols.saturating_sub(1) as u16) * 2;
        let start_x = area.x + (area.width.saturating_sub(total_width)) / 2;

        for (i, card) in cards.iter().enumerate() {
            let row = i / cols;
            let col = i % cols;
            let card_x = start_x + (col as u16) * (CARD_WIDTH + 2);
            let card_y = area.y + (row as u16) * (CARD_HEIGHT + 1);

            if card_y + CARD_HEIGHT > area.y + area.height {
                continue;
            }

            let card_area = Rect {
                x: card_x,
                y: card_y,
                width: CARD_WIDTH.min(area.width),
                height: CARD_HEIGHT,
            };
            self.render_card(card_area, buf, card);
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

struct StatCard {
    title: String,
    value: String,
    value_color: Color,
    border_color: Color,
}
