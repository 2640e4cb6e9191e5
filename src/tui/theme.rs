//! Terminal theme detection and color definitions

use ratatui::style::Color;

use crate::types::ValueFormat;

/// Terminal color scheme (dark or light background)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// Category colors for dark backgrounds, cycled by series index
const DARK_SERIES: [Color; 8] = [
    Color::Cyan,
    Color::Yellow,
    Color::Magenta,
    Color::Green,
    Color::LightBlue,
    Color::LightRed,
    Color::Indexed(208), // orange
    Color::Indexed(141), // lavender
];

/// Category colors for light backgrounds (ANSI 256, darker shades)
const LIGHT_SERIES: [Color; 8] = [
    Color::Indexed(25),
    Color::Indexed(130),
    Color::Indexed(90),
    Color::Indexed(22),
    Color::Indexed(31),
    Color::Indexed(124),
    Color::Indexed(166),
    Color::Indexed(55),
];

impl Theme {
    /// Auto-detect terminal theme from background luminance.
    /// Must be called **before** entering raw mode (ratatui::init).
    /// Falls back to Dark if detection fails.
    pub fn detect() -> Self {
        match terminal_light::luma() {
            Ok(luma) if luma > 0.6 => Self::Light,
            _ => Self::Dark,
        }
    }

    /// Primary text color (headers, body text)
    pub fn text(self) -> Color {
        match self {
            Self::Dark => Color::White,
            Self::Light => Color::Black,
        }
    }

    /// Active/accent color (selected tabs, keybinding keys, interactive elements)
    pub fn accent(self) -> Color {
        match self {
            Self::Dark => Color::Cyan,
            Self::Light => Color::Indexed(25), // dark blue (ANSI 256)
        }
    }

    /// Secondary/muted text (separators, inactive tabs, hints)
    pub fn muted(self) -> Color {
        match self {
            Self::Dark => Color::DarkGray,
            Self::Light => Color::Gray,
        }
    }

    /// Month and window text color
    pub fn date(self) -> Color {
        match self {
            Self::Dark => Color::Yellow,
            Self::Light => Color::Indexed(130), // dark orange/yellow (ANSI 256)
        }
    }

    /// Money text color
    pub fn money(self) -> Color {
        match self {
            Self::Dark => Color::Magenta,
            Self::Light => Color::Indexed(90), // dark magenta (ANSI 256)
        }
    }

    /// Count/volume color
    pub fn volume(self) -> Color {
        match self {
            Self::Dark => Color::Green,
            Self::Light => Color::Indexed(22), // dark green (ANSI 256)
        }
    }

    /// Rate/percentage color
    pub fn rate(self) -> Color {
        match self {
            Self::Dark => Color::LightRed,
            Self::Light => Color::Red,
        }
    }

    /// Error/negative indicator color
    pub fn error(self) -> Color {
        match self {
            Self::Dark => Color::Red,
            Self::Light => Color::Indexed(124), // dark red (ANSI 256)
        }
    }

    /// Summary card color for a value format
    pub fn card_color(self, format: ValueFormat) -> Color {
        match format {
            ValueFormat::Count => self.volume(),
            ValueFormat::Money | ValueFormat::MoneyPrecise => self.money(),
            ValueFormat::Percent => self.rate(),
        }
    }

    /// Color of the `idx`-th plotted series (wraps)
    pub fn series_color(self, idx: usize) -> Color {
        let palette = match self {
            Self::Dark => &DARK_SERIES,
            Self::Light => &LIGHT_SERIES,
        };
        palette[idx % palette.len()]
    }
}
