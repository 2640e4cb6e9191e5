//! Application state and event loop

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    DefaultTerminal, Frame,
};
use tracing::warn;

use crate::config::AppConfig;
use crate::services::{Aggregator, DataLoaderService, LoadResult};
use crate::types::{AggregatedSeries, DashError, DatasetSpec, FilterSelection, Month, QuickPick, Summary};

use super::theme::Theme;
use super::widgets::{
    chart::{page_count, ChartGrid, CHARTS_PER_PAGE},
    filter_bar::FilterBar,
    help::HelpPopup,
    summary::{grid_height, SummaryCards},
    tabs::{next_index, prev_index, TabBar},
};

/// Application state
pub enum AppState {
    /// Dataset loaded and aggregated for the current filters
    Ready { data: Box<AppData> },
    /// Loading or aggregation failed
    Error { message: String },
}

/// Loaded dataset plus the views derived from the current filters
pub struct AppData {
    pub load: Arc<LoadResult>,
    /// Categories present in the data, sorted
    pub categories: Vec<String>,
    /// First and last month present
    pub available: (Month, Month),
    pub selection: FilterSelection,
    pub summary: Summary,
    pub series: AggregatedSeries,
}

/// Main application
pub struct App {
    config: AppConfig,
    loader: DataLoaderService,
    theme: Theme,
    dataset_idx: usize,
    state: AppState,
    /// 0 is "Combined", `i` is `categories[i - 1]`
    category_idx: usize,
    breakdown: bool,
    window: Option<(Month, Month)>,
    quick_pick: Option<QuickPick>,
    chart_page: usize,
    show_help: bool,
    should_quit: bool,
}

impl App {
    /// Create the app and load the dataset at `dataset_idx`
    pub fn new(config: AppConfig, loader: DataLoaderService, theme: Theme, dataset_idx: usize) -> Self {
        let dataset_idx = dataset_idx.min(config.datasets.len().saturating_sub(1));
        let mut app = Self {
            config,
            loader,
            theme,
            dataset_idx,
            state: AppState::Error {
                message: "Not loaded".to_string(),
            },
            category_idx: 0,
            breakdown: false,
            window: None,
            quick_pick: Some(QuickPick::All),
            chart_page: 0,
            show_help: false,
            should_quit: false,
        };
        app.reload();
        app
    }

    fn dataset(&self) -> &DatasetSpec {
        &self.config.datasets[self.dataset_idx]
    }

    fn available(&self) -> Option<(Month, Month)> {
        match &self.state {
            AppState::Ready { data } => Some(data.available),
            AppState::Error { .. } => None,
        }
    }

    /// Load (or reuse) the current dataset and rebuild every view
    fn reload(&mut self) {
        let dataset = &self.config.datasets[self.dataset_idx];
        match self.loader.load(dataset) {
            Ok(load) => self.apply_load(load),
            Err(e) => {
                warn!(dataset = %dataset.name, error = %e, "failed to load dataset");
                self.state = AppState::Error {
                    message: e.describe(),
                };
            }
        }
    }

    fn apply_load(&mut self, load: Arc<LoadResult>) {
        let Some(available) = load.month_range() else {
            self.state = AppState::Error {
                message: format!("{}: no rows with a readable period", load.dataset),
            };
            return;
        };
        let categories = load.categories();
        if self.category_idx > categories.len() {
            self.category_idx = 0;
        }
        let (first, last) = available;
        self.window = Some(match (self.quick_pick, self.window) {
            (Some(pick), _) => pick.window(first, last),
            (None, Some((start, end))) => {
                let start = start.max(first).min(last);
                (start, end.max(start).min(last))
            }
            (None, None) => available,
        });
        self.rebuild(load, categories, available);
    }

    /// Re-aggregate the loaded rows for the current filters
    fn refresh(&mut self) {
        let (load, categories, available) = match &self.state {
            AppState::Ready { data } => (
                Arc::clone(&data.load),
                data.categories.clone(),
                data.available,
            ),
            AppState::Error { .. } => return,
        };
        self.rebuild(load, categories, available);
    }

    fn rebuild(&mut self, load: Arc<LoadResult>, categories: Vec<String>, available: (Month, Month)) {
        let (start, end) = self.window.unwrap_or(available);
        let selection = self.selection(&categories, start, end);
        let metrics = &self.dataset().metric_set;
        let result = Aggregator::aggregate(&load.rows, &selection, metrics).and_then(|series| {
            Ok((series, Aggregator::summary(&load.rows, &selection, metrics)?))
        });

        self.state = match result {
            Ok((series, summary)) => AppState::Ready {
                data: Box::new(AppData {
                    load,
                    categories,
                    available,
                    selection,
                    summary,
                    series,
                }),
            },
            Err(e) => AppState::Error {
                message: e.describe(),
            },
        };
    }

    fn selection(&self, categories: &[String], start: Month, end: Month) -> FilterSelection {
        match self
            .category_idx
            .checked_sub(1)
            .and_then(|i| categories.get(i))
        {
            Some(category) => FilterSelection::with_categories([category.clone()], start, end),
            None if self.breakdown => {
                FilterSelection::with_categories(categories.iter().cloned(), start, end)
            }
            None => FilterSelection::combined(start, end),
        }
    }

    /// Handle keyboard events
    pub fn handle_event(&mut self, event: Event) {
        if let Event::Key(key) = event {
            if key.kind == KeyEventKind::Press {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                        self.should_quit = true;
                    }
                    KeyCode::Char('?') => {
                        self.show_help = !self.show_help;
                    }
                    KeyCode::Tab => {
                        self.switch_dataset(next_index(self.dataset_idx, self.config.datasets.len()));
                    }
                    KeyCode::BackTab => {
                        self.switch_dataset(prev_index(self.dataset_idx, self.config.datasets.len()));
                    }
                    KeyCode::Char('c') => self.cycle_category(),
                    KeyCode::Char('b') => {
                        self.breakdown = !self.breakdown;
                        self.refresh();
                    }
                    KeyCode::Char('h') => self.shift_start(-1),
                    KeyCode::Char('l') => self.shift_start(1),
                    KeyCode::Left => self.shift_end(-1),
                    KeyCode::Right => self.shift_end(1),
                    KeyCode::Char('3') => self.apply_quick_pick(QuickPick::LastMonths(3)),
                    KeyCode::Char('6') => self.apply_quick_pick(QuickPick::LastMonths(6)),
                    KeyCode::Char('y') => self.apply_quick_pick(QuickPick::LastMonths(12)),
                    KeyCode::Char('t') => self.apply_quick_pick(QuickPick::YearToDate),
                    KeyCode::Char('a') => self.apply_quick_pick(QuickPick::All),
                    KeyCode::Down | KeyCode::Char('j') => {
                        let last = page_count(self.dataset().charts.len()) - 1;
                        self.chart_page = (self.chart_page + 1).min(last);
                    }
                    KeyCode::Up | KeyCode::Char('k') => {
                        self.chart_page = self.chart_page.saturating_sub(1);
                    }
                    KeyCode::Char('r') => {
                        let name = self.dataset().name.clone();
                        self.loader.invalidate_dataset(&name);
                        self.reload();
                    }
                    _ => {}
                }
            }
        }
    }

    fn switch_dataset(&mut self, idx: usize) {
        if idx == self.dataset_idx {
            return;
        }
        self.dataset_idx = idx;
        self.category_idx = 0;
        self.breakdown = false;
        self.chart_page = 0;
        // A custom window does not carry over; quick picks do
        self.window = None;
        self.reload();
    }

    fn cycle_category(&mut self) {
        let len = match &self.state {
            AppState::Ready { data } => data.categories.len() + 1,
            AppState::Error { .. } => return,
        };
        self.category_idx = (self.category_idx + 1) % len;
        self.refresh();
    }

    fn shift_start(&mut self, delta: i32) {
        let (Some((start, end)), Some((first, _))) = (self.window, self.available()) else {
            return;
        };
        let start = start.add_months(delta).max(first).min(end);
        self.set_window(start, end);
    }

    fn shift_end(&mut self, delta: i32) {
        let (Some((start, end)), Some((_, last))) = (self.window, self.available()) else {
            return;
        };
        let end = end.add_months(delta).min(last).max(start);
        self.set_window(start, end);
    }

    fn set_window(&mut self, start: Month, end: Month) {
        self.window = Some((start, end));
        self.quick_pick = None;
        self.refresh();
    }

    fn apply_quick_pick(&mut self, pick: QuickPick) {
        self.quick_pick = Some(pick);
        if let Some((first, last)) = self.available() {
            self.window = Some(pick.window(first, last));
        }
        self.refresh();
    }

    /// Check if app should quit
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Draw the application
    pub fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn render_separator(&self, area: Rect, buf: &mut Buffer) {
        let line = "─".repeat(area.width as usize);
        buf.set_string(area.x, area.y, &line, Style::default().fg(self.theme.muted()));
    }

    fn render_keybindings(&self, area: Rect, buf: &mut Buffer) {
        let key = Style::default().fg(self.theme.accent());
        let desc = Style::default().fg(self.theme.muted());
        let mut spans = Vec::new();
        for (k, d) in [
            ("q", "Quit"),
            ("Tab", "Dataset"),
            ("c", "Category"),
            ("b", "Breakdown"),
            ("3/6/y/t/a", "Window"),
            ("?", "Help"),
        ] {
            if !spans.is_empty() {
                spans.push(Span::raw("  "));
            }
            spans.push(Span::styled(k, key));
            spans.push(Span::styled(format!(": {}", d), desc));
        }
        Paragraph::new(Line::from(spans))
            .alignment(Alignment::Center)
            .render(area, buf);
    }

    fn render_ready(&self, data: &AppData, area: Rect, buf: &mut Buffer) {
        let dataset = self.dataset();
        let cards_height = grid_height(dataset.cards.len(), area.width);
        let chunks = Layout::vertical([
            Constraint::Length(1),            // Filters
            Constraint::Length(1),            // Blank
            Constraint::Length(cards_height), // Summary cards
            Constraint::Min(0),               // Charts
        ])
        .split(area);

        let pages = page_count(dataset.charts.len());
        FilterBar::new(&dataset.category_label, &data.selection, self.theme)
            .with_breakdown(self.breakdown && self.category_idx == 0)
            .with_quick_pick(self.quick_pick)
            .with_page(self.chart_page.min(pages - 1), pages)
            .with_dropped(data.load.dropped_periods)
            .render(chunks[0], buf);

        SummaryCards::new(&dataset.cards, &data.summary, self.theme).render(chunks[2], buf);

        let start = self.chart_page * CHARTS_PER_PAGE;
        let charts = dataset.charts.get(start..).unwrap_or(&[]);
        ChartGrid::new(charts, &data.series, self.theme).render(chunks[3], buf);
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::vertical([
            Constraint::Length(1), // Top padding
            Constraint::Length(1), // Tabs
            Constraint::Length(1), // Separator
            Constraint::Min(0),    // Body
            Constraint::Length(1), // Separator
            Constraint::Length(1), // Keybindings
        ])
        .split(area);

        let labels: Vec<String> = self.config.datasets.iter().map(|d| d.title.clone()).collect();
        TabBar::new(&labels, self.dataset_idx, self.theme).render(chunks[1], buf);
        self.render_separator(chunks[2], buf);

        match &self.state {
            AppState::Ready { data } => self.render_ready(data, chunks[3], buf),
            AppState::Error { message } => {
                let body = chunks[3];
                if body.height > 0 {
                    let y = body.y + body.height / 2;
                    Paragraph::new(Line::from(Span::styled(
                        format!("Error: {}", message),
                        Style::default()
                            .fg(self.theme.error())
                            .add_modifier(Modifier::BOLD),
                    )))
                    .alignment(Alignment::Center)
                    .render(Rect { y, height: 1, ..body }, buf);
                }
            }
        }

        self.render_separator(chunks[4], buf);
        self.render_keybindings(chunks[5], buf);

        if self.show_help {
            let popup_area = HelpPopup::centered_area(area);
            HelpPopup::new(self.theme).render(popup_area, buf);
        }
    }
}

/// Run the TUI application
pub fn run(config: AppConfig, dataset: Option<&str>) -> anyhow::Result<()> {
    let dataset_idx = match dataset {
        Some(name) => config
            .datasets
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| DashError::UnknownDataset(name.to_string()))?,
        None => config.default_index(),
    };

    // Detect before raw mode
    let theme = Theme::detect();
    let loader = DataLoaderService::new(&config.data_dir);
    let mut app = App::new(config, loader, theme, dataset_idx);

    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, &mut app);
    ratatui::restore();
    result
}

fn run_app(terminal: &mut DefaultTerminal, app: &mut App) -> anyhow::Result<()> {
    loop {
        terminal.draw(|frame| app.draw(frame))?;

        if app.should_quit() {
            break;
        }

        if event::poll(Duration::from_millis(250))? {
            app.handle_event(event::read()?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChartKind, ChartSpec};
    use crossterm::event::{KeyEvent, KeyModifiers};
    use std::fs;
    use tempfile::TempDir;

    const CLAIMS_CSV: &str = "\
year_month,representation_status,claims_volume,settlement_volume,total_settlement_value
2023-11,Represented,5,1,900
2024-01,Represented,10,4,4000
2024-01,Unrepresented,6,2,1000
2024-03,Represented,8,5,5500
";

    fn m(year: i32, month: u32) -> Month {
        Month::new(year, month).unwrap()
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn make_app_with(config_fn: impl FnOnce(&mut AppConfig)) -> (TempDir, App) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("oic_dashboard.csv"), CLAIMS_CSV).unwrap();
        let mut config = AppConfig {
            data_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        config_fn(&mut config);
        let loader = DataLoaderService::new(dir.path());
        let app = App::new(config, loader, Theme::Dark, 0);
        (dir, app)
    }

    fn make_app() -> (TempDir, App) {
        make_app_with(|_| {})
    }

    fn data(app: &App) -> &AppData {
        match &app.state {
            AppState::Ready { data } => data,
            AppState::Error { message } => panic!("app in error state: {}", message),
        }
    }

    fn render(app: &App) -> String {
        let area = Rect::new(0, 0, 140, 45);
        let mut buf = Buffer::empty(area);
        app.render(area, &mut buf);
        buf.content().iter().map(|c| c.symbol()).collect()
    }

    // ========== Loading ==========

    #[test]
    fn test_app_initial_state() {
        let (_dir, app) = make_app();
        let data = data(&app);
        assert_eq!(data.available, (m(2023, 11), m(2024, 3)));
        assert_eq!(data.categories, vec!["Represented", "Unrepresented"]);
        assert!(data.selection.is_combined());
        assert_eq!(data.series.len(), 5);
        assert_eq!(data.summary.value("claims_volume"), 29.0);
        assert!(!app.should_quit());
    }

    #[test]
    fn test_missing_source_is_error_state() {
        let (_dir, mut app) = make_app();
        // claim_sources has no file in the data directory
        app.handle_event(key(KeyCode::Tab));
        assert_eq!(app.dataset_idx, 1);
        assert!(matches!(app.state, AppState::Error { .. }));
        assert!(render(&app).contains("Error:"));

        app.handle_event(Event::Key(KeyEvent::new(KeyCode::BackTab, KeyModifiers::SHIFT)));
        assert_eq!(app.dataset_idx, 0);
        assert!(matches!(app.state, AppState::Ready { .. }));
    }

    #[test]
    fn test_dropped_periods_shown_in_filter_bar() {
        let (dir, mut app) = make_app();
        assert!(!render(&app).contains("dropped"));

        fs::write(
            dir.path().join("oic_dashboard.csv"),
            format!("{}Total,Represented,29,12,11400\n", CLAIMS_CSV),
        )
        .unwrap();
        app.handle_event(key(KeyCode::Char('r')));
        assert_eq!(data(&app).load.dropped_periods, 1);
        assert_eq!(data(&app).summary.value("claims_volume"), 29.0);
        assert!(render(&app).contains("1 row dropped (bad period)"));
    }

    #[test]
    fn test_invalid_data_file_message() {
        let (dir, mut app) = make_app();
        fs::write(
            dir.path().join("oic_dashboard.csv"),
            "year_month,claims_volume\n2024-01,1\n",
        )
        .unwrap();
        app.handle_event(key(KeyCode::Char('r')));
        assert!(render(&app).contains("Error: data file invalid"));
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let (dir, mut app) = make_app();
        fs::write(
            dir.path().join("oic_dashboard.csv"),
            format!("{}2024-03,Unrepresented,1,0,0\n", CLAIMS_CSV),
        )
        .unwrap();
        app.handle_event(key(KeyCode::Char('r')));
        assert_eq!(data(&app).summary.value("claims_volume"), 30.0);
    }

    // ========== Quit / help ==========

    #[test]
    fn test_app_quit_on_q() {
        let (_dir, mut app) = make_app();
        app.handle_event(key(KeyCode::Char('q')));
        assert!(app.should_quit());
    }

    #[test]
    fn test_app_quit_on_esc() {
        let (_dir, mut app) = make_app();
        app.handle_event(key(KeyCode::Esc));
        assert!(app.should_quit());
    }

    #[test]
    fn test_app_help_toggle() {
        let (_dir, mut app) = make_app();
        assert!(!app.show_help);
        app.handle_event(key(KeyCode::Char('?')));
        assert!(app.show_help);
        assert!(render(&app).contains("Press ? to close"));
        app.handle_event(key(KeyCode::Char('?')));
        assert!(!app.show_help);
    }

    // ========== Category filters ==========

    #[test]
    fn test_cycle_category() {
        let (_dir, mut app) = make_app();

        app.handle_event(key(KeyCode::Char('c')));
        let selection = &data(&app).selection;
        assert_eq!(selection.categories.iter().collect::<Vec<_>>(), vec!["Represented"]);
        assert_eq!(data(&app).summary.value("claims_volume"), 23.0);

        app.handle_event(key(KeyCode::Char('c')));
        assert_eq!(data(&app).summary.value("claims_volume"), 6.0);

        // Wraps back to combined
        app.handle_event(key(KeyCode::Char('c')));
        assert!(data(&app).selection.is_combined());
    }

    #[test]
    fn test_breakdown_toggle() {
        let (_dir, mut app) = make_app();
        app.handle_event(key(KeyCode::Char('b')));
        let data = data(&app);
        assert_eq!(data.series.categories, vec!["Represented", "Unrepresented"]);
        // 5 months x 2 categories, gap-filled
        assert_eq!(data.series.len(), 10);
        assert_eq!(data.summary.value("claims_volume"), 29.0);
    }

    // ========== Date window ==========

    #[test]
    fn test_shift_start_clamps_to_data() {
        let (_dir, mut app) = make_app();
        app.handle_event(key(KeyCode::Char('l')));
        assert_eq!(data(&app).selection.start_month, m(2023, 12));
        assert_eq!(app.quick_pick, None);

        app.handle_event(key(KeyCode::Char('h')));
        app.handle_event(key(KeyCode::Char('h')));
        assert_eq!(data(&app).selection.start_month, m(2023, 11));
    }

    #[test]
    fn test_shift_end_never_crosses_start() {
        let (_dir, mut app) = make_app();
        app.handle_event(key(KeyCode::Right));
        assert_eq!(data(&app).selection.end_month, m(2024, 3));

        for _ in 0..10 {
            app.handle_event(key(KeyCode::Left));
        }
        let selection = &data(&app).selection;
        assert_eq!(selection.end_month, m(2023, 11));
        assert_eq!(selection.start_month, m(2023, 11));
    }

    #[test]
    fn test_quick_picks() {
        let (_dir, mut app) = make_app();

        app.handle_event(key(KeyCode::Char('3')));
        let selection = &data(&app).selection;
        assert_eq!((selection.start_month, selection.end_month), (m(2024, 1), m(2024, 3)));
        assert_eq!(data(&app).summary.value("claims_volume"), 24.0);

        app.handle_event(key(KeyCode::Char('t')));
        assert_eq!(data(&app).selection.start_month, m(2024, 1));

        app.handle_event(key(KeyCode::Char('6')));
        assert_eq!(data(&app).selection.start_month, m(2023, 11));

        app.handle_event(key(KeyCode::Char('a')));
        assert_eq!(app.quick_pick, Some(QuickPick::All));
        assert_eq!(data(&app).summary.value("claims_volume"), 29.0);
    }

    // ========== Chart paging ==========

    #[test]
    fn test_chart_page_single_page() {
        let (_dir, mut app) = make_app();
        app.handle_event(key(KeyCode::Char('j')));
        assert_eq!(app.chart_page, 0);
    }

    #[test]
    fn test_chart_paging() {
        let (_dir, mut app) = make_app_with(|config| {
            config.datasets[0].charts.push(ChartSpec::new(
                "claims_volume",
                "Claims by Representation",
                ChartKind::StackedBar,
            ));
        });
        app.handle_event(key(KeyCode::Char('j')));
        assert_eq!(app.chart_page, 1);
        assert!(render(&app).contains("Claims by Representation"));
        app.handle_event(key(KeyCode::Char('j')));
        assert_eq!(app.chart_page, 1);
        app.handle_event(key(KeyCode::Char('k')));
        assert_eq!(app.chart_page, 0);
    }

    // ========== Rendering ==========

    #[test]
    fn test_render_dashboard() {
        let (_dir, app) = make_app();
        let content = render(&app);
        assert!(content.contains("[OIC Portal Dashboard]"));
        assert!(content.contains("Representation: Combined"));
        assert!(content.contains("Total Claims"));
        assert!(content.contains("New Claims Over Time"));
    }
}
