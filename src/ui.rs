use chrono::Utc;
use crossterm::event::KeyCode;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::chart::PriceChart;
use crate::config::{CHART_HISTORY, Strategy};
use crate::estimator::{GasPriceSample, Poller, SampleSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardState {
    Loading,
    Displaying,
    Paused,
}

pub struct Dashboard {
    pub should_quit: bool,
    paused: bool,
    sample: Option<GasPriceSample>,
    chart: PriceChart,
    rpc_url: String,
}

impl Dashboard {
    pub fn new(rpc_url: String) -> Self {
        Self {
            should_quit: false,
            paused: false,
            sample: None,
            chart: PriceChart::new(CHART_HISTORY),
            rpc_url,
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
        self.chart.dispose();
    }

    pub fn state(&self) -> DashboardState {
        match (self.paused, &self.sample) {
            (true, _) => DashboardState::Paused,
            (false, None) => DashboardState::Loading,
            (false, Some(_)) => DashboardState::Displaying,
        }
    }

    pub fn sample(&self) -> Option<&GasPriceSample> {
        self.sample.as_ref()
    }

    /// Replaces the displayed sample and feeds its standard price to the chart.
    pub fn apply_sample(&mut self, sample: GasPriceSample) {
        self.chart.push(sample.standard, sample.time);
        self.sample = Some(sample);
    }

    /// Flips the pause flag and tells the poller. The last sample stays.
    pub fn toggle_pause(&mut self, poller: &mut Poller) {
        self.paused = !self.paused;
        poller.set_paused(self.paused);
    }

    pub fn handle_key(&mut self, code: KeyCode, poller: &mut Poller) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Char('p') | KeyCode::Char(' ') => self.toggle_pause(poller),
            KeyCode::Char('s') => poller.set_selection(poller.selection().toggle_strategy()),
            KeyCode::Char('w') => poller.set_selection(poller.selection().next_window()),
            KeyCode::Char(c @ '1'..='4') => {
                let idx = c as usize - '1' as usize;
                poller.set_selection(poller.selection().with_window_index(idx));
            }
            _ => {}
        }
    }

    pub fn render(&mut self, frame: &mut Frame, poller: &Poller) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4), // status
                Constraint::Length(5), // price readout
                Constraint::Min(8),    // chart
                Constraint::Length(4), // help
            ])
            .split(frame.area());

        self.render_status(frame, chunks[0], poller);
        self.render_price(frame, chunks[1]);
        self.chart.render(frame, chunks[2]);
        self.render_help(frame, chunks[3]);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect, poller: &Poller) {
        let (state_text, state_style) = match self.state() {
            DashboardState::Loading => ("Loading", Style::default().fg(Color::Yellow)),
            DashboardState::Displaying => ("Live", Style::default().fg(Color::Green)),
            DashboardState::Paused => ("Paused", Style::default().fg(Color::Magenta)),
        };

        let selection = poller.selection();
        let window_text = match selection.strategy {
            Strategy::Direct => "-".to_string(),
            Strategy::Transactions => format!("{} txns", selection.window),
        };

        let failures = poller.consecutive_failures();
        let failure_style = if failures == 0 {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::Red)
        };

        let lines = vec![
            Line::from(vec![
                Span::styled("State: ", Style::default()),
                Span::styled(state_text, state_style),
                Span::raw(" | RPC: "),
                Span::styled(&self.rpc_url, Style::default().fg(Color::Cyan)),
            ]),
            Line::from(vec![
                Span::styled("Strategy: ", Style::default()),
                Span::styled(selection.strategy.label(), Style::default().fg(Color::Blue)),
                Span::raw(" | Window: "),
                Span::styled(window_text, Style::default().fg(Color::Blue)),
                Span::raw(" | Every: "),
                Span::styled(
                    format!("{}ms", poller.interval().as_millis()),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(" | Failed fetches: "),
                Span::styled(failures.to_string(), failure_style),
            ]),
        ];

        let paragraph = Paragraph::new(lines)
            .block(Block::default().title("Connection").borders(Borders::ALL))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_price(&self, frame: &mut Frame, area: Rect) {
        let Some(sample) = &self.sample else {
            let paragraph = Paragraph::new(Line::from(Span::styled(
                "Loading gas price...",
                Style::default().fg(Color::DarkGray),
            )))
            .block(Block::default().title("Gas Price").borders(Borders::ALL));
            frame.render_widget(paragraph, area);
            return;
        };

        let source_text = match sample.source {
            SampleSource::Direct => "node estimate".to_string(),
            SampleSource::Transactions { window, valid } => {
                format!("{valid} of last {window} transactions")
            }
        };

        let age = Utc::now()
            .signed_duration_since(sample.time)
            .num_seconds()
            .max(0);
        let age_text = if age < 1 {
            "< 1s ago".to_string()
        } else {
            format!("{age}s ago")
        };

        let lines = vec![
            Line::from(vec![
                Span::styled("Fast: ", Style::default()),
                Span::styled(sample.fast.to_string(), Style::default().fg(Color::Red)),
                Span::raw("  |  Standard: "),
                Span::styled(
                    sample.standard.to_string(),
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  |  Slow: "),
                Span::styled(sample.slow.to_string(), Style::default().fg(Color::Green)),
            ]),
            Line::from(vec![
                Span::styled("Source: ", Style::default()),
                Span::styled(source_text, Style::default().fg(Color::Gray)),
            ]),
            Line::from(vec![
                Span::styled("Updated: ", Style::default()),
                Span::styled(
                    sample.time.format("%H:%M:%S UTC").to_string(),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(" ("),
                Span::styled(age_text, Style::default().fg(Color::Yellow)),
                Span::raw(")"),
            ]),
        ];

        let title = if self.paused { "Gas Price (paused)" } else { "Gas Price" };
        let paragraph =
            Paragraph::new(lines).block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }

    fn render_help(&self, frame: &mut Frame, area: Rect) {
        let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
        let help_text = vec![
            Line::from(vec![
                key("'q'"),
                Span::raw(" quit  "),
                key("'p'"),
                Span::raw(if self.paused { " resume  " } else { " pause  " }),
                key("'s'"),
                Span::raw(" switch strategy"),
            ]),
            Line::from(vec![
                key("'w'"),
                Span::raw(" next window  "),
                key("'1'-'4'"),
                Span::raw(" window 5/10/25/50"),
            ]),
        ];

        let paragraph =
            Paragraph::new(help_text).block(Block::default().title("Help").borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{QueryKey, QuerySelection};
    use ratatui::{Terminal, backend::TestBackend};
    use std::time::{Duration, Instant};

    fn poller() -> Poller {
        Poller::new(
            QuerySelection::new(Strategy::Direct, 25),
            Duration::from_secs(1),
        )
    }

    fn sample(standard: u64) -> GasPriceSample {
        GasPriceSample {
            fast: standard + 50,
            standard,
            slow: standard - 20,
            time: Utc::now(),
            source: SampleSource::Direct,
        }
    }

    fn screen(dashboard: &mut Dashboard, poller: &Poller) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| dashboard.render(frame, poller)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn moves_from_loading_to_displaying_to_paused_and_back() {
        let mut p = poller();
        let mut dashboard = Dashboard::new("http://localhost:8080/v1".to_string());
        assert_eq!(dashboard.state(), DashboardState::Loading);

        dashboard.apply_sample(sample(100));
        assert_eq!(dashboard.state(), DashboardState::Displaying);

        dashboard.handle_key(KeyCode::Char('p'), &mut p);
        assert_eq!(dashboard.state(), DashboardState::Paused);
        assert!(p.is_paused());
        assert!(p.poll_due(Instant::now()).is_none());
        assert_eq!(dashboard.sample().map(|s| s.standard), Some(100));

        dashboard.handle_key(KeyCode::Char(' '), &mut p);
        assert_eq!(dashboard.state(), DashboardState::Displaying);
        assert!(p.poll_due(Instant::now()).is_some());
        assert_eq!(dashboard.sample().map(|s| s.standard), Some(100));
    }

    #[test]
    fn keys_change_query_selection() {
        let mut p = poller();
        let mut dashboard = Dashboard::new(String::new());

        dashboard.handle_key(KeyCode::Char('s'), &mut p);
        assert_eq!(p.key(), QueryKey::Transactions { limit: 25 });
        dashboard.handle_key(KeyCode::Char('w'), &mut p);
        assert_eq!(p.key(), QueryKey::Transactions { limit: 50 });
        dashboard.handle_key(KeyCode::Char('2'), &mut p);
        assert_eq!(p.key(), QueryKey::Transactions { limit: 10 });

        dashboard.handle_key(KeyCode::Char('q'), &mut p);
        assert!(dashboard.should_quit);
    }

    #[test]
    fn renders_placeholder_then_prices() {
        let p = poller();
        let mut dashboard = Dashboard::new("http://localhost:8080/v1".to_string());
        let text = screen(&mut dashboard, &p);
        assert!(text.contains("Loading gas price"));
        assert!(text.contains("Waiting for the first non-zero price"));

        dashboard.apply_sample(sample(100));
        let text = screen(&mut dashboard, &p);
        assert!(text.contains("Standard: 100"));
        assert!(text.contains("Fast: 150"));
        assert!(text.contains("node estimate"));
    }

    #[test]
    fn zero_sample_is_shown_but_not_charted() {
        let mut dashboard = Dashboard::new(String::new());
        dashboard.apply_sample(GasPriceSample {
            fast: 0,
            standard: 0,
            slow: 0,
            time: Utc::now(),
            source: SampleSource::Direct,
        });
        assert_eq!(dashboard.state(), DashboardState::Displaying);
        assert!(dashboard.chart.handle().is_none());
    }
}
