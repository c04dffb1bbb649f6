//! Time-series price chart drawn with ratatui's `Chart` widget.
//!
//! [`ChartHandle`] and [`SeriesHandle`] are long-lived, incrementally updated
//! resources; [`PriceChart`] owns one lazily and applies the dashboard's
//! update policy on top.
use chrono::{DateTime, Utc};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl PricePoint {
    fn xy(&self) -> (f64, f64) {
        (self.time.timestamp_millis() as f64 / 1000.0, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChartSize {
    pub width: u16,
    pub height: u16,
}

impl From<Rect> for ChartSize {
    fn from(area: Rect) -> Self {
        Self {
            width: area.width,
            height: area.height,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub title: String,
    pub size: ChartSize,
    /// Upper bound on points kept by each series.
    pub history: usize,
}

/// Values at or above `base_value` use `top_color`, values below use
/// `bottom_color`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineStyle {
    pub base_value: f64,
    pub top_color: Color,
    pub bottom_color: Color,
    pub line_color: Color,
}

impl BaselineStyle {
    pub fn new(base_value: f64) -> Self {
        Self {
            base_value,
            top_color: Color::Red,
            bottom_color: Color::Green,
            line_color: Color::DarkGray,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeriesHandle {
    style: BaselineStyle,
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl SeriesHandle {
    fn new(style: BaselineStyle, capacity: usize) -> Self {
        Self {
            style,
            points: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn style(&self) -> &BaselineStyle {
        &self.style
    }

    /// Replaces the whole series.
    pub fn set_data<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = PricePoint>,
    {
        self.points.clear();
        for point in points {
            self.push_bounded(point);
        }
    }

    /// Same timestamp as the last point replaces it, a later one appends and
    /// an earlier one is ignored. Returns whether the series changed.
    pub fn update(&mut self, point: PricePoint) -> bool {
        match self.points.back_mut() {
            Some(last) if point.time == last.time => {
                *last = point;
                true
            }
            Some(last) if point.time < last.time => {
                debug!(time = %point.time, "ignoring out-of-order chart point");
                false
            }
            _ => {
                self.push_bounded(point);
                true
            }
        }
    }

    pub fn points(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    fn push_bounded(&mut self, point: PricePoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChartHandle {
    options: ChartOptions,
    series: Option<SeriesHandle>,
}

impl ChartHandle {
    pub fn create(options: ChartOptions) -> Self {
        Self {
            options,
            series: None,
        }
    }

    /// The chart carries a single series; adding another replaces it.
    pub fn add_series(&mut self, style: BaselineStyle) -> &mut SeriesHandle {
        self.series
            .insert(SeriesHandle::new(style, self.options.history))
    }

    pub fn series(&self) -> Option<&SeriesHandle> {
        self.series.as_ref()
    }

    pub fn series_mut(&mut self) -> Option<&mut SeriesHandle> {
        self.series.as_mut()
    }

    pub fn size(&self) -> ChartSize {
        self.options.size
    }

    /// Returns whether the size actually changed.
    pub fn apply_options(&mut self, size: ChartSize) -> bool {
        if self.options.size == size {
            return false;
        }
        debug!(width = size.width, height = size.height, "chart resized");
        self.options.size = size;
        true
    }

    /// Braille markers give two columns per cell, so the visible window is
    /// twice the inner width.
    fn visible_points(&self) -> usize {
        (usize::from(self.options.size.width.saturating_sub(2)) * 2).max(2)
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(self.options.title.as_str())
            .borders(Borders::ALL);

        let Some(series) = self.series.as_ref().filter(|s| !s.is_empty()) else {
            frame.render_widget(Paragraph::new("No data").block(block), area);
            return;
        };

        let skip = series.len().saturating_sub(self.visible_points());
        let visible: Vec<(f64, f64)> = series.points().skip(skip).map(PricePoint::xy).collect();
        let base = series.style.base_value;

        let (above, below): (Vec<(f64, f64)>, Vec<(f64, f64)>) =
            visible.iter().copied().partition(|(_, v)| *v >= base);

        let x_min = visible.first().map(|p| p.0).unwrap_or_default();
        let x_max = visible
            .last()
            .map(|p| p.0)
            .filter(|x| *x > x_min)
            .unwrap_or(x_min + 1.0);
        let baseline = [(x_min, base), (x_max, base)];

        let (y_lo, y_hi) = visible
            .iter()
            .fold((base, base), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));
        let pad = ((y_hi - y_lo) * 0.1).max(1.0);
        let y_bounds = [(y_lo - pad).max(0.0), y_hi + pad];

        let datasets = vec![
            Dataset::default()
                .name("baseline")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(series.style.line_color))
                .data(&baseline),
            Dataset::default()
                .name("above")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Scatter)
                .style(Style::default().fg(series.style.top_color))
                .data(&above),
            Dataset::default()
                .name("below")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Scatter)
                .style(Style::default().fg(series.style.bottom_color))
                .data(&below),
        ];

        let x_labels = vec![
            Span::raw(time_label(x_min)),
            Span::raw(time_label(x_max)),
        ];
        let y_labels = vec![
            Span::raw(format!("{:.0}", y_bounds[0])),
            Span::styled(format!("{base:.0}"), Style::default().fg(Color::Yellow)),
            Span::raw(format!("{:.0}", y_bounds[1])),
        ];

        let chart = Chart::new(datasets)
            .block(block)
            .x_axis(
                Axis::default()
                    .style(Style::default().fg(Color::Gray))
                    .bounds([x_min, x_max])
                    .labels(x_labels),
            )
            .y_axis(
                Axis::default()
                    .style(Style::default().fg(Color::Gray))
                    .bounds(y_bounds)
                    .labels(y_labels),
            );

        frame.render_widget(chart, area);
    }
}

fn time_label(secs: f64) -> String {
    DateTime::<Utc>::from_timestamp_millis((secs * 1000.0) as i64)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--".to_string())
}

/// The dashboard's chart. The handle is created on the first non-zero price,
/// which also becomes the baseline reference.
#[derive(Debug)]
pub struct PriceChart {
    handle: Option<ChartHandle>,
    history: usize,
    size: ChartSize,
}

impl PriceChart {
    pub fn new(history: usize) -> Self {
        Self {
            handle: None,
            history,
            size: ChartSize::default(),
        }
    }

    pub fn handle(&self) -> Option<&ChartHandle> {
        self.handle.as_ref()
    }

    /// Zero means "no data yet" and never reaches the series.
    pub fn push(&mut self, value: u64, time: DateTime<Utc>) -> bool {
        if value == 0 {
            return false;
        }
        let point = PricePoint {
            time,
            value: value as f64,
        };

        if let Some(handle) = self.handle.as_mut() {
            return handle
                .series_mut()
                .map(|series| series.update(point))
                .unwrap_or(false);
        }

        debug!(baseline = value, "creating price chart");
        let mut handle = ChartHandle::create(ChartOptions {
            title: "Standard gas price".to_string(),
            size: self.size,
            history: self.history,
        });
        handle
            .add_series(BaselineStyle::new(point.value))
            .set_data([point]);
        self.handle = Some(handle);
        true
    }

    pub fn resize(&mut self, area: Rect) {
        self.size = ChartSize::from(area);
        if let Some(handle) = self.handle.as_mut() {
            handle.apply_options(self.size);
        }
    }

    pub fn dispose(&mut self) {
        self.handle = None;
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect) {
        self.resize(area);
        match &self.handle {
            Some(handle) => handle.render(frame, area),
            None => {
                let placeholder = Paragraph::new(Span::styled(
                    "Waiting for the first non-zero price...",
                    Style::default().fg(Color::DarkGray),
                ))
                .block(Block::default().title("Standard gas price").borders(Borders::ALL));
                frame.render_widget(placeholder, area);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn zero_values_leave_chart_untouched() {
        let mut chart = PriceChart::new(10);
        assert!(!chart.push(0, at(0)));
        assert!(chart.handle().is_none());

        chart.push(120, at(1));
        assert!(!chart.push(0, at(2)));
        let series = chart.handle().and_then(ChartHandle::series).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().map(|p| p.value), Some(120.0));
    }

    #[test]
    fn first_value_sets_the_baseline() {
        let mut chart = PriceChart::new(10);
        chart.push(150, at(0));
        chart.push(90, at(1));
        let series = chart.handle().and_then(ChartHandle::series).unwrap();
        assert_eq!(series.style().base_value, 150.0);
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn update_replaces_same_time_and_ignores_older() {
        let mut series = SeriesHandle::new(BaselineStyle::new(100.0), 10);
        series.set_data([PricePoint {
            time: at(5),
            value: 100.0,
        }]);
        assert!(series.update(PricePoint {
            time: at(5),
            value: 110.0
        }));
        assert_eq!(series.len(), 1);
        assert!(!series.update(PricePoint {
            time: at(1),
            value: 1.0
        }));
        assert_eq!(series.last().map(|p| p.value), Some(110.0));
    }

    #[test]
    fn history_is_bounded() {
        let mut chart = PriceChart::new(3);
        for i in 0..10 {
            chart.push(100 + i, at(i as i64));
        }
        let series = chart.handle().and_then(ChartHandle::series).unwrap();
        let values: Vec<f64> = series.points().map(|p| p.value).collect();
        assert_eq!(values, vec![107.0, 108.0, 109.0]);
    }

    #[test]
    fn resize_reaches_existing_handle_and_dispose_drops_it() {
        let mut chart = PriceChart::new(10);
        chart.resize(Rect::new(0, 0, 40, 12));
        chart.push(100, at(0));
        assert_eq!(
            chart.handle().map(ChartHandle::size),
            Some(ChartSize {
                width: 40,
                height: 12
            })
        );

        chart.resize(Rect::new(0, 0, 80, 20));
        assert_eq!(chart.handle().map(|h| h.size().width), Some(80));

        chart.dispose();
        assert!(chart.handle().is_none());
    }
}
