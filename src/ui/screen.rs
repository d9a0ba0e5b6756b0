use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Chart, Dataset, GraphType, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use super::charting::{axis_labels, compute_chart_params, format_label};
use super::{prompt_spans, Styles, HORIZONTAL_MARGIN, VERTICAL_MARGIN};
use crate::app::{App, AppState};

/// A UI screen boundary: renders one [`AppState`]
pub trait Screen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer);

    /// Key hints shown at the bottom
    fn legend(&self) -> &'static str;
}

pub struct MenuScreen;

impl Screen for MenuScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let styles = Styles::default();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Percentage(35),
                Constraint::Length(2),
                Constraint::Length(2),
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        Paragraph::new(Span::styled("keyrate", styles.title))
            .alignment(Alignment::Center)
            .render(chunks[1], buf);

        Paragraph::new(Line::from(vec![
            Span::styled("< ", styles.dim_bold),
            Span::styled(app.selected_category().to_string(), styles.green_bold),
            Span::styled(" >", styles.dim_bold),
        ]))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

        if let Some(notice) = &app.notice {
            Paragraph::new(Span::styled(notice.clone(), styles.red_bold))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true })
                .render(chunks[3], buf);
        }

        Paragraph::new(Span::styled(self.legend(), styles.italic))
            .alignment(Alignment::Center)
            .render(chunks[5], buf);
    }

    fn legend(&self) -> &'static str {
        "(enter) start / (←→) category / (esc) quit"
    }
}

pub struct TypingScreen;

impl Screen for TypingScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let styles = Styles::default();
        let target = app.session.target();
        let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
        let prompt_lines = if target.width() <= max_chars_per_line as usize {
            1
        } else {
            ((target.width() as f64 / max_chars_per_line as f64).ceil() + 1.0) as u16
        };
        let padding = area.height.saturating_sub(prompt_lines + 4) / 2;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Length(padding),
                Constraint::Length(2),
                Constraint::Length(prompt_lines),
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        let live = app.live;
        Paragraph::new(Span::styled(
            format!(
                "{:.0} wpm   {:.0}% acc   {:.1}s",
                live.wpm,
                live.accuracy,
                app.session.elapsed()
            ),
            styles.dim_bold,
        ))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

        Paragraph::new(Line::from(prompt_spans(target, app.session.buffer(), &styles)))
            .alignment(if prompt_lines == 1 {
                Alignment::Center
            } else {
                Alignment::Left
            })
            .wrap(Wrap { trim: true })
            .render(chunks[2], buf);

        let footer = match &app.notice {
            Some(notice) => Span::styled(notice.clone(), styles.red_bold),
            None => Span::styled(
                app.session
                    .text()
                    .map(|t| t.attribution.clone())
                    .unwrap_or_default(),
                styles.italic,
            ),
        };
        Paragraph::new(footer)
            .alignment(Alignment::Right)
            .render(chunks[3], buf);

        Paragraph::new(Span::styled(self.legend(), styles.italic)).render(chunks[5], buf);
    }

    fn legend(&self) -> &'static str {
        "(tab) new text / (ctrl+w) delete word / (esc) menu"
    }
}

pub struct ResultsScreen;

impl Screen for ResultsScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let styles = Styles::default();
        let Some(result) = app.session.result() else {
            return;
        };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Min(1),    // chart
                Constraint::Length(1), // headline stats
                Constraint::Length(1), // counts
                Constraint::Length(1), // attribution
                Constraint::Length(1), // padding
                Constraint::Length(1), // legend
            ])
            .split(area);

        let graph = &result.graph;
        let params = compute_chart_params(graph);
        let wpm: Vec<(f64, f64)> = graph.points.iter().map(|p| p.wpm_coord()).collect();
        let raw: Vec<(f64, f64)> = graph.points.iter().map(|p| p.raw_coord()).collect();
        let errors: Vec<(f64, f64)> = graph.markers.iter().map(|&m| m.into()).collect();

        let datasets = vec![
            Dataset::default()
                .name("raw")
                .marker(Marker::Braille)
                .style(styles.raw_line)
                .graph_type(GraphType::Line)
                .data(&raw),
            Dataset::default()
                .name("wpm")
                .marker(Marker::Braille)
                .style(styles.wpm_line)
                .graph_type(GraphType::Line)
                .data(&wpm),
            Dataset::default()
                .name("errors")
                .marker(Marker::Dot)
                .style(styles.red_bold)
                .graph_type(GraphType::Scatter)
                .data(&errors),
        ];

        let x_min = if params.x_max > 1.0 { 1.0 } else { 0.0 };

        Chart::new(datasets)
            .x_axis(
                Axis::default()
                    .title("seconds")
                    .bounds([x_min, params.x_max])
                    .labels(labels(x_min, params.x_max, params.x_step, styles.bold)),
            )
            .y_axis(
                Axis::default()
                    .title("wpm")
                    .bounds([0.0, params.y_max])
                    .labels(labels(0.0, params.y_max, params.y_step, styles.bold)),
            )
            .render(chunks[0], buf);

        let stats = result.stats;
        Paragraph::new(Span::styled(
            format!(
                "{:.0} wpm   {:.0} raw   {:.0}% acc   {:.1}s",
                stats.wpm, stats.raw_wpm, stats.accuracy, stats.time
            ),
            styles.bold,
        ))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

        Paragraph::new(Span::styled(
            format!(
                "{} correct   {} incorrect   {} best streak",
                stats.correct_chars, stats.incorrect_chars, stats.best_streak
            ),
            styles.dim_bold,
        ))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

        if let Some(text) = app.session.text().filter(|t| !t.attribution.is_empty()) {
            Paragraph::new(Span::styled(format!("- {}", text.attribution), styles.italic))
                .alignment(Alignment::Center)
                .render(chunks[3], buf);
        }

        Paragraph::new(Span::styled(self.legend(), styles.italic)).render(chunks[5], buf);
    }

    fn legend(&self) -> &'static str {
        "(enter) next / (esc) menu"
    }
}

fn labels(min: f64, max: f64, step: f64, style: Style) -> Vec<Span<'static>> {
    axis_labels(min, max, step)
        .into_iter()
        .map(|v| Span::styled(format_label(v), style))
        .collect()
}

/// Helper to construct the appropriate screen for the current state
pub fn current_screen(state: &AppState) -> Box<dyn Screen> {
    match state {
        AppState::Menu => Box::new(MenuScreen),
        AppState::Typing => Box::new(TypingScreen),
        AppState::Results => Box::new(ResultsScreen),
    }
}
