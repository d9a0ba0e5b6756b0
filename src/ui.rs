pub mod charting;
pub mod screen;

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::Span,
    widgets::Widget,
};

use crate::app::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

struct Styles {
    bold: Style,
    green_bold: Style,
    red_bold: Style,
    dim_bold: Style,
    cursor: Style,
    italic: Style,
    title: Style,
    wpm_line: Style,
    raw_line: Style,
}

impl Default for Styles {
    fn default() -> Self {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let dim_bold = Style::default().patch(bold).add_modifier(Modifier::DIM);
        Self {
            bold,
            green_bold: Style::default().patch(bold).fg(Color::Green),
            red_bold: Style::default().patch(bold).fg(Color::Red),
            dim_bold,
            cursor: Style::default()
                .patch(dim_bold)
                .add_modifier(Modifier::UNDERLINED),
            italic: Style::default().add_modifier(Modifier::ITALIC),
            title: Style::default().patch(bold).fg(Color::Magenta),
            wpm_line: Style::default().fg(Color::Magenta),
            raw_line: Style::default().fg(Color::DarkGray),
        }
    }
}

/// Target text coloured against what has been typed so far: green where it
/// matches, red where it does not, the cursor underlined, the rest dim
fn prompt_spans<'a>(target: &str, typed: &str, styles: &Styles) -> Vec<Span<'a>> {
    let target: Vec<char> = target.chars().collect();
    let typed: Vec<char> = typed.chars().collect();

    let mut spans: Vec<Span> = typed
        .iter()
        .enumerate()
        .map(|(idx, &c)| match target.get(idx) {
            Some(&expected) if expected == c => Span::styled(c.to_string(), styles.green_bold),
            _ => Span::styled(
                match c {
                    ' ' => "·".to_owned(),
                    c => c.to_string(),
                },
                styles.red_bold,
            ),
        })
        .collect();

    if let Some(&next) = target.get(typed.len()) {
        spans.push(Span::styled(next.to_string(), styles.cursor));
    }
    let rest: String = target.iter().skip(typed.len() + 1).collect();
    if !rest.is_empty() {
        spans.push(Span::styled(rest, styles.dim_bold));
    }
    spans
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        screen::current_screen(&self.state).render(self, area, buf);
    }
}
