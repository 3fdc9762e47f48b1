use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use unicode_width::UnicodeWidthStr;

use steward_core::types::MessageKind;

use crate::tui::{App, Pane, Speaker};

/// Convert `tui_markdown` output (ratatui-core types) into ratatui 0.29 types.
fn md_to_lines(content: &str) -> Vec<Line<'static>> {
    let rendered = tui_markdown::from_str(content);
    rendered
        .lines
        .into_iter()
        .map(|line| {
            let spans: Vec<Span<'static>> = line
                .spans
                .into_iter()
                .map(|s| Span::styled(s.content.into_owned(), convert_style(s.style)))
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn convert_style(s: ratatui_core::style::Style) -> Style {
    let mut out = Style::default();
    if let Some(c) = s.fg {
        out.fg = Some(convert_color(c));
    }
    if let Some(c) = s.bg {
        out.bg = Some(convert_color(c));
    }
    out.add_modifier = Modifier::from_bits_truncate(s.add_modifier.bits());
    out.sub_modifier = Modifier::from_bits_truncate(s.sub_modifier.bits());
    out
}

fn convert_color(c: ratatui_core::style::Color) -> Color {
    use ratatui_core::style::Color as C;
    match c {
        C::Reset => Color::Reset,
        C::Black => Color::Black,
        C::Red => Color::Red,
        C::Green => Color::Green,
        C::Yellow => Color::Yellow,
        C::Blue => Color::Blue,
        C::Magenta => Color::Magenta,
        C::Cyan => Color::Cyan,
        C::Gray => Color::Gray,
        C::DarkGray => Color::DarkGray,
        C::LightRed => Color::LightRed,
        C::LightGreen => Color::LightGreen,
        C::LightYellow => Color::LightYellow,
        C::LightBlue => Color::LightBlue,
        C::LightMagenta => Color::LightMagenta,
        C::LightCyan => Color::LightCyan,
        C::White => Color::White,
        C::Rgb(r, g, b) => Color::Rgb(r, g, b),
        C::Indexed(i) => Color::Indexed(i),
    }
}

pub fn draw(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    draw_log(f, app, panes[0]);
    draw_conversation(f, app, panes[1]);
    draw_input(f, app, rows[1]);
    draw_status(f, app, rows[2]);
}

fn pane_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default().borders(Borders::ALL).border_style(style).title(title)
}

/// Bottom-anchored scrollable paragraph; `offset` rows up from the end.
fn render_scrolled(f: &mut Frame, area: Rect, lines: Vec<Line>, block: Block, offset: u16) {
    let inner_w = area.width.saturating_sub(2) as usize;
    let wrapped_total: u16 = lines.iter().map(|l| wrapped_line_count(l, inner_w)).sum();
    let visible = area.height.saturating_sub(2);
    let scroll = wrapped_total.saturating_sub(visible).saturating_sub(offset);

    let para = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    f.render_widget(para, area);
}

fn draw_log(f: &mut Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = app
        .log
        .recent(usize::MAX)
        .into_iter()
        .map(|l| Line::from(Span::styled(l, Style::default().fg(Color::Gray))))
        .collect();
    let block = pane_block(" log ", app.focus == Pane::Log);
    render_scrolled(f, area, lines, block, app.log_scroll);
}

fn draw_conversation(f: &mut Frame, app: &App, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();
    for entry in &app.entries {
        if !lines.is_empty() {
            lines.push(Line::default());
        }
        let stamp = Span::styled(format!("{} ", entry.at), Style::default().dim());
        match entry.speaker {
            Speaker::Operator => {
                lines.push(Line::from(vec![
                    stamp,
                    Span::styled("> ", Style::default().fg(Color::Green)),
                    Span::raw(entry.content.clone()),
                ]));
            }
            Speaker::Agent(MessageKind::Thought) => {
                lines.push(Line::from(vec![stamp, Span::styled("thought", Style::default().fg(Color::Blue))]));
                for l in entry.content.lines() {
                    lines.push(Line::from(Span::styled(l.to_owned(), Style::default().italic().dim())));
                }
            }
            Speaker::Agent(MessageKind::Reply) => {
                lines.push(Line::from(vec![stamp, Span::styled("steward", Style::default().fg(Color::Cyan).bold())]));
                lines.extend(md_to_lines(&entry.content));
            }
            Speaker::Agent(MessageKind::Notice) => {
                lines.push(Line::from(vec![
                    stamp,
                    Span::styled(format!("! {}", entry.content), Style::default().fg(Color::Yellow)),
                ]));
            }
        }
    }
    let block = pane_block(" conversation ", app.focus == Pane::Conversation);
    render_scrolled(f, area, lines, block, app.conversation_scroll);
}

fn draw_input(f: &mut Frame, app: &App, area: Rect) {
    let input_prefix = "> ";
    let inner_w = area.width.saturating_sub(2) as usize;

    // keep the cursor visible on long input by scrolling horizontally
    let before_cursor = &app.input[..app.cursor];
    let cursor_w = input_prefix.width() + before_cursor.width();
    let hscroll = if inner_w > 0 && cursor_w >= inner_w {
        cursor_w + 1 - inner_w
    } else {
        0
    };

    let para = Paragraph::new(Line::from(vec![Span::raw(input_prefix), Span::raw(app.input.as_str())]))
        .block(Block::default().borders(Borders::ALL).title(" message "))
        .scroll((0, hscroll as u16));
    f.render_widget(para, area);

    f.set_cursor_position(Position::new(
        area.x + 1 + (cursor_w - hscroll) as u16,
        area.y + 1,
    ));
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let s = &app.status;
    let focus = match app.focus {
        Pane::Log => "log",
        Pane::Conversation => "conversation",
    };
    let text = format!(
        " iteration {}  |  {}  |  running tasks {}  |  failures {}  |  scroll: {focus} (Tab)  |  Ctrl+C quits",
        s.iteration, s.phase, s.running_tasks, s.consecutive_failures
    );
    let color = if s.consecutive_failures > 0 {
        Color::Yellow
    } else {
        Color::DarkGray
    };
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(text, Style::default().fg(color)))),
        area,
    );
}

/// How many visual rows a Line occupies when wrapped to `width` columns.
fn wrapped_line_count(line: &Line, width: usize) -> u16 {
    if width == 0 {
        return 1;
    }
    let full: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
    full.split('\n')
        .map(|sub| greedy_wrap_rows(sub, width))
        .sum()
}

/// Count visual rows for a single unwrapped string segment using greedy wrap.
fn greedy_wrap_rows(s: &str, width: usize) -> u16 {
    if width == 0 {
        return 1;
    }
    let mut rows: u16 = 1;
    let mut col: usize = 0;
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if cw == 0 {
            continue;
        }
        if col + cw > width {
            rows += 1;
            col = cw;
        } else {
            col += cw;
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_counts_rows() {
        assert_eq!(greedy_wrap_rows("", 10), 1);
        assert_eq!(greedy_wrap_rows("abcdefghij", 10), 1);
        assert_eq!(greedy_wrap_rows("abcdefghijk", 10), 2);
        // wide chars take two columns
        assert_eq!(greedy_wrap_rows("日本語", 4), 2);
    }

    #[test]
    fn line_with_newlines_counts_each_segment() {
        let line = Line::from("one\ntwo");
        assert_eq!(wrapped_line_count(&line, 80), 2);
    }
}
