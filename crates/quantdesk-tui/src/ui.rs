use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span, Text},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, List, ListItem, Paragraph, Wrap},
};
use quantdesk_core::markup::{self, DisplayBlock, Span as MarkupSpan};
use quantdesk_core::series::{self, SeriesPoint};
use quantdesk_core::{Bias, ChatRole, Quote};
use crate::app::{AgentStatus, App, FocusPane, InputMode};

const GOLD: Color = Color::Rgb(240, 192, 64);
const GREEN: Color = Color::Rgb(38, 217, 127);
const RED: Color = Color::Rgb(255, 77, 106);
const TEXT: Color = Color::Rgb(205, 214, 232);
const TEXT_DIM: Color = Color::Rgb(168, 187, 204);

fn border_style(focused: bool) -> Style {
    Style::default().fg(if focused { Color::Cyan } else { Color::DarkGray })
}

fn bias_color(bias: Bias) -> Color {
    match bias {
        Bias::Bullish => GREEN,
        Bias::Neutral => GOLD,
        Bias::Bearish => RED,
    }
}

fn dots(frame: u8) -> String {
    ".".repeat(frame as usize + 1)
}

/// Plain spans keep the surrounding style, emphasized spans are bold.
fn inline_spans(spans: &[MarkupSpan]) -> Vec<Span<'static>> {
    spans
        .iter()
        .map(|span| {
            let text = span.text().to_string();
            if span.is_emphasized() {
                Span::styled(text, Style::default().fg(TEXT).add_modifier(Modifier::BOLD))
            } else {
                Span::raw(text)
            }
        })
        .collect()
}

/// Map one rendered reply block to a terminal line. `width` is only used to
/// size dividers.
fn block_to_line(block: &DisplayBlock, width: usize) -> Line<'static> {
    match block {
        DisplayBlock::Heading { level, text } => {
            let (text, color) = match level {
                1 => (text.to_uppercase(), GOLD),
                2 => (text.clone(), GOLD),
                _ => (text.clone(), TEXT),
            };
            Line::from(Span::styled(
                text,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ))
        }
        DisplayBlock::Divider => Line::from(Span::styled(
            "─".repeat(width.max(1)),
            Style::default().fg(Color::DarkGray),
        )),
        DisplayBlock::TableRow { cells } => {
            let mut spans = Vec::with_capacity(cells.len() * 2);
            for (j, cell) in cells.iter().enumerate() {
                if j > 0 {
                    spans.push(Span::styled(" │ ", Style::default().fg(Color::DarkGray)));
                }
                let color = if j == 0 { TEXT } else { TEXT_DIM };
                spans.push(Span::styled(cell.clone(), Style::default().fg(color)));
            }
            Line::from(spans)
        }
        DisplayBlock::ListItem { spans } => {
            let mut line = vec![Span::styled("  · ", Style::default().fg(GOLD))];
            line.extend(inline_spans(spans));
            Line::from(line).style(Style::default().fg(TEXT_DIM))
        }
        DisplayBlock::Callout { signal, text } => {
            let color = bias_color(signal.bias());
            Line::from(vec![
                Span::styled("▌ ", Style::default().fg(color)),
                Span::styled(
                    text.clone(),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
            ])
        }
        DisplayBlock::Blank => Line::default(),
        DisplayBlock::Paragraph { spans } => {
            Line::from(inline_spans(spans)).style(Style::default().fg(TEXT_DIM))
        }
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    let [watchlist_area, chart_area, chat_area] = Layout::horizontal([
        Constraint::Length(24),
        Constraint::Fill(1),
        Constraint::Percentage(45),
    ])
    .areas(body_area);

    render_header(app, frame, header_area);
    if app.input_mode == InputMode::Search {
        render_search(app, frame, watchlist_area);
    } else {
        render_watchlist(app, frame, watchlist_area);
    }
    render_chart(app, frame, chart_area);
    render_chat(app, frame, chat_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let brand = Style::default()
        .fg(Color::Black)
        .bg(GOLD)
        .add_modifier(Modifier::BOLD);
    let mut spans = vec![
        Span::styled(" QUANTDESK ", brand),
        Span::raw(" "),
        Span::styled(
            app.selected_symbol().unwrap_or("-").to_string(),
            Style::default().fg(TEXT).add_modifier(Modifier::BOLD),
        ),
    ];

    if let Some(quote) = app.selected_symbol().and_then(|s| app.quote(s)) {
        let color = if quote.is_up() { GREEN } else { RED };
        spans.push(Span::styled(
            format!("  ${:.2} {:+.2} ({:+.2}%)", quote.price, quote.change, quote.pct),
            Style::default().fg(color),
        ));
    }

    if let Some(prediction) = &app.prediction {
        let color = bias_color(prediction.signal.bias());
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            prediction.signal.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(
            format!(
                "  target ${:.2} ({:+.2}%)",
                prediction.target_price, prediction.delta_pct
            ),
            Style::default().fg(TEXT_DIM),
        ));
    } else if app.prediction_loading {
        spans.push(Span::styled(
            format!("  running forecast{}", dots(app.animation_frame)),
            Style::default().fg(Color::DarkGray),
        ));
    }

    if let Some(error) = &app.market_error {
        spans.push(Span::styled(format!("  ⚠ {error}"), Style::default().fg(RED)));
    }

    let (market_text, market_color) = if app.quotes_error.is_some() {
        ("SERVER OFFLINE".to_string(), RED)
    } else if app.quotes_loading {
        (format!("FETCHING DATA{}", dots(app.animation_frame)), GOLD)
    } else {
        ("LIVE DATA".to_string(), GREEN)
    };
    let (agent_text, agent_color) = match &app.agent_status {
        AgentStatus::Checking => ("AGENT ...".to_string(), GOLD),
        AgentStatus::Online(health) => (
            format!("AGENT {}", health.primary.as_deref().unwrap_or("ok").to_uppercase()),
            GREEN,
        ),
        AgentStatus::Offline(_) => ("AGENT OFFLINE".to_string(), RED),
    };
    let status = Line::from(vec![
        Span::styled("● ", Style::default().fg(market_color)),
        Span::styled(market_text, Style::default().fg(market_color)),
        Span::raw("  "),
        Span::styled("● ", Style::default().fg(agent_color)),
        Span::styled(agent_text, Style::default().fg(agent_color)),
        Span::raw(" "),
    ]);

    let status_width = status.width() as u16;
    let [left, right] =
        Layout::horizontal([Constraint::Min(0), Constraint::Length(status_width)]).areas(area);
    frame.render_widget(Paragraph::new(Line::from(spans)), left);
    frame.render_widget(Paragraph::new(status), right);
}

fn watchlist_item<'a>(symbol: &'a str, quote: Option<&Quote>) -> ListItem<'a> {
    let Some(quote) = quote else {
        return ListItem::new(Text::from(vec![
            Line::from(Span::styled(symbol, Style::default().fg(TEXT))),
            Line::from(Span::styled("  --", Style::default().fg(Color::DarkGray))),
        ]));
    };

    let (arrow, color) = if quote.is_up() { ("▲", GREEN) } else { ("▼", RED) };
    ListItem::new(Text::from(vec![
        Line::from(vec![
            Span::styled(format!("{symbol:<6}"), Style::default().fg(TEXT)),
            Span::styled(
                format!(" {arrow}{:.2}%", quote.pct.abs()),
                Style::default().fg(color),
            ),
        ]),
        Line::from(Span::styled(
            format!("  ${:.2}", quote.price),
            Style::default().fg(TEXT_DIM),
        )),
    ]))
}

fn render_watchlist(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app.focus == FocusPane::Watchlist))
        .title(format!(" Watchlist · {} ", app.watchlist.len()));

    if app.watchlist.is_empty() {
        let hint = Paragraph::new(Span::styled(
            "Empty. Press s to add a ticker.",
            Style::default().fg(Color::DarkGray),
        ))
        .wrap(Wrap { trim: true })
        .block(block);
        frame.render_widget(hint, area);
        return;
    }

    let items: Vec<ListItem> = app
        .watchlist
        .iter()
        .map(|symbol| watchlist_item(symbol, app.quote(symbol)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::Rgb(12, 16, 24)).add_modifier(Modifier::BOLD))
        .highlight_symbol("▌ ");

    frame.render_stateful_widget(list, area, &mut app.watchlist_state);
}

fn render_search(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, results_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);

    let title = if app.searching {
        format!(" Search{} ", dots(app.animation_frame))
    } else {
        " Search ticker ".to_string()
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(GOLD))
        .title(title);

    let inner_width = input_area.width.saturating_sub(2) as usize;
    let scroll_offset = scroll_offset(app.search.cursor, inner_width);
    let visible: String = app
        .search
        .text
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();
    frame.render_widget(
        Paragraph::new(visible)
            .style(Style::default().fg(Color::Cyan))
            .block(input_block),
        input_area,
    );
    let cursor_x = (app.search.cursor - scroll_offset) as u16;
    frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));

    let results_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Enter add · Esc close ");

    if app.search_results.is_empty() {
        let message = if app.search.text.trim().is_empty() || app.searching {
            ""
        } else {
            "No matches"
        };
        frame.render_widget(
            Paragraph::new(Span::styled(message, Style::default().fg(Color::DarkGray)))
                .block(results_block),
            results_area,
        );
        return;
    }

    let items: Vec<ListItem> = app
        .search_results
        .iter()
        .map(|hit| {
            ListItem::new(Text::from(vec![
                Line::from(Span::styled(
                    hit.symbol.clone(),
                    Style::default().fg(GOLD).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    format!("  {}", hit.name),
                    Style::default().fg(Color::DarkGray),
                )),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(results_block)
        .highlight_style(Style::default().bg(Color::Rgb(17, 24, 32)))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, results_area, &mut app.search_state);
}

/// Horizontal scroll that keeps the cursor inside a field `width` chars wide.
fn scroll_offset(cursor: usize, width: usize) -> usize {
    if width > 0 && cursor >= width {
        cursor - width + 1
    } else {
        0
    }
}

fn axis_labels(points: &[SeriesPoint], forecast_start: Option<&str>) -> Vec<Span<'static>> {
    let mut labels = Vec::new();
    if let Some(first) = points.first() {
        labels.push(Span::raw(first.date.clone()));
    }
    if let Some(start) = forecast_start {
        labels.push(Span::styled(start.to_string(), Style::default().fg(GREEN)));
    }
    if points.len() > 1 {
        if let Some(last) = points.last() {
            labels.push(Span::raw(last.date.clone()));
        }
    }
    labels
}

fn render_chart(app: &App, frame: &mut Frame, area: Rect) {
    let symbol = app.selected_symbol().unwrap_or("-");
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} · {}d ", symbol, app.history_days));

    let points = app.chart_points();
    let Some(bounds) = series::price_bounds(&points) else {
        let message = if app.history_loading {
            format!("Fetching live data{}", dots(app.animation_frame))
        } else {
            "No price data".to_string()
        };
        let placeholder =
            Paragraph::new(Span::styled(message, Style::default().fg(Color::DarkGray)))
                .block(block);
        frame.render_widget(placeholder, area);
        return;
    };

    let price_data: Vec<(f64, f64)> = points
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.price.map(|v| (i as f64, v)))
        .collect();
    let forecast_data: Vec<(f64, f64)> = points
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.predicted.map(|v| (i as f64, v)))
        .collect();

    let mut datasets = vec![Dataset::default()
        .name("price")
        .marker(Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(GOLD))
        .data(&price_data)];
    if !forecast_data.is_empty() {
        datasets.push(
            Dataset::default()
                .name("forecast")
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(GREEN))
                .data(&forecast_data),
        );
    }

    let pad = (bounds.span() * 0.05).max(0.5);
    let y_bounds = [bounds.min - pad, bounds.max + pad];
    let x_max = points.len().saturating_sub(1).max(1) as f64;

    let forecast_start = app
        .prediction
        .as_ref()
        .filter(|_| app.show_forecast)
        .and_then(|p| series::forecast_start(&p.forecast));

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([0.0, x_max])
                .labels(axis_labels(&points, forecast_start)),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds(y_bounds)
                .labels(vec![
                    Span::raw(format!("{:.2}", y_bounds[0])),
                    Span::raw(format!("{:.2}", (y_bounds[0] + y_bounds[1]) / 2.0)),
                    Span::raw(format!("{:.2}", y_bounds[1])),
                ]),
        );

    frame.render_widget(chart, area);
}

fn chat_lines(app: &App, width: usize) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for msg in app.session.messages() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(Span::styled(
                        line.to_string(),
                        Style::default().fg(TEXT),
                    )));
                }
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(GOLD).add_modifier(Modifier::BOLD),
                )));
                lines.extend(
                    markup::render_blocks(&msg.content)
                        .iter()
                        .map(|block| block_to_line(block, width)),
                );
            }
        }
        lines.push(Line::default());
    }

    if let Some(status) = app.session.status_text() {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(GOLD).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(Span::styled(
            format!("{status}{}", dots(app.animation_frame)),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

/// Rows `text` takes once word-wrapped into `width` columns, counted the
/// same way the chat `Paragraph` lays it out.
fn wrapped_height(text: &Text<'static>, width: u16) -> usize {
    if width == 0 {
        return text.lines.len();
    }
    Paragraph::new(text.clone())
        .wrap(Wrap { trim: false })
        .line_count(width)
}

fn chat_title(app: &App) -> Line<'static> {
    let mut spans = vec![Span::raw(format!(" AI Analyst · {} ", app.session.subject()))];
    if let Some(error) = app.session.last_error() {
        spans.push(Span::styled(format!("⚠ {error} "), Style::default().fg(RED)));
    }
    Line::from(spans)
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [actions_area, history_area, input_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Quick actions
    let action_color = if app.session.is_pending() { Color::DarkGray } else { TEXT_DIM };
    let mut action_spans = Vec::new();
    for (i, action) in app.session.quick_actions().iter().enumerate() {
        action_spans.push(Span::styled(format!("[{}]", i + 1), Style::default().fg(GOLD)));
        action_spans.push(Span::styled(
            format!(" {}  ", action.label),
            Style::default().fg(action_color),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(action_spans)), actions_area);

    // Transcript
    let inner_width = history_area.width.saturating_sub(2);
    let inner_height = history_area.height.saturating_sub(2) as usize;
    let text = Text::from(chat_lines(app, inner_width as usize));
    let max_scroll = wrapped_height(&text, inner_width).saturating_sub(inner_height);
    let max_scroll = u16::try_from(max_scroll).unwrap_or(u16::MAX);
    if app.chat_follow {
        app.chat_scroll = max_scroll;
    } else {
        app.chat_scroll = app.chat_scroll.min(max_scroll);
    }

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app.focus == FocusPane::Chat))
        .title(chat_title(app));

    let chat = Paragraph::new(text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, history_area);

    // Query input at the bottom - highlight when focused or editing
    let editing = app.input_mode == InputMode::Editing;
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(if editing {
            Style::default().fg(GOLD)
        } else {
            border_style(app.focus == FocusPane::Input)
        })
        .title(if app.session.is_pending() { " ... " } else { " Ask (i) " });

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.query.cursor;
    let scroll_offset = scroll_offset(cursor_pos, inner_width);

    let input = if app.query.is_empty() && !editing {
        Paragraph::new(Span::styled(
            app.session.placeholder(),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let visible_text: String = app
            .query
            .text
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan))
    };
    frame.render_widget(input.block(input_block), input_area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints = match app.input_mode {
        InputMode::Editing => " Enter send · Esc cancel ".to_string(),
        InputMode::Search => " type to search · ↑/↓ pick · Enter add · Esc close ".to_string(),
        InputMode::Normal => format!(
            " q quit · Tab focus · j/k move · s add · x remove · i ask · 1-4 quick · c compare \
             · p forecast · f toggle · d range · r refresh · h agent {} ",
            app.config.agent_url
        ),
    };
    frame.render_widget(
        Paragraph::new(Span::styled(hints, Style::default().fg(Color::DarkGray))),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantdesk_core::{Config, ServiceError, Signal};

    fn text_of(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_heading_levels() {
        let line = block_to_line(&DisplayBlock::Heading { level: 1, text: "Verdict".into() }, 20);
        assert_eq!(text_of(&line), "VERDICT");
        assert_eq!(line.spans[0].style.fg, Some(GOLD));

        let line = block_to_line(&DisplayBlock::Heading { level: 3, text: "Margins".into() }, 20);
        assert_eq!(text_of(&line), "Margins");
        assert_eq!(line.spans[0].style.fg, Some(TEXT));
    }

    #[test]
    fn test_divider_fills_width() {
        let line = block_to_line(&DisplayBlock::Divider, 5);
        assert_eq!(text_of(&line), "─────");
    }

    #[test]
    fn test_table_row_joins_cells() {
        let block = DisplayBlock::TableRow { cells: vec!["P/E".into(), "28.1".into()] };
        assert_eq!(text_of(&block_to_line(&block, 20)), "P/E │ 28.1");
    }

    #[test]
    fn test_callout_colour_follows_bias() {
        let sell = DisplayBlock::Callout { signal: Signal::Sell, text: "SELL".into() };
        assert_eq!(block_to_line(&sell, 10).spans[1].style.fg, Some(RED));

        let hold = DisplayBlock::Callout { signal: Signal::Hold, text: "HOLD".into() };
        assert_eq!(block_to_line(&hold, 10).spans[1].style.fg, Some(GOLD));
    }

    #[test]
    fn test_reply_lines_bold_emphasis() {
        let blocks = markup::render_blocks("- **Revenue** +8%");
        let line = block_to_line(&blocks[0], 20);
        assert_eq!(text_of(&line), "  · Revenue +8%");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_wrapped_height_breaks_at_words() {
        // Character wrapping would fit this in two rows of five
        let text = Text::from(Line::from("abc de fgh"));
        assert_eq!(wrapped_height(&text, 5), 3);

        let text = Text::from(vec![Line::from("abcdef"), Line::from("abc")]);
        assert_eq!(wrapped_height(&text, 3), 3);
        assert_eq!(wrapped_height(&text, 0), 2);
    }

    #[test]
    fn test_chat_title_shows_last_error() {
        let mut app = App::new(Config::new()).unwrap();
        assert_eq!(text_of(&chat_title(&app)), " AI Analyst · AAPL ");

        let pending = app.session.submit("Buy?").unwrap();
        app.session.resolve(pending.ticket, Err(ServiceError::Server("agent down".into())));
        let title = chat_title(&app);
        assert_eq!(text_of(&title), " AI Analyst · AAPL ⚠ agent down ");
        assert_eq!(title.spans[1].style.fg, Some(RED));
    }

    #[test]
    fn test_watchlist_item_without_quote() {
        let item = watchlist_item("PLTR", None);
        assert_eq!(item.height(), 2);
    }

    #[test]
    fn test_scroll_offset_keeps_cursor_visible() {
        assert_eq!(scroll_offset(3, 10), 0);
        assert_eq!(scroll_offset(10, 10), 1);
        assert_eq!(scroll_offset(25, 10), 16);
        assert_eq!(scroll_offset(5, 0), 0);
    }
}
