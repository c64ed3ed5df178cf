use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, LineGauge, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use crate::app::{App, ClickableRegions, DateField, InputMode, Notice, NoticeKind, PeriodMode, MENU};
use crate::model::MAX_LOOKBACK_DAYS;
use crate::view::{ChartView, Display, TableMode, TableView};

const CELL_WIDTH: u16 = 12;

pub fn ui(f: &mut Frame, app: &mut App) {
    // Clear clickable regions before each render
    app.clickable_regions = ClickableRegions::default();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Menu
            Constraint::Length(4), // Inputs
            Constraint::Min(8),    // Display region
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    render_menu(f, app, chunks[0]);
    render_inputs(f, app, chunks[1]);
    render_display(f, app, chunks[2]);
    render_status(f, app, chunks[3]);

    match &app.input_mode {
        InputMode::OpenFile(path) => render_open_dialog(f, path),
        InputMode::Notice(notice) => render_notice(f, notice),
        InputMode::Normal | InputMode::EditSymbol(_) | InputMode::EditDate(..) => {}
    }
}

fn render_menu(f: &mut Frame, app: &mut App, area: Rect) {
    let menu_y = area.y + 1; // inside the top border
    let mut x = area.x + 1;
    let mut spans: Vec<Span> = Vec::new();
    let disabled = app.busy().is_some();

    for (i, (group, items)) in MENU.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" |", Style::default().fg(Color::DarkGray)));
            x += 2;
        }
        if !group.is_empty() {
            let label = format!(" {}:", group);
            x += label.chars().count() as u16;
            spans.push(Span::styled(label, Style::default().fg(Color::Gray)));
        }
        for (item, text) in items.iter() {
            let text = format!(" {} ", text);
            let width = text.chars().count() as u16;
            app.clickable_regions.menu.push((Rect::new(x, menu_y, width, 1), *item));
            x += width;

            let style = if disabled {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::Yellow)
            };
            spans.push(Span::styled(text, style));
        }
    }

    let menu = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(" Stock Explorer "));
    f.render_widget(menu, area);
}

fn render_inputs(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Query ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(20), // Symbol
            Constraint::Min(30),    // Period
            Constraint::Length(16), // Price
            Constraint::Length(21), // Clock
        ])
        .split(inner);

    let label = Style::default().fg(Color::DarkGray);
    let editing = Style::default().fg(Color::Yellow).bold();

    // Symbol
    let symbol_line = match &app.input_mode {
        InputMode::EditSymbol(buffer) => Line::from(Span::styled(format!(" {}█", buffer), editing)),
        _ if app.symbol().is_empty() => Line::from(Span::styled(" (none)", label)),
        _ => Line::from(Span::styled(format!(" {}", app.symbol()), Style::default().fg(Color::Cyan).bold())),
    };
    f.render_widget(
        Paragraph::new(vec![Line::from(Span::styled(" Symbol [s]", label)), symbol_line]),
        chunks[0],
    );

    // Period
    match app.period_mode() {
        PeriodMode::Lookback => {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(1), Constraint::Length(1)])
                .split(chunks[1]);
            f.render_widget(
                Paragraph::new(Line::from(Span::styled(" Lookback [←→ PgUp PgDn, m=dates]", label))),
                rows[0],
            );
            let days = app.lookback_days();
            let gauge = LineGauge::default()
                .filled_style(Style::default().fg(Color::Cyan))
                .line_set(symbols::line::THICK)
                .label(format!(" {:>3} days ", days))
                .ratio(f64::from(days) / f64::from(MAX_LOOKBACK_DAYS));
            f.render_widget(gauge, rows[1]);
        }
        PeriodMode::Range => {
            let (start, end) = app.dates();
            let date_span = |field: DateField, value: String| match &app.input_mode {
                InputMode::EditDate(editing_field, buffer) if *editing_field == field => {
                    Span::styled(format!("{}█", buffer), editing)
                }
                _ => Span::styled(value, Style::default().fg(Color::Cyan)),
            };
            let lines = vec![
                Line::from(vec![
                    Span::styled(" Start [[] ", label),
                    date_span(DateField::Start, start.to_string()),
                ]),
                Line::from(vec![
                    Span::styled(" End   []] ", label),
                    date_span(DateField::End, end.to_string()),
                ]),
            ];
            f.render_widget(Paragraph::new(lines), chunks[1]);
        }
    }

    // Current price
    let price = app.price_readout().unwrap_or("--").to_string();
    f.render_widget(
        Paragraph::new(vec![
            Line::from(Span::styled(" Price", label)),
            Line::from(Span::styled(format!(" {}", price), Style::default().fg(Color::Green).bold())),
        ]),
        chunks[2],
    );

    // Clock
    f.render_widget(
        Paragraph::new(vec![
            Line::from(Span::styled(" Updated", label)),
            Line::from(format!(" {}", app.clock_label())),
        ]),
        chunks[3],
    );
}

fn render_display(f: &mut Frame, app: &App, area: Rect) {
    match app.display() {
        Display::Empty => {
            let placeholder = Paragraph::new(vec![
                Line::from(""),
                Line::from("  Nothing to show yet."),
                Line::from("  Type a symbol with s, then e to chart it, t to tabulate it or x to save it."),
            ])
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
            f.render_widget(placeholder, area);
        }
        Display::Chart(chart) => render_chart(f, chart, area),
        Display::Table(table) => render_table(f, table, area),
    }
}

fn render_chart(f: &mut Frame, chart: &ChartView, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} closing price ", chart.symbol))
        .border_style(Style::default().fg(Color::Cyan));

    let data = chart.data();
    if data.is_empty() {
        let no_data = Paragraph::new("  No price history")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(no_data, area);
        return;
    }

    let [min_y, max_y] = chart.y_bounds();
    let datasets = vec![Dataset::default()
        .name("Close")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&data)];

    let widget = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .title("Date")
                .style(Style::default().fg(Color::Gray))
                .bounds(chart.x_bounds())
                .labels(chart.x_labels().into_iter().map(Span::raw).collect::<Vec<_>>()),
        )
        .y_axis(
            Axis::default()
                .title("Price")
                .style(Style::default().fg(Color::Gray))
                .bounds([min_y, max_y])
                .labels(vec![
                    Span::raw(format!("{:.1}", min_y)),
                    Span::raw(format!("{:.1}", (min_y + max_y) / 2.0)),
                    Span::raw(format!("{:.1}", max_y)),
                ]),
        );

    f.render_widget(widget, area);
}

fn render_table(f: &mut Frame, view: &TableView, area: Rect) {
    let header_style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let header = Row::new(view.header.iter().map(|h| Cell::from(h.clone())))
        .style(header_style)
        .height(1);

    let rows: Vec<Row> = view
        .rows()
        .iter()
        .map(|row| Row::new(row.iter().map(|value| Cell::from(value.clone()))))
        .collect();
    let widths = vec![Constraint::Length(CELL_WIDTH); view.header.len()];

    let shown = view.rows().len();
    let title = match view.mode() {
        TableMode::Scrollable if shown < view.total() => {
            format!(" {} (first {} of {} rows, ↑↓ to scroll) ", view.title, shown, view.total())
        }
        TableMode::Scrollable => format!(" {} ({} rows, ↑↓ to scroll) ", view.title, shown),
        TableMode::Paged if shown < view.total() => {
            format!(" {} (first {} of {} rows) ", view.title, shown, view.total())
        }
        TableMode::Paged => format!(" {} ({} rows) ", view.title, shown),
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title));

    let mut state = TableState::default().with_offset(view.offset());
    f.render_stateful_widget(table, area, &mut state);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let (text, color) = match app.busy() {
        Some(job) => (format!(" [{}] {}", job.label(), app.status()), Color::Yellow),
        None => (format!(" {}", app.status()), Color::Green),
    };
    let hints = "  |  s=Symbol m=Mode ↑↓=Scroll";
    let line = Line::from(vec![
        Span::styled(text, Style::default().fg(color)),
        Span::styled(hints, Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn render_open_dialog(f: &mut Frame, path: &str) {
    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from("  Database file to open:"),
        Line::from(""),
        Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{}█", path), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(""),
        Line::from("  Enter=Open, Esc=Cancel").style(Style::default().fg(Color::DarkGray)),
    ];

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" File: Open ")
            .border_style(Style::default().fg(Color::Magenta)),
    );
    f.render_widget(paragraph, area);
}

fn render_notice(f: &mut Frame, notice: &Notice) {
    let area = centered_rect(50, 25, f.area());
    f.render_widget(Clear, area);

    let border = match notice.kind {
        NoticeKind::Info => Color::Cyan,
        NoticeKind::Error => Color::Red,
    };
    let lines = vec![
        Line::from(""),
        Line::from(format!("  {}", notice.message)),
        Line::from(""),
        Line::from("  Press any key to close").style(Style::default().fg(Color::DarkGray)),
    ];

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", notice.title))
            .border_style(Style::default().fg(border)),
    );
    f.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MenuItem;
    use crate::config::Config;
    use crate::fetch::tests::MockSource;
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn app_with(days: usize, table_mode: TableMode) -> (App, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("stocks.db"),
            table_mode,
            ..Config::default()
        };
        let mut app = App::new(&config, Arc::new(MockSource::with_days("AAPL", days)));
        app.set_symbol("AAPL");
        (app, dir)
    }

    fn settle(app: &mut App) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while app.busy().is_some() && Instant::now() < deadline {
            app.poll_jobs();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(app.busy().is_none(), "job did not finish");
    }

    fn draw(app: &mut App) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(110, 45)).unwrap();
        terminal.draw(|f| ui(f, app)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content
            .chunks(buffer.area.width as usize)
            .map(|line| line.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect()
    }

    fn count_rows(screen: &[String]) -> usize {
        screen.iter().filter(|line| line.contains("2024-01-")).count()
    }

    #[test]
    fn test_table_shows_header_and_twenty_rows() {
        let (mut app, _dir) = app_with(30, TableMode::Scrollable);
        app.show_table();
        settle(&mut app);

        let screen = draw(&mut app);
        assert_eq!(count_rows(&screen), 20);
        assert_eq!(screen.iter().filter(|l| l.contains("Volume")).count(), 1);
        assert!(screen.iter().any(|l| l.contains("first 20 of 30 rows")));
    }

    #[test]
    fn test_paged_table_shows_ten_rows() {
        let (mut app, _dir) = app_with(30, TableMode::Paged);
        app.show_table();
        settle(&mut app);

        let screen = draw(&mut app);
        assert_eq!(count_rows(&screen), 10);
    }

    #[test]
    fn test_short_series_shows_every_row() {
        let (mut app, _dir) = app_with(4, TableMode::Paged);
        app.show_table();
        settle(&mut app);
        assert_eq!(count_rows(&draw(&mut app)), 4);
    }

    #[test]
    fn test_chart_and_table_never_overlap() {
        let (mut app, _dir) = app_with(30, TableMode::Scrollable);
        app.explore();
        settle(&mut app);
        let screen = draw(&mut app).join("\n");
        assert!(screen.contains("AAPL closing price"));
        assert!(screen.contains("129.00"));
        assert!(!screen.contains("Volume"));

        app.show_table();
        settle(&mut app);
        let screen = draw(&mut app).join("\n");
        assert!(screen.contains("Volume"));
        assert!(!screen.contains("closing price"));

        app.close_view();
        let screen = draw(&mut app).join("\n");
        assert!(!screen.contains("Volume"));
        assert!(!screen.contains("closing price"));
        assert!(screen.contains("Nothing to show yet"));
    }

    #[test]
    fn test_menu_regions_recorded() {
        let (mut app, _dir) = app_with(1, TableMode::Scrollable);
        let screen = draw(&mut app).join("\n");
        assert!(screen.contains("Chart: e Explore  t Table  w Close"));

        let items: Vec<MenuItem> = app.clickable_regions.menu.iter().map(|(_, item)| *item).collect();
        assert_eq!(
            items,
            vec![
                MenuItem::Open,
                MenuItem::Quit,
                MenuItem::Explore,
                MenuItem::Table,
                MenuItem::Close,
                MenuItem::Export,
                MenuItem::Clear,
            ]
        );
        // " File:" precedes the first entry inside the border
        let (first, _) = app.clickable_regions.menu[0];
        assert_eq!((first.x, first.y), (7, 1));
    }

    #[test]
    fn test_notice_drawn_over_display() {
        let (mut app, _dir) = app_with(1, TableMode::Scrollable);
        app.set_symbol("");
        app.explore();
        let screen = draw(&mut app).join("\n");
        assert!(screen.contains("Check input"));
        assert!(screen.contains("Enter a stock symbol first"));
    }
}
