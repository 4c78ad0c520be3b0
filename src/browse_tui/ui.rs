use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
};

use crate::browse_tui::app::BrowserState;

pub fn render(frame: &mut Frame, state: &mut BrowserState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Collection
            Constraint::Length(1), // Help text
        ])
        .split(frame.area());

    let header_style = if state.searching {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Cyan)
    };
    let header = Paragraph::new(state.header())
        .style(header_style)
        .block(Block::default().borders(Borders::ALL).title("disq"));
    frame.render_widget(header, chunks[0]);

    let column_names = Row::new(vec![
        Cell::from("Artist"),
        Cell::from("Album"),
        Cell::from("Year"),
        Cell::from("Rating"),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = state
        .rows
        .iter()
        .map(|row| {
            Row::new(vec![
                Cell::from(row.artist.as_str()),
                Cell::from(row.title.as_str()),
                Cell::from(row.year.map(|y| y.to_string()).unwrap_or_default()),
                Cell::from(stars(row.rating)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(35),
            Constraint::Percentage(45),
            Constraint::Length(6),
            Constraint::Length(7),
        ],
    )
    .header(column_names)
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Collection ({})", state.rows.len())),
    );
    frame.render_stateful_widget(table, chunks[1], &mut state.table_state);

    let help = Paragraph::new("[/: Search] [j/k: Move] [PgUp/PgDn: Page] [q: Quit]")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[2]);
}

fn stars(rating: i32) -> String {
    let filled = rating.clamp(0, 5) as usize;
    format!("{}{}", "*".repeat(filled), ".".repeat(5 - filled))
}
