use std::sync::Arc;

use color_eyre::Result;
use ratatui::widgets::TableState;

use crate::browse_tui::event::{AppEvent, Event, EventHandler};
use crate::browse_tui::input::handle_key_event;
use crate::database::{CollectionRow, Database};

/// Everything the key handler and renderer touch. Kept apart from the
/// event plumbing so it can be driven directly.
#[derive(Debug, Default)]
pub struct BrowserState {
    pub rows: Vec<CollectionRow>,
    pub table_state: TableState,
    pub searching: bool,
    pub input: String,
    pub last_search: String,
    pub running: bool,
}

impl BrowserState {
    pub fn new() -> Self {
        Self {
            running: true,
            ..Self::default()
        }
    }

    pub fn set_rows(&mut self, rows: Vec<CollectionRow>) {
        self.rows = rows;
        self.table_state
            .select(if self.rows.is_empty() { None } else { Some(0) });
    }

    pub fn selected(&self) -> Option<usize> {
        self.table_state.selected()
    }

    pub fn move_down(&mut self, by: usize) {
        if self.rows.is_empty() {
            return;
        }
        let last = self.rows.len() - 1;
        let next = self.selected().map_or(0, |i| (i + by).min(last));
        self.table_state.select(Some(next));
    }

    pub fn move_up(&mut self, by: usize) {
        if self.rows.is_empty() {
            return;
        }
        let next = self.selected().map_or(0, |i| i.saturating_sub(by));
        self.table_state.select(Some(next));
    }

    pub fn header(&self) -> String {
        if self.searching {
            format!("/{}", self.input)
        } else {
            format!("Searched: {}", self.last_search)
        }
    }

    pub fn quit(&mut self) {
        self.running = false;
    }
}

pub struct App {
    pub state: BrowserState,
    db: Arc<Database>,
    events: EventHandler,
}

impl App {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            state: BrowserState::new(),
            db,
            events: EventHandler::new(),
        }
    }

    pub async fn run(
        &mut self,
        terminal: &mut ratatui::prelude::Terminal<
            ratatui::prelude::CrosstermBackend<std::io::Stdout>,
        >,
    ) -> Result<()> {
        self.search(String::new()).await?;

        while self.state.running {
            terminal.draw(|f| crate::browse_tui::ui::render(f, &mut self.state))?;
            self.handle_events().await?;
        }

        Ok(())
    }

    async fn handle_events(&mut self) -> Result<()> {
        match self.events.next().await? {
            Event::Crossterm(crossterm::event::Event::Key(key_event))
                if key_event.kind == crossterm::event::KeyEventKind::Press =>
            {
                if let Some(app_event) = handle_key_event(&mut self.state, key_event) {
                    self.events.send(app_event);
                }
            }
            Event::Crossterm(_) => {}
            Event::App(AppEvent::Search(filter)) => self.search(filter).await?,
        }
        Ok(())
    }

    async fn search(&mut self, filter: String) -> Result<()> {
        let rows = self.db.search_collection(&filter).await?;
        log::debug!("Search '{}' matched {} rows", filter, rows.len());
        self.state.set_rows(rows);
        self.state.last_search = filter;
        Ok(())
    }
}
