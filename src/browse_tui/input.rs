use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::browse_tui::{app::BrowserState, event::AppEvent};

const PAGE: usize = 10;

/// Apply a key press to the browser. Returns the event to queue, if any.
pub fn handle_key_event(state: &mut BrowserState, key: KeyEvent) -> Option<AppEvent> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        state.quit();
        return None;
    }

    if state.searching {
        handle_search_input(state, key)
    } else {
        handle_table_input(state, key);
        None
    }
}

fn handle_search_input(state: &mut BrowserState, key: KeyEvent) -> Option<AppEvent> {
    match key.code {
        KeyCode::Enter => {
            state.searching = false;
            return Some(AppEvent::Search(std::mem::take(&mut state.input)));
        }
        KeyCode::Esc => {
            state.searching = false;
            state.input.clear();
        }
        KeyCode::Backspace => {
            state.input.pop();
        }
        KeyCode::Char(c) => state.input.push(c),
        _ => {}
    }
    None
}

fn handle_table_input(state: &mut BrowserState, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => state.quit(),
        KeyCode::Char('/') => {
            state.searching = true;
            state.input.clear();
        }
        KeyCode::Down | KeyCode::Char('j') => state.move_down(1),
        KeyCode::Up | KeyCode::Char('k') => state.move_up(1),
        KeyCode::PageDown => state.move_down(PAGE),
        KeyCode::PageUp => state.move_up(PAGE),
        _ => {}
    }
}
