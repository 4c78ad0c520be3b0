use std::{thread, time::Duration};

use color_eyre::eyre::{Context, Result, eyre};
use crossterm::event::{self, Event as CrosstermEvent};
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub enum Event {
    /// Emitted by the terminal.
    Crossterm(CrosstermEvent),
    /// Emitted by key handling, consumed by the app loop.
    App(AppEvent),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppEvent {
    /// Reload the table with artists matching this filter.
    Search(String),
}

/// Terminal event handler.
///
/// Crossterm is read on a dedicated thread since `event::read` blocks.
#[derive(Debug)]
pub struct EventHandler {
    sender: mpsc::UnboundedSender<Event>,
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        let crossterm_sender = sender.clone();
        thread::spawn(move || {
            if let Err(err) = read_crossterm_events(crossterm_sender) {
                log::error!("Terminal event thread stopped: {:?}", err);
            }
        });

        Self { sender, receiver }
    }

    /// Waits for the next event.
    pub async fn next(&mut self) -> Result<Event> {
        self.receiver
            .recv()
            .await
            .ok_or(eyre!("Terminal event channel closed"))
    }

    /// Queue an app event for the next loop iteration.
    pub fn send(&self, app_event: AppEvent) {
        // The receiver lives as long as self
        let _ = self.sender.send(Event::App(app_event));
    }
}

fn read_crossterm_events(sender: mpsc::UnboundedSender<Event>) -> Result<()> {
    loop {
        if event::poll(TIMEOUT).context("Failed to poll for terminal events")? {
            let event = event::read().context("Failed to read terminal event")?;
            if sender.send(Event::Crossterm(event)).is_err() {
                // App shut down
                return Ok(());
            }
        } else if sender.is_closed() {
            return Ok(());
        }
    }
}
