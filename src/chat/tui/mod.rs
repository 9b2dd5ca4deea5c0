//! Terminal user interface for the chat session.
//!
//! The UI consumes the session's event stream and submits input lines
//! back to it; everything else - gossip, membership, commands - happens
//! inside the session.

mod app;
pub mod event;
mod ui;

pub use app::App;
pub use event::{handle_key_event, Event, EventHandler, KeyAction};
pub use ui::render;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::chat::error::ChatError;
use crate::chat::message::Message;
use crate::chat::session::Session;

/// How often the reader task emits a tick when the terminal is idle.
const TICK_RATE: Duration = Duration::from_millis(100);

/// Initialize the terminal for TUI mode.
pub fn init_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>, ChatError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    Ok(terminal)
}

/// Restore the terminal to normal mode.
pub fn restore_terminal(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
) -> Result<(), ChatError> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Run the chat interface until the user quits or the session closes.
pub async fn run(user: &str, session: Arc<Session>) -> Result<(), ChatError> {
    let mut terminal = init_terminal()?;
    let result = run_loop(&mut terminal, user, session).await;
    restore_terminal(&mut terminal)?;
    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    user: &str,
    session: Arc<Session>,
) -> Result<(), ChatError> {
    let mut app = App::new(user);
    let mut handler = EventHandler::new();
    EventHandler::spawn_reader(handler.sender(), TICK_RATE);
    let events = session.events();

    loop {
        terminal.draw(|frame| render(frame, &app))?;

        tokio::select! {
            term = handler.next() => {
                let Some(term) = term else { break };
                match term {
                    Event::Key(key) => match handle_key_event(&mut app, key) {
                        KeyAction::Submit => {
                            let text = app.take_input();
                            match session.submit(&text).await {
                                Ok(()) => {}
                                Err(ChatError::Quit) => app.should_quit = true,
                                Err(err) => app.push(Message::system(err.to_string())),
                            }
                        }
                        KeyAction::Quit => {}
                        KeyAction::None => {}
                    },
                    Event::Tick | Event::Resize(..) => {}
                }
            }
            msg = events.next() => {
                match msg {
                    Some(msg) => app.apply(msg),
                    None => break,
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}
