//! TUI controller for managing the display lifecycle.
//!
//! The controller owns the terminal, mirrors the session into a
//! [`TuiState`] once per frame and turns key presses into actions.

use std::io::{self, Stdout};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use ratatui::{backend::CrosstermBackend, Terminal};

use super::display_mode::DisplayMode;
use super::renderer::render_frame;
use super::state::TuiState;
use crate::echo::Transport;
use crate::errors::SpeedTestError;
use crate::labels::Labels;
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::session::SpeedTestSession;
use crate::share::ShareOutcome;

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Stop any running test and leave
    Quit,
    /// Stop the running test and stay
    Stop,
    /// Start another run
    Run,
    Share,
    ClearHistory,
}

/// `q` and `Ctrl+C` quit, `Esc` stops; `r`, `s` and `c` run, share and
/// clear.
pub fn key_action(key: KeyEvent) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    let control = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Char('c') if control => Some(KeyAction::Quit),
        KeyCode::Char('q') => Some(KeyAction::Quit),
        KeyCode::Esc => Some(KeyAction::Stop),
        KeyCode::Char('r') => Some(KeyAction::Run),
        KeyCode::Char('s') => Some(KeyAction::Share),
        KeyCode::Char('c') => Some(KeyAction::ClearHistory),
        _ => None,
    }
}

pub struct TuiController {
    mode: DisplayMode,
    state: Arc<Mutex<TuiState>>,
    /// Only present in TUI mode after `init`
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
    initialized: bool,
}

impl TuiController {
    pub fn new(mode: DisplayMode, labels: Labels) -> Self {
        Self {
            mode,
            state: Arc::new(Mutex::new(TuiState::new(labels))),
            terminal: None,
            initialized: false,
        }
    }

    /// Enter the alternate screen and raw mode. A no-op outside TUI mode.
    pub fn init(&mut self) -> Result<(), SpeedTestError> {
        if !self.mode.is_interactive() {
            return Ok(());
        }

        enable_raw_mode()?;
        // Cleanup must undo raw mode even if a later step fails
        self.initialized = true;

        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        self.state().terminal_width = terminal.size()?.width;
        self.terminal = Some(terminal);

        Ok(())
    }

    /// Restore the terminal.
    pub fn cleanup(&mut self) -> Result<(), SpeedTestError> {
        if !self.initialized {
            return Ok(());
        }

        self.initialized = false;
        let screen = match self.terminal.take() {
            Some(mut terminal) => execute!(
                terminal.backend_mut(),
                LeaveAlternateScreen,
                cursor::Show
            ),
            None => execute!(io::stdout(), LeaveAlternateScreen, cursor::Show),
        };

        // Raw mode goes even when the screen could not be restored
        disable_raw_mode()?;
        screen?;

        Ok(())
    }

    /// Copy the session's current figures into the display state.
    pub fn refresh<T: Transport>(&self, session: &SpeedTestSession<T>) {
        let snapshot = session.snapshot();
        let rating = session.rating();

        self.state().sync(snapshot, rating);
    }

    pub fn set_error(&self, error: &SpeedTestError) {
        self.state().set_error(error);
    }

    pub fn set_share_outcome(&self, outcome: ShareOutcome) {
        self.state().set_share_outcome(outcome);
    }

    /// Draw one frame. A no-op outside TUI mode.
    pub fn render(&mut self) -> Result<(), SpeedTestError> {
        let Some(ref mut terminal) = self.terminal else {
            return Ok(());
        };

        // Clone so the lock is not held while drawing
        let state = {
            let mut state = lock(&self.state);
            state.terminal_width = terminal.size()?.width;
            state.clone()
        };

        terminal.draw(|frame| render_frame(frame, &state))?;

        Ok(())
    }

    /// The next key action, without waiting. Always `None` outside TUI
    /// mode.
    pub fn poll_key(&self) -> Result<Option<KeyAction>, SpeedTestError> {
        if self.terminal.is_none() {
            return Ok(None);
        }

        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if let Some(action) = key_action(key) {
                    return Ok(Some(action));
                }
            }
        }

        Ok(None)
    }

    /// Callback that feeds the session's progress events to the display.
    pub fn progress_callback(&self) -> Box<dyn ProgressCallback> {
        Box::new(TuiProgressCallback { state: Arc::clone(&self.state) })
    }

    fn state(&self) -> MutexGuard<'_, TuiState> {
        lock(&self.state)
    }
}

impl Drop for TuiController {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn lock(state: &Mutex<TuiState>) -> MutexGuard<'_, TuiState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct TuiProgressCallback {
    state: Arc<Mutex<TuiState>>,
}

impl ProgressCallback for TuiProgressCallback {
    fn on_progress(&self, event: ProgressEvent) {
        // Never block the measurement; a skipped event is redrawn from the
        // next snapshot anyway
        if let Ok(mut state) = self.state.try_lock() {
            state.update_from_event(&event);
        }
    }
}
