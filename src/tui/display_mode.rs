//! How a run presents itself: full TUI, a quiet summary, or JSON.

use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Live gauge in the alternate screen
    Tui,
    /// Nothing until the colored summary at the end
    Silent,
    /// The result report as JSON, nothing else on stdout
    Json,
}

impl DisplayMode {
    /// `--json` always wins; otherwise the TUI needs a terminal on stdout.
    pub fn detect(json_flag: bool, is_tty: bool) -> Self {
        match (json_flag, is_tty) {
            (true, _) => DisplayMode::Json,
            (false, true) => DisplayMode::Tui,
            (false, false) => DisplayMode::Silent,
        }
    }

    pub fn for_stdout(json_flag: bool) -> Self {
        Self::detect(json_flag, std::io::stdout().is_terminal())
    }

    pub fn is_interactive(self) -> bool {
        self == DisplayMode::Tui
    }
}
