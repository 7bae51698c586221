//! Terminal front end for a speed test session.
//!
//! Renders the session's snapshots with ratatui: the eased speed gauge,
//! phase progress, figures, rating and recent history.

pub mod controller;
pub mod display_mode;
pub mod renderer;
pub mod state;

pub use controller::{key_action, KeyAction, TuiController};
pub use display_mode::DisplayMode;
pub use state::TuiState;
