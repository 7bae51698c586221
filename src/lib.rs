//! speedgauge measures ping, jitter, download and upload speed against an
//! HTTP echo service.
//!
//! The entry point is [`SpeedTestSession`]: it drives the measurement
//! phases, animates the [`gauge::Gauge`], keeps the rolling
//! [`history::History`] and shares result summaries. Front ends render
//! [`SessionSnapshot`]s.

pub mod echo;
pub mod errors;
pub mod gauge;
pub mod history;
pub mod labels;
pub mod measure;
pub mod progress;
pub mod rating;
pub mod results;
pub mod retry;
pub mod session;
pub mod share;
pub mod stats;
pub mod tui;

pub use errors::{ErrorKind, SpeedTestError};
pub use results::SpeedTestResult;
pub use session::{SessionSnapshot, SpeedTestSession};
