//! Custom error types for the speed test engine.
//!
//! Every fallible operation in the crate returns a [`SpeedTestError`]. The
//! [`ErrorKind`] taxonomy separates cancellation (user-initiated, never
//! retried, never reported as a failure) from ordinary I/O failures and
//! from fatal errors that abort a run.

use std::error::Error;
use std::fmt;

/// Exit codes for the application.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Network error (connection failed, timeout, etc.).
    pub const NETWORK_ERROR: i32 = 1;
    /// The echo service returned an error response.
    pub const API_ERROR: i32 = 2;
    /// Configuration error (invalid arguments, unreadable label file).
    pub const CONFIG_ERROR: i32 = 3;
    /// The run was stopped before it completed.
    pub const CANCELLED: i32 = 130;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of errors that can occur during speed testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The operation observed a cancellation request.
    Cancelled,
    /// Network connectivity issues.
    Network,
    /// Connection timeout.
    Timeout,
    /// The echo service returned a non-success status.
    Api,
    /// Local persistence failed.
    Storage,
    /// Neither share strategy could deliver the summary.
    Share,
    /// The operation is not allowed in the current phase.
    InvalidState,
    /// Invalid configuration or arguments.
    Config,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Cancelled => exit_codes::CANCELLED,
            ErrorKind::Network => exit_codes::NETWORK_ERROR,
            ErrorKind::Timeout => exit_codes::NETWORK_ERROR,
            ErrorKind::Api => exit_codes::API_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::Storage
            | ErrorKind::Share
            | ErrorKind::InvalidState
            | ErrorKind::Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Network => "Network error",
            ErrorKind::Timeout => "Connection timeout",
            ErrorKind::Api => "Echo service error",
            ErrorKind::Storage => "Storage error",
            ErrorKind::Share => "Share error",
            ErrorKind::InvalidState => "Invalid state",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Unknown => "Unknown error",
        }
    }
}

/// A user-friendly error type for speed test operations.
#[derive(Debug)]
pub struct SpeedTestError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// User-friendly error message.
    pub message: String,
    /// Optional suggestion for how to resolve the error.
    pub suggestion: Option<String>,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl SpeedTestError {
    /// Create a new SpeedTestError.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    /// Add a suggestion for how to resolve the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add the underlying error source.
    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Create a cancellation error.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation was cancelled")
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
            .with_suggestion("Check your internet connection and try again.")
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message).with_suggestion(
            "The server may be slow or unreachable. Try again later.",
        )
    }

    /// Create an API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, message).with_suggestion(
            "The echo service may be experiencing issues. Try again later.",
        )
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Create a share error.
    pub fn share(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Share, message)
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }
}

impl fmt::Display for SpeedTestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

impl Error for SpeedTestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<reqwest::Error> for SpeedTestError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            ErrorKind::Timeout
        } else if error.is_status() {
            ErrorKind::Api
        } else if error.is_connect() || error.is_request() || error.is_body()
        {
            ErrorKind::Network
        } else {
            classify_error(&error)
        };

        to_speed_test_error(kind, Box::new(error), "request failed")
    }
}

impl From<std::io::Error> for SpeedTestError {
    fn from(error: std::io::Error) -> Self {
        let kind = classify_error(&error);
        to_speed_test_error(kind, Box::new(error), "i/o failed")
    }
}

/// Classify an error into an ErrorKind based on its message.
pub fn classify_error(error: &dyn Error) -> ErrorKind {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("deadline")
    {
        return ErrorKind::Timeout;
    }

    if error_str.contains("dns")
        || error_str.contains("resolve")
        || error_str.contains("connection refused")
        || error_str.contains("connection reset")
        || error_str.contains("network unreachable")
        || error_str.contains("host unreachable")
        || error_str.contains("no route")
        || error_str.contains("broken pipe")
    {
        return ErrorKind::Network;
    }

    if error_str.contains("status: 4")
        || error_str.contains("status: 5")
        || error_str.contains("server error")
    {
        return ErrorKind::Api;
    }

    if error_str.contains("permission denied")
        || error_str.contains("read-only")
        || error_str.contains("no space")
    {
        return ErrorKind::Storage;
    }

    ErrorKind::Unknown
}

/// Wrap a foreign error into a SpeedTestError of the given kind, adding the
/// matching suggestion.
pub fn to_speed_test_error(
    kind: ErrorKind,
    error: Box<dyn Error + Send + Sync>,
    context: &str,
) -> SpeedTestError {
    let message = format!("{}: {}", context, error);

    let mut speed_error = SpeedTestError::new(kind, message);
    speed_error.source = Some(error);

    match kind {
        ErrorKind::Network => speed_error
            .with_suggestion("Check your internet connection and try again."),
        ErrorKind::Timeout => speed_error.with_suggestion(
            "The server may be slow or unreachable. Try again later.",
        ),
        ErrorKind::Api => speed_error.with_suggestion(
            "The echo service may be experiencing issues. Try again later.",
        ),
        ErrorKind::Storage => speed_error.with_suggestion(
            "Check that the data directory exists and is writable.",
        ),
        _ => speed_error,
    }
}

/// Format an error for user display.
pub fn format_error_for_display(error: &SpeedTestError) -> String {
    let mut output = format!("Error: {}", error.message);

    if let Some(ref suggestion) = error.suggestion {
        output.push_str(&format!("\n\nSuggestion: {}", suggestion));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_exit_codes() {
        assert_eq!(ErrorKind::Network.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Timeout.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Api.exit_code(), exit_codes::API_ERROR);
        assert_eq!(ErrorKind::Config.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(ErrorKind::Cancelled.exit_code(), exit_codes::CANCELLED);
    }

    #[test]
    fn test_speed_test_error_display() {
        let error = SpeedTestError::network("Failed to connect to server")
            .with_suggestion("Check your internet connection.");

        let display = format!("{}", error);
        assert!(display.contains("Network error"));
        assert!(display.contains("Failed to connect"));
        assert!(display.contains("Suggestion"));
    }

    #[test]
    fn test_cancelled_is_distinguished() {
        assert!(SpeedTestError::cancelled().is_cancelled());
        assert!(!SpeedTestError::network("reset").is_cancelled());
        assert!(!SpeedTestError::api("503").is_cancelled());
    }

    #[test]
    fn test_classify_error_timeout() {
        let error = std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connection timed out",
        );
        assert_eq!(classify_error(&error), ErrorKind::Timeout);
    }

    #[test]
    fn test_classify_error_network() {
        let error = std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        );
        assert_eq!(classify_error(&error), ErrorKind::Network);
    }

    #[test]
    fn test_classify_error_storage() {
        let error = std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "permission denied",
        );
        assert_eq!(classify_error(&error), ErrorKind::Storage);
    }

    #[test]
    fn test_classify_error_unknown() {
        let error = std::io::Error::other("some random error");
        assert_eq!(classify_error(&error), ErrorKind::Unknown);
    }

    #[test]
    fn test_io_error_conversion_keeps_source() {
        let error: SpeedTestError =
            std::io::Error::other("connection reset by peer").into();

        assert_eq!(error.kind, ErrorKind::Network);
        assert!(error.source().is_some());
        assert!(error.suggestion.is_some());
    }

    #[test]
    fn test_format_error_for_display() {
        let error = SpeedTestError::timeout("ping probe");
        let output = format_error_for_display(&error);

        assert!(output.starts_with("Error: ping probe"));
        assert!(output.contains("Suggestion:"));
    }
}
