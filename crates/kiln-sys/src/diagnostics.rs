//! Diagnostics pushed into the compiler's collector

use serde::Serialize;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// The requested capability is unavailable
    Error,
    /// Something degraded but work can continue
    Warn,
}

/// A message for the compiler core's diagnostic collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Severity
    pub level: DiagnosticLevel,
    /// Short title
    pub header: String,
    /// Full message
    pub message_text: String,
}

impl Diagnostic {
    /// Error-level diagnostic.
    pub fn error(header: impl Into<String>, message_text: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            header: header.into(),
            message_text: message_text.into(),
        }
    }

    /// Warning-level diagnostic.
    pub fn warn(header: impl Into<String>, message_text: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warn,
            header: header.into(),
            message_text: message_text.into(),
        }
    }

    /// Whether this is an error.
    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}
