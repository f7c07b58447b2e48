use std::fmt;

use serde::Serialize;

use crate::span::{LineIndex, Span};

/// Diagnostic severity. Only `Error` blocks artifact emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Hint => write!(f, "hint"),
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single diagnostic collected during compilation.
///
/// The highlighted length is `span.len()`; renderers that need line/column
/// pairs resolve them through a [`LineIndex`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity,
            message: message.into(),
            span,
        }
    }

    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Error, message, span)
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Warning, message, span)
    }

    /// Plain one-line rendering: `[file:line:col] severity: message`.
    pub fn render_plain(&self, file: &str, index: &LineIndex) -> String {
        let (line, col) = index.line_col(self.span.start);
        format!("[{file}:{line}:{col}] {}: {}", self.severity, self.message)
    }
}

/// Accumulator for diagnostics across all pipeline stages.
///
/// Compilation continues on non-fatal errors; each stage pushes what it
/// finds and recovery decides how much further work is useful. The driver
/// inspects `has_errors` to decide whether artifacts may be produced.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.error_count += 1;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::error(message, span));
    }

    pub fn warning(&mut self, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::warning(message, span));
    }

    pub fn info(&mut self, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::new(Severity::Info, message, span));
    }

    pub fn hint(&mut self, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::new(Severity::Hint, message, span));
    }

    /// Whether any error-severity diagnostic has been collected.
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_counts_errors_only() {
        let mut sink = DiagnosticSink::new();
        sink.warning("shadowed", Span::new(0, 4));
        assert!(!sink.has_errors());
        sink.error("unresolved identifier `foo`", Span::new(5, 8));
        sink.hint("did you mean `?:`", Span::new(9, 11));
        assert!(sink.has_errors());
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn render_plain_format() {
        let src = "val x = 1\nval y =\n";
        let index = LineIndex::new(src);
        let diag = Diagnostic::error("expected expression", Span::new(17, 18));
        insta::assert_snapshot!(
            diag.render_plain("main.opal", &index),
            @"[main.opal:2:8] error: expected expression"
        );
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Hint);
    }
}
