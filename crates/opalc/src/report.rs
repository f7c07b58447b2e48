//! Diagnostic rendering: ariadne reports with codes and labels, plus the
//! plain `[file:line:col] severity: message` line format.

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

use opal_common::diag::{Diagnostic, Severity};
use opal_common::span::LineIndex;

/// Stable code for a diagnostic: `E####` for errors, `W####` for
/// warnings, `N####` for notes.
fn diagnostic_code(diagnostic: &Diagnostic) -> String {
    let prefix = match diagnostic.severity {
        Severity::Error => 'E',
        Severity::Warning => 'W',
        Severity::Info | Severity::Hint => 'N',
    };
    // A small stable hash of the message shape keeps codes consistent
    // across runs without a central registry.
    let class = diagnostic
        .message
        .split([' ', '`'])
        .next()
        .unwrap_or("")
        .bytes()
        .fold(0u32, |acc, b| (acc.wrapping_mul(31).wrapping_add(b as u32)))
        % 1000;
    format!("{prefix}{class:04}")
}

/// One-line-per-diagnostic plain rendering.
pub fn render_plain(diagnostics: &[Diagnostic], file: &str, source: &str) -> String {
    let index = LineIndex::new(source);
    let mut out = String::new();
    for diagnostic in diagnostics {
        out.push_str(&diagnostic.render_plain(file, &index));
        out.push('\n');
    }
    out
}

/// Human-oriented ariadne rendering. Colorless when `color` is false so
/// output is snapshot-stable.
pub fn render_pretty(diagnostics: &[Diagnostic], _file: &str, source: &str, color: bool) -> String {
    let config = Config::default().with_color(color);
    let source_len = source.len();
    let mut out = String::new();

    for diagnostic in diagnostics {
        let kind = match diagnostic.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
            Severity::Info | Severity::Hint => ReportKind::Advice,
        };
        let start = (diagnostic.span.start as usize).min(source_len);
        let end = (diagnostic.span.end as usize).min(source_len).max(start);
        // ariadne needs a non-empty span.
        let range = if start == end {
            start..(start + 1).min(source_len.max(1))
        } else {
            start..end
        };
        let label_color = match diagnostic.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
            _ => Color::Blue,
        };
        let report = Report::build(kind, range.clone())
            .with_code(diagnostic_code(diagnostic))
            .with_message(&diagnostic.message)
            .with_config(config)
            .with_label(
                Label::new(range)
                    .with_message(&diagnostic.message)
                    .with_color(label_color),
            )
            .finish();

        let mut buf = Vec::new();
        let cache = Source::from(source);
        if report.write(cache, &mut buf).is_ok() {
            out.push_str(&String::from_utf8_lossy(&buf));
        }
    }
    out
}

/// Machine rendering for `--json`.
pub fn render_json(diagnostics: &[Diagnostic], file: &str, source: &str) -> String {
    let index = LineIndex::new(source);
    let rows: Vec<serde_json::Value> = diagnostics
        .iter()
        .map(|d| {
            let (line, col) = index.line_col(d.span.start);
            serde_json::json!({
                "file": file,
                "severity": d.severity.to_string(),
                "message": d.message,
                "line": line,
                "column": col,
                "offset": d.span.start,
                "length": d.span.len(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_common::span::Span;

    #[test]
    fn plain_format_matches_contract() {
        let source = "val x =\n";
        let diagnostics = vec![Diagnostic::error("expected expression", Span::new(7, 8))];
        let out = render_plain(&diagnostics, "main.opal", source);
        assert_eq!(out, "[main.opal:1:8] error: expected expression\n");
    }

    #[test]
    fn json_format_carries_position_and_length() {
        let source = "val x = y\n";
        let diagnostics = vec![Diagnostic::error(
            "unresolved identifier `y`",
            Span::new(8, 9),
        )];
        let out = render_json(&diagnostics, "main.opal", source);
        assert!(out.contains("\"line\": 1"));
        assert!(out.contains("\"column\": 9"));
        assert!(out.contains("\"length\": 1"));
    }

    #[test]
    fn pretty_rendering_includes_code_and_message() {
        let source = "val x = y\n";
        let diagnostics = vec![Diagnostic::error(
            "unresolved identifier `y`",
            Span::new(8, 9),
        )];
        let out = render_pretty(&diagnostics, "main.opal", source, false);
        assert!(out.contains("unresolved identifier"));
        assert!(out.contains("[E"), "expected an error code: {out}");
    }
}
