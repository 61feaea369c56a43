//! Property tests for the javac diagnostic parser
//!
//! These tests verify:
//! - Parsing is deterministic for arbitrary output
//! - Every well-formed `file:line: severity: message` header becomes exactly one diagnostic,
//!   with snippet and caret lines attached to it
//! - Summary lines feed the reported counts, never the diagnostic list

use modide::Severity;
use modide::services::DiagnosticParser;
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Header {
    file: String,
    line: u32,
    severity: &'static str,
    message: String,
    caret_offset: usize,
}

fn header() -> impl Strategy<Value = Header> {
    (
        "(src/main/java/)?[a-z]{1,6}/[A-Z][a-z]{0,8}\\.java",
        1u32..100_000,
        prop_oneof![Just("error"), Just("warning")],
        "[a-z][a-z ;'()]{0,30}",
        0usize..40,
    )
        .prop_map(|(file, line, severity, message, caret_offset)| Header {
            file,
            line,
            severity,
            message,
            caret_offset,
        })
}

fn render(headers: &[Header]) -> Vec<String> {
    let mut lines = Vec::new();
    for h in headers {
        lines.push(format!("{}:{}: {}: {}", h.file, h.line, h.severity, h.message));
        lines.push("        int value = compute(input);".to_string());
        lines.push(format!("{}^", " ".repeat(h.caret_offset)));
    }
    lines
}

proptest! {
    #[test]
    fn parsing_is_deterministic(lines in proptest::collection::vec("\\PC{0,60}", 0..30)) {
        let parser = DiagnosticParser::javac();
        let first = parser.parse_lines(lines.iter().map(String::as_str));
        let second = parser.parse_lines(lines.iter().map(String::as_str));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn each_header_yields_one_located_diagnostic(headers in proptest::collection::vec(header(), 0..20)) {
        let lines = render(&headers);
        let parsed = DiagnosticParser::javac().parse_lines(lines.iter().map(String::as_str));

        prop_assert_eq!(parsed.diagnostics.len(), headers.len());
        for (diagnostic, h) in parsed.diagnostics.iter().zip(&headers) {
            prop_assert_eq!(diagnostic.file.as_ref().map(|f| f.as_str()), Some(h.file.as_str()));
            prop_assert_eq!(diagnostic.line, Some(h.line));
            prop_assert_eq!(diagnostic.column, Some(h.caret_offset as u32 + 1));
            prop_assert_eq!(diagnostic.headline(), h.message.as_str());
            prop_assert_eq!(diagnostic.severity, Severity::from_tool_word(h.severity));
        }
    }

    #[test]
    fn summary_lines_are_counted_not_listed(errors in 1usize..500, warnings in 1usize..500) {
        let lines = [
            format!("{} error{}", errors, if errors == 1 { "" } else { "s" }),
            format!("{} warning{}", warnings, if warnings == 1 { "" } else { "s" }),
        ];
        let parsed = DiagnosticParser::javac().parse_lines(lines.iter().map(String::as_str));

        prop_assert!(parsed.diagnostics.is_empty());
        prop_assert_eq!(parsed.reported_errors, errors);
        prop_assert_eq!(parsed.reported_warnings, warnings);
    }
}
