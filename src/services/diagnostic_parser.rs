//! Conversion of raw compiler and archiver output into structured diagnostics.
//!
//! The recognized line shapes live in a [`DiagnosticDialect`]; the parser itself only knows
//! how context lines attach to the diagnostic before them:
//!
//! ```text
//! /p/src/com/example/Mod.java:12: error: ';' expected      <- header
//!         int x = 1                                         <- source snippet
//!                  ^                                        <- caret, gives the column
//!   symbol:   variable x                                    <- indented detail
//! 1 error                                                   <- summary, counted only
//! ```
//!
//! Parsing is pure: the same lines always produce the same diagnostics, in output order,
//! without reordering or deduplication.

use crate::models::{CompileResult, Diagnostic, OutputLine, Severity};
use regex::Regex;

/// Classification of a single output line by a dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// `<path>:<line>: <severity>: <message>`
    Located {
        file: String,
        line: u32,
        severity: Severity,
        message: String,
    },
    /// A diagnostic without a source location (`warning: [options] ...`, `Note: ...`)
    Unlocated { severity: Severity, message: String },
    /// `N error(s)` / `N warning(s)`
    Summary { severity: Severity, count: usize },
    /// Anything else; may still be context for the previous diagnostic
    Other,
}

/// The line patterns of one tool's output
pub trait DiagnosticDialect: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, line: &str) -> LineKind;
}

/// Output dialect of `javac`
pub struct JavacDialect {
    /// Regex for `<path>:<line>: <severity>: <message>` headers
    located: Regex,

    /// Regex for `error: ...`, `warning: ...` and `Note: ...` lines without a location
    unlocated: Regex,

    /// Regex for `javac: ...` launcher errors (bad flags, unreadable argfiles)
    launcher: Regex,

    /// Regex for the trailing `N errors` / `N warnings` counts
    summary: Regex,
}

impl JavacDialect {
    pub fn new() -> Self {
        Self {
            located: Regex::new(r"^(.+?):(\d+): (error|warning|Note|note): ?(.*)$").expect("Invalid located regex"),
            unlocated: Regex::new(r"^(error|warning|Note|note|fatal error): ?(.*)$").expect("Invalid unlocated regex"),
            launcher: Regex::new(r"^javac: (.*)$").expect("Invalid launcher regex"),
            summary: Regex::new(r"^(\d+) (error|warning)s?$").expect("Invalid summary regex"),
        }
    }
}

impl Default for JavacDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticDialect for JavacDialect {
    fn name(&self) -> &str {
        "javac"
    }

    fn classify(&self, line: &str) -> LineKind {
        if let Some(caps) = self.summary.captures(line.trim()) {
            if let Ok(count) = caps[1].parse() {
                return LineKind::Summary {
                    severity: Severity::from_tool_word(&caps[2]),
                    count,
                };
            }
        }

        if let Some(caps) = self.located.captures(line) {
            if let Ok(line_number) = caps[2].parse() {
                return LineKind::Located {
                    file: caps[1].to_string(),
                    line: line_number,
                    severity: Severity::from_tool_word(&caps[3]),
                    message: caps[4].to_string(),
                };
            }
        }

        if let Some(caps) = self.unlocated.captures(line) {
            let severity = if &caps[1] == "fatal error" {
                Severity::Error
            } else {
                Severity::from_tool_word(&caps[1])
            };
            let message = if severity == Severity::Info {
                line.to_string()
            } else {
                caps[2].to_string()
            };
            return LineKind::Unlocated { severity, message };
        }

        if let Some(caps) = self.launcher.captures(line) {
            return LineKind::Unlocated {
                severity: Severity::Error,
                message: caps[1].to_string(),
            };
        }

        LineKind::Other
    }
}

/// Output dialect of `jar`
pub struct JarDialect {
    /// Regex for `jar: ...`, `error: ...` and `warning: ...` lines
    prefixed: Regex,

    /// Regex for Java exception lines such as `java.io.IOException: ...`
    exception: Regex,
}

impl JarDialect {
    pub fn new() -> Self {
        Self {
            prefixed: Regex::new(r"^(?:jar: )?(error|warning|jar): ?(.*)$").expect("Invalid jar prefix regex"),
            exception: Regex::new(r#"^(?:Exception in thread "[^"]*" )?[\w$]+(?:\.[\w$]+)*(?:Exception|Error)(?::.*)?$"#)
                .expect("Invalid exception regex"),
        }
    }
}

impl Default for JarDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticDialect for JarDialect {
    fn name(&self) -> &str {
        "jar"
    }

    fn classify(&self, line: &str) -> LineKind {
        if let Some(caps) = self.prefixed.captures(line) {
            let severity = if &caps[1] == "warning" {
                Severity::Warning
            } else {
                Severity::Error
            };
            return LineKind::Unlocated {
                severity,
                message: caps[2].to_string(),
            };
        }

        if self.exception.is_match(line) {
            return LineKind::Unlocated {
                severity: Severity::Error,
                message: line.to_string(),
            };
        }

        LineKind::Other
    }
}

/// Diagnostics extracted from one tool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    pub diagnostics: Vec<Diagnostic>,
    /// Error count the tool reported in its summary line
    pub reported_errors: usize,
    /// Warning count the tool reported in its summary line
    pub reported_warnings: usize,
}

impl ParsedOutput {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.severity.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

/// What the next line may attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attach {
    None,
    /// Right after a located header: the next line is the source snippet
    Snippet,
    /// Only caret and indented detail lines still attach
    Detail,
}

/// Parses tool output with a pluggable [`DiagnosticDialect`]
pub struct DiagnosticParser {
    dialect: Box<dyn DiagnosticDialect>,
}

impl DiagnosticParser {
    pub fn new(dialect: Box<dyn DiagnosticDialect>) -> Self {
        Self { dialect }
    }

    pub fn javac() -> Self {
        Self::new(Box::new(JavacDialect::new()))
    }

    pub fn jar() -> Self {
        Self::new(Box::new(JarDialect::new()))
    }

    pub fn dialect_name(&self) -> &str {
        self.dialect.name()
    }

    /// Parse the output of a compiler run
    pub fn parse(&self, result: &CompileResult) -> ParsedOutput {
        self.parse_output(&result.lines)
    }

    pub fn parse_output(&self, lines: &[OutputLine]) -> ParsedOutput {
        self.parse_lines(lines.iter().map(|l| l.text.as_str()))
    }

    pub fn parse_lines<'a, I>(&self, lines: I) -> ParsedOutput
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut parsed = ParsedOutput::default();
        let mut attach = Attach::None;

        for line in lines {
            let kind = self.dialect.classify(line);

            match kind {
                LineKind::Located {
                    file,
                    line: line_number,
                    severity,
                    message,
                } => {
                    parsed
                        .diagnostics
                        .push(Diagnostic::located(severity, file, line_number, message));
                    attach = Attach::Snippet;
                }
                LineKind::Unlocated { severity, message } => {
                    parsed.diagnostics.push(Diagnostic::new(severity, message));
                    attach = Attach::Detail;
                }
                LineKind::Summary { severity, count } => {
                    match severity {
                        Severity::Error => parsed.reported_errors += count,
                        Severity::Warning => parsed.reported_warnings += count,
                        Severity::Info => {}
                    }
                    attach = Attach::None;
                }
                LineKind::Other => {
                    if self.attach_context(&mut parsed, &mut attach, line) {
                        continue;
                    }
                    attach = Attach::None;
                    if !line.trim().is_empty() {
                        parsed.diagnostics.push(Diagnostic::info(line));
                    }
                }
            }
        }

        tracing::debug!(
            "Parsed {} diagnostic(s) from {} output",
            parsed.diagnostics.len(),
            self.dialect.name()
        );
        parsed
    }

    /// Append `line` to the previous diagnostic if it is context for it
    fn attach_context(&self, parsed: &mut ParsedOutput, attach: &mut Attach, line: &str) -> bool {
        let Some(last) = parsed.diagnostics.last_mut() else {
            return false;
        };

        let caret = caret_column(line);
        let accepted = match *attach {
            Attach::None => false,
            Attach::Snippet => !line.trim().is_empty(),
            Attach::Detail => caret.is_some() || (line.starts_with([' ', '\t']) && !line.trim().is_empty()),
        };
        if !accepted {
            return false;
        }

        if let Some(column) = caret {
            if last.column.is_none() && last.line.is_some() {
                last.column = Some(column);
            }
        }

        last.message.push('\n');
        last.message.push_str(line.trim_end());
        *attach = Attach::Detail;
        true
    }
}

/// 1-based column of a caret marker line (`        ^`)
fn caret_column(line: &str) -> Option<u32> {
    let trimmed = line.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c == '^') {
        return None;
    }
    let offset = line.chars().take_while(|c| *c != '^').count();
    u32::try_from(offset + 1).ok()
}
