//! Compiler diagnostics.
//!
//! The front-end never fails with an error for ordinary source problems.
//! Instead every problem becomes a [`Diagnostic`] pushed onto a
//! [`Diagnostics`] list, which the compiled module keeps for inspection.
//! A list containing at least one [`Severity::Error`] is fatal.
//!
//! Diagnostics render two ways:
//! - [`Diagnostics::render`] produces the classic `file:line:col: error: msg`
//!   text that the module exposes as its diagnostics string
//! - [`Report`] wraps a single diagnostic with its source text so `miette`
//!   can draw it with labels and highlighting

use crate::SourceFile;
use miette::SourceSpan;
use std::fmt::{self, Write as _};
use thiserror::Error;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

impl From<Severity> for miette::Severity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Note => miette::Severity::Advice,
            Severity::Warning => miette::Severity::Warning,
            Severity::Error => miette::Severity::Error,
        }
    }
}

/// A single message produced while compiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Location in the source text; `None` for problems with the request
    /// itself (flags, engine setup).
    pub span: Option<SourceSpan>,
    /// Stable code such as `kiln::syntax::expected`.
    pub code: Option<&'static str>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span: None,
            code: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(message)
        }
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            ..Self::error(message)
        }
    }

    pub fn with_span(mut self, span: impl Into<SourceSpan>) -> Self {
        self.span = Some(span.into());
        self
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Renders this diagnostic on one line, clang style.
    pub fn render(&self, file: &SourceFile) -> String {
        match self.span {
            Some(span) => {
                let (line, col) = file.line_col(span.offset());
                format!("{}:{}:{}: {}: {}", file.name(), line, col, self.severity, self.message)
            }
            None => format!("{}: {}", self.severity, self.message),
        }
    }
}

/// An ordered list of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::trace!("diagnostic: {} {}", diagnostic.severity, diagnostic.message);
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// Rewrites every warning as an error (`-Werror`).
    pub fn promote_warnings(&mut self) {
        for item in &mut self.items {
            if item.severity == Severity::Warning {
                item.severity = Severity::Error;
            }
        }
    }

    /// Drops every warning (`-w`).
    pub fn suppress_warnings(&mut self) {
        self.items.retain(|d| d.severity != Severity::Warning);
    }

    /// Renders all diagnostics plus a clang style summary line.
    ///
    /// Returns an empty string when there is nothing to report.
    pub fn render(&self, file: &SourceFile) -> String {
        if self.items.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        for item in &self.items {
            out.push_str(&item.render(file));
            out.push('\n');
        }
        let summary = match (self.warning_count(), self.error_count()) {
            (0, 0) => None,
            (w, 0) => Some(format!("{} generated.", plural(w, "warning"))),
            (0, e) => Some(format!("{} generated.", plural(e, "error"))),
            (w, e) => Some(format!(
                "{} and {} generated.",
                plural(w, "warning"),
                plural(e, "error")
            )),
        };
        if let Some(summary) = summary {
            let _ = writeln!(out, "{summary}");
        }
        out
    }

    /// Wraps each diagnostic as a `miette` report for rich display.
    pub fn reports(&self, file: &SourceFile) -> Vec<Report> {
        self.items
            .iter()
            .map(|d| Report::new(file, d.clone()))
            .collect()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// A diagnostic bundled with its source text for `miette` rendering.
#[derive(Debug, Clone, Error)]
#[error("{}", .diagnostic.message)]
pub struct Report {
    /// `file_name` is kept for labels; the text is what miette highlights.
    pub file_name: String,
    pub source_code: String,
    pub diagnostic: Diagnostic,
}

impl Report {
    pub fn new(file: &SourceFile, diagnostic: Diagnostic) -> Self {
        Self {
            file_name: file.name().to_string(),
            source_code: file.contents().to_string(),
            diagnostic,
        }
    }
}

impl miette::Diagnostic for Report {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic
            .code
            .map(|c| Box::new(c) as Box<dyn fmt::Display>)
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(self.diagnostic.severity.into())
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        let span = self.diagnostic.span?;
        Some(Box::new(std::iter::once(miette::LabeledSpan::new_with_span(
            Some(self.file_name.clone()),
            span,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_uses_line_and_column() {
        let file = SourceFile::new("code.cpp", "int f() {\n  return x;\n}");
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::error("use of undeclared identifier 'x'").with_span((19, 1)));
        let text = diags.render(&file);
        assert_eq!(
            text,
            "code.cpp:2:10: error: use of undeclared identifier 'x'\n1 error generated.\n"
        );
    }

    #[test]
    fn warnings_alone_are_not_fatal() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning("unused"));
        assert!(!diags.has_errors());
        diags.promote_warnings();
        assert!(diags.has_errors());
    }

    #[test]
    fn suppress_drops_only_warnings() {
        let mut diags: Diagnostics = vec![
            Diagnostic::warning("a"),
            Diagnostic::error("b"),
            Diagnostic::note("c"),
        ]
        .into_iter()
        .collect();
        diags.suppress_warnings();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn empty_list_renders_nothing() {
        let file = SourceFile::new("code.cpp", "");
        assert_eq!(Diagnostics::new().render(&file), "");
    }

    #[test]
    fn report_carries_label_and_severity() {
        use miette::Diagnostic as _;
        let file = SourceFile::new("code.cpp", "int x = ;");
        let report = Report::new(
            &file,
            Diagnostic::error("expected expression").with_span((8, 1)),
        );
        assert_eq!(report.severity(), Some(miette::Severity::Error));
        assert_eq!(report.labels().map(|l| l.count()), Some(1));
        assert_eq!(report.to_string(), "expected expression");
    }
}
