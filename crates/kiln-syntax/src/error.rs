use kiln_source::Diagnostic as SourceDiagnostic;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// A front-end failure that stops the current phase.
///
/// Lexing and parsing bail out on the first problem; semantic checking
/// keeps going and reports through [`kiln_source::Diagnostics`] instead.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("{message}")]
    #[diagnostic(code(kiln_syntax::lex))]
    Lex {
        message: String,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("{message}")]
    #[diagnostic(code(kiln_syntax::parse))]
    Parse {
        message: String,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("{message}")]
    #[diagnostic(code(kiln_syntax::preprocess))]
    Preprocess {
        message: String,
        #[label("in this directive")]
        span: SourceSpan,
    },

    #[error("{0}")]
    #[diagnostic(code(kiln_syntax::flag))]
    Flag(String),
}

pub type SyntaxResult<T> = Result<T, SyntaxError>;

impl SyntaxError {
    pub fn parse(message: impl Into<String>, span: SourceSpan) -> Self {
        SyntaxError::Parse {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Option<SourceSpan> {
        match self {
            SyntaxError::Lex { span, .. }
            | SyntaxError::Parse { span, .. }
            | SyntaxError::Preprocess { span, .. } => Some(*span),
            SyntaxError::Flag(_) => None,
        }
    }

    fn code_name(&self) -> &'static str {
        match self {
            SyntaxError::Lex { .. } => "kiln_syntax::lex",
            SyntaxError::Parse { .. } => "kiln_syntax::parse",
            SyntaxError::Preprocess { .. } => "kiln_syntax::preprocess",
            SyntaxError::Flag(_) => "kiln_syntax::flag",
        }
    }

    /// Converts into a compile diagnostic for the module's list.
    pub fn into_diagnostic(self) -> SourceDiagnostic {
        let code = self.code_name();
        let span = self.span();
        let diagnostic = SourceDiagnostic::error(self.to_string()).with_code(code);
        match span {
            Some(span) => diagnostic.with_span(span),
            None => diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_with_span_and_code() {
        let diag = SyntaxError::parse("expected ';' after return statement", (4, 2).into())
            .into_diagnostic();
        assert!(diag.is_error());
        assert_eq!(diag.code, Some("kiln_syntax::parse"));
        assert_eq!(diag.span.map(|s| s.offset()), Some(4));
    }

    #[test]
    fn flag_errors_have_no_location() {
        let diag = SyntaxError::Flag("unknown argument: '-zz'".into()).into_diagnostic();
        assert_eq!(diag.span, None);
        assert_eq!(diag.message, "unknown argument: '-zz'");
    }
}
