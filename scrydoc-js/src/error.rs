use std::fmt;

pub use scrydoc_types::Span;
use scrydoc_types::{line_col_at, LineCol};

/// Errors raised while lexing or parsing script source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Lexer error at {span:?}: {message}")]
    Lexer { span: Span, message: String },

    #[error("Parser error at {span:?}: {message}")]
    Parser { span: Span, message: String },

    #[error("Unexpected end of input at {span:?}")]
    UnexpectedEnd { span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::Lexer { span, .. } => *span,
            ParseError::Parser { span, .. } => *span,
            ParseError::UnexpectedEnd { span } => *span,
        }
    }

    /// Line and column of the error within `source`.
    pub fn line_col(&self, source: &str) -> LineCol {
        line_col_at(source, self.span().start)
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Display context for better error messages
pub struct ErrorContext<'a> {
    pub source: &'a str,
    pub error: &'a ParseError,
}

impl<'a> ErrorContext<'a> {
    pub fn new(source: &'a str, error: &'a ParseError) -> Self {
        Self { source, error }
    }

    /// Get the source line containing the error
    pub fn source_line(&self) -> Option<&'a str> {
        let start = self.error.span().start.min(self.source.len());
        let line_start = self.source[..start]
            .rfind('\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let line_end = self.source[start..]
            .find('\n')
            .map(|pos| start + pos)
            .unwrap_or(self.source.len());

        Some(&self.source[line_start..line_end])
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let LineCol { line, column } = self.error.line_col(self.source);
        writeln!(f, "Error at line {}, column {}:", line, column)?;
        writeln!(f, "  {}", self.error)?;

        if let Some(source_line) = self.source_line() {
            writeln!(f)?;
            writeln!(f, "  {}", source_line)?;
            let col_start = (column - 1).min(source_line.len());
            let width = self
                .error
                .span()
                .len()
                .min(source_line.len() - col_start)
                .max(1);
            writeln!(f, "  {}{}", " ".repeat(col_start), "^".repeat(width))?;
        }

        Ok(())
    }
}
