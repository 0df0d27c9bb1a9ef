use std::fmt;
use std::sync::Arc;

pub use scrydoc_types::Span;

/// Where in a document a reader error happened.
///
/// Reconstructed on demand by rescanning the whole document up to an
/// absolute offset.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePosition {
    pub file_name: String,
    /// 1-indexed
    pub line: usize,
    /// 1-indexed; `None` when the offset could not be mapped to a column
    pub column: Option<usize>,
    pub source_lines: Vec<String>,
}

impl SourcePosition {
    /// Split `contents` into lines and locate `offset` among them.
    ///
    /// An offset beyond the last line lands on the last line with no column.
    pub fn locate(file_name: &str, contents: &str, offset: usize) -> Self {
        let source_lines: Vec<String> = contents.split('\n').map(str::to_string).collect();
        let mut remaining = offset;
        let mut line = 0;
        let mut column = None;
        loop {
            let len = source_lines[line].len();
            if remaining < len {
                column = Some(remaining + 1);
                break;
            }
            // the line plus its newline
            remaining = remaining.saturating_sub(len + 1);
            if line + 1 >= source_lines.len() {
                break;
            }
            line += 1;
        }

        Self {
            file_name: file_name.to_string(),
            line: line + 1,
            column,
            source_lines,
        }
    }

    pub fn source_line(&self) -> Option<&str> {
        self.source_lines.get(self.line - 1).map(String::as_str)
    }
}

/// Fatal problems reading a document
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyntaxError {
    #[error("{message} ({}:{})", .position.file_name, .position.line)]
    Reader {
        message: String,
        position: SourcePosition,
    },

    /// A registered reader function failed; its line is relative to the
    /// start of the text it was handed and has been folded into `position`.
    #[error("Nested parse error: {message} ({}:{})", .position.file_name, .position.line)]
    Nested {
        message: String,
        position: SourcePosition,
    },

    #[error("The document has no newlines. They are not optional!")]
    NoNewline,

    #[error("The document's #lang directive is ill-formed: {0}")]
    BadLangLine(String),

    #[error("Unable to figure out the document language")]
    NoLanguage,

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Unknown vocabulary: {0}")]
    UnknownVocabulary(String),
}

impl SyntaxError {
    pub fn position(&self) -> Option<&SourcePosition> {
        match self {
            SyntaxError::Reader { position, .. } | SyntaxError::Nested { position, .. } => {
                Some(position)
            }
            _ => None,
        }
    }
}

/// Misuse of the execution context by a command handler.
///
/// These are bugs in handlers, not bad input.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContextError {
    #[error("trying to add to a named context that doesn't exist: {0}")]
    NoSuchContext(String),

    #[error("trying to pop a named context that doesn't exist: {0}")]
    PopMissingContext(String),

    #[error("named context {name} holds a {found} frame")]
    WrongFrame { name: String, found: &'static str },

    #[error("No parent token available!")]
    NoParentToken,
}

/// Errors raised while expanding commands
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("@{command}: {message}")]
    Invalid { command: String, message: String },

    /// A join barrier registered during expansion was rejected
    #[error("barrier failed: {0}")]
    Barrier(Arc<dyn std::error::Error + Send + Sync>),
}

impl CommandError {
    pub fn invalid(command: impl Into<String>, message: impl Into<String>) -> Self {
        CommandError::Invalid {
            command: command.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyntaxError>;

/// Display context for reader errors
pub struct ErrorContext<'a> {
    pub error: &'a SyntaxError,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a SyntaxError) -> Self {
        Self { error }
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(position) = self.error.position() else {
            return writeln!(f, "Error: {}", self.error);
        };

        match position.column {
            Some(col) => writeln!(
                f,
                "Error in {} at line {}, column {}:",
                position.file_name, position.line, col
            )?,
            None => writeln!(
                f,
                "Error in {} at line {}:",
                position.file_name, position.line
            )?,
        }
        writeln!(f, "  {}", self.error)?;

        if let Some(source_line) = position.source_line() {
            writeln!(f)?;
            writeln!(f, "  {}", source_line)?;
            if let Some(col) = position.column {
                writeln!(f, "  {}^", " ".repeat(col - 1))?;
            }
        }

        Ok(())
    }
}
