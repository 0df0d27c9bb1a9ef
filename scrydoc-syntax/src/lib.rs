//! # scrydoc syntax
//!
//! Reader and expansion machinery for at-form markup documents:
//! - `@name[svals]{body}` commands with an s-expression argument list
//! - `@;{ nested }` and `@;` line comments, `@"literal"` escapes
//! - the mirrored alternate syntax `@name|<<{ body }>>|`
//! - an [`ExecutionContext`] with named context stacks, named values and a
//!   token stack that command handlers use to cooperate
//! - a post-order expansion driver with pre-exec hooks and join barriers
//! - `#lang` driven document loading
//!
//! ## Example
//!
//! ```ignore
//! #lang doc jsdoc
//!
//! @typedef[Point @dict[
//!   @key["x" Number]{Horizontal position.}
//!   @key["y" #:optional Number]
//! ]]{
//!   A point on the plane.
//! }
//! ```

pub mod context;
pub mod error;
pub mod expand;
pub mod flow;
pub mod lang;
pub mod reader;
pub mod syntax;

#[cfg(test)]
mod tests;

pub use context::{Barrier, ExecutionContext, Frame};
pub use error::{CommandError, ContextError, ErrorContext, Result, SourcePosition, SyntaxError};
pub use expand::{chew, expand, CommandTable, Datum, ExecFn, Invocation, PreExecFn, ReaderFn};
pub use flow::{decode_flow, BlockLevel, Flow};
pub use lang::{
    parse_document, parse_document_with, parse_lang_line, DocType, Document, LangLine, Language,
    LanguageRegistry, LoadOptions, Vocabulary,
};
pub use reader::{
    alt_syntax_mirror, nested_comment_walker, parse_at_form, parse_body, sexpr_parser,
    text_stream_at_breaker, Breaker,
};
pub use syntax::{coerce_string, Block, Command, ParseNode, Sval};

pub use scrydoc_types::{NameMap, Span};
