//! # scrydoc js
//!
//! Front end and abstract interpreter for the scripting language whose
//! modules scrydoc documents.
//!
//! - a `logos` lexer that keeps `/** doc */` comments and `//////` group
//!   markers, and tells regular expressions from division on request
//! - a recursive-descent parser for ES5 plus `let`/`const`
//! - an abstract interpreter that recovers the shape of a module's
//!   exports without running its control flow
//!
//! ```ignore
//! let program = scrydoc_js::parse(source)?;
//! match scrydoc_js::interpret(&program, "pkg/mod", Mode::CommonJs, &linker) {
//!     Outcome::Complete(done) => { /* done.exports */ }
//!     Outcome::NeedsDependencies(names) => { /* load, then run again */ }
//! }
//! ```

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;

#[cfg(test)]
mod tests;

pub use ast::{Expr, ExprKind, Function, Program, Property, Stmt, StmtKind};
pub use error::{ErrorContext, ParseError, Result};
pub use interp::{
    freeze, interpret, Accessor, Anchor, Completed, FunctionObj, Mode, ModuleLinker, Native,
    NoModules, Obj, ObjKind, ObjRef, Outcome, Reference, Scalar, Scope, Site, SiteKey, SiteRef,
    Value,
};
pub use lexer::{tokenize, DocComment, GroupMarker, Lexer, SpannedToken, Token};
pub use parser::{parse, parse_until_right_curly, Parser};
pub use scrydoc_types::Span;
