//! Reader output: text runs, at-commands and their s-expression arguments.

use serde::{Deserialize, Serialize};

/// One node of a parsed text body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseNode {
    Text(String),
    Command(Command),
    /// Opaque output of a registered reader function
    Block(Block),
}

impl ParseNode {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParseNode::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_command(&self) -> Option<&Command> {
        match self {
            ParseNode::Command(c) => Some(c),
            _ => None,
        }
    }
}

/// An at-form: `@name[svals]{body}`.
///
/// Every part is optional. `@[...]` has no name, `@name{...}` has no
/// svals, and `@name[...]` has no body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: Option<String>,
    pub svals: Option<Vec<Sval>>,
    pub body: Option<Vec<ParseNode>>,
}

impl Command {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            svals: None,
            body: None,
        }
    }

    pub fn with_svals(mut self, svals: Vec<Sval>) -> Self {
        self.svals = Some(svals);
        self
    }

    pub fn with_body(mut self, body: Vec<ParseNode>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Text consumed by a reader function, tagged with the reader's name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub reader: String,
    pub text: String,
}

/// S-expression values found between `[` and `]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sval {
    Number(f64),
    String(String),
    Bool(bool),
    Keyword(String),
    Identifier(String),
    Command(Command),
    /// A nameless, bodiless `@[...]`
    List(Vec<Sval>),
    Block(Block),
}

/// Textual view of a string-like sval.
pub fn coerce_string(sval: &Sval) -> Option<&str> {
    match sval {
        Sval::String(s) | Sval::Keyword(s) | Sval::Identifier(s) => Some(s),
        _ => None,
    }
}
