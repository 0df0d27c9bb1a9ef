//! Expansion driver: runs command handlers over a parsed tree.
//!
//! Children are processed before their parent (post-order). For each named
//! command the driver calls the optional pre-exec hook, expands the
//! arguments and body with the command's name on the token stack, then
//! hands the expanded values to the exec handler.

use crate::context::ExecutionContext;
use crate::error::{CommandError, SyntaxError};
use crate::syntax::{Block, Command, ParseNode, Sval};
use std::collections::HashMap;
use std::sync::Arc;

/// Consumes the raw text following `@name{` and reports how many bytes it
/// used, including the closing `}`.
pub type ReaderFn<V> = Arc<
    dyn Fn(&str, &mut ExecutionContext<V>, Option<&[Sval]>) -> Result<(ParseNode, usize), SyntaxError>
        + Send
        + Sync,
>;

/// Runs once a command's children have been expanded.
pub type ExecFn<V> = Arc<
    dyn Fn(Invocation<V>, &mut ExecutionContext<V>) -> Result<Option<Datum<V>>, CommandError>
        + Send
        + Sync,
>;

/// Runs before a command's children are expanded. The returned value is
/// passed to the exec handler as [`Invocation::pre`].
pub type PreExecFn<V> =
    Arc<dyn Fn(&str, &mut ExecutionContext<V>) -> Result<Option<V>, CommandError> + Send + Sync>;

/// Handlers keyed by command name
pub struct CommandTable<V> {
    readers: HashMap<String, ReaderFn<V>>,
    execs: HashMap<String, ExecFn<V>>,
    pre_execs: HashMap<String, PreExecFn<V>>,
}

impl<V> Default for CommandTable<V> {
    fn default() -> Self {
        Self {
            readers: HashMap::new(),
            execs: HashMap::new(),
            pre_execs: HashMap::new(),
        }
    }
}

impl<V> CommandTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(&self, name: &str) -> Option<ReaderFn<V>> {
        self.readers.get(name).cloned()
    }

    pub fn exec(&self, name: &str) -> Option<ExecFn<V>> {
        self.execs.get(name).cloned()
    }

    pub fn pre_exec(&self, name: &str) -> Option<PreExecFn<V>> {
        self.pre_execs.get(name).cloned()
    }

    pub fn has_exec(&self, name: &str) -> bool {
        self.execs.contains_key(name)
    }
}

impl<V: 'static> CommandTable<V> {
    pub fn add_reader<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&str, &mut ExecutionContext<V>, Option<&[Sval]>) -> Result<(ParseNode, usize), SyntaxError>
            + Send
            + Sync
            + 'static,
    {
        self.readers.insert(name.into(), Arc::new(f));
    }

    pub fn add_exec<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Invocation<V>, &mut ExecutionContext<V>) -> Result<Option<Datum<V>>, CommandError>
            + Send
            + Sync
            + 'static,
    {
        self.execs.insert(name.into(), Arc::new(f));
    }

    pub fn add_pre_exec<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&str, &mut ExecutionContext<V>) -> Result<Option<V>, CommandError>
            + Send
            + Sync
            + 'static,
    {
        self.pre_execs.insert(name.into(), Arc::new(f));
    }

    /// Copy every handler of `other` into this table, replacing same-named
    /// entries.
    pub fn extend_from(&mut self, other: &CommandTable<V>) {
        self.readers
            .extend(other.readers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.execs
            .extend(other.execs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.pre_execs
            .extend(other.pre_execs.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// An expanded value
#[derive(Debug, Clone, PartialEq)]
pub enum Datum<V> {
    Text(String),
    Number(f64),
    Bool(bool),
    Keyword(String),
    Identifier(String),
    List(Vec<Datum<V>>),
    Block(Block),
    /// Whatever a command handler produced
    Value(V),
}

impl<V> Datum<V> {
    /// Text of a string, keyword or identifier.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Datum::Text(s) | Datum::Keyword(s) | Datum::Identifier(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&V> {
        match self {
            Datum::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_keyword(&self, name: &str) -> bool {
        matches!(self, Datum::Keyword(k) if k == name)
    }
}

/// Everything an exec handler gets to see about one command
#[derive(Debug)]
pub struct Invocation<V> {
    pub name: String,
    pub svals: Vec<Datum<V>>,
    /// `None` when the command had no body at all
    pub tvals: Option<Vec<Datum<V>>>,
    pub pre: Option<V>,
}

impl<V> Invocation<V> {
    /// Whether the flag `#:name` appears among the svals.
    pub fn has_keyword(&self, name: &str) -> bool {
        self.svals.iter().any(|d| d.is_keyword(name))
    }

    /// The sval following `#:name`, if any.
    pub fn keyword_arg(&self, name: &str) -> Option<&Datum<V>> {
        let pos = self.svals.iter().position(|d| d.is_keyword(name))?;
        self.svals.get(pos + 1)
    }

    /// Svals that are neither keywords nor the arguments of `with_values`
    /// keywords.
    pub fn positional(&self, with_values: &[&str]) -> Vec<&Datum<V>> {
        let mut out = Vec::new();
        let mut skip_next = false;
        for d in &self.svals {
            if skip_next {
                skip_next = false;
                continue;
            }
            if let Datum::Keyword(k) = d {
                skip_next = with_values.contains(&k.as_str());
                continue;
            }
            out.push(d);
        }
        out
    }

    pub fn take_tvals(&mut self) -> Vec<Datum<V>> {
        self.tvals.take().unwrap_or_default()
    }

    pub fn invalid(&self, message: impl Into<String>) -> CommandError {
        CommandError::invalid(self.name.clone(), message)
    }
}

/// Expand a text stream, executing every at-command in it.
///
/// Handler failures are logged and the failing node is dropped. Unknown
/// commands are logged as errors and dropped.
pub fn chew<V>(nodes: &[ParseNode], ctx: &mut ExecutionContext<V>) -> Vec<Datum<V>> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            ParseNode::Text(text) => out.push(Datum::Text(text.clone())),
            ParseNode::Block(block) => out.push(Datum::Block(block.clone())),
            ParseNode::Command(cmd) => chew_command(cmd, ctx, &mut out),
        }
    }
    out
}

fn chew_svals<V>(svals: &[Sval], ctx: &mut ExecutionContext<V>) -> Vec<Datum<V>> {
    let mut out = Vec::new();
    for sval in svals {
        match sval {
            Sval::Number(n) => out.push(Datum::Number(*n)),
            Sval::String(s) => out.push(Datum::Text(s.clone())),
            Sval::Bool(b) => out.push(Datum::Bool(*b)),
            Sval::Keyword(k) => out.push(Datum::Keyword(k.clone())),
            Sval::Identifier(i) => out.push(Datum::Identifier(i.clone())),
            Sval::List(items) => out.push(Datum::List(chew_svals(items, ctx))),
            Sval::Block(block) => out.push(Datum::Block(block.clone())),
            Sval::Command(cmd) => chew_command(cmd, ctx, &mut out),
        }
    }
    out
}

fn chew_command<V>(cmd: &Command, ctx: &mut ExecutionContext<V>, out: &mut Vec<Datum<V>>) {
    let Some(name) = cmd.name.as_deref() else {
        // nameless forms splice their contents in place
        if let Some(svals) = &cmd.svals {
            out.extend(chew_svals(svals, ctx));
        }
        if let Some(body) = &cmd.body {
            out.extend(chew(body, ctx));
        }
        return;
    };

    let Some(exec) = ctx.commands().exec(name) else {
        tracing::error!(command = %name, file = %ctx.file_name, "Unknown node command");
        return;
    };

    let pre = match ctx.commands().pre_exec(name) {
        Some(pre_exec) => match pre_exec(name, ctx) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(command = %name, error = %err, "pre-exec failed");
                None
            }
        },
        None => None,
    };

    // children see this command as their parent
    ctx.push_token(name);
    let svals = cmd
        .svals
        .as_deref()
        .map(|svals| chew_svals(svals, ctx))
        .unwrap_or_default();
    let tvals = cmd.body.as_deref().map(|body| chew(body, ctx));
    ctx.pop_token();

    let invocation = Invocation {
        name: name.to_string(),
        svals,
        tvals,
        pre,
    };
    match exec(invocation, ctx) {
        Ok(Some(datum)) => out.push(datum),
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(command = %name, file = %ctx.file_name, error = %err, "command failed");
        }
    }
}

/// Expand `nodes` and wait for every join barrier registered meanwhile.
///
/// The first rejected barrier fails the whole phase.
pub async fn expand<V>(
    nodes: &[ParseNode],
    ctx: &mut ExecutionContext<V>,
) -> Result<Vec<Datum<V>>, CommandError> {
    let expanded = chew(nodes, ctx);
    let barriers = ctx.take_barriers();
    if !barriers.is_empty() {
        tracing::debug!(file = %ctx.file_name, count = barriers.len(), "waiting on join barriers");
        futures::future::try_join_all(barriers).await?;
    }
    Ok(expanded)
}
