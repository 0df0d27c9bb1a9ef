//! Execution context threaded through the reader and command handlers.

use crate::error::{CommandError, ContextError, SourcePosition, SyntaxError};
use crate::expand::CommandTable;
use futures::future::BoxFuture;
use scrydoc_types::NameMap;
use std::collections::HashMap;

/// A future that must settle before a document's expand phase completes
pub type Barrier = BoxFuture<'static, Result<(), CommandError>>;

/// One accumulator frame on a named context stack
#[derive(Debug, Clone)]
pub enum Frame<V> {
    /// Unnamed contributions where order is significant
    List(Vec<V>),
    /// Named contributions; a later add under the same name replaces the
    /// earlier one
    Dict(NameMap<V>),
}

impl<V> Frame<V> {
    pub fn list() -> Self {
        Frame::List(Vec::new())
    }

    pub fn dict() -> Self {
        Frame::Dict(NameMap::new())
    }

    fn kind(&self) -> &'static str {
        match self {
            Frame::List(_) => "list",
            Frame::Dict(_) => "dict",
        }
    }

    pub fn into_list(self) -> Option<Vec<V>> {
        match self {
            Frame::List(items) => Some(items),
            Frame::Dict(_) => None,
        }
    }

    pub fn into_dict(self) -> Option<NameMap<V>> {
        match self {
            Frame::Dict(map) => Some(map),
            Frame::List(_) => None,
        }
    }
}

/// Per-document parse and expansion state.
///
/// One instance per top-level document. Every `push_*` must be matched by
/// exactly one `pop_*` in LIFO order.
pub struct ExecutionContext<V> {
    /// Name of the origin file, as best we can guess
    pub file_name: String,

    /// Full document text, kept for error reporting while parsing
    contents: String,

    /// Offset into `contents` up to which everything has been consumed.
    ///
    /// Only advanced while `parser_depth` is zero so that nested reader
    /// parses cannot disturb it.
    unconsumed_index: usize,

    parser_depth: usize,

    level_stacks: HashMap<String, Vec<Frame<V>>>,

    named_value_stacks: HashMap<String, Vec<V>>,

    /// Names of the commands enclosing the node being processed
    token_stack: Vec<String>,

    commands: CommandTable<V>,

    barriers: Vec<Barrier>,
}

impl<V> ExecutionContext<V> {
    pub fn new(file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
            unconsumed_index: 0,
            parser_depth: 0,
            level_stacks: HashMap::new(),
            named_value_stacks: HashMap::new(),
            token_stack: Vec::new(),
            commands: CommandTable::new(),
            barriers: Vec::new(),
        }
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn commands(&self) -> &CommandTable<V> {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandTable<V> {
        &mut self.commands
    }

    // ========================================================================
    // Position tracking
    // ========================================================================

    pub fn unconsumed_index(&self) -> usize {
        self.unconsumed_index
    }

    /// Advance the unconsumed index unless a nested parse is running.
    pub fn bump_unconsumed_index(&mut self, by: usize) -> usize {
        if self.parser_depth == 0 {
            self.unconsumed_index += by;
        }
        self.unconsumed_index
    }

    pub fn enter_nested_parse(&mut self) {
        self.parser_depth += 1;
    }

    pub fn leave_nested_parse(&mut self) {
        self.parser_depth = self.parser_depth.saturating_sub(1);
    }

    pub fn parser_depth(&self) -> usize {
        self.parser_depth
    }

    /// Position of `rel` bytes past the unconsumed index.
    pub fn position_at(&self, rel: usize) -> SourcePosition {
        SourcePosition::locate(&self.file_name, &self.contents, self.unconsumed_index + rel)
    }

    /// Build a reader error located `rel` bytes past the unconsumed index.
    pub fn syntax_error(&self, message: impl Into<String>, rel: usize) -> SyntaxError {
        SyntaxError::Reader {
            message: message.into(),
            position: self.position_at(rel),
        }
    }

    // ========================================================================
    // Named context stacks
    // ========================================================================

    /// Shadow any existing context called `name` until the matching pop.
    pub fn push_named_context(&mut self, name: impl Into<String>, frame: Frame<V>) {
        self.level_stacks.entry(name.into()).or_default().push(frame);
    }

    /// Contribute to the topmost frame called `name`.
    ///
    /// List frames take unnamed contributions, dict frames named ones.
    pub fn named_context_add(
        &mut self,
        name: &str,
        value: V,
        key: Option<&str>,
    ) -> Result<(), ContextError> {
        let frame = self
            .level_stacks
            .get_mut(name)
            .and_then(|stack| stack.last_mut())
            .ok_or_else(|| ContextError::NoSuchContext(name.to_string()))?;

        match (frame, key) {
            (Frame::List(items), None) => items.push(value),
            (Frame::Dict(map), Some(key)) => {
                map.insert(key, value);
            }
            (frame, _) => {
                return Err(ContextError::WrongFrame {
                    name: name.to_string(),
                    found: frame.kind(),
                })
            }
        }
        Ok(())
    }

    /// Look `key` up in the topmost dict frame called `name`.
    pub fn named_context_lookup(&self, name: &str, key: &str) -> Option<&V> {
        match self.level_stacks.get(name)?.last()? {
            Frame::Dict(map) => map.get(key),
            Frame::List(_) => None,
        }
    }

    pub fn has_named_context(&self, name: &str) -> bool {
        self.level_stacks.contains_key(name)
    }

    /// Copy of every frame currently stacked under `name`, oldest first.
    pub fn snapshot_named_context_stack(&self, name: &str) -> Vec<Frame<V>>
    where
        V: Clone,
    {
        self.level_stacks.get(name).cloned().unwrap_or_default()
    }

    pub fn pop_named_context(&mut self, name: &str) -> Result<Frame<V>, ContextError> {
        let stack = self
            .level_stacks
            .get_mut(name)
            .ok_or_else(|| ContextError::PopMissingContext(name.to_string()))?;
        let frame = stack
            .pop()
            .ok_or_else(|| ContextError::PopMissingContext(name.to_string()))?;
        if stack.is_empty() {
            self.level_stacks.remove(name);
        }
        Ok(frame)
    }

    // ========================================================================
    // Named values
    // ========================================================================

    pub fn push_named_value(&mut self, name: impl Into<String>, value: V) {
        self.named_value_stacks
            .entry(name.into())
            .or_default()
            .push(value);
    }

    pub fn lookup_named_value(&self, name: &str) -> Option<&V> {
        self.named_value_stacks.get(name).and_then(|s| s.last())
    }

    pub fn pop_named_value(&mut self, name: &str) -> Option<V> {
        let stack = self.named_value_stacks.get_mut(name)?;
        let value = stack.pop();
        if stack.is_empty() {
            self.named_value_stacks.remove(name);
        }
        value
    }

    // ========================================================================
    // Token stack
    // ========================================================================

    pub fn push_token(&mut self, name: impl Into<String>) {
        self.token_stack.push(name.into());
    }

    pub fn pop_token(&mut self) -> Option<String> {
        self.token_stack.pop()
    }

    /// Name of the innermost enclosing command.
    pub fn parent_token(&self) -> Result<&str, ContextError> {
        self.token_stack
            .last()
            .map(String::as_str)
            .ok_or(ContextError::NoParentToken)
    }

    pub fn token_depth(&self) -> usize {
        self.token_stack.len()
    }

    // ========================================================================
    // Join barriers and problem reporting
    // ========================================================================

    /// Hold the expand phase open until `barrier` settles.
    pub fn join(&mut self, barrier: Barrier) {
        self.barriers.push(barrier);
    }

    pub fn take_barriers(&mut self) -> Vec<Barrier> {
        std::mem::take(&mut self.barriers)
    }

    /// Report a non-fatal problem in the document.
    pub fn log_parse_warning(&self, err: &dyn std::error::Error, rel_line: Option<usize>) {
        tracing::warn!(
            file = %self.file_name,
            line = ?rel_line,
            error = %err,
            "parse warning"
        );
    }

    /// Report a fatal problem in the document and hand the error back for
    /// propagation.
    pub fn log_parse_failure<E: std::error::Error>(&self, err: E, rel_line: Option<usize>) -> E {
        tracing::error!(
            file = %self.file_name,
            line = ?rel_line,
            error = %err,
            "parse failure"
        );
        err
    }
}
