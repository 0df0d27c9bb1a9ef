//! Abstract interpreter.
//!
//! Evaluates a program's declarations, literals, assignments, member
//! accesses and calls against a simulated heap, without following real
//! control flow. The result is the shape of the module's namespaces:
//! objects, functions and scalars linked back to the syntax that created
//! them.
//!
//! Loading another module is never awaited here. A missing dependency
//! unwinds the whole evaluation with [`Outcome::NeedsDependencies`]; the
//! caller loads what is needed and runs a fresh interpretation from the
//! start.

use crate::ast::*;
use crate::lexer::{DocComment, GroupMarker};
use parking_lot::RwLock;
use scrydoc_types::NameMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Calls nest at most this deep; deeper calls evaluate to `undefined`.
pub const MAX_CALL_DEPTH: usize = 32;

pub type ObjRef = Arc<RwLock<Obj>>;
pub type ScopeRef = Arc<Scope>;
pub type SiteRef = Arc<Site>;

/// What a site is anchored to within its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// The syntax node starting at this byte offset
    Node(usize),
    /// The prototype object of the function at this offset
    Proto(usize),
    Exports,
    Global,
}

/// Identity of a value's origin. Stable across re-interpretation of the
/// same source, so it can key caches that outlive one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteKey {
    pub module: Arc<str>,
    pub anchor: Anchor,
}

/// Where a value was created
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub key: SiteKey,
    pub line: usize,
    pub doc: Option<Arc<DocComment>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    String(String),
    Bool(bool),
    Regex(String),
    Null,
    Undefined,
}

/// A storage location: property `name` of `container`
#[derive(Debug, Clone)]
pub struct Reference {
    pub container: Value,
    pub name: String,
    /// Offset of the expression that produced the reference
    pub at: usize,
}

#[derive(Clone)]
pub enum Value {
    Scalar(Scalar, Option<SiteRef>),
    Object(ObjRef),
    /// Not a value but a location; reading it may run a getter
    Ref(Box<Reference>),
    /// A name that has not been given a value yet. Storing into it makes
    /// it spring into existence as a fresh object.
    Unresolved(Box<Reference>),
}

impl Value {
    pub fn null() -> Self {
        Value::Scalar(Scalar::Null, None)
    }

    pub fn undefined() -> Self {
        Value::Scalar(Scalar::Undefined, None)
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::String(s), _) => Some(s),
            _ => None,
        }
    }

    /// Identity for objects, equality for scalars.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Scalar(a, _), Value::Scalar(b, _)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(scalar, _) => write!(f, "{:?}", scalar),
            Value::Object(obj) => write!(f, "{:?}", obj.read()),
            Value::Ref(r) => write!(f, "Ref({})", r.name),
            Value::Unresolved(r) => write!(f, "Unresolved({})", r.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    Require,
    Define,
}

pub struct FunctionObj {
    pub node: Option<Arc<Function>>,
    pub scope: Option<ScopeRef>,
    pub native: Option<Native>,
    /// Created on first access to `prototype`
    pub proto: Option<ObjRef>,
    /// `prototype` was assigned a whole object
    pub explicit_proto: bool,
}

pub enum ObjKind {
    Object,
    Function(FunctionObj),
    /// Local variables of a running function or module
    Activation,
    List,
}

impl ObjKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjKind::Object => "object",
            ObjKind::Function(_) => "function",
            ObjKind::Activation => "activation",
            ObjKind::List => "list",
        }
    }
}

/// A getter/setter pair from an object literal
#[derive(Clone)]
pub struct Accessor {
    pub getter: Option<Arc<Function>>,
    pub setter: Option<Arc<Function>>,
    pub scope: ScopeRef,
}

pub struct Obj {
    pub kind: ObjKind,
    pub data: NameMap<Value>,
    pub accessors: NameMap<Accessor>,
    /// Group marker in force for each property, by property name
    pub groups: HashMap<String, Arc<GroupMarker>>,
    pub site: Option<SiteRef>,
    /// Set once the owning module completes; stores are then dropped
    pub frozen: bool,
}

impl Obj {
    pub fn new(kind: ObjKind, site: Option<SiteRef>) -> Self {
        Self {
            kind,
            data: NameMap::new(),
            accessors: NameMap::new(),
            groups: HashMap::new(),
            site,
            frozen: false,
        }
    }

    pub fn new_ref(kind: ObjKind, site: Option<SiteRef>) -> ObjRef {
        Arc::new(RwLock::new(Self::new(kind, site)))
    }

    pub fn function(&self) -> Option<&FunctionObj> {
        match &self.kind {
            ObjKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn doc(&self) -> Option<Arc<DocComment>> {
        self.site.as_ref().and_then(|site| site.doc.clone())
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.data.keys().collect();
        write!(f, "{}{:?}", self.kind.name(), keys)
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

/// One link of the scope chain
#[derive(Debug)]
pub struct Scope {
    pub object: ObjRef,
    pub parent: Option<ScopeRef>,
}

/// How the module is wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Module scope with `exports`, `module` and `require`
    CommonJs,
    /// Plain script evaluated against a window-like global
    Script,
}

/// Supplies the exports of already-loaded modules.
pub trait ModuleLinker {
    /// `None` when the module has not been loaded yet.
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// Linker for code with no dependencies.
pub struct NoModules;

impl ModuleLinker for NoModules {
    fn lookup(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl ModuleLinker for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct Completed {
    pub exports: Value,
    /// Top-level declarations: the module scope, the global object of a
    /// script, or the factory scope of an AMD `define`
    pub global: ObjRef,
    /// Identifiers read without ever being declared, in first-read order
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Complete(Completed),
    NeedsDependencies(Vec<String>),
}

/// Non-local exits
#[derive(Debug)]
enum Interrupt {
    Return(Value),
    NeedsDependencies(Vec<String>),
}

type Exec<T> = std::result::Result<T, Interrupt>;

/// Interpret `program` as module `module`.
///
/// The run has no effect outside its own heap except through values
/// handed out by `linker`, which are frozen. Running again with the same
/// linker gives the same shapes.
pub fn interpret(
    program: &Program,
    module: &str,
    mode: Mode,
    linker: &dyn ModuleLinker,
) -> Outcome {
    let mut interp = Interpreter::new(module, linker);
    let outcome = interp.run(program, mode);
    if let Outcome::Complete(completed) = &outcome {
        freeze(&completed.exports);
        freeze(&Value::Object(completed.global.clone()));
    }
    outcome
}

/// Mark every object reachable from `value` frozen.
pub fn freeze(value: &Value) {
    let mut seen = HashSet::new();
    let mut pending = vec![value.clone()];
    while let Some(value) = pending.pop() {
        let Value::Object(obj) = value else {
            continue;
        };
        if !seen.insert(Arc::as_ptr(&obj) as usize) {
            continue;
        }
        let mut guard = obj.write();
        guard.frozen = true;
        pending.extend(guard.data.values().cloned());
        if let ObjKind::Function(f) = &guard.kind {
            if let Some(proto) = &f.proto {
                pending.push(Value::Object(proto.clone()));
            }
        }
    }
}

fn index_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Scalar(Scalar::Number(_), _) => "number",
        Value::Scalar(Scalar::String(_), _) => "string",
        Value::Scalar(Scalar::Bool(_), _) => "boolean",
        Value::Scalar(Scalar::Undefined, _) | Value::Unresolved(_) => "undefined",
        Value::Object(obj) => match obj.read().kind {
            ObjKind::Function(_) => "function",
            _ => "object",
        },
        _ => "object",
    }
}

struct Interpreter<'l> {
    module: Arc<str>,
    linker: &'l dyn ModuleLinker,
    global: ObjRef,
    module_obj: Option<ObjRef>,
    require_fn: ObjRef,
    /// Activation of the AMD factory, once `define` ran
    amd_scope: Option<ObjRef>,
    depth: usize,
    unresolved: Vec<String>,
}

impl<'l> Interpreter<'l> {
    fn new(module: &str, linker: &'l dyn ModuleLinker) -> Self {
        let module: Arc<str> = Arc::from(module);
        let global_site = Arc::new(Site {
            key: SiteKey {
                module: module.clone(),
                anchor: Anchor::Global,
            },
            line: 0,
            doc: None,
        });
        Self {
            module,
            linker,
            global: Obj::new_ref(ObjKind::Object, Some(global_site)),
            module_obj: None,
            require_fn: native(Native::Require),
            amd_scope: None,
            depth: 0,
            unresolved: Vec::new(),
        }
    }

    fn site(&self, anchor: Anchor, line: usize, doc: Option<Arc<DocComment>>) -> SiteRef {
        Arc::new(Site {
            key: SiteKey {
                module: self.module.clone(),
                anchor,
            },
            line,
            doc,
        })
    }

    fn run(&mut self, program: &Program, mode: Mode) -> Outcome {
        self.global
            .write()
            .data
            .insert("define", Value::Object(native(Native::Define)));
        let global_scope = Arc::new(Scope {
            object: self.global.clone(),
            parent: None,
        });

        let scope = match mode {
            Mode::Script => global_scope,
            Mode::CommonJs => {
                let exports = Obj::new_ref(
                    ObjKind::Object,
                    Some(self.site(Anchor::Exports, 1, None)),
                );
                let module_obj = Obj::new_ref(ObjKind::Object, None);
                module_obj
                    .write()
                    .data
                    .insert("exports", Value::Object(exports.clone()));
                self.module_obj = Some(module_obj.clone());

                let module_scope = Obj::new_ref(ObjKind::Activation, None);
                {
                    let mut scope = module_scope.write();
                    scope.data.insert("exports", Value::Object(exports));
                    scope.data.insert("module", Value::Object(module_obj));
                    scope
                        .data
                        .insert("require", Value::Object(self.require_fn.clone()));
                }
                Arc::new(Scope {
                    object: module_scope,
                    parent: Some(global_scope),
                })
            }
        };

        match self.exec_body(&program.body, &scope) {
            Ok(()) | Err(Interrupt::Return(_)) => {}
            Err(Interrupt::NeedsDependencies(mut names)) => {
                let mut seen = HashSet::new();
                names.retain(|name| seen.insert(name.clone()));
                tracing::debug!(module = %self.module, needs = ?names, "interpretation needs dependencies");
                return Outcome::NeedsDependencies(names);
            }
        }

        let exports = match &self.module_obj {
            Some(module_obj) => module_obj
                .read()
                .data
                .get("exports")
                .cloned()
                .unwrap_or_else(Value::null),
            None => Value::Object(self.global.clone()),
        };
        let global = match (&self.amd_scope, mode) {
            (Some(amd), _) => amd.clone(),
            (None, Mode::CommonJs) => scope.object.clone(),
            (None, Mode::Script) => self.global.clone(),
        };
        // only a finished run reports them; a restart reads them all again
        for name in &self.unresolved {
            tracing::debug!(module = %self.module, name = %name, "unresolved identifier");
        }
        Outcome::Complete(Completed {
            exports,
            global,
            unresolved: std::mem::take(&mut self.unresolved),
        })
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_body(&mut self, body: &[Stmt], scope: &ScopeRef) -> Exec<()> {
        self.hoist(body, scope);
        for stmt in body {
            self.exec_stmt(stmt, scope)?;
        }
        Ok(())
    }

    /// Declare function declarations and `var` names of a body up front.
    fn hoist(&mut self, body: &[Stmt], scope: &ScopeRef) {
        for stmt in body {
            self.hoist_stmt(stmt, scope);
        }
    }

    fn hoist_stmt(&mut self, stmt: &Stmt, scope: &ScopeRef) {
        match &stmt.kind {
            StmtKind::Var { decls, .. } => self.hoist_decls(decls, scope),
            StmtKind::Function(f) => {
                if let Some(name) = &f.name {
                    let value = self.make_function(f, scope, None);
                    scope.object.write().data.insert(name.clone(), value);
                }
            }
            StmtKind::If {
                consequent,
                alternate,
                ..
            } => {
                self.hoist_stmt(consequent, scope);
                if let Some(alternate) = alternate {
                    self.hoist_stmt(alternate, scope);
                }
            }
            StmtKind::Block(body) => self.hoist(body, scope),
            StmtKind::For { init, body, .. } => {
                if let Some(ForInit::Var(_, decls)) = init {
                    self.hoist_decls(decls, scope);
                }
                self.hoist_stmt(body, scope);
            }
            StmtKind::ForIn { left, body, .. } => {
                if let ForInit::Var(_, decls) = left {
                    self.hoist_decls(decls, scope);
                }
                self.hoist_stmt(body, scope);
            }
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::With { body, .. }
            | StmtKind::Labeled { body, .. } => self.hoist_stmt(body, scope),
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => {
                self.hoist(block, scope);
                if let Some(handler) = handler {
                    self.hoist(&handler.body, scope);
                }
                if let Some(finalizer) = finalizer {
                    self.hoist(finalizer, scope);
                }
            }
            StmtKind::Switch { cases, .. } => {
                for case in cases {
                    self.hoist(&case.body, scope);
                }
            }
            _ => {}
        }
    }

    fn hoist_decls(&mut self, decls: &[Declarator], scope: &ScopeRef) {
        let mut object = scope.object.write();
        for decl in decls {
            object
                .data
                .insert_if_absent(decl.name.clone(), Value::undefined());
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &ScopeRef) -> Exec<()> {
        match &stmt.kind {
            StmtKind::Var { decls, .. } => {
                for decl in decls {
                    let Some(init) = &decl.init else {
                        continue;
                    };
                    let value = self.eval(init, scope)?;
                    let value = self.deref(value)?;
                    let target = self.resolve_ident(&decl.name, scope, decl.span.start);
                    self.store(target, value)?;
                }
            }
            // hoisted
            StmtKind::Function(_) => {}
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Return(arg) => {
                let value = match arg {
                    Some(expr) => {
                        let value = self.eval(expr, scope)?;
                        self.deref(value)?
                    }
                    None => Value::undefined(),
                };
                return Err(Interrupt::Return(value));
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.eval(test, scope)?;
                self.exec_stmt(consequent, scope)?;
                if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, scope)?;
                }
            }
            StmtKind::Block(body) => {
                for stmt in body {
                    self.exec_stmt(stmt, scope)?;
                }
            }
            StmtKind::Try {
                block, finalizer, ..
            } => {
                for stmt in block {
                    self.exec_stmt(stmt, scope)?;
                }
                if let Some(finalizer) = finalizer {
                    for stmt in finalizer {
                        self.exec_stmt(stmt, scope)?;
                    }
                }
            }
            StmtKind::Labeled { body, .. } => self.exec_stmt(body, scope)?,
            StmtKind::Throw(arg) => {
                self.eval(arg, scope)?;
            }
            StmtKind::With { .. } => {
                tracing::warn!(module = %self.module, line = stmt.line, "with statement not modeled");
            }
            StmtKind::For { .. }
            | StmtKind::ForIn { .. }
            | StmtKind::While { .. }
            | StmtKind::DoWhile { .. }
            | StmtKind::Switch { .. } => {
                tracing::trace!(module = %self.module, line = stmt.line, "skipping loop");
            }
            StmtKind::Break(_)
            | StmtKind::Continue(_)
            | StmtKind::Empty
            | StmtKind::Debugger => {}
        }
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn scalar(&self, scalar: Scalar, expr: &Expr) -> Value {
        let site = self.site(Anchor::Node(expr.span.start), expr.line, expr.doc.clone());
        Value::Scalar(scalar, Some(site))
    }

    fn eval(&mut self, expr: &Expr, scope: &ScopeRef) -> Exec<Value> {
        let value = match &expr.kind {
            ExprKind::Ident(name) => self.resolve_ident(name, scope, expr.span.start),
            ExprKind::This | ExprKind::Null => Value::null(),
            ExprKind::Bool(b) => self.scalar(Scalar::Bool(*b), expr),
            ExprKind::Number(n) => self.scalar(Scalar::Number(*n), expr),
            ExprKind::String(s) => self.scalar(Scalar::String(s.clone()), expr),
            ExprKind::Regex { pattern, .. } => self.scalar(Scalar::Regex(pattern.clone()), expr),
            ExprKind::Array(elements) => {
                let list = Obj::new_ref(
                    ObjKind::List,
                    Some(self.site(Anchor::Node(expr.span.start), expr.line, expr.doc.clone())),
                );
                for (i, element) in elements.iter().enumerate() {
                    let value = match element {
                        Some(element) => {
                            let value = self.eval(element, scope)?;
                            self.deref(value)?
                        }
                        None => Value::undefined(),
                    };
                    list.write().data.insert(i.to_string(), value);
                }
                Value::Object(list)
            }
            ExprKind::Object(properties) => self.eval_object(expr, properties, scope)?,
            ExprKind::Function(f) => {
                if let Some(name) = &f.name {
                    // a named function expression sees its own name
                    let own = Obj::new_ref(ObjKind::Activation, None);
                    let inner = Arc::new(Scope {
                        object: own.clone(),
                        parent: Some(scope.clone()),
                    });
                    let value = self.make_function(f, &inner, expr.doc.clone());
                    own.write().data.insert(name.clone(), value.clone());
                    value
                } else {
                    self.make_function(f, scope, expr.doc.clone())
                }
            }
            ExprKind::Member { object, property } => {
                let base = self.eval(object, scope)?;
                let base = self.deref(base)?;
                Value::Ref(Box::new(Reference {
                    container: base,
                    name: property.clone(),
                    at: expr.span.start,
                }))
            }
            ExprKind::Index { object, index } => {
                let base = self.eval(object, scope)?;
                let base = self.deref(base)?;
                let key = match &index.kind {
                    ExprKind::String(s) => Some(s.clone()),
                    ExprKind::Number(n) => Some(index_key(*n)),
                    _ => {
                        let key = self.eval(index, scope)?;
                        match self.deref(key)? {
                            Value::Scalar(Scalar::String(s), _) => Some(s),
                            Value::Scalar(Scalar::Number(n), _) => Some(index_key(n)),
                            _ => None,
                        }
                    }
                };
                match key {
                    Some(name) => Value::Ref(Box::new(Reference {
                        container: base,
                        name,
                        at: expr.span.start,
                    })),
                    None => Value::null(),
                }
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, scope)?,
            ExprKind::New { callee, args } => {
                let callee = self.eval(callee, scope)?;
                self.deref(callee)?;
                for arg in args {
                    let value = self.eval(arg, scope)?;
                    self.deref(value)?;
                }
                let site = self.site(Anchor::Node(expr.span.start), expr.line, expr.doc.clone());
                Value::Object(Obj::new_ref(ObjKind::Object, Some(site)))
            }
            ExprKind::Unary { op, arg } => {
                let value = self.eval(arg, scope)?;
                let value = self.deref(value)?;
                match (op, value) {
                    (UnaryOp::Typeof, value) => {
                        Value::Scalar(Scalar::String(type_name(&value).to_string()), None)
                    }
                    (UnaryOp::Neg, Value::Scalar(Scalar::Number(n), _)) => {
                        self.scalar(Scalar::Number(-n), expr)
                    }
                    (UnaryOp::Void, _) => Value::undefined(),
                    _ => Value::null(),
                }
            }
            ExprKind::Update { arg, .. } => {
                let value = self.eval(arg, scope)?;
                self.deref(value)?;
                Value::null()
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let left = self.deref(left)?;
                let right = self.eval(right, scope)?;
                let right = self.deref(right)?;
                match (op, left, right) {
                    (
                        BinaryOp::Add,
                        Value::Scalar(Scalar::String(a), _),
                        Value::Scalar(Scalar::String(b), _),
                    ) => self.scalar(Scalar::String(a + &b), expr),
                    (
                        BinaryOp::Add,
                        Value::Scalar(Scalar::Number(a), _),
                        Value::Scalar(Scalar::Number(b), _),
                    ) => self.scalar(Scalar::Number(a + b), expr),
                    _ => Value::null(),
                }
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                let left = self.deref(left)?;
                let left_is_object = matches!(left, Value::Object(_));
                match (op, left_is_object) {
                    (LogicalOp::Or, true) | (LogicalOp::And, false) => left,
                    _ => {
                        let right = self.eval(right, scope)?;
                        self.deref(right)?
                    }
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.eval(test, scope)?;
                let value = self.eval(consequent, scope)?;
                let value = self.deref(value)?;
                self.eval(alternate, scope)?;
                value
            }
            ExprKind::Assign { op, target, value } => {
                let dest = self.eval(target, scope)?;
                let value = self.eval(value, scope)?;
                let value = self.deref(value)?;
                match op {
                    AssignOp::Assign => {
                        self.store(dest, value.clone())?;
                        value
                    }
                    AssignOp::Compound(_) => Value::null(),
                }
            }
            ExprKind::Sequence(exprs) => {
                let mut last = Value::undefined();
                for expr in exprs {
                    last = self.eval(expr, scope)?;
                }
                last
            }
        };
        Ok(value)
    }

    fn eval_object(&mut self, expr: &Expr, properties: &[Property], scope: &ScopeRef) -> Exec<Value> {
        let site = self.site(Anchor::Node(expr.span.start), expr.line, expr.doc.clone());
        let obj = Obj::new_ref(ObjKind::Object, Some(site));

        for property in properties {
            if property.key.starts_with("__") {
                continue;
            }
            if let Some(group) = &property.group {
                obj.write()
                    .groups
                    .insert(property.key.clone(), group.clone());
            }
            match &property.value {
                PropValue::Init(value) => {
                    let value = self.eval(value, scope)?;
                    let value = self.deref(value)?;
                    obj.write().data.insert(property.key.clone(), value);
                }
                PropValue::Getter(f) | PropValue::Setter(f) => {
                    let is_getter = matches!(property.value, PropValue::Getter(_));
                    let mut guard = obj.write();
                    if guard.accessors.get(&property.key).is_none() {
                        guard.accessors.insert(
                            property.key.clone(),
                            Accessor {
                                getter: None,
                                setter: None,
                                scope: scope.clone(),
                            },
                        );
                    }
                    if let Some(accessor) = guard.accessors.get_mut(&property.key) {
                        if is_getter {
                            accessor.getter = Some(f.clone());
                        } else {
                            accessor.setter = Some(f.clone());
                        }
                    }
                }
            }
        }
        Ok(Value::Object(obj))
    }

    fn make_function(
        &self,
        f: &Arc<Function>,
        scope: &ScopeRef,
        doc: Option<Arc<DocComment>>,
    ) -> Value {
        let site = self.site(
            Anchor::Node(f.span.start),
            f.line,
            doc.or_else(|| f.doc.clone()),
        );
        Value::Object(Obj::new_ref(
            ObjKind::Function(FunctionObj {
                node: Some(f.clone()),
                scope: Some(scope.clone()),
                native: None,
                proto: None,
                explicit_proto: false,
            }),
            Some(site),
        ))
    }

    /// Reference to `name` in the innermost scope that declares it, or to
    /// a property of the global object.
    fn resolve_ident(&self, name: &str, scope: &ScopeRef, at: usize) -> Value {
        let mut current = Some(scope);
        while let Some(link) = current {
            let declared = {
                let object = link.object.read();
                object.data.contains_key(name) || object.accessors.contains_key(name)
            };
            if declared {
                return Value::Ref(Box::new(Reference {
                    container: Value::Object(link.object.clone()),
                    name: name.to_string(),
                    at,
                }));
            }
            current = link.parent.as_ref();
        }
        Value::Ref(Box::new(Reference {
            container: Value::Object(self.global.clone()),
            name: name.to_string(),
            at,
        }))
    }

    // ========================================================================
    // Heap access
    // ========================================================================

    /// Read through a reference. Other values are returned as they are.
    fn deref(&mut self, value: Value) -> Exec<Value> {
        match value {
            Value::Ref(reference) => self.deref_ref(*reference),
            other => Ok(other),
        }
    }

    fn deref_ref(&mut self, reference: Reference) -> Exec<Value> {
        let obj = match &reference.container {
            Value::Object(obj) => obj.clone(),
            // a.b of an unresolved a is itself unresolved
            Value::Unresolved(_) => return Ok(Value::Unresolved(Box::new(reference))),
            _ => {
                tracing::debug!(module = %self.module, name = %reference.name, "property read on a non-object");
                return Ok(Value::null());
            }
        };

        let accessor = obj.read().accessors.get(&reference.name).cloned();
        if let Some(accessor) = accessor {
            return match accessor.getter {
                Some(getter) => self.call_function(&getter, Some(accessor.scope), Vec::new()),
                None => {
                    tracing::warn!(module = %self.module, name = %reference.name, "property has a setter but no getter");
                    Ok(Value::null())
                }
            };
        }

        if reference.name == "prototype" {
            if let Some(proto) = self.function_proto(&obj) {
                return Ok(Value::Object(proto));
            }
        }

        let data = obj.read().data.get(&reference.name).cloned();
        match data {
            None if Arc::ptr_eq(&obj, &self.global) => {
                if !self.unresolved.contains(&reference.name) {
                    self.unresolved.push(reference.name.clone());
                }
                Ok(Value::Unresolved(Box::new(reference)))
            }
            Some(Value::Scalar(Scalar::Undefined, _)) | None => {
                Ok(Value::Unresolved(Box::new(reference)))
            }
            Some(value) => Ok(value),
        }
    }

    /// The prototype of a function object, created on first use.
    fn function_proto(&self, obj: &ObjRef) -> Option<ObjRef> {
        let mut guard = obj.write();
        let frozen = guard.frozen;
        let anchor = match guard.site.as_ref().map(|site| site.key.anchor) {
            Some(Anchor::Node(offset)) => Anchor::Proto(offset),
            _ => Anchor::Global,
        };
        let line = guard.site.as_ref().map(|site| site.line).unwrap_or(0);
        let ObjKind::Function(function) = &mut guard.kind else {
            return None;
        };
        if function.proto.is_none() {
            let mut proto = Obj::new(ObjKind::Object, Some(self.site(anchor, line, None)));
            proto.frozen = frozen;
            function.proto = Some(Arc::new(RwLock::new(proto)));
        }
        function.proto.clone()
    }

    /// Make `container` able to hold properties. An unresolved name is
    /// turned into a fresh object stored under that name.
    fn coerce_storable(&mut self, container: &Value) -> Exec<Option<ObjRef>> {
        match container {
            Value::Object(obj) => Ok(Some(obj.clone())),
            Value::Unresolved(reference) => {
                let site = self.site(Anchor::Node(reference.at), 0, None);
                let fresh = Obj::new_ref(ObjKind::Object, Some(site));
                self.store(
                    Value::Ref(reference.clone()),
                    Value::Object(fresh.clone()),
                )?;
                Ok(Some(fresh))
            }
            Value::Ref(reference) => {
                let value = self.deref_ref((**reference).clone())?;
                self.coerce_storable(&value)
            }
            Value::Scalar(..) => Ok(None),
        }
    }

    /// Store `value` at the location `dest`.
    fn store(&mut self, dest: Value, value: Value) -> Exec<()> {
        let reference = match dest {
            Value::Ref(reference) | Value::Unresolved(reference) => *reference,
            _ => {
                tracing::debug!(module = %self.module, "store into a non-reference");
                return Ok(());
            }
        };
        let Some(obj) = self.coerce_storable(&reference.container)? else {
            tracing::debug!(module = %self.module, name = %reference.name, "store into a non-object");
            return Ok(());
        };

        let (frozen, accessor, is_function) = {
            let guard = obj.read();
            (
                guard.frozen,
                guard.accessors.get(&reference.name).cloned(),
                matches!(guard.kind, ObjKind::Function(_)),
            )
        };

        if frozen {
            tracing::warn!(module = %self.module, name = %reference.name, "store into a frozen object dropped");
            return Ok(());
        }

        if let Some(accessor) = accessor {
            match accessor.setter {
                Some(setter) => {
                    self.call_function(&setter, Some(accessor.scope), vec![value])?;
                }
                None => {
                    tracing::warn!(module = %self.module, name = %reference.name, "property has a getter but no setter");
                }
            }
            return Ok(());
        }

        if is_function && reference.name == "prototype" {
            if let Value::Object(proto) = &value {
                let mut guard = obj.write();
                if let ObjKind::Function(function) = &mut guard.kind {
                    function.proto = Some(proto.clone());
                    function.explicit_proto = true;
                }
                return Ok(());
            }
        }

        if reference.name.starts_with("__") {
            return Ok(());
        }
        obj.write().data.insert(reference.name, value);
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], scope: &ScopeRef) -> Exec<Value> {
        let callee = self.eval(callee, scope)?;
        let callee = self.deref(callee)?;
        let mut argv = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.eval(arg, scope)?;
            argv.push(self.deref(value)?);
        }

        let Value::Object(obj) = callee else {
            tracing::debug!(module = %self.module, "call of a non-function");
            return Ok(Value::null());
        };
        let target = {
            let guard = obj.read();
            guard
                .function()
                .map(|f| (f.native, f.node.clone(), f.scope.clone()))
        };
        match target {
            Some((Some(native), _, _)) => self.call_native(native, argv),
            Some((None, Some(node), fscope)) => self.call_function(&node, fscope, argv),
            _ => {
                tracing::debug!(module = %self.module, "call of a non-function");
                Ok(Value::null())
            }
        }
    }

    fn call_function(
        &mut self,
        f: &Arc<Function>,
        scope: Option<ScopeRef>,
        args: Vec<Value>,
    ) -> Exec<Value> {
        self.call_in_activation(f, scope, args).map(|(value, _)| value)
    }

    /// Run a function body in a fresh activation, returning the result and
    /// the activation.
    fn call_in_activation(
        &mut self,
        f: &Arc<Function>,
        scope: Option<ScopeRef>,
        args: Vec<Value>,
    ) -> Exec<(Value, ObjRef)> {
        let activation = Obj::new_ref(ObjKind::Activation, None);
        if self.depth >= MAX_CALL_DEPTH {
            tracing::debug!(module = %self.module, "call depth limit reached");
            return Ok((Value::undefined(), activation));
        }

        {
            let arguments = Obj::new_ref(ObjKind::List, None);
            let mut guard = activation.write();
            for (i, param) in f.params.iter().enumerate() {
                let value = args.get(i).cloned().unwrap_or_else(Value::undefined);
                guard.data.insert(param.clone(), value);
            }
            let mut list = arguments.write();
            for (i, arg) in args.into_iter().enumerate() {
                list.data.insert(i.to_string(), arg);
            }
            drop(list);
            guard
                .data
                .insert_if_absent("arguments", Value::Object(arguments));
        }

        let inner = Arc::new(Scope {
            object: activation.clone(),
            parent: scope,
        });
        self.depth += 1;
        let result = self.exec_body(&f.body, &inner);
        self.depth -= 1;

        match result {
            Ok(()) => Ok((Value::undefined(), activation)),
            Err(Interrupt::Return(value)) => Ok((value, activation)),
            Err(other) => Err(other),
        }
    }

    fn call_native(&mut self, native: Native, args: Vec<Value>) -> Exec<Value> {
        match native {
            Native::Require => {
                let Some(name) = args.first().and_then(Value::as_str) else {
                    tracing::debug!(module = %self.module, "require without a module name");
                    return Ok(Value::null());
                };
                match self.linker.lookup(name) {
                    Some(exports) => Ok(exports),
                    None => Err(Interrupt::NeedsDependencies(vec![name.to_string()])),
                }
            }
            Native::Define => self.define(args),
        }
    }

    /// AMD `define([name,] [deps,] factory)`
    fn define(&mut self, args: Vec<Value>) -> Exec<Value> {
        let mut deps = Vec::new();
        let mut factory = None;
        for arg in args {
            let Value::Object(obj) = arg else {
                continue;
            };
            let is_list = matches!(obj.read().kind, ObjKind::List);
            if is_list && factory.is_none() {
                deps = obj
                    .read()
                    .data
                    .values()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
            } else {
                factory = Some(obj);
            }
        }
        let Some(factory) = factory else {
            tracing::debug!(module = %self.module, "define without a factory");
            return Ok(Value::null());
        };

        // request every missing dependency at once
        let mut missing = Vec::new();
        let mut resolved = Vec::with_capacity(deps.len());
        for dep in &deps {
            let value = match dep.as_str() {
                "exports" => self.module_exports(),
                "module" => self.module_object(),
                "require" => Some(Value::Object(self.require_fn.clone())),
                name => self.linker.lookup(name),
            };
            match value {
                Some(value) => resolved.push(value),
                None => missing.push(dep.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(Interrupt::NeedsDependencies(missing));
        }

        let target = {
            let guard = factory.read();
            guard.function().and_then(|f| f.node.clone().map(|node| (node, f.scope.clone())))
        };
        let returned = match target {
            Some((node, scope)) => {
                let (returned, activation) = self.call_in_activation(&node, scope, resolved)?;
                self.amd_scope = Some(activation);
                returned
            }
            // `define({...})` exports the object itself
            None => Value::Object(factory),
        };

        if !deps.iter().any(|d| d == "exports") && matches!(returned, Value::Object(_)) {
            if let Some(module_obj) = self.module_object_ref() {
                module_obj.write().data.insert("exports", returned);
            }
        }
        Ok(Value::undefined())
    }

    /// The `module` object, created on demand for scripts using AMD.
    fn module_object_ref(&mut self) -> Option<ObjRef> {
        if self.module_obj.is_none() {
            let exports = Obj::new_ref(
                ObjKind::Object,
                Some(self.site(Anchor::Exports, 1, None)),
            );
            let module_obj = Obj::new_ref(ObjKind::Object, None);
            module_obj
                .write()
                .data
                .insert("exports", Value::Object(exports));
            self.module_obj = Some(module_obj);
        }
        self.module_obj.clone()
    }

    fn module_object(&mut self) -> Option<Value> {
        self.module_object_ref().map(Value::Object)
    }

    fn module_exports(&mut self) -> Option<Value> {
        let module_obj = self.module_object_ref()?;
        let exports = module_obj.read().data.get("exports").cloned();
        exports
    }
}

fn native(native: Native) -> ObjRef {
    Obj::new_ref(
        ObjKind::Function(FunctionObj {
            node: None,
            scope: None,
            native: Some(native),
            proto: None,
            explicit_proto: false,
        }),
        None,
    )
}
