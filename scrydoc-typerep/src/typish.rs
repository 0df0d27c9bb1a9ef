//! The closed set of documented entity kinds.
//!
//! Symbols are shared (`Arc`) because one symbol can be reachable under
//! several names, and containers are filled in after the symbol exists so
//! that self-referential graphs can be described. Owner links inside a
//! [`LifeStory`] are weak; child links are strong.

use crate::jsdoc::DocStream;
use parking_lot::{Mutex, RwLock};
use scrydoc_js::Scalar;
use scrydoc_types::NameMap;
use std::fmt;
use std::sync::{Arc, Weak};

pub type Sym = Arc<Typish>;

/// Held while a type reference is checked and bound, so two bindings cannot
/// close a loop between them.
static BINDING: Mutex<()> = Mutex::new(());

/// One name under which a symbol was found, and who held it
#[derive(Debug, Clone)]
pub struct Owner {
    pub name: String,
    /// Display name of the owning symbol at the time it was noted
    pub owner_name: String,
    pub owner: Weak<Typish>,
}

impl Owner {
    pub fn owner(&self) -> Option<Sym> {
        self.owner.upgrade()
    }
}

/// Provenance of a symbol: where it was born and every name it has been
/// found under since.
#[derive(Debug, Default)]
pub struct LifeStory {
    pub origin_module: Option<String>,
    pub origin_line: Option<usize>,
    owners: Mutex<Vec<Owner>>,
}

impl LifeStory {
    pub fn new(module: Option<&str>, line: Option<usize>) -> Self {
        Self {
            origin_module: module.map(str::to_string),
            origin_line: line,
            owners: Mutex::new(Vec::new()),
        }
    }

    /// Record that `owner` holds this symbol as `name`. The first note is
    /// the origin. Repeating an identical note has no effect.
    pub fn note_owner(&self, name: &str, owner: &Sym) {
        let mut owners = self.owners.lock();
        let seen = owners
            .iter()
            .any(|o| o.name == name && o.owner.as_ptr() == Arc::as_ptr(owner));
        if seen {
            return;
        }
        owners.push(Owner {
            name: name.to_string(),
            owner_name: owner.display_name(),
            owner: Arc::downgrade(owner),
        });
    }

    /// The first (name, owner) pair ever noted
    pub fn origin(&self) -> Option<Owner> {
        self.owners.lock().first().cloned()
    }

    pub fn origin_name(&self) -> Option<String> {
        self.owners.lock().first().map(|o| o.name.clone())
    }

    pub fn owners(&self) -> Vec<Owner> {
        self.owners.lock().clone()
    }
}

/// Named subset of a container's children
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub doc: DocStream,
    pub children: NameMap<Sym>,
}

/// Children of a container, partitioned into groups.
///
/// Every child is in `children` and in exactly one of `ungrouped` or a
/// single group's children.
#[derive(Debug, Default)]
pub struct Members {
    children: NameMap<Sym>,
    ungrouped: NameMap<Sym>,
    groups: NameMap<Group>,
}

impl Members {
    pub fn new() -> Self {
        Self::default()
    }

    /// File `sym` as `name`, inside the group `group` when given. Groups
    /// are created on first use with the doc supplied then. The first
    /// writer of a name wins; returns whether `sym` was stored.
    pub fn file(&mut self, name: &str, sym: Sym, group: Option<(&str, &DocStream)>) -> bool {
        if !self.children.insert_if_absent(name, sym.clone()) {
            return false;
        }
        match group {
            Some((group_name, doc)) => {
                if !self.groups.contains_key(group_name) {
                    self.groups.insert(
                        group_name,
                        Group {
                            name: group_name.to_string(),
                            doc: doc.clone(),
                            children: NameMap::new(),
                        },
                    );
                }
                if let Some(group) = self.groups.get_mut(group_name) {
                    group.children.insert(name, sym);
                }
            }
            None => {
                self.ungrouped.insert(name, sym);
            }
        }
        true
    }

    /// Create an empty group so that it shows up even without children.
    pub fn declare_group(&mut self, name: &str, doc: DocStream) {
        if !self.groups.contains_key(name) {
            self.groups.insert(
                name,
                Group {
                    name: name.to_string(),
                    doc,
                    children: NameMap::new(),
                },
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<Sym> {
        self.children.get(name).cloned()
    }

    pub fn children(&self) -> &NameMap<Sym> {
        &self.children
    }

    pub fn ungrouped(&self) -> &NameMap<Sym> {
        &self.ungrouped
    }

    pub fn groups(&self) -> &NameMap<Group> {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether ungrouped and grouped children split `children` exactly.
    pub fn is_partitioned(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        let grouped = self.groups.values().flat_map(|g| g.children.keys());
        for key in self.ungrouped.keys().chain(grouped) {
            if !seen.insert(key) || !self.children.contains_key(key) {
                return false;
            }
        }
        seen.len() == self.children.len()
    }
}

/// Which side of a two-sided type a child lookup addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraverseMode {
    /// Only the constructor of a class
    Constructor,
    /// Only the instances (prototype) of a class
    Instance,
    /// The key descriptor of a dictionary
    Key,
    /// The value descriptor of a dictionary
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKey<'a> {
    Index(usize),
    Name(&'a str),
}

/// Symbols that have named children
pub trait ChildTraversable {
    fn traverse_child(&self, name: &str, mode: Option<TraverseMode>) -> Option<Sym>;
}

/// Symbols that take arguments or have positional parts
pub trait ArgTraversable {
    fn traverse_arg(&self, key: ArgKey<'_>) -> Option<Sym>;
}

#[derive(Debug)]
pub struct Namespace {
    pub name: String,
    pub life: LifeStory,
    pub members: RwLock<Members>,
}

impl Namespace {
    pub fn new(name: impl Into<String>, life: LifeStory) -> Self {
        Self {
            name: name.into(),
            life,
            members: RwLock::new(Members::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    /// A function signature used as a type
    Type,
    /// A top-level function value
    Instance,
    Method,
    Constructor,
}

/// Functions, methods, constructors and function types
#[derive(Debug)]
pub struct FuncSym {
    pub kind: FuncKind,
    /// The attribute name the function was found under
    pub name: Option<String>,
    /// The name in the function's own syntax, if it had one
    pub debug_name: Option<String>,
    pub life: LifeStory,
    pub args: Option<Sym>,
    pub this_desc: Option<Sym>,
    pub ret: Option<Sym>,
    pub doc: DocStream,
    pub members: RwLock<Members>,
}

impl FuncSym {
    pub fn new(kind: FuncKind, name: Option<String>, debug_name: Option<String>, life: LifeStory) -> Self {
        Self {
            kind,
            name,
            debug_name,
            life,
            args: None,
            this_desc: None,
            ret: None,
            doc: Vec::new(),
            members: RwLock::new(Members::new()),
        }
    }
}

#[derive(Debug)]
pub struct ClassType {
    pub name: String,
    /// A [`FuncKind::Constructor`] function
    pub constructor: Sym,
    /// An [`ObjectKind::Prototype`] object describing instances
    pub proto: Sym,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Instances of a class
    Prototype,
    /// An object found in code
    Generic,
    /// An object documented as the only one of its kind
    Singleton,
    /// A documented dictionary shape
    Dict,
}

#[derive(Debug)]
pub struct ObjectSym {
    pub kind: ObjectKind,
    pub name: Option<String>,
    pub life: LifeStory,
    pub doc: DocStream,
    pub members: RwLock<Members>,
}

impl ObjectSym {
    pub fn new(kind: ObjectKind, name: Option<String>, life: LifeStory) -> Self {
        Self {
            kind,
            name,
            life,
            doc: Vec::new(),
            members: RwLock::new(Members::new()),
        }
    }
}

/// Dictionary with arbitrary keys of one type
#[derive(Debug)]
pub struct DictOf {
    pub key: Sym,
    pub value: Sym,
    pub doc: DocStream,
}

/// Fixed-shape list
#[derive(Debug)]
pub struct ListType {
    pub kids: Vec<Sym>,
}

/// Homogeneous list
#[derive(Debug)]
pub struct ListOf {
    pub name: Option<String>,
    pub ty: Sym,
    pub doc: DocStream,
}

#[derive(Debug)]
pub struct OneOf {
    /// [`DescriptorKind::Case`] descriptors
    pub cases: Vec<Sym>,
    pub doc: DocStream,
}

#[derive(Debug)]
pub struct Typedef {
    pub name: String,
    pub ty: Sym,
    pub doc: DocStream,
}

/// A constant, or any non-object value found in code
#[derive(Debug)]
pub struct NamedValue {
    pub name: Option<String>,
    /// `None` for lists
    pub value: Option<Scalar>,
    /// `Number`, `String`, `Boolean`, `RegExp`, `null`, `undefined`,
    /// `unresolved` or `Array`
    pub genus: String,
    pub life: LifeStory,
    pub doc: DocStream,
}

/// A type named by text, resolved on demand
#[derive(Debug)]
pub struct TypeRef {
    pub name: String,
    resolved: RwLock<Option<Sym>>,
}

impl TypeRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resolved: RwLock::new(None),
        }
    }

    pub fn target(&self) -> Option<Sym> {
        self.resolved.read().clone()
    }

    /// Bind the reference. The first binding sticks.
    ///
    /// A target whose chain of described types leads back to this
    /// reference is refused, so following types always ends. Returns
    /// whether `sym` is now the target.
    pub fn resolve(&self, sym: Sym) -> bool {
        let _serial = BINDING.lock();
        let mut next = Some(sym.clone());
        while let Some(current) = next {
            if matches!(&*current, Typish::Ref(r) if std::ptr::eq(r, self)) {
                return false;
            }
            next = current.described_type();
        }
        let mut slot = self.resolved.write();
        match &*slot {
            Some(existing) => Arc::ptr_eq(existing, &sym),
            None => {
                *slot = Some(sym);
                true
            }
        }
    }
}

/// A named calling convention an object promises to follow
#[derive(Debug)]
pub struct Protocol {
    pub name: String,
    pub ty: Option<Sym>,
    pub doc: DocStream,
}

/// Arguments of a function: [`DescriptorKind::Arg`] and
/// [`DescriptorKind::VarArg`] descriptors.
#[derive(Debug)]
pub struct ArgList {
    pub args: Vec<Sym>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    Required,
    Optional,
    OneOrMore,
}

#[derive(Debug)]
pub enum DescriptorKind {
    Arg {
        multiplicity: Multiplicity,
        /// An [`DescriptorKind::ArgDefault`] descriptor
        default: Option<Sym>,
    },
    VarArg {
        min: usize,
        max: Option<usize>,
    },
    ArgDefault,
    RetVal,
    This,
    Field,
    Property {
        getter: Option<Sym>,
        setter: Option<Sym>,
    },
    Case {
        is_default: bool,
    },
    DictEntry {
        optional: bool,
        default: Option<Sym>,
    },
    DictKey,
    DictValue,
}

/// Describes one part of something else; lookups pass through to `ty`.
#[derive(Debug)]
pub struct Descriptor {
    pub kind: DescriptorKind,
    pub name: String,
    pub ty: Sym,
    pub doc: DocStream,
}

impl Descriptor {
    pub fn new(kind: DescriptorKind, name: impl Into<String>, ty: Sym, doc: DocStream) -> Self {
        Self {
            kind,
            name: name.into(),
            ty,
            doc,
        }
    }
}

pub enum Typish {
    Namespace(Namespace),
    Func(FuncSym),
    Class(ClassType),
    Object(ObjectSym),
    DictOf(DictOf),
    List(ListType),
    ListOf(ListOf),
    OneOf(OneOf),
    Typedef(Typedef),
    NamedValue(NamedValue),
    Ref(TypeRef),
    Protocol(Protocol),
    ArgList(ArgList),
    Descriptor(Descriptor),
}

impl Typish {
    pub fn into_sym(self) -> Sym {
        Arc::new(self)
    }

    pub fn type_ref(name: impl Into<String>) -> Sym {
        Arc::new(Typish::Ref(TypeRef::new(name)))
    }

    /// Short tag naming the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Typish::Namespace(_) => "namespace",
            Typish::Func(f) => match f.kind {
                FuncKind::Type => "functype",
                FuncKind::Instance => "funcinstance",
                FuncKind::Method => "method",
                FuncKind::Constructor => "constructor",
            },
            Typish::Class(_) => "class",
            Typish::Object(o) => match o.kind {
                ObjectKind::Prototype => "object",
                ObjectKind::Generic => "generic",
                ObjectKind::Singleton => "singleton",
                ObjectKind::Dict => "dict",
            },
            Typish::DictOf(_) => "dictof",
            Typish::List(_) => "list",
            Typish::ListOf(_) => "listof",
            Typish::OneOf(_) => "oneof",
            Typish::Typedef(_) => "typedef",
            Typish::NamedValue(_) => "namedvalue",
            Typish::Ref(_) => "typeref",
            Typish::Protocol(_) => "protocol",
            Typish::ArgList(_) => "arglist",
            Typish::Descriptor(d) => match d.kind {
                DescriptorKind::Arg { .. } => "arg",
                DescriptorKind::VarArg { .. } => "vararg",
                DescriptorKind::ArgDefault => "default",
                DescriptorKind::RetVal => "retval",
                DescriptorKind::This => "this",
                DescriptorKind::Field => "field",
                DescriptorKind::Property { .. } => "property",
                DescriptorKind::Case { .. } => "case",
                DescriptorKind::DictEntry { .. } => "dictentry",
                DescriptorKind::DictKey => "dictkey",
                DescriptorKind::DictValue => "dictvalue",
            },
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Typish::Namespace(ns) => Some(&ns.name),
            Typish::Func(f) => f.name.as_deref().or(f.debug_name.as_deref()),
            Typish::Class(c) => Some(&c.name),
            Typish::Object(o) => o.name.as_deref(),
            Typish::ListOf(l) => l.name.as_deref(),
            Typish::Typedef(t) => Some(&t.name),
            Typish::NamedValue(v) => v.name.as_deref(),
            Typish::Ref(r) => Some(&r.name),
            Typish::Protocol(p) => Some(&p.name),
            Typish::Descriptor(d) => Some(&d.name),
            Typish::DictOf(_)
            | Typish::List(_)
            | Typish::OneOf(_)
            | Typish::ArgList(_) => None,
        }
    }

    /// Name for messages and owner records
    pub fn display_name(&self) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => format!("({})", self.kind()),
        }
    }

    pub fn life(&self) -> Option<&LifeStory> {
        match self {
            Typish::Namespace(ns) => Some(&ns.life),
            Typish::Func(f) => Some(&f.life),
            Typish::Class(c) => c.constructor.life(),
            Typish::Object(o) => Some(&o.life),
            Typish::NamedValue(v) => Some(&v.life),
            _ => None,
        }
    }

    pub fn doc(&self) -> &[scrydoc_syntax::Flow<crate::jsdoc::DocValue>] {
        match self {
            Typish::Func(f) => &f.doc,
            Typish::Class(c) => c.constructor.doc(),
            Typish::Object(o) => &o.doc,
            Typish::DictOf(d) => &d.doc,
            Typish::ListOf(l) => &l.doc,
            Typish::OneOf(o) => &o.doc,
            Typish::Typedef(t) => &t.doc,
            Typish::NamedValue(v) => &v.doc,
            Typish::Protocol(p) => &p.doc,
            Typish::Descriptor(d) => &d.doc,
            Typish::Namespace(_) | Typish::List(_) | Typish::Ref(_) | Typish::ArgList(_) => &[],
        }
    }

    /// The child table of containers that have one
    pub fn members(&self) -> Option<&RwLock<Members>> {
        match self {
            Typish::Namespace(ns) => Some(&ns.members),
            Typish::Func(f) => Some(&f.members),
            Typish::Object(o) => Some(&o.members),
            _ => None,
        }
    }

    /// The type a descriptor, typedef or reference stands for
    pub fn described_type(&self) -> Option<Sym> {
        match self {
            Typish::Descriptor(d) => Some(d.ty.clone()),
            Typish::Typedef(t) => Some(t.ty.clone()),
            Typish::Ref(r) => r.target(),
            Typish::Protocol(p) => p.ty.clone(),
            _ => None,
        }
    }

    /// Whether this names a type rather than a value
    pub fn is_type(&self) -> bool {
        match self {
            Typish::Class(_)
            | Typish::Typedef(_)
            | Typish::Protocol(_)
            | Typish::DictOf(_)
            | Typish::OneOf(_)
            | Typish::ListOf(_) => true,
            Typish::Func(f) => f.kind == FuncKind::Type,
            Typish::Object(o) => o.kind == ObjectKind::Dict,
            _ => false,
        }
    }

    pub fn as_func(&self) -> Option<&FuncSym> {
        match self {
            Typish::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_descriptor(&self) -> Option<&Descriptor> {
        match self {
            Typish::Descriptor(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_child_traversable(&self) -> Option<&dyn ChildTraversable> {
        match self {
            Typish::Namespace(ns) => Some(ns),
            Typish::Func(f) => Some(f),
            Typish::Class(c) => Some(c),
            Typish::Object(o) => Some(o),
            Typish::DictOf(d) => Some(d),
            Typish::ListOf(l) => Some(l),
            Typish::Typedef(t) => Some(t),
            Typish::Ref(r) => Some(r),
            Typish::Protocol(p) => Some(p),
            Typish::Descriptor(d) => Some(d),
            Typish::List(_)
            | Typish::OneOf(_)
            | Typish::NamedValue(_)
            | Typish::ArgList(_) => None,
        }
    }

    pub fn as_arg_traversable(&self) -> Option<&dyn ArgTraversable> {
        match self {
            Typish::Func(f) => Some(f),
            Typish::Class(c) => Some(c),
            Typish::List(l) => Some(l),
            Typish::Typedef(t) => Some(t),
            Typish::Ref(r) => Some(r),
            Typish::ArgList(a) => Some(a),
            Typish::Descriptor(d) => Some(d),
            _ => None,
        }
    }

    pub fn traverse_child(&self, name: &str, mode: Option<TraverseMode>) -> Option<Sym> {
        self.as_child_traversable()?.traverse_child(name, mode)
    }

    pub fn traverse_arg(&self, key: ArgKey<'_>) -> Option<Sym> {
        self.as_arg_traversable()?.traverse_arg(key)
    }
}

impl fmt::Debug for Typish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        if let Some(name) = self.name() {
            write!(f, " {}", name)?;
        }
        if let Some(members) = self.members() {
            let members = members.read();
            let keys: Vec<&str> = members.children().keys().collect();
            write!(f, " {:?}", keys)?;
        }
        Ok(())
    }
}

impl ChildTraversable for Namespace {
    fn traverse_child(&self, name: &str, _mode: Option<TraverseMode>) -> Option<Sym> {
        self.members.read().get(name)
    }
}

impl ChildTraversable for FuncSym {
    fn traverse_child(&self, name: &str, _mode: Option<TraverseMode>) -> Option<Sym> {
        self.members.read().get(name)
    }
}

impl ArgTraversable for FuncSym {
    fn traverse_arg(&self, key: ArgKey<'_>) -> Option<Sym> {
        self.args.as_ref()?.traverse_arg(key)
    }
}

impl ChildTraversable for ClassType {
    fn traverse_child(&self, name: &str, mode: Option<TraverseMode>) -> Option<Sym> {
        if mode != Some(TraverseMode::Constructor) {
            if let Some(found) = self.proto.traverse_child(name, None) {
                return Some(found);
            }
        }
        if mode != Some(TraverseMode::Instance) {
            return self.constructor.traverse_child(name, None);
        }
        None
    }
}

impl ArgTraversable for ClassType {
    fn traverse_arg(&self, key: ArgKey<'_>) -> Option<Sym> {
        self.constructor.traverse_arg(key)
    }
}

impl ChildTraversable for ObjectSym {
    fn traverse_child(&self, name: &str, _mode: Option<TraverseMode>) -> Option<Sym> {
        self.members.read().get(name)
    }
}

impl ChildTraversable for DictOf {
    fn traverse_child(&self, _name: &str, mode: Option<TraverseMode>) -> Option<Sym> {
        match mode {
            Some(TraverseMode::Value) => Some(self.value.clone()),
            _ => Some(self.key.clone()),
        }
    }
}

impl ArgTraversable for ListType {
    fn traverse_arg(&self, key: ArgKey<'_>) -> Option<Sym> {
        match key {
            ArgKey::Index(i) => self.kids.get(i).cloned(),
            ArgKey::Name(_) => None,
        }
    }
}

impl ChildTraversable for ListOf {
    fn traverse_child(&self, _name: &str, _mode: Option<TraverseMode>) -> Option<Sym> {
        Some(self.ty.clone())
    }
}

impl ChildTraversable for Typedef {
    fn traverse_child(&self, name: &str, mode: Option<TraverseMode>) -> Option<Sym> {
        self.ty.traverse_child(name, mode)
    }
}

impl ArgTraversable for Typedef {
    fn traverse_arg(&self, key: ArgKey<'_>) -> Option<Sym> {
        self.ty.traverse_arg(key)
    }
}

impl ChildTraversable for TypeRef {
    fn traverse_child(&self, name: &str, mode: Option<TraverseMode>) -> Option<Sym> {
        self.target()?.traverse_child(name, mode)
    }
}

impl ArgTraversable for TypeRef {
    fn traverse_arg(&self, key: ArgKey<'_>) -> Option<Sym> {
        self.target()?.traverse_arg(key)
    }
}

impl ChildTraversable for Protocol {
    fn traverse_child(&self, name: &str, mode: Option<TraverseMode>) -> Option<Sym> {
        self.ty.as_ref()?.traverse_child(name, mode)
    }
}

impl ArgTraversable for ArgList {
    fn traverse_arg(&self, key: ArgKey<'_>) -> Option<Sym> {
        match key {
            ArgKey::Index(i) => self.args.get(i).cloned(),
            ArgKey::Name(name) => self
                .args
                .iter()
                .find(|arg| arg.name() == Some(name))
                .cloned(),
        }
    }
}

impl ChildTraversable for Descriptor {
    fn traverse_child(&self, name: &str, mode: Option<TraverseMode>) -> Option<Sym> {
        self.ty.traverse_child(name, mode)
    }
}

impl ArgTraversable for Descriptor {
    fn traverse_arg(&self, key: ArgKey<'_>) -> Option<Sym> {
        self.ty.traverse_arg(key)
    }
}
