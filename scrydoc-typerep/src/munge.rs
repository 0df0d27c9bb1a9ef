//! Symbol muncher: turns interpreter values into [`Typish`] symbols.
//!
//! Symbols are memoized by the site of the value they describe in a
//! [`SymbolTable`] shared by every module of a package, so a function
//! reachable under two names is one symbol whose [`LifeStory`] records both
//! owners.

use crate::jsdoc::{read_doc_comment, ret_desc, DocBits, DocStream};
use crate::typish::*;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use scrydoc_js::{
    Accessor, Anchor, DocComment, Function, GroupMarker, ObjKind, ObjRef, Scalar, SiteKey,
    SiteRef, Value,
};
use scrydoc_syntax::{Datum, Flow};
use std::collections::HashMap;
use std::sync::Arc;

/// Package-wide memo of symbols by value origin
#[derive(Default)]
pub struct SymbolTable {
    symbols: DashMap<SiteKey, Sym>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SiteKey) -> Option<Sym> {
        self.symbols.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Store `sym` unless another symbol got there first. Returns the
    /// symbol in the table and whether it is `sym`.
    fn claim(&self, key: SiteKey, sym: Sym) -> (Sym, bool) {
        match self.symbols.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                entry.insert(sym.clone());
                (sym, true)
            }
        }
    }
}

/// Property values, groups and accessors of an object, copied out so that
/// no interpreter lock is held while munging children
struct Snapshot {
    data: Vec<(String, Value)>,
    groups: HashMap<String, Arc<GroupMarker>>,
    accessors: Vec<(String, Accessor)>,
}

impl Snapshot {
    fn of(obj: &ObjRef) -> Self {
        let obj = obj.read();
        Self {
            data: obj
                .data
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            groups: obj.groups.clone(),
            accessors: obj
                .accessors
                .iter()
                .map(|(k, a)| (k.to_string(), a.clone()))
                .collect(),
        }
    }

    fn group_of(&self, key: &str) -> Option<(String, DocStream)> {
        let marker = self.groups.get(key)?;
        let name = marker.name.clone()?;
        let doc = if marker.description.is_empty() {
            Vec::new()
        } else {
            vec![Flow::Para(vec![Datum::Text(marker.description.clone())])]
        };
        Some((name, doc))
    }
}

/// Converts the values of one module
pub struct Muncher<'a> {
    table: &'a SymbolTable,
    module: &'a str,
}

impl<'a> Muncher<'a> {
    pub fn new(table: &'a SymbolTable, module: &'a str) -> Self {
        Self { table, module }
    }

    /// Describe the properties of `value` as the namespace `module:name`.
    pub fn munge_namespace(&self, name: &str, value: &Value) -> Sym {
        let life = LifeStory::new(Some(self.module), Some(0));
        let ns = Typish::Namespace(Namespace::new(format!("{}:{}", self.module, name), life)).into_sym();
        if let (Some(obj), Some(members)) = (value.as_object(), ns.members()) {
            let owners = vec![ns.clone()];
            self.fill(members, Snapshot::of(obj), &owners, self.module);
        }
        ns
    }

    /// Describe `value`, found as `attr` of the last symbol in `owners`.
    ///
    /// Activations and native functions have no symbol.
    pub fn munge(&self, value: &Value, attr: &str, owners: &[Sym]) -> Option<Sym> {
        match value {
            Value::Object(obj) => self.munge_object(obj, attr, owners),
            Value::Scalar(scalar, site) => Some(self.munge_scalar(scalar, site.as_ref(), attr, owners)),
            Value::Ref(_) | Value::Unresolved(_) => {
                let sym = Typish::NamedValue(NamedValue {
                    name: Some(attr.to_string()),
                    value: None,
                    genus: "unresolved".to_string(),
                    life: LifeStory::new(Some(self.module), None),
                    doc: Vec::new(),
                })
                .into_sym();
                note_owner(&sym, attr, owners);
                Some(sym)
            }
        }
    }

    fn doc_bits(&self, doc: Option<&DocComment>, module: &str) -> DocBits {
        let Some(doc) = doc else {
            return DocBits::default();
        };
        match read_doc_comment(&doc.text, module) {
            Ok(bits) => bits,
            Err(err) => {
                tracing::warn!(module = %module, line = doc.line, error = %err, "unreadable doc comment");
                DocBits {
                    stream: vec![Flow::Para(vec![Datum::Text(doc.text.clone())])],
                    ..DocBits::default()
                }
            }
        }
    }

    fn munge_scalar(&self, scalar: &Scalar, site: Option<&SiteRef>, attr: &str, owners: &[Sym]) -> Sym {
        if let Some(existing) = site.and_then(|site| self.table.get(&site.key)) {
            note_owner(&existing, attr, owners);
            return existing;
        }
        let module = site.map(|s| &*s.key.module).unwrap_or(self.module);
        let genus = match scalar {
            Scalar::Number(_) => "Number",
            Scalar::String(_) => "String",
            Scalar::Bool(_) => "Boolean",
            Scalar::Regex(_) => "RegExp",
            Scalar::Null => "null",
            Scalar::Undefined => "undefined",
        };
        let bits = self.doc_bits(site.and_then(|s| s.doc.as_deref()), module);
        let sym = Typish::NamedValue(NamedValue {
            name: Some(attr.to_string()),
            value: Some(scalar.clone()),
            genus: genus.to_string(),
            life: LifeStory::new(Some(module), site.map(|s| s.line)),
            doc: bits.stream,
        })
        .into_sym();
        let sym = match site {
            Some(site) => self.table.claim(site.key.clone(), sym).0,
            None => sym,
        };
        note_owner(&sym, attr, owners);
        sym
    }

    fn munge_object(&self, obj: &ObjRef, attr: &str, owners: &[Sym]) -> Option<Sym> {
        let site = obj.read().site.clone();
        if let Some(existing) = site.as_ref().and_then(|site| self.table.get(&site.key)) {
            note_owner(&existing, attr, owners);
            if owners.iter().any(|owner| Arc::ptr_eq(owner, &existing)) {
                tracing::warn!(module = %self.module, attr = %attr, "recursion detected; keeping the first shape");
            }
            return Some(existing);
        }

        let module = site.as_ref().map(|s| &*s.key.module).unwrap_or(self.module).to_string();
        let line = site.as_ref().map(|s| s.line);
        let bits = self.doc_bits(site.as_ref().and_then(|s| s.doc.as_deref()), &module);

        let shape = self.shape(obj, attr, owners, site.as_ref(), &module, line, bits)?;
        let (sym, fresh) = match &site {
            Some(site) => self.table.claim(site.key.clone(), shape.sym),
            None => (shape.sym, true),
        };
        note_owner(&sym, attr, owners);
        if !fresh {
            return Some(sym);
        }

        let mut stack = owners.to_vec();
        stack.push(sym.clone());
        match (&*sym, shape.proto) {
            (Typish::Class(class), Some(proto_obj)) => {
                if let Some(members) = class.constructor.members() {
                    self.fill(members, Snapshot::of(obj), &stack, &module);
                }
                if let Some(members) = class.proto.members() {
                    self.fill(members, Snapshot::of(&proto_obj), &stack, &module);
                }
            }
            (Typish::Object(object), _) if object.kind == ObjectKind::Generic => {
                self.fill(&object.members, Snapshot::of(obj), &stack, &module);
            }
            _ => {}
        }
        Some(sym)
    }

    /// Classify an object and build its unfilled symbol.
    #[allow(clippy::too_many_arguments)]
    fn shape(
        &self,
        obj: &ObjRef,
        attr: &str,
        owners: &[Sym],
        site: Option<&SiteRef>,
        module: &str,
        line: Option<usize>,
        bits: DocBits,
    ) -> Option<Shape> {
        let kind = {
            let guard = obj.read();
            match &guard.kind {
                ObjKind::Activation => return None,
                ObjKind::Function(f) if f.native.is_some() => return None,
                ObjKind::Function(f) => Kind::Function {
                    node: f.node.clone()?,
                    proto: f.proto.clone(),
                    explicit_proto: f.explicit_proto,
                },
                ObjKind::Object => Kind::Object,
                ObjKind::List => Kind::List,
            }
        };
        match kind {
            Kind::Function {
                node,
                proto,
                explicit_proto,
            } => {
                let has_proto_stuff = explicit_proto
                    || proto.as_ref().is_some_and(|p| {
                        let p = p.read();
                        !p.data.is_empty() || !p.accessors.is_empty()
                    });

                let life = LifeStory::new(Some(module), line);
                if has_proto_stuff {
                    let name = node.name.clone().unwrap_or_else(|| attr.to_string());
                    let mut ctor = FuncSym::new(FuncKind::Constructor, Some(name.clone()), node.name.clone(), life);
                    ctor.args = bits.args.or_else(|| Some(failover_args(&node)));
                    ctor.this_desc = bits.this_desc;
                    ctor.doc = bits.stream;
                    let proto_line = proto
                        .as_ref()
                        .and_then(|p| p.read().site.as_ref().map(|s| s.line))
                        .or(line);
                    let proto_sym = ObjectSym::new(
                        ObjectKind::Prototype,
                        Some(name.clone()),
                        LifeStory::new(Some(module), proto_line),
                    );
                    let sym = Typish::Class(ClassType {
                        name,
                        constructor: Typish::Func(ctor).into_sym(),
                        proto: Typish::Object(proto_sym).into_sym(),
                    })
                    .into_sym();
                    Some(Shape { sym, proto })
                } else {
                    let kind = if owners.len() > 1 {
                        FuncKind::Method
                    } else {
                        FuncKind::Instance
                    };
                    let mut func = FuncSym::new(kind, Some(attr.to_string()), node.name.clone(), life);
                    func.args = bits.args.or_else(|| Some(failover_args(&node)));
                    func.ret = bits.ret.or_else(|| Some(failover_ret()));
                    func.this_desc = bits.this_desc;
                    func.doc = bits.stream;
                    Some(Shape {
                        sym: Typish::Func(func).into_sym(),
                        proto: None,
                    })
                }
            }
            Kind::Object => {
                if let Some(protocol) = bits.protocol {
                    return Some(Shape {
                        sym: with_doc(&protocol, bits.stream),
                        proto: None,
                    });
                }
                let name = match site.map(|s| s.key.anchor) {
                    Some(Anchor::Exports) => "exports".to_string(),
                    _ => attr.to_string(),
                };
                let mut object = ObjectSym::new(ObjectKind::Generic, Some(name), LifeStory::new(Some(module), line));
                object.doc = bits.stream;
                Some(Shape {
                    sym: Typish::Object(object).into_sym(),
                    proto: None,
                })
            }
            Kind::List => {
                let sym = Typish::NamedValue(NamedValue {
                    name: Some(attr.to_string()),
                    value: None,
                    genus: "Array".to_string(),
                    life: LifeStory::new(Some(module), line),
                    doc: bits.stream,
                })
                .into_sym();
                Some(Shape { sym, proto: None })
            }
        }
    }

    /// Munge every property of a snapshot into `members`.
    fn fill(&self, members: &RwLock<Members>, snap: Snapshot, owners: &[Sym], module: &str) {
        let Some(container) = owners.last().cloned() else {
            return;
        };
        for (key, child) in &snap.data {
            let Some(sym) = self.munge(child, key, owners) else {
                continue;
            };
            let group = snap.group_of(key);
            members
                .write()
                .file(key, sym, group.as_ref().map(|(name, doc)| (name.as_str(), doc)));
        }
        for (key, accessor) in &snap.accessors {
            if members.read().get(key).is_some() {
                continue;
            }
            let property = self.property(key, accessor, &container, module);
            let group = snap.group_of(key);
            members
                .write()
                .file(key, property, group.as_ref().map(|(name, doc)| (name.as_str(), doc)));
        }
    }

    /// A getter/setter pair as a typed property.
    fn property(&self, name: &str, accessor: &Accessor, container: &Sym, module: &str) -> Sym {
        let getter = accessor
            .getter
            .as_ref()
            .map(|f| self.accessor_func(name, f, container, module));
        let setter = accessor
            .setter
            .as_ref()
            .map(|f| self.accessor_func(name, f, container, module));

        let from_setter = setter
            .as_ref()
            .and_then(|s| s.traverse_arg(ArgKey::Index(0)))
            .and_then(|arg| arg.described_type());
        let from_getter = getter
            .as_ref()
            .and_then(|g| g.as_func())
            .and_then(|g| g.ret.as_ref())
            .and_then(|ret| ret.described_type());
        let ty = from_setter
            .or(from_getter)
            .unwrap_or_else(|| Typish::type_ref("Object"));

        Typish::Descriptor(Descriptor::new(
            DescriptorKind::Property { getter, setter },
            name,
            ty,
            Vec::new(),
        ))
        .into_sym()
    }

    fn accessor_func(&self, name: &str, f: &Arc<Function>, container: &Sym, module: &str) -> Sym {
        let bits = self.doc_bits(f.doc.as_deref(), module);
        let mut func = FuncSym::new(
            FuncKind::Instance,
            Some(name.to_string()),
            Some(name.to_string()),
            LifeStory::new(Some(module), Some(f.line)),
        );
        func.args = bits.args.or_else(|| Some(failover_args(f)));
        func.ret = bits.ret.or_else(|| Some(failover_ret()));
        func.doc = bits.stream;
        let sym = Typish::Func(func).into_sym();
        note_owner(&sym, name, std::slice::from_ref(container));
        sym
    }
}

enum Kind {
    Function {
        node: Arc<Function>,
        proto: Option<ObjRef>,
        explicit_proto: bool,
    },
    Object,
    List,
}

struct Shape {
    sym: Sym,
    /// Prototype object backing a class
    proto: Option<ObjRef>,
}

fn note_owner(sym: &Sym, attr: &str, owners: &[Sym]) {
    if let (Some(life), Some(owner)) = (sym.life(), owners.last()) {
        life.note_owner(attr, owner);
    }
}

/// Every parameter, typed `Object`
fn failover_args(node: &Function) -> Sym {
    let args = node
        .params
        .iter()
        .map(|param| {
            Typish::Descriptor(Descriptor::new(
                DescriptorKind::Arg {
                    multiplicity: Multiplicity::Required,
                    default: None,
                },
                param.clone(),
                Typish::type_ref("Object"),
                Vec::new(),
            ))
            .into_sym()
        })
        .collect();
    Typish::ArgList(ArgList { args }).into_sym()
}

fn failover_ret() -> Sym {
    ret_desc(Typish::type_ref("Object"), Vec::new())
}

fn with_doc(protocol: &Sym, doc: DocStream) -> Sym {
    match &**protocol {
        Typish::Protocol(p) if p.doc.is_empty() => Typish::Protocol(Protocol {
            name: p.name.clone(),
            ty: p.ty.clone(),
            doc,
        })
        .into_sym(),
        _ => protocol.clone(),
    }
}
