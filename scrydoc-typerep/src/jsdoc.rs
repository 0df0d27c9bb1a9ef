//! Doc-comment vocabulary.
//!
//! Doc comments and type documents are at-form markup. The commands
//! defined here turn annotations such as
//!
//! ```text
//! @args[
//!   @param["url" String]{Where to fetch from.}
//!   @param["options" #:optional @dict[
//!     @key["timeout" #:default 30 Number]
//!   ]]
//! ]
//! @return[Promise]
//! ```
//!
//! into [`Typish`] values. Type arguments are "chewed": names become
//! [`TypeRef`]s that are resolved on demand, numbers become constants and
//! inline types pass through.

use crate::typish::*;
use parking_lot::RwLock;
use scrydoc_js::{parse_until_right_curly, Scalar};
use scrydoc_syntax::{
    chew, decode_flow, parse_body, Barrier, Block, BlockLevel, CommandError, CommandTable, Datum,
    ExecutionContext, Flow, Frame, Invocation, Language, LanguageRegistry, ParseNode,
    SourcePosition, Sval, SyntaxError, Vocabulary,
};
use scrydoc_types::NameMap;
use std::fmt;
use std::sync::Arc;

pub type DocStream = Vec<Flow<DocValue>>;

/// Dict frame collecting a document's typedefs by name
pub const EXPORTS_CONTEXT: &str = "exports";
/// Named value holding the [`DocRequirer`] of the document being loaded
pub const REQUIRER_VALUE: &str = "docRequirer";

const DICT_ALL: &str = "dict-all";
const GROUPS_CONTAINER: &str = "groups-container";
const DICT_GROUP: &str = "dict-group";
const LEXICAL_TYPE_SCOPE: &str = "lexicalTypeScope";

/// Loads documents named by `@requireDoc`.
pub trait DocRequirer: Send + Sync {
    /// A barrier that settles once `name`, required from the document
    /// `from`, is fully loaded.
    fn require_doc(&self, name: &str, from: &str) -> Barrier;
}

/// What doc commands produce
#[derive(Clone)]
pub enum DocValue {
    Sym(Sym),
    /// Body of a `@desc`
    Desc(Vec<Datum<DocValue>>),
    Group(Arc<Group>),
    Requirer(Arc<dyn DocRequirer>),
}

impl DocValue {
    pub fn as_sym(&self) -> Option<&Sym> {
        match self {
            DocValue::Sym(sym) => Some(sym),
            _ => None,
        }
    }
}

impl fmt::Debug for DocValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocValue::Sym(sym) => write!(f, "{:?}", sym),
            DocValue::Desc(body) => f.debug_tuple("Desc").field(body).finish(),
            DocValue::Group(group) => write!(f, "group {}", group.name),
            DocValue::Requirer(_) => f.write_str("Requirer"),
        }
    }
}

impl PartialEq for DocValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DocValue::Sym(a), DocValue::Sym(b)) => Arc::ptr_eq(a, b),
            (DocValue::Desc(a), DocValue::Desc(b)) => a == b,
            (DocValue::Group(a), DocValue::Group(b)) => Arc::ptr_eq(a, b),
            (DocValue::Requirer(a), DocValue::Requirer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl BlockLevel for DocValue {
    fn is_block_level(&self) -> bool {
        matches!(self, DocValue::Sym(sym) if matches!(**sym, Typish::Typedef(_) | Typish::Protocol(_)))
    }
}

type Handled = Result<Option<Datum<DocValue>>, CommandError>;

fn emit(sym: Sym) -> Handled {
    Ok(Some(Datum::Value(DocValue::Sym(sym))))
}

fn sym_of(datum: &Datum<DocValue>) -> Option<&Sym> {
    datum.as_value().and_then(DocValue::as_sym)
}

fn is_descriptor(sym: &Sym, pred: impl Fn(&DescriptorKind) -> bool) -> bool {
    sym.as_descriptor().is_some_and(|d| pred(&d.kind))
}

fn name_at(inv: &Invocation<DocValue>, idx: usize) -> Result<String, CommandError> {
    match inv.svals.get(idx) {
        Some(Datum::Number(n)) => Ok(n.to_string()),
        Some(datum) => datum
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| inv.invalid(format!("argument {} must be a name", idx + 1))),
        None => Err(inv.invalid(format!("missing argument {}", idx + 1))),
    }
}

fn named_value(name: Option<&str>, value: Scalar, genus: &str) -> Sym {
    Typish::NamedValue(NamedValue {
        name: name.map(str::to_string),
        value: Some(value),
        genus: genus.to_string(),
        life: LifeStory::default(),
        doc: Vec::new(),
    })
    .into_sym()
}

/// Interpret an argument as a type.
pub fn chew_type(
    inv: &Invocation<DocValue>,
    name: Option<&str>,
    datum: &Datum<DocValue>,
) -> Result<Sym, CommandError> {
    match datum {
        Datum::Text(text) | Datum::Keyword(text) | Datum::Identifier(text) => {
            Ok(Typish::type_ref(text.as_str()))
        }
        Datum::Number(n) => Ok(named_value(name, Scalar::Number(*n), "Number")),
        Datum::Value(DocValue::Sym(sym)) => Ok(sym.clone()),
        other => Err(inv.invalid(format!("Unacceptable type: {:?}", other))),
    }
}

/// Interpret an argument as a constant, falling back to a type.
pub fn chew_value(
    inv: &Invocation<DocValue>,
    name: Option<&str>,
    datum: &Datum<DocValue>,
) -> Result<Sym, CommandError> {
    match datum {
        Datum::Text(s) => Ok(named_value(name, Scalar::String(s.clone()), "String")),
        Datum::Bool(b) => Ok(named_value(name, Scalar::Bool(*b), "Boolean")),
        Datum::Number(n) => Ok(named_value(name, Scalar::Number(*n), "Number")),
        Datum::Identifier(id) if id == "true" || id == "false" => {
            Ok(named_value(name, Scalar::Bool(id == "true"), "Boolean"))
        }
        other => chew_type(inv, name, other),
    }
}

fn descriptor(kind: DescriptorKind, name: impl Into<String>, ty: Sym, doc: DocStream) -> Sym {
    Typish::Descriptor(Descriptor::new(kind, name, ty, doc)).into_sym()
}

/// `(return value)` descriptor of type `ty`
pub fn ret_desc(ty: Sym, doc: DocStream) -> Sym {
    descriptor(DescriptorKind::RetVal, "(return value)", ty, doc)
}

fn default_desc(
    inv: &Invocation<DocValue>,
    name: Option<&str>,
    datum: &Datum<DocValue>,
    doc: DocStream,
) -> Result<Sym, CommandError> {
    let value = chew_value(inv, name, datum)?;
    Ok(descriptor(DescriptorKind::ArgDefault, "(default)", value, doc))
}

/// Body text without the entries and groups that registered themselves
/// with an enclosing dict.
fn without_members(tvals: Vec<Datum<DocValue>>) -> Vec<Datum<DocValue>> {
    tvals
        .into_iter()
        .filter(|datum| match datum.as_value() {
            Some(DocValue::Group(_)) => false,
            Some(DocValue::Sym(sym)) => {
                !is_descriptor(sym, |k| matches!(k, DescriptorKind::DictEntry { .. }))
            }
            _ => true,
        })
        .collect()
}

fn desc_of(inv: &Invocation<DocValue>) -> Option<DocStream> {
    inv.svals.iter().find_map(|datum| match datum.as_value() {
        Some(DocValue::Desc(body)) => Some(decode_flow(body.clone())),
        _ => None,
    })
}

fn syms_of(frame: Frame<DocValue>) -> NameMap<Sym> {
    let map = frame.into_dict().unwrap_or_default();
    map.iter()
        .filter_map(|(key, value)| value.as_sym().map(|sym| (key.to_string(), sym.clone())))
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

fn typedef(mut inv: Invocation<DocValue>, ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let name = name_at(&inv, 0)?;
    let ty = match inv.svals.get(1) {
        Some(datum) => chew_type(&inv, Some(&name), datum)?,
        None => return Err(inv.invalid("a typedef needs a type")),
    };
    let doc = decode_flow(inv.take_tvals());
    let sym = Typish::Typedef(Typedef {
        name: name.clone(),
        ty,
        doc,
    })
    .into_sym();
    if ctx.has_named_context(EXPORTS_CONTEXT) {
        ctx.named_context_add(EXPORTS_CONTEXT, DocValue::Sym(sym.clone()), Some(&name))?;
    }
    emit(sym)
}

fn dict_pre(_name: &str, ctx: &mut ExecutionContext<DocValue>) -> Result<Option<DocValue>, CommandError> {
    ctx.push_named_context(DICT_ALL, Frame::dict());
    ctx.push_named_context(GROUPS_CONTAINER, Frame::dict());
    // the ungrouped entries
    ctx.push_named_context(DICT_GROUP, Frame::dict());
    ctx.push_named_context(LEXICAL_TYPE_SCOPE, Frame::list());
    Ok(None)
}

fn dict(mut inv: Invocation<DocValue>, ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let all = ctx.pop_named_context(DICT_ALL)?;
    let groups = ctx.pop_named_context(GROUPS_CONTAINER)?;
    let ungrouped = ctx.pop_named_context(DICT_GROUP)?;
    ctx.pop_named_context(LEXICAL_TYPE_SCOPE)?;

    let groups: Vec<Arc<Group>> = groups
        .into_dict()
        .unwrap_or_default()
        .values()
        .filter_map(|value| match value {
            DocValue::Group(group) => Some(group.clone()),
            _ => None,
        })
        .collect();
    let ungrouped = syms_of(ungrouped);

    let mut members = Members::new();
    for group in &groups {
        members.declare_group(&group.name, group.doc.clone());
    }
    for (key, sym) in syms_of(all).iter() {
        let home = if ungrouped.contains_key(key) {
            None
        } else {
            groups.iter().find(|g| g.children.contains_key(key))
        };
        members.file(key, sym.clone(), home.map(|g| (g.name.as_str(), &g.doc)));
    }

    let doc = match desc_of(&inv) {
        Some(doc) => doc,
        None => decode_flow(without_members(inv.take_tvals())),
    };
    let mut sym = ObjectSym::new(ObjectKind::Dict, None, LifeStory::default());
    sym.doc = doc;
    sym.members = RwLock::new(members);
    emit(Typish::Object(sym).into_sym())
}

fn group_pre(_name: &str, ctx: &mut ExecutionContext<DocValue>) -> Result<Option<DocValue>, CommandError> {
    ctx.push_named_context(DICT_GROUP, Frame::dict());
    Ok(None)
}

fn group(mut inv: Invocation<DocValue>, ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let children = syms_of(ctx.pop_named_context(DICT_GROUP)?);
    let name = name_at(&inv, 0)?;
    let doc = match desc_of(&inv) {
        Some(doc) => doc,
        None => decode_flow(without_members(inv.take_tvals())),
    };
    let group = Arc::new(Group {
        name: name.clone(),
        doc,
        children,
    });
    ctx.named_context_add(GROUPS_CONTAINER, DocValue::Group(group), Some(&name))?;
    Ok(None)
}

fn desc(mut inv: Invocation<DocValue>, ctx: &mut ExecutionContext<DocValue>) -> Handled {
    match ctx.parent_token()? {
        "group" | "dict" => Ok(Some(Datum::Value(DocValue::Desc(inv.take_tvals())))),
        _ => Err(inv.invalid("desc tags can only be used inside dicts/groups to describe them")),
    }
}

fn dictof(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let key = inv
        .svals
        .first()
        .and_then(sym_of)
        .filter(|sym| is_descriptor(sym, |k| matches!(k, DescriptorKind::DictKey)))
        .cloned()
        .ok_or_else(|| inv.invalid("First argument to dictof must be a @key!"))?;
    let value = inv
        .svals
        .get(1)
        .and_then(sym_of)
        .filter(|sym| is_descriptor(sym, |k| matches!(k, DescriptorKind::DictValue)))
        .cloned()
        .ok_or_else(|| inv.invalid("Second argument to dictof must be a @value!"))?;
    let doc = decode_flow(inv.take_tvals());
    emit(Typish::DictOf(DictOf { key, value, doc }).into_sym())
}

fn key(mut inv: Invocation<DocValue>, ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let name = name_at(&inv, 0)?;
    let mut idx = 1;
    let mut optional = false;
    let mut default = None;
    while let Some(Datum::Keyword(keyword)) = inv.svals.get(idx) {
        match keyword.as_str() {
            "optional" => optional = true,
            "required" => optional = false,
            "default" => {
                if let Some(datum) = inv.svals.get(idx + 1) {
                    default = Some(default_desc(&inv, Some(&name), datum, Vec::new())?);
                    idx += 1;
                }
            }
            _ => break,
        }
        idx += 1;
    }
    if let Some(sym) = inv.svals.get(idx).and_then(sym_of) {
        if is_descriptor(sym, |k| matches!(k, DescriptorKind::ArgDefault)) {
            default = Some(sym.clone());
            idx += 1;
        }
    }
    let ty = match inv.svals.get(idx) {
        Some(datum) => chew_type(&inv, Some(&name), datum)?,
        None => Typish::type_ref("String"),
    };
    let doc = decode_flow(inv.take_tvals());

    let parent = ctx.parent_token()?.to_string();
    match parent.as_str() {
        "dictof" => {
            if optional || default.is_some() {
                return Err(inv.invalid("DictOf keys should not be optional or have defaults."));
            }
            emit(descriptor(DescriptorKind::DictKey, name, ty, doc))
        }
        "dict" | "group" => {
            let entry = descriptor(DescriptorKind::DictEntry { optional, default }, name.clone(), ty, doc);
            ctx.named_context_add(DICT_ALL, DocValue::Sym(entry.clone()), Some(&name))?;
            ctx.named_context_add(DICT_GROUP, DocValue::Sym(entry.clone()), Some(&name))?;
            emit(entry)
        }
        other => Err(inv.invalid(format!("{} was not the expected parent token", other))),
    }
}

fn value(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let name = name_at(&inv, 0)?;
    let ty = match inv.svals.get(1) {
        Some(datum) => chew_type(&inv, Some(&name), datum)?,
        None => return Err(inv.invalid("a value needs a type")),
    };
    let doc = decode_flow(inv.take_tvals());
    emit(descriptor(DescriptorKind::DictValue, name, ty, doc))
}

fn list(inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let kids = inv
        .svals
        .iter()
        .map(|datum| chew_type(&inv, None, datum))
        .collect::<Result<Vec<_>, _>>()?;
    emit(Typish::List(ListType { kids }).into_sym())
}

fn listof(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let name = inv.svals.first().and_then(Datum::as_text).map(str::to_string);
    let ty = match inv.svals.get(1) {
        Some(datum) => chew_type(&inv, name.as_deref(), datum)?,
        None => Typish::type_ref("Object"),
    };
    let doc = decode_flow(inv.take_tvals());
    emit(Typish::ListOf(ListOf { name, ty, doc }).into_sym())
}

fn case_of(ty: Sym, doc: DocStream) -> Sym {
    let name = ty.display_name();
    descriptor(DescriptorKind::Case { is_default: false }, name, ty, doc)
}

fn oneof(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let mut cases = Vec::new();
    for datum in &inv.svals {
        match sym_of(datum) {
            Some(sym) if is_descriptor(sym, |k| matches!(k, DescriptorKind::Case { .. })) => {
                cases.push(sym.clone())
            }
            _ => cases.push(case_of(chew_type(&inv, None, datum)?, Vec::new())),
        }
    }
    let doc = decode_flow(inv.take_tvals());
    emit(Typish::OneOf(OneOf { cases, doc }).into_sym())
}

fn case(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let ty = match inv.svals.first() {
        Some(datum) => chew_type(&inv, None, datum)?,
        None => return Err(inv.invalid("a case needs a type")),
    };
    let doc = decode_flow(inv.take_tvals());
    emit(case_of(ty, doc))
}

fn args(inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let mut list = Vec::new();
    for datum in &inv.svals {
        match sym_of(datum) {
            Some(sym)
                if is_descriptor(sym, |k| {
                    matches!(k, DescriptorKind::Arg { .. } | DescriptorKind::VarArg { .. })
                }) =>
            {
                list.push(sym.clone())
            }
            _ => return Err(inv.invalid(format!("not an argument: {:?}", datum))),
        }
    }
    emit(Typish::ArgList(ArgList { args: list }).into_sym())
}

fn param(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let name = name_at(&inv, 0)?;
    let (multiplicity, mut idx) = match inv.svals.get(1) {
        Some(Datum::Keyword(k)) if k == "optional" => (Multiplicity::Optional, 2),
        Some(Datum::Keyword(k)) if k == "oneormore" => (Multiplicity::OneOrMore, 2),
        Some(Datum::Keyword(k)) if k == "required" => (Multiplicity::Required, 2),
        _ => (Multiplicity::Required, 1),
    };
    let mut default = None;
    if let Some(sym) = inv.svals.get(idx).and_then(sym_of) {
        if is_descriptor(sym, |k| matches!(k, DescriptorKind::ArgDefault)) {
            default = Some(sym.clone());
            idx += 1;
        }
    }
    let ty = match inv.svals.get(idx) {
        Some(datum) => chew_type(&inv, None, datum)?,
        None => Typish::type_ref("Object"),
    };
    let doc = decode_flow(inv.take_tvals());
    emit(descriptor(
        DescriptorKind::Arg {
            multiplicity,
            default,
        },
        name,
        ty,
        doc,
    ))
}

fn default(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let doc = decode_flow(inv.take_tvals());
    match inv.svals.first() {
        Some(datum) => emit(default_desc(&inv, None, datum, doc)?),
        None => Err(inv.invalid("a default needs a value")),
    }
}

fn rest(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let name = name_at(&inv, 0)?;
    let ty = match inv.svals.get(1) {
        Some(datum) => chew_type(&inv, None, datum)?,
        None => Typish::type_ref("Object"),
    };
    let doc = decode_flow(inv.take_tvals());
    emit(descriptor(DescriptorKind::VarArg { min: 0, max: None }, name, ty, doc))
}

fn returns(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let ty = match inv.svals.first() {
        Some(datum) => chew_type(&inv, None, datum)?,
        None => Typish::type_ref("undefined"),
    };
    emit(ret_desc(ty, decode_flow(inv.take_tvals())))
}

fn this(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let ty = match inv.svals.first() {
        Some(datum) => chew_type(&inv, None, datum)?,
        None => return Err(inv.invalid("this needs a type")),
    };
    let doc = decode_flow(inv.take_tvals());
    emit(descriptor(DescriptorKind::This, "this", ty, doc))
}

fn func(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let mut sym = FuncSym::new(FuncKind::Type, None, None, LifeStory::default());
    let mut extra = Vec::new();
    for datum in &inv.svals {
        match sym_of(datum) {
            Some(s) if matches!(**s, Typish::ArgList(_)) && sym.args.is_none() => {
                sym.args = Some(s.clone())
            }
            Some(s) if is_descriptor(s, |k| matches!(k, DescriptorKind::RetVal)) && sym.ret.is_none() => {
                sym.ret = Some(s.clone())
            }
            Some(s) if is_descriptor(s, |k| matches!(k, DescriptorKind::This)) && sym.this_desc.is_none() => {
                sym.this_desc = Some(s.clone())
            }
            _ => extra.push(format!("{:?}", datum)),
        }
    }
    if !extra.is_empty() {
        return Err(inv.invalid(format!(
            "func does not know what to do with extra svals: {}",
            extra.join(", ")
        )));
    }
    if sym.ret.is_none() {
        sym.ret = Some(ret_desc(Typish::type_ref("Object"), Vec::new()));
    }
    sym.doc = decode_flow(inv.take_tvals());
    emit(Typish::Func(sym).into_sym())
}

fn protocol(mut inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let name = name_at(&inv, 0)?;
    let ty = match inv.svals.get(1) {
        Some(datum) => Some(chew_type(&inv, None, datum)?),
        None => None,
    };
    let doc = decode_flow(inv.take_tvals());
    emit(Typish::Protocol(Protocol { name, ty, doc }).into_sym())
}

fn maybepromise(inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    Ok(inv.svals.into_iter().next())
}

fn swallow(_inv: Invocation<DocValue>, _ctx: &mut ExecutionContext<DocValue>) -> Handled {
    Ok(None)
}

fn require_doc(inv: Invocation<DocValue>, ctx: &mut ExecutionContext<DocValue>) -> Handled {
    let name = name_at(&inv, 0)?;
    let requirer = match ctx.lookup_named_value(REQUIRER_VALUE) {
        Some(DocValue::Requirer(requirer)) => Some(requirer.clone()),
        _ => None,
    };
    match requirer {
        Some(requirer) => {
            let barrier = requirer.require_doc(&name, &ctx.file_name);
            ctx.join(barrier);
        }
        None => {
            tracing::warn!(doc = %name, file = %ctx.file_name, "requireDoc outside of a document load")
        }
    }
    Ok(None)
}

/// Reads a script snippet up to its unbalanced `}`.
fn js_reader(
    text: &str,
    _ctx: &mut ExecutionContext<DocValue>,
    _svals: Option<&[Sval]>,
) -> Result<(ParseNode, usize), SyntaxError> {
    match parse_until_right_curly(text) {
        Ok((_, end)) => Ok((
            ParseNode::Block(Block {
                reader: "js".to_string(),
                text: text[..end].to_string(),
            }),
            end + 1,
        )),
        Err(err) => Err(SyntaxError::Reader {
            message: err.to_string(),
            position: SourcePosition::locate("<js>", text, err.span().start),
        }),
    }
}

/// Add every doc command to `table`.
pub fn register(table: &mut CommandTable<DocValue>) {
    table.add_exec("typedef", typedef);
    table.add_pre_exec("dict", dict_pre);
    table.add_exec("dict", dict);
    table.add_pre_exec("group", group_pre);
    table.add_exec("group", group);
    table.add_exec("desc", desc);
    table.add_exec("dictof", dictof);
    table.add_exec("key", key);
    table.add_exec("value", value);
    table.add_exec("list", list);
    table.add_exec("listof", listof);
    table.add_exec("oneof", oneof);
    table.add_exec("case", case);
    table.add_exec("args", args);
    table.add_exec("param", param);
    table.add_exec("default", default);
    table.add_exec("rest", rest);
    table.add_exec("return", returns);
    table.add_exec("returns", returns);
    table.add_exec("this", this);
    table.add_exec("func", func);
    table.add_exec("protocol", protocol);
    table.add_exec("maybepromise", maybepromise);
    table.add_exec("quiet", swallow);
    table.add_exec("showtypes", swallow);
    table.add_exec("requireDoc", require_doc);
}

/// The `jsdoc` langbit
pub struct JsDocVocabulary;

impl Vocabulary<DocValue> for JsDocVocabulary {
    fn name(&self) -> &str {
        "jsdoc"
    }

    fn contribute(&self, table: &mut CommandTable<DocValue>) {
        register(table);
    }
}

/// The `doc` language: plain markup with script snippets.
pub struct DocLanguage;

impl Language<DocValue> for DocLanguage {
    fn name(&self) -> &str {
        "doc"
    }

    fn contribute(&self, table: &mut CommandTable<DocValue>) {
        table.add_reader("js", js_reader);
    }
}

/// Registry knowing the `doc` language and the `jsdoc` langbit.
pub fn doc_registry() -> LanguageRegistry<DocValue> {
    let mut registry = LanguageRegistry::new();
    registry.register_language(Arc::new(DocLanguage));
    registry.register_vocabulary(Arc::new(JsDocVocabulary));
    registry
}

/// A doc comment with its signature parts pulled out
#[derive(Debug, Default)]
pub struct DocBits {
    pub args: Option<Sym>,
    pub ret: Option<Sym>,
    pub this_desc: Option<Sym>,
    pub protocol: Option<Sym>,
    pub stream: DocStream,
}

/// Read a doc comment's text with the doc vocabulary.
pub fn read_doc_comment(text: &str, file_name: &str) -> Result<DocBits, SyntaxError> {
    let mut ctx = ExecutionContext::new(file_name, text);
    DocLanguage.contribute(ctx.commands_mut());
    register(ctx.commands_mut());
    let nodes = parse_body(text, &mut ctx)?;
    let expanded = chew(&nodes, &mut ctx);
    if !ctx.take_barriers().is_empty() {
        tracing::debug!(file = %file_name, "ignoring document requirements in a doc comment");
    }
    Ok(snipe(expanded))
}

fn snipe(stream: Vec<Datum<DocValue>>) -> DocBits {
    let mut bits = DocBits::default();
    let mut rest = Vec::new();
    for datum in stream {
        if let Some(sym) = sym_of(&datum) {
            let slot = match &**sym {
                Typish::ArgList(_) => Some(&mut bits.args),
                Typish::Protocol(_) => Some(&mut bits.protocol),
                Typish::Descriptor(d) => match d.kind {
                    DescriptorKind::RetVal => Some(&mut bits.ret),
                    DescriptorKind::This => Some(&mut bits.this_desc),
                    _ => None,
                },
                _ => None,
            };
            if let Some(slot) = slot {
                if slot.is_none() {
                    *slot = Some(sym.clone());
                    continue;
                }
            }
        }
        rest.push(datum);
    }
    bits.stream = decode_flow(rest);
    bits
}
