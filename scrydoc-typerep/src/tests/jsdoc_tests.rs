use crate::*;
use scrydoc_syntax::{parse_document_with, Barrier, Datum, Flow, Frame, LoadOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn read(text: &str) -> DocBits {
    read_doc_comment(text, "test.js").unwrap()
}

/// Every symbol left in the doc stream, in order
fn syms(bits: &DocBits) -> Vec<Sym> {
    bits.stream
        .iter()
        .flat_map(|flow| match flow {
            Flow::Para(items) => items.iter().collect::<Vec<_>>(),
            Flow::Block(datum) => vec![datum],
        })
        .filter_map(|datum| datum.as_value().and_then(DocValue::as_sym).cloned())
        .collect()
}

fn only_sym(text: &str) -> Sym {
    let found = syms(&read(text));
    assert_eq!(found.len(), 1, "expected one symbol in {found:?}");
    found[0].clone()
}

fn plain(doc: &[Flow<DocValue>]) -> String {
    doc.iter().map(Flow::plain_text).collect()
}

#[test]
fn test_optional_dict_key() {
    let dict = only_sym("@dict[@key[\"x\" #:optional]{desc}]");
    assert_eq!(dict.kind(), "dict");

    let members = dict.members().unwrap().read();
    let entry = members.get("x").unwrap();
    let desc = entry.as_descriptor().unwrap();
    assert!(matches!(
        desc.kind,
        DescriptorKind::DictEntry {
            optional: true,
            default: None
        }
    ));
    assert_eq!(desc.ty.name(), Some("String"));
    assert_eq!(plain(&desc.doc), "desc");
    assert!(Arc::ptr_eq(&members.ungrouped().get("x").cloned().unwrap(), &entry));
    assert!(members.is_partitioned());
}

#[test]
fn test_dict_groups_partition_entries() {
    let dict = only_sym(
        "@dict{Options for a fetch.\n\
         @key[\"a\" Number]\n\
         @group[\"Timing\"]{How long to wait. @key[\"b\" #:default 30 Number] @key[\"c\"]}\n\
         @key[\"d\" Boolean]}",
    );
    let members = dict.members().unwrap().read();
    assert_eq!(members.children().keys().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
    assert_eq!(members.ungrouped().keys().collect::<Vec<_>>(), vec!["a", "d"]);

    let timing = members.groups().get("Timing").unwrap();
    assert_eq!(timing.children.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    assert!(plain(&timing.doc).starts_with("How long to wait."));
    assert!(members.is_partitioned());

    let b = members.get("b").unwrap();
    let DescriptorKind::DictEntry { optional, default } = &b.as_descriptor().unwrap().kind else {
        panic!("expected a dict entry");
    };
    assert!(!optional);
    let value = default.as_ref().unwrap().described_type().unwrap();
    let Typish::NamedValue(constant) = &*value else {
        panic!("expected a constant");
    };
    assert_eq!(constant.genus, "Number");

    assert!(plain(dict.doc()).starts_with("Options for a fetch."));
}

#[test]
fn test_desc_describes_dict() {
    let dict = only_sym("@dict[@desc{The point.} @key[\"x\" Number] @key[\"y\" Number]]");
    assert_eq!(plain(dict.doc()), "The point.");
    assert_eq!(dict.members().unwrap().read().len(), 2);

    // outside a dict the desc fails and nothing is produced
    assert!(syms(&read("@desc{Lost.}")).is_empty());
}

#[test]
fn test_dictof() {
    let dictof = only_sym("@dictof[@key[\"name\"] @value[\"count\" Number]]{Counts by name.}");
    assert_eq!(dictof.kind(), "dictof");
    let value = dictof
        .traverse_child("anything", Some(TraverseMode::Value))
        .unwrap();
    assert_eq!(value.kind(), "dictvalue");
    assert_eq!(value.described_type().unwrap().name(), Some("Number"));
    assert_eq!(dictof.traverse_child("anything", None).unwrap().kind(), "dictkey");
    assert_eq!(plain(dictof.doc()), "Counts by name.");
}

#[test]
fn test_dictof_rejects_bad_keys() {
    assert!(syms(&read("@dictof[@key[\"name\" #:optional] @value[\"v\" Number]]")).is_empty());
    assert!(syms(&read("@dictof[@value[\"v\" Number] @key[\"name\"]]")).is_empty());
    assert!(syms(&read("@dictof[@key[\"name\"]]")).is_empty());
}

#[test]
fn test_key_needs_a_dict() {
    assert!(syms(&read("@key[\"x\"]")).is_empty());
    let list = only_sym("@list[@key[\"x\"]]");
    assert!(list.traverse_arg(ArgKey::Index(0)).is_none());
}

#[test]
fn test_signature_is_sniped() {
    let bits = read(
        "Fetches things.\n\
         @args[@param[\"url\" String]{Where from.} @param[\"opts\" #:optional Object] @rest[\"more\"]]\n\
         @return[Boolean]{Whether it worked.}\n\
         @this[Fetcher]",
    );
    let args = bits.args.unwrap();
    assert_eq!(args.kind(), "arglist");
    let opts = args.traverse_arg(ArgKey::Name("opts")).unwrap();
    assert!(matches!(
        opts.as_descriptor().unwrap().kind,
        DescriptorKind::Arg {
            multiplicity: Multiplicity::Optional,
            ..
        }
    ));
    let url = args.traverse_arg(ArgKey::Index(0)).unwrap();
    assert_eq!(plain(url.doc()), "Where from.");
    assert_eq!(args.traverse_arg(ArgKey::Index(2)).unwrap().kind(), "vararg");

    let ret = bits.ret.unwrap();
    assert_eq!(ret.name(), Some("(return value)"));
    assert_eq!(ret.described_type().unwrap().name(), Some("Boolean"));
    assert_eq!(bits.this_desc.unwrap().described_type().unwrap().name(), Some("Fetcher"));
    assert!(plain(&bits.stream).starts_with("Fetches things."));
    assert!(syms(&bits).is_empty());
}

#[test]
fn test_bare_returns_is_undefined() {
    let bits = read("@returns");
    assert_eq!(bits.ret.unwrap().described_type().unwrap().name(), Some("undefined"));
}

#[test]
fn test_param_default() {
    let bits = read("@args[@param[\"n\" @default[5]{Five.} Number]]");
    let n = bits.args.unwrap().traverse_arg(ArgKey::Index(0)).unwrap();
    let DescriptorKind::Arg { default, .. } = &n.as_descriptor().unwrap().kind else {
        panic!("expected an arg");
    };
    let default = default.as_ref().unwrap();
    assert_eq!(default.kind(), "default");
    assert_eq!(plain(default.doc()), "Five.");
    let Typish::NamedValue(value) = &*default.described_type().unwrap() else {
        panic!("expected a constant");
    };
    assert!(matches!(value.value, Some(scrydoc_js::Scalar::Number(n)) if n == 5.0));
}

#[test]
fn test_func_type() {
    let func = only_sym("@func[@args[@param[\"x\"]]]{A callback.}");
    assert_eq!(func.kind(), "functype");
    let f = func.as_func().unwrap();
    assert_eq!(f.ret.as_ref().unwrap().described_type().unwrap().name(), Some("Object"));
    assert_eq!(func.traverse_arg(ArgKey::Name("x")).unwrap().kind(), "arg");
    assert_eq!(plain(func.doc()), "A callback.");

    // an sval it does not understand drops the whole func
    assert!(syms(&read("@func[@args[] \"stray\"]")).is_empty());
}

#[test]
fn test_lists_and_oneofs() {
    let list = only_sym("@list[Number String]");
    assert_eq!(list.kind(), "list");
    assert_eq!(
        list.traverse_arg(ArgKey::Index(1)).unwrap().name(),
        Some("String")
    );

    let listof = only_sym("@listof[\"names\" String]");
    assert_eq!(listof.name(), Some("names"));
    assert_eq!(listof.traverse_child("0", None).unwrap().name(), Some("String"));

    let oneof = only_sym("@oneof[Number @case[String]{A name.}]");
    let Typish::OneOf(o) = &*oneof else {
        panic!("expected a oneof");
    };
    assert_eq!(o.cases.len(), 2);
    assert_eq!(o.cases[0].name(), Some("Number"));
    assert_eq!(plain(o.cases[1].doc()), "A name.");
}

#[test]
fn test_swallowed_and_passthrough_commands() {
    assert!(syms(&read("@quiet[] @showtypes[]")).is_empty());
    let ty = only_sym("@maybepromise[@list[Number]]");
    assert_eq!(ty.kind(), "list");
}

#[test]
fn test_protocol_is_sniped() {
    let bits = read("@protocol[\"Thenable\"]{Has a then.}");
    let protocol = bits.protocol.unwrap();
    assert_eq!(protocol.kind(), "protocol");
    assert_eq!(plain(protocol.doc()), "Has a then.");
}

struct CountingRequirer {
    calls: AtomicUsize,
}

impl DocRequirer for CountingRequirer {
    fn require_doc(&self, name: &str, from: &str) -> Barrier {
        assert_eq!(name, "./other");
        assert_eq!(from, "pkg/typedocs/types.scry");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

#[tokio::test]
async fn test_typedefs_register_with_document() {
    let requirer = Arc::new(CountingRequirer {
        calls: AtomicUsize::new(0),
    });
    let text = "#lang doc jsdoc\n\
                @requireDoc[\"./other\"]\n\
                @typedef[\"Point\" @dict[@key[\"x\" Number]]]{A point.}\n\
                \n\
                Trailing words.";
    let shared: Arc<dyn DocRequirer> = requirer.clone();
    let mut document = parse_document_with(
        &doc_registry(),
        text,
        Some("pkg/typedocs/types.scry"),
        &LoadOptions::default(),
        |ctx| {
            ctx.push_named_context(EXPORTS_CONTEXT, Frame::dict());
            ctx.push_named_value(REQUIRER_VALUE, DocValue::Requirer(shared));
        },
    )
    .await
    .unwrap();

    assert_eq!(requirer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(document.language, "doc");

    let exports = document
        .ctx
        .pop_named_context(EXPORTS_CONTEXT)
        .unwrap()
        .into_dict()
        .unwrap();
    let point = exports.get("Point").and_then(DocValue::as_sym).unwrap().clone();
    assert_eq!(point.kind(), "typedef");
    assert!(point.traverse_child("x", None).is_some());

    // typedefs stand as blocks of their own
    assert!(document
        .stream
        .iter()
        .any(|flow| matches!(flow, Flow::Block(Datum::Value(DocValue::Sym(s))) if Arc::ptr_eq(s, &point))));
    assert!(document
        .stream
        .iter()
        .any(|flow| flow.plain_text().contains("Trailing words.")));
}

#[tokio::test]
async fn test_js_reader_keeps_snippets() {
    let text = "#lang doc jsdoc\n@js{ var x = {a: 1}; }\n\nAfter.";
    let document = parse_document_with(
        &doc_registry(),
        text,
        Some("notes.scry"),
        &LoadOptions::default(),
        |_| {},
    )
    .await
    .unwrap();
    let snippet = document.stream.iter().find_map(|flow| match flow {
        Flow::Block(Datum::Block(block)) => Some(block.clone()),
        Flow::Para(items) => items.iter().find_map(|d| match d {
            Datum::Block(block) => Some(block.clone()),
            _ => None,
        }),
        _ => None,
    });
    let snippet = snippet.unwrap();
    assert_eq!(snippet.reader, "js");
    assert_eq!(snippet.text, " var x = {a: 1}; ");
}

#[test]
fn test_requirement_without_requirer_is_ignored() {
    let bits = read("@requireDoc[\"./elsewhere\"] Still here.");
    assert_eq!(plain(&bits.stream).trim(), "Still here.");
}
