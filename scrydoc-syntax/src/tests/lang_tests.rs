use crate::*;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct Val;

impl BlockLevel for Val {}

struct PlainLang;

impl Language<Val> for PlainLang {
    fn name(&self) -> &str {
        "plain"
    }
}

struct Shouty;

impl Vocabulary<Val> for Shouty {
    fn name(&self) -> &str {
        "shouty"
    }

    fn contribute(&self, table: &mut CommandTable<Val>) {
        table.add_exec("up", |inv, _ctx| {
            let text: String = inv
                .tvals
                .unwrap_or_default()
                .iter()
                .filter_map(Datum::as_text)
                .collect();
            Ok(Some(Datum::Text(text.to_uppercase())))
        });
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["quiet".to_string()]
    }
}

struct Quiet;

impl Vocabulary<Val> for Quiet {
    fn name(&self) -> &str {
        "quiet"
    }

    fn contribute(&self, table: &mut CommandTable<Val>) {
        table.add_exec("hush", |_inv, _ctx| Ok(None));
    }
}

fn registry() -> LanguageRegistry<Val> {
    let mut registry = LanguageRegistry::new();
    registry.register_language(Arc::new(PlainLang));
    registry.register_vocabulary(Arc::new(Shouty));
    registry.register_vocabulary(Arc::new(Quiet));
    registry
}

#[test]
fn test_parse_lang_line() {
    let line = parse_lang_line("#lang doc jsdoc  extra\nbody").unwrap();
    assert_eq!(line.language, "doc");
    assert_eq!(line.langbits, vec!["jsdoc", "extra"]);
    assert_eq!(line.len, 23);

    let bare = parse_lang_line("#lang doc\n").unwrap();
    assert!(bare.langbits.is_empty());

    assert!(matches!(parse_lang_line("#lang doc"), Err(SyntaxError::NoNewline)));
    assert!(matches!(
        parse_lang_line("#language doc\n"),
        Err(SyntaxError::BadLangLine(_))
    ));
}

#[test]
fn test_doc_type_from_path() {
    assert_eq!(DocType::from_path("pkg/typedocs/types.scry"), DocType::Markup);
    assert_eq!(DocType::from_path("README.md"), DocType::Plain);
    assert_eq!(DocType::from_path("noext"), DocType::Plain);
}

#[tokio::test]
async fn test_parse_document_phases() {
    let doc = "#lang plain shouty\nhello @up{there}@hush{}\n\nbye";
    let document = parse_document(&registry(), doc, Some("doc.scry"), &LoadOptions::default())
        .await
        .unwrap();

    assert_eq!(document.language, "plain");
    assert_eq!(document.langbits, vec!["shouty"]);
    assert_eq!(
        document.stream,
        vec![
            Flow::Para(vec![Datum::Text("hello ".into()), Datum::Text("THERE".into())]),
            Flow::Para(vec![Datum::Text("bye".into())]),
        ]
    );
    // dependencies came along
    assert!(document.ctx.commands().has_exec("hush"));
}

#[tokio::test]
async fn test_parse_document_language_selection() {
    let registry = registry();

    let plain = LoadOptions {
        lang: Some("plain".into()),
        ..Default::default()
    };
    let document = parse_document(&registry, "just text", Some("notes.txt"), &plain)
        .await
        .unwrap();
    assert_eq!(document.stream.len(), 1);

    let err = parse_document(&registry, "just text", Some("notes.txt"), &LoadOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, CommandError::Syntax(SyntaxError::NoLanguage)));

    let forced = LoadOptions {
        force_lang: Some("plain".into()),
        ..Default::default()
    };
    let document = parse_document(&registry, "#lang other\nx", Some("a.scry"), &forced)
        .await
        .unwrap();
    assert_eq!(document.language, "plain");
    assert_eq!(document.detected_language, "other");

    let err = parse_document(&registry, "#lang plain nope\nx", Some("a.scry"), &LoadOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        CommandError::Syntax(SyntaxError::UnknownVocabulary(_))
    ));
}

#[tokio::test]
async fn test_parse_document_errors_are_absolute() {
    let doc = "#lang plain\nfine\n@up{never";
    let err = parse_document(&registry(), doc, Some("bad.scry"), &LoadOptions::default())
        .await
        .err()
        .unwrap();
    match err {
        CommandError::Syntax(err) => {
            let position = err.position().unwrap();
            assert_eq!(position.file_name, "bad.scry");
            assert_eq!(position.line, 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
}
