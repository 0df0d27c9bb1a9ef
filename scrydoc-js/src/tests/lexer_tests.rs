use crate::*;

fn kinds(source: &str) -> Vec<Token> {
    tokenize(source)
        .unwrap()
        .into_iter()
        .map(|t| t.token)
        .collect()
}

#[test]
fn test_simple_declaration() {
    assert_eq!(
        kinds("var a = 1;"),
        vec![
            Token::Var,
            Token::Identifier("a".to_string()),
            Token::Eq,
            Token::Number(1.0),
            Token::Semicolon,
            Token::Eof,
        ]
    );
}

#[test]
fn test_numbers_and_strings() {
    assert_eq!(
        kinds(r#"0x10 .5 'it\'s' "a\nb""#),
        vec![
            Token::Number(16.0),
            Token::Number(0.5),
            Token::String("it's".to_string()),
            Token::String("a\nb".to_string()),
            Token::Eof,
        ]
    );
}

#[test]
fn test_operators_prefer_longest() {
    assert_eq!(
        kinds("a >>>= b !== c"),
        vec![
            Token::Identifier("a".to_string()),
            Token::UShrEq,
            Token::Identifier("b".to_string()),
            Token::NotEqEq,
            Token::Identifier("c".to_string()),
            Token::Eof,
        ]
    );
}

#[test]
fn test_doc_comment_attaches_to_next_token() {
    let tokens = tokenize("/**\n * Hello there.\n */\nvar x;").unwrap();
    let doc = tokens[0].doc.as_ref().expect("doc on var");
    assert_eq!(doc.text, "Hello there.");
    assert!(!doc.standalone);
    assert!(tokens[1].doc.is_none());
}

#[test]
fn test_plain_block_comment_is_not_doc() {
    let tokens = tokenize("/* nope */ var x;").unwrap();
    assert!(tokens[0].doc.is_none());
}

#[test]
fn test_standalone_doc_is_collected() {
    let mut lexer = Lexer::new("/**\n * The file.\n **/\nvar x;");
    let first = lexer.next_token().unwrap();
    assert_eq!(first.token, Token::Var);
    assert!(first.doc.is_none());
    let docs = lexer.take_standalone_docs();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].text, "The file.");
    assert!(docs[0].standalone);
}

#[test]
fn test_newline_before_and_lines() {
    let tokens = tokenize("a\n// note\nb c").unwrap();
    assert!(!tokens[0].newline_before);
    assert!(tokens[1].newline_before);
    assert_eq!(tokens[1].line, 3);
    assert!(!tokens[2].newline_before);
}

#[test]
fn test_group_markers() {
    let source = r#"{
  plain: 0,

  //////////////////////////////
  // A

  aNum: 0,

  //////////////////////////////
  // B
  //
  // BDescription

  bNum: 1,

  //////////////////////////////

  after: true
}"#;
    let tokens = tokenize(source).unwrap();
    let find = |name: &str| {
        tokens
            .iter()
            .find(|t| t.token == Token::Identifier(name.to_string()))
            .unwrap()
    };

    assert!(find("plain").group.is_none());

    let a = find("aNum").group.as_ref().unwrap();
    assert_eq!(a.name.as_deref(), Some("A"));
    assert_eq!(a.description, "");

    let b = find("bNum").group.as_ref().unwrap();
    assert_eq!(b.name.as_deref(), Some("B"));
    assert_eq!(b.description, "BDescription");

    let end = find("after").group.as_ref().unwrap();
    assert_eq!(end.name, None);
}

#[test]
fn test_boxed_header_marker() {
    let source = "//////////\n// Boxed\n//////////\nx";
    let tokens = tokenize(source).unwrap();
    let group = tokens[0].group.as_ref().unwrap();
    assert_eq!(group.name.as_deref(), Some("Boxed"));
}

#[test]
fn test_regex_rescan() {
    let source = "/a[/]b\\//gi; x";
    let mut lexer = Lexer::new(source);
    let slash = lexer.next_token().unwrap();
    assert_eq!(slash.token, Token::Slash);
    let regex = lexer.rescan_regex(0, &slash).unwrap();
    assert_eq!(
        regex.token,
        Token::Regex {
            pattern: "a[/]b\\/".to_string(),
            flags: "gi".to_string(),
        }
    );
    assert_eq!(lexer.next_token().unwrap().token, Token::Semicolon);
    assert_eq!(
        lexer.next_token().unwrap().token,
        Token::Identifier("x".to_string())
    );
}

#[test]
fn test_unterminated_regex() {
    let mut lexer = Lexer::new("/abc\n");
    let slash = lexer.next_token().unwrap();
    let err = lexer.rescan_regex(0, &slash).unwrap_err();
    assert!(matches!(err, ParseError::Lexer { .. }));
    assert!(err.to_string().contains("Unterminated regular expression"));
}

#[test]
fn test_unexpected_character() {
    let err = tokenize("var # = 1").unwrap_err();
    assert_eq!(err.span(), Span::new(4, 5));
}

#[test]
fn test_unescape() {
    assert_eq!(lexer::unescape(r"\x41B\t").as_deref(), Some("AB\t"));
    assert_eq!(lexer::unescape("line\\\ncontinued").as_deref(), Some("linecontinued"));
}
