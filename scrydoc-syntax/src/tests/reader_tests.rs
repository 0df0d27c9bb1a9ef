use crate::*;

fn ctx(contents: &str) -> ExecutionContext<()> {
    ExecutionContext::new("test input", contents)
}

fn text(s: &str) -> ParseNode {
    ParseNode::Text(s.to_string())
}

fn cmd(name: Option<&str>, svals: Option<Vec<Sval>>, body: Option<Vec<ParseNode>>) -> ParseNode {
    ParseNode::Command(Command {
        name: name.map(str::to_string),
        svals,
        body,
    })
}

fn parse(s: &str) -> Vec<ParseNode> {
    let mut ctx = ctx(s);
    let nodes = parse_body(s, &mut ctx).unwrap();
    assert_eq!(ctx.token_depth(), 0, "token stack unbalanced for {s:?}");
    nodes
}

#[test]
fn test_alt_syntax_mirror() {
    let cases = [
        ("|{", "}|"),
        ("|<<<{", "}>>>|"),
        ("|({", "})|"),
        ("|[[{", "}]]|"),
        ("|<>({", "})<>|"),
        ("|([{", "}])|"),
        ("([{", "}])"),
    ];
    for (left, right) in cases {
        assert_eq!(alt_syntax_mirror(left), right, "mirroring {left}");
        assert_eq!(alt_syntax_mirror(right), left, "mirroring back {right}");
    }
}

#[test]
fn test_nested_comment_walker() {
    let cases: [(&str, usize, usize); 5] = [
        ("@;{;}", 0, 0),
        ("@;{foo;}", 0, 0),
        ("  @;{foo;}  ", 2, 2),
        ("x@;{@;{;};}x", 1, 1),
        ("x@;{@;{@;{;}@;{;};};}x", 1, 1),
    ];
    for (s, idx, short) in cases {
        assert_eq!(nested_comment_walker(s, idx), Some(s.len() - short), "walking {s}");
    }
}

#[test]
fn test_nested_comment_unterminated() {
    assert_eq!(nested_comment_walker("@;{ { }", 0), None);

    let doc = "a @;{ oops {} ";
    let err = parse_body(doc, &mut ctx(doc)).unwrap_err();
    assert!(err.to_string().contains("mismatched nested comment"));
}

#[test]
fn test_sexpr_atoms() {
    let cases: Vec<(&str, Vec<Sval>)> = vec![
        ("", vec![]),
        ("0", vec![Sval::Number(0.0)]),
        (" 0 ", vec![Sval::Number(0.0)]),
        (
            "0 1 2",
            vec![Sval::Number(0.0), Sval::Number(1.0), Sval::Number(2.0)],
        ),
        ("-1.5", vec![Sval::Number(-1.5)]),
        ("\"foo\"", vec![Sval::String("foo".into())]),
        (
            "\"foo\" \"bar\"",
            vec![Sval::String("foo".into()), Sval::String("bar".into())],
        ),
        ("\"foo bar\"", vec![Sval::String("foo bar".into())]),
        ("\"a\\\"b\\n\"", vec![Sval::String("a\"b\n".into())]),
        (
            "#t #f #t",
            vec![Sval::Bool(true), Sval::Bool(false), Sval::Bool(true)],
        ),
        (
            "#:a #:foo #:bar",
            vec![
                Sval::Keyword("a".into()),
                Sval::Keyword("foo".into()),
                Sval::Keyword("bar".into()),
            ],
        ),
        (
            "foo Bar",
            vec![Sval::Identifier("foo".into()), Sval::Identifier("Bar".into())],
        ),
    ];
    for (input, expected) in cases {
        let (vals, used) = sexpr_parser(input, &mut ctx(input), false).unwrap();
        assert_eq!(vals, expected, "parsing {input:?}");
        assert_eq!(used, input.len());
    }
}

#[test]
fn test_sexpr_bracketed_stops_after_close() {
    let s = "1 #:x] tail";
    let (vals, used) = sexpr_parser(s, &mut ctx(s), true).unwrap();
    assert_eq!(vals, vec![Sval::Number(1.0), Sval::Keyword("x".into())]);
    assert_eq!(&s[used..], " tail");
}

#[test]
fn test_sexpr_errors() {
    let s = "@foo[#x]";
    let err = parse_body(s, &mut ctx(s)).unwrap_err();
    assert!(err.to_string().contains("Unsupported hashy syntax thing: #x"));

    let s = "@foo[1 2";
    assert!(parse_body(s, &mut ctx(s)).is_err());

    let s = "@foo[\"never closed]";
    let err = parse_body(s, &mut ctx(s)).unwrap_err();
    assert!(err.to_string().contains("Unterminated string"));

    let s = "1 ]";
    assert!(sexpr_parser(s, &mut ctx(s), false).is_err());
}

#[test]
fn test_at_breaker_basics() {
    assert_eq!(parse("foo"), vec![text("foo")]);
    assert_eq!(parse("@foo"), vec![cmd(Some("foo"), None, None)]);
    assert_eq!(
        parse("@[\"foo\"]"),
        vec![cmd(None, Some(vec![Sval::String("foo".into())]), None)]
    );
    assert_eq!(parse("@{foo}"), vec![cmd(None, None, Some(vec![text("foo")]))]);
    assert_eq!(
        parse("@foo[0]"),
        vec![cmd(Some("foo"), Some(vec![Sval::Number(0.0)]), None)]
    );
    assert_eq!(
        parse("@foo{baz}"),
        vec![cmd(Some("foo"), None, Some(vec![text("baz")]))]
    );
    assert_eq!(
        parse("@[5 5]{baz}"),
        vec![cmd(
            None,
            Some(vec![Sval::Number(5.0), Sval::Number(5.0)]),
            Some(vec![text("baz")])
        )]
    );
    assert_eq!(
        parse("@foo[\"bar\"]{baz}"),
        vec![cmd(
            Some("foo"),
            Some(vec![Sval::String("bar".into())]),
            Some(vec![text("baz")])
        )]
    );
    assert_eq!(
        parse("@foo[]{}"),
        vec![cmd(Some("foo"), Some(vec![]), Some(vec![]))]
    );
}

#[test]
fn test_at_breaker_sequences() {
    assert_eq!(
        parse("foo @bar baz"),
        vec![text("foo "), cmd(Some("bar"), None, None), text(" baz")]
    );
    assert_eq!(
        parse("@foo bar @baz"),
        vec![
            cmd(Some("foo"), None, None),
            text(" bar "),
            cmd(Some("baz"), None, None)
        ]
    );
}

#[test]
fn test_at_breaker_bodies() {
    assert_eq!(
        parse("@foo{ bar }"),
        vec![cmd(Some("foo"), None, Some(vec![text(" bar ")]))]
    );
    assert_eq!(
        parse("@foo{{}}"),
        vec![cmd(Some("foo"), None, Some(vec![text("{}")]))]
    );
    assert_eq!(
        parse("@foo{{{}{}}{}}"),
        vec![cmd(Some("foo"), None, Some(vec![text("{{}{}}{}")]))]
    );
}

#[test]
fn test_at_breaker_string_escapes() {
    assert_eq!(parse("@\"foo\""), vec![text("foo")]);
    assert_eq!(parse("@\"foo\" @\"bar\""), vec![text("foo bar")]);
    assert_eq!(parse("foo@\"@\"bar.com"), vec![text("foo@bar.com")]);
    assert_eq!(
        parse("@foo{@\"{\" what what}"),
        vec![cmd(Some("foo"), None, Some(vec![text("{ what what")]))]
    );
}

#[test]
fn test_at_breaker_alt_syntax() {
    assert_eq!(
        parse("@foo|{{{{}|"),
        vec![cmd(Some("foo"), None, Some(vec![text("{{{")]))]
    );
    assert_eq!(
        parse("@foo|<<{}>>|"),
        vec![cmd(Some("foo"), None, Some(vec![]))]
    );
    assert_eq!(
        parse("@foo|<<{@bar @[baz]}>>|"),
        vec![cmd(Some("foo"), None, Some(vec![text("@bar @[baz]")]))]
    );
    assert_eq!(
        parse("@foo|<<{|<<@bar |<<@[#t]}>>|"),
        vec![cmd(
            Some("foo"),
            None,
            Some(vec![
                cmd(Some("bar"), None, None),
                text(" "),
                cmd(None, Some(vec![Sval::Bool(true)]), None),
            ])
        )]
    );
    // only the exact delimiters nest
    assert_eq!(
        parse("@foo|({a|({b})|c})|"),
        vec![cmd(Some("foo"), None, Some(vec![text("a|({b})|c")]))]
    );
}

#[test]
fn test_at_breaker_expression_escape() {
    assert_eq!(
        parse("@|foo|"),
        vec![cmd(None, Some(vec![Sval::Identifier("foo".into())]), None)]
    );
    assert_eq!(
        parse("@{foo @|bar|}"),
        vec![cmd(
            None,
            None,
            Some(vec![
                text("foo "),
                cmd(None, Some(vec![Sval::Identifier("bar".into())]), None),
            ])
        )]
    );
    assert_eq!(
        parse("@foo{bar@|baz|bog}"),
        vec![cmd(
            Some("foo"),
            None,
            Some(vec![
                text("bar"),
                cmd(None, Some(vec![Sval::Identifier("baz".into())]), None),
                text("bog"),
            ])
        )]
    );
}

#[test]
fn test_at_breaker_comments() {
    assert_eq!(parse("foo @;{ blah } baz"), vec![text("foo  baz")]);
    assert_eq!(parse("foo @;{ {blah} {} } baz"), vec![text("foo  baz")]);
    assert_eq!(parse("foo @;\nbar"), vec![text("foo bar")]);
    assert_eq!(parse("foo @; blah blah blah\nbar"), vec![text("foo bar")]);
    assert_eq!(parse("foo @;\n  \t bar"), vec![text("foo bar")]);
    assert_eq!(parse("foo @; trailing"), vec![text("foo ")]);
}

#[test]
fn test_at_forms_inside_sexprs() {
    assert_eq!(
        parse("@foo[@{bar}   5\n  @{baz}]"),
        vec![cmd(
            Some("foo"),
            Some(vec![
                Sval::Command(Command {
                    name: None,
                    svals: None,
                    body: Some(vec![text("bar")]),
                }),
                Sval::Number(5.0),
                Sval::Command(Command {
                    name: None,
                    svals: None,
                    body: Some(vec![text("baz")]),
                }),
            ]),
            None
        )]
    );
    assert_eq!(
        parse("@oneof[@[1 2] @key[x]]"),
        vec![cmd(
            Some("oneof"),
            Some(vec![
                Sval::List(vec![Sval::Number(1.0), Sval::Number(2.0)]),
                Sval::Command(Command::named("key").with_svals(vec![Sval::Identifier("x".into())])),
            ]),
            None
        )]
    );
}

#[test]
fn test_unterminated_body_reports_position() {
    let doc = "line one\n@foo{unterminated";
    let err = parse_body(doc, &mut ctx(doc)).unwrap_err();
    let position = err.position().unwrap();
    assert_eq!(position.line, 2);
    assert_eq!(position.column, Some(6));
    assert_eq!(position.source_lines.len(), 2);
    insta::assert_snapshot!(err.to_string(), @"Non-terminating recursive context (test input:2)");

    let rendered = ErrorContext::new(&err).to_string();
    assert_eq!(
        rendered,
        "Error in test input at line 2, column 6:\n  Non-terminating recursive context (test input:2)\n\n  @foo{unterminated\n       ^\n"
    );
}

#[test]
fn test_positions_after_lang_offset() {
    let doc = "#lang doc\nok @a{b}\n@c{";
    let mut ctx = ctx(doc);
    ctx.bump_unconsumed_index(10);
    let err = parse_body(&doc[10..], &mut ctx).unwrap_err();
    assert_eq!(err.position().unwrap().line, 3);
}

#[test]
fn test_reader_function_consumes_raw_text() {
    let doc = "a @raw{x @y} b";
    let mut ctx = ctx(doc);
    ctx.commands_mut().add_reader("raw", |s, _ctx, _svals| {
        let end = s.find('}').unwrap_or(s.len());
        Ok((
            ParseNode::Block(Block {
                reader: "raw".into(),
                text: s[..end].to_string(),
            }),
            end + 1,
        ))
    });
    let nodes = parse_body(doc, &mut ctx).unwrap();
    assert_eq!(
        nodes,
        vec![
            text("a "),
            ParseNode::Block(Block {
                reader: "raw".into(),
                text: "x @y".into(),
            }),
            text(" b"),
        ]
    );
    assert_eq!(ctx.token_depth(), 0);
    assert_eq!(ctx.unconsumed_index(), doc.len());
}

#[test]
fn test_reader_function_errors_are_nested() {
    let doc = "x\n@raw{oops}";
    let mut ctx = ctx(doc);
    ctx.commands_mut().add_reader("raw", |s, _ctx, _svals| {
        Err(SyntaxError::Reader {
            message: "boom".into(),
            position: SourcePosition::locate("raw", s, 0),
        })
    });
    let err = parse_body(doc, &mut ctx).unwrap_err();
    match &err {
        SyntaxError::Nested { message, position } => {
            assert_eq!(message, "boom");
            assert_eq!(position.line, 2);
            assert_eq!(position.column, None);
        }
        other => panic!("expected nested error, got {other:?}"),
    }
    assert!(err.to_string().starts_with("Nested parse error: boom"));
}

#[test]
fn test_command_names_stop_at_punctuation() {
    assert_eq!(
        parse("@a@b"),
        vec![cmd(Some("a"), None, None), cmd(Some("b"), None, None)]
    );
    assert_eq!(
        parse("@x{@y}"),
        vec![cmd(Some("x"), None, Some(vec![cmd(Some("y"), None, None)]))]
    );
}

#[test]
fn test_coerce_string() {
    assert_eq!(coerce_string(&Sval::Keyword("k".into())), Some("k"));
    assert_eq!(coerce_string(&Sval::Identifier("i".into())), Some("i"));
    assert_eq!(coerce_string(&Sval::String("s".into())), Some("s"));
    assert_eq!(coerce_string(&Sval::Number(1.0)), None);
}
