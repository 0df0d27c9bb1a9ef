use crate::ast::*;
use crate::*;

fn init_of(stmt: &Stmt) -> &Expr {
    match &stmt.kind {
        StmtKind::Var { decls, .. } => decls[0].init.as_ref().unwrap(),
        other => panic!("expected var, got {other:?}"),
    }
}

fn object_props(expr: &Expr) -> &[Property] {
    match &expr.kind {
        ExprKind::Object(props) => props,
        other => panic!("expected object literal, got {other:?}"),
    }
}

#[test]
fn test_regex_versus_division() {
    let program = parse("var r = /ab+c/g;\nvar d = a / b / c;").unwrap();
    assert_eq!(
        init_of(&program.body[0]).kind,
        ExprKind::Regex {
            pattern: "ab+c".to_string(),
            flags: "g".to_string()
        }
    );
    match &init_of(&program.body[1]).kind {
        ExprKind::Binary { op, left, .. } => {
            assert_eq!(*op, BinaryOp::Div);
            assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Div, .. }));
        }
        other => panic!("expected division, got {other:?}"),
    }
}

#[test]
fn test_regex_after_paren_and_call() {
    let program = parse("s.replace(/x/g, 'y');").unwrap();
    let StmtKind::Expr(expr) = &program.body[0].kind else {
        panic!("expected expression statement");
    };
    let ExprKind::Call { args, .. } = &expr.kind else {
        panic!("expected call");
    };
    assert!(matches!(args[0].kind, ExprKind::Regex { .. }));
}

#[test]
fn test_semicolon_insertion() {
    let program = parse("var a = 1\nvar b = 2\nfoo()").unwrap();
    assert_eq!(program.body.len(), 3);
}

#[test]
fn test_restricted_return() {
    let program = parse("function f() {\n  return\n  5\n}").unwrap();
    let StmtKind::Function(f) = &program.body[0].kind else {
        panic!("expected function");
    };
    assert_eq!(f.body.len(), 2);
    assert!(matches!(f.body[0].kind, StmtKind::Return(None)));
}

#[test]
fn test_missing_semicolon_is_an_error() {
    let err = parse("var a = 1 var b").unwrap_err();
    assert!(matches!(err, ParseError::Parser { .. }));
}

#[test]
fn test_precedence() {
    let program = parse("x = a || b && c + d * e;").unwrap();
    let StmtKind::Expr(expr) = &program.body[0].kind else {
        panic!("expected expression statement");
    };
    let ExprKind::Assign { value, .. } = &expr.kind else {
        panic!("expected assignment");
    };
    let ExprKind::Logical { op, right, .. } = &value.kind else {
        panic!("expected ||");
    };
    assert_eq!(*op, LogicalOp::Or);
    let ExprKind::Logical { op, right, .. } = &right.kind else {
        panic!("expected &&");
    };
    assert_eq!(*op, LogicalOp::And);
    let ExprKind::Binary { op, right, .. } = &right.kind else {
        panic!("expected +");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn test_object_literal_forms() {
    let source = r#"var o = {
  plain: 1,
  "quoted": 2,
  3: 'three',
  default: 4,
  get size() { return 1; },
  set size(v) {},
  method(a, b) { return a; },
  get: 5
};"#;
    let program = parse(source).unwrap();
    let props = object_props(init_of(&program.body[0]));
    let keys: Vec<&str> = props.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(
        keys,
        vec!["plain", "quoted", "3", "default", "size", "size", "method", "get"]
    );
    assert!(matches!(props[4].value, PropValue::Getter(_)));
    assert!(matches!(props[5].value, PropValue::Setter(_)));
    match &props[6].value {
        PropValue::Init(Expr {
            kind: ExprKind::Function(f),
            ..
        }) => assert_eq!(f.params, vec!["a", "b"]),
        other => panic!("expected method, got {other:?}"),
    }
}

#[test]
fn test_doc_attachment() {
    let source = r#"
/** The thing. */
var thing = {
  /** A field. */
  field: 1,
};
/** Assigned. */
exports.thing = thing;
/** Declared. */
function declared() {}
"#;
    let program = parse(source).unwrap();

    let init = init_of(&program.body[0]);
    assert_eq!(init.doc.as_ref().unwrap().text, "The thing.");
    let props = object_props(init);
    let PropValue::Init(field) = &props[0].value else {
        panic!("expected init");
    };
    assert_eq!(field.doc.as_ref().unwrap().text, "A field.");

    let StmtKind::Expr(expr) = &program.body[1].kind else {
        panic!("expected assignment statement");
    };
    let ExprKind::Assign { value, .. } = &expr.kind else {
        panic!("expected assignment");
    };
    assert_eq!(value.doc.as_ref().unwrap().text, "Assigned.");

    let StmtKind::Function(f) = &program.body[2].kind else {
        panic!("expected function");
    };
    assert_eq!(f.doc.as_ref().unwrap().text, "Declared.");
}

#[test]
fn test_property_groups() {
    let source = r#"var g = {
  loose: 0,
  //////////
  // Sizes
  small: 1,
  large: 2,
  //////////

  tail: 3
};"#;
    let program = parse(source).unwrap();
    let props = object_props(init_of(&program.body[0]));
    let group_of = |i: usize| props[i].group.as_ref().and_then(|g| g.name.clone());
    assert_eq!(group_of(0), None);
    assert_eq!(group_of(1).as_deref(), Some("Sizes"));
    assert_eq!(group_of(2).as_deref(), Some("Sizes"));
    assert_eq!(group_of(3), None);
}

#[test]
fn test_statements() {
    let source = r#"
for (var i = 0; i < 3; i++) {}
for (var k in obj) {}
while (x) { break; }
do { continue; } while (y)
switch (z) { case 1: a(); break; default: b(); }
try { t(); } catch (e) {} finally { f(); }
outer: for (;;) { break outer; }
with (o) {}
throw new Error("x");
debugger;
let l = 1;
const c = 2;
"#;
    let program = parse(source).unwrap();
    let kinds: Vec<&StmtKind> = program.body.iter().map(|s| &s.kind).collect();
    assert!(matches!(kinds[0], StmtKind::For { .. }));
    assert!(matches!(kinds[1], StmtKind::ForIn { .. }));
    assert!(matches!(kinds[2], StmtKind::While { .. }));
    assert!(matches!(kinds[3], StmtKind::DoWhile { .. }));
    assert!(matches!(kinds[4], StmtKind::Switch { .. }));
    assert!(matches!(kinds[5], StmtKind::Try { .. }));
    assert!(matches!(kinds[6], StmtKind::Labeled { .. }));
    assert!(matches!(kinds[7], StmtKind::With { .. }));
    assert!(matches!(kinds[8], StmtKind::Throw(_)));
    assert!(matches!(kinds[9], StmtKind::Debugger));
    assert!(matches!(kinds[10], StmtKind::Var { kind: VarKind::Let, .. }));
    assert!(matches!(kinds[11], StmtKind::Var { kind: VarKind::Const, .. }));
}

#[test]
fn test_new_and_member_chains() {
    let program = parse("var x = new a.B(1).c;").unwrap();
    match &init_of(&program.body[0]).kind {
        ExprKind::Member { object, property } => {
            assert_eq!(property, "c");
            assert!(matches!(object.kind, ExprKind::New { .. }));
        }
        other => panic!("expected member of new, got {other:?}"),
    }
}

#[test]
fn test_standalone_docs_on_program() {
    let program = parse("/**\n * File doc.\n **/\n\nvar a;").unwrap();
    assert_eq!(program.standalone_docs.len(), 1);
    assert_eq!(program.standalone_docs[0].text, "File doc.");
}

#[test]
fn test_parse_until_right_curly() {
    let source = "var a = { b: 1 };\nfoo(a) } trailing";
    let (program, end) = parse_until_right_curly(source).unwrap();
    assert_eq!(program.body.len(), 2);
    assert_eq!(&source[end..end + 1], "}");
    assert_eq!(&source[end + 1..], " trailing");
}

#[test]
fn test_parse_until_right_curly_needs_brace() {
    let err = parse_until_right_curly("var a = 1;").unwrap_err();
    assert!(matches!(err, ParseError::UnexpectedEnd { .. }));
}

#[test]
fn test_invalid_assignment_target() {
    let err = parse("1 = 2;").unwrap_err();
    assert!(err.to_string().contains("Invalid assignment target"));
}

#[test]
fn test_error_context_display() {
    let source = "var = 3;";
    let err = parse(source).unwrap_err();
    insta::assert_snapshot!(ErrorContext::new(source, &err).to_string(), @r"
    Error at line 1, column 5:
      Parser error at Span { start: 4, end: 5 }: Expected identifier, found Eq

      var = 3;
          ^
    ");
}
