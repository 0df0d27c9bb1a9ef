use crate::*;

fn ctx() -> ExecutionContext<String> {
    ExecutionContext::new("ctx test", "")
}

#[test]
fn test_named_context_list_frames() {
    let mut ctx = ctx();
    ctx.push_named_context("items", Frame::list());
    ctx.named_context_add("items", "a".to_string(), None).unwrap();

    // an inner frame shadows the outer one until popped
    ctx.push_named_context("items", Frame::list());
    ctx.named_context_add("items", "b".to_string(), None).unwrap();
    assert_eq!(ctx.snapshot_named_context_stack("items").len(), 2);

    let inner = ctx.pop_named_context("items").unwrap().into_list().unwrap();
    assert_eq!(inner, vec!["b".to_string()]);
    let outer = ctx.pop_named_context("items").unwrap().into_list().unwrap();
    assert_eq!(outer, vec!["a".to_string()]);

    // the stack disappears once empty
    assert!(!ctx.has_named_context("items"));
    assert!(ctx.snapshot_named_context_stack("items").is_empty());
}

#[test]
fn test_named_context_dict_frames() {
    let mut ctx = ctx();
    ctx.push_named_context("dict", Frame::dict());
    ctx.named_context_add("dict", "1".to_string(), Some("x")).unwrap();
    ctx.named_context_add("dict", "2".to_string(), Some("x")).unwrap();
    assert_eq!(ctx.named_context_lookup("dict", "x"), Some(&"2".to_string()));
    assert_eq!(ctx.named_context_lookup("dict", "y"), None);

    let frame = ctx.pop_named_context("dict").unwrap().into_dict().unwrap();
    assert_eq!(frame.len(), 1);
}

#[test]
fn test_named_context_misuse_is_an_error() {
    let mut ctx = ctx();
    assert!(matches!(
        ctx.named_context_add("nope", "v".to_string(), None),
        Err(ContextError::NoSuchContext(_))
    ));
    assert!(matches!(
        ctx.pop_named_context("nope"),
        Err(ContextError::PopMissingContext(_))
    ));

    ctx.push_named_context("list", Frame::list());
    assert!(matches!(
        ctx.named_context_add("list", "v".to_string(), Some("k")),
        Err(ContextError::WrongFrame { found: "list", .. })
    ));
}

#[test]
fn test_named_values_shadow() {
    let mut ctx = ctx();
    assert_eq!(ctx.lookup_named_value("scope"), None);
    ctx.push_named_value("scope", "outer".to_string());
    ctx.push_named_value("scope", "inner".to_string());
    assert_eq!(ctx.lookup_named_value("scope"), Some(&"inner".to_string()));
    ctx.pop_named_value("scope");
    assert_eq!(ctx.lookup_named_value("scope"), Some(&"outer".to_string()));
    ctx.pop_named_value("scope");
    assert_eq!(ctx.lookup_named_value("scope"), None);
}

#[test]
fn test_token_stack() {
    let mut ctx = ctx();
    assert!(ctx.parent_token().is_err());
    ctx.push_token("dict");
    ctx.push_token("key");
    assert_eq!(ctx.parent_token().unwrap(), "key");
    ctx.pop_token();
    assert_eq!(ctx.parent_token().unwrap(), "dict");
}

#[test]
fn test_unconsumed_index_frozen_while_nested() {
    let mut ctx = ctx();
    assert_eq!(ctx.bump_unconsumed_index(5), 5);
    ctx.enter_nested_parse();
    assert_eq!(ctx.bump_unconsumed_index(100), 5);
    ctx.leave_nested_parse();
    assert_eq!(ctx.bump_unconsumed_index(1), 6);
}

#[test]
fn test_source_position_locate() {
    let pos = SourcePosition::locate("f", "ab\ncd\n", 4);
    assert_eq!(pos.line, 2);
    assert_eq!(pos.column, Some(2));
    assert_eq!(pos.source_line(), Some("cd"));

    let past = SourcePosition::locate("f", "ab", 10);
    assert_eq!(past.line, 1);
    assert_eq!(past.column, None);
}
