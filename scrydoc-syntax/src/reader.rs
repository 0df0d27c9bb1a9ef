//! Recursive-descent reader for the at-form markup syntax.
//!
//! Text is scanned for `@`. Each at-form may carry a command name, a
//! bracketed s-expression argument list and a `{...}` body. A body may
//! instead use the alternate syntax `|<punct>{ ... }<punct>|`, whose
//! closing delimiter is the mirror image of the opening one; inside such a
//! body only the exact delimiters (and `|<punct>@` for nested at-forms)
//! are special.
//!
//! Every scanning function works on a string slice with relative indices
//! and keeps [`ExecutionContext::bump_unconsumed_index`] in step so that
//! errors can be mapped back to absolute document positions.

use crate::context::ExecutionContext;
use crate::error::{Result, SourcePosition, SyntaxError};
use crate::syntax::{Command, ParseNode, Sval};

/// Mirror an alternate-syntax opening delimiter into its closing form.
///
/// The string is reversed and each bracket-like character is swapped for
/// its partner, so `|<<{` becomes `}>>|`.
pub fn alt_syntax_mirror(s: &str) -> String {
    s.chars()
        .rev()
        .map(|c| match c {
            '(' => ')',
            ')' => '(',
            '[' => ']',
            ']' => '[',
            '<' => '>',
            '>' => '<',
            '{' => '}',
            '}' => '{',
            other => other,
        })
        .collect()
}

/// Find the end of a nested `@;{ ... }` comment whose `@` sits at `idx`.
///
/// Braces are counted from just after the opening `@;{`. Returns the index
/// of the first character past the matching `}`, or `None` when the comment
/// never closes.
pub fn nested_comment_walker(s: &str, idx: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (pos, b) in s.as_bytes().iter().enumerate().skip(idx + 3) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// What ends a text run, and what nests inside it.
#[derive(Debug, Clone, PartialEq)]
pub enum Breaker {
    /// Top level: only `@` is special and the run ends with the input
    Normal,
    /// A `{...}` body: `@`, `{` and `}`
    Text,
    /// An alternate-syntax body
    Alt {
        at: String,
        left: String,
        right: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Hit {
    At,
    Open,
    Close,
}

impl Breaker {
    fn alt(left: &str) -> Self {
        let stem = &left[..left.len() - 1];
        Breaker::Alt {
            at: format!("{stem}@"),
            left: left.to_string(),
            right: alt_syntax_mirror(left),
        }
    }

    fn is_nested(&self) -> bool {
        !matches!(self, Breaker::Normal)
    }

    /// Leftmost special sequence at or after `from`, as (start, end, kind).
    fn find(&self, s: &str, from: usize) -> Option<(usize, usize, Hit)> {
        let rest = &s[from..];
        match self {
            Breaker::Normal => rest.find('@').map(|p| (from + p, from + p + 1, Hit::At)),
            Breaker::Text => rest.find(&['@', '{', '}'][..]).map(|p| {
                let hit = match rest.as_bytes()[p] {
                    b'@' => Hit::At,
                    b'{' => Hit::Open,
                    _ => Hit::Close,
                };
                (from + p, from + p + 1, hit)
            }),
            Breaker::Alt { at, left, right } => {
                let candidates = [(at, Hit::At), (left, Hit::Open), (right, Hit::Close)];
                let mut best: Option<(usize, usize, Hit)> = None;
                for (needle, hit) in candidates {
                    if let Some(p) = rest.find(needle.as_str()) {
                        if best.map_or(true, |(start, _, _)| from + p < start) {
                            best = Some((from + p, from + p + needle.len(), hit));
                        }
                    }
                }
                best
            }
        }
    }
}

/// Append text, merging with a preceding text node.
fn merge_text(results: &mut Vec<ParseNode>, text: &str) {
    if let Some(ParseNode::Text(last)) = results.last_mut() {
        last.push_str(text);
    } else {
        results.push(ParseNode::Text(text.to_string()));
    }
}

/// Parse a whole document body.
pub fn parse_body<V>(s: &str, ctx: &mut ExecutionContext<V>) -> Result<Vec<ParseNode>> {
    text_stream_at_breaker(s, ctx, &Breaker::Normal).map(|(nodes, _)| nodes)
}

/// Break a text stream into text runs and at-form nodes.
///
/// With a nested breaker the stream must be closed by the breaker's closing
/// delimiter; the returned index is the first character past it. At top
/// level the whole of `s` is consumed.
pub fn text_stream_at_breaker<V>(
    s: &str,
    ctx: &mut ExecutionContext<V>,
    breaker: &Breaker,
) -> Result<(Vec<ParseNode>, usize)> {
    let nested = breaker.is_nested();
    let mut results = Vec::new();
    let mut idx = 0;
    let mut last = 0;
    // last index the context has been told about
    let mut rel_idx = 0;
    let mut depth = 1usize;
    let mut closed = false;

    while idx < s.len() {
        let Some((start, end, hit)) = breaker.find(s, idx) else {
            if nested {
                return Err(ctx.syntax_error("Non-terminating recursive context", idx - rel_idx));
            }
            if last < s.len() {
                merge_text(&mut results, &s[last..]);
            }
            idx = s.len();
            break;
        };

        match hit {
            Hit::Close => {
                depth -= 1;
                idx = end;
                if depth == 0 {
                    if last != start {
                        merge_text(&mut results, &s[last..start]);
                    }
                    closed = true;
                    break;
                }
                continue;
            }
            Hit::Open => {
                depth += 1;
                idx = end;
                continue;
            }
            Hit::At => {}
        }

        if start != last {
            merge_text(&mut results, &s[last..start]);
        }
        idx = end;
        ctx.bump_unconsumed_index(idx - rel_idx);
        let (result, next) = parse_at_form(s, ctx, idx, nested)?;
        match result {
            Some(ParseNode::Text(text)) => merge_text(&mut results, &text),
            Some(node) => results.push(node),
            None => {}
        }
        idx = next;
        last = next;
        rel_idx = next;
    }

    if nested && !closed {
        return Err(ctx.syntax_error("Non-terminating recursive context", idx - rel_idx));
    }
    ctx.bump_unconsumed_index(idx - rel_idx);
    Ok((results, idx))
}

/// Parse the at-form whose `@` sits just before `idx`.
///
/// Returns the parsed node (`None` for comments) and the index of the first
/// character not consumed. `@"..."` yields a text node holding the literal.
pub fn parse_at_form<V>(
    s: &str,
    ctx: &mut ExecutionContext<V>,
    mut idx: usize,
    nested: bool,
) -> Result<(Option<ParseNode>, usize)> {
    let bytes = s.as_bytes();
    let slen = s.len();
    let mut rel_idx = idx;

    // -- escaped string
    if bytes.get(idx) == Some(&b'"') {
        let close = s[idx + 1..]
            .find('"')
            .map(|p| idx + 1 + p)
            .ok_or_else(|| ctx.syntax_error("Unmatched string literal!", 0))?;
        ctx.bump_unconsumed_index(close + 1 - rel_idx);
        return Ok((Some(ParseNode::Text(s[idx + 1..close].to_string())), close + 1));
    }

    // -- comments
    if bytes.get(idx) == Some(&b';') {
        if bytes.get(idx + 1) == Some(&b'{') {
            let beyond = nested_comment_walker(s, idx - 1)
                .ok_or_else(|| ctx.syntax_error("mismatched nested comment", 0))?;
            ctx.bump_unconsumed_index(beyond - rel_idx);
            return Ok((None, beyond));
        }

        // line comment: eat through the newline and the whitespace after it
        let Some(newline) = s[idx + 1..].find('\n').map(|p| idx + 1 + p) else {
            if nested {
                return Err(ctx.syntax_error(
                    "line comment without a newline in terminus context",
                    0,
                ));
            }
            ctx.bump_unconsumed_index(slen - rel_idx);
            return Ok((None, slen));
        };
        let resume = s[newline + 1..]
            .find(|c: char| !c.is_whitespace())
            .map(|p| newline + 1 + p)
            .unwrap_or(slen);
        ctx.bump_unconsumed_index(resume - rel_idx);
        return Ok((None, resume));
    }

    // -- command
    let mut name = None;
    if !matches!(bytes.get(idx), Some(b'[' | b'{' | b'|')) {
        let end = s[idx..]
            .find(|c: char| c.is_whitespace() || matches!(c, '|' | '[' | '{' | '}' | ']' | '@'))
            .map(|p| idx + p)
            .unwrap_or(slen);
        if end == idx {
            return Err(ctx.syntax_error("Missing command name after '@'", 0));
        }
        let cmd = &s[idx..end];
        // lets nested readers know who their enclosing parent is
        ctx.push_token(cmd);
        name = Some(cmd.to_string());
        idx = end;
    }

    let mut svals = None;
    let mut body = None;

    if bytes.get(idx) == Some(&b'[') {
        ctx.bump_unconsumed_index(idx + 1 - rel_idx);
        let (vals, used) = sexpr_parser(&s[idx + 1..], ctx, true)?;
        svals = Some(vals);
        idx += used + 1;
        rel_idx = idx;
    }

    if bytes.get(idx) == Some(&b'|') {
        let punct = s[idx + 1..].chars().next().is_some_and(|c| {
            !(c.is_ascii_alphanumeric() || matches!(c, '@' | ' ' | '\t' | '\r' | '\n'))
        });
        if punct {
            let brace = s[idx + 1..]
                .find('{')
                .map(|p| idx + 1 + p)
                .ok_or_else(|| {
                    ctx.syntax_error("alternate syntax without an opening '{'", idx - rel_idx)
                })?;
            let breaker = Breaker::alt(&s[idx..=brace]);
            idx = brace + 1;
            ctx.bump_unconsumed_index(idx - rel_idx);
            let (nodes, used) = text_stream_at_breaker(&s[idx..], ctx, &breaker)?;
            body = Some(nodes);
            idx += used;
            rel_idx = idx;
        } else {
            // expression escape; no nesting
            let bar = s[idx + 1..]
                .find('|')
                .map(|p| idx + 1 + p)
                .ok_or_else(|| ctx.syntax_error("unmatched expression escape |", idx - rel_idx))?;
            ctx.bump_unconsumed_index(idx + 1 - rel_idx);
            let (vals, _) = sexpr_parser(&s[idx + 1..bar], ctx, false)?;
            svals = Some(vals);
            rel_idx = bar;
            idx = bar + 1;
        }
    } else if bytes.get(idx) == Some(&b'{') {
        let reader = name
            .as_deref()
            .and_then(|n| ctx.commands().reader(n));
        if let Some(reader) = reader {
            let before = ctx.bump_unconsumed_index(idx + 1 - rel_idx);
            let (node, consumed) = reader(&s[idx + 1..], ctx, svals.as_deref())
                .map_err(|err| nested_error(ctx, err))?;
            idx += consumed + 1;
            // a reader that did not track positions itself gets bumped here
            if ctx.unconsumed_index() == before {
                ctx.bump_unconsumed_index(consumed);
            }
            ctx.pop_token();
            return Ok((Some(node), idx));
        }

        ctx.bump_unconsumed_index(idx + 1 - rel_idx);
        let (nodes, used) = text_stream_at_breaker(&s[idx + 1..], ctx, &Breaker::Text)?;
        body = Some(nodes);
        idx += 1 + used;
        rel_idx = idx;
    }

    if name.is_some() {
        ctx.pop_token();
    }
    ctx.bump_unconsumed_index(idx - rel_idx);

    Ok((Some(ParseNode::Command(Command { name, svals, body })), idx))
}

/// Wrap a reader function's failure with document-level position context.
fn nested_error<V>(ctx: &ExecutionContext<V>, err: SyntaxError) -> SyntaxError {
    let mut position =
        SourcePosition::locate(&ctx.file_name, ctx.contents(), ctx.unconsumed_index());
    position.column = None;
    let message = match &err {
        SyntaxError::Reader { message, position: inner }
        | SyntaxError::Nested { message, position: inner } => {
            // both line numbers are 1-based
            position.line += inner.line - 1;
            message.clone()
        }
        other => other.to_string(),
    };
    SyntaxError::Nested { message, position }
}

/// Parse s-expression arguments.
///
/// Supported atoms are numbers, double-quoted strings with backslash
/// escapes, `#t`/`#f`, `#:keyword`, identifiers starting with an ASCII
/// letter and nested at-forms. With `in_bracket` the list must be closed by
/// `]` and the returned index is just past it; otherwise all of `s` is
/// consumed.
pub fn sexpr_parser<V>(
    s: &str,
    ctx: &mut ExecutionContext<V>,
    in_bracket: bool,
) -> Result<(Vec<Sval>, usize)> {
    let slen = s.len();
    let mut results = Vec::new();
    let mut idx = 0;
    let mut rel_idx = 0;
    let mut closed = false;

    while idx < slen {
        let Some(start) = s[idx..].find(|c: char| !c.is_whitespace()).map(|p| idx + p) else {
            if in_bracket {
                return Err(ctx.syntax_error(
                    "Ran out of sexprs to look at without hitting a ']'",
                    idx - rel_idx,
                ));
            }
            idx = slen;
            break;
        };
        idx = start;
        let Some(c) = s[idx..].chars().next() else {
            break;
        };
        idx += c.len_utf8();

        match c {
            ']' => {
                if !in_bracket {
                    return Err(ctx.syntax_error(
                        "Got a ']' without being in a bracketed sexpr list.",
                        idx - rel_idx,
                    ));
                }
                closed = true;
                break;
            }
            '@' => {
                ctx.bump_unconsumed_index(idx - rel_idx);
                let (result, next) = parse_at_form(s, ctx, idx, false)?;
                if let Some(node) = result {
                    results.push(node_to_sval(node));
                }
                idx = next;
                rel_idx = next;
            }
            '"' => {
                let (value, end) = read_string(s, idx)
                    .ok_or_else(|| ctx.syntax_error("Unterminated string death in sexpr", idx - rel_idx))?;
                results.push(Sval::String(value));
                idx = end;
            }
            '#' => {
                let end = atom_end(s, idx)
                    .or((!in_bracket).then_some(slen))
                    .ok_or_else(|| {
                        ctx.syntax_error(
                            "ran out of non-whitespace without the keyword terminating",
                            idx - rel_idx,
                        )
                    })?;
                let thing = &s[idx..end];
                if let Some(keyword) = thing.strip_prefix(':') {
                    results.push(Sval::Keyword(keyword.to_string()));
                } else if thing == "t" {
                    results.push(Sval::Bool(true));
                } else if thing == "f" {
                    results.push(Sval::Bool(false));
                } else {
                    return Err(ctx.syntax_error(
                        format!("Unsupported hashy syntax thing: #{thing}"),
                        idx - rel_idx,
                    ));
                }
                idx = end;
            }
            '-' | '0'..='9' => {
                let end = atom_end(s, idx)
                    .or((!in_bracket).then_some(slen))
                    .ok_or_else(|| {
                        ctx.syntax_error("ran out of number without hitting a terminator", idx - rel_idx)
                    })?;
                let text = &s[idx - 1..end];
                let number = text.parse::<f64>().map_err(|_| {
                    ctx.syntax_error(format!("Malformed number '{text}' in sexpr"), idx - 1 - rel_idx)
                })?;
                results.push(Sval::Number(number));
                idx = end;
            }
            c if c.is_ascii_alphabetic() => {
                let end = atom_end(s, idx)
                    .or((!in_bracket).then_some(slen))
                    .ok_or_else(|| {
                        ctx.syntax_error(
                            "ran out of identifier without hitting a terminator",
                            idx - rel_idx,
                        )
                    })?;
                results.push(Sval::Identifier(s[idx - 1..end].to_string()));
                idx = end;
            }
            other => {
                return Err(ctx.syntax_error(
                    format!("Unsupported lead-in character '{other}' in sexpr: '{s}'"),
                    idx - other.len_utf8() - rel_idx,
                ));
            }
        }
    }

    if in_bracket && !closed {
        return Err(ctx.syntax_error(
            "Ran out of sexprs to look at without hitting a ']'",
            idx - rel_idx,
        ));
    }
    ctx.bump_unconsumed_index(idx - rel_idx);
    Ok((results, idx))
}

/// An atom runs until whitespace or `]`.
fn atom_end(s: &str, from: usize) -> Option<usize> {
    s[from..]
        .find(|c: char| c.is_whitespace() || c == ']')
        .map(|p| from + p)
}

/// Read a string body starting just after its opening quote. Returns the
/// unescaped value and the index just past the closing quote.
fn read_string(s: &str, from: usize) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = s[from..].char_indices();
    while let Some((pos, c)) = chars.next() {
        match c {
            '"' => return Some((out, from + pos + 1)),
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    '0' => out.push('\0'),
                    'u' => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            let (_, h) = chars.next()?;
                            code = code * 16 + h.to_digit(16)?;
                        }
                        out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                    }
                    other => out.push(other),
                }
            }
            other => out.push(other),
        }
    }
    None
}

/// A nameless, bodiless at-form in argument position is a nested list.
fn node_to_sval(node: ParseNode) -> Sval {
    match node {
        ParseNode::Text(text) => Sval::String(text),
        ParseNode::Block(block) => Sval::Block(block),
        ParseNode::Command(Command {
            name: None,
            svals: Some(items),
            body: None,
        }) => Sval::List(items),
        ParseNode::Command(cmd) => Sval::Command(cmd),
    }
}
