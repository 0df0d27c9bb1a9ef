use crate::error::{ParseError, Result, Span};
use logos::Logos;
use std::sync::Arc;

/// Tokens for the scripting language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // Keywords
    #[token("var")]
    Var,
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("default")]
    Default,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("throw")]
    Throw,
    #[token("new")]
    New,
    #[token("delete")]
    Delete,
    #[token("typeof")]
    Typeof,
    #[token("instanceof")]
    Instanceof,
    #[token("in")]
    In,
    #[token("void")]
    Void,
    #[token("this")]
    This,
    #[token("null")]
    Null,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("with")]
    With,
    #[token("debugger")]
    Debugger,

    // Identifiers and literals
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", number)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", number)]
    #[regex(r"0[xX][0-9a-fA-F]+", number)]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\(.|\n))*""#, string_literal)]
    #[regex(r#"'([^'\\\n]|\\(.|\n))*'"#, string_literal)]
    String(String),

    /// Produced by [`Lexer::rescan_regex`], never by the tokenizer itself
    Regex { pattern: String, flags: String },

    // Comments are kept so doc blocks and group markers can be attached
    #[regex(r"//[^\n]*")]
    LineComment,
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/")]
    BlockComment,

    // Punctuators
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NotEqEq,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token(">>>")]
    UShr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,

    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,
    #[token(">>>=")]
    UShrEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,

    // End of file
    Eof,
}

impl Token {
    /// Keywords that may still appear as property names (`a.default`,
    /// `{ new: 1 }`).
    pub fn keyword_text(&self) -> Option<&'static str> {
        let text = match self {
            Token::Var => "var",
            Token::Let => "let",
            Token::Const => "const",
            Token::Function => "function",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::For => "for",
            Token::While => "while",
            Token::Do => "do",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Switch => "switch",
            Token::Case => "case",
            Token::Default => "default",
            Token::Try => "try",
            Token::Catch => "catch",
            Token::Finally => "finally",
            Token::Throw => "throw",
            Token::New => "new",
            Token::Delete => "delete",
            Token::Typeof => "typeof",
            Token::Instanceof => "instanceof",
            Token::In => "in",
            Token::Void => "void",
            Token::This => "this",
            Token::Null => "null",
            Token::True => "true",
            Token::False => "false",
            Token::With => "with",
            Token::Debugger => "debugger",
            _ => return None,
        };
        Some(text)
    }
}

fn number(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    let text = lex.slice();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }
    text.parse().ok()
}

fn string_literal(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let text = lex.slice();
    unescape(&text[1..text.len() - 1])
}

fn hex_char(digits: &str) -> Option<char> {
    u32::from_str_radix(digits, 16).ok().and_then(char::from_u32)
}

/// Resolve backslash escapes in the body of a string literal.
pub fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.char_indices();
    while let Some((_, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let (idx, escaped) = chars.next()?;
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            // line continuation
            '\n' => {}
            'x' => {
                let digits = body.get(idx + 1..idx + 3)?;
                out.push(hex_char(digits)?);
                chars.nth(1);
            }
            'u' => {
                let digits = body.get(idx + 1..idx + 5)?;
                out.push(hex_char(digits)?);
                chars.nth(3);
            }
            other => out.push(other),
        }
    }
    Some(out)
}

/// A `/** ... */` block found in the source
#[derive(Debug, Clone, PartialEq)]
pub struct DocComment {
    /// Comment body with the leading ` * ` decoration removed
    pub text: String,
    pub span: Span,
    pub line: usize,
    /// Opened and closed with two asterisks; describes its surroundings
    /// rather than the next declaration.
    pub standalone: bool,
}

impl DocComment {
    /// Interpret a block comment; plain `/* */` comments yield `None`.
    pub fn from_block(raw: &str, span: Span, line: usize) -> Option<Self> {
        if !raw.starts_with("/**") || raw.len() < 5 || raw == "/**/" {
            return None;
        }
        let standalone = raw.len() >= 6 && raw.ends_with("**/");
        let inner = if standalone {
            &raw[3..raw.len() - 3]
        } else {
            &raw[3..raw.len() - 2]
        };

        let lines: Vec<&str> = inner
            .lines()
            .map(|line| {
                let trimmed = line.trim_start();
                match trimmed.strip_prefix('*') {
                    Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
                    None => trimmed,
                }
            })
            .collect();
        let first = lines.iter().position(|l| !l.trim().is_empty());
        let last = lines.iter().rposition(|l| !l.trim().is_empty());
        let text = match (first, last) {
            (Some(first), Some(last)) => lines[first..=last].join("\n"),
            _ => String::new(),
        };

        Some(Self {
            text,
            span,
            line,
            standalone,
        })
    }
}

/// A `//////` rule followed by `// Name` and optional description lines.
///
/// A rule with no name after it ends the current group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMarker {
    pub name: Option<String>,
    pub description: String,
    pub line: usize,
}

struct MarkerBuilder {
    line: usize,
    last_line: usize,
    lines: Vec<String>,
}

impl MarkerBuilder {
    fn new(line: usize) -> Self {
        Self {
            line,
            last_line: line,
            lines: Vec::new(),
        }
    }

    fn has_name(&self) -> bool {
        self.lines.iter().any(|l| !l.is_empty())
    }

    fn finish(self) -> Arc<GroupMarker> {
        let mut lines = self.lines.into_iter().skip_while(|l| l.is_empty());
        let name = lines.next();
        let description: Vec<String> = lines.skip_while(|l| l.is_empty()).collect();
        Arc::new(GroupMarker {
            name,
            description: description.join("\n").trim_end().to_string(),
            line: self.line,
        })
    }
}

fn is_rule(comment_body: &str) -> bool {
    let body = comment_body.trim_end();
    body.len() >= 4 && body.chars().all(|c| c == '/')
}

/// Token with its position and any documentation that precedes it
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
    /// 1-indexed line of the token start
    pub line: usize,
    /// A line break separates this token from the previous one
    pub newline_before: bool,
    pub doc: Option<Arc<DocComment>>,
    pub group: Option<Arc<GroupMarker>>,
}

/// Pull-based lexer over script source.
///
/// The parser drives it one token at a time so that a `/` in operand
/// position can be re-read as a regular expression literal.
pub struct Lexer<'a> {
    source: &'a str,
    inner: logos::Lexer<'a, Token>,
    base: usize,
    prev_end: usize,
    line: usize,
    line_scan: usize,
    standalone_docs: Vec<Arc<DocComment>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            inner: Token::lexer(source),
            base: 0,
            prev_end: 0,
            line: 1,
            line_scan: 0,
            standalone_docs: Vec::new(),
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Standalone doc blocks seen so far, in source order.
    pub fn take_standalone_docs(&mut self) -> Vec<Arc<DocComment>> {
        std::mem::take(&mut self.standalone_docs)
    }

    fn line_at(&mut self, offset: usize) -> usize {
        if offset > self.line_scan {
            self.line += self.source[self.line_scan..offset].matches('\n').count();
            self.line_scan = offset;
        }
        self.line
    }

    fn restart_at(&mut self, offset: usize) {
        self.inner = Token::lexer(&self.source[offset..]);
        self.base = offset;
        self.prev_end = offset;
    }

    /// Next significant token; comments are folded into its `doc` and
    /// `group` fields.
    pub fn next_token(&mut self) -> Result<SpannedToken> {
        let mut doc = None;
        let mut group = None;
        let mut marker: Option<MarkerBuilder> = None;
        let mut newline_before = false;

        loop {
            let gap_start = self.prev_end;
            let Some(result) = self.inner.next() else {
                let end = self.source.len();
                if self.source[gap_start..].contains('\n') {
                    newline_before = true;
                }
                let line = self.line_at(end);
                return Ok(SpannedToken {
                    token: Token::Eof,
                    span: Span::point(end),
                    line,
                    newline_before,
                    doc,
                    group: marker.map(MarkerBuilder::finish).or(group),
                });
            };

            let range = self.inner.span();
            let span = Span::new(self.base + range.start, self.base + range.end);
            if self.source[gap_start..span.start].contains('\n') {
                newline_before = true;
            }
            let line = self.line_at(span.start);
            self.prev_end = span.end;

            let token = result.map_err(|_| ParseError::Lexer {
                span,
                message: format!(
                    "Unexpected character {:?}",
                    self.source[span.start..].chars().next().unwrap_or('\0')
                ),
            })?;

            match token {
                Token::LineComment => {
                    let body = &self.source[span.start + 2..span.end];
                    if is_rule(body) {
                        match marker.take() {
                            // closing rule of a boxed header
                            Some(m) if m.has_name() && m.last_line + 1 == line => {
                                let mut m = m;
                                m.last_line = line;
                                group = Some(m.finish());
                            }
                            Some(m) => {
                                group = Some(m.finish());
                                marker = Some(MarkerBuilder::new(line));
                            }
                            None => marker = Some(MarkerBuilder::new(line)),
                        }
                    } else if let Some(m) = marker.as_mut() {
                        if m.last_line + 1 == line {
                            m.lines.push(body.trim().to_string());
                            m.last_line = line;
                        } else if let Some(m) = marker.take() {
                            group = Some(m.finish());
                        }
                    }
                    newline_before = true;
                }
                Token::BlockComment => {
                    let raw = &self.source[span.start..span.end];
                    if raw.contains('\n') {
                        newline_before = true;
                    }
                    if let Some(comment) = DocComment::from_block(raw, span, line) {
                        if comment.standalone {
                            self.standalone_docs.push(Arc::new(comment));
                        } else {
                            doc = Some(Arc::new(comment));
                        }
                    }
                }
                token => {
                    if let Some(m) = marker.take() {
                        group = Some(m.finish());
                    }
                    return Ok(SpannedToken {
                        token,
                        span,
                        line,
                        newline_before,
                        doc,
                        group,
                    });
                }
            }
        }
    }

    /// Re-read the input at `start` (which holds a `/`) as a regular
    /// expression literal and continue lexing after it.
    pub fn rescan_regex(&mut self, start: usize, previous: &SpannedToken) -> Result<SpannedToken> {
        let bytes = self.source.as_bytes();
        let mut idx = start + 1;
        let mut in_class = false;
        loop {
            match bytes.get(idx) {
                None | Some(b'\n') => {
                    return Err(ParseError::Lexer {
                        span: Span::new(start, idx),
                        message: "Unterminated regular expression".to_string(),
                    })
                }
                Some(b'\\') => idx += 2,
                Some(b'[') => {
                    in_class = true;
                    idx += 1;
                }
                Some(b']') => {
                    in_class = false;
                    idx += 1;
                }
                Some(b'/') if !in_class => break,
                Some(_) => idx += 1,
            }
        }
        let pattern = self.source[start + 1..idx].to_string();
        let flags_start = idx + 1;
        let flags_end = self.source[flags_start..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
            .map(|pos| flags_start + pos)
            .unwrap_or(self.source.len());
        let flags = self.source[flags_start..flags_end].to_string();

        self.restart_at(flags_end);
        Ok(SpannedToken {
            token: Token::Regex { pattern, flags },
            span: Span::new(start, flags_end),
            line: previous.line,
            newline_before: previous.newline_before,
            doc: previous.doc.clone(),
            group: previous.group.clone(),
        })
    }
}

/// Tokenize all of `source`, treating every `/` as an operator.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.token == Token::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
