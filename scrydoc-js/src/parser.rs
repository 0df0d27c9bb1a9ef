use crate::ast::*;
use crate::error::{ParseError, Result, Span};
use crate::lexer::{DocComment, GroupMarker, Lexer, SpannedToken, Token};
use std::sync::Arc;

/// Parse a whole script.
pub fn parse(source: &str) -> Result<Program> {
    let mut parser = Parser::new(source)?;
    parser.parse_program()
}

/// Parse statements up to the first unmatched `}`.
///
/// Returns the program and the byte offset of that closing brace.
pub fn parse_until_right_curly(source: &str) -> Result<(Program, usize)> {
    let mut parser = Parser::new(source)?;
    parser.parse_until_right_curly()
}

enum BinOp {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn binary_op(token: &Token, no_in: bool) -> Option<(u8, BinOp)> {
    let op = match token {
        Token::PipePipe => (1, BinOp::Logical(LogicalOp::Or)),
        Token::AmpAmp => (2, BinOp::Logical(LogicalOp::And)),
        Token::Pipe => (3, BinOp::Binary(BinaryOp::BitOr)),
        Token::Caret => (4, BinOp::Binary(BinaryOp::BitXor)),
        Token::Amp => (5, BinOp::Binary(BinaryOp::BitAnd)),
        Token::EqEq => (6, BinOp::Binary(BinaryOp::Eq)),
        Token::NotEq => (6, BinOp::Binary(BinaryOp::NotEq)),
        Token::EqEqEq => (6, BinOp::Binary(BinaryOp::StrictEq)),
        Token::NotEqEq => (6, BinOp::Binary(BinaryOp::StrictNotEq)),
        Token::Lt => (7, BinOp::Binary(BinaryOp::Lt)),
        Token::Gt => (7, BinOp::Binary(BinaryOp::Gt)),
        Token::Le => (7, BinOp::Binary(BinaryOp::Le)),
        Token::Ge => (7, BinOp::Binary(BinaryOp::Ge)),
        Token::Instanceof => (7, BinOp::Binary(BinaryOp::Instanceof)),
        Token::In if !no_in => (7, BinOp::Binary(BinaryOp::In)),
        Token::Shl => (8, BinOp::Binary(BinaryOp::Shl)),
        Token::Shr => (8, BinOp::Binary(BinaryOp::Shr)),
        Token::UShr => (8, BinOp::Binary(BinaryOp::UShr)),
        Token::Plus => (9, BinOp::Binary(BinaryOp::Add)),
        Token::Minus => (9, BinOp::Binary(BinaryOp::Sub)),
        Token::Star => (10, BinOp::Binary(BinaryOp::Mul)),
        Token::Slash => (10, BinOp::Binary(BinaryOp::Div)),
        Token::Percent => (10, BinOp::Binary(BinaryOp::Mod)),
        _ => return None,
    };
    Some(op)
}

fn assign_op(token: &Token) -> Option<AssignOp> {
    let op = match token {
        Token::Eq => AssignOp::Assign,
        Token::PlusEq => AssignOp::Compound(BinaryOp::Add),
        Token::MinusEq => AssignOp::Compound(BinaryOp::Sub),
        Token::StarEq => AssignOp::Compound(BinaryOp::Mul),
        Token::SlashEq => AssignOp::Compound(BinaryOp::Div),
        Token::PercentEq => AssignOp::Compound(BinaryOp::Mod),
        Token::ShlEq => AssignOp::Compound(BinaryOp::Shl),
        Token::ShrEq => AssignOp::Compound(BinaryOp::Shr),
        Token::UShrEq => AssignOp::Compound(BinaryOp::UShr),
        Token::AmpEq => AssignOp::Compound(BinaryOp::BitAnd),
        Token::PipeEq => AssignOp::Compound(BinaryOp::BitOr),
        Token::CaretEq => AssignOp::Compound(BinaryOp::BitXor),
        _ => return None,
    };
    Some(op)
}

fn number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Recursive-descent parser for the scripting language
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: SpannedToken,
    ahead: Option<SpannedToken>,
    prev_end: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            ahead: None,
            prev_end: 0,
        })
    }

    /// Peek at current token
    fn peek(&self) -> &Token {
        &self.current.token
    }

    /// Test the token after the current one
    fn peek2_is(&mut self, test: impl Fn(&Token) -> bool) -> Result<bool> {
        let ahead = match self.ahead.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        let result = test(&ahead.token);
        self.ahead = Some(ahead);
        Ok(result)
    }

    /// Advance to next token, returning the one just passed
    fn advance(&mut self) -> Result<SpannedToken> {
        let next = match self.ahead.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        let prev = std::mem::replace(&mut self.current, next);
        self.prev_end = prev.span.end;
        Ok(prev)
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(expected)
    }

    fn eat(&mut self, expected: &Token) -> Result<bool> {
        if self.check(expected) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        if self.is_eof() {
            ParseError::UnexpectedEnd {
                span: self.current.span,
            }
        } else {
            ParseError::Parser {
                span: self.current.span,
                message: message.into(),
            }
        }
    }

    /// Expect a token, error if not found
    fn expect(&mut self, expected: Token, what: &str) -> Result<SpannedToken> {
        if self.check(&expected) {
            self.advance()
        } else {
            Err(self.error(format!("Expected {}, found {:?}", what, self.peek())))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.peek() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            other => Err(self.error(format!("Expected identifier, found {:?}", other))),
        }
    }

    /// Semicolons may be left out before `}`, at the end of input and at a
    /// line break.
    fn consume_semicolon(&mut self) -> Result<()> {
        if self.eat(&Token::Semicolon)? {
            return Ok(());
        }
        if self.check(&Token::RBrace) || self.is_eof() || self.current.newline_before {
            return Ok(());
        }
        Err(self.error(format!("Expected ;, found {:?}", self.peek())))
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.prev_end.max(start))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    pub fn parse_program(&mut self) -> Result<Program> {
        let start = self.current.span.start;
        let mut body = Vec::new();
        while !self.is_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Program {
            body,
            standalone_docs: self.lexer.take_standalone_docs(),
            span: Span::new(start.min(self.prev_end), self.prev_end),
        })
    }

    pub fn parse_until_right_curly(&mut self) -> Result<(Program, usize)> {
        let start = self.current.span.start;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.is_eof() {
                return Err(self.error("Expected }"));
            }
            body.push(self.parse_statement()?);
        }
        let end = self.current.span.start;
        let program = Program {
            body,
            standalone_docs: self.lexer.take_standalone_docs(),
            span: Span::new(start.min(end), end),
        };
        Ok((program, end))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(Token::LBrace, "{")?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.is_eof() {
                return Err(self.error("Expected }"));
            }
            body.push(self.parse_statement()?);
        }
        self.advance()?;
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        let start = self.current.span.start;
        let line = self.current.line;
        let doc = self.current.doc.clone();
        let labeled = matches!(self.peek(), Token::Identifier(_))
            && self.peek2_is(|t| matches!(t, Token::Colon))?;

        let kind = match self.peek() {
            _ if labeled => {
                let label = self.expect_identifier()?;
                self.advance()?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::Labeled { label, body }
            }
            Token::LBrace => StmtKind::Block(self.parse_block()?),
            Token::Var | Token::Let | Token::Const => {
                let (kind, decls) = self.parse_var_decls(false)?;
                self.consume_semicolon()?;
                StmtKind::Var { kind, decls }
            }
            Token::Function => {
                let function = self.parse_function(true)?;
                StmtKind::Function(function)
            }
            Token::If => self.parse_if()?,
            Token::For => self.parse_for()?,
            Token::While => {
                self.advance()?;
                self.expect(Token::LParen, "(")?;
                let test = self.parse_expression(false)?;
                self.expect(Token::RParen, ")")?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::While { test, body }
            }
            Token::Do => {
                self.advance()?;
                let body = Box::new(self.parse_statement()?);
                self.expect(Token::While, "while")?;
                self.expect(Token::LParen, "(")?;
                let test = self.parse_expression(false)?;
                self.expect(Token::RParen, ")")?;
                self.eat(&Token::Semicolon)?;
                StmtKind::DoWhile { body, test }
            }
            Token::Return => {
                self.advance()?;
                let arg = if self.check(&Token::Semicolon)
                    || self.check(&Token::RBrace)
                    || self.is_eof()
                    || self.current.newline_before
                {
                    None
                } else {
                    Some(self.parse_expression(false)?.with_doc(doc))
                };
                self.consume_semicolon()?;
                StmtKind::Return(arg)
            }
            Token::Break | Token::Continue => {
                let is_break = self.check(&Token::Break);
                self.advance()?;
                let label = match self.peek() {
                    Token::Identifier(name) if !self.current.newline_before => {
                        let name = name.clone();
                        self.advance()?;
                        Some(name)
                    }
                    _ => None,
                };
                self.consume_semicolon()?;
                if is_break {
                    StmtKind::Break(label)
                } else {
                    StmtKind::Continue(label)
                }
            }
            Token::Throw => {
                self.advance()?;
                let arg = self.parse_expression(false)?;
                self.consume_semicolon()?;
                StmtKind::Throw(arg)
            }
            Token::Try => self.parse_try()?,
            Token::Switch => self.parse_switch()?,
            Token::With => {
                self.advance()?;
                self.expect(Token::LParen, "(")?;
                let object = self.parse_expression(false)?;
                self.expect(Token::RParen, ")")?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::With { object, body }
            }
            Token::Semicolon => {
                self.advance()?;
                StmtKind::Empty
            }
            Token::Debugger => {
                self.advance()?;
                self.consume_semicolon()?;
                StmtKind::Debugger
            }
            _ => {
                let expr = self.parse_expression(false)?;
                self.consume_semicolon()?;
                StmtKind::Expr(attach_statement_doc(expr, doc))
            }
        };

        Ok(Stmt {
            kind,
            span: self.span_from(start),
            line,
        })
    }

    fn parse_var_decls(&mut self, no_in: bool) -> Result<(VarKind, Vec<Declarator>)> {
        let keyword = self.advance()?;
        let kind = match keyword.token {
            Token::Let => VarKind::Let,
            Token::Const => VarKind::Const,
            _ => VarKind::Var,
        };

        let mut decls = Vec::new();
        let mut doc = keyword.doc;
        loop {
            let start = self.current.span.start;
            if self.current.doc.is_some() {
                doc = self.current.doc.clone();
            }
            let name = self.expect_identifier()?;
            let init = if self.eat(&Token::Eq)? {
                Some(self.parse_assignment(no_in)?.with_doc(doc.take()))
            } else {
                None
            };
            decls.push(Declarator {
                name,
                init,
                span: self.span_from(start),
            });
            if !self.eat(&Token::Comma)? {
                break;
            }
        }
        Ok((kind, decls))
    }

    fn parse_if(&mut self) -> Result<StmtKind> {
        self.advance()?;
        self.expect(Token::LParen, "(")?;
        let test = self.parse_expression(false)?;
        self.expect(Token::RParen, ")")?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat(&Token::Else)? {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(StmtKind::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_for(&mut self) -> Result<StmtKind> {
        self.advance()?;
        self.expect(Token::LParen, "(")?;

        let init = match self.peek() {
            Token::Semicolon => None,
            Token::Var | Token::Let | Token::Const => {
                let (kind, decls) = self.parse_var_decls(true)?;
                Some(ForInit::Var(kind, decls))
            }
            _ => Some(ForInit::Expr(self.parse_expression(true)?)),
        };

        if let Some(left) = init.as_ref().filter(|_| self.check(&Token::In)).cloned() {
            self.advance()?;
            let right = self.parse_expression(false)?;
            self.expect(Token::RParen, ")")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(StmtKind::ForIn { left, right, body });
        }

        self.expect(Token::Semicolon, ";")?;
        let test = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression(false)?)
        };
        self.expect(Token::Semicolon, ";")?;
        let update = if self.check(&Token::RParen) {
            None
        } else {
            Some(self.parse_expression(false)?)
        };
        self.expect(Token::RParen, ")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_try(&mut self) -> Result<StmtKind> {
        self.advance()?;
        let block = self.parse_block()?;
        let handler = if self.eat(&Token::Catch)? {
            self.expect(Token::LParen, "(")?;
            let param = self.expect_identifier()?;
            self.expect(Token::RParen, ")")?;
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat(&Token::Finally)? {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("try statement has no catch or finally"));
        }
        Ok(StmtKind::Try {
            block,
            handler,
            finalizer,
        })
    }

    fn parse_switch(&mut self) -> Result<StmtKind> {
        self.advance()?;
        self.expect(Token::LParen, "(")?;
        let discriminant = self.parse_expression(false)?;
        self.expect(Token::RParen, ")")?;
        self.expect(Token::LBrace, "{")?;

        let mut cases = Vec::new();
        while !self.eat(&Token::RBrace)? {
            let test = match self.peek() {
                Token::Case => {
                    self.advance()?;
                    Some(self.parse_expression(false)?)
                }
                Token::Default => {
                    self.advance()?;
                    None
                }
                other => {
                    return Err(self.error(format!("Expected case or default, found {:?}", other)))
                }
            };
            self.expect(Token::Colon, ":")?;
            let mut body = Vec::new();
            while !matches!(
                self.peek(),
                Token::Case | Token::Default | Token::RBrace | Token::Eof
            ) {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(StmtKind::Switch {
            discriminant,
            cases,
        })
    }

    // ========================================================================
    // Functions
    // ========================================================================

    fn parse_function(&mut self, is_declaration: bool) -> Result<Arc<Function>> {
        let keyword = self.expect(Token::Function, "function")?;
        let name = match self.peek() {
            Token::Identifier(_) => Some(self.expect_identifier()?),
            _ if is_declaration => {
                return Err(self.error("Function declarations need a name"));
            }
            _ => None,
        };
        self.parse_function_rest(name, keyword.span.start, keyword.line, keyword.doc)
    }

    /// Parameter list and body, starting at `(`.
    fn parse_function_rest(
        &mut self,
        name: Option<String>,
        start: usize,
        line: usize,
        doc: Option<Arc<DocComment>>,
    ) -> Result<Arc<Function>> {
        self.expect(Token::LParen, "(")?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            params.push(self.expect_identifier()?);
            if !self.eat(&Token::Comma)? {
                break;
            }
        }
        self.expect(Token::RParen, ")")?;
        let body = self.parse_block()?;
        Ok(Arc::new(Function {
            name,
            params,
            body,
            span: self.span_from(start),
            line,
            doc,
        }))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub fn parse_expression(&mut self, no_in: bool) -> Result<Expr> {
        let start = self.current.span.start;
        let line = self.current.line;
        let first = self.parse_assignment(no_in)?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(&Token::Comma)? {
            exprs.push(self.parse_assignment(no_in)?);
        }
        Ok(Expr::new(ExprKind::Sequence(exprs), self.span_from(start), line))
    }

    fn parse_assignment(&mut self, no_in: bool) -> Result<Expr> {
        let start = self.current.span.start;
        let line = self.current.line;
        let target = self.parse_conditional(no_in)?;

        let Some(op) = assign_op(self.peek()) else {
            return Ok(target);
        };
        if !matches!(
            target.kind,
            ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        ) {
            return Err(ParseError::Parser {
                span: target.span,
                message: "Invalid assignment target".to_string(),
            });
        }
        self.advance()?;
        let value = self.parse_assignment(no_in)?;
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            self.span_from(start),
            line,
        ))
    }

    fn parse_conditional(&mut self, no_in: bool) -> Result<Expr> {
        let start = self.current.span.start;
        let line = self.current.line;
        let test = self.parse_binary(1, no_in)?;
        if !self.eat(&Token::Question)? {
            return Ok(test);
        }
        let consequent = self.parse_assignment(false)?;
        self.expect(Token::Colon, ":")?;
        let alternate = self.parse_assignment(no_in)?;
        Ok(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            self.span_from(start),
            line,
        ))
    }

    fn parse_binary(&mut self, min_prec: u8, no_in: bool) -> Result<Expr> {
        let start = self.current.span.start;
        let line = self.current.line;
        let mut left = self.parse_unary()?;

        while let Some((prec, op)) = binary_op(self.peek(), no_in) {
            if prec < min_prec {
                break;
            }
            self.advance()?;
            let right = self.parse_binary(prec + 1, no_in)?;
            let kind = match op {
                BinOp::Binary(op) => ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                BinOp::Logical(op) => ExprKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
            left = Expr::new(kind, self.span_from(start), line);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.current.span.start;
        let line = self.current.line;
        let op = match self.peek() {
            Token::Bang => Some(UnaryOp::Not),
            Token::Minus => Some(UnaryOp::Neg),
            Token::Plus => Some(UnaryOp::Plus),
            Token::Tilde => Some(UnaryOp::BitNot),
            Token::Typeof => Some(UnaryOp::Typeof),
            Token::Void => Some(UnaryOp::Void),
            Token::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let arg = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    arg: Box::new(arg),
                },
                self.span_from(start),
                line,
            ));
        }

        if matches!(self.peek(), Token::PlusPlus | Token::MinusMinus) {
            let op = if self.check(&Token::PlusPlus) {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance()?;
            let arg = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Update {
                    op,
                    prefix: true,
                    arg: Box::new(arg),
                },
                self.span_from(start),
                line,
            ));
        }

        let expr = self.parse_call_member()?;
        if matches!(self.peek(), Token::PlusPlus | Token::MinusMinus) && !self.current.newline_before
        {
            let op = if self.check(&Token::PlusPlus) {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance()?;
            return Ok(Expr::new(
                ExprKind::Update {
                    op,
                    prefix: false,
                    arg: Box::new(expr),
                },
                self.span_from(start),
                line,
            ));
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        self.expect(Token::LParen, "(")?;
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            args.push(self.parse_assignment(false)?);
            if !self.eat(&Token::Comma)? {
                break;
            }
        }
        self.expect(Token::RParen, ")")?;
        Ok(args)
    }

    /// Property name after `.`; keywords are allowed.
    fn parse_member_name(&mut self) -> Result<String> {
        let token = self.advance()?;
        match token.token {
            Token::Identifier(name) => Ok(name),
            other => other.keyword_text().map(str::to_string).ok_or_else(|| ParseError::Parser {
                span: token.span,
                message: format!("Expected property name, found {:?}", other),
            }),
        }
    }

    /// Member accesses (and calls, when `allow_calls`) trailing `expr`.
    fn parse_suffixes(&mut self, mut expr: Expr, start: usize, allow_calls: bool) -> Result<Expr> {
        let line = expr.line;
        loop {
            let kind = match self.peek() {
                Token::Dot => {
                    self.advance()?;
                    let property = self.parse_member_name()?;
                    ExprKind::Member {
                        object: Box::new(expr),
                        property,
                    }
                }
                Token::LBracket => {
                    self.advance()?;
                    let index = self.parse_expression(false)?;
                    self.expect(Token::RBracket, "]")?;
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    }
                }
                Token::LParen if allow_calls => {
                    let args = self.parse_arguments()?;
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    }
                }
                _ => return Ok(expr),
            };
            expr = Expr::new(kind, self.span_from(start), line);
        }
    }

    fn parse_call_member(&mut self) -> Result<Expr> {
        let start = self.current.span.start;
        let base = if self.check(&Token::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        self.parse_suffixes(base, start, true)
    }

    fn parse_new(&mut self) -> Result<Expr> {
        let start = self.current.span.start;
        let line = self.current.line;
        self.expect(Token::New, "new")?;
        let callee = if self.check(&Token::New) {
            self.parse_new()?
        } else {
            let primary = self.parse_primary()?;
            self.parse_suffixes(primary, start, false)?
        };
        let args = if self.check(&Token::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::new(
            ExprKind::New {
                callee: Box::new(callee),
                args,
            },
            self.span_from(start),
            line,
        ))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.current.span.start;
        let line = self.current.line;

        let kind = match self.peek() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                ExprKind::Ident(name)
            }
            Token::This => {
                self.advance()?;
                ExprKind::This
            }
            Token::Null => {
                self.advance()?;
                ExprKind::Null
            }
            Token::True | Token::False => {
                let value = self.check(&Token::True);
                self.advance()?;
                ExprKind::Bool(value)
            }
            Token::Number(n) => {
                let n = *n;
                self.advance()?;
                ExprKind::Number(n)
            }
            Token::String(s) => {
                let s = s.clone();
                self.advance()?;
                ExprKind::String(s)
            }
            Token::Slash | Token::SlashEq => {
                // a slash in operand position starts a regular expression
                self.ahead = None;
                self.current = self.lexer.rescan_regex(start, &self.current)?;
                let token = self.advance()?;
                match token.token {
                    Token::Regex { pattern, flags } => ExprKind::Regex { pattern, flags },
                    _ => return Err(self.error("Expected regular expression")),
                }
            }
            Token::LParen => {
                self.advance()?;
                let inner = self.parse_expression(false)?;
                self.expect(Token::RParen, ")")?;
                return Ok(inner);
            }
            Token::LBracket => self.parse_array()?,
            Token::LBrace => self.parse_object()?,
            Token::Function => {
                let doc = self.current.doc.clone();
                let function = self.parse_function(false)?;
                return Ok(Expr::new(
                    ExprKind::Function(function),
                    self.span_from(start),
                    line,
                )
                .with_doc(doc));
            }
            other => return Err(self.error(format!("Unexpected token {:?}", other))),
        };

        Ok(Expr::new(kind, self.span_from(start), line))
    }

    fn parse_array(&mut self) -> Result<ExprKind> {
        self.expect(Token::LBracket, "[")?;
        let mut elements = Vec::new();
        loop {
            match self.peek() {
                Token::RBracket => break,
                Token::Comma => {
                    self.advance()?;
                    elements.push(None);
                }
                _ => {
                    elements.push(Some(self.parse_assignment(false)?));
                    if !self.eat(&Token::Comma)? {
                        break;
                    }
                }
            }
        }
        self.expect(Token::RBracket, "]")?;
        Ok(ExprKind::Array(elements))
    }

    fn property_key(&self, token: &SpannedToken) -> Result<String> {
        match &token.token {
            Token::Identifier(name) | Token::String(name) => Ok(name.clone()),
            Token::Number(n) => Ok(number_key(*n)),
            other => other
                .keyword_text()
                .map(str::to_string)
                .ok_or_else(|| ParseError::Parser {
                    span: token.span,
                    message: format!("Expected property name, found {:?}", other),
                }),
        }
    }

    fn parse_object(&mut self) -> Result<ExprKind> {
        self.expect(Token::LBrace, "{")?;
        let mut properties = Vec::new();
        let mut group: Option<Arc<GroupMarker>> = None;

        loop {
            if let Some(marker) = self.current.group.clone() {
                group = marker.name.is_some().then_some(marker);
            }
            if self.check(&Token::RBrace) {
                break;
            }

            let start = self.current.span.start;
            let line = self.current.line;
            let doc = self.current.doc.clone();
            let key_token = self.advance()?;
            let key = self.property_key(&key_token)?;

            let is_accessor = matches!(&key_token.token, Token::Identifier(word) if word == "get" || word == "set")
                && !matches!(
                    self.peek(),
                    Token::Colon | Token::Comma | Token::RBrace | Token::LParen
                );

            let value = if is_accessor {
                let name_token = self.advance()?;
                let name = self.property_key(&name_token)?;
                let function =
                    self.parse_function_rest(Some(name.clone()), start, line, doc.clone())?;
                let value = if key == "get" {
                    PropValue::Getter(function)
                } else {
                    PropValue::Setter(function)
                };
                properties.push(Property {
                    key: name,
                    value,
                    span: self.span_from(start),
                    line,
                    doc,
                    group: group.clone(),
                });
                if !self.eat(&Token::Comma)? {
                    break;
                }
                continue;
            } else if self.check(&Token::LParen) {
                let function =
                    self.parse_function_rest(Some(key.clone()), start, line, doc.clone())?;
                PropValue::Init(
                    Expr::new(ExprKind::Function(function), self.span_from(start), line)
                        .with_doc(doc.clone()),
                )
            } else {
                self.expect(Token::Colon, ":")?;
                PropValue::Init(self.parse_assignment(false)?.with_doc(doc.clone()))
            };

            properties.push(Property {
                key,
                value,
                span: self.span_from(start),
                line,
                doc,
                group: group.clone(),
            });
            if !self.eat(&Token::Comma)? {
                break;
            }
        }

        self.expect(Token::RBrace, "}")?;
        Ok(ExprKind::Object(properties))
    }
}

/// Documentation in front of `a.b = value;` describes `value`.
fn attach_statement_doc(expr: Expr, doc: Option<Arc<DocComment>>) -> Expr {
    match expr.kind {
        ExprKind::Assign { op, target, value } => Expr {
            kind: ExprKind::Assign {
                op,
                target,
                value: Box::new(value.with_doc(doc)),
            },
            ..expr
        },
        _ => expr,
    }
}
