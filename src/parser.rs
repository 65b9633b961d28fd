use crate::ast::{BinOp, Expr, Function, Param, Program, RetKind, Stmt, UnOp};
use crate::error::{CompileError, Diagnostics, ErrorKind};
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

/// Parse a token slice into a Program. Any number of errors may be
/// reported; the tree is discarded whenever at least one was.
pub fn parse(tokens: &[Token]) -> Result<Program, Diagnostics> {
    let mut p = Parser {
        tokens,
        pos: 0,
        diags: Diagnostics::new(),
        recovering: false,
    };
    let program = p.parse_program();
    if p.diags.has_errors() {
        Err(p.diags)
    } else {
        Ok(program)
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    diags: Diagnostics,
    recovering: bool,
}

impl<'a> Parser<'a> {
    fn parse_program(&mut self) -> Program {
        let mut functions = Vec::new();
        while !self.is_end() {
            let start = self.pos;
            match self.parse_function() {
                Ok(f) => functions.push(f),
                Err(e) => {
                    self.report(e);
                    self.synchronize();
                    // A bad token that is itself a leader would stall.
                    if self.pos == start && !self.is_end() {
                        self.bump();
                    }
                }
            }
        }
        Program { functions }
    }

    fn parse_function(&mut self) -> Result<Function, CompileError> {
        let start_span = self.here();
        let ret = match self.peek_kind() {
            Some(TokenKind::IntKeyword) => {
                self.bump();
                RetKind::Int
            }
            Some(TokenKind::VoidKeyword) => {
                self.bump();
                RetKind::Void
            }
            _ => {
                return Err(CompileError::new_with_span(
                    ErrorKind::InvalidReturnType,
                    format!(
                        "Expected 'int' or 'void' return type, found {}",
                        self.describe_here()
                    ),
                    self.here(),
                ));
            }
        };
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen)?;

        let mut params = Vec::new();
        if !self.peek_is(TokenKind::RParen) {
            loop {
                self.expect(&TokenKind::IntKeyword)?;
                let span = self.here();
                let pname = self.expect_identifier()?;
                params.push(Param { name: pname, span });
                if !self.consume_if(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        let span = Span::merge(start_span, body.span());

        Ok(Function {
            ret,
            name,
            params,
            body,
            span,
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        match self.peek_kind() {
            Some(TokenKind::ReturnKeyword) => {
                let start = self.bump().unwrap().span;
                let expr = if self.peek_is(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let end = self.expect(&TokenKind::Semicolon)?.span;
                Ok(Stmt::Return(expr, Span::merge(start, end)))
            }
            Some(TokenKind::BreakKeyword) => {
                let start = self.bump().unwrap().span;
                let end = self.expect(&TokenKind::Semicolon)?.span;
                Ok(Stmt::Break(Span::merge(start, end)))
            }
            Some(TokenKind::ContinueKeyword) => {
                let start = self.bump().unwrap().span;
                let end = self.expect(&TokenKind::Semicolon)?.span;
                Ok(Stmt::Continue(Span::merge(start, end)))
            }
            Some(TokenKind::IfKeyword) => self.parse_if_stmt(),
            Some(TokenKind::WhileKeyword) => self.parse_while_stmt(),
            Some(TokenKind::LBrace) => self.parse_block(),
            Some(TokenKind::IntKeyword) => self.parse_declaration(),
            Some(TokenKind::Semicolon) => {
                let span = self.bump().unwrap().span;
                Ok(Stmt::Expr(None, span))
            }
            Some(TokenKind::Identifier(_))
                if matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::Assign)) =>
            {
                // `IDENT =` starts an assignment, anything else an
                // identifier-led expression statement.
                let start = self.here();
                let name = self.expect_identifier()?;
                self.expect(&TokenKind::Assign)?;
                let value = self.parse_expr()?;
                let end = self.expect(&TokenKind::Semicolon)?.span;
                Ok(Stmt::Assign {
                    name,
                    value,
                    span: Span::merge(start, end),
                })
            }
            _ => {
                let expr = self.parse_expr()?;
                let end = self.expect(&TokenKind::Semicolon)?.span;
                let span = Span::merge(expr.span(), end);
                Ok(Stmt::Expr(Some(expr), span))
            }
        }
    }

    fn parse_declaration(&mut self) -> Result<Stmt, CompileError> {
        let start = self.expect(&TokenKind::IntKeyword)?.span;
        let name = self.expect_identifier()?;
        // Initialization is mandatory in the dialect.
        self.expect(&TokenKind::Assign)?;
        let init = self.parse_expr()?;
        let end = self.expect(&TokenKind::Semicolon)?.span;
        Ok(Stmt::Declare {
            name,
            init,
            span: Span::merge(start, end),
        })
    }

    fn parse_block(&mut self) -> Result<Stmt, CompileError> {
        let start = self.expect(&TokenKind::LBrace)?.span;
        let mut stmts = Vec::new();
        while !self.peek_is(TokenKind::RBrace) && !self.is_end() {
            match self.parse_stmt() {
                Ok(s) => stmts.push(s),
                Err(e) => {
                    self.report(e);
                    self.synchronize();
                }
            }
        }
        let end = self.expect(&TokenKind::RBrace)?.span;
        Ok(Stmt::Block(stmts, Span::merge(start, end)))
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.expect(&TokenKind::IfKeyword)?.span;
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.consume_if(&TokenKind::ElseKeyword) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        let end = else_branch
            .as_ref()
            .map(|s| s.span())
            .unwrap_or_else(|| then_branch.span());
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: Span::merge(start, end),
        })
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.expect(&TokenKind::WhileKeyword)?.span;
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_stmt()?);
        let span = Span::merge(start, body.span());
        Ok(Stmt::While {
            condition,
            body,
            span,
        })
    }

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_lor()
    }

    fn parse_lor(&mut self) -> Result<Expr, CompileError> {
        let mut node = self.parse_land()?;
        while self.peek_is(TokenKind::PipePipe) {
            self.bump();
            let right = self.parse_land()?;
            let span = Span::merge(node.span(), right.span());
            node = Expr::Binary {
                op: BinOp::LogicOr,
                left: Box::new(node),
                right: Box::new(right),
                span,
            };
        }
        Ok(node)
    }

    fn parse_land(&mut self) -> Result<Expr, CompileError> {
        let mut node = self.parse_rel()?;
        while self.peek_is(TokenKind::AmpAmp) {
            self.bump();
            let right = self.parse_rel()?;
            let span = Span::merge(node.span(), right.span());
            node = Expr::Binary {
                op: BinOp::LogicAnd,
                left: Box::new(node),
                right: Box::new(right),
                span,
            };
        }
        Ok(node)
    }

    // One flat left-associative level for all six comparisons.
    fn parse_rel(&mut self) -> Result<Expr, CompileError> {
        let mut node = self.parse_add()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::LessThan) => BinOp::Lt,
                Some(TokenKind::LessThanEqual) => BinOp::LtEq,
                Some(TokenKind::GreaterThan) => BinOp::Gt,
                Some(TokenKind::GreaterThanEqual) => BinOp::GtEq,
                Some(TokenKind::EqualTo) => BinOp::Eq,
                Some(TokenKind::NotEqual) => BinOp::NotEq,
                _ => break,
            };
            self.bump();
            let right = self.parse_add()?;
            let span = Span::merge(node.span(), right.span());
            node = Expr::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
                span,
            };
        }
        Ok(node)
    }

    fn parse_add(&mut self) -> Result<Expr, CompileError> {
        let mut node = self.parse_mul()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_mul()?;
            let span = Span::merge(node.span(), right.span());
            node = Expr::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
                span,
            };
        }
        Ok(node)
    }

    fn parse_mul(&mut self) -> Result<Expr, CompileError> {
        let mut node = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::Percent) => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.parse_unary()?;
            let span = Span::merge(node.span(), right.span());
            node = Expr::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
                span,
            };
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => Some(UnOp::Plus),
            Some(TokenKind::Minus) => Some(UnOp::Neg),
            Some(TokenKind::Bang) => Some(UnOp::LogicNot),
            _ => None,
        };
        if let Some(op) = op {
            let op_tok = self.bump().unwrap();
            let expr = self.parse_unary()?;
            let span = Span::merge(op_tok.span, expr.span());
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let tok = self.bump().ok_or_else(|| {
            CompileError::new_with_span(
                ErrorKind::UnexpectedToken,
                "Unexpected end of input",
                self.last_span(),
            )
        })?;
        match &tok.kind {
            TokenKind::Number(v) => Ok(Expr::Number {
                value: *v,
                span: tok.span,
            }),
            TokenKind::Identifier(name) => {
                if self.peek_is(TokenKind::LParen) {
                    self.parse_call(name.clone(), tok.span)
                } else {
                    Ok(Expr::Variable {
                        name: name.clone(),
                        span: tok.span,
                    })
                }
            }
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(CompileError::new_with_span(
                ErrorKind::UnexpectedToken,
                format!("Expected expression, found {:?}", tok.kind),
                tok.span,
            )),
        }
    }

    fn parse_call(&mut self, name: String, start_span: Span) -> Result<Expr, CompileError> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.peek_is(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.consume_if(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end_tok = self.expect(&TokenKind::RParen)?;
        let span = Span::merge(start_span, end_tok.span);
        Ok(Expr::Call { name, args, span })
    }

    // ---- recovery ----

    fn report(&mut self, err: CompileError) {
        // One diagnostic per recovery window; cascading errors from the
        // same bad region are noise.
        if !self.recovering {
            self.diags.error(err);
        }
        self.recovering = true;
    }

    /// Skip to just past the next `;`, or stop in front of a token that
    /// can lead a declaration or statement.
    fn synchronize(&mut self) {
        while !self.is_end() {
            if self.peek_is(TokenKind::Semicolon) {
                self.bump();
                break;
            }
            match self.peek_kind() {
                Some(TokenKind::IntKeyword)
                | Some(TokenKind::VoidKeyword)
                | Some(TokenKind::IfKeyword)
                | Some(TokenKind::ElseKeyword)
                | Some(TokenKind::WhileKeyword)
                | Some(TokenKind::BreakKeyword)
                | Some(TokenKind::ContinueKeyword)
                | Some(TokenKind::ReturnKeyword)
                | Some(TokenKind::LBrace)
                | Some(TokenKind::RBrace) => break,
                _ => {
                    self.bump();
                }
            }
        }
        self.recovering = false;
    }

    // ---- cursor helpers ----

    fn is_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind.clone())
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek_kind().map_or(false, |k| {
            std::mem::discriminant(&k) == std::mem::discriminant(&kind)
        })
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn consume_if(&mut self, kind: &TokenKind) -> bool {
        if self.peek_is(kind.clone()) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn here(&self) -> Span {
        self.peek().map(|t| t.span).unwrap_or_else(|| self.last_span())
    }

    fn last_span(&self) -> Span {
        self.tokens
            .last()
            .map(|t| t.span)
            .unwrap_or(Span { start: 0, end: 0 })
    }

    fn describe_here(&self) -> String {
        match self.peek() {
            Some(tok) => format!("{:?}", tok.kind),
            None => "end of input".to_string(),
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<&'a Token, CompileError> {
        let next_token = self.peek().ok_or_else(|| {
            CompileError::new_with_span(
                ErrorKind::MissingToken,
                format!("Expected {kind:?}, but found end of input"),
                self.last_span(),
            )
        })?;

        if std::mem::discriminant(&next_token.kind) == std::mem::discriminant(kind) {
            Ok(self.bump().unwrap())
        } else {
            Err(CompileError::new_with_span(
                ErrorKind::MissingToken,
                format!("Expected {kind:?}, found {:?}", next_token.kind),
                next_token.span,
            ))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, CompileError> {
        let tok = self.bump().ok_or_else(|| {
            CompileError::new_with_span(
                ErrorKind::MissingToken,
                "Expected identifier, found end of input",
                self.last_span(),
            )
        })?;

        if let TokenKind::Identifier(name) = &tok.kind {
            Ok(name.clone())
        } else {
            Err(CompileError::new_with_span(
                ErrorKind::MissingToken,
                format!("Expected identifier, found {:?}", tok.kind),
                tok.span,
            ))
        }
    }
}
