use super::ast::{BinaryOp, Block, Expr, ExprKind, ForBinding, Ident, Literal, Program, Stmt, UnaryOp};
use super::token::{Token, TokenKind};
use crate::error::syntax::{SyntaxError, SyntaxErrorKind};
use crate::grammar::{ErrorReporter, Limits};
use crate::range::Range;

/// Error-recovering recursive-descent parser for the script language.
///
/// Expressions, unary operands and blocks each count as one nesting level.
/// Past `max_depth` the rest of the nested construct is skipped and a single
/// `NestingTooDeep` error node takes its place.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    max_depth: usize,
    errors: ErrorReporter,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self::with_limits(tokens, Limits::default())
    }

    pub fn with_limits(tokens: &'a [Token], limits: Limits) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth: limits.max_depth,
            errors: ErrorReporter::new(limits.max_errors),
        }
    }

    pub fn parse_program(mut self) -> (Program, ErrorReporter) {
        let statements = self.parse_statements(false);
        (Program { statements }, self.errors)
    }

    /// A program whose last statement must produce a value.
    pub fn parse_rule(mut self) -> (Program, ErrorReporter) {
        let mut statements = self.parse_statements(false);

        if !statements.last().is_some_and(Stmt::is_value) {
            let token = self.current();
            let error = SyntaxError::new(SyntaxErrorKind::MissingValue, token.range, token.text());
            self.errors.report(error.clone());
            statements.push(Stmt::Error(error));
        }

        (Program { statements }, self.errors)
    }

    pub fn parse_expression(mut self) -> (Expr, ErrorReporter) {
        let expr = self.parse_expr();
        let expr = self.expect_eof(expr);
        (expr, self.errors)
    }

    pub fn parse_binding(mut self) -> (ForBinding, ErrorReporter) {
        let binding = match (&self.current().kind, self.peek_kind(1)) {
            (TokenKind::Ident(name), Some(TokenKind::In)) => {
                let variable = Ident::new(name.clone(), self.current().range);
                self.advance();
                self.advance();
                let iterable = self.parse_expr();
                ForBinding { variable, iterable }
            }
            _ => {
                let iterable = self.parse_expr();
                ForBinding {
                    variable: Ident::new(ForBinding::DEFAULT_VARIABLE, iterable.range),
                    iterable,
                }
            }
        };

        let iterable = self.expect_eof(binding.iterable);
        (
            ForBinding {
                variable: binding.variable,
                iterable,
            },
            self.errors,
        )
    }

    fn expect_eof(&mut self, expr: Expr) -> Expr {
        if self.at_eof() {
            expr
        } else {
            let error = self.unexpected();
            self.pos = self.tokens.len().saturating_sub(1);
            Expr::error(error)
        }
    }

    fn parse_statements(&mut self, in_block: bool) -> Vec<Stmt> {
        let mut statements = Vec::new();

        loop {
            match &self.current().kind {
                TokenKind::Eof => break,
                TokenKind::RBrace if in_block => break,
                TokenKind::SemiColon => {
                    self.advance();
                    continue;
                }
                _ => {}
            }

            let start = self.pos;
            statements.push(self.parse_statement());

            if self.pos == start {
                self.advance();
            }
        }

        statements
    }

    fn parse_statement(&mut self) -> Stmt {
        match (&self.current().kind, self.peek_kind(1)) {
            (TokenKind::Let, _) => self.parse_let(),
            (TokenKind::If, _) => self.parse_if(),
            (TokenKind::For, _) => self.parse_for(),
            (TokenKind::Return, _) => self.parse_return(),
            (TokenKind::Ident(name), Some(TokenKind::Equal)) => {
                let target = Ident::new(name.clone(), self.current().range);
                self.advance();
                self.advance();
                let value = self.parse_expr();
                self.eat(&TokenKind::SemiColon);
                Stmt::Assign { target, value }
            }
            (TokenKind::RBrace, _) | (TokenKind::RParen, _) | (TokenKind::RBracket, _) => {
                let error = self.unexpected();
                self.advance();
                Stmt::Error(error)
            }
            _ => {
                let expr = self.parse_expr();
                self.eat(&TokenKind::SemiColon);
                Stmt::Expr(expr)
            }
        }
    }

    fn parse_let(&mut self) -> Stmt {
        self.advance();

        let name = match &self.current().kind {
            TokenKind::Ident(name) => {
                let ident = Ident::new(name.clone(), self.current().range);
                self.advance();
                ident
            }
            _ => return self.recover_statement(SyntaxErrorKind::Expected("an identifier".into())),
        };

        if !self.eat(&TokenKind::Equal) {
            return self.recover_statement(SyntaxErrorKind::Expected("`=`".into()));
        }

        let value = self.parse_expr();
        self.eat(&TokenKind::SemiColon);
        Stmt::Let { name, value }
    }

    fn parse_if(&mut self) -> Stmt {
        self.advance();
        let condition = self.parse_condition();
        let then = self.parse_block();

        let otherwise = if self.eat(&TokenKind::Else) {
            if matches!(self.current().kind, TokenKind::If) {
                let start = self.current().range;
                let nested = self.nested(Self::parse_if, Stmt::Error);
                let range = start.merge(&self.previous_range());
                Some(Block {
                    statements: vec![nested],
                    range,
                })
            } else {
                Some(self.parse_block())
            }
        } else {
            None
        };

        Stmt::If {
            condition,
            then,
            otherwise,
        }
    }

    fn parse_for(&mut self) -> Stmt {
        self.advance();
        let open = self.expect(&TokenKind::LParen, SyntaxErrorKind::Expected("`(`".into()));

        let binding = match &self.current().kind {
            TokenKind::Ident(name) => {
                let ident = Ident::new(name.clone(), self.current().range);
                self.advance();
                ident
            }
            _ => return self.recover_statement(SyntaxErrorKind::Expected("an identifier".into())),
        };

        if !self.eat(&TokenKind::In) {
            return self.recover_statement(SyntaxErrorKind::Expected("`in`".into()));
        }

        let iterable = self.parse_expr();
        let close = match open {
            None => self.expect(&TokenKind::RParen, SyntaxErrorKind::ExpectedClosingParen),
            Some(_) => None,
        };
        let iterable = match open.or(close) {
            Some(error) => Expr::error(error),
            None => iterable,
        };

        let body = self.parse_block();
        Stmt::For {
            binding,
            iterable,
            body,
        }
    }

    fn parse_return(&mut self) -> Stmt {
        let range = self.current().range;
        self.advance();

        let value = match &self.current().kind {
            TokenKind::SemiColon | TokenKind::RBrace | TokenKind::Eof => None,
            _ => Some(self.parse_expr()),
        };
        self.eat(&TokenKind::SemiColon);

        Stmt::Return {
            value,
            range: range.merge(&self.previous_range()),
        }
    }

    fn parse_condition(&mut self) -> Expr {
        let open = self.expect(&TokenKind::LParen, SyntaxErrorKind::Expected("`(`".into()));
        let condition = self.parse_expr();
        let close = match open {
            None => self.expect(&TokenKind::RParen, SyntaxErrorKind::ExpectedClosingParen),
            Some(_) => None,
        };

        match open.or(close) {
            Some(error) => Expr::error(error),
            None => condition,
        }
    }

    fn parse_block(&mut self) -> Block {
        let start = self.current().range;
        self.nested(Self::parse_braced, |error| Block {
            statements: vec![Stmt::Error(error)],
            range: start,
        })
    }

    fn parse_braced(&mut self) -> Block {
        let start = self.current().range;

        if let Some(error) = self.expect(&TokenKind::LBrace, SyntaxErrorKind::Expected("`{`".into())) {
            return Block {
                statements: vec![Stmt::Error(error)],
                range: start,
            };
        }

        let mut statements = self.parse_statements(true);

        if !self.eat(&TokenKind::RBrace) {
            let token = self.current();
            let error = SyntaxError::new(SyntaxErrorKind::ExpectedClosingBrace, token.range, token.text());
            self.errors.report(error.clone());
            statements.push(Stmt::Error(error));
        }

        Block {
            statements,
            range: start.merge(&self.previous_range()),
        }
    }

    fn recover_statement(&mut self, kind: SyntaxErrorKind) -> Stmt {
        let token = self.current();
        let error = SyntaxError::new(kind, token.range, token.text());
        self.errors.report(error.clone());

        while !matches!(
            self.current().kind,
            TokenKind::SemiColon | TokenKind::RBrace | TokenKind::Eof
        ) {
            self.advance();
        }
        self.eat(&TokenKind::SemiColon);

        Stmt::Error(error)
    }

    pub(crate) fn parse_expr(&mut self) -> Expr {
        self.nested(Self::parse_conditional, Expr::error)
    }

    fn parse_conditional(&mut self) -> Expr {
        let condition = self.parse_binary(0);

        if !self.eat(&TokenKind::Question) {
            return condition;
        }

        let then = self.parse_expr();
        if !self.eat(&TokenKind::Colon) {
            let error = self.unexpected_as(SyntaxErrorKind::Expected("`:`".into()));
            return Expr::error(error);
        }
        let otherwise = self.parse_expr();
        let range = condition.range.merge(&otherwise.range);

        Expr::new(
            ExprKind::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            range,
        )
    }

    /// Precedence climbing over the binary operator table, lowest level first.
    fn parse_binary(&mut self, level: usize) -> Expr {
        const LEVELS: usize = 6;

        if level == LEVELS {
            return self.parse_unary();
        }

        let mut left = self.parse_binary(level + 1);

        while let Some(op) = binary_op(&self.current().kind, level) {
            self.advance();
            let right = self.parse_binary(level + 1);
            let range = left.range.merge(&right.range);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                range,
            );
        }

        left
    }

    fn parse_unary(&mut self) -> Expr {
        let op = match &self.current().kind {
            TokenKind::Bang | TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };

        let start = self.current().range;
        self.advance();
        let operand = self.nested(Self::parse_unary, Expr::error);
        let range = start.merge(&operand.range);

        Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            range,
        )
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();

        loop {
            match &self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = match &self.current().kind {
                        TokenKind::Ident(name) => Ident::new(name.clone(), self.current().range),
                        _ => return Expr::error(self.unexpected_as(SyntaxErrorKind::Expected("a member name".into()))),
                    };
                    self.advance();

                    if matches!(self.current().kind, TokenKind::LParen) {
                        let mut args = vec![expr];
                        args.extend(self.parse_args(TokenKind::RParen, SyntaxErrorKind::ExpectedClosingParen));
                        let range = args[0].range.merge(&self.previous_range());
                        expr = Expr::new(ExprKind::Call { function: name, args }, range);
                    } else {
                        let range = expr.range.merge(&name.range);
                        expr = Expr::new(
                            ExprKind::Member {
                                target: Box::new(expr),
                                name,
                            },
                            range,
                        );
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr();
                    let index = match self.expect(&TokenKind::RBracket, SyntaxErrorKind::ExpectedClosingBracket) {
                        Some(error) => Expr::error(error),
                        None => index,
                    };
                    let range = expr.range.merge(&self.previous_range());
                    expr = Expr::new(
                        ExprKind::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                        },
                        range,
                    );
                }
                TokenKind::LParen => {
                    let function = match &expr.kind {
                        ExprKind::Ident(name) => Ident::new(name.clone(), expr.range),
                        _ => return Expr::error(self.unexpected()),
                    };
                    let args = self.parse_args(TokenKind::RParen, SyntaxErrorKind::ExpectedClosingParen);
                    let range = expr.range.merge(&self.previous_range());
                    expr = Expr::new(ExprKind::Call { function, args }, range);
                }
                _ => return expr,
            }
        }
    }

    /// Parses `( a, b, ... )` or `[ a, b, ... ]`; the opening token is current.
    fn parse_args(&mut self, close: TokenKind, missing: SyntaxErrorKind) -> Vec<Expr> {
        self.advance();
        let mut args = Vec::new();

        if self.eat(&close) {
            return args;
        }

        loop {
            args.push(self.parse_expr());

            if self.eat(&TokenKind::Comma) {
                continue;
            }
            if !self.eat(&close) {
                args.push(Expr::error(self.unexpected_as(missing)));
            }
            return args;
        }
    }

    fn parse_primary(&mut self) -> Expr {
        let token = self.current().clone();

        let kind = match &token.kind {
            TokenKind::NumberLiteral(n) => ExprKind::Literal(Literal::Number(*n)),
            TokenKind::StringLiteral(s) => ExprKind::Literal(Literal::String(s.clone())),
            TokenKind::True => ExprKind::Literal(Literal::Bool(true)),
            TokenKind::False => ExprKind::Literal(Literal::Bool(false)),
            TokenKind::Null => ExprKind::Literal(Literal::Null),
            TokenKind::Ident(name) => ExprKind::Ident(name.clone()),
            TokenKind::RuntimeMember(name) => ExprKind::RuntimeMember(name.clone()),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr();
                if !self.eat(&TokenKind::RParen) {
                    return Expr::error(self.unexpected_as(SyntaxErrorKind::ExpectedClosingParen));
                }
                return expr;
            }
            TokenKind::LBracket => {
                let items = self.parse_args(TokenKind::RBracket, SyntaxErrorKind::ExpectedClosingBracket);
                let range = token.range.merge(&self.previous_range());
                return Expr::new(ExprKind::Array(items), range);
            }
            TokenKind::Unknown(_) => {
                self.advance();
                return Expr::error(self.report(SyntaxErrorKind::UnknownCharacter, &token));
            }
            TokenKind::UnterminatedString(_) => {
                self.advance();
                return Expr::error(self.report(SyntaxErrorKind::UnterminatedString, &token));
            }
            TokenKind::Eof => return Expr::error(self.report(SyntaxErrorKind::UnexpectedEof, &token)),
            TokenKind::SemiColon | TokenKind::RBrace | TokenKind::RParen | TokenKind::RBracket => {
                return Expr::error(self.unexpected());
            }
            _ => {
                self.advance();
                return Expr::error(self.report(SyntaxErrorKind::UnexpectedToken, &token));
            }
        };

        self.advance();
        Expr::new(kind, token.range)
    }

    /// Runs `parse` one nesting level deeper, or reports `NestingTooDeep` and
    /// skips the nested input when the limit is reached.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> T, too_deep: impl FnOnce(SyntaxError) -> T) -> T {
        if self.depth >= self.max_depth {
            let error = self.unexpected_as(SyntaxErrorKind::NestingTooDeep);
            self.skip_nested();
            return too_deep(error);
        }

        self.depth += 1;
        let node = parse(self);
        self.depth -= 1;
        node
    }

    /// Skips balanced brackets up to the next `;` or `,` outside them, an
    /// unmatched closing bracket, or the end of input.
    fn skip_nested(&mut self) {
        let mut open = 0usize;

        loop {
            match &self.current().kind {
                TokenKind::Eof => return,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => open += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if open == 0 {
                        return;
                    }
                    open -= 1;
                }
                TokenKind::SemiColon | TokenKind::Comma if open == 0 => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn current(&self) -> &'a Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn peek_kind(&self, offset: usize) -> Option<&'a TokenKind> {
        self.tokens.get(self.pos + offset).map(|token| &token.kind)
    }

    fn previous_range(&self) -> Range {
        self.pos
            .checked_sub(1)
            .and_then(|index| self.tokens.get(index))
            .map(|token| token.range)
            .unwrap_or_default()
    }

    fn at_eof(&self) -> bool {
        self.current().is_eof()
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.current().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consumes `kind` or reports `missing` at the current token without consuming it.
    fn expect(&mut self, kind: &TokenKind, missing: SyntaxErrorKind) -> Option<SyntaxError> {
        if self.eat(kind) {
            None
        } else {
            Some(self.unexpected_as(missing))
        }
    }

    fn report(&mut self, kind: SyntaxErrorKind, token: &Token) -> SyntaxError {
        let error = SyntaxError::new(kind, token.range, token.text());
        self.errors.report(error.clone());
        error
    }

    fn unexpected_as(&mut self, kind: SyntaxErrorKind) -> SyntaxError {
        let token = self.current();
        let kind = if token.is_eof() && matches!(kind, SyntaxErrorKind::UnexpectedToken) {
            SyntaxErrorKind::UnexpectedEof
        } else {
            kind
        };
        self.report(kind, token)
    }

    fn unexpected(&mut self) -> SyntaxError {
        self.unexpected_as(SyntaxErrorKind::UnexpectedToken)
    }
}

fn binary_op(kind: &TokenKind, level: usize) -> Option<BinaryOp> {
    match (level, kind) {
        (0, TokenKind::OrOr | TokenKind::Or) => Some(BinaryOp::Or),
        (1, TokenKind::AndAnd | TokenKind::And) => Some(BinaryOp::And),
        (2, TokenKind::EqEq) => Some(BinaryOp::Eq),
        (2, TokenKind::NeEq) => Some(BinaryOp::Ne),
        (3, TokenKind::Lt) => Some(BinaryOp::Lt),
        (3, TokenKind::Lte) => Some(BinaryOp::Lte),
        (3, TokenKind::Gt) => Some(BinaryOp::Gt),
        (3, TokenKind::Gte) => Some(BinaryOp::Gte),
        (4, TokenKind::Plus) => Some(BinaryOp::Add),
        (4, TokenKind::Minus) => Some(BinaryOp::Sub),
        (5, TokenKind::Star) => Some(BinaryOp::Mul),
        (5, TokenKind::Slash) => Some(BinaryOp::Div),
        (5, TokenKind::Percent) => Some(BinaryOp::Rem),
        _ => None,
    }
}
