//! Statement and block parsing.

use opal_common::span::Span;
use opal_common::token::TokenKind;

use crate::ast::{
    Block, BreakStmt, CatchClause, ContinueStmt, DoWhileStmt, ElseBranch, ForStmt, GuardStmt,
    Ident, IfStmt, Parameter, ReturnStmt, Stmt, ThrowStmt, TryStmt, UseBinding, UseStmt, WhenStmt,
    WhileStmt,
};

use super::Parser;

impl<'src, 'sink> Parser<'src, 'sink> {
    /// `{ stmt* }`.
    pub(crate) fn parse_block(&mut self) -> Block {
        let start = self.current_span();
        self.expect(TokenKind::LBrace, "`{`");
        self.parse_block_tail(start)
    }

    /// Statements up to and including the closing `}`; the `{` (and
    /// possibly a lambda parameter list) was already consumed.
    pub(crate) fn parse_block_tail(&mut self, start: Span) -> Block {
        let mut stmts = Vec::new();
        loop {
            while self.eat(TokenKind::Newline) || self.eat(TokenKind::Semicolon) {}
            if self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_stmt());
            self.expect_terminator();
        }
        self.expect(TokenKind::RBrace, "`}`");
        let span = Span::new(start.start, self.prev_span().end);
        Block { stmts, span }
    }

    /// One statement. Does not consume the trailing terminator.
    pub(crate) fn parse_stmt(&mut self) -> Stmt {
        match self.current() {
            TokenKind::Val | TokenKind::Var => {
                let decl = self.parse_property_or_destructuring(Default::default());
                Stmt::Decl(Box::new(decl))
            }
            TokenKind::Fun
            | TokenKind::Class
            | TokenKind::Interface
            | TokenKind::Object
            | TokenKind::Enum
            | TokenKind::Typealias
            | TokenKind::Private
            | TokenKind::Protected
            | TokenKind::Internal
            | TokenKind::Public
            | TokenKind::Open
            | TokenKind::Abstract
            | TokenKind::Sealed
            | TokenKind::Override
            | TokenKind::Inline
            | TokenKind::Data
            | TokenKind::Const
            | TokenKind::Lateinit
            | TokenKind::Operator
            | TokenKind::Infix
            | TokenKind::Suspend => match self.parse_decl() {
                Some(decl) => Stmt::Decl(Box::new(decl)),
                None => {
                    let span = self.current_span();
                    let expr = self.error_expr(span);
                    Stmt::Expr(expr)
                }
            },
            TokenKind::If => Stmt::If(self.parse_if_stmt()),
            TokenKind::When => {
                let start = self.current_span();
                let when = self.parse_when_shape();
                let span = Span::new(start.start, self.prev_span().end);
                Stmt::When(WhenStmt { when, span })
            }
            TokenKind::For => Stmt::For(self.parse_for_stmt(None)),
            TokenKind::While => Stmt::While(self.parse_while_stmt(None)),
            TokenKind::Do => Stmt::DoWhile(self.parse_do_while_stmt(None)),
            TokenKind::Identifier
                if self.nth(1) == TokenKind::At
                    && matches!(
                        self.nth(2),
                        TokenKind::For | TokenKind::While | TokenKind::Do
                    ) =>
            {
                let token = self.bump();
                let name = self.source[token.span.start as usize..token.span.end as usize]
                    .to_string();
                let label = Some(Ident::new(name, token.span));
                self.bump(); // `@`
                match self.current() {
                    TokenKind::For => Stmt::For(self.parse_for_stmt(label)),
                    TokenKind::While => Stmt::While(self.parse_while_stmt(label)),
                    _ => Stmt::DoWhile(self.parse_do_while_stmt(label)),
                }
            }
            TokenKind::Try => {
                let start = self.current_span();
                self.bump();
                let body = self.parse_block();
                let (catches, finally) = self.parse_catches_and_finally();
                let span = Span::new(start.start, self.prev_span().end);
                Stmt::Try(TryStmt {
                    body,
                    catches,
                    finally,
                    span,
                })
            }
            TokenKind::Return => {
                let start = self.current_span();
                self.bump();
                let label = self.parse_at_label();
                let value = if matches!(
                    self.current(),
                    TokenKind::Newline
                        | TokenKind::Semicolon
                        | TokenKind::RBrace
                        | TokenKind::Eof
                ) {
                    None
                } else {
                    Some(self.parse_expr())
                };
                let span = Span::new(start.start, self.prev_span().end);
                Stmt::Return(ReturnStmt { value, label, span })
            }
            TokenKind::Break => {
                let start = self.current_span();
                self.bump();
                let label = self.parse_at_label();
                let span = Span::new(start.start, self.prev_span().end);
                Stmt::Break(BreakStmt { label, span })
            }
            TokenKind::Continue => {
                let start = self.current_span();
                self.bump();
                let label = self.parse_at_label();
                let span = Span::new(start.start, self.prev_span().end);
                Stmt::Continue(ContinueStmt { label, span })
            }
            TokenKind::Throw => {
                let start = self.current_span();
                self.bump();
                let value = self.parse_expr();
                let span = Span::new(start.start, self.prev_span().end);
                Stmt::Throw(ThrowStmt { value, span })
            }
            TokenKind::Identifier if self.at_soft("guard") && self.guard_lookahead() => {
                self.parse_guard_stmt()
            }
            TokenKind::Identifier
                if self.at_soft("use")
                    && self.nth(1) == TokenKind::LParen
                    && self.nth(2) == TokenKind::Identifier
                    && self.nth(3) == TokenKind::Eq =>
            {
                self.parse_use_stmt()
            }
            TokenKind::LBrace => Stmt::Block(self.parse_block()),
            _ => Stmt::Expr(self.parse_expr()),
        }
    }

    /// Statement-position `if`; branches become blocks, a single-statement
    /// branch is wrapped.
    fn parse_if_stmt(&mut self) -> IfStmt {
        let start = self.current_span();
        self.bump(); // `if`
        self.expect(TokenKind::LParen, "`(` after `if`");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, "`)`");
        let then_block = self.parse_stmt_block();

        if self.at(TokenKind::Newline) && self.peek_past_newlines() == TokenKind::Else {
            self.skip_newlines();
        }
        let else_branch = if self.eat(TokenKind::Else) {
            if self.at(TokenKind::If) {
                Some(ElseBranch::If(Box::new(self.parse_if_stmt())))
            } else {
                Some(ElseBranch::Block(self.parse_stmt_block()))
            }
        } else {
            None
        };
        let span = Span::new(start.start, self.prev_span().end);
        IfStmt {
            cond,
            then_block,
            else_branch,
            span,
        }
    }

    /// A block, or a single statement wrapped into one.
    fn parse_stmt_block(&mut self) -> Block {
        if self.at(TokenKind::LBrace) {
            self.parse_block()
        } else {
            let stmt = self.parse_stmt();
            let span = stmt.span();
            Block {
                stmts: vec![stmt],
                span,
            }
        }
    }

    /// `for (x in xs)` / `for ((a, b) in pairs)`.
    fn parse_for_stmt(&mut self, label: Option<Ident>) -> ForStmt {
        let start = self.current_span();
        self.bump(); // `for`
        self.expect(TokenKind::LParen, "`(` after `for`");

        let mut bindings = Vec::new();
        let mut binding_ids = Vec::new();
        if self.eat(TokenKind::LParen) {
            loop {
                bindings.push(self.parse_for_binding());
                binding_ids.push(self.fresh_id());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "`)`");
        } else {
            bindings.push(self.parse_for_binding());
            binding_ids.push(self.fresh_id());
        }

        self.expect(TokenKind::In, "`in`");
        let iterable = self.parse_expr();
        self.expect(TokenKind::RParen, "`)`");
        let body = self.parse_stmt_block();
        let span = Span::new(start.start, self.prev_span().end);
        ForStmt {
            label,
            bindings,
            binding_ids,
            iterable,
            body,
            span,
        }
    }

    /// One loop binding: an identifier or `_`.
    fn parse_for_binding(&mut self) -> Option<Ident> {
        if self.eat(TokenKind::Underscore) {
            return None;
        }
        self.expect_ident("loop variable")
            .map(|(name, span)| Ident::new(name, span))
    }

    fn parse_while_stmt(&mut self, label: Option<Ident>) -> WhileStmt {
        let start = self.current_span();
        self.bump(); // `while`
        self.expect(TokenKind::LParen, "`(` after `while`");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, "`)`");
        let body = self.parse_stmt_block();
        let span = Span::new(start.start, self.prev_span().end);
        WhileStmt {
            label,
            cond,
            body,
            span,
        }
    }

    fn parse_do_while_stmt(&mut self, label: Option<Ident>) -> DoWhileStmt {
        let start = self.current_span();
        self.bump(); // `do`
        let body = self.parse_block();
        if self.at(TokenKind::Newline) && self.peek_past_newlines() == TokenKind::While {
            self.skip_newlines();
        }
        self.expect(TokenKind::While, "`while` after do-block");
        self.expect(TokenKind::LParen, "`(`");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, "`)`");
        let span = Span::new(start.start, self.prev_span().end);
        DoWhileStmt {
            label,
            body,
            cond,
            span,
        }
    }

    /// `catch` clauses and an optional `finally` block after a try body.
    pub(crate) fn parse_catches_and_finally(&mut self) -> (Vec<CatchClause>, Option<Block>) {
        let mut catches = Vec::new();
        loop {
            if self.at(TokenKind::Newline) && self.peek_past_newlines() == TokenKind::Catch {
                self.skip_newlines();
            }
            if !self.at(TokenKind::Catch) {
                break;
            }
            let start = self.current_span();
            self.bump();
            self.expect(TokenKind::LParen, "`(` after `catch`");
            let param_id = self.fresh_id();
            let (name, name_span) = self
                .expect_ident("exception binding")
                .unwrap_or_else(|| ("$err".to_string(), self.current_span()));
            self.expect(TokenKind::Colon, "`:`");
            let ty = self.parse_type();
            self.expect(TokenKind::RParen, "`)`");
            let body = self.parse_block();
            let span = Span::new(start.start, self.prev_span().end);
            catches.push(CatchClause {
                param: Parameter {
                    id: param_id,
                    name: Ident::new(name, name_span),
                    ty: Some(ty.clone()),
                    default: None,
                    property: None,
                    span: name_span,
                },
                ty,
                body,
                span,
            });
        }
        if self.at(TokenKind::Newline) && self.peek_past_newlines() == TokenKind::Finally {
            self.skip_newlines();
        }
        let finally = if self.eat(TokenKind::Finally) {
            Some(self.parse_block())
        } else {
            None
        };
        (catches, finally)
    }

    /// Whether the rest of the line contains an `else` at delimiter depth
    /// zero -- distinguishes `guard cond else { }` from a call to a
    /// function named `guard`.
    fn guard_lookahead(&self) -> bool {
        let mut n = 1;
        let mut depth: u32 = 0;
        loop {
            match self.nth(n) {
                TokenKind::Newline | TokenKind::Eof | TokenKind::Semicolon => return false,
                TokenKind::Else if depth == 0 => return true,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            n += 1;
        }
    }

    /// `guard cond else { must-exit }`.
    fn parse_guard_stmt(&mut self) -> Stmt {
        let start = self.current_span();
        self.bump(); // `guard`
        let cond = self.parse_expr();
        self.expect(TokenKind::Else, "`else` in guard statement");
        let else_block = self.parse_block();
        let span = Span::new(start.start, self.prev_span().end);
        Stmt::Guard(GuardStmt {
            cond,
            else_block,
            span,
        })
    }

    /// `use (a = open(), b = other()) { ... }`.
    fn parse_use_stmt(&mut self) -> Stmt {
        let start = self.current_span();
        self.bump(); // `use`
        self.expect(TokenKind::LParen, "`(` after `use`");
        let mut bindings = Vec::new();
        loop {
            let id = self.fresh_id();
            let Some((name, name_span)) = self.expect_ident("resource binding") else {
                break;
            };
            self.expect(TokenKind::Eq, "`=`");
            let init = self.parse_expr();
            let span = Span::new(name_span.start, self.prev_span().end);
            bindings.push(UseBinding {
                id,
                name: Ident::new(name, name_span),
                init,
                span,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)`");
        let body = self.parse_block();
        let span = Span::new(start.start, self.prev_span().end);
        Stmt::Use(UseStmt {
            bindings,
            body,
            span,
        })
    }
}
