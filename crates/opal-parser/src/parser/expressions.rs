//! Expression parsing.
//!
//! A precedence cascade, loosest to tightest: assignment, ternary,
//! pipeline, elvis, `||`, `&&`, equality, comparison, infix functions
//! (`in`, `!in`, `is`, `!is`, `to`, declared-infix calls), range, additive,
//! multiplicative, prefix, postfix. Pipeline sits one level below elvis.
//!
//! Postfix `?` forms are decided by token adjacency: `a?` (propagate) and
//! `a?[i]` (safe index) require the `?` to touch the operand, while a
//! spaced `?` belongs to the ternary level.

use opal_common::diag::DiagnosticSink;
use opal_common::span::Span;
use opal_common::token::{StringPart, TokenKind, TokenValue};
use opal_lexer::Lexer;

use crate::ast::{
    AssignOp, BinaryOp, Block, CallArg, CollectionKind, Expr, ExprKind, Ident, InterpPart,
    JumpKind, LiteralKind, Parameter, PostfixOp, UnaryOp, WhenBranch, WhenCondition, WhenExpr,
    WhenSubject,
};

use super::Parser;

impl<'src, 'sink> Parser<'src, 'sink> {
    /// If the current token is a newline and the next meaningful token can
    /// only continue the current expression, skip the newline run.
    fn continue_over_newlines(&mut self, ops: &[TokenKind]) -> bool {
        if self.at(TokenKind::Newline) && ops.contains(&self.peek_past_newlines()) {
            self.skip_newlines();
            true
        } else {
            false
        }
    }

    fn mk(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.fresh_id(),
            kind,
            span,
        }
    }

    /// Error-recovery expression at a span (no diagnostic; the caller
    /// reported already).
    pub(crate) fn error_expr(&mut self, span: Span) -> Expr {
        self.mk(ExprKind::Error, span)
    }

    // ── Entry ──────────────────────────────────────────────────────────

    pub(crate) fn parse_expr(&mut self) -> Expr {
        self.parse_assignment()
    }

    /// Assignment, right-associative, all compound forms.
    fn parse_assignment(&mut self) -> Expr {
        let lhs = self.parse_ternary();
        if self.current().is_assignment_op() {
            let op = match self.bump().kind {
                TokenKind::Eq => AssignOp::Assign,
                TokenKind::PlusEq => AssignOp::AddAssign,
                TokenKind::MinusEq => AssignOp::SubAssign,
                TokenKind::StarEq => AssignOp::MulAssign,
                TokenKind::SlashEq => AssignOp::DivAssign,
                TokenKind::PercentEq => AssignOp::RemAssign,
                TokenKind::QuestionQuestionEq => AssignOp::CoalesceAssign,
                _ => unreachable!("is_assignment_op covers the kinds above"),
            };
            let value = self.parse_assignment();
            let span = lhs.span.cover(value.span);
            return self.mk(
                ExprKind::Assign {
                    op,
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
                span,
            );
        }
        lhs
    }

    /// Ternary `cond ? a : b`, right-associative. The `?` must not touch
    /// its operand (an adjacent `?` is the propagation postfix).
    fn parse_ternary(&mut self) -> Expr {
        let cond = self.parse_pipeline();
        if self.at(TokenKind::Question) && !self.adjacent() {
            self.bump();
            let then_expr = self.parse_ternary();
            self.expect(TokenKind::Colon, "`:` in conditional expression");
            let else_expr = self.parse_ternary();
            let span = cond.span.cover(else_expr.span);
            return self.mk(
                ExprKind::Conditional {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                span,
            );
        }
        cond
    }

    /// Pipeline `x |> f`, left-associative, one level below elvis.
    fn parse_pipeline(&mut self) -> Expr {
        let mut lhs = self.parse_elvis();
        loop {
            self.continue_over_newlines(&[TokenKind::Pipeline]);
            if !self.at(TokenKind::Pipeline) {
                return lhs;
            }
            self.bump();
            let rhs = self.parse_elvis();
            let span = lhs.span.cover(rhs.span);
            lhs = self.mk(
                ExprKind::Pipeline {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    /// Elvis `a ?: b`, right-associative.
    fn parse_elvis(&mut self) -> Expr {
        let lhs = self.parse_or();
        self.continue_over_newlines(&[TokenKind::QuestionColon]);
        if self.at(TokenKind::QuestionColon) {
            self.bump();
            let rhs = self.parse_elvis();
            let span = lhs.span.cover(rhs.span);
            return self.mk(
                ExprKind::Elvis {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        lhs
    }

    fn parse_or(&mut self) -> Expr {
        let mut lhs = self.parse_and();
        loop {
            self.continue_over_newlines(&[TokenKind::PipePipe]);
            if !self.at(TokenKind::PipePipe) {
                return lhs;
            }
            self.bump();
            let rhs = self.parse_and();
            let span = lhs.span.cover(rhs.span);
            lhs = self.binary(BinaryOp::Or, lhs, rhs, span);
        }
    }

    fn parse_and(&mut self) -> Expr {
        let mut lhs = self.parse_equality();
        loop {
            self.continue_over_newlines(&[TokenKind::AmpAmp]);
            if !self.at(TokenKind::AmpAmp) {
                return lhs;
            }
            self.bump();
            let rhs = self.parse_equality();
            let span = lhs.span.cover(rhs.span);
            lhs = self.binary(BinaryOp::And, lhs, rhs, span);
        }
    }

    fn parse_equality(&mut self) -> Expr {
        let mut lhs = self.parse_comparison();
        loop {
            self.continue_over_newlines(&[
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::EqEqEq,
                TokenKind::NotEqEq,
            ]);
            let op = match self.current() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                TokenKind::EqEqEq => BinaryOp::RefEq,
                TokenKind::NotEqEq => BinaryOp::RefNe,
                _ => return lhs,
            };
            self.bump();
            let rhs = self.parse_comparison();
            let span = lhs.span.cover(rhs.span);
            lhs = self.binary(op, lhs, rhs, span);
        }
    }

    fn parse_comparison(&mut self) -> Expr {
        let mut lhs = self.parse_infix_fn();
        loop {
            let op = match self.current() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::Le,
                TokenKind::GtEq => BinaryOp::Ge,
                _ => return lhs,
            };
            self.bump();
            let rhs = self.parse_infix_fn();
            let span = lhs.span.cover(rhs.span);
            lhs = self.binary(op, lhs, rhs, span);
        }
    }

    /// Infix-function level: `in`, `!in`, `is`, `!is`, `to`, and
    /// declared-infix identifier calls (`a zip b`).
    fn parse_infix_fn(&mut self) -> Expr {
        let mut lhs = self.parse_range();
        loop {
            match self.current() {
                TokenKind::In => {
                    self.bump();
                    let rhs = self.parse_range();
                    let span = lhs.span.cover(rhs.span);
                    lhs = self.mk(
                        ExprKind::Binary {
                            op: BinaryOp::In,
                            negated: false,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        span,
                    );
                }
                TokenKind::Bang if self.nth(1) == TokenKind::In => {
                    self.bump();
                    self.bump();
                    let rhs = self.parse_range();
                    let span = lhs.span.cover(rhs.span);
                    lhs = self.mk(
                        ExprKind::Binary {
                            op: BinaryOp::In,
                            negated: true,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        span,
                    );
                }
                TokenKind::Is => {
                    self.bump();
                    let ty = self.parse_type();
                    let span = lhs.span.cover(ty.span);
                    lhs = self.mk(
                        ExprKind::TypeCheck {
                            operand: Box::new(lhs),
                            ty,
                            negated: false,
                        },
                        span,
                    );
                }
                TokenKind::Bang if self.nth(1) == TokenKind::Is => {
                    self.bump();
                    self.bump();
                    let ty = self.parse_type();
                    let span = lhs.span.cover(ty.span);
                    lhs = self.mk(
                        ExprKind::TypeCheck {
                            operand: Box::new(lhs),
                            ty,
                            negated: true,
                        },
                        span,
                    );
                }
                TokenKind::As => {
                    self.bump();
                    let safe = self.at(TokenKind::Question) && self.adjacent() && {
                        self.bump();
                        true
                    };
                    let ty = self.parse_type();
                    let span = lhs.span.cover(ty.span);
                    lhs = self.mk(
                        ExprKind::Cast {
                            operand: Box::new(lhs),
                            ty,
                            safe,
                        },
                        span,
                    );
                }
                TokenKind::Identifier if self.starts_expression(self.nth(1)) => {
                    let name_span = self.current_span();
                    let name = self.current_text().to_string();
                    self.bump();
                    let rhs = self.parse_range();
                    let span = lhs.span.cover(rhs.span);
                    lhs = if name == "to" {
                        self.mk(
                            ExprKind::Binary {
                                op: BinaryOp::To,
                                negated: false,
                                lhs: Box::new(lhs),
                                rhs: Box::new(rhs),
                            },
                            span,
                        )
                    } else {
                        self.mk(
                            ExprKind::InfixCall {
                                name: Ident::new(name, name_span),
                                lhs: Box::new(lhs),
                                rhs: Box::new(rhs),
                            },
                            span,
                        )
                    };
                }
                _ => return lhs,
            }
        }
    }

    /// Whether `kind` can begin an expression (used to decide infix calls).
    fn starts_expression(&self, kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Identifier
                | TokenKind::IntLiteral
                | TokenKind::LongLiteral
                | TokenKind::FloatLiteral
                | TokenKind::DoubleLiteral
                | TokenKind::CharLiteral
                | TokenKind::StringLiteral
                | TokenKind::RawStringLiteral
                | TokenKind::MultilineStringLiteral
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::ThisKw
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Minus
                | TokenKind::Bang
        )
    }

    /// Range `a..b` / `a..<b` with optional `step` (soft keyword).
    fn parse_range(&mut self) -> Expr {
        let lhs = self.parse_additive();
        self.continue_over_newlines(&[TokenKind::DotDot, TokenKind::DotDotLt]);
        let inclusive = match self.current() {
            TokenKind::DotDot => true,
            TokenKind::DotDotLt => false,
            _ => return lhs,
        };
        self.bump();
        let rhs = self.parse_additive();
        let step = if self.at_soft("step") && self.starts_expression(self.nth(1)) {
            self.bump();
            Some(Box::new(self.parse_additive()))
        } else {
            None
        };
        let end = step.as_ref().map(|s| s.span).unwrap_or(rhs.span);
        let span = lhs.span.cover(end);
        self.mk(
            ExprKind::Range {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                inclusive,
                step,
            },
            span,
        )
    }

    fn parse_additive(&mut self) -> Expr {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = match self.current() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return lhs,
            };
            self.bump();
            let rhs = self.parse_multiplicative();
            let span = lhs.span.cover(rhs.span);
            lhs = self.binary(op, lhs, rhs, span);
        }
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut lhs = self.parse_prefix();
        loop {
            self.continue_over_newlines(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent]);
            let op = match self.current() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return lhs,
            };
            self.bump();
            let rhs = self.parse_prefix();
            let span = lhs.span.cover(rhs.span);
            lhs = self.binary(op, lhs, rhs, span);
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
        self.mk(
            ExprKind::Binary {
                op,
                negated: false,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    fn parse_prefix(&mut self) -> Expr {
        let start = self.current_span();
        let op = match self.current() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_prefix();
            let span = start.cover(operand.span);
            return self.mk(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            );
        }

        match self.current() {
            TokenKind::Await => {
                self.bump();
                let operand = self.parse_prefix();
                let span = start.cover(operand.span);
                self.mk(ExprKind::Await { operand: Box::new(operand) }, span)
            }
            TokenKind::Return | TokenKind::Throw | TokenKind::Break | TokenKind::Continue => {
                self.parse_jump_expr()
            }
            _ => self.parse_postfix(),
        }
    }

    /// `return`, `throw`, `break`, `continue` in expression position.
    fn parse_jump_expr(&mut self) -> Expr {
        let start = self.current_span();
        let keyword = self.bump().kind;
        let label = self.parse_at_label();
        let kind = match keyword {
            TokenKind::Return => {
                let value = if self.starts_expression(self.current()) {
                    Some(Box::new(self.parse_expr()))
                } else {
                    None
                };
                JumpKind::Return(value)
            }
            TokenKind::Throw => JumpKind::Throw(Box::new(self.parse_expr())),
            TokenKind::Break => JumpKind::Break,
            TokenKind::Continue => JumpKind::Continue,
            _ => unreachable!("caller checked the keyword"),
        };
        let span = Span::new(start.start, self.prev_span().end);
        self.mk(ExprKind::Jump { kind, label }, span)
    }

    /// Optional `@label` suffix (adjacent to the previous token).
    pub(crate) fn parse_at_label(&mut self) -> Option<Ident> {
        if self.at(TokenKind::At) && self.adjacent() && self.nth(1) == TokenKind::Identifier {
            self.bump(); // `@`
            let token = self.bump();
            let text = self.source[token.span.start as usize..token.span.end as usize].to_string();
            Some(Ident::new(text, token.span))
        } else {
            None
        }
    }

    // ── Postfix ────────────────────────────────────────────────────────

    fn parse_postfix(&mut self) -> Expr {
        let mut lhs = self.parse_primary();
        loop {
            // Method chains may continue on the next line.
            self.continue_over_newlines(&[TokenKind::Dot, TokenKind::QuestionDot]);

            match self.current() {
                TokenKind::Dot if self.nth(1) == TokenKind::Identifier => {
                    self.bump();
                    let token = self.bump();
                    let name = self.source[token.span.start as usize..token.span.end as usize]
                        .to_string();
                    let span = lhs.span.cover(token.span);
                    lhs = self.mk(
                        ExprKind::Member {
                            target: Box::new(lhs),
                            name: Ident::new(name, token.span),
                        },
                        span,
                    );
                }
                TokenKind::QuestionDot if self.nth(1) == TokenKind::LBrace => {
                    self.bump(); // `?.`
                    let block = self.parse_block();
                    let span = lhs.span.cover(block.span);
                    lhs = self.mk(
                        ExprKind::SafeBlock {
                            target: Box::new(lhs),
                            block,
                        },
                        span,
                    );
                }
                TokenKind::QuestionDot => {
                    self.bump();
                    let Some((name, name_span)) = self.expect_ident("member name after `?.`")
                    else {
                        return lhs;
                    };
                    let span = lhs.span.cover(name_span);
                    lhs = self.mk(
                        ExprKind::SafeMember {
                            target: Box::new(lhs),
                            name: Ident::new(name, name_span),
                        },
                        span,
                    );
                }
                TokenKind::ColonColon => {
                    self.bump();
                    let Some((name, name_span)) = self.expect_ident("member name after `::`")
                    else {
                        return lhs;
                    };
                    let is_constructor = name == "new";
                    let span = lhs.span.cover(name_span);
                    lhs = self.mk(
                        ExprKind::MethodRef {
                            target: Box::new(lhs),
                            name: Ident::new(name, name_span),
                            is_constructor,
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    let args = self.parse_call_args();
                    let span = Span::new(lhs.span.start, self.prev_span().end);
                    lhs = self.mk(
                        ExprKind::Call {
                            callee: Box::new(lhs),
                            type_args: Vec::new(),
                            args,
                        },
                        span,
                    );
                }
                // `f<Int>(x)` -- tentatively a generic-argument opener; on
                // failure at the matching `>` fall through to comparison.
                TokenKind::Lt if callee_like(&lhs) => {
                    let Some(type_args) = self.speculate(|p| {
                        let args = p.parse_type_args()?;
                        if matches!(p.current(), TokenKind::LParen | TokenKind::ColonColon) {
                            Some(args)
                        } else {
                            None
                        }
                    }) else {
                        return lhs;
                    };
                    if self.at(TokenKind::ColonColon) {
                        self.bump();
                        let Some((name, name_span)) =
                            self.expect_ident("member name after `::`")
                        else {
                            return lhs;
                        };
                        let is_constructor = name == "new";
                        let span = lhs.span.cover(name_span);
                        lhs = self.mk(
                            ExprKind::MethodRef {
                                target: Box::new(lhs),
                                name: Ident::new(name, name_span),
                                is_constructor,
                            },
                            span,
                        );
                        continue;
                    }
                    let args = self.parse_call_args();
                    let span = Span::new(lhs.span.start, self.prev_span().end);
                    lhs = self.mk(
                        ExprKind::Call {
                            callee: Box::new(lhs),
                            type_args,
                            args,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    lhs = self.parse_index_or_slice(lhs, false);
                }
                TokenKind::BangBang => {
                    self.bump();
                    let span = Span::new(lhs.span.start, self.prev_span().end);
                    lhs = self.mk(ExprKind::NotNull { operand: Box::new(lhs) }, span);
                }
                TokenKind::PlusPlus if self.adjacent() => {
                    self.bump();
                    let span = Span::new(lhs.span.start, self.prev_span().end);
                    lhs = self.mk(
                        ExprKind::Postfix {
                            op: PostfixOp::Inc,
                            operand: Box::new(lhs),
                        },
                        span,
                    );
                }
                TokenKind::MinusMinus if self.adjacent() => {
                    self.bump();
                    let span = Span::new(lhs.span.start, self.prev_span().end);
                    lhs = self.mk(
                        ExprKind::Postfix {
                            op: PostfixOp::Dec,
                            operand: Box::new(lhs),
                        },
                        span,
                    );
                }
                // Adjacent `?`: safe index `a?[i]` or error propagation `a?`.
                TokenKind::Question if self.adjacent() => {
                    if self.nth(1) == TokenKind::LBracket {
                        self.bump(); // `?`
                        lhs = self.parse_index_or_slice(lhs, true);
                    } else {
                        self.bump();
                        let span = Span::new(lhs.span.start, self.prev_span().end);
                        lhs = self.mk(ExprKind::Propagate { operand: Box::new(lhs) }, span);
                    }
                }
                // Trailing lambda: `{` directly after a callable.
                TokenKind::LBrace if callee_like(&lhs) => {
                    let lambda = self.parse_lambda();
                    let span = lhs.span.cover(lambda.span);
                    lhs = match lhs.kind {
                        ExprKind::Call {
                            callee,
                            type_args,
                            mut args,
                        } => {
                            args.push(CallArg {
                                name: None,
                                spread: false,
                                value: lambda,
                            });
                            self.mk(ExprKind::Call { callee, type_args, args }, span)
                        }
                        _ => self.mk(
                            ExprKind::Call {
                                callee: Box::new(lhs),
                                type_args: Vec::new(),
                                args: vec![CallArg {
                                    name: None,
                                    spread: false,
                                    value: lambda,
                                }],
                            },
                            span,
                        ),
                    };
                }
                _ => return lhs,
            }
        }
    }

    /// `(arg, name = arg, *spread)` argument list starting at `(`.
    pub(crate) fn parse_call_args(&mut self) -> Vec<CallArg> {
        self.bump(); // `(`
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let name = if self.at(TokenKind::Identifier) && self.nth(1) == TokenKind::Eq {
                    let token = self.bump();
                    let text = self.source[token.span.start as usize..token.span.end as usize]
                        .to_string();
                    self.bump(); // `=`
                    Some(Ident::new(text, token.span))
                } else {
                    None
                };
                let spread = name.is_none() && self.at(TokenKind::Star) && {
                    self.bump();
                    true
                };
                let value = self.parse_expr();
                args.push(CallArg { name, spread, value });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                // Trailing comma.
                if self.at(TokenKind::RParen) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`");
        args
    }

    /// `a[i]`, `a[i, j]`, `a[lo..hi]`, `a[..hi]`, `a[lo..]`; with
    /// `safe = true` this is the `a?[...]` form.
    fn parse_index_or_slice(&mut self, target: Expr, safe: bool) -> Expr {
        self.bump(); // `[`

        // Open-start slice: `a[..hi]` / `a[..<hi]`.
        if matches!(self.current(), TokenKind::DotDot | TokenKind::DotDotLt) {
            let inclusive = self.current() == TokenKind::DotDot;
            self.bump();
            let end = if self.at(TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expr()))
            };
            self.expect(TokenKind::RBracket, "`]`");
            let span = Span::new(target.span.start, self.prev_span().end);
            return self.mk(
                ExprKind::Slice {
                    target: Box::new(target),
                    start: None,
                    end,
                    inclusive,
                },
                span,
            );
        }

        let first = self.parse_expr();

        // A range index is sugar for a slice.
        if let ExprKind::Range {
            lhs,
            rhs,
            inclusive,
            step: None,
        } = first.kind
        {
            self.expect(TokenKind::RBracket, "`]`");
            let span = Span::new(target.span.start, self.prev_span().end);
            return self.mk(
                ExprKind::Slice {
                    target: Box::new(target),
                    start: Some(lhs),
                    end: Some(rhs),
                    inclusive,
                },
                span,
            );
        }

        let mut indices = vec![first];
        while self.eat(TokenKind::Comma) {
            indices.push(self.parse_expr());
        }
        self.expect(TokenKind::RBracket, "`]`");
        let span = Span::new(target.span.start, self.prev_span().end);
        if safe {
            self.mk(
                ExprKind::SafeIndex {
                    target: Box::new(target),
                    indices,
                },
                span,
            )
        } else {
            self.mk(
                ExprKind::Index {
                    target: Box::new(target),
                    indices,
                },
                span,
            )
        }
    }

    // ── Primary ────────────────────────────────────────────────────────

    fn parse_primary(&mut self) -> Expr {
        let start = self.current_span();
        match self.current() {
            TokenKind::IntLiteral
            | TokenKind::LongLiteral
            | TokenKind::FloatLiteral
            | TokenKind::DoubleLiteral
            | TokenKind::CharLiteral => {
                let token = self.bump();
                let kind = match token.value {
                    Some(TokenValue::Int(v)) => LiteralKind::Int(v),
                    Some(TokenValue::Long(v)) => LiteralKind::Long(v),
                    Some(TokenValue::Float(v)) => LiteralKind::Float(v),
                    Some(TokenValue::Double(v)) => LiteralKind::Double(v),
                    Some(TokenValue::Char(v)) => LiteralKind::Char(v),
                    _ => LiteralKind::Int(0),
                };
                self.mk(ExprKind::Literal(kind), start)
            }
            TokenKind::True => {
                self.bump();
                self.mk(ExprKind::Literal(LiteralKind::Bool(true)), start)
            }
            TokenKind::False => {
                self.bump();
                self.mk(ExprKind::Literal(LiteralKind::Bool(false)), start)
            }
            TokenKind::Null => {
                self.bump();
                self.mk(ExprKind::Literal(LiteralKind::Null), start)
            }
            TokenKind::StringLiteral
            | TokenKind::RawStringLiteral
            | TokenKind::MultilineStringLiteral => self.parse_string_expr(),
            TokenKind::Identifier => {
                let token = self.bump();
                let text =
                    self.source[token.span.start as usize..token.span.end as usize].to_string();
                self.mk(ExprKind::Name(Ident::new(text, token.span)), start)
            }
            TokenKind::ThisKw => {
                self.bump();
                let label = self.parse_at_label();
                let span = Span::new(start.start, self.prev_span().end);
                self.mk(ExprKind::This { label }, span)
            }
            TokenKind::Super => {
                self.bump();
                let label = self.parse_at_label();
                let span = Span::new(start.start, self.prev_span().end);
                self.mk(ExprKind::Super { label }, span)
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr();
                self.expect(TokenKind::RParen, "`)`");
                inner
            }
            TokenKind::If => self.parse_if_expr(),
            TokenKind::When => {
                let when = self.parse_when_shape();
                let span = Span::new(start.start, self.prev_span().end);
                self.mk(ExprKind::When(when), span)
            }
            TokenKind::Try => self.parse_try_expr(),
            TokenKind::Object => self.parse_object_literal(),
            TokenKind::LBracket => self.parse_list_or_map_literal(),
            TokenKind::Hash if self.nth(1) == TokenKind::LBrace => self.parse_set_literal(),
            TokenKind::LBrace => self.parse_lambda(),
            TokenKind::Underscore => {
                self.bump();
                self.mk(ExprKind::Placeholder, start)
            }
            TokenKind::Star => {
                self.bump();
                let operand = self.parse_prefix();
                let span = start.cover(operand.span);
                self.mk(ExprKind::Spread { operand: Box::new(operand) }, span)
            }
            TokenKind::Error => {
                // Already reported by the lexer.
                self.bump();
                self.mk(ExprKind::Error, start)
            }
            _ => {
                let found = match self.current() {
                    TokenKind::Eof => "end of file".to_string(),
                    TokenKind::Newline => "end of line".to_string(),
                    _ => format!("`{}`", self.current_text()),
                };
                self.error_here(format!("expected expression, found {found}"));
                // Consume the offending token unless it closes or ends
                // something the caller needs.
                if !matches!(
                    self.current(),
                    TokenKind::RParen
                        | TokenKind::RBracket
                        | TokenKind::RBrace
                        | TokenKind::Newline
                        | TokenKind::Semicolon
                        | TokenKind::Comma
                        | TokenKind::Eof
                ) {
                    self.bump();
                }
                self.mk(ExprKind::Error, start)
            }
        }
    }

    /// String literal token -> literal expression or interpolation node.
    fn parse_string_expr(&mut self) -> Expr {
        let token = self.bump();
        let span = token.span;
        match token.value {
            Some(TokenValue::Str(s)) => self.mk(ExprKind::Literal(LiteralKind::Str(s)), span),
            Some(TokenValue::StrParts(parts)) => {
                let mut interp = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        StringPart::Lit(s) => interp.push(InterpPart::Lit(s)),
                        StringPart::Expr { text, offset } => {
                            let expr = self.parse_hole(&text, offset);
                            interp.push(InterpPart::Expr(Box::new(expr)));
                        }
                    }
                }
                self.mk(ExprKind::StringInterp { parts: interp }, span)
            }
            _ => self.mk(ExprKind::Literal(LiteralKind::Str(String::new())), span),
        }
    }

    /// Sub-parse one interpolation hole. The hole text is lexed standalone,
    /// token and diagnostic spans are shifted to absolute offsets, and a
    /// child parser (sharing the sink and id counter) parses the expression.
    fn parse_hole(&mut self, text: &str, offset: u32) -> Expr {
        let mut lex_sink = DiagnosticSink::new();
        let mut tokens = Lexer::tokenize(text, &mut lex_sink);
        for token in &mut tokens {
            token.span = Span::new(token.span.start + offset, token.span.end + offset);
        }
        for mut diag in lex_sink.into_vec() {
            diag.span = Span::new(diag.span.start + offset, diag.span.end + offset);
            self.sink.push(diag);
        }

        let next_id = self.next_id_value();
        let mut sub = Parser::new(tokens, self.source, &mut *self.sink, next_id);
        let expr = sub.parse_expr();
        if !sub.at(TokenKind::Eof) {
            let span = sub.current_span();
            sub.error_at(span, "unexpected trailing input in string interpolation");
        }
        let used = sub.next_id_value();
        self.set_next_id(used);
        expr
    }

    /// `if (cond) a else b` in expression position.
    pub(crate) fn parse_if_expr(&mut self) -> Expr {
        let start = self.current_span();
        self.bump(); // `if`
        self.expect(TokenKind::LParen, "`(` after `if`");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, "`)`");
        let then_branch = self.parse_branch_expr();
        let else_branch = {
            if self.at(TokenKind::Newline) && self.peek_past_newlines() == TokenKind::Else {
                self.skip_newlines();
            }
            if self.eat(TokenKind::Else) {
                Some(Box::new(self.parse_branch_expr()))
            } else {
                None
            }
        };
        let span = Span::new(start.start, self.prev_span().end);
        self.mk(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            span,
        )
    }

    /// A branch of `if`/`when`: a block expression or a plain expression.
    pub(crate) fn parse_branch_expr(&mut self) -> Expr {
        if self.at(TokenKind::LBrace) {
            let block = self.parse_block();
            let span = block.span;
            self.mk(ExprKind::Block(block), span)
        } else if self.at(TokenKind::If) {
            self.parse_if_expr()
        } else {
            self.parse_expr()
        }
    }

    /// The shared shape of `when`, with or without a subject, with optional
    /// `val` binding scoped to the branches.
    pub(crate) fn parse_when_shape(&mut self) -> WhenExpr {
        self.bump(); // `when`
        let subject = if self.at(TokenKind::LParen) {
            self.bump();
            let binding = if self.at(TokenKind::Val) {
                self.bump();
                let name = self
                    .expect_ident("binding name")
                    .map(|(name, span)| Ident::new(name, span));
                self.expect(TokenKind::Eq, "`=`");
                name
            } else {
                None
            };
            let expr = self.parse_expr();
            self.expect(TokenKind::RParen, "`)`");
            let binding_id = self.fresh_id();
            Some(WhenSubject {
                binding,
                binding_id,
                expr: Box::new(expr),
            })
        } else {
            None
        };

        let mut branches = Vec::new();
        self.expect(TokenKind::LBrace, "`{`");
        loop {
            while self.eat(TokenKind::Newline) {}
            if self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) {
                break;
            }
            let branch_start = self.current_span();
            let mut conditions = Vec::new();
            loop {
                let condition = match self.current() {
                    TokenKind::Else => {
                        self.bump();
                        WhenCondition::Else
                    }
                    TokenKind::In => {
                        self.bump();
                        WhenCondition::In {
                            negated: false,
                            expr: self.parse_expr(),
                        }
                    }
                    TokenKind::Bang if self.nth(1) == TokenKind::In => {
                        self.bump();
                        self.bump();
                        WhenCondition::In {
                            negated: true,
                            expr: self.parse_expr(),
                        }
                    }
                    TokenKind::Is => {
                        self.bump();
                        WhenCondition::Is {
                            negated: false,
                            ty: self.parse_type(),
                        }
                    }
                    TokenKind::Bang if self.nth(1) == TokenKind::Is => {
                        self.bump();
                        self.bump();
                        WhenCondition::Is {
                            negated: true,
                            ty: self.parse_type(),
                        }
                    }
                    _ => WhenCondition::Expr(self.parse_expr()),
                };
                conditions.push(condition);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Arrow, "`->` in when branch");
            let body = self.parse_branch_expr();
            let span = Span::new(branch_start.start, self.prev_span().end);
            branches.push(WhenBranch {
                conditions,
                body,
                span,
            });
            self.expect_terminator();
            if self.at(TokenKind::RBrace) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "`}`");
        WhenExpr { subject, branches }
    }

    /// `try { ... } catch (e: T) { ... } finally { ... }` as an expression.
    pub(crate) fn parse_try_expr(&mut self) -> Expr {
        let start = self.current_span();
        self.bump(); // `try`
        let body = self.parse_block();
        let (catches, finally) = self.parse_catches_and_finally();
        let span = Span::new(start.start, self.prev_span().end);
        self.mk(
            ExprKind::Try {
                body,
                catches,
                finally,
            },
            span,
        )
    }

    /// `object : Base, Iface { members }` anonymous object.
    fn parse_object_literal(&mut self) -> Expr {
        let start = self.current_span();
        self.bump(); // `object`
        let mut supertypes = Vec::new();
        if self.eat(TokenKind::Colon) {
            loop {
                supertypes.push(self.parse_type());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let members = self.parse_class_body();
        let span = Span::new(start.start, self.prev_span().end);
        self.mk(
            ExprKind::ObjectLiteral {
                supertypes,
                members,
            },
            span,
        )
    }

    /// `[1, 2]` list literal or `[k: v]` map literal (`[:]` when empty).
    fn parse_list_or_map_literal(&mut self) -> Expr {
        let start = self.current_span();
        self.bump(); // `[`

        // `[:]` -- empty map.
        if self.at(TokenKind::Colon) && self.nth(1) == TokenKind::RBracket {
            self.bump();
            self.bump();
            let span = Span::new(start.start, self.prev_span().end);
            return self.mk(
                ExprKind::CollectionLiteral {
                    kind: CollectionKind::Map,
                    elements: Vec::new(),
                    entries: Vec::new(),
                },
                span,
            );
        }

        if self.at(TokenKind::RBracket) {
            self.bump();
            let span = Span::new(start.start, self.prev_span().end);
            return self.mk(
                ExprKind::CollectionLiteral {
                    kind: CollectionKind::List,
                    elements: Vec::new(),
                    entries: Vec::new(),
                },
                span,
            );
        }

        let first = self.parse_expr();
        if self.eat(TokenKind::Colon) {
            // Map literal.
            let mut entries = Vec::new();
            let value = self.parse_expr();
            entries.push((first, value));
            while self.eat(TokenKind::Comma) {
                if self.at(TokenKind::RBracket) {
                    break;
                }
                let key = self.parse_expr();
                self.expect(TokenKind::Colon, "`:` in map literal");
                let value = self.parse_expr();
                entries.push((key, value));
            }
            self.expect(TokenKind::RBracket, "`]`");
            let span = Span::new(start.start, self.prev_span().end);
            return self.mk(
                ExprKind::CollectionLiteral {
                    kind: CollectionKind::Map,
                    elements: Vec::new(),
                    entries,
                },
                span,
            );
        }

        let mut elements = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::RBracket) {
                break;
            }
            elements.push(self.parse_expr());
        }
        self.expect(TokenKind::RBracket, "`]`");
        let span = Span::new(start.start, self.prev_span().end);
        self.mk(
            ExprKind::CollectionLiteral {
                kind: CollectionKind::List,
                elements,
                entries: Vec::new(),
            },
            span,
        )
    }

    /// `#{1, 2}` set literal.
    fn parse_set_literal(&mut self) -> Expr {
        let start = self.current_span();
        self.bump(); // `#`
        self.bump(); // `{`
        let mut elements = Vec::new();
        if !self.at(TokenKind::RBrace) {
            loop {
                elements.push(self.parse_expr());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                if self.at(TokenKind::RBrace) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "`}`");
        let span = Span::new(start.start, self.prev_span().end);
        self.mk(
            ExprKind::CollectionLiteral {
                kind: CollectionKind::Set,
                elements,
                entries: Vec::new(),
            },
            span,
        )
    }

    /// `{ x, y -> body }` or `{ body }` lambda.
    pub(crate) fn parse_lambda(&mut self) -> Expr {
        let start = self.current_span();
        let params = self
            .speculate(|p| {
                p.bump(); // `{`
                let mut params = Vec::new();
                if matches!(p.current(), TokenKind::Identifier | TokenKind::Underscore) {
                    loop {
                        let token = p.bump();
                        let name = p.source[token.span.start as usize..token.span.end as usize]
                            .to_string();
                        let ty = if p.eat(TokenKind::Colon) {
                            Some(p.parse_type_opt()?)
                        } else {
                            None
                        };
                        params.push((name, token.span, ty));
                        if !p.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                if p.eat(TokenKind::Arrow) {
                    Some(params)
                } else {
                    None
                }
            })
            .map(|raw| {
                raw.into_iter()
                    .map(|(name, span, ty)| Parameter {
                        id: self.fresh_id(),
                        name: Ident::new(name, span),
                        ty,
                        default: None,
                        property: None,
                        span,
                    })
                    .collect::<Vec<_>>()
            });

        let (params, body) = match params {
            Some(params) => {
                // `{ params ->` already consumed; finish the block.
                let body = self.parse_block_tail(start);
                (params, body)
            }
            None => {
                let body = self.parse_block();
                (Vec::new(), body)
            }
        };
        let span = Span::new(start.start, self.prev_span().end);
        self.mk(ExprKind::Lambda { params, body }, span)
    }
}

/// Whether an expression can be a callee for a trailing lambda or generic
/// call (a name, member access, or another call).
fn callee_like(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Name(_) | ExprKind::Member { .. } | ExprKind::SafeMember { .. } | ExprKind::Call { .. }
    )
}
