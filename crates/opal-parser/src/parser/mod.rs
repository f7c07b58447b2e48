//! Hand-written recursive-descent parser for Opal.
//!
//! The parser consumes the full token stream up front and builds the owned
//! AST directly. On a parse error it records a diagnostic, synchronizes to
//! the next statement or declaration boundary, and keeps going.
//!
//! # Newline significance
//!
//! Newlines terminate statements. Inside `(...)` and `[...]` they are
//! insignificant; inside `{...}` they are significant again even when the
//! brace is nested in parentheses (a lambda body passed as an argument still
//! separates its statements by line). A newline is also ignored when the
//! next meaningful token can only continue the current expression (`.`
//! `?.` `?:` `|>` and the non-prefix binary operators) -- the Pratt loop
//! checks this before giving up.
//!
//! # Speculation
//!
//! `a < b` versus `a<T>(x)` is decided by a checkpoint/rollback attempt at
//! parsing type arguments; diagnostics are suppressed while speculating.

pub(crate) mod expressions;
pub(crate) mod items;
pub(crate) mod statements;
pub(crate) mod types;

use opal_common::diag::DiagnosticSink;
use opal_common::span::Span;
use opal_common::token::{Token, TokenKind};

use crate::ast::NodeId;

/// Position snapshot for speculative parsing.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    pos: usize,
    last_span: Span,
    delim_stack: Vec<bool>,
}

pub(crate) struct Parser<'src, 'sink> {
    tokens: Vec<Token>,
    pos: usize,
    pub(crate) source: &'src str,
    pub(crate) sink: &'sink mut DiagnosticSink,
    next_id: u32,
    /// Newline significance per open delimiter: `true` inside `{}`,
    /// `false` inside `()` / `[]`. Empty stack means significant.
    delim_stack: Vec<bool>,
    /// Suppression depth for speculative parsing.
    silent: u32,
    /// Span of the most recently consumed token.
    last_span: Span,
}

impl<'src, 'sink> Parser<'src, 'sink> {
    pub(crate) fn new(
        tokens: Vec<Token>,
        source: &'src str,
        sink: &'sink mut DiagnosticSink,
        first_id: u32,
    ) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            sink,
            next_id: first_id,
            delim_stack: Vec::new(),
            silent: 0,
            last_span: Span::point(0),
        }
    }

    /// Id counter value after parsing (for interpolation sub-parsers).
    pub(crate) fn next_id_value(&self) -> u32 {
        self.next_id
    }

    /// Resynchronize the id counter after a sub-parser minted ids.
    pub(crate) fn set_next_id(&mut self, value: u32) {
        self.next_id = value;
    }

    pub(crate) fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    // ── Lookahead ──────────────────────────────────────────────────────

    fn newlines_significant(&self) -> bool {
        *self.delim_stack.last().unwrap_or(&true)
    }

    /// Raw index of the Nth significant token at or after `self.pos`.
    fn sig_index(&self, n: usize) -> usize {
        let skip_newlines = !self.newlines_significant();
        let mut idx = self.pos;
        let mut remaining = n;
        while idx < self.tokens.len() {
            if skip_newlines && self.tokens[idx].kind == TokenKind::Newline {
                idx += 1;
                continue;
            }
            if remaining == 0 {
                return idx;
            }
            remaining -= 1;
            idx += 1;
        }
        self.tokens.len() - 1 // Eof
    }

    pub(crate) fn current(&self) -> TokenKind {
        self.tokens[self.sig_index(0)].kind
    }

    pub(crate) fn nth(&self, n: usize) -> TokenKind {
        self.tokens[self.sig_index(n)].kind
    }

    pub(crate) fn current_token(&self) -> &Token {
        &self.tokens[self.sig_index(0)]
    }

    pub(crate) fn nth_token(&self, n: usize) -> &Token {
        &self.tokens[self.sig_index(n)]
    }

    pub(crate) fn current_span(&self) -> Span {
        self.current_token().span
    }

    /// Span of the last consumed token.
    pub(crate) fn prev_span(&self) -> Span {
        self.last_span
    }

    pub(crate) fn current_text(&self) -> &str {
        let span = self.current_span();
        &self.source[span.start as usize..span.end as usize]
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.current() == kind
    }

    /// At an identifier with exactly this text (soft keyword check).
    pub(crate) fn at_soft(&self, text: &str) -> bool {
        self.current() == TokenKind::Identifier && self.current_text() == text
    }

    /// Whether the current token starts at the byte where the previous one
    /// ended (no whitespace between). Decides postfix `?` forms.
    pub(crate) fn adjacent(&self) -> bool {
        self.current_span().start == self.last_span.end
    }

    /// Next non-newline token kind, regardless of significance.
    pub(crate) fn peek_past_newlines(&self) -> TokenKind {
        let mut idx = self.pos;
        while idx < self.tokens.len() {
            if self.tokens[idx].kind != TokenKind::Newline {
                return self.tokens[idx].kind;
            }
            idx += 1;
        }
        TokenKind::Eof
    }

    // ── Consuming ──────────────────────────────────────────────────────

    /// Consume the current significant token and return it.
    pub(crate) fn bump(&mut self) -> Token {
        let idx = self.sig_index(0);
        let token = self.tokens[idx].clone();
        self.pos = idx + 1;
        self.last_span = token.span;
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket => self.delim_stack.push(false),
            TokenKind::LBrace => self.delim_stack.push(true),
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                self.delim_stack.pop();
            }
            _ => {}
        }
        token
    }

    /// Consume the current token if it matches.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consume a token of `kind` or report `expected {what}`.
    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.eat(kind) {
            return true;
        }
        let found = self.describe_current();
        self.error_here(format!("expected {what}, found {found}"));
        false
    }

    /// Consume an identifier token and return it as text + span.
    pub(crate) fn expect_ident(&mut self, what: &str) -> Option<(String, Span)> {
        if self.at(TokenKind::Identifier) {
            let token = self.bump();
            let text = self.source[token.span.start as usize..token.span.end as usize].to_string();
            Some((text, token.span))
        } else {
            let found = self.describe_current();
            self.error_here(format!("expected {what}, found {found}"));
            None
        }
    }

    fn describe_current(&self) -> String {
        match self.current() {
            TokenKind::Eof => "end of file".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            _ => format!("`{}`", self.current_text()),
        }
    }

    /// Skip any run of newline tokens.
    pub(crate) fn skip_newlines(&mut self) {
        while self.pos < self.tokens.len() && self.tokens[self.pos].kind == TokenKind::Newline {
            self.pos += 1;
        }
    }

    // ── Diagnostics ────────────────────────────────────────────────────

    pub(crate) fn error_here(&mut self, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(span, message);
    }

    pub(crate) fn error_at(&mut self, span: Span, message: impl Into<String>) {
        if self.silent == 0 {
            self.sink.error(message, span);
        }
    }

    // ── Speculation ────────────────────────────────────────────────────

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            last_span: self.last_span,
            delim_stack: self.delim_stack.clone(),
        }
    }

    pub(crate) fn rewind(&mut self, cp: Checkpoint) {
        self.pos = cp.pos;
        self.last_span = cp.last_span;
        self.delim_stack = cp.delim_stack;
    }

    /// Run `f` with diagnostics suppressed; rewind on `None`.
    pub(crate) fn speculate<T>(&mut self, f: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let cp = self.checkpoint();
        self.silent += 1;
        let result = f(self);
        self.silent -= 1;
        if result.is_none() {
            self.rewind(cp);
        }
        result
    }

    // ── Recovery ───────────────────────────────────────────────────────

    /// Consume a statement terminator: newline(s) or `;`. A closing brace
    /// or EOF also ends a statement without being consumed.
    pub(crate) fn expect_terminator(&mut self) {
        match self.current() {
            TokenKind::Newline => {
                while self.eat(TokenKind::Newline) {}
            }
            TokenKind::Semicolon => {
                self.bump();
                while self.eat(TokenKind::Newline) {}
            }
            TokenKind::RBrace | TokenKind::Eof => {}
            _ => {
                let found = self.describe_current();
                self.error_here(format!("expected end of statement, found {found}"));
                self.sync_to_boundary();
            }
        }
    }

    /// Whether `kind` can begin a statement or declaration (sync point).
    fn starts_statement(kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Val
                | TokenKind::Var
                | TokenKind::Fun
                | TokenKind::Class
                | TokenKind::Interface
                | TokenKind::Object
                | TokenKind::Enum
                | TokenKind::Typealias
                | TokenKind::If
                | TokenKind::When
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::Try
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Throw
                | TokenKind::Import
                | TokenKind::Package
        )
    }

    /// Panic-mode recovery: skip to the next statement/declaration boundary.
    pub(crate) fn sync_to_boundary(&mut self) {
        let mut depth: u32 = 0;
        loop {
            match self.current() {
                TokenKind::Eof => return,
                TokenKind::Newline | TokenKind::Semicolon if depth == 0 => {
                    self.bump();
                    while self.eat(TokenKind::Newline) {}
                    return;
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RParen | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                }
                TokenKind::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.bump();
                }
                kind if depth == 0 && Self::starts_statement(kind) => return,
                _ => {
                    self.bump();
                }
            }
        }
    }
}
