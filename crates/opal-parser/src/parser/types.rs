//! Type reference and type parameter parsing.

use opal_common::span::Span;
use opal_common::token::TokenKind;

use crate::ast::{Ident, TypeArgument, TypeParameter, TypeRef, TypeRefKind, Variance};

use super::Parser;

/// Name used for type references produced by error recovery; the analyzer
/// maps it to the error type without further diagnostics.
pub const ERROR_TYPE_NAME: &str = "$error";

impl<'src, 'sink> Parser<'src, 'sink> {
    /// Parse a type reference, recovering to an error type on failure.
    pub(crate) fn parse_type(&mut self) -> TypeRef {
        let span = self.current_span();
        match self.parse_type_opt() {
            Some(ty) => ty,
            None => {
                let found = match self.current() {
                    TokenKind::Eof => "end of file".to_string(),
                    _ => format!("`{}`", self.current_text()),
                };
                self.error_at(span, format!("expected type, found {found}"));
                TypeRef {
                    kind: TypeRefKind::Simple { name: ERROR_TYPE_NAME.to_string() },
                    span,
                }
            }
        }
    }

    /// Parse a type reference; `None` on failure (reported unless silent).
    pub(crate) fn parse_type_opt(&mut self) -> Option<TypeRef> {
        let start = self.current_span();

        let mut ty = if self.at(TokenKind::Suspend) {
            self.bump();
            self.parse_function_type(None, start, true)?
        } else if self.at(TokenKind::LParen) {
            self.parse_paren_or_function_type(start)?
        } else {
            self.parse_named_type(start)?
        };

        // Receiver function type: `Int.(Int) -> Int`.
        if self.at(TokenKind::Dot) && self.nth(1) == TokenKind::LParen {
            self.bump(); // `.`
            ty = self.parse_function_type(Some(Box::new(ty)), start, false)?;
        }

        // Nullability suffixes; `T??` collapses to `T?`.
        while self.at(TokenKind::Question) {
            self.bump();
            let span = Span::new(start.start, self.prev_span().end);
            ty = TypeRef {
                kind: TypeRefKind::Nullable(Box::new(ty)),
                span,
            };
        }

        Some(ty)
    }

    /// `(A, B) -> C`, `(T)`, or `() -> C` after seeing `(`.
    fn parse_paren_or_function_type(&mut self, start: Span) -> Option<TypeRef> {
        self.bump(); // `(`
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                params.push(self.parse_type_opt()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        if !self.eat(TokenKind::RParen) {
            return None;
        }

        if self.at(TokenKind::Arrow) {
            self.bump();
            let ret = self.parse_type_opt()?;
            let span = Span::new(start.start, ret.span.end);
            return Some(TypeRef {
                kind: TypeRefKind::Function {
                    receiver: None,
                    params,
                    ret: Box::new(ret),
                    is_suspend: false,
                },
                span,
            });
        }

        // Parenthesized single type.
        if params.len() == 1 {
            return params.into_iter().next();
        }
        None
    }

    /// Function type whose parameter list starts at the current `(`.
    fn parse_function_type(
        &mut self,
        receiver: Option<Box<TypeRef>>,
        start: Span,
        is_suspend: bool,
    ) -> Option<TypeRef> {
        if !self.eat(TokenKind::LParen) {
            return None;
        }
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                params.push(self.parse_type_opt()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        if !self.eat(TokenKind::RParen) || !self.eat(TokenKind::Arrow) {
            return None;
        }
        let ret = self.parse_type_opt()?;
        let span = Span::new(start.start, ret.span.end);
        Some(TypeRef {
            kind: TypeRefKind::Function {
                receiver,
                params,
                ret: Box::new(ret),
                is_suspend,
            },
            span,
        })
    }

    /// Dotted name with optional generic arguments.
    fn parse_named_type(&mut self, start: Span) -> Option<TypeRef> {
        if !self.at(TokenKind::Identifier) {
            return None;
        }
        let mut name = self.bump_text();
        while self.at(TokenKind::Dot) && self.nth(1) == TokenKind::Identifier {
            self.bump(); // `.`
            name.push('.');
            name.push_str(&self.bump_text());
        }

        if self.at(TokenKind::Lt) {
            let args = self.parse_type_args()?;
            let span = Span::new(start.start, self.prev_span().end);
            return Some(TypeRef {
                kind: TypeRefKind::Generic { name, args },
                span,
            });
        }

        let span = Span::new(start.start, self.prev_span().end);
        Some(TypeRef {
            kind: TypeRefKind::Simple { name },
            span,
        })
    }

    /// Consume the current token and return its text.
    fn bump_text(&mut self) -> String {
        let token = self.bump();
        self.source[token.span.start as usize..token.span.end as usize].to_string()
    }

    /// `<Arg, in T, out U, *>` starting at `<`.
    pub(crate) fn parse_type_args(&mut self) -> Option<Vec<TypeArgument>> {
        if !self.eat(TokenKind::Lt) {
            return None;
        }
        let mut args = Vec::new();
        loop {
            let start = self.current_span();
            let arg = if self.at(TokenKind::Star) {
                self.bump();
                // `*` is invariant-with-no-type; an explicit variance on a
                // wildcard is rejected by construction (no grammar for it).
                TypeArgument {
                    variance: Variance::Invariant,
                    ty: None,
                    span: start,
                }
            } else {
                let variance = if self.at(TokenKind::In) {
                    self.bump();
                    Variance::In
                } else if self.at_soft("out") && self.nth(1) == TokenKind::Identifier {
                    self.bump();
                    Variance::Out
                } else {
                    Variance::Invariant
                };
                let ty = self.parse_type_opt()?;
                let span = Span::new(start.start, ty.span.end);
                TypeArgument {
                    variance,
                    ty: Some(ty),
                    span,
                }
            };
            args.push(arg);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if !self.eat(TokenKind::Gt) {
            return None;
        }
        Some(args)
    }

    /// Declaration-site type parameter list `<out T : Upper, reified R>`,
    /// starting at `<`. The `out`/`reified` soft keywords promote here.
    pub(crate) fn parse_type_params(&mut self) -> Vec<TypeParameter> {
        let mut params = Vec::new();
        if !self.eat(TokenKind::Lt) {
            return params;
        }
        loop {
            let start = self.current_span();
            let mut variance = Variance::Invariant;
            if self.at(TokenKind::In) {
                self.bump();
                variance = Variance::In;
            } else if self.at_soft("out") && self.nth(1) == TokenKind::Identifier {
                self.bump();
                variance = Variance::Out;
            }
            let mut reified = false;
            if self.at_soft("reified") && self.nth(1) == TokenKind::Identifier {
                self.bump();
                reified = true;
            }
            let Some((name, name_span)) = self.expect_ident("type parameter name") else {
                break;
            };
            let upper_bound = if self.eat(TokenKind::Colon) {
                Some(self.parse_type())
            } else {
                None
            };
            let span = Span::new(start.start, self.prev_span().end);
            params.push(TypeParameter {
                name: Ident::new(name, name_span),
                variance,
                upper_bound,
                reified,
                span,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt, "`>`");
        params
    }

    /// Optional `where T : Bound, U : Other` clause; bounds are merged into
    /// the matching type parameters. `where` is a soft keyword.
    pub(crate) fn parse_where_clause(&mut self, type_params: &mut [TypeParameter]) {
        if !self.at_soft("where") {
            return;
        }
        self.bump();
        loop {
            let Some((name, name_span)) = self.expect_ident("type parameter name") else {
                return;
            };
            self.expect(TokenKind::Colon, "`:`");
            let bound = self.parse_type();
            match type_params.iter_mut().find(|tp| tp.name.name == name) {
                Some(tp) => tp.upper_bound = Some(bound),
                None => {
                    self.error_at(name_span, format!("unknown type parameter `{name}` in where clause"));
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
    }
}
