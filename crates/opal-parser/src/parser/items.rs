//! Declaration parsing: program structure, classes, interfaces, objects,
//! enums, functions, properties, constructors, type aliases.

use opal_common::span::Span;
use opal_common::token::TokenKind;

use crate::ast::{
    Accessor, ClassDecl, ConstructorDecl, Decl, Delegation, DelegationKind, DestructuringDecl,
    EnumDecl, EnumEntry, Expr, FunBody, FunDecl, Ident, ImportDecl, InitBlockDecl, InterfaceDecl,
    Member, Modifiers, ObjectDecl, PackageDecl, Parameter, Program, PropertyDecl, QualifiedName,
    SuperTypeEntry, TypeAliasDecl, TypeRef, Visibility,
};

use super::Parser;

impl<'src, 'sink> Parser<'src, 'sink> {
    /// Parse a whole compilation unit.
    pub(crate) fn parse_program(&mut self) -> Program {
        let start = self.current_span();
        self.skip_newlines();

        let package = if self.at(TokenKind::Package) {
            let pkg_start = self.current_span();
            self.bump();
            let name = self.parse_qualified_name();
            let span = Span::new(pkg_start.start, self.prev_span().end);
            self.expect_terminator();
            Some(PackageDecl { name, span })
        } else {
            None
        };

        let mut imports = Vec::new();
        loop {
            self.skip_newlines();
            if !self.at(TokenKind::Import) {
                break;
            }
            imports.push(self.parse_import());
            self.expect_terminator();
        }

        let mut decls = Vec::new();
        loop {
            while self.eat(TokenKind::Newline) || self.eat(TokenKind::Semicolon) {}
            if self.at(TokenKind::Eof) {
                break;
            }
            match self.parse_decl_opt() {
                Some(decl) => {
                    decls.push(decl);
                    self.expect_terminator();
                }
                None => {
                    // parse_decl_opt reported and synchronized.
                }
            }
        }

        let span = Span::new(start.start, self.prev_span().end.max(start.start));
        Program {
            package,
            imports,
            decls,
            span,
        }
    }

    fn parse_qualified_name(&mut self) -> QualifiedName {
        let start = self.current_span();
        let mut segments = Vec::new();
        if let Some((name, span)) = self.expect_ident("name") {
            segments.push(Ident::new(name, span));
        }
        while self.at(TokenKind::Dot) && self.nth(1) == TokenKind::Identifier {
            self.bump();
            let token = self.bump();
            let text = self.source[token.span.start as usize..token.span.end as usize].to_string();
            segments.push(Ident::new(text, token.span));
        }
        let span = Span::new(start.start, self.prev_span().end);
        QualifiedName { segments, span }
    }

    /// `import a.b.C`, `import a.b.*`, `import a.b.C as D`.
    fn parse_import(&mut self) -> ImportDecl {
        let start = self.current_span();
        self.bump(); // `import`
        let mut segments = Vec::new();
        let mut wildcard = false;
        if let Some((name, span)) = self.expect_ident("import path") {
            segments.push(Ident::new(name, span));
        }
        while self.at(TokenKind::Dot) {
            if self.nth(1) == TokenKind::Identifier {
                self.bump();
                let token = self.bump();
                let text =
                    self.source[token.span.start as usize..token.span.end as usize].to_string();
                segments.push(Ident::new(text, token.span));
            } else if self.nth(1) == TokenKind::Star {
                self.bump();
                self.bump();
                wildcard = true;
                break;
            } else {
                break;
            }
        }
        let path_span = Span::new(start.start, self.prev_span().end);
        let alias = if !wildcard && self.eat(TokenKind::As) {
            self.expect_ident("import alias")
                .map(|(name, span)| Ident::new(name, span))
        } else {
            None
        };
        let span = Span::new(start.start, self.prev_span().end);
        ImportDecl {
            path: QualifiedName {
                segments,
                span: path_span,
            },
            wildcard,
            alias,
            span,
        }
    }

    /// Modifier keywords preceding a declaration.
    pub(crate) fn parse_modifiers(&mut self) -> Modifiers {
        let mut m = Modifiers::default();
        loop {
            match self.current() {
                TokenKind::Private => m.visibility = Visibility::Private,
                TokenKind::Protected => m.visibility = Visibility::Protected,
                TokenKind::Internal => m.visibility = Visibility::Internal,
                TokenKind::Public => m.visibility = Visibility::Public,
                TokenKind::Open => m.is_open = true,
                TokenKind::Abstract => m.is_abstract = true,
                TokenKind::Sealed => m.is_sealed = true,
                TokenKind::Override => m.is_override = true,
                TokenKind::Inline => m.is_inline = true,
                TokenKind::Data => m.is_data = true,
                TokenKind::Const => m.is_const = true,
                TokenKind::Lateinit => m.is_lateinit = true,
                TokenKind::Operator => m.is_operator = true,
                TokenKind::Infix => m.is_infix = true,
                TokenKind::Suspend => m.is_suspend = true,
                _ => return m,
            }
            self.bump();
        }
    }

    /// Parse a declaration after statement dispatch decided one starts
    /// here. Reports and synchronizes on failure.
    pub(crate) fn parse_decl(&mut self) -> Option<Decl> {
        self.parse_decl_opt()
    }

    fn parse_decl_opt(&mut self) -> Option<Decl> {
        let modifiers = self.parse_modifiers();
        match self.current() {
            TokenKind::Class => Some(Decl::Class(self.parse_class(modifiers))),
            TokenKind::Interface => Some(Decl::Interface(self.parse_interface(modifiers))),
            TokenKind::Object => Some(Decl::Object(self.parse_object(modifiers, false))),
            TokenKind::Enum => Some(Decl::Enum(self.parse_enum(modifiers))),
            TokenKind::Fun => Some(Decl::Fun(self.parse_fun(modifiers))),
            TokenKind::Val | TokenKind::Var => {
                Some(self.parse_property_or_destructuring(modifiers))
            }
            TokenKind::Typealias => Some(Decl::TypeAlias(self.parse_typealias())),
            _ => {
                let found = match self.current() {
                    TokenKind::Eof => "end of file".to_string(),
                    _ => format!("`{}`", self.current_text()),
                };
                self.error_here(format!("expected declaration, found {found}"));
                self.sync_to_boundary();
                None
            }
        }
    }

    // ── Classes ────────────────────────────────────────────────────────

    fn parse_class(&mut self, modifiers: Modifiers) -> ClassDecl {
        let start = self.current_span();
        self.bump(); // `class`
        let name = self
            .expect_ident("class name")
            .map(|(n, s)| Ident::new(n, s))
            .unwrap_or_else(|| Ident::new("$error", start));
        let type_params = if self.at(TokenKind::Lt) {
            self.parse_type_params()
        } else {
            Vec::new()
        };

        // Optional soft `constructor` keyword before the primary parameter
        // list.
        if self.at_soft("constructor") && self.nth(1) == TokenKind::LParen {
            self.bump();
        }
        let primary_params = if self.at(TokenKind::LParen) {
            self.parse_primary_params()
        } else {
            Vec::new()
        };

        let supertypes = if self.eat(TokenKind::Colon) {
            self.parse_supertype_entries()
        } else {
            Vec::new()
        };

        let members = if self.at(TokenKind::LBrace) {
            self.parse_class_body()
        } else {
            Vec::new()
        };

        let span = Span::new(start.start, self.prev_span().end);
        ClassDecl {
            modifiers,
            name,
            type_params,
            primary_params,
            supertypes,
            members,
            span,
        }
    }

    fn parse_interface(&mut self, modifiers: Modifiers) -> InterfaceDecl {
        let start = self.current_span();
        self.bump(); // `interface`
        let name = self
            .expect_ident("interface name")
            .map(|(n, s)| Ident::new(n, s))
            .unwrap_or_else(|| Ident::new("$error", start));
        let type_params = if self.at(TokenKind::Lt) {
            self.parse_type_params()
        } else {
            Vec::new()
        };
        let supertypes = if self.eat(TokenKind::Colon) {
            self.parse_supertype_entries()
        } else {
            Vec::new()
        };
        let members = if self.at(TokenKind::LBrace) {
            self.parse_class_body()
        } else {
            Vec::new()
        };
        let span = Span::new(start.start, self.prev_span().end);
        InterfaceDecl {
            modifiers,
            name,
            type_params,
            supertypes,
            members,
            span,
        }
    }

    /// `object Name : Super { ... }`; with `companion = true` the name is
    /// optional.
    fn parse_object(&mut self, modifiers: Modifiers, companion: bool) -> ObjectDecl {
        let start = self.current_span();
        self.bump(); // `object`
        let name = if self.at(TokenKind::Identifier) {
            let token = self.bump();
            let text = self.source[token.span.start as usize..token.span.end as usize].to_string();
            Some(Ident::new(text, token.span))
        } else {
            if !companion {
                self.error_here("expected object name");
            }
            None
        };
        let supertypes = if self.eat(TokenKind::Colon) {
            self.parse_supertype_entries()
        } else {
            Vec::new()
        };
        let members = if self.at(TokenKind::LBrace) {
            self.parse_class_body()
        } else {
            Vec::new()
        };
        let span = Span::new(start.start, self.prev_span().end);
        ObjectDecl {
            modifiers,
            name,
            is_companion: companion,
            supertypes,
            members,
            span,
        }
    }

    /// `enum class Color(val rgb: Int) { RED(0xFF0000), GREEN(0x00FF00); fun hex(): String = ... }`
    fn parse_enum(&mut self, modifiers: Modifiers) -> EnumDecl {
        let start = self.current_span();
        self.bump(); // `enum`
        self.expect(TokenKind::Class, "`class` after `enum`");
        let name = self
            .expect_ident("enum name")
            .map(|(n, s)| Ident::new(n, s))
            .unwrap_or_else(|| Ident::new("$error", start));
        let primary_params = if self.at(TokenKind::LParen) {
            self.parse_primary_params()
        } else {
            Vec::new()
        };

        let mut entries = Vec::new();
        let mut members = Vec::new();
        self.expect(TokenKind::LBrace, "`{`");
        loop {
            while self.eat(TokenKind::Newline) {}
            if self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) {
                break;
            }
            if self.eat(TokenKind::Semicolon) {
                // Entries end; members follow.
                loop {
                    while self.eat(TokenKind::Newline) || self.eat(TokenKind::Semicolon) {}
                    if self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) {
                        break;
                    }
                    if let Some(member) = self.parse_member() {
                        members.push(member);
                        self.expect_terminator();
                    }
                }
                break;
            }
            let entry_start = self.current_span();
            let Some((entry_name, name_span)) = self.expect_ident("enum entry") else {
                self.sync_to_boundary();
                continue;
            };
            let args = if self.at(TokenKind::LParen) {
                self.parse_paren_exprs()
            } else {
                Vec::new()
            };
            let span = Span::new(entry_start.start, self.prev_span().end);
            entries.push(EnumEntry {
                name: Ident::new(entry_name, name_span),
                args,
                span,
            });
            if !self.eat(TokenKind::Comma) {
                while self.eat(TokenKind::Newline) {}
                if self.eat(TokenKind::Semicolon) {
                    loop {
                        while self.eat(TokenKind::Newline) || self.eat(TokenKind::Semicolon) {}
                        if self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) {
                            break;
                        }
                        if let Some(member) = self.parse_member() {
                            members.push(member);
                            self.expect_terminator();
                        }
                    }
                }
                break;
            }
        }
        self.expect(TokenKind::RBrace, "`}`");
        let span = Span::new(start.start, self.prev_span().end);
        EnumDecl {
            modifiers,
            name,
            primary_params,
            entries,
            members,
            span,
        }
    }

    /// `: Super(args), Iface, Other` entries after the colon.
    fn parse_supertype_entries(&mut self) -> Vec<SuperTypeEntry> {
        let mut entries = Vec::new();
        loop {
            let start = self.current_span();
            let ty = self.parse_type();
            let args = if self.at(TokenKind::LParen) {
                Some(self.parse_paren_exprs())
            } else {
                None
            };
            let span = Span::new(start.start, self.prev_span().end);
            entries.push(SuperTypeEntry { ty, args, span });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        entries
    }

    /// `(expr, expr)` plain positional expression list.
    fn parse_paren_exprs(&mut self) -> Vec<Expr> {
        self.bump(); // `(`
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`");
        args
    }

    /// Class body members between braces. Also used by object literals.
    pub(crate) fn parse_class_body(&mut self) -> Vec<Member> {
        self.expect(TokenKind::LBrace, "`{`");
        let mut members = Vec::new();
        loop {
            while self.eat(TokenKind::Newline) || self.eat(TokenKind::Semicolon) {}
            if self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) {
                break;
            }
            match self.parse_member() {
                Some(member) => {
                    members.push(member);
                    self.expect_terminator();
                }
                None => {
                    // parse_member reported and synchronized.
                }
            }
        }
        self.expect(TokenKind::RBrace, "`}`");
        members
    }

    /// One class member. The `constructor` and `init` soft keywords promote
    /// here (inside a class body, before `(` / `{`).
    fn parse_member(&mut self) -> Option<Member> {
        let modifiers = self.parse_modifiers();
        match self.current() {
            TokenKind::Fun => Some(Member::Fun(self.parse_fun(modifiers))),
            TokenKind::Val | TokenKind::Var => {
                match self.parse_property_or_destructuring(modifiers) {
                    Decl::Property(p) => Some(Member::Property(p)),
                    other => {
                        self.error_at(other.span(), "destructuring is not allowed in a class body");
                        None
                    }
                }
            }
            TokenKind::Class => Some(Member::Class(self.parse_class(modifiers))),
            TokenKind::Object => Some(Member::Object(self.parse_object(modifiers, false))),
            TokenKind::Enum => Some(Member::Enum(self.parse_enum(modifiers))),
            TokenKind::Companion => {
                self.bump();
                if !self.at(TokenKind::Object) {
                    self.error_here("expected `object` after `companion`");
                    self.sync_to_boundary();
                    return None;
                }
                let mut object = self.parse_object(modifiers, true);
                object.is_companion = true;
                Some(Member::Object(object))
            }
            TokenKind::Identifier
                if self.at_soft("constructor") && self.nth(1) == TokenKind::LParen =>
            {
                Some(Member::Constructor(self.parse_secondary_ctor(modifiers)))
            }
            TokenKind::Identifier if self.at_soft("init") && self.nth(1) == TokenKind::LBrace => {
                let start = self.current_span();
                self.bump(); // `init`
                let body = self.parse_block();
                let span = Span::new(start.start, self.prev_span().end);
                Some(Member::Init(InitBlockDecl { body, span }))
            }
            _ => {
                let found = match self.current() {
                    TokenKind::Eof => "end of file".to_string(),
                    _ => format!("`{}`", self.current_text()),
                };
                self.error_here(format!("expected class member, found {found}"));
                self.sync_to_boundary();
                None
            }
        }
    }

    /// Secondary constructor after the soft `constructor` keyword.
    fn parse_secondary_ctor(&mut self, modifiers: Modifiers) -> ConstructorDecl {
        let start = self.current_span();
        self.bump(); // `constructor`
        let params = self.parse_fun_params();
        let delegation = if self.eat(TokenKind::Colon) {
            let delegation_start = self.current_span();
            let kind = if self.eat(TokenKind::ThisKw) {
                Some(DelegationKind::This)
            } else if self.eat(TokenKind::Super) {
                Some(DelegationKind::Super)
            } else {
                self.error_here("expected `this` or `super` in constructor delegation");
                None
            };
            kind.map(|kind| {
                let args = if self.at(TokenKind::LParen) {
                    self.parse_paren_exprs()
                } else {
                    Vec::new()
                };
                let span = Span::new(delegation_start.start, self.prev_span().end);
                Delegation { kind, args, span }
            })
        } else {
            None
        };
        let body = if self.at(TokenKind::LBrace) {
            Some(self.parse_block())
        } else {
            None
        };
        let span = Span::new(start.start, self.prev_span().end);
        ConstructorDecl {
            modifiers,
            params,
            delegation,
            body,
            span,
        }
    }

    // ── Functions ──────────────────────────────────────────────────────

    pub(crate) fn parse_fun(&mut self, modifiers: Modifiers) -> FunDecl {
        let start = self.current_span();
        let id = self.fresh_id();
        self.bump(); // `fun`
        let mut type_params = if self.at(TokenKind::Lt) {
            self.parse_type_params()
        } else {
            Vec::new()
        };

        // Extension receiver: `fun Receiver.name(...)`. Tried
        // speculatively; a plain `fun name(...)` rewinds.
        let receiver = self.speculate(|p| {
            let ty = p.parse_type_opt()?;
            if p.at(TokenKind::Dot) && p.nth(1) == TokenKind::Identifier {
                p.bump(); // `.`
                Some(ty)
            } else {
                None
            }
        });

        let name = self
            .expect_ident("function name")
            .map(|(n, s)| Ident::new(n, s))
            .unwrap_or_else(|| Ident::new("$error", start));
        let params = self.parse_fun_params();
        let return_type = if self.eat(TokenKind::Colon) {
            Some(self.parse_type())
        } else {
            None
        };
        self.parse_where_clause(&mut type_params);

        let body = if self.at(TokenKind::LBrace) {
            Some(FunBody::Block(self.parse_block()))
        } else if self.eat(TokenKind::Eq) {
            Some(FunBody::Expr(self.parse_expr()))
        } else {
            None
        };
        let span = Span::new(start.start, self.prev_span().end);
        FunDecl {
            id,
            modifiers,
            type_params,
            receiver,
            name,
            params,
            return_type,
            body,
            span,
        }
    }

    /// `(name: Type = default, ...)` function parameter list.
    pub(crate) fn parse_fun_params(&mut self) -> Vec<Parameter> {
        let mut params = Vec::new();
        if !self.expect(TokenKind::LParen, "`(`") {
            return params;
        }
        if !self.at(TokenKind::RParen) {
            loop {
                let id = self.fresh_id();
                let Some((name, name_span)) = self.expect_ident("parameter name") else {
                    break;
                };
                self.expect(TokenKind::Colon, "`:` after parameter name");
                let ty = self.parse_type();
                let default = if self.eat(TokenKind::Eq) {
                    Some(self.parse_expr())
                } else {
                    None
                };
                let span = Span::new(name_span.start, self.prev_span().end);
                params.push(Parameter {
                    id,
                    name: Ident::new(name, name_span),
                    ty: Some(ty),
                    default,
                    property: None,
                    span,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                if self.at(TokenKind::RParen) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`");
        params
    }

    /// Primary-constructor parameter list; `val`/`var` promote parameters
    /// to properties.
    fn parse_primary_params(&mut self) -> Vec<Parameter> {
        let mut params = Vec::new();
        self.bump(); // `(`
        if !self.at(TokenKind::RParen) {
            loop {
                let id = self.fresh_id();
                let property = if self.eat(TokenKind::Val) {
                    Some(false)
                } else if self.eat(TokenKind::Var) {
                    Some(true)
                } else {
                    None
                };
                let Some((name, name_span)) = self.expect_ident("parameter name") else {
                    break;
                };
                self.expect(TokenKind::Colon, "`:` after parameter name");
                let ty = self.parse_type();
                let default = if self.eat(TokenKind::Eq) {
                    Some(self.parse_expr())
                } else {
                    None
                };
                let span = Span::new(name_span.start, self.prev_span().end);
                params.push(Parameter {
                    id,
                    name: Ident::new(name, name_span),
                    ty: Some(ty),
                    default,
                    property,
                    span,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                if self.at(TokenKind::RParen) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`");
        params
    }

    // ── Properties ─────────────────────────────────────────────────────

    /// `val x = ...`, `var x: T`, `val (a, b) = pair`, extension
    /// properties, custom accessors.
    pub(crate) fn parse_property_or_destructuring(&mut self, modifiers: Modifiers) -> Decl {
        let start = self.current_span();
        let mutable = self.at(TokenKind::Var);
        self.bump(); // `val` / `var`

        if self.at(TokenKind::LParen) {
            return Decl::Destructuring(self.parse_destructuring(mutable, start));
        }

        let id = self.fresh_id();

        // Extension property receiver: `val Receiver.name`.
        let receiver = self.speculate(|p| {
            let ty = p.parse_type_opt()?;
            if p.at(TokenKind::Dot) && p.nth(1) == TokenKind::Identifier {
                p.bump(); // `.`
                Some(ty)
            } else {
                None
            }
        });

        let name = self
            .expect_ident("property name")
            .map(|(n, s)| Ident::new(n, s))
            .unwrap_or_else(|| Ident::new("$error", start));
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type())
        } else {
            None
        };
        let initializer = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr())
        } else {
            None
        };

        let mut getter = None;
        let mut setter = None;
        loop {
            match self.peek_accessor() {
                Some(false) => {
                    self.skip_newlines();
                    getter = Some(self.parse_accessor());
                }
                Some(true) => {
                    self.skip_newlines();
                    setter = Some(self.parse_accessor());
                }
                None => break,
            }
        }

        let span = Span::new(start.start, self.prev_span().end);
        Decl::Property(PropertyDecl {
            id,
            modifiers,
            mutable,
            receiver,
            name,
            ty,
            initializer,
            getter,
            setter,
            span,
        })
    }

    /// Whether an accessor header (`get(` / `set(`) follows, possibly after
    /// newlines. Returns `Some(is_setter)`.
    fn peek_accessor(&self) -> Option<bool> {
        let mut n = 0;
        while self.nth(n) == TokenKind::Newline {
            n += 1;
        }
        if self.nth(n) != TokenKind::Identifier || self.nth(n + 1) != TokenKind::LParen {
            return None;
        }
        let token = self.nth_token(n);
        let text = &self.source[token.span.start as usize..token.span.end as usize];
        match text {
            "get" => Some(false),
            "set" => Some(true),
            _ => None,
        }
    }

    /// `get() = expr`, `get() { ... }`, `set(value) { ... }`.
    fn parse_accessor(&mut self) -> Accessor {
        let start = self.current_span();
        self.bump(); // `get` / `set`
        let mut params = Vec::new();
        self.bump(); // `(`
        if self.at(TokenKind::Identifier) {
            let id = self.fresh_id();
            let token = self.bump();
            let name = self.source[token.span.start as usize..token.span.end as usize].to_string();
            let ty = if self.eat(TokenKind::Colon) {
                Some(self.parse_type())
            } else {
                None
            };
            params.push(Parameter {
                id,
                name: Ident::new(name, token.span),
                ty,
                default: None,
                property: None,
                span: token.span,
            });
        }
        self.expect(TokenKind::RParen, "`)`");
        let body = if self.eat(TokenKind::Eq) {
            FunBody::Expr(self.parse_expr())
        } else {
            FunBody::Block(self.parse_block())
        };
        let span = Span::new(start.start, self.prev_span().end);
        Accessor { params, body, span }
    }

    /// `(a, _, c) = expr` after `val`/`var`.
    fn parse_destructuring(&mut self, mutable: bool, start: Span) -> DestructuringDecl {
        self.bump(); // `(`
        let mut names = Vec::new();
        let mut name_ids = Vec::new();
        loop {
            name_ids.push(self.fresh_id());
            if self.eat(TokenKind::Underscore) {
                names.push(None);
            } else if let Some((name, span)) = self.expect_ident("binding name") {
                names.push(Some(Ident::new(name, span)));
            } else {
                break;
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)`");
        self.expect(TokenKind::Eq, "`=` in destructuring declaration");
        let initializer = self.parse_expr();
        let span = Span::new(start.start, self.prev_span().end);
        DestructuringDecl {
            mutable,
            names,
            name_ids,
            initializer,
            span,
        }
    }

    /// `typealias Name<T> = Target`.
    fn parse_typealias(&mut self) -> TypeAliasDecl {
        let start = self.current_span();
        self.bump(); // `typealias`
        let name = self
            .expect_ident("type alias name")
            .map(|(n, s)| Ident::new(n, s))
            .unwrap_or_else(|| Ident::new("$error", start));
        let type_params = if self.at(TokenKind::Lt) {
            self.parse_type_params()
        } else {
            Vec::new()
        };
        self.expect(TokenKind::Eq, "`=`");
        let ty: TypeRef = self.parse_type();
        let span = Span::new(start.start, self.prev_span().end);
        TypeAliasDecl {
            name,
            type_params,
            ty,
            span,
        }
    }
}
