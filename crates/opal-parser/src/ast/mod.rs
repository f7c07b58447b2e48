//! Owned AST for the Opal language.
//!
//! Every node carries a [`Span`]; expressions (and the declarations the
//! analyzer attaches types to) additionally carry a [`NodeId`] so semantic
//! results can live in side tables instead of on the tree.

pub mod expr;
pub mod item;
pub mod stmt;
pub mod types;

use serde::Serialize;

use opal_common::span::Span;

pub use expr::*;
pub use item::*;
pub use stmt::*;
pub use types::*;

/// Identity of an AST node that semantic analysis annotates.
///
/// Ids are handed out by the parser from a per-parse counter, so they are
/// dense and usable as map keys across the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub u32);

/// A single identifier with its source range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self { name: name.into(), span }
    }
}

/// Dot-separated name (`a.b.c`) used by packages, imports, and type names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualifiedName {
    pub segments: Vec<Ident>,
    pub span: Span,
}

impl QualifiedName {
    /// Render as the dotted source form.
    pub fn dotted(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Last segment (the simple name).
    pub fn simple_name(&self) -> &str {
        &self.segments.last().expect("qualified name has segments").name
    }
}

/// A parsed compilation unit.
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub package: Option<PackageDecl>,
    pub imports: Vec<ImportDecl>,
    pub decls: Vec<Decl>,
    pub span: Span,
}
