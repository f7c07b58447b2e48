//! Type references and type parameters as they appear in source.

use serde::Serialize;

use opal_common::span::Span;

use super::Ident;

/// Declaration- or use-site variance annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Variance {
    Invariant,
    /// `in T` -- contravariant.
    In,
    /// `out T` -- covariant.
    Out,
}

/// A syntactic type reference (not yet resolved).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeRef {
    pub kind: TypeRefKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeRefKind {
    /// `Int`, `my.pkg.Thing`.
    Simple { name: String },
    /// `T?`
    Nullable(Box<TypeRef>),
    /// `List<Int>`, `Map<in K, *>`.
    Generic {
        name: String,
        args: Vec<TypeArgument>,
    },
    /// `(Int, String) -> Bool`, `Receiver.(Int) -> Unit`, `suspend () -> T`.
    Function {
        receiver: Option<Box<TypeRef>>,
        params: Vec<TypeRef>,
        ret: Box<TypeRef>,
        is_suspend: bool,
    },
}

/// A use-site type argument: a type with optional variance, or `*`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeArgument {
    pub variance: Variance,
    /// `None` is the `*` wildcard (invariant with no type).
    pub ty: Option<TypeRef>,
    pub span: Span,
}

/// A declaration-site type parameter: `<out T : Upper>`, `<reified R>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeParameter {
    pub name: Ident,
    pub variance: Variance,
    pub upper_bound: Option<TypeRef>,
    pub reified: bool,
    pub span: Span,
}
