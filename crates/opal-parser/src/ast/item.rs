//! Declaration nodes: packages, imports, classes, interfaces, objects,
//! enums, functions, properties, constructors, type aliases.

use serde::Serialize;

use opal_common::span::Span;

use super::expr::Expr;
use super::stmt::Block;
use super::types::{TypeParameter, TypeRef};
use super::{Ident, NodeId, QualifiedName};

/// `package a.b.c`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageDecl {
    pub name: QualifiedName,
    pub span: Span,
}

/// `import a.b.C`, `import a.b.*`, `import a.b.C as D`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportDecl {
    pub path: QualifiedName,
    pub wildcard: bool,
    pub alias: Option<Ident>,
    pub span: Span,
}

/// Any declaration, top-level or nested.
#[derive(Debug, Clone, Serialize)]
pub enum Decl {
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Object(ObjectDecl),
    Enum(EnumDecl),
    Fun(FunDecl),
    Property(PropertyDecl),
    TypeAlias(TypeAliasDecl),
    Destructuring(DestructuringDecl),
}

impl Decl {
    pub fn span(&self) -> Span {
        match self {
            Decl::Class(d) => d.span,
            Decl::Interface(d) => d.span,
            Decl::Object(d) => d.span,
            Decl::Enum(d) => d.span,
            Decl::Fun(d) => d.span,
            Decl::Property(d) => d.span,
            Decl::TypeAlias(d) => d.span,
            Decl::Destructuring(d) => d.span,
        }
    }
}

/// Visibility level on a declaration. `Public` when unwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Protected,
    Internal,
}

/// Modifier set preceding a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Modifiers {
    pub visibility: Visibility,
    pub is_open: bool,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub is_override: bool,
    pub is_inline: bool,
    pub is_data: bool,
    pub is_const: bool,
    pub is_lateinit: bool,
    pub is_operator: bool,
    pub is_infix: bool,
    pub is_suspend: bool,
}

/// A supertype entry in a class header: `Base(args)` or `Iface`.
#[derive(Debug, Clone, Serialize)]
pub struct SuperTypeEntry {
    pub ty: TypeRef,
    /// Constructor arguments; present means this entry is the super-class
    /// initializer call.
    pub args: Option<Vec<Expr>>,
    pub span: Span,
}

/// Member of a class/interface/object/enum body.
#[derive(Debug, Clone, Serialize)]
pub enum Member {
    Fun(FunDecl),
    Property(PropertyDecl),
    Constructor(ConstructorDecl),
    Init(InitBlockDecl),
    Class(ClassDecl),
    Object(ObjectDecl),
    Enum(EnumDecl),
}

/// `class Name<T>(primary ctor params) : Super(...), Iface { members }`
#[derive(Debug, Clone, Serialize)]
pub struct ClassDecl {
    pub modifiers: Modifiers,
    pub name: Ident,
    pub type_params: Vec<TypeParameter>,
    /// Primary constructor parameters; `val`/`var` markers promote them
    /// to properties.
    pub primary_params: Vec<Parameter>,
    pub supertypes: Vec<SuperTypeEntry>,
    pub members: Vec<Member>,
    pub span: Span,
}

/// `interface Name<T> : Super { members }`
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceDecl {
    pub modifiers: Modifiers,
    pub name: Ident,
    pub type_params: Vec<TypeParameter>,
    pub supertypes: Vec<SuperTypeEntry>,
    pub members: Vec<Member>,
    pub span: Span,
}

/// `object Name : Super { members }` or `companion object { ... }`.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectDecl {
    pub modifiers: Modifiers,
    /// Absent only for an unnamed companion object.
    pub name: Option<Ident>,
    pub is_companion: bool,
    pub supertypes: Vec<SuperTypeEntry>,
    pub members: Vec<Member>,
    pub span: Span,
}

/// One entry of an enum: `RED(0xFF0000)`.
#[derive(Debug, Clone, Serialize)]
pub struct EnumEntry {
    pub name: Ident,
    pub args: Vec<Expr>,
    pub span: Span,
}

/// `enum class Color(val rgb: Int) { RED(..), GREEN(..); members }`
#[derive(Debug, Clone, Serialize)]
pub struct EnumDecl {
    pub modifiers: Modifiers,
    pub name: Ident,
    pub primary_params: Vec<Parameter>,
    pub entries: Vec<EnumEntry>,
    pub members: Vec<Member>,
    pub span: Span,
}

/// A function parameter. In a primary constructor, `property` marks
/// `val`/`var` promotion (the bool is mutability).
#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub id: NodeId,
    pub name: Ident,
    pub ty: Option<TypeRef>,
    pub default: Option<Expr>,
    pub property: Option<bool>,
    pub span: Span,
}

/// Function body: `{ ... }` or `= expr`.
#[derive(Debug, Clone, Serialize)]
pub enum FunBody {
    Block(Block),
    Expr(Expr),
}

/// `fun <T> Receiver.name(params): Ret where T : Bound { ... }`
#[derive(Debug, Clone, Serialize)]
pub struct FunDecl {
    pub id: NodeId,
    pub modifiers: Modifiers,
    pub type_params: Vec<TypeParameter>,
    /// Extension receiver type, if any.
    pub receiver: Option<TypeRef>,
    pub name: Ident,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeRef>,
    /// Absent for abstract/interface members.
    pub body: Option<FunBody>,
    pub span: Span,
}

/// Property accessor (`get() = ...` / `set(value) { ... }`).
#[derive(Debug, Clone, Serialize)]
pub struct Accessor {
    pub params: Vec<Parameter>,
    pub body: FunBody,
    pub span: Span,
}

/// `val x: T = init` / `var Receiver.x: T get() = ...`.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyDecl {
    pub id: NodeId,
    pub modifiers: Modifiers,
    pub mutable: bool,
    pub receiver: Option<TypeRef>,
    pub name: Ident,
    pub ty: Option<TypeRef>,
    pub initializer: Option<Expr>,
    pub getter: Option<Accessor>,
    pub setter: Option<Accessor>,
    pub span: Span,
}

/// Secondary constructor: `constructor(params) : this(...) { ... }`.
#[derive(Debug, Clone, Serialize)]
pub struct ConstructorDecl {
    pub modifiers: Modifiers,
    pub params: Vec<Parameter>,
    pub delegation: Option<Delegation>,
    pub body: Option<Block>,
    pub span: Span,
}

/// Constructor delegation target.
#[derive(Debug, Clone, Serialize)]
pub struct Delegation {
    pub kind: DelegationKind,
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DelegationKind {
    This,
    Super,
}

/// `init { ... }` block.
#[derive(Debug, Clone, Serialize)]
pub struct InitBlockDecl {
    pub body: Block,
    pub span: Span,
}

/// `typealias Name<T> = Target`.
#[derive(Debug, Clone, Serialize)]
pub struct TypeAliasDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParameter>,
    pub ty: TypeRef,
    pub span: Span,
}

/// `val (a, _, c) = expr`.
#[derive(Debug, Clone, Serialize)]
pub struct DestructuringDecl {
    pub mutable: bool,
    /// `None` entries are `_` discards.
    pub names: Vec<Option<Ident>>,
    pub name_ids: Vec<NodeId>,
    pub initializer: Expr,
    pub span: Span,
}
