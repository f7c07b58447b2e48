//! Expression nodes.

use serde::Serialize;

use opal_common::span::Span;

use super::item::{Member, Parameter};
use super::stmt::{Block, CatchClause};
use super::types::{TypeArgument, TypeRef};
use super::{Ident, NodeId};

/// An expression with identity and source range.
#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

/// Literal payloads, tagged by literal kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LiteralKind {
    Int(i64),
    Long(i64),
    Float(f64),
    Double(f64),
    Char(char),
    Bool(bool),
    Str(String),
    Null,
}

/// Binary operators below the postfix level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `===`
    RefEq,
    /// `!==`
    RefNe,
    Lt,
    Gt,
    Le,
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `in` / `!in` (negation is a flag on the node).
    In,
    /// `to` -- pair construction.
    To,
}

/// Prefix unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    PreInc,
    PreDec,
}

/// Postfix `++` / `--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PostfixOp {
    Inc,
    Dec,
}

/// Assignment operators, simple and compound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    /// `??=` -- assign only when the target is null.
    CoalesceAssign,
}

/// One argument at a call site.
#[derive(Debug, Clone, Serialize)]
pub struct CallArg {
    pub name: Option<Ident>,
    pub spread: bool,
    pub value: Expr,
}

/// Collection literal flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectionKind {
    List,
    Set,
    Map,
}

/// A part of an interpolated string.
#[derive(Debug, Clone, Serialize)]
pub enum InterpPart {
    Lit(String),
    Expr(Box<Expr>),
}

/// A `when` subject: `when (x)` or `when (val x = expr)`.
#[derive(Debug, Clone, Serialize)]
pub struct WhenSubject {
    /// Binding introduced by `val name = ...`, scoped to the branches.
    pub binding: Option<Ident>,
    pub binding_id: NodeId,
    pub expr: Box<Expr>,
}

/// One branch condition of a `when`.
#[derive(Debug, Clone, Serialize)]
pub enum WhenCondition {
    /// Equality against the subject (or a plain boolean without subject).
    Expr(Expr),
    /// `in range` / `!in range`.
    In { negated: bool, expr: Expr },
    /// `is Type` / `!is Type`.
    Is { negated: bool, ty: TypeRef },
    /// `else`.
    Else,
}

#[derive(Debug, Clone, Serialize)]
pub struct WhenBranch {
    pub conditions: Vec<WhenCondition>,
    pub body: Expr,
    pub span: Span,
}

/// The shared shape of `when` in expression and statement positions.
#[derive(Debug, Clone, Serialize)]
pub struct WhenExpr {
    pub subject: Option<WhenSubject>,
    pub branches: Vec<WhenBranch>,
}

/// Jump flavors usable in expression position (type `Nothing`).
#[derive(Debug, Clone, Serialize)]
pub enum JumpKind {
    Return(Option<Box<Expr>>),
    Break,
    Continue,
    Throw(Box<Expr>),
}

#[derive(Debug, Clone, Serialize)]
pub enum ExprKind {
    Literal(LiteralKind),
    /// Identifier reference.
    Name(Ident),
    This {
        label: Option<Ident>,
    },
    Super {
        label: Option<Ident>,
    },
    Binary {
        op: BinaryOp,
        negated: bool,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Declared-infix function call: `a zip b`.
    InfixCall {
        name: Ident,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Postfix {
        op: PostfixOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        type_args: Vec<TypeArgument>,
        args: Vec<CallArg>,
    },
    Index {
        target: Box<Expr>,
        indices: Vec<Expr>,
    },
    /// `a[start..end]` / `a[start..<end]`.
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
        inclusive: bool,
    },
    Member {
        target: Box<Expr>,
        name: Ident,
    },
    /// `a?.b`
    SafeMember {
        target: Box<Expr>,
        name: Ident,
    },
    /// `a?[i]`
    SafeIndex {
        target: Box<Expr>,
        indices: Vec<Expr>,
    },
    /// `obj?.{ block }` -- scope shorthand.
    SafeBlock {
        target: Box<Expr>,
        block: Block,
    },
    /// `a ?: b`
    Elvis {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `a!!`
    NotNull {
        operand: Box<Expr>,
    },
    /// `expr?` -- error propagation.
    Propagate {
        operand: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Lambda {
        params: Vec<Parameter>,
        body: Block,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    When(WhenExpr),
    Try {
        body: Block,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },
    /// Ternary `cond ? a : b`.
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// Block in expression position; the value is the last expression.
    Block(Block),
    /// `obj::method`, `Type::method`, `Type::new`.
    MethodRef {
        target: Box<Expr>,
        name: Ident,
        is_constructor: bool,
    },
    /// Anonymous object: `object : Base { ... }`.
    ObjectLiteral {
        supertypes: Vec<TypeRef>,
        members: Vec<Member>,
    },
    /// `[1, 2]`, `#{1, 2}`, `[k: v]`.
    CollectionLiteral {
        kind: CollectionKind,
        /// List/set elements.
        elements: Vec<Expr>,
        /// Map entries.
        entries: Vec<(Expr, Expr)>,
    },
    StringInterp {
        parts: Vec<InterpPart>,
    },
    /// `_` in pipeline argument position.
    Placeholder,
    /// `*expr` in a collection literal or argument list.
    Spread {
        operand: Box<Expr>,
    },
    Range {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        inclusive: bool,
        step: Option<Box<Expr>>,
    },
    /// `x |> f` / `x |> g(_, 2)`.
    Pipeline {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `a as T` / `a as? T`.
    Cast {
        operand: Box<Expr>,
        ty: TypeRef,
        safe: bool,
    },
    /// `a is T` / `a !is T`.
    TypeCheck {
        operand: Box<Expr>,
        ty: TypeRef,
        negated: bool,
    },
    Await {
        operand: Box<Expr>,
    },
    /// `return` / `break` / `continue` / `throw` in expression position.
    Jump {
        kind: JumpKind,
        label: Option<Ident>,
    },
    /// Placeholder produced by error recovery.
    Error,
}
