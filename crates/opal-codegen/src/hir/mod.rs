//! High-level IR: a typed, desugared tree.
//!
//! HIR mirrors the AST shape but every node carries its resolved type, all
//! surface sugar (safe calls, elvis, `when`, ranges, interpolation,
//! pipelines, destructuring, default arguments) is already expanded, and
//! name references are split into locals, globals, fields, and statics.
//! Lambdas have been lifted into `$Lambda$N` classes with explicit capture
//! fields.

pub mod lower;
pub mod opt;

use opal_common::span::Span;
use opal_sema::Type;

use crate::mir::{MirBinOp, MirUnOp};

#[derive(Debug, Clone)]
pub struct HirModule {
    pub package: Option<String>,
    pub classes: Vec<HirClass>,
    pub functions: Vec<HirFunction>,
    pub globals: Vec<HirGlobal>,
    pub imports: Vec<String>,
    pub extensions: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct HirGlobal {
    pub name: String,
    pub ty: Type,
    pub init: Option<HirExpr>,
    pub mutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HirClassKind {
    Class,
    Interface,
    Enum,
    Object,
    /// Lifted closure class.
    Lambda,
}

#[derive(Debug, Clone)]
pub struct HirClass {
    pub name: String,
    pub kind: HirClassKind,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<HirField>,
    pub methods: Vec<HirFunction>,
    pub enum_entries: Vec<HirEnumEntry>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct HirField {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub struct HirEnumEntry {
    pub name: String,
    pub args: Vec<HirExpr>,
}

#[derive(Debug, Clone)]
pub struct HirParam {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct HirFunction {
    pub name: String,
    /// Owning class; `None` for top-level (static module) functions.
    pub owner: Option<String>,
    pub params: Vec<HirParam>,
    pub ret: Type,
    pub body: Option<HirExpr>,
    pub is_static: bool,
    /// Declared `inline`; the expander skips its size cap for these.
    pub is_inline: bool,
    /// Reified type parameter names carried through to MIR.
    pub reified: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct HirCatch {
    /// Source-level exception class name.
    pub class: String,
    pub binding: String,
    pub ty: Type,
    pub body: HirExpr,
}

#[derive(Debug, Clone)]
pub struct HirExpr {
    pub kind: HirExprKind,
    pub ty: Type,
    pub span: Span,
}

impl HirExpr {
    pub fn new(kind: HirExprKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn unit(span: Span) -> Self {
        Self::new(HirExprKind::Unit, Type::unit(), span)
    }
}

#[derive(Debug, Clone)]
pub enum HirExprKind {
    Unit,
    ConstInt(i64),
    ConstLong(i64),
    ConstFloat(f64),
    ConstDouble(f64),
    ConstBool(bool),
    ConstChar(char),
    ConstStr(String),
    ConstNull,
    /// Materialized class constant (reified type arguments).
    ConstClass(String),

    Local(String),
    Global(String),
    /// Binding introduction; visible to the rest of the enclosing block.
    Let {
        name: String,
        mutable: bool,
        value: Option<Box<HirExpr>>,
    },
    AssignLocal {
        name: String,
        value: Box<HirExpr>,
    },
    AssignGlobal {
        name: String,
        value: Box<HirExpr>,
    },
    GetField {
        target: Box<HirExpr>,
        owner: String,
        name: String,
    },
    SetField {
        target: Box<HirExpr>,
        owner: String,
        name: String,
        value: Box<HirExpr>,
    },
    /// Static field read: enum entries, object instances.
    GetStatic {
        owner: String,
        name: String,
    },

    Binary {
        op: MirBinOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Unary {
        op: MirUnOp,
        operand: Box<HirExpr>,
    },

    If {
        cond: Box<HirExpr>,
        then_e: Box<HirExpr>,
        else_e: Option<Box<HirExpr>>,
    },
    While {
        label: Option<String>,
        cond: Box<HirExpr>,
        body: Box<HirExpr>,
    },
    DoWhile {
        label: Option<String>,
        body: Box<HirExpr>,
        cond: Box<HirExpr>,
    },
    /// Desugared counted/iterator loop: `continue` targets `update`, not
    /// the condition (the binding fetch lives at the top of `body`).
    For {
        label: Option<String>,
        cond: Box<HirExpr>,
        update: Box<HirExpr>,
        body: Box<HirExpr>,
    },
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    Return {
        value: Option<Box<HirExpr>>,
    },
    Throw {
        value: Box<HirExpr>,
    },
    Try {
        body: Box<HirExpr>,
        catches: Vec<HirCatch>,
        finally: Option<Box<HirExpr>>,
    },
    /// Statement sequence; the value is the last expression's value.
    Block(Vec<HirExpr>),

    New {
        class: String,
        args: Vec<HirExpr>,
    },
    NewClosure {
        class: String,
        captures: Vec<(String, HirExpr)>,
    },
    CallStatic {
        owner: String,
        name: String,
        args: Vec<HirExpr>,
        special: u8,
    },
    CallVirtual {
        target: Box<HirExpr>,
        owner: String,
        name: String,
        args: Vec<HirExpr>,
    },
    CallInterface {
        target: Box<HirExpr>,
        owner: String,
        name: String,
        args: Vec<HirExpr>,
    },
    CallSpecial {
        target: Box<HirExpr>,
        owner: String,
        name: String,
        args: Vec<HirExpr>,
    },
    /// Invocation through a function value.
    CallValue {
        callee: Box<HirExpr>,
        args: Vec<HirExpr>,
    },

    IndexGet {
        target: Box<HirExpr>,
        index: Box<HirExpr>,
    },
    IndexSet {
        target: Box<HirExpr>,
        index: Box<HirExpr>,
        value: Box<HirExpr>,
    },

    TypeCheck {
        operand: Box<HirExpr>,
        class: String,
    },
    TypeCast {
        operand: Box<HirExpr>,
        class: String,
        safe: bool,
    },

    /// Error-recovery placeholder; never reaches MIR.
    Error,
}

impl HirExprKind {
    /// Whether evaluation completes without observable effects.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            HirExprKind::Unit
                | HirExprKind::ConstInt(_)
                | HirExprKind::ConstLong(_)
                | HirExprKind::ConstFloat(_)
                | HirExprKind::ConstDouble(_)
                | HirExprKind::ConstBool(_)
                | HirExprKind::ConstChar(_)
                | HirExprKind::ConstStr(_)
                | HirExprKind::ConstNull
                | HirExprKind::ConstClass(_)
                | HirExprKind::Local(_)
                | HirExprKind::Global(_)
        )
    }

    /// Whether control never continues past this expression.
    pub fn diverges(&self) -> bool {
        matches!(
            self,
            HirExprKind::Return { .. }
                | HirExprKind::Throw { .. }
                | HirExprKind::Break { .. }
                | HirExprKind::Continue { .. }
        )
    }
}
