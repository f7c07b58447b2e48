//! Mid-level IR: a three-address CFG with typed locals.
//!
//! A function is a list of basic blocks; each block holds straight-line
//! instructions and exactly one terminator. Instructions address locals by
//! index (`dest` is -1 when an instruction produces no value). Cross-
//! function references (calls, field access) go by name, never by pointer.

pub mod lower;
pub mod opt;

use std::cell::Cell;
use std::fmt;

use opal_common::span::Span;

// ── Types ──────────────────────────────────────────────────────────────

/// A concrete MIR type with JVM-style descriptor rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MirType {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Char,
    Void,
    /// Reference type by internal name (`java/lang/String`, `demo/Shape`).
    Object(String),
    Array(Box<MirType>),
}

impl MirType {
    /// JVM descriptor: `I J F D Z C V Lname; [elem`.
    pub fn descriptor(&self) -> String {
        match self {
            MirType::Int => "I".to_string(),
            MirType::Long => "J".to_string(),
            MirType::Float => "F".to_string(),
            MirType::Double => "D".to_string(),
            MirType::Boolean => "Z".to_string(),
            MirType::Char => "C".to_string(),
            MirType::Void => "V".to_string(),
            MirType::Object(name) => format!("L{name};"),
            MirType::Array(element) => format!("[{}", element.descriptor()),
        }
    }

    /// Boxed descriptor for object fields: primitives box to their wrapper
    /// classes, references stay as-is.
    pub fn field_descriptor(&self) -> String {
        match self {
            MirType::Int => "Ljava/lang/Integer;".to_string(),
            MirType::Long => "Ljava/lang/Long;".to_string(),
            MirType::Float => "Ljava/lang/Float;".to_string(),
            MirType::Double => "Ljava/lang/Double;".to_string(),
            MirType::Boolean => "Ljava/lang/Boolean;".to_string(),
            MirType::Char => "Ljava/lang/Character;".to_string(),
            MirType::Void => "V".to_string(),
            _ => self.descriptor(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, MirType::Void)
    }

    pub fn object(name: impl Into<String>) -> MirType {
        MirType::Object(name.into())
    }
}

impl fmt::Display for MirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirType::Object(name) => write!(f, "{name}"),
            MirType::Array(element) => write!(f, "{element}[]"),
            other => write!(f, "{}", other.descriptor()),
        }
    }
}

// ── Operators ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// `<<` -- produced by strength reduction.
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    RefEq,
    RefNe,
}

impl MirBinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            MirBinOp::Eq
                | MirBinOp::Ne
                | MirBinOp::Lt
                | MirBinOp::Le
                | MirBinOp::Gt
                | MirBinOp::Ge
                | MirBinOp::RefEq
                | MirBinOp::RefNe
        )
    }

    /// Whether evaluation can fault (division by zero).
    pub fn can_fault(self) -> bool {
        matches!(self, MirBinOp::Div | MirBinOp::Rem)
    }
}

impl fmt::Display for MirBinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MirBinOp::Add => "add",
            MirBinOp::Sub => "sub",
            MirBinOp::Mul => "mul",
            MirBinOp::Div => "div",
            MirBinOp::Rem => "rem",
            MirBinOp::Shl => "shl",
            MirBinOp::Shr => "shr",
            MirBinOp::Eq => "eq",
            MirBinOp::Ne => "ne",
            MirBinOp::Lt => "lt",
            MirBinOp::Le => "le",
            MirBinOp::Gt => "gt",
            MirBinOp::Ge => "ge",
            MirBinOp::RefEq => "ref_eq",
            MirBinOp::RefNe => "ref_ne",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirUnOp {
    Neg,
    Not,
}

impl fmt::Display for MirUnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirUnOp::Neg => write!(f, "neg"),
            MirUnOp::Not => write!(f, "not"),
        }
    }
}

// ── Instructions ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ConstInt,
    ConstLong,
    ConstFloat,
    ConstDouble,
    ConstBool,
    ConstChar,
    ConstStr,
    ConstNull,
    /// Materialized class reference (reified type arguments).
    ConstClass,
    Move,
    Binary,
    Unary,
    NewObject,
    NewArray,
    ArrayLen,
    GetField,
    SetField,
    GetStatic,
    SetStatic,
    IndexGet,
    IndexSet,
    InvokeStatic,
    InvokeVirtual,
    InvokeInterface,
    InvokeSpecial,
    TypeCheck,
    TypeCast,
    Box,
    Unbox,
}

impl Op {
    pub fn is_const(self) -> bool {
        matches!(
            self,
            Op::ConstInt
                | Op::ConstLong
                | Op::ConstFloat
                | Op::ConstDouble
                | Op::ConstBool
                | Op::ConstChar
                | Op::ConstStr
                | Op::ConstNull
                | Op::ConstClass
        )
    }

    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Op::InvokeStatic | Op::InvokeVirtual | Op::InvokeInterface | Op::InvokeSpecial
        )
    }

    /// Whether the instruction writes through memory or has observable
    /// effects beyond its destination.
    pub fn has_side_effects(self) -> bool {
        matches!(
            self,
            Op::SetField | Op::SetStatic | Op::IndexSet | Op::NewObject | Op::NewArray
        ) || self.is_invoke()
    }
}

/// A constant payload carried in the `extra` slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Long(i64),
    Float(f64),
    Double(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Null,
    Class(String),
}

impl ConstValue {
    /// Tag + bit pattern identity, used for value-numbering keys.
    pub fn key(&self) -> (u8, u64) {
        match self {
            ConstValue::Int(v) => (0, *v as u64),
            ConstValue::Long(v) => (1, *v as u64),
            ConstValue::Float(v) => (2, v.to_bits()),
            ConstValue::Double(v) => (3, v.to_bits()),
            ConstValue::Bool(v) => (4, *v as u64),
            ConstValue::Char(v) => (5, *v as u64),
            ConstValue::Str(v) => {
                use std::hash::{Hash, Hasher};
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                v.hash(&mut hasher);
                (6, hasher.finish())
            }
            ConstValue::Null => (7, 0),
            ConstValue::Class(v) => {
                use std::hash::{Hash, Hasher};
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                v.hash(&mut hasher);
                (8, hasher.finish())
            }
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Long(v) => write!(f, "{v}L"),
            ConstValue::Float(v) => write!(f, "{v}f"),
            ConstValue::Double(v) => write!(f, "{v}"),
            ConstValue::Bool(v) => write!(f, "{v}"),
            ConstValue::Char(v) => write!(f, "{v:?}"),
            ConstValue::Str(v) => write!(f, "{v:?}"),
            ConstValue::Null => write!(f, "null"),
            ConstValue::Class(v) => write!(f, "class {v}"),
        }
    }
}

/// `owner|name|descriptor` call target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.owner, self.name, self.descriptor)
    }
}

/// Extra payload of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum InstExtra {
    None,
    Const(ConstValue),
    Method(MethodRef),
    BinOp(MirBinOp),
    UnOp(MirUnOp),
    /// Target type name for checks/casts/news.
    TypeName(String),
    Field { owner: String, name: String },
}

/// Static-call special kinds (spec'd helper dispatch).
pub const SPECIAL_NONE: u8 = 0;
/// Scope-call helper (`?.{ ... }` shorthand).
pub const SPECIAL_SCOPE_CALL: u8 = 1;
/// Partial-application trampoline (pipeline placeholders).
pub const SPECIAL_PARTIAL_APPLY: u8 = 2;
/// Environment / script-context access.
pub const SPECIAL_ENV_ACCESS: u8 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub op: Op,
    /// Destination local index, or -1 when none.
    pub dest: i32,
    /// Operand local indices.
    pub operands: Vec<u32>,
    pub extra: InstExtra,
    pub span: Span,
    pub special_kind: u8,
}

impl Inst {
    pub fn new(op: Op, dest: i32, operands: Vec<u32>, extra: InstExtra, span: Span) -> Self {
        Self {
            op,
            dest,
            operands,
            extra,
            span,
            special_kind: SPECIAL_NONE,
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dest >= 0 {
            write!(f, "%{} = ", self.dest)?;
        }
        write!(f, "{:?}", self.op)?;
        match &self.extra {
            InstExtra::None => {}
            InstExtra::Const(c) => write!(f, " {c}")?,
            InstExtra::Method(m) => write!(f, " {m}")?,
            InstExtra::BinOp(op) => write!(f, ".{op}")?,
            InstExtra::UnOp(op) => write!(f, ".{op}")?,
            InstExtra::TypeName(name) => write!(f, " {name}")?,
            InstExtra::Field { owner, name } => write!(f, " {owner}.{name}")?,
        }
        for operand in &self.operands {
            write!(f, " %{operand}")?;
        }
        if self.special_kind != SPECIAL_NONE {
            write!(f, " !special{}", self.special_kind)?;
        }
        Ok(())
    }
}

// ── Terminators ────────────────────────────────────────────────────────

/// Compare fused into a branch by the peephole pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCompare {
    pub op: MirBinOp,
    pub lhs: u32,
    pub rhs: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Goto {
        target: u32,
    },
    Branch {
        cond: u32,
        then_bb: u32,
        else_bb: u32,
        fused: Option<FusedCompare>,
    },
    /// Return a value local, or -1 for void.
    Return {
        value: i32,
    },
    Switch {
        key: u32,
        cases: Vec<(i64, u32)>,
        default: u32,
    },
    Throw {
        exception: u32,
    },
    Unreachable,
    /// Back-edge to the function's body start, produced by tail-call
    /// elimination after parameter rebinding.
    TailCall {
        entry: u32,
    },
}

impl Terminator {
    /// Integer tag for O(1) dispatch.
    pub const fn kind(&self) -> u8 {
        match self {
            Terminator::Goto { .. } => 0,
            Terminator::Branch { .. } => 1,
            Terminator::Return { .. } => 2,
            Terminator::Switch { .. } => 3,
            Terminator::Throw { .. } => 4,
            Terminator::Unreachable => 5,
            Terminator::TailCall { .. } => 6,
        }
    }

    /// Successor block ids.
    pub fn successors(&self) -> Vec<u32> {
        match self {
            Terminator::Goto { target } => vec![*target],
            Terminator::Branch {
                then_bb, else_bb, ..
            } => vec![*then_bb, *else_bb],
            Terminator::Switch { cases, default, .. } => {
                let mut out: Vec<u32> = cases.iter().map(|(_, bb)| *bb).collect();
                out.push(*default);
                out
            }
            Terminator::TailCall { entry } => vec![*entry],
            Terminator::Return { .. } | Terminator::Throw { .. } | Terminator::Unreachable => {
                Vec::new()
            }
        }
    }

    /// Rewrite successor ids through `map`.
    pub fn retarget(&mut self, map: impl Fn(u32) -> u32) {
        match self {
            Terminator::Goto { target } => *target = map(*target),
            Terminator::Branch {
                then_bb, else_bb, ..
            } => {
                *then_bb = map(*then_bb);
                *else_bb = map(*else_bb);
            }
            Terminator::Switch { cases, default, .. } => {
                for (_, bb) in cases.iter_mut() {
                    *bb = map(*bb);
                }
                *default = map(*default);
            }
            Terminator::TailCall { entry } => *entry = map(*entry),
            _ => {}
        }
    }

    /// Locals read by the terminator.
    pub fn operands(&self) -> Vec<u32> {
        match self {
            Terminator::Branch { cond, fused, .. } => {
                let mut out = vec![*cond];
                if let Some(fused) = fused {
                    out.push(fused.lhs);
                    out.push(fused.rhs);
                }
                out
            }
            Terminator::Return { value } => {
                if *value >= 0 {
                    vec![*value as u32]
                } else {
                    Vec::new()
                }
            }
            Terminator::Switch { key, .. } => vec![*key],
            Terminator::Throw { exception } => vec![*exception],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Goto { target } => write!(f, "goto bb{target}"),
            Terminator::Branch {
                cond,
                then_bb,
                else_bb,
                fused,
            } => {
                match fused {
                    Some(fc) => write!(
                        f,
                        "branch {}(%{}, %{}) bb{then_bb} bb{else_bb}",
                        fc.op, fc.lhs, fc.rhs
                    ),
                    None => write!(f, "branch %{cond} bb{then_bb} bb{else_bb}"),
                }
            }
            Terminator::Return { value } => {
                if *value >= 0 {
                    write!(f, "return %{value}")
                } else {
                    write!(f, "return")
                }
            }
            Terminator::Switch { key, cases, default } => {
                write!(f, "switch %{key} [")?;
                for (i, (value, bb)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value} -> bb{bb}")?;
                }
                write!(f, "] default bb{default}")
            }
            Terminator::Throw { exception } => write!(f, "throw %{exception}"),
            Terminator::Unreachable => write!(f, "unreachable"),
            Terminator::TailCall { entry } => write!(f, "tailcall bb{entry}"),
        }
    }
}

// ── Blocks, locals, functions ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: u32,
    pub instructions: Vec<Inst>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub index: u32,
    pub name: String,
    pub ty: MirType,
}

/// One exception-table row. `try_end` is exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct TryCatchEntry {
    pub try_start: u32,
    pub try_end: u32,
    pub handler: u32,
    /// Internal name of the caught class.
    pub exception_type: String,
    pub exception_local: u32,
}

#[derive(Debug, Clone)]
pub struct MirFunction {
    pub name: String,
    /// Owning class internal name; the synthetic module owner for
    /// top-level functions.
    pub owner: String,
    pub return_type: MirType,
    /// Parameter locals (they are also the first entries of `locals`).
    pub params: Vec<Local>,
    pub is_static: bool,
    pub blocks: Vec<BasicBlock>,
    pub locals: Vec<Local>,
    pub try_catch: Vec<TryCatchEntry>,
    /// Names of reified type parameters kept through lowering.
    pub type_params: Vec<String>,
    /// Entry block id; also the target of `TailCall`.
    pub body_start: u32,
    pub super_init_args: Option<Vec<u32>>,
    pub delegation_args: Option<Vec<u32>>,
    pub override_descriptor: Option<String>,
    frame_size: Cell<Option<u32>>,
}

impl MirFunction {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, return_type: MirType) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            return_type,
            params: Vec::new(),
            is_static: true,
            blocks: Vec::new(),
            locals: Vec::new(),
            try_catch: Vec::new(),
            type_params: Vec::new(),
            body_start: 0,
            super_init_args: None,
            delegation_args: None,
            override_descriptor: None,
            frame_size: Cell::new(None),
        }
    }

    pub fn block(&self, id: u32) -> &BasicBlock {
        &self.blocks[id as usize]
    }

    pub fn block_mut(&mut self, id: u32) -> &mut BasicBlock {
        &mut self.blocks[id as usize]
    }

    /// Maximum register index used anywhere in the function, plus one.
    /// Cached lazily; the optimizer invalidates it between passes.
    pub fn frame_size(&self) -> u32 {
        if let Some(size) = self.frame_size.get() {
            return size;
        }
        let mut max: i64 = -1;
        for block in &self.blocks {
            for inst in &block.instructions {
                if inst.dest >= 0 {
                    max = max.max(inst.dest as i64);
                }
                for operand in &inst.operands {
                    max = max.max(*operand as i64);
                }
            }
            for operand in block.terminator.operands() {
                max = max.max(operand as i64);
            }
        }
        for entry in &self.try_catch {
            max = max.max(entry.exception_local as i64);
        }
        let size = (max + 1) as u32;
        self.frame_size.set(Some(size));
        size
    }

    pub fn invalidate_frame_size(&self) {
        self.frame_size.set(None);
    }

    /// Allocate a fresh local.
    pub fn new_local(&mut self, name: impl Into<String>, ty: MirType) -> u32 {
        let index = self.locals.len() as u32;
        self.locals.push(Local {
            index,
            name: name.into(),
            ty,
        });
        self.invalidate_frame_size();
        index
    }

    /// Predecessor lists, indexed by block id.
    pub fn predecessors(&self) -> Vec<Vec<u32>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for block in &self.blocks {
            for succ in block.terminator.successors() {
                preds[succ as usize].push(block.id);
            }
        }
        preds
    }
}

impl fmt::Display for MirFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("%{}: {}", p.index, p.ty))
            .collect();
        writeln!(
            f,
            "fn {}::{}({}) -> {} {{",
            self.owner,
            self.name,
            params.join(", "),
            self.return_type
        )?;
        for block in &self.blocks {
            writeln!(f, "bb{}:", block.id)?;
            for inst in &block.instructions {
                writeln!(f, "    {inst}")?;
            }
            writeln!(f, "    {}", block.terminator)?;
        }
        for entry in &self.try_catch {
            writeln!(
                f,
                "  catch {} bb{}..bb{} -> bb{} (%{})",
                entry.exception_type,
                entry.try_start,
                entry.try_end,
                entry.handler,
                entry.exception_local
            )?;
        }
        write!(f, "}}")
    }
}

// ── Classes and modules ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirClassKind {
    Class,
    Interface,
    Enum,
    Object,
    /// Synthesized closure class (`$Lambda$N`).
    Lambda,
}

#[derive(Debug, Clone)]
pub struct MirField {
    pub name: String,
    pub ty: MirType,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub struct MirClass {
    pub name: String,
    pub kind: MirClassKind,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MirField>,
    pub methods: Vec<MirFunction>,
    pub annotations: Vec<String>,
}

impl MirClass {
    pub fn new(name: impl Into<String>, kind: MirClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
        }
    }
}

/// Extension-function record kept for tooling.
#[derive(Debug, Clone)]
pub struct ExtensionInfo {
    pub receiver: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MirModule {
    pub package: Option<String>,
    pub classes: Vec<MirClass>,
    pub functions: Vec<MirFunction>,
    pub extension_metadata: Vec<ExtensionInfo>,
    pub import_metadata: Vec<String>,
}

impl MirModule {
    pub fn new(package: Option<String>) -> Self {
        Self {
            package,
            classes: Vec::new(),
            functions: Vec::new(),
            extension_metadata: Vec::new(),
            import_metadata: Vec::new(),
        }
    }

    /// The synthetic owner class for top-level functions.
    pub fn owner_name(package: Option<&str>) -> String {
        match package {
            Some(pkg) => format!("{}/Module", pkg.replace('.', "/")),
            None => "Module".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::point(0)
    }

    #[test]
    fn descriptors() {
        assert_eq!(MirType::Int.descriptor(), "I");
        assert_eq!(MirType::Long.descriptor(), "J");
        assert_eq!(MirType::Boolean.descriptor(), "Z");
        assert_eq!(MirType::Void.descriptor(), "V");
        assert_eq!(
            MirType::object("java/lang/String").descriptor(),
            "Ljava/lang/String;"
        );
        assert_eq!(MirType::Array(Box::new(MirType::Int)).descriptor(), "[I");
    }

    #[test]
    fn field_descriptors_box_primitives() {
        assert_eq!(MirType::Int.field_descriptor(), "Ljava/lang/Integer;");
        assert_eq!(MirType::Double.field_descriptor(), "Ljava/lang/Double;");
        assert_eq!(
            MirType::object("demo/Point").field_descriptor(),
            "Ldemo/Point;"
        );
    }

    #[test]
    fn terminator_kinds_are_stable() {
        assert_eq!(Terminator::Goto { target: 0 }.kind(), 0);
        assert_eq!(
            Terminator::Branch {
                cond: 0,
                then_bb: 1,
                else_bb: 2,
                fused: None
            }
            .kind(),
            1
        );
        assert_eq!(Terminator::Return { value: -1 }.kind(), 2);
        assert_eq!(
            Terminator::Switch {
                key: 0,
                cases: vec![],
                default: 0
            }
            .kind(),
            3
        );
        assert_eq!(Terminator::Throw { exception: 0 }.kind(), 4);
        assert_eq!(Terminator::Unreachable.kind(), 5);
        assert_eq!(Terminator::TailCall { entry: 0 }.kind(), 6);
    }

    #[test]
    fn successors() {
        let branch = Terminator::Branch {
            cond: 0,
            then_bb: 1,
            else_bb: 2,
            fused: None,
        };
        assert_eq!(branch.successors(), vec![1, 2]);
        let switch = Terminator::Switch {
            key: 0,
            cases: vec![(1, 3), (2, 4)],
            default: 5,
        };
        assert_eq!(switch.successors(), vec![3, 4, 5]);
        assert!(Terminator::Return { value: -1 }.successors().is_empty());
    }

    #[test]
    fn frame_size_is_lazy_and_covers_exception_locals() {
        let mut f = MirFunction::new("t", "Module", MirType::Void);
        let a = f.new_local("a", MirType::Int);
        let b = f.new_local("b", MirType::Int);
        f.blocks.push(BasicBlock {
            id: 0,
            instructions: vec![Inst::new(
                Op::Binary,
                b as i32,
                vec![a, a],
                InstExtra::BinOp(MirBinOp::Add),
                span(),
            )],
            terminator: Terminator::Return { value: -1 },
        });
        f.try_catch.push(TryCatchEntry {
            try_start: 0,
            try_end: 1,
            handler: 0,
            exception_type: "java/lang/Exception".into(),
            exception_local: 9,
        });
        assert_eq!(f.frame_size(), 10);
        // Cached value survives repeated queries.
        assert_eq!(f.frame_size(), 10);
    }

    #[test]
    fn method_ref_display_uses_pipes() {
        let m = MethodRef {
            owner: "demo/Module".into(),
            name: "sum".into(),
            descriptor: "(II)I".into(),
        };
        assert_eq!(m.to_string(), "demo/Module|sum|(II)I");
    }

    #[test]
    fn const_keys_distinguish_tags() {
        assert_ne!(ConstValue::Int(1).key(), ConstValue::Long(1).key());
        assert_eq!(ConstValue::Int(7).key(), ConstValue::Int(7).key());
        assert_ne!(
            ConstValue::Float(1.0).key(),
            ConstValue::Double(1.0).key()
        );
    }

    #[test]
    fn module_owner_name() {
        assert_eq!(MirModule::owner_name(Some("demo.app")), "demo/app/Module");
        assert_eq!(MirModule::owner_name(None), "Module");
    }
}
