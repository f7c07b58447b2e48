//! HIR -> MIR lowering: flattening typed trees into basic-block CFGs.
//!
//! Every expression lowers to a run of three-address instructions ending in
//! a local that holds its value (or no local for Unit/Nothing). Conditions
//! and `when` cascades produce branch/join diamonds with a result local as
//! the merge. Loops build a header block with a branch terminator and an
//! explicit back edge; `break`/`continue` (labeled or not) resolve to
//! `Goto` against the matching loop context. `try`/`catch`/`finally`
//! registers one `TryCatchEntry` per handler and replicates `finally` code
//! on every exit path, plus a catch-all handler that rethrows. Closures
//! become `NewObject` + capture stores on their `$Lambda$N` class.

use rustc_hash::FxHashMap;

use opal_common::span::Span;
use opal_sema::{Type, TypeKind};

use crate::descriptor::{method_descriptor, object_descriptor};
use crate::hir::lower::{BUILTINS_OWNER, MODULE_OWNER};
use crate::hir::{HirClass, HirClassKind, HirExpr, HirExprKind, HirFunction, HirModule};

use super::{
    BasicBlock, ConstValue, ExtensionInfo, Inst, InstExtra, MethodRef, MirClass, MirClassKind,
    MirField, MirFunction, MirModule, MirType, Op, Terminator, TryCatchEntry,
};

pub fn lower(module: &HirModule) -> MirModule {
    let owner = MirModule::owner_name(module.package.as_deref());
    let ctx = TypeCtx {
        package: module.package.clone(),
        module_owner: owner.clone(),
        user_classes: module.classes.iter().map(|c| c.name.clone()).collect(),
    };

    let mut mir = MirModule::new(module.package.clone());
    mir.import_metadata = module.imports.clone();
    mir.extension_metadata = module
        .extensions
        .iter()
        .map(|(receiver, name)| ExtensionInfo {
            receiver: receiver.clone(),
            name: name.clone(),
        })
        .collect();

    for class in &module.classes {
        mir.classes.push(lower_class(class, &ctx));
    }

    for function in &module.functions {
        mir.functions
            .push(lower_function(function, &owner, None, &ctx));
    }

    // Top-level properties become fields on the module owner class, with a
    // synthesized initializer function.
    if !module.globals.is_empty() {
        let mut owner_class = MirClass::new(owner.clone(), MirClassKind::Object);
        for global in &module.globals {
            owner_class.fields.push(MirField {
                name: global.name.clone(),
                ty: ctx.mir_type(&global.ty),
                mutable: global.mutable,
            });
        }
        mir.classes.push(owner_class);

        let mut init = FunctionLowerer::new("$init", &owner, MirType::Void, None, &ctx);
        for global in &module.globals {
            if let Some(value) = &global.init {
                if let Some(local) = init.lower(value) {
                    init.emit(Inst::new(
                        Op::SetStatic,
                        -1,
                        vec![local],
                        InstExtra::Field {
                            owner: owner.clone(),
                            name: global.name.clone(),
                        },
                        value.span,
                    ));
                }
            }
        }
        mir.functions.push(init.finish(Vec::new()));
    }

    mir
}

// ── Type mapping ───────────────────────────────────────────────────────

struct TypeCtx {
    package: Option<String>,
    module_owner: String,
    user_classes: Vec<String>,
}

impl TypeCtx {
    /// Internal (slash-separated) name for a source-level class name.
    fn internal_name(&self, name: &str) -> String {
        match name {
            MODULE_OWNER => return self.module_owner.clone(),
            BUILTINS_OWNER => return "opal/rt/Builtins".to_string(),
            "Any" => return "java/lang/Object".to_string(),
            "String" => return "java/lang/String".to_string(),
            "Throwable" => return "java/lang/Throwable".to_string(),
            "Exception" => return "java/lang/Exception".to_string(),
            "RuntimeException" => return "java/lang/RuntimeException".to_string(),
            "NullPointerException" => return "java/lang/NullPointerException".to_string(),
            "IllegalArgumentException" => return "java/lang/IllegalArgumentException".to_string(),
            "IllegalStateException" => return "java/lang/IllegalStateException".to_string(),
            "IndexOutOfBoundsException" => {
                return "java/lang/IndexOutOfBoundsException".to_string()
            }
            "ClassCastException" => return "java/lang/ClassCastException".to_string(),
            "ArithmeticException" => return "java/lang/ArithmeticException".to_string(),
            "List" | "Set" | "Map" | "Pair" | "Triple" | "Result" | "Function" | "Iterator"
            | "Iterable" | "IntRange" | "LongRange" | "CharRange" | "Future" | "Closeable"
            | "Comparable" => return format!("opal/rt/{name}"),
            _ => {}
        }
        if name.starts_with("$Lambda$") || name.starts_with("$Anon$") {
            return name.to_string();
        }
        // Dotted names (imports, companions) map directly; companions use
        // `$` nesting.
        let flat = name.replace('.', "$");
        if self.user_classes.iter().any(|c| c == name) || name.contains('.') {
            match &self.package {
                Some(pkg) => format!("{}/{}", pkg.replace('.', "/"), flat),
                None => flat,
            }
        } else {
            flat
        }
    }

    fn mir_type(&self, ty: &Type) -> MirType {
        use opal_sema::Primitive as P;
        if ty.nullable {
            // Nullable values are reference-typed (boxed primitives).
            return match &ty.kind {
                TypeKind::Primitive(P::Int) => MirType::object("java/lang/Integer"),
                TypeKind::Primitive(P::Long) => MirType::object("java/lang/Long"),
                TypeKind::Primitive(P::Float) => MirType::object("java/lang/Float"),
                TypeKind::Primitive(P::Double) => MirType::object("java/lang/Double"),
                TypeKind::Primitive(P::Boolean) => MirType::object("java/lang/Boolean"),
                TypeKind::Primitive(P::Char) => MirType::object("java/lang/Character"),
                _ => self.mir_type(&ty.non_null()),
            };
        }
        match &ty.kind {
            TypeKind::Primitive(P::Int) => MirType::Int,
            TypeKind::Primitive(P::Long) => MirType::Long,
            TypeKind::Primitive(P::Float) => MirType::Float,
            TypeKind::Primitive(P::Double) => MirType::Double,
            TypeKind::Primitive(P::Boolean) => MirType::Boolean,
            TypeKind::Primitive(P::Char) => MirType::Char,
            TypeKind::Unit => MirType::Void,
            TypeKind::Class { name, .. } => MirType::object(self.internal_name(name)),
            TypeKind::Function { .. } => MirType::object("opal/rt/Function"),
            TypeKind::Param { .. } | TypeKind::Nothing | TypeKind::Error => {
                MirType::object("java/lang/Object")
            }
        }
    }
}

// ── Classes ────────────────────────────────────────────────────────────

fn lower_class(class: &HirClass, ctx: &TypeCtx) -> MirClass {
    let internal = ctx.internal_name(&class.name);
    let kind = match class.kind {
        HirClassKind::Class => MirClassKind::Class,
        HirClassKind::Interface => MirClassKind::Interface,
        HirClassKind::Enum => MirClassKind::Enum,
        HirClassKind::Object => MirClassKind::Object,
        HirClassKind::Lambda => MirClassKind::Lambda,
    };
    let mut mir = MirClass::new(internal.clone(), kind);
    mir.super_class = class.super_class.as_ref().map(|s| ctx.internal_name(s));
    mir.interfaces = class
        .interfaces
        .iter()
        .map(|i| ctx.internal_name(i))
        .collect();
    for field in &class.fields {
        mir.fields.push(MirField {
            name: field.name.clone(),
            ty: ctx.mir_type(&field.ty),
            mutable: field.mutable,
        });
    }
    for method in &class.methods {
        mir.methods
            .push(lower_function(method, &internal, Some(&internal), ctx));
    }

    // Enum entries initialize in a synthesized class initializer.
    if !class.enum_entries.is_empty() {
        let mut clinit = FunctionLowerer::new("<clinit>", &internal, MirType::Void, Some(&internal), ctx);
        for entry in &class.enum_entries {
            let object = clinit.f.new_local("$entry", MirType::object(internal.clone()));
            clinit.emit(Inst::new(
                Op::NewObject,
                object as i32,
                Vec::new(),
                InstExtra::TypeName(internal.clone()),
                class.span,
            ));
            let mut operands = vec![object];
            let mut arg_types = Vec::new();
            for arg in &entry.args {
                if let Some(local) = clinit.lower(arg) {
                    arg_types.push(clinit.f.locals[local as usize].ty.clone());
                    operands.push(local);
                }
            }
            clinit.emit(Inst::new(
                Op::InvokeSpecial,
                -1,
                operands,
                InstExtra::Method(MethodRef {
                    owner: internal.clone(),
                    name: "<init>".to_string(),
                    descriptor: method_descriptor(&arg_types, &MirType::Void),
                }),
                class.span,
            ));
            clinit.emit(Inst::new(
                Op::SetStatic,
                -1,
                vec![object],
                InstExtra::Field {
                    owner: internal.clone(),
                    name: entry.name.clone(),
                },
                class.span,
            ));
        }
        mir.methods.push(clinit.finish(Vec::new()));
    }
    mir
}

fn lower_function(
    function: &HirFunction,
    owner: &str,
    self_class: Option<&str>,
    ctx: &TypeCtx,
) -> MirFunction {
    let ret = ctx.mir_type(&function.ret);
    let mut lowerer = FunctionLowerer::new(&function.name, owner, ret, self_class, ctx);
    lowerer.f.is_static = function.is_static;
    lowerer.f.type_params = function.reified.clone();

    // Parameter locals first: `this` for instance methods, then the
    // declared parameters.
    let mut params = Vec::new();
    if !function.is_static {
        let this_ty = MirType::object(owner.to_string());
        let idx = lowerer.f.new_local("this", this_ty);
        lowerer.bind("this", idx);
        params.push(lowerer.f.locals[idx as usize].clone());
    }
    for param in &function.params {
        let idx = lowerer.f.new_local(param.name.clone(), ctx.mir_type(&param.ty));
        lowerer.bind(&param.name, idx);
        params.push(lowerer.f.locals[idx as usize].clone());
    }

    if let Some(body) = &function.body {
        let value = lowerer.lower(body);
        if !lowerer.terminated() {
            let ret_value = match (&lowerer.ret, value) {
                (MirType::Void, _) => -1,
                (_, Some(v)) => v as i32,
                (_, None) => -1,
            };
            lowerer.set_term(Terminator::Return { value: ret_value });
        }
    } else {
        lowerer.set_term(Terminator::Return { value: -1 });
    }

    lowerer.finish(params)
}

// ── Function lowering ──────────────────────────────────────────────────

struct BlockBuilder {
    instructions: Vec<Inst>,
    terminator: Option<Terminator>,
}

struct LoopCtx {
    label: Option<String>,
    break_bb: u32,
    continue_bb: u32,
    finally_depth: usize,
}

struct FunctionLowerer<'c> {
    f: MirFunction,
    blocks: Vec<BlockBuilder>,
    current: u32,
    scopes: Vec<FxHashMap<String, u32>>,
    loops: Vec<LoopCtx>,
    /// Active finally bodies, outermost first; replicated before returns
    /// and loop exits that leave their try.
    finallies: Vec<HirExpr>,
    ret: MirType,
    self_class: Option<String>,
    ctx: &'c TypeCtx,
}

impl<'c> FunctionLowerer<'c> {
    fn new(
        name: &str,
        owner: &str,
        ret: MirType,
        self_class: Option<&str>,
        ctx: &'c TypeCtx,
    ) -> Self {
        let f = MirFunction::new(name, owner, ret.clone());
        Self {
            f,
            blocks: vec![BlockBuilder {
                instructions: Vec::new(),
                terminator: None,
            }],
            current: 0,
            scopes: vec![FxHashMap::default()],
            loops: Vec::new(),
            finallies: Vec::new(),
            ret,
            self_class: self_class.map(str::to_string),
            ctx,
        }
    }

    fn finish(mut self, params: Vec<super::Local>) -> MirFunction {
        if self.blocks[self.current as usize].terminator.is_none() {
            self.blocks[self.current as usize].terminator = Some(Terminator::Return { value: -1 });
        }
        self.f.params = params;
        self.f.blocks = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(id, builder)| BasicBlock {
                id: id as u32,
                instructions: builder.instructions,
                terminator: builder.terminator.unwrap_or(Terminator::Unreachable),
            })
            .collect();
        self.f.body_start = 0;
        self.f
    }

    // ── Block plumbing ─────────────────────────────────────────────────

    fn new_block(&mut self) -> u32 {
        let id = self.blocks.len() as u32;
        self.blocks.push(BlockBuilder {
            instructions: Vec::new(),
            terminator: None,
        });
        id
    }

    fn emit(&mut self, inst: Inst) {
        self.blocks[self.current as usize].instructions.push(inst);
    }

    fn terminated(&self) -> bool {
        self.blocks[self.current as usize].terminator.is_some()
    }

    fn set_term(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current as usize];
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    fn switch_to(&mut self, block: u32) {
        self.current = block;
    }

    fn bind(&mut self, name: &str, local: u32) {
        self.scopes
            .last_mut()
            .expect("scope stack")
            .insert(name.to_string(), local);
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn temp(&mut self, hint: &str, ty: MirType) -> u32 {
        self.f.new_local(format!("${hint}"), ty)
    }

    // ── Expression lowering ────────────────────────────────────────────

    /// Lower an expression; the result is the local holding its value, or
    /// `None` for Unit/Nothing-valued expressions.
    fn lower(&mut self, e: &HirExpr) -> Option<u32> {
        let span = e.span;
        match &e.kind {
            HirExprKind::Unit => None,
            HirExprKind::ConstInt(v) => {
                Some(self.const_inst(Op::ConstInt, ConstValue::Int(*v), MirType::Int, span))
            }
            HirExprKind::ConstLong(v) => {
                Some(self.const_inst(Op::ConstLong, ConstValue::Long(*v), MirType::Long, span))
            }
            HirExprKind::ConstFloat(v) => {
                Some(self.const_inst(Op::ConstFloat, ConstValue::Float(*v), MirType::Float, span))
            }
            HirExprKind::ConstDouble(v) => Some(self.const_inst(
                Op::ConstDouble,
                ConstValue::Double(*v),
                MirType::Double,
                span,
            )),
            HirExprKind::ConstBool(v) => {
                Some(self.const_inst(Op::ConstBool, ConstValue::Bool(*v), MirType::Boolean, span))
            }
            HirExprKind::ConstChar(v) => {
                Some(self.const_inst(Op::ConstChar, ConstValue::Char(*v), MirType::Char, span))
            }
            HirExprKind::ConstStr(v) => Some(self.const_inst(
                Op::ConstStr,
                ConstValue::Str(v.clone()),
                MirType::object("java/lang/String"),
                span,
            )),
            HirExprKind::ConstNull => Some(self.const_inst(
                Op::ConstNull,
                ConstValue::Null,
                MirType::object("java/lang/Object"),
                span,
            )),
            HirExprKind::ConstClass(name) => {
                let internal = self.ctx.internal_name(name);
                Some(self.const_inst(
                    Op::ConstClass,
                    ConstValue::Class(internal),
                    MirType::object("java/lang/Class"),
                    span,
                ))
            }

            HirExprKind::Local(name) => self.lookup(name).or_else(|| {
                // Unknown local: error recovery produced a dangling name.
                let ty = self.ctx.mir_type(&e.ty);
                let idx = self.f.new_local(name.clone(), ty);
                Some(idx)
            }),
            HirExprKind::Global(name) => {
                let ty = self.ctx.mir_type(&e.ty);
                let dest = self.temp("g", ty);
                self.emit(Inst::new(
                    Op::GetStatic,
                    dest as i32,
                    Vec::new(),
                    InstExtra::Field {
                        owner: self.ctx.module_owner.clone(),
                        name: name.clone(),
                    },
                    span,
                ));
                Some(dest)
            }
            HirExprKind::Let {
                name,
                value,
                ..
            } => {
                let ty = value
                    .as_ref()
                    .map(|v| self.ctx.mir_type(&v.ty))
                    .unwrap_or(MirType::object("java/lang/Object"));
                let local = self.f.new_local(name.clone(), ty);
                self.bind(name, local);
                if let Some(value) = value {
                    if let Some(src) = self.lower(value) {
                        self.emit(Inst::new(
                            Op::Move,
                            local as i32,
                            vec![src],
                            InstExtra::None,
                            span,
                        ));
                    }
                }
                None
            }
            HirExprKind::AssignLocal { name, value } => {
                let src = self.lower(value);
                if let (Some(local), Some(src)) = (self.lookup(name), src) {
                    self.emit(Inst::new(
                        Op::Move,
                        local as i32,
                        vec![src],
                        InstExtra::None,
                        span,
                    ));
                }
                None
            }
            HirExprKind::AssignGlobal { name, value } => {
                if let Some(src) = self.lower(value) {
                    self.emit(Inst::new(
                        Op::SetStatic,
                        -1,
                        vec![src],
                        InstExtra::Field {
                            owner: self.ctx.module_owner.clone(),
                            name: name.clone(),
                        },
                        span,
                    ));
                }
                None
            }
            HirExprKind::GetField {
                target,
                owner,
                name,
            } => {
                let target_local = self.lower_value(target, span);
                let ty = self.ctx.mir_type(&e.ty);
                let dest = self.temp("fld", ty);
                self.emit(Inst::new(
                    Op::GetField,
                    dest as i32,
                    vec![target_local],
                    InstExtra::Field {
                        owner: self.field_owner(owner),
                        name: name.clone(),
                    },
                    span,
                ));
                Some(dest)
            }
            HirExprKind::SetField {
                target,
                owner,
                name,
                value,
            } => {
                let target_local = self.lower_value(target, span);
                let value_local = self.lower_value(value, span);
                self.emit(Inst::new(
                    Op::SetField,
                    -1,
                    vec![target_local, value_local],
                    InstExtra::Field {
                        owner: self.field_owner(owner),
                        name: name.clone(),
                    },
                    span,
                ));
                None
            }
            HirExprKind::GetStatic { owner, name } => {
                let ty = self.ctx.mir_type(&e.ty);
                let dest = self.temp("st", ty);
                self.emit(Inst::new(
                    Op::GetStatic,
                    dest as i32,
                    Vec::new(),
                    InstExtra::Field {
                        owner: self.ctx.internal_name(owner),
                        name: name.clone(),
                    },
                    span,
                ));
                Some(dest)
            }

            HirExprKind::Binary { op, lhs, rhs } => {
                let l = self.lower_value(lhs, span);
                let r = self.lower_value(rhs, span);
                let ty = self.ctx.mir_type(&e.ty);
                let dest = self.temp("t", ty);
                self.emit(Inst::new(
                    Op::Binary,
                    dest as i32,
                    vec![l, r],
                    InstExtra::BinOp(*op),
                    span,
                ));
                Some(dest)
            }
            HirExprKind::Unary { op, operand } => {
                let o = self.lower_value(operand, span);
                let ty = self.ctx.mir_type(&e.ty);
                let dest = self.temp("t", ty);
                self.emit(Inst::new(
                    Op::Unary,
                    dest as i32,
                    vec![o],
                    InstExtra::UnOp(*op),
                    span,
                ));
                Some(dest)
            }

            HirExprKind::If {
                cond,
                then_e,
                else_e,
            } => self.lower_if(cond, then_e, else_e.as_deref(), &e.ty, span),
            HirExprKind::While { label, cond, body } => {
                self.lower_while(label.clone(), cond, body);
                None
            }
            HirExprKind::DoWhile { label, body, cond } => {
                self.lower_do_while(label.clone(), body, cond);
                None
            }
            HirExprKind::For {
                label,
                cond,
                update,
                body,
            } => {
                self.lower_for(label.clone(), cond, update, body);
                None
            }
            HirExprKind::Break { label } => {
                self.lower_loop_exit(label.as_deref(), true, span);
                None
            }
            HirExprKind::Continue { label } => {
                self.lower_loop_exit(label.as_deref(), false, span);
                None
            }
            HirExprKind::Return { value } => {
                let result = value.as_ref().and_then(|v| self.lower(v));
                self.replicate_finallies(0);
                self.set_term(Terminator::Return {
                    value: result.map(|v| v as i32).unwrap_or(-1),
                });
                let dead = self.new_block();
                self.switch_to(dead);
                None
            }
            HirExprKind::Throw { value } => {
                let exception = self.lower_value(value, span);
                self.set_term(Terminator::Throw { exception });
                let dead = self.new_block();
                self.switch_to(dead);
                None
            }
            HirExprKind::Try {
                body,
                catches,
                finally,
            } => self.lower_try(body, catches, finally.as_deref(), &e.ty, span),
            HirExprKind::Block(exprs) => {
                self.scopes.push(FxHashMap::default());
                let mut value = None;
                for expr in exprs {
                    value = self.lower(expr);
                }
                self.scopes.pop();
                value
            }

            HirExprKind::New { class, args } => {
                let internal = self.ctx.internal_name(class);
                let dest = self.temp("new", MirType::object(internal.clone()));
                self.emit(Inst::new(
                    Op::NewObject,
                    dest as i32,
                    Vec::new(),
                    InstExtra::TypeName(internal.clone()),
                    span,
                ));
                let mut operands = vec![dest];
                let mut arg_types = Vec::new();
                for arg in args {
                    let local = self.lower_value(arg, span);
                    arg_types.push(self.f.locals[local as usize].ty.clone());
                    operands.push(local);
                }
                self.emit(Inst::new(
                    Op::InvokeSpecial,
                    -1,
                    operands,
                    InstExtra::Method(MethodRef {
                        owner: internal,
                        name: "<init>".to_string(),
                        descriptor: method_descriptor(&arg_types, &MirType::Void),
                    }),
                    span,
                ));
                Some(dest)
            }
            HirExprKind::NewClosure { class, captures } => {
                let dest = self.temp("closure", MirType::object(class.clone()));
                self.emit(Inst::new(
                    Op::NewObject,
                    dest as i32,
                    Vec::new(),
                    InstExtra::TypeName(class.clone()),
                    span,
                ));
                for (name, capture) in captures {
                    let value = self.lower_value(capture, span);
                    self.emit(Inst::new(
                        Op::SetField,
                        -1,
                        vec![dest, value],
                        InstExtra::Field {
                            owner: class.clone(),
                            name: name.clone(),
                        },
                        span,
                    ));
                }
                Some(dest)
            }

            HirExprKind::CallStatic {
                owner,
                name,
                args,
                special,
            } => {
                let mut operands = Vec::new();
                let mut arg_types = Vec::new();
                for arg in args {
                    let local = self.lower_value(arg, span);
                    arg_types.push(self.f.locals[local as usize].ty.clone());
                    operands.push(local);
                }
                let ret = self.ctx.mir_type(&e.ty);
                let dest = if ret.is_void() {
                    -1
                } else {
                    self.temp("call", ret.clone()) as i32
                };
                let mut inst = Inst::new(
                    Op::InvokeStatic,
                    dest,
                    operands,
                    InstExtra::Method(MethodRef {
                        owner: self.ctx.internal_name(owner),
                        name: name.clone(),
                        descriptor: method_descriptor(&arg_types, &ret),
                    }),
                    span,
                );
                inst.special_kind = *special;
                self.emit(inst);
                (dest >= 0).then_some(dest as u32)
            }
            HirExprKind::CallVirtual {
                target,
                owner,
                name,
                args,
            } => self.lower_instance_call(Op::InvokeVirtual, target, owner, name, args, &e.ty, span),
            HirExprKind::CallInterface {
                target,
                owner,
                name,
                args,
            } => {
                self.lower_instance_call(Op::InvokeInterface, target, owner, name, args, &e.ty, span)
            }
            HirExprKind::CallSpecial {
                target,
                owner,
                name,
                args,
            } => self.lower_instance_call(Op::InvokeSpecial, target, owner, name, args, &e.ty, span),
            HirExprKind::CallValue { callee, args } => {
                let callee_local = self.lower_value(callee, span);
                let mut operands = vec![callee_local];
                for arg in args {
                    let local = self.lower_value(arg, span);
                    operands.push(local);
                }
                let ret = self.ctx.mir_type(&e.ty);
                let dest = if ret.is_void() {
                    -1
                } else {
                    self.temp("call", ret) as i32
                };
                self.emit(Inst::new(
                    Op::InvokeInterface,
                    dest,
                    operands,
                    InstExtra::Method(MethodRef {
                        owner: "opal/rt/Function".to_string(),
                        name: "invoke".to_string(),
                        descriptor: object_descriptor(args.len()),
                    }),
                    span,
                ));
                (dest >= 0).then_some(dest as u32)
            }

            HirExprKind::IndexGet { target, index } => {
                let t = self.lower_value(target, span);
                let i = self.lower_value(index, span);
                let ty = self.ctx.mir_type(&e.ty);
                let dest = self.temp("idx", ty);
                self.emit(Inst::new(
                    Op::IndexGet,
                    dest as i32,
                    vec![t, i],
                    InstExtra::None,
                    span,
                ));
                Some(dest)
            }
            HirExprKind::IndexSet {
                target,
                index,
                value,
            } => {
                let t = self.lower_value(target, span);
                let i = self.lower_value(index, span);
                let v = self.lower_value(value, span);
                self.emit(Inst::new(
                    Op::IndexSet,
                    -1,
                    vec![t, i, v],
                    InstExtra::None,
                    span,
                ));
                None
            }

            HirExprKind::TypeCheck { operand, class } => {
                let o = self.lower_value(operand, span);
                let dest = self.temp("is", MirType::Boolean);
                self.emit(Inst::new(
                    Op::TypeCheck,
                    dest as i32,
                    vec![o],
                    InstExtra::TypeName(self.ctx.internal_name(class)),
                    span,
                ));
                Some(dest)
            }
            HirExprKind::TypeCast {
                operand,
                class,
                safe,
            } => {
                let o = self.lower_value(operand, span);
                let internal = self.ctx.internal_name(class);
                let ty = self.ctx.mir_type(&e.ty);
                if !*safe {
                    let dest = self.temp("cast", ty);
                    self.emit(Inst::new(
                        Op::TypeCast,
                        dest as i32,
                        vec![o],
                        InstExtra::TypeName(internal),
                        span,
                    ));
                    return Some(dest);
                }
                // as?  ==>  if (x is T) x as T else null
                let check = self.temp("is", MirType::Boolean);
                self.emit(Inst::new(
                    Op::TypeCheck,
                    check as i32,
                    vec![o],
                    InstExtra::TypeName(internal.clone()),
                    span,
                ));
                let result = self.temp("cast", ty);
                let then_bb = self.new_block();
                let else_bb = self.new_block();
                let join = self.new_block();
                self.set_term(Terminator::Branch {
                    cond: check,
                    then_bb,
                    else_bb,
                    fused: None,
                });
                self.switch_to(then_bb);
                self.emit(Inst::new(
                    Op::TypeCast,
                    result as i32,
                    vec![o],
                    InstExtra::TypeName(internal),
                    span,
                ));
                self.set_term(Terminator::Goto { target: join });
                self.switch_to(else_bb);
                self.emit(Inst::new(
                    Op::ConstNull,
                    result as i32,
                    Vec::new(),
                    InstExtra::Const(ConstValue::Null),
                    span,
                ));
                self.set_term(Terminator::Goto { target: join });
                self.switch_to(join);
                Some(result)
            }

            HirExprKind::Error => None,
        }
    }

    /// Lower and force a value local (placeholder null for valueless
    /// operands, which only occur on error-recovery paths).
    fn lower_value(&mut self, e: &HirExpr, span: Span) -> u32 {
        match self.lower(e) {
            Some(local) => local,
            None => self.const_inst(
                Op::ConstNull,
                ConstValue::Null,
                MirType::object("java/lang/Object"),
                span,
            ),
        }
    }

    fn const_inst(&mut self, op: Op, value: ConstValue, ty: MirType, span: Span) -> u32 {
        let dest = self.temp("c", ty);
        self.emit(Inst::new(op, dest as i32, Vec::new(), InstExtra::Const(value), span));
        dest
    }

    fn field_owner(&self, owner: &str) -> String {
        if owner.is_empty() {
            self.self_class
                .clone()
                .unwrap_or_else(|| "java/lang/Object".to_string())
        } else {
            self.ctx.internal_name(owner)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_instance_call(
        &mut self,
        op: Op,
        target: &HirExpr,
        owner: &str,
        name: &str,
        args: &[HirExpr],
        ret_ty: &Type,
        span: Span,
    ) -> Option<u32> {
        let target_local = self.lower_value(target, span);
        let mut operands = vec![target_local];
        let mut arg_types = Vec::new();
        for arg in args {
            let local = self.lower_value(arg, span);
            arg_types.push(self.f.locals[local as usize].ty.clone());
            operands.push(local);
        }
        let ret = self.ctx.mir_type(ret_ty);
        let dest = if ret.is_void() {
            -1
        } else {
            self.temp("call", ret.clone()) as i32
        };
        self.emit(Inst::new(
            op,
            dest,
            operands,
            InstExtra::Method(MethodRef {
                owner: self.ctx.internal_name(owner),
                name: name.to_string(),
                descriptor: method_descriptor(&arg_types, &ret),
            }),
            span,
        ));
        (dest >= 0).then_some(dest as u32)
    }

    // ── Control flow ───────────────────────────────────────────────────

    fn lower_if(
        &mut self,
        cond: &HirExpr,
        then_e: &HirExpr,
        else_e: Option<&HirExpr>,
        ty: &Type,
        span: Span,
    ) -> Option<u32> {
        let cond_local = self.lower_value(cond, span);
        let produces_value = !ty.is_unit() && !ty.is_nothing() && !ty.is_error();
        let result = produces_value.then(|| {
            let mir_ty = self.ctx.mir_type(ty);
            self.temp("if", mir_ty)
        });

        let then_bb = self.new_block();
        let else_bb = self.new_block();
        let join = self.new_block();
        self.set_term(Terminator::Branch {
            cond: cond_local,
            then_bb,
            else_bb,
            fused: None,
        });

        self.switch_to(then_bb);
        let then_value = self.lower(then_e);
        if !self.terminated() {
            if let (Some(result), Some(value)) = (result, then_value) {
                self.emit(Inst::new(
                    Op::Move,
                    result as i32,
                    vec![value],
                    InstExtra::None,
                    span,
                ));
            }
            self.set_term(Terminator::Goto { target: join });
        }

        self.switch_to(else_bb);
        match else_e {
            Some(else_e) => {
                let else_value = self.lower(else_e);
                if !self.terminated() {
                    if let (Some(result), Some(value)) = (result, else_value) {
                        self.emit(Inst::new(
                            Op::Move,
                            result as i32,
                            vec![value],
                            InstExtra::None,
                            span,
                        ));
                    }
                    self.set_term(Terminator::Goto { target: join });
                }
            }
            None => {
                self.set_term(Terminator::Goto { target: join });
            }
        }

        self.switch_to(join);
        result
    }

    fn lower_while(&mut self, label: Option<String>, cond: &HirExpr, body: &HirExpr) {
        let header = self.new_block();
        let body_bb = self.new_block();
        let exit = self.new_block();

        self.set_term(Terminator::Goto { target: header });
        self.switch_to(header);
        let cond_local = self.lower_value(cond, cond.span);
        self.set_term(Terminator::Branch {
            cond: cond_local,
            then_bb: body_bb,
            else_bb: exit,
            fused: None,
        });

        self.loops.push(LoopCtx {
            label,
            break_bb: exit,
            continue_bb: header,
            finally_depth: self.finallies.len(),
        });
        self.switch_to(body_bb);
        self.lower(body);
        if !self.terminated() {
            self.set_term(Terminator::Goto { target: header });
        }
        self.loops.pop();
        self.switch_to(exit);
    }

    fn lower_do_while(&mut self, label: Option<String>, body: &HirExpr, cond: &HirExpr) {
        let body_bb = self.new_block();
        let cond_bb = self.new_block();
        let exit = self.new_block();

        self.set_term(Terminator::Goto { target: body_bb });
        self.loops.push(LoopCtx {
            label,
            break_bb: exit,
            continue_bb: cond_bb,
            finally_depth: self.finallies.len(),
        });
        self.switch_to(body_bb);
        self.lower(body);
        if !self.terminated() {
            self.set_term(Terminator::Goto { target: cond_bb });
        }
        self.loops.pop();

        self.switch_to(cond_bb);
        let cond_local = self.lower_value(cond, cond.span);
        self.set_term(Terminator::Branch {
            cond: cond_local,
            then_bb: body_bb,
            else_bb: exit,
            fused: None,
        });
        self.switch_to(exit);
    }

    fn lower_for(
        &mut self,
        label: Option<String>,
        cond: &HirExpr,
        update: &HirExpr,
        body: &HirExpr,
    ) {
        let header = self.new_block();
        let body_bb = self.new_block();
        let update_bb = self.new_block();
        let exit = self.new_block();

        self.set_term(Terminator::Goto { target: header });
        self.switch_to(header);
        let cond_local = self.lower_value(cond, cond.span);
        self.set_term(Terminator::Branch {
            cond: cond_local,
            then_bb: body_bb,
            else_bb: exit,
            fused: None,
        });

        self.loops.push(LoopCtx {
            label,
            break_bb: exit,
            continue_bb: update_bb,
            finally_depth: self.finallies.len(),
        });
        self.switch_to(body_bb);
        self.lower(body);
        if !self.terminated() {
            self.set_term(Terminator::Goto { target: update_bb });
        }
        self.loops.pop();

        self.switch_to(update_bb);
        self.lower(update);
        self.set_term(Terminator::Goto { target: header });
        self.switch_to(exit);
    }

    fn lower_loop_exit(&mut self, label: Option<&str>, is_break: bool, _span: Span) {
        let ctx_idx = match label {
            Some(label) => self
                .loops
                .iter()
                .rposition(|l| l.label.as_deref() == Some(label)),
            None => self.loops.len().checked_sub(1),
        };
        let Some(ctx_idx) = ctx_idx else {
            self.set_term(Terminator::Unreachable);
            let dead = self.new_block();
            self.switch_to(dead);
            return;
        };
        let finally_depth = self.loops[ctx_idx].finally_depth;
        let target = if is_break {
            self.loops[ctx_idx].break_bb
        } else {
            self.loops[ctx_idx].continue_bb
        };
        self.replicate_finallies(finally_depth);
        self.set_term(Terminator::Goto { target });
        let dead = self.new_block();
        self.switch_to(dead);
    }

    /// Replicate active finally bodies (innermost first) down to `depth`.
    fn replicate_finallies(&mut self, depth: usize) {
        let pending: Vec<HirExpr> = self.finallies[depth..].iter().rev().cloned().collect();
        // Replication must not re-trigger itself.
        let saved = std::mem::take(&mut self.finallies);
        for finally in &pending {
            self.lower(finally);
        }
        self.finallies = saved;
    }

    fn lower_try(
        &mut self,
        body: &HirExpr,
        catches: &[crate::hir::HirCatch],
        finally: Option<&HirExpr>,
        ty: &Type,
        span: Span,
    ) -> Option<u32> {
        let produces_value = !ty.is_unit() && !ty.is_nothing() && !ty.is_error();
        let result = produces_value.then(|| {
            let mir_ty = self.ctx.mir_type(ty);
            self.temp("try", mir_ty)
        });

        let try_start = self.new_block();
        self.set_term(Terminator::Goto { target: try_start });
        self.switch_to(try_start);

        if let Some(finally) = finally {
            self.finallies.push(finally.clone());
        }

        let body_value = self.lower(body);
        let after = self.new_block(); // also marks the end of the try region
        let try_end = after;
        if !self.terminated() {
            if let (Some(result), Some(value)) = (result, body_value) {
                self.emit(Inst::new(
                    Op::Move,
                    result as i32,
                    vec![value],
                    InstExtra::None,
                    span,
                ));
            }
            // Normal exit runs the finally once.
            if finally.is_some() {
                self.replicate_finallies(self.finallies.len() - 1);
            }
            self.set_term(Terminator::Goto { target: after });
        }
        if finally.is_some() {
            self.finallies.pop();
        }

        for catch in catches {
            let handler = self.new_block();
            let exception_ty = self.ctx.mir_type(&catch.ty);
            let exception_local = self.f.new_local(catch.binding.clone(), exception_ty);
            self.f.try_catch.push(TryCatchEntry {
                try_start,
                try_end,
                handler,
                exception_type: self.ctx.internal_name(&catch.class),
                exception_local,
            });
            self.switch_to(handler);
            self.scopes.push(FxHashMap::default());
            self.bind(&catch.binding, exception_local);
            // A return out of the handler must still run this finally.
            if let Some(finally) = finally {
                self.finallies.push(finally.clone());
            }
            let catch_value = self.lower(&catch.body);
            if !self.terminated() {
                if let (Some(result), Some(value)) = (result, catch_value) {
                    self.emit(Inst::new(
                        Op::Move,
                        result as i32,
                        vec![value],
                        InstExtra::None,
                        span,
                    ));
                }
                if finally.is_some() {
                    self.replicate_finallies(self.finallies.len() - 1);
                }
                self.set_term(Terminator::Goto { target: after });
            }
            if finally.is_some() {
                self.finallies.pop();
            }
            self.scopes.pop();
        }

        // Catch-all handler that runs the finally and rethrows.
        if let Some(finally) = finally {
            let handler = self.new_block();
            let exception_local = self
                .f
                .new_local("$caught", MirType::object("java/lang/Throwable"));
            self.f.try_catch.push(TryCatchEntry {
                try_start,
                try_end,
                handler,
                exception_type: "java/lang/Throwable".to_string(),
                exception_local,
            });
            self.switch_to(handler);
            let saved = std::mem::take(&mut self.finallies);
            self.lower(finally);
            self.finallies = saved;
            self.set_term(Terminator::Throw {
                exception: exception_local,
            });
        }

        self.switch_to(after);
        result
    }
}
