//! AST -> HIR lowering: desugaring with types preserved.
//!
//! Every surface construct from the table below becomes core HIR:
//!
//! - `a?.m(x)` / `a?[i]` / `a ?: b` / `a!!` bind their receiver once to a
//!   temporary and branch on a null check.
//! - `expr?` returns the error variant from the enclosing function.
//! - `obj?.{ block }` rebinds `this` to the receiver inside the block.
//! - string interpolation becomes a `+` concat chain over `toString()`d
//!   parts.
//! - `when` becomes a condition cascade; ranges become counted loops or
//!   the iterator protocol; `x |> f` becomes `f(x)`; destructuring becomes
//!   positional component reads; omitted arguments are filled from the
//!   callee's default expressions; extension functions become statics with
//!   a leading receiver parameter.
//!
//! Lambdas are lifted to `$Lambda$N` classes (the counter lives on the
//! pipeline instance so REPL reuse never collides), with captured free
//! variables stored as fields.

use opal_common::span::Span;
use opal_parser::ast::{self, *};
use opal_sema::analyze::map_args_to_params;
use opal_sema::info::{Analysis, ClassKind, FunctionSig, Resolution};
use opal_sema::{Type, TypeKind};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::mir::{MirBinOp, MirUnOp, SPECIAL_ENV_ACCESS, SPECIAL_NONE, SPECIAL_SCOPE_CALL};

use super::{
    HirCatch, HirClass, HirClassKind, HirEnumEntry, HirExpr, HirExprKind, HirField, HirFunction,
    HirGlobal, HirModule, HirParam,
};

/// Owner marker for top-level functions; replaced by the synthetic module
/// owner during MIR lowering.
pub const MODULE_OWNER: &str = "$module";
/// Owner for builtin runtime entry points.
pub const BUILTINS_OWNER: &str = "$builtins";

pub fn lower(program: &Program, analysis: &Analysis, lambda_counter: &mut u32) -> HirModule {
    let mut fun_index: FxHashMap<NodeId, FunDecl> = FxHashMap::default();
    index_functions(&program.decls, &mut fun_index);

    let mut lowerer = Lowerer {
        analysis,
        fun_index,
        lambda_counter,
        lifted: Vec::new(),
        lifted_fns: Vec::new(),
        tmp: 0,
        capture_stack: Vec::new(),
        enclosing_ret: Vec::new(),
    };

    let mut module = HirModule {
        package: program.package.as_ref().map(|p| p.name.dotted()),
        classes: Vec::new(),
        functions: Vec::new(),
        globals: Vec::new(),
        imports: program.imports.iter().map(|i| i.path.dotted()).collect(),
        extensions: Vec::new(),
    };

    for decl in &program.decls {
        match decl {
            Decl::Fun(f) => {
                if let Some(receiver) = &f.receiver {
                    module
                        .extensions
                        .push((type_ref_name(receiver), f.name.name.clone()));
                }
                module.functions.push(lowerer.lower_function(f, None));
            }
            Decl::Property(p) => {
                let ty = analysis.type_of(p.id);
                let init = p.initializer.as_ref().map(|e| lowerer.lower_expr(e));
                module.globals.push(HirGlobal {
                    name: p.name.name.clone(),
                    ty,
                    init,
                    mutable: p.mutable,
                });
            }
            Decl::Class(c) => module.classes.push(lowerer.lower_class(c)),
            Decl::Interface(i) => module.classes.push(lowerer.lower_interface(i)),
            Decl::Object(o) => {
                if let Some(class) = lowerer.lower_object(o) {
                    module.classes.push(class);
                }
            }
            Decl::Enum(e) => module.classes.push(lowerer.lower_enum(e)),
            Decl::TypeAlias(_) => {}
            Decl::Destructuring(_) => {}
        }
    }

    module.classes.append(&mut lowerer.lifted);
    module.functions.append(&mut lowerer.lifted_fns);
    module
}

fn index_functions(decls: &[Decl], out: &mut FxHashMap<NodeId, FunDecl>) {
    for decl in decls {
        match decl {
            Decl::Fun(f) => {
                out.insert(f.id, f.clone());
            }
            Decl::Class(c) => {
                for member in &c.members {
                    if let Member::Fun(f) = member {
                        out.insert(f.id, f.clone());
                    }
                }
            }
            Decl::Object(o) => {
                for member in &o.members {
                    if let Member::Fun(f) = member {
                        out.insert(f.id, f.clone());
                    }
                }
            }
            Decl::Enum(e) => {
                for member in &e.members {
                    if let Member::Fun(f) = member {
                        out.insert(f.id, f.clone());
                    }
                }
            }
            _ => {}
        }
    }
}

struct Lowerer<'a> {
    analysis: &'a Analysis,
    fun_index: FxHashMap<NodeId, FunDecl>,
    lambda_counter: &'a mut u32,
    lifted: Vec<HirClass>,
    /// Local functions hoisted to the module level.
    lifted_fns: Vec<HirFunction>,
    tmp: u32,
    /// Capture sets for in-flight lambda bodies, innermost last.
    capture_stack: Vec<FxHashSet<String>>,
    /// Enclosing function return types (error propagation).
    enclosing_ret: Vec<Type>,
}

impl<'a> Lowerer<'a> {
    fn ty(&self, e: &Expr) -> Type {
        self.analysis.type_of(e.id)
    }

    fn tmp_name(&mut self, hint: &str) -> String {
        let n = self.tmp;
        self.tmp += 1;
        format!("${hint}{n}")
    }

    // ── Declarations ───────────────────────────────────────────────────

    fn lower_function(&mut self, f: &FunDecl, owner: Option<&str>) -> HirFunction {
        let mut params = Vec::new();
        // Extension receiver compiles to a leading `this` parameter.
        if let Some(receiver) = &f.receiver {
            params.push(HirParam {
                name: "this".to_string(),
                ty: Type::class(type_ref_name(receiver)),
            });
        }
        for p in &f.params {
            params.push(HirParam {
                name: p.name.name.clone(),
                ty: self.analysis.type_of(p.id),
            });
        }
        let sig = self.declared_signature(f, owner);
        let ret = sig
            .as_ref()
            .map(|s| s.ret.clone())
            .unwrap_or_else(Type::unit);
        let is_inline = sig
            .as_ref()
            .map(|s| s.is_inline)
            .unwrap_or(f.modifiers.is_inline);
        self.enclosing_ret.push(ret.clone());
        let body = f.body.as_ref().map(|body| match body {
            FunBody::Expr(e) => {
                let value = self.lower_expr(e);
                if ret.is_unit() {
                    value
                } else {
                    HirExpr::new(
                        HirExprKind::Return {
                            value: Some(Box::new(value)),
                        },
                        Type::nothing(),
                        f.span,
                    )
                }
            }
            FunBody::Block(block) => self.lower_block(block),
        });
        self.enclosing_ret.pop();

        HirFunction {
            name: f.name.name.clone(),
            owner: owner.map(str::to_string),
            params,
            ret,
            body,
            is_static: owner.is_none(),
            is_inline,
            reified: f
                .type_params
                .iter()
                .filter(|tp| tp.reified)
                .map(|tp| tp.name.name.clone())
                .collect(),
            span: f.span,
        }
    }

    /// The analyzer's signature for this declaration (inferred returns
    /// were backfilled there; the `inline` modifier is recorded on it).
    fn declared_signature(&self, f: &FunDecl, owner: Option<&str>) -> Option<FunctionSig> {
        match owner {
            Some(owner) => self
                .analysis
                .classes
                .get(owner)
                .and_then(|c| c.methods.iter().find(|m| m.decl_id == Some(f.id)))
                .cloned(),
            None => self
                .analysis
                .functions
                .get(&f.name.name)
                .and_then(|g| g.iter().find(|s| s.decl_id == Some(f.id)))
                .cloned(),
        }
    }

    fn lower_class(&mut self, c: &ClassDecl) -> HirClass {
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut ctor_body: Vec<HirExpr> = Vec::new();

        // Promoted primary-constructor properties initialize from their
        // parameters.
        for p in &c.primary_params {
            if let Some(mutable) = p.property {
                let ty = self.analysis.type_of(p.id);
                fields.push(HirField {
                    name: p.name.name.clone(),
                    ty: ty.clone(),
                    mutable,
                });
                ctor_body.push(HirExpr::new(
                    HirExprKind::SetField {
                        target: Box::new(this_expr(&c.name.name, p.span)),
                        owner: c.name.name.clone(),
                        name: p.name.name.clone(),
                        value: Box::new(HirExpr::new(
                            HirExprKind::Local(p.name.name.clone()),
                            ty,
                            p.span,
                        )),
                    },
                    Type::unit(),
                    p.span,
                ));
            }
        }

        for member in &c.members {
            match member {
                Member::Property(p) => {
                    let ty = self.analysis.type_of(p.id);
                    fields.push(HirField {
                        name: p.name.name.clone(),
                        ty: ty.clone(),
                        mutable: p.mutable,
                    });
                    if let Some(init) = &p.initializer {
                        let value = self.lower_expr(init);
                        ctor_body.push(HirExpr::new(
                            HirExprKind::SetField {
                                target: Box::new(this_expr(&c.name.name, p.span)),
                                owner: c.name.name.clone(),
                                name: p.name.name.clone(),
                                value: Box::new(value),
                            },
                            Type::unit(),
                            p.span,
                        ));
                    }
                }
                Member::Init(init) => {
                    let block = self.lower_block(&init.body);
                    ctor_body.push(block);
                }
                Member::Fun(f) => methods.push(self.lower_function(f, Some(&c.name.name))),
                Member::Constructor(_) | Member::Class(_) | Member::Object(_) | Member::Enum(_) => {
                }
            }
        }

        // Synthesized primary constructor.
        let ctor = HirFunction {
            name: "<init>".to_string(),
            owner: Some(c.name.name.clone()),
            params: c
                .primary_params
                .iter()
                .map(|p| HirParam {
                    name: p.name.name.clone(),
                    ty: self.analysis.type_of(p.id),
                })
                .collect(),
            ret: Type::unit(),
            body: Some(HirExpr::new(
                HirExprKind::Block(ctor_body),
                Type::unit(),
                c.span,
            )),
            is_static: false,
            is_inline: false,
            reified: Vec::new(),
            span: c.span,
        };
        methods.insert(0, ctor);

        let info = self.analysis.classes.get(&c.name.name);
        HirClass {
            name: c.name.name.clone(),
            kind: HirClassKind::Class,
            super_class: info.and_then(|i| i.super_class.clone()),
            interfaces: info.map(|i| i.interfaces.clone()).unwrap_or_default(),
            fields,
            methods,
            enum_entries: Vec::new(),
            span: c.span,
        }
    }

    fn lower_interface(&mut self, i: &InterfaceDecl) -> HirClass {
        let mut methods = Vec::new();
        for member in &i.members {
            if let Member::Fun(f) = member {
                methods.push(self.lower_function(f, Some(&i.name.name)));
            }
        }
        HirClass {
            name: i.name.name.clone(),
            kind: HirClassKind::Interface,
            super_class: None,
            interfaces: self
                .analysis
                .classes
                .get(&i.name.name)
                .map(|c| c.interfaces.clone())
                .unwrap_or_default(),
            fields: Vec::new(),
            methods,
            enum_entries: Vec::new(),
            span: i.span,
        }
    }

    fn lower_object(&mut self, o: &ObjectDecl) -> Option<HirClass> {
        let name = o.name.as_ref().map(|n| n.name.clone()).or_else(|| {
            o.is_companion.then(|| "Companion".to_string())
        })?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        for member in &o.members {
            match member {
                Member::Fun(f) => methods.push(self.lower_function(f, Some(&name))),
                Member::Property(p) => {
                    fields.push(HirField {
                        name: p.name.name.clone(),
                        ty: self.analysis.type_of(p.id),
                        mutable: p.mutable,
                    });
                }
                _ => {}
            }
        }
        Some(HirClass {
            name,
            kind: HirClassKind::Object,
            super_class: None,
            interfaces: Vec::new(),
            fields,
            methods,
            enum_entries: Vec::new(),
            span: o.span,
        })
    }

    fn lower_enum(&mut self, e: &EnumDecl) -> HirClass {
        let mut fields = Vec::new();
        for p in &e.primary_params {
            if let Some(mutable) = p.property {
                fields.push(HirField {
                    name: p.name.name.clone(),
                    ty: self.analysis.type_of(p.id),
                    mutable,
                });
            }
        }
        let entries = e
            .entries
            .iter()
            .map(|entry| HirEnumEntry {
                name: entry.name.name.clone(),
                args: entry.args.iter().map(|a| self.lower_expr(a)).collect(),
            })
            .collect();
        let mut methods = Vec::new();
        for member in &e.members {
            if let Member::Fun(f) = member {
                methods.push(self.lower_function(f, Some(&e.name.name)));
            }
        }
        HirClass {
            name: e.name.name.clone(),
            kind: HirClassKind::Enum,
            super_class: None,
            interfaces: Vec::new(),
            fields,
            methods,
            enum_entries: entries,
            span: e.span,
        }
    }

    // ── Statements ─────────────────────────────────────────────────────

    fn lower_block(&mut self, block: &Block) -> HirExpr {
        let mut exprs = Vec::new();
        for stmt in &block.stmts {
            self.lower_stmt(stmt, &mut exprs);
        }
        HirExpr::new(HirExprKind::Block(exprs), Type::unit(), block.span)
    }

    /// Lower a block and use its last expression as the value.
    fn lower_block_value(&mut self, block: &Block, ty: Type) -> HirExpr {
        let mut exprs = Vec::new();
        for stmt in &block.stmts {
            self.lower_stmt(stmt, &mut exprs);
        }
        HirExpr::new(HirExprKind::Block(exprs), ty, block.span)
    }

    fn lower_stmt(&mut self, stmt: &Stmt, out: &mut Vec<HirExpr>) {
        match stmt {
            Stmt::Expr(e) => out.push(self.lower_expr(e)),
            Stmt::Decl(decl) => self.lower_local_decl(decl, out),
            Stmt::If(i) => out.push(self.lower_if_stmt(i)),
            Stmt::When(w) => {
                let e = self.lower_when(&w.when, Type::unit(), w.span);
                out.push(e);
            }
            Stmt::For(f) => out.push(self.lower_for(f)),
            Stmt::While(w) => {
                let cond = self.lower_expr(&w.cond);
                let body = self.lower_block(&w.body);
                out.push(HirExpr::new(
                    HirExprKind::While {
                        label: w.label.as_ref().map(|l| l.name.clone()),
                        cond: Box::new(cond),
                        body: Box::new(body),
                    },
                    Type::unit(),
                    w.span,
                ));
            }
            Stmt::DoWhile(d) => {
                let body = self.lower_block(&d.body);
                let cond = self.lower_expr(&d.cond);
                out.push(HirExpr::new(
                    HirExprKind::DoWhile {
                        label: d.label.as_ref().map(|l| l.name.clone()),
                        body: Box::new(body),
                        cond: Box::new(cond),
                    },
                    Type::unit(),
                    d.span,
                ));
            }
            Stmt::Try(t) => {
                let body = self.lower_block(&t.body);
                let catches = t.catches.iter().map(|c| self.lower_catch(c)).collect();
                let finally = t.finally.as_ref().map(|f| Box::new(self.lower_block(f)));
                out.push(HirExpr::new(
                    HirExprKind::Try {
                        body: Box::new(body),
                        catches,
                        finally,
                    },
                    Type::unit(),
                    t.span,
                ));
            }
            Stmt::Return(r) => {
                let value = r.value.as_ref().map(|v| Box::new(self.lower_expr(v)));
                out.push(HirExpr::new(
                    HirExprKind::Return { value },
                    Type::nothing(),
                    r.span,
                ));
            }
            Stmt::Break(b) => out.push(HirExpr::new(
                HirExprKind::Break {
                    label: b.label.as_ref().map(|l| l.name.clone()),
                },
                Type::nothing(),
                b.span,
            )),
            Stmt::Continue(c) => out.push(HirExpr::new(
                HirExprKind::Continue {
                    label: c.label.as_ref().map(|l| l.name.clone()),
                },
                Type::nothing(),
                c.span,
            )),
            Stmt::Throw(t) => {
                let value = self.lower_expr(&t.value);
                out.push(HirExpr::new(
                    HirExprKind::Throw {
                        value: Box::new(value),
                    },
                    Type::nothing(),
                    t.span,
                ));
            }
            Stmt::Guard(g) => {
                // guard c else B  ==>  if (!c) B
                let cond = self.lower_expr(&g.cond);
                let else_block = self.lower_block(&g.else_block);
                out.push(HirExpr::new(
                    HirExprKind::If {
                        cond: Box::new(HirExpr::new(
                            HirExprKind::Unary {
                                op: MirUnOp::Not,
                                operand: Box::new(cond),
                            },
                            Type::boolean(),
                            g.span,
                        )),
                        then_e: Box::new(else_block),
                        else_e: None,
                    },
                    Type::unit(),
                    g.span,
                ));
            }
            Stmt::Use(u) => out.push(self.lower_use(u)),
            Stmt::Block(b) => {
                let block = self.lower_block(b);
                out.push(block);
            }
        }
    }

    fn lower_catch(&mut self, c: &CatchClause) -> HirCatch {
        let body = self.lower_block(&c.body);
        HirCatch {
            class: type_ref_name(&c.ty),
            binding: c.param.name.name.clone(),
            ty: self.analysis.type_of(c.param.id),
            body,
        }
    }

    fn lower_local_decl(&mut self, decl: &Decl, out: &mut Vec<HirExpr>) {
        match decl {
            Decl::Property(p) => {
                let ty = self.analysis.type_of(p.id);
                let value = p.initializer.as_ref().map(|e| Box::new(self.lower_expr(e)));
                out.push(HirExpr::new(
                    HirExprKind::Let {
                        name: p.name.name.clone(),
                        mutable: p.mutable,
                        value,
                    },
                    Type::unit(),
                    p.span,
                ));
                let _ = ty;
            }
            Decl::Destructuring(d) => self.lower_destructuring(d, out),
            Decl::Fun(f) => {
                // Local functions are hoisted to the module level.
                let lowered = self.lower_function(f, None);
                self.lifted_fns.push(lowered);
            }
            _ => {}
        }
    }

    /// `val (a, _, c) = e` -- positional component reads off a temporary.
    fn lower_destructuring(&mut self, d: &DestructuringDecl, out: &mut Vec<HirExpr>) {
        let init = self.lower_expr(&d.initializer);
        let init_ty = init.ty.clone();
        let tmp = self.tmp_name("dtor");
        out.push(HirExpr::new(
            HirExprKind::Let {
                name: tmp.clone(),
                mutable: false,
                value: Some(Box::new(init)),
            },
            Type::unit(),
            d.span,
        ));

        let class_name = init_ty.class_name().unwrap_or("Any").to_string();
        let is_list = class_name == "List";
        let info = self.analysis.classes.get(&class_name);
        for (i, (name, id)) in d.names.iter().zip(&d.name_ids).enumerate() {
            let Some(name) = name else { continue };
            let comp_ty = self.analysis.type_of(*id);
            let target = HirExpr::new(
                HirExprKind::Local(tmp.clone()),
                init_ty.clone(),
                d.span,
            );
            let component = if is_list {
                HirExpr::new(
                    HirExprKind::IndexGet {
                        target: Box::new(target),
                        index: Box::new(HirExpr::new(
                            HirExprKind::ConstInt(i as i64),
                            Type::int(),
                            d.span,
                        )),
                    },
                    comp_ty.clone(),
                    d.span,
                )
            } else if let Some(field) = info.and_then(|c| c.fields.get(i)) {
                HirExpr::new(
                    HirExprKind::GetField {
                        target: Box::new(target),
                        owner: class_name.clone(),
                        name: field.name.clone(),
                    },
                    comp_ty.clone(),
                    d.span,
                )
            } else {
                HirExpr::new(
                    HirExprKind::CallVirtual {
                        target: Box::new(target),
                        owner: class_name.clone(),
                        name: format!("component{}", i + 1),
                        args: Vec::new(),
                    },
                    comp_ty.clone(),
                    d.span,
                )
            };
            out.push(HirExpr::new(
                HirExprKind::Let {
                    name: name.name.clone(),
                    mutable: d.mutable,
                    value: Some(Box::new(component)),
                },
                Type::unit(),
                d.span,
            ));
        }
    }

    fn lower_if_stmt(&mut self, i: &IfStmt) -> HirExpr {
        let cond = self.lower_expr(&i.cond);
        let then_e = self.lower_block(&i.then_block);
        let else_e = match &i.else_branch {
            Some(ElseBranch::Block(b)) => Some(Box::new(self.lower_block(b))),
            Some(ElseBranch::If(nested)) => Some(Box::new(self.lower_if_stmt(nested))),
            None => None,
        };
        HirExpr::new(
            HirExprKind::If {
                cond: Box::new(cond),
                then_e: Box::new(then_e),
                else_e,
            },
            Type::unit(),
            i.span,
        )
    }

    /// `for (x in iterable)`.
    fn lower_for(&mut self, f: &ForStmt) -> HirExpr {
        let label = f.label.as_ref().map(|l| l.name.clone());
        let span = f.span;

        // Numeric range: integer induction loop.
        if let ExprKind::Range {
            lhs,
            rhs,
            inclusive,
            step,
        } = &f.iterable.kind
        {
            let elem_ty = self.ty(lhs);
            if elem_ty.rank().is_some() {
                return self.lower_counted_for(f, lhs, rhs, *inclusive, step.as_deref(), elem_ty, label, span);
            }
        }

        // General case: the iterator protocol.
        let iterable = self.lower_expr(&f.iterable);
        let iterable_ty = iterable.ty.clone();
        let elem_ty = f
            .binding_ids
            .first()
            .map(|id| self.analysis.type_of(*id))
            .unwrap_or_else(Type::any);
        let it = self.tmp_name("it");
        let iterator_ty = Type::class("Iterator");

        let mut body_exprs = Vec::new();
        let next = HirExpr::new(
            HirExprKind::CallVirtual {
                target: Box::new(HirExpr::new(
                    HirExprKind::Local(it.clone()),
                    iterator_ty.clone(),
                    span,
                )),
                owner: "Iterator".to_string(),
                name: "next".to_string(),
                args: Vec::new(),
            },
            elem_ty.clone(),
            span,
        );
        if f.bindings.len() == 1 {
            let name = f.bindings[0]
                .as_ref()
                .map(|n| n.name.clone())
                .unwrap_or_else(|| self.tmp_name("loop"));
            body_exprs.push(HirExpr::new(
                HirExprKind::Let {
                    name,
                    mutable: false,
                    value: Some(Box::new(next)),
                },
                Type::unit(),
                span,
            ));
        } else {
            // Destructured bindings read components off the element.
            let elem_tmp = self.tmp_name("elem");
            body_exprs.push(HirExpr::new(
                HirExprKind::Let {
                    name: elem_tmp.clone(),
                    mutable: false,
                    value: Some(Box::new(next)),
                },
                Type::unit(),
                span,
            ));
            let class_name = elem_ty.class_name().unwrap_or("Pair").to_string();
            let fields: Vec<String> = self
                .analysis
                .classes
                .get(&class_name)
                .map(|c| c.fields.iter().map(|f| f.name.clone()).collect())
                .unwrap_or_else(|| vec!["first".into(), "second".into()]);
            for (i, (binding, id)) in f.bindings.iter().zip(&f.binding_ids).enumerate() {
                let Some(binding) = binding else { continue };
                let comp_ty = self.analysis.type_of(*id);
                let field = fields.get(i).cloned().unwrap_or_else(|| format!("component{}", i + 1));
                body_exprs.push(HirExpr::new(
                    HirExprKind::Let {
                        name: binding.name.clone(),
                        mutable: false,
                        value: Some(Box::new(HirExpr::new(
                            HirExprKind::GetField {
                                target: Box::new(HirExpr::new(
                                    HirExprKind::Local(elem_tmp.clone()),
                                    elem_ty.clone(),
                                    span,
                                )),
                                owner: class_name.clone(),
                                name: field,
                            },
                            comp_ty,
                            span,
                        ))),
                    },
                    Type::unit(),
                    span,
                ));
            }
        }
        let user_body = self.lower_block(&f.body);
        body_exprs.push(user_body);

        let has_next = HirExpr::new(
            HirExprKind::CallVirtual {
                target: Box::new(HirExpr::new(
                    HirExprKind::Local(it.clone()),
                    iterator_ty.clone(),
                    span,
                )),
                owner: "Iterator".to_string(),
                name: "hasNext".to_string(),
                args: Vec::new(),
            },
            Type::boolean(),
            span,
        );

        HirExpr::new(
            HirExprKind::Block(vec![
                HirExpr::new(
                    HirExprKind::Let {
                        name: it,
                        mutable: false,
                        value: Some(Box::new(HirExpr::new(
                            HirExprKind::CallVirtual {
                                target: Box::new(iterable),
                                owner: iterable_ty.class_name().unwrap_or("Iterable").to_string(),
                                name: "iterator".to_string(),
                                args: Vec::new(),
                            },
                            iterator_ty,
                            span,
                        ))),
                    },
                    Type::unit(),
                    span,
                ),
                HirExpr::new(
                    HirExprKind::For {
                        label,
                        cond: Box::new(has_next),
                        update: Box::new(HirExpr::unit(span)),
                        body: Box::new(HirExpr::new(
                            HirExprKind::Block(body_exprs),
                            Type::unit(),
                            span,
                        )),
                    },
                    Type::unit(),
                    span,
                ),
            ]),
            Type::unit(),
            span,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_counted_for(
        &mut self,
        f: &ForStmt,
        lhs: &Expr,
        rhs: &Expr,
        inclusive: bool,
        step: Option<&Expr>,
        elem_ty: Type,
        label: Option<String>,
        span: Span,
    ) -> HirExpr {
        let i_name = self.tmp_name("i");
        let limit_name = self.tmp_name("limit");
        let step_name = self.tmp_name("step");

        let lo = self.lower_expr(lhs);
        let hi = self.lower_expr(rhs);
        let step_value = match step {
            Some(s) => self.lower_expr(s),
            None => HirExpr::new(HirExprKind::ConstInt(1), elem_ty.clone(), span),
        };

        let local = |name: &str, ty: &Type| {
            HirExpr::new(HirExprKind::Local(name.to_string()), ty.clone(), span)
        };
        let cond = HirExpr::new(
            HirExprKind::Binary {
                op: if inclusive { MirBinOp::Le } else { MirBinOp::Lt },
                lhs: Box::new(local(&i_name, &elem_ty)),
                rhs: Box::new(local(&limit_name, &elem_ty)),
            },
            Type::boolean(),
            span,
        );
        let update = HirExpr::new(
            HirExprKind::AssignLocal {
                name: i_name.clone(),
                value: Box::new(HirExpr::new(
                    HirExprKind::Binary {
                        op: MirBinOp::Add,
                        lhs: Box::new(local(&i_name, &elem_ty)),
                        rhs: Box::new(local(&step_name, &elem_ty)),
                    },
                    elem_ty.clone(),
                    span,
                )),
            },
            Type::unit(),
            span,
        );

        let mut body_exprs = Vec::new();
        if let Some(Some(binding)) = f.bindings.first() {
            body_exprs.push(HirExpr::new(
                HirExprKind::Let {
                    name: binding.name.clone(),
                    mutable: false,
                    value: Some(Box::new(local(&i_name, &elem_ty))),
                },
                Type::unit(),
                span,
            ));
        }
        body_exprs.push(self.lower_block(&f.body));

        HirExpr::new(
            HirExprKind::Block(vec![
                HirExpr::new(
                    HirExprKind::Let {
                        name: i_name,
                        mutable: true,
                        value: Some(Box::new(lo)),
                    },
                    Type::unit(),
                    span,
                ),
                HirExpr::new(
                    HirExprKind::Let {
                        name: limit_name,
                        mutable: false,
                        value: Some(Box::new(hi)),
                    },
                    Type::unit(),
                    span,
                ),
                HirExpr::new(
                    HirExprKind::Let {
                        name: step_name,
                        mutable: false,
                        value: Some(Box::new(step_value)),
                    },
                    Type::unit(),
                    span,
                ),
                HirExpr::new(
                    HirExprKind::For {
                        label,
                        cond: Box::new(cond),
                        update: Box::new(update),
                        body: Box::new(HirExpr::new(
                            HirExprKind::Block(body_exprs),
                            Type::unit(),
                            span,
                        )),
                    },
                    Type::unit(),
                    span,
                ),
            ]),
            Type::unit(),
            span,
        )
    }

    /// `use (r = open()) { body }` -- try/finally with close calls.
    fn lower_use(&mut self, u: &UseStmt) -> HirExpr {
        let mut exprs = Vec::new();
        let mut closes = Vec::new();
        for binding in &u.bindings {
            let init = self.lower_expr(&binding.init);
            let ty = init.ty.clone();
            exprs.push(HirExpr::new(
                HirExprKind::Let {
                    name: binding.name.name.clone(),
                    mutable: false,
                    value: Some(Box::new(init)),
                },
                Type::unit(),
                binding.span,
            ));
            // Closed through the scope helper, newest first.
            let close = HirExpr::new(
                HirExprKind::CallStatic {
                    owner: BUILTINS_OWNER.to_string(),
                    name: "closeQuietly".to_string(),
                    args: vec![HirExpr::new(
                        HirExprKind::Local(binding.name.name.clone()),
                        ty,
                        binding.span,
                    )],
                    special: SPECIAL_SCOPE_CALL,
                },
                Type::unit(),
                binding.span,
            );
            closes.insert(0, close);
        }
        let body = self.lower_block(&u.body);
        exprs.push(HirExpr::new(
            HirExprKind::Try {
                body: Box::new(body),
                catches: Vec::new(),
                finally: Some(Box::new(HirExpr::new(
                    HirExprKind::Block(closes),
                    Type::unit(),
                    u.span,
                ))),
            },
            Type::unit(),
            u.span,
        ));
        HirExpr::new(HirExprKind::Block(exprs), Type::unit(), u.span)
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn lower_expr(&mut self, e: &Expr) -> HirExpr {
        let ty = self.ty(e);
        let span = e.span;
        match &e.kind {
            ExprKind::Literal(lit) => self.lower_literal(lit, ty, span),
            ExprKind::Name(ident) => self.lower_name(e, ident, ty, span),
            ExprKind::This { .. } => HirExpr::new(self.local_or_captured("this"), ty, span),
            ExprKind::Super { .. } => HirExpr::new(HirExprKind::Local("this".into()), ty, span),
            ExprKind::Binary {
                op,
                negated,
                lhs,
                rhs,
            } => self.lower_binary(*op, *negated, lhs, rhs, ty, span),
            ExprKind::InfixCall { name, lhs, rhs } => {
                let target = self.lower_expr(lhs);
                let arg = self.lower_expr(rhs);
                match self.analysis.resolution(e.id) {
                    Some(Resolution::ExtensionFunction { name }) => HirExpr::new(
                        HirExprKind::CallStatic {
                            owner: MODULE_OWNER.to_string(),
                            name: name.clone(),
                            args: vec![target, arg],
                            special: SPECIAL_NONE,
                        },
                        ty,
                        span,
                    ),
                    _ => {
                        let owner = target.ty.class_name().unwrap_or("Any").to_string();
                        HirExpr::new(
                            HirExprKind::CallVirtual {
                                target: Box::new(target),
                                owner,
                                name: name.name.clone(),
                                args: vec![arg],
                            },
                            ty,
                            span,
                        )
                    }
                }
            }
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand, ty, span),
            ExprKind::Postfix { op, operand } => self.lower_postfix(*op, operand, ty, span),
            ExprKind::Call { callee, args, .. } => self.lower_call(e, callee, args, None, ty, span),
            ExprKind::Index { target, indices } => {
                let target_hir = self.lower_expr(target);
                let index = self.lower_expr(&indices[0]);
                self.lower_index_get(target_hir, index, ty, span)
            }
            ExprKind::SafeIndex { target, indices } => {
                let target_hir = self.lower_expr(target);
                let index = self.lower_expr(&indices[0]);
                let tmp = self.tmp_name("safe");
                let target_ty = target_hir.ty.clone();
                let access = self.lower_index_get(
                    HirExpr::new(HirExprKind::Local(tmp.clone()), target_ty.non_null(), span),
                    index,
                    ty.non_null(),
                    span,
                );
                self.null_guard(tmp, target_hir, access, ty, span)
            }
            ExprKind::Slice {
                target,
                start,
                end,
                inclusive,
            } => {
                let target_hir = self.lower_expr(target);
                let owner = target_hir.ty.class_name().unwrap_or("List").to_string();
                let start_e = match start {
                    Some(s) => self.lower_expr(s),
                    None => HirExpr::new(HirExprKind::ConstInt(0), Type::int(), span),
                };
                let end_e = match end {
                    Some(s) => self.lower_expr(s),
                    None => HirExpr::new(HirExprKind::ConstInt(-1), Type::int(), span),
                };
                HirExpr::new(
                    HirExprKind::CallVirtual {
                        target: Box::new(target_hir),
                        owner,
                        name: if *inclusive { "sliceInclusive" } else { "slice" }.to_string(),
                        args: vec![start_e, end_e],
                    },
                    ty,
                    span,
                )
            }
            ExprKind::Member { target, name } => self.lower_member(e, target, name, ty, span),
            ExprKind::SafeMember { target, name } => {
                // a?.b  ==>  { val t = a; if (t == null) null else t.b }
                let target_hir = self.lower_expr(target);
                let tmp = self.tmp_name("safe");
                let non_null_target = HirExpr::new(
                    HirExprKind::Local(tmp.clone()),
                    target_hir.ty.non_null(),
                    span,
                );
                let access =
                    self.lower_member_on(e, non_null_target, name, ty.non_null(), span);
                self.null_guard(tmp, target_hir, access, ty, span)
            }
            ExprKind::SafeBlock { target, block } => {
                // obj?.{ b }  ==>  { val t = obj; if (t == null) null else { this := t; b } }
                let target_hir = self.lower_expr(target);
                let tmp = self.tmp_name("scope");
                let body = {
                    // Rebind `this` inside the block.
                    let inner = self.lower_block_value(block, ty.non_null());
                    let this_let = HirExpr::new(
                        HirExprKind::Let {
                            name: "this".to_string(),
                            mutable: false,
                            value: Some(Box::new(HirExpr::new(
                                HirExprKind::Local(tmp.clone()),
                                target_hir.ty.non_null(),
                                span,
                            ))),
                        },
                        Type::unit(),
                        span,
                    );
                    HirExpr::new(
                        HirExprKind::Block(vec![this_let, inner]),
                        ty.non_null(),
                        span,
                    )
                };
                self.null_guard(tmp, target_hir, body, ty, span)
            }
            ExprKind::Elvis { lhs, rhs } => {
                // a ?: b  ==>  { val t = a; if (t != null) t else b }
                let lhs_hir = self.lower_expr(lhs);
                let rhs_hir = self.lower_expr(rhs);
                let tmp = self.tmp_name("elvis");
                let tmp_ref = HirExpr::new(
                    HirExprKind::Local(tmp.clone()),
                    lhs_hir.ty.non_null(),
                    span,
                );
                let check = HirExpr::new(
                    HirExprKind::Binary {
                        op: MirBinOp::RefNe,
                        lhs: Box::new(HirExpr::new(
                            HirExprKind::Local(tmp.clone()),
                            lhs_hir.ty.clone(),
                            span,
                        )),
                        rhs: Box::new(HirExpr::new(
                            HirExprKind::ConstNull,
                            Type::null(),
                            span,
                        )),
                    },
                    Type::boolean(),
                    span,
                );
                HirExpr::new(
                    HirExprKind::Block(vec![
                        HirExpr::new(
                            HirExprKind::Let {
                                name: tmp,
                                mutable: false,
                                value: Some(Box::new(lhs_hir)),
                            },
                            Type::unit(),
                            span,
                        ),
                        HirExpr::new(
                            HirExprKind::If {
                                cond: Box::new(check),
                                then_e: Box::new(tmp_ref),
                                else_e: Some(Box::new(rhs_hir)),
                            },
                            ty.clone(),
                            span,
                        ),
                    ]),
                    ty,
                    span,
                )
            }
            ExprKind::NotNull { operand } => {
                // a!!  ==>  { val t = a; if (t == null) throw NPE else t }
                let operand_hir = self.lower_expr(operand);
                let tmp = self.tmp_name("nn");
                let throw_npe = HirExpr::new(
                    HirExprKind::Throw {
                        value: Box::new(HirExpr::new(
                            HirExprKind::New {
                                class: "NullPointerException".to_string(),
                                args: vec![HirExpr::new(
                                    HirExprKind::ConstStr("value was null".to_string()),
                                    Type::string(),
                                    span,
                                )],
                            },
                            Type::class("NullPointerException"),
                            span,
                        )),
                    },
                    Type::nothing(),
                    span,
                );
                let tmp_ref =
                    HirExpr::new(HirExprKind::Local(tmp.clone()), ty.clone(), span);
                let check = self.null_eq(&tmp, operand_hir.ty.clone(), span);
                HirExpr::new(
                    HirExprKind::Block(vec![
                        HirExpr::new(
                            HirExprKind::Let {
                                name: tmp,
                                mutable: false,
                                value: Some(Box::new(operand_hir)),
                            },
                            Type::unit(),
                            span,
                        ),
                        HirExpr::new(
                            HirExprKind::If {
                                cond: Box::new(check),
                                then_e: Box::new(throw_npe),
                                else_e: Some(Box::new(tmp_ref)),
                            },
                            ty.clone(),
                            span,
                        ),
                    ]),
                    ty,
                    span,
                )
            }
            ExprKind::Propagate { operand } => {
                // r?  ==>  { val t = r; if (t.isOk()) t.unwrap() else return t }
                let operand_hir = self.lower_expr(operand);
                let result_ty = operand_hir.ty.clone();
                let tmp = self.tmp_name("try");
                let tmp_ref = |ty: Type| {
                    HirExpr::new(HirExprKind::Local(tmp.clone()), ty, span)
                };
                let is_ok = HirExpr::new(
                    HirExprKind::CallVirtual {
                        target: Box::new(tmp_ref(result_ty.clone())),
                        owner: "Result".to_string(),
                        name: "isOk".to_string(),
                        args: Vec::new(),
                    },
                    Type::boolean(),
                    span,
                );
                let unwrap = HirExpr::new(
                    HirExprKind::CallVirtual {
                        target: Box::new(tmp_ref(result_ty.clone())),
                        owner: "Result".to_string(),
                        name: "unwrap".to_string(),
                        args: Vec::new(),
                    },
                    ty.clone(),
                    span,
                );
                let ret = HirExpr::new(
                    HirExprKind::Return {
                        value: Some(Box::new(tmp_ref(result_ty.clone()))),
                    },
                    Type::nothing(),
                    span,
                );
                HirExpr::new(
                    HirExprKind::Block(vec![
                        HirExpr::new(
                            HirExprKind::Let {
                                name: tmp.clone(),
                                mutable: false,
                                value: Some(Box::new(operand_hir)),
                            },
                            Type::unit(),
                            span,
                        ),
                        HirExpr::new(
                            HirExprKind::If {
                                cond: Box::new(is_ok),
                                then_e: Box::new(unwrap),
                                else_e: Some(Box::new(ret)),
                            },
                            ty.clone(),
                            span,
                        ),
                    ]),
                    ty,
                    span,
                )
            }
            ExprKind::Assign { op, target, value } => {
                self.lower_assign(*op, target, value, span)
            }
            ExprKind::Lambda { params, body } => self.lower_lambda(e, params, body, ty, span),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_hir = self.lower_expr(cond);
                let then_hir = self.lower_expr(then_branch);
                let else_hir = else_branch.as_ref().map(|b| Box::new(self.lower_expr(b)));
                HirExpr::new(
                    HirExprKind::If {
                        cond: Box::new(cond_hir),
                        then_e: Box::new(then_hir),
                        else_e: else_hir,
                    },
                    ty,
                    span,
                )
            }
            ExprKind::When(when) => self.lower_when(when, ty, span),
            ExprKind::Try {
                body,
                catches,
                finally,
            } => {
                let body_hir = self.lower_block_value(body, ty.clone());
                let catches_hir = catches.iter().map(|c| self.lower_catch(c)).collect();
                let finally_hir = finally.as_ref().map(|f| Box::new(self.lower_block(f)));
                HirExpr::new(
                    HirExprKind::Try {
                        body: Box::new(body_hir),
                        catches: catches_hir,
                        finally: finally_hir,
                    },
                    ty,
                    span,
                )
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond_hir = self.lower_expr(cond);
                let then_hir = self.lower_expr(then_expr);
                let else_hir = self.lower_expr(else_expr);
                HirExpr::new(
                    HirExprKind::If {
                        cond: Box::new(cond_hir),
                        then_e: Box::new(then_hir),
                        else_e: Some(Box::new(else_hir)),
                    },
                    ty,
                    span,
                )
            }
            ExprKind::Block(block) => self.lower_block_value(block, ty),
            ExprKind::MethodRef { target, name, .. } => {
                self.lower_method_ref(e, target, name, ty, span)
            }
            ExprKind::ObjectLiteral { members, .. } => {
                self.lower_object_literal(e, members, ty, span)
            }
            ExprKind::CollectionLiteral {
                kind,
                elements,
                entries,
            } => self.lower_collection(*kind, elements, entries, ty, span),
            ExprKind::StringInterp { parts } => self.lower_interp(parts, span),
            ExprKind::Placeholder => HirExpr::new(HirExprKind::Error, ty, span),
            ExprKind::Spread { operand } => self.lower_expr(operand),
            ExprKind::Range { lhs, rhs, inclusive, step } => {
                let class = ty.class_name().unwrap_or("IntRange").to_string();
                let lo = self.lower_expr(lhs);
                let hi = self.lower_expr(rhs);
                let step_e = match step {
                    Some(s) => self.lower_expr(s),
                    None => HirExpr::new(HirExprKind::ConstInt(1), Type::int(), span),
                };
                let incl = HirExpr::new(
                    HirExprKind::ConstBool(*inclusive),
                    Type::boolean(),
                    span,
                );
                HirExpr::new(
                    HirExprKind::New {
                        class,
                        args: vec![lo, hi, incl, step_e],
                    },
                    ty,
                    span,
                )
            }
            ExprKind::Pipeline { lhs, rhs } => {
                // x |> f        ==> f(x)
                // x |> g(_, 2)  ==> g(x, 2)
                let piped = self.lower_expr(lhs);
                match &rhs.kind {
                    ExprKind::Call { callee, args, .. } => {
                        self.lower_call(rhs, callee, args, Some(piped), ty, span)
                    }
                    _ => {
                        let callee = self.lower_expr(rhs);
                        HirExpr::new(
                            HirExprKind::CallValue {
                                callee: Box::new(callee),
                                args: vec![piped],
                            },
                            ty,
                            span,
                        )
                    }
                }
            }
            ExprKind::Cast { operand, ty: target, safe } => {
                let operand_hir = self.lower_expr(operand);
                HirExpr::new(
                    HirExprKind::TypeCast {
                        operand: Box::new(operand_hir),
                        class: type_ref_name(target),
                        safe: *safe,
                    },
                    ty,
                    span,
                )
            }
            ExprKind::TypeCheck {
                operand,
                ty: target,
                negated,
            } => {
                let operand_hir = self.lower_expr(operand);
                let check = HirExpr::new(
                    HirExprKind::TypeCheck {
                        operand: Box::new(operand_hir),
                        class: type_ref_name(target),
                    },
                    Type::boolean(),
                    span,
                );
                if *negated {
                    HirExpr::new(
                        HirExprKind::Unary {
                            op: MirUnOp::Not,
                            operand: Box::new(check),
                        },
                        Type::boolean(),
                        span,
                    )
                } else {
                    check
                }
            }
            ExprKind::Await { operand } => {
                let operand_hir = self.lower_expr(operand);
                let owner = operand_hir.ty.class_name().unwrap_or("Future").to_string();
                HirExpr::new(
                    HirExprKind::CallVirtual {
                        target: Box::new(operand_hir),
                        owner,
                        name: "await".to_string(),
                        args: Vec::new(),
                    },
                    ty,
                    span,
                )
            }
            ExprKind::Jump { kind, label } => match kind {
                JumpKind::Return(value) => {
                    let value = value.as_ref().map(|v| Box::new(self.lower_expr(v)));
                    HirExpr::new(HirExprKind::Return { value }, Type::nothing(), span)
                }
                JumpKind::Throw(value) => {
                    let value = self.lower_expr(value);
                    HirExpr::new(
                        HirExprKind::Throw {
                            value: Box::new(value),
                        },
                        Type::nothing(),
                        span,
                    )
                }
                JumpKind::Break => HirExpr::new(
                    HirExprKind::Break {
                        label: label.as_ref().map(|l| l.name.clone()),
                    },
                    Type::nothing(),
                    span,
                ),
                JumpKind::Continue => HirExpr::new(
                    HirExprKind::Continue {
                        label: label.as_ref().map(|l| l.name.clone()),
                    },
                    Type::nothing(),
                    span,
                ),
            },
            ExprKind::Error => HirExpr::new(HirExprKind::Error, ty, span),
        }
    }

    fn lower_literal(&self, lit: &LiteralKind, ty: Type, span: Span) -> HirExpr {
        let kind = match lit {
            LiteralKind::Int(v) => HirExprKind::ConstInt(*v),
            LiteralKind::Long(v) => HirExprKind::ConstLong(*v),
            LiteralKind::Float(v) => HirExprKind::ConstFloat(*v),
            LiteralKind::Double(v) => HirExprKind::ConstDouble(*v),
            LiteralKind::Char(v) => HirExprKind::ConstChar(*v),
            LiteralKind::Bool(v) => HirExprKind::ConstBool(*v),
            LiteralKind::Str(v) => HirExprKind::ConstStr(v.clone()),
            LiteralKind::Null => HirExprKind::ConstNull,
        };
        HirExpr::new(kind, ty, span)
    }

    /// Local reference, indirected through the capture environment when
    /// the name belongs to an enclosing function.
    fn local_or_captured(&self, name: &str) -> HirExprKind {
        if let Some(captures) = self.capture_stack.last() {
            if captures.contains(name) {
                return HirExprKind::GetField {
                    target: Box::new(HirExpr::new(
                        HirExprKind::Local("this".to_string()),
                        Type::any(),
                        Span::point(0),
                    )),
                    owner: String::new(), // patched by MIR lowering to the lambda class
                    name: name.to_string(),
                };
            }
        }
        HirExprKind::Local(name.to_string())
    }

    fn lower_name(&mut self, e: &Expr, ident: &Ident, ty: Type, span: Span) -> HirExpr {
        let kind = match self.analysis.resolution(e.id) {
            Some(Resolution::Local) | Some(Resolution::Parameter) => {
                self.local_or_captured(&ident.name)
            }
            Some(Resolution::Global { name }) => HirExprKind::Global(name.clone()),
            Some(Resolution::Field { owner, name }) => HirExprKind::GetField {
                target: Box::new(HirExpr::new(
                    self.local_or_captured("this"),
                    Type::class(owner.clone()),
                    span,
                )),
                owner: owner.clone(),
                name: name.clone(),
            },
            Some(Resolution::Object { name }) => HirExprKind::GetStatic {
                owner: name.clone(),
                name: "INSTANCE".to_string(),
            },
            Some(Resolution::Builtin { name }) => match name.as_str() {
                "PI" => HirExprKind::ConstDouble(std::f64::consts::PI),
                "E" => HirExprKind::ConstDouble(std::f64::consts::E),
                _ => HirExprKind::GetStatic {
                    owner: BUILTINS_OWNER.to_string(),
                    name: name.clone(),
                },
            },
            Some(Resolution::TopLevelFunction { name }) => {
                // A bare function reference becomes a closure later; for
                // now keep a static handle the MIR lowering wraps.
                HirExprKind::GetStatic {
                    owner: MODULE_OWNER.to_string(),
                    name: name.clone(),
                }
            }
            Some(Resolution::Class { name }) => HirExprKind::ConstClass(name.clone()),
            Some(Resolution::Import { path }) => HirExprKind::GetStatic {
                owner: path.clone(),
                name: ident.name.clone(),
            },
            _ => HirExprKind::Local(ident.name.clone()),
        };
        HirExpr::new(kind, ty, span)
    }

    fn lower_binary(
        &mut self,
        op: ast::BinaryOp,
        negated: bool,
        lhs: &Expr,
        rhs: &Expr,
        ty: Type,
        span: Span,
    ) -> HirExpr {
        use ast::BinaryOp::*;
        match op {
            And => {
                // a && b  ==>  if (a) b else false
                let lhs_hir = self.lower_expr(lhs);
                let rhs_hir = self.lower_expr(rhs);
                HirExpr::new(
                    HirExprKind::If {
                        cond: Box::new(lhs_hir),
                        then_e: Box::new(rhs_hir),
                        else_e: Some(Box::new(HirExpr::new(
                            HirExprKind::ConstBool(false),
                            Type::boolean(),
                            span,
                        ))),
                    },
                    Type::boolean(),
                    span,
                )
            }
            Or => {
                // a || b  ==>  if (a) true else b
                let lhs_hir = self.lower_expr(lhs);
                let rhs_hir = self.lower_expr(rhs);
                HirExpr::new(
                    HirExprKind::If {
                        cond: Box::new(lhs_hir),
                        then_e: Box::new(HirExpr::new(
                            HirExprKind::ConstBool(true),
                            Type::boolean(),
                            span,
                        )),
                        else_e: Some(Box::new(rhs_hir)),
                    },
                    Type::boolean(),
                    span,
                )
            }
            In => {
                // a in b  ==>  b.contains(a)
                let lhs_hir = self.lower_expr(lhs);
                let rhs_hir = self.lower_expr(rhs);
                let owner = rhs_hir.ty.class_name().unwrap_or("Any").to_string();
                let contains = HirExpr::new(
                    HirExprKind::CallVirtual {
                        target: Box::new(rhs_hir),
                        owner,
                        name: "contains".to_string(),
                        args: vec![lhs_hir],
                    },
                    Type::boolean(),
                    span,
                );
                if negated {
                    HirExpr::new(
                        HirExprKind::Unary {
                            op: MirUnOp::Not,
                            operand: Box::new(contains),
                        },
                        Type::boolean(),
                        span,
                    )
                } else {
                    contains
                }
            }
            To => {
                let lhs_hir = self.lower_expr(lhs);
                let rhs_hir = self.lower_expr(rhs);
                HirExpr::new(
                    HirExprKind::New {
                        class: "Pair".to_string(),
                        args: vec![lhs_hir, rhs_hir],
                    },
                    ty,
                    span,
                )
            }
            _ => {
                let lhs_hir = self.lower_expr(lhs);
                let rhs_hir = self.lower_expr(rhs);
                let mir_op = match op {
                    Add => MirBinOp::Add,
                    Sub => MirBinOp::Sub,
                    Mul => MirBinOp::Mul,
                    Div => MirBinOp::Div,
                    Rem => MirBinOp::Rem,
                    Eq => MirBinOp::Eq,
                    Ne => MirBinOp::Ne,
                    RefEq => MirBinOp::RefEq,
                    RefNe => MirBinOp::RefNe,
                    Lt => MirBinOp::Lt,
                    Gt => MirBinOp::Gt,
                    Le => MirBinOp::Le,
                    Ge => MirBinOp::Ge,
                    And | Or | In | To => unreachable!("handled above"),
                };
                HirExpr::new(
                    HirExprKind::Binary {
                        op: mir_op,
                        lhs: Box::new(lhs_hir),
                        rhs: Box::new(rhs_hir),
                    },
                    ty,
                    span,
                )
            }
        }
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr, ty: Type, span: Span) -> HirExpr {
        match op {
            UnaryOp::Neg => {
                let operand_hir = self.lower_expr(operand);
                HirExpr::new(
                    HirExprKind::Unary {
                        op: MirUnOp::Neg,
                        operand: Box::new(operand_hir),
                    },
                    ty,
                    span,
                )
            }
            UnaryOp::Plus => self.lower_expr(operand),
            UnaryOp::Not => {
                let operand_hir = self.lower_expr(operand);
                HirExpr::new(
                    HirExprKind::Unary {
                        op: MirUnOp::Not,
                        operand: Box::new(operand_hir),
                    },
                    ty,
                    span,
                )
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                // ++x  ==>  { x = x + 1; x }
                let delta = if op == UnaryOp::PreInc { 1 } else { -1 };
                self.lower_inc_dec(operand, delta, true, ty, span)
            }
        }
    }

    fn lower_postfix(&mut self, op: PostfixOp, operand: &Expr, ty: Type, span: Span) -> HirExpr {
        let delta = if op == PostfixOp::Inc { 1 } else { -1 };
        self.lower_inc_dec(operand, delta, false, ty, span)
    }

    fn lower_inc_dec(
        &mut self,
        operand: &Expr,
        delta: i64,
        prefix: bool,
        ty: Type,
        span: Span,
    ) -> HirExpr {
        let ExprKind::Name(ident) = &operand.kind else {
            return HirExpr::new(HirExprKind::Error, ty, span);
        };
        let name = ident.name.clone();
        let updated = HirExpr::new(
            HirExprKind::Binary {
                op: MirBinOp::Add,
                lhs: Box::new(HirExpr::new(
                    HirExprKind::Local(name.clone()),
                    ty.clone(),
                    span,
                )),
                rhs: Box::new(HirExpr::new(HirExprKind::ConstInt(delta), ty.clone(), span)),
            },
            ty.clone(),
            span,
        );
        if prefix {
            HirExpr::new(
                HirExprKind::Block(vec![
                    HirExpr::new(
                        HirExprKind::AssignLocal {
                            name: name.clone(),
                            value: Box::new(updated),
                        },
                        Type::unit(),
                        span,
                    ),
                    HirExpr::new(HirExprKind::Local(name), ty.clone(), span),
                ]),
                ty,
                span,
            )
        } else {
            let tmp = self.tmp_name("post");
            HirExpr::new(
                HirExprKind::Block(vec![
                    HirExpr::new(
                        HirExprKind::Let {
                            name: tmp.clone(),
                            mutable: false,
                            value: Some(Box::new(HirExpr::new(
                                HirExprKind::Local(name.clone()),
                                ty.clone(),
                                span,
                            ))),
                        },
                        Type::unit(),
                        span,
                    ),
                    HirExpr::new(
                        HirExprKind::AssignLocal {
                            name,
                            value: Box::new(updated),
                        },
                        Type::unit(),
                        span,
                    ),
                    HirExpr::new(HirExprKind::Local(tmp), ty.clone(), span),
                ]),
                ty,
                span,
            )
        }
    }

    fn null_eq(&self, name: &str, ty: Type, span: Span) -> HirExpr {
        HirExpr::new(
            HirExprKind::Binary {
                op: MirBinOp::RefEq,
                lhs: Box::new(HirExpr::new(
                    HirExprKind::Local(name.to_string()),
                    ty,
                    span,
                )),
                rhs: Box::new(HirExpr::new(HirExprKind::ConstNull, Type::null(), span)),
            },
            Type::boolean(),
            span,
        )
    }

    /// `{ val tmp = target; if (tmp == null) null else access }`
    fn null_guard(
        &mut self,
        tmp: String,
        target: HirExpr,
        access: HirExpr,
        ty: Type,
        span: Span,
    ) -> HirExpr {
        let check = self.null_eq(&tmp, target.ty.clone(), span);
        HirExpr::new(
            HirExprKind::Block(vec![
                HirExpr::new(
                    HirExprKind::Let {
                        name: tmp,
                        mutable: false,
                        value: Some(Box::new(target)),
                    },
                    Type::unit(),
                    span,
                ),
                HirExpr::new(
                    HirExprKind::If {
                        cond: Box::new(check),
                        then_e: Box::new(HirExpr::new(
                            HirExprKind::ConstNull,
                            Type::null(),
                            span,
                        )),
                        else_e: Some(Box::new(access)),
                    },
                    ty.clone(),
                    span,
                ),
            ]),
            ty,
            span,
        )
    }

    fn lower_index_get(
        &mut self,
        target: HirExpr,
        index: HirExpr,
        ty: Type,
        span: Span,
    ) -> HirExpr {
        let class_name = target.ty.class_name().map(|s| s.to_string());
        match class_name.as_deref() {
            Some("List") | Some("Map") | Some("String") => HirExpr::new(
                HirExprKind::IndexGet {
                    target: Box::new(target),
                    index: Box::new(index),
                },
                ty,
                span,
            ),
            Some(owner) => HirExpr::new(
                HirExprKind::CallVirtual {
                    target: Box::new(target),
                    owner: owner.to_string(),
                    name: "get".to_string(),
                    args: vec![index],
                },
                ty,
                span,
            ),
            None => HirExpr::new(HirExprKind::Error, ty, span),
        }
    }

    fn lower_member(
        &mut self,
        e: &Expr,
        target: &Expr,
        name: &Ident,
        ty: Type,
        span: Span,
    ) -> HirExpr {
        match self.analysis.resolution(e.id) {
            Some(Resolution::EnumEntry { enum_name, entry }) => HirExpr::new(
                HirExprKind::GetStatic {
                    owner: enum_name.clone(),
                    name: entry.clone(),
                },
                ty,
                span,
            ),
            _ => {
                let target_hir = self.lower_expr(target);
                self.lower_member_on(e, target_hir, name, ty, span)
            }
        }
    }

    fn lower_member_on(
        &mut self,
        e: &Expr,
        target: HirExpr,
        name: &Ident,
        ty: Type,
        span: Span,
    ) -> HirExpr {
        match self.analysis.resolution(e.id) {
            Some(Resolution::Field { owner, name }) => HirExpr::new(
                HirExprKind::GetField {
                    target: Box::new(target),
                    owner: owner.clone(),
                    name: name.clone(),
                },
                ty,
                span,
            ),
            Some(Resolution::EnumEntry { enum_name, entry }) => HirExpr::new(
                HirExprKind::GetStatic {
                    owner: enum_name.clone(),
                    name: entry.clone(),
                },
                ty,
                span,
            ),
            _ => {
                // A method referenced as a value or an unknown member.
                let owner = target.ty.class_name().unwrap_or("Any").to_string();
                HirExpr::new(
                    HirExprKind::CallVirtual {
                        target: Box::new(target),
                        owner,
                        name: name.name.clone(),
                        args: Vec::new(),
                    },
                    ty,
                    span,
                )
            }
        }
    }

    fn lower_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> HirExpr {
        let value_hir = self.lower_expr(value);
        let target_ty = self.ty(target);

        // Compound forms read the target first.
        let combined = |lowerer: &mut Self, current: HirExpr, value_hir: HirExpr| -> HirExpr {
            let _ = lowerer;
            let mir_op = match op {
                AssignOp::AddAssign => MirBinOp::Add,
                AssignOp::SubAssign => MirBinOp::Sub,
                AssignOp::MulAssign => MirBinOp::Mul,
                AssignOp::DivAssign => MirBinOp::Div,
                AssignOp::RemAssign => MirBinOp::Rem,
                _ => MirBinOp::Add,
            };
            HirExpr::new(
                HirExprKind::Binary {
                    op: mir_op,
                    lhs: Box::new(current),
                    rhs: Box::new(value_hir),
                },
                target_ty.clone(),
                span,
            )
        };

        match &target.kind {
            ExprKind::Name(ident) => {
                let resolution = self.analysis.resolution(target.id).cloned();
                let current = || {
                    HirExpr::new(
                        HirExprKind::Local(ident.name.clone()),
                        target_ty.clone(),
                        span,
                    )
                };
                let new_value = match op {
                    AssignOp::Assign => value_hir,
                    AssignOp::CoalesceAssign => {
                        // x ??= v  ==>  if (x == null) x = v
                        let check = self.null_eq(&ident.name, target_ty.clone(), span);
                        let assign = HirExpr::new(
                            HirExprKind::AssignLocal {
                                name: ident.name.clone(),
                                value: Box::new(value_hir),
                            },
                            Type::unit(),
                            span,
                        );
                        return HirExpr::new(
                            HirExprKind::If {
                                cond: Box::new(check),
                                then_e: Box::new(assign),
                                else_e: None,
                            },
                            Type::unit(),
                            span,
                        );
                    }
                    _ => combined(self, current(), value_hir),
                };
                match resolution {
                    Some(Resolution::Global { name }) => HirExpr::new(
                        HirExprKind::AssignGlobal {
                            name,
                            value: Box::new(new_value),
                        },
                        Type::unit(),
                        span,
                    ),
                    Some(Resolution::Field { owner, name }) => HirExpr::new(
                        HirExprKind::SetField {
                            target: Box::new(HirExpr::new(
                                self.local_or_captured("this"),
                                Type::class(owner.clone()),
                                span,
                            )),
                            owner,
                            name,
                            value: Box::new(new_value),
                        },
                        Type::unit(),
                        span,
                    ),
                    _ => HirExpr::new(
                        HirExprKind::AssignLocal {
                            name: ident.name.clone(),
                            value: Box::new(new_value),
                        },
                        Type::unit(),
                        span,
                    ),
                }
            }
            ExprKind::Member { target: obj, name } => {
                let obj_hir = self.lower_expr(obj);
                let owner = match self.analysis.resolution(target.id) {
                    Some(Resolution::Field { owner, .. }) => owner.clone(),
                    _ => obj_hir.ty.class_name().unwrap_or("Any").to_string(),
                };
                let new_value = match op {
                    AssignOp::Assign => value_hir,
                    _ => {
                        let current = HirExpr::new(
                            HirExprKind::GetField {
                                target: Box::new(obj_hir.clone()),
                                owner: owner.clone(),
                                name: name.name.clone(),
                            },
                            target_ty.clone(),
                            span,
                        );
                        combined(self, current, value_hir)
                    }
                };
                HirExpr::new(
                    HirExprKind::SetField {
                        target: Box::new(obj_hir),
                        owner,
                        name: name.name.clone(),
                        value: Box::new(new_value),
                    },
                    Type::unit(),
                    span,
                )
            }
            ExprKind::Index { target: obj, indices } => {
                let obj_hir = self.lower_expr(obj);
                let index_hir = self.lower_expr(&indices[0]);
                let new_value = match op {
                    AssignOp::Assign => value_hir,
                    _ => {
                        let current = HirExpr::new(
                            HirExprKind::IndexGet {
                                target: Box::new(obj_hir.clone()),
                                index: Box::new(index_hir.clone()),
                            },
                            target_ty.clone(),
                            span,
                        );
                        combined(self, current, value_hir)
                    }
                };
                HirExpr::new(
                    HirExprKind::IndexSet {
                        target: Box::new(obj_hir),
                        index: Box::new(index_hir),
                        value: Box::new(new_value),
                    },
                    Type::unit(),
                    span,
                )
            }
            _ => HirExpr::new(HirExprKind::Error, Type::unit(), span),
        }
    }

    // ── Calls ──────────────────────────────────────────────────────────

    fn lower_call(
        &mut self,
        e: &Expr,
        callee: &Expr,
        args: &[CallArg],
        piped: Option<HirExpr>,
        ty: Type,
        span: Span,
    ) -> HirExpr {
        let resolution = self.analysis.resolution(callee.id).cloned();
        match resolution {
            Some(Resolution::TopLevelFunction { name }) => {
                let sig = self.signature_for(&name, None);
                let lowered = self.lower_args(args, sig.as_ref(), piped);
                HirExpr::new(
                    HirExprKind::CallStatic {
                        owner: MODULE_OWNER.to_string(),
                        name,
                        args: lowered,
                        special: SPECIAL_NONE,
                    },
                    ty,
                    span,
                )
            }
            Some(Resolution::Builtin { name }) => {
                let lowered = self.lower_args(args, None, piped);
                let special = match name.as_str() {
                    "readLine" => SPECIAL_ENV_ACCESS,
                    _ => SPECIAL_NONE,
                };
                HirExpr::new(
                    HirExprKind::CallStatic {
                        owner: BUILTINS_OWNER.to_string(),
                        name,
                        args: lowered,
                        special,
                    },
                    ty,
                    span,
                )
            }
            Some(Resolution::Constructor { class }) => {
                let sig = self
                    .analysis
                    .classes
                    .get(&class)
                    .and_then(|c| c.ctors.first().cloned());
                let lowered = self.lower_args(args, sig.as_ref(), piped);
                HirExpr::new(
                    HirExprKind::New {
                        class,
                        args: lowered,
                    },
                    ty,
                    span,
                )
            }
            Some(Resolution::Method { owner, name }) => {
                let is_interface = self
                    .analysis
                    .classes
                    .get(&owner)
                    .map(|c| c.kind == ClassKind::Interface)
                    .unwrap_or(false);
                let sig = self.signature_for(&name, Some(&owner));
                let lowered = self.lower_args(args, sig.as_ref(), piped);
                // The receiver is either explicit (member callee) or the
                // enclosing `this` (unqualified method call).
                let target = match &callee.kind {
                    ExprKind::Member { target, .. } | ExprKind::SafeMember { target, .. } => {
                        self.lower_expr(target)
                    }
                    _ => HirExpr::new(
                        self.local_or_captured("this"),
                        Type::class(owner.clone()),
                        span,
                    ),
                };
                let kind = if is_interface {
                    HirExprKind::CallInterface {
                        target: Box::new(target),
                        owner,
                        name,
                        args: lowered,
                    }
                } else {
                    HirExprKind::CallVirtual {
                        target: Box::new(target),
                        owner,
                        name,
                        args: lowered,
                    }
                };
                HirExpr::new(kind, ty, span)
            }
            Some(Resolution::ExtensionFunction { name }) => {
                let sig = self
                    .analysis
                    .functions
                    .get(&name)
                    .and_then(|g| g.iter().find(|s| s.receiver.is_some()).cloned());
                let receiver = match &callee.kind {
                    ExprKind::Member { target, .. } | ExprKind::SafeMember { target, .. } => {
                        self.lower_expr(target)
                    }
                    _ => HirExpr::new(self.local_or_captured("this"), Type::any(), span),
                };
                let mut lowered = self.lower_args(args, sig.as_ref(), piped);
                lowered.insert(0, receiver);
                HirExpr::new(
                    HirExprKind::CallStatic {
                        owner: MODULE_OWNER.to_string(),
                        name,
                        args: lowered,
                        special: SPECIAL_NONE,
                    },
                    ty,
                    span,
                )
            }
            Some(Resolution::Import { path }) => {
                let lowered = self.lower_args(args, None, piped);
                HirExpr::new(
                    HirExprKind::CallStatic {
                        owner: path,
                        name: last_segment(callee),
                        args: lowered,
                        special: SPECIAL_ENV_ACCESS,
                    },
                    ty,
                    span,
                )
            }
            _ => {
                // Calling a function value.
                let callee_hir = self.lower_expr(callee);
                let lowered = self.lower_args(args, None, piped);
                HirExpr::new(
                    HirExprKind::CallValue {
                        callee: Box::new(callee_hir),
                        args: lowered,
                    },
                    ty,
                    span,
                )
            }
        }
    }

    fn signature_for(&self, name: &str, owner: Option<&str>) -> Option<FunctionSig> {
        match owner {
            Some(owner) => self
                .analysis
                .classes
                .get(owner)
                .and_then(|c| c.methods_named(name).first().map(|s| (*s).clone())),
            None => self
                .analysis
                .functions
                .get(name)
                .and_then(|g| g.iter().find(|s| s.receiver.is_none()).cloned()),
        }
    }

    /// Order named arguments, substitute pipeline placeholders, and fill
    /// omitted parameters from the callee's default expressions.
    fn lower_args(
        &mut self,
        args: &[CallArg],
        sig: Option<&FunctionSig>,
        piped: Option<HirExpr>,
    ) -> Vec<HirExpr> {
        let mut piped = piped;
        let mut lower_one = |lowerer: &mut Self, arg: &CallArg| -> HirExpr {
            if matches!(arg.value.kind, ExprKind::Placeholder) {
                if let Some(p) = piped.take() {
                    return p;
                }
            }
            lowerer.lower_expr(&arg.value)
        };

        let Some(sig) = sig else {
            return args.iter().map(|a| lower_one(self, a)).collect();
        };

        let names: Vec<Option<String>> = args
            .iter()
            .map(|a| a.name.as_ref().map(|n| n.name.clone()))
            .collect();
        let Some(mapping) = map_args_to_params(sig, &names) else {
            return args.iter().map(|a| lower_one(self, a)).collect();
        };

        let mut slots: Vec<Option<HirExpr>> = vec![None; sig.params.len()];
        for (arg, &param_idx) in args.iter().zip(&mapping) {
            slots[param_idx] = Some(lower_one(self, arg));
        }

        // Defaults for the rest, evaluated left to right.
        let default_exprs = sig
            .decl_id
            .and_then(|id| self.fun_index.get(&id).cloned());
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let default = default_exprs
                .as_ref()
                .and_then(|f| f.params.get(i))
                .and_then(|p| p.default.as_ref());
            *slot = Some(match default {
                Some(expr) => self.lower_expr(expr),
                None => HirExpr::new(HirExprKind::ConstNull, Type::null(), Span::point(0)),
            });
        }
        slots.into_iter().flatten().collect()
    }

    // ── when ───────────────────────────────────────────────────────────

    fn lower_when(&mut self, when: &WhenExpr, ty: Type, span: Span) -> HirExpr {
        let mut prelude = Vec::new();
        let subject = when.subject.as_ref().map(|subject| {
            let value = self.lower_expr(&subject.expr);
            let subject_ty = value.ty.clone();
            let name = subject
                .binding
                .as_ref()
                .map(|b| b.name.clone())
                .unwrap_or_else(|| self.tmp_name("when"));
            prelude.push(HirExpr::new(
                HirExprKind::Let {
                    name: name.clone(),
                    mutable: false,
                    value: Some(Box::new(value)),
                },
                Type::unit(),
                span,
            ));
            (name, subject_ty)
        });

        // Build the cascade back-to-front.
        let mut chain: Option<HirExpr> = None;
        for branch in when.branches.iter().rev() {
            let body = self.lower_expr(&branch.body);
            let is_else = branch
                .conditions
                .iter()
                .any(|c| matches!(c, WhenCondition::Else));
            if is_else {
                chain = Some(body);
                continue;
            }
            let mut test: Option<HirExpr> = None;
            for condition in &branch.conditions {
                let this_test = self.lower_when_condition(condition, &subject, span);
                test = Some(match test {
                    None => this_test,
                    // Multiple conditions on one branch OR together.
                    Some(prev) => HirExpr::new(
                        HirExprKind::If {
                            cond: Box::new(prev),
                            then_e: Box::new(HirExpr::new(
                                HirExprKind::ConstBool(true),
                                Type::boolean(),
                                span,
                            )),
                            else_e: Some(Box::new(this_test)),
                        },
                        Type::boolean(),
                        span,
                    ),
                });
            }
            let test = test.unwrap_or_else(|| {
                HirExpr::new(HirExprKind::ConstBool(true), Type::boolean(), span)
            });
            chain = Some(HirExpr::new(
                HirExprKind::If {
                    cond: Box::new(test),
                    then_e: Box::new(body),
                    else_e: chain.map(Box::new),
                },
                ty.clone(),
                span,
            ));
        }

        let chain = chain.unwrap_or_else(|| HirExpr::unit(span));
        if prelude.is_empty() {
            chain
        } else {
            prelude.push(chain);
            HirExpr::new(HirExprKind::Block(prelude), ty, span)
        }
    }

    fn lower_when_condition(
        &mut self,
        condition: &WhenCondition,
        subject: &Option<(String, Type)>,
        span: Span,
    ) -> HirExpr {
        match condition {
            WhenCondition::Else => {
                HirExpr::new(HirExprKind::ConstBool(true), Type::boolean(), span)
            }
            WhenCondition::Expr(expr) => {
                let value = self.lower_expr(expr);
                match subject {
                    Some((name, subject_ty)) => HirExpr::new(
                        HirExprKind::Binary {
                            op: MirBinOp::Eq,
                            lhs: Box::new(HirExpr::new(
                                HirExprKind::Local(name.clone()),
                                subject_ty.clone(),
                                span,
                            )),
                            rhs: Box::new(value),
                        },
                        Type::boolean(),
                        span,
                    ),
                    None => value,
                }
            }
            WhenCondition::In { negated, expr } => {
                let range = self.lower_expr(expr);
                let owner = range.ty.class_name().unwrap_or("Any").to_string();
                let Some((name, subject_ty)) = subject else {
                    return HirExpr::new(HirExprKind::ConstBool(false), Type::boolean(), span);
                };
                let contains = HirExpr::new(
                    HirExprKind::CallVirtual {
                        target: Box::new(range),
                        owner,
                        name: "contains".to_string(),
                        args: vec![HirExpr::new(
                            HirExprKind::Local(name.clone()),
                            subject_ty.clone(),
                            span,
                        )],
                    },
                    Type::boolean(),
                    span,
                );
                if *negated {
                    HirExpr::new(
                        HirExprKind::Unary {
                            op: MirUnOp::Not,
                            operand: Box::new(contains),
                        },
                        Type::boolean(),
                        span,
                    )
                } else {
                    contains
                }
            }
            WhenCondition::Is { negated, ty } => {
                let Some((name, subject_ty)) = subject else {
                    return HirExpr::new(HirExprKind::ConstBool(false), Type::boolean(), span);
                };
                let check = HirExpr::new(
                    HirExprKind::TypeCheck {
                        operand: Box::new(HirExpr::new(
                            HirExprKind::Local(name.clone()),
                            subject_ty.clone(),
                            span,
                        )),
                        class: type_ref_name(ty),
                    },
                    Type::boolean(),
                    span,
                );
                if *negated {
                    HirExpr::new(
                        HirExprKind::Unary {
                            op: MirUnOp::Not,
                            operand: Box::new(check),
                        },
                        Type::boolean(),
                        span,
                    )
                } else {
                    check
                }
            }
        }
    }

    // ── Lambdas / closures ─────────────────────────────────────────────

    fn lower_lambda(
        &mut self,
        e: &Expr,
        params: &[Parameter],
        body: &Block,
        ty: Type,
        span: Span,
    ) -> HirExpr {
        let class_name = format!("$Lambda${}", *self.lambda_counter);
        *self.lambda_counter += 1;

        let (param_tys, ret_ty) = match &ty.kind {
            TypeKind::Function { params, ret, .. } => (params.clone(), (**ret).clone()),
            _ => (Vec::new(), Type::any()),
        };

        // Parameter names: explicit, or the implicit `it`.
        let mut hir_params = Vec::new();
        let mut bound: FxHashSet<String> = FxHashSet::default();
        if params.is_empty() && param_tys.len() == 1 {
            hir_params.push(HirParam {
                name: "it".to_string(),
                ty: param_tys[0].clone(),
            });
            bound.insert("it".to_string());
        } else {
            for (i, p) in params.iter().enumerate() {
                let pty = param_tys
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| self.analysis.type_of(p.id));
                hir_params.push(HirParam {
                    name: p.name.name.clone(),
                    ty: pty,
                });
                bound.insert(p.name.name.clone());
            }
        }

        // Free variables become capture fields.
        let mut free: FxHashMap<String, Type> = FxHashMap::default();
        collect_free_in_block(self.analysis, body, &mut bound.clone(), &mut free);
        let captures: Vec<(String, Type)> = {
            let mut v: Vec<_> = free.into_iter().collect();
            v.sort_by(|a, b| a.0.cmp(&b.0));
            v
        };

        // Lower the body with captured names routed through `this`.
        self.capture_stack
            .push(captures.iter().map(|(n, _)| n.clone()).collect());
        self.enclosing_ret.push(ret_ty.clone());
        let body_hir = self.lower_block_value(body, ret_ty.clone());
        self.enclosing_ret.pop();
        self.capture_stack.pop();

        let invoke = HirFunction {
            name: "invoke".to_string(),
            owner: Some(class_name.clone()),
            params: hir_params,
            ret: ret_ty,
            body: Some(body_hir),
            is_static: false,
            is_inline: false,
            reified: Vec::new(),
            span,
        };

        self.lifted.push(HirClass {
            name: class_name.clone(),
            kind: HirClassKind::Lambda,
            super_class: None,
            interfaces: vec!["Function".to_string()],
            fields: captures
                .iter()
                .map(|(name, ty)| HirField {
                    name: name.clone(),
                    ty: ty.clone(),
                    mutable: false,
                })
                .collect(),
            methods: vec![invoke],
            enum_entries: Vec::new(),
            span,
        });

        let capture_exprs = captures
            .into_iter()
            .map(|(name, cty)| {
                let read = self.local_or_captured(&name);
                (name, HirExpr::new(read, cty, span))
            })
            .collect();
        let _ = e;
        HirExpr::new(
            HirExprKind::NewClosure {
                class: class_name,
                captures: capture_exprs,
            },
            ty,
            span,
        )
    }

    fn lower_method_ref(
        &mut self,
        e: &Expr,
        target: &Expr,
        name: &Ident,
        ty: Type,
        span: Span,
    ) -> HirExpr {
        // Constructor and type-target references go through the
        // partial-application trampoline; instance references capture the
        // receiver in a closure-like bind call.
        let desc = match self.analysis.resolution(e.id) {
            Some(Resolution::Constructor { class }) => format!("{class}|<init>"),
            Some(Resolution::Method { owner, name }) => format!("{owner}|{name}"),
            _ => format!("?|{}", name.name),
        };
        let mut args = vec![HirExpr::new(
            HirExprKind::ConstStr(desc),
            Type::string(),
            span,
        )];
        // Instance target: bind the receiver.
        if !matches!(
            self.analysis.resolution(target.id),
            Some(Resolution::Class { .. })
        ) {
            args.push(self.lower_expr(target));
        }
        HirExpr::new(
            HirExprKind::CallStatic {
                owner: BUILTINS_OWNER.to_string(),
                name: "bindMethod".to_string(),
                args,
                special: crate::mir::SPECIAL_PARTIAL_APPLY,
            },
            ty,
            span,
        )
    }

    fn lower_object_literal(
        &mut self,
        _e: &Expr,
        members: &[Member],
        ty: Type,
        span: Span,
    ) -> HirExpr {
        let class_name = format!("$Anon${}", *self.lambda_counter);
        *self.lambda_counter += 1;
        let mut methods = Vec::new();
        let mut fields = Vec::new();
        for member in members {
            match member {
                Member::Fun(f) => methods.push(self.lower_function(f, Some(&class_name))),
                Member::Property(p) => fields.push(HirField {
                    name: p.name.name.clone(),
                    ty: self.analysis.type_of(p.id),
                    mutable: p.mutable,
                }),
                _ => {}
            }
        }
        self.lifted.push(HirClass {
            name: class_name.clone(),
            kind: HirClassKind::Class,
            super_class: ty.class_name().map(str::to_string),
            interfaces: Vec::new(),
            fields,
            methods,
            enum_entries: Vec::new(),
            span,
        });
        HirExpr::new(
            HirExprKind::New {
                class: class_name,
                args: Vec::new(),
            },
            ty,
            span,
        )
    }

    fn lower_collection(
        &mut self,
        kind: CollectionKind,
        elements: &[Expr],
        entries: &[(Expr, Expr)],
        ty: Type,
        span: Span,
    ) -> HirExpr {
        let class = match kind {
            CollectionKind::List => "List",
            CollectionKind::Set => "Set",
            CollectionKind::Map => "Map",
        };
        let tmp = self.tmp_name("coll");
        let mut exprs = vec![HirExpr::new(
            HirExprKind::Let {
                name: tmp.clone(),
                mutable: false,
                value: Some(Box::new(HirExpr::new(
                    HirExprKind::New {
                        class: class.to_string(),
                        args: Vec::new(),
                    },
                    ty.clone(),
                    span,
                ))),
            },
            Type::unit(),
            span,
        )];
        let tmp_ref = |lowerer: &Self, ty: &Type| {
            let _ = lowerer;
            HirExpr::new(HirExprKind::Local(tmp.clone()), ty.clone(), span)
        };
        match kind {
            CollectionKind::List | CollectionKind::Set => {
                for element in elements {
                    if let ExprKind::Spread { operand } = &element.kind {
                        let spread = self.lower_expr(operand);
                        exprs.push(HirExpr::new(
                            HirExprKind::CallVirtual {
                                target: Box::new(tmp_ref(self, &ty)),
                                owner: class.to_string(),
                                name: "addAll".to_string(),
                                args: vec![spread],
                            },
                            Type::unit(),
                            span,
                        ));
                    } else {
                        let value = self.lower_expr(element);
                        exprs.push(HirExpr::new(
                            HirExprKind::CallVirtual {
                                target: Box::new(tmp_ref(self, &ty)),
                                owner: class.to_string(),
                                name: "add".to_string(),
                                args: vec![value],
                            },
                            Type::unit(),
                            span,
                        ));
                    }
                }
            }
            CollectionKind::Map => {
                for (key, value) in entries {
                    let key_hir = self.lower_expr(key);
                    let value_hir = self.lower_expr(value);
                    exprs.push(HirExpr::new(
                        HirExprKind::IndexSet {
                            target: Box::new(tmp_ref(self, &ty)),
                            index: Box::new(key_hir),
                            value: Box::new(value_hir),
                        },
                        Type::unit(),
                        span,
                    ));
                }
            }
        }
        exprs.push(tmp_ref(self, &ty));
        HirExpr::new(HirExprKind::Block(exprs), ty, span)
    }

    /// Interpolation becomes a left-to-right `+` chain with `toString()`
    /// on non-string parts.
    fn lower_interp(&mut self, parts: &[InterpPart], span: Span) -> HirExpr {
        let mut acc: Option<HirExpr> = None;
        for part in parts {
            let piece = match part {
                InterpPart::Lit(text) => HirExpr::new(
                    HirExprKind::ConstStr(text.clone()),
                    Type::string(),
                    span,
                ),
                InterpPart::Expr(expr) => {
                    let value = self.lower_expr(expr);
                    if value.ty.is_string() && !value.ty.nullable {
                        value
                    } else {
                        let owner = value.ty.class_name().unwrap_or("Any").to_string();
                        HirExpr::new(
                            HirExprKind::CallVirtual {
                                target: Box::new(value),
                                owner,
                                name: "toString".to_string(),
                                args: Vec::new(),
                            },
                            Type::string(),
                            span,
                        )
                    }
                }
            };
            acc = Some(match acc {
                None => piece,
                Some(prev) => HirExpr::new(
                    HirExprKind::Binary {
                        op: MirBinOp::Add,
                        lhs: Box::new(prev),
                        rhs: Box::new(piece),
                    },
                    Type::string(),
                    span,
                ),
            });
        }
        acc.unwrap_or_else(|| {
            HirExpr::new(HirExprKind::ConstStr(String::new()), Type::string(), span)
        })
    }
}

// ── Free helpers ───────────────────────────────────────────────────────

fn this_expr(class: &str, span: Span) -> HirExpr {
    HirExpr::new(
        HirExprKind::Local("this".to_string()),
        Type::class(class),
        span,
    )
}

fn type_ref_name(ty: &TypeRef) -> String {
    match &ty.kind {
        TypeRefKind::Simple { name } => name.clone(),
        TypeRefKind::Generic { name, .. } => name.clone(),
        TypeRefKind::Nullable(inner) => type_ref_name(inner),
        TypeRefKind::Function { .. } => "Function".to_string(),
    }
}

fn last_segment(callee: &Expr) -> String {
    match &callee.kind {
        ExprKind::Name(ident) => ident.name.clone(),
        ExprKind::Member { name, .. } => name.name.clone(),
        _ => "invoke".to_string(),
    }
}

/// Collect free variables of a lambda body: names that resolve to locals
/// or parameters of an enclosing function. `bound` holds names introduced
/// inside the lambda itself.
fn collect_free_in_block(
    analysis: &Analysis,
    block: &Block,
    bound: &mut FxHashSet<String>,
    out: &mut FxHashMap<String, Type>,
) {
    for stmt in &block.stmts {
        collect_free_in_stmt(analysis, stmt, bound, out);
    }
}

fn collect_free_in_stmt(
    analysis: &Analysis,
    stmt: &Stmt,
    bound: &mut FxHashSet<String>,
    out: &mut FxHashMap<String, Type>,
) {
    match stmt {
        Stmt::Expr(e) => collect_free_in_expr(analysis, e, bound, out),
        Stmt::Decl(decl) => match decl.as_ref() {
            Decl::Property(p) => {
                if let Some(init) = &p.initializer {
                    collect_free_in_expr(analysis, init, bound, out);
                }
                bound.insert(p.name.name.clone());
            }
            Decl::Destructuring(d) => {
                collect_free_in_expr(analysis, &d.initializer, bound, out);
                for name in d.names.iter().flatten() {
                    bound.insert(name.name.clone());
                }
            }
            _ => {}
        },
        Stmt::If(i) => {
            collect_free_in_expr(analysis, &i.cond, bound, out);
            collect_free_in_block(analysis, &i.then_block, &mut bound.clone(), out);
            match &i.else_branch {
                Some(ElseBranch::Block(b)) => {
                    collect_free_in_block(analysis, b, &mut bound.clone(), out)
                }
                Some(ElseBranch::If(nested)) => {
                    collect_free_in_stmt(analysis, &Stmt::If((**nested).clone()), bound, out)
                }
                None => {}
            }
        }
        Stmt::When(w) => {
            if let Some(subject) = &w.when.subject {
                collect_free_in_expr(analysis, &subject.expr, bound, out);
            }
            for branch in &w.when.branches {
                for condition in &branch.conditions {
                    match condition {
                        WhenCondition::Expr(e) | WhenCondition::In { expr: e, .. } => {
                            collect_free_in_expr(analysis, e, bound, out)
                        }
                        _ => {}
                    }
                }
                collect_free_in_expr(analysis, &branch.body, &mut bound.clone(), out);
            }
        }
        Stmt::For(f) => {
            collect_free_in_expr(analysis, &f.iterable, bound, out);
            let mut inner = bound.clone();
            for binding in f.bindings.iter().flatten() {
                inner.insert(binding.name.clone());
            }
            collect_free_in_block(analysis, &f.body, &mut inner, out);
        }
        Stmt::While(w) => {
            collect_free_in_expr(analysis, &w.cond, bound, out);
            collect_free_in_block(analysis, &w.body, &mut bound.clone(), out);
        }
        Stmt::DoWhile(d) => {
            collect_free_in_block(analysis, &d.body, &mut bound.clone(), out);
            collect_free_in_expr(analysis, &d.cond, bound, out);
        }
        Stmt::Try(t) => {
            collect_free_in_block(analysis, &t.body, &mut bound.clone(), out);
            for catch in &t.catches {
                let mut inner = bound.clone();
                inner.insert(catch.param.name.name.clone());
                collect_free_in_block(analysis, &catch.body, &mut inner, out);
            }
            if let Some(finally) = &t.finally {
                collect_free_in_block(analysis, finally, &mut bound.clone(), out);
            }
        }
        Stmt::Return(r) => {
            if let Some(value) = &r.value {
                collect_free_in_expr(analysis, value, bound, out);
            }
        }
        Stmt::Throw(t) => collect_free_in_expr(analysis, &t.value, bound, out),
        Stmt::Guard(g) => {
            collect_free_in_expr(analysis, &g.cond, bound, out);
            collect_free_in_block(analysis, &g.else_block, &mut bound.clone(), out);
        }
        Stmt::Use(u) => {
            let mut inner = bound.clone();
            for binding in &u.bindings {
                collect_free_in_expr(analysis, &binding.init, &mut inner, out);
                inner.insert(binding.name.name.clone());
            }
            collect_free_in_block(analysis, &u.body, &mut inner, out);
        }
        Stmt::Block(b) => collect_free_in_block(analysis, b, &mut bound.clone(), out),
        Stmt::Break(_) | Stmt::Continue(_) => {}
    }
}

fn collect_free_in_expr(
    analysis: &Analysis,
    e: &Expr,
    bound: &mut FxHashSet<String>,
    out: &mut FxHashMap<String, Type>,
) {
    match &e.kind {
        ExprKind::Name(ident) => {
            let is_outer_local = matches!(
                analysis.resolution(e.id),
                Some(Resolution::Local) | Some(Resolution::Parameter)
            );
            if is_outer_local && !bound.contains(&ident.name) {
                out.entry(ident.name.clone())
                    .or_insert_with(|| analysis.type_of(e.id));
            }
        }
        ExprKind::This { .. } => {
            if !bound.contains("this") {
                out.entry("this".to_string())
                    .or_insert_with(|| analysis.type_of(e.id));
            }
        }
        ExprKind::Literal(_)
        | ExprKind::Super { .. }
        | ExprKind::Placeholder
        | ExprKind::Error => {}
        ExprKind::Binary { lhs, rhs, .. }
        | ExprKind::InfixCall { lhs, rhs, .. }
        | ExprKind::Elvis { lhs, rhs }
        | ExprKind::Pipeline { lhs, rhs }
        | ExprKind::Range { lhs, rhs, .. } => {
            collect_free_in_expr(analysis, lhs, bound, out);
            collect_free_in_expr(analysis, rhs, bound, out);
            if let ExprKind::Range {
                step: Some(step), ..
            } = &e.kind
            {
                collect_free_in_expr(analysis, step, bound, out);
            }
        }
        ExprKind::Unary { operand, .. }
        | ExprKind::Postfix { operand, .. }
        | ExprKind::NotNull { operand }
        | ExprKind::Propagate { operand }
        | ExprKind::Spread { operand }
        | ExprKind::Cast { operand, .. }
        | ExprKind::TypeCheck { operand, .. }
        | ExprKind::Await { operand } => collect_free_in_expr(analysis, operand, bound, out),
        ExprKind::Call { callee, args, .. } => {
            collect_free_in_expr(analysis, callee, bound, out);
            for arg in args {
                collect_free_in_expr(analysis, &arg.value, bound, out);
            }
        }
        ExprKind::Index { target, indices } | ExprKind::SafeIndex { target, indices } => {
            collect_free_in_expr(analysis, target, bound, out);
            for index in indices {
                collect_free_in_expr(analysis, index, bound, out);
            }
        }
        ExprKind::Slice {
            target, start, end, ..
        } => {
            collect_free_in_expr(analysis, target, bound, out);
            if let Some(start) = start {
                collect_free_in_expr(analysis, start, bound, out);
            }
            if let Some(end) = end {
                collect_free_in_expr(analysis, end, bound, out);
            }
        }
        ExprKind::Member { target, .. }
        | ExprKind::SafeMember { target, .. }
        | ExprKind::MethodRef { target, .. } => {
            collect_free_in_expr(analysis, target, bound, out)
        }
        ExprKind::SafeBlock { target, block } => {
            collect_free_in_expr(analysis, target, bound, out);
            collect_free_in_block(analysis, block, &mut bound.clone(), out);
        }
        ExprKind::Assign { target, value, .. } => {
            collect_free_in_expr(analysis, target, bound, out);
            collect_free_in_expr(analysis, value, bound, out);
        }
        ExprKind::Lambda { params, body } => {
            let mut inner = bound.clone();
            for p in params {
                inner.insert(p.name.name.clone());
            }
            collect_free_in_block(analysis, body, &mut inner, out);
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_free_in_expr(analysis, cond, bound, out);
            collect_free_in_expr(analysis, then_branch, bound, out);
            if let Some(else_branch) = else_branch {
                collect_free_in_expr(analysis, else_branch, bound, out);
            }
        }
        ExprKind::When(when) => {
            if let Some(subject) = &when.subject {
                collect_free_in_expr(analysis, &subject.expr, bound, out);
            }
            for branch in &when.branches {
                for condition in &branch.conditions {
                    match condition {
                        WhenCondition::Expr(c) | WhenCondition::In { expr: c, .. } => {
                            collect_free_in_expr(analysis, c, bound, out)
                        }
                        _ => {}
                    }
                }
                collect_free_in_expr(analysis, &branch.body, &mut bound.clone(), out);
            }
        }
        ExprKind::Try {
            body,
            catches,
            finally,
        } => {
            collect_free_in_block(analysis, body, &mut bound.clone(), out);
            for catch in catches {
                let mut inner = bound.clone();
                inner.insert(catch.param.name.name.clone());
                collect_free_in_block(analysis, &catch.body, &mut inner, out);
            }
            if let Some(finally) = finally {
                collect_free_in_block(analysis, finally, &mut bound.clone(), out);
            }
        }
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => {
            collect_free_in_expr(analysis, cond, bound, out);
            collect_free_in_expr(analysis, then_expr, bound, out);
            collect_free_in_expr(analysis, else_expr, bound, out);
        }
        ExprKind::Block(block) => collect_free_in_block(analysis, block, &mut bound.clone(), out),
        ExprKind::ObjectLiteral { members, .. } => {
            for member in members {
                if let Member::Property(p) = member {
                    if let Some(init) = &p.initializer {
                        collect_free_in_expr(analysis, init, bound, out);
                    }
                }
            }
        }
        ExprKind::CollectionLiteral {
            elements, entries, ..
        } => {
            for element in elements {
                collect_free_in_expr(analysis, element, bound, out);
            }
            for (k, v) in entries {
                collect_free_in_expr(analysis, k, bound, out);
                collect_free_in_expr(analysis, v, bound, out);
            }
        }
        ExprKind::StringInterp { parts } => {
            for part in parts {
                if let InterpPart::Expr(inner) = part {
                    collect_free_in_expr(analysis, inner, bound, out);
                }
            }
        }
        ExprKind::Jump { kind, .. } => match kind {
            JumpKind::Return(Some(value)) => collect_free_in_expr(analysis, value, bound, out),
            JumpKind::Throw(value) => collect_free_in_expr(analysis, value, bound, out),
            _ => {}
        },
    }
}
