//! HIR-level optimizations, in fixed order: inline expansion (declared
//! `inline` or heuristically small), constant folding, dead-code
//! elimination on the tree.

use rustc_hash::FxHashMap;

use opal_sema::Type;

use crate::mir::{MirBinOp, MirUnOp};

use super::lower::MODULE_OWNER;
use super::{HirExpr, HirExprKind, HirFunction, HirModule};

/// Maximum node count for heuristic inlining.
const INLINE_NODE_LIMIT: usize = 8;

pub fn optimize(module: &mut HirModule) {
    let inlinable = collect_inlinable(module);

    for function in module.functions.iter_mut() {
        if let Some(body) = function.body.as_mut() {
            inline_expr(body, &inlinable, &mut 0);
            fold_expr(body);
            dce_expr(body);
        }
    }
    for class in module.classes.iter_mut() {
        for method in class.methods.iter_mut() {
            if let Some(body) = method.body.as_mut() {
                inline_expr(body, &inlinable, &mut 0);
                fold_expr(body);
                dce_expr(body);
            }
        }
    }
    for global in module.globals.iter_mut() {
        if let Some(init) = global.init.as_mut() {
            fold_expr(init);
        }
    }
}

// ── Inline expansion ───────────────────────────────────────────────────

/// Non-recursive, side-effect-free top-level functions whose body is a
/// single returned expression: either declared `inline` (no size cap) or
/// heuristically small.
fn collect_inlinable(module: &HirModule) -> FxHashMap<String, HirFunction> {
    let mut out = FxHashMap::default();
    for function in &module.functions {
        let Some(body) = &function.body else { continue };
        let Some(expr) = single_value(body) else { continue };
        if !function.is_inline && count_nodes(expr) > INLINE_NODE_LIMIT {
            continue;
        }
        if !is_inline_safe(expr, &function.name) {
            continue;
        }
        out.insert(function.name.clone(), function.clone());
    }
    out
}

/// The single returned expression of a function body, if it has that
/// shape.
fn single_value(body: &HirExpr) -> Option<&HirExpr> {
    match &body.kind {
        HirExprKind::Return { value: Some(v) } => Some(v),
        HirExprKind::Block(exprs) if exprs.len() == 1 => single_value(&exprs[0]),
        HirExprKind::Block(_) => None,
        _ => Some(body),
    }
}

fn count_nodes(e: &HirExpr) -> usize {
    let mut count = 1;
    walk_children(e, &mut |child| count += count_nodes(child));
    count
}

/// Pure expression shapes over locals/constants; no calls (so recursion is
/// impossible), no assignments, no control transfer.
fn is_inline_safe(e: &HirExpr, self_name: &str) -> bool {
    let mut ok = matches!(
        e.kind,
        HirExprKind::Local(_)
            | HirExprKind::ConstInt(_)
            | HirExprKind::ConstLong(_)
            | HirExprKind::ConstFloat(_)
            | HirExprKind::ConstDouble(_)
            | HirExprKind::ConstBool(_)
            | HirExprKind::ConstChar(_)
            | HirExprKind::ConstStr(_)
            | HirExprKind::ConstNull
            | HirExprKind::Binary { .. }
            | HirExprKind::Unary { .. }
            | HirExprKind::If { .. }
    );
    if !ok {
        return false;
    }
    walk_children(e, &mut |child| {
        if !is_inline_safe(child, self_name) {
            ok = false;
        }
    });
    ok
}

fn inline_expr(
    e: &mut HirExpr,
    inlinable: &FxHashMap<String, HirFunction>,
    counter: &mut u32,
) {
    walk_children_mut(e, &mut |child| inline_expr(child, inlinable, counter));

    let HirExprKind::CallStatic {
        owner,
        name,
        args,
        special,
    } = &mut e.kind
    else {
        return;
    };
    if owner != MODULE_OWNER || *special != 0 {
        return;
    }
    let Some(callee) = inlinable.get(name) else { return };
    if callee.params.len() != args.len() {
        return;
    }

    // Bind arguments to fresh temporaries, then substitute parameter
    // references in a copy of the body.
    let n = *counter;
    *counter += 1;
    let mut exprs = Vec::with_capacity(args.len() + 1);
    let mut renames: FxHashMap<String, String> = FxHashMap::default();
    for (param, arg) in callee.params.iter().zip(args.drain(..)) {
        let temp = format!("$inl{n}_{}", param.name);
        renames.insert(param.name.clone(), temp.clone());
        exprs.push(HirExpr::new(
            HirExprKind::Let {
                name: temp,
                mutable: false,
                value: Some(Box::new(arg)),
            },
            Type::unit(),
            e.span,
        ));
    }
    let mut body = single_value(callee.body.as_ref().expect("inlinable has a body"))
        .expect("inlinable body is a single value")
        .clone();
    rename_locals(&mut body, &renames);
    exprs.push(body);
    let ty = e.ty.clone();
    let span = e.span;
    *e = HirExpr::new(HirExprKind::Block(exprs), ty, span);
}

fn rename_locals(e: &mut HirExpr, renames: &FxHashMap<String, String>) {
    if let HirExprKind::Local(name) = &mut e.kind {
        if let Some(new) = renames.get(name) {
            *name = new.clone();
        }
    }
    walk_children_mut(e, &mut |child| rename_locals(child, renames));
}

// ── Constant folding ───────────────────────────────────────────────────

pub(crate) fn fold_expr(e: &mut HirExpr) {
    walk_children_mut(e, &mut |child| fold_expr(child));

    match &e.kind {
        HirExprKind::Binary { op, lhs, rhs } => {
            if let Some(folded) = fold_binary(*op, lhs, rhs) {
                e.kind = folded;
            }
        }
        HirExprKind::Unary { op, operand } => match (&operand.kind, op) {
            (HirExprKind::ConstBool(v), MirUnOp::Not) => {
                e.kind = HirExprKind::ConstBool(!v);
            }
            (HirExprKind::ConstInt(v), MirUnOp::Neg) => {
                e.kind = HirExprKind::ConstInt(-v);
            }
            (HirExprKind::ConstLong(v), MirUnOp::Neg) => {
                e.kind = HirExprKind::ConstLong(-v);
            }
            (HirExprKind::ConstDouble(v), MirUnOp::Neg) => {
                e.kind = HirExprKind::ConstDouble(-v);
            }
            _ => {}
        },
        HirExprKind::If {
            cond,
            then_e,
            else_e,
        } => {
            // A literal condition selects its branch statically.
            if let HirExprKind::ConstBool(v) = cond.kind {
                let replacement = if v {
                    (**then_e).clone()
                } else if let Some(else_e) = else_e {
                    (**else_e).clone()
                } else {
                    HirExpr::unit(e.span)
                };
                *e = replacement;
            }
        }
        _ => {}
    }
}

fn fold_binary(op: MirBinOp, lhs: &HirExpr, rhs: &HirExpr) -> Option<HirExprKind> {
    use HirExprKind::*;
    match (&lhs.kind, &rhs.kind) {
        (ConstInt(a), ConstInt(b)) => fold_int(op, *a, *b, false),
        (ConstLong(a), ConstLong(b)) | (ConstLong(a), ConstInt(b)) | (ConstInt(a), ConstLong(b)) => {
            fold_int(op, *a, *b, true)
        }
        (ConstDouble(a), ConstDouble(b)) => fold_float(op, *a, *b),
        (ConstBool(a), ConstBool(b)) => match op {
            MirBinOp::Eq => Some(ConstBool(a == b)),
            MirBinOp::Ne => Some(ConstBool(a != b)),
            _ => None,
        },
        (ConstStr(a), ConstStr(b)) => match op {
            MirBinOp::Add => Some(ConstStr(format!("{a}{b}"))),
            MirBinOp::Eq => Some(ConstBool(a == b)),
            MirBinOp::Ne => Some(ConstBool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

fn fold_int(op: MirBinOp, a: i64, b: i64, long: bool) -> Option<HirExprKind> {
    use HirExprKind::{ConstBool, ConstInt, ConstLong};
    let wrap = |v: i64| if long { ConstLong(v) } else { ConstInt(v) };
    Some(match op {
        MirBinOp::Add => wrap(a.wrapping_add(b)),
        MirBinOp::Sub => wrap(a.wrapping_sub(b)),
        MirBinOp::Mul => wrap(a.wrapping_mul(b)),
        // Division by a literal zero is left for the runtime to fault on.
        MirBinOp::Div if b != 0 => wrap(a.wrapping_div(b)),
        MirBinOp::Rem if b != 0 => wrap(a.wrapping_rem(b)),
        MirBinOp::Eq => ConstBool(a == b),
        MirBinOp::Ne => ConstBool(a != b),
        MirBinOp::Lt => ConstBool(a < b),
        MirBinOp::Le => ConstBool(a <= b),
        MirBinOp::Gt => ConstBool(a > b),
        MirBinOp::Ge => ConstBool(a >= b),
        _ => return None,
    })
}

fn fold_float(op: MirBinOp, a: f64, b: f64) -> Option<HirExprKind> {
    use HirExprKind::{ConstBool, ConstDouble};
    Some(match op {
        MirBinOp::Add => ConstDouble(a + b),
        MirBinOp::Sub => ConstDouble(a - b),
        MirBinOp::Mul => ConstDouble(a * b),
        MirBinOp::Div => ConstDouble(a / b),
        MirBinOp::Eq => ConstBool(a == b),
        MirBinOp::Ne => ConstBool(a != b),
        MirBinOp::Lt => ConstBool(a < b),
        MirBinOp::Le => ConstBool(a <= b),
        MirBinOp::Gt => ConstBool(a > b),
        MirBinOp::Ge => ConstBool(a >= b),
        _ => return None,
    })
}

// ── Dead-code elimination ──────────────────────────────────────────────

pub(crate) fn dce_expr(e: &mut HirExpr) {
    walk_children_mut(e, &mut |child| dce_expr(child));

    if let HirExprKind::Block(exprs) = &mut e.kind {
        // Statements after an unconditional jump never run.
        if let Some(pos) = exprs.iter().position(|x| x.kind.diverges()) {
            exprs.truncate(pos + 1);
        }

        // Remove bindings whose name is never read in the rest of the
        // block (pure initializers only).
        let mut kept: Vec<HirExpr> = Vec::with_capacity(exprs.len());
        for i in 0..exprs.len() {
            let is_last = i + 1 == exprs.len();
            let mut drop_it = false;
            if !is_last {
                if let HirExprKind::Let { name, value, .. } = &exprs[i].kind {
                    let pure = value
                        .as_ref()
                        .map(|v| v.kind.is_pure())
                        .unwrap_or(true);
                    if pure {
                        let mut used = false;
                        for later in &exprs[i + 1..] {
                            if reads_local(later, name) {
                                used = true;
                                break;
                            }
                        }
                        drop_it = !used;
                    }
                }
            }
            if !drop_it {
                kept.push(exprs[i].clone());
            }
        }
        *exprs = kept;
    }
}

fn reads_local(e: &HirExpr, name: &str) -> bool {
    let mut found = match &e.kind {
        HirExprKind::Local(n) => n == name,
        HirExprKind::AssignLocal { name: n, .. } => n == name,
        HirExprKind::NewClosure { captures, .. } => {
            captures.iter().any(|(_, c)| reads_local(c, name))
        }
        _ => false,
    };
    if !found {
        walk_children(e, &mut |child| {
            if reads_local(child, name) {
                found = true;
            }
        });
    }
    found
}

// ── Traversal plumbing ─────────────────────────────────────────────────

fn walk_children(e: &HirExpr, f: &mut impl FnMut(&HirExpr)) {
    use HirExprKind::*;
    match &e.kind {
        Let { value, .. } => {
            if let Some(value) = value {
                f(value);
            }
        }
        AssignLocal { value, .. } | AssignGlobal { value, .. } => f(value),
        GetField { target, .. } => f(target),
        SetField { target, value, .. } => {
            f(target);
            f(value);
        }
        Binary { lhs, rhs, .. } => {
            f(lhs);
            f(rhs);
        }
        Unary { operand, .. } => f(operand),
        If {
            cond,
            then_e,
            else_e,
        } => {
            f(cond);
            f(then_e);
            if let Some(else_e) = else_e {
                f(else_e);
            }
        }
        While { cond, body, .. } => {
            f(cond);
            f(body);
        }
        DoWhile { body, cond, .. } => {
            f(body);
            f(cond);
        }
        For {
            cond, update, body, ..
        } => {
            f(cond);
            f(update);
            f(body);
        }
        Return { value: Some(value) } => f(value),
        Throw { value } => f(value),
        Try {
            body,
            catches,
            finally,
        } => {
            f(body);
            for catch in catches {
                f(&catch.body);
            }
            if let Some(finally) = finally {
                f(finally);
            }
        }
        Block(exprs) => {
            for expr in exprs {
                f(expr);
            }
        }
        New { args, .. } | CallStatic { args, .. } => {
            for arg in args {
                f(arg);
            }
        }
        NewClosure { captures, .. } => {
            for (_, capture) in captures {
                f(capture);
            }
        }
        CallVirtual { target, args, .. }
        | CallInterface { target, args, .. }
        | CallSpecial { target, args, .. } => {
            f(target);
            for arg in args {
                f(arg);
            }
        }
        CallValue { callee, args } => {
            f(callee);
            for arg in args {
                f(arg);
            }
        }
        IndexGet { target, index } => {
            f(target);
            f(index);
        }
        IndexSet {
            target,
            index,
            value,
        } => {
            f(target);
            f(index);
            f(value);
        }
        TypeCheck { operand, .. } | TypeCast { operand, .. } => f(operand),
        _ => {}
    }
}

fn walk_children_mut(e: &mut HirExpr, f: &mut impl FnMut(&mut HirExpr)) {
    use HirExprKind::*;
    match &mut e.kind {
        Let { value, .. } => {
            if let Some(value) = value {
                f(value);
            }
        }
        AssignLocal { value, .. } | AssignGlobal { value, .. } => f(value),
        GetField { target, .. } => f(target),
        SetField { target, value, .. } => {
            f(target);
            f(value);
        }
        Binary { lhs, rhs, .. } => {
            f(lhs);
            f(rhs);
        }
        Unary { operand, .. } => f(operand),
        If {
            cond,
            then_e,
            else_e,
        } => {
            f(cond);
            f(then_e);
            if let Some(else_e) = else_e {
                f(else_e);
            }
        }
        While { cond, body, .. } => {
            f(cond);
            f(body);
        }
        DoWhile { body, cond, .. } => {
            f(body);
            f(cond);
        }
        For {
            cond, update, body, ..
        } => {
            f(cond);
            f(update);
            f(body);
        }
        Return { value: Some(value) } => f(value),
        Throw { value } => f(value),
        Try {
            body,
            catches,
            finally,
        } => {
            f(body);
            for catch in catches {
                f(&mut catch.body);
            }
            if let Some(finally) = finally {
                f(finally);
            }
        }
        Block(exprs) => {
            for expr in exprs {
                f(expr);
            }
        }
        New { args, .. } | CallStatic { args, .. } => {
            for arg in args {
                f(arg);
            }
        }
        NewClosure { captures, .. } => {
            for (_, capture) in captures {
                f(capture);
            }
        }
        CallVirtual { target, args, .. }
        | CallInterface { target, args, .. }
        | CallSpecial { target, args, .. } => {
            f(target);
            for arg in args {
                f(arg);
            }
        }
        CallValue { callee, args } => {
            f(callee);
            for arg in args {
                f(arg);
            }
        }
        IndexGet { target, index } => {
            f(target);
            f(index);
        }
        IndexSet {
            target,
            index,
            value,
        } => {
            f(target);
            f(index);
            f(value);
        }
        TypeCheck { operand, .. } | TypeCast { operand, .. } => f(operand),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_common::span::Span;

    fn sp() -> Span {
        Span::point(0)
    }

    fn int(v: i64) -> HirExpr {
        HirExpr::new(HirExprKind::ConstInt(v), Type::int(), sp())
    }

    fn binary(op: MirBinOp, lhs: HirExpr, rhs: HirExpr) -> HirExpr {
        HirExpr::new(
            HirExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Type::int(),
            sp(),
        )
    }

    #[test]
    fn folds_arithmetic() {
        let mut e = binary(MirBinOp::Add, int(2), binary(MirBinOp::Mul, int(3), int(4)));
        fold_expr(&mut e);
        assert!(matches!(e.kind, HirExprKind::ConstInt(14)));
    }

    #[test]
    fn folds_comparisons_and_string_concat() {
        let mut cmp = binary(MirBinOp::Lt, int(1), int(2));
        fold_expr(&mut cmp);
        assert!(matches!(cmp.kind, HirExprKind::ConstBool(true)));

        let mut concat = HirExpr::new(
            HirExprKind::Binary {
                op: MirBinOp::Add,
                lhs: Box::new(HirExpr::new(
                    HirExprKind::ConstStr("a".into()),
                    Type::string(),
                    sp(),
                )),
                rhs: Box::new(HirExpr::new(
                    HirExprKind::ConstStr("b".into()),
                    Type::string(),
                    sp(),
                )),
            },
            Type::string(),
            sp(),
        );
        fold_expr(&mut concat);
        assert!(matches!(&concat.kind, HirExprKind::ConstStr(s) if s == "ab"));
    }

    #[test]
    fn division_by_literal_zero_is_not_folded() {
        let mut e = binary(MirBinOp::Div, int(1), int(0));
        fold_expr(&mut e);
        assert!(matches!(e.kind, HirExprKind::Binary { .. }));
    }

    #[test]
    fn literal_condition_selects_branch() {
        let mut e = HirExpr::new(
            HirExprKind::If {
                cond: Box::new(HirExpr::new(
                    HirExprKind::ConstBool(true),
                    Type::boolean(),
                    sp(),
                )),
                then_e: Box::new(int(1)),
                else_e: Some(Box::new(int(2))),
            },
            Type::int(),
            sp(),
        );
        fold_expr(&mut e);
        assert!(matches!(e.kind, HirExprKind::ConstInt(1)));
    }

    #[test]
    fn dce_drops_unread_pure_let() {
        let mut block = HirExpr::new(
            HirExprKind::Block(vec![
                HirExpr::new(
                    HirExprKind::Let {
                        name: "unused".into(),
                        mutable: false,
                        value: Some(Box::new(int(1))),
                    },
                    Type::unit(),
                    sp(),
                ),
                int(2),
            ]),
            Type::int(),
            sp(),
        );
        dce_expr(&mut block);
        let HirExprKind::Block(exprs) = &block.kind else { panic!() };
        assert_eq!(exprs.len(), 1);
    }

    #[test]
    fn dce_truncates_after_jump() {
        let mut block = HirExpr::new(
            HirExprKind::Block(vec![
                HirExpr::new(
                    HirExprKind::Return {
                        value: Some(Box::new(int(1))),
                    },
                    Type::nothing(),
                    sp(),
                ),
                int(2),
                int(3),
            ]),
            Type::int(),
            sp(),
        );
        dce_expr(&mut block);
        let HirExprKind::Block(exprs) = &block.kind else { panic!() };
        assert_eq!(exprs.len(), 1);
    }

    use super::super::{HirFunction, HirModule, HirParam};

    /// A pure function with the given body, plus a caller invoking it.
    fn module_calling(callee_name: &str, body: HirExpr, is_inline: bool) -> HirModule {
        let callee = HirFunction {
            name: callee_name.into(),
            owner: None,
            params: vec![HirParam {
                name: "n".into(),
                ty: Type::int(),
            }],
            ret: Type::int(),
            body: Some(HirExpr::new(
                HirExprKind::Return {
                    value: Some(Box::new(body)),
                },
                Type::nothing(),
                sp(),
            )),
            is_static: true,
            is_inline,
            reified: vec![],
            span: sp(),
        };
        let caller = HirFunction {
            name: "caller".into(),
            owner: None,
            params: vec![],
            ret: Type::int(),
            body: Some(HirExpr::new(
                HirExprKind::Return {
                    value: Some(Box::new(HirExpr::new(
                        HirExprKind::CallStatic {
                            owner: MODULE_OWNER.into(),
                            name: callee_name.into(),
                            args: vec![int(21)],
                            special: 0,
                        },
                        Type::int(),
                        sp(),
                    ))),
                },
                Type::nothing(),
                sp(),
            )),
            is_static: true,
            is_inline: false,
            reified: vec![],
            span: sp(),
        };
        HirModule {
            package: None,
            classes: vec![],
            functions: vec![callee, caller],
            globals: vec![],
            imports: vec![],
            extensions: vec![],
        }
    }

    fn caller_still_calls(module: &HirModule) -> bool {
        fn find_call(e: &HirExpr, found: &mut bool) {
            if matches!(e.kind, HirExprKind::CallStatic { .. }) {
                *found = true;
            }
            walk_children(e, &mut |c| find_call(c, found));
        }
        let mut has_call = false;
        find_call(module.functions[1].body.as_ref().unwrap(), &mut has_call);
        has_call
    }

    /// A pure expression over `n` that is well past the size heuristic.
    fn oversized_body() -> HirExpr {
        let mut body = HirExpr::new(HirExprKind::Local("n".into()), Type::int(), sp());
        for i in 0..10i64 {
            body = binary(
                MirBinOp::Add,
                body,
                binary(
                    MirBinOp::Mul,
                    HirExpr::new(HirExprKind::Local("n".into()), Type::int(), sp()),
                    int(i),
                ),
            );
        }
        body
    }

    #[test]
    fn inline_small_function() {
        let small = binary(
            MirBinOp::Mul,
            HirExpr::new(HirExprKind::Local("n".into()), Type::int(), sp()),
            int(2),
        );
        let mut module = module_calling("double", small, false);
        optimize(&mut module);
        assert!(
            !caller_still_calls(&module),
            "small pure callee should be inlined"
        );
    }

    #[test]
    fn declared_inline_bypasses_size_cap() {
        // Declared `inline`: expanded even though the body is far larger
        // than the heuristic limit.
        let mut module = module_calling("bigHelper", oversized_body(), true);
        optimize(&mut module);
        assert!(
            !caller_still_calls(&module),
            "an `inline`-declared callee must be expanded regardless of size"
        );
    }

    #[test]
    fn oversized_function_without_inline_stays_a_call() {
        let mut module = module_calling("bigHelper", oversized_body(), false);
        optimize(&mut module);
        assert!(
            caller_still_calls(&module),
            "the size heuristic still applies to undeclared functions"
        );
    }

    #[test]
    fn recursive_function_is_not_inlinable() {
        // A self-call makes the body non-inline-safe (calls are rejected).
        let body = HirExpr::new(
            HirExprKind::CallStatic {
                owner: MODULE_OWNER.into(),
                name: "loop".into(),
                args: vec![],
                special: 0,
            },
            Type::int(),
            sp(),
        );
        assert!(!is_inline_safe(&body, "loop"));
    }
}
