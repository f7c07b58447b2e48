//! Declaration-site variance checking.
//!
//! For every declaration with variance-annotated type parameters, each
//! member type is walked with a position: OUT for return types and `val`
//! properties, IN for function parameters, INVARIANT for `var` properties.
//! Entering an `in`-annotated use-site argument flips the position, an
//! invariant argument resets it to INVARIANT, function-type parameters
//! flip, and function-type returns do not. An `out` parameter at an IN or
//! INVARIANT position (or `in` at OUT/INVARIANT) is a warning.

use rustc_hash::FxHashMap;

use opal_parser::ast::{
    ClassDecl, FunDecl, InterfaceDecl, Member, TypeParameter, TypeRef, TypeRefKind, Variance,
};

use crate::analyze::Analyzer;
use crate::error::SemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Out,
    In,
    Invariant,
}

impl Position {
    fn flip(self) -> Position {
        match self {
            Position::Out => Position::In,
            Position::In => Position::Out,
            Position::Invariant => Position::Invariant,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Position::Out => "covariant",
            Position::In => "contravariant",
            Position::Invariant => "invariant",
        }
    }
}

/// Variance-annotated parameters of a declaration, by name.
fn declared_variances(params: &[TypeParameter]) -> FxHashMap<String, Variance> {
    params
        .iter()
        .filter(|p| p.variance != Variance::Invariant)
        .map(|p| (p.name.name.clone(), p.variance))
        .collect()
}

impl<'s> Analyzer<'s> {
    pub(crate) fn variance_check_class(&mut self, c: &ClassDecl) {
        let declared = declared_variances(&c.type_params);
        if declared.is_empty() {
            return;
        }

        for param in &c.primary_params {
            let position = match param.property {
                // `val` properties read out; `var` both ways; a plain
                // constructor parameter is an input.
                Some(false) => Position::Out,
                Some(true) => Position::Invariant,
                None => Position::In,
            };
            if let Some(ty) = &param.ty {
                self.variance_walk(&declared, ty, position);
            }
        }

        for member in &c.members {
            self.variance_check_member(&declared, member);
        }
    }

    pub(crate) fn variance_check_interface(&mut self, i: &InterfaceDecl) {
        let declared = declared_variances(&i.type_params);
        if declared.is_empty() {
            return;
        }
        for member in &i.members {
            self.variance_check_member(&declared, member);
        }
    }

    /// Function-level variance annotations (`fun bad<in T>(): T`) are
    /// checked the same way: parameters are IN positions, the return is
    /// an OUT position.
    pub(crate) fn variance_check_function(&mut self, f: &FunDecl) {
        let declared = declared_variances(&f.type_params);
        if declared.is_empty() {
            return;
        }
        for param in &f.params {
            if let Some(ty) = &param.ty {
                self.variance_walk(&declared, ty, Position::In);
            }
        }
        if let Some(ret) = &f.return_type {
            self.variance_walk(&declared, ret, Position::Out);
        }
    }

    fn variance_check_member(&mut self, declared: &FxHashMap<String, Variance>, member: &Member) {
        match member {
            Member::Fun(f) => {
                for param in &f.params {
                    if let Some(ty) = &param.ty {
                        self.variance_walk(declared, ty, Position::In);
                    }
                }
                if let Some(ret) = &f.return_type {
                    self.variance_walk(declared, ret, Position::Out);
                }
            }
            Member::Property(p) => {
                let position = if p.mutable {
                    Position::Invariant
                } else {
                    Position::Out
                };
                if let Some(ty) = &p.ty {
                    self.variance_walk(declared, ty, position);
                }
            }
            Member::Constructor(ctor) => {
                for param in &ctor.params {
                    if let Some(ty) = &param.ty {
                        self.variance_walk(declared, ty, Position::In);
                    }
                }
            }
            _ => {}
        }
    }

    fn variance_walk(
        &mut self,
        declared: &FxHashMap<String, Variance>,
        ty: &TypeRef,
        position: Position,
    ) {
        match &ty.kind {
            TypeRefKind::Simple { name } => {
                if let Some(variance) = declared.get(name) {
                    let violation = match variance {
                        Variance::Out => position != Position::Out,
                        Variance::In => position != Position::In,
                        Variance::Invariant => false,
                    };
                    if violation {
                        self.report(SemaError::VarianceViolation {
                            param: name.clone(),
                            declared: if *variance == Variance::Out { "out" } else { "in" },
                            position: position.describe(),
                            span: ty.span,
                        });
                    }
                }
            }
            TypeRefKind::Nullable(inner) => self.variance_walk(declared, inner, position),
            TypeRefKind::Generic { args, .. } => {
                for arg in args {
                    let Some(arg_ty) = &arg.ty else {
                        continue; // `*` constrains nothing
                    };
                    let next = match arg.variance {
                        Variance::Out => position,
                        Variance::In => position.flip(),
                        Variance::Invariant => Position::Invariant,
                    };
                    self.variance_walk(declared, arg_ty, next);
                }
            }
            TypeRefKind::Function {
                receiver,
                params,
                ret,
                ..
            } => {
                if let Some(receiver) = receiver {
                    self.variance_walk(declared, receiver, position.flip());
                }
                for param in params {
                    self.variance_walk(declared, param, position.flip());
                }
                // Function-type returns keep the current position.
                self.variance_walk(declared, ret, position);
            }
        }
    }
}
