//! Semantic error taxonomy.
//!
//! Each variant carries enough to render a terse, actionable message plus
//! the source range it points at. Variance, reachability, and unused-name
//! findings are warnings; everything else is an error.

use std::fmt;

use opal_common::diag::{Diagnostic, Severity};
use opal_common::span::Span;

use crate::ty::Type;

#[derive(Debug, Clone)]
pub enum SemaError {
    UnresolvedIdentifier {
        name: String,
        span: Span,
    },
    UnknownType {
        name: String,
        span: Span,
    },
    TypeMismatch {
        expected: Type,
        found: Type,
        span: Span,
    },
    ConditionNotBoolean {
        found: Type,
        span: Span,
    },
    OperatorTypeMismatch {
        op: String,
        lhs: Type,
        rhs: Type,
        span: Span,
    },
    AssignmentToImmutable {
        name: String,
        span: Span,
    },
    InvalidAssignmentTarget {
        span: Span,
    },
    DuplicateDefinition {
        name: String,
        span: Span,
    },
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    NamedArgumentNotFound {
        name: String,
        function: String,
        span: Span,
    },
    DuplicateArgument {
        name: String,
        span: Span,
    },
    MissingArgument {
        name: String,
        function: String,
        span: Span,
    },
    NoMatchingOverload {
        name: String,
        span: Span,
    },
    NullableReceiver {
        ty: Type,
        span: Span,
    },
    UnnecessarySafeCall {
        ty: Type,
        span: Span,
    },
    UnnecessaryNotNull {
        ty: Type,
        span: Span,
    },
    UnknownMember {
        ty: Type,
        name: String,
        span: Span,
    },
    NotCallable {
        ty: Type,
        span: Span,
    },
    VarianceViolation {
        param: String,
        declared: &'static str,
        position: &'static str,
        span: Span,
    },
    TypeArgumentArity {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    NonExhaustiveWhen {
        subject: String,
        missing: Vec<String>,
        span: Span,
    },
    UnreachableCode {
        span: Span,
    },
    UnusedVariable {
        name: String,
        span: Span,
    },
    BreakOutsideLoop {
        span: Span,
    },
    ContinueOutsideLoop {
        span: Span,
    },
    UnknownLabel {
        label: String,
        span: Span,
    },
    IfExpressionMissingElse {
        span: Span,
    },
    MissingReturn {
        name: String,
        ret: Type,
        span: Span,
    },
    GuardMustExit {
        span: Span,
    },
    PropagateOnNonResult {
        found: Type,
        span: Span,
    },
    PropagateIncompatibleReturn {
        fn_ret: Type,
        span: Span,
    },
    NotIterable {
        ty: Type,
        span: Span,
    },
    NotThrowable {
        ty: Type,
        span: Span,
    },
    NotCloseable {
        ty: Type,
        span: Span,
    },
    AbstractInstantiation {
        name: String,
        span: Span,
    },
    OverridesNothing {
        name: String,
        span: Span,
    },
    MissingOverrideModifier {
        name: String,
        span: Span,
    },
    ThisOutsideClass {
        span: Span,
    },
    SuperOutsideClass {
        span: Span,
    },
    DestructuringArity {
        expected: usize,
        found: usize,
        span: Span,
    },
}

impl SemaError {
    pub fn span(&self) -> Span {
        use SemaError::*;
        match self {
            UnresolvedIdentifier { span, .. }
            | UnknownType { span, .. }
            | TypeMismatch { span, .. }
            | ConditionNotBoolean { span, .. }
            | OperatorTypeMismatch { span, .. }
            | AssignmentToImmutable { span, .. }
            | InvalidAssignmentTarget { span }
            | DuplicateDefinition { span, .. }
            | ArityMismatch { span, .. }
            | NamedArgumentNotFound { span, .. }
            | DuplicateArgument { span, .. }
            | MissingArgument { span, .. }
            | NoMatchingOverload { span, .. }
            | NullableReceiver { span, .. }
            | UnnecessarySafeCall { span, .. }
            | UnnecessaryNotNull { span, .. }
            | UnknownMember { span, .. }
            | NotCallable { span, .. }
            | VarianceViolation { span, .. }
            | TypeArgumentArity { span, .. }
            | NonExhaustiveWhen { span, .. }
            | UnreachableCode { span }
            | UnusedVariable { span, .. }
            | BreakOutsideLoop { span }
            | ContinueOutsideLoop { span }
            | UnknownLabel { span, .. }
            | IfExpressionMissingElse { span }
            | MissingReturn { span, .. }
            | GuardMustExit { span }
            | PropagateOnNonResult { span, .. }
            | PropagateIncompatibleReturn { span, .. }
            | NotIterable { span, .. }
            | NotThrowable { span, .. }
            | NotCloseable { span, .. }
            | AbstractInstantiation { span, .. }
            | OverridesNothing { span, .. }
            | MissingOverrideModifier { span, .. }
            | ThisOutsideClass { span }
            | SuperOutsideClass { span }
            | DestructuringArity { span, .. } => *span,
        }
    }

    pub fn severity(&self) -> Severity {
        use SemaError::*;
        match self {
            VarianceViolation { .. }
            | UnnecessarySafeCall { .. }
            | UnnecessaryNotNull { .. }
            | UnreachableCode { .. }
            | UnusedVariable { .. }
            | MissingOverrideModifier { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::new(self.severity(), self.to_string(), self.span())
    }
}

impl fmt::Display for SemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SemaError::*;
        match self {
            UnresolvedIdentifier { name, .. } => write!(f, "unresolved identifier `{name}`"),
            UnknownType { name, .. } => write!(f, "unknown type `{name}`"),
            TypeMismatch {
                expected, found, ..
            } => write!(f, "type mismatch: expected `{expected}`, found `{found}`"),
            ConditionNotBoolean { found, .. } => {
                write!(f, "condition must be `Boolean`, found `{found}`")
            }
            OperatorTypeMismatch { op, lhs, rhs, .. } => {
                write!(f, "operator `{op}` cannot be applied to `{lhs}` and `{rhs}`")
            }
            AssignmentToImmutable { name, .. } => {
                write!(f, "`{name}` is immutable; declare it with `var` to assign")
            }
            InvalidAssignmentTarget { .. } => write!(f, "invalid assignment target"),
            DuplicateDefinition { name, .. } => {
                write!(f, "`{name}` is already declared in this scope")
            }
            ArityMismatch {
                name,
                expected,
                found,
                ..
            } => write!(
                f,
                "`{name}` expects {expected} argument(s), found {found}"
            ),
            NamedArgumentNotFound { name, function, .. } => {
                write!(f, "no parameter named `{name}` in `{function}`")
            }
            DuplicateArgument { name, .. } => {
                write!(f, "argument `{name}` is provided more than once")
            }
            MissingArgument { name, function, .. } => {
                write!(f, "missing argument `{name}` in call to `{function}`")
            }
            NoMatchingOverload { name, .. } => {
                write!(f, "no overload of `{name}` matches these arguments")
            }
            NullableReceiver { ty, .. } => write!(
                f,
                "receiver of type `{ty}` may be null; use `?.` or `!!`"
            ),
            UnnecessarySafeCall { ty, .. } => {
                write!(f, "unnecessary safe call on non-nullable `{ty}`")
            }
            UnnecessaryNotNull { ty, .. } => {
                write!(f, "unnecessary `!!` on non-nullable `{ty}`")
            }
            UnknownMember { ty, name, .. } => write!(f, "`{ty}` has no member `{name}`"),
            NotCallable { ty, .. } => write!(f, "`{ty}` is not callable"),
            VarianceViolation {
                param,
                declared,
                position,
                ..
            } => write!(
                f,
                "type parameter `{declared} {param}` occurs in {position} position"
            ),
            TypeArgumentArity {
                name,
                expected,
                found,
                ..
            } => write!(
                f,
                "`{name}` expects {expected} type argument(s), found {found}"
            ),
            NonExhaustiveWhen {
                subject, missing, ..
            } => write!(
                f,
                "non-exhaustive `when` over `{subject}`: missing {}",
                missing.join(", ")
            ),
            UnreachableCode { .. } => write!(f, "unreachable code"),
            UnusedVariable { name, .. } => write!(f, "variable `{name}` is never used"),
            BreakOutsideLoop { .. } => write!(f, "`break` outside of a loop"),
            ContinueOutsideLoop { .. } => write!(f, "`continue` outside of a loop"),
            UnknownLabel { label, .. } => write!(f, "no enclosing loop labeled `{label}`"),
            IfExpressionMissingElse { .. } => {
                write!(f, "`if` used as an expression must have an `else` branch")
            }
            MissingReturn { name, ret, .. } => {
                write!(f, "`{name}` must return `{ret}` on every path")
            }
            GuardMustExit { .. } => write!(
                f,
                "the else block of `guard` must exit (return, throw, break, or continue)"
            ),
            PropagateOnNonResult { found, .. } => {
                write!(f, "`?` requires a `Result` operand, found `{found}`")
            }
            PropagateIncompatibleReturn { fn_ret, .. } => write!(
                f,
                "`?` requires the enclosing function to return `Result`, found `{fn_ret}`"
            ),
            NotIterable { ty, .. } => write!(f, "`{ty}` is not iterable"),
            NotThrowable { ty, .. } => write!(f, "`{ty}` is not a `Throwable`"),
            NotCloseable { ty, .. } => write!(f, "`{ty}` is not `Closeable`"),
            AbstractInstantiation { name, .. } => {
                write!(f, "cannot instantiate abstract type `{name}`")
            }
            OverridesNothing { name, .. } => {
                write!(f, "`{name}` overrides nothing in its supertypes")
            }
            MissingOverrideModifier { name, .. } => {
                write!(f, "`{name}` hides a supertype member; add `override`")
            }
            ThisOutsideClass { .. } => write!(f, "`this` used outside of a class"),
            SuperOutsideClass { .. } => write!(f, "`super` used outside of a class"),
            DestructuringArity {
                expected, found, ..
            } => write!(
                f,
                "destructuring expects {expected} component(s), found {found}"
            ),
        }
    }
}
