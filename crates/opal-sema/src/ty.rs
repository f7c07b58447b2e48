//! The Opal type model.
//!
//! A [`Type`] is a tagged sum plus a nullability bit. `Unit` and the error
//! type refuse the bit; `Nothing?` is the type of the `null` literal.
//! Structural equality is derived: two types are equal iff their tag,
//! nullability, name, argument list, and function shape agree pointwise.

use std::fmt;

use opal_parser::ast::Variance;

/// Primitive value types with JVM-style unboxed representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Char,
}

impl Primitive {
    /// Numeric promotion rank: Int < Long < Float < Double. `None` for
    /// non-numeric primitives.
    pub fn rank(self) -> Option<u8> {
        match self {
            Primitive::Int => Some(0),
            Primitive::Long => Some(1),
            Primitive::Float => Some(2),
            Primitive::Double => Some(3),
            Primitive::Boolean | Primitive::Char => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Int => "Int",
            Primitive::Long => "Long",
            Primitive::Float => "Float",
            Primitive::Double => "Double",
            Primitive::Boolean => "Boolean",
            Primitive::Char => "Char",
        }
    }
}

/// A use-site type argument: a type with variance, or the `*` wildcard
/// (`ty: None`, treated as invariant).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeArg {
    pub variance: Variance,
    pub ty: Option<Type>,
}

impl TypeArg {
    pub fn invariant(ty: Type) -> Self {
        Self {
            variance: Variance::Invariant,
            ty: Some(ty),
        }
    }

    pub fn star() -> Self {
        Self {
            variance: Variance::Invariant,
            ty: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Primitive(Primitive),
    /// Named class/interface/enum/object type with its arguments.
    Class { name: String, args: Vec<TypeArg> },
    /// Function type with optional extension receiver.
    Function {
        receiver: Option<Box<Type>>,
        params: Vec<Type>,
        ret: Box<Type>,
    },
    /// A reference to an in-scope type parameter.
    Param {
        name: String,
        bound: Option<Box<Type>>,
    },
    /// The universal subtype. `Nothing?` is the type of `null`.
    Nothing,
    Unit,
    /// Placeholder that suppresses cascading diagnostics; compatible with
    /// every type in both directions.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeKind,
    pub nullable: bool,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    // ── Constructors ───────────────────────────────────────────────────

    pub fn int() -> Type {
        Type::new(TypeKind::Primitive(Primitive::Int))
    }

    pub fn long() -> Type {
        Type::new(TypeKind::Primitive(Primitive::Long))
    }

    pub fn float() -> Type {
        Type::new(TypeKind::Primitive(Primitive::Float))
    }

    pub fn double() -> Type {
        Type::new(TypeKind::Primitive(Primitive::Double))
    }

    pub fn boolean() -> Type {
        Type::new(TypeKind::Primitive(Primitive::Boolean))
    }

    pub fn char() -> Type {
        Type::new(TypeKind::Primitive(Primitive::Char))
    }

    pub fn string() -> Type {
        Type::class("String")
    }

    pub fn any() -> Type {
        Type::class("Any")
    }

    pub fn unit() -> Type {
        Type::new(TypeKind::Unit)
    }

    pub fn nothing() -> Type {
        Type::new(TypeKind::Nothing)
    }

    /// The type of the `null` literal.
    pub fn null() -> Type {
        Type {
            kind: TypeKind::Nothing,
            nullable: true,
        }
    }

    pub fn error() -> Type {
        Type::new(TypeKind::Error)
    }

    pub fn class(name: impl Into<String>) -> Type {
        Type::new(TypeKind::Class {
            name: name.into(),
            args: Vec::new(),
        })
    }

    pub fn class_with(name: impl Into<String>, args: Vec<TypeArg>) -> Type {
        Type::new(TypeKind::Class {
            name: name.into(),
            args,
        })
    }

    /// `List<T>` helper.
    pub fn list(element: Type) -> Type {
        Type::class_with("List", vec![TypeArg::invariant(element)])
    }

    /// `Map<K, V>` helper.
    pub fn map(key: Type, value: Type) -> Type {
        Type::class_with("Map", vec![TypeArg::invariant(key), TypeArg::invariant(value)])
    }

    /// `Pair<A, B>` helper.
    pub fn pair(a: Type, b: Type) -> Type {
        Type::class_with("Pair", vec![TypeArg::invariant(a), TypeArg::invariant(b)])
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::new(TypeKind::Function {
            receiver: None,
            params,
            ret: Box::new(ret),
        })
    }

    pub fn param(name: impl Into<String>, bound: Option<Type>) -> Type {
        Type::new(TypeKind::Param {
            name: name.into(),
            bound: bound.map(Box::new),
        })
    }

    // ── Nullability ────────────────────────────────────────────────────

    /// A copy with the given nullability. `Unit` and the error type never
    /// take the bit.
    pub fn with_nullable(&self, nullable: bool) -> Type {
        let nullable = nullable && !matches!(self.kind, TypeKind::Unit | TypeKind::Error);
        Type {
            kind: self.kind.clone(),
            nullable,
        }
    }

    /// The non-nullable form of this type.
    pub fn non_null(&self) -> Type {
        self.with_nullable(false)
    }

    // ── Predicates ─────────────────────────────────────────────────────

    pub fn is_error(&self) -> bool {
        matches!(self.kind, TypeKind::Error)
    }

    pub fn is_unit(&self) -> bool {
        matches!(self.kind, TypeKind::Unit)
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self.kind, TypeKind::Nothing)
    }

    pub fn is_string(&self) -> bool {
        matches!(&self.kind, TypeKind::Class { name, .. } if name == "String")
    }

    pub fn is_numeric(&self) -> bool {
        self.rank().is_some()
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(Primitive::Boolean)) && !self.nullable
    }

    /// Numeric promotion rank, if this is a non-nullable numeric primitive.
    pub fn rank(&self) -> Option<u8> {
        if self.nullable {
            return None;
        }
        match self.kind {
            TypeKind::Primitive(p) => p.rank(),
            _ => None,
        }
    }

    /// The simple class name, if this is a class type.
    pub fn class_name(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Class { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Type arguments of a class type (empty otherwise).
    pub fn type_args(&self) -> &[TypeArg] {
        match &self.kind {
            TypeKind::Class { args, .. } => args,
            _ => &[],
        }
    }
}

/// Numeric promotion: the wider of two numeric types. Falls back to the
/// error type when either operand is not numeric (callers report).
pub fn promote(a: &Type, b: &Type) -> Type {
    match (a.rank(), b.rank()) {
        (Some(ra), Some(rb)) => {
            if ra >= rb {
                a.clone()
            } else {
                b.clone()
            }
        }
        _ => Type::error(),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Primitive(p) => write!(f, "{}", p.name())?,
            TypeKind::Class { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        match (&arg.variance, &arg.ty) {
                            (_, None) => write!(f, "*")?,
                            (Variance::In, Some(t)) => write!(f, "in {t}")?,
                            (Variance::Out, Some(t)) => write!(f, "out {t}")?,
                            (Variance::Invariant, Some(t)) => write!(f, "{t}")?,
                        }
                    }
                    write!(f, ">")?;
                }
            }
            TypeKind::Function {
                receiver,
                params,
                ret,
            } => {
                if let Some(receiver) = receiver {
                    write!(f, "{receiver}.")?;
                }
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")?;
            }
            TypeKind::Param { name, .. } => write!(f, "{name}")?,
            TypeKind::Nothing => write!(f, "Nothing")?,
            TypeKind::Unit => write!(f, "Unit")?,
            TypeKind::Error => write!(f, "<error>")?,
        }
        if self.nullable {
            write!(f, "?")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_is_never_nullable() {
        let unit = Type::unit().with_nullable(true);
        assert!(!unit.nullable);
    }

    #[test]
    fn null_literal_type() {
        let null = Type::null();
        assert!(null.is_nothing());
        assert!(null.nullable);
        assert_eq!(null.to_string(), "Nothing?");
    }

    #[test]
    fn promotion_ladder() {
        assert_eq!(promote(&Type::int(), &Type::long()), Type::long());
        assert_eq!(promote(&Type::long(), &Type::float()), Type::float());
        assert_eq!(promote(&Type::float(), &Type::double()), Type::double());
        assert_eq!(promote(&Type::int(), &Type::int()), Type::int());
        assert!(promote(&Type::int(), &Type::boolean()).is_error());
    }

    #[test]
    fn structural_equality() {
        assert_eq!(Type::list(Type::int()), Type::list(Type::int()));
        assert_ne!(Type::list(Type::int()), Type::list(Type::long()));
        assert_ne!(Type::int(), Type::int().with_nullable(true));
        assert_eq!(
            Type::function(vec![Type::int()], Type::unit()),
            Type::function(vec![Type::int()], Type::unit())
        );
        assert_ne!(
            Type::function(vec![Type::int()], Type::unit()),
            Type::function(vec![Type::long()], Type::unit())
        );
    }

    #[test]
    fn display_forms() {
        insta::assert_snapshot!(Type::int().to_string(), @"Int");
        insta::assert_snapshot!(Type::string().with_nullable(true).to_string(), @"String?");
        insta::assert_snapshot!(Type::list(Type::int()).to_string(), @"List<Int>");
        insta::assert_snapshot!(
            Type::function(vec![Type::int(), Type::int()], Type::boolean()).to_string(),
            @"(Int, Int) -> Boolean"
        );
        let star = Type::class_with("Box", vec![TypeArg::star()]);
        insta::assert_snapshot!(star.to_string(), @"Box<*>");
        let variant = Type::class_with(
            "Map",
            vec![
                TypeArg {
                    variance: Variance::In,
                    ty: Some(Type::string()),
                },
                TypeArg::star(),
            ],
        );
        insta::assert_snapshot!(variant.to_string(), @"Map<in String, *>");
    }

    #[test]
    fn nullable_rank_is_none() {
        assert!(Type::int().with_nullable(true).rank().is_none());
        assert_eq!(Type::int().rank(), Some(0));
    }
}
