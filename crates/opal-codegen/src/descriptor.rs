//! JVM method-descriptor builders.
//!
//! Descriptors compose `(param-descriptors...)return-descriptor`. Three
//! erased shapes exist for the runtime call surface: all-object parameters
//! with an object return, all-object with a void return, and an
//! int-preserving form where `Int` stays `I` and everything else boxes.

use crate::mir::MirType;

const OBJECT: &str = "Ljava/lang/Object;";

/// Exact descriptor from concrete parameter and return types.
pub fn method_descriptor(params: &[MirType], ret: &MirType) -> String {
    let mut out = String::from("(");
    for param in params {
        out.push_str(&param.descriptor());
    }
    out.push(')');
    out.push_str(&ret.descriptor());
    out
}

/// `(Ljava/lang/Object;...)Ljava/lang/Object;` with `arity` parameters.
pub fn object_descriptor(arity: usize) -> String {
    let mut out = String::from("(");
    for _ in 0..arity {
        out.push_str(OBJECT);
    }
    out.push(')');
    out.push_str(OBJECT);
    out
}

/// `(Ljava/lang/Object;...)V` with `arity` parameters.
pub fn object_void_descriptor(arity: usize) -> String {
    let mut out = String::from("(");
    for _ in 0..arity {
        out.push_str(OBJECT);
    }
    out.push_str(")V");
    out
}

/// Int-preserving erased form: `Int` parameters and returns stay `I`,
/// everything else becomes `Ljava/lang/Object;`.
pub fn int_preserving_descriptor(params: &[MirType], ret: &MirType) -> String {
    let mut out = String::from("(");
    for param in params {
        out.push_str(erase_keep_int(param));
    }
    out.push(')');
    out.push_str(erase_keep_int(ret));
    out
}

fn erase_keep_int(ty: &MirType) -> &'static str {
    match ty {
        MirType::Int => "I",
        MirType::Void => "V",
        _ => OBJECT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_descriptor() {
        assert_eq!(
            method_descriptor(&[MirType::Int, MirType::Int], &MirType::Int),
            "(II)I"
        );
        assert_eq!(
            method_descriptor(
                &[MirType::object("java/lang/String")],
                &MirType::Boolean
            ),
            "(Ljava/lang/String;)Z"
        );
        assert_eq!(method_descriptor(&[], &MirType::Void), "()V");
    }

    #[test]
    fn object_shapes() {
        insta::assert_snapshot!(
            object_descriptor(2),
            @"(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;"
        );
        insta::assert_snapshot!(object_void_descriptor(1), @"(Ljava/lang/Object;)V");
        insta::assert_snapshot!(object_descriptor(0), @"()Ljava/lang/Object;");
    }

    #[test]
    fn int_preserving() {
        assert_eq!(
            int_preserving_descriptor(
                &[MirType::Int, MirType::object("demo/Box")],
                &MirType::Int
            ),
            "(ILjava/lang/Object;)I"
        );
        assert_eq!(
            int_preserving_descriptor(&[MirType::Double], &MirType::Void),
            "(Ljava/lang/Object;)V"
        );
    }
}
