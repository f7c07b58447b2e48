//! Builtin functions, constants, and class members.
//!
//! These signatures are the compiler's view of the standard runtime; the
//! runtime itself is an external collaborator. HIR lowering maps the
//! builtin names onto runtime entry points.

use rustc_hash::FxHashMap;

use crate::info::{ClassInfo, ClassKind, FieldInfo, FunctionSig, TypeParamInfo};
use crate::ty::{Type, TypeArg};
use opal_parser::ast::Variance;

/// Top-level builtin functions, grouped by name (overloads share a key).
pub fn builtin_functions() -> FxHashMap<String, Vec<FunctionSig>> {
    let any_opt = Type::any().with_nullable(true);
    let mut map: FxHashMap<String, Vec<FunctionSig>> = FxHashMap::default();
    let mut add = |sig: FunctionSig| {
        map.entry(sig.name.clone()).or_default().push(sig);
    };

    add(FunctionSig::builtin("println", &[("value", any_opt.clone())], Type::unit()));
    add(FunctionSig::builtin("println", &[], Type::unit()));
    add(FunctionSig::builtin("print", &[("value", any_opt.clone())], Type::unit()));
    add(FunctionSig::builtin(
        "readLine",
        &[],
        Type::string().with_nullable(true),
    ));

    add(FunctionSig::builtin("require", &[("condition", Type::boolean())], Type::unit()));
    add(FunctionSig::builtin(
        "require",
        &[("condition", Type::boolean()), ("message", Type::string())],
        Type::unit(),
    ));
    add(FunctionSig::builtin("check", &[("condition", Type::boolean())], Type::unit()));
    add(FunctionSig::builtin("error", &[("message", Type::string())], Type::nothing()));

    // Reflection-flavored helpers; lowered to TYPE_CHECK-style MIR.
    add(FunctionSig::builtin("typeOf", &[("value", any_opt.clone())], Type::string()));
    add(FunctionSig::builtin("isCallable", &[("value", any_opt)], Type::boolean()));

    for ty in [Type::int(), Type::long(), Type::double()] {
        add(FunctionSig::builtin("abs", &[("value", ty.clone())], ty.clone()));
        add(FunctionSig::builtin(
            "min",
            &[("a", ty.clone()), ("b", ty.clone())],
            ty.clone(),
        ));
        add(FunctionSig::builtin(
            "max",
            &[("a", ty.clone()), ("b", ty.clone())],
            ty,
        ));
    }

    // Result constructors.
    add(FunctionSig::builtin_generic(
        "Ok",
        &["V"],
        &[("value", Type::param("V", None))],
        Type::class_with(
            "Result",
            vec![
                TypeArg::invariant(Type::param("V", None)),
                TypeArg::invariant(Type::nothing()),
            ],
        ),
    ));
    add(FunctionSig::builtin_generic(
        "Err",
        &["E"],
        &[("error", Type::param("E", None))],
        Type::class_with(
            "Result",
            vec![
                TypeArg::invariant(Type::nothing()),
                TypeArg::invariant(Type::param("E", None)),
            ],
        ),
    ));

    map
}

/// Builtin constants installed into the global scope.
pub fn builtin_constants() -> Vec<(&'static str, Type)> {
    vec![("PI", Type::double()), ("E", Type::double())]
}

fn t(name: &str) -> Type {
    Type::param(name, None)
}

fn tp(name: &str) -> TypeParamInfo {
    TypeParamInfo {
        name: name.to_string(),
        variance: Variance::Invariant,
        bound: None,
        reified: false,
    }
}

fn method(name: &str, params: &[(&str, Type)], ret: Type) -> FunctionSig {
    FunctionSig::builtin(name, params, ret)
}

fn generic_method(name: &str, tps: &[&str], params: &[(&str, Type)], ret: Type) -> FunctionSig {
    FunctionSig::builtin_generic(name, tps, params, ret)
}

fn val(name: &str, ty: Type) -> FieldInfo {
    FieldInfo {
        name: name.to_string(),
        ty,
        mutable: false,
    }
}

/// Builtin class shapes: members of `Any`, `String`, collections, ranges,
/// `Pair`, `Result`, `Throwable`.
pub fn builtin_classes() -> FxHashMap<String, ClassInfo> {
    let mut map = FxHashMap::default();

    let mut any = ClassInfo::new("Any", ClassKind::Class);
    any.is_open = true;
    any.methods = vec![
        method("toString", &[], Type::string()),
        method("hashCode", &[], Type::int()),
        method("equals", &[("other", Type::any().with_nullable(true))], Type::boolean()),
    ];
    map.insert("Any".to_string(), any);

    let mut string = ClassInfo::new("String", ClassKind::Class);
    string.fields = vec![val("length", Type::int())];
    string.methods = vec![
        method("isEmpty", &[], Type::boolean()),
        method("trim", &[], Type::string()),
        method("uppercase", &[], Type::string()),
        method("lowercase", &[], Type::string()),
        method("substring", &[("start", Type::int()), ("end", Type::int())], Type::string()),
        method("substring", &[("start", Type::int())], Type::string()),
        method("contains", &[("other", Type::string())], Type::boolean()),
        method("startsWith", &[("prefix", Type::string())], Type::boolean()),
        method("endsWith", &[("suffix", Type::string())], Type::boolean()),
        method("indexOf", &[("other", Type::string())], Type::int()),
        method("split", &[("separator", Type::string())], Type::list(Type::string())),
        method("repeat", &[("count", Type::int())], Type::string()),
        method("toInt", &[], Type::int()),
        method("toLong", &[], Type::long()),
        method("toDouble", &[], Type::double()),
        {
            let mut get = method("get", &[("index", Type::int())], Type::char());
            get.is_operator = true;
            get
        },
    ];
    map.insert("String".to_string(), string);

    let mut list = ClassInfo::new("List", ClassKind::Class);
    list.type_params = vec![tp("T")];
    list.fields = vec![val("size", Type::int())];
    list.methods = vec![
        {
            let mut get = method("get", &[("index", Type::int())], t("T"));
            get.is_operator = true;
            get
        },
        {
            let mut set = method("set", &[("index", Type::int()), ("value", t("T"))], Type::unit());
            set.is_operator = true;
            set
        },
        method("isEmpty", &[], Type::boolean()),
        method("contains", &[("element", t("T"))], Type::boolean()),
        method("indexOf", &[("element", t("T"))], Type::int()),
        method("add", &[("element", t("T"))], Type::unit()),
        method("removeAt", &[("index", Type::int())], t("T")),
        method("first", &[], t("T")),
        method("last", &[], t("T")),
        method("reversed", &[], Type::list(t("T"))),
        method("sorted", &[], Type::list(t("T"))),
        generic_method(
            "map",
            &["R"],
            &[("transform", Type::function(vec![t("T")], t("R")))],
            Type::list(t("R")),
        ),
        method(
            "filter",
            &[("predicate", Type::function(vec![t("T")], Type::boolean()))],
            Type::list(t("T")),
        ),
        generic_method(
            "fold",
            &["R"],
            &[
                ("initial", t("R")),
                ("operation", Type::function(vec![t("R"), t("T")], t("R"))),
            ],
            t("R"),
        ),
        method(
            "forEach",
            &[("action", Type::function(vec![t("T")], Type::unit()))],
            Type::unit(),
        ),
        method("joinToString", &[("separator", Type::string())], Type::string()),
    ];
    map.insert("List".to_string(), list);

    let mut set = ClassInfo::new("Set", ClassKind::Class);
    set.type_params = vec![tp("T")];
    set.fields = vec![val("size", Type::int())];
    set.methods = vec![
        method("isEmpty", &[], Type::boolean()),
        method("contains", &[("element", t("T"))], Type::boolean()),
        method("add", &[("element", t("T"))], Type::unit()),
        method("remove", &[("element", t("T"))], Type::boolean()),
    ];
    map.insert("Set".to_string(), set);

    let mut map_class = ClassInfo::new("Map", ClassKind::Class);
    map_class.type_params = vec![tp("K"), tp("V")];
    map_class.fields = vec![val("size", Type::int())];
    map_class.methods = vec![
        {
            let mut get = method("get", &[("key", t("K"))], t("V").with_nullable(true));
            get.is_operator = true;
            get
        },
        {
            let mut set = method("set", &[("key", t("K")), ("value", t("V"))], Type::unit());
            set.is_operator = true;
            set
        },
        method("isEmpty", &[], Type::boolean()),
        method("containsKey", &[("key", t("K"))], Type::boolean()),
        method("keys", &[], Type::list(t("K"))),
        method("values", &[], Type::list(t("V"))),
        method("remove", &[("key", t("K"))], t("V").with_nullable(true)),
    ];
    map.insert("Map".to_string(), map_class);

    for range in ["IntRange", "LongRange", "CharRange"] {
        let element = match range {
            "IntRange" => Type::int(),
            "LongRange" => Type::long(),
            _ => Type::char(),
        };
        let mut info = ClassInfo::new(range, ClassKind::Class);
        info.fields = vec![val("first", element.clone()), val("last", element.clone())];
        info.methods = vec![
            {
                let mut contains = method("contains", &[("value", element.clone())], Type::boolean());
                contains.is_operator = true;
                contains
            },
            method("isEmpty", &[], Type::boolean()),
        ];
        map.insert(range.to_string(), info);
    }

    let mut pair = ClassInfo::new("Pair", ClassKind::Class);
    pair.type_params = vec![tp("A"), tp("B")];
    pair.is_data = true;
    pair.fields = vec![val("first", t("A")), val("second", t("B"))];
    pair.methods = vec![
        method("component1", &[], t("A")),
        method("component2", &[], t("B")),
    ];
    map.insert("Pair".to_string(), pair);

    let mut triple = ClassInfo::new("Triple", ClassKind::Class);
    triple.type_params = vec![tp("A"), tp("B"), tp("C")];
    triple.is_data = true;
    triple.fields = vec![
        val("first", t("A")),
        val("second", t("B")),
        val("third", t("C")),
    ];
    triple.methods = vec![
        method("component1", &[], t("A")),
        method("component2", &[], t("B")),
        method("component3", &[], t("C")),
    ];
    map.insert("Triple".to_string(), triple);

    let mut result = ClassInfo::new("Result", ClassKind::Class);
    result.type_params = vec![tp("V"), tp("E")];
    result.methods = vec![
        method("isOk", &[], Type::boolean()),
        method("isErr", &[], Type::boolean()),
        method("unwrap", &[], t("V")),
        method("unwrapErr", &[], t("E")),
        method("okOrNull", &[], t("V").with_nullable(true)),
    ];
    map.insert("Result".to_string(), result);

    let mut future = ClassInfo::new("Future", ClassKind::Class);
    future.type_params = vec![tp("T")];
    future.methods = vec![method("isDone", &[], Type::boolean())];
    map.insert("Future".to_string(), future);

    let mut throwable = ClassInfo::new("Throwable", ClassKind::Class);
    throwable.is_open = true;
    throwable.fields = vec![val("message", Type::string().with_nullable(true))];
    throwable.ctors = vec![
        FunctionSig::builtin("Throwable", &[], Type::class("Throwable")),
        FunctionSig::builtin("Throwable", &[("message", Type::string())], Type::class("Throwable")),
    ];
    map.insert("Throwable".to_string(), throwable);

    for exception in [
        "Exception",
        "RuntimeException",
        "NullPointerException",
        "IllegalArgumentException",
        "IllegalStateException",
        "IndexOutOfBoundsException",
        "ClassCastException",
        "ArithmeticException",
    ] {
        let mut info = ClassInfo::new(exception, ClassKind::Class);
        info.is_open = true;
        info.ctors = vec![
            FunctionSig::builtin(exception, &[], Type::class(exception)),
            FunctionSig::builtin(exception, &[("message", Type::string())], Type::class(exception)),
        ];
        map.insert(exception.to_string(), info);
    }

    let mut closeable = ClassInfo::new("Closeable", ClassKind::Interface);
    closeable.methods = vec![method("close", &[], Type::unit())];
    map.insert("Closeable".to_string(), closeable);

    let mut comparable = ClassInfo::new("Comparable", ClassKind::Interface);
    comparable.methods = vec![method(
        "compareTo",
        &[("other", Type::any())],
        Type::int(),
    )];
    map.insert("Comparable".to_string(), comparable);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn println_has_overloads() {
        let functions = builtin_functions();
        assert_eq!(functions["println"].len(), 2);
    }

    #[test]
    fn list_get_is_operator() {
        let classes = builtin_classes();
        let list = &classes["List"];
        let get = list.methods_named("get");
        assert!(get[0].is_operator);
        assert_eq!(get[0].ret, Type::param("T", None));
    }

    #[test]
    fn map_get_is_nullable() {
        let classes = builtin_classes();
        let map = &classes["Map"];
        let get = &map.methods_named("get")[0];
        assert!(get.ret.nullable);
    }

    #[test]
    fn result_constructors_are_generic() {
        let functions = builtin_functions();
        assert_eq!(functions["Ok"][0].type_params.len(), 1);
        assert_eq!(functions["Err"][0].type_params.len(), 1);
    }
}
