//! Declaration metadata produced by the declare pass and consumed by the
//! check pass and by HIR lowering.

use opal_parser::ast::{NodeId, Variance};
use rustc_hash::FxHashMap;

use crate::registry::SupertypeRegistry;
use crate::ty::Type;

/// Flavor of a registered named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Object,
}

#[derive(Debug, Clone)]
pub struct TypeParamInfo {
    pub name: String,
    pub variance: Variance,
    pub bound: Option<Type>,
    pub reified: bool,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub struct ParamSig {
    pub name: String,
    pub ty: Type,
    pub has_default: bool,
}

/// A callable signature: top-level function, method, constructor, or
/// builtin.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub name: String,
    pub type_params: Vec<TypeParamInfo>,
    /// Extension receiver, when this is an extension function.
    pub receiver: Option<Type>,
    pub params: Vec<ParamSig>,
    pub ret: Type,
    pub is_operator: bool,
    pub is_infix: bool,
    pub is_inline: bool,
    pub is_abstract: bool,
    pub is_override: bool,
    /// Declaration id, absent for builtins.
    pub decl_id: Option<NodeId>,
}

impl FunctionSig {
    /// A plain builtin signature.
    pub fn builtin(name: &str, params: &[(&str, Type)], ret: Type) -> Self {
        FunctionSig {
            name: name.to_string(),
            type_params: Vec::new(),
            receiver: None,
            params: params
                .iter()
                .map(|(n, t)| ParamSig {
                    name: n.to_string(),
                    ty: t.clone(),
                    has_default: false,
                })
                .collect(),
            ret,
            is_operator: false,
            is_infix: false,
            is_inline: false,
            is_abstract: false,
            is_override: false,
            decl_id: None,
        }
    }

    /// A builtin signature with method-level type parameters.
    pub fn builtin_generic(
        name: &str,
        type_params: &[&str],
        params: &[(&str, Type)],
        ret: Type,
    ) -> Self {
        let mut sig = Self::builtin(name, params, ret);
        sig.type_params = type_params
            .iter()
            .map(|n| TypeParamInfo {
                name: n.to_string(),
                variance: Variance::Invariant,
                bound: None,
                reified: false,
            })
            .collect();
        sig
    }
}

/// Everything the analyzer knows about one named type.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub kind: ClassKind,
    pub is_sealed: bool,
    pub is_open: bool,
    pub is_abstract: bool,
    pub is_data: bool,
    pub type_params: Vec<TypeParamInfo>,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<FunctionSig>,
    /// Constructor signatures (primary first).
    pub ctors: Vec<FunctionSig>,
    pub enum_entries: Vec<String>,
    /// Direct subtypes, filled for sealed hierarchies.
    pub sealed_subtypes: Vec<String>,
    /// Name of the companion object type, if any.
    pub companion: Option<String>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        ClassInfo {
            name: name.into(),
            kind,
            is_sealed: false,
            is_open: false,
            is_abstract: false,
            is_data: false,
            type_params: Vec::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            ctors: Vec::new(),
            enum_entries: Vec::new(),
            sealed_subtypes: Vec::new(),
            companion: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn methods_named(&self, name: &str) -> Vec<&FunctionSig> {
        self.methods.iter().filter(|m| m.name == name).collect()
    }
}

/// What a resolved name or call refers to; keyed by the referring node's id.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Local,
    Parameter,
    /// Top-level property.
    Global { name: String },
    TopLevelFunction { name: String },
    Builtin { name: String },
    Method { owner: String, name: String },
    ExtensionFunction { name: String },
    Constructor { class: String },
    Class { name: String },
    Object { name: String },
    EnumEntry { enum_name: String, entry: String },
    Field { owner: String, name: String },
    Import { path: String },
}

/// The annotated-AST side tables: node types, name resolutions, and the
/// declaration registries the later stages read.
#[derive(Debug)]
pub struct Analysis {
    pub types: FxHashMap<NodeId, Type>,
    pub resolutions: FxHashMap<NodeId, Resolution>,
    pub classes: FxHashMap<String, ClassInfo>,
    pub functions: FxHashMap<String, Vec<FunctionSig>>,
    pub registry: SupertypeRegistry,
}

impl Analysis {
    /// Type of a node, defaulting to the error type for nodes the analyzer
    /// never reached (error recovery).
    pub fn type_of(&self, id: NodeId) -> Type {
        self.types.get(&id).cloned().unwrap_or_else(Type::error)
    }

    pub fn resolution(&self, id: NodeId) -> Option<&Resolution> {
        self.resolutions.get(&id)
    }
}
