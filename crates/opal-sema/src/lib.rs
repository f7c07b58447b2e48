// Opal semantic analysis: type model, symbol resolution, checking.

pub mod analyze;
pub mod builtins;
pub mod error;
pub mod info;
pub mod registry;
pub mod symbols;
pub mod ty;
mod variance;

pub use analyze::analyze;
pub use info::{Analysis, ClassInfo, ClassKind, FieldInfo, FunctionSig, ParamSig, Resolution};
pub use registry::SupertypeRegistry;
pub use ty::{promote, Primitive, Type, TypeArg, TypeKind};
