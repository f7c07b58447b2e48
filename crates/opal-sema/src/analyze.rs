//! Semantic analysis: name resolution, type inference and checking.
//!
//! Three passes over the AST:
//!
//! 1. **Names** -- register every class-like declaration (name, kind,
//!    modifiers, type parameters) and its supertype edges.
//! 2. **Signatures** -- resolve member/field/constructor signatures,
//!    top-level functions, properties, aliases, imports.
//! 3. **Check** -- walk every body: resolve names, infer types, check
//!    assignability, exhaustiveness, reachability; run variance checking.
//!
//! Failures produce the error type, which is compatible with everything in
//! both directions; a node whose operand is already errored never reports
//! again (cascade suppression).

use opal_common::diag::DiagnosticSink;
use opal_common::span::Span;
use opal_parser::ast::{self, *};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::builtins;
use crate::error::SemaError;
use crate::info::{
    Analysis, ClassInfo, ClassKind, FieldInfo, FunctionSig, ParamSig, Resolution, TypeParamInfo,
};
use crate::registry::SupertypeRegistry;
use crate::symbols::{Symbol, SymbolKind, SymbolTable};
use crate::ty::{promote, Primitive, Type, TypeArg, TypeKind};

/// Run semantic analysis over a parsed program.
pub fn analyze(program: &Program, sink: &mut DiagnosticSink) -> Analysis {
    let mut analyzer = Analyzer::new(sink);
    analyzer.declare_names(program);
    analyzer.declare_signatures(program);
    analyzer.link_sealed_subtypes();
    analyzer.check_program(program);
    analyzer.finish()
}

pub(crate) struct Analyzer<'s> {
    sink: &'s mut DiagnosticSink,
    table: SymbolTable,
    classes: FxHashMap<String, ClassInfo>,
    functions: FxHashMap<String, Vec<FunctionSig>>,
    registry: SupertypeRegistry,
    aliases: FxHashMap<String, (Vec<String>, TypeRef)>,
    imports: FxHashMap<String, String>,
    types: FxHashMap<NodeId, Type>,
    resolutions: FxHashMap<NodeId, Resolution>,
    /// In-scope type parameters, innermost last.
    type_params: Vec<Vec<TypeParamInfo>>,
    /// Enclosing class names, innermost last.
    class_stack: Vec<String>,
    /// Enclosing function return types, innermost last.
    return_stack: Vec<Type>,
    /// Enclosing loop labels (None for unlabeled), innermost last.
    loop_stack: Vec<Option<String>>,
}

impl<'s> Analyzer<'s> {
    fn new(sink: &'s mut DiagnosticSink) -> Self {
        let mut table = SymbolTable::new();
        for (name, ty) in builtins::builtin_constants() {
            table.declare_global(Symbol::new(
                name,
                SymbolKind::BuiltinConstant,
                ty,
                Span::point(0),
            ));
        }
        Self {
            sink,
            table,
            classes: builtins::builtin_classes(),
            functions: builtins::builtin_functions(),
            registry: SupertypeRegistry::with_builtins(),
            aliases: FxHashMap::default(),
            imports: FxHashMap::default(),
            types: FxHashMap::default(),
            resolutions: FxHashMap::default(),
            type_params: Vec::new(),
            class_stack: Vec::new(),
            return_stack: Vec::new(),
            loop_stack: Vec::new(),
        }
    }

    fn finish(self) -> Analysis {
        Analysis {
            types: self.types,
            resolutions: self.resolutions,
            classes: self.classes,
            functions: self.functions,
            registry: self.registry,
        }
    }

    pub(crate) fn report(&mut self, err: SemaError) {
        self.sink.push(err.into_diagnostic());
    }

    fn record(&mut self, id: NodeId, ty: Type) -> Type {
        self.types.insert(id, ty.clone());
        ty
    }

    fn resolve(&mut self, id: NodeId, resolution: Resolution) {
        self.resolutions.insert(id, resolution);
    }

    // ══════════════════════════════════════════════════════════════════
    // Pass 1: names
    // ══════════════════════════════════════════════════════════════════

    fn declare_names(&mut self, program: &Program) {
        for decl in &program.decls {
            self.declare_decl_name(decl, None);
        }
    }

    fn declare_decl_name(&mut self, decl: &Decl, outer: Option<&str>) {
        match decl {
            Decl::Class(c) => {
                let mut info = ClassInfo::new(c.name.name.clone(), ClassKind::Class);
                info.is_sealed = c.modifiers.is_sealed;
                info.is_open = c.modifiers.is_open || c.modifiers.is_sealed || c.modifiers.is_abstract;
                info.is_abstract = c.modifiers.is_abstract;
                info.is_data = c.modifiers.is_data;
                info.type_params = self.type_param_infos(&c.type_params);
                self.insert_class(info, c.name.span);
                for member in &c.members {
                    self.declare_member_name(member, &c.name.name);
                }
            }
            Decl::Interface(i) => {
                let mut info = ClassInfo::new(i.name.name.clone(), ClassKind::Interface);
                info.is_open = true;
                info.is_abstract = true;
                info.type_params = self.type_param_infos(&i.type_params);
                self.insert_class(info, i.name.span);
            }
            Decl::Object(o) => {
                let name = match (&o.name, outer, o.is_companion) {
                    (Some(n), _, false) => n.name.clone(),
                    (Some(n), Some(outer), true) => format!("{outer}.{}", n.name),
                    (None, Some(outer), true) => format!("{outer}.Companion"),
                    (Some(n), None, true) | (Some(n), None, false) => n.name.clone(),
                    (None, _, _) => return,
                };
                let info = ClassInfo::new(name.clone(), ClassKind::Object);
                self.classes.insert(name.clone(), info);
                self.registry.register_user(&name, Some("Any".into()), vec![]);
                if !o.is_companion {
                    let span = o.name.as_ref().map(|n| n.span).unwrap_or(o.span);
                    let symbol = Symbol::new(name.clone(), SymbolKind::Object, Type::class(name), span);
                    self.declare_global_checked(symbol);
                }
            }
            Decl::Enum(e) => {
                let mut info = ClassInfo::new(e.name.name.clone(), ClassKind::Enum);
                info.enum_entries = e.entries.iter().map(|en| en.name.name.clone()).collect();
                self.insert_class(info, e.name.span);
            }
            _ => {}
        }
    }

    fn declare_member_name(&mut self, member: &Member, outer: &str) {
        match member {
            Member::Class(c) => self.declare_decl_name(&Decl::Class(c.clone()), Some(outer)),
            Member::Enum(e) => self.declare_decl_name(&Decl::Enum(e.clone()), Some(outer)),
            Member::Object(o) => self.declare_decl_name(&Decl::Object(o.clone()), Some(outer)),
            _ => {}
        }
    }

    fn insert_class(&mut self, info: ClassInfo, span: Span) {
        let name = info.name.clone();
        if self.classes.contains_key(&name) {
            self.report(SemaError::DuplicateDefinition { name: name.clone(), span });
        }
        let kind = info.kind;
        self.classes.insert(name.clone(), info);
        self.registry.register_user(&name, Some("Any".into()), vec![]);
        let symbol_kind = match kind {
            ClassKind::Interface => SymbolKind::Interface,
            ClassKind::Enum => SymbolKind::Enum,
            ClassKind::Object => SymbolKind::Object,
            ClassKind::Class => SymbolKind::Class,
        };
        self.declare_global_checked(Symbol::new(
            name.clone(),
            symbol_kind,
            Type::class(name),
            span,
        ));
    }

    fn declare_global_checked(&mut self, symbol: Symbol) {
        let name = symbol.name.clone();
        let span = symbol.span;
        if self.table.declare_global(symbol).is_some() {
            self.report(SemaError::DuplicateDefinition { name, span });
        }
    }

    fn type_param_infos(&mut self, params: &[TypeParameter]) -> Vec<TypeParamInfo> {
        params
            .iter()
            .map(|p| TypeParamInfo {
                name: p.name.name.clone(),
                variance: p.variance,
                bound: None, // resolved in the signature pass
                reified: p.reified,
            })
            .collect()
    }

    // ══════════════════════════════════════════════════════════════════
    // Pass 2: signatures
    // ══════════════════════════════════════════════════════════════════

    fn declare_signatures(&mut self, program: &Program) {
        for import in &program.imports {
            let name = import
                .alias
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_else(|| import.path.simple_name().to_string());
            if !import.wildcard {
                self.imports.insert(name, import.path.dotted());
            }
        }

        // Aliases first so signatures can reference them.
        for decl in &program.decls {
            if let Decl::TypeAlias(alias) = decl {
                let params = alias.type_params.iter().map(|p| p.name.name.clone()).collect();
                self.aliases
                    .insert(alias.name.name.clone(), (params, alias.ty.clone()));
            }
        }

        for decl in &program.decls {
            match decl {
                Decl::Class(c) => self.declare_class_signature(c),
                Decl::Interface(i) => self.declare_interface_signature(i),
                Decl::Object(o) => self.declare_object_signature(o, None),
                Decl::Enum(e) => self.declare_enum_signature(e),
                Decl::Fun(f) => {
                    let sig = self.function_signature(f);
                    self.functions.entry(f.name.name.clone()).or_default().push(sig);
                }
                Decl::Property(p) => {
                    let ty = match &p.ty {
                        Some(t) => self.resolve_type(t),
                        // Inferred during the check pass, in order.
                        None => Type::error(),
                    };
                    self.declare_global_checked(Symbol::new(
                        p.name.name.clone(),
                        SymbolKind::Property { mutable: p.mutable },
                        ty,
                        p.name.span,
                    ));
                }
                Decl::TypeAlias(_) | Decl::Destructuring(_) => {}
            }
        }
    }

    fn declare_class_signature(&mut self, c: &ClassDecl) {
        let class_params = {
            let mut infos = self.type_param_infos(&c.type_params);
            self.type_params.push(infos.clone());
            for (info, p) in infos.iter_mut().zip(&c.type_params) {
                info.bound = p.upper_bound.as_ref().map(|b| self.resolve_type(b));
            }
            self.type_params.pop();
            infos
        };
        self.type_params.push(class_params.clone());

        let mut super_class = None;
        let mut interfaces = Vec::new();
        for entry in &c.supertypes {
            let name = type_ref_name(&entry.ty);
            let is_interface = self
                .classes
                .get(&name)
                .map(|i| i.kind == ClassKind::Interface)
                .unwrap_or(false);
            if is_interface && entry.args.is_none() {
                interfaces.push(name);
            } else if super_class.is_none() {
                super_class = Some(name);
            } else {
                self.report(SemaError::TypeMismatch {
                    expected: Type::class("interface"),
                    found: Type::class(name),
                    span: entry.span,
                });
            }
        }

        let mut fields = Vec::new();
        let mut ctor_params = Vec::new();
        for param in &c.primary_params {
            let ty = param
                .ty
                .as_ref()
                .map(|t| self.resolve_type(t))
                .unwrap_or_else(Type::error);
            if let Some(mutable) = param.property {
                fields.push(FieldInfo {
                    name: param.name.name.clone(),
                    ty: ty.clone(),
                    mutable,
                });
            }
            ctor_params.push(ParamSig {
                name: param.name.name.clone(),
                ty,
                has_default: param.default.is_some(),
            });
        }

        let mut methods = Vec::new();
        let mut ctors = vec![FunctionSig {
            name: c.name.name.clone(),
            type_params: class_params.clone(),
            receiver: None,
            params: ctor_params,
            ret: self.self_type_of(&c.name.name),
            is_operator: false,
            is_infix: false,
            is_inline: false,
            is_abstract: false,
            is_override: false,
            decl_id: None,
        }];
        let mut companion = None;

        for member in &c.members {
            match member {
                Member::Fun(f) => methods.push(self.function_signature(f)),
                Member::Property(p) => {
                    let ty = match &p.ty {
                        Some(t) => self.resolve_type(t),
                        None => Type::error(),
                    };
                    fields.push(FieldInfo {
                        name: p.name.name.clone(),
                        ty,
                        mutable: p.mutable,
                    });
                }
                Member::Constructor(ctor) => {
                    let params = ctor
                        .params
                        .iter()
                        .map(|p| ParamSig {
                            name: p.name.name.clone(),
                            ty: p
                                .ty
                                .as_ref()
                                .map(|t| self.resolve_type(t))
                                .unwrap_or_else(Type::error),
                            has_default: p.default.is_some(),
                        })
                        .collect();
                    ctors.push(FunctionSig {
                        name: c.name.name.clone(),
                        type_params: class_params.clone(),
                        receiver: None,
                        params,
                        ret: self.self_type_of(&c.name.name),
                        is_operator: false,
                        is_infix: false,
                        is_inline: false,
                        is_abstract: false,
                        is_override: false,
                        decl_id: None,
                    });
                }
                Member::Object(o) if o.is_companion => {
                    let companion_name = o
                        .name
                        .as_ref()
                        .map(|n| format!("{}.{}", c.name.name, n.name))
                        .unwrap_or_else(|| format!("{}.Companion", c.name.name));
                    self.declare_object_signature(o, Some(&c.name.name));
                    companion = Some(companion_name);
                }
                Member::Object(o) => self.declare_object_signature(o, None),
                Member::Init(_) | Member::Class(_) | Member::Enum(_) => {}
            }
        }

        // Data classes get componentN and copy.
        if c.modifiers.is_data {
            for (i, param) in c.primary_params.iter().enumerate() {
                if param.property.is_some() {
                    let ty = param
                        .ty
                        .as_ref()
                        .map(|t| self.resolve_type(t))
                        .unwrap_or_else(Type::error);
                    methods.push(FunctionSig::builtin(&format!("component{}", i + 1), &[], ty));
                }
            }
            let copy_params: Vec<ParamSig> = ctors[0]
                .params
                .iter()
                .map(|p| ParamSig {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                    has_default: true,
                })
                .collect();
            methods.push(FunctionSig {
                name: "copy".into(),
                type_params: Vec::new(),
                receiver: None,
                params: copy_params,
                ret: self.self_type_of(&c.name.name),
                is_operator: false,
                is_infix: false,
                is_inline: false,
                is_abstract: false,
                is_override: false,
                decl_id: None,
            });
        }

        self.type_params.pop();

        let super_name = super_class.clone().unwrap_or_else(|| "Any".to_string());
        self.registry
            .register_user(&c.name.name, Some(super_name), interfaces.clone());
        if let Some(info) = self.classes.get_mut(&c.name.name) {
            info.type_params = class_params;
            info.super_class = super_class;
            info.interfaces = interfaces;
            info.fields = fields;
            info.methods = methods;
            info.ctors = ctors;
            info.companion = companion;
        }
    }

    fn declare_interface_signature(&mut self, i: &InterfaceDecl) {
        let params = self.type_param_infos(&i.type_params);
        self.type_params.push(params.clone());
        let interfaces: Vec<String> = i.supertypes.iter().map(|e| type_ref_name(&e.ty)).collect();
        let mut methods = Vec::new();
        let mut fields = Vec::new();
        for member in &i.members {
            match member {
                Member::Fun(f) => {
                    let mut sig = self.function_signature(f);
                    sig.is_abstract = f.body.is_none();
                    methods.push(sig);
                }
                Member::Property(p) => {
                    let ty = p
                        .ty
                        .as_ref()
                        .map(|t| self.resolve_type(t))
                        .unwrap_or_else(Type::error);
                    fields.push(FieldInfo {
                        name: p.name.name.clone(),
                        ty,
                        mutable: p.mutable,
                    });
                }
                _ => {}
            }
        }
        self.type_params.pop();
        self.registry
            .register_user(&i.name.name, Some("Any".into()), interfaces.clone());
        if let Some(info) = self.classes.get_mut(&i.name.name) {
            info.type_params = params;
            info.interfaces = interfaces;
            info.methods = methods;
            info.fields = fields;
        }
    }

    fn declare_object_signature(&mut self, o: &ObjectDecl, outer: Option<&str>) {
        let name = match (&o.name, outer, o.is_companion) {
            (Some(n), Some(outer), true) => format!("{outer}.{}", n.name),
            (None, Some(outer), true) => format!("{outer}.Companion"),
            (Some(n), _, _) => n.name.clone(),
            (None, _, _) => return,
        };
        let mut super_class = None;
        let mut interfaces = Vec::new();
        for entry in &o.supertypes {
            let tname = type_ref_name(&entry.ty);
            let is_interface = self
                .classes
                .get(&tname)
                .map(|i| i.kind == ClassKind::Interface)
                .unwrap_or(false);
            if is_interface {
                interfaces.push(tname);
            } else {
                super_class = Some(tname);
            }
        }
        let mut methods = Vec::new();
        let mut fields = Vec::new();
        for member in &o.members {
            match member {
                Member::Fun(f) => methods.push(self.function_signature(f)),
                Member::Property(p) => {
                    let ty = match &p.ty {
                        Some(t) => self.resolve_type(t),
                        None => Type::error(),
                    };
                    fields.push(FieldInfo {
                        name: p.name.name.clone(),
                        ty,
                        mutable: p.mutable,
                    });
                }
                _ => {}
            }
        }
        self.registry.register_user(
            &name,
            Some(super_class.clone().unwrap_or_else(|| "Any".into())),
            interfaces.clone(),
        );
        if let Some(info) = self.classes.get_mut(&name) {
            info.super_class = super_class;
            info.interfaces = interfaces;
            info.methods = methods;
            info.fields = fields;
        }
    }

    fn declare_enum_signature(&mut self, e: &EnumDecl) {
        let mut fields = Vec::new();
        let mut ctor_params = Vec::new();
        for param in &e.primary_params {
            let ty = param
                .ty
                .as_ref()
                .map(|t| self.resolve_type(t))
                .unwrap_or_else(Type::error);
            if let Some(mutable) = param.property {
                fields.push(FieldInfo {
                    name: param.name.name.clone(),
                    ty: ty.clone(),
                    mutable,
                });
            }
            ctor_params.push(ParamSig {
                name: param.name.name.clone(),
                ty,
                has_default: param.default.is_some(),
            });
        }
        let mut methods = Vec::new();
        for member in &e.members {
            if let Member::Fun(f) = member {
                methods.push(self.function_signature(f));
            }
        }
        self.registry
            .register_user(&e.name.name, Some("Any".into()), vec![]);
        if let Some(info) = self.classes.get_mut(&e.name.name) {
            info.fields = fields;
            info.methods = methods;
            info.ctors = vec![FunctionSig {
                name: e.name.name.clone(),
                type_params: Vec::new(),
                receiver: None,
                params: ctor_params,
                ret: Type::class(e.name.name.clone()),
                is_operator: false,
                is_infix: false,
                is_inline: false,
                is_abstract: false,
                is_override: false,
                decl_id: None,
            }];
        }
    }

    fn function_signature(&mut self, f: &FunDecl) -> FunctionSig {
        let mut type_params = self.type_param_infos(&f.type_params);
        self.type_params.push(type_params.clone());
        for (info, p) in type_params.iter_mut().zip(&f.type_params) {
            info.bound = p.upper_bound.as_ref().map(|b| self.resolve_type(b));
        }
        let receiver = f.receiver.as_ref().map(|r| self.resolve_type(r));
        let params = f
            .params
            .iter()
            .map(|p| ParamSig {
                name: p.name.name.clone(),
                ty: p
                    .ty
                    .as_ref()
                    .map(|t| self.resolve_type(t))
                    .unwrap_or_else(Type::error),
                has_default: p.default.is_some(),
            })
            .collect();
        let ret = match (&f.return_type, &f.body) {
            (Some(t), _) => self.resolve_type(t),
            (None, Some(FunBody::Expr(_))) => Type::error(), // inferred in order
            _ => Type::unit(),
        };
        self.type_params.pop();
        FunctionSig {
            name: f.name.name.clone(),
            type_params,
            receiver,
            params,
            ret,
            is_operator: f.modifiers.is_operator,
            is_infix: f.modifiers.is_infix,
            is_inline: f.modifiers.is_inline,
            is_abstract: f.body.is_none(),
            is_override: f.modifiers.is_override,
            decl_id: Some(f.id),
        }
    }

    fn link_sealed_subtypes(&mut self) {
        let mut edges: Vec<(String, String)> = Vec::new();
        for (name, _) in self.classes.iter() {
            if let Some(sup) = self.registry.super_class(name) {
                if self.classes.get(sup).map(|c| c.is_sealed).unwrap_or(false) {
                    edges.push((sup.to_string(), name.clone()));
                }
            }
        }
        for (sup, sub) in edges {
            if let Some(info) = self.classes.get_mut(&sup) {
                info.sealed_subtypes.push(sub);
            }
        }
    }

    /// The self type of a class: its name applied to its own parameters.
    fn self_type_of(&self, name: &str) -> Type {
        let args = self
            .classes
            .get(name)
            .map(|info| {
                info.type_params
                    .iter()
                    .map(|p| TypeArg::invariant(Type::param(p.name.clone(), None)))
                    .collect()
            })
            .unwrap_or_default();
        Type::class_with(name, args)
    }

    // ══════════════════════════════════════════════════════════════════
    // Type reference resolution
    // ══════════════════════════════════════════════════════════════════

    fn lookup_type_param(&self, name: &str) -> Option<&TypeParamInfo> {
        self.type_params
            .iter()
            .rev()
            .find_map(|scope| scope.iter().find(|p| p.name == name))
    }

    pub(crate) fn resolve_type(&mut self, type_ref: &TypeRef) -> Type {
        match &type_ref.kind {
            TypeRefKind::Simple { name } => self.resolve_named_type(name, &[], type_ref.span),
            TypeRefKind::Nullable(inner) => {
                let inner_ty = self.resolve_type(inner);
                inner_ty.with_nullable(true)
            }
            TypeRefKind::Generic { name, args } => {
                let resolved: Vec<TypeArg> = args
                    .iter()
                    .map(|arg| match &arg.ty {
                        None => TypeArg::star(),
                        Some(t) => TypeArg {
                            variance: arg.variance,
                            ty: Some(self.resolve_type(t)),
                        },
                    })
                    .collect();
                self.resolve_named_type(name, &resolved, type_ref.span)
            }
            TypeRefKind::Function {
                receiver,
                params,
                ret,
                ..
            } => {
                let receiver = receiver.as_ref().map(|r| Box::new(self.resolve_type(r)));
                let params = params.iter().map(|p| self.resolve_type(p)).collect();
                let ret = Box::new(self.resolve_type(ret));
                Type::new(TypeKind::Function {
                    receiver,
                    params,
                    ret,
                })
            }
        }
    }

    fn resolve_named_type(&mut self, name: &str, args: &[TypeArg], span: Span) -> Type {
        match name {
            "$error" => return Type::error(),
            "Int" => return Type::int(),
            "Long" => return Type::long(),
            "Float" => return Type::float(),
            "Double" => return Type::double(),
            "Boolean" => return Type::boolean(),
            "Char" => return Type::char(),
            "Unit" => return Type::unit(),
            "Nothing" => return Type::nothing(),
            "Any" => return Type::any(),
            _ => {}
        }

        if let Some(param) = self.lookup_type_param(name) {
            let bound = param.bound.clone();
            return Type::param(name, bound);
        }

        if let Some((alias_params, target)) = self.aliases.get(name).cloned() {
            if alias_params.len() != args.len() {
                self.report(SemaError::TypeArgumentArity {
                    name: name.to_string(),
                    expected: alias_params.len(),
                    found: args.len(),
                    span,
                });
                return Type::error();
            }
            let mut target_ty = {
                // Alias parameters are in scope while resolving the target.
                self.type_params.push(
                    alias_params
                        .iter()
                        .map(|p| TypeParamInfo {
                            name: p.clone(),
                            variance: Variance::Invariant,
                            bound: None,
                            reified: false,
                        })
                        .collect(),
                );
                let t = self.resolve_type(&target);
                self.type_params.pop();
                t
            };
            let binding: FxHashMap<String, Type> = alias_params
                .iter()
                .zip(args)
                .map(|(p, a)| {
                    (
                        p.clone(),
                        a.ty.clone().unwrap_or_else(Type::any),
                    )
                })
                .collect();
            target_ty = subst(&target_ty, &binding);
            return target_ty;
        }

        if let Some(info) = self.classes.get(name) {
            if !info.type_params.is_empty() && !args.is_empty() && info.type_params.len() != args.len()
            {
                self.report(SemaError::TypeArgumentArity {
                    name: name.to_string(),
                    expected: info.type_params.len(),
                    found: args.len(),
                    span,
                });
            }
            return Type::class_with(name, args.to_vec());
        }

        if self.registry.contains(name) || self.imports.contains_key(name) {
            return Type::class_with(name, args.to_vec());
        }

        self.report(SemaError::UnknownType {
            name: name.to_string(),
            span,
        });
        Type::error()
    }

    // ══════════════════════════════════════════════════════════════════
    // Subtyping / assignability
    // ══════════════════════════════════════════════════════════════════

    /// Whether `from` may be assigned to `to`, including implicit numeric
    /// widening and the universal error/Nothing rules.
    fn assignable(&self, from: &Type, to: &Type) -> bool {
        if from.is_error() || to.is_error() {
            return true;
        }
        // null flows only into nullable targets.
        if from.nullable && !to.nullable {
            return false;
        }
        if from.is_nothing() {
            return true;
        }
        match (&from.kind, &to.kind) {
            (TypeKind::Unit, TypeKind::Unit) => true,
            (_, TypeKind::Class { name, .. }) if name == "Any" => true,
            (TypeKind::Primitive(a), TypeKind::Primitive(b)) => {
                if a == b {
                    return true;
                }
                // Implicit widening: target rank >= source rank.
                match (a.rank(), b.rank()) {
                    (Some(ra), Some(rb)) => rb >= ra,
                    _ => false,
                }
            }
            (TypeKind::Primitive(p), TypeKind::Class { name, .. }) => {
                self.registry.is_subtype(p.name(), name)
            }
            (TypeKind::Class { name: from_name, args: from_args }, TypeKind::Class { name: to_name, args: to_args }) => {
                if !self.registry.is_subtype(from_name, to_name) {
                    return false;
                }
                if from_name != to_name || to_args.is_empty() || from_args.is_empty() {
                    // Across an inheritance edge type arguments are not
                    // tracked; accept.
                    return true;
                }
                from_args.len() == to_args.len()
                    && from_args.iter().zip(to_args).all(|(f, t)| self.arg_matches(f, t))
            }
            (TypeKind::Function { params: fp, ret: fr, .. }, TypeKind::Function { params: tp, ret: tr, .. }) => {
                fp.len() == tp.len()
                    && tp.iter().zip(fp).all(|(t, f)| self.assignable(t, f))
                    && self.assignable(fr, tr)
            }
            (TypeKind::Param { name: a, .. }, TypeKind::Param { name: b, .. }) => a == b,
            (TypeKind::Param { bound, .. }, _) => {
                let upper = bound.as_deref().cloned().unwrap_or_else(Type::any);
                self.assignable(&upper, to)
            }
            _ => false,
        }
    }

    /// Use-site type argument compatibility.
    fn arg_matches(&self, from: &TypeArg, to: &TypeArg) -> bool {
        let Some(to_ty) = &to.ty else {
            return true; // `*` accepts anything
        };
        let Some(from_ty) = &from.ty else {
            return false; // a concrete argument is required
        };
        match to.variance {
            Variance::Out => self.assignable(from_ty, to_ty),
            Variance::In => self.assignable(to_ty, from_ty),
            Variance::Invariant => {
                // `Nothing` flows into any slot (it has no values).
                from_ty == to_ty
                    || from_ty.is_error()
                    || to_ty.is_error()
                    || (from_ty.is_nothing() && !from_ty.nullable)
            }
        }
    }

    fn check_assignable(&mut self, from: &Type, to: &Type, span: Span) {
        if !self.assignable(from, to) {
            self.report(SemaError::TypeMismatch {
                expected: to.clone(),
                found: from.clone(),
                span,
            });
        }
    }

    /// Least upper bound approximation for branch joins.
    fn lub(&self, a: &Type, b: &Type) -> Type {
        if a.is_error() {
            return b.clone();
        }
        if b.is_error() {
            return a.clone();
        }
        let nullable = a.nullable || b.nullable;
        if a.is_nothing() {
            return b.with_nullable(nullable);
        }
        if b.is_nothing() {
            return a.with_nullable(nullable);
        }
        if a.non_null() == b.non_null() {
            return a.with_nullable(nullable);
        }
        if a.rank().is_some() && b.rank().is_some() {
            return promote(a, b);
        }
        if self.assignable(&a.non_null(), &b.non_null()) {
            return b.with_nullable(nullable);
        }
        if self.assignable(&b.non_null(), &a.non_null()) {
            return a.with_nullable(nullable);
        }
        // Shared named supertype, if any; otherwise Any.
        if let (Some(an), Some(bn)) = (a.class_name(), b.class_name()) {
            let mut current = Some(an.to_string());
            while let Some(name) = current {
                if self.registry.is_subtype(bn, &name) {
                    return Type::class(name).with_nullable(nullable);
                }
                current = self.registry.super_class(&name).map(str::to_string);
            }
        }
        Type::any().with_nullable(nullable)
    }

    // ══════════════════════════════════════════════════════════════════
    // Pass 3: check
    // ══════════════════════════════════════════════════════════════════

    fn check_program(&mut self, program: &Program) {
        for decl in &program.decls {
            self.check_decl(decl);
        }
    }

    fn check_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Fun(f) => self.check_function(f, None),
            Decl::Property(p) => self.check_top_level_property(p),
            Decl::Class(c) => self.check_class(c),
            Decl::Interface(i) => self.check_interface(i),
            Decl::Object(o) => self.check_object(o, None),
            Decl::Enum(e) => self.check_enum(e),
            Decl::TypeAlias(_) => {}
            Decl::Destructuring(d) => self.check_destructuring(d, true),
        }
    }

    fn check_top_level_property(&mut self, p: &PropertyDecl) {
        let declared = p.ty.as_ref().map(|t| self.resolve_type(t));
        let init_ty = p
            .initializer
            .as_ref()
            .map(|init| self.check_expr(init, declared.as_ref()));
        let ty = match (&declared, &init_ty) {
            (Some(d), Some(i)) => {
                self.check_assignable(i, d, p.span);
                d.clone()
            }
            (Some(d), None) => d.clone(),
            (None, Some(i)) => i.clone(),
            (None, None) => {
                self.report(SemaError::TypeMismatch {
                    expected: Type::any(),
                    found: Type::unit(),
                    span: p.span,
                });
                Type::error()
            }
        };
        self.table.update_type(&p.name.name, ty.clone());
        self.record(p.id, ty.clone());
        self.resolve(p.id, Resolution::Global { name: p.name.name.clone() });
        if let Some(getter) = &p.getter {
            self.check_accessor(getter, &ty, false);
        }
        if let Some(setter) = &p.setter {
            self.check_accessor(setter, &ty, true);
        }
    }

    fn check_accessor(&mut self, accessor: &Accessor, property_ty: &Type, is_setter: bool) {
        self.table.push_scope();
        if is_setter {
            if let Some(param) = accessor.params.first() {
                let ty = param
                    .ty
                    .as_ref()
                    .map(|t| self.resolve_type(t))
                    .unwrap_or_else(|| property_ty.clone());
                self.record(param.id, ty.clone());
                let mut sym =
                    Symbol::new(param.name.name.clone(), SymbolKind::Parameter, ty, param.span);
                sym.used = true;
                self.table.declare(sym);
            }
        }
        let ret = if is_setter { Type::unit() } else { property_ty.clone() };
        self.return_stack.push(ret.clone());
        match &accessor.body {
            FunBody::Expr(e) => {
                let t = self.check_expr(e, Some(&ret));
                if !is_setter {
                    self.check_assignable(&t, &ret, e.span);
                }
            }
            FunBody::Block(b) => {
                self.check_block_value(b);
            }
        }
        self.return_stack.pop();
        self.pop_scope_report_unused();
    }

    fn check_class(&mut self, c: &ClassDecl) {
        let class_params = self
            .classes
            .get(&c.name.name)
            .map(|i| i.type_params.clone())
            .unwrap_or_default();
        self.type_params.push(class_params);
        self.class_stack.push(c.name.name.clone());
        self.table.push_scope();

        let self_ty = self.self_type_of(&c.name.name);
        let mut this_sym = Symbol::new("this", SymbolKind::Parameter, self_ty.clone(), c.name.span);
        this_sym.used = true;
        self.table.declare(this_sym);
        self.declare_field_symbols(&c.name.name);

        // Primary constructor parameter defaults.
        for param in &c.primary_params {
            let ty = param
                .ty
                .as_ref()
                .map(|t| self.resolve_type(t))
                .unwrap_or_else(Type::error);
            self.record(param.id, ty.clone());
            if let Some(default) = &param.default {
                let dty = self.check_expr(default, Some(&ty));
                self.check_assignable(&dty, &ty, default.span);
            }
        }

        // Supertype constructor arguments.
        for entry in &c.supertypes {
            if let Some(args) = &entry.args {
                // Scope with primary params visible.
                self.table.push_scope();
                for param in &c.primary_params {
                    let ty = self.types.get(&param.id).cloned().unwrap_or_else(Type::error);
                    let mut sym = Symbol::new(
                        param.name.name.clone(),
                        SymbolKind::Parameter,
                        ty,
                        param.span,
                    );
                    sym.used = true;
                    self.table.declare(sym);
                }
                for arg in args {
                    self.check_expr(arg, None);
                }
                self.table.pop_scope();
            }
        }

        for member in &c.members {
            self.check_member(member, &c.name.name, &c.primary_params);
        }

        self.check_override_consistency(c);
        self.variance_check_class(c);

        self.table.pop_scope();
        self.class_stack.pop();
        self.type_params.pop();
    }

    fn check_interface(&mut self, i: &InterfaceDecl) {
        let params = self
            .classes
            .get(&i.name.name)
            .map(|info| info.type_params.clone())
            .unwrap_or_default();
        self.type_params.push(params);
        self.class_stack.push(i.name.name.clone());
        self.table.push_scope();
        let self_ty = self.self_type_of(&i.name.name);
        let mut this_sym = Symbol::new("this", SymbolKind::Parameter, self_ty, i.name.span);
        this_sym.used = true;
        self.table.declare(this_sym);
        for member in &i.members {
            if let Member::Fun(f) = member {
                if f.body.is_some() {
                    self.check_function(f, Some(&i.name.name));
                } else {
                    // Signature-only member: resolve parameter types.
                    for p in &f.params {
                        let ty = p
                            .ty
                            .as_ref()
                            .map(|t| self.resolve_type(t))
                            .unwrap_or_else(Type::error);
                        self.record(p.id, ty);
                    }
                }
            }
        }
        self.variance_check_interface(i);
        self.table.pop_scope();
        self.class_stack.pop();
        self.type_params.pop();
    }

    fn check_object(&mut self, o: &ObjectDecl, outer: Option<&str>) {
        let name = match (&o.name, outer, o.is_companion) {
            (Some(n), Some(outer), true) => format!("{outer}.{}", n.name),
            (None, Some(outer), true) => format!("{outer}.Companion"),
            (Some(n), _, _) => n.name.clone(),
            (None, _, _) => return,
        };
        self.class_stack.push(name.clone());
        self.table.push_scope();
        let mut this_sym = Symbol::new("this", SymbolKind::Parameter, Type::class(name.clone()), o.span);
        this_sym.used = true;
        self.table.declare(this_sym);
        self.declare_field_symbols(&name);
        for member in &o.members {
            self.check_member(member, &name, &[]);
        }
        self.table.pop_scope();
        self.class_stack.pop();
    }

    fn check_enum(&mut self, e: &EnumDecl) {
        // Entry arguments against the primary constructor.
        let ctor = self
            .classes
            .get(&e.name.name)
            .and_then(|i| i.ctors.first().cloned());
        for entry in &e.entries {
            if let Some(ctor) = &ctor {
                let required = ctor.params.iter().filter(|p| !p.has_default).count();
                if entry.args.len() < required || entry.args.len() > ctor.params.len() {
                    self.report(SemaError::ArityMismatch {
                        name: e.name.name.clone(),
                        expected: ctor.params.len(),
                        found: entry.args.len(),
                        span: entry.span,
                    });
                }
                for (arg, param) in entry.args.iter().zip(&ctor.params) {
                    let ty = self.check_expr(arg, Some(&param.ty));
                    self.check_assignable(&ty, &param.ty, arg.span);
                }
            }
        }
        self.class_stack.push(e.name.name.clone());
        self.table.push_scope();
        let mut this_sym = Symbol::new(
            "this",
            SymbolKind::Parameter,
            Type::class(e.name.name.clone()),
            e.name.span,
        );
        this_sym.used = true;
        self.table.declare(this_sym);
        self.declare_field_symbols(&e.name.name);
        for param in &e.primary_params {
            let ty = param
                .ty
                .as_ref()
                .map(|t| self.resolve_type(t))
                .unwrap_or_else(Type::error);
            self.record(param.id, ty);
        }
        for member in &e.members {
            self.check_member(member, &e.name.name, &e.primary_params);
        }
        self.table.pop_scope();
        self.class_stack.pop();
    }

    /// Make a class's fields visible as symbols in the current scope.
    fn declare_field_symbols(&mut self, class_name: &str) {
        let fields: Vec<FieldInfo> = self
            .classes
            .get(class_name)
            .map(|i| i.fields.clone())
            .unwrap_or_default();
        for field in fields {
            let mut sym = Symbol::new(
                field.name.clone(),
                SymbolKind::Property {
                    mutable: field.mutable,
                },
                field.ty.clone(),
                Span::point(0),
            );
            sym.used = true;
            self.table.declare(sym);
        }
    }

    fn check_member(&mut self, member: &Member, owner: &str, primary_params: &[Parameter]) {
        match member {
            Member::Fun(f) => self.check_function(f, Some(owner)),
            Member::Property(p) => {
                let declared = p.ty.as_ref().map(|t| self.resolve_type(t));
                let init_ty = p
                    .initializer
                    .as_ref()
                    .map(|init| self.check_expr(init, declared.as_ref()));
                let ty = match (&declared, &init_ty) {
                    (Some(d), Some(i)) => {
                        self.check_assignable(i, d, p.span);
                        d.clone()
                    }
                    (Some(d), None) => d.clone(),
                    (None, Some(i)) => i.clone(),
                    (None, None) => Type::error(),
                };
                // Backfill inferred member property types.
                if declared.is_none() {
                    if let Some(info) = self.classes.get_mut(owner) {
                        if let Some(field) = info.fields.iter_mut().find(|f| f.name == p.name.name)
                        {
                            field.ty = ty.clone();
                        }
                    }
                    self.table.update_type(&p.name.name, ty.clone());
                }
                self.record(p.id, ty.clone());
                if let Some(getter) = &p.getter {
                    self.check_accessor(getter, &ty, false);
                }
                if let Some(setter) = &p.setter {
                    self.check_accessor(setter, &ty, true);
                }
            }
            Member::Constructor(ctor) => {
                self.table.push_scope();
                for param in &ctor.params {
                    let ty = param
                        .ty
                        .as_ref()
                        .map(|t| self.resolve_type(t))
                        .unwrap_or_else(Type::error);
                    self.record(param.id, ty.clone());
                    self.table.declare(Symbol::new(
                        param.name.name.clone(),
                        SymbolKind::Parameter,
                        ty,
                        param.span,
                    ));
                }
                if let Some(delegation) = &ctor.delegation {
                    for arg in &delegation.args {
                        self.check_expr(arg, None);
                    }
                }
                if let Some(body) = &ctor.body {
                    self.return_stack.push(Type::unit());
                    self.check_block_value(body);
                    self.return_stack.pop();
                }
                self.pop_scope_report_unused();
            }
            Member::Init(init) => {
                // Primary parameters are visible inside init blocks.
                self.table.push_scope();
                for param in primary_params {
                    let ty = self.types.get(&param.id).cloned().unwrap_or_else(Type::error);
                    let mut sym = Symbol::new(
                        param.name.name.clone(),
                        SymbolKind::Parameter,
                        ty,
                        param.span,
                    );
                    sym.used = true;
                    self.table.declare(sym);
                }
                self.return_stack.push(Type::unit());
                self.check_block_value(&init.body);
                self.return_stack.pop();
                self.table.pop_scope();
            }
            Member::Class(c) => self.check_class(c),
            Member::Object(o) => {
                if o.is_companion {
                    self.check_object(o, Some(owner));
                } else {
                    self.check_object(o, None);
                }
            }
            Member::Enum(e) => self.check_enum(e),
        }
    }

    /// Flag `override` members that override nothing and hidden members
    /// missing the modifier.
    fn check_override_consistency(&mut self, c: &ClassDecl) {
        let Some(super_name) = self.registry.super_class(&c.name.name).map(str::to_string)
        else {
            return;
        };
        let mut super_methods: FxHashSet<String> = FxHashSet::default();
        let mut current = Some(super_name);
        while let Some(name) = current {
            if let Some(info) = self.classes.get(&name) {
                for m in &info.methods {
                    super_methods.insert(m.name.clone());
                }
            }
            current = self.registry.super_class(&name).map(str::to_string);
        }
        for member in &c.members {
            if let Member::Fun(f) = member {
                let in_super = super_methods.contains(&f.name.name);
                if f.modifiers.is_override && !in_super {
                    self.report(SemaError::OverridesNothing {
                        name: f.name.name.clone(),
                        span: f.name.span,
                    });
                }
                if !f.modifiers.is_override && in_super {
                    self.report(SemaError::MissingOverrideModifier {
                        name: f.name.name.clone(),
                        span: f.name.span,
                    });
                }
            }
        }
    }

    fn check_function(&mut self, f: &FunDecl, owner: Option<&str>) {
        self.variance_check_function(f);
        let mut type_params = self.type_param_infos(&f.type_params);
        self.type_params.push(type_params.clone());
        for (info, p) in type_params.iter_mut().zip(&f.type_params) {
            info.bound = p.upper_bound.as_ref().map(|b| self.resolve_type(b));
        }
        *self.type_params.last_mut().unwrap() = type_params;

        self.table.push_scope();

        // Extension receiver becomes `this`.
        if let Some(receiver) = &f.receiver {
            let ty = self.resolve_type(receiver);
            let mut sym = Symbol::new("this", SymbolKind::Parameter, ty, receiver.span);
            sym.used = true;
            self.table.declare(sym);
        }

        for param in &f.params {
            let ty = param
                .ty
                .as_ref()
                .map(|t| self.resolve_type(t))
                .unwrap_or_else(Type::error);
            self.record(param.id, ty.clone());
            if let Some(default) = &param.default {
                let dty = self.check_expr(default, Some(&ty));
                self.check_assignable(&dty, &ty, default.span);
            }
            if self
                .table
                .declare(Symbol::new(
                    param.name.name.clone(),
                    SymbolKind::Parameter,
                    ty,
                    param.name.span,
                ))
                .is_some()
            {
                self.report(SemaError::DuplicateDefinition {
                    name: param.name.name.clone(),
                    span: param.name.span,
                });
            }
        }

        let declared_ret = f.return_type.as_ref().map(|t| self.resolve_type(t));
        let ret = declared_ret.clone().unwrap_or_else(|| match &f.body {
            Some(FunBody::Expr(_)) => Type::error(), // inferred below
            _ => Type::unit(),
        });
        self.return_stack.push(ret.clone());

        let inferred = match &f.body {
            Some(FunBody::Expr(e)) => {
                let t = self.check_expr(e, declared_ret.as_ref());
                if let Some(declared) = &declared_ret {
                    self.check_assignable(&t, declared, e.span);
                    declared.clone()
                } else {
                    t
                }
            }
            Some(FunBody::Block(block)) => {
                self.check_block_value(block);
                let ret = declared_ret.clone().unwrap_or_else(Type::unit);
                if !ret.is_unit() && !ret.is_nothing() && !ret.is_error() && !block_exits(block, &self.types)
                {
                    self.report(SemaError::MissingReturn {
                        name: f.name.name.clone(),
                        ret: ret.clone(),
                        span: f.name.span,
                    });
                }
                ret
            }
            None => declared_ret.clone().unwrap_or_else(Type::unit),
        };

        self.return_stack.pop();
        self.pop_scope_report_unused();
        self.type_params.pop();

        // Backfill inferred expression-body returns so later callers see
        // the real type.
        if declared_ret.is_none() && matches!(f.body, Some(FunBody::Expr(_))) {
            self.update_signature_ret(f.id, owner, &f.name.name, inferred.clone());
        }

        let fn_ty = Type::function(
            f.params
                .iter()
                .map(|p| self.types.get(&p.id).cloned().unwrap_or_else(Type::error))
                .collect(),
            inferred.clone(),
        );
        self.record(f.id, fn_ty);
    }

    fn update_signature_ret(&mut self, id: NodeId, owner: Option<&str>, name: &str, ret: Type) {
        if let Some(owner) = owner {
            if let Some(info) = self.classes.get_mut(owner) {
                for m in info.methods.iter_mut() {
                    if m.decl_id == Some(id) {
                        m.ret = ret.clone();
                    }
                }
            }
        }
        if let Some(group) = self.functions.get_mut(name) {
            for sig in group.iter_mut() {
                if sig.decl_id == Some(id) {
                    sig.ret = ret.clone();
                }
            }
        }
    }

    fn pop_scope_report_unused(&mut self) {
        let symbols = self.table.pop_scope();
        for sym in symbols {
            let is_local = matches!(sym.kind, SymbolKind::Variable { .. });
            if is_local && !sym.used && !sym.name.starts_with('_') {
                self.report(SemaError::UnusedVariable {
                    name: sym.name,
                    span: sym.span,
                });
            }
        }
    }

    // ── Statements ─────────────────────────────────────────────────────

    /// Check a block and return the value of its trailing expression
    /// statement (`Unit` otherwise).
    fn check_block_value(&mut self, block: &Block) -> Type {
        self.table.push_scope();
        let ty = self.check_stmts(&block.stmts);
        self.pop_scope_report_unused();
        ty
    }

    fn check_stmts(&mut self, stmts: &[Stmt]) -> Type {
        let mut ty = Type::unit();
        let mut exited = false;
        let mut reported_unreachable = false;
        for stmt in stmts {
            if exited && !reported_unreachable {
                self.report(SemaError::UnreachableCode { span: stmt.span() });
                reported_unreachable = true;
            }
            ty = self.check_stmt(stmt);
            if self.stmt_exits(stmt) {
                exited = true;
            }
        }
        ty
    }

    fn stmt_exits(&self, stmt: &Stmt) -> bool {
        match stmt {
            Stmt::Return(_) | Stmt::Throw(_) | Stmt::Break(_) | Stmt::Continue(_) => true,
            Stmt::Expr(e) => self
                .types
                .get(&e.id)
                .map(|t| t.is_nothing() && !t.nullable)
                .unwrap_or(false),
            Stmt::If(i) => match &i.else_branch {
                Some(ElseBranch::Block(b)) => {
                    block_exits(&i.then_block, &self.types) && block_exits(b, &self.types)
                }
                Some(ElseBranch::If(nested)) => {
                    block_exits(&i.then_block, &self.types)
                        && self.stmt_exits(&Stmt::If((**nested).clone()))
                }
                None => false,
            },
            Stmt::Block(b) => block_exits(b, &self.types),
            _ => false,
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Type {
        match stmt {
            Stmt::Expr(e) => self.check_expr(e, None),
            Stmt::Decl(decl) => {
                self.check_local_decl(decl);
                Type::unit()
            }
            Stmt::If(i) => {
                self.check_if_stmt(i);
                Type::unit()
            }
            Stmt::When(w) => {
                self.check_when(&w.when, w.span, false);
                Type::unit()
            }
            Stmt::For(f) => {
                self.check_for(f);
                Type::unit()
            }
            Stmt::While(w) => {
                let cond_ty = self.check_expr(&w.cond, Some(&Type::boolean()));
                self.require_boolean(&cond_ty, w.cond.span);
                self.loop_stack.push(w.label.as_ref().map(|l| l.name.clone()));
                self.check_block_value(&w.body);
                self.loop_stack.pop();
                Type::unit()
            }
            Stmt::DoWhile(d) => {
                self.loop_stack.push(d.label.as_ref().map(|l| l.name.clone()));
                self.check_block_value(&d.body);
                self.loop_stack.pop();
                let cond_ty = self.check_expr(&d.cond, Some(&Type::boolean()));
                self.require_boolean(&cond_ty, d.cond.span);
                Type::unit()
            }
            Stmt::Try(t) => {
                self.check_block_value(&t.body);
                for catch in &t.catches {
                    self.check_catch(catch);
                }
                if let Some(finally) = &t.finally {
                    self.check_block_value(finally);
                }
                Type::unit()
            }
            Stmt::Return(r) => {
                self.check_return(r.value.as_ref(), r.span);
                Type::unit()
            }
            Stmt::Break(b) => {
                self.check_loop_jump(b.label.as_ref(), b.span, true);
                Type::unit()
            }
            Stmt::Continue(c) => {
                self.check_loop_jump(c.label.as_ref(), c.span, false);
                Type::unit()
            }
            Stmt::Throw(t) => {
                let ty = self.check_expr(&t.value, None);
                self.require_throwable(&ty, t.value.span);
                Type::unit()
            }
            Stmt::Guard(g) => {
                let cond_ty = self.check_expr(&g.cond, Some(&Type::boolean()));
                self.require_boolean(&cond_ty, g.cond.span);
                self.check_block_value(&g.else_block);
                if !block_exits(&g.else_block, &self.types) {
                    self.report(SemaError::GuardMustExit { span: g.span });
                }
                // After a guard the positive condition holds.
                for (name, ty) in self.narrowings(&g.cond) {
                    let mut sym = Symbol::new(name, SymbolKind::Variable { mutable: false }, ty, g.span);
                    sym.used = true;
                    self.table.declare(sym);
                }
                Type::unit()
            }
            Stmt::Use(u) => {
                self.table.push_scope();
                for binding in &u.bindings {
                    let ty = self.check_expr(&binding.init, None);
                    if !ty.is_error() && !self.is_closeable(&ty) {
                        self.report(SemaError::NotCloseable {
                            ty: ty.clone(),
                            span: binding.init.span,
                        });
                    }
                    self.record(binding.id, ty.clone());
                    self.table.declare(Symbol::new(
                        binding.name.name.clone(),
                        SymbolKind::Variable { mutable: false },
                        ty,
                        binding.name.span,
                    ));
                }
                self.check_block_value(&u.body);
                self.pop_scope_report_unused();
                Type::unit()
            }
            Stmt::Block(b) => {
                self.check_block_value(b);
                Type::unit()
            }
        }
    }

    fn is_closeable(&self, ty: &Type) -> bool {
        match ty.class_name() {
            Some(name) => {
                self.registry.is_subtype(name, "Closeable")
                    || self
                        .classes
                        .get(name)
                        .map(|i| i.methods_named("close").iter().any(|m| m.params.is_empty()))
                        .unwrap_or(false)
            }
            None => false,
        }
    }

    fn check_local_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Property(p) => {
                let declared = p.ty.as_ref().map(|t| self.resolve_type(t));
                let init_ty = p
                    .initializer
                    .as_ref()
                    .map(|init| self.check_expr(init, declared.as_ref()));
                let ty = match (&declared, &init_ty) {
                    (Some(d), Some(i)) => {
                        self.check_assignable(i, d, p.span);
                        d.clone()
                    }
                    (Some(d), None) => d.clone(),
                    (None, Some(i)) => {
                        // `val x = null` stays Nothing? only explicitly.
                        i.clone()
                    }
                    (None, None) => Type::error(),
                };
                self.record(p.id, ty.clone());
                if self
                    .table
                    .declare(Symbol::new(
                        p.name.name.clone(),
                        SymbolKind::Variable { mutable: p.mutable },
                        ty,
                        p.name.span,
                    ))
                    .is_some()
                {
                    self.report(SemaError::DuplicateDefinition {
                        name: p.name.name.clone(),
                        span: p.name.span,
                    });
                }
            }
            Decl::Destructuring(d) => self.check_destructuring(d, false),
            Decl::Fun(f) => {
                let sig = self.function_signature(f);
                self.functions.entry(f.name.name.clone()).or_default().push(sig);
                self.check_function(f, None);
            }
            other => self.check_decl(other),
        }
    }

    fn check_destructuring(&mut self, d: &DestructuringDecl, _top_level: bool) {
        let init_ty = self.check_expr(&d.initializer, None);
        let components = self.component_types(&init_ty, d.names.len());
        match components {
            Some(types) => {
                for ((name, id), ty) in d.names.iter().zip(&d.name_ids).zip(types) {
                    self.types.insert(*id, ty.clone());
                    if let Some(name) = name {
                        self.table.declare(Symbol::new(
                            name.name.clone(),
                            SymbolKind::Variable { mutable: d.mutable },
                            ty,
                            name.span,
                        ));
                    }
                }
            }
            None => {
                if !init_ty.is_error() {
                    self.report(SemaError::DestructuringArity {
                        expected: d.names.len(),
                        found: 0,
                        span: d.span,
                    });
                }
                for id in &d.name_ids {
                    self.types.insert(*id, Type::error());
                }
                for name in d.names.iter().flatten() {
                    self.table.declare(Symbol::new(
                        name.name.clone(),
                        SymbolKind::Variable { mutable: d.mutable },
                        Type::error(),
                        name.span,
                    ));
                }
            }
        }
    }

    /// Positional component types for destructuring.
    fn component_types(&mut self, ty: &Type, n: usize) -> Option<Vec<Type>> {
        if ty.is_error() {
            return Some(vec![Type::error(); n]);
        }
        let name = ty.class_name()?;
        let info = self.classes.get(name)?;
        let binding = class_binding(info, ty);
        match name {
            "Pair" if n <= 2 => {
                let fields: Vec<Type> = info.fields.iter().map(|f| subst(&f.ty, &binding)).collect();
                Some(fields.into_iter().take(n).collect())
            }
            "Triple" if n <= 3 => {
                let fields: Vec<Type> = info.fields.iter().map(|f| subst(&f.ty, &binding)).collect();
                Some(fields.into_iter().take(n).collect())
            }
            "List" => {
                let element = ty
                    .type_args()
                    .first()
                    .and_then(|a| a.ty.clone())
                    .unwrap_or_else(Type::any);
                Some(vec![element; n])
            }
            _ if info.is_data => {
                if info.fields.len() < n {
                    return None;
                }
                Some(
                    info.fields
                        .iter()
                        .take(n)
                        .map(|f| subst(&f.ty, &binding))
                        .collect(),
                )
            }
            _ => None,
        }
    }

    fn check_if_stmt(&mut self, i: &IfStmt) {
        let cond_ty = self.check_expr(&i.cond, Some(&Type::boolean()));
        self.require_boolean(&cond_ty, i.cond.span);

        self.table.push_scope();
        for (name, ty) in self.narrowings(&i.cond) {
            let mut sym = Symbol::new(name, SymbolKind::Variable { mutable: false }, ty, i.span);
            sym.used = true;
            self.table.declare(sym);
        }
        self.check_block_value(&i.then_block);
        self.table.pop_scope();

        match &i.else_branch {
            Some(ElseBranch::Block(b)) => {
                self.check_block_value(b);
            }
            Some(ElseBranch::If(nested)) => self.check_if_stmt(nested),
            None => {}
        }
    }

    fn check_for(&mut self, f: &ForStmt) {
        let iter_ty = self.check_expr(&f.iterable, None);
        let element = self.element_type(&iter_ty, f.iterable.span);

        self.table.push_scope();
        if f.bindings.len() == 1 {
            self.types.insert(f.binding_ids[0], element.clone());
            if let Some(name) = &f.bindings[0] {
                self.table.declare(Symbol::new(
                    name.name.clone(),
                    SymbolKind::Variable { mutable: false },
                    element.clone(),
                    name.span,
                ));
            }
        } else {
            let components = self
                .component_types(&element, f.bindings.len())
                .unwrap_or_else(|| vec![Type::error(); f.bindings.len()]);
            for ((name, id), ty) in f.bindings.iter().zip(&f.binding_ids).zip(components) {
                self.types.insert(*id, ty.clone());
                if let Some(name) = name {
                    self.table.declare(Symbol::new(
                        name.name.clone(),
                        SymbolKind::Variable { mutable: false },
                        ty,
                        name.span,
                    ));
                }
            }
        }

        self.loop_stack.push(f.label.as_ref().map(|l| l.name.clone()));
        self.check_block_value(&f.body);
        self.loop_stack.pop();
        self.pop_scope_report_unused();
    }

    /// Element type when iterating a value of `ty`.
    fn element_type(&mut self, ty: &Type, span: Span) -> Type {
        if ty.is_error() {
            return Type::error();
        }
        match ty.class_name() {
            Some("IntRange") => Type::int(),
            Some("LongRange") => Type::long(),
            Some("CharRange") => Type::char(),
            Some("String") => Type::char(),
            Some("List") | Some("Set") | Some("Iterable") => ty
                .type_args()
                .first()
                .and_then(|a| a.ty.clone())
                .unwrap_or_else(Type::any),
            Some("Map") => {
                let k = ty
                    .type_args()
                    .first()
                    .and_then(|a| a.ty.clone())
                    .unwrap_or_else(Type::any);
                let v = ty
                    .type_args()
                    .get(1)
                    .and_then(|a| a.ty.clone())
                    .unwrap_or_else(Type::any);
                Type::pair(k, v)
            }
            Some(name) if self.registry.is_subtype(name, "Iterable") => ty
                .type_args()
                .first()
                .and_then(|a| a.ty.clone())
                .unwrap_or_else(Type::any),
            _ => {
                self.report(SemaError::NotIterable {
                    ty: ty.clone(),
                    span,
                });
                Type::error()
            }
        }
    }

    fn check_catch(&mut self, catch: &CatchClause) {
        let ty = self.resolve_type(&catch.ty);
        self.require_throwable(&ty, catch.ty.span);
        self.types.insert(catch.param.id, ty.clone());
        self.table.push_scope();
        self.table.declare(Symbol::new(
            catch.param.name.name.clone(),
            SymbolKind::Parameter,
            ty,
            catch.param.name.span,
        ));
        self.check_block_value(&catch.body);
        self.table.pop_scope();
    }

    fn check_return(&mut self, value: Option<&Expr>, span: Span) {
        let Some(expected) = self.return_stack.last().cloned() else {
            self.report(SemaError::UnresolvedIdentifier {
                name: "return".into(),
                span,
            });
            if let Some(value) = value {
                self.check_expr(value, None);
            }
            return;
        };
        match value {
            Some(value) => {
                let ty = self.check_expr(value, Some(&expected));
                self.check_assignable(&ty, &expected, value.span);
            }
            None => {
                if !expected.is_unit() && !expected.is_error() {
                    self.report(SemaError::TypeMismatch {
                        expected,
                        found: Type::unit(),
                        span,
                    });
                }
            }
        }
    }

    fn check_loop_jump(&mut self, label: Option<&Ident>, span: Span, is_break: bool) {
        if self.loop_stack.is_empty() {
            if is_break {
                self.report(SemaError::BreakOutsideLoop { span });
            } else {
                self.report(SemaError::ContinueOutsideLoop { span });
            }
            return;
        }
        if let Some(label) = label {
            let found = self
                .loop_stack
                .iter()
                .any(|l| l.as_deref() == Some(label.name.as_str()));
            if !found {
                self.report(SemaError::UnknownLabel {
                    label: label.name.clone(),
                    span: label.span,
                });
            }
        }
    }

    fn require_boolean(&mut self, ty: &Type, span: Span) {
        if !ty.is_error() && !ty.is_boolean() {
            self.report(SemaError::ConditionNotBoolean {
                found: ty.clone(),
                span,
            });
        }
    }

    fn require_throwable(&mut self, ty: &Type, span: Span) {
        if ty.is_error() {
            return;
        }
        let ok = ty
            .class_name()
            .map(|n| self.registry.is_subtype(n, "Throwable"))
            .unwrap_or(false);
        if !ok || ty.nullable {
            self.report(SemaError::NotThrowable {
                ty: ty.clone(),
                span,
            });
        }
    }

    /// Positive-branch narrowings for a condition: `x != null`, `x is T`,
    /// conjunctions thereof.
    fn narrowings(&mut self, cond: &Expr) -> Vec<(String, Type)> {
        let mut out = Vec::new();
        self.collect_narrowings(cond, &mut out);
        out
    }

    fn collect_narrowings(&mut self, cond: &Expr, out: &mut Vec<(String, Type)>) {
        match &cond.kind {
            ExprKind::Binary {
                op: ast::BinaryOp::And,
                lhs,
                rhs,
                ..
            } => {
                self.collect_narrowings(lhs, out);
                self.collect_narrowings(rhs, out);
            }
            ExprKind::Binary {
                op: ast::BinaryOp::Ne,
                lhs,
                rhs,
                ..
            } => {
                let (name_expr, other) = (lhs, rhs);
                if let (ExprKind::Name(n), ExprKind::Literal(LiteralKind::Null)) =
                    (&name_expr.kind, &other.kind)
                {
                    if let Some(sym) = self.table.lookup(&n.name) {
                        out.push((n.name.clone(), sym.ty.non_null()));
                    }
                } else if let (ExprKind::Literal(LiteralKind::Null), ExprKind::Name(n)) =
                    (&lhs.kind, &rhs.kind)
                {
                    if let Some(sym) = self.table.lookup(&n.name) {
                        out.push((n.name.clone(), sym.ty.non_null()));
                    }
                }
            }
            ExprKind::TypeCheck {
                operand,
                ty,
                negated: false,
            } => {
                if let ExprKind::Name(n) = &operand.kind {
                    let narrowed = self.resolve_type(ty);
                    out.push((n.name.clone(), narrowed));
                }
            }
            _ => {}
        }
    }

    // ══════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════

    fn check_expr(&mut self, e: &Expr, expected: Option<&Type>) -> Type {
        let ty = self.check_expr_inner(e, expected);
        self.record(e.id, ty)
    }

    fn check_expr_inner(&mut self, e: &Expr, expected: Option<&Type>) -> Type {
        match &e.kind {
            ExprKind::Literal(lit) => self.literal_type(lit),
            ExprKind::Name(ident) => self.check_name(e, ident),
            ExprKind::This { .. } => match self.table.lookup_and_use("this") {
                Some(sym) => sym.ty,
                None => {
                    self.report(SemaError::ThisOutsideClass { span: e.span });
                    Type::error()
                }
            },
            ExprKind::Super { .. } => {
                let Some(class) = self.class_stack.last().cloned() else {
                    self.report(SemaError::SuperOutsideClass { span: e.span });
                    return Type::error();
                };
                match self.registry.super_class(&class) {
                    Some(sup) => Type::class(sup.to_string()),
                    None => Type::any(),
                }
            }
            ExprKind::Binary {
                op,
                negated,
                lhs,
                rhs,
            } => self.check_binary(e, *op, *negated, lhs, rhs),
            ExprKind::InfixCall { name, lhs, rhs } => self.check_infix_call(e, name, lhs, rhs),
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, e.span),
            ExprKind::Postfix { operand, .. } => {
                let ty = self.check_expr(operand, None);
                if !ty.is_error() && ty.rank().is_none() {
                    self.report(SemaError::OperatorTypeMismatch {
                        op: "++".into(),
                        lhs: ty.clone(),
                        rhs: ty.clone(),
                        span: e.span,
                    });
                }
                self.require_assignable_target(operand);
                ty
            }
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.check_call(e, callee, type_args, args, None, false),
            ExprKind::Index { target, indices } => self.check_index(e, target, indices, false),
            ExprKind::SafeIndex { target, indices } => self.check_index(e, target, indices, true),
            ExprKind::Slice {
                target,
                start,
                end,
                ..
            } => {
                let target_ty = self.check_expr(target, None);
                if let Some(start) = start {
                    let t = self.check_expr(start, Some(&Type::int()));
                    self.check_assignable(&t, &Type::int(), start.span);
                }
                if let Some(end) = end {
                    let t = self.check_expr(end, Some(&Type::int()));
                    self.check_assignable(&t, &Type::int(), end.span);
                }
                match target_ty.class_name() {
                    Some("List") => target_ty.clone(),
                    Some("String") => Type::string(),
                    _ if target_ty.is_error() => Type::error(),
                    _ => {
                        self.report(SemaError::UnknownMember {
                            ty: target_ty.clone(),
                            name: "slice".into(),
                            span: e.span,
                        });
                        Type::error()
                    }
                }
            }
            ExprKind::Member { target, name } => self.check_member_access(e, target, name, false),
            ExprKind::SafeMember { target, name } => {
                self.check_member_access(e, target, name, true)
            }
            ExprKind::SafeBlock { target, block } => {
                let target_ty = self.check_expr(target, None);
                if !target_ty.nullable && !target_ty.is_error() {
                    self.report(SemaError::UnnecessarySafeCall {
                        ty: target_ty.clone(),
                        span: target.span,
                    });
                }
                self.table.push_scope();
                let mut sym = Symbol::new(
                    "this",
                    SymbolKind::Parameter,
                    target_ty.non_null(),
                    target.span,
                );
                sym.used = true;
                self.table.declare(sym);
                let block_ty = self.check_block_value(block);
                self.table.pop_scope();
                block_ty.with_nullable(true)
            }
            ExprKind::Elvis { lhs, rhs } => {
                let lhs_ty = self.check_expr(lhs, expected);
                let non_null = lhs_ty.non_null();
                let rhs_ty = self.check_expr(rhs, Some(&non_null));
                if rhs_ty.is_nothing() && !rhs_ty.nullable {
                    non_null
                } else {
                    self.lub(&non_null, &rhs_ty)
                }
            }
            ExprKind::NotNull { operand } => {
                let ty = self.check_expr(operand, None);
                if !ty.nullable && !ty.is_error() {
                    self.report(SemaError::UnnecessaryNotNull {
                        ty: ty.clone(),
                        span: e.span,
                    });
                }
                ty.non_null()
            }
            ExprKind::Propagate { operand } => {
                let ty = self.check_expr(operand, None);
                if ty.is_error() {
                    return Type::error();
                }
                if ty.class_name() != Some("Result") {
                    self.report(SemaError::PropagateOnNonResult {
                        found: ty.clone(),
                        span: e.span,
                    });
                    return Type::error();
                }
                let ok_ty = ty
                    .type_args()
                    .first()
                    .and_then(|a| a.ty.clone())
                    .unwrap_or_else(Type::any);
                if let Some(ret) = self.return_stack.last() {
                    if !ret.is_error() && ret.class_name() != Some("Result") {
                        self.report(SemaError::PropagateIncompatibleReturn {
                            fn_ret: ret.clone(),
                            span: e.span,
                        });
                    }
                }
                ok_ty
            }
            ExprKind::Assign { op, target, value } => self.check_assign(*op, target, value, e.span),
            ExprKind::Lambda { params, body } => self.check_lambda(params, body, expected),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_ty = self.check_expr(cond, Some(&Type::boolean()));
                self.require_boolean(&cond_ty, cond.span);
                self.table.push_scope();
                for (name, ty) in self.narrowings(cond) {
                    let mut sym =
                        Symbol::new(name, SymbolKind::Variable { mutable: false }, ty, e.span);
                    sym.used = true;
                    self.table.declare(sym);
                }
                let then_ty = self.check_expr(then_branch, expected);
                self.table.pop_scope();
                match else_branch {
                    Some(else_branch) => {
                        let else_ty = self.check_expr(else_branch, expected);
                        self.lub(&then_ty, &else_ty)
                    }
                    None => {
                        if expected.map(|t| !t.is_unit()).unwrap_or(false) {
                            self.report(SemaError::IfExpressionMissingElse { span: e.span });
                        }
                        Type::unit()
                    }
                }
            }
            ExprKind::When(when) => self.check_when(when, e.span, true),
            ExprKind::Try {
                body,
                catches,
                finally,
            } => {
                let mut ty = self.check_block_value(body);
                for catch in catches {
                    let catch_ty = {
                        let param_ty = self.resolve_type(&catch.ty);
                        self.require_throwable(&param_ty, catch.ty.span);
                        self.types.insert(catch.param.id, param_ty.clone());
                        self.table.push_scope();
                        self.table.declare(Symbol::new(
                            catch.param.name.name.clone(),
                            SymbolKind::Parameter,
                            param_ty,
                            catch.param.name.span,
                        ));
                        let t = self.check_block_value(&catch.body);
                        self.table.pop_scope();
                        t
                    };
                    ty = self.lub(&ty, &catch_ty);
                }
                if let Some(finally) = finally {
                    self.check_block_value(finally);
                }
                ty
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond_ty = self.check_expr(cond, Some(&Type::boolean()));
                self.require_boolean(&cond_ty, cond.span);
                let then_ty = self.check_expr(then_expr, expected);
                let else_ty = self.check_expr(else_expr, expected);
                self.lub(&then_ty, &else_ty)
            }
            ExprKind::Block(block) => self.check_block_value(block),
            ExprKind::MethodRef {
                target,
                name,
                is_constructor,
            } => self.check_method_ref(e, target, name, *is_constructor),
            ExprKind::ObjectLiteral {
                supertypes,
                members,
            } => {
                let tys: Vec<Type> = supertypes.iter().map(|t| self.resolve_type(t)).collect();
                let self_ty = tys.first().cloned().unwrap_or_else(Type::any);
                self.table.push_scope();
                let mut sym = Symbol::new("this", SymbolKind::Parameter, self_ty.clone(), e.span);
                sym.used = true;
                self.table.declare(sym);
                for member in members {
                    if let Member::Fun(f) = member {
                        self.check_function(f, None);
                    } else if let Member::Property(p) = member {
                        let declared = p.ty.as_ref().map(|t| self.resolve_type(t));
                        if let Some(init) = &p.initializer {
                            let t = self.check_expr(init, declared.as_ref());
                            let ty = declared.clone().unwrap_or(t);
                            self.record(p.id, ty.clone());
                            self.table.declare(Symbol::new(
                                p.name.name.clone(),
                                SymbolKind::Property { mutable: p.mutable },
                                ty,
                                p.name.span,
                            ));
                        }
                    }
                }
                self.table.pop_scope();
                self_ty
            }
            ExprKind::CollectionLiteral {
                kind,
                elements,
                entries,
            } => self.check_collection(*kind, elements, entries, expected),
            ExprKind::StringInterp { parts } => {
                for part in parts {
                    if let InterpPart::Expr(inner) = part {
                        self.check_expr(inner, None);
                    }
                }
                Type::string()
            }
            ExprKind::Placeholder => {
                self.report(SemaError::UnresolvedIdentifier {
                    name: "_".into(),
                    span: e.span,
                });
                Type::error()
            }
            ExprKind::Spread { operand } => self.check_expr(operand, None),
            ExprKind::Range {
                lhs,
                rhs,
                step,
                ..
            } => {
                let lhs_ty = self.check_expr(lhs, None);
                let rhs_ty = self.check_expr(rhs, None);
                if let Some(step) = step {
                    let step_ty = self.check_expr(step, None);
                    if !step_ty.is_error() && step_ty.rank().is_none() {
                        self.report(SemaError::OperatorTypeMismatch {
                            op: "step".into(),
                            lhs: step_ty.clone(),
                            rhs: step_ty,
                            span: step.span,
                        });
                    }
                }
                if lhs_ty.is_error() || rhs_ty.is_error() {
                    return Type::error();
                }
                match (&lhs_ty.kind, &rhs_ty.kind) {
                    (TypeKind::Primitive(Primitive::Char), TypeKind::Primitive(Primitive::Char)) => {
                        Type::class("CharRange")
                    }
                    _ => {
                        let joined = promote(&lhs_ty, &rhs_ty);
                        match joined.kind {
                            TypeKind::Primitive(Primitive::Int) => Type::class("IntRange"),
                            TypeKind::Primitive(Primitive::Long) => Type::class("LongRange"),
                            _ => {
                                self.report(SemaError::OperatorTypeMismatch {
                                    op: "..".into(),
                                    lhs: lhs_ty,
                                    rhs: rhs_ty,
                                    span: e.span,
                                });
                                Type::error()
                            }
                        }
                    }
                }
            }
            ExprKind::Pipeline { lhs, rhs } => self.check_pipeline(lhs, rhs, e.span),
            ExprKind::Cast { operand, ty, safe } => {
                self.check_expr(operand, None);
                let target = self.resolve_type(ty);
                if *safe {
                    target.with_nullable(true)
                } else {
                    target
                }
            }
            ExprKind::TypeCheck { operand, ty, .. } => {
                self.check_expr(operand, None);
                self.resolve_type(ty);
                Type::boolean()
            }
            ExprKind::Await { operand } => {
                let ty = self.check_expr(operand, None);
                if ty.class_name() == Some("Future") {
                    ty.type_args()
                        .first()
                        .and_then(|a| a.ty.clone())
                        .unwrap_or_else(Type::any)
                } else {
                    ty
                }
            }
            ExprKind::Jump { kind, label } => {
                match kind {
                    JumpKind::Return(value) => {
                        self.check_return(value.as_deref(), e.span);
                    }
                    JumpKind::Throw(value) => {
                        let ty = self.check_expr(value, None);
                        self.require_throwable(&ty, value.span);
                    }
                    JumpKind::Break => self.check_loop_jump(label.as_ref(), e.span, true),
                    JumpKind::Continue => self.check_loop_jump(label.as_ref(), e.span, false),
                }
                Type::nothing()
            }
            ExprKind::Error => Type::error(),
        }
    }

    fn literal_type(&self, lit: &LiteralKind) -> Type {
        match lit {
            LiteralKind::Int(_) => Type::int(),
            LiteralKind::Long(_) => Type::long(),
            LiteralKind::Float(_) => Type::float(),
            LiteralKind::Double(_) => Type::double(),
            LiteralKind::Char(_) => Type::char(),
            LiteralKind::Bool(_) => Type::boolean(),
            LiteralKind::Str(_) => Type::string(),
            LiteralKind::Null => Type::null(),
        }
    }

    fn check_name(&mut self, e: &Expr, ident: &Ident) -> Type {
        if let Some(sym) = self.table.lookup_and_use(&ident.name) {
            let resolution = match sym.kind {
                SymbolKind::Variable { .. } => Resolution::Local,
                SymbolKind::Parameter => Resolution::Parameter,
                SymbolKind::Property { .. } => {
                    // Field of the enclosing class or a global.
                    if let Some(class) = self.enclosing_class_with_field(&ident.name) {
                        Resolution::Field {
                            owner: class,
                            name: ident.name.clone(),
                        }
                    } else {
                        Resolution::Global {
                            name: ident.name.clone(),
                        }
                    }
                }
                SymbolKind::Object => Resolution::Object {
                    name: ident.name.clone(),
                },
                SymbolKind::Class | SymbolKind::Interface | SymbolKind::Enum => Resolution::Class {
                    name: ident.name.clone(),
                },
                SymbolKind::BuiltinConstant => Resolution::Builtin {
                    name: ident.name.clone(),
                },
                _ => Resolution::Local,
            };
            self.resolve(e.id, resolution);
            return sym.ty;
        }

        // Function reference as a value.
        if let Some(group) = self.functions.get(&ident.name) {
            if let Some(sig) = group.first() {
                let ty = Type::function(
                    sig.params.iter().map(|p| p.ty.clone()).collect(),
                    sig.ret.clone(),
                );
                let resolution = if sig.decl_id.is_some() {
                    Resolution::TopLevelFunction {
                        name: ident.name.clone(),
                    }
                } else {
                    Resolution::Builtin {
                        name: ident.name.clone(),
                    }
                };
                self.resolve(e.id, resolution);
                return ty;
            }
        }

        if let Some(path) = self.imports.get(&ident.name).cloned() {
            self.resolve(e.id, Resolution::Import { path });
            return Type::any();
        }

        self.report(SemaError::UnresolvedIdentifier {
            name: ident.name.clone(),
            span: ident.span,
        });
        Type::error()
    }

    fn enclosing_class_with_field(&self, name: &str) -> Option<String> {
        let class = self.class_stack.last()?;
        let mut current = Some(class.clone());
        while let Some(cname) = current {
            if let Some(info) = self.classes.get(&cname) {
                if info.field(name).is_some() {
                    return Some(cname);
                }
            }
            current = self.registry.super_class(&cname).map(str::to_string);
        }
        None
    }

    fn check_binary(
        &mut self,
        e: &Expr,
        op: ast::BinaryOp,
        negated: bool,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Type {
        use ast::BinaryOp::*;
        let lhs_ty = self.check_expr(lhs, None);
        let rhs_ty = self.check_expr(rhs, None);
        if lhs_ty.is_error() || rhs_ty.is_error() {
            return match op {
                Eq | Ne | RefEq | RefNe | Lt | Gt | Le | Ge | And | Or | In => Type::boolean(),
                _ => Type::error(),
            };
        }
        let _ = negated;
        match op {
            Add => {
                // String concatenation is syntactic: either side String.
                if lhs_ty.is_string() || rhs_ty.is_string() {
                    return Type::string();
                }
                self.arith(op, &lhs_ty, &rhs_ty, e.span)
            }
            Sub | Mul | Div | Rem => self.arith(op, &lhs_ty, &rhs_ty, e.span),
            Eq | Ne | RefEq | RefNe => Type::boolean(),
            Lt | Gt | Le | Ge => {
                let numeric = lhs_ty.rank().is_some() && rhs_ty.rank().is_some();
                let comparable = match (lhs_ty.class_name(), rhs_ty.class_name()) {
                    (Some(a), Some(b)) => {
                        a == b && self.registry.is_subtype(a, "Comparable")
                    }
                    _ => {
                        matches!(
                            (&lhs_ty.kind, &rhs_ty.kind),
                            (
                                TypeKind::Primitive(Primitive::Char),
                                TypeKind::Primitive(Primitive::Char)
                            )
                        )
                    }
                };
                if !numeric && !comparable {
                    self.report(SemaError::OperatorTypeMismatch {
                        op: binary_op_name(op).into(),
                        lhs: lhs_ty,
                        rhs: rhs_ty,
                        span: e.span,
                    });
                }
                Type::boolean()
            }
            And | Or => {
                self.require_boolean(&lhs_ty, lhs.span);
                self.require_boolean(&rhs_ty, rhs.span);
                Type::boolean()
            }
            In => {
                let ok = match rhs_ty.class_name() {
                    Some("IntRange") | Some("LongRange") | Some("CharRange") => true,
                    Some("List") | Some("Set") | Some("Map") | Some("String") => true,
                    Some(name) => self
                        .classes
                        .get(name)
                        .map(|i| {
                            i.methods_named("contains")
                                .iter()
                                .any(|m| m.is_operator && m.params.len() == 1)
                        })
                        .unwrap_or(false),
                    None => false,
                };
                if !ok {
                    self.report(SemaError::OperatorTypeMismatch {
                        op: "in".into(),
                        lhs: lhs_ty,
                        rhs: rhs_ty,
                        span: e.span,
                    });
                }
                Type::boolean()
            }
            To => Type::pair(lhs_ty, rhs_ty),
        }
    }

    fn arith(&mut self, op: ast::BinaryOp, lhs: &Type, rhs: &Type, span: Span) -> Type {
        let promoted = promote(lhs, rhs);
        if promoted.is_error() {
            self.report(SemaError::OperatorTypeMismatch {
                op: binary_op_name(op).into(),
                lhs: lhs.clone(),
                rhs: rhs.clone(),
                span,
            });
        }
        promoted
    }

    fn check_infix_call(&mut self, e: &Expr, name: &Ident, lhs: &Expr, rhs: &Expr) -> Type {
        let lhs_ty = self.check_expr(lhs, None);
        let rhs_ty = self.check_expr(rhs, None);
        if lhs_ty.is_error() {
            return Type::error();
        }
        // A declared-infix member or a single-parameter extension.
        let methods = self.lookup_methods(&lhs_ty, &name.name);
        for sig in &methods {
            if sig.params.len() == 1 && self.assignable(&rhs_ty, &sig.params[0].ty) {
                self.resolve(
                    e.id,
                    Resolution::Method {
                        owner: lhs_ty.class_name().unwrap_or("Any").to_string(),
                        name: name.name.clone(),
                    },
                );
                return sig.ret.clone();
            }
        }
        if let Some(group) = self.functions.get(&name.name).cloned() {
            for sig in &group {
                if let Some(receiver) = &sig.receiver {
                    if sig.params.len() == 1
                        && self.assignable(&lhs_ty, receiver)
                        && self.assignable(&rhs_ty, &sig.params[0].ty)
                    {
                        self.resolve(
                            e.id,
                            Resolution::ExtensionFunction {
                                name: name.name.clone(),
                            },
                        );
                        return sig.ret.clone();
                    }
                }
            }
        }
        self.report(SemaError::UnknownMember {
            ty: lhs_ty,
            name: name.name.clone(),
            span: name.span,
        });
        Type::error()
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> Type {
        let ty = self.check_expr(operand, None);
        if ty.is_error() {
            return Type::error();
        }
        match op {
            UnaryOp::Neg | UnaryOp::Plus => {
                if ty.rank().is_none() {
                    self.report(SemaError::OperatorTypeMismatch {
                        op: if op == UnaryOp::Neg { "-" } else { "+" }.into(),
                        lhs: ty.clone(),
                        rhs: ty.clone(),
                        span,
                    });
                    return Type::error();
                }
                ty
            }
            UnaryOp::Not => {
                self.require_boolean(&ty, span);
                Type::boolean()
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                if ty.rank().is_none() {
                    self.report(SemaError::OperatorTypeMismatch {
                        op: "++".into(),
                        lhs: ty.clone(),
                        rhs: ty.clone(),
                        span,
                    });
                }
                self.require_assignable_target(operand);
                ty
            }
        }
    }

    fn require_assignable_target(&mut self, target: &Expr) {
        if let ExprKind::Name(n) = &target.kind {
            if let Some(sym) = self.table.lookup(&n.name) {
                if !sym.kind.is_assignable() {
                    self.report(SemaError::AssignmentToImmutable {
                        name: n.name.clone(),
                        span: target.span,
                    });
                }
            }
        }
    }

    fn check_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr, span: Span) -> Type {
        let target_ty = match &target.kind {
            ExprKind::Name(n) => {
                let ty = self.check_expr(target, None);
                if let Some(sym) = self.table.lookup(&n.name) {
                    if !sym.kind.is_assignable() && !ty.is_error() {
                        self.report(SemaError::AssignmentToImmutable {
                            name: n.name.clone(),
                            span: target.span,
                        });
                    }
                }
                ty
            }
            ExprKind::Member { target: obj, name } => {
                let obj_ty = self.check_expr(obj, None);
                match self.lookup_field_sub(&obj_ty, &name.name) {
                    Some((field, owner)) => {
                        if !field.mutable {
                            self.report(SemaError::AssignmentToImmutable {
                                name: name.name.clone(),
                                span: target.span,
                            });
                        }
                        self.resolve(
                            target.id,
                            Resolution::Field {
                                owner,
                                name: name.name.clone(),
                            },
                        );
                        self.record(target.id, field.ty.clone());
                        field.ty
                    }
                    None => {
                        if !obj_ty.is_error() {
                            self.report(SemaError::UnknownMember {
                                ty: obj_ty,
                                name: name.name.clone(),
                                span: name.span,
                            });
                        }
                        Type::error()
                    }
                }
            }
            ExprKind::Index { target: obj, indices } => {
                // Lowered through the `set` operator.
                let elem = self.check_index_set(obj, indices, span);
                self.record(target.id, elem.clone());
                elem
            }
            _ => {
                self.report(SemaError::InvalidAssignmentTarget { span: target.span });
                self.check_expr(target, None);
                Type::error()
            }
        };

        let value_ty = self.check_expr(value, Some(&target_ty.non_null()));
        match op {
            AssignOp::Assign => {
                self.check_assignable(&value_ty, &target_ty, value.span);
            }
            AssignOp::CoalesceAssign => {
                if !target_ty.nullable && !target_ty.is_error() {
                    self.report(SemaError::UnnecessarySafeCall {
                        ty: target_ty.clone(),
                        span,
                    });
                }
                self.check_assignable(&value_ty, &target_ty.non_null(), value.span);
            }
            AssignOp::AddAssign
            | AssignOp::SubAssign
            | AssignOp::MulAssign
            | AssignOp::DivAssign
            | AssignOp::RemAssign => {
                if op == AssignOp::AddAssign && target_ty.is_string() {
                    // String append.
                } else if !target_ty.is_error()
                    && !value_ty.is_error()
                    && promote(&target_ty, &value_ty).is_error()
                {
                    self.report(SemaError::OperatorTypeMismatch {
                        op: "compound assignment".into(),
                        lhs: target_ty.clone(),
                        rhs: value_ty.clone(),
                        span,
                    });
                }
            }
        }
        Type::unit()
    }

    fn check_index(&mut self, e: &Expr, target: &Expr, indices: &[Expr], safe: bool) -> Type {
        let target_ty = self.check_expr(target, None);
        let index_tys: Vec<Type> = indices.iter().map(|i| self.check_expr(i, None)).collect();
        if target_ty.is_error() {
            return Type::error();
        }
        if target_ty.nullable && !safe {
            self.report(SemaError::NullableReceiver {
                ty: target_ty.clone(),
                span: target.span,
            });
        }
        if safe && !target_ty.nullable {
            self.report(SemaError::UnnecessarySafeCall {
                ty: target_ty.clone(),
                span: e.span,
            });
        }
        let receiver = target_ty.non_null();
        let methods = self.lookup_methods(&receiver, "get");
        for sig in &methods {
            if sig.is_operator
                && sig.params.len() == index_tys.len()
                && sig
                    .params
                    .iter()
                    .zip(&index_tys)
                    .all(|(p, a)| self.assignable(a, &p.ty))
            {
                let ret = sig.ret.clone();
                return if safe { ret.with_nullable(true) } else { ret };
            }
        }
        self.report(SemaError::UnknownMember {
            ty: receiver,
            name: "get".into(),
            span: e.span,
        });
        Type::error()
    }

    fn check_index_set(&mut self, target: &Expr, indices: &[Expr], span: Span) -> Type {
        let target_ty = self.check_expr(target, None);
        let index_tys: Vec<Type> = indices.iter().map(|i| self.check_expr(i, None)).collect();
        if target_ty.is_error() {
            return Type::error();
        }
        let methods = self.lookup_methods(&target_ty, "set");
        for sig in &methods {
            if sig.is_operator && sig.params.len() == index_tys.len() + 1 {
                let ok = sig
                    .params
                    .iter()
                    .zip(&index_tys)
                    .all(|(p, a)| self.assignable(a, &p.ty));
                if ok {
                    return sig.params.last().map(|p| p.ty.clone()).unwrap_or_else(Type::error);
                }
            }
        }
        self.report(SemaError::UnknownMember {
            ty: target_ty,
            name: "set".into(),
            span,
        });
        Type::error()
    }

    // ── Member lookup ──────────────────────────────────────────────────

    fn receiver_class_name(&self, ty: &Type) -> Option<String> {
        match &ty.kind {
            TypeKind::Primitive(p) => Some(p.name().to_string()),
            TypeKind::Class { name, .. } => Some(name.clone()),
            TypeKind::Param { bound, .. } => match bound {
                Some(b) => self.receiver_class_name(b),
                None => Some("Any".to_string()),
            },
            _ => None,
        }
    }

    /// Find a field on the receiver type (following the super chain),
    /// substituting the receiver's type arguments. Returns the field and
    /// its owner class.
    fn lookup_field_sub(&self, receiver: &Type, name: &str) -> Option<(FieldInfo, String)> {
        let mut class_name = self.receiver_class_name(receiver)?;
        // Enum instances expose `name` and `ordinal`.
        if let Some(info) = self.classes.get(&class_name) {
            if info.kind == ClassKind::Enum {
                if name == "name" {
                    return Some((
                        FieldInfo {
                            name: "name".into(),
                            ty: Type::string(),
                            mutable: false,
                        },
                        class_name,
                    ));
                }
                if name == "ordinal" {
                    return Some((
                        FieldInfo {
                            name: "ordinal".into(),
                            ty: Type::int(),
                            mutable: false,
                        },
                        class_name,
                    ));
                }
            }
        }
        let mut binding: Option<FxHashMap<String, Type>> = self
            .classes
            .get(&class_name)
            .map(|info| class_binding(info, receiver));
        loop {
            if let Some(info) = self.classes.get(&class_name) {
                if let Some(field) = info.field(name) {
                    let ty = match &binding {
                        Some(b) => subst(&field.ty, b),
                        None => field.ty.clone(),
                    };
                    return Some((
                        FieldInfo {
                            name: field.name.clone(),
                            ty,
                            mutable: field.mutable,
                        },
                        class_name,
                    ));
                }
            }
            match self.registry.super_class(&class_name) {
                Some(next) => {
                    class_name = next.to_string();
                    binding = None; // argument tracking stops at the edge
                }
                None => return None,
            }
        }
    }

    /// All methods named `name` on the receiver type (super chain and
    /// interfaces included), with receiver type arguments substituted.
    fn lookup_methods(&self, receiver: &Type, name: &str) -> Vec<FunctionSig> {
        let Some(start) = self.receiver_class_name(receiver) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut queue = vec![start.clone()];
        let mut visited: Vec<String> = Vec::new();
        while let Some(class_name) = queue.pop() {
            if visited.contains(&class_name) {
                continue;
            }
            visited.push(class_name.clone());
            if let Some(info) = self.classes.get(&class_name) {
                let binding = if class_name == start {
                    Some(class_binding(info, receiver))
                } else {
                    None
                };
                for sig in info.methods_named(name) {
                    let mut sig = (*sig).clone();
                    if let Some(binding) = &binding {
                        sig = subst_sig(&sig, binding);
                    }
                    out.push(sig);
                }
            }
            if let Some(entry) = self.registry.entry(&class_name) {
                if let Some(sup) = &entry.super_class {
                    queue.push(sup.clone());
                }
                for iface in &entry.interfaces {
                    queue.push(iface.clone());
                }
            } else if class_name != "Any" {
                queue.push("Any".to_string());
            }
        }
        out
    }

    fn check_member_access(&mut self, e: &Expr, target: &Expr, name: &Ident, safe: bool) -> Type {
        let target_ty = self.check_expr(target, None);

        // Static-style access through a class name: enum entries, companion
        // members, `values`.
        if let Some(Resolution::Class { name: class_name })
        | Some(Resolution::Object { name: class_name }) = self.resolutions.get(&target.id).cloned()
        {
            let is_object = matches!(
                self.resolutions.get(&target.id),
                Some(Resolution::Object { .. })
            );
            if !is_object {
                if let Some(result) = self.check_static_member(e, &class_name, name) {
                    return result;
                }
                // Fall through to instance lookup for `Type.member` misuse;
                // report unknown member on the class.
                self.report(SemaError::UnknownMember {
                    ty: Type::class(class_name),
                    name: name.name.clone(),
                    span: name.span,
                });
                return Type::error();
            }
        }

        if target_ty.is_error() {
            return Type::error();
        }
        if target_ty.nullable && !safe {
            self.report(SemaError::NullableReceiver {
                ty: target_ty.clone(),
                span: target.span,
            });
        }
        if safe && !target_ty.nullable {
            self.report(SemaError::UnnecessarySafeCall {
                ty: target_ty.clone(),
                span: e.span,
            });
        }
        let receiver = target_ty.non_null();

        if let Some((field, owner)) = self.lookup_field_sub(&receiver, &name.name) {
            self.resolve(
                e.id,
                Resolution::Field {
                    owner,
                    name: name.name.clone(),
                },
            );
            return if safe {
                field.ty.with_nullable(true)
            } else {
                field.ty
            };
        }

        // A method used as a value.
        let methods = self.lookup_methods(&receiver, &name.name);
        if let Some(sig) = methods.first() {
            let ty = Type::function(
                sig.params.iter().map(|p| p.ty.clone()).collect(),
                sig.ret.clone(),
            );
            self.resolve(
                e.id,
                Resolution::Method {
                    owner: self
                        .receiver_class_name(&receiver)
                        .unwrap_or_else(|| "Any".into()),
                    name: name.name.clone(),
                },
            );
            return if safe { ty.with_nullable(true) } else { ty };
        }

        // Extension property/function as a value.
        if let Some(group) = self.functions.get(&name.name) {
            let candidate = group
                .iter()
                .find(|sig| {
                    sig.receiver
                        .as_ref()
                        .map(|r| self.assignable(&receiver, r))
                        .unwrap_or(false)
                })
                .cloned();
            if let Some(sig) = candidate {
                self.resolve(
                    e.id,
                    Resolution::ExtensionFunction {
                        name: name.name.clone(),
                    },
                );
                let ty = Type::function(
                    sig.params.iter().map(|p| p.ty.clone()).collect(),
                    sig.ret.clone(),
                );
                return if safe { ty.with_nullable(true) } else { ty };
            }
        }

        self.report(SemaError::UnknownMember {
            ty: receiver,
            name: name.name.clone(),
            span: name.span,
        });
        Type::error()
    }

    /// Enum entries / synthesized members / companion members accessed
    /// through the class name.
    fn check_static_member(&mut self, e: &Expr, class_name: &str, name: &Ident) -> Option<Type> {
        let (kind, enum_entries, companion) = {
            let info = self.classes.get(class_name)?;
            (info.kind, info.enum_entries.clone(), info.companion.clone())
        };
        if kind == ClassKind::Enum {
            if enum_entries.contains(&name.name) {
                self.resolve(
                    e.id,
                    Resolution::EnumEntry {
                        enum_name: class_name.to_string(),
                        entry: name.name.clone(),
                    },
                );
                return Some(Type::class(class_name));
            }
            if name.name == "values" {
                return Some(Type::function(
                    vec![],
                    Type::list(Type::class(class_name)),
                ));
            }
            if name.name == "valueOf" {
                return Some(Type::function(
                    vec![Type::string()],
                    Type::class(class_name),
                ));
            }
        }
        if let Some(companion) = companion {
            let companion_ty = Type::class(companion.clone());
            if let Some((field, owner)) = self.lookup_field_sub(&companion_ty, &name.name) {
                self.resolve(
                    e.id,
                    Resolution::Field {
                        owner,
                        name: name.name.clone(),
                    },
                );
                return Some(field.ty);
            }
            let methods = self.lookup_methods(&companion_ty, &name.name);
            if let Some(sig) = methods.first() {
                self.resolve(
                    e.id,
                    Resolution::Method {
                        owner: companion,
                        name: name.name.clone(),
                    },
                );
                return Some(Type::function(
                    sig.params.iter().map(|p| p.ty.clone()).collect(),
                    sig.ret.clone(),
                ));
            }
        }
        None
    }

    fn check_method_ref(
        &mut self,
        e: &Expr,
        target: &Expr,
        name: &Ident,
        is_constructor: bool,
    ) -> Type {
        let target_ty = self.check_expr(target, None);
        let target_res = self.resolutions.get(&target.id).cloned();

        if let Some(Resolution::Class { name: class_name }) = &target_res {
            if is_constructor {
                let ctor = self
                    .classes
                    .get(class_name)
                    .and_then(|i| i.ctors.first().cloned());
                if let Some(ctor) = ctor {
                    self.resolve(
                        e.id,
                        Resolution::Constructor {
                            class: class_name.clone(),
                        },
                    );
                    return Type::function(
                        ctor.params.iter().map(|p| p.ty.clone()).collect(),
                        ctor.ret.clone(),
                    );
                }
            }
            // Static-style method reference on a type: the receiver becomes
            // the first parameter.
            let receiver = Type::class(class_name.clone());
            let methods = self.lookup_methods(&receiver, &name.name);
            if let Some(sig) = methods.first() {
                let mut params = vec![receiver.clone()];
                params.extend(sig.params.iter().map(|p| p.ty.clone()));
                self.resolve(
                    e.id,
                    Resolution::Method {
                        owner: class_name.clone(),
                        name: name.name.clone(),
                    },
                );
                return Type::function(params, sig.ret.clone());
            }
            self.report(SemaError::UnknownMember {
                ty: receiver,
                name: name.name.clone(),
                span: name.span,
            });
            return Type::error();
        }

        if target_ty.is_error() {
            return Type::error();
        }
        let methods = self.lookup_methods(&target_ty, &name.name);
        if let Some(sig) = methods.first() {
            self.resolve(
                e.id,
                Resolution::Method {
                    owner: self
                        .receiver_class_name(&target_ty)
                        .unwrap_or_else(|| "Any".into()),
                    name: name.name.clone(),
                },
            );
            return Type::function(
                sig.params.iter().map(|p| p.ty.clone()).collect(),
                sig.ret.clone(),
            );
        }
        self.report(SemaError::UnknownMember {
            ty: target_ty,
            name: name.name.clone(),
            span: name.span,
        });
        Type::error()
    }

    fn check_lambda(&mut self, params: &[Parameter], body: &Block, expected: Option<&Type>) -> Type {
        let expected_fn = expected.and_then(|t| match &t.kind {
            TypeKind::Function { params, ret, .. } => Some((params.clone(), (**ret).clone())),
            _ => None,
        });

        self.table.push_scope();
        let mut param_tys = Vec::new();
        if params.is_empty() {
            // Implicit `it` when the expected shape has one parameter.
            if let Some((expected_params, _)) = &expected_fn {
                if expected_params.len() == 1 {
                    let ty = expected_params[0].clone();
                    param_tys.push(ty.clone());
                    let mut sym = Symbol::new("it", SymbolKind::Parameter, ty, Span::point(0));
                    sym.used = true;
                    self.table.declare(sym);
                }
            }
        } else {
            for (i, param) in params.iter().enumerate() {
                let ty = match (&param.ty, &expected_fn) {
                    (Some(t), _) => self.resolve_type(t),
                    (None, Some((expected_params, _))) => expected_params
                        .get(i)
                        .cloned()
                        .unwrap_or_else(Type::error),
                    (None, None) => Type::error(),
                };
                self.record(param.id, ty.clone());
                param_tys.push(ty.clone());
                if param.name.name != "_" {
                    self.table.declare(Symbol::new(
                        param.name.name.clone(),
                        SymbolKind::Parameter,
                        ty,
                        param.name.span,
                    ));
                }
            }
        }

        let body_ty = self.check_stmts(&body.stmts);
        self.pop_scope_report_unused();

        let ret = match &expected_fn {
            Some((_, expected_ret)) if body_ty.is_error() => expected_ret.clone(),
            _ => body_ty,
        };
        Type::function(param_tys, ret)
    }

    fn check_collection(
        &mut self,
        kind: CollectionKind,
        elements: &[Expr],
        entries: &[(Expr, Expr)],
        expected: Option<&Type>,
    ) -> Type {
        let expected_args: Vec<Type> = expected
            .map(|t| {
                t.type_args()
                    .iter()
                    .filter_map(|a| a.ty.clone())
                    .collect()
            })
            .unwrap_or_default();

        match kind {
            CollectionKind::List | CollectionKind::Set => {
                let expected_elem = expected_args.first();
                let mut elem = expected_elem.cloned().unwrap_or_else(Type::nothing);
                for element in elements {
                    let ty = match &element.kind {
                        ExprKind::Spread { operand } => {
                            let spread_ty = self.check_expr(operand, None);
                            self.record(element.id, spread_ty.clone());
                            spread_ty
                                .type_args()
                                .first()
                                .and_then(|a| a.ty.clone())
                                .unwrap_or_else(Type::any)
                        }
                        _ => self.check_expr(element, expected_elem),
                    };
                    elem = if elem.is_nothing() && !elem.nullable {
                        ty
                    } else {
                        self.lub(&elem, &ty)
                    };
                }
                let name = if kind == CollectionKind::List { "List" } else { "Set" };
                Type::class_with(name, vec![TypeArg::invariant(elem)])
            }
            CollectionKind::Map => {
                let expected_key = expected_args.first();
                let expected_val = expected_args.get(1);
                let mut key = expected_key.cloned().unwrap_or_else(Type::nothing);
                let mut value = expected_val.cloned().unwrap_or_else(Type::nothing);
                for (k, v) in entries {
                    let kt = self.check_expr(k, expected_key);
                    let vt = self.check_expr(v, expected_val);
                    key = if key.is_nothing() && !key.nullable { kt } else { self.lub(&key, &kt) };
                    value = if value.is_nothing() && !value.nullable {
                        vt
                    } else {
                        self.lub(&value, &vt)
                    };
                }
                Type::map(key, value)
            }
        }
    }

    fn check_pipeline(&mut self, lhs: &Expr, rhs: &Expr, span: Span) -> Type {
        let lhs_ty = self.check_expr(lhs, None);
        match &rhs.kind {
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => {
                let has_placeholder = args
                    .iter()
                    .any(|a| matches!(a.value.kind, ExprKind::Placeholder));
                if !has_placeholder {
                    self.report(SemaError::NoMatchingOverload {
                        name: "pipeline target (use `_` for the piped value)".into(),
                        span: rhs.span,
                    });
                    return Type::error();
                }
                let ty = self.check_call_with_pipeline(rhs, callee, type_args, args, &lhs_ty);
                self.record(rhs.id, ty.clone());
                ty
            }
            _ => {
                let rhs_ty = self.check_expr(rhs, None);
                match &rhs_ty.kind {
                    TypeKind::Function { params, ret, .. } => {
                        if params.len() != 1 {
                            self.report(SemaError::ArityMismatch {
                                name: "pipeline target".into(),
                                expected: 1,
                                found: params.len(),
                                span,
                            });
                        } else {
                            if !self.assignable(&lhs_ty, &params[0]) {
                                self.report(SemaError::TypeMismatch {
                                    expected: params[0].clone(),
                                    found: lhs_ty.clone(),
                                    span: lhs.span,
                                });
                            }
                        }
                        (**ret).clone()
                    }
                    TypeKind::Error => Type::error(),
                    _ => {
                        self.report(SemaError::NotCallable {
                            ty: rhs_ty,
                            span: rhs.span,
                        });
                        Type::error()
                    }
                }
            }
        }
    }

    fn check_call_with_pipeline(
        &mut self,
        e: &Expr,
        callee: &Expr,
        type_args: &[TypeArgument],
        args: &[CallArg],
        piped: &Type,
    ) -> Type {
        self.check_call_impl(e, callee, type_args, args, Some(piped), false)
    }

    fn check_call(
        &mut self,
        e: &Expr,
        callee: &Expr,
        type_args: &[TypeArgument],
        args: &[CallArg],
        piped: Option<&Type>,
        safe: bool,
    ) -> Type {
        self.check_call_impl(e, callee, type_args, args, piped, safe)
    }

    // The shared call-checking path; `piped` supplies the type of `_`
    // placeholder arguments.
    fn check_call_impl(
        &mut self,
        e: &Expr,
        callee: &Expr,
        type_args: &[TypeArgument],
        args: &[CallArg],
        piped: Option<&Type>,
        _safe: bool,
    ) -> Type {
        // Gather candidates.
        let (candidates, callee_name, implicit_receiver_nullable) =
            match self.call_candidates(callee) {
                Some(c) => c,
                None => {
                    // Callee errors were reported; still check the args.
                    for arg in args {
                        if !matches!(arg.value.kind, ExprKind::Placeholder) {
                            self.check_expr(&arg.value, None);
                        }
                    }
                    return Type::error();
                }
            };

        // Check all non-lambda arguments once, up front.
        struct ArgInfo {
            name: Option<String>,
            spread: bool,
            ty: Option<Type>,
            is_lambda: bool,
        }
        let mut infos = Vec::with_capacity(args.len());
        for arg in args {
            let is_lambda = matches!(arg.value.kind, ExprKind::Lambda { .. });
            let ty = if is_lambda {
                None
            } else if matches!(arg.value.kind, ExprKind::Placeholder) {
                let ty = piped.cloned().unwrap_or_else(|| {
                    self.report(SemaError::UnresolvedIdentifier {
                        name: "_".into(),
                        span: arg.value.span,
                    });
                    Type::error()
                });
                self.record(arg.value.id, ty.clone());
                Some(ty)
            } else {
                Some(self.check_expr(&arg.value, None))
            };
            infos.push(ArgInfo {
                name: arg.name.as_ref().map(|n| n.name.clone()),
                spread: arg.spread,
                ty,
                is_lambda,
            });
        }

        // Pick the first signature whose shape and checked argument types
        // fit.
        let explicit_args: Vec<Type> = type_args
            .iter()
            .filter_map(|a| a.ty.as_ref())
            .map(|t| self.resolve_type(t))
            .collect();

        let mut selected: Option<(FunctionSig, Vec<usize>, FxHashMap<String, Type>)> = None;
        for sig in &candidates {
            let Some(mapping) = map_args_to_params(sig, &infos.iter().map(|i| i.name.clone()).collect::<Vec<_>>()) else {
                continue;
            };
            let mut binding: FxHashMap<String, Type> = FxHashMap::default();
            for (tp, ta) in sig.type_params.iter().zip(&explicit_args) {
                binding.insert(tp.name.clone(), ta.clone());
            }
            let mut ok = true;
            for (arg_idx, param_idx) in mapping.iter().enumerate() {
                let info = &infos[arg_idx];
                let param = &sig.params[*param_idx];
                if info.spread {
                    continue;
                }
                if info.is_lambda {
                    // Shape check only; the body is checked after selection.
                    if !matches!(param.ty.kind, TypeKind::Function { .. } | TypeKind::Error) {
                        ok = false;
                        break;
                    }
                    continue;
                }
                let arg_ty = info.ty.clone().unwrap_or_else(Type::error);
                bind_infer(&sig.type_params, &param.ty, &arg_ty, &mut binding);
                let param_ty = subst(&param.ty, &binding);
                if !self.assignable(&arg_ty, &param_ty) {
                    ok = false;
                    break;
                }
            }
            if ok {
                selected = Some((sig.clone(), mapping, binding));
                break;
            }
        }

        let Some((sig, mapping, mut binding)) = selected else {
            // Report the most useful failure.
            if let Some(sig) = candidates.first() {
                let required = sig.params.iter().filter(|p| !p.has_default).count();
                if args.len() < required || args.len() > sig.params.len() {
                    self.report(SemaError::ArityMismatch {
                        name: callee_name,
                        expected: sig.params.len(),
                        found: args.len(),
                        span: e.span,
                    });
                } else {
                    self.report(SemaError::NoMatchingOverload {
                        name: callee_name,
                        span: e.span,
                    });
                }
            } else {
                self.report(SemaError::NotCallable {
                    ty: Type::error(),
                    span: e.span,
                });
            }
            // Lambdas still get checked for downstream consumers.
            for (arg, info) in args.iter().zip(&infos) {
                if info.is_lambda {
                    self.check_expr(&arg.value, None);
                }
            }
            return Type::error();
        };

        // Named-argument diagnostics for the selected signature were
        // handled by the mapping; now check lambdas with their expected
        // types and finish inference.
        for (arg_idx, param_idx) in mapping.iter().enumerate() {
            let info = &infos[arg_idx];
            if !info.is_lambda {
                continue;
            }
            let expected = subst(&sig.params[*param_idx].ty, &binding);
            let lam_ty = self.check_expr(&args[arg_idx].value, Some(&expected));
            bind_infer(&sig.type_params, &sig.params[*param_idx].ty, &lam_ty, &mut binding);
            if !self.assignable(&lam_ty, &subst(&sig.params[*param_idx].ty, &binding)) {
                self.report(SemaError::TypeMismatch {
                    expected: subst(&sig.params[*param_idx].ty, &binding),
                    found: lam_ty,
                    span: args[arg_idx].value.span,
                });
            }
        }

        // Missing required parameters.
        let provided: FxHashSet<usize> = mapping.iter().copied().collect();
        for (i, param) in sig.params.iter().enumerate() {
            if !provided.contains(&i) && !param.has_default {
                self.report(SemaError::MissingArgument {
                    name: param.name.clone(),
                    function: callee_name.clone(),
                    span: e.span,
                });
            }
        }

        let ret = subst(&sig.ret, &binding);
        if implicit_receiver_nullable {
            ret.with_nullable(true)
        } else {
            ret
        }
    }

    /// Candidate signatures for a callee expression, plus a display name
    /// and whether the result must be made nullable (safe call).
    fn call_candidates(
        &mut self,
        callee: &Expr,
    ) -> Option<(Vec<FunctionSig>, String, bool)> {
        match &callee.kind {
            ExprKind::Name(ident) => {
                // Local value of function type shadows functions.
                let local_fn_ty = self.table.lookup(&ident.name).map(|s| s.ty.clone());
                if let Some(ty) = local_fn_ty {
                    if let TypeKind::Function { params, ret, .. } = &ty.kind {
                        self.table.lookup_and_use(&ident.name);
                        self.resolve(callee.id, Resolution::Local);
                        self.record(callee.id, ty.clone());
                        let sig = sig_from_fn_type(&ident.name, params, ret);
                        return Some((vec![sig], ident.name.clone(), false));
                    }
                }
                if let Some(group) = self.functions.get(&ident.name).cloned() {
                    // Plain functions first, then extensions (callable
                    // unqualified when `this` matches).
                    let plain: Vec<FunctionSig> = group
                        .iter()
                        .filter(|s| s.receiver.is_none())
                        .cloned()
                        .collect();
                    if !plain.is_empty() {
                        let resolution = if plain[0].decl_id.is_some() {
                            Resolution::TopLevelFunction {
                                name: ident.name.clone(),
                            }
                        } else {
                            Resolution::Builtin {
                                name: ident.name.clone(),
                            }
                        };
                        self.resolve(callee.id, resolution);
                        return Some((plain, ident.name.clone(), false));
                    }
                }
                if let Some(info) = self.classes.get(&ident.name).cloned() {
                    match info.kind {
                        ClassKind::Class => {
                            if info.is_abstract {
                                self.report(SemaError::AbstractInstantiation {
                                    name: ident.name.clone(),
                                    span: callee.span,
                                });
                            }
                            let ctors = if info.ctors.is_empty() {
                                vec![FunctionSig::builtin(&ident.name, &[], Type::class(ident.name.clone()))]
                            } else {
                                info.ctors.clone()
                            };
                            self.resolve(
                                callee.id,
                                Resolution::Constructor {
                                    class: ident.name.clone(),
                                },
                            );
                            return Some((ctors, ident.name.clone(), false));
                        }
                        ClassKind::Interface | ClassKind::Enum | ClassKind::Object => {
                            self.report(SemaError::AbstractInstantiation {
                                name: ident.name.clone(),
                                span: callee.span,
                            });
                            return None;
                        }
                    }
                }
                // Unqualified method call on `this`.
                if let Some(this) = self.table.lookup("this").map(|s| s.ty.clone()) {
                    let methods = self.lookup_methods(&this, &ident.name);
                    if !methods.is_empty() {
                        self.resolve(
                            callee.id,
                            Resolution::Method {
                                owner: self
                                    .receiver_class_name(&this)
                                    .unwrap_or_else(|| "Any".into()),
                                name: ident.name.clone(),
                            },
                        );
                        return Some((methods, ident.name.clone(), false));
                    }
                }
                self.report(SemaError::UnresolvedIdentifier {
                    name: ident.name.clone(),
                    span: ident.span,
                });
                None
            }
            ExprKind::Member { target, name } | ExprKind::SafeMember { target, name } => {
                let safe = matches!(callee.kind, ExprKind::SafeMember { .. });
                let target_ty = self.check_expr(target, None);

                // Static call through a class name.
                if let Some(Resolution::Class { name: class_name }) =
                    self.resolutions.get(&target.id).cloned()
                {
                    let info = self.classes.get(&class_name);
                    if let Some(info) = info {
                        if info.kind == ClassKind::Enum && name.name == "valueOf" {
                            return Some((
                                vec![FunctionSig::builtin(
                                    "valueOf",
                                    &[("name", Type::string())],
                                    Type::class(class_name.clone()),
                                )],
                                name.name.clone(),
                                false,
                            ));
                        }
                        if info.kind == ClassKind::Enum && name.name == "values" {
                            return Some((
                                vec![FunctionSig::builtin(
                                    "values",
                                    &[],
                                    Type::list(Type::class(class_name.clone())),
                                )],
                                name.name.clone(),
                                false,
                            ));
                        }
                        if let Some(companion) = info.companion.clone() {
                            let companion_ty = Type::class(companion.clone());
                            let methods = self.lookup_methods(&companion_ty, &name.name);
                            if !methods.is_empty() {
                                self.resolve(
                                    callee.id,
                                    Resolution::Method {
                                        owner: companion,
                                        name: name.name.clone(),
                                    },
                                );
                                return Some((methods, name.name.clone(), false));
                            }
                        }
                    }
                    self.report(SemaError::UnknownMember {
                        ty: Type::class(class_name),
                        name: name.name.clone(),
                        span: name.span,
                    });
                    return None;
                }

                if target_ty.is_error() {
                    return None;
                }
                if target_ty.nullable && !safe {
                    self.report(SemaError::NullableReceiver {
                        ty: target_ty.clone(),
                        span: target.span,
                    });
                }
                if safe && !target_ty.nullable {
                    self.report(SemaError::UnnecessarySafeCall {
                        ty: target_ty.clone(),
                        span: callee.span,
                    });
                }
                let receiver = target_ty.non_null();
                let methods = self.lookup_methods(&receiver, &name.name);
                if !methods.is_empty() {
                    self.resolve(
                        callee.id,
                        Resolution::Method {
                            owner: self
                                .receiver_class_name(&receiver)
                                .unwrap_or_else(|| "Any".into()),
                            name: name.name.clone(),
                        },
                    );
                    return Some((methods, name.name.clone(), safe));
                }
                // Extension functions.
                if let Some(group) = self.functions.get(&name.name).cloned() {
                    let matching: Vec<FunctionSig> = group
                        .into_iter()
                        .filter(|sig| {
                            sig.receiver
                                .as_ref()
                                .map(|r| self.assignable(&receiver, r))
                                .unwrap_or(false)
                        })
                        .collect();
                    if !matching.is_empty() {
                        self.resolve(
                            callee.id,
                            Resolution::ExtensionFunction {
                                name: name.name.clone(),
                            },
                        );
                        return Some((matching, name.name.clone(), safe));
                    }
                }
                // A field holding a function.
                if let Some((field, _)) = self.lookup_field_sub(&receiver, &name.name) {
                    if let TypeKind::Function { params, ret, .. } = &field.ty.kind {
                        return Some((
                            vec![sig_from_fn_type(&name.name, params, ret)],
                            name.name.clone(),
                            safe,
                        ));
                    }
                }
                self.report(SemaError::UnknownMember {
                    ty: receiver,
                    name: name.name.clone(),
                    span: name.span,
                });
                None
            }
            ExprKind::Super { .. } => {
                let super_ty = self.check_expr(callee, None);
                if !super_ty.is_error() {
                    self.report(SemaError::NotCallable {
                        ty: super_ty,
                        span: callee.span,
                    });
                }
                None
            }
            _ => {
                let ty = self.check_expr(callee, None);
                match &ty.kind {
                    TypeKind::Function { params, ret, .. } => {
                        Some((vec![sig_from_fn_type("invoke", params, ret)], "invoke".into(), false))
                    }
                    TypeKind::Error => None,
                    _ => {
                        self.report(SemaError::NotCallable {
                            ty,
                            span: callee.span,
                        });
                        None
                    }
                }
            }
        }
    }

    fn check_when(&mut self, when: &WhenExpr, span: Span, as_value: bool) -> Type {
        let subject_ty = when.subject.as_ref().map(|s| {
            let ty = self.check_expr(&s.expr, None);
            self.types.insert(s.binding_id, ty.clone());
            ty
        });

        self.table.push_scope();
        if let (Some(subject), Some(ty)) = (&when.subject, &subject_ty) {
            if let Some(binding) = &subject.binding {
                let mut sym = Symbol::new(
                    binding.name.clone(),
                    SymbolKind::Variable { mutable: false },
                    ty.clone(),
                    binding.span,
                );
                sym.used = true;
                self.table.declare(sym);
            }
        }

        let mut result: Option<Type> = None;
        let mut has_else = false;
        let mut covered_entries: FxHashSet<String> = FxHashSet::default();
        let mut covered_types: FxHashSet<String> = FxHashSet::default();
        let mut bool_covered = [false, false];

        for branch in &when.branches {
            let mut narrowed: Vec<(String, Type)> = Vec::new();
            for condition in &branch.conditions {
                match condition {
                    WhenCondition::Else => has_else = true,
                    WhenCondition::Expr(cond) => {
                        match &subject_ty {
                            Some(subject_ty) => {
                                let cond_ty = self.check_expr(cond, Some(subject_ty));
                                // Equality comparison with the subject.
                                let _ = cond_ty;
                                if let Some(Resolution::EnumEntry { entry, .. }) =
                                    self.resolutions.get(&cond.id)
                                {
                                    covered_entries.insert(entry.clone());
                                }
                                if let ExprKind::Literal(LiteralKind::Bool(b)) = &cond.kind {
                                    bool_covered[*b as usize] = true;
                                }
                            }
                            None => {
                                let cond_ty = self.check_expr(cond, Some(&Type::boolean()));
                                self.require_boolean(&cond_ty, cond.span);
                                for n in self.narrowings(cond) {
                                    narrowed.push(n);
                                }
                            }
                        }
                    }
                    WhenCondition::In { expr, .. } => {
                        self.check_expr(expr, None);
                    }
                    WhenCondition::Is { ty, negated } => {
                        let target = self.resolve_type(ty);
                        if let Some(name) = target.class_name() {
                            if !negated {
                                covered_types.insert(name.to_string());
                            }
                        }
                        if !negated {
                            if let Some(subject) = &when.subject {
                                if let Some(binding) = &subject.binding {
                                    narrowed.push((binding.name.clone(), target.clone()));
                                } else if let ExprKind::Name(n) = &subject.expr.kind {
                                    narrowed.push((n.name.clone(), target.clone()));
                                }
                            }
                        }
                    }
                }
            }

            self.table.push_scope();
            for (name, ty) in narrowed {
                let mut sym =
                    Symbol::new(name, SymbolKind::Variable { mutable: false }, ty, branch.span);
                sym.used = true;
                self.table.declare(sym);
            }
            let branch_ty = self.check_expr(&branch.body, None);
            self.table.pop_scope();

            result = Some(match result {
                None => branch_ty,
                Some(prev) => self.lub(&prev, &branch_ty),
            });
        }

        self.table.pop_scope();

        // Exhaustiveness when `else` is absent.
        if !has_else {
            if let Some(subject_ty) = &subject_ty {
                let missing: Vec<String> = match subject_ty.class_name() {
                    Some(name) => match self.classes.get(name) {
                        Some(info) if info.kind == ClassKind::Enum => info
                            .enum_entries
                            .iter()
                            .filter(|e| !covered_entries.contains(*e))
                            .cloned()
                            .collect(),
                        Some(info) if info.is_sealed => info
                            .sealed_subtypes
                            .iter()
                            .filter(|s| !covered_types.contains(*s))
                            .cloned()
                            .collect(),
                        _ => {
                            if as_value {
                                vec!["else".to_string()]
                            } else {
                                Vec::new()
                            }
                        }
                    },
                    None if subject_ty.is_boolean() => {
                        let mut missing = Vec::new();
                        if !bool_covered[1] {
                            missing.push("true".to_string());
                        }
                        if !bool_covered[0] {
                            missing.push("false".to_string());
                        }
                        missing
                    }
                    None => {
                        if as_value {
                            vec!["else".to_string()]
                        } else {
                            Vec::new()
                        }
                    }
                };
                if !missing.is_empty() {
                    self.report(SemaError::NonExhaustiveWhen {
                        subject: subject_ty.to_string(),
                        missing,
                        span,
                    });
                }
            } else if as_value {
                self.report(SemaError::NonExhaustiveWhen {
                    subject: "<no subject>".to_string(),
                    missing: vec!["else".to_string()],
                    span,
                });
            }
        }

        if as_value {
            result.unwrap_or_else(Type::unit)
        } else {
            Type::unit()
        }
    }
}

// ── Free helpers ───────────────────────────────────────────────────────

/// Substitute named type parameters in `ty` according to `binding`.
pub(crate) fn subst(ty: &Type, binding: &FxHashMap<String, Type>) -> Type {
    match &ty.kind {
        TypeKind::Param { name, .. } => match binding.get(name) {
            Some(t) => t.with_nullable(t.nullable || ty.nullable),
            None => ty.clone(),
        },
        TypeKind::Class { name, args } => {
            let args = args
                .iter()
                .map(|a| TypeArg {
                    variance: a.variance,
                    ty: a.ty.as_ref().map(|t| subst(t, binding)),
                })
                .collect();
            Type {
                kind: TypeKind::Class {
                    name: name.clone(),
                    args,
                },
                nullable: ty.nullable,
            }
        }
        TypeKind::Function {
            receiver,
            params,
            ret,
        } => Type {
            kind: TypeKind::Function {
                receiver: receiver.as_ref().map(|r| Box::new(subst(r, binding))),
                params: params.iter().map(|p| subst(p, binding)).collect(),
                ret: Box::new(subst(ret, binding)),
            },
            nullable: ty.nullable,
        },
        _ => ty.clone(),
    }
}

fn subst_sig(sig: &FunctionSig, binding: &FxHashMap<String, Type>) -> FunctionSig {
    let mut sig = sig.clone();
    for param in sig.params.iter_mut() {
        param.ty = subst(&param.ty, binding);
    }
    sig.ret = subst(&sig.ret, binding);
    sig
}

/// Map a receiver type's arguments onto the class's type parameters.
fn class_binding(info: &ClassInfo, receiver: &Type) -> FxHashMap<String, Type> {
    let mut binding = FxHashMap::default();
    for (param, arg) in info.type_params.iter().zip(receiver.type_args()) {
        binding.insert(
            param.name.clone(),
            arg.ty.clone().unwrap_or_else(Type::any),
        );
    }
    binding
}

/// Infer bindings for a signature's type parameters by matching a declared
/// parameter type against an actual argument type. First binding wins.
fn bind_infer(
    type_params: &[TypeParamInfo],
    declared: &Type,
    actual: &Type,
    binding: &mut FxHashMap<String, Type>,
) {
    match (&declared.kind, &actual.kind) {
        (TypeKind::Param { name, .. }, _) => {
            if type_params.iter().any(|p| p.name == *name) && !binding.contains_key(name) {
                binding.insert(name.clone(), actual.non_null());
            }
        }
        (
            TypeKind::Class { name: dn, args: da },
            TypeKind::Class { name: an, args: aa },
        ) if dn == an => {
            for (d, a) in da.iter().zip(aa) {
                if let (Some(d), Some(a)) = (&d.ty, &a.ty) {
                    bind_infer(type_params, d, a, binding);
                }
            }
        }
        (
            TypeKind::Function {
                params: dp,
                ret: dr,
                ..
            },
            TypeKind::Function {
                params: ap,
                ret: ar,
                ..
            },
        ) => {
            for (d, a) in dp.iter().zip(ap) {
                bind_infer(type_params, d, a, binding);
            }
            bind_infer(type_params, dr, ar, binding);
        }
        _ => {}
    }
}

/// Map call arguments to parameter indices (positional then named).
/// Returns `None` when the shape cannot fit the signature. Shared with
/// HIR lowering, which rebuilds the same mapping to place defaults.
pub fn map_args_to_params(sig: &FunctionSig, names: &[Option<String>]) -> Option<Vec<usize>> {
    let mut mapping = Vec::with_capacity(names.len());
    let mut used = vec![false; sig.params.len()];
    let mut next_positional = 0usize;
    for name in names {
        match name {
            None => {
                while next_positional < sig.params.len() && used[next_positional] {
                    next_positional += 1;
                }
                if next_positional >= sig.params.len() {
                    return None;
                }
                used[next_positional] = true;
                mapping.push(next_positional);
                next_positional += 1;
            }
            Some(name) => {
                let idx = sig.params.iter().position(|p| &p.name == name)?;
                if used[idx] {
                    return None;
                }
                used[idx] = true;
                mapping.push(idx);
            }
        }
    }
    Some(mapping)
}

fn sig_from_fn_type(name: &str, params: &[Type], ret: &Type) -> FunctionSig {
    FunctionSig {
        name: name.to_string(),
        type_params: Vec::new(),
        receiver: None,
        params: params
            .iter()
            .enumerate()
            .map(|(i, ty)| ParamSig {
                name: format!("p{i}"),
                ty: ty.clone(),
                has_default: false,
            })
            .collect(),
        ret: ret.clone(),
        is_operator: false,
        is_infix: false,
        is_inline: false,
        is_abstract: false,
        is_override: false,
        decl_id: None,
    }
}

/// Whether every path through the block leaves the enclosing function or
/// loop (used for missing-return and guard checking).
fn block_exits(block: &Block, types: &FxHashMap<NodeId, Type>) -> bool {
    let Some(last) = block.stmts.last() else {
        return false;
    };
    stmt_exits_pure(last, types)
}

fn stmt_exits_pure(stmt: &Stmt, types: &FxHashMap<NodeId, Type>) -> bool {
    match stmt {
        Stmt::Return(_) | Stmt::Throw(_) | Stmt::Break(_) | Stmt::Continue(_) => true,
        Stmt::Expr(e) => types
            .get(&e.id)
            .map(|t| t.is_nothing() && !t.nullable)
            .unwrap_or(false),
        Stmt::If(i) => match &i.else_branch {
            Some(ElseBranch::Block(b)) => block_exits(&i.then_block, types) && block_exits(b, types),
            Some(ElseBranch::If(nested)) => {
                block_exits(&i.then_block, types)
                    && stmt_exits_pure(&Stmt::If((**nested).clone()), types)
            }
            None => false,
        },
        Stmt::When(w) => {
            let has_else = w
                .when
                .branches
                .iter()
                .any(|b| b.conditions.iter().any(|c| matches!(c, WhenCondition::Else)));
            has_else
                && w.when.branches.iter().all(|b| {
                    types
                        .get(&b.body.id)
                        .map(|t| t.is_nothing() && !t.nullable)
                        .unwrap_or(false)
                })
        }
        Stmt::Block(b) => block_exits(b, types),
        _ => false,
    }
}

fn type_ref_name(ty: &TypeRef) -> String {
    match &ty.kind {
        TypeRefKind::Simple { name } => name.clone(),
        TypeRefKind::Generic { name, .. } => name.clone(),
        TypeRefKind::Nullable(inner) => type_ref_name(inner),
        TypeRefKind::Function { .. } => "Function".to_string(),
    }
}

fn binary_op_name(op: ast::BinaryOp) -> &'static str {
    use ast::BinaryOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Rem => "%",
        Eq => "==",
        Ne => "!=",
        RefEq => "===",
        RefNe => "!==",
        Lt => "<",
        Gt => ">",
        Le => "<=",
        Ge => ">=",
        And => "&&",
        Or => "||",
        In => "in",
        To => "to",
    }
}
