//! Layered symbol table.
//!
//! A stack of scopes, innermost last. Lookup walks outward; re-declaring a
//! name within the same scope is a semantic error (shadowing across scopes
//! is allowed).

use opal_common::span::Span;
use rustc_hash::FxHashMap;

use crate::ty::Type;

/// What a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable { mutable: bool },
    Parameter,
    Function,
    Class,
    Interface,
    Enum,
    EnumEntry,
    Object,
    Property { mutable: bool },
    TypeAlias,
    Import,
    Constructor,
    BuiltinFunction,
    BuiltinConstant,
}

impl SymbolKind {
    /// Whether assignment through this symbol is allowed.
    pub fn is_assignable(self) -> bool {
        matches!(
            self,
            SymbolKind::Variable { mutable: true } | SymbolKind::Property { mutable: true }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub span: Span,
    /// Set when the symbol is read; drives unused-variable warnings.
    pub used: bool,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: Type, span: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            span,
            used: false,
        }
    }
}

/// One lexical scope.
#[derive(Debug, Default)]
struct Scope {
    symbols: FxHashMap<String, Symbol>,
}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table with the global scope already open.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Close the innermost scope and return its symbols (for
    /// unused-variable reporting).
    pub fn pop_scope(&mut self) -> Vec<Symbol> {
        debug_assert!(self.scopes.len() > 1, "cannot pop the global scope");
        let scope = self.scopes.pop().unwrap_or_default();
        scope.symbols.into_values().collect()
    }

    /// Declare in the innermost scope. Returns the previous symbol if the
    /// name is already declared in this scope (a shadowing error).
    pub fn declare(&mut self, symbol: Symbol) -> Option<Symbol> {
        let scope = self.scopes.last_mut().expect("at least the global scope");
        let existing = scope.symbols.get(&symbol.name).cloned();
        if existing.is_none() {
            scope.symbols.insert(symbol.name.clone(), symbol);
        }
        existing
    }

    /// Declare in the global (outermost) scope.
    pub fn declare_global(&mut self, symbol: Symbol) -> Option<Symbol> {
        let scope = self.scopes.first_mut().expect("global scope");
        let existing = scope.symbols.get(&symbol.name).cloned();
        if existing.is_none() {
            scope.symbols.insert(symbol.name.clone(), symbol);
        }
        existing
    }

    /// Look a name up, innermost scope first.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
    }

    /// Look up and mark the symbol as used.
    pub fn lookup_and_use(&mut self, name: &str) -> Option<Symbol> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(symbol) = scope.symbols.get_mut(name) {
                symbol.used = true;
                return Some(symbol.clone());
            }
        }
        None
    }

    /// Mutate a symbol in place (e.g. smart-cast narrowing).
    pub fn update_type(&mut self, name: &str, ty: Type) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(symbol) = scope.symbols.get_mut(name) {
                symbol.ty = ty;
                return;
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_common::span::Span;

    fn sym(name: &str) -> Symbol {
        Symbol::new(
            name,
            SymbolKind::Variable { mutable: false },
            Type::int(),
            Span::new(0, 1),
        )
    }

    #[test]
    fn declare_and_lookup() {
        let mut table = SymbolTable::new();
        assert!(table.declare(sym("x")).is_none());
        assert!(table.lookup("x").is_some());
        assert!(table.lookup("y").is_none());
    }

    #[test]
    fn same_scope_redeclaration_is_reported() {
        let mut table = SymbolTable::new();
        assert!(table.declare(sym("x")).is_none());
        assert!(table.declare(sym("x")).is_some());
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut table = SymbolTable::new();
        table.declare(sym("x"));
        table.push_scope();
        let mut inner = sym("x");
        inner.ty = Type::string();
        assert!(table.declare(inner).is_none());
        assert_eq!(table.lookup("x").unwrap().ty, Type::string());
        table.pop_scope();
        assert_eq!(table.lookup("x").unwrap().ty, Type::int());
    }

    #[test]
    fn pop_returns_symbols_for_unused_analysis() {
        let mut table = SymbolTable::new();
        table.push_scope();
        table.declare(sym("a"));
        table.lookup_and_use("a");
        table.declare(sym("b"));
        let symbols = table.pop_scope();
        let a = symbols.iter().find(|s| s.name == "a").unwrap();
        let b = symbols.iter().find(|s| s.name == "b").unwrap();
        assert!(a.used);
        assert!(!b.used);
    }
}
