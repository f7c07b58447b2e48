//! Supertype registry: type name -> direct super-class + interfaces.
//!
//! Pre-populated with the built-in hierarchy; user declarations register
//! their edges during the declare pass. Subtyping is the
//! reflexive-transitive closure over super-class and interface edges, plus
//! the universal rules `Nothing <= T` and `T <= Any`.

use rustc_hash::FxHashMap;

/// Direct inheritance information for one named type.
#[derive(Debug, Clone, Default)]
pub struct TypeEntry {
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SupertypeRegistry {
    entries: FxHashMap<String, TypeEntry>,
}

impl Default for SupertypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl SupertypeRegistry {
    /// Registry seeded with the built-in hierarchy.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            entries: FxHashMap::default(),
        };
        registry.register("Any", None, &[]);
        registry.register("Number", Some("Any"), &[]);
        for numeric in ["Int", "Long", "Float", "Double"] {
            registry.register(numeric, Some("Number"), &["Comparable"]);
        }
        registry.register("Boolean", Some("Any"), &[]);
        registry.register("Char", Some("Any"), &["Comparable"]);
        registry.register("String", Some("Any"), &["Comparable"]);
        registry.register("Comparable", Some("Any"), &[]);
        registry.register("Iterable", Some("Any"), &[]);
        for collection in ["Map", "Pair", "Triple"] {
            registry.register(collection, Some("Any"), &[]);
        }
        registry.register("List", Some("Any"), &["Iterable"]);
        registry.register("Set", Some("Any"), &["Iterable"]);
        for range in ["IntRange", "LongRange", "CharRange"] {
            registry.register(range, Some("Any"), &["Iterable"]);
        }
        registry.register("Result", Some("Any"), &[]);
        registry.register("Future", Some("Any"), &[]);
        registry.register("Closeable", Some("Any"), &[]);
        registry.register("Throwable", Some("Any"), &[]);
        registry.register("Exception", Some("Throwable"), &[]);
        registry.register("RuntimeException", Some("Exception"), &[]);
        registry.register("NullPointerException", Some("RuntimeException"), &[]);
        registry.register("IllegalArgumentException", Some("RuntimeException"), &[]);
        registry.register("IllegalStateException", Some("RuntimeException"), &[]);
        registry.register("IndexOutOfBoundsException", Some("RuntimeException"), &[]);
        registry.register("ClassCastException", Some("RuntimeException"), &[]);
        registry.register("ArithmeticException", Some("RuntimeException"), &[]);
        registry
    }

    pub fn register(&mut self, name: &str, super_class: Option<&str>, interfaces: &[&str]) {
        self.entries.insert(
            name.to_string(),
            TypeEntry {
                super_class: super_class.map(str::to_string),
                interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    /// Register a user declaration's edges.
    pub fn register_user(&mut self, name: &str, super_class: Option<String>, interfaces: Vec<String>) {
        self.entries.insert(
            name.to_string(),
            TypeEntry {
                super_class,
                interfaces,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Option<&TypeEntry> {
        self.entries.get(name)
    }

    /// Direct super-class of a type, if any.
    pub fn super_class(&self, name: &str) -> Option<&str> {
        self.entries.get(name)?.super_class.as_deref()
    }

    /// Whether `sub` is a (named) subtype of `sup`, by the
    /// reflexive-transitive closure over super-class and interface edges.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == "Any" || sub == "Nothing" {
            return true;
        }
        let mut stack = vec![sub];
        let mut visited: Vec<&str> = Vec::new();
        while let Some(current) = stack.pop() {
            if current == sup {
                return true;
            }
            if visited.contains(&current) {
                continue;
            }
            visited.push(current);
            if let Some(entry) = self.entries.get(current) {
                if let Some(super_class) = &entry.super_class {
                    stack.push(super_class);
                }
                for interface in &entry.interfaces {
                    stack.push(interface);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_numeric_chain() {
        let registry = SupertypeRegistry::with_builtins();
        assert!(registry.is_subtype("Int", "Number"));
        assert!(registry.is_subtype("Int", "Any"));
        assert!(registry.is_subtype("Double", "Number"));
        assert!(!registry.is_subtype("Number", "Int"));
    }

    #[test]
    fn comparable_interface_edge() {
        let registry = SupertypeRegistry::with_builtins();
        assert!(registry.is_subtype("String", "Comparable"));
        assert!(registry.is_subtype("Int", "Comparable"));
        assert!(!registry.is_subtype("Boolean", "Comparable"));
    }

    #[test]
    fn universal_rules() {
        let registry = SupertypeRegistry::with_builtins();
        assert!(registry.is_subtype("Nothing", "String"));
        assert!(registry.is_subtype("String", "Any"));
        assert!(registry.is_subtype("UnknownThing", "Any"));
    }

    #[test]
    fn user_registration() {
        let mut registry = SupertypeRegistry::with_builtins();
        registry.register_user("Shape", Some("Any".into()), vec![]);
        registry.register_user("Circle", Some("Shape".into()), vec!["Drawable".into()]);
        registry.register_user("Drawable", None, vec![]);
        assert!(registry.is_subtype("Circle", "Shape"));
        assert!(registry.is_subtype("Circle", "Drawable"));
        assert!(registry.is_subtype("Circle", "Any"));
        assert!(!registry.is_subtype("Shape", "Circle"));
    }

    #[test]
    fn exception_hierarchy() {
        let registry = SupertypeRegistry::with_builtins();
        assert!(registry.is_subtype("NullPointerException", "Exception"));
        assert!(registry.is_subtype("NullPointerException", "Throwable"));
    }
}
