//! Backend contract.
//!
//! The real bytecode writer is an external collaborator: it receives the
//! optimized module and returns artifact bytes per class. The in-tree
//! [`TextBackend`] serializes the MIR textual form instead, which is what
//! the driver ships when no other backend is plugged in (and what the e2e
//! tests inspect).

use rustc_hash::FxHashMap;

use crate::mir::{MirClass, MirModule};

pub trait Backend {
    /// Produce artifacts for a fully optimized module. Keys are artifact
    /// ids (class internal names); values are opaque bytes.
    fn emit(&mut self, module: &MirModule) -> FxHashMap<String, Vec<u8>>;
}

/// Serializes each class (and the synthetic module owner for top-level
/// functions) as readable MIR text.
#[derive(Debug, Default)]
pub struct TextBackend;

impl Backend for TextBackend {
    fn emit(&mut self, module: &MirModule) -> FxHashMap<String, Vec<u8>> {
        let mut artifacts = FxHashMap::default();
        for class in &module.classes {
            artifacts.insert(class.name.clone(), render_class(class).into_bytes());
        }
        if !module.functions.is_empty() {
            let owner = MirModule::owner_name(module.package.as_deref());
            let mut text = String::new();
            for function in &module.functions {
                text.push_str(&function.to_string());
                text.push('\n');
            }
            artifacts
                .entry(owner)
                .and_modify(|existing| {
                    existing.extend_from_slice(text.as_bytes());
                })
                .or_insert_with(|| text.into_bytes());
        }
        artifacts
    }
}

fn render_class(class: &MirClass) -> String {
    let mut out = String::new();
    out.push_str(&format!("class {} ({:?})\n", class.name, class.kind));
    if let Some(super_class) = &class.super_class {
        out.push_str(&format!("  extends {super_class}\n"));
    }
    for interface in &class.interfaces {
        out.push_str(&format!("  implements {interface}\n"));
    }
    for field in &class.fields {
        out.push_str(&format!(
            "  field {} {}\n",
            field.name,
            field.ty.field_descriptor()
        ));
    }
    for method in &class.methods {
        out.push_str(&method.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{MirClassKind, MirType};

    #[test]
    fn text_backend_produces_one_artifact_per_class() {
        let mut module = MirModule::new(Some("demo".into()));
        module
            .classes
            .push(MirClass::new("demo/Point", MirClassKind::Class));
        module
            .classes
            .push(MirClass::new("demo/Shape", MirClassKind::Class));
        let artifacts = TextBackend.emit(&module);
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts.contains_key("demo/Point"));
    }

    #[test]
    fn field_descriptors_are_boxed_in_dump() {
        let mut class = MirClass::new("demo/Box", MirClassKind::Class);
        class.fields.push(crate::mir::MirField {
            name: "count".into(),
            ty: MirType::Int,
            mutable: true,
        });
        let text = render_class(&class);
        assert!(text.contains("Ljava/lang/Integer;"));
    }
}
