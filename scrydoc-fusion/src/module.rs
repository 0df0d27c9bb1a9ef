//! What is known about a loaded source module.

use scrydoc_js::{Obj, ObjKind, Value};
use scrydoc_typerep::{DocStream, LifeStory, Namespace, Sym, Typish};
use std::fmt;

pub struct ModuleInfo {
    pub name: String,
    pub source: String,
    /// Symbols for what the module exports
    pub export_ns: Sym,
    /// Symbols for the module's top-level declarations
    pub global_ns: Sym,
    /// The interpreter's exports value, handed to dependents
    pub raw_exports: Value,
    pub is_public: bool,
    /// The first standalone doc block
    pub file_doc: DocStream,
    pub standalone_docs: Vec<DocStream>,
}

impl ModuleInfo {
    /// A module with nothing in it, standing in for one we do not analyse.
    pub fn inert(name: &str) -> Self {
        let namespace = |which: &str| {
            Typish::Namespace(Namespace::new(
                format!("{}:{}", name, which),
                LifeStory::new(Some(name), None),
            ))
            .into_sym()
        };
        let exports = Obj::new_ref(ObjKind::Object, None);
        scrydoc_js::freeze(&Value::Object(exports.clone()));
        Self {
            name: name.to_string(),
            source: String::new(),
            export_ns: namespace("exports"),
            global_ns: namespace("global"),
            raw_exports: Value::Object(exports),
            is_public: false,
            file_doc: Vec::new(),
            standalone_docs: Vec::new(),
        }
    }

    /// The exported symbol called `name`
    pub fn export(&self, name: &str) -> Option<Sym> {
        self.export_ns.traverse_child(name, None)
    }

    /// The top-level symbol called `name`
    pub fn global(&self, name: &str) -> Option<Sym> {
        self.global_ns.traverse_child(name, None)
    }
}

impl fmt::Debug for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInfo")
            .field("name", &self.name)
            .field("export_ns", &self.export_ns)
            .field("global_ns", &self.global_ns)
            .field("is_public", &self.is_public)
            .finish_non_exhaustive()
    }
}
