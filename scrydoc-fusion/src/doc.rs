//! What is known about a loaded document.

use crate::error::FusionError;
use crate::package::PackageFusion;
use parking_lot::Mutex;
use scrydoc_syntax::{Barrier, CommandError};
use scrydoc_typerep::{DocRequirer, DocStream, LifeStory, Namespace, Sym, Typish};
use std::fmt;
use std::sync::{Arc, Weak};

pub struct DocInfo {
    pub name: String,
    /// Typedefs the document declares
    pub export_ns: Sym,
    /// Documents named by `@requireDoc`, in order
    pub required_docs: Vec<Arc<DocInfo>>,
    pub text_stream: DocStream,
}

impl DocInfo {
    pub fn inert(name: &str) -> Self {
        Self {
            name: name.to_string(),
            export_ns: Typish::Namespace(Namespace::new(
                format!("{}:exports", name),
                LifeStory::new(Some(name), None),
            ))
            .into_sym(),
            required_docs: Vec::new(),
            text_stream: Vec::new(),
        }
    }

    /// Look a type name up in this document's exports, then in the
    /// documents it requires.
    pub fn resolve_type(&self, name: &str) -> Option<Sym> {
        self.export_ns.traverse_child(name, None).or_else(|| {
            self.required_docs
                .iter()
                .find_map(|doc| doc.resolve_type(name))
        })
    }
}

impl fmt::Debug for DocInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let required: Vec<&str> = self.required_docs.iter().map(|d| d.name.as_str()).collect();
        f.debug_struct("DocInfo")
            .field("name", &self.name)
            .field("export_ns", &self.export_ns)
            .field("required_docs", &required)
            .finish_non_exhaustive()
    }
}

/// Resolve a document name required from the document `from`.
///
/// `./x` is relative to the requiring document's directory; any other
/// relative form is refused. Names without an extension get `.scry`.
pub fn resolve_doc_name(name: &str, from: &str) -> Result<String, FusionError> {
    let resolved = if let Some(rest) = name.strip_prefix("./") {
        match from.rfind('/') {
            Some(idx) => format!("{}/{}", &from[..idx], rest),
            None => rest.to_string(),
        }
    } else if name.starts_with('.') {
        return Err(FusionError::RelativePath {
            name: name.to_string(),
            from: from.to_string(),
        });
    } else {
        name.to_string()
    };
    let last = resolved.rsplit('/').next().unwrap_or_default();
    if last.contains('.') {
        Ok(resolved)
    } else {
        Ok(format!("{}.scry", resolved))
    }
}

/// Serves `@requireDoc` for one document load
pub(crate) struct PackageRequirer {
    pub(crate) package: Weak<PackageFusion>,
    /// The document being loaded
    pub(crate) name: String,
    required: Mutex<Vec<String>>,
}

impl PackageRequirer {
    pub(crate) fn new(package: Weak<PackageFusion>, name: &str) -> Self {
        Self {
            package,
            name: name.to_string(),
            required: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn required(&self) -> Vec<String> {
        self.required.lock().clone()
    }
}

fn rejected(err: FusionError) -> Barrier {
    Box::pin(futures::future::ready(Err(CommandError::Barrier(Arc::new(err)))))
}

impl DocRequirer for PackageRequirer {
    fn require_doc(&self, name: &str, from: &str) -> Barrier {
        let target = match resolve_doc_name(name, from) {
            Ok(target) => target,
            Err(err) => return rejected(err),
        };
        let Some(package) = self.package.upgrade() else {
            return rejected(FusionError::NotFound(target));
        };
        self.required.lock().push(target.clone());
        let waiter = self.name.clone();
        Box::pin(async move {
            let waits = package.waits().clone();
            match waits
                .wait(&waiter, &target, || package.require_doc_loading(&target))
                .await
            {
                Ok(_) => Ok(()),
                Err(err) => Err(CommandError::Barrier(err)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_doc_name() {
        assert_eq!(
            resolve_doc_name("./shapes", "fodder/typedocs/main.scry").unwrap(),
            "fodder/typedocs/shapes.scry"
        );
        assert_eq!(
            resolve_doc_name("other/typedocs/x.scry", "fodder/typedocs/main.scry").unwrap(),
            "other/typedocs/x.scry"
        );
        assert!(matches!(
            resolve_doc_name("../up", "fodder/typedocs/main.scry"),
            Err(FusionError::RelativePath { .. })
        ));
    }
}
