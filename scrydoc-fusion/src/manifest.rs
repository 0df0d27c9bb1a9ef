//! Package manifest and load options.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Source layout of one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageLayout {
    pub name: String,

    /// Package directory, relative to the manifest
    #[serde(default)]
    pub root: String,

    /// Module mount point -> source directory under `root`
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,

    /// Modules whose exports are the package's public face
    #[serde(default)]
    pub public: Vec<String>,
}

impl PackageLayout {
    /// Layout assumed for a dependency the manifest does not describe:
    /// `<name>/lib` mounted as `<name>`.
    pub fn conventional(name: &str) -> Self {
        let mut mappings = BTreeMap::new();
        mappings.insert(name.to_string(), "lib".to_string());
        Self {
            name: name.to_string(),
            root: name.to_string(),
            mappings,
            public: Vec::new(),
        }
    }
}

/// `{ us: { name, root, mappings }, deps: { name: bool } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub us: PackageLayout,

    /// Dependencies; `false` marks one as opaque
    #[serde(default)]
    pub deps: BTreeMap<String, bool>,

    /// Layouts of dependencies analysed in depth
    #[serde(default)]
    pub packages: BTreeMap<String, PackageLayout>,

    /// Directory of the manifest file, for resolving roots
    #[serde(skip)]
    base_dir: String,
}

impl Manifest {
    pub fn from_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a manifest from a file on disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| crate::FusionError::Fetch {
            path: path.display().to_string(),
            source,
        })?;
        let manifest = Self::from_str(&text)?;
        Ok(manifest.located_at(&path.to_string_lossy()))
    }

    /// Remember where the manifest lives so package roots resolve against
    /// its directory.
    pub fn located_at(mut self, manifest_path: &str) -> Self {
        self.base_dir = match manifest_path.rfind('/') {
            Some(idx) => manifest_path[..idx].to_string(),
            None => String::new(),
        };
        self
    }

    /// Layout of `name` with its root resolved, or `None` for packages that
    /// are not analysed in depth.
    pub fn layout_for(&self, name: &str) -> Option<PackageLayout> {
        let layout = if self.us.name == name {
            self.us.clone()
        } else if self.deps.get(name).copied().unwrap_or(false) {
            self.packages
                .get(name)
                .cloned()
                .unwrap_or_else(|| PackageLayout::conventional(name))
        } else {
            return None;
        };
        Some(PackageLayout {
            root: join_path(&[&self.base_dir, &layout.root]),
            ..layout
        })
    }
}

fn default_true() -> bool {
    true
}

/// What a package bootstrap loads up front
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeededData {
    /// Every document in `typedocs/`
    #[serde(default = "default_true")]
    pub types: bool,

    /// The list of test files
    #[serde(default)]
    pub test_files: bool,
}

impl Default for NeededData {
    fn default() -> Self {
        Self {
            types: true,
            test_files: false,
        }
    }
}

/// Join path pieces with `/`, dropping empty and `.` segments.
pub fn join_path(parts: &[&str]) -> String {
    let absolute = parts
        .iter()
        .find(|p| !p.is_empty())
        .is_some_and(|p| p.starts_with('/'));
    let joined = parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "us": { "name": "fodder", "root": "pkgs/fodder", "mappings": { "fodder": "lib" } },
        "deps": { "helpers": true, "opaque": false }
    }"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_str(MANIFEST).unwrap().located_at("ws/scrydoc.json");
        assert_eq!(manifest.us.name, "fodder");
        assert_eq!(manifest.us.mappings.get("fodder").map(String::as_str), Some("lib"));

        let us = manifest.layout_for("fodder").unwrap();
        assert_eq!(us.root, "ws/pkgs/fodder");

        let helpers = manifest.layout_for("helpers").unwrap();
        assert_eq!(helpers.root, "ws/helpers");
        assert_eq!(helpers.mappings.get("helpers").map(String::as_str), Some("lib"));

        assert!(manifest.layout_for("opaque").is_none());
        assert!(manifest.layout_for("unheard").is_none());
    }

    #[test]
    fn test_manifest_errors() {
        assert!(matches!(
            Manifest::from_str("{ \"deps\": {} }"),
            Err(crate::FusionError::Manifest(_))
        ));
    }

    #[test]
    fn test_needed_data_defaults() {
        let needed: NeededData = serde_json::from_str("{}").unwrap();
        assert_eq!(needed, NeededData::default());
        assert!(needed.types);
        assert!(!needed.test_files);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&["", "pkgs/fodder/", "./lib", "a.js"]), "pkgs/fodder/lib/a.js");
        assert_eq!(join_path(&["/abs", "x"]), "/abs/x");
        assert_eq!(join_path(&[".", ""]), "");
    }
}
