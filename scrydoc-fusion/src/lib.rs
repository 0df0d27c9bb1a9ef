//! # scrydoc fusion
//!
//! Loads packages into one symbol graph:
//! - [`DocFusion`] reads the manifest and hands out packages by name,
//!   real ones for the packages it describes and dummies for the rest
//! - [`PackageFusion`] fetches, interprets and munges each module once,
//!   expands each type document once, and resolves type names against
//!   what its modules and documents contributed
//! - [`SourceFetcher`] abstracts where files come from

pub mod cache;
pub mod doc;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod module;
pub mod package;
pub mod universe;

pub use cache::{LoadCache, Loading, WaitEdge, WaitGraph};
pub use doc::{resolve_doc_name, DocInfo};
pub use error::{FusionError, Result, SharedResult};
pub use fetch::{DirEntry, FsFetcher, MemoryFetcher, SourceFetcher};
pub use manifest::{join_path, Manifest, NeededData, PackageLayout};
pub use module::ModuleInfo;
pub use package::{merge_in_namespace, DummyPackage, Package, PackageFusion};
pub use universe::{resolve_relative, DocFusion};
