//! Per-package loading and name resolution.
//!
//! A [`PackageFusion`] loads the modules and documents of one package at
//! most once each, munges them into symbols that share one
//! [`SymbolTable`], and merges what they contribute into the package's
//! namespaces of exported things and types.

use crate::cache::{LoadCache, Loading, WaitGraph};
use crate::doc::{DocInfo, PackageRequirer};
use crate::error::{FusionError, Result, SharedResult};
use crate::fetch::SourceFetcher;
use crate::manifest::{join_path, NeededData, PackageLayout};
use crate::module::ModuleInfo;
use crate::universe::{resolve_relative, DocFusion};
use futures::future::{self, FutureExt};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use scrydoc_js::{interpret, DocComment, Mode, Outcome, Value};
use scrydoc_syntax::{parse_document_with, Datum, Flow, Frame, LoadOptions};
use scrydoc_typerep::{
    doc_registry, read_doc_comment, ArgKey, DocRequirer, DocStream, DocValue, LifeStory, Muncher,
    Namespace, Sym, SymbolTable, Typish, EXPORTS_CONTEXT, REQUIRER_VALUE,
};
use scrydoc_types::NameMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

static TEST_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^test.+\.js$").expect("valid regex"));

/// Directory of type documents loaded by bootstrap
const TYPEDOCS_DIR: &str = "typedocs";
const TESTS_DIR: &str = "tests";
const DOC_EXTENSION: &str = ".scry";

/// Namespaces a package accumulates from its modules and documents
#[derive(Debug, Default)]
struct Spaces {
    public_things: NameMap<Sym>,
    internal_things: NameMap<Sym>,
    public_types: NameMap<Sym>,
    internal_types: NameMap<Sym>,
}

pub struct PackageFusion {
    layout: PackageLayout,
    fetcher: Arc<dyn SourceFetcher>,
    universe: Weak<DocFusion>,
    /// Shared with every package of the same universe
    waits: Arc<WaitGraph>,
    symbols: SymbolTable,
    modules: LoadCache<ModuleInfo>,
    docs: LoadCache<DocInfo>,
    spaces: RwLock<Spaces>,
    test_files: RwLock<Vec<String>>,
}

/// Copy the children of `namespace` into `target`, keeping entries that
/// are already there and skipping symbols `filter` rejects.
pub fn merge_in_namespace(namespace: &Sym, target: &mut NameMap<Sym>, filter: Option<fn(&Sym) -> bool>) {
    let Some(members) = namespace.members() else {
        return;
    };
    for (key, sym) in members.read().children().iter() {
        if filter.is_some_and(|keep| !keep(sym)) {
            continue;
        }
        target.insert_if_absent(key, sym.clone());
    }
}

fn is_type(sym: &Sym) -> bool {
    sym.is_type()
}

impl PackageFusion {
    /// A package on its own; requirements outside it fail.
    pub fn new(layout: PackageLayout, fetcher: Arc<dyn SourceFetcher>) -> Arc<Self> {
        Self::within(layout, fetcher, Weak::new(), Arc::new(WaitGraph::new()))
    }

    pub(crate) fn within(
        layout: PackageLayout,
        fetcher: Arc<dyn SourceFetcher>,
        universe: Weak<DocFusion>,
        waits: Arc<WaitGraph>,
    ) -> Arc<Self> {
        Arc::new(Self {
            layout,
            fetcher,
            universe,
            waits,
            symbols: SymbolTable::new(),
            modules: LoadCache::new("module"),
            docs: LoadCache::new("document"),
            spaces: RwLock::new(Spaces::default()),
            test_files: RwLock::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.layout.name
    }

    pub fn layout(&self) -> &PackageLayout {
        &self.layout
    }

    /// Symbols of every module munged so far, by origin
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Load what `needed` asks for: the type documents so bare type names
    /// resolve, and the list of test files.
    pub async fn bootstrap(self: &Arc<Self>, needed: NeededData) -> Result<()> {
        if needed.types {
            self.populate_types().await?;
        }
        if needed.test_files {
            let dir = join_path(&[&self.layout.root, TESTS_DIR]);
            let files = match self.fetcher.list(&dir).await {
                Ok(entries) => entries
                    .into_iter()
                    .filter(|e| !e.is_dir && TEST_FILE.is_match(&e.name))
                    .map(|e| e.name)
                    .collect(),
                Err(FusionError::NotFound(_)) => Vec::new(),
                Err(err) => return Err(err),
            };
            tracing::debug!(package = %self.name(), count = files.len(), "found test files");
            *self.test_files.write() = files;
        }
        Ok(())
    }

    async fn populate_types(self: &Arc<Self>) -> Result<()> {
        let dir = join_path(&[&self.layout.root, TYPEDOCS_DIR]);
        let entries = match self.fetcher.list(&dir).await {
            Ok(entries) => entries,
            Err(FusionError::NotFound(_)) => {
                tracing::debug!(package = %self.name(), "no type documents");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let loads = entries
            .iter()
            .filter(|entry| !entry.is_dir && entry.name.ends_with(DOC_EXTENSION))
            .map(|entry| {
                self.require_doc_loading(&format!("{}/{}/{}", self.name(), TYPEDOCS_DIR, entry.name))
            });
        future::try_join_all(loads)
            .await
            .map_err(|source| FusionError::Dependency {
                name: self.name().to_string(),
                source,
            })?;
        Ok(())
    }

    /// File path of the module `name`, through the longest matching mount
    /// point.
    pub fn resolve_source_path(&self, name: &str) -> Result<String> {
        let mount = self
            .layout
            .mappings
            .iter()
            .filter(|(mount, _)| {
                name.strip_prefix(mount.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|(mount, _)| mount.len());
        let Some((mount, dir)) = mount else {
            return Err(FusionError::UnresolvedPath(name.to_string()));
        };
        let rest = &name[mount.len() + 1..];
        let path = join_path(&[&self.layout.root, dir, rest]);
        if path.ends_with(".js") {
            Ok(path)
        } else {
            Ok(format!("{}.js", path))
        }
    }

    /// File path of the document `name`, which lives under the package's
    /// root.
    pub fn resolve_doc_path(&self, name: &str) -> Result<String> {
        match name.strip_prefix(self.name()).and_then(|rest| rest.strip_prefix('/')) {
            Some(rest) if !rest.is_empty() => Ok(join_path(&[&self.layout.root, rest])),
            _ => Err(FusionError::UnresolvedPath(name.to_string())),
        }
    }

    /// Module names of every source file under the mount points.
    pub async fn crawl_all_source_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for (mount, dir) in &self.layout.mappings {
            let files = self.fetcher.walk(&join_path(&[&self.layout.root, dir])).await?;
            names.extend(
                files
                    .iter()
                    .filter_map(|file| file.strip_suffix(".js"))
                    .map(|file| join_path(&[mount, file])),
            );
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Load, interpret and munge the module `name`, once.
    pub async fn require_module(self: &Arc<Self>, name: &str) -> SharedResult<Arc<ModuleInfo>> {
        self.require_module_loading(name).await
    }

    pub(crate) fn require_module_loading(self: &Arc<Self>, name: &str) -> Loading<ModuleInfo> {
        let package = self.clone();
        let owned = name.to_string();
        self.modules
            .load(name, move || async move { package.load_module(owned).await }.boxed())
    }

    /// Load and expand the document `name`, once.
    pub async fn require_doc(self: &Arc<Self>, name: &str) -> SharedResult<Arc<DocInfo>> {
        self.require_doc_loading(name).await
    }

    pub(crate) fn require_doc_loading(self: &Arc<Self>, name: &str) -> Loading<DocInfo> {
        let package = self.clone();
        let owned = name.to_string();
        self.docs
            .load(name, move || async move { package.load_doc(owned).await }.boxed())
    }

    pub(crate) fn waits(&self) -> &Arc<WaitGraph> {
        &self.waits
    }

    /// The module `name`, already resolved against its requirer.
    fn require_dependency(self: &Arc<Self>, name: &str) -> future::BoxFuture<'static, SharedResult<Arc<ModuleInfo>>> {
        if let Some(universe) = self.universe.upgrade() {
            return universe.require_module_boxed(name.to_string());
        }
        if name.split('/').next() == Some(self.name()) {
            self.require_module_loading(name).boxed()
        } else {
            let err = Arc::new(FusionError::UnresolvedPath(name.to_string()));
            future::ready(Err(err)).boxed()
        }
    }

    async fn load_module(self: Arc<Self>, name: String) -> Result<ModuleInfo> {
        let path = self.resolve_source_path(&name)?;
        let source = self.fetcher.fetch(&path).await?;
        let program = scrydoc_js::parse(&source).map_err(|source| FusionError::Parse {
            module: name.clone(),
            source,
        })?;

        // every restart starts from scratch with a bigger set of dependencies
        let mut linked: HashMap<String, Value> = HashMap::new();
        let done = loop {
            let outcome = interpret(&program, &name, Mode::CommonJs, &linked);
            let needed = match outcome {
                Outcome::Complete(done) => break done,
                Outcome::NeedsDependencies(needed) => needed,
            };
            let fresh: Vec<String> = needed
                .into_iter()
                .filter(|dep| !linked.contains_key(dep))
                .collect();
            if fresh.is_empty() {
                return Err(FusionError::Stuck(name));
            }
            tracing::debug!(module = %name, deps = ?fresh, "restarting after dependencies");
            let package = &self;
            let waiter = name.as_str();
            let loads = fresh.iter().map(|dep| {
                let target = resolve_relative(dep, Some(waiter));
                async move {
                    package
                        .waits
                        .wait(waiter, &target, || package.require_dependency(&target))
                        .await
                }
            });
            let infos = future::try_join_all(loads)
                .await
                .map_err(|source| FusionError::Dependency {
                    name: name.clone(),
                    source,
                })?;
            for (dep, info) in fresh.into_iter().zip(infos) {
                linked.insert(dep, info.raw_exports.clone());
            }
        };

        let muncher = Muncher::new(&self.symbols, &name);
        let export_ns = muncher.munge_namespace("exports", &done.exports);
        let global_ns = muncher.munge_namespace("global", &Value::Object(done.global.clone()));
        let mut docs = program
            .standalone_docs
            .iter()
            .map(|doc| self.read_standalone_doc(doc, &name));
        let file_doc = docs.next().unwrap_or_default();
        let standalone_docs = docs.collect();

        let info = ModuleInfo {
            is_public: self.layout.public.iter().any(|p| p == &name),
            name,
            source,
            export_ns,
            global_ns,
            raw_exports: done.exports,
            file_doc,
            standalone_docs,
        };
        self.process_module(&info);
        tracing::info!(module = %info.name, "module ready");
        Ok(info)
    }

    fn read_standalone_doc(&self, doc: &DocComment, module: &str) -> DocStream {
        match read_doc_comment(&doc.text, module) {
            Ok(bits) => bits.stream,
            Err(err) => {
                tracing::warn!(module = %module, line = doc.line, error = %err, "unreadable doc block");
                vec![Flow::Para(vec![Datum::Text(doc.text.clone())])]
            }
        }
    }

    async fn load_doc(self: Arc<Self>, name: String) -> Result<DocInfo> {
        let path = self.resolve_doc_path(&name)?;
        let text = self.fetcher.fetch(&path).await?;

        let requirer = Arc::new(PackageRequirer::new(Arc::downgrade(&self), &name));
        let shared: Arc<dyn DocRequirer> = requirer.clone();
        let registry = doc_registry();
        let mut document = parse_document_with(
            &registry,
            &text,
            Some(name.as_str()),
            &LoadOptions::default(),
            move |ctx| {
                ctx.push_named_context(EXPORTS_CONTEXT, Frame::dict());
                ctx.push_named_value(REQUIRER_VALUE, DocValue::Requirer(shared));
            },
        )
        .await
        .map_err(|source| FusionError::Document {
            name: name.clone(),
            source,
        })?;

        let exports = document
            .ctx
            .pop_named_context(EXPORTS_CONTEXT)
            .ok()
            .and_then(Frame::into_dict)
            .unwrap_or_default();
        let export_ns = Typish::Namespace(Namespace::new(
            format!("{}:exports", name),
            LifeStory::new(Some(&name), None),
        ))
        .into_sym();
        if let Some(members) = export_ns.members() {
            let mut members = members.write();
            for (key, value) in exports.iter() {
                if let Some(sym) = value.as_sym() {
                    members.file(key, sym.clone(), None);
                }
            }
        }
        let required_docs = requirer
            .required()
            .iter()
            .filter_map(|required| self.docs.peek(required))
            .collect();

        let info = DocInfo {
            name,
            export_ns,
            required_docs,
            text_stream: document.stream,
        };
        self.process_doc(&info);
        tracing::info!(doc = %info.name, "document ready");
        Ok(info)
    }

    /// Merge a module's exports and types into the package namespaces.
    fn process_module(&self, info: &ModuleInfo) {
        let mut spaces = self.spaces.write();
        if info.is_public {
            merge_in_namespace(&info.export_ns, &mut spaces.public_things, None);
            // public types only come from exports
            merge_in_namespace(&info.export_ns, &mut spaces.public_types, Some(is_type));
        } else {
            merge_in_namespace(&info.export_ns, &mut spaces.internal_things, None);
            merge_in_namespace(&info.export_ns, &mut spaces.internal_types, Some(is_type));
            merge_in_namespace(&info.global_ns, &mut spaces.internal_types, Some(is_type));
        }
    }

    /// Register the types a document declares.
    fn process_doc(&self, info: &DocInfo) {
        let mut spaces = self.spaces.write();
        merge_in_namespace(&info.export_ns, &mut spaces.internal_types, Some(is_type));
        for flow in &info.text_stream {
            let Flow::Block(Datum::Value(DocValue::Sym(sym))) = flow else {
                continue;
            };
            if !sym.is_type() {
                continue;
            }
            if let Some(name) = sym.name() {
                spaces.internal_types.insert_if_absent(name, sym.clone());
            }
        }
    }

    /// The type or exported thing called `name`.
    pub fn resolve_internal(&self, name: &str) -> Option<Sym> {
        let spaces = self.spaces.read();
        spaces
            .internal_types
            .get(name)
            .or_else(|| spaces.internal_things.get(name))
            .or_else(|| spaces.public_types.get(name))
            .or_else(|| spaces.public_things.get(name))
            .cloned()
    }

    /// Follow a dotted name from the package's root namespace, looking at
    /// children first and arguments second. Textual type references met on
    /// the way are resolved against the package.
    pub fn traverse(&self, dotted: &str) -> Option<Sym> {
        let mut bits = dotted.split('.');
        let mut current = self.resolve_internal(bits.next()?)?;
        for bit in bits {
            self.bind_refs(&current, 0);
            let key = match bit.parse::<usize>() {
                Ok(idx) => ArgKey::Index(idx),
                Err(_) => ArgKey::Name(bit),
            };
            current = current
                .traverse_child(bit, None)
                .or_else(|| current.traverse_arg(key))?;
        }
        self.bind_refs(&current, 0);
        Some(current)
    }

    fn bind_refs(&self, sym: &Sym, depth: usize) {
        // typedef chains are short; anything longer is a loop
        if depth > 8 {
            return;
        }
        match &**sym {
            Typish::Ref(reference) => {
                if reference.target().is_none() {
                    match self.resolve_internal(&reference.name) {
                        Some(found) => {
                            if !reference.resolve(found) {
                                tracing::warn!(name = %reference.name, "cyclic type reference; not binding");
                            }
                        }
                        None => tracing::debug!(name = %reference.name, "unresolved type reference"),
                    }
                }
                if let Some(target) = reference.target() {
                    self.bind_refs(&target, depth + 1);
                }
            }
            other => {
                if let Some(ty) = other.described_type() {
                    self.bind_refs(&ty, depth + 1);
                }
            }
        }
    }

    pub fn public_things(&self) -> NameMap<Sym> {
        self.spaces.read().public_things.clone()
    }

    pub fn internal_things(&self) -> NameMap<Sym> {
        self.spaces.read().internal_things.clone()
    }

    pub fn public_types(&self) -> NameMap<Sym> {
        self.spaces.read().public_types.clone()
    }

    pub fn internal_types(&self) -> NameMap<Sym> {
        self.spaces.read().internal_types.clone()
    }

    pub fn test_files(&self) -> Vec<String> {
        self.test_files.read().clone()
    }

    /// Names of the modules requested so far
    pub fn module_names(&self) -> Vec<String> {
        self.modules.names()
    }

    /// Names of the documents requested so far
    pub fn doc_names(&self) -> Vec<String> {
        self.docs.names()
    }
}

impl fmt::Debug for PackageFusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageFusion")
            .field("layout", &self.layout)
            .field("modules", &self.modules.names())
            .field("docs", &self.docs.names())
            .finish_non_exhaustive()
    }
}

/// A dependency that is not analysed: every module is empty.
#[derive(Debug)]
pub struct DummyPackage {
    name: String,
    modules: dashmap::DashMap<String, Arc<ModuleInfo>>,
}

impl DummyPackage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            modules: dashmap::DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn require_module(&self, name: &str) -> Arc<ModuleInfo> {
        self.modules
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(package = %self.name, module = %name, "standing in for module");
                Arc::new(ModuleInfo::inert(name))
            })
            .clone()
    }
}

#[derive(Debug, Clone)]
pub enum Package {
    Real(Arc<PackageFusion>),
    Dummy(Arc<DummyPackage>),
}

impl Package {
    pub fn name(&self) -> &str {
        match self {
            Package::Real(p) => p.name(),
            Package::Dummy(d) => d.name(),
        }
    }

    pub fn as_real(&self) -> Option<&Arc<PackageFusion>> {
        match self {
            Package::Real(p) => Some(p),
            Package::Dummy(_) => None,
        }
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self, Package::Dummy(_))
    }

    pub async fn require_doc(&self, name: &str) -> SharedResult<Arc<DocInfo>> {
        match self {
            Package::Real(p) => p.require_doc(name).await,
            Package::Dummy(_) => Ok(Arc::new(DocInfo::inert(name))),
        }
    }
}
