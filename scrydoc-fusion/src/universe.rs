//! The root of everything loaded: one manifest, many packages.

use crate::cache::{LoadCache, WaitGraph};
use crate::doc::DocInfo;
use crate::error::{FusionError, SharedResult};
use crate::fetch::SourceFetcher;
use crate::manifest::{Manifest, NeededData};
use crate::module::ModuleInfo;
use crate::package::{DummyPackage, Package, PackageFusion};
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Resolve `./name` against the module `base_id`: `require("./foo")` from
/// `bar/baz/bog` is `bar/baz/foo`. Other names are returned unchanged.
pub fn resolve_relative(name: &str, base_id: Option<&str>) -> String {
    match (name.strip_prefix("./"), base_id) {
        (Some(rest), Some(base)) => match base.rfind('/') {
            Some(idx) => format!("{}/{}", &base[..idx], rest),
            None => rest.to_string(),
        },
        _ => name.to_string(),
    }
}

pub struct DocFusion {
    fetcher: Arc<dyn SourceFetcher>,
    needed: NeededData,
    manifest: RwLock<Option<Arc<Manifest>>>,
    packages: LoadCache<Package>,
    waits: Arc<WaitGraph>,
    me: Weak<DocFusion>,
}

impl DocFusion {
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Arc<Self> {
        Self::with_needed(fetcher, NeededData::default())
    }

    pub fn with_needed(fetcher: Arc<dyn SourceFetcher>, needed: NeededData) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            fetcher,
            needed,
            manifest: RwLock::new(None),
            packages: LoadCache::new("package"),
            waits: Arc::new(WaitGraph::new()),
            me: me.clone(),
        })
    }

    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.read().clone()
    }

    /// Read the manifest and bootstrap the package it describes.
    pub async fn bootstrap_universe(&self, manifest_path: &str) -> SharedResult<Package> {
        let text = self.fetcher.fetch(manifest_path).await.map_err(Arc::new)?;
        let manifest = Manifest::from_str(&text)
            .map_err(Arc::new)?
            .located_at(manifest_path);
        let us = manifest.us.name.clone();
        tracing::info!(package = %us, deps = manifest.deps.len(), "bootstrapping universe");
        *self.manifest.write() = Some(Arc::new(manifest));
        self.get_package(&us).await
    }

    /// The package called `name`, created and bootstrapped on first use.
    ///
    /// Every caller waits for the one bootstrap; a package whose bootstrap
    /// failed keeps failing with the same error.
    pub async fn get_package(&self, name: &str) -> SharedResult<Package> {
        let layout = self
            .manifest()
            .ok_or_else(|| Arc::new(FusionError::NoManifest))?
            .layout_for(name);
        let fetcher = self.fetcher.clone();
        let universe = self.me.clone();
        let waits = self.waits.clone();
        let needed = self.needed;
        let owned = name.to_string();
        let package = self
            .packages
            .load(name, move || {
                async move {
                    match layout {
                        Some(layout) => {
                            let real = PackageFusion::within(layout, fetcher, universe, waits);
                            let booted = real.bootstrap(needed).await;
                            booted.map(|()| Package::Real(real))
                        }
                        None => {
                            tracing::debug!(package = %owned, "using a dummy package");
                            Ok(Package::Dummy(Arc::new(DummyPackage::new(&owned))))
                        }
                    }
                }
                .boxed()
            })
            .await?;
        Ok((*package).clone())
    }

    /// Load a module; its package is the first segment of its name.
    pub async fn require_module(
        &self,
        name: &str,
        base_id: Option<&str>,
    ) -> SharedResult<Arc<ModuleInfo>> {
        self.require_module_boxed(resolve_relative(name, base_id)).await
    }

    pub(crate) fn require_module_boxed(&self, name: String) -> BoxFuture<'static, SharedResult<Arc<ModuleInfo>>> {
        let Some(me) = self.me.upgrade() else {
            return future::ready(Err(Arc::new(FusionError::NoManifest))).boxed();
        };
        async move {
            let package_name = name.split('/').next().unwrap_or_default().to_string();
            match me.get_package(&package_name).await? {
                Package::Real(package) => package.require_module(&name).await,
                Package::Dummy(dummy) => Ok(dummy.require_module(&name)),
            }
        }
        .boxed()
    }

    /// Load a document from the package named by its first segment.
    pub async fn require_doc(&self, name: &str) -> SharedResult<Arc<DocInfo>> {
        let package_name = name.split('/').next().unwrap_or_default();
        self.get_package(package_name).await?.require_doc(name).await
    }

    /// Names of the packages known so far, sorted
    pub fn package_names(&self) -> Vec<String> {
        self.packages.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_relative("./foo", Some("bar/baz/bog")), "bar/baz/foo");
        assert_eq!(resolve_relative("./foo", Some("bog")), "foo");
        assert_eq!(resolve_relative("./foo", None), "./foo");
        assert_eq!(resolve_relative("pkg/mod", Some("bar/baz")), "pkg/mod");
    }
}
