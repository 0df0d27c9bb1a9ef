//! Where module sources and documents come from.

use crate::error::{FusionError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read access to package files. Paths are `/`-separated.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<String>;

    /// Direct children of `dir`, sorted by name
    async fn list(&self, dir: &str) -> Result<Vec<DirEntry>>;

    /// Every file below `dir`, relative to it, sorted
    async fn walk(&self, dir: &str) -> Result<Vec<String>>;
}

fn io_error(path: &str, source: std::io::Error) -> FusionError {
    if source.kind() == ErrorKind::NotFound {
        FusionError::NotFound(path.to_string())
    } else {
        FusionError::Fetch {
            path: path.to_string(),
            source,
        }
    }
}

/// Reads from the local file system below `root`
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SourceFetcher for FsFetcher {
    async fn fetch(&self, path: &str) -> Result<String> {
        tracing::debug!(path = %path, "fetching");
        tokio::fs::read_to_string(self.root.join(path))
            .await
            .map_err(|err| io_error(path, err))
    }

    async fn list(&self, dir: &str) -> Result<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(self.root.join(dir))
            .await
            .map_err(|err| io_error(dir, err))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|err| io_error(dir, err))? {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|err| io_error(dir, err))?
                .is_dir();
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        entries.sort();
        Ok(entries)
    }

    async fn walk(&self, dir: &str) -> Result<Vec<String>> {
        let base = self.root.join(dir);
        let shown = dir.to_string();
        let walked = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            for entry in walkdir::WalkDir::new(&base).sort_by_file_name() {
                let entry = entry.map_err(std::io::Error::from)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(&base) {
                    let rel: Vec<String> = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    files.push(rel.join("/"));
                }
            }
            Ok::<_, std::io::Error>(files)
        })
        .await
        .map_err(|err| io_error(&shown, std::io::Error::other(err)))?;
        walked.map_err(|err| io_error(&shown, err))
    }
}

/// In-memory files, counting how often each one is fetched
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    files: DashMap<String, String>,
    fetches: DashMap<String, usize>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, text: &str) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&self, path: &str, text: &str) {
        self.files.insert(path.to_string(), text.to_string());
    }

    /// How many times `path` has been fetched
    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches.get(path).map(|n| *n).unwrap_or(0)
    }

    fn below(&self, dir: &str) -> Vec<String> {
        let prefix = match dir.trim_end_matches('/') {
            "" => String::new(),
            dir => format!("{}/", dir),
        };
        let mut found: Vec<String> = self
            .files
            .iter()
            .filter_map(|entry| entry.key().strip_prefix(&prefix).map(str::to_string))
            .collect();
        found.sort();
        found
    }
}

#[async_trait]
impl SourceFetcher for MemoryFetcher {
    async fn fetch(&self, path: &str) -> Result<String> {
        *self.fetches.entry(path.to_string()).or_insert(0) += 1;
        self.files
            .get(path)
            .map(|text| text.clone())
            .ok_or_else(|| FusionError::NotFound(path.to_string()))
    }

    async fn list(&self, dir: &str) -> Result<Vec<DirEntry>> {
        let below = self.below(dir);
        if below.is_empty() {
            return Err(FusionError::NotFound(dir.to_string()));
        }
        let entries: BTreeSet<DirEntry> = below
            .iter()
            .map(|rel| match rel.split_once('/') {
                Some((name, _)) => DirEntry {
                    name: name.to_string(),
                    is_dir: true,
                },
                None => DirEntry {
                    name: rel.clone(),
                    is_dir: false,
                },
            })
            .collect();
        Ok(entries.into_iter().collect())
    }

    async fn walk(&self, dir: &str) -> Result<Vec<String>> {
        Ok(self.below(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fetcher() {
        let fetcher = MemoryFetcher::new()
            .with_file("pkg/lib/a.js", "exports.a = 1;")
            .with_file("pkg/lib/sub/b.js", "exports.b = 2;");

        assert_eq!(fetcher.fetch("pkg/lib/a.js").await.unwrap(), "exports.a = 1;");
        assert_eq!(fetcher.fetch_count("pkg/lib/a.js"), 1);
        assert!(matches!(
            fetcher.fetch("pkg/lib/missing.js").await,
            Err(FusionError::NotFound(_))
        ));

        let entries = fetcher.list("pkg/lib").await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "a.js".into(),
                    is_dir: false
                },
                DirEntry {
                    name: "sub".into(),
                    is_dir: true
                },
            ]
        );
        assert_eq!(fetcher.walk("pkg").await.unwrap(), vec!["lib/a.js", "lib/sub/b.js"]);
        assert!(fetcher.list("nowhere").await.is_err());
    }

    #[tokio::test]
    async fn test_fs_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib/sub")).unwrap();
        std::fs::write(dir.path().join("lib/a.js"), "exports.a = 1;").unwrap();
        std::fs::write(dir.path().join("lib/sub/b.js"), "exports.b = 2;").unwrap();

        let fetcher = FsFetcher::new(dir.path());
        assert_eq!(fetcher.fetch("lib/a.js").await.unwrap(), "exports.a = 1;");
        assert!(matches!(
            fetcher.fetch("lib/nope.js").await,
            Err(FusionError::NotFound(path)) if path == "lib/nope.js"
        ));

        let names: Vec<String> = fetcher
            .list("lib")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.js", "sub"]);
        assert_eq!(fetcher.walk("lib").await.unwrap(), vec!["a.js", "sub/b.js"]);
    }
}
