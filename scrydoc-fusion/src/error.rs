//! Error types for package and universe loading.

use scrydoc_js::ParseError;
use scrydoc_syntax::CommandError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Failed to read {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No such file: {0}")]
    NotFound(String),

    #[error("Failed to parse manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Unable to resolve path for: '{0}'")]
    UnresolvedPath(String),

    #[error("Only './' relative paths are supported, got '{name}' from '{from}'")]
    RelativePath { name: String, from: String },

    #[error("Failed to parse module {module}: {source}")]
    Parse {
        module: String,
        #[source]
        source: ParseError,
    },

    #[error("Failed to load document {name}: {source}")]
    Document {
        name: String,
        #[source]
        source: CommandError,
    },

    #[error("{name} could not load its dependency: {source}")]
    Dependency {
        name: String,
        #[source]
        source: Arc<FusionError>,
    },

    #[error("Cyclic requirement of '{0}'")]
    Cycle(String),

    #[error("Interpreting {0} keeps asking for dependencies it was given")]
    Stuck(String),

    #[error("No manifest has been loaded")]
    NoManifest,
}

pub type Result<T> = std::result::Result<T, FusionError>;

/// Outcome of a load shared by every requester
pub type SharedResult<T> = std::result::Result<T, Arc<FusionError>>;
