//! Error types for funtree
//!
//! Biological ambiguity (flat clades, repeated non-monophyletic species,
//! placeholder groups) is never an error here; it travels as data on
//! `CollapseGroup` and `SingleReport`.

use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, FunTreeError>;

/// Main error type for funtree
#[derive(Error, Debug)]
pub enum FunTreeError {
    /// The tree file for a (group, gene) unit was never built
    #[error("Missing tree artifact for {group} {gene}: {path}")]
    MissingArtifact {
        group: String,
        gene: String,
        path: String,
    },

    /// The same (genus, group, gene) showed up twice while synchronizing.
    /// Indicates duplicated interpretation work upstream.
    #[error("Duplicated tree result for genus {genus}, group {group}, gene {gene}")]
    DuplicateWork {
        genus: String,
        group: String,
        gene: String,
    },

    /// Malformed Newick input
    #[error("Newick parse error at byte {position}: {message}")]
    NewickParse { position: usize, message: String },

    /// A leaf hash that is not present in the sample registry
    #[error("Unknown sample hash: {hash}")]
    UnknownSample { hash: String },

    /// Configuration validation failed
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// JSON / TOML serialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// The worker pool could not be created
    #[error("Thread pool error: {message}")]
    ThreadPool { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FunTreeError {
    pub fn missing_artifact(
        group: impl Into<String>,
        gene: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::MissingArtifact {
            group: group.into(),
            gene: gene.into(),
            path: path.into(),
        }
    }

    pub fn duplicate_work(
        genus: impl Into<String>,
        group: impl Into<String>,
        gene: impl Into<String>,
    ) -> Self {
        Self::DuplicateWork {
            genus: genus.into(),
            group: group.into(),
            gene: gene.into(),
        }
    }

    pub fn newick(position: usize, message: impl Into<String>) -> Self {
        Self::NewickParse {
            position,
            message: message.into(),
        }
    }

    pub fn unknown_sample(hash: impl Into<String>) -> Self {
        Self::UnknownSample { hash: hash.into() }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// True for failures that abort the whole run rather than one unit
    pub fn is_fatal_defect(&self) -> bool {
        matches!(self, Self::DuplicateWork { .. })
    }
}

impl From<serde_json::Error> for FunTreeError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for FunTreeError {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_config(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for FunTreeError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool {
            message: err.to_string(),
        }
    }
}
