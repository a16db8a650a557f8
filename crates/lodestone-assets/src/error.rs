//! Error types for the asset system.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur during asset operations.
#[derive(Debug)]
pub enum AssetError {
    /// A query or release referenced a name that is not in the catalog.
    NotLoaded {
        /// The asset name.
        name: String,
    },

    /// The underlying file could not be resolved at enqueue time.
    NotFound {
        /// The asset name that failed to resolve.
        name: String,
    },

    /// Failed to read asset data from a resolved file.
    Io {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// No registered loader matches the type/suffix pair.
    NoLoader {
        /// Human-readable asset type name.
        type_name: &'static str,
        /// The filename that was being matched, if any.
        name: Option<String>,
    },

    /// The same name was requested or recorded under two different types.
    TypeConflict {
        /// The asset name.
        name: String,
        /// The type already recorded for this name.
        expected: &'static str,
        /// The conflicting type.
        requested: &'static str,
    },

    /// A loader is already registered for this exact type/suffix pair.
    LoaderConflict {
        /// Human-readable asset type name.
        type_name: &'static str,
        /// The filename suffix.
        suffix: String,
    },

    /// The loader capability itself failed during dependency discovery,
    /// the worker phase, or the finishing phase.
    LoaderFailure {
        /// The asset name being loaded.
        name: String,
        /// Description of the failure.
        message: String,
    },
}

impl AssetError {
    /// Shorthand for a [`AssetError::LoaderFailure`].
    pub fn loader(name: impl Into<String>, message: impl Into<String>) -> Self {
        AssetError::LoaderFailure {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::NotLoaded { name } => {
                write!(f, "Asset not loaded: {}", name)
            }
            AssetError::NotFound { name } => {
                write!(f, "Asset file not found: {}", name)
            }
            AssetError::Io { path, source } => {
                write!(f, "IO error reading '{}': {}", path.display(), source)
            }
            AssetError::NoLoader { type_name, name } => {
                if let Some(name) = name {
                    write!(f, "No loader for type {} matching '{}'", type_name, name)
                } else {
                    write!(f, "No loader registered for type {}", type_name)
                }
            }
            AssetError::TypeConflict {
                name,
                expected,
                requested,
            } => {
                write!(
                    f,
                    "Asset '{}' already uses type {}, requested as {}",
                    name, expected, requested
                )
            }
            AssetError::LoaderConflict { type_name, suffix } => {
                write!(
                    f,
                    "Loader already registered for type {} with suffix '{}'",
                    type_name, suffix
                )
            }
            AssetError::LoaderFailure { name, message } => {
                write!(f, "Failed to load '{}': {}", name, message)
            }
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssetError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for asset operations.
pub type AssetResult<T> = Result<T, AssetError>;
