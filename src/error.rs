//! Error types for kernel generation.
//!
//! Every failure is raised synchronously and halts generation; no partial
//! output is considered valid.

use thiserror::Error;

/// Result type for generation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while classifying a mechanism or generating kernels.
#[derive(Debug, Error)]
pub enum Error {
    /// A reaction is missing or has malformed fields for its declared kind.
    #[error("reaction {reaction}: {message}")]
    Validation { reaction: usize, message: String },

    /// A rate law the generator cannot express.
    #[error("unsupported rate law ({context}): {message}")]
    UnsupportedRateLaw { context: String, message: String },

    /// An index group is empty, non-injective, or mismatched with its alternate list.
    #[error("index map for group '{group}': {message}")]
    IndexMapping { group: String, message: String },

    /// Two kernels declare the same argument with different shape or dtype.
    #[error("argument '{name}' declared as {first} and as {second}")]
    ArgumentConflict {
        name: String,
        first: String,
        second: String,
    },

    /// The kernel graph contains a cycle.
    #[error("dependency cycle between kernels: {}", kernels.join(" -> "))]
    DependencyCycle { kernels: Vec<String> },

    /// A kernel cannot be vectorized as configured.
    #[error("cannot vectorize kernel '{kernel}': {message}")]
    Vectorization { kernel: String, message: String },

    /// A kernel's instruction list is internally inconsistent.
    #[error("malformed kernel '{kernel}': {message}")]
    MalformedKernel { kernel: String, message: String },

    /// An external kernel reference no declared dependency provides.
    #[error("kernel '{name}' is not provided by any dependency")]
    UnknownKernel { name: String },

    /// Malformed options or options file.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(reaction: usize, message: impl Into<String>) -> Self {
        Error::Validation {
            reaction,
            message: message.into(),
        }
    }

    pub fn unsupported(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::UnsupportedRateLaw {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn index_mapping(group: impl Into<String>, message: impl Into<String>) -> Self {
        Error::IndexMapping {
            group: group.into(),
            message: message.into(),
        }
    }

    pub fn malformed(kernel: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MalformedKernel {
            kernel: kernel.into(),
            message: message.into(),
        }
    }
}
