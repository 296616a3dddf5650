//! Common errors

use std::{error::Error as StdError, fmt, sync::Arc};

use thiserror::Error;

/// A failure reported by a credential store backend
///
/// The underlying cause is shared so that a single failure can be handed to
/// every request waiting on the same refresh.
#[derive(Clone, Debug, Error)]
#[error("credential store failed to {operation} `{key}`")]
pub struct StorageError {
    operation: StorageOperation,
    key: String,
    #[source]
    source: Arc<dyn StdError + Send + Sync + 'static>,
}

impl StorageError {
    /// Constructs a new storage error for the given operation and key
    pub fn new(
        operation: StorageOperation,
        key: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            operation,
            key: key.into(),
            source: Arc::from(source.into()),
        }
    }

    /// The store operation that failed
    pub fn operation(&self) -> StorageOperation {
        self.operation
    }

    /// The key the operation was applied to
    ///
    /// Empty for [`StorageOperation::Clear`].
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// The credential store operation that produced a [`StorageError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageOperation {
    /// Reading a value
    Read,
    /// Writing a value
    Write,
    /// Removing a value
    Remove,
    /// Clearing every value
    Clear,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Remove => "remove",
            Self::Clear => "clear",
        })
    }
}

/// An error surfaced on a request passing through the auth link
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The link was asked to handle a request without a downstream handler
    #[error("auth link cannot be the terminating link; no downstream handler was provided")]
    MissingForward,
    /// The credential store failed
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The downstream handler failed to deliver a response
    #[error("downstream handler failed")]
    Transport(#[source] Arc<dyn StdError + Send + Sync + 'static>),
}

impl Error {
    /// Wraps a downstream failure
    pub fn transport(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Transport(Arc::from(source.into()))
    }
}

/// Convenience alias for results produced by this crate
pub type Result<T, E = Error> = std::result::Result<T, E>;
