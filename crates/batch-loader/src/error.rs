//! Error types for the batch loader

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Boxed error accepted from bulk fetch implementations
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Outcome delivered to every waiter of a key.
///
/// Cloning is cheap: backend failures are reference-counted so that all
/// waiters of a window observe the same underlying error value.
#[derive(Debug, Clone)]
pub enum LoadError {
    /// The bulk fetch reported no resource for the key
    NotFound(String),
    /// The bulk fetch call itself failed for the whole window
    Backend(Arc<dyn StdError + Send + Sync>),
    /// Rejected loader or cache configuration
    InvalidConfiguration(String),
}

impl LoadError {
    /// Not-found error for a key, rendered with its `Debug` form
    pub fn not_found<K: fmt::Debug + ?Sized>(key: &K) -> Self {
        Self::NotFound(format!("{key:?}"))
    }

    /// Wrap any backend failure
    pub fn backend(err: impl Into<BoxError>) -> Self {
        let boxed: BoxError = err.into();
        Self::Backend(Arc::from(boxed))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "Not found: {key}"),
            Self::Backend(err) => write!(f, "Backend error: {err}"),
            Self::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl StdError for LoadError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Backend(err) => Some(&**err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
