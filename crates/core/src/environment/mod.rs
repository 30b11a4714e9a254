//! Environment adapter abstraction.
//!
//! The engine never touches a document directly. Element queries, snapshots
//! and the concrete effects of leaf actions all go through the
//! [`Environment`] trait, so the same action tree can drive a live browser
//! page or the in-memory [`MemoryDocument`] used by the CLI and the tests.

pub mod filters;
pub mod memory;

pub use memory::DocumentFixture;
pub use memory::MemoryDocument;
pub use memory::NodeFixture;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tm_protocol::run_models::Key;

/// Opaque reference to a live element, issued by the environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only view of a matched element, handed to filters and transforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    pub handle: ElementHandle,
    pub tag: String,
    pub dom_id: Option<String>,
    pub classes: Vec<String>,
    /// Trimmed text content.
    pub text: String,
    pub value: Option<String>,
}

/// Predicate applied to visible query matches. Receives the element and its
/// position among the visible matches.
pub type ElementFilter = Arc<dyn Fn(&ElementInfo, usize) -> bool + Send + Sync>;

/// Effect failure reported by the environment, carrying a descriptive message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EnvError(pub String);

impl EnvError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Adapter between the engine and a document.
///
/// Implementations decide what "present" means: hidden elements must never
/// be returned from [`Environment::query_all`].
#[async_trait]
pub trait Environment: Send + Sync {
    /// Returns every visible element matching `query` below `root`, in
    /// document order. `None` searches the whole document.
    async fn query_all(
        &self,
        root: Option<&ElementHandle>,
        query: &str,
    ) -> Result<Vec<ElementInfo>, EnvError>;

    /// Returns the first visible match accepted by `filter`.
    async fn query_element(
        &self,
        root: Option<&ElementHandle>,
        query: &str,
        filter: Option<&ElementFilter>,
    ) -> Result<Option<ElementInfo>, EnvError> {
        let matches = self.query_all(root, query).await?;
        Ok(match filter {
            Some(filter) => matches
                .into_iter()
                .enumerate()
                .find(|(index, info)| filter(info, *index))
                .map(|(_, info)| info),
            None => matches.into_iter().next(),
        })
    }

    /// Serializable snapshot of the whole document.
    async fn snapshot(&self) -> Value;

    /// Current values of every form input, keyed by element.
    async fn input_values(&self) -> Value;

    async fn current_url(&self) -> String;

    async fn click(&self, element: &ElementHandle) -> Result<(), EnvError>;

    /// Writes `value` into the element, or into the first input it wraps.
    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<(), EnvError>;

    async fn press_key(&self, element: &ElementHandle, key: Key) -> Result<(), EnvError>;

    async fn text_of(&self, element: &ElementHandle) -> Result<String, EnvError>;

    /// Reads the value of the element, or of the first input it wraps.
    async fn value_of(&self, element: &ElementHandle) -> Result<String, EnvError>;

    async fn reload(&self) -> Result<(), EnvError>;
}
