use crate::{AccessDescriptor, AnalysisResult, ObjectError, ObjectRef, RunError};
use async_trait::async_trait;
use std::collections::HashSet;

/// Enumerates every object currently in a container. Each call re-lists
/// from the source of truth; order is stable only within one call.
#[async_trait]
pub trait ObjectLister {
    async fn list_objects(&self, container: &str) -> Result<Vec<ObjectRef>, RunError>;
}

/// Submits one object for analysis and blocks until the service reaches a
/// terminal state. Implementations must distinguish transport failures
/// from the service itself rejecting the document.
#[async_trait]
pub trait DocumentAnalyzer {
    async fn analyze(&self, descriptor: &AccessDescriptor)
        -> Result<AnalysisResult, ObjectError>;
}

/// Durable record of completed object names. Append-only; the set only
/// ever grows across runs against the same container.
pub trait CheckpointLog {
    /// The set of names already completed. A store with no prior state
    /// loads as the empty set, never as an error.
    fn load(&self) -> std::io::Result<HashSet<String>>;

    /// Durably records one completed name. An error here means the object
    /// must be treated as not yet processed.
    fn append(&mut self, name: &str) -> std::io::Result<()>;
}
