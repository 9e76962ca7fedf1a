//! Resource resolution and the shared single-flight cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use qti_types::{AssessmentItem, AssessmentTest};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("resource '{0}' not found")]
    NotFound(String),
    #[error("resource '{system_id}' is not usable: {reason}")]
    BadResource { system_id: String, reason: String },
}

/// A parsed test or item document, shared read-only across sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedDocument {
    Test(Arc<AssessmentTest>),
    Item(Arc<AssessmentItem>),
}

impl ParsedDocument {
    pub fn into_item(self, system_id: &str) -> Result<Arc<AssessmentItem>, ResolveError> {
        match self {
            Self::Item(item) => Ok(item),
            Self::Test(_) => Err(ResolveError::BadResource {
                system_id: system_id.to_string(),
                reason: "expected an assessment item, found a test".to_string(),
            }),
        }
    }
}

/// Turns a system id (an item ref's href) into a parsed document.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, system_id: &str) -> Result<ParsedDocument, ResolveError>;
}

/// Resolver over documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    documents: HashMap<String, ParsedDocument>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, system_id: impl Into<String>, item: AssessmentItem) -> Self {
        self.documents
            .insert(system_id.into(), ParsedDocument::Item(Arc::new(item)));
        self
    }

    pub fn with_test(mut self, system_id: impl Into<String>, test: AssessmentTest) -> Self {
        self.documents
            .insert(system_id.into(), ParsedDocument::Test(Arc::new(test)));
        self
    }
}

impl ResourceResolver for MemoryResolver {
    fn resolve(&self, system_id: &str) -> Result<ParsedDocument, ResolveError> {
        self.documents
            .get(system_id)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(system_id.to_string()))
    }
}

type Slot = Arc<OnceLock<Result<ParsedDocument, ResolveError>>>;

/// Memoising resolver: each system id is resolved at most once, success
/// or failure, no matter how many threads ask for it concurrently.
pub struct CachingResolver<R> {
    inner: R,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<R: ResourceResolver> CachingResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of system ids seen so far.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, system_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(system_id.to_string()).or_default().clone()
    }
}

impl<R: ResourceResolver> ResourceResolver for CachingResolver<R> {
    fn resolve(&self, system_id: &str) -> Result<ParsedDocument, ResolveError> {
        // The map lock is released before resolving; concurrent callers for
        // the same id block on the slot instead.
        let slot = self.slot(system_id);
        slot.get_or_init(|| {
            debug!(system_id, "resolving resource");
            self.inner.resolve(system_id)
        })
        .clone()
    }
}
