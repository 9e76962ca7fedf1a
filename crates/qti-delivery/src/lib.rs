//! QTI test delivery.
//!
//! Ties the engine together: resolve every item a test references,
//! validate the whole package, then drive a candidate through the item
//! flow while running response and outcome processing.
//!
//! ```text
//! AssessmentTest → resolve items → validate → TestSession
//!                                               ├── next_item / prev_item
//!                                               └── submit_responses → outcomes
//! ```

pub mod config;
pub mod resolver;
pub mod session;

pub use config::{ConfigError, EngineConfig};
pub use resolver::{CachingResolver, MemoryResolver, ParsedDocument, ResolveError, ResourceResolver};
pub use session::{ItemSession, SessionError, SessionResult, TestSession};
