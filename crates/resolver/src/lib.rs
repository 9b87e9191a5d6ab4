//! Macro resolution for monitoring configuration text.
//!
//! This crate provides:
//! - Macro grammars per family and a scenario table selecting them
//! - Function ordinal indexing over trigger expressions
//! - Batched host, interface, item and history lookups through collaborator traits
//! - Hierarchical user macro resolution over template links
//! - Functional item macros in graph names
//! - An in-memory collaborator loaded from a YAML snapshot

pub mod format;
pub mod functional;
pub mod functions;
pub mod memory;
pub mod patterns;
mod planner;
pub mod request;
pub mod resolver;
pub mod scenario;
pub mod store;
pub mod substitute;
pub mod usermacros;

pub use memory::MemoryStore;
pub use request::{
    FunctionRecord, GraphItem, GraphRecord, ItemRecord, MacroInputs, ResolutionRequest,
    ResolveOptions, TriggerRecord,
};
pub use resolver::MacroResolver;
pub use scenario::Scenario;
pub use store::{ConfigStore, HistoryStore, HostKey, KeyParams};
