//! The `broker` module owns the local broadcast namespaces.
//!
//! - `engine`: `NamespaceManager`, the registry with `ensure`/`retire` as
//!   its only mutators and `broadcast` as the producer entry point.
//! - `namespace`: the per-topic set of attached sockets.
//! - `message`: the `Event` frames relayed to sockets.
//! - `resolver`: topic lookups against the persistence layer.

pub mod engine;
pub mod message;
pub mod namespace;
pub mod resolver;

pub use engine::NamespaceManager;
pub use message::Event;
pub use namespace::{Namespace, NamespaceHandle};
pub use resolver::{SledTopicCatalog, Topic, TopicResolver};

#[cfg(test)]
mod tests;
