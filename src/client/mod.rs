//! The `client` module defines the representation of a connected socket.
//!
//! `Client` is the handle the namespace pushes frames through;
//! `ConnectionContext` is the per-socket record handed to the activity
//! recorder and discarded on disconnect.

pub mod context;
pub mod pubsub_client;

pub use context::ConnectionContext;
pub use pubsub_client::Client;
