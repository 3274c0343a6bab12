//! # perspectivecast
//!
//! `perspectivecast` relays live domain events to browser sockets subscribed
//! to named topics ("perspectives"). A broadcast namespace exists in a
//! process only while someone is subscribed to its topic; a shared counter
//! per topic decides when namespaces are created and retired.
//!
//! ## Core Modules
//!
//! - `gate`: admission control (cookie session id, session identity, address whitelist).
//! - `persistence`: the shared subscriber counters (sled or Redis).
//! - `broker`: topic resolution and the namespace lifecycle manager.
//! - `subscription`: the connect/disconnect protocol tying the above together.
//! - `recovery`: startup reconciliation of namespaces from durable counters.
//! - `transport`: the WebSocket server.
//! - `activity`: audit sink for connection activity.
//! - `client`: per-socket handles and metadata.
//! - `config`: configuration loading.
//! - `utils`: error types and logging.

pub mod activity;
pub mod broker;
pub mod client;
pub mod config;
pub mod gate;
pub mod persistence;
pub mod recovery;
pub mod subscription;
pub mod transport;
pub mod utils;
