//! The `transport` module accepts WebSocket connections.
//!
//! The upgrade request carries everything admission needs: the cookie
//! header, the `p` query parameter naming the topic, and the peer address.
//! After admission the socket only receives broadcast frames; inbound
//! frames other than close are ignored.

pub mod handshake;
pub mod websocket;

pub use websocket::{serve, start_websocket_server};
