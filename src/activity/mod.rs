//! Audit sink for connection activity.
//!
//! The recorder only consumes `ConnectionContext` values; formatting and
//! storage of audit records belong to whoever implements the trait.

use std::net::IpAddr;

use tracing::info;

use crate::client::ConnectionContext;
use crate::utils::RelayError;

pub trait ActivityRecorder: Send + Sync {
    fn connected(&self, ctx: &ConnectionContext);

    /// `address` is the peer address as seen by the transport.
    fn rejected(&self, client_id: &str, address: IpAddr, error: &RelayError);

    fn disconnected(&self, ctx: &ConnectionContext);
}

/// Emits one structured log line per event under the `activity` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivityRecorder;

impl ActivityRecorder for TracingActivityRecorder {
    fn connected(&self, ctx: &ConnectionContext) {
        info!(
            target: "activity",
            client_id = %ctx.client_id,
            user = ctx.identity.label(),
            address = %ctx.address,
            topic = ctx.topic.as_deref().unwrap_or("-"),
            "connected"
        );
    }

    fn rejected(&self, client_id: &str, address: IpAddr, error: &RelayError) {
        info!(
            target: "activity",
            client_id = %client_id,
            address = %address,
            reason = error.kind(),
            error = %error,
            "rejected"
        );
    }

    fn disconnected(&self, ctx: &ConnectionContext) {
        info!(
            target: "activity",
            client_id = %ctx.client_id,
            user = ctx.identity.label(),
            address = %ctx.address,
            topic = ctx.topic.as_deref().unwrap_or("-"),
            duration_ms = ctx.connected_for_ms(),
            "disconnected"
        );
    }
}
