//! Startup reconciliation.
//!
//! Counters are durable but namespaces are not: after a restart the store
//! may report topics with subscribers while this process holds no
//! namespace for them. The reconciler rebuilds those namespaces in the
//! background; new sockets are accepted without waiting for it.
//!
//! A counter whose topic no longer resolves is reported and left in place
//! for operational cleanup. With `reset_stale_counters` the reconciler
//! instead deletes every counter it finds; that is only sound when this
//! process is the sole writer of the store.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::broker::NamespaceManager;
use crate::persistence::CounterStore;
use crate::utils::RelayError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Topics whose namespace was rebuilt.
    pub recreated: Vec<String>,
    /// Topics with a live counter that no longer resolve.
    pub stale: Vec<String>,
    /// Counters deleted in reset mode.
    pub reset: Vec<String>,
    /// Topics that could not be processed because a store failed.
    pub failed: Vec<String>,
}

pub struct RecoveryReconciler {
    counters: Arc<dyn CounterStore>,
    namespaces: Arc<NamespaceManager>,
    reset_stale: bool,
}

impl RecoveryReconciler {
    pub fn new(counters: Arc<dyn CounterStore>, namespaces: Arc<NamespaceManager>) -> Self {
        Self {
            counters,
            namespaces,
            reset_stale: false,
        }
    }

    pub fn with_reset(mut self, reset_stale: bool) -> Self {
        self.reset_stale = reset_stale;
        self
    }

    pub async fn run(&self) -> Result<RecoveryReport, RelayError> {
        let topics = self.counters.list_active_topics().await?;
        let mut report = RecoveryReport::default();

        for topic in topics {
            if self.reset_stale {
                match self.counters.delete_counter(&topic).await {
                    Ok(()) => report.reset.push(topic),
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "failed to reset counter");
                        report.failed.push(topic);
                    }
                }
                continue;
            }

            match self.namespaces.ensure(&topic).await {
                Ok(_) => report.recreated.push(topic),
                Err(RelayError::TopicNotFound(_)) => {
                    warn!(topic = %topic, "counter survives for a topic that no longer exists");
                    report.stale.push(topic);
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "failed to rebuild namespace");
                    report.failed.push(topic);
                }
            }
        }

        info!(
            recreated = report.recreated.len(),
            stale = report.stale.len(),
            reset = report.reset.len(),
            failed = report.failed.len(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Runs reconciliation as a background task.
    pub fn spawn(self) -> JoinHandle<Option<RecoveryReport>> {
        tokio::spawn(async move {
            match self.run().await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(error = %e, "reconciliation could not list counters");
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests;
