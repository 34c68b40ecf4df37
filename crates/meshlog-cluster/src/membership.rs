//! Membership Events and the Handler Boundary
//!
//! Discovery is not this crate's business: whatever learns about peers
//! (gossip, static configuration, an orchestrator API) expresses what it
//! learned as [`MembershipEvent`]s, and the [`Membership`] pump dispatches
//! them to a [`Handler`]. The replicator is the handler that matters here;
//! anything reacting to peers joining and leaving can implement it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A change in cluster membership as reported by a discovery source.
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    /// A peer became reachable at `addr`.
    Join { name: String, addr: String },
    /// A peer left or was declared failed.
    Leave { name: String },
}

/// Reactions to membership changes.
pub trait Handler: Send + Sync + 'static {
    fn join(&self, name: &str, addr: &str);
    fn leave(&self, name: &str);
}

/// Pump that forwards membership events from a channel to a handler.
///
/// Runs until the sending side of the channel is dropped.
pub struct Membership {
    handle: JoinHandle<()>,
}

impl Membership {
    pub fn new(handler: Arc<dyn Handler>, mut events: mpsc::Receiver<MembershipEvent>) -> Self {
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    MembershipEvent::Join { name, addr } => {
                        tracing::debug!(peer = %name, addr = %addr, "member joined");
                        handler.join(&name, &addr);
                    }
                    MembershipEvent::Leave { name } => {
                        tracing::debug!(peer = %name, "member left");
                        handler.leave(&name);
                    }
                }
            }
        });
        Self { handle }
    }

    /// Stops the pump without waiting for in-flight dispatch.
    pub fn abort(&self) {
        self.handle.abort();
    }
}
