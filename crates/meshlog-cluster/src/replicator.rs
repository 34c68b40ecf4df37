//! Replicator - Pull-Based Peer Replication
//!
//! Every node replicates every other node it hears about: for each joined
//! peer the replicator runs one long-lived task that opens a streaming
//! consume from offset 0 and re-produces each received record through the
//! local server. There is no coordination and no deduplication; a record
//! replicated from a peer gets a fresh local offset, and rejoining a peer
//! replays its log from the start. That keeps the mechanism honest about
//! what it is: full-mesh copying, not consensus.
//!
//! ## Lifecycle
//!
//! - `join` spawns the peer's task; a second join for the same name is a
//!   no-op, so there is at most one task per peer.
//! - `leave` signals that task to exit and forgets the peer.
//! - `close` signals every task and refuses later joins. It does not wait:
//!   tasks notice the signal before their next produce.
//!
//! Cancellation uses watch channels, one global and one per peer. The
//! task's select loop is biased toward the cancellation arms, so a pending
//! record is never produced after a leave or close has been observed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use meshlog_proto::log::log_client::LogClient;
use meshlog_proto::log::{ConsumeRequest, ProduceRequest};
use tokio::sync::watch;
use tonic::transport::Channel;
use tracing::{debug, error};

use crate::membership::Handler;

/// Replicates every joined peer's log into the local one.
pub struct Replicator {
    /// Client for this node's own log service; replicated records are
    /// re-produced through it.
    local: LogClient<Channel>,
    shutdown: watch::Sender<bool>,
    state: Mutex<State>,
}

struct State {
    /// Leave signal for each active peer task, keyed by peer name.
    peers: HashMap<String, watch::Sender<bool>>,
    closed: bool,
}

impl Replicator {
    pub fn new(local: LogClient<Channel>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            local,
            shutdown,
            state: Mutex::new(State {
                peers: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Starts replicating from the peer at `addr`. Joining a name that is
    /// already replicated, or joining after close, is a no-op.
    pub fn join(&self, name: &str, addr: &str) {
        let mut state = self.lock();
        if state.closed || state.peers.contains_key(name) {
            return;
        }
        let (leave_tx, leave_rx) = watch::channel(false);
        state.peers.insert(name.to_string(), leave_tx);

        debug!(peer = %name, addr = %addr, "starting replication");
        tokio::spawn(replicate(
            addr.to_string(),
            self.local.clone(),
            leave_rx,
            self.shutdown.subscribe(),
        ));
    }

    /// Stops replicating from the named peer. Unknown names are a no-op.
    pub fn leave(&self, name: &str) {
        let mut state = self.lock();
        if let Some(leave) = state.peers.remove(name) {
            debug!(peer = %name, "stopping replication");
            let _ = leave.send(true);
        }
    }

    /// Signals every replication task to exit and refuses further joins.
    /// Idempotent; does not wait for the tasks.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let _ = self.shutdown.send(true);
    }

    /// Number of peers currently being replicated.
    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Handler for Replicator {
    fn join(&self, name: &str, addr: &str) {
        Replicator::join(self, name, addr);
    }

    fn leave(&self, name: &str) {
        Replicator::leave(self, name);
    }
}

/// One peer's replication loop: dial, stream from offset 0, re-produce
/// locally until the stream ends, an error occurs, or a signal fires.
async fn replicate(
    addr: String,
    mut local: LogClient<Channel>,
    mut leave: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut client = match LogClient::connect(format!("http://{addr}")).await {
        Ok(client) => client,
        Err(err) => {
            error!(addr = %addr, error = %err, "failed to dial peer");
            return;
        }
    };
    let mut stream = match client.consume_stream(ConsumeRequest { offset: 0 }).await {
        Ok(response) => response.into_inner(),
        Err(status) => {
            error!(addr = %addr, error = %status, "failed to open consume stream");
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            _ = leave.changed() => return,
            message = stream.message() => {
                let record = match message {
                    Ok(Some(response)) => response.record,
                    Ok(None) => {
                        debug!(addr = %addr, "peer stream ended");
                        return;
                    }
                    Err(status) => {
                        error!(addr = %addr, error = %status, "failed to receive from peer");
                        return;
                    }
                };
                let Some(record) = record else { continue };
                if let Err(status) = local
                    .produce(ProduceRequest { record: Some(record) })
                    .await
                {
                    error!(addr = %addr, error = %status, "failed to produce replicated record");
                    return;
                }
            }
        }
    }
}
