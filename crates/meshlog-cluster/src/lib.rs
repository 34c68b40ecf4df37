//! Meshlog Cluster Layer
//!
//! Connects a node's log to its peers. Membership changes flow in as
//! events, the replicator reacts by streaming each peer's log into the
//! local one.
//!
//! ```text
//! discovery source ──MembershipEvent──▶ Membership ──▶ Handler (Replicator)
//!                                                        │ one task per peer
//!                                                        ▼
//!                                        peer ConsumeStream ──▶ local Produce
//! ```

pub mod membership;
pub mod replicator;

pub use membership::{Handler, Membership, MembershipEvent};
pub use replicator::Replicator;
