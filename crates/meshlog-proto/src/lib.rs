//! Meshlog Protocol Buffer Definitions
//!
//! This crate contains the gRPC service definition and message types shared
//! by every meshlog component: the storage layer (which stores records in
//! their protobuf wire form), the server, and the cluster replicator.
//!
//! ## Service
//!
//! - **Log**: the commit log API exposed by every node
//!   - `Produce` / `ProduceStream`: append records, get offsets back
//!   - `Consume`: read one record by offset
//!   - `ConsumeStream`: server-streaming read from an offset onward; the
//!     stream stays open at the tail and resumes as records arrive
//!
//! ## Usage
//!
//! ```ignore
//! use meshlog_proto::log::{log_client::LogClient, ProduceRequest, Record};
//!
//! let mut client = LogClient::connect("http://localhost:8400").await?;
//! let response = client
//!     .produce(ProduceRequest {
//!         record: Some(Record {
//!             value: b"hello".to_vec(),
//!             offset: 0,
//!         }),
//!     })
//!     .await?;
//! println!("offset: {}", response.into_inner().offset);
//! ```

/// Generated types for the `meshlog.v1` package.
pub mod log {
    tonic::include_proto!("meshlog.v1");
}
