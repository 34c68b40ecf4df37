//! Log Service - gRPC Surface Over a Commit Log
//!
//! The service is written against the [`CommitLog`] capability rather than
//! the storage type directly, so tests and embedders can substitute their
//! own log. Error mapping is part of the contract: an out-of-range offset
//! becomes `Code::OutOfRange`, the one status streaming consumers treat as
//! "not written yet, keep waiting"; everything else is internal.

use std::sync::Arc;
use std::time::Duration;

use meshlog_proto::log::log_server::Log as LogRpc;
use meshlog_proto::log::{
    ConsumeRequest, ConsumeResponse, ProduceRequest, ProduceResponse, Record,
};
use meshlog_storage::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

/// How long `ConsumeStream` waits before re-probing an offset that is not
/// written yet.
const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Capacity of the per-stream response channels.
const STREAM_BUFFER: usize = 64;

/// The log operations the gRPC service requires.
pub trait CommitLog: Send + Sync + 'static {
    /// Appends a record, returning its assigned offset.
    fn append(&self, record: Record) -> meshlog_storage::Result<u64>;

    /// Reads the record stored at `offset`.
    fn read(&self, offset: u64) -> meshlog_storage::Result<Record>;
}

impl CommitLog for meshlog_storage::Log {
    fn append(&self, record: Record) -> meshlog_storage::Result<u64> {
        meshlog_storage::Log::append(self, record)
    }

    fn read(&self, offset: u64) -> meshlog_storage::Result<Record> {
        meshlog_storage::Log::read(self, offset)
    }
}

/// gRPC implementation of the `Log` service.
pub struct LogService {
    log: Arc<dyn CommitLog>,
}

impl LogService {
    pub fn new(log: Arc<dyn CommitLog>) -> Self {
        Self { log }
    }
}

fn to_status(err: Error) -> Status {
    match err {
        Error::OffsetOutOfRange(offset) => {
            Status::out_of_range(format!("offset out of range: {offset}"))
        }
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl LogRpc for LogService {
    #[tracing::instrument(skip(self, request))]
    async fn produce(
        &self,
        request: Request<ProduceRequest>,
    ) -> Result<Response<ProduceResponse>, Status> {
        let record = request
            .into_inner()
            .record
            .ok_or_else(|| Status::invalid_argument("produce request carries no record"))?;
        let offset = self.log.append(record).map_err(to_status)?;
        Ok(Response::new(ProduceResponse { offset }))
    }

    #[tracing::instrument(skip(self, request), fields(offset = request.get_ref().offset))]
    async fn consume(
        &self,
        request: Request<ConsumeRequest>,
    ) -> Result<Response<ConsumeResponse>, Status> {
        let record = self
            .log
            .read(request.into_inner().offset)
            .map_err(to_status)?;
        Ok(Response::new(ConsumeResponse {
            record: Some(record),
        }))
    }

    type ProduceStreamStream = ReceiverStream<Result<ProduceResponse, Status>>;

    async fn produce_stream(
        &self,
        request: Request<Streaming<ProduceRequest>>,
    ) -> Result<Response<Self::ProduceStreamStream>, Status> {
        let mut requests = request.into_inner();
        let log = Arc::clone(&self.log);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            loop {
                let req = match requests.message().await {
                    Ok(Some(req)) => req,
                    Ok(None) => break,
                    Err(status) => {
                        let _ = tx.send(Err(status)).await;
                        break;
                    }
                };
                let result = match req.record {
                    Some(record) => log
                        .append(record)
                        .map(|offset| ProduceResponse { offset })
                        .map_err(to_status),
                    None => Err(Status::invalid_argument(
                        "produce request carries no record",
                    )),
                };
                let failed = result.is_err();
                if tx.send(result).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type ConsumeStreamStream = ReceiverStream<Result<ConsumeResponse, Status>>;

    #[tracing::instrument(skip(self, request), fields(offset = request.get_ref().offset))]
    async fn consume_stream(
        &self,
        request: Request<ConsumeRequest>,
    ) -> Result<Response<Self::ConsumeStreamStream>, Status> {
        let mut offset = request.into_inner().offset;
        let log = Arc::clone(&self.log);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            loop {
                match log.read(offset) {
                    Ok(record) => {
                        let response = ConsumeResponse {
                            record: Some(record),
                        };
                        if tx.send(Ok(response)).await.is_err() {
                            // Client went away.
                            break;
                        }
                        offset += 1;
                    }
                    Err(Error::OffsetOutOfRange(_)) => {
                        // The tail is not written yet; wait for it.
                        tokio::select! {
                            _ = tx.closed() => break,
                            _ = tokio::time::sleep(TAIL_POLL_INTERVAL) => {}
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(to_status(err))).await;
                        break;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
