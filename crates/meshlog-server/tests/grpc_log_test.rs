//! Integration tests for the gRPC log service.
//!
//! Each test boots a real tonic server on an ephemeral port backed by a
//! temporary log directory, then drives it through the generated client.

use std::sync::Arc;
use std::time::Duration;

use meshlog_proto::log::log_client::LogClient;
use meshlog_proto::log::log_server::LogServer;
use meshlog_proto::log::{ConsumeRequest, ProduceRequest, Record};
use meshlog_server::LogService;
use meshlog_storage::{Config, Log};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tonic::Code;

/// Boots a log-backed gRPC server on an ephemeral port and returns a
/// connected client. The TempDir keeps the log directory alive for the
/// duration of the test.
async fn start_server() -> (LogClient<tonic::transport::Channel>, Arc<Log>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(Log::new(dir.path(), Config::default()).unwrap());
    let service = LogService::new(log.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(LogServer::new(service))
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    let client = LogClient::connect(format!("http://{addr}")).await.unwrap();
    (client, log, dir)
}

fn record(value: &[u8]) -> Record {
    Record {
        value: value.to_vec(),
        offset: 0,
    }
}

#[tokio::test]
async fn test_produce_consume_round_trip() {
    let (mut client, _log, _dir) = start_server().await;

    let produced = client
        .produce(ProduceRequest {
            record: Some(record(b"hello world")),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(produced.offset, 0);

    let consumed = client
        .consume(ConsumeRequest { offset: 0 })
        .await
        .unwrap()
        .into_inner();
    let got = consumed.record.unwrap();
    assert_eq!(got.value, b"hello world");
    assert_eq!(got.offset, 0);
}

#[tokio::test]
async fn test_consume_past_boundary_is_out_of_range() {
    let (mut client, _log, _dir) = start_server().await;

    client
        .produce(ProduceRequest {
            record: Some(record(b"hello world")),
        })
        .await
        .unwrap();

    let status = client
        .consume(ConsumeRequest { offset: 1 })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::OutOfRange);
    assert!(status.message().contains('1'));
}

#[tokio::test]
async fn test_produce_without_record_is_invalid() {
    let (mut client, _log, _dir) = start_server().await;

    let status = client
        .produce(ProduceRequest { record: None })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_consume_stream_replays_in_order() {
    let (mut client, _log, _dir) = start_server().await;

    for value in [b"first message".as_slice(), b"second message"] {
        client
            .produce(ProduceRequest {
                record: Some(record(value)),
            })
            .await
            .unwrap();
    }

    let mut stream = client
        .consume_stream(ConsumeRequest { offset: 0 })
        .await
        .unwrap()
        .into_inner();

    let first = stream.message().await.unwrap().unwrap().record.unwrap();
    assert_eq!(first.value, b"first message");
    assert_eq!(first.offset, 0);

    let second = stream.message().await.unwrap().unwrap().record.unwrap();
    assert_eq!(second.value, b"second message");
    assert_eq!(second.offset, 1);
}

#[tokio::test]
async fn test_consume_stream_waits_for_the_tail() {
    let (mut client, _log, _dir) = start_server().await;

    // Open the stream before anything is written; it must deliver records
    // appended afterwards rather than failing on the empty log.
    let mut stream = client
        .consume_stream(ConsumeRequest { offset: 0 })
        .await
        .unwrap()
        .into_inner();

    let mut producer = client.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        producer
            .produce(ProduceRequest {
                record: Some(record(b"late arrival")),
            })
            .await
            .unwrap();
    });

    let got = tokio::time::timeout(Duration::from_secs(3), stream.message())
        .await
        .expect("stream should resume once the record lands")
        .unwrap()
        .unwrap()
        .record
        .unwrap();
    assert_eq!(got.value, b"late arrival");
    assert_eq!(got.offset, 0);
}

#[tokio::test]
async fn test_produce_stream_echoes_offsets() {
    let (mut client, _log, _dir) = start_server().await;

    let requests = tokio_stream::iter(vec![
        ProduceRequest {
            record: Some(record(b"one")),
        },
        ProduceRequest {
            record: Some(record(b"two")),
        },
        ProduceRequest {
            record: Some(record(b"three")),
        },
    ]);

    let mut responses = client
        .produce_stream(requests)
        .await
        .unwrap()
        .into_inner();

    for want in 0..3u64 {
        let response = responses.message().await.unwrap().unwrap();
        assert_eq!(response.offset, want);
    }
    assert!(responses.message().await.unwrap().is_none());
}

#[tokio::test]
async fn test_records_survive_behind_the_server() {
    let (mut client, log, _dir) = start_server().await;

    client
        .produce(ProduceRequest {
            record: Some(record(b"direct")),
        })
        .await
        .unwrap();

    // The record is visible through the storage handle backing the server.
    assert_eq!(log.highest_offset(), 0);
    assert_eq!(log.read(0).unwrap().value, b"direct");
}
