//! End-to-end tests for the remote log channel.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::CaptureSink;
use graphrun_core::{LogEvent, LogEventSink};
use graphrun_runtime::remote_log::{MAX_FRAME_LEN, write_frame};
use graphrun_runtime::{LogRecordReceiver, SocketLogLayer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;

const WAIT: Duration = Duration::from_secs(3);

async fn start_receiver() -> (LogRecordReceiver, Arc<CaptureSink>) {
    let capture = Arc::new(CaptureSink::default());
    let sink: Arc<dyn LogEventSink> = Arc::clone(&capture) as Arc<dyn LogEventSink>;
    let receiver =
        LogRecordReceiver::bind_with_poll_interval("127.0.0.1:0", sink, Duration::from_millis(50))
            .await
            .unwrap();
    (receiver, capture)
}

/// Wait for the peer to close `stream`.
async fn expect_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 16];
    let read = timeout(WAIT, stream.read(&mut buf))
        .await
        .expect("connection was not closed");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn frames_arrive_in_order_with_remote_prefix() {
    let (receiver, capture) = start_receiver().await;
    let mut stream = TcpStream::connect(receiver.local_addr()).await.unwrap();

    for (level, message) in [("INFO", "first"), ("WARNING", "second"), ("DEBUG", "third")] {
        let event = LogEvent::new(level, "graph.exec", message);
        write_frame(&mut stream, &event).await.unwrap();
    }

    let events = capture.wait_for(3, WAIT).await;
    let summary: Vec<_> = events
        .iter()
        .map(|e| (e.level_name.as_str(), e.message.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("remote.INFO", "first"),
            ("remote.WARNING", "second"),
            ("remote.DEBUG", "third"),
        ]
    );
    assert!(events.iter().all(|e| e.logger_name == "graph.exec"));

    receiver.stop().await;
}

#[tokio::test]
async fn args_and_links_survive_the_wire() {
    let (receiver, capture) = start_receiver().await;
    let mut stream = TcpStream::connect(receiver.local_addr()).await.unwrap();

    let event = LogEvent::new("ERROR", "graph.node", "node {} failed after %d ms")
        .with_args(vec![serde_json::json!("blur"), serde_json::json!(12)])
        .with_links(vec!["node:blur".to_string()]);
    write_frame(&mut stream, &event).await.unwrap();

    let events = capture.wait_for(1, WAIT).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].links, vec!["node:blur".to_string()]);
    assert_eq!(events[0].render(), "node blur failed after 12 ms");
    assert_eq!(events[0].level(), tracing::Level::ERROR);

    receiver.stop().await;
}

#[tokio::test]
async fn malformed_frame_drops_only_that_connection() {
    let (receiver, capture) = start_receiver().await;
    let mut bad = TcpStream::connect(receiver.local_addr()).await.unwrap();
    let mut good = TcpStream::connect(receiver.local_addr()).await.unwrap();

    write_frame(&mut bad, &LogEvent::new("INFO", "bad", "before"))
        .await
        .unwrap();
    bad.write_all(&5u32.to_be_bytes()).await.unwrap();
    bad.write_all(b"nope!").await.unwrap();
    // Never read: the connection is dropped at the bad frame.
    let _ = write_frame(&mut bad, &LogEvent::new("INFO", "bad", "after")).await;

    expect_closed(&mut bad).await;

    write_frame(&mut good, &LogEvent::new("INFO", "good", "still streaming"))
        .await
        .unwrap();

    let events = capture.wait_for(2, WAIT).await;
    let messages: Vec<_> = events.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["before", "still streaming"]);

    receiver.stop().await;
}

#[tokio::test]
async fn oversized_frame_header_drops_connection() {
    let (receiver, capture) = start_receiver().await;
    let mut stream = TcpStream::connect(receiver.local_addr()).await.unwrap();

    let len = u32::try_from(MAX_FRAME_LEN + 1).unwrap();
    stream.write_all(&len.to_be_bytes()).await.unwrap();

    expect_closed(&mut stream).await;
    assert_eq!(capture.len(), 0);

    receiver.stop().await;
}

#[tokio::test]
async fn stop_closes_open_connections() {
    let (receiver, capture) = start_receiver().await;
    let mut stream = TcpStream::connect(receiver.local_addr()).await.unwrap();
    write_frame(&mut stream, &LogEvent::new("INFO", "graph", "hello"))
        .await
        .unwrap();
    capture.wait_for(1, WAIT).await;

    receiver.stop().await;

    expect_closed(&mut stream).await;
    assert_eq!(capture.len(), 1);
}

#[tokio::test]
async fn socket_layer_forwards_tracing_events() {
    let (receiver, capture) = start_receiver().await;
    let layer = SocketLogLayer::new(receiver.local_addr()).unwrap();
    let subscriber = tracing_subscriber::registry().with(layer);

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!(target: "graph.exec", node = "blur", "node finished");
        tracing::warn!(target: "graph.exec", "cache miss");
        tracing::info!(target: graphrun_runtime::remote_log::REMOTE_TARGET, "not forwarded");
    });

    let events = capture.wait_for(2, WAIT).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].level_name, "remote.INFO");
    assert_eq!(events[0].logger_name, "graph.exec");
    assert_eq!(events[0].message, "node finished node=blur");
    assert_eq!(events[1].level_name, "remote.WARNING");
    assert_eq!(events[1].message, "cache miss");

    // The re-emitted target is never forwarded, so nothing else shows up.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(capture.len(), 2);

    receiver.stop().await;
}
