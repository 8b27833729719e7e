//! End-to-end tests of the relay over in-memory links.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use relay_core::{relay, Error};

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_and_response_flow_end_to_end() {
    let (link, far) = common::memory_link(4096);
    let (mut client, proxy_side) = tokio::io::duplex(4096);
    let (proxy_read, proxy_write) = tokio::io::split(proxy_side);
    let token = CancellationToken::new();

    let handle = {
        let token = token.clone();
        let policy = common::policy(Duration::from_secs(5), Duration::from_secs(2));
        tokio::spawn(async move { relay(&token, &policy, link, proxy_read, proxy_write).await })
    };

    client.write_all(b"Request").await.unwrap();
    client.shutdown().await.unwrap();

    // Request side ends gracefully: EOF with no close reason.
    assert_eq!(common::drain(&far.reader).await.unwrap(), b"Request");
    assert!(far.reader.is_closed());
    assert!(far.reader.close_reason().is_none());

    far.writer.write(Bytes::from_static(b"Response")).await.unwrap();
    far.writer.close();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"Response");

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert!(!token.is_cancelled());
    // Closed gracefully, never torn down afterwards.
    assert!(far.reader.close_reason().is_none());
    assert!(far.reader.read().await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_link_failure_mid_copy_tears_down_both_ends() {
    let (link, far) = common::memory_link(4096);
    let (mut client, proxy_side) = tokio::io::duplex(4096);
    let (proxy_read, proxy_write) = tokio::io::split(proxy_side);
    let token = CancellationToken::new();

    let handle = {
        let token = token.clone();
        let policy = common::policy(Duration::from_secs(5), Duration::from_secs(2));
        tokio::spawn(async move { relay(&token, &policy, link, proxy_read, proxy_write).await })
    };

    // Both directions carry data before the failure.
    client.write_all(b"Request").await.unwrap();
    let chunk = far.reader.read().await.unwrap().unwrap();
    assert_eq!(&chunk[..], b"Request");

    far.writer.write(Bytes::from_static(b"Partial")).await.unwrap();
    let mut partial = [0u8; 7];
    client.read_exact(&mut partial).await.unwrap();
    assert_eq!(&partial, b"Partial");

    far.writer.close_error(Error::PipeClosed);

    let err = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, Error::ConnectionEnds(_)));
    assert!(matches!(err.root_cause(), Error::PipeClosed));
    assert!(err.to_string().contains("failed to transport response"));

    // The response side keeps the injected reason.
    assert!(matches!(far.writer.close_reason(), Some(Error::PipeClosed)));
    // The request side is closed with the relay's failure.
    let reason = far.reader.close_reason().expect("request side must be torn down");
    assert!(matches!(reason, Error::Transport { .. }));
    assert!(matches!(reason.root_cause(), Error::PipeClosed));
    assert!(matches!(far.reader.read().await, Err(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_connection_times_out() {
    let (link, far) = common::memory_link(4096);
    let (_client, proxy_side) = tokio::io::duplex(4096);
    let (proxy_read, proxy_write) = tokio::io::split(proxy_side);
    let token = CancellationToken::new();

    let policy = common::policy(Duration::from_millis(100), Duration::from_millis(100));
    let started = tokio::time::Instant::now();
    let err = tokio::time::timeout(
        Duration::from_secs(2),
        relay(&token, &policy, link, proxy_read, proxy_write),
    )
    .await
    .unwrap()
    .unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(err.is_cancelled());
    assert!(far.reader.close_reason().is_some());
    assert!(!token.is_cancelled(), "only the relay's own token fires");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_traffic_keeps_connection_alive() {
    let (link, far) = common::memory_link(4096);
    let (mut client, proxy_side) = tokio::io::duplex(4096);
    let (proxy_read, proxy_write) = tokio::io::split(proxy_side);
    let token = CancellationToken::new();

    let handle = {
        let token = token.clone();
        let policy = common::policy(Duration::from_millis(200), Duration::from_secs(1));
        tokio::spawn(async move { relay(&token, &policy, link, proxy_read, proxy_write).await })
    };

    // Total time exceeds the idle timeout, but no single gap does.
    for _ in 0..6 {
        client.write_all(b"ping").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
    }
    client.shutdown().await.unwrap();
    assert_eq!(common::drain(&far.reader).await.unwrap().len(), 24);

    far.writer.close();
    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
