//! End-to-end stream layer tests over real KCP sockets on loopback.

#![cfg(feature = "kcp")]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use kcp_stream_layer::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn loopback_config() -> TransportConfig {
    TransportBuilder::new()
        .bind_addr(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .build()
}

#[tokio::test]
async fn test_addr_is_resolved_bind_address() {
    let layer = KcpStreamLayer::bind(loopback_config()).await.unwrap();

    let addr = layer.addr();
    assert_eq!(addr.ip(), Ipv4Addr::LOCALHOST);
    assert_ne!(addr.port(), 0);
    assert_eq!(layer.advertise_addr(), addr);

    layer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bytes_arrive_in_order() {
    let server = Arc::new(KcpStreamLayer::bind(loopback_config()).await.unwrap());
    let client = KcpStreamLayer::bind(loopback_config()).await.unwrap();

    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let expected = payload.len();

    let accepted = tokio::spawn({
        let server = server.clone();
        async move {
            let mut conn = server.accept().await.unwrap();
            let mut received = vec![0u8; expected];
            conn.read_exact(&mut received).await.unwrap();
            conn.write_all(b"ack").await.unwrap();
            conn.flush().await.unwrap();
            (conn, received)
        }
    });

    let mut conn = client
        .dial(&server.addr().to_string(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(conn.remote_addr(), server.addr());
    conn.write_all(&payload).await.unwrap();
    conn.flush().await.unwrap();

    let mut ack = [0u8; 3];
    tokio::time::timeout(Duration::from_secs(10), conn.read_exact(&mut ack))
        .await
        .expect("no ack from server")
        .unwrap();
    assert_eq!(&ack, b"ack");

    let (mut server_conn, received) = accepted.await.unwrap();
    assert_eq!(received, payload);

    client.close().await.unwrap();
    assert_eq!(client.dialed_count(), 0);
    server_conn.close().await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_close_then_dial_again() {
    let server = Arc::new(KcpStreamLayer::bind(loopback_config()).await.unwrap());
    let client = KcpStreamLayer::bind(loopback_config()).await.unwrap();
    let target = server.addr().to_string();

    let _first = client.dial(&target, Duration::from_secs(5)).await.unwrap();
    client.close().await.unwrap();

    let second = client.dial(&target, Duration::from_secs(5)).await.unwrap();
    assert!(!second.is_closed());
    assert_eq!(client.dialed_count(), 1);

    client.shutdown().await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_unblocks_accept() {
    let layer = Arc::new(KcpStreamLayer::bind(loopback_config()).await.unwrap());

    let pending = tokio::spawn({
        let layer = layer.clone();
        async move { layer.accept().await.map(|conn| conn.remote_addr()) }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    layer.shutdown().await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("accept did not return after shutdown")
        .unwrap();
    assert!(matches!(result, Err(TransportError::ListenerClosed)));
}

#[tokio::test]
async fn test_wildcard_bind_needs_advertise() {
    let config = TransportBuilder::new()
        .bind_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .build();
    let result = KcpStreamLayer::bind(config).await;
    assert!(matches!(result, Err(TransportError::NotAdvertisable(_))));

    let advertise = SocketAddr::from((Ipv4Addr::new(10, 0, 0, 7), 7000));
    let config = TransportBuilder::new()
        .bind_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .advertise(advertise)
        .build();
    let layer = KcpStreamLayer::bind(config).await.unwrap();
    assert_eq!(layer.advertise_addr(), advertise);
    layer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pool_reuses_dialed_connection() {
    let server = KcpStreamLayer::bind(loopback_config()).await.unwrap();
    let client = Arc::new(KcpStreamLayer::bind(loopback_config()).await.unwrap());
    let pool = ConnPool::from_config(client.clone(), &loopback_config());
    let target = server.addr().to_string();

    let conn = pool.get(&target).await.unwrap();
    pool.put(&target, conn).await;
    assert_eq!(pool.idle_count(&target), 1);

    let _conn = pool.get(&target).await.unwrap();
    assert_eq!(pool.idle_count(&target), 0);
    assert_eq!(client.dialed_count(), 1);

    pool.close_all().await.unwrap();
    client.shutdown().await.unwrap();
    server.shutdown().await.unwrap();
}
