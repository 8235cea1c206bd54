//! Direct-mode channels over real sockets

use netchan_core::{ChannelName, ChannelState};
use netchan_transport::{
    BincodeCodec, ChannelListener, JsonCodec, TlsSettings, TransportConfig, TransportError,
    bridge_receive_to_typed, bridge_typed_to_raw, open_direct_receive, open_direct_send,
    open_receive,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn name(s: &str) -> ChannelName {
    ChannelName::new(s).unwrap()
}

async fn listener(config: &TransportConfig) -> ChannelListener {
    ChannelListener::bind("127.0.0.1:0", config).await.unwrap()
}

/// Consumer dials a listening producer and reads everything
#[tokio::test]
async fn test_direct_receive_preserves_order() {
    init_logging();
    let config = TransportConfig::plain();
    let listener = listener(&config).await;
    let endpoint = listener.local_endpoint().unwrap();

    let producer = tokio::spawn(async move {
        let incoming = listener.accept().await.unwrap();
        let mut send = incoming.into_send_handle(8).await.unwrap();
        for i in 0..500u32 {
            send.send(i.to_be_bytes().to_vec()).await.unwrap();
        }
        send.close().await.unwrap()
    });

    let mut recv = open_direct_receive(&name("numbers"), &endpoint, 16, &config)
        .await
        .unwrap();
    assert_eq!(recv.state(), ChannelState::Buffered);

    let msgs = recv.collect().await.unwrap();
    let numbers: Vec<u32> = msgs
        .iter()
        .map(|m| u32::from_be_bytes(m.as_slice().try_into().unwrap()))
        .collect();
    assert_eq!(numbers, (0..500).collect::<Vec<_>>());
    assert_eq!(producer.await.unwrap(), 500);
    assert_eq!(recv.status().count(), 500);
    assert!(recv.status().is_closed());
}

/// Producer dials a listening consumer: the a, b, c scenario
#[tokio::test]
async fn test_direct_send_close_propagates() {
    init_logging();
    let config = TransportConfig::plain();
    let listener = listener(&config).await;
    let endpoint = listener.local_endpoint().unwrap();

    let consumer = tokio::spawn(async move {
        let incoming = listener.accept().await.unwrap();
        let mut recv = incoming.into_receive_handle(0).await.unwrap();
        let mut got = Vec::new();
        while let Some(msg) = recv.recv().await.unwrap() {
            got.push(String::from_utf8(msg).unwrap());
        }
        // End of stream is sticky
        assert_eq!(recv.recv().await.unwrap(), None);
        got
    });

    let mut send = open_direct_send(&name("letters"), &endpoint, &config)
        .await
        .unwrap();
    assert_eq!(send.state(), ChannelState::Buffered);
    for m in ["a", "b", "c"] {
        send.send(m.as_bytes().to_vec()).await.unwrap();
    }
    assert_eq!(send.close().await.unwrap(), 3);
    assert_eq!(send.state(), ChannelState::Closed);

    assert_eq!(consumer.await.unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_empty_channel_closes_cleanly() {
    let config = TransportConfig::plain();
    let listener = listener(&config).await;
    let endpoint = listener.local_endpoint().unwrap();

    let consumer = tokio::spawn(async move {
        let incoming = listener.accept().await.unwrap();
        let mut recv = incoming.into_receive_handle(0).await.unwrap();
        recv.collect().await.unwrap()
    });

    let mut send = open_direct_send(&name("empty"), &endpoint, &config)
        .await
        .unwrap();
    assert_eq!(send.close().await.unwrap(), 0);
    assert!(consumer.await.unwrap().is_empty());
}

/// A consumer that stops reading eventually stalls the producer
#[tokio::test]
async fn test_backpressure_blocks_producer() {
    let config = TransportConfig {
        send_buffer: 0,
        ..TransportConfig::plain()
    };
    let listener = listener(&config).await;
    let endpoint = listener.local_endpoint().unwrap();

    let (accepted_tx, accepted_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let incoming = listener.accept().await.unwrap();
        let recv = incoming.into_receive_handle(0).await.unwrap();
        // Hold the handle without reading
        let _ = accepted_tx.send(recv);
    });

    let send = open_direct_send(&name("slow"), &endpoint, &config)
        .await
        .unwrap();
    let _recv = accepted_rx.await.unwrap();

    // Large messages fill the socket buffers quickly
    let chunk = vec![0u8; 256 * 1024];
    let mut sent = 0;
    let stalled = loop {
        match tokio::time::timeout(Duration::from_millis(500), send.send(chunk.clone())).await {
            Ok(result) => {
                result.unwrap();
                sent += 1;
                assert!(sent < 1024, "producer never blocked");
            }
            Err(_) => break true,
        }
    };
    assert!(stalled);
}

#[tokio::test]
async fn test_rejected_open_reports_reason() {
    let config = TransportConfig::plain();
    let listener = listener(&config).await;
    let endpoint = listener.local_endpoint().unwrap();

    tokio::spawn(async move {
        let incoming = listener.accept().await.unwrap();
        incoming.reject("no such channel").await.unwrap();
    });

    let result = open_direct_receive(&name("ghost"), &endpoint, 0, &config).await;
    match result {
        Err(TransportError::Rejected { name: n, reason }) => {
            assert_eq!(n.as_str(), "ghost");
            assert_eq!(reason, "no such channel");
        }
        Err(other) => panic!("expected rejection, got {}", other),
        Ok(_) => panic!("expected rejection, got an open channel"),
    }
}

#[tokio::test]
async fn test_unreachable_leader_is_connection_error() {
    // Bind then drop to get a port nobody listens on
    let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let leader = netchan_core::Endpoint::from(socket.local_addr().unwrap());
    drop(socket);

    let result = open_receive(&name("C"), &leader, 0, &TransportConfig::plain()).await;
    match result {
        Err(TransportError::Connection(_)) => {}
        Err(other) => panic!("expected a connection error, got {}", other),
        Ok(_) => panic!("expected a connection error, got an open channel"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Pair {
    key: String,
    value: i64,
}

/// Typed values over TCP, both bridge directions
#[tokio::test]
async fn test_bridge_over_tcp() {
    init_logging();
    let config = TransportConfig::plain();
    let listener = listener(&config).await;
    let endpoint = listener.local_endpoint().unwrap();

    let values: Vec<Pair> = (0..50)
        .map(|i| Pair {
            key: format!("k{}", i),
            value: i * 10,
        })
        .collect();

    let consumer = tokio::spawn(async move {
        let incoming = listener.accept().await.unwrap();
        let recv = incoming.into_receive_handle(4).await.unwrap();
        let (mut output, relay) = bridge_receive_to_typed(recv, JsonCodec::<Pair>::new(), 4);
        let mut got = Vec::new();
        while let Some(v) = output.recv().await {
            got.push(v);
        }
        assert_eq!(relay.join().await.unwrap(), got.len() as u64);
        got
    });

    let send = open_direct_send(&name("pairs"), &endpoint, &config)
        .await
        .unwrap();
    let (tx, input) = mpsc::channel(4);
    let relay = bridge_typed_to_raw(input, send, JsonCodec::<Pair>::new());
    let status = relay.status();
    for v in values.clone() {
        tx.send(v).await.unwrap();
    }
    drop(tx);

    assert_eq!(relay.join().await.unwrap(), 50);
    assert!(status.is_closed());
    assert_eq!(status.count(), 50);
    assert_eq!(consumer.await.unwrap(), values);
}

/// Decoding with the wrong type surfaces as an error, not a crash
#[tokio::test]
async fn test_bridge_decode_mismatch() {
    let config = TransportConfig::plain();
    let listener = listener(&config).await;
    let endpoint = listener.local_endpoint().unwrap();

    let consumer = tokio::spawn(async move {
        let incoming = listener.accept().await.unwrap();
        let recv = incoming.into_receive_handle(4).await.unwrap();
        let (mut output, relay) = bridge_receive_to_typed(recv, JsonCodec::<u64>::new(), 4);
        while output.recv().await.is_some() {}
        relay.join().await
    });

    let mut send = open_direct_send(&name("mixed"), &endpoint, &config)
        .await
        .unwrap();
    send.send(b"1".to_vec()).await.unwrap();
    send.send(b"\"two\"".to_vec()).await.unwrap();
    // The consumer stops reading, so the close may or may not be acknowledged
    let _ = send.close().await;

    match consumer.await.unwrap() {
        Err(netchan_transport::BridgeError::Decode { delivered, .. }) => assert_eq!(delivered, 1),
        other => panic!("expected decode error, got {:?}", other),
    }
}

/// A bincode value of another type is rejected rather than read as a prefix
#[tokio::test]
async fn test_bincode_decode_mismatch() {
    let config = TransportConfig::plain();
    let listener = listener(&config).await;
    let endpoint = listener.local_endpoint().unwrap();

    let consumer = tokio::spawn(async move {
        let incoming = listener.accept().await.unwrap();
        let recv = incoming.into_receive_handle(4).await.unwrap();
        let (mut output, relay) = bridge_receive_to_typed(recv, BincodeCodec::<u64>::new(), 4);
        let mut got = Vec::new();
        while let Some(v) = output.recv().await {
            got.push(v);
        }
        (got, relay.join().await)
    });

    let send = open_direct_send(&name("mistyped"), &endpoint, &config)
        .await
        .unwrap();
    let (tx, input) = mpsc::channel(1);
    let writer = bridge_typed_to_raw(input, send, BincodeCodec::<(u64, String)>::new());
    tx.send((7, "seven".to_string())).await.unwrap();
    drop(tx);
    let _ = writer.join().await;

    let (got, result) = consumer.await.unwrap();
    assert!(got.is_empty());
    match result {
        Err(netchan_transport::BridgeError::Decode { delivered, .. }) => assert_eq!(delivered, 0),
        other => panic!("expected decode error, got {:?}", other),
    }
}

fn write_cert(dir: &TempDir, prefix: &str) -> (PathBuf, PathBuf) {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_path = dir.path().join(format!("{}-cert.pem", prefix));
    let key_path = dir.path().join(format!("{}-key.pem", prefix));
    std::fs::write(&cert_path, cert.serialize_pem().unwrap()).unwrap();
    std::fs::write(&key_path, cert.serialize_private_key_pem()).unwrap();
    (cert_path, key_path)
}

#[tokio::test]
async fn test_tls_channel() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (cert, key) = write_cert(&dir, "server");

    let server_config = TransportConfig::with_tls(TlsSettings::server(&cert, &key));
    let client_config =
        TransportConfig::with_tls(TlsSettings::client(&cert).with_server_name("localhost"));

    let listener = listener(&server_config).await;
    let endpoint = listener.local_endpoint().unwrap();

    let consumer = tokio::spawn(async move {
        let incoming = listener.accept().await.unwrap();
        incoming.into_receive_handle(0).await.unwrap().collect().await.unwrap()
    });

    let mut send = open_direct_send(&name("secure"), &endpoint, &client_config)
        .await
        .unwrap();
    send.send(b"secret".to_vec()).await.unwrap();
    send.close().await.unwrap();

    assert_eq!(consumer.await.unwrap(), vec![b"secret".to_vec()]);
}

#[tokio::test]
async fn test_tls_untrusted_server_fails_open() {
    let dir = TempDir::new().unwrap();
    let (cert, key) = write_cert(&dir, "server");
    let (other_ca, _) = write_cert(&dir, "other");

    let server_config = TransportConfig::with_tls(TlsSettings::server(&cert, &key));
    let client_config =
        TransportConfig::with_tls(TlsSettings::client(&other_ca).with_server_name("localhost"));

    let listener = listener(&server_config).await;
    let endpoint = listener.local_endpoint().unwrap();
    let server = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

    let result = open_direct_send(&name("secure"), &endpoint, &client_config).await;
    assert!(matches!(result, Err(TransportError::Tls(_))));
    assert!(server.await.unwrap().is_err());
}

/// Server and client each present a certificate the other side trusts
fn mutual_tls_configs(dir: &TempDir, client_has_cert: bool) -> (TransportConfig, TransportConfig) {
    let (server_cert, server_key) = write_cert(dir, "server");
    let (client_cert, client_key) = write_cert(dir, "client");

    let server = TlsSettings {
        ca: Some(client_cert.clone()),
        ..TlsSettings::server(&server_cert, &server_key)
    };
    let mut client = TlsSettings::client(&server_cert).with_server_name("localhost");
    if client_has_cert {
        client.cert = Some(client_cert);
        client.key = Some(client_key);
    }
    let timeout = 2_000;
    (
        TransportConfig {
            connect_timeout_ms: timeout,
            ..TransportConfig::with_tls(server)
        },
        TransportConfig {
            connect_timeout_ms: timeout,
            ..TransportConfig::with_tls(client)
        },
    )
}

#[tokio::test]
async fn test_mutual_tls_channel() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let (server_config, client_config) = mutual_tls_configs(&dir, true);

    let listener = listener(&server_config).await;
    let endpoint = listener.local_endpoint().unwrap();
    let consumer = tokio::spawn(async move {
        let incoming = listener.accept().await.unwrap();
        incoming.into_receive_handle(0).await.unwrap().collect().await.unwrap()
    });

    let mut send = open_direct_send(&name("mutual"), &endpoint, &client_config)
        .await
        .unwrap();
    send.send(b"both sides known".to_vec()).await.unwrap();
    send.close().await.unwrap();

    assert_eq!(consumer.await.unwrap(), vec![b"both sides known".to_vec()]);
}

#[tokio::test]
async fn test_mutual_tls_requires_client_certificate() {
    let dir = TempDir::new().unwrap();
    let (server_config, client_config) = mutual_tls_configs(&dir, false);

    let listener = listener(&server_config).await;
    let endpoint = listener.local_endpoint().unwrap();
    let server = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

    let result = open_direct_send(&name("anonymous"), &endpoint, &client_config).await;
    match result {
        Err(TransportError::Tls(_)) => {}
        Err(other) => panic!("expected a TLS failure, got {}", other),
        Ok(_) => panic!("expected a TLS failure, got an open channel"),
    }
    assert!(matches!(server.await.unwrap(), Err(TransportError::Tls(_))));
}

#[tokio::test]
async fn test_plaintext_client_against_tls_server_fails() {
    let dir = TempDir::new().unwrap();
    let (cert, key) = write_cert(&dir, "server");

    let server_config = TransportConfig {
        connect_timeout_ms: 1_000,
        ..TransportConfig::with_tls(TlsSettings::server(&cert, &key))
    };
    let client_config = TransportConfig {
        connect_timeout_ms: 1_000,
        ..TransportConfig::plain()
    };

    let listener = listener(&server_config).await;
    let endpoint = listener.local_endpoint().unwrap();
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    assert!(
        open_direct_send(&name("plain"), &endpoint, &client_config)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_bincode_codec_over_tcp() {
    let config = TransportConfig::plain();
    let listener = listener(&config).await;
    let endpoint = listener.local_endpoint().unwrap();

    let consumer = tokio::spawn(async move {
        let recv = listener
            .accept()
            .await
            .unwrap()
            .into_receive_handle(0)
            .await
            .unwrap();
        let (mut output, relay) = bridge_receive_to_typed(recv, BincodeCodec::<Vec<f64>>::new(), 0);
        let first = output.recv().await;
        assert!(output.recv().await.is_none());
        relay.join().await.unwrap();
        first
    });

    let send = open_direct_send(&name("vectors"), &endpoint, &config)
        .await
        .unwrap();
    let (tx, input) = mpsc::channel(1);
    let relay = bridge_typed_to_raw(input, send, BincodeCodec::<Vec<f64>>::new());
    tx.send(vec![1.5, -2.0, 3.25]).await.unwrap();
    drop(tx);
    relay.join().await.unwrap();

    assert_eq!(consumer.await.unwrap(), Some(vec![1.5, -2.0, 3.25]));
}
