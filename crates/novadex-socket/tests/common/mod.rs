/*
[INPUT]:  Test configuration and scripted transport requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for novadex-socket tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

use novadex_socket::{
    SocketConfig, SocketError, SocketEvent, SocketManager, Stream, SubscribeOptions, Transport,
    TransportLink, WireFrame,
};

const WAIT: Duration = Duration::from_millis(250);
const QUIET: Duration = Duration::from_millis(100);

/// Scripted transport: fails the first `fail_first` connects, then hands
/// out in-memory links. Every successful connect surfaces a [`MockLink`]
/// on the side channel so tests can inspect frames and inject events.
pub struct MockTransport {
    fail_first: usize,
    connects: AtomicUsize,
    links_tx: mpsc::UnboundedSender<MockLink>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockLink>) {
        Self::failing(0)
    }

    pub fn failing(fail_first: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<MockLink>) {
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                fail_first,
                connects: AtomicUsize::new(0),
                links_tx,
            }),
            links_rx,
        )
    }

    #[allow(dead_code)]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &Url) -> novadex_socket::Result<TransportLink> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(SocketError::Connect("mock connect refused".into()));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let id = format!("mock-{attempt}");

        let _ = self.links_tx.send(MockLink {
            id: id.clone(),
            frames: outbound_rx,
            events_tx: Some(inbound_tx),
        });

        Ok(TransportLink {
            id,
            tx: outbound_tx,
            rx: inbound_rx,
        })
    }
}

/// Test-side view of one mock connection.
pub struct MockLink {
    #[allow(dead_code)]
    pub id: String,
    pub frames: mpsc::UnboundedReceiver<WireFrame>,
    events_tx: Option<mpsc::Sender<SocketEvent>>,
}

impl MockLink {
    /// Push an inbound event to the manager.
    #[allow(dead_code)]
    pub async fn inject(&self, event: SocketEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Kill the connection from the server side.
    #[allow(dead_code)]
    pub fn disconnect(&mut self) {
        self.events_tx = None;
    }

    pub async fn next_frame(&mut self) -> WireFrame {
        timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("link closed while waiting for frame")
    }

    #[allow(dead_code)]
    pub async fn expect_no_frame(&mut self) {
        match timeout(QUIET, self.frames.recv()).await {
            Err(_) => {}
            Ok(None) => {}
            Ok(Some(frame)) => panic!("unexpected frame: {frame:?}"),
        }
    }
}

pub async fn next_link(links: &mut mpsc::UnboundedReceiver<MockLink>) -> MockLink {
    timeout(WAIT, links.recv())
        .await
        .expect("timed out waiting for connect")
        .expect("transport dropped")
}

#[allow(dead_code)]
pub async fn expect_no_link(links: &mut mpsc::UnboundedReceiver<MockLink>) {
    match timeout(QUIET, links.recv()).await {
        Err(_) => {}
        Ok(None) => {}
        Ok(Some(link)) => panic!("unexpected connect: {}", link.id),
    }
}

/// Manager wired to a fresh mock transport.
pub fn mock_manager() -> (SocketManager, mpsc::UnboundedReceiver<MockLink>, Arc<MockTransport>) {
    mock_manager_with(SocketConfig::new(test_url()))
}

#[allow(dead_code)]
pub fn mock_manager_with(
    config: SocketConfig,
) -> (SocketManager, mpsc::UnboundedReceiver<MockLink>, Arc<MockTransport>) {
    let (transport, links) = MockTransport::new();
    let manager = SocketManager::with_transport(config, transport.clone());
    (manager, links, transport)
}

pub fn test_url() -> Url {
    Url::parse("wss://sock.novadex.test/ws").expect("static url")
}

pub fn descriptor(symbol: &str, streams: Vec<Stream>) -> SubscribeOptions {
    SubscribeOptions::for_pair(symbol, streams, 1, "TESTADDR")
}

/// Await a value a dispatch is expected to produce shortly.
#[allow(dead_code)]
pub async fn recv_soon<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for value")
        .expect("channel closed")
}

/// Assert nothing further arrives on a channel.
#[allow(dead_code)]
pub async fn expect_quiet<T>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(Some(_)) = timeout(QUIET, rx.recv()).await {
        panic!("unexpected value on channel");
    }
}

/// Stream names carried by a subscribe/unsubscribe frame.
pub fn frame_streams(frame: &WireFrame) -> Vec<String> {
    frame
        .data
        .get("streams")
        .and_then(|value| value.as_array())
        .map(|streams| {
            streams
                .iter()
                .filter_map(|stream| stream.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
