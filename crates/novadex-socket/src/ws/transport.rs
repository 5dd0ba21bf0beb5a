/*
[INPUT]:  WebSocket URL and wire frames
[OUTPUT]: Live transport links carrying frames in and events out
[POS]:    WebSocket layer - transport seam and tungstenite implementation
[UPDATE]: When changing the wire protocol or connection handling
*/

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::error::{Result, SocketError};
use super::frame::{SocketEvent, WireFrame};

const INBOUND_BUFFER: usize = 256;

/// One live connection: frames pushed into `tx` go to the server, events
/// arriving from the server come out of `rx`. Dropping `tx` closes the
/// connection; `rx` yielding `None` means the connection died.
#[derive(Debug)]
pub struct TransportLink {
    pub id: String,
    pub tx: mpsc::UnboundedSender<WireFrame>,
    pub rx: mpsc::Receiver<SocketEvent>,
}

/// Connection factory seam.
///
/// The manager only ever talks to this trait, so tests swap in a scripted
/// transport and production uses [`WsTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<TransportLink>;
}

/// tokio-tungstenite transport speaking `{"event", "data"}` JSON text frames.
#[derive(Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &Url) -> Result<TransportLink> {
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|err| SocketError::Connect(err.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WireFrame>();
        let (inbound_tx, inbound_rx) = mpsc::channel::<SocketEvent>(INBOUND_BUFFER);
        let id = Uuid::new_v4().to_string();
        let conn_id = id.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(frame) => {
                                let text = match serde_json::to_string(&frame) {
                                    Ok(text) => text,
                                    Err(err) => {
                                        warn!(event = %frame.event, error = %err, "dropping unencodable frame");
                                        continue;
                                    }
                                };
                                if write.send(WsMessage::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break;
                            }
                        }
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(WsMessage::Close(_))) => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break;
                            }
                            Some(Ok(WsMessage::Ping(payload))) => {
                                if write.send(WsMessage::Pong(payload)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(WsMessage::Pong(_))) => {}
                            Some(Ok(message)) => {
                                if let Some(event) = parse_event(message)
                                    && inbound_tx.send(event).await.is_err()
                                {
                                    break;
                                }
                            }
                            Some(Err(err)) => {
                                debug!(conn_id = %conn_id, error = %err, "websocket read failed");
                                break;
                            }
                            None => {
                                break;
                            }
                        }
                    }
                }
            }

            debug!(conn_id = %conn_id, "websocket io task exited");
        });

        Ok(TransportLink {
            id,
            tx: outbound_tx,
            rx: inbound_rx,
        })
    }
}

fn parse_event(message: WsMessage) -> Option<SocketEvent> {
    let text: String = match message {
        WsMessage::Text(text) => text.to_string(),
        WsMessage::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok()?,
        _ => return None,
    };

    match serde_json::from_str::<SocketEvent>(&text) {
        Ok(event) => Some(event),
        Err(err) => {
            debug!(error = %err, bytes = text.len(), "inbound event parse failed");
            None
        }
    }
}
