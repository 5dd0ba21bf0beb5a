/*
[INPUT]:  Subscription descriptors and raw event payloads
[OUTPUT]: Outbound wire frames and inbound tagged events
[POS]:    WebSocket layer - wire envelope encoding
[UPDATE]: When the frame envelope or fixed event names change
*/

use serde::{Deserialize, Serialize};

use crate::types::SubscribeOptions;

use super::error::Result;

pub const EVENT_SUBSCRIBE: &str = "subscribe";
pub const EVENT_UNSUBSCRIBE: &str = "unsubscribe";
pub const EVENT_CURRENT_PAIR: &str = "currentPair";
pub const EVENT_ORDER_FILTER: &str = "orderFilter";

/// Outbound frame: a named event plus its JSON payload.
///
/// Serialized as one `{"event": ..., "data": ...}` text message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    pub data: serde_json::Value,
}

impl WireFrame {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Build a `subscribe` frame from a descriptor.
    pub fn subscribe(options: &SubscribeOptions) -> Result<Self> {
        Ok(Self::new(EVENT_SUBSCRIBE, serde_json::to_value(options)?))
    }

    /// Build an `unsubscribe` frame, shaped like subscribe but restricted
    /// to the streams being dropped.
    pub fn unsubscribe(options: &SubscribeOptions) -> Result<Self> {
        Ok(Self::new(EVENT_UNSUBSCRIBE, serde_json::to_value(options)?))
    }
}

/// Inbound event: the raw event name paired with an opaque payload.
///
/// The wire multiplexes many logical streams over one event channel without
/// per-event stream tags, so no routing happens at this layer; consumers
/// parse `data` themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SocketEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Stream, SubscribeOptions};

    #[test]
    fn test_subscribe_frame_shape() {
        let options = SubscribeOptions::for_pair("ALGO_USDC", vec![Stream::Price], 1, "addr");
        let frame = WireFrame::subscribe(&options).expect("encode");
        assert_eq!(frame.event, EVENT_SUBSCRIBE);
        assert_eq!(frame.data.get("symbol"), Some(&serde_json::json!("ALGO_USDC")));
        assert_eq!(
            frame.data.get("streams"),
            Some(&serde_json::json!(["price"]))
        );
    }

    #[test]
    fn test_event_payload_defaults_to_null() {
        let event: SocketEvent = serde_json::from_str(r#"{"event":"depth"}"#).expect("decode");
        assert_eq!(event.event, "depth");
        assert!(event.data.is_null());
    }
}
