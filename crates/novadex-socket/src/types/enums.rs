/*
[INPUT]:  Wire schema definitions and serde requirements
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - stream identifiers for socket subscriptions
[UPDATE]: When the platform adds or renames real-time feeds
*/

use serde::{Deserialize, Serialize};

/// Logical real-time feed identifier.
///
/// One wire connection multiplexes any combination of these; the socket
/// manager reference-counts them per subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Price,
    Depth,
    Trades,
    Candles,
    Orders,
    Positions,
    Balances,
}

impl Stream {
    /// Feeds that require credentials in the subscribe options.
    ///
    /// Explicit table; callers attach a token/trading key via
    /// `SubscribeOptions::with_credentials` before subscribing to these.
    pub fn is_private(self) -> bool {
        matches!(self, Stream::Orders | Stream::Positions | Stream::Balances)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stream::Price => "price",
            Stream::Depth => "depth",
            Stream::Trades => "trades",
            Stream::Candles => "candles",
            Stream::Orders => "orders",
            Stream::Positions => "positions",
            Stream::Balances => "balances",
        }
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_stream_table() {
        assert!(Stream::Orders.is_private());
        assert!(Stream::Positions.is_private());
        assert!(Stream::Balances.is_private());
        assert!(!Stream::Price.is_private());
        assert!(!Stream::Depth.is_private());
        assert!(!Stream::Trades.is_private());
        assert!(!Stream::Candles.is_private());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&Stream::Depth).expect("serialize");
        assert_eq!(json, "\"depth\"");
        let parsed: Stream = serde_json::from_str("\"orders\"").expect("deserialize");
        assert_eq!(parsed, Stream::Orders);
    }
}
