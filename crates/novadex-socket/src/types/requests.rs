/*
[INPUT]:  Wire schema definitions and serde requirements
[OUTPUT]: Typed Rust request structs with serialization support
[POS]:    Data layer - subscription descriptors and typed emit payloads
[UPDATE]: When the subscribe payload shape or emit helpers change
*/

use serde::{Deserialize, Serialize};

use super::enums::Stream;

/// Per-subscription options bag carried on every subscribe frame.
///
/// Optional fields are omitted from the wire entirely when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(rename = "tradingKey")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trading_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(rename = "companyId")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

/// Subscription descriptor: a symbol, the feeds wanted for it, and the
/// options the server needs to serve them.
///
/// Stored verbatim per handler and replayed verbatim after a reconnect, so
/// per-consumer credentials survive even when stream names overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    pub symbol: String,
    pub streams: Vec<Stream>,
    pub options: StreamOptions,
}

impl SubscribeOptions {
    pub fn new(symbol: impl Into<String>, streams: Vec<Stream>, options: StreamOptions) -> Self {
        Self {
            symbol: symbol.into(),
            streams,
            options,
        }
    }

    /// Build a descriptor for a trading pair from the fields every
    /// subscription needs.
    pub fn for_pair(
        symbol: impl Into<String>,
        streams: Vec<Stream>,
        company_id: u32,
        address: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            streams,
            options: StreamOptions {
                address: address.into(),
                company_id: Some(company_id),
                ..StreamOptions::default()
            },
        }
    }

    /// Attach credentials for private streams.
    pub fn with_credentials(mut self, token: Option<String>, trading_key: Option<String>) -> Self {
        self.options.token = token;
        self.options.trading_key = trading_key;
        self
    }

    /// Whether any requested feed needs credentials.
    pub fn requires_auth(&self) -> bool {
        self.streams.iter().any(|stream| stream.is_private())
    }

    /// Copy of this descriptor restricted to a subset of its streams.
    pub(crate) fn restricted_to(&self, streams: &[Stream]) -> Self {
        Self {
            symbol: self.symbol.clone(),
            streams: streams.to_vec(),
            options: self.options.clone(),
        }
    }
}

/// Payload for the `currentPair` emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPairUpdate {
    pub address: String,
    pub pair: String,
    pub pair_id: u32,
    pub order_filter: String,
}

/// Payload for the `orderFilter` emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilterUpdate {
    pub order_filter: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_options_left_off_the_wire() {
        let options = SubscribeOptions::for_pair("ALGO_USDC", vec![Stream::Price], 1, "addr");
        let value = serde_json::to_value(&options).expect("serialize");
        let bag = value.get("options").expect("options");
        assert_eq!(bag.get("companyId"), Some(&serde_json::json!(1)));
        assert!(bag.get("token").is_none());
        assert!(bag.get("tradingKey").is_none());
        assert!(bag.get("depth").is_none());
    }

    #[test]
    fn test_with_credentials() {
        let options = SubscribeOptions::for_pair("ALGO_USDC", vec![Stream::Orders], 1, "addr")
            .with_credentials(Some("jwt".into()), None);
        assert!(options.requires_auth());
        assert_eq!(options.options.token.as_deref(), Some("jwt"));
        assert!(options.options.trading_key.is_none());
    }

    #[test]
    fn test_restricted_to_keeps_options() {
        let options = SubscribeOptions::for_pair(
            "ALGO_USDC",
            vec![Stream::Price, Stream::Depth],
            7,
            "addr",
        );
        let restricted = options.restricted_to(&[Stream::Depth]);
        assert_eq!(restricted.streams, vec![Stream::Depth]);
        assert_eq!(restricted.symbol, options.symbol);
        assert_eq!(restricted.options, options.options);
    }
}
