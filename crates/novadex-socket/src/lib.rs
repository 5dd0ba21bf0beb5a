/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public NovaDEX socket crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod types;
pub mod ws;

// Re-export commonly used types from types
pub use types::{CurrentPairUpdate, OrderFilterUpdate, Stream, StreamOptions, SubscribeOptions};

// Re-export commonly used types from ws
pub use ws::{
    ConnectionState,
    HandlerId,
    ListenerId,
    ReconnectPolicy,
    Result,
    SocketConfig,
    SocketError,
    SocketEvent,
    SocketManager,
    Transport,
    TransportLink,
    WireFrame,
    WsTransport,
};
