/*
[INPUT]:  Socket configuration and subscription descriptors
[OUTPUT]: Multiplexed real-time event streams with reconnect recovery
[POS]:    WebSocket layer - connection multiplexing
[UPDATE]: When adding modules or changing the public socket surface
*/

pub mod connection;
pub mod error;
pub mod frame;
pub mod manager;
pub mod transport;

pub use connection::{ConnectErrorHook, ConnectionState, DisconnectHook, ReconnectPolicy};
pub use error::{Result, SocketError};
pub use frame::{
    EVENT_CURRENT_PAIR, EVENT_ORDER_FILTER, EVENT_SUBSCRIBE, EVENT_UNSUBSCRIBE, SocketEvent,
    WireFrame,
};
pub use manager::{
    EventCallback, HandlerId, ListenerId, ReconnectCallback, SocketConfig, SocketManager,
};
pub use transport::{Transport, TransportLink, WsTransport};
