/*
[INPUT]:  Subscription descriptors, consumer callbacks, raw emits
[OUTPUT]: Deduplicated wire frames + fan-out of every inbound event
[POS]:    WebSocket layer - subscription registry, reference ledger, fan-out
[UPDATE]: When changing subscribe/unsubscribe semantics or the public surface
*/

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::types::{CurrentPairUpdate, OrderFilterUpdate, Stream, SubscribeOptions};

use super::connection::{
    ConnectErrorHook, ConnectionHooks, ConnectionState, ConnectionWorker, DisconnectHook,
    ReconnectPolicy,
};
use super::error::{Result, SocketError};
use super::frame::{EVENT_CURRENT_PAIR, EVENT_ORDER_FILTER, SocketEvent, WireFrame};
use super::transport::{Transport, WsTransport};

/// Consumer sink for inbound events; bound 1:1 to a handler id.
pub type EventCallback = Arc<dyn Fn(&SocketEvent) + Send + Sync>;
/// Observer fired after a reconnect replay completes.
pub type ReconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Opaque capability returned by `subscribe`, required to unsubscribe.
///
/// Strictly increasing per manager; never reused, never clock-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Token identifying an `on` / `on_reconnect` registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Socket manager configuration.
#[derive(Clone)]
pub struct SocketConfig {
    pub url: Url,
    pub reconnect: ReconnectPolicy,
    pub on_disconnect: Option<DisconnectHook>,
    pub on_connect_error: Option<ConnectErrorHook>,
}

impl SocketConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect: ReconnectPolicy::default(),
            on_disconnect: None,
            on_connect_error: None,
        }
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn on_disconnect(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(hook));
        self
    }

    pub fn on_connect_error(mut self, hook: impl Fn(&SocketError) + Send + Sync + 'static) -> Self {
        self.on_connect_error = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for SocketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConfig")
            .field("url", &self.url.as_str())
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

/// Registry + ledger + fan-out, guarded as one unit so subscribe,
/// unsubscribe and dispatch each observe a consistent snapshot.
#[derive(Default)]
struct MuxState {
    /// Handler id -> descriptor; iterated in id order for reconnect replay.
    registry: BTreeMap<HandlerId, SubscribeOptions>,
    /// Stream -> live subscriber count; drives incremental wire framing.
    ledger: HashMap<Stream, u32>,
    /// Fan-out set in registration order.
    callbacks: Vec<(HandlerId, EventCallback)>,
    /// Event-name-routed listeners, outside the fan-out set.
    listeners: HashMap<String, Vec<(ListenerId, EventCallback)>>,
    reconnect_observers: Vec<(ListenerId, ReconnectCallback)>,
    /// Frames armed to fire on the next connect.
    pending: Vec<WireFrame>,
    link_tx: Option<mpsc::UnboundedSender<WireFrame>>,
    next_handler_id: u64,
    next_listener_id: u64,
}

impl MuxState {
    fn alloc_handler_id(&mut self) -> HandlerId {
        let id = HandlerId(self.next_handler_id);
        self.next_handler_id += 1;
        id
    }

    fn alloc_listener_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        id
    }

    /// Send on the live link, or arm the frame for the next connect.
    fn send_or_arm(&mut self, frame: WireFrame) {
        if self.try_send(&frame) {
            debug!(event = %frame.event, "frame sent");
            return;
        }
        debug!(event = %frame.event, "link down; frame armed for next connect");
        self.pending.push(frame);
    }

    /// Send on the live link; dropped with a log when no link is up.
    fn send_if_linked(&mut self, frame: WireFrame) {
        if self.try_send(&frame) {
            debug!(event = %frame.event, "frame sent");
        } else {
            debug!(event = %frame.event, "link down; frame dropped");
        }
    }

    fn try_send(&mut self, frame: &WireFrame) -> bool {
        if let Some(tx) = self.link_tx.take() {
            if tx.send(frame.clone()).is_ok() {
                self.link_tx = Some(tx);
                return true;
            }
        }
        false
    }
}

/// State shared between the manager and its connection worker.
#[derive(Default)]
pub(crate) struct SharedState {
    state: Mutex<MuxState>,
}

impl SharedState {
    /// Install a fresh link: flush armed frames, and on reconnects replay
    /// every registry descriptor verbatim. Never touches the ledger.
    /// Returns the reconnect observers for the caller to fire.
    pub(crate) fn on_link_up(
        &self,
        link: &mpsc::UnboundedSender<WireFrame>,
        is_reconnect: bool,
    ) -> Vec<ReconnectCallback> {
        let mut state = self.state.lock();
        state.link_tx = Some(link.clone());

        let pending: Vec<WireFrame> = state.pending.drain(..).collect();
        for frame in pending {
            debug!(event = %frame.event, "flushing armed frame");
            if link.send(frame).is_err() {
                return Vec::new();
            }
        }

        if !is_reconnect {
            return Vec::new();
        }

        for (handler_id, options) in &state.registry {
            match WireFrame::subscribe(options) {
                Ok(frame) => {
                    info!(handler = %handler_id, symbol = %options.symbol, "replaying subscription after reconnect");
                    if link.send(frame).is_err() {
                        return Vec::new();
                    }
                }
                Err(err) => {
                    warn!(handler = %handler_id, error = %err, "failed to encode replay frame");
                }
            }
        }

        state
            .reconnect_observers
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }

    pub(crate) fn clear_link(&self) {
        self.state.lock().link_tx = None;
    }

    /// Deliver one inbound event to every fan-out callback in registration
    /// order, then to listeners registered for its event name.
    ///
    /// Callbacks run on a snapshot taken outside the lock, so a callback may
    /// subscribe or unsubscribe without deadlocking.
    pub(crate) fn dispatch(&self, event: SocketEvent) {
        let (callbacks, listeners) = {
            let state = self.state.lock();
            let callbacks: Vec<EventCallback> = state
                .callbacks
                .iter()
                .map(|(_, callback)| callback.clone())
                .collect();
            let listeners: Vec<EventCallback> = state
                .listeners
                .get(&event.event)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|(_, callback)| callback.clone())
                        .collect()
                })
                .unwrap_or_default();
            (callbacks, listeners)
        };

        for callback in callbacks.iter().chain(listeners.iter()) {
            invoke_callback(callback, &event);
        }
    }
}

/// Isolate one callback invocation; a panicking consumer must not block
/// delivery to the others.
pub(crate) fn invoke_callback(callback: &EventCallback, event: &SocketEvent) {
    if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
        error!(event = %event.event, "subscriber callback panicked during dispatch");
    }
}

pub(crate) fn invoke_reconnect(observer: &ReconnectCallback) {
    if catch_unwind(AssertUnwindSafe(|| observer())).is_err() {
        error!("reconnect observer panicked");
    }
}

struct ConnectionHandle {
    shutdown: CancellationToken,
    worker: tokio::task::JoinHandle<()>,
}

/// One logical real-time connection multiplexing any number of independent
/// subscriptions over it.
///
/// Each subscription pairs a descriptor with a callback and yields an opaque
/// [`HandlerId`]. Streams are reference-counted across subscriptions: a wire
/// `subscribe` goes out only when a stream gains its first subscriber, a
/// wire `unsubscribe` only when the last one leaves. Every inbound event is
/// fanned out to every registered callback; the wire protocol does not tag
/// events per stream, so routing is left to consumers. When the last handler
/// unsubscribes the connection is torn down.
pub struct SocketManager {
    url: Url,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    hooks: ConnectionHooks,
    shared: Arc<SharedState>,
    conn: Mutex<Option<ConnectionHandle>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SocketManager {
    /// Create a manager speaking to the real WebSocket endpoint.
    ///
    /// The connection is lazy: nothing connects until the first subscribe
    /// (or an explicit `ensure_connected`).
    pub fn new(config: SocketConfig) -> Self {
        Self::with_transport(config, Arc::new(WsTransport))
    }

    /// Create a manager over a custom transport.
    pub fn with_transport(config: SocketConfig, transport: Arc<dyn Transport>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Unconnected);
        Self {
            url: config.url,
            transport,
            policy: config.reconnect,
            hooks: ConnectionHooks {
                on_disconnect: config.on_disconnect,
                on_connect_error: config.on_connect_error,
            },
            shared: Arc::new(SharedState::default()),
            conn: Mutex::new(None),
            state_tx,
            state_rx,
        }
    }

    /// Register a subscription and join the fan-out set.
    ///
    /// Increments the reference count of every requested stream; streams
    /// gaining their first subscriber go out in one combined `subscribe`
    /// frame. When the link is not up yet the frame is armed to fire on the
    /// next connect, so it is not silently lost.
    ///
    /// Returns an opaque handler id; the only error is an empty stream list.
    pub fn subscribe<F>(&self, options: SubscribeOptions, callback: F) -> Result<HandlerId>
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        if options.streams.is_empty() {
            return Err(SocketError::EmptyStreams);
        }

        self.ensure_connected();

        let mut state = self.shared.state.lock();
        let handler_id = state.alloc_handler_id();

        let mut fresh = Vec::new();
        for stream in &options.streams {
            let count = state.ledger.entry(*stream).or_insert(0);
            *count += 1;
            if *count == 1 {
                fresh.push(*stream);
            }
            debug!(%stream, count = *count, "stream refcount increased");
        }

        if !fresh.is_empty() {
            match WireFrame::subscribe(&options.restricted_to(&fresh)) {
                Ok(frame) => state.send_or_arm(frame),
                Err(err) => warn!(handler = %handler_id, error = %err, "failed to encode subscribe frame"),
            }
        }

        state.callbacks.push((handler_id, Arc::new(callback)));
        state.registry.insert(handler_id, options);
        info!(handler = %handler_id, subscriptions = state.registry.len(), "subscribed");

        Ok(handler_id)
    }

    /// Drop a subscription.
    ///
    /// Unknown or stale ids are a silent no-op, so callers may race teardown
    /// against in-flight work; calling twice equals calling once. Streams
    /// whose count reaches zero go out in one `unsubscribe` frame carrying
    /// the descriptor's original options. Removing the last handler tears
    /// the connection down.
    pub fn unsubscribe(&self, handler_id: HandlerId) {
        let registry_empty = {
            let mut state = self.shared.state.lock();
            state.callbacks.retain(|(id, _)| *id != handler_id);

            let Some(options) = state.registry.remove(&handler_id) else {
                debug!(handler = %handler_id, "unsubscribe for unknown handler; ignoring");
                return;
            };

            let mut dropped = Vec::new();
            for stream in &options.streams {
                match state.ledger.get_mut(stream) {
                    Some(count) if *count > 1 => {
                        *count -= 1;
                        debug!(%stream, count = *count, "stream refcount decreased");
                    }
                    Some(count) if *count == 1 => {
                        *count = 0;
                        dropped.push(*stream);
                        debug!(%stream, "stream refcount reached zero");
                    }
                    _ => {
                        debug!(%stream, "stream refcount missing; skipping");
                    }
                }
            }

            if !dropped.is_empty() {
                match WireFrame::unsubscribe(&options.restricted_to(&dropped)) {
                    Ok(frame) => state.send_if_linked(frame),
                    Err(err) => warn!(handler = %handler_id, error = %err, "failed to encode unsubscribe frame"),
                }
            }

            info!(handler = %handler_id, subscriptions = state.registry.len(), "unsubscribed");
            state.registry.is_empty()
        };

        if registry_empty {
            info!("no subscriptions remain; tearing down connection");
            self.teardown();
        }
    }

    /// Start the connection worker if none is running. Idempotent.
    ///
    /// Requires a Tokio runtime; outside one the call is skipped with a
    /// warning and the next subscribe inside a runtime will start it.
    pub fn ensure_connected(&self) {
        let mut conn = self.conn.lock();
        if let Some(handle) = conn.as_ref()
            && !handle.worker.is_finished()
        {
            return;
        }

        if tokio::runtime::Handle::try_current().is_err() {
            warn!("SocketManager used outside a Tokio runtime; connection not started");
            return;
        }

        let shutdown = CancellationToken::new();
        let worker = ConnectionWorker::new(
            self.url.clone(),
            self.transport.clone(),
            self.policy.clone(),
            self.hooks.clone(),
            self.shared.clone(),
            self.state_tx.clone(),
            shutdown.clone(),
        );
        let handle = tokio::spawn(worker.run());
        *conn = Some(ConnectionHandle {
            shutdown,
            worker: handle,
        });
    }

    /// Close the connection and clear all subscription state.
    ///
    /// Safe to call repeatedly. Reopening goes through `ensure_connected`
    /// (implicitly, on the next subscribe).
    pub fn teardown(&self) {
        if let Some(handle) = self.conn.lock().take() {
            handle.shutdown.cancel();
        }

        let mut state = self.shared.state.lock();
        state.link_tx = None;
        state.registry.clear();
        state.ledger.clear();
        state.callbacks.clear();
        state.listeners.clear();
        state.reconnect_observers.clear();
        state.pending.clear();
        drop(state);

        let _ = self.state_tx.send(ConnectionState::Unconnected);
        info!("socket torn down; subscription state cleared");
    }

    pub fn is_connected(&self) -> bool {
        *self.state_rx.borrow() == ConnectionState::Connected
    }

    /// Watch the connection lifecycle.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Raw passthrough emit; dropped with a log when no link is up.
    pub fn emit(&self, event: impl Into<String>, payload: serde_json::Value) {
        let frame = WireFrame::new(event, payload);
        self.shared.state.lock().send_if_linked(frame);
    }

    /// Announce the pair the consumer is looking at.
    pub fn emit_current_pair(&self, update: &CurrentPairUpdate) -> Result<()> {
        self.emit(EVENT_CURRENT_PAIR, serde_json::to_value(update)?);
        Ok(())
    }

    /// Change the server-side order filter.
    pub fn emit_order_filter(&self, update: &OrderFilterUpdate) -> Result<()> {
        self.emit(EVENT_ORDER_FILTER, serde_json::to_value(update)?);
        Ok(())
    }

    /// Listen for a specific inbound event name, outside the fan-out set.
    pub fn on<F>(&self, event: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        let mut state = self.shared.state.lock();
        let id = state.alloc_listener_id();
        state
            .listeners
            .entry(event.into())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove one listener for an event, or all of them when `listener` is
    /// `None`.
    pub fn off(&self, event: &str, listener: Option<ListenerId>) {
        let mut state = self.shared.state.lock();
        match listener {
            Some(id) => {
                let now_empty = match state.listeners.get_mut(event) {
                    Some(entries) => {
                        entries.retain(|(entry_id, _)| *entry_id != id);
                        entries.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    state.listeners.remove(event);
                }
            }
            None => {
                state.listeners.remove(event);
            }
        }
    }

    /// Observe reconnects without joining the subscribe path.
    ///
    /// Observers are additive; they never replace or perturb the replay of
    /// live subscriptions.
    pub fn on_reconnect<F>(&self, observer: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut state = self.shared.state.lock();
        let id = state.alloc_listener_id();
        state.reconnect_observers.push((id, Arc::new(observer)));
        id
    }

    /// Remove one reconnect observer, or all of them when `listener` is
    /// `None`.
    pub fn off_reconnect(&self, listener: Option<ListenerId>) {
        let mut state = self.shared.state.lock();
        match listener {
            Some(id) => state
                .reconnect_observers
                .retain(|(entry_id, _)| *entry_id != id),
            None => state.reconnect_observers.clear(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    /// Current reference count for a stream.
    pub fn stream_refcount(&self, stream: Stream) -> u32 {
        self.shared
            .state
            .lock()
            .ledger
            .get(&stream)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        if let Some(handle) = self.conn.lock().take() {
            handle.shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for SocketManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketManager")
            .field("url", &self.url.as_str())
            .field("subscriptions", &self.subscription_count())
            .field("state", &*self.state_rx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_id_display() {
        assert_eq!(HandlerId(7).to_string(), "handler-7");
        assert_eq!(ListenerId(3).to_string(), "listener-3");
    }

    #[test]
    fn test_handler_ids_strictly_increase() {
        let mut state = MuxState::default();
        let first = state.alloc_handler_id();
        let second = state.alloc_handler_id();
        assert!(second > first);
    }
}
