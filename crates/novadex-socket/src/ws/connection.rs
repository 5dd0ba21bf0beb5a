/*
[INPUT]:  Transport links, reconnect policy, shutdown signal
[OUTPUT]: Connection state transitions + inbound events pumped into fan-out
[POS]:    WebSocket layer - connection lifecycle and reconnect recovery
[UPDATE]: When changing reconnection policy, replay, or shutdown semantics
*/

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::error::SocketError;
use super::manager::{SharedState, invoke_reconnect};
use super::transport::{Transport, TransportLink};

const DEFAULT_RECONNECT_ATTEMPTS: u32 = 9999;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Hook fired with the connection id when an established link drops.
pub type DisconnectHook = Arc<dyn Fn(&str) + Send + Sync>;
/// Hook fired on every failed connect attempt.
pub type ConnectErrorHook = Arc<dyn Fn(&SocketError) + Send + Sync>;

/// Connection lifecycle, published on a `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Connected,
    /// An established link dropped and the worker is cycling back to connect.
    Reconnecting,
}

/// Retry behavior for the connect loop: bounded attempts, fixed delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct ConnectionHooks {
    pub on_disconnect: Option<DisconnectHook>,
    pub on_connect_error: Option<ConnectErrorHook>,
}

impl ConnectionHooks {
    fn notify_disconnect(&self, conn_id: &str) {
        if let Some(hook) = &self.on_disconnect {
            hook(conn_id);
        }
    }

    fn notify_connect_error(&self, err: &SocketError) {
        if let Some(hook) = &self.on_connect_error {
            hook(err);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkExit {
    Disconnected,
    Shutdown,
}

/// One worker owns the one transport connection for a manager's lifetime.
///
/// Being the only task that ever observes a reconnect, it is also the only
/// replay source; repeated reconnect cycles cannot stack duplicate replays.
pub(crate) struct ConnectionWorker {
    url: Url,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    hooks: ConnectionHooks,
    shared: Arc<SharedState>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl ConnectionWorker {
    pub(crate) fn new(
        url: Url,
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
        hooks: ConnectionHooks,
        shared: Arc<SharedState>,
        state_tx: watch::Sender<ConnectionState>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            url,
            transport,
            policy,
            hooks,
            shared,
            state_tx,
            shutdown,
        }
    }

    pub(crate) async fn run(self) {
        let mut attempts: u32 = 0;
        let mut connected_before = false;

        'run: loop {
            if self.shutdown.is_cancelled() {
                break 'run;
            }

            let _ = self.state_tx.send(if connected_before {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            });

            let link = tokio::select! {
                _ = self.shutdown.cancelled() => break 'run,
                result = self.transport.connect(&self.url) => match result {
                    Ok(link) => link,
                    Err(err) => {
                        self.hooks.notify_connect_error(&err);
                        attempts = attempts.saturating_add(1);

                        if !self.policy.enabled || attempts >= self.policy.max_attempts {
                            warn!(attempts, max_attempts = self.policy.max_attempts, error = %err, "socket gave up reconnecting");
                            let _ = self.state_tx.send(ConnectionState::Unconnected);
                            break 'run;
                        }

                        debug!(attempts, delay = ?self.policy.delay, error = %err, "socket connect failed; retrying");
                        tokio::select! {
                            _ = self.shutdown.cancelled() => break 'run,
                            _ = tokio::time::sleep(self.policy.delay) => {}
                        }
                        continue 'run;
                    }
                }
            };

            attempts = 0;
            let TransportLink { id, tx, mut rx } = link;
            info!(conn_id = %id, reconnect = connected_before, "socket connected");
            let _ = self.state_tx.send(ConnectionState::Connected);

            // Replay observers fire outside the state lock.
            let observers = self.shared.on_link_up(&tx, connected_before);
            for observer in &observers {
                invoke_reconnect(observer);
            }
            connected_before = true;

            let exit = loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break LinkExit::Shutdown,
                    event = rx.recv() => match event {
                        Some(event) => self.shared.dispatch(event),
                        None => break LinkExit::Disconnected,
                    }
                }
            };

            self.shared.clear_link();

            match exit {
                LinkExit::Shutdown => break 'run,
                LinkExit::Disconnected => {
                    warn!(conn_id = %id, "socket disconnected");
                    self.hooks.notify_disconnect(&id);

                    if !self.policy.enabled {
                        let _ = self.state_tx.send(ConnectionState::Unconnected);
                        break 'run;
                    }
                }
            }
        }

        debug!("connection worker exited");
    }
}
