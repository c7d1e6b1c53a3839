use crate::config::CacheConfig;
use crate::core::backoff::{Backoff, BackoffPolicy};
use crate::core::store::{Connector, Store, TransportError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Connection lifecycle states. Owned exclusively by the manager; callers
/// only ever observe it through `state()` and the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    PermanentlyFailed,
    Closed,
}

/// Retry bookkeeping: reset on every successful connection, incremented on
/// every failed connect attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryCounter {
    pub attempts: u32,
    pub last_delay: Duration,
}

/// Fire-and-forget notifications for the logging collaborator. Sends never
/// block the state machine; slow or absent subscribers simply miss events.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    AttemptFailed {
        attempt: u32,
        retry_in: Option<Duration>,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ManagerError {
    #[error("Not connected to the remote store")]
    NotConnected,
    #[error("Connection permanently failed after exhausting retry budget")]
    PermanentlyFailed,
    #[error("Connection manager is closed")]
    Closed,
    #[error("Connection manager already shut down")]
    AlreadyClosed,
}

struct Inner {
    state: ConnectionState,
    handle: Option<Arc<dyn Store>>,
    retries: RetryCounter,
    /// Bumped by `shutdown()` and transport-error recovery so that late
    /// completions of stale connect attempts cannot resurrect the connection.
    epoch: u64,
}

/// Single source of truth for the remote-store connection. Drives the connect
/// / reconnect loop in a background task; state transitions are linearized
/// behind one lock and reconnect attempts are strictly sequential.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: BackoffPolicy,
    connect_timeout: Duration,
    inner: Mutex<Inner>,
    events: broadcast::Sender<ConnectionEvent>,
    /// Latched shutdown signal. A `watch` rather than a one-shot wakeup so a
    /// drive task that has not yet parked on its backoff timer still sees it.
    closed: watch::Sender<bool>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, policy: BackoffPolicy, connect_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        let (closed, _) = watch::channel(false);
        Self {
            connector,
            policy,
            connect_timeout,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                handle: None,
                retries: RetryCounter::default(),
                epoch: 0,
            }),
            events,
            closed,
        }
    }

    pub fn from_config(connector: Arc<dyn Connector>, config: &CacheConfig) -> Self {
        Self::new(
            connector,
            BackoffPolicy::from_config(config),
            Duration::from_millis(config.connect_timeout_ms),
        )
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("connection state lock poisoned")
    }

    /// Subscribe to connection events. Receivers that fall behind are lagged,
    /// never backpressure the manager.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner().state
    }

    pub fn retries(&self) -> RetryCounter {
        self.inner().retries
    }

    /// Returns the live handle only while `Connected`; otherwise fails
    /// immediately. Never blocks waiting for a reconnect, and callers must
    /// not cache the handle across calls.
    pub fn acquire(&self) -> Result<Arc<dyn Store>, ManagerError> {
        let inner = self.inner();
        match inner.state {
            ConnectionState::Connected => inner.handle.clone().ok_or(ManagerError::NotConnected),
            ConnectionState::PermanentlyFailed => Err(ManagerError::PermanentlyFailed),
            ConnectionState::Closed => Err(ManagerError::Closed),
            _ => Err(ManagerError::NotConnected),
        }
    }

    /// Begin connecting. Idempotent: only the first call from `Disconnected`
    /// spawns the connect loop; later calls while a loop is live are no-ops.
    /// A manager parked in `PermanentlyFailed` can be explicitly restarted.
    pub fn start(self: &Arc<Self>) {
        let epoch = {
            let mut inner = self.inner();
            match inner.state {
                ConnectionState::Disconnected | ConnectionState::PermanentlyFailed => {
                    inner.retries = RetryCounter::default();
                    self.transition(&mut inner, ConnectionState::Connecting);
                    inner.epoch
                }
                _ => return,
            }
        };

        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.drive(epoch, None).await });
    }

    /// Release the handle, cancel any pending reconnect timer and in-flight
    /// connect attempt, and park in `Closed`. Terminal: a second call fails
    /// with `AlreadyClosed`.
    pub fn shutdown(&self) -> Result<(), ManagerError> {
        {
            let mut inner = self.inner();
            if inner.state == ConnectionState::Closed {
                return Err(ManagerError::AlreadyClosed);
            }
            inner.epoch += 1;
            inner.handle = None;
            self.transition(&mut inner, ConnectionState::Closed);
        }
        let _ = self.closed.send(true);
        Ok(())
    }

    /// A caller hit a transport error on the live handle: drop it and start
    /// reconnecting. Stale reports (anything but `Connected`) are ignored so
    /// concurrent failures trigger exactly one recovery.
    pub fn report_transport_error(self: &Arc<Self>) {
        let (epoch, delay) = {
            let mut inner = self.inner();
            if inner.state != ConnectionState::Connected {
                return;
            }
            inner.handle = None;
            inner.epoch += 1;

            // The counter tracks failed connect attempts; the pause before the
            // first reconnect uses the delay that attempt would get.
            match self.policy.next_delay(inner.retries.attempts.saturating_add(1)) {
                Backoff::Delay(delay) => {
                    inner.retries.last_delay = delay;
                    warn!("transport error on live connection; reconnecting in {:?}", delay);
                    self.transition(&mut inner, ConnectionState::Reconnecting);
                    (inner.epoch, delay)
                }
                Backoff::PermanentFailure => {
                    warn!("transport error on live connection; retry budget exhausted");
                    self.transition(&mut inner, ConnectionState::PermanentlyFailed);
                    return;
                }
            }
        };

        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.drive(epoch, Some(delay)).await });
    }

    /// The connect loop: optional backoff wait, then one attempt, repeated
    /// until success, permanent failure, or shutdown. Exactly one drive task
    /// runs per epoch, so attempts are sequential by construction.
    async fn drive(self: Arc<Self>, epoch: u64, mut wait: Option<Duration>) {
        let mut closed = self.closed.subscribe();
        loop {
            if let Some(delay) = wait.take() {
                // A shutdown may already have latched before this task was
                // first polled; check before committing to the timer.
                if *closed.borrow() {
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = closed.changed() => return,
                }
                let mut inner = self.inner();
                if inner.epoch != epoch || inner.state != ConnectionState::Reconnecting {
                    return;
                }
                self.transition(&mut inner, ConnectionState::Connecting);
            }

            let result = match tokio::time::timeout(self.connect_timeout, self.connector.connect())
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout(self.connect_timeout)),
            };

            let mut inner = self.inner();
            if inner.epoch != epoch || inner.state != ConnectionState::Connecting {
                // Shutdown raced the attempt; drop any late handle instead of
                // resurrecting the connection.
                return;
            }

            match result {
                Ok(handle) => {
                    let attempts = inner.retries.attempts;
                    inner.handle = Some(handle);
                    inner.retries = RetryCounter::default();
                    self.transition(&mut inner, ConnectionState::Connected);
                    info!("Connected to remote store ({} failed attempt(s) before success)", attempts);
                    return;
                }
                Err(e) => {
                    inner.retries.attempts += 1;
                    let attempt = inner.retries.attempts;
                    match self.policy.next_delay(attempt) {
                        Backoff::Delay(delay) => {
                            inner.retries.last_delay = delay;
                            warn!("connect attempt {} failed: {}; retrying in {:?}", attempt, e, delay);
                            let _ = self.events.send(ConnectionEvent::AttemptFailed {
                                attempt,
                                retry_in: Some(delay),
                            });
                            self.transition(&mut inner, ConnectionState::Reconnecting);
                            wait = Some(delay);
                        }
                        Backoff::PermanentFailure => {
                            warn!("connect attempt {} failed: {}; retry budget exhausted, giving up", attempt, e);
                            let _ = self.events.send(ConnectionEvent::AttemptFailed {
                                attempt,
                                retry_in: None,
                            });
                            self.transition(&mut inner, ConnectionState::PermanentlyFailed);
                            return;
                        }
                    }
                }
            }
            drop(inner);
        }
    }

    fn transition(&self, inner: &mut Inner, to: ConnectionState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        debug!("connection state: {:?} -> {:?}", from, to);
        let _ = self.events.send(ConnectionEvent::StateChanged { from, to });
    }
}
