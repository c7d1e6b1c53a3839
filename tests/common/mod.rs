#![allow(dead_code)]

use async_trait::async_trait;
use mimir::core::{ConnectionEvent, ConnectionState, Connector, Store, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// In-memory stand-in for the remote store. Can be switched into a failing
/// mode to simulate a transport error on a live connection.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        })
    }

    /// Make every operation fail with a transport error until turned off.
    pub fn fail_operations(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TransportError::OperationFailed(
                "simulated transport error".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        self.check()?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8], _ttl: Duration) -> Result<(), TransportError> {
        self.check()?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TransportError> {
        self.check()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Succeed,
    Fail,
}

/// Connector that plays back a scripted sequence of connect outcomes, then
/// keeps returning `default`. Records the (tokio) time of every attempt so
/// tests can assert the backoff schedule under paused time.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<ConnectOutcome>>,
    default: ConnectOutcome,
    pub store: Arc<MemoryStore>,
    attempt_times: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedConnector {
    pub fn new(script: Vec<ConnectOutcome>, default: ConnectOutcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            default,
            store: MemoryStore::new(),
            attempt_times: Mutex::new(Vec::new()),
        })
    }

    pub fn always_succeeding() -> Arc<Self> {
        Self::new(Vec::new(), ConnectOutcome::Succeed)
    }

    pub fn always_failing() -> Arc<Self> {
        Self::new(Vec::new(), ConnectOutcome::Fail)
    }

    pub fn attempt_times(&self) -> Vec<tokio::time::Instant> {
        self.attempt_times.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempt_times.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Arc<dyn Store>, TransportError> {
        self.attempt_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default);

        match outcome {
            ConnectOutcome::Succeed => Ok(Arc::clone(&self.store) as Arc<dyn Store>),
            ConnectOutcome::Fail => Err(TransportError::ConnectionFailed(
                "scripted failure".to_string(),
            )),
        }
    }
}

/// Block until the manager reports a transition into `target`.
pub async fn wait_for_state(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    target: ConnectionState,
) {
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::StateChanged { to, .. }) if to == target => return,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                panic!("event channel closed before reaching {:?}", target)
            }
        }
    }
}
