//! Connection registry: one physical socket per URL, shared by every subscriber.
//!
//! Each entry is driven by a background tokio task that owns the socket and
//! the backoff timer and runs the reconnect state machine. The public API is
//! synchronous and talks to the task over an unbounded command channel.
//! Subscribers are held weakly; the registry never keeps one alive.
//!
//! Lock order is always `entries` map, then the entry's own mutex. Listener
//! callbacks run with no lock held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::WsError;
use crate::ws::backoff::{can_retry, reconnect_delay};
use crate::ws::transport::{Connector, Socket, SocketEvent, TungsteniteConnector};
use crate::ws::{ConnectionEvent, ConnectionState, RegistryConfig};

// ─── Listener ────────────────────────────────────────────────────────────────

/// Receives every lifecycle event and raw message of the URLs it is
/// registered against.
pub trait ConnectionListener: Send + Sync {
    fn on_event(&self, event: &ConnectionEvent);
}

impl<F> ConnectionListener for F
where
    F: Fn(&ConnectionEvent) + Send + Sync,
{
    fn on_event(&self, event: &ConnectionEvent) {
        self(event)
    }
}

// ─── Commands from public API to entry task ──────────────────────────────────

enum Command {
    Send(String),
    Reconnect,
    Shutdown,
}

// ─── Entry state ─────────────────────────────────────────────────────────────

struct EntryInner {
    state: ConnectionState,
    subscribers: Vec<Weak<dyn ConnectionListener>>,
    reconnect_attempts: u32,
    last_error: Option<WsError>,
}

impl EntryInner {
    fn prune(&mut self) {
        self.subscribers.retain(|weak| weak.strong_count() > 0);
    }

    fn contains(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        self.subscribers
            .iter()
            .any(|weak| std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(listener)))
    }
}

struct EntryShared {
    inner: Mutex<EntryInner>,
}

struct EntryHandle {
    shared: Arc<EntryShared>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

struct RegistryShared {
    config: RegistryConfig,
    connector: Arc<dyn Connector>,
    entries: Mutex<HashMap<String, EntryHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Public Registry ─────────────────────────────────────────────────────────

/// Shares one socket per URL among any number of listeners.
///
/// Cheap to clone; clones share the same entries. Must be used from within a
/// tokio runtime.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<RegistryShared>,
}

impl Registry {
    /// A registry that opens real sockets with [`TungsteniteConnector`].
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_connector(config, TungsteniteConnector)
    }

    pub fn with_connector(config: RegistryConfig, connector: impl Connector) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                config,
                connector: Arc::new(connector),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    /// Register `listener` against `url`, opening the socket if this is the
    /// first subscriber.
    ///
    /// A listener joining an entry that is already past `Idle` is told the
    /// current state (and `Open`, if open) right away. Calling this on a
    /// `Failed` entry resets its attempt counter and retries.
    pub fn connect(&self, url: &str, listener: &Arc<dyn ConnectionListener>) {
        let url = url.trim();
        if url.is_empty() {
            tracing::warn!("Ignoring connect() with an empty URL");
            return;
        }
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::error!("connect({}) called outside a tokio runtime", url);
                return;
            }
        };

        let mut entries = lock(&self.shared.entries);

        if let Some(entry) = entries.get(url).filter(|entry| !entry.cmd_tx.is_closed()) {
            let current = {
                let mut inner = lock(&entry.shared.inner);
                inner.prune();
                if !inner.contains(listener) {
                    inner.subscribers.push(Arc::downgrade(listener));
                }
                inner.state
            };
            if current == ConnectionState::Failed {
                tracing::info!("Manual reconnect requested for {}", url);
                let _ = entry.cmd_tx.send(Command::Reconnect);
            }
            drop(entries);

            if current != ConnectionState::Idle {
                listener.on_event(&ConnectionEvent::StateChanged(current));
            }
            if current == ConnectionState::Open {
                listener.on_event(&ConnectionEvent::Open);
            }
            return;
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(EntryShared {
            inner: Mutex::new(EntryInner {
                state: ConnectionState::Idle,
                subscribers: vec![Arc::downgrade(listener)],
                reconnect_attempts: 0,
                last_error: None,
            }),
        });
        entries.insert(
            url.to_string(),
            EntryHandle {
                shared: Arc::clone(&shared),
                cmd_tx,
            },
        );
        drop(entries);

        tracing::info!("Opening shared connection to {}", url);
        runtime.spawn(run_entry(EntryTask {
            url: url.to_string(),
            config: self.shared.config.clone(),
            connector: Arc::clone(&self.shared.connector),
            registry: Arc::downgrade(&self.shared),
            shared,
            cmd_rx,
        }));
    }

    /// Remove `listener` from `url`. The last one out closes the socket,
    /// cancels any pending reconnect and destroys the entry. Idempotent.
    pub fn disconnect(&self, url: &str, listener: &Arc<dyn ConnectionListener>) {
        let url = url.trim();
        let mut entries = lock(&self.shared.entries);
        let Some(entry) = entries.get(url) else {
            return;
        };

        let empty = {
            let mut inner = lock(&entry.shared.inner);
            inner.subscribers.retain(|weak| {
                weak.strong_count() > 0 && !std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(listener))
            });
            if inner.subscribers.is_empty() {
                inner.state = ConnectionState::Closed;
            }
            inner.subscribers.is_empty()
        };

        if empty {
            if let Some(entry) = entries.remove(url) {
                let _ = entry.cmd_tx.send(Command::Shutdown);
            }
            tracing::info!("Last subscriber left {}, closing", url);
        }
    }

    /// Serialize `message` and send it iff the entry for `url` is open.
    ///
    /// Returns whether the send was attempted. Nothing is queued.
    pub fn send<T: Serialize + ?Sized>(&self, url: &str, message: &T) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to serialize outbound message: {}", e);
                return false;
            }
        };

        let entries = lock(&self.shared.entries);
        let Some(entry) = entries.get(url.trim()) else {
            tracing::warn!("send() to {} without a connection", url);
            return false;
        };
        let state = lock(&entry.shared.inner).state;
        if state != ConnectionState::Open {
            tracing::warn!("send() to {} while {}", url, state);
            return false;
        }
        entry.cmd_tx.send(Command::Send(text)).is_ok()
    }

    pub fn state(&self, url: &str) -> Option<ConnectionState> {
        self.with_entry(url, |inner| inner.state)
    }

    pub fn last_error(&self, url: &str) -> Option<WsError> {
        self.with_entry(url, |inner| inner.last_error.clone()).flatten()
    }

    /// Live subscribers of `url`.
    pub fn subscriber_count(&self, url: &str) -> usize {
        self.with_entry(url, |inner| {
            inner
                .subscribers
                .iter()
                .filter(|weak| weak.strong_count() > 0)
                .count()
        })
        .unwrap_or(0)
    }

    pub fn entry_count(&self) -> usize {
        lock(&self.shared.entries).len()
    }

    fn with_entry<R>(&self, url: &str, f: impl FnOnce(&EntryInner) -> R) -> Option<R> {
        let entries = lock(&self.shared.entries);
        let entry = entries.get(url.trim())?;
        let inner = lock(&entry.shared.inner);
        Some(f(&inner))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.shared.config)
            .field("entries", &self.entry_count())
            .finish()
    }
}

// ─── Entry task ──────────────────────────────────────────────────────────────

struct EntryTask {
    url: String,
    config: RegistryConfig,
    connector: Arc<dyn Connector>,
    registry: Weak<RegistryShared>,
    shared: Arc<EntryShared>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

enum Attempt {
    Opened(Socket),
    Failed(WsError),
    Shutdown,
}

enum DisconnectReason {
    Shutdown,
    Lost { code: Option<u16>, reason: String },
}

impl EntryTask {
    /// Fan `event` out to every live subscriber. Returns how many got it.
    fn emit(&self, event: ConnectionEvent) -> usize {
        let listeners = {
            let mut inner = lock(&self.shared.inner);
            live_subscribers(&mut inner)
        };
        deliver(&listeners, &[event])
    }

    fn set_state(&self, state: ConnectionState) -> usize {
        self.transition(state, None)
    }

    /// Move to `state` and snapshot its recipients under one lock, then tell
    /// them, followed by `follow_up` if given.
    ///
    /// A listener that registers after the snapshot sees the new state in
    /// `connect()` and is replayed there instead, so nobody hears it twice.
    fn transition(&self, state: ConnectionState, follow_up: Option<ConnectionEvent>) -> usize {
        let listeners = {
            let mut inner = lock(&self.shared.inner);
            inner.state = state;
            live_subscribers(&mut inner)
        };
        let state_changed = ConnectionEvent::StateChanged(state);
        match follow_up {
            Some(event) => deliver(&listeners, &[state_changed, event]),
            None => deliver(&listeners, &[state_changed]),
        }
    }

    fn record_error(&self, error: WsError) {
        lock(&self.shared.inner).last_error = Some(error);
    }

    fn attempts(&self) -> u32 {
        lock(&self.shared.inner).reconnect_attempts
    }

    fn set_attempts(&self, attempts: u32) {
        lock(&self.shared.inner).reconnect_attempts = attempts;
    }

    /// Remove this entry from the registry if every subscriber has been
    /// dropped without disconnecting. Returns whether the task should stop.
    fn release_if_orphaned(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return true;
        };
        let mut entries = lock(&registry.entries);
        let orphaned = {
            let mut inner = lock(&self.shared.inner);
            inner.prune();
            inner.subscribers.is_empty()
        };
        if orphaned {
            let ours = entries
                .get(&self.url)
                .map(|entry| Arc::ptr_eq(&entry.shared, &self.shared))
                .unwrap_or(false);
            if ours {
                entries.remove(&self.url);
            }
            tracing::info!("All subscribers of {} dropped, closing", self.url);
        }
        orphaned
    }

    async fn open(&mut self) -> Attempt {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let attempt = tokio::time::timeout(timeout, self.connector.open(&self.url));
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => {
                    return match result {
                        Ok(Ok(socket)) => Attempt::Opened(socket),
                        Ok(Err(e)) => Attempt::Failed(e),
                        Err(_) => Attempt::Failed(WsError::Timeout),
                    };
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Send(_)) => tracing::warn!("Dropping send to {}: not open", self.url),
                    Some(Command::Reconnect) => {}
                    Some(Command::Shutdown) | None => return Attempt::Shutdown,
                }
            }
        }
    }

    /// The connected loop. Runs until the socket goes away or we are told to stop.
    async fn run_connected(&mut self, mut socket: Socket) -> DisconnectReason {
        loop {
            tokio::select! {
                event = socket.next_event() => match event {
                    Some(SocketEvent::Message(text)) => {
                        tracing::debug!("{} <- {}", self.url, text);
                        if self.emit(ConnectionEvent::Message(text)) == 0 && self.release_if_orphaned() {
                            socket.close();
                            return DisconnectReason::Shutdown;
                        }
                    }
                    Some(SocketEvent::Error(reason)) => {
                        let error = WsError::ConnectionFailed(reason);
                        self.record_error(error.clone());
                        self.emit(ConnectionEvent::Error(error));
                    }
                    Some(SocketEvent::Closed { code, reason }) => {
                        return DisconnectReason::Lost { code, reason };
                    }
                    None => {
                        return DisconnectReason::Lost {
                            code: None,
                            reason: "Transport ended".into(),
                        };
                    }
                },

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Send(text)) => {
                        if let Err(e) = socket.send(text) {
                            tracing::warn!("Send to {} failed: {}", self.url, e);
                        }
                    }
                    Some(Command::Reconnect) => {}
                    Some(Command::Shutdown) | None => {
                        socket.close();
                        return DisconnectReason::Shutdown;
                    }
                },
            }
        }
    }

    /// Wait out the next backoff delay, or park in `Failed` once retries are
    /// exhausted. Returns `false` when the task should exit.
    async fn retry(&mut self) -> bool {
        let attempts = self.attempts();

        if !can_retry(&self.config, attempts) {
            if self.config.auto_reconnect {
                let error = WsError::MaxReconnectAttempts { attempts };
                tracing::error!("{}: {}", self.url, error);
                self.record_error(error.clone());
                self.emit(ConnectionEvent::Error(error));
            }
            if self.set_state(ConnectionState::Failed) == 0 && self.release_if_orphaned() {
                return false;
            }
            return self.wait_for_manual_reconnect().await;
        }

        let delay = reconnect_delay(&self.config, attempts);
        let attempt = attempts + 1;
        self.set_attempts(attempt);

        if self.set_state(ConnectionState::Reconnecting) == 0 && self.release_if_orphaned() {
            return false;
        }
        self.emit(ConnectionEvent::Reconnecting {
            attempt,
            delay_ms: delay.as_millis() as u64,
        });
        tracing::info!(
            "Reconnect attempt {}/{} to {} in {}ms",
            attempt,
            self.config.max_reconnect_attempts,
            self.url,
            delay.as_millis()
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Send(_)) => tracing::warn!("Dropping send to {}: reconnecting", self.url),
                    Some(Command::Reconnect) => return true,
                    Some(Command::Shutdown) | None => return false,
                }
            }
        }
    }

    async fn wait_for_manual_reconnect(&mut self) -> bool {
        loop {
            match self.cmd_rx.recv().await {
                Some(Command::Reconnect) => {
                    self.set_attempts(0);
                    return true;
                }
                Some(Command::Send(_)) => tracing::warn!("Dropping send to {}: failed", self.url),
                Some(Command::Shutdown) | None => return false,
            }
        }
    }
}

fn live_subscribers(inner: &mut EntryInner) -> Vec<Arc<dyn ConnectionListener>> {
    inner.prune();
    inner.subscribers.iter().filter_map(Weak::upgrade).collect()
}

/// Run `events` through every listener in order, with no lock held.
fn deliver(listeners: &[Arc<dyn ConnectionListener>], events: &[ConnectionEvent]) -> usize {
    for listener in listeners {
        for event in events {
            listener.on_event(event);
        }
    }
    listeners.len()
}

async fn run_entry(mut task: EntryTask) {
    loop {
        // ── 1. Attempt connection ────────────────────────────────────────
        task.set_state(ConnectionState::Connecting);
        let socket = match task.open().await {
            Attempt::Opened(socket) => socket,
            Attempt::Failed(error) => {
                tracing::error!("Connection to {} failed: {}", task.url, error);
                task.record_error(error.clone());
                task.emit(ConnectionEvent::Error(error));
                if task.retry().await {
                    continue;
                }
                break;
            }
            Attempt::Shutdown => break,
        };

        // ── 2. Connected ─────────────────────────────────────────────────
        task.set_attempts(0);
        lock(&task.shared.inner).last_error = None;
        tracing::info!("Connected to {}", task.url);
        task.transition(ConnectionState::Open, Some(ConnectionEvent::Open));

        // ── 3. Connected loop ────────────────────────────────────────────
        match task.run_connected(socket).await {
            DisconnectReason::Shutdown => break,
            DisconnectReason::Lost { code, reason } => {
                tracing::warn!("Connection to {} lost: code={:?} reason={}", task.url, code, reason);
                task.record_error(WsError::Closed {
                    code,
                    reason: reason.clone(),
                });
                task.emit(ConnectionEvent::Closed { code, reason });
                if !task.retry().await {
                    break;
                }
            }
        }
    }

    lock(&task.shared.inner).state = ConnectionState::Closed;
    tracing::debug!("Entry task for {} exited", task.url);
}

// ─── Tests ───────────────────────────────────────────────────────────────────
