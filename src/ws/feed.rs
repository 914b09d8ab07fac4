//! Subscription facade, the per-consumer entry point.
//!
//! A [`NotificationFeed`] turns the current identity into the endpoint URL,
//! registers a listener with the shared [`Registry`] and routes normalized
//! records and lifecycle events to the caller's [`FeedCallbacks`]. Every
//! `open` returns a [`FeedHandle`]; closing or dropping it deregisters.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::runtime::Handle;

use crate::domain::counts::CountsUpdate;
use crate::error::{WsError, WsResult};
use crate::network::{endpoint_url, DEFAULT_WS_BASE_URL};
use crate::ws::normalize::{normalize_text, NormalizedFrame};
use crate::ws::registry::{ConnectionListener, Registry};
use crate::ws::{ActivityUpdate, ConnectionEvent, ConnectionState, TransactionUpdate};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// `ws://` or `wss://` base address, without the notifications path.
    pub base_url: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WS_BASE_URL.to_string(),
        }
    }
}

/// Caller-supplied callbacks. All optional.
#[derive(Default)]
pub struct FeedCallbacks {
    on_queue_update: Option<Callback<ActivityUpdate>>,
    on_transaction_update: Option<Callback<TransactionUpdate>>,
    on_counts_update: Option<Callback<CountsUpdate>>,
    on_connect: Option<Box<dyn Fn() + Send + Sync>>,
    on_disconnect: Option<Box<dyn Fn(Option<u16>, &str) + Send + Sync>>,
    on_error: Option<Callback<WsError>>,
    on_raw_message: Option<Box<dyn Fn(&str) + Send + Sync>>,
    on_state_change: Option<Box<dyn Fn(ConnectionState) + Send + Sync>>,
}

impl FeedCallbacks {
    /// A game activity entered or changed in the processing queue.
    pub fn on_queue_update(mut self, f: impl Fn(&ActivityUpdate) + Send + Sync + 'static) -> Self {
        self.on_queue_update = Some(Box::new(f));
        self
    }

    /// A purchase or cashout arrived or changed.
    pub fn on_transaction_update(
        mut self,
        f: impl Fn(&TransactionUpdate) + Send + Sync + 'static,
    ) -> Self {
        self.on_transaction_update = Some(Box::new(f));
        self
    }

    pub fn on_counts_update(mut self, f: impl Fn(&CountsUpdate) + Send + Sync + 'static) -> Self {
        self.on_counts_update = Some(Box::new(f));
        self
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Box::new(f));
        self
    }

    /// The socket closed; receives the close code (if any) and reason.
    pub fn on_disconnect(mut self, f: impl Fn(Option<u16>, &str) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Box::new(f));
        self
    }

    /// Transport errors, server `error` frames and undecodable messages.
    pub fn on_error(mut self, f: impl Fn(&WsError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Every raw text frame, before normalization.
    pub fn on_raw_message(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_raw_message = Some(Box::new(f));
        self
    }

    pub fn on_state_change(mut self, f: impl Fn(ConnectionState) + Send + Sync + 'static) -> Self {
        self.on_state_change = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for FeedCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedCallbacks")
            .field("on_queue_update", &self.on_queue_update.is_some())
            .field("on_transaction_update", &self.on_transaction_update.is_some())
            .field("on_counts_update", &self.on_counts_update.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_raw_message", &self.on_raw_message.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

// ─── Listener ────────────────────────────────────────────────────────────────

struct FeedListener {
    callbacks: FeedCallbacks,
}

impl FeedListener {
    fn error(&self, error: &WsError) {
        if let Some(f) = &self.callbacks.on_error {
            f(error);
        }
    }

    fn message(&self, text: &str) {
        if let Some(f) = &self.callbacks.on_raw_message {
            f(text);
        }

        let frame = match normalize_text(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Undecodable frame: {} (raw: {})", e, text);
                self.error(&e);
                return;
            }
        };

        match frame {
            NormalizedFrame::Snapshot(batch) | NormalizedFrame::Notification(batch) => {
                if let Some(f) = &self.callbacks.on_transaction_update {
                    batch.transactions.iter().for_each(|update| f(update));
                }
                if let Some(f) = &self.callbacks.on_queue_update {
                    batch.activities.iter().for_each(|update| f(update));
                }
                if let (Some(f), Some(counts)) = (&self.callbacks.on_counts_update, &batch.counts) {
                    f(counts);
                }
            }
            NormalizedFrame::ServerError(error) => self.error(&error),
            NormalizedFrame::Connection { .. } | NormalizedFrame::Unrecognized(_) => {}
        }
    }
}

impl ConnectionListener for FeedListener {
    fn on_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged(state) => {
                if let Some(f) = &self.callbacks.on_state_change {
                    f(*state);
                }
            }
            ConnectionEvent::Open => {
                if let Some(f) = &self.callbacks.on_connect {
                    f();
                }
            }
            ConnectionEvent::Message(text) => self.message(text),
            ConnectionEvent::Closed { code, reason } => {
                if let Some(f) = &self.callbacks.on_disconnect {
                    f(*code, reason);
                }
            }
            ConnectionEvent::Reconnecting { attempt, delay_ms } => {
                tracing::debug!("Feed reconnecting (attempt {}) in {}ms", attempt, delay_ms);
            }
            ConnectionEvent::Error(error) => self.error(error),
        }
    }
}

// ─── Feed ────────────────────────────────────────────────────────────────────

/// Opens per-consumer subscriptions on a shared [`Registry`].
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    registry: Registry,
    config: FeedConfig,
}

impl NotificationFeed {
    pub fn new(registry: Registry, config: FeedConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Subscribe `callbacks` to the notification stream of `identity`.
    ///
    /// Nothing is registered when the identity is missing or the base URL is
    /// invalid. Identity changes are handled by closing the handle and
    /// opening a new one.
    pub fn open(&self, identity: Option<&str>, callbacks: FeedCallbacks) -> WsResult<FeedHandle> {
        let url = endpoint_url(&self.config.base_url, identity.unwrap_or_default()).inspect_err(|e| {
            tracing::warn!("Not opening notification feed: {}", e);
        })?;

        if Handle::try_current().is_err() {
            tracing::error!("Notification feed opened outside a tokio runtime");
            return Err(WsError::NoRuntime);
        }

        let listener: Arc<dyn ConnectionListener> = Arc::new(FeedListener { callbacks });
        self.registry.connect(&url, &listener);
        tracing::info!("Notification feed subscribed to {}", url);

        Ok(FeedHandle {
            registry: self.registry.clone(),
            url,
            listener: Mutex::new(Some(listener)),
        })
    }
}

/// A live subscription. Closes itself on drop.
pub struct FeedHandle {
    registry: Registry,
    url: String,
    listener: Mutex<Option<Arc<dyn ConnectionListener>>>,
}

impl FeedHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `message` iff the shared connection is open.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        if self.is_closed() {
            tracing::warn!("send() on a closed feed handle");
            return false;
        }
        self.registry.send(&self.url, message)
    }

    /// Deregister from the registry. Safe to call repeatedly.
    pub fn close(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            self.registry.disconnect(&self.url, &listener);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// State of the shared connection; `None` once the entry is gone.
    pub fn state(&self) -> Option<ConnectionState> {
        self.registry.state(&self.url)
    }

    pub fn last_error(&self) -> Option<WsError> {
        self.registry.last_error(&self.url)
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedHandle")
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish()
    }
}
