//! # Processing Notifications
//!
//! Real-time processing notification client for the operator console: a live
//! feed of pending purchases, cashouts and game activities shared across many
//! independent consumers.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! 1. **Core**: Canonical domain records and the pure message normalizer (always available)
//! 2. **Transport**: One physical `tokio-tungstenite` socket per URL (`ws-native`)
//! 3. **Registry**: Connection sharing, fan-out and the reconnect state machine (`ws-native`)
//! 4. **Feed**: `NotificationFeed`, the per-consumer subscription facade (`ws-native`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use processing_notifications::prelude::*;
//!
//! let registry = Registry::new(RegistryConfig::default());
//! let feed = NotificationFeed::new(registry, FeedConfig::default());
//!
//! let handle = feed.open(
//!     Some("operator@example.com"),
//!     FeedCallbacks::default()
//!         .on_transaction_update(|update| println!("{:?}", update.transaction))
//!         .on_counts_update(|update| println!("{:?}", update.counts)),
//! )?;
//!
//! // ... later, on logout
//! handle.close();
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes and serde helpers.
pub mod shared;

/// Canonical domain records: transactions, activity queue entries, counts.
pub mod domain;

/// Unified error types.
pub mod error;

/// Endpoint URL constants and construction.
pub mod network;

// ── Layers 2-4: WebSocket ────────────────────────────────────────────────────

/// WebSocket layer: frames, normalizer, transport, registry, feed.
pub mod ws;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::Amount;

    // Domain types
    pub use crate::domain::activity::ActivityQueueEntry;
    pub use crate::domain::counts::{Counts, CountsUpdate};
    pub use crate::domain::transaction::{
        JournalEntry, Transaction, TransactionKind, TransactionStatus,
    };

    // Errors
    pub use crate::error::{WsError, WsResult};

    // Network
    pub use crate::network::{endpoint_url, DEFAULT_WS_BASE_URL};

    // Normalizer
    pub use crate::ws::normalize::{normalize, normalize_text, NormalizedFrame, RecordBatch};
    pub use crate::ws::{
        ActivityUpdate, ConnectionEvent, ConnectionState, RegistryConfig, TransactionUpdate,
    };

    // Native client
    #[cfg(feature = "ws-native")]
    pub use crate::ws::feed::{FeedCallbacks, FeedConfig, FeedHandle, NotificationFeed};
    #[cfg(feature = "ws-native")]
    pub use crate::ws::registry::{ConnectionListener, Registry};
    #[cfg(feature = "ws-native")]
    pub use crate::ws::transport::{Connector, TungsteniteConnector};
}
