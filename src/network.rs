//! Endpoint URL constants and construction.

use crate::error::{WsError, WsResult};

/// Default WebSocket base address.
pub const DEFAULT_WS_BASE_URL: &str = "ws://127.0.0.1:8000";

/// Path prefix of the per-identity notification endpoint.
pub const NOTIFICATIONS_PATH: &str = "/ws/notifications";

/// Build the canonical notification URL for `identity`.
///
/// `base_url` must use the `ws` or `wss` scheme; a trailing slash is ignored.
/// The identity is percent-encoded, so two callers with the same identity
/// always produce byte-identical URLs.
pub fn endpoint_url(base_url: &str, identity: &str) -> WsResult<String> {
    let base = base_url.trim().trim_end_matches('/');
    if !(base.starts_with("ws://") || base.starts_with("wss://")) {
        return Err(WsError::InvalidUrl(format!(
            "expected ws:// or wss:// base, got '{}'",
            base_url
        )));
    }
    if base.ends_with("://") {
        return Err(WsError::InvalidUrl(format!("missing host in '{}'", base_url)));
    }

    let identity = identity.trim();
    if identity.is_empty() {
        return Err(WsError::MissingIdentity);
    }

    Ok(format!(
        "{}{}/{}/",
        base,
        NOTIFICATIONS_PATH,
        urlencoding::encode(identity)
    ))
}
