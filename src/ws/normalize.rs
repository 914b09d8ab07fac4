//! Inbound frame normalization.
//!
//! Turns one decoded JSON frame into canonical records. The function is pure:
//! the same frame always yields structurally equal output, and nothing about
//! the inbound value is mutated. Malformed or unrecognized frames are logged
//! and reported as [`NormalizedFrame::Unrecognized`]; normalization never panics.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::activity::ActivityQueueEntry;
use crate::domain::counts::{Counts, CountsUpdate};
use crate::domain::payload::{Payload, PayloadShape};
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::error::{WsError, WsResult};
use crate::ws::{
    ActivityUpdate, ConnectionPayload, ErrorPayload, InboundFrame, NotificationPayload,
    SnapshotPayload, TransactionUpdate,
};

/// Records extracted from one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub transactions: Vec<TransactionUpdate>,
    pub activities: Vec<ActivityUpdate>,
    pub counts: Option<CountsUpdate>,
}

impl RecordBatch {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.activities.is_empty() && self.counts.is_none()
    }
}

/// Result of normalizing one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedFrame {
    /// `all_activities`: every record flagged `is_initial_load`.
    Snapshot(RecordBatch),
    /// `send_notification`: one incremental change.
    Notification(RecordBatch),
    /// `connection` acknowledgement.
    Connection { message: Option<String> },
    /// `error` frame. The connection stays open.
    ServerError(WsError),
    /// Nothing usable; the reason has already been logged.
    Unrecognized(String),
}

impl NormalizedFrame {
    pub fn records(&self) -> Option<&RecordBatch> {
        match self {
            NormalizedFrame::Snapshot(batch) | NormalizedFrame::Notification(batch) => Some(batch),
            _ => None,
        }
    }
}

/// Normalize a raw text frame.
///
/// Invalid JSON is an error; everything past decoding is handled by [`normalize`].
pub fn normalize_text(text: &str) -> WsResult<NormalizedFrame> {
    let value: Value = serde_json::from_str(text)?;
    Ok(normalize(&value))
}

/// Normalize one decoded frame.
pub fn normalize(value: &Value) -> NormalizedFrame {
    let frame = match InboundFrame::deserialize(value) {
        Ok(frame) => frame,
        Err(e) => {
            let kind = value.get("type").and_then(Value::as_str).unwrap_or("<none>");
            tracing::warn!("Dropping unrecognized frame (type: {}): {}", kind, e);
            return NormalizedFrame::Unrecognized(format!("type {}: {}", kind, e));
        }
    };

    match frame {
        InboundFrame::AllActivities(payload) => NormalizedFrame::Snapshot(snapshot(&payload)),
        InboundFrame::SendNotification(payload) => notification(&payload),
        InboundFrame::Connection(payload) => connection(&payload),
        InboundFrame::Error(payload) => server_error(&payload),
    }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

fn snapshot(payload: &SnapshotPayload) -> RecordBatch {
    let purchases = array_of(payload.purchase_data.as_ref(), "purchase_data");
    let cashouts = array_of(payload.cashout_data.as_ref(), "cashout_data");
    let activities = array_of(payload.game_activities_data.as_ref(), "game_activities_data");

    let mut batch = RecordBatch::default();
    let sources = [
        (purchases, PayloadShape::Transaction(TransactionKind::Purchase)),
        (cashouts, PayloadShape::Transaction(TransactionKind::Cashout)),
        (activities, PayloadShape::Activity),
    ];
    for (items, shape) in sources {
        for item in items {
            match item.as_object() {
                Some(record) => push_record(Some(shape), Payload::from_object(record), true, &mut batch),
                None => tracing::warn!("Skipping non-object snapshot element: {}", item),
            }
        }
    }

    batch.counts = Some(match parse_counts(payload.counts.as_ref()) {
        Some(counts) => CountsUpdate {
            counts,
            authoritative: true,
            is_initial_load: true,
        },
        None => CountsUpdate {
            counts: Counts::new(
                purchases.len() as u64,
                cashouts.len() as u64,
                activities.len() as u64,
            ),
            authoritative: false,
            is_initial_load: true,
        },
    });

    tracing::debug!(
        "Snapshot: {} transaction(s), {} activit(ies)",
        batch.transactions.len(),
        batch.activities.len()
    );
    batch
}

fn array_of<'a>(value: Option<&'a Value>, field: &str) -> &'a [Value] {
    match value {
        Some(Value::Array(items)) => items.as_slice(),
        None | Some(Value::Null) => &[],
        Some(other) => {
            tracing::warn!("Snapshot field {} is not an array: {}", field, other);
            &[]
        }
    }
}

// ─── Notification ────────────────────────────────────────────────────────────

fn notification(payload: &NotificationPayload) -> NormalizedFrame {
    let mut batch = RecordBatch::default();

    if let Some(counts) = parse_counts(payload.counts.as_ref()) {
        batch.counts = Some(CountsUpdate {
            counts,
            authoritative: true,
            is_initial_load: false,
        });
    }

    let explicit = payload.activity_type().and_then(PayloadShape::from_category);
    notification_records(&payload.body, explicit, &mut batch);

    if batch.is_empty() {
        tracing::warn!("Dropping notification without a recognizable record");
        return NormalizedFrame::Unrecognized("notification without a recognizable record".into());
    }
    NormalizedFrame::Notification(batch)
}

/// Locate the record(s) of a notification body and convert them.
///
/// An explicit category decides the shape and its container; otherwise a
/// `purchase_data`/`cashout_data` container decides it; otherwise the
/// payload heuristics do.
fn notification_records(body: &Map<String, Value>, explicit: Option<PayloadShape>, batch: &mut RecordBatch) {
    let container = |key: &str| body.get(key).filter(|value| !value.is_null());

    let (shape, nested) = match explicit {
        Some(shape) => (Some(shape), container(container_key(shape)).or_else(|| container("data"))),
        None => {
            if let Some(found) = container("purchase_data") {
                (Some(PayloadShape::Transaction(TransactionKind::Purchase)), Some(found))
            } else if let Some(found) = container("cashout_data") {
                (Some(PayloadShape::Transaction(TransactionKind::Cashout)), Some(found))
            } else {
                (None, container("data"))
            }
        }
    };

    match nested {
        Some(Value::Array(items)) => {
            for item in items {
                match item.as_object() {
                    Some(record) => {
                        let payload = Payload::from_object(record);
                        push_record(shape.or_else(|| payload.classify()), payload, false, batch);
                    }
                    None => tracing::warn!("Skipping non-object notification element: {}", item),
                }
            }
        }
        Some(Value::Object(data)) => {
            let payload = Payload::with_data(body, Some(data));
            push_record(shape.or_else(|| payload.classify()), payload, false, batch);
        }
        _ => {
            let payload = Payload::with_data(body, None);
            let shape = shape.or_else(|| payload.classify());
            // A counts-only notification carries no record at all.
            if shape.is_some() || batch.counts.is_none() {
                push_record(shape, payload, false, batch);
            }
        }
    }
}

fn container_key(shape: PayloadShape) -> &'static str {
    match shape {
        PayloadShape::Transaction(TransactionKind::Purchase) => "purchase_data",
        PayloadShape::Transaction(TransactionKind::Cashout) => "cashout_data",
        PayloadShape::Activity => "game_activities_data",
    }
}

// ─── Control frames ──────────────────────────────────────────────────────────

fn connection(payload: &ConnectionPayload) -> NormalizedFrame {
    let message = payload.message();
    tracing::info!(
        "Server acknowledged connection: {}",
        message.as_deref().unwrap_or("<no message>")
    );
    NormalizedFrame::Connection { message }
}

fn server_error(payload: &ErrorPayload) -> NormalizedFrame {
    let error = WsError::Server {
        message: payload.message(),
        code: payload.code(),
    };
    tracing::warn!("{}", error);
    NormalizedFrame::ServerError(error)
}

// ─── Shared helpers ──────────────────────────────────────────────────────────

fn push_record(shape: Option<PayloadShape>, payload: Payload<'_>, is_initial_load: bool, batch: &mut RecordBatch) {
    match shape {
        Some(PayloadShape::Transaction(kind)) => match Transaction::try_from((kind, payload)) {
            Ok(transaction) => batch.transactions.push(TransactionUpdate {
                transaction,
                is_initial_load,
            }),
            Err(e) => tracing::warn!("Dropping {} record: {}", kind, e),
        },
        Some(PayloadShape::Activity) => match ActivityQueueEntry::try_from(payload) {
            Ok(entry) => batch.activities.push(ActivityUpdate {
                entry,
                is_initial_load,
            }),
            Err(e) => tracing::warn!("Dropping game activity record: {}", e),
        },
        None => tracing::warn!("Dropping record of unknown shape"),
    }
}

fn parse_counts(value: Option<&Value>) -> Option<Counts> {
    let value = value.filter(|value| !value.is_null())?;
    match Counts::deserialize(value) {
        Ok(counts) => Some(counts),
        Err(e) => {
            tracing::warn!("Ignoring malformed counts block {}: {}", value, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::{JournalEntry, TransactionStatus};
    use serde_json::json;

    fn batch(frame: NormalizedFrame) -> RecordBatch {
        match frame {
            NormalizedFrame::Snapshot(batch) | NormalizedFrame::Notification(batch) => batch,
            other => panic!("expected records, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_with_authoritative_counts() {
        let frame = json!({
            "type": "all_activities",
            "purchase_data": [{"id": 1, "amount": "10.00", "status": "pending"}],
            "counts": {"purchase_count": 1, "cashout_count": 0, "game_activities_count": 0}
        });
        let out = normalize(&frame);
        assert!(matches!(out, NormalizedFrame::Snapshot(_)));
        let batch = batch(out);

        assert_eq!(batch.transactions.len(), 1);
        assert!(batch.activities.is_empty());
        let update = &batch.transactions[0];
        assert!(update.is_initial_load);
        assert_eq!(update.transaction.id, "1");
        assert_eq!(update.transaction.amount.as_str(), "10.00");
        assert_eq!(update.transaction.kind, TransactionKind::Purchase);
        assert_eq!(update.transaction.journal_entry, JournalEntry::Credit);
        assert_eq!(update.transaction.status, TransactionStatus::Pending);

        let counts = batch.counts.unwrap();
        assert_eq!(counts.counts, Counts::new(1, 0, 0));
        assert!(counts.authoritative);
        assert!(counts.is_initial_load);
    }

    #[test]
    fn test_snapshot_derives_counts_from_lengths() {
        let frame = json!({
            "type": "all_activities",
            "purchase_data": [{"id": "p1", "amount": 1}, {"id": "p2", "amount": 2}],
            "cashout_data": [{"id": "c1", "amount": 3}],
            "game_activities_data": [{"id": "g1", "operation_type": "recharge"}]
        });
        let batch = batch(normalize(&frame));
        assert_eq!(batch.transactions.len(), 3);
        assert_eq!(batch.activities.len(), 1);
        assert!(batch.activities[0].is_initial_load);
        assert_eq!(batch.transactions[2].transaction.kind, TransactionKind::Cashout);

        let counts = batch.counts.unwrap();
        assert_eq!(counts.counts, Counts::new(2, 1, 1));
        assert!(!counts.authoritative);
    }

    #[test]
    fn test_snapshot_skips_bad_elements() {
        let frame = json!({
            "type": "all_activities",
            "purchase_data": [{"id": "p1", "amount": 1}, "garbage", {"amount": 2}],
            "cashout_data": {"not": "an array"}
        });
        let batch = batch(normalize(&frame));
        assert_eq!(batch.transactions.len(), 1);
        assert_eq!(batch.transactions[0].transaction.id, "p1");
    }

    #[test]
    fn test_cashout_notification_with_frame_payment_details() {
        let frame = json!({
            "type": "send_notification",
            "activity_type": "cashout",
            "data": {"id": "7", "amount": 5},
            "payment_details": {"iban": "X"}
        });
        let batch = batch(normalize(&frame));
        assert_eq!(batch.transactions.len(), 1);
        assert!(batch.counts.is_none());

        let update = &batch.transactions[0];
        assert!(!update.is_initial_load);
        assert_eq!(update.transaction.id, "7");
        assert_eq!(update.transaction.amount.as_str(), "5");
        assert_eq!(update.transaction.kind, TransactionKind::Cashout);
        assert_eq!(update.transaction.journal_entry, JournalEntry::Debit);
        let details = update.transaction.payment_details.as_ref().unwrap();
        assert_eq!(details.get("iban"), Some(&json!("X")));
    }

    #[test]
    fn test_explicit_kind_tag_identifies_transaction() {
        let frame = json!({
            "type": "send_notification",
            "kind": "cashout",
            "data": {"id": "7", "amount": 5}
        });
        let batch = batch(normalize(&frame));
        assert_eq!(batch.transactions.len(), 1);
        let tx = &batch.transactions[0].transaction;
        assert_eq!(tx.id, "7");
        assert_eq!(tx.kind, TransactionKind::Cashout);
        assert_eq!(tx.journal_entry, JournalEntry::Debit);
    }

    #[test]
    fn test_notification_counts_always_emitted() {
        let frame = json!({
            "type": "send_notification",
            "counts": {"purchase_count": 3, "cashout_count": 1}
        });
        let batch = batch(normalize(&frame));
        assert!(batch.transactions.is_empty());
        assert!(batch.activities.is_empty());
        let counts = batch.counts.unwrap();
        assert_eq!(counts.counts, Counts::new(3, 1, 0));
        assert!(!counts.is_initial_load);
    }

    #[test]
    fn test_notification_counts_with_unparseable_record() {
        let frame = json!({
            "type": "send_notification",
            "activity_type": "purchase",
            "counts": {"purchase_count": 2},
            "data": {"amount": 5}
        });
        let batch = batch(normalize(&frame));
        assert!(batch.transactions.is_empty());
        assert_eq!(batch.counts.unwrap().counts.purchase_count, 2);
    }

    #[test]
    fn test_purchase_data_object() {
        let frame = json!({
            "type": "send_notification",
            "purchase_data": {"id": "p9", "amount": "12.5", "status": "completed"}
        });
        let batch = batch(normalize(&frame));
        let tx = &batch.transactions[0].transaction;
        assert_eq!(tx.kind, TransactionKind::Purchase);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.amount.as_str(), "12.5");
    }

    #[test]
    fn test_cashout_data_array_element_wise() {
        let frame = json!({
            "type": "send_notification",
            "cashout_data": [{"id": "c1", "amount": 1}, {"id": "c2", "amount": 2}]
        });
        let batch = batch(normalize(&frame));
        let ids: Vec<&str> = batch.transactions.iter().map(|u| u.transaction.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(batch.transactions.iter().all(|u| !u.is_initial_load));
        assert!(batch
            .transactions
            .iter()
            .all(|u| u.transaction.kind == TransactionKind::Cashout));
    }

    #[test]
    fn test_game_activity_tagged() {
        let frame = json!({
            "type": "send_notification",
            "activity_type": "game_activity",
            "data": {
                "id": "g5",
                "operation_type": "redeem",
                "username": "bob",
                "game_title": "Orion Stars",
                "amount": "30",
                "bonus_amount": 0
            }
        });
        let batch = batch(normalize(&frame));
        assert!(batch.transactions.is_empty());
        let entry = &batch.activities[0].entry;
        assert_eq!(entry.id, "g5");
        assert_eq!(entry.activity_type, "redeem");
        assert_eq!(entry.game_title.as_deref(), Some("Orion Stars"));
        assert!(entry.bonus_amount.is_none());
    }

    #[test]
    fn test_game_activity_by_operation_tag_in_activity_type() {
        let frame = json!({
            "type": "send_notification",
            "activity_type": "recharge",
            "id": "g6",
            "username": "eve",
            "amount": 10
        });
        let batch = batch(normalize(&frame));
        let entry = &batch.activities[0].entry;
        assert_eq!(entry.activity_type, "recharge");
        assert_eq!(entry.username.as_deref(), Some("eve"));
    }

    #[test]
    fn test_untagged_heuristics() {
        let purchase = json!({
            "type": "send_notification",
            "data": {"id": "h1", "amount": 20, "status": "pending", "payment_method": "card"}
        });
        let batch_p = batch(normalize(&purchase));
        assert_eq!(batch_p.transactions[0].transaction.kind, TransactionKind::Purchase);

        let cashout = json!({
            "type": "send_notification",
            "data": {"id": "h2", "amount": 20, "status": "pending", "payment_details": {"btc": "addr"}}
        });
        let batch_c = batch(normalize(&cashout));
        assert_eq!(batch_c.transactions[0].transaction.kind, TransactionKind::Cashout);

        let activity = json!({
            "type": "send_notification",
            "id": "h3",
            "game_code": "FK",
            "amount": 5,
            "status": "pending",
            "payment_method": "wallet"
        });
        let batch_a = batch(normalize(&activity));
        assert!(batch_a.transactions.is_empty());
        assert_eq!(batch_a.activities[0].entry.game_code.as_deref(), Some("FK"));
    }

    #[test]
    fn test_field_placement_tolerance() {
        let flat = json!({
            "type": "send_notification",
            "activity_type": "purchase",
            "id": "1",
            "amount": "15.00",
            "username": "alice"
        });
        let nested = json!({
            "type": "send_notification",
            "activity_type": "purchase",
            "data": {"id": "1", "amount": "15.00", "user": {"username": "alice"}}
        });
        let a = batch(normalize(&flat)).transactions.remove(0).transaction;
        let b = batch(normalize(&nested)).transactions.remove(0).transaction;
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let frame = json!({
            "type": "send_notification",
            "activity_type": "cashout",
            "counts": {"cashout_count": 4},
            "data": {"id": "7", "amount": 5, "created_at": "2024-05-01T10:00:00Z"},
            "payment_details": {"iban": "X"}
        });
        let before = frame.clone();
        assert_eq!(normalize(&frame), normalize(&frame));
        assert_eq!(frame, before);
    }

    #[test]
    fn test_unrecognized_frames() {
        for frame in [
            json!({"type": "heartbeat"}),
            json!({"no_type": true}),
            json!([1, 2, 3]),
            json!("text"),
            json!({"type": "send_notification", "hello": "world"}),
        ] {
            assert!(
                matches!(normalize(&frame), NormalizedFrame::Unrecognized(_)),
                "frame should be unrecognized: {frame}"
            );
        }
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(normalize_text("{not json"), Err(WsError::MessageParse(_))));
    }

    #[test]
    fn test_connection_frame() {
        let out = normalize_text(r#"{"type":"connection","message":"connected"}"#).unwrap();
        assert_eq!(
            out,
            NormalizedFrame::Connection {
                message: Some("connected".into())
            }
        );
        assert!(out.records().is_none());
    }

    #[test]
    fn test_error_frame() {
        let out = normalize(&json!({"type": "error", "message": "forbidden", "code": "AUTH"}));
        assert_eq!(
            out,
            NormalizedFrame::ServerError(WsError::Server {
                message: "forbidden".into(),
                code: Some("AUTH".into()),
            })
        );
    }

    #[test]
    fn test_malformed_counts_ignored() {
        let frame = json!({
            "type": "send_notification",
            "counts": "lots",
            "activity_type": "purchase",
            "id": "1",
            "amount": 1
        });
        let batch = batch(normalize(&frame));
        assert!(batch.counts.is_none());
        assert_eq!(batch.transactions.len(), 1);
    }
}
