//! Placement-tolerant view over one inbound record object.
//!
//! The backend places the same field at the top level of a frame, inside a
//! nested `data` object, or (for identity fields) inside a nested `user`
//! object. [`Payload`] resolves every lookup in that order: top level, then
//! `data`, then `user`. Null values never shadow a later placement.
//!
//! The shape heuristics used when a frame carries no explicit tag also live
//! here, so new activity types or marker fields are one-line additions.

use serde_json::{Map, Value};

use crate::domain::transaction::TransactionKind;
use crate::shared::serde_util::{parse_timestamp, value_to_string};
use crate::shared::Amount;
use chrono::{DateTime, Utc};

// ─── Heuristic field lists ───────────────────────────────────────────────────

/// Fields whose presence marks a payload as a game activity.
pub const GAME_ACTIVITY_MARKERS: &[&str] = &[
    "operation_type",
    "game_title",
    "game_code",
    "game_name",
    "game_username",
];

/// Operation tags that identify a game activity when found in a type field.
pub const ACTIVITY_TYPES: &[&str] = &[
    "recharge",
    "redeem",
    "add_game",
    "create_game",
    "reset_password",
    "change_password",
    "freeplay",
];

/// Fields that carry an operation tag.
pub const ACTIVITY_TYPE_FIELDS: &[&str] = &["operation_type", "activity_type", "type"];

/// Payment-method style fields; together with amount + status they mark a
/// purchase or cashout.
pub const PAYMENT_MARKERS: &[&str] = &["payment_method", "payment_type", "payment_details"];

/// Fields that may carry an explicit purchase/cashout tag on an untagged payload.
pub const TRANSACTION_KIND_FIELDS: &[&str] = &["kind", "transaction_type", "type"];

/// Keys that hold a nested record rather than a field of the record itself.
pub const CONTAINER_KEYS: &[&str] = &[
    "data",
    "purchase_data",
    "cashout_data",
    "game_activities_data",
];

/// Category tags used by the `activity_type` field of notification frames.
pub const CATEGORY_TAGS: &[&str] = &["purchase", "cashout", "game_activity", "gameactivity"];

/// Shape of a payload as decided by [`Payload::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Transaction(TransactionKind),
    Activity,
}

impl PayloadShape {
    /// Shape named by a notification's `activity_type` category tag.
    pub fn from_category(tag: &str) -> Option<Self> {
        match normalize_tag(tag).as_str() {
            "game_activity" | "gameactivity" => Some(PayloadShape::Activity),
            other => TransactionKind::from_tag(other).map(PayloadShape::Transaction),
        }
    }
}

/// Lowercase and unify separators: `"Add-Game"` → `"add_game"`.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

// ─── Payload ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    top: &'a Map<String, Value>,
    data: Option<&'a Map<String, Value>>,
}

impl<'a> Payload<'a> {
    /// A payload whose nested `data` object (if any) sits inside `top`.
    pub fn from_object(top: &'a Map<String, Value>) -> Self {
        Self {
            top,
            data: top.get("data").and_then(Value::as_object),
        }
    }

    /// A payload with an explicitly supplied nested object, used when the
    /// record lives under `purchase_data`/`cashout_data` rather than `data`.
    pub fn with_data(top: &'a Map<String, Value>, data: Option<&'a Map<String, Value>>) -> Self {
        Self { top, data }
    }

    /// First non-null value for any of `keys`: all aliases at top level, then in `data`.
    pub fn get(&self, keys: &[&str]) -> Option<&'a Value> {
        lookup(self.top, keys).or_else(|| self.data.and_then(|data| lookup(data, keys)))
    }

    /// Like [`Payload::get`] but preferring the nested `data` placement.
    pub fn get_nested_first(&self, keys: &[&str]) -> Option<&'a Value> {
        self.data
            .and_then(|data| lookup(data, keys))
            .or_else(|| lookup(self.top, keys))
    }

    pub fn has_any(&self, keys: &[&str]) -> bool {
        self.get(keys).is_some()
    }

    pub fn string(&self, keys: &[&str]) -> Option<String> {
        self.get(keys).and_then(name_like)
    }

    /// Identity lookup: `keys` at top level and in `data`, then `user_key`
    /// inside a nested `user` object.
    ///
    /// A bare string `user` is taken as the username.
    pub fn identity(&self, keys: &[&str], user_key: &str) -> Option<String> {
        if let Some(found) = self.string(keys) {
            return Some(found);
        }
        let user = self.get(&["user"])?;
        match user {
            Value::Object(map) => map.get(user_key).and_then(value_to_string),
            Value::String(_) if user_key == "username" => value_to_string(user),
            _ => None,
        }
    }

    pub fn amount(&self, keys: &[&str]) -> Option<Amount> {
        self.get(keys).and_then(Amount::from_value)
    }

    /// Amount where zero, empty or null mean "absent".
    pub fn nonzero_amount(&self, keys: &[&str]) -> Option<Amount> {
        self.get(keys).and_then(Amount::nonzero_from_value)
    }

    pub fn timestamp(&self, keys: &[&str]) -> Option<DateTime<Utc>> {
        self.get(keys).and_then(parse_timestamp)
    }

    /// Union of `data` and top-level fields; top level wins on collision.
    ///
    /// Container keys (`data`, `purchase_data`, ...) are not copied into the result.
    pub fn merged(&self) -> Map<String, Value> {
        let mut merged = self.data.cloned().unwrap_or_default();
        for (key, value) in self.top {
            if CONTAINER_KEYS.contains(&key.as_str()) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// The first operation tag found in [`ACTIVITY_TYPE_FIELDS`], skipping
    /// category tags such as `game_activity`.
    pub fn operation_type(&self) -> Option<String> {
        ACTIVITY_TYPE_FIELDS.iter().find_map(|field| {
            self.get(&[*field])
                .and_then(Value::as_str)
                .filter(|tag| !tag.trim().is_empty())
                .filter(|tag| !CATEGORY_TAGS.contains(&normalize_tag(tag).as_str()))
                .map(|tag| tag.trim().to_string())
        })
    }

    /// Untagged shape detection.
    ///
    /// Game markers win over payment markers: a payload with a game title is
    /// an activity even if it also carries an amount and status. An explicit
    /// `kind`/`transaction_type` tag then decides before the field heuristic.
    pub fn classify(&self) -> Option<PayloadShape> {
        if self.looks_like_activity() {
            return Some(PayloadShape::Activity);
        }
        if let Some(kind) = self.explicit_transaction_kind() {
            return Some(PayloadShape::Transaction(kind));
        }
        if self.looks_like_transaction() {
            return Some(PayloadShape::Transaction(self.guess_transaction_kind()));
        }
        None
    }

    fn looks_like_activity(&self) -> bool {
        if self.has_any(GAME_ACTIVITY_MARKERS) {
            return true;
        }
        ACTIVITY_TYPE_FIELDS.iter().any(|field| {
            self.get(&[*field])
                .and_then(Value::as_str)
                .map(|tag| ACTIVITY_TYPES.contains(&normalize_tag(tag).as_str()))
                .unwrap_or(false)
        })
    }

    fn looks_like_transaction(&self) -> bool {
        self.has_any(&["amount"]) && self.has_any(&["status"]) && self.has_any(PAYMENT_MARKERS)
    }

    fn explicit_transaction_kind(&self) -> Option<TransactionKind> {
        TRANSACTION_KIND_FIELDS.iter().find_map(|field| {
            self.get(&[*field])
                .and_then(Value::as_str)
                .and_then(TransactionKind::from_tag)
        })
    }

    fn guess_transaction_kind(&self) -> TransactionKind {
        if self.has_any(&["payment_details"]) {
            TransactionKind::Cashout
        } else {
            TransactionKind::Purchase
        }
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| map.get(*key).filter(|value| !value.is_null()))
}

/// Scalars render as strings; objects contribute their `username` or `name`.
fn name_like(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => lookup(map, &["username", "name"]).and_then(value_to_string),
        other => value_to_string(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_top_level_wins_over_data() {
        let top = obj(json!({"amount": "1.00", "data": {"amount": "2.00", "status": "pending"}}));
        let payload = Payload::from_object(&top);
        assert_eq!(payload.amount(&["amount"]).unwrap().as_str(), "1.00");
        assert_eq!(payload.string(&["status"]).as_deref(), Some("pending"));
    }

    #[test]
    fn test_null_does_not_shadow() {
        let top = obj(json!({"amount": null, "data": {"amount": 3}}));
        let payload = Payload::from_object(&top);
        assert_eq!(payload.amount(&["amount"]).unwrap().as_str(), "3");
    }

    #[test]
    fn test_identity_falls_back_to_user_object() {
        let top = obj(json!({"data": {"user": {"id": 9, "username": "bob", "email": "b@x.io"}}}));
        let payload = Payload::from_object(&top);
        assert_eq!(payload.identity(&["user_id"], "id").as_deref(), Some("9"));
        assert_eq!(payload.identity(&["username"], "username").as_deref(), Some("bob"));
        assert_eq!(payload.identity(&["email"], "email").as_deref(), Some("b@x.io"));
    }

    #[test]
    fn test_identity_bare_user_string() {
        let top = obj(json!({"user": "carol"}));
        let payload = Payload::from_object(&top);
        assert_eq!(payload.identity(&["username"], "username").as_deref(), Some("carol"));
        assert_eq!(payload.identity(&["email"], "email"), None);
    }

    #[test]
    fn test_merged_top_level_wins() {
        let top = obj(json!({"status": "done", "data": {"status": "pending", "extra": 1}}));
        let merged = Payload::from_object(&top).merged();
        assert_eq!(merged.get("status"), Some(&json!("done")));
        assert_eq!(merged.get("extra"), Some(&json!(1)));
        assert!(merged.get("data").is_none());
    }

    #[test]
    fn test_nested_first_lookup() {
        let top = obj(json!({"payment_details": {"iban": "TOP"}, "data": {"payment_details": {"iban": "NESTED"}}}));
        let payload = Payload::from_object(&top);
        assert_eq!(
            payload.get_nested_first(&["payment_details"]),
            Some(&json!({"iban": "NESTED"}))
        );
    }

    #[test]
    fn test_classify_game_activity_by_marker() {
        let top = obj(json!({"id": "1", "game_title": "Fire Kirin", "amount": 10, "status": "pending", "payment_method": "x"}));
        assert_eq!(Payload::from_object(&top).classify(), Some(PayloadShape::Activity));
    }

    #[test]
    fn test_classify_game_activity_by_type_string() {
        let top = obj(json!({"id": "1", "type": "Add-Game"}));
        assert_eq!(Payload::from_object(&top).classify(), Some(PayloadShape::Activity));
    }

    #[test]
    fn test_classify_transaction_kinds() {
        let purchase = obj(json!({"amount": 1, "status": "pending", "payment_method": "card"}));
        assert_eq!(
            Payload::from_object(&purchase).classify(),
            Some(PayloadShape::Transaction(TransactionKind::Purchase))
        );

        let cashout = obj(json!({"amount": 1, "status": "pending", "payment_details": {"iban": "X"}}));
        assert_eq!(
            Payload::from_object(&cashout).classify(),
            Some(PayloadShape::Transaction(TransactionKind::Cashout))
        );

        let tagged = obj(json!({"amount": 1, "status": "pending", "payment_method": "btc", "transaction_type": "cashout"}));
        assert_eq!(
            Payload::from_object(&tagged).classify(),
            Some(PayloadShape::Transaction(TransactionKind::Cashout))
        );
    }

    #[test]
    fn test_classify_explicit_kind_without_payment_fields() {
        let top = obj(json!({"kind": "cashout", "data": {"id": "7", "amount": 5}}));
        assert_eq!(
            Payload::from_object(&top).classify(),
            Some(PayloadShape::Transaction(TransactionKind::Cashout))
        );

        let game = obj(json!({"kind": "purchase", "game_title": "Fire Kirin"}));
        assert_eq!(Payload::from_object(&game).classify(), Some(PayloadShape::Activity));
    }

    #[test]
    fn test_classify_unknown() {
        let top = obj(json!({"hello": "world"}));
        assert_eq!(Payload::from_object(&top).classify(), None);
    }

    #[test]
    fn test_shape_from_category() {
        assert_eq!(PayloadShape::from_category("GameActivity"), Some(PayloadShape::Activity));
        assert_eq!(
            PayloadShape::from_category("cashout"),
            Some(PayloadShape::Transaction(TransactionKind::Cashout))
        );
        assert_eq!(PayloadShape::from_category("recharge"), None);
    }

    #[test]
    fn test_operation_type_skips_category_tags() {
        let top = obj(json!({"activity_type": "game_activity", "data": {"operation_type": "redeem"}}));
        assert_eq!(Payload::from_object(&top).operation_type().as_deref(), Some("redeem"));
    }
}
