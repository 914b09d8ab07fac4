//! Game activity domain: queued recharge/redeem/add-game/create-game operations.

mod convert;

use crate::shared::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A canonical entry of the game activity processing queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityQueueEntry {
    pub id: String,
    /// Free-form operation tag as sent by the server (`"recharge"`, `"add_game"`, ...).
    pub activity_type: String,
    pub status: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub operator: Option<String>,
    pub game_title: Option<String>,
    pub game_code: Option<String>,
    pub game_username: Option<String>,
    pub amount: Option<Amount>,
    pub bonus_amount: Option<Amount>,
    pub new_game_balance: Option<Amount>,
    /// Union of the record's top-level and nested `data` fields, top level winning.
    pub data: Map<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ActivityQueueEntry {
    pub fn is_pending(&self) -> bool {
        self.status.eq_ignore_ascii_case("pending")
    }

    /// Raw field from the merged data bag.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}
