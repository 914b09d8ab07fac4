//! Extraction of canonical activity entries from loosely-shaped payloads.

use super::ActivityQueueEntry;
use crate::domain::payload::Payload;
use crate::error::WsError;

const UNKNOWN_ACTIVITY_TYPE: &str = "unknown";
const DEFAULT_STATUS: &str = "pending";

impl<'a> TryFrom<Payload<'a>> for ActivityQueueEntry {
    type Error = WsError;

    fn try_from(p: Payload<'a>) -> Result<Self, Self::Error> {
        let id = p
            .string(&["id", "activity_id"])
            .ok_or_else(|| WsError::MessageParse("game activity payload without id".into()))?;

        Ok(Self {
            id,
            activity_type: p
                .operation_type()
                .unwrap_or_else(|| UNKNOWN_ACTIVITY_TYPE.to_string()),
            status: p
                .string(&["status"])
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            user_id: p.identity(&["user_id"], "id"),
            username: p.identity(&["username", "user_username"], "username"),
            email: p.identity(&["email", "user_email"], "email"),
            operator: p.string(&["operator", "processed_by"]),
            game_title: p.string(&["game_title", "game_name", "game"]),
            game_code: p.string(&["game_code"]),
            game_username: p.string(&["game_username", "in_game_username"]),
            amount: p.amount(&["amount"]),
            bonus_amount: p.nonzero_amount(&["bonus_amount", "bonus"]),
            new_game_balance: p.amount(&["new_game_balance", "game_balance"]),
            data: p.merged(),
            created_at: p.timestamp(&["created_at", "created"]),
            updated_at: p.timestamp(&["updated_at", "updated"]),
        })
    }
}
