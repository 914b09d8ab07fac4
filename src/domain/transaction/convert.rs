//! Extraction of canonical transactions from loosely-shaped payloads.

use super::{Transaction, TransactionKind, TransactionStatus};
use crate::domain::payload::Payload;
use crate::error::WsError;
use crate::shared::Amount;
use serde_json::Value;

impl<'a> TryFrom<(TransactionKind, Payload<'a>)> for Transaction {
    type Error = WsError;

    fn try_from((kind, p): (TransactionKind, Payload<'a>)) -> Result<Self, Self::Error> {
        let id = p
            .string(&["id", "transaction_id"])
            .ok_or_else(|| WsError::MessageParse(format!("{} payload without id", kind)))?;

        let amount = p.amount(&["amount"]).unwrap_or_else(|| {
            tracing::debug!("{} {} has no numeric amount, using 0", kind, id);
            Amount::zero()
        });

        // Cashout details prefer the nested record and fall back to the frame.
        let payment_details = match kind {
            TransactionKind::Cashout => p.get_nested_first(&["payment_details"]),
            TransactionKind::Purchase => p.get(&["payment_details"]),
        }
        .and_then(Value::as_object)
        .cloned();

        Ok(Self {
            id,
            user_id: p.identity(&["user_id"], "id"),
            username: p.identity(&["username", "user_username"], "username"),
            email: p.identity(&["email", "user_email"], "email"),
            amount,
            bonus_amount: p.nonzero_amount(&["bonus_amount", "bonus"]),
            status: TransactionStatus::from_wire(p.string(&["status"]).as_deref()),
            kind,
            journal_entry: kind.journal_entry(),
            currency: p.string(&["currency"]),
            previous_balance: p.amount(&["previous_balance", "balance_before"]),
            new_balance: p.amount(&["new_balance", "balance_after"]),
            previous_winning_balance: p.amount(&["previous_winning_balance"]),
            new_winning_balance: p.amount(&["new_winning_balance"]),
            payment_method: p.string(&["payment_method", "payment_type"]),
            operator: p.string(&["operator", "processed_by"]),
            payment_details,
            created_at: p.timestamp(&["created_at", "created"]),
            updated_at: p.timestamp(&["updated_at", "updated"]),
            payment_url: p.string(&["payment_url", "checkout_url"]),
            invoice_url: p.string(&["invoice_url"]),
        })
    }
}
