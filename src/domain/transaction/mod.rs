//! Transaction domain: pending purchases and cashouts.

mod convert;

use crate::shared::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which processing queue a transaction belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Purchase,
    Cashout,
}

impl TransactionKind {
    /// Ledger side, fixed by kind: purchases credit the player, cashouts debit.
    pub fn journal_entry(self) -> JournalEntry {
        match self {
            TransactionKind::Purchase => JournalEntry::Credit,
            TransactionKind::Cashout => JournalEntry::Debit,
        }
    }

    /// Parse a wire tag (`"purchase"`, `"Cashout"`, `"cash_out"`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "purchase" | "purchases" => Some(TransactionKind::Purchase),
            "cashout" | "cash_out" | "cashouts" => Some(TransactionKind::Cashout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Purchase => "purchase",
            TransactionKind::Cashout => "cashout",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JournalEntry {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Lenient status parsing. Unknown or missing statuses read as `Pending`,
    /// since only pending items are pushed to the processing feed.
    pub fn from_wire(status: Option<&str>) -> Self {
        let Some(status) = status else {
            return TransactionStatus::Pending;
        };
        match status.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" | "success" | "successful" | "approved" => {
                TransactionStatus::Completed
            }
            "failed" | "failure" | "rejected" | "declined" | "error" => TransactionStatus::Failed,
            "cancelled" | "canceled" => TransactionStatus::Cancelled,
            "pending" | "processing" | "" => TransactionStatus::Pending,
            other => {
                tracing::debug!("Unknown transaction status '{}', treating as pending", other);
                TransactionStatus::Pending
            }
        }
    }
}

/// A canonical purchase or cashout record.
///
/// `journal_entry` always equals `kind.journal_entry()`; it is derived during
/// normalization and never read from the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub amount: Amount,
    pub bonus_amount: Option<Amount>,
    pub status: TransactionStatus,
    pub kind: TransactionKind,
    pub journal_entry: JournalEntry,
    pub currency: Option<String>,
    pub previous_balance: Option<Amount>,
    pub new_balance: Option<Amount>,
    pub previous_winning_balance: Option<Amount>,
    pub new_winning_balance: Option<Amount>,
    pub payment_method: Option<String>,
    pub operator: Option<String>,
    pub payment_details: Option<Map<String, Value>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub payment_url: Option<String>,
    pub invoice_url: Option<String>,
}

impl Transaction {
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }
}
