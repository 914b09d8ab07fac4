//! Pending-queue sizes as reported by the server.

use crate::shared::serde_util::lenient_count;
use serde::{Deserialize, Serialize};

/// Current size of each pending queue.
///
/// A fresh `Counts` replaces the previous one; it is never a delta.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Counts {
    #[serde(default, deserialize_with = "lenient_count::deserialize")]
    pub purchase_count: u64,
    #[serde(default, deserialize_with = "lenient_count::deserialize")]
    pub cashout_count: u64,
    #[serde(default, deserialize_with = "lenient_count::deserialize")]
    pub game_activities_count: u64,
}

impl Counts {
    pub fn new(purchase_count: u64, cashout_count: u64, game_activities_count: u64) -> Self {
        Self {
            purchase_count,
            cashout_count,
            game_activities_count,
        }
    }

    pub fn total(&self) -> u64 {
        self.purchase_count
            .saturating_add(self.cashout_count)
            .saturating_add(self.game_activities_count)
    }
}

/// A counts update handed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountsUpdate {
    pub counts: Counts,
    /// `true` when the server sent the counts; `false` when they were derived
    /// from the lengths of a snapshot's arrays.
    pub authoritative: bool,
    pub is_initial_load: bool,
}
