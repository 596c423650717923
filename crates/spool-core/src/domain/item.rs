//! Queue item: one row of the shared item collection.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::ItemId;
use crate::typed::{CodecError, PayloadCodec};

/// `expire_at` sentinel of an item nobody holds.
pub const UNCLAIMED: i64 = 0;

/// Lease state of an item, derived from `expire_at` and the current time.
///
/// State transitions:
/// - Unclaimed -> Leased (claim)
/// - Leased -> Unclaimed (release)
/// - Leased -> Stale (time passes)
/// - Stale -> Unclaimed (garbage collection only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseState {
    /// `expire_at == 0`; eligible for claim.
    Unclaimed,

    /// `expire_at > now`; invisible to claimers.
    Leased,

    /// `0 < expire_at <= now`; waits for garbage collection.
    Stale,
}

impl LeaseState {
    pub fn of(expire_at: i64, now: i64) -> Self {
        if expire_at == UNCLAIMED {
            LeaseState::Unclaimed
        } else if expire_at > now {
            LeaseState::Leased
        } else {
            LeaseState::Stale
        }
    }

    /// Can `claim_item` pick this item?
    pub fn is_claimable(self) -> bool {
        matches!(self, LeaseState::Unclaimed)
    }
}

/// A queue item as stored.
///
/// `payload` is an opaque frame produced by [`PayloadCodec`]; use
/// [`QueueItem::decode`] to get the caller's value back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub queue_name: String,
    pub payload: Vec<u8>,

    /// Epoch seconds, set once at insertion.
    pub created_at: i64,

    /// Epoch seconds the lease runs out, or [`UNCLAIMED`].
    pub expire_at: i64,
}

impl QueueItem {
    pub fn lease_state(&self, now: i64) -> LeaseState {
        LeaseState::of(self.expire_at, now)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        PayloadCodec::decode(&self.payload)
    }
}
