//! Status - lease-state counts of one queue.

use serde::Serialize;

use crate::domain::{LeaseState, QueueItem};

/// Snapshot of a queue by lease state.
///
/// `stale` items are invisible to claimers until garbage collection resets
/// them, so a growing `stale` count usually means GC is not running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub unclaimed: u64,
    pub leased: u64,
    pub stale: u64,
}

impl QueueCounts {
    pub fn tally(items: &[QueueItem], now: i64) -> Self {
        let mut counts = Self::default();
        for item in items {
            match item.lease_state(now) {
                LeaseState::Unclaimed => counts.unclaimed += 1,
                LeaseState::Leased => counts.leased += 1,
                LeaseState::Stale => counts.stale += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u64 {
        self.unclaimed + self.leased + self.stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemId;

    fn item(id: i64, expire_at: i64) -> QueueItem {
        QueueItem {
            id: ItemId::new(id),
            queue_name: "q".into(),
            payload: Vec::new(),
            created_at: 0,
            expire_at,
        }
    }

    #[test]
    fn tally_buckets_by_lease_state() {
        let items = vec![item(1, 0), item(2, 0), item(3, 200), item(4, 100), item(5, 50)];
        let counts = QueueCounts::tally(&items, 100);

        assert_eq!(
            counts,
            QueueCounts {
                unclaimed: 2,
                leased: 1,
                stale: 2
            }
        );
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn serializes_as_flat_json() {
        let json = serde_json::to_value(QueueCounts {
            unclaimed: 3,
            leased: 1,
            stale: 0,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"unclaimed": 3, "leased": 1, "stale": 0}));
    }
}
