use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Tracks outstanding offsets per partition so acks that arrive out of order
/// never commit past a message that is still in flight.
#[derive(Default)]
pub struct OffsetTracker {
    partitions: Mutex<HashMap<i32, PartitionState>>,
}

#[derive(Default)]
struct PartitionState {
    /// Outstanding deliveries per offset; a rebalance can hand out the same
    /// offset again while the first copy is still in flight.
    pending: BTreeMap<i64, usize>,
    highest_acked: Option<i64>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, partition: i32, offset: i64) {
        let mut guard = self.partitions.lock().unwrap_or_else(|e| e.into_inner());
        *guard.entry(partition).or_default().pending.entry(offset).or_default() += 1;
    }

    /// Marks `offset` done and returns the next offset that is safe to commit,
    /// i.e. the lowest offset still pending, or one past the highest acked.
    pub fn complete(&self, partition: i32, offset: i64) -> Option<i64> {
        let mut guard = self.partitions.lock().unwrap_or_else(|e| e.into_inner());
        let state = guard.entry(partition).or_default();
        let remaining = match state.pending.get_mut(&offset) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => return None,
        };
        if remaining == 0 {
            state.pending.remove(&offset);
        }
        state.highest_acked = Some(state.highest_acked.map_or(offset, |h| h.max(offset)));
        match state.pending.keys().next() {
            Some(lowest) => Some(*lowest),
            None => state.highest_acked.map(|h| h + 1),
        }
    }

    pub fn pending(&self, partition: i32) -> usize {
        let guard = self.partitions.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(&partition).map_or(0, |state| state.pending.values().sum())
    }
}
