use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use leaderboard_core::score::standing_order;
use leaderboard_core::{ScoreRecord, UserId};

use crate::error::StoreError;
use crate::scores::{PutOutcome, ScoreStore};

/// Process-local score store. Nothing survives a restart.
///
/// The per-key entry lock makes `put_if_absent` atomic per user.
#[derive(Default)]
pub struct MemoryScoreStore {
    records: DashMap<UserId, ScoreRecord>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScoreStore for MemoryScoreStore {
    fn get_by_user_id(&self, user_id: &UserId) -> Result<Option<ScoreRecord>, StoreError> {
        Ok(self.records.get(user_id).map(|r| r.value().clone()))
    }

    fn put_if_absent(&self, record: &ScoreRecord) -> Result<PutOutcome, StoreError> {
        match self.records.entry(record.user_id.clone()) {
            Entry::Occupied(_) => Ok(PutOutcome::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(PutOutcome::Inserted)
            }
        }
    }

    fn top_n(&self, n: usize) -> Result<Vec<ScoreRecord>, StoreError> {
        let mut all: Vec<ScoreRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(standing_order);
        all.truncate(n);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_keeps_original() {
        let store = MemoryScoreStore::new();
        let first = ScoreRecord::new(UserId::from_raw("u1"), "alice", 10);
        let second = ScoreRecord::new(UserId::from_raw("u1"), "alice", 99);

        assert_eq!(store.put_if_absent(&first).unwrap(), PutOutcome::Inserted);
        assert_eq!(store.put_if_absent(&second).unwrap(), PutOutcome::Conflict);
        assert_eq!(store.get_by_user_id(&first.user_id).unwrap().unwrap().score, 10);
        assert_eq!(store.top_n(10).unwrap().len(), 1);
    }

    #[test]
    fn top_n_truncates_in_order() {
        let store = MemoryScoreStore::new();
        for (i, score) in [5u32, 50, 20, 40].iter().enumerate() {
            let rec = ScoreRecord::new(UserId::from_raw(format!("u{i}")), format!("p{i}"), *score);
            store.put_if_absent(&rec).unwrap();
        }
        let top: Vec<u32> = store.top_n(2).unwrap().iter().map(|r| r.score).collect();
        assert_eq!(top, [50, 40]);
    }
}
