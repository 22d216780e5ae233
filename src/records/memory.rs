use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::model::{NewRecord, NutritionRecord};
use super::repo::{RecordRepository, StoreError};
use crate::auth::OwnerId;

/// In-process repository backing the test suite.
///
/// Counts every call and can be switched into a failing mode, so callers can
/// assert that the store was (or was not) touched.
#[derive(Default)]
pub struct MemoryRecordRepository {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

#[derive(Default)]
struct Inner {
    // Per owner, oldest first.
    records: HashMap<OwnerId, Vec<NutritionRecord>>,
    last_created: Option<OffsetDateTime>,
}

impl Inner {
    /// Strictly increasing creation timestamps, even within one clock tick.
    fn next_timestamp(&mut self) -> OffsetDateTime {
        let mut now = OffsetDateTime::now_utc();
        if let Some(prev) = self.last_created {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        self.last_created = Some(now);
        now
    }
}

impl MemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Total records across all owners.
    pub fn len(&self) -> usize {
        self.lock().records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordRepository for MemoryRecordRepository {
    async fn insert(
        &self,
        owner: &OwnerId,
        record: NewRecord,
    ) -> Result<NutritionRecord, StoreError> {
        self.enter()?;
        // Timestamp and append under one lock so list order matches createdAt.
        let mut inner = self.lock();
        let created_at = inner.next_timestamp();
        let stored = record.materialize(Uuid::new_v4(), owner.as_str(), created_at);
        inner
            .records
            .entry(owner.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, owner: &OwnerId, id: &str) -> Result<Option<NutritionRecord>, StoreError> {
        self.enter()?;
        Ok(self
            .lock()
            .records
            .get(owner)
            .and_then(|records| records.iter().find(|r| r.id == id).cloned()))
    }

    async fn list(
        &self,
        owner: &OwnerId,
        limit: Option<i64>,
    ) -> Result<Vec<NutritionRecord>, StoreError> {
        self.enter()?;
        let take = limit.map_or(usize::MAX, |n| n.max(0) as usize);
        Ok(self
            .lock()
            .records
            .get(owner)
            .map(|records| records.iter().rev().take(take).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, owner: &OwnerId, id: &str) -> Result<bool, StoreError> {
        self.enter()?;
        let mut guard = self.lock();
        let Some(records) = guard.records.get_mut(owner) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }

    async fn clear(&self, owner: &OwnerId) -> Result<u64, StoreError> {
        self.enter()?;
        Ok(self
            .lock()
            .records
            .remove(owner)
            .map_or(0, |records| records.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CallerIdentity;
    use std::sync::Arc;

    fn new_record(name: &str) -> NewRecord {
        NewRecord {
            food_name: name.into(),
            serving_size: "1 serving".into(),
            confidence: 0.5,
            calories: 100,
            protein: 1.0,
            carbohydrates: 2.0,
            fat: 3.0,
            fiber: None,
            sugar: None,
            sodium: None,
            vitamins: "[]".into(),
            minerals: "[]".into(),
            health_insights: "[]".into(),
            image_url: "data:image/png;base64,AA==".into(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_list_newest_first() {
        let repo = Arc::new(MemoryRecordRepository::new());
        let owner = CallerIdentity::new("user-a", None).owner();

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let repo = repo.clone();
                let owner = owner.clone();
                tokio::spawn(async move {
                    repo.insert(&owner, new_record(&format!("meal {i}"))).await
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("join").expect("insert");
        }

        let listed = repo.list(&owner, None).await.expect("list");
        assert_eq!(listed.len(), 64);
        assert!(listed
            .windows(2)
            .all(|pair| pair[0].created_at > pair[1].created_at));
    }
}
