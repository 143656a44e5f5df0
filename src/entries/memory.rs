use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::models::Entry;
use super::repository::EntryStore;
use crate::error::{AppError, AppResult};

/// Mirrors the candidate filter of the Postgres query
pub fn is_expiry_candidate(entry: &Entry, now: i64) -> bool {
    entry.is_active
        && !entry.is_free
        && entry.expires_at.map(|deadline| deadline <= now).unwrap_or(false)
}

/// In-memory entry store for engine and scheduler tests
#[derive(Default)]
pub struct MemoryEntryStore {
    entries: Mutex<HashMap<String, Entry>>,
    fail_queries: Mutex<bool>,
    fail_updates: Mutex<HashSet<String>>,
    fetch_gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
    hang_fetch: Mutex<bool>,
    pub fetch_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
}

impl MemoryEntryStore {
    pub fn with_entries(entries: Vec<Entry>) -> Self {
        let store = Self::default();
        {
            let mut map = store.entries.lock();
            for entry in entries {
                map.insert(entry.id.clone(), entry);
            }
        }
        store
    }

    pub fn get(&self, id: &str) -> Option<Entry> {
        self.entries.lock().get(id).cloned()
    }

    pub fn fail_queries(&self) {
        *self.fail_queries.lock() = true;
    }

    pub fn fail_update_for(&self, id: &str) {
        self.fail_updates.lock().insert(id.to_string());
    }

    /// Never resolve candidate fetches
    pub fn hang_fetches(&self) {
        *self.hang_fetch.lock() = true;
    }

    /// Park the next fetch: `entered` is notified on arrival and the fetch
    /// resumes once `release` is notified
    pub fn gate_fetches(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.fetch_gate.lock() = Some((entered.clone(), release.clone()));
        (entered, release)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn fetch_expired_candidates(&self, now: i64, limit: u32) -> AppResult<Vec<Entry>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.fetch_gate.lock().take();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }

        let hang = *self.hang_fetch.lock();
        if hang {
            std::future::pending::<()>().await;
        }

        if *self.fail_queries.lock() {
            return Err(AppError::Internal("connection reset".to_string()));
        }

        let mut candidates: Vec<Entry> = self
            .entries
            .lock()
            .values()
            .filter(|e| is_expiry_candidate(e, now))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.id.cmp(&b.id)));
        candidates.truncate(limit as usize);

        Ok(candidates)
    }

    async fn mark_entry_free(&self, entry_id: &str, free_piid: &str, now: i64) -> AppResult<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_updates.lock().contains(entry_id) {
            return Err(AppError::Internal(format!("update failed for {}", entry_id)));
        }

        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(entry_id)
            .ok_or_else(|| AppError::NotFound(format!("Entry {} not found", entry_id)))?;
        entry.piid = Some(free_piid.to_string());
        entry.is_free = true;
        entry.updated_at = now;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, expires_at: Option<i64>, is_active: bool, is_free: bool) -> Entry {
        Entry {
            id: id.to_string(),
            feed_id: "f1".to_string(),
            cid: Some("c1".to_string()),
            piid: Some("p1".to_string()),
            expires_at,
            is_active,
            is_free,
            updated_at: 0,
        }
    }

    #[test]
    fn test_candidate_filter() {
        assert!(is_expiry_candidate(&entry("a", Some(100), true, false), 200));
        assert!(is_expiry_candidate(&entry("a", Some(200), true, false), 200));
        assert!(!is_expiry_candidate(&entry("a", Some(201), true, false), 200));
        assert!(!is_expiry_candidate(&entry("a", None, true, false), i64::MAX));
        assert!(!is_expiry_candidate(&entry("a", Some(100), false, false), 200));
        assert!(!is_expiry_candidate(&entry("a", Some(100), true, true), 200));
    }

    #[tokio::test]
    async fn test_fetch_orders_and_limits() {
        let store = MemoryEntryStore::with_entries(vec![
            entry("late", Some(30), true, false),
            entry("early", Some(10), true, false),
            entry("mid", Some(20), true, false),
        ]);

        let batch = store.fetch_expired_candidates(100, 2).await.unwrap();
        let ids: Vec<&str> = batch.iter().map(|e| e.id.as_str()).collect();

        assert_eq!(ids, vec!["early", "mid"]);
    }
}
