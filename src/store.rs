//! Receipt persistence: where finished receipts are handed off.
//!
//! The datastore itself lives outside this crate. [`ReceiptStore`] is the
//! seam; [`MemoryReceiptStore`] is a process-local implementation used by the
//! CLI and the tests.

use crate::output::{FoodItem, RecordId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// The store refused or failed the write.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Persists `(items, raw_text)` for a caller.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn save_receipt(
        &self,
        caller: &str,
        items: &[FoodItem],
        raw_text: Option<&str>,
    ) -> Result<RecordId, StoreError>;
}

/// One saved receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReceipt {
    pub id: RecordId,
    pub caller: String,
    pub items: Vec<FoodItem>,
    pub raw_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// In-memory [`ReceiptStore`]. Ids are random UUIDs.
#[derive(Debug, Default)]
pub struct MemoryReceiptStore {
    receipts: Mutex<Vec<StoredReceipt>>,
}

impl MemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything saved so far, in insertion order.
    pub fn receipts(&self) -> Vec<StoredReceipt> {
        self.lock().clone()
    }

    pub fn get(&self, id: &RecordId) -> Option<StoredReceipt> {
        self.lock().iter().find(|r| &r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StoredReceipt>> {
        // A panic while holding the lock cannot leave a half-written Vec push.
        self.receipts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ReceiptStore for MemoryReceiptStore {
    async fn save_receipt(
        &self,
        caller: &str,
        items: &[FoodItem],
        raw_text: Option<&str>,
    ) -> Result<RecordId, StoreError> {
        let id = RecordId(uuid::Uuid::new_v4().to_string());
        let receipt = StoredReceipt {
            id: id.clone(),
            caller: caller.to_string(),
            items: items.to_vec(),
            raw_text: raw_text.map(str::to_string),
            created_at: Utc::now(),
        };
        self.lock().push(receipt);
        debug!("Saved receipt {} ({} items)", id, items.len());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::FoodCategory;

    #[tokio::test]
    async fn saves_and_reads_back() {
        let store = MemoryReceiptStore::new();
        assert!(store.is_empty());

        let items = vec![FoodItem::new("Milk", FoodCategory::Fresh)];
        let id = store
            .save_receipt("user-1", &items, Some("MILK 1.45"))
            .await
            .unwrap();

        let saved = store.get(&id).unwrap();
        assert_eq!(saved.caller, "user-1");
        assert_eq!(saved.items, items);
        assert_eq!(saved.raw_text.as_deref(), Some("MILK 1.45"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let store = MemoryReceiptStore::new();
        let a = store.save_receipt("u", &[], None).await.unwrap();
        let b = store.save_receipt("u", &[], None).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.receipts().len(), 2);
    }
}
