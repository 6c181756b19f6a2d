use crate::types::{Agreement, AgreementEvent};
use anyhow::Result;
use async_trait::async_trait;
use brix_types::AgreementId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Canonical persistence for agreement records and their audit trail.
///
/// Ids come from `allocate_id`, the single monotonic source for the
/// ledger.
#[async_trait]
pub trait AgreementStore: Send + Sync {
    async fn get(&self, id: AgreementId) -> Result<Option<Agreement>>;
    async fn put(&self, agreement: Agreement) -> Result<()>;
    async fn ids(&self) -> Result<Vec<AgreementId>>;
    async fn allocate_id(&self) -> Result<AgreementId>;

    async fn record_event(&self, event: AgreementEvent) -> Result<()>;
    async fn events_for(&self, id: AgreementId) -> Result<Vec<AgreementEvent>>;
}

pub struct MemoryAgreementStore {
    agreements: Arc<RwLock<HashMap<AgreementId, Agreement>>>,
    events: Arc<RwLock<Vec<AgreementEvent>>>,
    next_id: AtomicU64,
}

impl Default for MemoryAgreementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAgreementStore {
    pub fn new() -> Self {
        Self {
            agreements: Arc::new(RwLock::new(HashMap::new())),
            events: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl AgreementStore for MemoryAgreementStore {
    async fn get(&self, id: AgreementId) -> Result<Option<Agreement>> {
        Ok(self.agreements.read().await.get(&id).cloned())
    }

    async fn put(&self, agreement: Agreement) -> Result<()> {
        self.agreements
            .write()
            .await
            .insert(agreement.id, agreement);
        Ok(())
    }

    async fn ids(&self) -> Result<Vec<AgreementId>> {
        let mut ids: Vec<_> = self.agreements.read().await.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn allocate_id(&self) -> Result<AgreementId> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn record_event(&self, event: AgreementEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn events_for(&self, id: AgreementId) -> Result<Vec<AgreementEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.agreement_id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_id_is_monotonic() {
        let store = MemoryAgreementStore::new();
        let a = store.allocate_id().await.unwrap();
        let b = store.allocate_id().await.unwrap();
        let c = store.allocate_id().await.unwrap();
        assert!(a < b && b < c);
    }
}
