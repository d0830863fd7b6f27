//! Store identity and enumeration.
//!
//! The engine only needs a store's id as the key for all per-store
//! resilience state; the remaining fields exist for eligibility
//! filtering and log context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// A seller store — the unit of synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    /// Unique store identifier
    pub id: Uuid,
    /// Display name used in logs
    pub name: String,
    /// Marketplace the store sells on
    pub marketplace: String,
    /// Whether the store has completed its initial onboarding sync;
    /// ineligible stores are skipped before batching
    pub initial_sync_completed: bool,
}

impl Store {
    pub fn new(name: impl Into<String>, marketplace: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            marketplace: marketplace.into(),
            initial_sync_completed: true,
        }
    }
}

/// Source of the store population for a run.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Returns all known stores. Eligibility filtering is the engine's
    /// concern, not the provider's.
    async fn stores(&self) -> Result<Vec<Store>>;
}

/// Fixed store list, for tests and tooling.
pub struct InMemoryStoreProvider {
    stores: Vec<Store>,
}

impl InMemoryStoreProvider {
    pub fn new(stores: Vec<Store>) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl StoreProvider for InMemoryStoreProvider {
    async fn stores(&self) -> Result<Vec<Store>> {
        Ok(self.stores.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_provider() {
        let stores = vec![
            Store::new("alpha", "trendyol"),
            Store::new("beta", "trendyol"),
        ];
        let provider = InMemoryStoreProvider::new(stores);
        let listed = provider.stores().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_ne!(listed[0].id, listed[1].id);
    }
}
