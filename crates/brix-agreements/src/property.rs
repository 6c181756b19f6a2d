use anyhow::{bail, Result};
use async_trait::async_trait;
use brix_types::{AccountAddress, AgreementId, PropertyId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// External property-certificate registry, consumed at its interface
/// only. An unlinked property is a distinct observable state
/// (`active_link == None`), not an error.
#[async_trait]
pub trait PropertyRegistry: Send + Sync {
    async fn is_verified(&self, property: PropertyId) -> Result<bool>;
    async fn owner_of(&self, property: PropertyId) -> Result<Option<AccountAddress>>;
    async fn active_link(&self, property: PropertyId) -> Result<Option<AgreementId>>;
    async fn link_agreement(&self, property: PropertyId, agreement: AgreementId) -> Result<()>;
    async fn release_link(&self, property: PropertyId) -> Result<()>;
}

/// External identity/whitelist service.
#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    async fn is_approved(&self, identity: AccountAddress) -> Result<bool>;
}

pub struct MemoryPropertyRegistry {
    owners: Arc<RwLock<HashMap<PropertyId, AccountAddress>>>,
    links: Arc<RwLock<HashMap<PropertyId, AgreementId>>>,
}

impl Default for MemoryPropertyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPropertyRegistry {
    pub fn new() -> Self {
        Self {
            owners: Arc::new(RwLock::new(HashMap::new())),
            links: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a verified property certificate for `owner`.
    pub async fn register(&self, property: PropertyId, owner: AccountAddress) {
        self.owners.write().await.insert(property, owner);
    }
}

#[async_trait]
impl PropertyRegistry for MemoryPropertyRegistry {
    async fn is_verified(&self, property: PropertyId) -> Result<bool> {
        Ok(self.owners.read().await.contains_key(&property))
    }

    async fn owner_of(&self, property: PropertyId) -> Result<Option<AccountAddress>> {
        Ok(self.owners.read().await.get(&property).copied())
    }

    async fn active_link(&self, property: PropertyId) -> Result<Option<AgreementId>> {
        Ok(self.links.read().await.get(&property).copied())
    }

    async fn link_agreement(&self, property: PropertyId, agreement: AgreementId) -> Result<()> {
        let mut links = self.links.write().await;
        if let Some(existing) = links.get(&property) {
            bail!(
                "property {} already linked to agreement {}",
                property,
                existing
            );
        }
        links.insert(property, agreement);
        Ok(())
    }

    async fn release_link(&self, property: PropertyId) -> Result<()> {
        self.links.write().await.remove(&property);
        Ok(())
    }
}

pub struct MemoryIdentityRegistry {
    approved: Arc<RwLock<HashSet<AccountAddress>>>,
}

impl Default for MemoryIdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityRegistry {
    pub fn new() -> Self {
        Self {
            approved: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub async fn approve(&self, identity: AccountAddress) {
        self.approved.write().await.insert(identity);
    }

    pub async fn revoke(&self, identity: AccountAddress) {
        self.approved.write().await.remove(&identity);
    }
}

#[async_trait]
impl IdentityRegistry for MemoryIdentityRegistry {
    async fn is_approved(&self, identity: AccountAddress) -> Result<bool> {
        Ok(self.approved.read().await.contains(&identity))
    }
}
