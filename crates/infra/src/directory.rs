//! Display names for products and users, owned outside the ledger.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use stockledger_core::{ProductId, UserId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: Option<String>,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: Option<String>,
}

/// Lookup of display metadata. Unknown ids return `None`, never an error.
pub trait Directory: Send + Sync {
    fn product(&self, id: ProductId) -> Option<ProductInfo>;
    fn user(&self, id: UserId) -> Option<UserInfo>;
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    products: RwLock<HashMap<ProductId, ProductInfo>>,
    users: RwLock<HashMap<UserId, UserInfo>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_product(&self, id: ProductId, info: ProductInfo) {
        if let Ok(mut products) = self.products.write() {
            products.insert(id, info);
        }
    }

    pub fn upsert_user(&self, id: UserId, info: UserInfo) {
        if let Ok(mut users) = self.users.write() {
            users.insert(id, info);
        }
    }
}

impl Directory for InMemoryDirectory {
    fn product(&self, id: ProductId) -> Option<ProductInfo> {
        self.products.read().ok()?.get(&id).cloned()
    }

    fn user(&self, id: UserId) -> Option<UserInfo> {
        self.users.read().ok()?.get(&id).cloned()
    }
}
