//! In-memory store for dev mode and tests
//!
//! Implements both `AccountStore` and `RequestLedger` over mutex-guarded
//! maps. Dev mode falls back to this store when MongoDB is unreachable,
//! mirroring the production semantics including the compare-and-swap
//! transition.

use std::collections::HashMap;
use std::sync::Mutex;

use bson::{oid::ObjectId, DateTime};

use crate::auth::Role;
use crate::db::schemas::{AccountDoc, RequestStatus, VerifyRequestDoc};
use crate::types::Result;
use crate::verify::store::{AccountStore, RequestLedger};

/// Shared in-memory account and request storage
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<ObjectId, AccountDoc>>,
    requests: Mutex<HashMap<ObjectId, VerifyRequestDoc>>,
    /// Insertion order for newest-first listings
    request_order: Mutex<Vec<ObjectId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryStore {
    async fn get(&self, id: ObjectId) -> Result<Option<AccountDoc>> {
        let accounts = self.accounts.lock().expect("accounts lock");
        Ok(accounts.get(&id).filter(|a| !a.metadata.is_deleted).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<AccountDoc>> {
        let accounts = self.accounts.lock().expect("accounts lock");
        Ok(accounts
            .values()
            .find(|a| a.identifier == identifier && !a.metadata.is_deleted)
            .cloned())
    }

    async fn insert(&self, mut account: AccountDoc) -> Result<ObjectId> {
        let id = account._id.unwrap_or_else(ObjectId::new);
        account._id = Some(id);
        account.metadata.created_at = Some(DateTime::now());
        account.metadata.updated_at = Some(DateTime::now());

        let mut accounts = self.accounts.lock().expect("accounts lock");
        accounts.insert(id, account);
        Ok(id)
    }

    async fn elevate(&self, id: ObjectId, role: Role) -> Result<bool> {
        let mut accounts = self.accounts.lock().expect("accounts lock");
        match accounts.get_mut(&id).filter(|a| !a.metadata.is_deleted) {
            Some(account) => {
                account.role = role;
                account.verified = true;
                account.metadata.updated_at = Some(DateTime::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl RequestLedger for MemoryStore {
    async fn insert(&self, mut request: VerifyRequestDoc) -> Result<ObjectId> {
        let id = request._id.unwrap_or_else(ObjectId::new);
        request._id = Some(id);
        request.metadata.created_at = Some(DateTime::now());
        request.metadata.updated_at = Some(DateTime::now());

        self.requests.lock().expect("requests lock").insert(id, request);
        self.request_order.lock().expect("order lock").push(id);
        Ok(id)
    }

    async fn get(&self, id: ObjectId) -> Result<Option<VerifyRequestDoc>> {
        let requests = self.requests.lock().expect("requests lock");
        Ok(requests.get(&id).cloned())
    }

    async fn list(&self, status: Option<RequestStatus>) -> Result<Vec<VerifyRequestDoc>> {
        let requests = self.requests.lock().expect("requests lock");
        let order = self.request_order.lock().expect("order lock");

        let result = order
            .iter()
            .rev()
            .filter_map(|id| requests.get(id))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();

        Ok(result)
    }

    async fn has_pending_for(&self, requester: ObjectId) -> Result<bool> {
        let requests = self.requests.lock().expect("requests lock");
        Ok(requests
            .values()
            .any(|r| r.requester == requester && r.status == RequestStatus::Pending))
    }

    async fn transition(
        &self,
        id: ObjectId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<Option<VerifyRequestDoc>> {
        let mut requests = self.requests.lock().expect("requests lock");
        match requests.get_mut(&id) {
            Some(request) if request.status == from => {
                request.status = to;
                request.metadata.updated_at = Some(DateTime::now());
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }
}
