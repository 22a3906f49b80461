//! Account Store and Request Ledger
//!
//! Narrow async interfaces over the two shared collections the workflow
//! touches, with MongoDB implementations for production and an in-memory
//! implementation (see `memory`) for dev mode and tests.
//!
//! Only the workflow engine's decide path writes to an account's
//! role/verified fields; guard evaluation only reads.

use bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::FindOptions;

use crate::auth::Role;
use crate::db::schemas::{
    AccountDoc, RequestStatus, VerifyRequestDoc, ACCOUNT_COLLECTION, VERIFY_REQUEST_COLLECTION,
};
use crate::db::MongoClient;
use crate::types::Result;

/// Read and conditionally mutate marketplace accounts
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    /// Load an account by id
    async fn get(&self, id: ObjectId) -> Result<Option<AccountDoc>>;

    /// Load an account by its unique identifier (email/username)
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<AccountDoc>>;

    /// Insert a new account, returning its id
    async fn insert(&self, account: AccountDoc) -> Result<ObjectId>;

    /// Apply the role elevation side effect: set the role and mark the
    /// account platform verified. Returns false when the account does
    /// not exist.
    async fn elevate(&self, id: ObjectId, role: Role) -> Result<bool>;
}

/// Persisted collection of verification requests.
/// Creation is append-only; status changes go through `transition`.
#[async_trait::async_trait]
pub trait RequestLedger: Send + Sync {
    /// Append a new request, returning its id
    async fn insert(&self, request: VerifyRequestDoc) -> Result<ObjectId>;

    /// Load a request by id
    async fn get(&self, id: ObjectId) -> Result<Option<VerifyRequestDoc>>;

    /// List requests, optionally filtered by status, newest first
    async fn list(&self, status: Option<RequestStatus>) -> Result<Vec<VerifyRequestDoc>>;

    /// Whether the requester already has a pending request
    async fn has_pending_for(&self, requester: ObjectId) -> Result<bool>;

    /// Compare-and-swap status transition: move the request from `from`
    /// to `to` only if it is still in `from` at the moment of update.
    /// Returns the updated request, or None when the precondition failed
    /// (request missing or no longer in `from`).
    async fn transition(
        &self,
        id: ObjectId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<Option<VerifyRequestDoc>>;
}

/// MongoDB-backed account store
#[derive(Clone)]
pub struct MongoAccountStore {
    mongo: MongoClient,
}

impl MongoAccountStore {
    pub fn new(mongo: MongoClient) -> Self {
        Self { mongo }
    }
}

#[async_trait::async_trait]
impl AccountStore for MongoAccountStore {
    async fn get(&self, id: ObjectId) -> Result<Option<AccountDoc>> {
        let collection = self.mongo.collection::<AccountDoc>(ACCOUNT_COLLECTION).await?;
        collection.find_one(doc! { "_id": id }).await
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<AccountDoc>> {
        let collection = self.mongo.collection::<AccountDoc>(ACCOUNT_COLLECTION).await?;
        collection.find_one(doc! { "identifier": identifier }).await
    }

    async fn insert(&self, account: AccountDoc) -> Result<ObjectId> {
        let collection = self.mongo.collection::<AccountDoc>(ACCOUNT_COLLECTION).await?;
        collection.insert_one(account).await
    }

    async fn elevate(&self, id: ObjectId, role: Role) -> Result<bool> {
        let collection = self.mongo.collection::<AccountDoc>(ACCOUNT_COLLECTION).await?;

        let result = collection
            .update_one(
                doc! { "_id": id, "metadata.is_deleted": { "$ne": true } },
                doc! {
                    "$set": {
                        "role": role.as_str(),
                        "verified": true,
                        "metadata.updated_at": DateTime::now()
                    }
                },
            )
            .await?;

        Ok(result.matched_count > 0)
    }
}

/// MongoDB-backed request ledger
#[derive(Clone)]
pub struct MongoRequestLedger {
    mongo: MongoClient,
}

impl MongoRequestLedger {
    pub fn new(mongo: MongoClient) -> Self {
        Self { mongo }
    }
}

#[async_trait::async_trait]
impl RequestLedger for MongoRequestLedger {
    async fn insert(&self, request: VerifyRequestDoc) -> Result<ObjectId> {
        let collection = self
            .mongo
            .collection::<VerifyRequestDoc>(VERIFY_REQUEST_COLLECTION)
            .await?;
        collection.insert_one(request).await
    }

    async fn get(&self, id: ObjectId) -> Result<Option<VerifyRequestDoc>> {
        let collection = self
            .mongo
            .collection::<VerifyRequestDoc>(VERIFY_REQUEST_COLLECTION)
            .await?;
        collection.find_one(doc! { "_id": id }).await
    }

    async fn list(&self, status: Option<RequestStatus>) -> Result<Vec<VerifyRequestDoc>> {
        use futures_util::TryStreamExt;

        let collection = self
            .mongo
            .collection::<VerifyRequestDoc>(VERIFY_REQUEST_COLLECTION)
            .await?;

        let mut filter = doc! { "metadata.is_deleted": { "$ne": true } };
        if let Some(s) = status {
            filter.insert("status", s.as_str());
        }

        let options = FindOptions::builder()
            .sort(doc! { "metadata.created_at": -1 })
            .build();

        let requests = collection
            .inner()
            .find(filter)
            .with_options(options)
            .await?
            .try_collect()
            .await?;

        Ok(requests)
    }

    async fn has_pending_for(&self, requester: ObjectId) -> Result<bool> {
        let collection = self
            .mongo
            .collection::<VerifyRequestDoc>(VERIFY_REQUEST_COLLECTION)
            .await?;

        let existing = collection
            .find_one(doc! {
                "requester": requester,
                "status": RequestStatus::Pending.as_str(),
            })
            .await?;

        Ok(existing.is_some())
    }

    async fn transition(
        &self,
        id: ObjectId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<Option<VerifyRequestDoc>> {
        let collection = self
            .mongo
            .collection::<VerifyRequestDoc>(VERIFY_REQUEST_COLLECTION)
            .await?;

        // The status filter makes the transition a compare-and-swap:
        // a concurrent decision that got there first leaves nothing to
        // match and the caller sees the precondition failure.
        collection
            .find_one_and_update(
                doc! { "_id": id, "status": from.as_str() },
                doc! {
                    "$set": {
                        "status": to.as_str(),
                        "metadata.updated_at": DateTime::now()
                    }
                },
            )
            .await
    }
}
