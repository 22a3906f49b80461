//! Role-verification workflow engine
//!
//! Drives the request lifecycle: intake creates a pending request, an
//! administrator decision moves it to exactly one terminal state, and an
//! approval elevates the requester's account (role := requested role,
//! verified := true).
//!
//! Decisions race-protect with a compare-and-swap on the pending status:
//! two concurrent decisions cannot both apply, and a terminal request is
//! never re-decided. The cross-entity approve path (request write, then
//! account write) compensates by returning the request to pending when
//! the account write finds nothing to update.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bson::oid::ObjectId;
use tracing::{info, warn};

use crate::auth::Role;
use crate::db::schemas::{RequestStatus, VerifyRequestDoc};
use crate::types::{AgoraError, Result};
use crate::verify::store::{AccountStore, RequestLedger};

/// An administrator's decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Terminal status this decision produces
    pub fn status(self) -> RequestStatus {
        match self {
            Decision::Approve => RequestStatus::Approved,
            Decision::Reject => RequestStatus::Rejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status().as_str())
    }
}

impl FromStr for Decision {
    type Err = AgoraError;

    /// Parse a decision from a submitted status value, normalizing case
    /// once here. Only terminal statuses are decisions; anything else
    /// (including "pending") is invalid input.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "approved" => Ok(Decision::Approve),
            "rejected" => Ok(Decision::Reject),
            other => Err(AgoraError::InvalidInput(format!(
                "decision must be 'approved' or 'rejected', got '{other}'"
            ))),
        }
    }
}

/// The verification workflow over an account store and request ledger
#[derive(Clone)]
pub struct WorkflowEngine {
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn RequestLedger>,
}

impl WorkflowEngine {
    pub fn new(accounts: Arc<dyn AccountStore>, ledger: Arc<dyn RequestLedger>) -> Self {
        Self { accounts, ledger }
    }

    /// Request intake: create a pending elevation request.
    ///
    /// Rejects unknown requesters, roles that are not elevation targets,
    /// missing documents, and duplicate pending requests for the same
    /// requester.
    pub async fn submit(
        &self,
        requester: ObjectId,
        requested_role: Role,
        document_ref: &str,
    ) -> Result<VerifyRequestDoc> {
        if document_ref.trim().is_empty() {
            return Err(AgoraError::InvalidInput(
                "a supporting document is required".into(),
            ));
        }

        if !requested_role.is_elevation_target() {
            return Err(AgoraError::InvalidInput(format!(
                "role '{requested_role}' cannot be requested through verification"
            )));
        }

        if self.accounts.get(requester).await?.is_none() {
            return Err(AgoraError::NotFound("requester account not found".into()));
        }

        if self.ledger.has_pending_for(requester).await? {
            return Err(AgoraError::Conflict(
                "a pending verification request already exists for this account".into(),
            ));
        }

        let request = VerifyRequestDoc::new(requester, requested_role, document_ref.to_string());
        let id = self.ledger.insert(request).await?;

        info!(
            "Verification request {} created: {} -> {}",
            id, requester, requested_role
        );

        self.ledger
            .get(id)
            .await?
            .ok_or_else(|| AgoraError::Internal("request vanished after insert".into()))
    }

    /// List requests, optionally filtered by status. Read-only.
    pub async fn list(&self, status: Option<RequestStatus>) -> Result<Vec<VerifyRequestDoc>> {
        self.ledger.list(status).await
    }

    /// Load a single request
    pub async fn get(&self, id: ObjectId) -> Result<VerifyRequestDoc> {
        self.ledger
            .get(id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("request not found".into()))
    }

    /// Apply an administrator decision to a pending request.
    ///
    /// The transition is a compare-and-swap on pending status; a request
    /// that was already decided (or decided concurrently) fails with
    /// Conflict so the role elevation is never applied twice.
    pub async fn decide(&self, id: ObjectId, decision: Decision) -> Result<VerifyRequestDoc> {
        let updated = self
            .ledger
            .transition(id, RequestStatus::Pending, decision.status())
            .await?;

        let request = match updated {
            Some(request) => request,
            None => {
                // Distinguish a missing request from a lost race.
                return match self.ledger.get(id).await? {
                    Some(existing) if existing.status.is_terminal() => Err(AgoraError::Conflict(
                        format!("request is already {}", existing.status),
                    )),
                    Some(_) => Err(AgoraError::Conflict(
                        "request was modified concurrently".into(),
                    )),
                    None => Err(AgoraError::NotFound("request not found".into())),
                };
            }
        };

        if decision == Decision::Approve {
            let elevated = self
                .accounts
                .elevate(request.requester, request.requested_role)
                .await?;

            if !elevated {
                // The account vanished between decision and elevation.
                // Compensate by returning the request to pending so the
                // approval is not left dangling.
                warn!(
                    "Account {} missing during approval of request {}; rolling back",
                    request.requester, id
                );

                // Any rollback failure, CAS miss or storage error, leaves
                // the request approved without the account write applied.
                // That partial state must surface as Inconsistent, never
                // as a generic retryable storage error.
                let rolled_back = self
                    .ledger
                    .transition(id, RequestStatus::Approved, RequestStatus::Pending)
                    .await;

                return match rolled_back {
                    Ok(Some(_)) => Err(AgoraError::NotFound(
                        "requester account no longer exists; request returned to pending".into(),
                    )),
                    Ok(None) => Err(AgoraError::Inconsistent(format!(
                        "request {id} approved but account {} is missing and rollback failed",
                        request.requester
                    ))),
                    Err(e) => Err(AgoraError::Inconsistent(format!(
                        "request {id} approved but account {} is missing and rollback failed: {e}",
                        request.requester
                    ))),
                };
            }

            info!(
                "Request {} approved: account {} elevated to {}",
                id, request.requester, request.requested_role
            );
        } else {
            info!("Request {} rejected", id);
        }

        Ok(request)
    }

    /// Decline a pending request. Thin alias over the single transition
    /// function; there is deliberately no second force-reject path.
    pub async fn decline(&self, id: ObjectId) -> Result<VerifyRequestDoc> {
        self.decide(id, Decision::Reject).await
    }

    /// Account store backing this workflow (for requester snapshots)
    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::db::schemas::AccountDoc;
    use crate::verify::memory::MemoryStore;

    /// Ledger that fails every transition after the first, simulating a
    /// storage outage hitting the compensating write of an approval.
    struct FailingRollbackLedger {
        inner: MemoryStore,
        transitions: AtomicUsize,
    }

    impl FailingRollbackLedger {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                transitions: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl RequestLedger for FailingRollbackLedger {
        async fn insert(&self, request: VerifyRequestDoc) -> Result<ObjectId> {
            RequestLedger::insert(&self.inner, request).await
        }

        async fn get(&self, id: ObjectId) -> Result<Option<VerifyRequestDoc>> {
            RequestLedger::get(&self.inner, id).await
        }

        async fn list(&self, status: Option<RequestStatus>) -> Result<Vec<VerifyRequestDoc>> {
            self.inner.list(status).await
        }

        async fn has_pending_for(&self, requester: ObjectId) -> Result<bool> {
            self.inner.has_pending_for(requester).await
        }

        async fn transition(
            &self,
            id: ObjectId,
            from: RequestStatus,
            to: RequestStatus,
        ) -> Result<Option<VerifyRequestDoc>> {
            if self.transitions.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(AgoraError::Database("ledger unavailable".into()));
            }
            self.inner.transition(id, from, to).await
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_surfaces_inconsistent() {
        let accounts = Arc::new(MemoryStore::new());
        let ledger = Arc::new(FailingRollbackLedger::new());
        let engine = WorkflowEngine::new(accounts.clone(), ledger.clone());

        let account_id = AccountStore::insert(
            accounts.as_ref(),
            AccountDoc::new("gone@example.com".into(), "hash".into()),
        )
        .await
        .unwrap();

        let request = engine.submit(account_id, Role::Farmer, "doc-1").await.unwrap();
        let rid = request._id.unwrap();

        // Account disappears before the decision lands
        let mut account = AccountStore::get(accounts.as_ref(), account_id)
            .await
            .unwrap()
            .unwrap();
        account.metadata.is_deleted = true;
        AccountStore::insert(accounts.as_ref(), account).await.unwrap();

        // The pending->approved CAS succeeds, the elevation finds no
        // account, and the compensating approved->pending write errors.
        // That partial state must surface as Inconsistent, not as a
        // retryable storage error.
        let err = engine.decide(rid, Decision::Approve).await.unwrap_err();
        assert!(matches!(err, AgoraError::Inconsistent(_)), "got {err:?}");

        // The dangling state is left visible for operator attention
        let stuck = RequestLedger::get(ledger.as_ref(), rid).await.unwrap().unwrap();
        assert_eq!(stuck.status, RequestStatus::Approved);
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!("approved".parse::<Decision>().unwrap(), Decision::Approve);
        assert_eq!("REJECTED".parse::<Decision>().unwrap(), Decision::Reject);
    }

    #[test]
    fn test_decision_parse_rejects_non_terminal() {
        assert!("pending".parse::<Decision>().is_err());
        assert!("banana".parse::<Decision>().is_err());
        assert!("".parse::<Decision>().is_err());
    }

    #[test]
    fn test_decision_status() {
        assert_eq!(Decision::Approve.status(), RequestStatus::Approved);
        assert_eq!(Decision::Reject.status(), RequestStatus::Rejected);
    }
}
