//! Role-verification workflow integration tests
//!
//! Exercises the full request lifecycle over the in-memory store:
//! intake validation, admin decisions, account elevation, compensation
//! on missing accounts, and the guard chain before and after approval.

use std::sync::Arc;

use bson::oid::ObjectId;

use agora::auth::{CallerContext, Claims, GuardChain, Role};
use agora::db::schemas::{AccountDoc, RequestStatus};
use agora::types::AgoraError;
use agora::verify::{AccountStore, Decision, MemoryStore, WorkflowEngine};

fn engine_with_store() -> (WorkflowEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = WorkflowEngine::new(store.clone(), store.clone());
    (engine, store)
}

async fn seed_account(store: &MemoryStore, identifier: &str) -> ObjectId {
    store
        .insert(AccountDoc::new(identifier.to_string(), "hash".to_string()))
        .await
        .expect("insert account")
}

fn claims_for(id: ObjectId, identifier: &str, role: Role) -> Claims {
    Claims {
        sub: id.to_hex(),
        identifier: identifier.to_string(),
        role,
        iat: 0,
        exp: u64::MAX,
    }
}

#[tokio::test]
async fn test_submit_creates_pending_without_touching_account() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    let request = engine.submit(id, Role::Farmer, "doc-123").await.unwrap();

    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.requested_role, Role::Farmer);
    assert_eq!(request.requester, id);

    // Intake must not change the account
    let account = store.get(id).await.unwrap().unwrap();
    assert_eq!(account.role, Role::General);
    assert!(!account.verified);
}

#[tokio::test]
async fn test_submit_rejects_missing_document() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    let err = engine.submit(id, Role::Farmer, "   ").await.unwrap_err();
    assert!(matches!(err, AgoraError::InvalidInput(_)));
}

#[tokio::test]
async fn test_submit_rejects_non_elevation_roles() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    for role in [Role::General, Role::Admin] {
        let err = engine.submit(id, role, "doc-123").await.unwrap_err();
        assert!(matches!(err, AgoraError::InvalidInput(_)), "{role} accepted");
    }
}

#[tokio::test]
async fn test_submit_rejects_unknown_requester() {
    let (engine, _store) = engine_with_store();

    let err = engine
        .submit(ObjectId::new(), Role::Farmer, "doc-123")
        .await
        .unwrap_err();
    assert!(matches!(err, AgoraError::NotFound(_)));
}

#[tokio::test]
async fn test_duplicate_pending_request_conflicts() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    engine.submit(id, Role::Farmer, "doc-1").await.unwrap();

    let err = engine.submit(id, Role::Expert, "doc-2").await.unwrap_err();
    assert!(matches!(err, AgoraError::Conflict(_)));
}

#[tokio::test]
async fn test_resubmit_allowed_after_rejection() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    let first = engine.submit(id, Role::Farmer, "doc-1").await.unwrap();
    engine.decide(first._id.unwrap(), Decision::Reject).await.unwrap();

    // A terminal request no longer blocks a new submission
    let second = engine.submit(id, Role::Farmer, "doc-2").await.unwrap();
    assert_eq!(second.status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_approval_elevates_account() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    let request = engine.submit(id, Role::Farmer, "doc-123").await.unwrap();
    let decided = engine
        .decide(request._id.unwrap(), Decision::Approve)
        .await
        .unwrap();

    assert_eq!(decided.status, RequestStatus::Approved);

    let account = store.get(id).await.unwrap().unwrap();
    assert_eq!(account.role, Role::Farmer);
    assert!(account.verified);
}

#[tokio::test]
async fn test_rejection_leaves_account_untouched() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    let request = engine.submit(id, Role::Expert, "doc-123").await.unwrap();
    let decided = engine
        .decide(request._id.unwrap(), Decision::Reject)
        .await
        .unwrap();

    assert_eq!(decided.status, RequestStatus::Rejected);

    let account = store.get(id).await.unwrap().unwrap();
    assert_eq!(account.role, Role::General);
    assert!(!account.verified);
}

#[tokio::test]
async fn test_terminal_request_cannot_be_redecided() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    let request = engine.submit(id, Role::Farmer, "doc-123").await.unwrap();
    let rid = request._id.unwrap();

    engine.decide(rid, Decision::Reject).await.unwrap();

    // Both a repeat decision and a decline hit the same wall
    let err = engine.decide(rid, Decision::Approve).await.unwrap_err();
    assert!(matches!(err, AgoraError::Conflict(_)));

    let err = engine.decline(rid).await.unwrap_err();
    assert!(matches!(err, AgoraError::Conflict(_)));

    // And the account never got elevated by the failed approve
    let account = store.get(id).await.unwrap().unwrap();
    assert_eq!(account.role, Role::General);
}

#[tokio::test]
async fn test_decide_unknown_request_not_found() {
    let (engine, _store) = engine_with_store();

    let err = engine
        .decide(ObjectId::new(), Decision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, AgoraError::NotFound(_)));
}

#[tokio::test]
async fn test_decision_parsing_is_closed() {
    assert_eq!("approved".parse::<Decision>().unwrap(), Decision::Approve);
    assert_eq!("Rejected".parse::<Decision>().unwrap(), Decision::Reject);
    assert!("pending".parse::<Decision>().is_err());
    assert!("banana".parse::<Decision>().is_err());
}

#[tokio::test]
async fn test_decline_is_the_reject_transition() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    let request = engine.submit(id, Role::Farmer, "doc-123").await.unwrap();
    let declined = engine.decline(request._id.unwrap()).await.unwrap();

    assert_eq!(declined.status, RequestStatus::Rejected);
}

#[tokio::test]
async fn test_approval_compensates_when_account_vanished() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    let request = engine.submit(id, Role::Farmer, "doc-123").await.unwrap();
    let rid = request._id.unwrap();

    // Simulate the account disappearing between decision and elevation
    {
        let mut account = store.get(id).await.unwrap().unwrap();
        account.metadata.is_deleted = true;
        store.insert(account).await.unwrap();
    }

    let err = engine.decide(rid, Decision::Approve).await.unwrap_err();
    assert!(matches!(err, AgoraError::NotFound(_)));

    // Rolled back to pending so the approval is not left dangling
    let after = engine.get(rid).await.unwrap();
    assert_eq!(after.status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let (engine, store) = engine_with_store();
    let a = seed_account(&store, "a@farm.example").await;
    let b = seed_account(&store, "b@farm.example").await;

    let first = engine.submit(a, Role::Farmer, "doc-a").await.unwrap();
    engine.submit(b, Role::Expert, "doc-b").await.unwrap();
    engine.decide(first._id.unwrap(), Decision::Approve).await.unwrap();

    let all = engine.list(None).await.unwrap();
    assert_eq!(all.len(), 2);

    let pending = engine.list(Some(RequestStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].requester, b);

    let approved = engine.list(Some(RequestStatus::Approved)).await.unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].requester, a);
}

#[tokio::test]
async fn test_list_is_newest_first() {
    let (engine, store) = engine_with_store();
    let a = seed_account(&store, "a@farm.example").await;
    let b = seed_account(&store, "b@farm.example").await;

    engine.submit(a, Role::Farmer, "doc-a").await.unwrap();
    engine.submit(b, Role::Expert, "doc-b").await.unwrap();

    let all = engine.list(None).await.unwrap();
    assert_eq!(all[0].requester, b);
    assert_eq!(all[1].requester, a);
}

#[tokio::test]
async fn test_guards_gate_until_approval() {
    let (engine, store) = engine_with_store();
    let id = seed_account(&store, "alice@farm.example").await;

    let farmer_chain = GuardChain::farmer();

    // Fresh general account fails the farmer preset with Forbidden
    let before = CallerContext {
        claims: Some(claims_for(id, "alice@farm.example", Role::General)),
        account: store.get(id).await.unwrap(),
    };
    assert!(matches!(
        farmer_chain.evaluate(&before).unwrap_err(),
        AgoraError::Forbidden(_)
    ));

    // Approve the elevation request
    let request = engine.submit(id, Role::Farmer, "doc-123").await.unwrap();
    engine
        .decide(request._id.unwrap(), Decision::Approve)
        .await
        .unwrap();

    // The same preset passes once the fresh read reflects the elevation,
    // even while the caller still holds a token minted as general
    let after = CallerContext {
        claims: Some(claims_for(id, "alice@farm.example", Role::General)),
        account: store.get(id).await.unwrap(),
    };
    assert!(farmer_chain.evaluate(&after).is_ok());
}

#[tokio::test]
async fn test_anonymous_caller_fails_every_preset() {
    let ctx = CallerContext::anonymous();

    for preset in ["login", "farmer", "expert", "admin"] {
        let chain = GuardChain::preset(preset).expect("known preset");
        assert!(matches!(
            chain.evaluate(&ctx).unwrap_err(),
            AgoraError::Unauthorized(_)
        ));
    }
}

#[tokio::test]
async fn test_expert_preset_requires_platform_verification() {
    let (_engine, store) = engine_with_store();
    let id = seed_account(&store, "carol@farm.example").await;

    // Role set but verified flag missing: chain stops at the verified guard
    {
        let mut account = store.get(id).await.unwrap().unwrap();
        account.role = Role::Expert;
        account.verified = false;
        store.insert(account).await.unwrap();
    }

    let ctx = CallerContext {
        claims: Some(claims_for(id, "carol@farm.example", Role::Expert)),
        account: store.get(id).await.unwrap(),
    };

    assert!(matches!(
        GuardChain::expert().evaluate(&ctx).unwrap_err(),
        AgoraError::Forbidden(_)
    ));
}
