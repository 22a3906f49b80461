//! Verification request document schema
//!
//! A transient record of one account's request to be elevated to a
//! privileged role. Many requests may reference the same account over
//! time; the account is the long-lived entity.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::auth::Role;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::AgoraError;

/// Collection name for verification requests
pub const VERIFY_REQUEST_COLLECTION: &str = "verify_requests";

/// Verification request status, stored as a lowercase string.
///
/// Transitions are monotonic: pending moves to exactly one terminal
/// state and a terminal request is never re-decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = AgoraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(AgoraError::InvalidInput(format!(
                "unknown request status: {other}"
            ))),
        }
    }
}

/// Verification request document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct VerifyRequestDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Account requesting elevation
    pub requester: ObjectId,

    /// Role being sought
    pub requested_role: Role,

    /// Opaque reference to the uploaded supporting document
    pub document_ref: String,

    /// Current workflow status
    #[serde(default)]
    pub status: RequestStatus,
}

impl VerifyRequestDoc {
    /// Create a new pending request
    pub fn new(requester: ObjectId, requested_role: Role, document_ref: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            requester,
            requested_role,
            document_ref,
            status: RequestStatus::Pending,
        }
    }
}

impl IntoIndexes for VerifyRequestDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Requester + status for the duplicate-pending check
            (
                doc! { "requester": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("requester_status_index".to_string())
                        .build(),
                ),
            ),
            // Status index for admin review queues
            (
                doc! { "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for VerifyRequestDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_normalizes_case() {
        assert_eq!(
            "APPROVED".parse::<RequestStatus>().unwrap(),
            RequestStatus::Approved
        );
        assert_eq!(
            "Pending".parse::<RequestStatus>().unwrap(),
            RequestStatus::Pending
        );
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert!("banana".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_new_request_is_pending() {
        let req = VerifyRequestDoc::new(ObjectId::new(), Role::Farmer, "doc1".into());
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.requested_role, Role::Farmer);
    }
}
