//! Account document schema
//!
//! Stores marketplace user credentials, current role, and the platform
//! verification flag. The role and flag are mutated only by the
//! verification workflow on approval (an administrator's direct edit is
//! an accepted escape hatch outside this flow).

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for accounts
pub const ACCOUNT_COLLECTION: &str = "accounts";

/// Account document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AccountDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// User identifier (email or username)
    pub identifier: String,

    /// Argon2 password hash
    pub password_hash: String,

    /// Current role, stored as a lowercase string
    #[serde(default)]
    pub role: Role,

    /// True only once an elevation request for this account was approved.
    /// Invariant: verified implies role != general.
    #[serde(default)]
    pub verified: bool,
}

impl AccountDoc {
    /// Create a new account document with the starting role
    pub fn new(identifier: String, password_hash: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            identifier,
            password_hash,
            role: Role::General,
            verified: false,
        }
    }
}

impl IntoIndexes for AccountDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on identifier
            (
                doc! { "identifier": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("identifier_unique".to_string())
                        .build(),
                ),
            ),
            // Index on role for admin listings
            (
                doc! { "role": 1 },
                Some(IndexOptions::builder().name("role_index".to_string()).build()),
            ),
        ]
    }
}

impl MutMetadata for AccountDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
