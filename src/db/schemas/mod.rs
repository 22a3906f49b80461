//! Database schemas for Agora
//!
//! Defines MongoDB document structures for accounts and verification
//! requests.

mod account;
mod metadata;
mod verify_request;

pub use account::{AccountDoc, ACCOUNT_COLLECTION};
pub use metadata::Metadata;
pub use verify_request::{RequestStatus, VerifyRequestDoc, VERIFY_REQUEST_COLLECTION};
