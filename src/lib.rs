//! Agora - REST backend for the farm marketplace
//!
//! Accounts start as general users and earn privileged roles (farmer,
//! expert) through an admin-reviewed verification workflow. Sensitive
//! operations sit behind ordered guard chains evaluated against a fresh
//! account read on every request.
//!
//! ## Services
//!
//! - **Auth**: registration, login, JWT issue and verification
//! - **Guards**: composable authorization predicates over the caller
//! - **Verification**: role-elevation request lifecycle with atomic decisions

pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod types;
pub mod verify;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{AgoraError, Result};
