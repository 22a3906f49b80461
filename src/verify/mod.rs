//! Role-verification workflow
//!
//! Users request elevation to a privileged role with a supporting
//! document; administrators review and decide; approval promotes the
//! requester's account. See `engine` for the state machine and `store`
//! for the persistence seams.

pub mod engine;
pub mod memory;
pub mod store;

pub use engine::{Decision, WorkflowEngine};
pub use memory::MemoryStore;
pub use store::{AccountStore, MongoAccountStore, MongoRequestLedger, RequestLedger};
