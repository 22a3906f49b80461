//! Authentication and authorization for Agora
//!
//! Provides:
//! - JWT token generation and validation
//! - The account role enumeration
//! - The guard chain gating sensitive operations
//! - Password hashing with Argon2

pub mod guard;
pub mod jwt;
pub mod password;
pub mod role;

pub use guard::{
    Authenticated, CallerContext, Guard, GuardChain, HasRole, PlatformVerified,
};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenValidationResult};
pub use password::{hash_password, verify_password};
pub use role::Role;
