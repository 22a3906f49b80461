//! Authorization guard chain
//!
//! Every sensitive operation is gated by an ordered list of independent
//! predicate guards evaluated against the caller before the handler runs.
//! Evaluation is left-to-right and short-circuits on the first failure, so
//! a failed guard means no later guard runs and no handler side effect
//! occurs.
//!
//! Guards are pure predicates over (validated claims, fresh account
//! snapshot). The snapshot is loaded from the Account Store at context
//! resolution time, never cached, so a role elevation approved moments
//! earlier is visible to the very next request.

use std::str::FromStr;

use bson::oid::ObjectId;
use tracing::debug;

use crate::auth::{extract_token_from_header, Claims, JwtValidator, Role};
use crate::db::schemas::AccountDoc;
use crate::types::{AgoraError, Result};
use crate::verify::AccountStore;

/// The caller's identity and current account state, resolved once per
/// request before guard evaluation.
#[derive(Debug, Default)]
pub struct CallerContext {
    /// Validated, non-expired JWT claims. None when no valid credential
    /// was presented.
    pub claims: Option<Claims>,
    /// Fresh account snapshot for the claims subject. None when the
    /// caller is anonymous or the account no longer exists.
    pub account: Option<AccountDoc>,
}

impl CallerContext {
    /// Anonymous caller (no credential)
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Resolve the caller from an Authorization header: validate the token
    /// and load the account fresh from the store.
    ///
    /// An invalid or missing token yields an anonymous context rather than
    /// an error; the `Authenticated` guard turns that into Unauthorized.
    pub async fn resolve(
        auth_header: Option<&str>,
        jwt: &JwtValidator,
        accounts: &dyn AccountStore,
    ) -> Result<Self> {
        let token = match extract_token_from_header(auth_header) {
            Some(t) => t,
            None => return Ok(Self::anonymous()),
        };

        let validation = jwt.verify_token(token);
        let claims = match validation.claims {
            Some(c) if validation.valid => c,
            _ => return Ok(Self::anonymous()),
        };

        let account = match ObjectId::from_str(&claims.sub) {
            Ok(oid) => accounts.get(oid).await?,
            Err(_) => None,
        };

        Ok(Self {
            claims: Some(claims),
            account,
        })
    }
}

/// A single access predicate
pub trait Guard: Send + Sync {
    /// Guard name for logging and failure messages
    fn name(&self) -> &'static str;

    /// Evaluate against the caller. Must not mutate any state.
    fn evaluate(&self, ctx: &CallerContext) -> Result<()>;
}

/// Caller carries a valid, non-expired credential
pub struct Authenticated;

impl Guard for Authenticated {
    fn name(&self) -> &'static str {
        "authenticated"
    }

    fn evaluate(&self, ctx: &CallerContext) -> Result<()> {
        if ctx.claims.is_some() {
            Ok(())
        } else {
            Err(AgoraError::Unauthorized("login required".into()))
        }
    }
}

/// Caller's current account role is one of the allowed roles
pub struct HasRole(pub &'static [Role]);

impl Guard for HasRole {
    fn name(&self) -> &'static str {
        "has-role"
    }

    fn evaluate(&self, ctx: &CallerContext) -> Result<()> {
        let account = ctx
            .account
            .as_ref()
            .ok_or_else(|| AgoraError::Forbidden("account no longer exists".into()))?;

        if self.0.contains(&account.role) {
            Ok(())
        } else {
            Err(AgoraError::Forbidden(format!(
                "role {} is not permitted for this operation",
                account.role
            )))
        }
    }
}

/// Caller's account has passed platform verification
pub struct PlatformVerified;

impl Guard for PlatformVerified {
    fn name(&self) -> &'static str {
        "platform-verified"
    }

    fn evaluate(&self, ctx: &CallerContext) -> Result<()> {
        let account = ctx
            .account
            .as_ref()
            .ok_or_else(|| AgoraError::Forbidden("account no longer exists".into()))?;

        if account.verified {
            Ok(())
        } else {
            Err(AgoraError::Forbidden(
                "account is not platform verified".into(),
            ))
        }
    }
}

/// An ordered chain of guards evaluated with short-circuit semantics
pub struct GuardChain {
    guards: Vec<Box<dyn Guard>>,
}

impl GuardChain {
    pub fn new(guards: Vec<Box<dyn Guard>>) -> Self {
        Self { guards }
    }

    /// Evaluate all guards in order; the first failure wins.
    pub fn evaluate(&self, ctx: &CallerContext) -> Result<()> {
        for guard in &self.guards {
            if let Err(e) = guard.evaluate(ctx) {
                debug!("Guard '{}' rejected caller: {}", guard.name(), e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Authenticated caller, any role
    pub fn login() -> Self {
        Self::new(vec![Box::new(Authenticated)])
    }

    /// Verified farmer (delete own listings)
    pub fn farmer() -> Self {
        Self::new(vec![
            Box::new(Authenticated),
            Box::new(HasRole(&[Role::Farmer])),
            Box::new(PlatformVerified),
        ])
    }

    /// Verified expert (verify/unverify listings)
    pub fn expert() -> Self {
        Self::new(vec![
            Box::new(Authenticated),
            Box::new(HasRole(&[Role::Expert])),
            Box::new(PlatformVerified),
        ])
    }

    /// Platform administrator
    pub fn admin() -> Self {
        Self::new(vec![Box::new(Authenticated), Box::new(HasRole(&[Role::Admin]))])
    }

    /// Look up a named preset. Unknown names return None (blocked).
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "login" => Some(Self::login()),
            "farmer" => Some(Self::farmer()),
            "expert" => Some(Self::expert()),
            "admin" => Some(Self::admin()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::Claims;

    fn claims_for(role: Role) -> Claims {
        Claims {
            sub: ObjectId::new().to_hex(),
            identifier: "test@example.com".into(),
            role,
            iat: 0,
            exp: u64::MAX,
        }
    }

    fn account_with(role: Role, verified: bool) -> AccountDoc {
        let mut account = AccountDoc::new("test@example.com".into(), "hash".into());
        account._id = Some(ObjectId::new());
        account.role = role;
        account.verified = verified;
        account
    }

    fn context(role: Role, verified: bool) -> CallerContext {
        CallerContext {
            claims: Some(claims_for(role)),
            account: Some(account_with(role, verified)),
        }
    }

    #[test]
    fn test_anonymous_fails_authenticated() {
        let ctx = CallerContext::anonymous();
        let err = GuardChain::admin().evaluate(&ctx).unwrap_err();
        assert!(matches!(err, AgoraError::Unauthorized(_)));
    }

    #[test]
    fn test_non_admin_is_forbidden() {
        let ctx = context(Role::General, false);
        let err = GuardChain::admin().evaluate(&ctx).unwrap_err();
        assert!(matches!(err, AgoraError::Forbidden(_)));
    }

    #[test]
    fn test_admin_passes() {
        let ctx = context(Role::Admin, false);
        assert!(GuardChain::admin().evaluate(&ctx).is_ok());
    }

    #[test]
    fn test_short_circuit_on_first_failure() {
        // A guard that panics if reached; Authenticated must fail first.
        struct Unreachable;
        impl Guard for Unreachable {
            fn name(&self) -> &'static str {
                "unreachable"
            }
            fn evaluate(&self, _: &CallerContext) -> Result<()> {
                panic!("later guard evaluated after a failure");
            }
        }

        let chain = GuardChain::new(vec![Box::new(Authenticated), Box::new(Unreachable)]);
        let err = chain.evaluate(&CallerContext::anonymous()).unwrap_err();
        assert!(matches!(err, AgoraError::Unauthorized(_)));
    }

    #[test]
    fn test_unverified_farmer_fails_preset() {
        let ctx = context(Role::Farmer, false);
        let err = GuardChain::farmer().evaluate(&ctx).unwrap_err();
        assert!(matches!(err, AgoraError::Forbidden(_)));
    }

    #[test]
    fn test_verified_farmer_passes_preset() {
        let ctx = context(Role::Farmer, true);
        assert!(GuardChain::farmer().evaluate(&ctx).is_ok());
    }

    #[test]
    fn test_stale_account_is_forbidden() {
        // Valid claims but the account was deleted between token issue
        // and this request.
        let ctx = CallerContext {
            claims: Some(claims_for(Role::Farmer)),
            account: None,
        };
        let err = GuardChain::farmer().evaluate(&ctx).unwrap_err();
        assert!(matches!(err, AgoraError::Forbidden(_)));
    }

    #[test]
    fn test_preset_lookup() {
        assert!(GuardChain::preset("admin").is_some());
        assert!(GuardChain::preset("farmer").is_some());
        assert!(GuardChain::preset("expert").is_some());
        assert!(GuardChain::preset("login").is_some());
        assert!(GuardChain::preset("root").is_none());
    }
}
