//! Identity provider boundary.
//!
//! The engine consumes an external identity/session provider and treats
//! authentication as a boolean plus an owner identifier — nothing else.
//! The provider's own protocol (OAuth popups, token refresh) stays on the
//! other side of this trait.

use crate::error::IdentityError;
use crate::record::OwnerId;

/// External identity/session provider.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Attempt to sign in, yielding the owner identifier on success.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::SignInFailed`] if the provider rejects or
    /// cannot complete the attempt.
    async fn sign_in(&self) -> Result<OwnerId, IdentityError>;

    /// End the provider session. Infallible by contract — local session
    /// teardown must not be blocked by a flaky provider.
    async fn sign_out(&self);
}

/// Provider double that always signs in as a fixed owner. For tests.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    owner: OwnerId,
}

impl StaticIdentity {
    /// Create a provider that signs in as `owner`.
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: OwnerId::new(owner),
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StaticIdentity {
    async fn sign_in(&self) -> Result<OwnerId, IdentityError> {
        Ok(self.owner.clone())
    }

    async fn sign_out(&self) {}
}

/// Provider double that always rejects sign-in. For tests.
#[derive(Debug, Clone, Default)]
pub struct RejectingIdentity;

#[async_trait::async_trait]
impl IdentityProvider for RejectingIdentity {
    async fn sign_in(&self) -> Result<OwnerId, IdentityError> {
        Err(IdentityError::SignInFailed {
            reason: "provider rejected the credentials".to_owned(),
        })
    }

    async fn sign_out(&self) {}
}
