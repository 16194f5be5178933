//! Session verification consumed by connection authorization.
//!
//! The gateway never issues credentials. It hands the token a client
//! presents to a [`SessionVerifier`] and trusts whatever principal comes
//! back. [`JwtSessionVerifier`] is the stock implementation.

pub mod jwt;

pub use jwt::JwtSessionVerifier;

use async_trait::async_trait;

/// Identity of an authenticated client.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    /// Stable subject identifier.
    pub id: String,
    /// Display/login name, if the issuer provides one.
    pub name: Option<String>,
    /// Full claim set, opaque to the gateway.
    pub claims: serde_json::Value,
}

impl Principal {
    /// Name used in logs: the login name if present, otherwise the id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Verifies access tokens.
///
/// Must be safe to call concurrently from many connections.
#[async_trait]
pub trait SessionVerifier: Send + Sync + std::fmt::Debug {
    /// Returns the principal the token belongs to, or `None` if the token
    /// is unknown, expired or otherwise invalid.
    async fn verify(&self, token: &str) -> Option<Principal>;
}
