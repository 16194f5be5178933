//! HS256 session tokens.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use super::{Principal, SessionVerifier};

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    login: Option<String>,
}

/// Verifies HMAC-SHA256 signed JWTs issued by the session service.
#[derive(Clone)]
pub struct JwtSessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtSessionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSessionVerifier")
            .field("issuer", &self.validation.iss)
            .finish_non_exhaustive()
    }
}

impl JwtSessionVerifier {
    /// Creates a verifier for tokens signed with `secret`. When `issuer`
    /// is set, tokens must carry a matching `iss` claim.
    #[must_use]
    pub fn new(secret: &[u8], issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

#[async_trait]
impl SessionVerifier for JwtSessionVerifier {
    async fn verify(&self, token: &str) -> Option<Principal> {
        let claims = match decode::<serde_json::Value>(token, &self.key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "session token rejected");
                return None;
            }
        };
        let session: SessionClaims = serde_json::from_value(claims.clone()).ok()?;
        if session.sub.trim().is_empty() {
            return None;
        }
        Some(Principal {
            id: session.sub,
            name: session.login.or(session.name),
            claims,
        })
    }
}
