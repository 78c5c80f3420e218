//! Authorization boundary (spec §4.4): owner vs. privileged principal, as it
//! bears on correctness. AuthN mechanics (issuing tokens, rotating keys) are
//! out of scope; this module only verifies and decodes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use jsonwebtoken::{decode, DecodingKey, Validation};
use ledger_core::{Principal, Role};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    roles: Vec<String>,
}

/// Decodes a bearer token into a [`Principal`].
pub fn decode_principal(token: &str, secret: &str) -> Result<Principal, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    let roles = data
        .claims
        .roles
        .iter()
        .map(|r| match r.as_str() {
            "ADMIN" => Role::Admin,
            "INTERNAL_SERVICE" => Role::InternalService,
            _ => Role::Owner,
        })
        .collect::<Vec<_>>();
    Ok(Principal {
        name: data.claims.sub,
        roles: if roles.is_empty() { vec![Role::Owner] } else { roles },
    })
}

/// Shared JWT secret, injected into axum's extension layer so the extractor
/// below can reach it without a global.
#[derive(Clone)]
pub struct JwtSecret(pub String);

/// Extracts an authenticated [`Principal`] from the `Authorization: Bearer
/// <token>` header. Fails the request with 403 if the header is missing or
/// the token doesn't verify — per spec §4.4, authorization failures never
/// leak a 404 (to avoid account enumeration).
pub struct AuthenticatedPrincipal(pub Principal);

impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
    JwtSecret: axum::extract::FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let secret = JwtSecret::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::FORBIDDEN, "missing bearer token"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or((StatusCode::FORBIDDEN, "malformed authorization header"))?;
        let principal = decode_principal(token, &secret.0)
            .map_err(|_| (StatusCode::FORBIDDEN, "invalid bearer token"))?;
        Ok(AuthenticatedPrincipal(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, roles: &[&str], secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn decodes_owner_principal_with_default_role() {
        let token = token_for("alice", &[], "secret");
        let principal = decode_principal(&token, "secret").unwrap();
        assert_eq!(principal.name, "alice");
        assert!(!principal.is_privileged());
    }

    #[test]
    fn decodes_privileged_roles() {
        let token = token_for("ops", &["ADMIN"], "secret");
        let principal = decode_principal(&token, "secret").unwrap();
        assert!(principal.is_privileged());
    }

    #[test]
    fn rejects_token_signed_with_wrong_secret() {
        let token = token_for("alice", &[], "secret");
        assert!(decode_principal(&token, "other-secret").is_err());
    }
}
