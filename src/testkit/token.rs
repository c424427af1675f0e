//! Credential builders signed with a fixed test secret.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};

use crate::adapter::outbound::jwt::JwtAuthenticator;
use crate::domain::Claims;

/// HMAC secret shared by every testkit credential and authenticator.
pub const SECRET: &str = "testkit-signing-secret";

/// Claims for `sub` expiring `ttl_secs` from now (negative for the past).
pub fn claims(sub: &str, ttl_secs: i64) -> Claims {
    let now = Utc::now().timestamp();
    Claims {
        sub: sub.to_string(),
        exp: now + ttl_secs,
        iat: now.min(now + ttl_secs) - 60,
        ..Claims::default()
    }
}

/// Sign `claims` with `secret` using HS256.
pub fn sign_with(secret: &str, claims: &Claims) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("test claims encode")
}

pub fn sign(claims: &Claims) -> String {
    sign_with(SECRET, claims)
}

/// Valid for an hour.
pub fn valid(sub: &str) -> String {
    sign(&claims(sub, 3600))
}

/// Expired an hour ago, otherwise well-formed and correctly signed.
pub fn expired(sub: &str) -> String {
    sign(&claims(sub, -3600))
}

/// Authenticator over [`SECRET`] requiring `sub` and `exp`.
pub fn authenticator() -> Arc<JwtAuthenticator> {
    Arc::new(
        JwtAuthenticator::new(SECRET, "HS256", vec!["sub".into(), "exp".into()], 0)
            .expect("testkit authenticator config is valid"),
    )
}
