//! HMAC-signed JWT validation and issuance via `jsonwebtoken`.

use std::collections::HashSet;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::domain::Claims;
use crate::error::{ConfigError, TokenError};
use crate::infrastructure::config::AuthConfig;
use crate::port::{TokenIssuer, TokenValidator};

/// Validates and issues HS256/HS384/HS512 credentials with one secret.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    required_claims: Vec<String>,
    leeway_secs: u64,
    audience: Option<String>,
}

impl JwtAuthenticator {
    /// # Errors
    ///
    /// Returns an error if `secret` is empty or `algorithm` is not an HMAC
    /// algorithm.
    pub fn new(
        secret: &str,
        algorithm: &str,
        required_claims: Vec<String>,
        leeway_secs: u64,
    ) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingField {
                field: "auth.jwt_secret",
            });
        }
        let algorithm = match algorithm {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "algorithm",
                    reason: format!("unsupported algorithm {other}"),
                })
            }
        };
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            required_claims,
            leeway_secs,
            audience: None,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let jwt = Self::new(
            &config.jwt_secret,
            &config.algorithm,
            config.required_claims.clone(),
            config.leeway_secs,
        )?;
        Ok(match &config.audience {
            Some(audience) => jwt.with_audience(audience.clone()),
            None => jwt,
        })
    }

    /// Only accept credentials whose `aud` claim names `audience`.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    fn decode(&self, credential: &str, check_expiry: bool) -> Result<Claims, TokenError> {
        if credential.is_empty() {
            return Err(TokenError::Empty);
        }
        let segments = credential.split('.').count();
        if segments != 3 {
            return Err(TokenError::Malformed(format!(
                "expected 3 segments, found {segments}"
            )));
        }

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.leeway_secs;
        validation.validate_exp = check_expiry;
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        // Presence of required claims is checked below so that it is
        // reported as missing claims rather than a decode error.
        validation.required_spec_claims = HashSet::new();

        let claims = decode::<Claims>(credential, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| map_error(e.kind()))?;

        let missing = claims.missing(&self.required_claims);
        if !missing.is_empty() {
            return Err(TokenError::MissingClaims(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }
        Ok(claims)
    }
}

fn map_error(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::BadSignature,
        ErrorKind::InvalidAudience => TokenError::WrongAudience,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => TokenError::Malformed(format!("{kind:?}")),
        ErrorKind::MissingRequiredClaim(claim) => TokenError::MissingClaims(vec![claim.clone()]),
        other => TokenError::Rejected(format!("{other:?}")),
    }
}

impl TokenValidator for JwtAuthenticator {
    fn validate(&self, credential: &str) -> Result<Claims, TokenError> {
        self.decode(credential, true)
    }

    fn decode_ignoring_expiry(&self, credential: &str) -> Result<Claims, TokenError> {
        self.decode(credential, false)
    }
}

impl TokenIssuer for JwtAuthenticator {
    fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding)
            .map_err(|e| TokenError::Issue(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::token;
    use tokio_test::assert_ok;

    #[test]
    fn valid_credential_yields_claims() {
        let jwt = token::authenticator();
        let claims = assert_ok!(jwt.validate(&token::valid("alice")));
        assert_eq!(claims.sub, "alice");
    }

    #[test]
    fn failures_are_classified() {
        let jwt = token::authenticator();

        assert_eq!(jwt.validate(""), Err(TokenError::Empty));
        assert!(matches!(jwt.validate("abc.def"), Err(TokenError::Malformed(_))));
        assert!(matches!(jwt.validate("a.b.c"), Err(TokenError::Malformed(_))));
        assert_eq!(jwt.validate(&token::expired("alice")), Err(TokenError::Expired));

        let forged = token::sign_with("other-secret", &token::claims("alice", 3600));
        assert_eq!(jwt.validate(&forged), Err(TokenError::BadSignature));

        let mut claims = token::claims("", 3600);
        claims.sub = String::new();
        assert_eq!(
            jwt.validate(&token::sign(&claims)),
            Err(TokenError::MissingClaims(vec!["sub".to_string()]))
        );
    }

    #[test]
    fn expired_credential_decodes_when_expiry_ignored() {
        let jwt = token::authenticator();
        let claims = assert_ok!(jwt.decode_ignoring_expiry(&token::expired("alice")));
        assert_eq!(claims.sub, "alice");

        let forged = token::sign_with("other-secret", &token::claims("alice", -3600));
        assert_eq!(
            jwt.decode_ignoring_expiry(&forged),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn issued_credentials_validate() {
        let jwt = token::authenticator();
        let mut claims = token::claims("bob", 600);
        claims.refreshed = true;
        claims.original_iat = Some(42);

        let issued = jwt.issue(&claims).unwrap();
        let decoded = jwt.validate(&issued).unwrap();
        assert!(decoded.refreshed);
        assert_eq!(decoded.original_iat, Some(42));
    }

    fn with_audience(sub: &str, aud: &str) -> String {
        let mut claims = token::claims(sub, 3600);
        claims
            .extra
            .insert("aud".to_string(), serde_json::json!(aud));
        token::sign(&claims)
    }

    #[test]
    fn audience_is_ignored_unless_configured() {
        let jwt = token::authenticator();
        let claims = assert_ok!(jwt.validate(&with_audience("alice", "authenticated")));
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.extra["aud"], serde_json::json!("authenticated"));
    }

    #[test]
    fn configured_audience_must_match() {
        let jwt = JwtAuthenticator::new(token::SECRET, "HS256", vec!["sub".into()], 0)
            .unwrap()
            .with_audience("authenticated");

        assert_ok!(jwt.validate(&with_audience("alice", "authenticated")));
        assert_eq!(
            jwt.validate(&with_audience("alice", "service_role")),
            Err(TokenError::WrongAudience)
        );
    }

    #[test]
    fn audience_comes_from_config() {
        let config = AuthConfig {
            jwt_secret: token::SECRET.to_string(),
            audience: Some("authenticated".to_string()),
            ..AuthConfig::default()
        };
        let jwt = JwtAuthenticator::from_config(&config).unwrap();
        assert_eq!(
            jwt.validate(&with_audience("alice", "anon")),
            Err(TokenError::WrongAudience)
        );
    }

    #[test]
    fn rejects_empty_secret_and_unknown_algorithm() {
        assert!(JwtAuthenticator::new("", "HS256", Vec::new(), 0).is_err());
        assert!(JwtAuthenticator::new("s", "RS256", Vec::new(), 0).is_err());
    }
}
