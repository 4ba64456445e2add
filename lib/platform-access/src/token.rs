//! Bearer credentials for API clients.
//!
//! Tokens are HS256-signed JWTs carrying the user ID and an expiry. They are
//! not stored: verification is a signature and claims check. Several keys
//! can be configured to rotate secrets; the first one signs, all of them
//! verify.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use gatehouse_core::{TokenId, UserId};

/// Claims carried by a bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BearerClaims {
    /// User ID.
    sub: String,
    iat: i64,
    exp: i64,
    iss: String,
    jti: String,
}

/// A freshly issued bearer credential.
#[derive(Debug, Clone)]
pub struct BearerToken {
    /// The encoded JWT.
    pub access_token: String,
    pub token_id: TokenId,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies bearer credentials.
pub struct TokenIssuer {
    signing_key: EncodingKey,
    verification_keys: Vec<DecodingKey>,
    issuer: String,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .field("keys", &self.verification_keys.len())
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Creates an issuer from shared secrets. Blank secrets are ignored.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::NoSigningKeys` if no usable secret remains.
    pub fn new<S: AsRef<str>>(
        secrets: &[S],
        issuer: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, TokenError> {
        let secrets: Vec<&str> = secrets
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect();
        let first = secrets.first().ok_or(TokenError::NoSigningKeys)?;

        Ok(Self {
            signing_key: EncodingKey::from_secret(first.as_bytes()),
            verification_keys: secrets
                .iter()
                .map(|s| DecodingKey::from_secret(s.as_bytes()))
                .collect(),
            issuer: issuer.into(),
            ttl,
        })
    }

    /// Issues a token for `user_id`, valid from now for the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if encoding fails.
    pub fn issue(&self, user_id: UserId) -> Result<BearerToken, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    fn issue_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<BearerToken, TokenError> {
        let token_id = TokenId::new();
        let expires_at = now + self.ttl;
        let claims = BearerClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            jti: token_id.to_string(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.signing_key)
            .map_err(|e| TokenError::Signing {
                details: e.to_string(),
            })?;

        Ok(BearerToken {
            access_token,
            token_id,
            // Whole seconds, matching what the token itself says.
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }

    /// Verifies a token and returns the user it was issued to.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Expired` for a correctly signed but expired token
    /// and `TokenError::Invalid` for anything else that does not verify.
    pub fn verify(&self, token: &str) -> Result<UserId, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        for key in &self.verification_keys {
            match decode::<BearerClaims>(token, key, &validation) {
                Ok(data) => {
                    return data.claims.sub.parse().map_err(|e| TokenError::Invalid {
                        reason: format!("bad subject: {e}"),
                    });
                }
                // Signed with another configured key, or not ours at all.
                Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => continue,
                Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                    return Err(TokenError::Expired);
                }
                Err(e) => {
                    return Err(TokenError::Invalid {
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(TokenError::Invalid {
            reason: "signature does not match any configured key".to_string(),
        })
    }
}
