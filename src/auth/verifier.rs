use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;
use tracing::debug;

use super::keys::KeyCache;
use crate::error::AuthError;

/// Default clock skew tolerated on `exp`/`nbf`, in seconds.
pub const DEFAULT_LEEWAY_SECS: u64 = 30;

/// Stable identity extracted from a verified token (`sub` claim).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject(String);

impl Subject {
    pub fn new(sub: impl Into<String>) -> Self {
        Self(sub.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a token must satisfy besides a valid signature.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub issuer: String,
    pub audience: String,
    pub algorithm: Algorithm,
    pub leeway_secs: u64,
}

impl AuthSettings {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, algorithm: Algorithm) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            algorithm,
            leeway_secs: DEFAULT_LEEWAY_SECS,
        }
    }

    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Verifies bearer tokens against the issuer's cached signing keys.
pub struct TokenVerifier {
    keys: KeyCache,
    algorithm: Algorithm,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(keys: KeyCache, settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(settings.algorithm);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        validation.leeway = settings.leeway_secs;

        Self {
            keys,
            algorithm: settings.algorithm,
            validation,
        }
    }

    /// Verify a raw token and return its subject.
    pub async fn verify(&self, token: &str) -> Result<Subject, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;

        // Checked before key lookup so a forged header cannot force a refresh.
        if header.alg != self.algorithm {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let key = self.keys.key_for(header.kid.as_deref()).await?;

        let data = decode::<Claims>(token, &key, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            classify_jwt_error(e.kind())
        })?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::Invalid("empty subject".to_string()));
        }

        Ok(Subject::new(data.claims.sub))
    }
}

fn classify_jwt_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm("mismatch".to_string()),
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::MalformedToken(format!("{:?}", kind)),
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::Invalid(format!("missing claim: {}", claim))
        }
        other => AuthError::Invalid(format!("{:?}", other)),
    }
}
