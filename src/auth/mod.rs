//! Bearer token verification.
//!
//! The gate has two parts:
//!
//! - [`KeyCache`] holds the issuer's signing keys, fetched from a
//!   [`KeySource`] (normally the issuer's JWKS endpoint) and refreshed on
//!   TTL expiry or on an unknown `kid`.
//! - [`TokenVerifier`] checks signature, expiry, audience and issuer, and
//!   yields the token's [`Subject`].
//!
//! No authorization happens here: any valid subject may use any endpoint.

mod keys;
mod verifier;

pub use keys::{
    jwks_url_for_issuer, keys_from_jwks, JwksKeySource, KeyCache, KeySource, StaticKeySource,
    VerificationKey, DEFAULT_FETCH_ATTEMPTS, DEFAULT_FETCH_TIMEOUT, DEFAULT_KEY_CACHE_TTL,
    DEFAULT_MIN_REFRESH_INTERVAL,
};
pub use verifier::{AuthSettings, Subject, TokenVerifier, DEFAULT_LEEWAY_SECS};
