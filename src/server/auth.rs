//! Bearer token middleware.
//!
//! Two pipeline stages are provided:
//!
//! - [`require_auth`] rejects the request unless it carries a valid token.
//! - [`optional_auth`] lets requests without an `Authorization` header through
//!   anonymously, but still rejects a header that does not verify.
//!
//! On success the verified [`Subject`] is stored in the request extensions,
//! where handlers pick it up with the [`Subject`] or [`OptionalSubject`]
//! extractors.
//!
//! # Example
//!
//! ```ignore
//! use axum::{middleware, routing::post, Router};
//! use task_gateway::server::auth::require_auth;
//!
//! let app = Router::new()
//!     .route("/upload", post(upload))
//!     .route_layer(middleware::from_fn_with_state(verifier, require_auth));
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::{Subject, TokenVerifier};
use crate::error::{AuthError, GatewayError};

const BEARER_SCHEME: &str = "bearer";

/// Extract the raw token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(AuthError::MalformedHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }

    Ok(token)
}

/// Reject requests without a valid bearer token.
pub async fn require_auth(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let token = bearer_token(request.headers())?.to_string();
    let subject = verifier.verify(&token).await?;

    debug!(user = %subject, "Request authenticated");
    request.extensions_mut().insert(subject);

    Ok(next.run(request).await)
}

/// Verify a bearer token if one is present; let anonymous requests through.
pub async fn optional_auth(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    if request.headers().contains_key(AUTHORIZATION) {
        let token = bearer_token(request.headers())?.to_string();
        let subject = verifier.verify(&token).await?;
        debug!(user = %subject, "Request authenticated");
        request.extensions_mut().insert(subject);
    }

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for Subject
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Subject>()
            .cloned()
            .ok_or(GatewayError::Auth(AuthError::MissingToken))
    }
}

/// The verified subject, if the auth stage attached one.
#[derive(Debug, Clone)]
pub struct OptionalSubject(pub Option<Subject>);

impl<S> FromRequestParts<S> for OptionalSubject
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalSubject(parts.extensions.get::<Subject>().cloned()))
    }
}
