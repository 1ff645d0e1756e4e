//! Bearer-token authentication for the API.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::identity::Authenticator;

/// Resolves the caller's identity from `Authorization: Bearer <token>` and
/// stores it as a request extension for handlers.
pub async fn auth_middleware(
    State(authenticator): State<Arc<dyn Authenticator>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) => match header.strip_prefix("Bearer ") {
            Some(token) => token.trim(),
            None => {
                tracing::warn!("Invalid Authorization header format");
                return Err(StatusCode::UNAUTHORIZED);
            }
        },
        None => {
            tracing::warn!("Missing Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    match authenticator.authenticate(token) {
        Some(identity) => {
            tracing::debug!(user_id = %identity.user_id, "Request authenticated");
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!("Unknown bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
