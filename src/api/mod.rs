mod handlers;
mod middleware;

pub use middleware::auth_middleware;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::access::AccessGate;
use crate::config::Config;
use crate::db::DocumentStore;
use crate::identity::Authenticator;
use crate::store::{FeatureFlagStore, OrganizationStore};

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub organizations: OrganizationStore,
    pub flags: FeatureFlagStore,
    pub gate: AccessGate,
}

impl AppState {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        let organizations = OrganizationStore::new(db.clone());
        Self {
            gate: AccessGate::new(organizations.clone()),
            organizations,
            flags: FeatureFlagStore::new(db),
        }
    }
}

pub fn create_router(db: Arc<dyn DocumentStore>, config: &Config) -> Router {
    let authenticator: Arc<dyn Authenticator> = Arc::new(config.tokens.clone());

    let protected = Router::new()
        // Organizations
        .route("/organizations", post(handlers::create_organization))
        .route("/organizations/{id}", get(handlers::get_organization))
        .route("/organizations/{id}/members", post(handlers::add_member))
        .route(
            "/organizations/{id}/members/{user_id}",
            put(handlers::set_member_permission).delete(handlers::remove_member),
        )
        .route("/organizations/{id}/invites", post(handlers::create_invite))
        .route("/organizations/{id}/invites/cancel", post(handlers::cancel_invite))
        // Flags
        .route(
            "/organizations/{id}/flags",
            get(handlers::list_flags).post(handlers::create_flag),
        )
        .route("/flags/{id}", get(handlers::get_flag).put(handlers::rename_flag))
        .route("/flags/{id}/revisions", post(handlers::create_revision))
        .route("/flags/{id}/revisions/{revision_id}", put(handlers::update_revision))
        .route(
            "/flags/{id}/revisions/{revision_id}/promote",
            post(handlers::promote_revision),
        )
        .route(
            "/flags/{id}/revisions/{revision_id}/archive",
            post(handlers::archive_revision),
        )
        .layer(from_fn_with_state(authenticator, auth_middleware));

    let api = Router::new()
        .merge(protected)
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.fetch_timeout,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(AppState::new(db))
}
