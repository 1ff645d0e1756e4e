use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use super::AppState;
use crate::error::Error;
use crate::identity::Identity;
use crate::models::*;

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Maps a store error to a response. Not-found, permission, conflict and
/// validation errors are safe to show; storage failures are logged in full
/// and reported to the client as a generic internal error.
fn error_response(e: Error) -> (StatusCode, String) {
    let status = match &e {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::PermissionDenied => StatusCode::FORBIDDEN,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Persistence(_) | Error::IdentityAssertion { .. } => {
            tracing::error!("Internal error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
    };
    tracing::debug!(status = status.as_u16(), "Request rejected: {}", e);
    (status, e.to_string())
}

/// Runs blocking store work off the async runtime.
async fn run<T, F>(state: &AppState, work: F) -> ApiResult<T>
where
    F: FnOnce(&AppState) -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| {
            tracing::error!("Store task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        })?
        .map_err(error_response)
}

/// Loads a flag after checking the caller may change it.
fn writable_flag(state: &AppState, identity: &Identity, flag_id: Uuid) -> crate::Result<FeatureFlag> {
    let flag = state.flags.find_by_id(flag_id)?;
    state.gate.authorize_write(identity, flag.organization_id)?;
    Ok(flag)
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Organizations
// ============================================================

pub async fn create_organization(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(input): Json<CreateOrganizationInput>,
) -> ApiResult<(StatusCode, Json<Organization>)> {
    run(&state, move |s| {
        let mut organization = Organization::new(input.name, identity.user_id);
        s.organizations.create(&mut organization)?;
        Ok(organization)
    })
    .await
    .map(|o| (StatusCode::CREATED, Json(o)))
}

pub async fn get_organization(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Organization>> {
    run(&state, move |s| {
        s.gate.authorize_read(&identity, id)?;
        s.organizations.find_by_id(id)
    })
    .await
    .map(Json)
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(input): Json<AddMemberInput>,
) -> ApiResult<(StatusCode, Json<Organization>)> {
    run(&state, move |s| {
        s.gate.authorize_admin(&identity, id)?;
        s.organizations
            .add_member(id, input.user_id, input.permission_level)
    })
    .await
    .map(|o| (StatusCode::CREATED, Json(o)))
}

pub async fn set_member_permission(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<SetPermissionInput>,
) -> ApiResult<Json<Organization>> {
    run(&state, move |s| {
        s.gate.authorize_admin(&identity, id)?;
        s.organizations
            .set_member_permission(id, user_id, input.permission_level)
    })
    .await
    .map(Json)
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Organization>> {
    run(&state, move |s| {
        s.gate.authorize_admin(&identity, id)?;
        s.organizations.remove_member(id, user_id)
    })
    .await
    .map(Json)
}

pub async fn create_invite(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(input): Json<InviteInput>,
) -> ApiResult<(StatusCode, Json<Organization>)> {
    run(&state, move |s| {
        s.gate.authorize_admin(&identity, id)?;
        s.organizations.invite(id, &input.email)
    })
    .await
    .map(|o| (StatusCode::CREATED, Json(o)))
}

pub async fn cancel_invite(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(input): Json<InviteInput>,
) -> ApiResult<Json<Organization>> {
    run(&state, move |s| {
        s.gate.authorize_admin(&identity, id)?;
        s.organizations.cancel_invite(id, &input.email)
    })
    .await
    .map(Json)
}

// ============================================================
// Feature Flags
// ============================================================

pub async fn list_flags(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<FeatureFlag>>> {
    run(&state, move |s| {
        s.gate.authorize_read(&identity, id)?;
        s.flags.find_many(id)
    })
    .await
    .map(Json)
}

pub async fn create_flag(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateFlagInput>,
) -> ApiResult<(StatusCode, Json<FeatureFlag>)> {
    run(&state, move |s| {
        s.gate.authorize_write(&identity, id)?;
        let mut flag = FeatureFlag::new(
            id,
            identity.user_id,
            input.name,
            input.flag_type,
            input.default_value,
            input.rules,
        );
        s.flags.create(&mut flag)?;
        Ok(flag)
    })
    .await
    .map(|f| (StatusCode::CREATED, Json(f)))
}

pub async fn get_flag(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FeatureFlag>> {
    run(&state, move |s| {
        let flag = s.flags.find_by_id(id)?;
        s.gate.authorize_read(&identity, flag.organization_id)?;
        Ok(flag)
    })
    .await
    .map(Json)
}

pub async fn rename_flag(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(input): Json<RenameFlagInput>,
) -> ApiResult<Json<FeatureFlag>> {
    run(&state, move |s| {
        writable_flag(s, &identity, id)?;
        s.flags.rename(id, &input.name)
    })
    .await
    .map(Json)
}

// ============================================================
// Revisions
// ============================================================

pub async fn create_revision(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateRevisionInput>,
) -> ApiResult<(StatusCode, Json<FeatureFlag>)> {
    run(&state, move |s| {
        writable_flag(s, &identity, id)?;
        let revision = Revision::new(identity.user_id, input.default_value, input.rules);
        s.flags.append_revision(id, revision)
    })
    .await
    .map(|f| (StatusCode::CREATED, Json(f)))
}

pub async fn update_revision(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, revision_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateRevisionInput>,
) -> ApiResult<Json<FeatureFlag>> {
    run(&state, move |s| {
        writable_flag(s, &identity, id)?;
        s.flags.edit_draft(id, revision_id, &input)
    })
    .await
    .map(Json)
}

pub async fn promote_revision(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, revision_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<FeatureFlag>> {
    run(&state, move |s| {
        writable_flag(s, &identity, id)?;
        s.flags.promote_revision(id, revision_id)
    })
    .await
    .map(Json)
}

pub async fn archive_revision(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, revision_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<FeatureFlag>> {
    run(&state, move |s| {
        writable_flag(s, &identity, id)?;
        s.flags.archive_revision(id, revision_id)
    })
    .await
    .map(Json)
}
