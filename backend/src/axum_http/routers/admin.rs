use crate::auth::AuthUser;
use crate::axum_http::error_responses::error_response;
use crate::usecases::manual_transfer::ManualTransferUseCase;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use crates::{
    domain::{
        repositories::{profiles::ProfileRepository, subscriptions::SubscriptionRepository},
        value_objects::subscriptions::{PremiumOverrideRequest, VerifyManualSubscriptionRequest},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{profiles::ProfilePostgres, subscriptions::SubscriptionPostgres},
    },
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// Every handler here re-checks the admin capability inside the use case;
/// nothing about the caller's role is trusted from the token.
pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let profile_repo = Arc::new(ProfilePostgres::new(Arc::clone(&db_pool)));

    let manual_usecase = ManualTransferUseCase::new(subscription_repo, profile_repo);

    Router::new()
        .route(
            "/subscriptions/pending",
            get(list_pending::<SubscriptionPostgres, ProfilePostgres>),
        )
        .route(
            "/subscriptions/verify",
            post(verify_subscription::<SubscriptionPostgres, ProfilePostgres>),
        )
        .route(
            "/premium",
            post(override_premium::<SubscriptionPostgres, ProfilePostgres>),
        )
        .with_state(Arc::new(manual_usecase))
}

pub async fn list_pending<S, Pr>(
    State(usecase): State<Arc<ManualTransferUseCase<S, Pr>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    match usecase.list_pending_verifications(user_id).await {
        Ok(pending) => (StatusCode::OK, Json(pending)).into_response(),
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(error = %err, admin_id = %user_id, "admin: failed to list pending verifications");
            }
            error_response(status, err.to_string())
        }
    }
}

pub async fn verify_subscription<S, Pr>(
    State(usecase): State<Arc<ManualTransferUseCase<S, Pr>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(request): Json<VerifyManualSubscriptionRequest>,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    match usecase.verify_subscription(user_id, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(error = %err, admin_id = %user_id, "admin: verification failed");
            }
            error_response(status, err.to_string())
        }
    }
}

pub async fn override_premium<S, Pr>(
    State(usecase): State<Arc<ManualTransferUseCase<S, Pr>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(request): Json<PremiumOverrideRequest>,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    match usecase
        .override_premium(user_id, request.user_id, request.is_premium)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "applied": true }))).into_response(),
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(error = %err, admin_id = %user_id, "admin: premium override failed");
            }
            error_response(status, err.to_string())
        }
    }
}
