use crate::axum_http::error_responses::error_response;
use crate::usecases::billing_webhook::{BillingWebhookUseCase, WebhookError};
use axum::{
    Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post,
};
use crates::{
    domain::repositories::{profiles::ProfileRepository, subscriptions::SubscriptionRepository},
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{profiles::ProfilePostgres, subscriptions::SubscriptionPostgres},
    },
};
use std::sync::Arc;
use tracing::error;

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let profile_repo = Arc::new(ProfilePostgres::new(Arc::clone(&db_pool)));

    let webhook_usecase = BillingWebhookUseCase::new(subscription_repo, profile_repo);

    Router::new()
        .route(
            "/paypal",
            post(handle_paypal_webhook::<SubscriptionPostgres, ProfilePostgres>),
        )
        .with_state(Arc::new(webhook_usecase))
}

/// Webhook receiver. Only a malformed envelope earns a 400; every other
/// outcome is a 200 so the provider's retry policy stays quiet, with
/// internal failures kept in the logs for operator follow-up.
pub async fn handle_paypal_webhook<S, Pr>(
    State(usecase): State<Arc<BillingWebhookUseCase<S, Pr>>>,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    match usecase.handle_event(payload).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(WebhookError::InvalidEnvelope(message)) => {
            error_response(StatusCode::BAD_REQUEST, message)
        }
        Err(WebhookError::Internal(err)) => {
            error!(
                error = ?err,
                "billing_webhook: processing failed, acknowledging to avoid a retry storm"
            );
            StatusCode::OK.into_response()
        }
    }
}
