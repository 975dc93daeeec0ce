use crate::auth::AuthUser;
use crate::axum_http::error_responses::error_response;
use crate::config::config_model::PayPal as PayPalConfig;
use crate::usecases::{
    automated_billing::AutomatedBillingUseCase, manual_transfer::ManualTransferUseCase,
    subscriptions::SubscriptionQueryUseCase,
};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use crates::{
    domain::{
        repositories::{
            payments::PaymentRepository, profiles::ProfileRepository,
            subscriptions::SubscriptionRepository,
        },
        value_objects::subscriptions::{
            ActivateSubscriptionRequest, CreateCheckoutRequest, CreateCheckoutResponse,
            CreateManualSubscriptionRequest,
        },
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            payments::PaymentPostgres, profiles::ProfilePostgres,
            subscriptions::SubscriptionPostgres,
        },
    },
    payments::paypal_client::PayPalClient,
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

pub fn routes(db_pool: Arc<PgPoolSquad>, paypal: Arc<PayPalClient>, config: &PayPalConfig) -> Router {
    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let profile_repo = Arc::new(ProfilePostgres::new(Arc::clone(&db_pool)));
    let payment_repo = Arc::new(PaymentPostgres::new(Arc::clone(&db_pool)));

    let query_usecase = SubscriptionQueryUseCase::new(
        Arc::clone(&subscription_repo),
        Arc::clone(&profile_repo),
        Arc::clone(&payment_repo),
    );
    let manual_usecase =
        ManualTransferUseCase::new(Arc::clone(&subscription_repo), Arc::clone(&profile_repo));
    let automated_usecase = AutomatedBillingUseCase::new(
        subscription_repo,
        profile_repo,
        payment_repo,
        paypal,
        config.plan_monthly.clone(),
        config.plan_yearly.clone(),
    );

    let query_routes = Router::new()
        .route(
            "/current",
            get(current_entitlement::<SubscriptionPostgres, ProfilePostgres, PaymentPostgres>),
        )
        .route(
            "/payments",
            get(payment_history::<SubscriptionPostgres, ProfilePostgres, PaymentPostgres>),
        )
        .with_state(Arc::new(query_usecase));

    let manual_routes = Router::new()
        .route(
            "/manual",
            post(create_manual_subscription::<SubscriptionPostgres, ProfilePostgres>),
        )
        .route(
            "/manual/cancel",
            post(cancel_pending_manual::<SubscriptionPostgres, ProfilePostgres>),
        )
        .with_state(Arc::new(manual_usecase));

    let automated_routes = Router::new()
        .route(
            "/checkout",
            post(
                create_checkout::<SubscriptionPostgres, ProfilePostgres, PaymentPostgres, PayPalClient>,
            ),
        )
        .route(
            "/activate",
            post(
                activate_subscription::<SubscriptionPostgres, ProfilePostgres, PaymentPostgres, PayPalClient>,
            ),
        )
        .route(
            "/cancel",
            post(
                cancel_subscription::<SubscriptionPostgres, ProfilePostgres, PaymentPostgres, PayPalClient>,
            ),
        )
        .with_state(Arc::new(automated_usecase));

    query_routes.merge(manual_routes).merge(automated_routes)
}

pub async fn current_entitlement<S, Pr, Pay>(
    State(usecase): State<Arc<SubscriptionQueryUseCase<S, Pr, Pay>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
{
    match usecase.current_entitlement(user_id).await {
        Ok(current) => (StatusCode::OK, Json(current)).into_response(),
        Err(err) => {
            error!(error = %err, %user_id, "subscriptions: failed to load current entitlement");
            error_response(err.status_code(), err.to_string())
        }
    }
}

pub async fn payment_history<S, Pr, Pay>(
    State(usecase): State<Arc<SubscriptionQueryUseCase<S, Pr, Pay>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
{
    match usecase.payment_history(user_id).await {
        Ok(payments) => (StatusCode::OK, Json(payments)).into_response(),
        Err(err) => {
            error!(error = %err, %user_id, "subscriptions: failed to load payment history");
            error_response(err.status_code(), err.to_string())
        }
    }
}

pub async fn create_manual_subscription<S, Pr>(
    State(usecase): State<Arc<ManualTransferUseCase<S, Pr>>>,
    AuthUser { user_id, email }: AuthUser,
    Json(request): Json<CreateManualSubscriptionRequest>,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    match usecase
        .create_pending_subscription(user_id, email, request)
        .await
    {
        Ok(subscription) => (StatusCode::CREATED, Json(subscription)).into_response(),
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(error = %err, %user_id, "subscriptions: manual create failed");
            }
            error_response(status, err.to_string())
        }
    }
}

pub async fn cancel_pending_manual<S, Pr>(
    State(usecase): State<Arc<ManualTransferUseCase<S, Pr>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    match usecase.cancel_pending_subscription(user_id).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "canceled": true }))).into_response(),
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(error = %err, %user_id, "subscriptions: manual cancel failed");
            }
            error_response(status, err.to_string())
        }
    }
}

pub async fn create_checkout<S, Pr, Pay, G>(
    State(usecase): State<Arc<AutomatedBillingUseCase<S, Pr, Pay, G>>>,
    AuthUser { user_id, email }: AuthUser,
    Json(request): Json<CreateCheckoutRequest>,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: crate::usecases::automated_billing::PayPalGateway + Send + Sync + 'static,
{
    match usecase
        .create_subscription(user_id, email, &request.plan_type)
        .await
    {
        Ok(approval_url) => (
            StatusCode::CREATED,
            Json(CreateCheckoutResponse { approval_url }),
        )
            .into_response(),
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(error = %err, %user_id, "subscriptions: checkout creation failed");
            }
            error_response(status, err.to_string())
        }
    }
}

pub async fn activate_subscription<S, Pr, Pay, G>(
    State(usecase): State<Arc<AutomatedBillingUseCase<S, Pr, Pay, G>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(request): Json<ActivateSubscriptionRequest>,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: crate::usecases::automated_billing::PayPalGateway + Send + Sync + 'static,
{
    match usecase
        .activate_subscription(user_id, &request.provider_subscription_id)
        .await
    {
        Ok(status) => (StatusCode::OK, Json(json!({ "status": status }))).into_response(),
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(error = %err, %user_id, "subscriptions: activation failed");
            }
            error_response(status, err.to_string())
        }
    }
}

pub async fn cancel_subscription<S, Pr, Pay, G>(
    State(usecase): State<Arc<AutomatedBillingUseCase<S, Pr, Pay, G>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: crate::usecases::automated_billing::PayPalGateway + Send + Sync + 'static,
{
    match usecase.cancel_subscription(user_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "cancel_at_period_end": true })),
        )
            .into_response(),
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(error = %err, %user_id, "subscriptions: cancellation failed");
            }
            error_response(status, err.to_string())
        }
    }
}
