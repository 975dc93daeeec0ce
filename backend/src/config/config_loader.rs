use anyhow::{Ok, Result};

use super::config_model::{BackendServer, Database, DotEnvyConfig, PayPal, Supabase};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = BackendServer {
        port: std::env::var("SERVER_PORT_BACKEND")
            .expect("SERVER_PORT_BACKEND is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let supabase = Supabase {
        jwt_secret: std::env::var("SUPABASE_JWT_SECRET").expect("SUPABASE_JWT_SECRET is invalid"),
    };

    let paypal = PayPal {
        api_base: std::env::var("PAYPAL_API_BASE")
            .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
        client_id: std::env::var("PAYPAL_CLIENT_ID").expect("PAYPAL_CLIENT_ID is invalid"),
        client_secret: std::env::var("PAYPAL_CLIENT_SECRET")
            .expect("PAYPAL_CLIENT_SECRET is invalid"),
        plan_monthly: std::env::var("PAYPAL_PLAN_MONTHLY").expect("PAYPAL_PLAN_MONTHLY is invalid"),
        plan_yearly: std::env::var("PAYPAL_PLAN_YEARLY").expect("PAYPAL_PLAN_YEARLY is invalid"),
        return_url: std::env::var("PAYPAL_RETURN_URL").expect("PAYPAL_RETURN_URL is invalid"),
        cancel_url: std::env::var("PAYPAL_CANCEL_URL").expect("PAYPAL_CANCEL_URL is invalid"),
        request_timeout_secs: std::env::var("PAYPAL_TIMEOUT_SECONDS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(10),
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        supabase,
        paypal,
    })
}

pub fn get_supabase_jwt_secret() -> Result<String> {
    dotenvy::dotenv().ok();

    Ok(std::env::var("SUPABASE_JWT_SECRET").expect("SUPABASE_JWT_SECRET is invalid"))
}
