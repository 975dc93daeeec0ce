#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub supabase: Supabase,
    pub paypal: PayPal,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Supabase {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct PayPal {
    pub api_base: String,
    pub client_id: String,
    pub client_secret: String,
    pub plan_monthly: String,
    pub plan_yearly: String,
    pub return_url: String,
    pub cancel_url: String,
    pub request_timeout_secs: u64,
}
