use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{error, info, warn};
use url::Url;

/// Minimal PayPal subscriptions client built on reqwest.
///
/// Every request carries a bounded timeout and is retried once on timeout,
/// connection failure, or a 5xx response; a request that still fails after
/// the retry surfaces as an error for the caller to map to a gateway fault.
pub struct PayPalClient {
    http: reqwest::Client,
    api_base: Url,
    client_id: String,
    client_secret: String,
    return_url: String,
    cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct CreatedSubscription {
    pub id: String,
    pub approval_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: String,
    pub billing_info: Option<ProviderBillingInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderBillingInfo {
    pub next_billing_time: Option<DateTime<Utc>>,
    pub last_payment: Option<ProviderLastPayment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderLastPayment {
    pub amount: Option<ProviderMoney>,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMoney {
    pub currency_code: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderLink {
    rel: Option<String>,
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayPalErrorEnvelope {
    name: Option<String>,
    message: Option<String>,
    debug_id: Option<String>,
}

fn approval_link(links: &[ProviderLink]) -> Option<String> {
    links
        .iter()
        .find(|link| link.rel.as_deref() == Some("approve"))
        .and_then(|link| link.href.clone())
}

impl PayPalClient {
    pub fn new(
        api_base: &str,
        client_id: String,
        client_secret: String,
        return_url: String,
        cancel_url: String,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        let api_base = Url::parse(api_base)?;

        Ok(Self {
            http,
            api_base,
            client_id,
            client_secret,
            return_url,
            cancel_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.api_base.join(path)?)
    }

    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
        context: &str,
    ) -> Result<reqwest::Response> {
        match build().send().await {
            Ok(resp) if resp.status().is_server_error() => {
                warn!(
                    status = %resp.status(),
                    context,
                    "paypal api returned a server error, retrying once"
                );
                Ok(build().send().await?)
            }
            Ok(resp) => Ok(resp),
            Err(err) if err.is_timeout() || err.is_connect() => {
                warn!(error = %err, context, "paypal api request failed, retrying once");
                Ok(build().send().await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (paypal_error_name, paypal_error_message, paypal_debug_id) =
            match serde_json::from_str::<PayPalErrorEnvelope>(&body) {
                Ok(envelope) => (envelope.name, envelope.message, envelope.debug_id),
                Err(_) => (None, None, None),
            };

        error!(
            status = %status,
            paypal_error_name = ?paypal_error_name,
            paypal_error_message = ?paypal_error_message,
            paypal_debug_id = ?paypal_debug_id,
            response_body = %body,
            context = %context,
            "paypal api request failed"
        );

        anyhow::bail!(
            "PayPal API request failed: {} (status {}, debug_id={:?})",
            context,
            status,
            paypal_debug_id
        );
    }

    /// Client-credentials grant.
    /// https://developer.paypal.com/api/rest/authentication/
    async fn access_token(&self) -> Result<String> {
        let url = self.endpoint("/v1/oauth2/token")?;
        let resp = self
            .send_with_retry(
                || {
                    self.http
                        .post(url.clone())
                        .basic_auth(&self.client_id, Some(&self.client_secret))
                        .form(&[("grant_type", "client_credentials")])
                },
                "fetch access token",
            )
            .await?;
        let resp = Self::ensure_success(resp, "fetch access token").await?;

        #[derive(Deserialize)]
        struct TokenResp {
            access_token: String,
        }

        let parsed: TokenResp = resp.json().await?;
        Ok(parsed.access_token)
    }

    /// Creates a provider-side subscription and returns its id plus the URL
    /// the subscriber must visit to approve it.
    /// https://developer.paypal.com/docs/api/subscriptions/v1/#subscriptions_create
    pub async fn create_subscription(
        &self,
        plan_id: &str,
        subscriber_email: &str,
    ) -> Result<CreatedSubscription> {
        let token = self.access_token().await?;
        let url = self.endpoint("/v1/billing/subscriptions")?;

        let body = serde_json::json!({
            "plan_id": plan_id,
            "subscriber": { "email_address": subscriber_email },
            "application_context": {
                "return_url": self.return_url,
                "cancel_url": self.cancel_url,
            },
        });

        let resp = self
            .send_with_retry(
                || self.http.post(url.clone()).bearer_auth(&token).json(&body),
                "create subscription",
            )
            .await?;
        let resp = Self::ensure_success(resp, "create subscription").await?;

        #[derive(Deserialize)]
        struct CreateResp {
            id: String,
            #[serde(default)]
            links: Vec<ProviderLink>,
        }

        let parsed: CreateResp = resp.json().await?;
        let approval_url = approval_link(&parsed.links)
            .ok_or_else(|| anyhow::anyhow!("PayPal create response is missing an approval link"))?;

        Ok(CreatedSubscription {
            id: parsed.id,
            approval_url,
        })
    }

    /// https://developer.paypal.com/docs/api/subscriptions/v1/#subscriptions_get
    pub async fn get_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> Result<ProviderSubscription> {
        let token = self.access_token().await?;
        let url = self.endpoint(&format!(
            "/v1/billing/subscriptions/{provider_subscription_id}"
        ))?;

        let resp = self
            .send_with_retry(
                || self.http.get(url.clone()).bearer_auth(&token),
                "get subscription",
            )
            .await?;
        let resp = Self::ensure_success(resp, "get subscription").await?;

        let subscription: ProviderSubscription = resp.json().await?;
        Ok(subscription)
    }

    /// Cancels the provider-side subscription. A provider report that the
    /// subscription is already cancelled counts as success so the local flag
    /// can still be set.
    /// https://developer.paypal.com/docs/api/subscriptions/v1/#subscriptions_cancel
    pub async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        reason: &str,
    ) -> Result<()> {
        let token = self.access_token().await?;
        let url = self.endpoint(&format!(
            "/v1/billing/subscriptions/{provider_subscription_id}/cancel"
        ))?;

        let body = serde_json::json!({ "reason": reason });

        let resp = self
            .send_with_retry(
                || self.http.post(url.clone()).bearer_auth(&token).json(&body),
                "cancel subscription",
            )
            .await?;

        if resp.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = resp.text().await.unwrap_or_default();
            if let Ok(envelope) = serde_json::from_str::<PayPalErrorEnvelope>(&body) {
                if envelope.name.as_deref() == Some("SUBSCRIPTION_STATUS_INVALID") {
                    info!(
                        provider_subscription_id,
                        "paypal subscription already cancelled, treating as success"
                    );
                    return Ok(());
                }
            }
            anyhow::bail!("PayPal API request failed: cancel subscription (status 422): {body}");
        }

        Self::ensure_success(resp, "cancel subscription").await?;
        Ok(())
    }
}
