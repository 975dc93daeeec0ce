use serde::Deserialize;

/// Provider event envelope. The provider only guarantees `event_type`; the
/// resource payload varies per event and is parsed by the ingestor.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event_type: String,
    #[serde(default)]
    pub resource: serde_json::Value,
}
