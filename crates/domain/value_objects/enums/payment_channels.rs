use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel {
    ManualTransfer,
    AutomatedBilling,
}

impl PaymentChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentChannel::ManualTransfer => "manual_transfer",
            PaymentChannel::AutomatedBilling => "automated_billing",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "manual_transfer" => Some(PaymentChannel::ManualTransfer),
            "automated_billing" => Some(PaymentChannel::AutomatedBilling),
            _ => None,
        }
    }
}

impl Display for PaymentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
