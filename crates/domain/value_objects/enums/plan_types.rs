use std::fmt::Display;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

/// Currency for the fixed plan price table, minor units.
pub const PLAN_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Monthly,
    Yearly,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Monthly => "monthly",
            PlanType::Yearly => "yearly",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "monthly" => Some(PlanType::Monthly),
            "yearly" => Some(PlanType::Yearly),
            _ => None,
        }
    }

    /// Locally-known plan price in minor currency units.
    pub fn price_minor(&self) -> i32 {
        match self {
            PlanType::Monthly => 499,
            PlanType::Yearly => 3999,
        }
    }

    /// End of a billing period that starts at `start`.
    pub fn period_end_from(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let months = match self {
            PlanType::Monthly => 1,
            PlanType::Yearly => 12,
        };
        start.checked_add_months(Months::new(months))
    }
}

impl Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
