//! Pure subscription lifecycle decisions.
//!
//! Given the stored state of one subscription and an event from either
//! payment channel, decide the next status and the structural side effects.
//! Persistence, payment recording, and entitlement recomputation stay with
//! the callers; a rejected transition must never mutate stored state.

use thiserror::Error;

use crate::domain::value_objects::enums::{
    payment_channels::PaymentChannel, subscription_statuses::SubscriptionStatus,
};

/// Provider-side subscription status accepted by the activation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Active,
    ApprovalPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEvent {
    ApproveManual,
    RejectManual,
    CancelUserInitiated,
    ActivateAutomated { provider_status: ProviderStatus },
    WebhookActivated,
    WebhookCancelled,
    WebhookExpired,
    WebhookSuspended,
    WebhookPaymentCompleted,
}

impl SubscriptionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SubscriptionEvent::ApproveManual => "approve_manual",
            SubscriptionEvent::RejectManual => "reject_manual",
            SubscriptionEvent::CancelUserInitiated => "cancel_user_initiated",
            SubscriptionEvent::ActivateAutomated { .. } => "activate_automated",
            SubscriptionEvent::WebhookActivated => "webhook_activated",
            SubscriptionEvent::WebhookCancelled => "webhook_cancelled",
            SubscriptionEvent::WebhookExpired => "webhook_expired",
            SubscriptionEvent::WebhookSuspended => "webhook_suspended",
            SubscriptionEvent::WebhookPaymentCompleted => "webhook_payment_completed",
        }
    }
}

/// How the billing period changes with a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodAction {
    Unchanged,
    /// Period bounds start at the transition time (approval, activation).
    StartNow,
    /// Period end moves one plan interval forward from the transition time
    /// (settled recurring payment).
    ExtendFromNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: SubscriptionStatus,
    pub period: PeriodAction,
    pub sets_canceled_at: bool,
    pub sets_cancel_at_period_end: bool,
}

impl Transition {
    fn to(status: SubscriptionStatus) -> Self {
        Self {
            status,
            period: PeriodAction::Unchanged,
            sets_canceled_at: false,
            sets_cancel_at_period_end: false,
        }
    }

    fn with_period(mut self, period: PeriodAction) -> Self {
        self.period = period;
        self
    }

    fn canceling(mut self) -> Self {
        self.sets_canceled_at = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{event} is not valid while the subscription is {status}")]
    InvalidStatus {
        event: &'static str,
        status: SubscriptionStatus,
    },
    #[error("{event} only applies to the {expected} channel")]
    WrongChannel {
        event: &'static str,
        expected: PaymentChannel,
    },
}

fn require_channel(
    channel: PaymentChannel,
    expected: PaymentChannel,
    event: &SubscriptionEvent,
) -> Result<(), TransitionError> {
    if channel == expected {
        Ok(())
    } else {
        Err(TransitionError::WrongChannel {
            event: event.name(),
            expected,
        })
    }
}

fn invalid(event: &SubscriptionEvent, status: SubscriptionStatus) -> TransitionError {
    TransitionError::InvalidStatus {
        event: event.name(),
        status,
    }
}

/// Decide the transition for `event` on a subscription currently in
/// (`channel`, `status`).
pub fn apply(
    channel: PaymentChannel,
    status: SubscriptionStatus,
    event: &SubscriptionEvent,
) -> Result<Transition, TransitionError> {
    use SubscriptionStatus::*;

    match event {
        SubscriptionEvent::ApproveManual => {
            require_channel(channel, PaymentChannel::ManualTransfer, event)?;
            match status {
                Pending => Ok(Transition::to(Active).with_period(PeriodAction::StartNow)),
                other => Err(invalid(event, other)),
            }
        }
        SubscriptionEvent::RejectManual => {
            require_channel(channel, PaymentChannel::ManualTransfer, event)?;
            match status {
                Pending => Ok(Transition::to(Canceled).canceling()),
                other => Err(invalid(event, other)),
            }
        }
        SubscriptionEvent::CancelUserInitiated => match status {
            // Entitlement persists until period end: the status stays active
            // and only the renewal intent flips.
            Active => Ok(Transition {
                status: Active,
                period: PeriodAction::Unchanged,
                sets_canceled_at: true,
                sets_cancel_at_period_end: true,
            }),
            other => Err(invalid(event, other)),
        },
        SubscriptionEvent::ActivateAutomated { provider_status } => {
            require_channel(channel, PaymentChannel::AutomatedBilling, event)?;
            match (provider_status, status) {
                (ProviderStatus::Active, Pending | PastDue | Active) => {
                    Ok(Transition::to(Active).with_period(PeriodAction::StartNow))
                }
                (ProviderStatus::ApprovalPending, Pending) => Ok(Transition::to(Pending)),
                (_, other) => Err(invalid(event, other)),
            }
        }
        SubscriptionEvent::WebhookActivated => {
            require_channel(channel, PaymentChannel::AutomatedBilling, event)?;
            match status {
                Pending | PastDue => Ok(Transition::to(Active)),
                other => Err(invalid(event, other)),
            }
        }
        SubscriptionEvent::WebhookCancelled => {
            require_channel(channel, PaymentChannel::AutomatedBilling, event)?;
            match status {
                Pending | Active | PastDue => Ok(Transition::to(Canceled).canceling()),
                other => Err(invalid(event, other)),
            }
        }
        SubscriptionEvent::WebhookExpired => {
            require_channel(channel, PaymentChannel::AutomatedBilling, event)?;
            match status {
                Pending | Active | PastDue => Ok(Transition::to(Expired).canceling()),
                other => Err(invalid(event, other)),
            }
        }
        SubscriptionEvent::WebhookSuspended => {
            require_channel(channel, PaymentChannel::AutomatedBilling, event)?;
            match status {
                Active => Ok(Transition::to(PastDue)),
                other => Err(invalid(event, other)),
            }
        }
        SubscriptionEvent::WebhookPaymentCompleted => {
            require_channel(channel, PaymentChannel::AutomatedBilling, event)?;
            match status {
                // A settled charge both extends the period and recovers a
                // past_due subscription.
                Pending | Active | PastDue => {
                    Ok(Transition::to(Active).with_period(PeriodAction::ExtendFromNow))
                }
                other => Err(invalid(event, other)),
            }
        }
    }
}
