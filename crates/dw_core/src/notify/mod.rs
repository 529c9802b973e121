use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::NotificationEvent;
use crate::error::{codes, AppError};

/// Broadcast topic every downtime-alert subscriber listens on.
pub const DEFAULT_DOWN_TOPIC: &str = "serverdown";

/// Provider-neutral push message addressed to a topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushMessage {
    pub topic: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

/// Per-recipient delivery accounting returned by a provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendReceipt {
    pub success_count: u32,
    pub failure_count: u32,
}

/// Push-notification backend. One synchronous call per message; implementations must bound
/// the call with a timeout and must not retry.
pub trait PushProvider: Send + Sync {
    fn send(&self, message: &PushMessage) -> Result<SendReceipt, AppError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchResult {
    Delivered {
        success_count: u32,
    },
    /// Sent, but some recipients did not confirm delivery. Reported, never retried.
    PartiallyDelivered {
        success_count: u32,
        failure_count: u32,
    },
}

impl DispatchResult {
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartiallyDelivered { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchStats {
    pub attempted: u64,
    pub delivered: u64,
    pub partially_delivered: u64,
    pub failed: u64,
    pub unavailable: u64,
}

#[derive(Debug, Default)]
struct Counters {
    attempted: AtomicU64,
    delivered: AtomicU64,
    partially_delivered: AtomicU64,
    failed: AtomicU64,
    unavailable: AtomicU64,
}

enum ProviderSlot {
    Ready(Arc<dyn PushProvider>),
    /// Fixed for the lifetime of the dispatcher; every dispatch fails fast.
    Unavailable(String),
}

/// Fans a "target down" event out to the broadcast topic through a push provider.
pub struct NotificationDispatcher {
    provider: ProviderSlot,
    topic: String,
    counters: Counters,
}

impl NotificationDispatcher {
    pub fn new(provider: Arc<dyn PushProvider>) -> Self {
        Self {
            provider: ProviderSlot::Ready(provider),
            topic: DEFAULT_DOWN_TOPIC.to_string(),
            counters: Counters::default(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            provider: ProviderSlot::Unavailable(reason.into()),
            topic: DEFAULT_DOWN_TOPIC.to_string(),
            counters: Counters::default(),
        }
    }

    /// Build from a provider construction attempt. A failed construction (for example missing
    /// credentials) leaves the dispatcher permanently unavailable.
    pub fn from_provider(provider: Result<Arc<dyn PushProvider>, AppError>) -> Self {
        match provider {
            Ok(p) => Self::new(p),
            Err(e) => {
                tracing::warn!(
                    code = %e.code,
                    error = %e,
                    "push provider unavailable; downtime notifications are disabled"
                );
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_available(&self) -> bool {
        matches!(self.provider, ProviderSlot::Ready(_))
    }

    pub fn build_message(&self, event: &NotificationEvent) -> PushMessage {
        let title = format!("Target DOWN: {}", event.target_name);
        let body = event.target_address.clone();

        let mut data = BTreeMap::new();
        data.insert("title".to_string(), title.clone());
        data.insert("body".to_string(), body.clone());
        data.insert("target_id".to_string(), event.target_id.clone());
        data.insert("target_name".to_string(), event.target_name.clone());
        data.insert("target_address".to_string(), event.target_address.clone());
        data.insert("status".to_string(), "DOWN".to_string());
        data.insert("reported_by".to_string(), event.reported_by.clone());

        PushMessage {
            topic: self.topic.clone(),
            title,
            body,
            data,
        }
    }

    /// Send one event. Exactly one provider call, no retry.
    pub fn dispatch(&self, event: &NotificationEvent) -> Result<DispatchResult, AppError> {
        self.counters.attempted.fetch_add(1, Ordering::Relaxed);

        let provider = match &self.provider {
            ProviderSlot::Ready(p) => p,
            ProviderSlot::Unavailable(reason) => {
                self.counters.unavailable.fetch_add(1, Ordering::Relaxed);
                return Err(
                    AppError::provider_unavailable("Push provider is not configured")
                        .with_details(reason.clone()),
                );
            }
        };

        let message = self.build_message(event);
        let receipt = match provider.send(&message) {
            Ok(r) => r,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        tracing::info!(
            target_id = %event.target_id,
            topic = %message.topic,
            success = receipt.success_count,
            failure = receipt.failure_count,
            "downtime notification sent"
        );

        if receipt.failure_count > 0 {
            self.counters
                .partially_delivered
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                code = codes::PARTIAL_DELIVERY_FAILURE,
                target_id = %event.target_id,
                success = receipt.success_count,
                failure = receipt.failure_count,
                "downtime notification partially delivered"
            );
            return Ok(DispatchResult::PartiallyDelivered {
                success_count: receipt.success_count,
                failure_count: receipt.failure_count,
            });
        }

        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(DispatchResult::Delivered {
            success_count: receipt.success_count,
        })
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            attempted: self.counters.attempted.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            partially_delivered: self.counters.partially_delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            unavailable: self.counters.unavailable.load(Ordering::Relaxed),
        }
    }
}
