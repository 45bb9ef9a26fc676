//! Publish/subscribe event bus with an ordered middleware chain, per-handler
//! circuit breaking, and a bounded recent-events journal.
//!
//! Delivery for a single envelope is serialized in subscription order; each
//! handler invocation is individually guarded so one failing handler never
//! starves its siblings or the publisher.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::{EventEnvelope, EventId, Issue};
use crate::services::circuit_breaker::{CircuitBreakerError, CircuitBreakerService};
use crate::services::middleware::BusMiddleware;

/// Subscription pattern matching rule, fixed and shared with the signature
/// middleware: a pattern matches an event type exactly, or as a
/// dot-namespace prefix (`"squad.task"` matches `"squad.task.dispatch.x"`).
pub fn pattern_matches(pattern: &str, event_type: &str) -> bool {
    event_type == pattern
        || (event_type.len() > pattern.len()
            && event_type.starts_with(pattern)
            && event_type.as_bytes()[pattern.len()] == b'.')
}

/// A consumer of bus events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one envelope. Errors are contained at the bus boundary and
    /// recorded in the delivery report.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), String>;
}

/// Handle returned by `subscribe`, used for clean removal.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: Uuid,
    pub pattern: String,
    pub name: String,
}

struct Subscription {
    id: Uuid,
    pattern: String,
    name: String,
    handler: Arc<dyn EventHandler>,
}

/// Outcome of one handler invocation during a publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
    /// The handler's breaker was open; it was never invoked.
    CircuitOpen,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Per-subscriber outcome for one published envelope.
#[derive(Debug, Clone)]
pub struct HandlerDelivery {
    pub subscriber: String,
    pub outcome: DeliveryOutcome,
}

/// Result of a successful publish: which subscribers saw the envelope and
/// how each invocation went, in subscription order.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub event_id: EventId,
    pub deliveries: Vec<HandlerDelivery>,
}

impl DeliveryReport {
    /// Outcome for one subscriber by name.
    pub fn outcome_for(&self, subscriber: &str) -> Option<&DeliveryOutcome> {
        self.deliveries
            .iter()
            .find(|d| d.subscriber == subscriber)
            .map(|d| &d.outcome)
    }
}

/// Errors surfaced to publishers.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("envelope rejected by middleware '{middleware}': {reason}")]
    Rejected { middleware: String, reason: String },
}

/// Builder fixing the middleware chain and journal capacity at construction.
pub struct EventBusBuilder {
    middleware: Vec<Arc<dyn BusMiddleware>>,
    recent_events_capacity: usize,
    breakers: Option<Arc<CircuitBreakerService>>,
}

impl EventBusBuilder {
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
            recent_events_capacity: 256,
            breakers: None,
        }
    }

    /// Append a middleware; chain order is registration order.
    pub fn middleware(mut self, mw: Arc<dyn BusMiddleware>) -> Self {
        self.middleware.push(mw);
        self
    }

    pub fn recent_events_capacity(mut self, capacity: usize) -> Self {
        self.recent_events_capacity = capacity.max(1);
        self
    }

    /// Share a breaker service with the rest of the loop; one is created if
    /// none is provided.
    pub fn breakers(mut self, breakers: Arc<CircuitBreakerService>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    pub fn build(self) -> EventBus {
        EventBus {
            middleware: self.middleware,
            subscriptions: RwLock::new(Vec::new()),
            recent: RwLock::new(VecDeque::with_capacity(self.recent_events_capacity)),
            recent_capacity: self.recent_events_capacity,
            breakers: self
                .breakers
                .unwrap_or_else(|| Arc::new(CircuitBreakerService::with_defaults())),
        }
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The event bus.
pub struct EventBus {
    middleware: Vec<Arc<dyn BusMiddleware>>,
    subscriptions: RwLock<Vec<Subscription>>,
    recent: RwLock<VecDeque<EventEnvelope>>,
    recent_capacity: usize,
    breakers: Arc<CircuitBreakerService>,
}

impl EventBus {
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Bus with no middleware and default capacity.
    pub fn with_defaults() -> Self {
        EventBusBuilder::new().build()
    }

    /// Subscribe `handler` under `name` to every event type matching
    /// `pattern` (see [`pattern_matches`]). Handlers run in subscription
    /// order; each invocation is guarded by the breaker named
    /// `handler:{name}`.
    pub async fn subscribe(
        &self,
        pattern: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionHandle {
        let pattern = pattern.into();
        let name = name.into();
        let id = Uuid::new_v4();
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.push(Subscription {
            id,
            pattern: pattern.clone(),
            name: name.clone(),
            handler,
        });
        SubscriptionHandle { id, pattern, name }
    }

    /// Remove a subscription. No delivery happens after removal returns.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != handle.id);
        subscriptions.len() < before
    }

    /// Publish an envelope: middleware chain first (a rejection aborts the
    /// whole call), then the journal append, then serialized delivery to
    /// every matching subscriber.
    pub async fn publish(
        &self,
        envelope: EventEnvelope,
    ) -> Result<DeliveryReport, BusError> {
        for mw in &self.middleware {
            if let Err(e) = mw.inspect(&envelope) {
                tracing::warn!(
                    middleware = mw.name(),
                    event_type = %envelope.event_type,
                    "envelope rejected"
                );
                return Err(BusError::Rejected {
                    middleware: mw.name().to_string(),
                    reason: e.0,
                });
            }
        }

        let event_id = envelope.id;

        // Single-writer append keeps insertion order and the bound.
        {
            let mut recent = self.recent.write().await;
            if recent.len() >= self.recent_capacity {
                recent.pop_front();
            }
            recent.push_back(envelope.clone());
        }

        let matching: Vec<(String, Arc<dyn EventHandler>)> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .iter()
                .filter(|s| pattern_matches(&s.pattern, &envelope.event_type))
                .map(|s| (s.name.clone(), s.handler.clone()))
                .collect()
        };

        let mut deliveries = Vec::with_capacity(matching.len());
        for (name, handler) in matching {
            let operation = format!("handler:{}", name);
            let result = self
                .breakers
                .execute(&operation, async {
                    handler.handle(&envelope).await
                })
                .await;

            let outcome = match result {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(CircuitBreakerError::CircuitOpen { .. }) => {
                    DeliveryOutcome::CircuitOpen
                }
                Err(CircuitBreakerError::Timeout { .. }) => {
                    tracing::warn!(subscriber = %name, event_type = %envelope.event_type, "handler timed out");
                    DeliveryOutcome::Failed("handler timed out".to_string())
                }
                Err(CircuitBreakerError::OperationFailed(e)) => {
                    tracing::warn!(subscriber = %name, event_type = %envelope.event_type, error = %e, "handler failed");
                    DeliveryOutcome::Failed(e)
                }
            };
            deliveries.push(HandlerDelivery {
                subscriber: name,
                outcome,
            });
        }

        Ok(DeliveryReport {
            event_id,
            deliveries,
        })
    }

    /// Wrap an issue in an envelope and publish it.
    pub async fn publish_issue(
        &self,
        source: impl Into<String>,
        issue: Issue,
    ) -> Result<DeliveryReport, BusError> {
        self.publish(EventEnvelope::issue(source, issue)).await
    }

    /// Most-recent-first listing of journaled envelopes, up to `limit`.
    pub async fn recent_events(&self, limit: usize) -> Vec<EventEnvelope> {
        let recent = self.recent.read().await;
        recent.iter().rev().take(limit).cloned().collect()
    }

    /// Look up one journaled envelope by id.
    pub async fn event_by_id(&self, id: EventId) -> Option<EventEnvelope> {
        let recent = self.recent.read().await;
        recent.iter().find(|e| e.id == id).cloned()
    }

    /// Acknowledge processing of a journaled envelope. Returns true only on
    /// the first false→true transition; the flag never reverts.
    pub async fn mark_handled(&self, id: EventId) -> bool {
        let mut recent = self.recent.write().await;
        match recent.iter_mut().find(|e| e.id == id) {
            Some(entry) if !entry.handled => {
                entry.handled = true;
                true
            }
            _ => false,
        }
    }

    /// Number of active subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub fn breakers(&self) -> Arc<CircuitBreakerService> {
        self.breakers.clone()
    }
}
