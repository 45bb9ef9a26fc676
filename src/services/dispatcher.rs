//! Task dispatcher: routes squad tasks to their targets through the bus.
//!
//! Delivery goes through `publish` so the middleware chain and the circuit
//! breakers apply to dispatch exactly as to any other event. Every dispatch
//! ends with a `squad.task.outcome` event for feedback-driven triggers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    event_types, DeliveryStatus, DispatchOutcome, EventEnvelope, EventPayload, SquadTask,
    TargetOutcome,
};
use crate::services::event_bus::{
    DeliveryOutcome, EventBus, EventHandler, SubscriptionHandle,
};
use crate::services::middleware::SignatureMiddleware;

/// Routes tasks to named target handlers.
pub struct TaskDispatcher {
    bus: Arc<EventBus>,
    default_targets: Vec<String>,
    targets: RwLock<HashMap<String, SubscriptionHandle>>,
    /// Signs dispatch envelopes when the bus enforces signatures on the
    /// `squad.task` channels.
    signer: Option<Arc<SignatureMiddleware>>,
}

impl TaskDispatcher {
    pub fn new(bus: Arc<EventBus>, default_targets: Vec<String>) -> Self {
        Self {
            bus,
            default_targets,
            targets: RwLock::new(HashMap::new()),
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: Arc<SignatureMiddleware>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Register a destination for a target name. The handler is subscribed
    /// on the bus to `squad.task.dispatch.{name}`.
    pub async fn register_target(&self, name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let name = name.into();
        let pattern = format!("{}.{}", event_types::TASK_DISPATCH_PREFIX, name);
        let handle = self
            .bus
            .subscribe(pattern, format!("target:{}", name), handler)
            .await;
        let mut targets = self.targets.write().await;
        if let Some(previous) = targets.insert(name, handle) {
            self.bus.unsubscribe(&previous).await;
        }
    }

    /// Remove a target's destination and its bus subscription.
    pub async fn deregister_target(&self, name: &str) -> DomainResult<()> {
        let removed = {
            let mut targets = self.targets.write().await;
            targets.remove(name)
        };
        match removed {
            Some(handle) => {
                self.bus.unsubscribe(&handle).await;
                Ok(())
            }
            None => Err(DomainError::TargetNotFound(name.to_string())),
        }
    }

    pub async fn registered_targets(&self) -> Vec<String> {
        let targets = self.targets.read().await;
        let mut names: Vec<String> = targets.keys().cloned().collect();
        names.sort();
        names
    }

    /// Deliver `task` to its targets in listed order (or to the configured
    /// defaults when it names none). A target without a registered
    /// destination records `NoHandler` without aborting the rest. The
    /// aggregate outcome is re-published as a `squad.task.outcome` event.
    pub async fn dispatch(&self, task: SquadTask) -> DispatchOutcome {
        let targets = task
            .target_agents
            .clone()
            .unwrap_or_else(|| self.default_targets.clone());

        let registered: Vec<String> = {
            let map = self.targets.read().await;
            map.keys().cloned().collect()
        };

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in &targets {
            if !registered.contains(target) {
                tracing::warn!(target = %target, task_type = %task.task_type, "no destination registered");
                outcomes.push(TargetOutcome {
                    target: target.clone(),
                    status: DeliveryStatus::NoHandler,
                });
                continue;
            }

            let envelope = self.signed(EventEnvelope::new(
                format!("{}.{}", event_types::TASK_DISPATCH_PREFIX, target),
                "dispatcher",
                EventPayload::Task(task.clone()),
            ));

            let status = match self.bus.publish(envelope).await {
                Err(e) => DeliveryStatus::Failed {
                    reason: e.to_string(),
                },
                Ok(report) => {
                    let subscriber = format!("target:{}", target);
                    match report.outcome_for(&subscriber) {
                        Some(DeliveryOutcome::Delivered) => DeliveryStatus::Delivered,
                        Some(DeliveryOutcome::Failed(reason)) => DeliveryStatus::Failed {
                            reason: reason.clone(),
                        },
                        Some(DeliveryOutcome::CircuitOpen) => DeliveryStatus::Failed {
                            reason: "target circuit open".to_string(),
                        },
                        // Deregistered between the snapshot and the publish.
                        None => DeliveryStatus::NoHandler,
                    }
                }
            };
            outcomes.push(TargetOutcome {
                target: target.clone(),
                status,
            });
        }

        let outcome = DispatchOutcome {
            task_type: task.task_type.clone(),
            priority: task.priority,
            targets: outcomes,
        };

        tracing::info!(
            task_type = %outcome.task_type,
            priority = %outcome.priority,
            dispatched = outcome.delivered_count(),
            failed = outcome.failed_count(),
            "task dispatched"
        );

        let outcome_envelope = self.signed(EventEnvelope::new(
            event_types::TASK_OUTCOME,
            "dispatcher",
            EventPayload::Outcome(outcome.clone()),
        ));
        if let Err(e) = self.bus.publish(outcome_envelope).await {
            tracing::warn!(error = %e, "failed to publish dispatch outcome");
        }

        outcome
    }

    fn signed(&self, envelope: EventEnvelope) -> EventEnvelope {
        match &self.signer {
            Some(signer) => {
                let signature = signer.sign(&envelope);
                envelope.with_signature(signature)
            }
            None => envelope,
        }
    }
}
