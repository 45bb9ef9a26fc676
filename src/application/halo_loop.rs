//! The halo loop orchestrator: owns and wires the bus, breakers, triggers,
//! strategy engine and dispatcher.
//!
//! All registries are constructor-injected and owned by one instance; there
//! are no module-level singletons. Components that need to publish receive
//! the orchestrator's bus by handle.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::models::{Config, EventEnvelope, EventId, EventPayload};
use crate::services::circuit_breaker::{BreakerStatus, CircuitBreakerService};
use crate::services::dispatcher::TaskDispatcher;
use crate::services::event_bus::{EventBus, EventHandler, SubscriptionHandle};
use crate::services::middleware::SignatureMiddleware;
use crate::services::strategy::StrategyEngine;
use crate::services::triggers::TriggerRegistry;

/// Bus subscriber that closes the loop: issue in, task out.
struct RemediationHandler {
    bus: Arc<EventBus>,
    engine: Arc<StrategyEngine>,
    dispatcher: Arc<TaskDispatcher>,
}

#[async_trait]
impl EventHandler for RemediationHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), String> {
        let EventPayload::Issue(issue) = &envelope.payload else {
            return Ok(());
        };

        match self.engine.match_issue(issue) {
            Some(task) => {
                self.dispatcher.dispatch(task).await;
                // Acknowledge the issue once remediation was attempted.
                self.bus.mark_handled(envelope.id).await;
            }
            None => {
                tracing::debug!(
                    analyzer = %issue.analyzer,
                    "issue discarded, no strategy matched"
                );
            }
        }
        Ok(())
    }
}

/// The self-healing remediation loop.
pub struct HaloLoop {
    bus: Arc<EventBus>,
    breakers: Arc<CircuitBreakerService>,
    triggers: Arc<TriggerRegistry>,
    strategies: Arc<StrategyEngine>,
    dispatcher: Arc<TaskDispatcher>,
    signer: Option<Arc<SignatureMiddleware>>,
    loop_subscription: Mutex<Option<SubscriptionHandle>>,
}

impl HaloLoop {
    /// Build a loop with the built-in strategy set.
    pub fn new(config: &Config) -> Self {
        Self::with_engine(config, StrategyEngine::with_builtin())
    }

    /// Build a loop around a caller-provided strategy engine.
    pub fn with_engine(config: &Config, engine: StrategyEngine) -> Self {
        let breakers = Arc::new(CircuitBreakerService::new((&config.breaker).into()));

        let signer = config.bus.signing_secret.as_ref().map(|secret| {
            Arc::new(SignatureMiddleware::new(
                secret.as_bytes(),
                config.bus.sensitive_prefixes.clone(),
            ))
        });

        let mut builder = EventBus::builder()
            .recent_events_capacity(config.bus.recent_events_capacity)
            .breakers(breakers.clone());
        if let Some(signer) = &signer {
            builder = builder.middleware(signer.clone());
        }
        let bus = Arc::new(builder.build());

        let mut dispatcher =
            TaskDispatcher::new(bus.clone(), config.dispatcher.default_targets.clone());
        if let Some(signer) = &signer {
            dispatcher = dispatcher.with_signer(signer.clone());
        }

        Self {
            triggers: Arc::new(TriggerRegistry::new(bus.clone())),
            strategies: Arc::new(engine),
            dispatcher: Arc::new(dispatcher),
            breakers,
            signer,
            bus,
            loop_subscription: Mutex::new(None),
        }
    }

    /// Subscribe the strategy engine to issue events. Idempotent.
    pub async fn start(&self) {
        let mut subscription = self.loop_subscription.lock().await;
        if subscription.is_some() {
            return;
        }
        let handler = Arc::new(RemediationHandler {
            bus: self.bus.clone(),
            engine: self.strategies.clone(),
            dispatcher: self.dispatcher.clone(),
        });
        let handle = self
            .bus
            .subscribe("halo.issue", "remediation", handler)
            .await;
        *subscription = Some(handle);
        tracing::info!(
            strategies = ?self.strategies.strategy_names(),
            "halo loop started"
        );
    }

    /// Detach the strategy engine from the bus.
    pub async fn stop(&self) {
        let mut subscription = self.loop_subscription.lock().await;
        if let Some(handle) = subscription.take() {
            self.bus.unsubscribe(&handle).await;
            tracing::info!("halo loop stopped");
        }
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn breakers(&self) -> Arc<CircuitBreakerService> {
        self.breakers.clone()
    }

    pub fn triggers(&self) -> Arc<TriggerRegistry> {
        self.triggers.clone()
    }

    pub fn dispatcher(&self) -> Arc<TaskDispatcher> {
        self.dispatcher.clone()
    }

    pub fn strategy_engine(&self) -> Arc<StrategyEngine> {
        self.strategies.clone()
    }

    /// Signer for the sensitive channels, when signing is configured.
    pub fn signer(&self) -> Option<Arc<SignatureMiddleware>> {
        self.signer.clone()
    }

    // Status/query surface.

    pub async fn recent_events(&self, limit: usize) -> Vec<EventEnvelope> {
        self.bus.recent_events(limit).await
    }

    pub async fn event_by_id(&self, id: EventId) -> Option<EventEnvelope> {
        self.bus.event_by_id(id).await
    }

    pub async fn breaker_status(&self, operation: &str) -> Option<BreakerStatus> {
        self.breakers.status(operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        analyzers, event_types, Issue, IssueData, IssueSeverity, SquadTask, TaskPriority,
    };
    use crate::services::triggers::ObservedIssueTrigger;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct CapturingTarget {
        tasks: Arc<StdMutex<Vec<SquadTask>>>,
    }

    #[async_trait]
    impl EventHandler for CapturingTarget {
        async fn handle(&self, envelope: &EventEnvelope) -> Result<(), String> {
            if let EventPayload::Task(task) = &envelope.payload {
                self.tasks.lock().unwrap().push(task.clone());
            }
            Ok(())
        }
    }

    fn critical_agent_issue() -> Issue {
        Issue::new(
            analyzers::AGENT_HEALTH,
            IssueSeverity::Critical,
            "agent flatlined",
            IssueData::AgentHealth {
                agent_id: Some("lucid".to_string()),
                status: Some("dead".to_string()),
            },
        )
    }

    #[tokio::test]
    async fn test_issue_flows_to_target_through_loop() {
        let halo = HaloLoop::new(&Config::default());
        halo.start().await;

        let tasks = Arc::new(StdMutex::new(Vec::new()));
        halo.dispatcher()
            .register_target("dreamops", Arc::new(CapturingTarget { tasks: tasks.clone() }))
            .await;

        let trigger = Arc::new(ObservedIssueTrigger::new(halo.bus()));
        halo.triggers().register(trigger.clone()).await;

        trigger.report(critical_agent_issue()).await.unwrap();

        let delivered = tasks.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].task_type, "agent.revive");
        assert_eq!(delivered[0].priority, TaskPriority::Critical);

        drop(delivered);

        // The issue envelope was acknowledged and the outcome journaled.
        let events = halo.recent_events(10).await;
        let issue_event = events
            .iter()
            .find(|e| e.event_type == event_types::ISSUE_DETECTED)
            .unwrap();
        assert!(issue_event.handled);
        assert!(events
            .iter()
            .any(|e| e.event_type == event_types::TASK_OUTCOME));
    }

    #[tokio::test]
    async fn test_unmatched_issue_is_discarded_unhandled() {
        let halo = HaloLoop::new(&Config::default());
        halo.start().await;

        let trigger = Arc::new(ObservedIssueTrigger::new(halo.bus()));
        halo.triggers().register(trigger.clone()).await;

        let issue = Issue::new(
            analyzers::AGENT_HEALTH,
            IssueSeverity::Info,
            "agent napping",
            IssueData::AgentHealth {
                agent_id: Some("lucid".to_string()),
                status: None,
            },
        );
        trigger.report(issue).await.unwrap();

        let events = halo.recent_events(10).await;
        let issue_event = events
            .iter()
            .find(|e| e.event_type == event_types::ISSUE_DETECTED)
            .unwrap();
        assert!(!issue_event.handled);
        assert!(!events
            .iter()
            .any(|e| e.event_type == event_types::TASK_OUTCOME));
    }

    #[tokio::test]
    async fn test_stop_detaches_the_loop() {
        let halo = HaloLoop::new(&Config::default());
        halo.start().await;
        halo.stop().await;

        let count = Arc::new(AtomicU32::new(0));
        struct Counter(Arc<AtomicU32>);
        #[async_trait]
        impl EventHandler for Counter {
            async fn handle(&self, _envelope: &EventEnvelope) -> Result<(), String> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        halo.bus()
            .subscribe(event_types::TASK_OUTCOME, "outcome-counter", Arc::new(Counter(count.clone())))
            .await;

        halo.bus()
            .publish_issue("test", critical_agent_issue())
            .await
            .unwrap();

        // No remediation ran, so no outcome was published.
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_signed_loop_end_to_end() {
        let config = Config {
            bus: crate::domain::models::BusConfig {
                signing_secret: Some("loop-secret".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let halo = HaloLoop::new(&config);
        halo.start().await;

        let tasks = Arc::new(StdMutex::new(Vec::new()));
        halo.dispatcher()
            .register_target("dreamops", Arc::new(CapturingTarget { tasks: tasks.clone() }))
            .await;

        halo.bus()
            .publish_issue("test", critical_agent_issue())
            .await
            .unwrap();

        // Dispatch envelopes were signed by the dispatcher, so delivery
        // crossed the signature middleware.
        assert_eq!(tasks.lock().unwrap().len(), 1);
    }
}
