//! Triggers: named adapters converting external signals into zero-or-one
//! normalized issues pushed onto the bus.
//!
//! Triggers are independent; the registry enforces no ordering or
//! deduplication beyond what each trigger implements. Deregistration disarms
//! the trigger and removes any bus subscriptions it bound, so nothing fires
//! after removal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    analyzers, DeployInfo, EventEnvelope, EventPayload, Issue, IssueData, IssueSeverity,
    TriggerSettings,
};
use crate::services::event_bus::{BusError, EventBus, EventHandler, SubscriptionHandle};

/// Armed/disarmed switch shared between a trigger and its registry entry.
#[derive(Debug)]
pub struct TriggerArm(AtomicBool);

impl TriggerArm {
    pub fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn disarm(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for TriggerArm {
    fn default() -> Self {
        Self::new()
    }
}

/// A named signal adapter.
#[async_trait]
pub trait Trigger: Send + Sync {
    fn name(&self) -> &str;

    /// Bind any bus subscriptions this trigger needs (feedback triggers
    /// listen to outcome events). Default: none.
    async fn bind(&self, bus: &Arc<EventBus>) -> Vec<SubscriptionHandle> {
        let _ = bus;
        Vec::new()
    }

    /// Stop all future emission. Producers may still hold the trigger; its
    /// notify entry points become no-ops.
    fn disarm(&self);

    fn is_armed(&self) -> bool;
}

/// Handle returned by `register`, used for deregistration.
#[derive(Debug, Clone)]
pub struct TriggerRegistration {
    pub id: Uuid,
    pub name: String,
}

struct RegistryEntry {
    trigger: Arc<dyn Trigger>,
    subscriptions: Vec<SubscriptionHandle>,
}

/// Owns registered triggers and their bus subscriptions.
pub struct TriggerRegistry {
    bus: Arc<EventBus>,
    entries: RwLock<std::collections::HashMap<Uuid, RegistryEntry>>,
}

impl TriggerRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            entries: RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub async fn register(&self, trigger: Arc<dyn Trigger>) -> TriggerRegistration {
        let subscriptions = trigger.bind(&self.bus).await;
        let registration = TriggerRegistration {
            id: Uuid::new_v4(),
            name: trigger.name().to_string(),
        };
        let mut entries = self.entries.write().await;
        entries.insert(
            registration.id,
            RegistryEntry {
                trigger,
                subscriptions,
            },
        );
        registration
    }

    /// Disarm the trigger and remove its subscriptions.
    pub async fn deregister(&self, registration: &TriggerRegistration) -> DomainResult<()> {
        let entry = {
            let mut entries = self.entries.write().await;
            entries.remove(&registration.id)
        };
        let Some(entry) = entry else {
            return Err(DomainError::TriggerNotFound(registration.id));
        };

        entry.trigger.disarm();
        futures::future::join_all(
            entry
                .subscriptions
                .iter()
                .map(|handle| self.bus.unsubscribe(handle)),
        )
        .await;
        tracing::debug!(trigger = %registration.name, "trigger deregistered");
        Ok(())
    }

    pub async fn names(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut names: Vec<String> = entries
            .values()
            .map(|e| e.trigger.name().to_string())
            .collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Built-in triggers
// ---------------------------------------------------------------------------

/// Rolling time-window counter used by the threshold triggers.
struct RollingWindow {
    samples: VecDeque<DateTime<Utc>>,
    window: Duration,
    threshold: u32,
}

impl RollingWindow {
    fn new(threshold: u32, window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
            threshold,
        }
    }

    /// Record one sample; true when the threshold is reached, which also
    /// clears the window so the next firing needs a fresh burst.
    fn record(&mut self) -> bool {
        let now = Utc::now();
        self.samples.push_back(now);
        let cutoff = now - self.window;
        while self.samples.front().is_some_and(|t| *t < cutoff) {
            self.samples.pop_front();
        }
        if self.samples.len() >= self.threshold as usize {
            self.samples.clear();
            true
        } else {
            false
        }
    }
}

/// Deploy-completion notifications. Always publishes the deploy event;
/// raises an env-consistency issue when the deploy reports unset keys.
pub struct DeployTrigger {
    arm: TriggerArm,
    bus: Arc<EventBus>,
}

impl DeployTrigger {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            arm: TriggerArm::new(),
            bus,
        }
    }

    pub async fn notify_deploy(&self, info: DeployInfo) -> Result<(), BusError> {
        if !self.arm.is_armed() {
            return Ok(());
        }
        self.bus
            .publish(EventEnvelope::deploy(self.name(), info.clone()))
            .await?;

        if !info.missing_env_keys.is_empty() {
            let issue = Issue::new(
                analyzers::ENV_CONSISTENCY,
                IssueSeverity::Warning,
                format!(
                    "deploy of {} {} left {} environment keys unset",
                    info.service,
                    info.version,
                    info.missing_env_keys.len()
                ),
                IssueData::EnvConsistency {
                    missing_keys: info.missing_env_keys,
                },
            );
            self.bus.publish_issue(self.name(), issue).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Trigger for DeployTrigger {
    fn name(&self) -> &str {
        "deploy"
    }

    fn disarm(&self) {
        self.arm.disarm();
    }

    fn is_armed(&self) -> bool {
        self.arm.is_armed()
    }
}

/// Rolling error counter; emits an endpoint-health issue once the error
/// count inside the window reaches the threshold.
pub struct ErrorRateTrigger {
    arm: TriggerArm,
    bus: Arc<EventBus>,
    window: Mutex<RollingWindow>,
}

impl ErrorRateTrigger {
    pub fn new(bus: Arc<EventBus>, threshold: u32, window: Duration) -> Self {
        Self {
            arm: TriggerArm::new(),
            bus,
            window: Mutex::new(RollingWindow::new(threshold, window)),
        }
    }

    pub fn from_settings(bus: Arc<EventBus>, settings: &TriggerSettings) -> Self {
        Self::new(
            bus,
            settings.error_threshold,
            Duration::seconds(settings.error_window_secs as i64),
        )
    }

    /// Record one upstream error. Returns true when an issue was emitted.
    pub async fn record_error(&self, source: &str) -> Result<bool, BusError> {
        if !self.arm.is_armed() {
            return Ok(false);
        }
        let fired = {
            let mut window = self.window.lock().await;
            window.record()
        };
        if !fired {
            return Ok(false);
        }

        let issue = Issue::new(
            analyzers::ENDPOINT_HEALTH,
            IssueSeverity::Error,
            format!("elevated error rate from {}", source),
            IssueData::EndpointHealth {
                endpoint: Some(source.to_string()),
                status_code: None,
            },
        );
        self.bus.publish_issue(self.name(), issue).await?;
        Ok(true)
    }
}

#[async_trait]
impl Trigger for ErrorRateTrigger {
    fn name(&self) -> &str {
        "error-rate"
    }

    fn disarm(&self) {
        self.arm.disarm();
    }

    fn is_armed(&self) -> bool {
        self.arm.is_armed()
    }
}

/// Passthrough for externally observed issues (health probes, graft scans,
/// env sweeps living outside this process).
pub struct ObservedIssueTrigger {
    arm: TriggerArm,
    bus: Arc<EventBus>,
}

impl ObservedIssueTrigger {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            arm: TriggerArm::new(),
            bus,
        }
    }

    pub async fn report(&self, issue: Issue) -> Result<(), BusError> {
        if !self.arm.is_armed() {
            return Ok(());
        }
        tracing::debug!(analyzer = %issue.analyzer, severity = %issue.severity, "issue observed");
        self.bus.publish_issue(self.name(), issue).await?;
        Ok(())
    }
}

#[async_trait]
impl Trigger for ObservedIssueTrigger {
    fn name(&self) -> &str {
        "observed"
    }

    fn disarm(&self) {
        self.arm.disarm();
    }

    fn is_armed(&self) -> bool {
        self.arm.is_armed()
    }
}

/// Feedback trigger: watches `squad.task.outcome` events and raises a new
/// issue after repeated total dispatch failures, closing the loop.
pub struct DispatchFailureTrigger {
    arm: Arc<TriggerArm>,
    bus: Arc<EventBus>,
    window: Arc<Mutex<RollingWindow>>,
}

impl DispatchFailureTrigger {
    pub fn new(bus: Arc<EventBus>, threshold: u32, window: Duration) -> Self {
        Self {
            arm: Arc::new(TriggerArm::new()),
            bus,
            window: Arc::new(Mutex::new(RollingWindow::new(threshold, window))),
        }
    }

    pub fn from_settings(bus: Arc<EventBus>, settings: &TriggerSettings) -> Self {
        Self::new(
            bus,
            settings.dispatch_failure_threshold,
            Duration::seconds(settings.dispatch_failure_window_secs as i64),
        )
    }
}

struct DispatchFailureWatcher {
    arm: Arc<TriggerArm>,
    bus: Arc<EventBus>,
    window: Arc<Mutex<RollingWindow>>,
}

#[async_trait]
impl EventHandler for DispatchFailureWatcher {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), String> {
        let EventPayload::Outcome(outcome) = &envelope.payload else {
            return Ok(());
        };
        if !outcome.is_total_failure() || !self.arm.is_armed() {
            return Ok(());
        }

        let fired = {
            let mut window = self.window.lock().await;
            window.record()
        };
        if !fired {
            return Ok(());
        }

        let issue = Issue::new(
            analyzers::ENDPOINT_HEALTH,
            IssueSeverity::Error,
            format!(
                "repeated total dispatch failures, last for task {}",
                outcome.task_type
            ),
            IssueData::EndpointHealth {
                endpoint: Some("squad.dispatch".to_string()),
                status_code: None,
            },
        );
        self.bus
            .publish_issue("dispatch-failure", issue)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[async_trait]
impl Trigger for DispatchFailureTrigger {
    fn name(&self) -> &str {
        "dispatch-failure"
    }

    async fn bind(&self, bus: &Arc<EventBus>) -> Vec<SubscriptionHandle> {
        let watcher = Arc::new(DispatchFailureWatcher {
            arm: self.arm.clone(),
            bus: self.bus.clone(),
            window: self.window.clone(),
        });
        vec![
            bus.subscribe(
                crate::domain::models::event_types::TASK_OUTCOME,
                "trigger:dispatch-failure",
                watcher,
            )
            .await,
        ]
    }

    fn disarm(&self) {
        self.arm.disarm();
    }

    fn is_armed(&self) -> bool {
        self.arm.is_armed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event_types;

    async fn issue_count(bus: &EventBus) -> usize {
        bus.recent_events(usize::MAX)
            .await
            .iter()
            .filter(|e| e.event_type == event_types::ISSUE_DETECTED)
            .count()
    }

    #[tokio::test]
    async fn test_deploy_trigger_emits_issue_only_for_missing_keys() {
        let bus = Arc::new(EventBus::with_defaults());
        let trigger = DeployTrigger::new(bus.clone());

        trigger
            .notify_deploy(DeployInfo {
                service: "portal".to_string(),
                version: "1.0.0".to_string(),
                missing_env_keys: vec![],
            })
            .await
            .unwrap();
        assert_eq!(issue_count(&bus).await, 0);

        trigger
            .notify_deploy(DeployInfo {
                service: "portal".to_string(),
                version: "1.0.1".to_string(),
                missing_env_keys: vec!["API_KEY".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(issue_count(&bus).await, 1);

        // The raw deploy events are journaled either way.
        let deploys = bus
            .recent_events(usize::MAX)
            .await
            .iter()
            .filter(|e| e.event_type == event_types::DEPLOY_COMPLETED)
            .count();
        assert_eq!(deploys, 2);
    }

    #[tokio::test]
    async fn test_error_rate_trigger_fires_at_threshold_then_resets() {
        let bus = Arc::new(EventBus::with_defaults());
        let trigger = ErrorRateTrigger::new(bus.clone(), 3, Duration::seconds(60));

        assert!(!trigger.record_error("api").await.unwrap());
        assert!(!trigger.record_error("api").await.unwrap());
        assert!(trigger.record_error("api").await.unwrap());
        assert_eq!(issue_count(&bus).await, 1);

        // Window cleared on fire: the next error starts a fresh count.
        assert!(!trigger.record_error("api").await.unwrap());
    }

    #[tokio::test]
    async fn test_deregistered_trigger_emits_nothing() {
        let bus = Arc::new(EventBus::with_defaults());
        let registry = TriggerRegistry::new(bus.clone());
        let trigger = Arc::new(ObservedIssueTrigger::new(bus.clone()));

        let registration = registry.register(trigger.clone()).await;
        trigger
            .report(Issue::new(
                analyzers::GRAFT,
                IssueSeverity::Critical,
                "graft broken",
                IssueData::Graft {
                    graft_id: Some("graft-1".to_string()),
                    name: None,
                },
            ))
            .await
            .unwrap();
        assert_eq!(issue_count(&bus).await, 1);

        registry.deregister(&registration).await.unwrap();
        assert!(!trigger.is_armed());
        // Deregistering twice reports the missing registration.
        assert!(matches!(
            registry.deregister(&registration).await,
            Err(DomainError::TriggerNotFound(_))
        ));

        trigger
            .report(Issue::new(
                analyzers::GRAFT,
                IssueSeverity::Critical,
                "graft broken again",
                IssueData::Graft {
                    graft_id: Some("graft-1".to_string()),
                    name: None,
                },
            ))
            .await
            .unwrap();
        assert_eq!(issue_count(&bus).await, 1);
    }

    #[tokio::test]
    async fn test_deregistration_removes_bus_subscriptions() {
        let bus = Arc::new(EventBus::with_defaults());
        let registry = TriggerRegistry::new(bus.clone());
        let trigger = Arc::new(DispatchFailureTrigger::new(
            bus.clone(),
            1,
            Duration::seconds(60),
        ));

        let registration = registry.register(trigger).await;
        assert_eq!(bus.subscription_count().await, 1);

        registry.deregister(&registration).await.unwrap();
        assert_eq!(bus.subscription_count().await, 0);
        assert!(registry.names().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_feedback_raises_issue() {
        use crate::domain::models::{
            DeliveryStatus, DispatchOutcome, TargetOutcome, TaskPriority,
        };

        let bus = Arc::new(EventBus::with_defaults());
        let registry = TriggerRegistry::new(bus.clone());
        registry
            .register(Arc::new(DispatchFailureTrigger::new(
                bus.clone(),
                2,
                Duration::seconds(60),
            )))
            .await;

        let failed_outcome = DispatchOutcome {
            task_type: "env.sync".to_string(),
            priority: TaskPriority::Normal,
            targets: vec![TargetOutcome {
                target: "envkeeper".to_string(),
                status: DeliveryStatus::Failed {
                    reason: "down".to_string(),
                },
            }],
        };

        for _ in 0..2 {
            bus.publish(EventEnvelope::new(
                event_types::TASK_OUTCOME,
                "dispatcher",
                EventPayload::Outcome(failed_outcome.clone()),
            ))
            .await
            .unwrap();
        }

        assert_eq!(issue_count(&bus).await, 1);
    }
}
