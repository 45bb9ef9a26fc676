//! Event envelope: the addressed, timestamped wrapper around every payload
//! that flows through the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::issue::Issue;
use super::task::{DispatchOutcome, SquadTask};

/// Well-known dot-namespaced event types.
pub mod event_types {
    /// A normalized issue produced by a trigger.
    pub const ISSUE_DETECTED: &str = "halo.issue.detected";
    /// A deploy finished (successfully or not).
    pub const DEPLOY_COMPLETED: &str = "halo.deploy.completed";
    /// Prefix for per-target task delivery; the full type is
    /// `squad.task.dispatch.{target}`.
    pub const TASK_DISPATCH_PREFIX: &str = "squad.task.dispatch";
    /// Aggregate delivery outcome of one dispatched task.
    pub const TASK_OUTCOME: &str = "squad.task.outcome";
}

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata reported by a completed deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployInfo {
    pub service: String,
    pub version: String,
    /// Environment keys the deployed service expected but did not find.
    #[serde(default)]
    pub missing_env_keys: Vec<String>,
}

/// Typed event payload, tagged by event family.
///
/// Payloads not yet modeled travel as `Generic`, so unknown producers keep
/// working without losing type safety on the modeled cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Issue(Issue),
    Task(SquadTask),
    Outcome(DispatchOutcome),
    Deploy(DeployInfo),
    Generic(serde_json::Value),
}

impl EventPayload {
    /// Variant name for logging and filtering.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Issue(_) => "Issue",
            Self::Task(_) => "Task",
            Self::Outcome(_) => "Outcome",
            Self::Deploy(_) => "Deploy",
            Self::Generic(_) => "Generic",
        }
    }
}

/// The addressed wrapper around any event payload.
///
/// `id` is immutable once assigned. `handled` starts false; the bus journal
/// copy transitions it to true exactly once via `EventBus::mark_handled` and
/// it never reverts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    /// Dot-namespaced discriminator, e.g. `"halo.issue.detected"`.
    pub event_type: String,
    /// Identifier of the producing component.
    pub source: String,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    pub handled: bool,
    /// Hex HMAC over type/source/payload, required on sensitive channels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl EventEnvelope {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            source: source.into(),
            payload,
            timestamp: Utc::now(),
            handled: false,
            signature: None,
        }
    }

    /// Wrap an issue as an `halo.issue.detected` envelope.
    pub fn issue(source: impl Into<String>, issue: Issue) -> Self {
        Self::new(event_types::ISSUE_DETECTED, source, EventPayload::Issue(issue))
    }

    /// Wrap a deploy notification.
    pub fn deploy(source: impl Into<String>, info: DeployInfo) -> Self {
        Self::new(event_types::DEPLOY_COMPLETED, source, EventPayload::Deploy(info))
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::issue::{Issue, IssueData, IssueSeverity};

    #[test]
    fn test_issue_envelope_type() {
        let issue = Issue::new(
            "agentHealth",
            IssueSeverity::Warning,
            "agent slow to heartbeat",
            IssueData::AgentHealth {
                agent_id: Some("lucid".to_string()),
                status: None,
            },
        );
        let envelope = EventEnvelope::issue("observer", issue);
        assert_eq!(envelope.event_type, event_types::ISSUE_DETECTED);
        assert_eq!(envelope.source, "observer");
        assert!(!envelope.handled);
        assert!(envelope.signature.is_none());
        assert_eq!(envelope.payload.variant_name(), "Issue");
    }

    #[test]
    fn test_envelope_serde_round_trip() {
        let envelope = EventEnvelope::deploy(
            "ci",
            DeployInfo {
                service: "portal".to_string(),
                version: "1.4.2".to_string(),
                missing_env_keys: vec!["API_KEY".to_string()],
            },
        );
        let json = serde_json::to_string(&envelope).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, envelope.id);
        assert_eq!(back.event_type, envelope.event_type);
        match back.payload {
            EventPayload::Deploy(info) => assert_eq!(info.missing_env_keys, vec!["API_KEY"]),
            other => panic!("wrong payload variant: {}", other.variant_name()),
        }
    }
}
