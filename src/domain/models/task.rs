//! Remediation tasks produced by strategies and their delivery outcomes.

use serde::{Deserialize, Serialize};

/// Task priority, ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A remediation action description produced by a matched strategy.
///
/// A strategy returns either no task at all or a fully-formed one: type,
/// payload and priority are always set together. `target_agents` of `None`
/// means "deliver to the dispatcher's configured default target set".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadTask {
    /// Remediation action identifier, e.g. `"agent.revive"`.
    pub task_type: String,
    pub payload: serde_json::Value,
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agents: Option<Vec<String>>,
}

impl SquadTask {
    pub fn new(
        task_type: impl Into<String>,
        payload: serde_json::Value,
        priority: TaskPriority,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
            priority,
            target_agents: None,
        }
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_agents = Some(targets.into_iter().map(Into::into).collect());
        self
    }
}

/// Delivery result for a single target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed { reason: String },
    /// The target name had no registered destination.
    NoHandler,
}

impl DeliveryStatus {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Per-target outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

/// Structured result of dispatching one task, listed per target in delivery
/// order. Re-published on the bus as a `squad.task.outcome` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub task_type: String,
    pub priority: TaskPriority,
    pub targets: Vec<TargetOutcome>,
}

impl DispatchOutcome {
    pub fn delivered_count(&self) -> usize {
        self.targets.iter().filter(|t| t.status.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.targets.len() - self.delivered_count()
    }

    /// True when no target at all received the task.
    pub fn is_total_failure(&self) -> bool {
        !self.targets.is_empty() && self.delivered_count() == 0
    }
}
