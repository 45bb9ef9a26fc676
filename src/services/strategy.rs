//! Remediation strategies: pure decision functions mapping an issue to an
//! optional squad task.
//!
//! The engine evaluates strategies in registration order and returns the
//! first produced task (the registered strategies are mutually exclusive by
//! analyzer tag, so fan-out would never yield a second match). A strategy
//! declines — never errors — when a required data field is absent.

use std::sync::Arc;

use serde_json::json;

use crate::domain::models::{
    analyzers, Issue, IssueData, IssueSeverity, SquadTask, TaskPriority,
};

/// A pure decision function over issues.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// The analyzer tag this strategy reacts to. The engine skips the
    /// strategy without calling `evaluate` when the tag differs.
    fn analyzer(&self) -> &'static str;

    /// Produce a fully-formed task, or decline with `None`.
    fn evaluate(&self, issue: &Issue) -> Option<SquadTask>;
}

/// Severity-derived priority used by strategies without a fixed priority:
/// error and critical escalate to high, everything else stays normal.
fn severity_priority(severity: IssueSeverity) -> TaskPriority {
    if severity >= IssueSeverity::Error {
        TaskPriority::High
    } else {
        TaskPriority::Normal
    }
}

/// Revives unresponsive agents.
///
/// Priority policy: critical issues produce a critical task, error issues a
/// high one; warning and info severities are not worth a revival and
/// decline.
pub struct ReviveAgentStrategy;

impl Strategy for ReviveAgentStrategy {
    fn name(&self) -> &'static str {
        "revive-agent"
    }

    fn analyzer(&self) -> &'static str {
        analyzers::AGENT_HEALTH
    }

    fn evaluate(&self, issue: &Issue) -> Option<SquadTask> {
        let IssueData::AgentHealth {
            agent_id: Some(agent_id),
            ..
        } = &issue.data
        else {
            return None;
        };

        let priority = match issue.severity {
            IssueSeverity::Critical => TaskPriority::Critical,
            IssueSeverity::Error => TaskPriority::High,
            _ => return None,
        };

        Some(
            SquadTask::new(
                "agent.revive",
                json!({ "agentId": agent_id, "reason": issue.description }),
                priority,
            )
            .with_targets(["dreamops"]),
        )
    }
}

/// Repairs failing endpoints. Priority follows severity.
pub struct RepairEndpointStrategy;

impl Strategy for RepairEndpointStrategy {
    fn name(&self) -> &'static str {
        "repair-endpoint"
    }

    fn analyzer(&self) -> &'static str {
        analyzers::ENDPOINT_HEALTH
    }

    fn evaluate(&self, issue: &Issue) -> Option<SquadTask> {
        let IssueData::EndpointHealth {
            endpoint: Some(endpoint),
            status_code,
        } = &issue.data
        else {
            return None;
        };

        Some(
            SquadTask::new(
                "endpoint.repair",
                json!({
                    "endpoint": endpoint,
                    "statusCode": status_code,
                    "reason": issue.description,
                }),
                severity_priority(issue.severity),
            )
            .with_targets(["deploykeeper"]),
        )
    }
}

/// Synchronizes missing environment keys. Priority follows severity.
pub struct EnvSyncStrategy;

impl Strategy for EnvSyncStrategy {
    fn name(&self) -> &'static str {
        "env-sync"
    }

    fn analyzer(&self) -> &'static str {
        analyzers::ENV_CONSISTENCY
    }

    fn evaluate(&self, issue: &Issue) -> Option<SquadTask> {
        let IssueData::EnvConsistency { missing_keys } = &issue.data else {
            return None;
        };
        if missing_keys.is_empty() {
            return None;
        }

        Some(
            SquadTask::new(
                "env.sync",
                json!({ "missingKeys": missing_keys }),
                severity_priority(issue.severity),
            )
            .with_targets(["envkeeper"]),
        )
    }
}

/// Rebalances underperforming squads. Fixed priority: normal — optimization
/// is never urgent.
pub struct OptimizeSquadStrategy;

impl Strategy for OptimizeSquadStrategy {
    fn name(&self) -> &'static str {
        "optimize-squad"
    }

    fn analyzer(&self) -> &'static str {
        analyzers::SQUAD_EFFICIENCY
    }

    fn evaluate(&self, issue: &Issue) -> Option<SquadTask> {
        let IssueData::SquadEfficiency {
            squad_id: Some(squad_id),
            idle_agents,
        } = &issue.data
        else {
            return None;
        };

        Some(
            SquadTask::new(
                "squad.optimize",
                json!({ "squadId": squad_id, "idleAgents": idle_agents }),
                TaskPriority::Normal,
            )
            .with_targets(["dreamops"]),
        )
    }
}

/// Schedules code-quality fixes for repo integrity findings. Priority
/// follows severity.
pub struct CodeQualityStrategy;

impl Strategy for CodeQualityStrategy {
    fn name(&self) -> &'static str {
        "code-quality"
    }

    fn analyzer(&self) -> &'static str {
        analyzers::REPO_INTEGRITY
    }

    fn evaluate(&self, issue: &Issue) -> Option<SquadTask> {
        let IssueData::RepoIntegrity {
            path: Some(path),
            finding,
        } = &issue.data
        else {
            return None;
        };

        Some(
            SquadTask::new(
                "code.quality",
                json!({ "path": path, "finding": finding }),
                severity_priority(issue.severity),
            )
            .with_targets(["deploykeeper"]),
        )
    }
}

/// Installs or repairs grafts.
///
/// Priority policy is fixed, independent of severity: a pending install is
/// high, a broken graft is critical.
pub struct RepairGraftStrategy;

impl Strategy for RepairGraftStrategy {
    fn name(&self) -> &'static str {
        "repair-graft"
    }

    fn analyzer(&self) -> &'static str {
        analyzers::GRAFT
    }

    fn evaluate(&self, issue: &Issue) -> Option<SquadTask> {
        let IssueData::Graft {
            graft_id: Some(graft_id),
            name,
        } = &issue.data
        else {
            return None;
        };

        let payload = json!({ "graftId": graft_id, "name": name });
        let task = if issue.description.contains("pending") {
            SquadTask::new("graft.install", payload, TaskPriority::High)
        } else {
            SquadTask::new("graft.repair", payload, TaskPriority::Critical)
        };

        Some(task.with_targets(["deploykeeper"]))
    }
}

/// The default strategy set, in evaluation order.
pub fn builtin_strategies() -> Vec<Arc<dyn Strategy>> {
    vec![
        Arc::new(ReviveAgentStrategy),
        Arc::new(RepairEndpointStrategy),
        Arc::new(EnvSyncStrategy),
        Arc::new(OptimizeSquadStrategy),
        Arc::new(CodeQualityStrategy),
        Arc::new(RepairGraftStrategy),
    ]
}

/// Ordered strategy registry with first-match dispatch.
pub struct StrategyEngine {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl StrategyEngine {
    pub fn new(strategies: Vec<Arc<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    pub fn with_builtin() -> Self {
        Self::new(builtin_strategies())
    }

    /// First-match evaluation in registration order. Returns `None` when
    /// every strategy declines; re-evaluating the same issue value always
    /// yields the same result.
    pub fn match_issue(&self, issue: &Issue) -> Option<SquadTask> {
        for strategy in &self.strategies {
            if strategy.analyzer() != issue.analyzer {
                continue;
            }
            if let Some(task) = strategy.evaluate(issue) {
                tracing::debug!(
                    strategy = strategy.name(),
                    task_type = %task.task_type,
                    priority = %task.priority,
                    "strategy matched"
                );
                return Some(task);
            }
        }
        tracing::debug!(
            analyzer = %issue.analyzer,
            severity = %issue.severity,
            "no remediation available"
        );
        None
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}
