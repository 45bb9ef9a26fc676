//! Normalized problem records produced by triggers and consumed (read-only)
//! by the strategy engine.

use serde::{Deserialize, Serialize};

/// Detector tags for the analyzers this crate models.
pub mod analyzers {
    pub const AGENT_HEALTH: &str = "agentHealth";
    pub const ENDPOINT_HEALTH: &str = "endpointHealth";
    pub const ENV_CONSISTENCY: &str = "envConsistency";
    pub const SQUAD_EFFICIENCY: &str = "squadEfficiency";
    pub const REPO_INTEGRITY: &str = "repoIntegrity";
    pub const GRAFT: &str = "graft";
}

/// Issue severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analyzer-specific issue payload.
///
/// Variants are keyed by the analyzer family; fields a detector may
/// legitimately omit are `Option` so strategies can decline on absence
/// instead of assuming well-formed data. Unmodeled analyzers use `Generic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IssueData {
    AgentHealth {
        agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    EndpointHealth {
        endpoint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },
    EnvConsistency {
        #[serde(default)]
        missing_keys: Vec<String>,
    },
    SquadEfficiency {
        squad_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        idle_agents: Option<u32>,
    },
    RepoIntegrity {
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finding: Option<String>,
    },
    Graft {
        graft_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Generic(serde_json::Value),
}

/// A normalized problem record. Never mutated after creation; every
/// evaluation of the same issue value is independent and idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Which detector produced this issue, e.g. `"agentHealth"`.
    pub analyzer: String,
    pub severity: IssueSeverity,
    pub description: String,
    pub data: IssueData,
}

impl Issue {
    pub fn new(
        analyzer: impl Into<String>,
        severity: IssueSeverity,
        description: impl Into<String>,
        data: IssueData,
    ) -> Self {
        Self {
            analyzer: analyzer.into(),
            severity,
            description: description.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(IssueSeverity::Info < IssueSeverity::Warning);
        assert!(IssueSeverity::Warning < IssueSeverity::Error);
        assert!(IssueSeverity::Error < IssueSeverity::Critical);
    }

    #[test]
    fn test_severity_round_trip() {
        for severity in [
            IssueSeverity::Info,
            IssueSeverity::Warning,
            IssueSeverity::Error,
            IssueSeverity::Critical,
        ] {
            assert_eq!(IssueSeverity::from_str(severity.as_str()), Some(severity));
        }
        assert_eq!(IssueSeverity::from_str("fatal"), None);
    }

    #[test]
    fn test_issue_data_tagging() {
        let issue = Issue::new(
            analyzers::GRAFT,
            IssueSeverity::Critical,
            "graft broken",
            IssueData::Graft {
                graft_id: Some("graft-7".to_string()),
                name: None,
            },
        );
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["data"]["kind"], "graft");
        assert_eq!(json["severity"], "critical");
        let back: Issue = serde_json::from_value(json).unwrap();
        assert_eq!(back, issue);
    }
}
