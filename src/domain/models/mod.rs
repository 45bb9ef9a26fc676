pub mod config;
pub mod envelope;
pub mod issue;
pub mod task;

pub use config::{
    BreakerSettings, BusConfig, Config, DispatcherConfig, LogFormat, LoggingConfig,
    TriggerSettings,
};
pub use envelope::{event_types, DeployInfo, EventEnvelope, EventId, EventPayload};
pub use issue::{analyzers, Issue, IssueData, IssueSeverity};
pub use task::{DeliveryStatus, DispatchOutcome, SquadTask, TargetOutcome, TaskPriority};
