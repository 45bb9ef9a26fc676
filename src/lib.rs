//! Halo - Self-Healing Remediation Loop
//!
//! Halo receives typed issues from heterogeneous producers, routes them
//! through a protected publish/subscribe bus, matches each issue against a
//! set of remediation strategies, and dispatches the resulting tasks to
//! named downstream handlers — with per-operation circuit breaking isolating
//! the loop from cascading failures.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): Pure domain models (envelopes, issues,
//!   tasks) and configuration
//! - **Service Layer** (`services`): Event bus, middleware, circuit
//!   breakers, triggers, strategies, dispatcher
//! - **Application Layer** (`application`): The `HaloLoop` orchestrator
//!   wiring everything together
//! - **Infrastructure Layer** (`infrastructure`): Config loading, logging,
//!   HTTP squad API target
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use halo::application::HaloLoop;
//! use halo::domain::models::Config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let halo = HaloLoop::new(&Config::default());
//!     halo.start().await;
//! }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::HaloLoop;
pub use domain::models::{
    Config, DeployInfo, DispatchOutcome, EventEnvelope, EventId, EventPayload, Issue, IssueData,
    IssueSeverity, SquadTask, TaskPriority,
};
pub use infrastructure::{ConfigLoader, HttpSquadTarget};
pub use services::{
    CircuitBreakerService, EventBus, EventHandler, SignatureMiddleware, StrategyEngine,
    TaskDispatcher, TriggerRegistry,
};
