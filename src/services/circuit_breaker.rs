//! Circuit breaker for failure isolation.
//!
//! Each named operation owns one breaker. Repeated consecutive failures open
//! the circuit; open circuits fail fast until a reset timeout elapses, then a
//! single half-open trial decides whether to close again.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;

use crate::domain::models::BreakerSettings;

/// Configuration shared by all breakers in one service.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before allowing a half-open trial.
    pub reset_timeout: Duration,
    /// Optional per-call timeout; a timed-out call counts as a failure.
    pub request_timeout: Option<std::time::Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::seconds(30),
            request_timeout: None,
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            reset_timeout: Duration::seconds(settings.reset_timeout_secs as i64),
            request_timeout: settings
                .request_timeout_ms
                .map(std::time::Duration::from_millis),
        }
    }
}

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected without execution.
    Open,
    /// The next request runs as a recovery trial.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Whether a call may proceed, and in what role.
enum Admission {
    Proceed,
    Trial,
    Blocked { retry_after: DateTime<Utc> },
}

/// Per-operation breaker state.
#[derive(Debug)]
struct Breaker {
    state: CircuitState,
    failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure_at: None,
        }
    }

    fn admit(&mut self, config: &CircuitBreakerConfig) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Proceed,
            CircuitState::HalfOpen => Admission::Trial,
            CircuitState::Open => {
                let opened = self.last_failure_at.unwrap_or_else(Utc::now);
                if Utc::now() >= opened + config.reset_timeout {
                    self.state = CircuitState::HalfOpen;
                    Admission::Trial
                } else {
                    Admission::Blocked {
                        retry_after: opened + config.reset_timeout,
                    }
                }
            }
        }
    }

    /// A single success clears the failure streak, whatever the state.
    fn record_success(&mut self) {
        self.failures = 0;
        self.state = CircuitState::Closed;
        self.last_failure_at = None;
    }

    fn record_failure(&mut self, config: &CircuitBreakerConfig) {
        self.last_failure_at = Some(Utc::now());
        match self.state {
            CircuitState::Closed => {
                self.failures += 1;
                if self.failures >= config.failure_threshold {
                    self.state = CircuitState::Open;
                }
            }
            // A single half-open trial failure re-opens immediately.
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
            }
            CircuitState::Open => {}
        }
    }
}

/// Snapshot of one breaker for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failures: u32,
}

/// Error from a circuit-breaker protected operation.
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the action was never invoked.
    CircuitOpen {
        operation: String,
        retry_after: DateTime<Utc>,
    },
    /// The action exceeded the configured request timeout.
    Timeout { operation: String },
    /// The underlying operation failed.
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircuitOpen {
                operation,
                retry_after,
            } => write!(
                f,
                "Circuit breaker open for '{}', retry after {}",
                operation, retry_after
            ),
            Self::Timeout { operation } => {
                write!(f, "Operation '{}' timed out", operation)
            }
            Self::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CircuitBreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::OperationFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Service owning all breakers, keyed by operation name.
///
/// Independent operation names never share failure counts; nothing outside
/// this service mutates breaker state.
pub struct CircuitBreakerService {
    config: CircuitBreakerConfig,
    circuits: RwLock<HashMap<String, Breaker>>,
}

impl CircuitBreakerService {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Execute `action` guarded by the breaker named `operation`.
    ///
    /// Fails fast with `CircuitOpen` while the breaker is open; otherwise the
    /// action runs (with the optional request timeout) and its outcome is
    /// recorded against the breaker.
    pub async fn execute<F, T, E>(
        &self,
        operation: &str,
        action: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let admission = {
            let mut circuits = self.circuits.write().await;
            let breaker = circuits
                .entry(operation.to_string())
                .or_insert_with(Breaker::new);
            breaker.admit(&self.config)
        };

        if let Admission::Blocked { retry_after } = admission {
            tracing::debug!(operation, %retry_after, "circuit open, failing fast");
            return Err(CircuitBreakerError::CircuitOpen {
                operation: operation.to_string(),
                retry_after,
            });
        }

        let outcome = match self.config.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, action).await {
                Ok(result) => result,
                Err(_) => {
                    self.record_failure(operation).await;
                    return Err(CircuitBreakerError::Timeout {
                        operation: operation.to_string(),
                    });
                }
            },
            None => action.await,
        };

        match outcome {
            Ok(value) => {
                self.record_success(operation).await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure(operation).await;
                Err(CircuitBreakerError::OperationFailed(e))
            }
        }
    }

    async fn record_success(&self, operation: &str) {
        let mut circuits = self.circuits.write().await;
        if let Some(breaker) = circuits.get_mut(operation) {
            breaker.record_success();
        }
    }

    async fn record_failure(&self, operation: &str) {
        let mut circuits = self.circuits.write().await;
        let breaker = circuits
            .entry(operation.to_string())
            .or_insert_with(Breaker::new);
        let was_open = breaker.state == CircuitState::Open;
        breaker.record_failure(&self.config);
        if !was_open && breaker.state == CircuitState::Open {
            tracing::warn!(operation, failures = breaker.failures, "circuit opened");
        }
    }

    /// Snapshot of one breaker, if it has been exercised.
    pub async fn status(&self, operation: &str) -> Option<BreakerStatus> {
        let circuits = self.circuits.read().await;
        circuits.get(operation).map(|b| BreakerStatus {
            state: b.state,
            failures: b.failures,
        })
    }

    /// Snapshot of every breaker.
    pub async fn statuses(&self) -> Vec<(String, BreakerStatus)> {
        let circuits = self.circuits.read().await;
        circuits
            .iter()
            .map(|(name, b)| {
                (
                    name.clone(),
                    BreakerStatus {
                        state: b.state,
                        failures: b.failures,
                    },
                )
            })
            .collect()
    }

    /// Manually close a breaker and clear its streak.
    pub async fn reset(&self, operation: &str) {
        let mut circuits = self.circuits.write().await;
        if let Some(breaker) = circuits.get_mut(operation) {
            breaker.record_success();
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}
