pub mod circuit_breaker;
pub mod dispatcher;
pub mod event_bus;
pub mod middleware;
pub mod strategy;
pub mod triggers;

pub use circuit_breaker::{
    BreakerStatus, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerService, CircuitState,
};
pub use dispatcher::TaskDispatcher;
pub use event_bus::{
    BusError, DeliveryOutcome, DeliveryReport, EventBus, EventBusBuilder, EventHandler,
    HandlerDelivery, SubscriptionHandle,
};
pub use middleware::{BusMiddleware, MiddlewareError, SignatureMiddleware};
pub use strategy::{builtin_strategies, Strategy, StrategyEngine};
pub use triggers::{
    DeployTrigger, DispatchFailureTrigger, ErrorRateTrigger, ObservedIssueTrigger, Trigger,
    TriggerRegistration, TriggerRegistry,
};
