//! Registry domain: the exchange entity and the resource-route table.

pub mod exchange;
pub mod routes;

pub use exchange::{
    AckType, Completion, CorrelationStatus, Direction, ExchangeSnapshot, ExchangeStatus,
    FailureType, InvocationStyle, MessageExchange,
};
pub use routes::{ResourceRoute, RouteKey, RouteTable};
