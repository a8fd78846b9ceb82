//! Core abstractions shared across ral
//!
//! Request and response model, the error type, request context, collaborator
//! ports and the service container.

pub mod container;
pub mod context;
pub mod error;
pub mod model;
pub mod status;
pub mod traits;

// Re-export commonly used types
pub use container::ServiceContainer;
pub use context::RequestContext;
pub use error::{RalError, RalResult};
pub use model::{AggregateResponse, Entity, EntityId, Family, Request, TrendSnapshot};
pub use traits::*;
