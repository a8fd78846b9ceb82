pub mod decorator;
pub mod introspect;
pub mod pool;

pub use decorator::{ContextPropagatingDecorator, TaskDecorator};
pub use introspect::{list_workers, WorkerInfo, WorkerState};
pub use pool::{BoundedPool, Job, PoolStats, TaskHandle, TaskState};
