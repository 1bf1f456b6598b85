pub mod backend;
pub mod handle;
pub mod memory;
pub mod pool;

pub use backend::{JobConsumer, JobDelivery, JobQueue, QueueError};
pub use handle::PooledQueue;
pub use memory::{InMemoryConsumer, InMemoryQueue};
pub use pool::{PoolError, ResourceFactory, ResourcePool};
