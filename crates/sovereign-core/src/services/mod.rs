//! Services layered over the durable store.

mod cache;
mod queue;
mod store;

pub use cache::CacheManager;
pub use queue::OperationQueue;
pub use store::{Store, StoreHandle, StoreLocation, StoreStats};
