pub mod pool;

pub use pool::{PoolGuard, WorkerPools};
