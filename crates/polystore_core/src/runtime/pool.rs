use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use polystore_error::{DbError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::trace;

/// Bounded set of reusable thread pools.
///
/// A caller checks a pool out for the duration of one parallel task. Pools
/// are created lazily up to `pool_count`, after which a checkout blocks
/// until another caller returns its pool.
pub struct WorkerPools {
    pool_count: usize,
    pool_size: usize,
    state: Mutex<PoolState>,
    returned: Condvar,
}

struct PoolState {
    idle: Vec<Arc<ThreadPool>>,
    created: usize,
}

impl fmt::Debug for WorkerPools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPools")
            .field("pool_count", &self.pool_count)
            .field("pool_size", &self.pool_size)
            .finish_non_exhaustive()
    }
}

impl WorkerPools {
    pub fn new(pool_count: usize, pool_size: usize) -> Self {
        WorkerPools {
            pool_count: pool_count.max(1),
            pool_size: pool_size.max(1),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                created: 0,
            }),
            returned: Condvar::new(),
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pool_count
    }

    /// Check out a pool, blocking until one is available.
    pub fn checkout(&self) -> Result<PoolGuard<'_>> {
        let mut state = self.state.lock();
        loop {
            if let Some(pool) = state.idle.pop() {
                trace!("reusing idle worker pool");
                return Ok(PoolGuard {
                    pools: self,
                    pool,
                });
            }

            if state.created < self.pool_count {
                let id = state.created;
                let pool = ThreadPoolBuilder::new()
                    .num_threads(self.pool_size)
                    .thread_name(move |idx| format!("polystore-pool-{id}-thread-{idx}"))
                    .build()
                    .map_err(|e| {
                        DbError::with_source("Failed to build thread pool", Box::new(e))
                    })?;
                state.created += 1;
                trace!(pool = id, threads = self.pool_size, "created worker pool");

                return Ok(PoolGuard {
                    pools: self,
                    pool: Arc::new(pool),
                });
            }

            self.returned.wait(&mut state);
        }
    }

    fn check_in(&self, pool: Arc<ThreadPool>) {
        let mut state = self.state.lock();
        state.idle.push(pool);
        self.returned.notify_one();
    }
}

/// A checked out pool. Returned to its owner on drop, including when the
/// task using it failed.
pub struct PoolGuard<'a> {
    pools: &'a WorkerPools,
    pool: Arc<ThreadPool>,
}

impl fmt::Debug for PoolGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolGuard").finish_non_exhaustive()
    }
}

impl Deref for PoolGuard<'_> {
    type Target = ThreadPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl Drop for PoolGuard<'_> {
    fn drop(&mut self) {
        self.pools.check_in(self.pool.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn pools_are_reused() {
        let pools = WorkerPools::new(1, 2);
        {
            let pool = pools.checkout().unwrap();
            assert_eq!(2, pool.current_num_threads());
        }
        let _pool = pools.checkout().unwrap();
        assert_eq!(1, pools.state.lock().created);
    }

    #[test]
    fn checkout_blocks_until_returned() {
        let pools = Arc::new(WorkerPools::new(1, 1));
        let done = Arc::new(AtomicUsize::new(0));

        let guard = pools.checkout().unwrap();
        let handle = {
            let pools = pools.clone();
            let done = done.clone();
            thread::spawn(move || {
                let _guard = pools.checkout().unwrap();
                done.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(0, done.load(Ordering::SeqCst));

        drop(guard);
        handle.join().unwrap();
        assert_eq!(1, done.load(Ordering::SeqCst));
    }

    #[test]
    fn returned_after_panic() {
        let pools = WorkerPools::new(1, 1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let pool = pools.checkout().unwrap();
            pool.install(|| panic!("task failed"));
        }));
        assert!(result.is_err());
        let _pool = pools.checkout().unwrap();
    }
}
