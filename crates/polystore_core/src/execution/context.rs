use parking_lot::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::functions::FunctionRegistry;
use crate::runtime::WorkerPools;

/// State available to every operator while executing one query.
#[derive(Debug)]
pub struct ExecutionContext<'a> {
    pub query_id: Uuid,
    pub config: &'a ExecutorConfig,
    pub registry: &'a FunctionRegistry,
    pub pools: &'a WorkerPools,
    warnings: Mutex<Vec<String>>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        config: &'a ExecutorConfig,
        registry: &'a FunctionRegistry,
        pools: &'a WorkerPools,
    ) -> Self {
        ExecutionContext {
            query_id: Uuid::new_v4(),
            config,
            registry,
            pools,
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Record a warning to return alongside the query result.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(query_id = %self.query_id, %message, "query warning");
        let mut warnings = self.warnings.lock();
        if !warnings.contains(&message) {
            warnings.push(message);
        }
    }

    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock())
    }
}
