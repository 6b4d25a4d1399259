use std::collections::HashMap;
use std::sync::LazyLock;

use polystore_error::{DbError, Result, ResultExt};
use serde::{Deserialize, Serialize};

use crate::scalar::ScalarValue;

pub const DEFAULT_PARALLEL_JOIN_THRESHOLD: usize = 10_000;
pub const DEFAULT_PARALLEL_GROUP_BY_THRESHOLD: usize = 10_000;
pub const DEFAULT_PARALLEL_POOL_COUNT: usize = 2;

/// Configuration for an operator executor.
///
/// Passed explicitly to the executor, never read from global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub enable_parallel_join: bool,
    pub parallel_join_threshold: usize,
    pub parallel_pool_count: usize,
    pub parallel_pool_size: usize,
    pub parallel_group_by_threshold: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            enable_parallel_join: false,
            parallel_join_threshold: DEFAULT_PARALLEL_JOIN_THRESHOLD,
            parallel_pool_count: DEFAULT_PARALLEL_POOL_COUNT,
            parallel_pool_size: num_cpus::get().clamp(MIN_POOL_VALUE, MAX_POOL_VALUE),
            parallel_group_by_threshold: DEFAULT_PARALLEL_GROUP_BY_THRESHOLD,
        }
    }
}

impl ExecutorConfig {
    /// Load a config from JSON. Missing settings take their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let conf: ExecutorConfig =
            serde_json::from_str(s).context("Failed to parse executor config")?;
        ParallelPoolCount::validate_value(conf.parallel_pool_count)?;
        ParallelPoolSize::validate_value(conf.parallel_pool_size)?;
        Ok(conf)
    }

    pub fn set_from_value(&mut self, name: &str, value: &ScalarValue) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_value(&self, name: &str) -> Result<ScalarValue> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();

        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        let value = (func.get)(&def_conf);
        (func.set)(&value, self)
    }

    /// Names and descriptions of all settings, sorted by name.
    pub fn settings() -> Vec<(&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, func)| (*name, func.description))
            .collect();
        settings.sort_unstable();
        settings
    }
}

struct SettingFunctions {
    description: &'static str,
    set: fn(value: &ScalarValue, conf: &mut ExecutorConfig) -> Result<()>,
    get: fn(conf: &ExecutorConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: ConfigSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_value as _,
            get: S::get_as_value as _,
        }
    }
}

fn insert_setting<S: ConfigSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<EnableParallelJoin>(&mut map);
    insert_setting::<ParallelJoinThreshold>(&mut map);
    insert_setting::<ParallelPoolCount>(&mut map);
    insert_setting::<ParallelPoolSize>(&mut map);
    insert_setting::<ParallelGroupByThreshold>(&mut map);

    map
});

pub trait ConfigSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_value(value: &ScalarValue, conf: &mut ExecutorConfig) -> Result<()>;
    fn get_as_value(conf: &ExecutorConfig) -> ScalarValue;
}

pub struct EnableParallelJoin;

impl ConfigSetting for EnableParallelJoin {
    const NAME: &'static str = "enable_parallel_join";
    const DESCRIPTION: &'static str = "Controls if hash joins may probe in parallel";

    fn set_from_value(value: &ScalarValue, conf: &mut ExecutorConfig) -> Result<()> {
        conf.enable_parallel_join = value.try_as_bool()?;
        Ok(())
    }

    fn get_as_value(conf: &ExecutorConfig) -> ScalarValue {
        conf.enable_parallel_join.into()
    }
}

pub struct ParallelJoinThreshold;

impl ConfigSetting for ParallelJoinThreshold {
    const NAME: &'static str = "parallel_join_threshold";
    const DESCRIPTION: &'static str =
        "Number of probe side rows that must be exceeded before probing in parallel";

    fn set_from_value(value: &ScalarValue, conf: &mut ExecutorConfig) -> Result<()> {
        conf.parallel_join_threshold = value.try_as_usize()?;
        Ok(())
    }

    fn get_as_value(conf: &ExecutorConfig) -> ScalarValue {
        conf.parallel_join_threshold.into()
    }
}

const MIN_POOL_VALUE: usize = 1;
const MAX_POOL_VALUE: usize = 512;

fn validate_pool_value(what: &str, val: usize) -> Result<()> {
    if val < MIN_POOL_VALUE {
        return Err(DbError::new(format!(
            "{what} cannot be less than {MIN_POOL_VALUE}"
        )));
    }

    if val > MAX_POOL_VALUE {
        return Err(DbError::new(format!(
            "{what} cannot be greater than {MAX_POOL_VALUE}"
        )));
    }

    Ok(())
}

pub struct ParallelPoolCount;

impl ParallelPoolCount {
    pub fn validate_value(val: usize) -> Result<()> {
        validate_pool_value("Pool count", val)
    }
}

impl ConfigSetting for ParallelPoolCount {
    const NAME: &'static str = "parallel_pool_count";
    const DESCRIPTION: &'static str = "Number of worker pools available for parallel execution";

    fn set_from_value(value: &ScalarValue, conf: &mut ExecutorConfig) -> Result<()> {
        let val = value.try_as_usize()?;
        Self::validate_value(val)?;
        conf.parallel_pool_count = val;
        Ok(())
    }

    fn get_as_value(conf: &ExecutorConfig) -> ScalarValue {
        conf.parallel_pool_count.into()
    }
}

pub struct ParallelPoolSize;

impl ParallelPoolSize {
    pub fn validate_value(val: usize) -> Result<()> {
        validate_pool_value("Pool size", val)
    }
}

impl ConfigSetting for ParallelPoolSize {
    const NAME: &'static str = "parallel_pool_size";
    const DESCRIPTION: &'static str = "Number of threads in each worker pool";

    fn set_from_value(value: &ScalarValue, conf: &mut ExecutorConfig) -> Result<()> {
        let val = value.try_as_usize()?;
        Self::validate_value(val)?;
        conf.parallel_pool_size = val;
        Ok(())
    }

    fn get_as_value(conf: &ExecutorConfig) -> ScalarValue {
        conf.parallel_pool_size.into()
    }
}

pub struct ParallelGroupByThreshold;

impl ConfigSetting for ParallelGroupByThreshold {
    const NAME: &'static str = "parallel_group_by_threshold";
    const DESCRIPTION: &'static str =
        "Number of groups that must be exceeded before group-by functions run in parallel";

    fn set_from_value(value: &ScalarValue, conf: &mut ExecutorConfig) -> Result<()> {
        conf.parallel_group_by_threshold = value.try_as_usize()?;
        Ok(())
    }

    fn get_as_value(conf: &ExecutorConfig) -> ScalarValue {
        conf.parallel_group_by_threshold.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_reset() {
        let mut conf = ExecutorConfig::default();
        conf.set_from_value("enable_parallel_join", &true.into())
            .unwrap();
        conf.set_from_value("parallel_join_threshold", &ScalarValue::Int64(5))
            .unwrap();

        assert!(conf.enable_parallel_join);
        assert_eq!(
            ScalarValue::Int64(5),
            conf.get_as_value("parallel_join_threshold").unwrap()
        );

        conf.reset("parallel_join_threshold").unwrap();
        assert_eq!(DEFAULT_PARALLEL_JOIN_THRESHOLD, conf.parallel_join_threshold);
        assert!(conf.enable_parallel_join);
    }

    #[test]
    fn pool_values_validated() {
        let mut conf = ExecutorConfig::default();
        conf.set_from_value("parallel_pool_count", &ScalarValue::Int64(0))
            .unwrap_err();
        conf.set_from_value("parallel_pool_size", &ScalarValue::Int64(513))
            .unwrap_err();
        conf.set_from_value("parallel_pool_size", &ScalarValue::Int64(-1))
            .unwrap_err();
        conf.set_from_value("missing", &ScalarValue::Int64(1))
            .unwrap_err();
    }

    #[test]
    fn from_json_with_defaults() {
        let conf =
            ExecutorConfig::from_json(r#"{"enable_parallel_join": true, "parallel_pool_count": 4}"#)
                .unwrap();
        assert!(conf.enable_parallel_join);
        assert_eq!(4, conf.parallel_pool_count);
        assert_eq!(
            DEFAULT_PARALLEL_GROUP_BY_THRESHOLD,
            conf.parallel_group_by_threshold
        );

        ExecutorConfig::from_json(r#"{"parallel_pool_size": 0}"#).unwrap_err();
    }

    #[test]
    fn settings_are_listed() {
        let names: Vec<_> = ExecutorConfig::settings().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            vec![
                "enable_parallel_join",
                "parallel_group_by_threshold",
                "parallel_join_threshold",
                "parallel_pool_count",
                "parallel_pool_size",
            ],
            names
        );
    }
}
