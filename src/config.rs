//! Process-wide runtime configuration.
//!
//! The source system reads these options out of an in-process
//! `GetThreadLocalContext` key/value store rather than a config file, so
//! `RuntimeConfig` loads itself from environment variables instead of a
//! `cognitod`-style TOML file — the same "typed fields behind a `from_env`
//! constructor with validated parsing" shape, adapted to the key/value
//! source this system actually has.

use std::env;

use crate::error::{Error, Result};

/// `ge.exec.float_overflow_mode`. Anything not recognized is treated as
/// `Unset` rather than an error — the original option silently no-ops on
/// an unrecognized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatOverflowMode {
    Saturation,
    InfNan,
    Unset,
}

impl FloatOverflowMode {
    fn from_str(s: &str) -> FloatOverflowMode {
        match s {
            "saturation" => FloatOverflowMode::Saturation,
            "inf_nan" => FloatOverflowMode::InfNan,
            _ => FloatOverflowMode::Unset,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub float_overflow_mode: FloatOverflowMode,
    pub op_wait_timeout_secs: Option<u32>,
    pub op_execute_timeout_secs: Option<u32>,
    pub profiling_to_stdout: bool,
    pub copy_thread_pool_size: usize,
}

impl RuntimeConfig {
    /// Builds a config from environment variables, falling back to the
    /// documented defaults for anything unset.
    pub fn from_env() -> Result<RuntimeConfig> {
        Ok(RuntimeConfig {
            float_overflow_mode: env::var("ge.exec.float_overflow_mode")
                .map(|v| FloatOverflowMode::from_str(&v))
                .unwrap_or(FloatOverflowMode::Unset),
            op_wait_timeout_secs: parse_timeout_env("op_wait_timeout")?,
            op_execute_timeout_secs: parse_timeout_env("op_execute_timeout")?,
            profiling_to_stdout: env::var("GE_PROFILING_TO_STD_OUT")
                .map(|v| v == "2").unwrap_or(false),
            copy_thread_pool_size: gehete_extras::copy_pool::COPY_THREAD_POOL_SIZE,
        })
    }

    /// Used by tests that want a small copy pool instead of spinning up
    /// real OS threads per case.
    pub fn for_tests() -> RuntimeConfig {
        RuntimeConfig {
            float_overflow_mode: FloatOverflowMode::Unset,
            op_wait_timeout_secs: None,
            op_execute_timeout_secs: None,
            profiling_to_stdout: false,
            copy_thread_pool_size: 2,
        }
    }
}

fn parse_timeout_env(name: &str) -> Result<Option<u32>> {
    match env::var(name) {
        Err(_) => Ok(None),
        Ok(v) => v.parse::<u32>().map(Some)
            .map_err(|_| Error::Config(format!("{} must be a non-negative integer seconds value, got {:?}", name, v))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_overflow_mode_is_unset() {
        assert_eq!(FloatOverflowMode::from_str("bogus"), FloatOverflowMode::Unset);
        assert_eq!(FloatOverflowMode::from_str("saturation"), FloatOverflowMode::Saturation);
        assert_eq!(FloatOverflowMode::from_str("inf_nan"), FloatOverflowMode::InfNan);
    }

    #[test]
    fn test_config_uses_small_pool() {
        let cfg = RuntimeConfig::for_tests();
        assert_eq!(cfg.copy_thread_pool_size, 2);
    }
}
