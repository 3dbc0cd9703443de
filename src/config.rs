//! Parses the string-keyed configuration bag into a [`ConnectionProperties`]
//! plus a [`PoolConfig`].
//!
//! Recognized keys: `driver`, `url`, `user`, `password`, `keep-alive`,
//! `borrow-timeout`, `lock-timeout`, `pool-size`. Unknown keys are ignored
//! and logged at `debug!` unless `strict` is requested, matching the
//! permissive parsing style the rest of the pack favors.

use std::collections::HashMap;
use std::time::Duration;

use crate::driver::ConnectionProperties;
use crate::error::PoolError;
use crate::pool::{PoolConfig, PoolConfigBuilder};

const KNOWN_KEYS: &[&str] = &[
    "driver",
    "url",
    "user",
    "password",
    "keep-alive",
    "borrow-timeout",
    "lock-timeout",
    "pool-size",
];

/// Parses `props` into `(ConnectionProperties, PoolConfig)`, applying the
/// documented defaults for any key that is absent.
pub fn pool_config_from_map(
    props: &HashMap<String, String>,
    strict: bool,
) -> Result<(ConnectionProperties, PoolConfig), PoolError> {
    if strict {
        for key in props.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                return Err(PoolError::Config(format!("unknown configuration key: {key}")));
            }
        }
    } else {
        for key in props.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::debug!(key, "ignoring unrecognized configuration key");
            }
        }
    }

    let connection = ConnectionProperties {
        url: props.get("url").cloned().unwrap_or_default(),
        user: props.get("user").cloned().unwrap_or_default(),
        password: props.get("password").cloned().unwrap_or_default(),
    };

    let mut builder = PoolConfigBuilder::new();
    if let Some(v) = props.get("pool-size") {
        builder = builder.pool_size(parse_u32(v, "pool-size")?);
    }
    if let Some(v) = props.get("borrow-timeout") {
        builder = builder.borrow_timeout(Duration::from_secs(parse_u64(v, "borrow-timeout")?));
    }
    if let Some(v) = props.get("keep-alive") {
        builder = builder.keep_alive(Duration::from_secs(parse_u64(v, "keep-alive")?));
    }
    if let Some(v) = props.get("lock-timeout") {
        builder = builder.lock_timeout(parse_i64(v, "lock-timeout")?);
    }

    let config = builder.finish()?;
    Ok((connection, config))
}

fn parse_u32(v: &str, key: &str) -> Result<u32, PoolError> {
    v.parse().map_err(|_| PoolError::Config(format!("{key}: expected a non-negative integer, got {v:?}")))
}

fn parse_u64(v: &str, key: &str) -> Result<u64, PoolError> {
    v.parse().map_err(|_| PoolError::Config(format!("{key}: expected a non-negative integer, got {v:?}")))
}

fn parse_i64(v: &str, key: &str) -> Result<i64, PoolError> {
    v.parse().map_err(|_| PoolError::Config(format!("{key}: expected an integer, got {v:?}")))
}
