//! Environment variable helpers
//!
//! Every tunable in socketor has a compile-time default that an
//! environment variable may override at startup.
//!
//! ```ignore
//! use socketor_core::env::{env_get, env_get_bool};
//!
//! let timeout_ms: u64 = env_get("SOCKETOR_ACCEPT_TIMEOUT_MS", 10_000);
//! let flush = env_get_bool("SOCKETOR_FLUSH_EPRINT", false);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read `key` as a boolean flag
///
/// "1", "true", "yes" and "on" (any case) are true, any other value is
/// false. Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => is_truthy(&val),
        Err(_) => default,
    }
}

pub(crate) fn is_truthy(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: u64 = env_get("__SOCKETOR_TEST_UNSET__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_parses_and_trims() {
        std::env::set_var("__SOCKETOR_TEST_NUM__", " 250 ");
        let val: u64 = env_get("__SOCKETOR_TEST_NUM__", 0);
        assert_eq!(val, 250);
        std::env::remove_var("__SOCKETOR_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_falls_back() {
        std::env::set_var("__SOCKETOR_TEST_BAD__", "ten seconds");
        let val: u64 = env_get("__SOCKETOR_TEST_BAD__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__SOCKETOR_TEST_BAD__");
    }

    #[test]
    fn test_truthy_values() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["0", "false", "off", "garbage", ""] {
            assert!(!is_truthy(v), "{v}");
        }
        assert!(env_get_bool("__SOCKETOR_TEST_UNSET__", true));
    }
}
