//! Environment variable helpers
//!
//! Typed lookups with defaults, used by `ShredConfig::from_env()`.
//!
//! # Usage
//!
//! ```
//! use ashred_core::env::{env_get, env_get_opt};
//!
//! let count: usize = env_get("ASHRED_BUFFER_COUNT", 8);
//! let workers: Option<usize> = env_get_opt("ASHRED_WORKERS");
//! # let _ = (count, workers);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default.
///
/// Unset and unparsable values both yield `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as optional value.
///
/// Returns `Some(T)` if the variable is set and parses successfully,
/// `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__ASHRED_TEST_UNSET_12345__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_opt_none() {
        let val: Option<usize> = env_get_opt("__ASHRED_TEST_UNSET_12345__");
        assert!(val.is_none());
    }

    #[test]
    fn test_env_get_str_default() {
        let val = env_get_str("__ASHRED_TEST_UNSET_12345__", "/dev/urandom");
        assert_eq!(val, "/dev/urandom");
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__ASHRED_TEST_NUM__", " 123 ");
        let val: usize = env_get("__ASHRED_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__ASHRED_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__ASHRED_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__ASHRED_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__ASHRED_TEST_INVALID__");
    }
}
