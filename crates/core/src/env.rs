//! Environment lookups shared by the scheduler and CLI config layers.

use std::env;
use std::str::FromStr;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Parse an env var into `T`, falling back to `default` when unset or unparsable.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env_opt(key) {
        Some(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
                default
            }
        },
        None => default,
    }
}

/// Interpret common truthy spellings (`1`, `true`, `yes`, `on`).
pub fn env_flag(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
