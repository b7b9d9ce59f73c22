//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes and 0/false/off/no (case-insensitive).
/// Anything else falls back to `default`.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => true,
            "0" | "false" | "off" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Optional parsed value.
pub fn env_parse_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    init_env();
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    // each test owns its keys; the process environment is shared
    #[test]
    fn flag_parsing() {
        std::env::set_var("BHOP_TEST_FLAG_ON", "Yes");
        std::env::set_var("BHOP_TEST_FLAG_OFF", "0");
        std::env::set_var("BHOP_TEST_FLAG_JUNK", "maybe");
        assert!(env_flag("BHOP_TEST_FLAG_ON", false));
        assert!(!env_flag("BHOP_TEST_FLAG_OFF", true));
        assert!(env_flag("BHOP_TEST_FLAG_JUNK", true));
        assert!(!env_flag("BHOP_TEST_FLAG_UNSET", false));
    }

    #[test]
    fn parse_helpers() {
        std::env::set_var("BHOP_TEST_PARSE_NUM", " 42 ");
        std::env::set_var("BHOP_TEST_PARSE_BAD", "x");
        std::env::set_var("BHOP_TEST_PARSE_BLANK", "  ");
        assert_eq!(env_parse("BHOP_TEST_PARSE_NUM", 1u64), 42);
        assert_eq!(env_parse("BHOP_TEST_PARSE_BAD", 7u64), 7);
        assert_eq!(env_parse_opt::<u64>("BHOP_TEST_PARSE_BAD"), None);
        assert_eq!(env_opt("BHOP_TEST_PARSE_BLANK"), None);
    }
}
