//! Environment variable loading.
//!
//! Keeps the fallback chains in one place so business code never repeats
//! `or_else` ladders over `std::env::var`.

use std::env;
use std::path::Path;

/// Short alias → canonical variable (a migration hint is printed once).
const DEPRECATED_PAIRS: &[(&str, &str)] = &[
    ("WB_QUIET", "WORKBENCH_QUIET"),
    ("WB_CACHE_DIR", "WORKBENCH_CACHE_DIR"),
    ("WB_LOG_LEVEL", "WORKBENCH_LOG_LEVEL"),
    ("WB_LOG_JSON", "WORKBENCH_LOG_JSON"),
    ("WB_AUDIT_LOG", "WORKBENCH_AUDIT_LOG"),
];

fn warn_deprecated_env_vars() {
    use std::sync::Once;
    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        let hints: Vec<String> = DEPRECATED_PAIRS
            .iter()
            .filter(|(old, new)| env::var(old).is_ok() && env::var(new).is_err())
            .map(|(old, new)| format!("{} → {}", old, new))
            .collect();
        if !hints.is_empty() {
            tracing::warn!(
                "[DEPRECATED] the following variables are aliases, prefer:\n   {}",
                hints.join("\n   ")
            );
        }
    });
}

/// Load `.env` from the current directory into the environment (never overrides).
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let dir = env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
        load_dotenv_from_dir(&dir);
        warn_deprecated_env_vars();
    });
}

/// Load `<dir>/.env` into the environment. Variables that are already set win.
pub fn load_dotenv_from_dir(dir: &Path) {
    let Ok(content) = std::fs::read_to_string(dir.join(".env")) else {
        return;
    };
    for (key, value) in parse_dotenv(&content) {
        if env::var(&key).is_err() {
            env::set_var(key, value);
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().trim_start_matches("export ").trim();
        let mut value = value.trim();
        // Inline comment, unless the value is quoted
        if let Some(hash_pos) = value.find('#') {
            let before_hash = value[..hash_pos].trim_end();
            if !before_hash.contains('"') && !before_hash.contains('\'') {
                value = before_hash;
            }
        }
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        if !key.is_empty() {
            pairs.push((key.to_string(), value.to_string()));
        }
    }
    pairs
}

/// Read `primary`, then each alias; fall back to `default` when unset or empty.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env_optional(primary, aliases).unwrap_or_else(default)
}

/// Read `primary`, then each alias. Empty values count as unset.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// Boolean variable: `0/false/no/off` are false, anything else set is true.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    match env_optional(primary, aliases) {
        Some(s) => !matches!(s.to_lowercase().as_str(), "0" | "false" | "no" | "off"),
        None => default,
    }
}

/// Parse a variable with `FromStr`; unparseable values log a warning and use `default`.
pub fn env_parse<T>(primary: &str, aliases: &[&str], default: T) -> T
where
    T: std::str::FromStr,
{
    match env_optional(primary, aliases) {
        Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(variable = primary, value = %raw, "Unparseable value, using default");
            default
        }),
        None => default,
    }
}

/// Split a comma-separated list, dropping empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv_quotes_and_comments() {
        let pairs = parse_dotenv(
            "# comment\nA=1\nB=\"two words\"\nC=3 # trailing\nexport D='four'\n\nnot a pair\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "3".to_string()),
                ("D".to_string(), "four".to_string()),
            ]
        );
    }

    #[test]
    fn test_env_optional_alias_and_empty() {
        env::set_var("WB_TEST_LOADER_ALIAS", "from-alias");
        env::set_var("WB_TEST_LOADER_EMPTY", "   ");
        assert_eq!(
            env_optional("WB_TEST_LOADER_MISSING", &["WB_TEST_LOADER_ALIAS"]),
            Some("from-alias".to_string())
        );
        assert_eq!(env_optional("WB_TEST_LOADER_EMPTY", &[]), None);
        assert_eq!(env_or("WB_TEST_LOADER_EMPTY", &[], || "d".into()), "d");
    }

    #[test]
    fn test_env_bool_and_parse() {
        env::set_var("WB_TEST_LOADER_BOOL", "off");
        env::set_var("WB_TEST_LOADER_NUM", "42");
        env::set_var("WB_TEST_LOADER_BAD", "forty-two");
        assert!(!env_bool("WB_TEST_LOADER_BOOL", &[], true));
        assert!(env_bool("WB_TEST_LOADER_UNSET", &[], true));
        assert_eq!(env_parse::<i64>("WB_TEST_LOADER_NUM", &[], 0), 42);
        assert_eq!(env_parse::<i64>("WB_TEST_LOADER_BAD", &[], 7), 7);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" react, ,react-dom ,"), vec!["react", "react-dom"]);
        assert!(split_list("").is_empty());
    }
}
