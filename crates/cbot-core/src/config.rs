use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, messaging::throttled::ThrottleConfig, Result};

/// Typed runtime configuration, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Transport
    pub telegram_bot_token: String,

    // Identity
    pub bot_id: Option<String>,
    pub bot_language: String,

    // Dispatcher
    /// `None` means one worker per logical CPU.
    pub workers: Option<usize>,
    pub serialize_chats: bool,
    pub shutdown_grace: Duration,

    // Sessions
    /// `None` keeps sessions in memory only.
    pub session_store_path: Option<PathBuf>,

    // Outbound rate limiting
    pub throttle: ThrottleConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process environment in
    /// [`Config::load`]).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;

        let bot_id = get("BOT_ID");
        let bot_language = get("BOT_LANGUAGE")
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "en".to_string());

        let workers = match get("WORKER_COUNT") {
            None => None,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(Error::Config(format!(
                        "WORKER_COUNT must be a positive integer, got {raw:?}"
                    )))
                }
                Ok(n) => Some(n),
            },
        };

        let serialize_chats = get("SERIALIZE_CHATS").map(|s| parse_bool(&s)).unwrap_or(true);
        let shutdown_grace =
            Duration::from_millis(parse_u64(get("SHUTDOWN_GRACE_MS")).unwrap_or(5_000));

        let session_store_path = get("SESSION_STORE_PATH").map(PathBuf::from);

        let defaults = ThrottleConfig::default();
        let throttle = ThrottleConfig {
            global_min_interval: parse_u64(get("THROTTLE_GLOBAL_MS"))
                .map(Duration::from_millis)
                .unwrap_or(defaults.global_min_interval),
            per_chat_min_interval: parse_u64(get("THROTTLE_PER_CHAT_MS"))
                .map(Duration::from_millis)
                .unwrap_or(defaults.per_chat_min_interval),
        };

        Ok(Self {
            telegram_bot_token,
            bot_id,
            bot_language,
            workers,
            serialize_chats,
            shutdown_grace,
            session_store_path,
            throttle,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn token_is_required() {
        let err = from_pairs(&[]).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));

        let err = from_pairs(&[("TELEGRAM_BOT_TOKEN", "   ")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = from_pairs(&[("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(cfg.telegram_bot_token, "123:abc");
        assert_eq!(cfg.bot_id, None);
        assert_eq!(cfg.bot_language, "en");
        assert_eq!(cfg.workers, None);
        assert!(cfg.serialize_chats);
        assert_eq!(cfg.shutdown_grace, Duration::from_secs(5));
        assert_eq!(cfg.session_store_path, None);
        assert_eq!(cfg.throttle.global_min_interval, Duration::from_millis(40));
        assert_eq!(cfg.throttle.per_chat_min_interval, Duration::from_millis(1050));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = from_pairs(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("BOT_ID", "helper"),
            ("BOT_LANGUAGE", " IT "),
            ("WORKER_COUNT", "3"),
            ("SERIALIZE_CHATS", "off"),
            ("SHUTDOWN_GRACE_MS", "250"),
            ("SESSION_STORE_PATH", "/var/lib/cbot/sessions.json"),
            ("THROTTLE_GLOBAL_MS", "0"),
            ("THROTTLE_PER_CHAT_MS", "500"),
        ])
        .unwrap();

        assert_eq!(cfg.bot_id.as_deref(), Some("helper"));
        assert_eq!(cfg.bot_language, "it");
        assert_eq!(cfg.workers, Some(3));
        assert!(!cfg.serialize_chats);
        assert_eq!(cfg.shutdown_grace, Duration::from_millis(250));
        assert_eq!(
            cfg.session_store_path,
            Some(PathBuf::from("/var/lib/cbot/sessions.json"))
        );
        assert_eq!(cfg.throttle.global_min_interval, Duration::ZERO);
        assert_eq!(cfg.throttle.per_chat_min_interval, Duration::from_millis(500));
    }

    #[test]
    fn worker_count_must_be_positive() {
        for bad in ["0", "many", "-2"] {
            let err = from_pairs(&[("TELEGRAM_BOT_TOKEN", "t"), ("WORKER_COUNT", bad)]).unwrap_err();
            assert!(err.to_string().contains("WORKER_COUNT"), "{bad}: {err}");
        }
    }

    #[test]
    fn unquote_strips_matching_quotes_only() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("\"abc'"), "\"abc'");
        assert_eq!(unquote("x"), "x");
    }
}
