use std::time::Duration;

use idler_core::ActivityKind;

const DEFAULT_HEADLESS_CONTAINER: &str = "fika-headless";
const DEFAULT_SERVER_CONTAINER: &str = "fika-server";
const DEFAULT_SHUTDOWN_DELAY_SEC: u64 = 300;
const DEFAULT_CHECK_INTERVAL_SEC: u64 = 5;
const DEFAULT_ERROR_BACKOFF_SEC: u64 = 10;
const DEFAULT_SERVER_PORT: u16 = 6969;
const DEFAULT_STARTUP_TIMEOUT_SEC: u64 = 30;
const DEFAULT_STARTUP_POLL_SEC: u64 = 2;
const DEFAULT_HTTP_TIMEOUT_SEC: u64 = 10;

/// Read-only settings for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub headless_container: String,
    pub server_container: String,
    pub server_port: u16,
    pub shutdown_delay: Duration,
    pub check_interval: Duration,
    pub error_backoff: Duration,
    pub startup_timeout: Duration,
    pub startup_poll: Duration,
    pub http_timeout: Duration,
    pub activity_kinds: Vec<ActivityKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            headless_container: DEFAULT_HEADLESS_CONTAINER.to_string(),
            server_container: DEFAULT_SERVER_CONTAINER.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            shutdown_delay: Duration::from_secs(DEFAULT_SHUTDOWN_DELAY_SEC),
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SEC),
            error_backoff: Duration::from_secs(DEFAULT_ERROR_BACKOFF_SEC),
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SEC),
            startup_poll: Duration::from_secs(DEFAULT_STARTUP_POLL_SEC),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SEC),
            activity_kinds: ActivityKind::ALL.to_vec(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; tests pass a map.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let name = |key: &str, default: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let secs = |key: &str, default: u64, min: u64, max: u64| {
            Duration::from_secs(clamp_logged(key, parse_num(key, get(key), default), min, max))
        };

        Self {
            headless_container: name("HEADLESS_CONTAINER_NAME", DEFAULT_HEADLESS_CONTAINER),
            server_container: name("SERVER_CONTAINER_NAME", DEFAULT_SERVER_CONTAINER),
            server_port: parse_num("IDLER_SERVER_PORT", get("IDLER_SERVER_PORT"), DEFAULT_SERVER_PORT),
            shutdown_delay: secs("SHUTDOWN_DELAY", DEFAULT_SHUTDOWN_DELAY_SEC, 10, 24 * 60 * 60),
            check_interval: secs("IDLER_CHECK_INTERVAL_SEC", DEFAULT_CHECK_INTERVAL_SEC, 1, 300),
            error_backoff: secs("IDLER_ERROR_BACKOFF_SEC", DEFAULT_ERROR_BACKOFF_SEC, 1, 600),
            startup_timeout: secs("IDLER_STARTUP_TIMEOUT_SEC", DEFAULT_STARTUP_TIMEOUT_SEC, 1, 3600),
            startup_poll: secs("IDLER_STARTUP_POLL_SEC", DEFAULT_STARTUP_POLL_SEC, 1, 60),
            http_timeout: secs("IDLER_HTTP_TIMEOUT_SEC", DEFAULT_HTTP_TIMEOUT_SEC, 1, 120),
            activity_kinds: parse_activity_kinds(get("IDLER_ACTIVITY_KINDS")),
        }
    }

    /// Base URL of the primary server API, addressed by container name.
    pub fn server_base_url(&self) -> String {
        format!("https://{}:{}", self.server_container, self.server_port)
    }
}

fn parse_num<T: std::str::FromStr + Copy + std::fmt::Display>(
    key: &str,
    raw: Option<String>,
    default: T,
) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(key, value = %raw, %default, "invalid number in environment, using default");
            default
        }
    }
}

fn clamp_logged(key: &str, value: u64, min: u64, max: u64) -> u64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!(key, value, clamped, "value out of range, clamping");
    }
    clamped
}

fn parse_activity_kinds(raw: Option<String>) -> Vec<ActivityKind> {
    let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
        return ActivityKind::ALL.to_vec();
    };

    let mut out = Vec::new();
    for part in raw.split(',') {
        let p = part.trim();
        if p.is_empty() {
            continue;
        }
        match p.parse::<ActivityKind>() {
            Ok(k) if !out.contains(&k) => out.push(k),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring activity kind"),
        }
    }

    if out.is_empty() {
        tracing::warn!("no usable activity kinds configured, watching all");
        return ActivityKind::ALL.to_vec();
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let cfg = from_pairs(&[]);
        assert_eq!(cfg.headless_container, "fika-headless");
        assert_eq!(cfg.server_container, "fika-server");
        assert_eq!(cfg.shutdown_delay, Duration::from_secs(300));
        assert_eq!(cfg.check_interval, Duration::from_secs(5));
        assert_eq!(cfg.startup_timeout, Duration::from_secs(30));
        assert_eq!(cfg.activity_kinds, ActivityKind::ALL.to_vec());
        assert_eq!(cfg.server_base_url(), "https://fika-server:6969");
    }

    #[test]
    fn overrides_are_trimmed_and_clamped() {
        let cfg = from_pairs(&[
            ("HEADLESS_CONTAINER_NAME", "  hc  "),
            ("SERVER_CONTAINER_NAME", ""),
            ("SHUTDOWN_DELAY", "1"),
            ("IDLER_CHECK_INTERVAL_SEC", "100000"),
            ("IDLER_SERVER_PORT", "7000"),
        ]);
        assert_eq!(cfg.headless_container, "hc");
        assert_eq!(cfg.server_container, "fika-server");
        assert_eq!(cfg.shutdown_delay, Duration::from_secs(10));
        assert_eq!(cfg.check_interval, Duration::from_secs(300));
        assert_eq!(cfg.server_base_url(), "https://fika-server:7000");
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn clamped_values_are_reported() {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let cfg = tracing::subscriber::with_default(subscriber, || {
            from_pairs(&[("SHUTDOWN_DELAY", "5"), ("IDLER_STARTUP_POLL_SEC", "2")])
        });

        assert_eq!(cfg.shutdown_delay, Duration::from_secs(10));
        let logs = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("WARN"));
        assert!(logs.contains("SHUTDOWN_DELAY"));
        assert!(logs.contains("clamped=10"));
        assert!(!logs.contains("IDLER_STARTUP_POLL_SEC"));
    }

    #[test]
    fn garbage_numbers_fall_back_to_defaults() {
        let cfg = from_pairs(&[("SHUTDOWN_DELAY", "five minutes"), ("IDLER_SERVER_PORT", "-1")]);
        assert_eq!(cfg.shutdown_delay, Duration::from_secs(300));
        assert_eq!(cfg.server_port, 6969);
    }

    #[test]
    fn activity_kinds_can_be_restricted() {
        let cfg = from_pairs(&[("IDLER_ACTIVITY_KINDS", "raid, login,bogus,raid")]);
        assert_eq!(cfg.activity_kinds, vec![ActivityKind::RaidPing, ActivityKind::Login]);

        let cfg = from_pairs(&[("IDLER_ACTIVITY_KINDS", "bogus")]);
        assert_eq!(cfg.activity_kinds, ActivityKind::ALL.to_vec());
    }
}
