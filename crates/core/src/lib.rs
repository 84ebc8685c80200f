pub mod collect;
pub mod domain;
pub mod fetch;
pub mod pipeline;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    pub const DEFAULT_API_BASE_URL: &str = "https://finance-mhb-api.kro.kr";
    const DEFAULT_DATA_DIR: &str = "public/data";
    const DEFAULT_BUILD_DIR: &str = "dist";
    const DEFAULT_FETCH_CRON: &str = "0 30 8 * * *";
    const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
    const DEFAULT_PACE_MS: u64 = 100;
    const DEFAULT_STOCK_LIST_LIMIT: usize = 1000;
    const DEFAULT_FLUSH_EVERY: usize = 10;
    const DEFAULT_PORT: u16 = 3000;
    const DEFAULT_HISTORY_MONTHS: u32 = 12;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub api_base_url: String,
        pub data_dir: PathBuf,
        pub fetch_timeout: Duration,
        pub pace: Duration,
        pub stock_list_limit: usize,
        pub flush_every: usize,
        /// How far back dated stock-list archives are backfilled; 0 disables it.
        pub history_months: u32,
        pub sentry_dsn: Option<String>,
        pub port: u16,
        pub app_env: String,
        pub build_dir: PathBuf,
        pub fetch_cron: String,
        pub scheduler_enabled: bool,
        pub fetch_on_start: bool,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
                data_dir: PathBuf::from(DEFAULT_DATA_DIR),
                fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
                pace: Duration::from_millis(DEFAULT_PACE_MS),
                stock_list_limit: DEFAULT_STOCK_LIST_LIMIT,
                flush_every: DEFAULT_FLUSH_EVERY,
                history_months: DEFAULT_HISTORY_MONTHS,
                sentry_dsn: None,
                port: DEFAULT_PORT,
                app_env: "production".to_string(),
                build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
                fetch_cron: DEFAULT_FETCH_CRON.to_string(),
                scheduler_enabled: true,
                fetch_on_start: false,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();

            let flush_every = env_parse("FLUSH_EVERY").unwrap_or(defaults.flush_every);
            anyhow::ensure!(flush_every >= 1, "FLUSH_EVERY must be >= 1");

            let stock_list_limit =
                env_parse("STOCK_LIST_LIMIT").unwrap_or(defaults.stock_list_limit);
            anyhow::ensure!(stock_list_limit >= 1, "STOCK_LIST_LIMIT must be >= 1");

            Ok(Self {
                api_base_url: env_non_empty("EXPO_PUBLIC_API_URL")
                    .unwrap_or(defaults.api_base_url),
                data_dir: env_non_empty("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.data_dir),
                fetch_timeout: env_parse("FETCH_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.fetch_timeout),
                pace: env_parse("FETCH_PACE_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.pace),
                stock_list_limit,
                flush_every,
                history_months: env_parse("HISTORY_MONTHS").unwrap_or(defaults.history_months),
                sentry_dsn: env_non_empty("SENTRY_DSN"),
                port: env_parse("PORT").unwrap_or(defaults.port),
                app_env: env_non_empty("APP_ENV").unwrap_or(defaults.app_env),
                build_dir: env_non_empty("BUILD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.build_dir),
                fetch_cron: env_non_empty("FETCH_CRON").unwrap_or(defaults.fetch_cron),
                scheduler_enabled: env_flag("SCHEDULER_ENABLED")
                    .unwrap_or(defaults.scheduler_enabled),
                fetch_on_start: env_flag("FETCH_ON_START").unwrap_or(defaults.fetch_on_start),
            })
        }

        pub fn require_build_dir(&self) -> anyhow::Result<&std::path::Path> {
            anyhow::ensure!(
                self.build_dir.is_dir(),
                "build directory not found: {} (build the web bundle first)",
                self.build_dir.display()
            );
            Ok(&self.build_dir)
        }

        pub fn require_data_dir(&self) -> anyhow::Result<&std::path::Path> {
            std::fs::create_dir_all(&self.data_dir).with_context(|| {
                format!("failed to create data dir {}", self.data_dir.display())
            })?;
            Ok(&self.data_dir)
        }
    }

    fn env_non_empty(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

    fn env_flag(key: &str) -> Option<bool> {
        let v = std::env::var(key).ok()?;
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn defaults_match_reference_pipeline() {
            let s = Settings::default();
            assert_eq!(s.api_base_url, DEFAULT_API_BASE_URL);
            assert_eq!(s.fetch_timeout, Duration::from_secs(300));
            assert_eq!(s.pace, Duration::from_millis(100));
            assert_eq!(s.stock_list_limit, 1000);
            assert_eq!(s.flush_every, 10);
            assert_eq!(s.fetch_cron, "0 30 8 * * *");
            assert_eq!(s.app_env, "production");
            assert_eq!(s.history_months, 12);
        }

        #[test]
        fn missing_build_dir_is_rejected() {
            let s = Settings {
                build_dir: PathBuf::from("/definitely/not/a/build/dir"),
                ..Settings::default()
            };
            assert!(s.require_build_dir().is_err());
        }
    }
}
