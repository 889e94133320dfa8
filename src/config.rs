use std::time::Duration;

use anyhow::{anyhow, Context, Result};

pub const URL_VAR: &str = "BLACKEYE_SUPABASE_URL";
pub const KEY_VAR: &str = "BLACKEYE_SUPABASE_ANON_KEY";
const INTERVAL_VAR: &str = "BLACKEYE_INTERVAL_SECS";
const RESET_DELAY_VAR: &str = "BLACKEYE_RESET_DELAY_MS";
const HTTP_TIMEOUT_VAR: &str = "BLACKEYE_HTTP_TIMEOUT_SECS";

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(3000);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection parameters for the hosted backend.
#[derive(Clone)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TransmitterConfig {
    pub backend: BackendConfig,
    pub interval: Duration,
    pub reset_delay: Duration,
}

impl TransmitterConfig {
    /// Reads the process environment, falling back to values baked in at build time.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| {
            std::env::var(name).ok().or_else(|| build_time_value(name))
        })
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String> {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| anyhow!("{name} must be set"))
        };

        let url = required(URL_VAR)?.trim_end_matches('/').to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(anyhow!("{URL_VAR} must be an http(s) URL, got '{url}'"));
        }
        let anon_key = required(KEY_VAR)?;

        let interval = parse_duration(&lookup, INTERVAL_VAR, Duration::from_secs)?
            .unwrap_or(DEFAULT_INTERVAL);
        if interval.is_zero() {
            return Err(anyhow!("{INTERVAL_VAR} must be greater than zero"));
        }
        let reset_delay = parse_duration(&lookup, RESET_DELAY_VAR, Duration::from_millis)?
            .unwrap_or(DEFAULT_RESET_DELAY);
        let timeout = parse_duration(&lookup, HTTP_TIMEOUT_VAR, Duration::from_secs)?
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);

        Ok(Self {
            backend: BackendConfig {
                url,
                anon_key,
                timeout,
            },
            interval,
            reset_delay,
        })
    }
}

fn parse_duration<F>(
    lookup: &F,
    name: &str,
    unit: fn(u64) -> Duration,
) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => {
            let value: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{name} must be a whole number, got '{raw}'"))?;
            Ok(Some(unit(value)))
        }
        _ => Ok(None),
    }
}

fn build_time_value(name: &str) -> Option<String> {
    let baked = match name {
        URL_VAR => option_env!("BLACKEYE_SUPABASE_URL"),
        KEY_VAR => option_env!("BLACKEYE_SUPABASE_ANON_KEY"),
        _ => None,
    };
    baked.map(str::to_string)
}
