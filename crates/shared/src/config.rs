use crate::errors::AppError;
use crate::tracing::LogFormat;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub contract_address: Option<String>,
    pub environment: String,
    pub receipt_poll_interval_ms: u64,
    pub log_format: LogFormat,
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            contract_address: None,
            environment: "dev".to_string(),
            receipt_poll_interval_ms: 1000,
            log_format: LogFormat::Text,
            event_channel_capacity: 64,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Config::default();

        Ok(Config {
            contract_address: env::var("TODO_CONTRACT_ADDRESS")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            receipt_poll_interval_ms: parse_var(
                "RECEIPT_POLL_INTERVAL_MS",
                defaults.receipt_poll_interval_ms,
            )?,
            log_format: match env::var("LOG_FORMAT") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.log_format,
            },
            event_channel_capacity: parse_var(
                "EVENT_CHANNEL_CAPACITY",
                defaults.event_channel_capacity,
            )?,
        })
    }

    /// コントラクトアドレスを取得（未設定ならエラー）
    pub fn require_contract_address(&self) -> Result<&str, AppError> {
        self.contract_address.as_deref().ok_or_else(|| {
            AppError::Configuration("TODO_CONTRACT_ADDRESS is not set".to_string())
        })
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| AppError::Configuration(format!("{name}={value}: {e}"))),
        Err(_) => Ok(default),
    }
}
