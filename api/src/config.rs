//! Server configuration read from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HOST` | 0.0.0.0 |
//! | `PORT` | 3000 |
//! | `APP_NAME` | myLibApp |
//! | `PAGE_SIZE_DEFAULT` | 20 |
//! | `PAGE_SIZE_MAX` | 2000 |
//! | `INDEX_RETRY_INTERVAL_MS` | 5000 |
//! | `INDEX_RETRY_MAX_ATTEMPTS` | 10 |
//!
//! Unparsable values are logged and replaced by the default.

use crate::pagination::PaginationConfig;
use application::RetryPolicy;
use std::env;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_APP_NAME: &str = "myLibApp";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Used to build the `X-<name>-alert` family of headers.
    pub application_name: String,
    pub pagination: PaginationConfig,
    pub index_retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            application_name: DEFAULT_APP_NAME.to_string(),
            pagination: PaginationConfig::default(),
            index_retry: RetryPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let application_name = match lookup("APP_NAME") {
            Some(name) if is_valid_app_name(&name) => name,
            Some(name) => {
                warn!(
                    "Invalid APP_NAME value '{}' in environment. Using default {}.",
                    name, DEFAULT_APP_NAME
                );
                defaults.application_name.clone()
            }
            None => defaults.application_name.clone(),
        };

        let max_size = positive(
            "PAGE_SIZE_MAX",
            parse_var(&lookup, "PAGE_SIZE_MAX", defaults.pagination.max_size),
            defaults.pagination.max_size,
        );
        let default_size = positive(
            "PAGE_SIZE_DEFAULT",
            parse_var(&lookup, "PAGE_SIZE_DEFAULT", defaults.pagination.default_size),
            defaults.pagination.default_size,
        )
        .min(max_size);

        let interval_ms = positive(
            "INDEX_RETRY_INTERVAL_MS",
            parse_var(
                &lookup,
                "INDEX_RETRY_INTERVAL_MS",
                defaults.index_retry.interval.as_millis() as u64,
            ),
            defaults.index_retry.interval.as_millis() as u64,
        );
        let max_attempts = positive(
            "INDEX_RETRY_MAX_ATTEMPTS",
            parse_var(
                &lookup,
                "INDEX_RETRY_MAX_ATTEMPTS",
                defaults.index_retry.max_attempts,
            ),
            defaults.index_retry.max_attempts,
        );

        Self {
            host: parse_var(&lookup, "HOST", defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port),
            application_name,
            pagination: PaginationConfig {
                default_size,
                max_size,
            },
            index_retry: RetryPolicy {
                interval: Duration::from_millis(interval_ms),
                max_attempts,
            },
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => {
                info!("Using {} = {} from environment variable.", key, value);
                value
            }
            Err(_) => {
                warn!(
                    "Invalid {} value '{}' in environment variable. Using default {}.",
                    key, raw, default
                );
                default
            }
        },
        None => default,
    }
}

fn positive<T>(key: &str, value: T, default: T) -> T
where
    T: PartialOrd + Default + Display,
{
    if value > T::default() {
        value
    } else {
        warn!("{} must be greater than zero. Using default {}.", key, default);
        default
    }
}

/// Application names end up inside header names, so only token characters are allowed.
fn is_valid_app_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
