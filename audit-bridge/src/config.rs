use std::env;
use std::time::Duration;

use crate::pipeline::RetryPolicy;

pub const DEFAULT_FALCO_URL: &str = "http://falco:8765/k8s-audit";
pub const DEFAULT_SUBSCRIPTION: &str = "falco-gke-audit-bridge";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub falco_url: String,
    pub subscription: String,
    pub topic: String,
    pub kafka_bootstrap: String,
    pub rate_limit_per_second: u32,
    pub rate_limit_window_secs: u64,
    pub max_in_flight: usize,
    pub worker_concurrency: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub delivery_timeout: Duration,
    pub server_port: u16,
    pub log_level: String,
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|value| value.trim().parse::<u64>().ok());

        let falco_url = lookup("FALCO_URL").unwrap_or_else(|| DEFAULT_FALCO_URL.to_string());
        let subscription =
            lookup("AUDIT_SUBSCRIPTION").unwrap_or_else(|| DEFAULT_SUBSCRIPTION.to_string());
        let topic = lookup("AUDIT_TOPIC").unwrap_or_else(|| "gke.audit.events".to_string());
        let kafka_bootstrap =
            lookup("KAFKA_BOOTSTRAP").unwrap_or_else(|| "localhost:9092".to_string());
        let rate_limit_per_second = parsed("RATE_LIMIT_PER_SECOND").unwrap_or(2);
        let rate_limit_window_secs = parsed("RATE_LIMIT_WINDOW").unwrap_or(1);
        let max_in_flight = parsed("MAX_IN_FLIGHT").unwrap_or(100).max(1) as usize;
        let worker_concurrency = parsed("WORKER_CONCURRENCY")
            .map(|value| value as usize)
            .unwrap_or(max_in_flight);
        let max_retries = parsed("DELIVERY_MAX_RETRIES").unwrap_or(3);
        let retry_delay_ms = parsed("DELIVERY_RETRY_DELAY_MS").unwrap_or(0);
        let delivery_timeout_secs = parsed("DELIVERY_TIMEOUT_SECS").unwrap_or(10);
        let server_port = lookup("SERVER_PORT")
            .and_then(|value| value.trim().parse::<u16>().ok())
            .unwrap_or(8080);
        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Self {
            falco_url,
            subscription,
            topic,
            kafka_bootstrap,
            rate_limit_per_second: rate_limit_per_second.clamp(1, u32::MAX as u64) as u32,
            rate_limit_window_secs: rate_limit_window_secs.max(1),
            max_in_flight,
            worker_concurrency: worker_concurrency.max(1),
            max_retries: max_retries.min(u32::MAX as u64) as u32,
            retry_delay: Duration::from_millis(retry_delay_ms),
            delivery_timeout: Duration::from_secs(delivery_timeout_secs.max(1)),
            server_port,
            log_level,
        }
    }

    /// Admissions allowed per window: the per-second rate scaled to the window.
    pub fn rate_limit_ceiling(&self) -> u32 {
        let ceiling = self.rate_limit_per_second as u64 * self.rate_limit_window_secs;
        ceiling.min(u32::MAX as u64) as u32
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_retries: self.max_retries, delay: self.retry_delay }
    }

    /// Per-event payload logging is only wanted when explicitly debugging.
    pub fn verbose(&self) -> bool {
        self.log_level.eq_ignore_ascii_case("debug")
    }
}
