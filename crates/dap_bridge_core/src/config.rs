use std::time::Duration;

const DEFAULT_CONNECT_ATTEMPTS: u32 = 25;
const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Maximum TCP connect attempts while the adapter starts listening.
    pub connect_attempts: u32,
    /// Fixed delay between connect attempts.
    pub connect_retry_delay: Duration,
    pub stop_poll_interval: Duration,
    pub default_wait_timeout: Duration,
    pub client_id: String,
    pub client_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
            stop_poll_interval: DEFAULT_STOP_POLL_INTERVAL,
            default_wait_timeout: DEFAULT_WAIT_TIMEOUT,
            client_id: "dap-bridge".to_string(),
            client_name: "DAP Bridge".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let connect_attempts = std::env::var("DAP_CONNECT_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|attempts| *attempts > 0)
            .unwrap_or(defaults.connect_attempts);

        Self {
            connect_attempts,
            connect_retry_delay: env_millis("DAP_CONNECT_RETRY_DELAY_MS")
                .unwrap_or(defaults.connect_retry_delay),
            stop_poll_interval: env_millis("DAP_STOP_POLL_INTERVAL_MS")
                .unwrap_or(defaults.stop_poll_interval),
            default_wait_timeout: env_millis("DAP_WAIT_TIMEOUT_MS")
                .unwrap_or(defaults.default_wait_timeout),
            ..defaults
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
