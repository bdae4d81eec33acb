use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Interval between WebSocket pings.
    pub heartbeat_interval: Duration,
    /// Connections silent for this long are dropped by the reaper.
    pub client_timeout: Duration,
    /// How often the reaper runs.
    pub reap_interval: Duration,
    /// Upper bound on a single HTTP request.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9091,
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
            reap_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
