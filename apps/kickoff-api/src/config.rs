use std::time::Duration;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Worker id baked into chat message snowflakes.
    pub worker_id: u16,
    /// Real-time channel tuning.
    pub gateway: GatewayConfig,
}

/// Per-connection knobs for the real-time channels.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Capacity of each connection's zone queue. A full queue gets the
    /// connection evicted on the next broadcast.
    pub outbound_capacity: usize,
    /// How often the writer sends a ping while idle.
    pub ping_interval: Duration,
    /// Read deadline, refreshed by every inbound frame (pongs included).
    pub pong_wait: Duration,
    /// Upper bound on a single frame write.
    pub write_wait: Duration,
    /// Whether a bound connection may move to another zone.
    pub allow_zone_change: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            ping_interval: Duration::from_secs(30),
            pong_wait: Duration::from_secs(120),
            write_wait: Duration::from_secs(10),
            allow_zone_change: false,
        }
    }
}

impl GatewayConfig {
    /// Load overrides from `GATEWAY_*` variables on top of the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            outbound_capacity: parsed_var("GATEWAY_OUTBOUND_CAPACITY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.outbound_capacity),
            ping_interval: parsed_var("GATEWAY_PING_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ping_interval),
            pong_wait: parsed_var("GATEWAY_PONG_WAIT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.pong_wait),
            write_wait: parsed_var("GATEWAY_WRITE_WAIT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.write_wait),
            allow_zone_change: parsed_var("GATEWAY_ALLOW_ZONE_CHANGE")
                .unwrap_or(defaults.allow_zone_change),
        };
        config.normalized()
    }

    /// Keep the ping period strictly below the read deadline, otherwise an
    /// idle but healthy peer would time out between pings.
    pub fn normalized(mut self) -> Self {
        if self.pong_wait.is_zero() {
            self.pong_wait = Self::default().pong_wait;
        }
        if self.ping_interval.is_zero() || self.ping_interval >= self.pong_wait {
            self.ping_interval = self.pong_wait * 9 / 10;
        }
        self
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            port: parsed_var("PORT").unwrap_or(4100),
            worker_id: parsed_var("WORKER_ID").unwrap_or(0),
            gateway: GatewayConfig::from_env(),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
