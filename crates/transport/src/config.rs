use std::time::Duration;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Growth factor applied after every retry.
    pub multiplier: f64,
    /// Upper bound for a single interval.
    pub max_interval: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
        }
    }
}

/// Connection pool and per-phase timeouts of the underlying client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    pub tcp_keepalive: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(30),
            tcp_keepalive: Duration::from_secs(30),
        }
    }
}

/// Per-profile transport configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Deadline of a single attempt, request and response bodies included.
    /// `None` leaves the attempt unbounded apart from the connect timeout.
    pub timeout: Option<Duration>,
    /// Retries after the first attempt (idempotent requests only).
    pub max_retries: u32,
    /// Ceiling on the total time spent retrying.
    pub max_elapsed: Duration,
    pub backoff: BackoffConfig,
    pub pool: PoolConfig,
}

impl ClientConfig {
    /// Profile for metadata and control calls.
    pub fn default_profile() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            max_retries: 3,
            max_elapsed: Duration::from_secs(5 * 60),
            backoff: BackoffConfig::default(),
            pool: PoolConfig::default(),
        }
    }

    /// Profile for large binary transfers.
    pub fn long_lived() -> Self {
        Self {
            timeout: Some(Duration::from_secs(10 * 60)),
            max_retries: 3,
            max_elapsed: Duration::from_secs(30 * 60),
            backoff: BackoffConfig::default(),
            pool: PoolConfig::default(),
        }
    }

    /// Profile for whole-file streamed uploads, whose duration grows with the
    /// file size. There is no total deadline; dead peers surface through the
    /// connect timeout and TCP keepalive, and callers cancel explicitly.
    pub fn streaming() -> Self {
        Self {
            timeout: None,
            max_retries: 0,
            ..Self::long_lived()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::default_profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_values() {
        let c = ClientConfig::default_profile();
        assert_eq!(c.timeout, Some(Duration::from_secs(30)));
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.max_elapsed, Duration::from_secs(300));
        assert_eq!(c, ClientConfig::default());
    }

    #[test]
    fn long_lived_profile_values() {
        let c = ClientConfig::long_lived();
        assert_eq!(c.timeout, Some(Duration::from_secs(600)));
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.max_elapsed, Duration::from_secs(1800));
    }

    #[test]
    fn streaming_profile_has_no_deadline() {
        let c = ClientConfig::streaming();
        assert_eq!(c.timeout, None);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.pool, PoolConfig::default());
        assert_eq!(c.pool.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn backoff_defaults() {
        let b = BackoffConfig::default();
        assert_eq!(b.initial_interval, Duration::from_millis(500));
        assert!((b.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(b.max_interval, Duration::from_secs(30));
    }
}
