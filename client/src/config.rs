//! Session configuration resolved once at startup.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Connection retry budget. Exceeding `max_attempts` leaves a channel closed
/// until the caller reopens it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub handshake_timeout: Duration,
    /// An open channel that hears nothing for this long is treated as dropped.
    pub silence_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(1000),
            handshake_timeout: Duration::from_millis(1500),
            silence_timeout: Duration::from_millis(5000),
        }
    }
}

/// Startup hold, countdown and end-sequence pacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub startup_hold: Duration,
    pub countdown_step: Duration,
    pub countdown_pause: Duration,
    pub countdown_from: u8,
    pub end_sequence_frames: u32,
}

impl Timing {
    /// Time from the first tick until the ready flag flips.
    pub fn time_to_ready(&self) -> Duration {
        self.startup_hold + self.countdown_step * self.countdown_from as u32 + self.countdown_pause
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            startup_hold: Duration::from_millis(500),
            countdown_step: Duration::from_millis(1000),
            countdown_pause: Duration::from_millis(200),
            countdown_from: 3,
            end_sequence_frames: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub retry: RetryPolicy,
    pub timing: Timing,
    pub identity_url: Option<String>,
    pub results_url: Option<String>,
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            retry: RetryPolicy::default(),
            timing: Timing::default(),
            identity_url: None,
            results_url: None,
        }
    }

    /// Resolves `host:port` into the channel address.
    pub fn resolve(host: &str, port: u16) -> std::io::Result<Self> {
        let server_addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for {}:{}", host, port),
            )
        })?;
        Ok(Self::new(server_addr))
    }

    pub fn with_services(
        mut self,
        identity_url: Option<String>,
        results_url: Option<String>,
    ) -> Self {
        self.identity_url = identity_url;
        self.results_url = results_url;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_time_to_ready() {
        let timing = Timing::default();
        assert_eq!(timing.time_to_ready(), Duration::from_millis(3700));
        assert!(timing.time_to_ready() >= Duration::from_millis(3200));
    }

    #[test]
    fn test_resolve_ip_literal() {
        let config = ClientConfig::resolve("127.0.0.1", 9000).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.identity_url.is_none());
    }
}
