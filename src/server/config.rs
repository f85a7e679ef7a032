//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Default liveness sweep period
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-write deadline
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default shutdown grace period
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default inbound frame size cap
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Liveness sweep period; a silent client is evicted within two periods
    pub ping_interval: Duration,

    /// Per-message wire-write deadline; a timed-out write drops that one
    /// delivery without evicting the client
    pub send_timeout: Duration,

    /// Shutdown grace period for draining connection tasks
    pub drain_timeout: Duration,

    /// Upgrade handshake must complete within this time
    pub handshake_timeout: Duration,

    /// Reject inbound frames larger than this
    pub max_frame_bytes: usize,

    /// Per-client outbound queue depth; a full queue drops deliveries
    pub outbound_queue: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9001".parse().unwrap(),
            max_connections: 0, // Unlimited
            ping_interval: DEFAULT_PING_INTERVAL,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            handshake_timeout: Duration::from_secs(10),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            outbound_queue: 64,
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the liveness sweep period
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the per-write deadline
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the shutdown grace period
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the handshake deadline
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the inbound frame size cap
    pub fn max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Set the per-client outbound queue depth (minimum 1)
    pub fn outbound_queue(mut self, depth: usize) -> Self {
        self.outbound_queue = depth.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 9001);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.max_frame_bytes, 64 * 1024);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9002".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9002);
    }

    #[test]
    fn test_builder_queue_floor() {
        let config = ServerConfig::default().outbound_queue(0);

        assert_eq!(config.outbound_queue, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .ping_interval(Duration::from_secs(15))
            .send_timeout(Duration::from_secs(2))
            .drain_timeout(Duration::from_secs(5))
            .handshake_timeout(Duration::from_secs(3))
            .max_frame_bytes(16 * 1024)
            .outbound_queue(32);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.ping_interval, Duration::from_secs(15));
        assert_eq!(config.send_timeout, Duration::from_secs(2));
        assert_eq!(config.drain_timeout, Duration::from_secs(5));
        assert_eq!(config.handshake_timeout, Duration::from_secs(3));
        assert_eq!(config.max_frame_bytes, 16 * 1024);
        assert_eq!(config.outbound_queue, 32);
    }
}
