//! Runtime and per-connection configuration.
//!
//! There is no on-disk config file format: the runtime is a library embedded by a host
//! process, so configuration is always constructed in code, mirroring the [`SetupFrameBuilder`]
//! builder idiom.
//!
//! [`SetupFrameBuilder`]: crate::frame::codec::SetupFrameBuilder
use crate::consts::{DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_KEEPALIVE_TIMEOUT};

use std::time::Duration;

/// Ceiling imposed by the wire format itself: frame lengths travel in a 3-byte big-endian
/// prefix, so no frame can ever exceed this regardless of configuration.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const DEFAULT_MAX_FRAME_SIZE: usize = MAX_FRAME_SIZE;
const DEFAULT_FRAGMENTATION_THRESHOLD: usize = 1024 * 1024;
const DEFAULT_NAMESPACE: &str = "default";

/// Tunables for a single connection: keepalive cadence, frame size ceiling, the threshold above
/// which an outbound frame is fragmented, and the namespace this side's own exports fall back to
/// when none is given explicitly.
///
/// The keepalive settings are a liveness signal only (§5 of the design this crate follows): a
/// connection that stops hearing from its peer within `keepalive_timeout` logs and closes, it
/// never attempts to reconnect or resume.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    keepalive_interval: Duration,
    keepalive_timeout: Duration,
    max_frame_size: usize,
    fragmentation_threshold: usize,
    default_namespace: String,
}

impl ConnectionConfig {
    /// Returns a builder seeded with the crate's defaults.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Returns the interval between KEEPALIVE frames this side sends.
    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    /// Returns how long this side waits for a KEEPALIVE before treating the peer as dead.
    pub fn keepalive_timeout(&self) -> Duration {
        self.keepalive_timeout
    }

    /// Returns the largest frame this connection will write without fragmenting it.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Returns the payload size above which an outbound frame is proactively fragmented, even
    /// if it would still fit under `max_frame_size`.
    pub fn fragmentation_threshold(&self) -> usize {
        self.fragmentation_threshold
    }

    /// Returns the namespace this side's own exports fall back to when none is given.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            fragmentation_threshold: DEFAULT_FRAGMENTATION_THRESHOLD,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// A builder for configuring a [`ConnectionConfig`].
#[derive(Debug)]
pub struct ConnectionConfigBuilder(ConnectionConfig);

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        ConnectionConfigBuilder(ConnectionConfig::default())
    }
}

impl ConnectionConfigBuilder {
    /// Sets the interval between KEEPALIVE frames this side sends.
    pub fn set_keepalive_interval(mut self, interval: Duration) -> Self {
        self.0.keepalive_interval = interval;
        self
    }

    /// Sets how long this side waits for a KEEPALIVE before treating the peer as dead.
    pub fn set_keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.0.keepalive_timeout = timeout;
        self
    }

    /// Sets the largest frame this connection will write without fragmenting it.
    ///
    /// # Panics
    ///
    /// Panics if `size` exceeds [`MAX_FRAME_SIZE`], the wire format's own ceiling.
    pub fn set_max_frame_size(mut self, size: usize) -> Self {
        assert!(size <= MAX_FRAME_SIZE, "max_frame_size exceeds the wire format's 16 MiB ceiling");
        self.0.max_frame_size = size;
        self
    }

    /// Sets the payload size above which an outbound frame is proactively fragmented.
    pub fn set_fragmentation_threshold(mut self, size: usize) -> Self {
        self.0.fragmentation_threshold = size;
        self
    }

    /// Sets the namespace this side's own exports fall back to when none is given.
    pub fn set_default_namespace<T: Into<String>>(mut self, namespace: T) -> Self {
        self.0.default_namespace = namespace.into();
        self
    }

    /// Builds the [`ConnectionConfig`].
    pub fn build(self) -> ConnectionConfig {
        self.0
    }
}

/// Process-wide defaults a host applies to every connection it accepts or dials, unless a call
/// site overrides them with its own [`ConnectionConfig`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    default_connection: ConnectionConfig,
}

impl RuntimeConfig {
    /// Returns a builder seeded with the crate's defaults.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Returns the connection configuration new connections start from.
    pub fn default_connection_config(&self) -> &ConnectionConfig {
        &self.default_connection
    }
}

/// A builder for configuring a [`RuntimeConfig`].
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder(RuntimeConfig);

impl RuntimeConfigBuilder {
    /// Sets the connection configuration new connections start from.
    pub fn set_default_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.0.default_connection = config;
        self
    }

    /// Builds the [`RuntimeConfig`].
    pub fn build(self) -> RuntimeConfig {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_setup_frame_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.keepalive_interval(), DEFAULT_KEEPALIVE_INTERVAL);
        assert_eq!(config.keepalive_timeout(), DEFAULT_KEEPALIVE_TIMEOUT);
        assert_eq!(config.default_namespace(), "default");
    }

    #[test]
    fn builder_overrides_apply() {
        let config = ConnectionConfig::builder()
            .set_keepalive_interval(Duration::from_secs(5))
            .set_fragmentation_threshold(4096)
            .set_default_namespace("iotas.greeting")
            .build();
        assert_eq!(config.keepalive_interval(), Duration::from_secs(5));
        assert_eq!(config.fragmentation_threshold(), 4096);
        assert_eq!(config.default_namespace(), "iotas.greeting");
    }

    #[test]
    #[should_panic]
    fn max_frame_size_above_ceiling_panics() {
        ConnectionConfig::builder().set_max_frame_size(MAX_FRAME_SIZE + 1);
    }

    #[test]
    fn runtime_config_carries_default_connection_config() {
        let conn = ConnectionConfig::builder().set_default_namespace("ns").build();
        let runtime = RuntimeConfig::builder().set_default_connection_config(conn).build();
        assert_eq!(runtime.default_connection_config().default_namespace(), "ns");
    }
}
