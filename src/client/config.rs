//! Adapter configuration

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::channel::Demultiplexer;
use crate::protocol::constants::*;
use crate::protocol::record::Modality;

/// Adapter configuration options
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Streaming bridge address
    pub bridge_addr: SocketAddr,

    /// Device identifier passed to `device_connect`
    pub device_id: String,

    /// Modalities to subscribe to, in handshake order
    pub modalities: Vec<Modality>,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Bound on a single socket receive (also the stop-signal latency)
    pub read_timeout: Duration,

    /// Maximum bytes per socket receive
    pub read_buffer_size: usize,

    /// Maximum unterminated bytes held by the frame buffer
    pub max_pending_bytes: usize,

    /// Pause after a fatal stream error before returning to the caller
    pub error_backoff: Duration,

    /// Enable TCP_NODELAY (commands are tiny)
    pub tcp_nodelay: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            bridge_addr: SocketAddr::new(IpAddr::V4(DEFAULT_BRIDGE_IP), DEFAULT_BRIDGE_PORT),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            modalities: Modality::ALL.to_vec(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(3),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            error_backoff: Duration::from_secs(1),
            tcp_nodelay: true,
        }
    }
}

impl AdapterConfig {
    /// Create a config for a bridge address and device
    pub fn new(bridge_addr: SocketAddr, device_id: impl Into<String>) -> Self {
        Self {
            bridge_addr,
            device_id: device_id.into(),
            ..Default::default()
        }
    }

    /// Set the bridge address
    pub fn bridge(mut self, addr: SocketAddr) -> Self {
        self.bridge_addr = addr;
        self
    }

    /// Set the device identifier
    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = id.into();
        self
    }

    /// Subscribe only to the given modalities.
    ///
    /// Duplicates are removed; order is normalized to the handshake order.
    pub fn modalities(mut self, modalities: &[Modality]) -> Self {
        self.modalities = Modality::ALL
            .into_iter()
            .filter(|m| modalities.contains(m))
            .collect();
        self
    }

    /// Stop subscribing to one modality
    pub fn disable(mut self, modality: Modality) -> Self {
        self.modalities.retain(|m| *m != modality);
        self
    }

    /// Check if a modality is subscribed
    pub fn is_enabled(&self, modality: Modality) -> bool {
        self.modalities.contains(&modality)
    }

    /// Modalities to request from the bridge for a routing table.
    ///
    /// An enabled modality without a sink is not requested. A routed modality
    /// that is disabled here never receives samples.
    pub fn subscriptions(&self, demux: &Demultiplexer) -> Vec<Modality> {
        for modality in demux.modalities() {
            if !self.is_enabled(modality) {
                tracing::warn!(modality = %modality, "Channel registered for a disabled modality");
            }
        }

        self.modalities
            .iter()
            .copied()
            .filter(|m| demux.is_routed(*m))
            .collect()
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set receive buffer size (at least 1 byte)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set frame buffer limit
    pub fn max_pending_bytes(mut self, size: usize) -> Self {
        self.max_pending_bytes = size;
        self
    }

    /// Set backoff after fatal errors
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelDescriptor;

    fn discard(_: &ChannelDescriptor, _: f64, _: &[f64]) {}

    #[test]
    fn test_default_config() {
        let config = AdapterConfig::default();

        assert_eq!(config.bridge_addr.port(), DEFAULT_BRIDGE_PORT);
        assert_eq!(config.device_id, DEFAULT_DEVICE_ID);
        assert_eq!(config.modalities, Modality::ALL.to_vec());
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.error_backoff, Duration::from_secs(1));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_modalities_normalized() {
        let config = AdapterConfig::default().modalities(&[
            Modality::Temperature,
            Modality::Acceleration,
            Modality::Temperature,
        ]);

        assert_eq!(
            config.modalities,
            vec![Modality::Acceleration, Modality::Temperature]
        );
        assert!(!config.is_enabled(Modality::Bvp));
    }

    #[test]
    fn test_disable() {
        let config = AdapterConfig::default().disable(Modality::Gsr);

        assert!(!config.is_enabled(Modality::Gsr));
        assert_eq!(config.modalities.len(), 3);
    }

    #[test]
    fn test_subscriptions_follow_routing() {
        let demux = Demultiplexer::new()
            .with_sink(Modality::Gsr, discard)
            .unwrap()
            .with_sink(Modality::Bvp, discard)
            .unwrap();

        let all = AdapterConfig::default();
        assert_eq!(all.subscriptions(&demux), vec![Modality::Bvp, Modality::Gsr]);

        let narrowed =
            AdapterConfig::default().modalities(&[Modality::Gsr, Modality::Temperature]);
        assert_eq!(narrowed.subscriptions(&demux), vec![Modality::Gsr]);

        assert!(all.subscriptions(&Demultiplexer::new()).is_empty());
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:28000".parse().unwrap();
        let config = AdapterConfig::new(addr, "A0B1C2")
            .read_timeout(Duration::from_millis(250))
            .connect_timeout(Duration::from_secs(2))
            .read_buffer_size(0)
            .error_backoff(Duration::ZERO);

        assert_eq!(config.bridge_addr, addr);
        assert_eq!(config.device_id, "A0B1C2");
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.read_buffer_size, 1);
        assert_eq!(config.error_backoff, Duration::ZERO);
    }
}
