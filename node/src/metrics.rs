//! # Node Metrics
//!
//! Three prometheus gauges, refreshed on scrape: the node's health is the
//! shape of its tree, its peer set and its pending pool, all of which are
//! cheap to read on demand. No background sampler.

use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

pub struct NodeMetrics {
    registry: Registry,
    pub principal_height: IntGauge,
    pub peer_count: IntGauge,
    pub pool_size: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let principal_height = IntGauge::new(
            "tarjeta_principal_height",
            "Height of the principal chain leaf",
        )?;
        let peer_count = IntGauge::new("tarjeta_peer_count", "Connected peers")?;
        let pool_size = IntGauge::new("tarjeta_pool_size", "Pending transactions in the pool")?;

        registry.register(Box::new(principal_height.clone()))?;
        registry.register(Box::new(peer_count.clone()))?;
        registry.register(Box::new(pool_size.clone()))?;

        Ok(Self {
            registry,
            principal_height,
            peer_count,
            pool_size,
        })
    }

    /// Render the registry in the prometheus text format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder
            .encode(&self.registry.gather(), &mut buf)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauges_render_in_text_format() {
        let metrics = NodeMetrics::new().expect("metrics");
        metrics.principal_height.set(42);
        metrics.peer_count.set(3);
        metrics.pool_size.set(7);

        let text = metrics.render();
        assert!(text.contains("tarjeta_principal_height 42"));
        assert!(text.contains("tarjeta_peer_count 3"));
        assert!(text.contains("tarjeta_pool_size 7"));
    }
}
