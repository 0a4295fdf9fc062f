use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Counters for the audit bridge. Each handle is a cheap clone over an atomic,
/// so workers can increment them concurrently without coordination.
#[derive(Clone)]
pub struct BridgeMetrics {
    pub registry: Registry,
    pub events_received: IntCounter,
    pub events_delivered: IntCounter,
    pub events_parse_errors: IntCounter,
    pub events_delivery_errors: IntCounter,
}

impl BridgeMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let events_received = IntCounter::new(
            "events_receive_sum",
            "events received from the audit subscription",
        )?;
        let events_delivered = IntCounter::new(
            "events_send_sum",
            "events sent to falco",
        )?;
        let events_parse_errors = IntCounter::new(
            "events_error_parse",
            "errors parsing events from the audit subscription",
        )?;
        let events_delivery_errors = IntCounter::new(
            "events_error_send",
            "errors sending events to falco",
        )?;
        registry.register(Box::new(events_received.clone()))?;
        registry.register(Box::new(events_delivered.clone()))?;
        registry.register(Box::new(events_parse_errors.clone()))?;
        registry.register(Box::new(events_delivery_errors.clone()))?;
        Ok(BridgeMetrics { registry, events_received, events_delivered, events_parse_errors, events_delivery_errors })
    }

    /// Prometheus text exposition of every registered family.
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}
