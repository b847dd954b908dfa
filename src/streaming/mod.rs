//! Streaming module - cloud telemetry publishing over HTTP or MQTT

mod http;
mod mqtt;

pub use http::HttpPublisher;
pub use mqtt::MqttPublisher;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use anyhow::Result;
use tracing::{debug, info};

use crate::config::{TelemetryBackend, TelemetryConfig};
use crate::error::PublishError;

/// Property name to value, published as one message
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// Accepts a property map and reports whether the platform took it
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    async fn publish(&self, properties: &PropertyMap) -> Result<(), PublishError>;
}

/// Publisher used when telemetry is disabled
pub struct NullPublisher;

#[async_trait]
impl TelemetryPublisher for NullPublisher {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn publish(&self, properties: &PropertyMap) -> Result<(), PublishError> {
        debug!("Telemetry disabled, dropping {} properties", properties.len());
        Ok(())
    }
}

/// Build the configured publisher
pub async fn connect(config: &TelemetryConfig) -> Result<Arc<dyn TelemetryPublisher>> {
    let publisher: Arc<dyn TelemetryPublisher> = match config.backend {
        TelemetryBackend::Disabled => Arc::new(NullPublisher),
        TelemetryBackend::Http => Arc::new(HttpPublisher::new(config)?),
        TelemetryBackend::Mqtt => Arc::new(MqttPublisher::new(config).await?),
    };
    info!("Telemetry publisher: {}", publisher.name());
    Ok(publisher)
}

/// Publish with an upper bound on how long the caller waits
pub async fn publish_within(
    publisher: &dyn TelemetryPublisher,
    properties: &PropertyMap,
    limit: Duration,
) -> Result<(), PublishError> {
    match tokio::time::timeout(limit, publisher.publish(properties)).await {
        Ok(result) => result,
        Err(_) => Err(PublishError::Timeout(limit.as_millis() as u64)),
    }
}

/// Wrap plain values in the `{"name": {"value": v}}` shape property platforms expect
pub fn property_params(properties: &PropertyMap) -> serde_json::Value {
    let params: serde_json::Map<String, serde_json::Value> = properties
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::json!({ "value": v })))
        .collect();
    serde_json::Value::Object(params)
}
