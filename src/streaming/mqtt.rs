// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! MQTT publisher for device properties

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{property_params, PropertyMap, TelemetryPublisher};
use crate::config::TelemetryConfig;
use crate::error::PublishError;

/// MQTT client wrapper
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
    connected: Arc<AtomicBool>,
    eventloop: JoinHandle<()>,
}

impl MqttPublisher {
    pub async fn new(config: &TelemetryConfig) -> Result<Self> {
        let mut options = MqttOptions::new(&config.mqtt_client_id, &config.mqtt_broker, config.mqtt_port);
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.mqtt_username, &config.mqtt_password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        let connected = Arc::new(AtomicBool::new(false));

        // Connection and reconnects are driven by the event loop
        let flag = connected.clone();
        let eventloop = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                        flag.store(true, Ordering::Release);
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        flag.store(false, Ordering::Release);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        flag.store(false, Ordering::Release);
                        warn!("MQTT error: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        info!("MQTT publisher initialized for {}:{}", config.mqtt_broker, config.mqtt_port);

        Ok(Self {
            client,
            topic: config.mqtt_topic.clone(),
            connected,
            eventloop,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[async_trait]
impl TelemetryPublisher for MqttPublisher {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn publish(&self, properties: &PropertyMap) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::Transport("MQTT broker not connected".to_string()));
        }

        let payload = serde_json::to_vec(&serde_json::json!({ "params": property_params(properties) }))?;

        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        debug!("Published {} properties to {}", properties.len(), self.topic);
        Ok(())
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.eventloop.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_before_connack_is_transport_error() {
        let config = TelemetryConfig {
            mqtt_broker: "127.0.0.1".to_string(),
            mqtt_port: 9,
            ..Default::default()
        };
        let publisher = MqttPublisher::new(&config).await.unwrap();
        let props = PropertyMap::from([("gas".to_string(), serde_json::json!(0.0))]);

        assert!(!publisher.is_connected());
        assert!(matches!(
            publisher.publish(&props).await,
            Err(PublishError::Transport(_))
        ));
    }
}
