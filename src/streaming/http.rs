// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! HTTP property-post publisher

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use super::{property_params, PropertyMap, TelemetryPublisher};
use crate::config::TelemetryConfig;
use crate::error::PublishError;

/// Posts `{"id": n, "params": {...}}` to a device-property endpoint
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
    sequence: AtomicU64,
}

impl HttpPublisher {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.http_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("invalid header name {:?}: {}", name, e))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("invalid value for header {:?}: {}", name, e))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.http_endpoint.clone(),
            sequence: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl TelemetryPublisher for HttpPublisher {
    fn name(&self) -> &str {
        "http"
    }

    async fn publish(&self, properties: &PropertyMap) -> Result<(), PublishError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "id": id.to_string(),
            "params": property_params(properties),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected(status.as_u16()));
        }

        debug!("Published {} properties (id {})", properties.len(), id);
        Ok(())
    }
}
