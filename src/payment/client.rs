use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::PaymentInstructionsConfig;
use crate::error::PaymentInstructionError;

/// Client for the external payment-instruction service
#[async_trait]
pub trait PaymentInstructionClient: Send + Sync {
    /// Bind `cid` to the payment instruction `instruction_id`
    async fn map_cid(&self, instruction_id: &str, cid: &str) -> Result<(), PaymentInstructionError>;
}

/// Builds the payment-instruction client. Construction may fail when
/// required configuration is absent.
pub trait PaymentClientFactory: Send + Sync {
    fn build(&self) -> Result<Arc<dyn PaymentInstructionClient>, PaymentInstructionError>;
}

#[derive(Serialize)]
struct MapCidRequest<'a> {
    cid: &'a str,
}

/// HTTP client for the payment-instruction API
pub struct HttpPaymentInstructionClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPaymentInstructionClient {
    pub fn from_config(config: &PaymentInstructionsConfig) -> Result<Self, PaymentInstructionError> {
        let base_url = config
            .api_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                PaymentInstructionError::NotConfigured(
                    "PAYMENT_INSTRUCTIONS_API_URL is not set".to_string(),
                )
            })?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        info!("✅ Payment instruction client initialized for {}", base_url);

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn map_cid_url(&self, instruction_id: &str) -> String {
        format!("{}/payment-instructions/{}/cids", self.base_url, instruction_id)
    }
}

#[async_trait]
impl PaymentInstructionClient for HttpPaymentInstructionClient {
    async fn map_cid(&self, instruction_id: &str, cid: &str) -> Result<(), PaymentInstructionError> {
        let url = self.map_cid_url(instruction_id);
        debug!("Mapping cid {} to payment instruction {}", cid, instruction_id);

        let mut request = self.http.post(&url).json(&MapCidRequest { cid });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
            return Err(PaymentInstructionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Factory that builds [`HttpPaymentInstructionClient`] from configuration
pub struct HttpPaymentClientFactory {
    config: PaymentInstructionsConfig,
}

impl HttpPaymentClientFactory {
    pub fn new(config: PaymentInstructionsConfig) -> Self {
        Self { config }
    }
}

impl PaymentClientFactory for HttpPaymentClientFactory {
    fn build(&self) -> Result<Arc<dyn PaymentInstructionClient>, PaymentInstructionError> {
        let client = HttpPaymentInstructionClient::from_config(&self.config)?;
        Ok(Arc::new(client))
    }
}
