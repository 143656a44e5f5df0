use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::client::{PaymentClientFactory, PaymentInstructionClient};
use crate::error::PaymentInstructionError;

/// Recording payment-instruction client for tests
#[derive(Default)]
pub struct FakePaymentClient {
    failing_cids: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakePaymentClient {
    pub fn fail_for(&self, cid: &str) {
        self.failing_cids.lock().insert(cid.to_string());
    }

    /// `(instruction_id, cid)` pairs in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PaymentInstructionClient for FakePaymentClient {
    async fn map_cid(&self, instruction_id: &str, cid: &str) -> Result<(), PaymentInstructionError> {
        self.calls
            .lock()
            .push((instruction_id.to_string(), cid.to_string()));

        if self.failing_cids.lock().contains(cid) {
            return Err(PaymentInstructionError::Rejected {
                status: 502,
                body: format!("upstream refused {}", cid),
            });
        }

        Ok(())
    }
}

/// Factory handing out a shared fake, or failing when `client` is `None`
pub struct FakeClientFactory {
    pub client: Option<Arc<FakePaymentClient>>,
}

impl PaymentClientFactory for FakeClientFactory {
    fn build(&self) -> Result<Arc<dyn PaymentInstructionClient>, PaymentInstructionError> {
        match &self.client {
            Some(client) => {
                let client: Arc<dyn PaymentInstructionClient> = client.clone();
                Ok(client)
            }
            None => Err(PaymentInstructionError::NotConfigured(
                "no payment instruction service".to_string(),
            )),
        }
    }
}
