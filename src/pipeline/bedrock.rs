//! AWS Bedrock transport: one runtime client per configured region.
//!
//! Credentials come from the standard AWS provider chain (environment,
//! profile, instance role). Only the region differs between clients.

use crate::error::TransportError;
use crate::pipeline::invoke::ModelTransport;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::{
    config::Region,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::invoke_model::InvokeModelError,
    primitives::Blob,
    Client,
};
use std::collections::HashMap;
use tracing::debug;

/// [`ModelTransport`] backed by `InvokeModel` on Bedrock runtime.
#[derive(Debug, Clone)]
pub struct BedrockTransport {
    clients: HashMap<String, Client>,
    timeout_secs: u64,
}

impl BedrockTransport {
    /// Build a client for each region.
    ///
    /// `timeout_secs` is only used to label SDK-level timeouts.
    pub async fn new(regions: &[String], timeout_secs: u64) -> Self {
        let mut clients = HashMap::with_capacity(regions.len());
        for region in regions {
            let config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.clone()))
                .load()
                .await;
            clients.insert(region.clone(), Client::new(&config));
        }
        debug!("Bedrock clients ready for {:?}", regions);
        Self {
            clients,
            timeout_secs,
        }
    }

    fn map_error(&self, err: SdkError<InvokeModelError>) -> TransportError {
        match &err {
            SdkError::TimeoutError(_) => TransportError::Timeout(self.timeout_secs),
            SdkError::ServiceError(service) => TransportError::Service {
                status: Some(service.raw().status().as_u16()),
                code: service.err().code().map(str::to_string),
                message: service
                    .err()
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
            },
            SdkError::ResponseError(response) => TransportError::Service {
                status: Some(response.raw().status().as_u16()),
                code: None,
                message: DisplayErrorContext(&err).to_string(),
            },
            _ => TransportError::Unreachable(DisplayErrorContext(&err).to_string()),
        }
    }
}

#[async_trait]
impl ModelTransport for BedrockTransport {
    async fn invoke_model(
        &self,
        region: &str,
        model_id: &str,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError> {
        let client = self
            .clients
            .get(region)
            .ok_or_else(|| TransportError::UnknownRegion(region.to_string()))?;

        let output = client
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(output.body().as_ref().to_vec())
    }
}
