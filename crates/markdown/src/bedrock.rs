//! Hosted text generation using Bedrock Anthropic models
//!
//! Speaks the Anthropic messages format over the Bedrock runtime
//! `invoke_model` call.

use crate::TextGenerator;
use aws_sdk_bedrockruntime::config::{Credentials, Region};
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use doc_pipeline_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Bedrock runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockConfig {
    /// AWS region hosting the model (e.g., "us-east-1")
    pub region: String,

    /// Custom endpoint for local emulators, empty for AWS
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,

    /// Bedrock model identifier
    pub model_id: String,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            model_id: "anthropic.claude-3-sonnet-20240229-v1:0".to_string(),
            temperature: 0.2,
        }
    }
}

/// Bedrock-backed text generator
pub struct BedrockGenerator {
    client: Client,
    model_id: String,
    temperature: f32,
}

impl BedrockGenerator {
    /// Create a new Bedrock generator
    pub async fn new(config: BedrockConfig) -> Result<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "doc-pipeline-markdown",
        );

        let region = Region::new(config.region.clone());

        let mut bedrock_config_builder = aws_sdk_bedrockruntime::Config::builder()
            .credentials_provider(credentials)
            .region(region)
            .behavior_version_latest();

        // Set custom endpoint for local emulators
        if let Some(endpoint) = config.endpoint {
            bedrock_config_builder = bedrock_config_builder.endpoint_url(endpoint);
        }

        let bedrock_config = bedrock_config_builder.build();
        let client = Client::from_conf(bedrock_config);

        Ok(Self {
            client,
            model_id: config.model_id,
            temperature: config.temperature,
        })
    }
}

#[async_trait::async_trait]
impl TextGenerator for BedrockGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = json!({
            "anthropic_version": ANTHROPIC_VERSION,
            "max_tokens": max_tokens,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        let payload =
            serde_json::to_vec(&body).map_err(|e| PipelineError::GenerationError(e.to_string()))?;

        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(payload))
            .send()
            .await
            .map_err(|e| PipelineError::GenerationError(e.to_string()))?;

        let result: serde_json::Value = serde_json::from_slice(response.body().as_ref())
            .map_err(|e| PipelineError::GenerationError(e.to_string()))?;

        let text = result["content"][0]["text"].as_str().ok_or_else(|| {
            PipelineError::GenerationError("Model response missing content text".to_string())
        })?;

        Ok(text.trim().to_string())
    }
}
