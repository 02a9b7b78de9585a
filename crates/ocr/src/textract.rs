//! Hosted text detection using AWS Textract
//!
//! Detects document text directly from objects in S3, so image bytes never
//! pass through this process.

use crate::{OcrEngine, OcrLine};
use aws_sdk_textract::config::{Credentials, Region};
use aws_sdk_textract::types::{BlockType, Document, S3Object};
use aws_sdk_textract::Client;
use doc_pipeline_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Textract configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextractConfig {
    /// AWS region (e.g., "us-west-2")
    pub region: String,

    /// Custom endpoint for local emulators, empty for AWS
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,
}

impl Default for TextractConfig {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            endpoint: None,
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
        }
    }
}

/// Textract-backed OCR engine
pub struct TextractOcrEngine {
    client: Client,
}

impl TextractOcrEngine {
    /// Create a new Textract engine
    pub async fn new(config: TextractConfig) -> Result<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "doc-pipeline-ocr",
        );

        let region = Region::new(config.region.clone());

        let mut textract_config_builder = aws_sdk_textract::Config::builder()
            .credentials_provider(credentials)
            .region(region)
            .behavior_version_latest();

        // Set custom endpoint for local emulators
        if let Some(endpoint) = config.endpoint {
            textract_config_builder = textract_config_builder.endpoint_url(endpoint);
        }

        let textract_config = textract_config_builder.build();
        let client = Client::from_conf(textract_config);

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl OcrEngine for TextractOcrEngine {
    async fn detect_lines(&self, bucket: &str, key: &str) -> Result<Vec<OcrLine>> {
        let document = Document::builder()
            .s3_object(S3Object::builder().bucket(bucket).name(key).build())
            .build();

        let response = self
            .client
            .detect_document_text()
            .document(document)
            .send()
            .await
            .map_err(|e| PipelineError::OcrError(e.to_string()))?;

        let lines = response
            .blocks()
            .iter()
            .filter(|block| block.block_type() == Some(&BlockType::Line))
            .filter_map(|block| {
                let text = block.text()?.to_string();
                let top = block
                    .geometry()
                    .and_then(|geometry| geometry.bounding_box())
                    .map(|bounding_box| bounding_box.top())
                    .unwrap_or(0.0);
                Some(OcrLine { text, top })
            })
            .collect();

        Ok(lines)
    }
}
