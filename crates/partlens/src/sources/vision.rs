//! Vision/OCR label extraction.
//!
//! Fires only when the request carries a part-label URL. The OCR itself is
//! an upstream service reached through the fetch proxy; this adapter reads
//! the recognized text and pulls OEM-shaped tokens out of it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AdapterError;
use crate::fetch::FetchClient;
use crate::sources::{extract_oem_tokens, SourceAdapter, SourceKind};
use crate::types::{meta, Candidate, ResolutionRequest};

pub struct VisionLabelSource {
    fetch: Arc<dyn FetchClient>,
    ocr_url: String,
}

impl VisionLabelSource {
    pub const NAME: &'static str = "vision-label";

    pub fn new(fetch: Arc<dyn FetchClient>) -> Self {
        Self {
            fetch,
            ocr_url: "https://ocr.example/extract?image={url}".into(),
        }
    }

    pub fn with_ocr_url(mut self, url: impl Into<String>) -> Self {
        self.ocr_url = url.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for VisionLabelSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Vision
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(45)
    }

    async fn resolve_candidates(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let Some(label_url) = &request.part.label_url else {
            return Ok(Vec::new());
        };
        let url = self.ocr_url.replace("{url}", label_url);
        let text = self.fetch.fetch(&url).await?;

        // A label photographed by the requester is strong direct evidence,
        // but OCR confuses 0/O and 1/I, so it is not authoritative alone.
        Ok(extract_oem_tokens(&text)
            .into_iter()
            .take(2)
            .map(|oem| {
                Candidate::new(oem, Self::NAME, 0.80)
                    .with_brand(request.vehicle.make.clone())
                    .with_priority(7)
                    .with_meta(meta::DERIVATION, "label-ocr")
            })
            .collect())
    }
}
