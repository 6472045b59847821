//! Metadata Enricher: mint → [`EnrichedEvent`].
//!
//! Descriptors come from a [`DescriptorSource`]. The default source asks a
//! DAS-capable RPC endpoint (`getAsset`) and, when the on-chain record leaves
//! gaps, reads the off-chain JSON document it points at.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use mintfeed_core::error::{EnrichError, TransportError};
use mintfeed_core::socials::extract_links;
use mintfeed_core::transport::RpcTransport;
use mintfeed_core::types::{Descriptor, EnrichedEvent, ExtractedRecord};

/// Address-keyed descriptor lookup.
#[async_trait]
pub trait DescriptorSource: Send + Sync + 'static {
    /// `Ok(None)` when the service knows nothing about `mint`.
    async fn resolve_descriptor(&self, mint: &str) -> Result<Option<Descriptor>, TransportError>;
}

/// Descriptor lookup through the Digital Asset Standard `getAsset` method.
pub struct DasDescriptorSource {
    transport: Arc<dyn RpcTransport>,
    http: reqwest::Client,
    fetch_offchain_json: bool,
}

impl DasDescriptorSource {
    pub fn new(transport: Arc<dyn RpcTransport>, http: reqwest::Client) -> Self {
        Self {
            transport,
            http,
            fetch_offchain_json: true,
        }
    }

    pub fn with_offchain_json(mut self, enabled: bool) -> Self {
        self.fetch_offchain_json = enabled;
        self
    }

    async fn fetch_json(&self, uri: &str) -> Result<Value, TransportError> {
        let resp = self
            .http
            .get(uri)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| TransportError::Http(e.to_string()))?;
        resp.json::<Value>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }
}

#[async_trait]
impl DescriptorSource for DasDescriptorSource {
    async fn resolve_descriptor(&self, mint: &str) -> Result<Option<Descriptor>, TransportError> {
        let asset = self.transport.call("getAsset", json!({ "id": mint })).await?;
        if asset.is_null() {
            return Ok(None);
        }

        let mut descriptor = descriptor_from_asset(&asset);
        let incomplete = descriptor.name.is_empty()
            || descriptor.description.is_empty()
            || descriptor.image.is_empty();

        if self.fetch_offchain_json && incomplete {
            if let Some(uri) = asset["content"]["json_uri"].as_str().filter(|u| !u.is_empty()) {
                match self.fetch_json(uri).await {
                    Ok(doc) => fill_from_offchain(&mut descriptor, &doc),
                    Err(e) => tracing::debug!(mint, uri, error = %e, "off-chain metadata fetch failed"),
                }
            }
        }

        Ok(Some(descriptor))
    }
}

fn text(value: &Value) -> String {
    value.as_str().map(str::trim).unwrap_or_default().to_string()
}

/// Read name, symbol, description and image out of a `getAsset` result.
pub fn descriptor_from_asset(asset: &Value) -> Descriptor {
    let content = &asset["content"];
    let metadata = &content["metadata"];
    let image = match text(&content["links"]["image"]) {
        image if !image.is_empty() => image,
        _ => text(&content["files"][0]["uri"]),
    };
    Descriptor {
        name: text(&metadata["name"]),
        symbol: text(&metadata["symbol"]),
        image,
        description: text(&metadata["description"]),
    }
}

/// Fill empty descriptor fields from an off-chain metadata document.
pub fn fill_from_offchain(descriptor: &mut Descriptor, doc: &Value) {
    for (field, key) in [
        (&mut descriptor.name, "name"),
        (&mut descriptor.symbol, "symbol"),
        (&mut descriptor.image, "image"),
        (&mut descriptor.description, "description"),
    ] {
        if field.is_empty() {
            *field = text(&doc[key]);
        }
    }
}

/// Turns an [`ExtractedRecord`] into a broadcastable [`EnrichedEvent`].
pub struct MetadataEnricher {
    source: Arc<dyn DescriptorSource>,
    timeout: Duration,
}

impl MetadataEnricher {
    pub fn new(source: Arc<dyn DescriptorSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Look up the descriptor for `mint` with a single bounded attempt.
    pub async fn describe(&self, mint: &str) -> Result<Descriptor, EnrichError> {
        let unavailable = |reason: String| EnrichError::MetadataUnavailable {
            mint: mint.to_string(),
            reason,
        };

        match tokio::time::timeout(self.timeout, self.source.resolve_descriptor(mint)).await {
            Err(_) => Err(unavailable(format!(
                "lookup timed out after {}ms",
                self.timeout.as_millis()
            ))),
            Ok(Err(e)) => Err(unavailable(e.to_string())),
            Ok(Ok(None)) => Err(unavailable("no descriptor".into())),
            Ok(Ok(Some(d))) if !d.has_payload() => {
                Err(unavailable("descriptor has neither name nor description".into()))
            }
            Ok(Ok(Some(d))) => Ok(d),
        }
    }

    pub async fn enrich(&self, record: ExtractedRecord) -> Result<EnrichedEvent, EnrichError> {
        let descriptor = self.describe(&record.mint).await?;
        let links = extract_links(&descriptor.description);
        Ok(EnrichedEvent::new(record, descriptor, links))
    }
}
