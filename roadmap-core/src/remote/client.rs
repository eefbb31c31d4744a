use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{parse_roadmap_list, unwrap_envelope, RoadmapSource};
use crate::error::TrackerError;
use crate::models::Roadmap;

/// [`RoadmapSource`] backed by the roadmap HTTP API
#[derive(Clone)]
pub struct HttpRoadmapSource {
    base_url: Url,
    client: Client,
}

impl HttpRoadmapSource {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid API base URL {:?}: {}", base_url, e))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL {} cannot have a path", base_url);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json(&self, url: Url) -> Result<Value, TrackerError> {
        let endpoint = url.to_string();
        debug!(%endpoint, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TrackerError::Network {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::HttpStatus {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| TrackerError::Network {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&body).map_err(|e| TrackerError::MalformedResponse {
            endpoint,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl RoadmapSource for HttpRoadmapSource {
    async fn list_roadmaps(&self) -> Result<Vec<Roadmap>, TrackerError> {
        let body = self.get_json(self.endpoint(&["roadmaps"])).await?;
        Ok(parse_roadmap_list(&unwrap_envelope(body)))
    }

    async fn fetch_roadmap(&self, id: &str) -> Result<Value, TrackerError> {
        let body = self.get_json(self.endpoint(&["roadmaps", id])).await?;
        Ok(unwrap_envelope(body))
    }
}
