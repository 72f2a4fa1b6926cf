//! HTTP client for the collection service batch API.
//!
//! `GET` pulls a gzip-compressed NDJSON batch, `POST` pushes the enriched
//! batch back as a multipart file upload.

use async_trait::async_trait;
use reqwest::header::ACCEPT_ENCODING;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use docenrich_shared::{BatchApiSettings, BatchRef, EnrichError, Result};

/// User-Agent string for batch API requests.
const USER_AGENT: &str = concat!("docenrich/", env!("CARGO_PKG_VERSION"));

/// Multipart field name of the uploaded batch.
const UPLOAD_FIELD: &str = "file";

/// File name of the uploaded batch.
const UPLOAD_FILE_NAME: &str = "data.ndjson.gz";

/// Media type of the uploaded batch.
const UPLOAD_MEDIA_TYPE: &str = "application/x-ndjson";

// ---------------------------------------------------------------------------
// BatchStore
// ---------------------------------------------------------------------------

/// Remote storage holding enrichment batches.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Download the compressed batch payload.
    async fn fetch(&self, batch: &BatchRef) -> Result<Vec<u8>>;

    /// Upload a compressed enriched batch.
    async fn upload(&self, batch: &BatchRef, payload: Vec<u8>) -> Result<()>;
}

/// Body of a successful push.
#[derive(Debug, Deserialize)]
struct PushBatchResponse {
    #[serde(default)]
    accepted: bool,
}

// ---------------------------------------------------------------------------
// BatchClient
// ---------------------------------------------------------------------------

/// Batch API client with bounded connect and request timeouts.
#[derive(Debug, Clone)]
pub struct BatchClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl BatchClient {
    /// Build a client from resolved settings.
    pub fn new(settings: &BatchApiSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(settings.timeouts.connect)
            .timeout(settings.timeouts.request)
            .build()
            .map_err(|e| EnrichError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    /// `{base}/v2/projects/{p}/collections/{c}/batches/{b}?version={v}`
    pub fn batch_url(&self, batch: &BatchRef) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EnrichError::config(format!("invalid batch API base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend([
                "v2",
                "projects",
                batch.project_id.as_str(),
                "collections",
                batch.collection_id.as_str(),
                "batches",
                batch.batch_id.as_str(),
            ]);
        url.query_pairs_mut().append_pair("version", &batch.version);
        Ok(url)
    }
}

#[async_trait]
impl BatchStore for BatchClient {
    #[instrument(skip_all, fields(batch = %batch))]
    async fn fetch(&self, batch: &BatchRef) -> Result<Vec<u8>> {
        let url = self.batch_url(batch)?;

        let response = self
            .client
            .get(url.clone())
            .basic_auth("apikey", Some(&self.api_key))
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: failed to read body: {e}")))?;

        debug!(bytes = body.len(), "pulled batch");
        Ok(body.to_vec())
    }

    #[instrument(skip_all, fields(batch = %batch, bytes = payload.len()))]
    async fn upload(&self, batch: &BatchRef, payload: Vec<u8>) -> Result<()> {
        let url = self.batch_url(batch)?;

        let part = Part::bytes(payload)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(UPLOAD_MEDIA_TYPE)
            .map_err(|e| EnrichError::BatchApi(format!("invalid upload media type: {e}")))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(url.clone())
            .basic_auth("apikey", Some(&self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            return Err(EnrichError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body: PushBatchResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::BatchApi(format!("invalid push response: {e}")))?;

        if !body.accepted {
            return Err(EnrichError::BatchApi(format!("batch {batch} was not accepted")));
        }

        Ok(())
    }
}
