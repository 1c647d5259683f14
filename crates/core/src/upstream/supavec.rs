use crate::config::DocumentStoreConfig;
use crate::models::{
    ContextChunk, DocumentReference, FileListing, ListFilesRequest, SearchResponse, UploadReceipt,
};
use crate::traits::DocumentStore;
use crate::upload::StagedUpload;
use crate::GatewayError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::json;
use tracing::debug;

use super::{build_client, read_json};

const SERVICE: &str = "supavec";

/// Supavec document store over its REST API.
pub struct SupavecStore {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl SupavecStore {
    pub fn new(config: &DocumentStoreConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            endpoint: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: build_client(SERVICE, config.timeout)?,
        })
    }

    fn post(&self, endpoint: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}/{}", self.endpoint, endpoint));
        match &self.api_key {
            Some(key) => request.header("authorization", key),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|error| GatewayError::from_transport(SERVICE, error))?;
        read_json(SERVICE, response).await
    }
}

#[async_trait]
impl DocumentStore for SupavecStore {
    async fn upload_file(&self, upload: &StagedUpload) -> Result<UploadReceipt, GatewayError> {
        let bytes = upload.read_bytes().await?;
        debug!(file_name = upload.file_name(), size = bytes.len(), "forwarding upload");

        let part = Part::bytes(bytes)
            .file_name(upload.file_name().to_string())
            .mime_str(upload.content_type())
            .map_err(|error| GatewayError::internal(format!("invalid content type: {error}")))?;
        let form = Form::new().part("file", part);

        self.send(self.post("upload_file").multipart(form)).await
    }

    async fn upload_text(&self, name: &str, contents: &str) -> Result<UploadReceipt, GatewayError> {
        self.send(self.post("upload_text").json(&json!({
            "name": name,
            "contents": contents,
        })))
        .await
    }

    async fn list_files(
        &self,
        request: &ListFilesRequest,
    ) -> Result<Vec<DocumentReference>, GatewayError> {
        let listing: FileListing = self
            .send(self.post("user_files").json(&json!({
                "pagination": {
                    "limit": request.limit,
                    "offset": request.offset,
                },
                "order_dir": request.order_dir.as_str(),
            })))
            .await?;
        Ok(listing.results)
    }

    async fn search(
        &self,
        query: &str,
        file_ids: &[String],
        k: usize,
    ) -> Result<Vec<ContextChunk>, GatewayError> {
        let response: SearchResponse = self
            .send(self.post("embeddings").json(&json!({
                "query": query,
                "file_ids": file_ids,
                "k": k,
            })))
            .await?;
        Ok(response.documents)
    }
}
