use crate::models::{
    AskRequest, ChatCompletion, ContextChunk, DocumentReference, FileListing, ListFilesRequest,
    SearchRequest, SearchResponse, UploadReceipt, UploadTextRequest,
};
use crate::server::ErrorBody;
use crate::traits::AnswerBackend;
use crate::GatewayError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const SERVICE: &str = "gateway";

/// Typed client for the gateway's `/api` routes. Error responses are turned
/// back into the [`GatewayError`] kind the gateway reported.
pub struct GatewayClient {
    base: Url,
    client: Client,
}

impl GatewayClient {
    /// `base_url` is the API root, e.g. `http://localhost:3001/api`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let mut base = Url::parse(base_url).map_err(|error| {
            GatewayError::invalid_input(format!("invalid api base url {base_url:?}: {error}"))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            client: crate::upstream::build_client(SERVICE, timeout)?,
        })
    }

    fn url(&self, route: &str) -> Result<Url, GatewayError> {
        self.base.join(route).map_err(|error| {
            GatewayError::internal(format!("cannot build url for {route}: {error}"))
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|error| GatewayError::from_transport(SERVICE, error))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| GatewayError::from_transport(SERVICE, error))?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<ErrorBody>(&body) {
                Ok(error) => GatewayError::from_wire(&error.code, error.error, error.details),
                Err(_) => GatewayError::upstream(
                    SERVICE,
                    format!("{status}: {}", String::from_utf8_lossy(&body)),
                ),
            });
        }

        serde_json::from_slice(&body).map_err(|error| {
            GatewayError::upstream(SERVICE, format!("malformed response: {error}"))
        })
    }

    pub async fn upload_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReceipt, GatewayError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|error| {
                GatewayError::invalid_input(format!("invalid content type: {error}"))
            })?;
        let form = Form::new().part("file", part);
        self.send(self.client.post(self.url("upload")?).multipart(form))
            .await
    }

    pub async fn upload_text(
        &self,
        name: &str,
        contents: &str,
    ) -> Result<UploadReceipt, GatewayError> {
        let body = UploadTextRequest {
            name: Some(name.to_string()),
            contents: Some(contents.to_string()),
        };
        self.send(self.client.post(self.url("upload-text")?).json(&body))
            .await
    }

    pub async fn list_files(
        &self,
        request: &ListFilesRequest,
    ) -> Result<Vec<DocumentReference>, GatewayError> {
        let mut url = self.url("files")?;
        url.query_pairs_mut()
            .append_pair("offset", &request.offset.to_string())
            .append_pair("limit", &request.limit.to_string())
            .append_pair("order_dir", request.order_dir.as_str());

        let listing: FileListing = self.send(self.client.get(url)).await?;
        Ok(listing.results)
    }

    pub async fn complete(
        &self,
        question: &str,
        context: &str,
    ) -> Result<ChatCompletion, GatewayError> {
        let body = AskRequest {
            question: question.to_string(),
            context: context.to_string(),
        };
        self.send(self.client.post(self.url("ask")?).json(&body)).await
    }
}

#[async_trait]
impl AnswerBackend for GatewayClient {
    async fn search(
        &self,
        query: &str,
        file_ids: &[String],
        k: usize,
    ) -> Result<Vec<ContextChunk>, GatewayError> {
        let body = SearchRequest {
            query: query.to_string(),
            file_ids: file_ids.to_vec(),
            k,
        };
        let response: SearchResponse = self
            .send(self.client.post(self.url("search")?).json(&body))
            .await?;
        Ok(response.documents)
    }

    async fn ask(&self, question: &str, context: &str) -> Result<String, GatewayError> {
        let completion = self
            .complete(question, context)
            .await
            .map_err(GatewayError::into_generation_failure)?;
        completion
            .answer_text()
            .map(str::to_string)
            .ok_or_else(|| GatewayError::GenerationFailed {
                detail: Some("completion contained no choices".to_string()),
            })
    }
}
