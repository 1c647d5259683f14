use crate::config::GatewayConfig;
use crate::error::UNSUPPORTED_TYPE_MESSAGE;
use crate::models::{
    AskRequest, ChatCompletion, ContextChunk, DocumentReference, ListFilesRequest, SearchRequest,
    UploadReceipt, UploadTextRequest,
};
use crate::prompt::grounded_messages;
use crate::traits::{AnswerBackend, DocumentStore, LanguageModel};
use crate::upload::StagedUpload;
use crate::GatewayError;
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, info, warn};

const DOCUMENT_STORE: &str = "document-store";
const LANGUAGE_MODEL: &str = "language-model";

/// Stateless relay in front of the document store and the language model.
/// Validates requests before anything leaves the process and bounds every
/// upstream call with the configured timeout.
pub struct Gateway<S, M>
where
    S: DocumentStore,
    M: LanguageModel,
{
    store: S,
    model: M,
    config: GatewayConfig,
}

impl<S, M> Gateway<S, M>
where
    S: DocumentStore + Send + Sync,
    M: LanguageModel + Send + Sync,
{
    pub fn new(store: S, model: M, config: GatewayConfig) -> Self {
        Self {
            store,
            model,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Opens a staging file for an incoming upload after checking its type.
    pub fn stage_upload(
        &self,
        file_name: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<StagedUpload, GatewayError> {
        let content_type =
            content_type.ok_or_else(|| GatewayError::unsupported_type(UNSUPPORTED_TYPE_MESSAGE))?;
        let file_name = file_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("upload");

        StagedUpload::create(
            &self.config.staging_dir,
            file_name,
            content_type,
            self.config.max_upload_bytes,
        )
    }

    /// Forwards a staged upload. The staging file is released when this
    /// returns, on success and on failure alike.
    pub async fn upload_file(
        &self,
        mut upload: StagedUpload,
    ) -> Result<UploadReceipt, GatewayError> {
        upload.finish().await?;
        info!(
            file_name = upload.file_name(),
            content_type = upload.content_type(),
            size = upload.size(),
            "uploading file"
        );

        let result = self
            .bounded(DOCUMENT_STORE, self.store.upload_file(&upload))
            .await;
        drop(upload);
        debug!("staged upload released");

        let receipt = result.inspect_err(|error| log_failure("upload_file", error))?;
        info!(file_id = %receipt.file_id, "file uploaded");
        Ok(receipt)
    }

    pub async fn upload_text(
        &self,
        request: &UploadTextRequest,
    ) -> Result<UploadReceipt, GatewayError> {
        let name = request
            .name
            .as_deref()
            .ok_or_else(|| GatewayError::invalid_input("name is required"))?;
        let contents = request
            .contents
            .as_deref()
            .ok_or_else(|| GatewayError::invalid_input("contents is required"))?;

        info!(name, size = contents.len(), "uploading text");
        self.bounded(DOCUMENT_STORE, self.store.upload_text(name, contents))
            .await
            .inspect_err(|error| log_failure("upload_text", error))
    }

    pub async fn list_files(
        &self,
        request: &ListFilesRequest,
    ) -> Result<Vec<DocumentReference>, GatewayError> {
        if request.limit == 0 {
            return Err(GatewayError::invalid_input("limit must be at least 1"));
        }

        debug!(
            offset = request.offset,
            limit = request.limit,
            order_dir = %request.order_dir,
            "listing files"
        );
        self.bounded(DOCUMENT_STORE, self.store.list_files(request))
            .await
            .inspect_err(|error| log_failure("list_files", error))
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<ContextChunk>, GatewayError> {
        if request.query.trim().is_empty() {
            return Err(GatewayError::invalid_input("query is required"));
        }
        if request.file_ids.is_empty() {
            return Err(GatewayError::invalid_input("at least one file must be selected"));
        }
        if request.k == 0 {
            return Err(GatewayError::invalid_input("k must be at least 1"));
        }

        info!(files = request.file_ids.len(), k = request.k, "searching documents");
        let chunks = self
            .bounded(
                DOCUMENT_STORE,
                self.store.search(&request.query, &request.file_ids, request.k),
            )
            .await
            .inspect_err(|error| log_failure("search", error))?;

        Ok(chunks
            .into_iter()
            .take(request.k)
            .enumerate()
            .map(|(rank, chunk)| ContextChunk { rank, ..chunk })
            .collect())
    }

    /// One non-streaming completion for a grounded question. Every upstream
    /// failure, timeouts included, is reported as `GenerationFailed`.
    pub async fn complete(&self, request: &AskRequest) -> Result<ChatCompletion, GatewayError> {
        if request.question.trim().is_empty() {
            return Err(GatewayError::invalid_input("question is required"));
        }

        info!(context_chars = request.context.len(), "generating answer");
        let messages = grounded_messages(&request.question, &request.context);
        let completion = self
            .bounded(LANGUAGE_MODEL, self.model.complete(&messages))
            .await
            .map_err(GatewayError::into_generation_failure)
            .inspect_err(|error| log_failure("ask", error))?;

        if completion.answer_text().is_none() {
            let error = GatewayError::GenerationFailed {
                detail: Some("completion contained no choices".to_string()),
            };
            log_failure("ask", &error);
            return Err(error);
        }
        Ok(completion)
    }

    async fn bounded<T, F>(&self, service: &str, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.config.upstream_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(
                service,
                Some(format!("no response within {:?}", self.config.upstream_timeout)),
            )),
        }
    }
}

fn log_failure(operation: &str, error: &GatewayError) {
    warn!(
        operation,
        kind = error.kind().code(),
        detail = error.detail().unwrap_or_default(),
        "gateway operation failed: {error}"
    );
}

#[async_trait]
impl<S, M> AnswerBackend for Gateway<S, M>
where
    S: DocumentStore + Send + Sync,
    M: LanguageModel + Send + Sync,
{
    async fn search(
        &self,
        query: &str,
        file_ids: &[String],
        k: usize,
    ) -> Result<Vec<ContextChunk>, GatewayError> {
        Gateway::search(
            self,
            &SearchRequest {
                query: query.to_string(),
                file_ids: file_ids.to_vec(),
                k,
            },
        )
        .await
    }

    async fn ask(&self, question: &str, context: &str) -> Result<String, GatewayError> {
        let completion = self
            .complete(&AskRequest {
                question: question.to_string(),
                context: context.to_string(),
            })
            .await?;
        Ok(completion.answer_text().unwrap_or_default().to_string())
    }
}
