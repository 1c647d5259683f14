use crate::models::{
    ChatCompletion, ChatMessage, ContextChunk, DocumentReference, ListFilesRequest, UploadReceipt,
};
use crate::upload::StagedUpload;
use crate::GatewayError;
use async_trait::async_trait;

/// Upstream service holding uploaded documents and their search index.
#[async_trait]
pub trait DocumentStore {
    async fn upload_file(&self, upload: &StagedUpload) -> Result<UploadReceipt, GatewayError>;

    async fn upload_text(&self, name: &str, contents: &str) -> Result<UploadReceipt, GatewayError>;

    async fn list_files(
        &self,
        request: &ListFilesRequest,
    ) -> Result<Vec<DocumentReference>, GatewayError>;

    async fn search(
        &self,
        query: &str,
        file_ids: &[String],
        k: usize,
    ) -> Result<Vec<ContextChunk>, GatewayError>;
}

/// Upstream chat-completion endpoint.
#[async_trait]
pub trait LanguageModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, GatewayError>;
}

/// The two calls a question-answer cycle needs. Implemented in-process by
/// [`crate::Gateway`] and remotely by [`crate::GatewayClient`].
#[async_trait]
pub trait AnswerBackend {
    async fn search(
        &self,
        query: &str,
        file_ids: &[String],
        k: usize,
    ) -> Result<Vec<ContextChunk>, GatewayError>;

    async fn ask(&self, question: &str, context: &str) -> Result<String, GatewayError>;
}
