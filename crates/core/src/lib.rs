pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod server;
pub mod session;
pub mod traits;
pub mod upload;
pub mod upstream;

pub use catalog::FileCatalog;
pub use client::GatewayClient;
pub use config::{DocumentStoreConfig, GatewayConfig, LanguageModelConfig, ServerConfig};
pub use error::{ErrorKind, FlowError, GatewayError};
pub use format::format_answer;
pub use gateway::Gateway;
pub use models::{
    AskRequest, ChatCompletion, ChatMessage, ContextChunk, DocumentReference, ListFilesRequest,
    OrderDirection, Role, SearchRequest, TranscriptEntry, UploadReceipt, UploadTextRequest,
};
pub use orchestrator::{assemble_context, CycleOutcome, QuestionFlow};
pub use server::{router, serve};
pub use session::{ChatSession, CyclePhase};
pub use traits::{AnswerBackend, DocumentStore, LanguageModel};
pub use upload::StagedUpload;
pub use upstream::{ChatCompletionsModel, SupavecStore};
