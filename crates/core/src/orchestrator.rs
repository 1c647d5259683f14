use crate::format::format_answer;
use crate::models::{ContextChunk, Role, TranscriptEntry, DEFAULT_SEARCH_K};
use crate::session::{ChatSession, CyclePhase};
use crate::traits::AnswerBackend;
use crate::{FlowError, GatewayError};
use tracing::{info, warn};

pub const SEARCH_FAILED_MESSAGE: &str =
    "Sorry, I couldn't search your documents just now. Please try again.";
pub const GENERATION_FAILED_MESSAGE: &str =
    "Sorry, I encountered an error processing your question. Please try again.";

/// How a submitted question ended. Upstream failures are outcomes, not
/// errors: the session always records something visible for them.
#[derive(Debug)]
pub enum CycleOutcome {
    Answered { answer: String },
    SearchFailed { error: GatewayError },
    GenerationFailed { error: GatewayError },
}

impl CycleOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, CycleOutcome::Answered { .. })
    }
}

/// Search-then-generate over the documents selected in a session. Every
/// search asks for the top [`DEFAULT_SEARCH_K`] chunks.
pub struct QuestionFlow<B>
where
    B: AnswerBackend,
{
    backend: B,
}

impl<B> QuestionFlow<B>
where
    B: AnswerBackend + Send + Sync,
{
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn submit(
        &self,
        session: &ChatSession,
        question: &str,
    ) -> Result<CycleOutcome, FlowError> {
        let cycle = session.begin_cycle(question)?;

        let search = self
            .backend
            .search(question, cycle.selection(), DEFAULT_SEARCH_K);
        let chunks = match search.await {
            Ok(chunks) => chunks,
            Err(error) => {
                warn!(
                    kind = error.kind().code(),
                    detail = error.detail().unwrap_or_default(),
                    "search failed: {error}"
                );
                cycle.finish(vec![TranscriptEntry::new(Role::SystemError, SEARCH_FAILED_MESSAGE)]);
                return Ok(CycleOutcome::SearchFailed { error });
            }
        };

        let context = assemble_context(chunks);
        info!(context_chars = context.len(), "context assembled");
        cycle.advance(CyclePhase::Generating);

        match self.backend.ask(question, &context).await {
            Ok(answer) => {
                let answer = format_answer(&answer);
                cycle.finish(vec![
                    TranscriptEntry::new(Role::User, question),
                    TranscriptEntry::new(Role::Assistant, answer.clone()),
                ]);
                Ok(CycleOutcome::Answered { answer })
            }
            Err(error) => {
                warn!(
                    kind = error.kind().code(),
                    detail = error.detail().unwrap_or_default(),
                    "generation failed: {error}"
                );
                cycle.finish(vec![
                    TranscriptEntry::new(Role::User, question),
                    TranscriptEntry::new(Role::SystemError, GENERATION_FAILED_MESSAGE),
                ]);
                Ok(CycleOutcome::GenerationFailed { error })
            }
        }
    }
}

/// Chunk texts in rank order, separated by a blank line.
pub fn assemble_context(mut chunks: Vec<ContextChunk>) -> String {
    chunks.sort_by_key(|chunk| chunk.rank);
    chunks
        .into_iter()
        .map(|chunk| chunk.content)
        .collect::<Vec<_>>()
        .join("\n\n")
}
