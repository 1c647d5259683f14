use crate::models::ChatMessage;

pub const SYSTEM_INSTRUCTION: &str =
    "You are a helpful assistant that answers questions based on provided document context.";

/// Messages for one grounded question. `context` is embedded verbatim,
/// ahead of the question.
pub fn grounded_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_INSTRUCTION),
        ChatMessage::user(format!(
            "Context from documents: {context}\n\nQuestion: {question}\n\nAnswer based on the provided context:"
        )),
    ]
}
