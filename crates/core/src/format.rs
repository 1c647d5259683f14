use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    question: Regex,
    answer: Regex,
    option: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                question: Regex::new(r"\*\*Question \d+\*\*").ok()?,
                answer: Regex::new(r"\*\*Answer\*\*").ok()?,
                option: Regex::new(r"\b([A-D]\.)(\s)").ok()?,
            })
        })
        .as_ref()
}

/// Lays out a generated answer as markdown: numbered question labels become
/// headings, answer labels become sub-headings and lettered options start
/// on their own line. Wording is untouched; only line breaks and markdown
/// markers change.
pub fn format_answer(content: &str) -> String {
    let Some(patterns) = patterns() else {
        return content.trim().to_string();
    };
    let text = patterns.question.replace_all(content, "\n### $0\n");
    let text = patterns.answer.replace_all(&text, "\n#### Answer ");
    let text = patterns.option.replace_all(&text, "\n$1$2");
    text.trim().to_string()
}
