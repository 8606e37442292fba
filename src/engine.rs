//! Natural language to PromQL/LogQL and back, through an LLM.
//!
//! The model's reply is cleaned up and checked before it is handed to a
//! backend. Translation is not deterministic; the same question may yield
//! different (equally valid) queries across calls.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;

use crate::error::TranslationError;
use crate::llm::LlmClient;
use crate::models::query::{Query, QueryLanguage, TranslatedQuery};
use crate::prompts;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*\n?(.*?)```").expect("valid regex"));
static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(promql|logql|query)\s*:\s*").expect("valid regex"));
static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+[A-Z]").expect("valid regex"));
static STREAM_MATCHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*[A-Za-z_][A-Za-z0-9_]*\s*(=~|!~|!=|=)\s*"[^"]*""#).expect("valid regex")
});

const PROSE_OPENERS: &[&str] = &[
    "i ", "i'", "sorry", "here is", "here's", "the ", "this ", "to ", "you ", "unfortunately",
    "as an", "based on", "please", "certainly", "sure",
];

pub struct QueryEngine {
    llm: Arc<dyn LlmClient>,
    language: QueryLanguage,
}

impl QueryEngine {
    pub fn new(llm: Arc<dyn LlmClient>, language: QueryLanguage) -> Self {
        Self { llm, language }
    }

    pub fn language(&self) -> QueryLanguage {
        self.language
    }

    /// One LLM call with the language's translation prompt, then validation.
    /// Failures are not retried here beyond provider-level transients.
    pub async fn translate_query(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<TranslatedQuery, TranslationError> {
        let system = prompts::translation_prompt(self.language);
        let user = prompts::translation_user_prompt(&query.text, &query.context);
        let raw = self.llm.complete(system, &user, cancel).await?;
        let text = validate_output(&raw, self.language)?;
        tracing::debug!("translated `{}` to {}: {text}", query.text, self.language);
        Ok(TranslatedQuery::new(text, self.language))
    }

    pub async fn explain_query(
        &self,
        query: &TranslatedQuery,
        cancel: &CancellationToken,
    ) -> Result<String, TranslationError> {
        let system = prompts::explanation_prompt(query.language);
        let user = prompts::explanation_user_prompt(&query.text, query.language);
        let raw = self.llm.complete(system, &user, cancel).await?;
        let text = raw.trim();
        if text.is_empty() {
            return Err(TranslationError::Empty);
        }
        Ok(text.to_string())
    }
}

/// Clean up model output and check it is plausibly a query in `language`.
pub fn validate_output(raw: &str, language: QueryLanguage) -> Result<String, TranslationError> {
    let text = clean(raw);
    if text.is_empty() {
        return Err(TranslationError::Empty);
    }
    if looks_like_prose(&text) {
        return Err(TranslationError::Prose { output: text });
    }
    let invalid = |reason: String| TranslationError::InvalidSyntax {
        language: language.to_string(),
        reason,
        output: text.clone(),
    };
    match language {
        QueryLanguage::PromQl => {
            promql_parser::parser::parse(&text).map_err(invalid)?;
        }
        QueryLanguage::LogQl => {
            if !STREAM_MATCHER.is_match(&text) {
                return Err(invalid(
                    "missing a stream selector with a label matcher".to_string(),
                ));
            }
            if !balanced(&text) {
                return Err(invalid("unbalanced braces or parentheses".to_string()));
            }
        }
    }
    Ok(text)
}

fn clean(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    if let Some(caps) = FENCE.captures(&text) {
        text = caps[1].trim().to_string();
    }
    let text = LABEL.replace(text.trim(), "");
    let text = text.trim().trim_matches('`').trim();
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn looks_like_prose(text: &str) -> bool {
    let lower = text.to_lowercase();
    if PROSE_OPENERS.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    // Quoted matcher values may legitimately contain sentences.
    let bare = without_quoted(text);
    SENTENCE_BREAK.is_match(&bare) || bare.trim_end().ends_with('.')
}

fn without_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                    out.push(c);
                }
            }
            None => {
                if c == '"' || c == '`' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

fn balanced(text: &str) -> bool {
    let mut stack = Vec::new();
    for c in without_quoted(text).chars() {
        match c {
            '{' | '(' | '[' => stack.push(c),
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}
