//! System prompts for the query engine.

use crate::models::query::{QueryContext, QueryLanguage};

pub const PROMQL_TRANSLATION: &str = "You translate questions about system behaviour into PromQL for a Prometheus server.\n\
Rules:\n\
- Reply with exactly one PromQL expression and nothing else.\n\
- No Markdown, no code fences, no explanation, no trailing punctuation.\n\
- Prefer rate() or increase() over raw counters and use a [5m] range unless the question implies another window.\n\
- Use label matchers from the supplied context (service, job, instance, namespace) when present.\n\
- Aggregate with sum by (...) when the question asks for a total or a breakdown.";

pub const LOGQL_TRANSLATION: &str = "You translate questions about application logs into LogQL for a Grafana Loki server.\n\
Rules:\n\
- Reply with exactly one LogQL expression and nothing else.\n\
- No Markdown, no code fences, no explanation, no trailing punctuation.\n\
- Always start from a stream selector with at least one label matcher, for example {app=\"checkout\"}.\n\
- Use line filters (|=, !=, |~) for keywords and parsers (| json, | logfmt) only when fields are needed.\n\
- Use label matchers from the supplied context (service, app, namespace, level) when present.\n\
- For counts or rates over time wrap the selector in count_over_time or rate with a range such as [5m].";

pub const PROMQL_EXPLANATION: &str = "You are an observability engineer. Explain what the given PromQL expression computes \
in two to four plain sentences for an on-call engineer. Mention the metric, the filters, the aggregation and the time window. \
Do not rewrite the query.";

pub const LOGQL_EXPLANATION: &str = "You are an observability engineer. Explain what the given LogQL expression selects \
and computes in two to four plain sentences for an on-call engineer. Mention the stream selector, any line filters or parsers, \
and any aggregation over time. Do not rewrite the query.";

pub fn translation_prompt(language: QueryLanguage) -> &'static str {
    match language {
        QueryLanguage::PromQl => PROMQL_TRANSLATION,
        QueryLanguage::LogQl => LOGQL_TRANSLATION,
    }
}

pub fn explanation_prompt(language: QueryLanguage) -> &'static str {
    match language {
        QueryLanguage::PromQl => PROMQL_EXPLANATION,
        QueryLanguage::LogQl => LOGQL_EXPLANATION,
    }
}

/// User message for a translation call. Context is embedded as pretty JSON.
pub fn translation_user_prompt(question: &str, context: &QueryContext) -> String {
    let mut msg = format!("Question: {}\n", question.trim());
    if !context.is_empty() {
        let ctx = serde_json::to_string_pretty(context).unwrap_or_default();
        msg.push_str(&format!("\nContext:\n{ctx}\n"));
    }
    msg
}

pub fn explanation_user_prompt(query: &str, language: QueryLanguage) -> String {
    format!("{language} query:\n{}", query.trim())
}
