//! Slack Events API bot: request signing, event routing and threaded replies.
//!
//! Slack signs every request with the app's signing secret:
//! `v0=hex(hmac_sha256(secret, "v0:{timestamp}:{body}"))`. Requests whose
//! timestamp is more than five minutes off are rejected as replays.

use hmac::{Hmac, Mac};
use regex::Regex;
use serde::Deserialize;
use sha2::Sha256;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";
const SIGNATURE_VERSION: &str = "v0";
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@[A-Z0-9]+>").expect("valid regex"));

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("signing secret must not be empty")]
    InvalidSecret,
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("invalid request timestamp")]
    InvalidTimestamp,
    #[error("request timestamp is {0}s away from now")]
    StaleTimestamp(i64),
    #[error("signature mismatch")]
    BadSignature,
    #[error("slack api request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack api returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("slack api rejected the call: {0}")]
    Api(String),
}

/// Body of a request to the events endpoint.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    UrlVerification { challenge: String },
    EventCallback { event: SlackEvent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

/// A question addressed to the bot and where to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackQuestion {
    pub text: String,
    pub channel: String,
    pub thread_ts: Option<String>,
}

impl SlackEvent {
    /// Mentions in channels and direct messages become questions. Bot
    /// messages and edits/joins (any subtype) are ignored so the bot never
    /// answers itself.
    pub fn question(&self) -> Option<SlackQuestion> {
        if self.bot_id.is_some() || self.subtype.is_some() {
            return None;
        }
        let raw = self.text.as_deref()?;
        let text = match self.kind.as_str() {
            "app_mention" => strip_mentions(raw),
            "message" if self.channel_type.as_deref() == Some("im") => raw.trim().to_string(),
            _ => return None,
        };
        if text.is_empty() {
            return None;
        }
        Some(SlackQuestion {
            text,
            channel: self.channel.clone()?,
            thread_ts: self.thread_ts.clone().or_else(|| self.ts.clone()),
        })
    }
}

pub fn strip_mentions(text: &str) -> String {
    MENTION.replace_all(text, "").trim().to_string()
}

#[derive(Clone)]
pub struct SlackBot {
    keyed: HmacSha256,
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl SlackBot {
    pub fn new(
        signing_secret: impl Into<String>,
        bot_token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, SlackError> {
        let signing_secret = signing_secret.into();
        if signing_secret.is_empty() {
            return Err(SlackError::InvalidSecret);
        }
        let keyed = HmacSha256::new_from_slice(signing_secret.as_bytes())
            .map_err(|_| SlackError::InvalidSecret)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            keyed,
            bot_token: bot_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Check the `X-Slack-Signature` header against the raw body.
    /// `now` is Unix seconds.
    pub fn verify(
        &self,
        timestamp: &str,
        signature: &str,
        body: &[u8],
        now: i64,
    ) -> Result<(), SlackError> {
        let ts: i64 = timestamp.trim().parse().map_err(|_| SlackError::InvalidTimestamp)?;
        let skew = (now - ts).abs();
        if skew > TIMESTAMP_TOLERANCE_SECS {
            return Err(SlackError::StaleTimestamp(skew));
        }

        let expected = signature
            .strip_prefix("v0=")
            .and_then(|h| hex::decode(h).ok())
            .ok_or(SlackError::BadSignature)?;
        // verify_slice compares in constant time.
        self.mac(timestamp.trim(), body)
            .verify_slice(&expected)
            .map_err(|_| SlackError::BadSignature)
    }

    /// The header value Slack would send for this body.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        let digest = self.mac(timestamp, body).finalize().into_bytes();
        format!("{SIGNATURE_VERSION}={}", hex::encode(digest))
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        mac
    }

    /// Post `text` to the question's channel, threaded under the question.
    pub async fn reply(&self, question: &SlackQuestion, text: &str) -> Result<(), SlackError> {
        let mut payload = serde_json::json!({
            "channel": question.channel,
            "text": text,
        });
        if let Some(ts) = &question.thread_ts {
            payload["thread_ts"] = serde_json::Value::String(ts.clone());
        }

        let resp = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.bot_token)
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SlackError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Web API failures come back as 200 with `ok: false`.
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
        if parsed.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let reason = parsed
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error");
            return Err(SlackError::Api(reason.to_string()));
        }
        tracing::debug!("replied in slack channel {}", question.channel);
        Ok(())
    }
}
