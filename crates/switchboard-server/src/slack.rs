//! Slack-side plumbing: request signature verification for the events
//! endpoint and a minimal Web API client for posting replies.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const SLACK_API_HOST: &str = "https://slack.com";

/// Requests older than this are rejected outright as possible replays.
const REPLAY_WINDOW_SECS: i64 = 60 * 5;

type HmacSha256 = Hmac<Sha256>;

/// Validates `X-Slack-Signature` headers against the app's signing secret.
pub struct SlackVerifier {
    signing_secret: String,
}

impl SlackVerifier {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        SlackVerifier {
            signing_secret: signing_secret.into(),
        }
    }

    /// The `v0=<hex>` signature for a timestamp and raw request body.
    pub fn signature(&self, timestamp: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .expect("hmac accepts keys of any length");
        mac.update(format!("v0:{timestamp}:{body}").as_bytes());
        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a request's headers against its raw body. The timestamp must be
    /// inside the replay window and the signature must match exactly.
    pub fn verify(&self, timestamp: &str, signature: &str, body: &str) -> Result<()> {
        let sent: i64 = timestamp.parse().context("malformed timestamp header")?;
        let age = (chrono::Utc::now().timestamp() - sent).abs();
        if age > REPLAY_WINDOW_SECS {
            bail!("timestamp outside the replay window ({age}s old)");
        }

        let expected = self.signature(timestamp, body);
        if expected.as_bytes().ct_eq(signature.as_bytes()).into() {
            Ok(())
        } else {
            bail!("signature mismatch");
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

/// Posts reply text back to a channel via `chat.postMessage`.
pub struct SlackClient {
    client: reqwest::Client,
    host: String,
    bot_token: String,
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>) -> Result<Self> {
        Self::with_host(SLACK_API_HOST, bot_token)
    }

    pub fn with_host(host: impl Into<String>, bot_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building Slack HTTP client")?;
        Ok(SlackClient {
            client,
            host: host.into(),
            bot_token: bot_token.into(),
        })
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let url = format!("{}/api/chat.postMessage", self.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(&serde_json::json!({ "channel": channel, "text": text }))
            .send()
            .await
            .context("sending chat.postMessage")?
            .error_for_status()
            .context("chat.postMessage returned an error status")?;

        // Slack reports API-level failures inside a 200 body.
        let body: PostMessageResponse = response
            .json()
            .await
            .context("decoding chat.postMessage response")?;
        if !body.ok {
            bail!(
                "chat.postMessage failed: {}",
                body.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(())
    }
}
