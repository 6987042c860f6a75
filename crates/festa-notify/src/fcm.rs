//! FCM push client: multicast sends via the legacy HTTP API.
//!
//! One POST per batch of up to 1000 registration tokens; the response
//! carries a per-token result array in request order, which is folded
//! into a [`MulticastOutcome`] with permanent failures flagged so the
//! caller can prune dead registrations.

use async_trait::async_trait;
use festa_core::config::PushConfig;
use festa_core::error::{FestaError, Result};
use festa_core::traits::MulticastSender;
use festa_core::types::{MulticastOutcome, NotificationMessage, TokenResult};
use serde::Deserialize;
use std::time::Duration;

/// Largest token batch the legacy endpoint accepts per request.
const MAX_BATCH: usize = 1000;

pub struct FcmClient {
    config: PushConfig,
    client: reqwest::Client,
}

/// Legacy FCM multicast response.
#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    success: i64,
    #[serde(default)]
    failure: i64,
    #[serde(default)]
    results: Vec<FcmResult>,
}

/// Per-token entry, in registration_ids order.
#[derive(Debug, Deserialize)]
struct FcmResult {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl FcmClient {
    pub fn new(config: PushConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Whether `code` marks the token permanently dead (configured set;
    /// defaults cover InvalidRegistration and NotRegistered).
    fn is_permanent(&self, code: &str) -> bool {
        self.config.permanent_errors.iter().any(|c| c == code)
    }

    fn payload(&self, message: &NotificationMessage, tokens: &[String]) -> serde_json::Value {
        serde_json::json!({
            "registration_ids": tokens,
            "notification": {
                "title": message.title,
                "body": message.body,
                "tag": message.tag,
            },
            "data": message.data,
        })
    }

    async fn send_batch(
        &self,
        message: &NotificationMessage,
        tokens: &[String],
        outcome: &mut MulticastOutcome,
    ) -> Result<()> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("key={}", self.config.server_key))
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&self.payload(message, tokens))
            .send()
            .await
            .map_err(|e| FestaError::Channel(format!("FCM send failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FestaError::Http(format!("FCM returned HTTP {status}")));
        }

        let body: FcmResponse = response
            .json()
            .await
            .map_err(|e| FestaError::Channel(format!("Invalid FCM response: {e}")))?;
        tracing::debug!(
            "📣 FCM batch: {} tokens, {} ok, {} failed",
            tokens.len(),
            body.success,
            body.failure
        );

        // Counters are recomputed from per-token results rather than
        // trusted from the response header fields.
        for (i, token) in tokens.iter().enumerate() {
            let entry = body.results.get(i);
            let error = match entry {
                Some(r) if r.message_id.is_some() && r.error.is_none() => None,
                Some(r) => Some(r.error.clone().unwrap_or_else(|| "Unknown".into())),
                // Response shorter than the batch: treat as failed
                None => Some("MissingResult".into()),
            };
            match error {
                None => {
                    outcome.success_count += 1;
                    outcome.results.push(TokenResult {
                        token: token.clone(),
                        success: true,
                        error_code: None,
                        permanent: false,
                    });
                }
                Some(code) => {
                    let permanent = self.is_permanent(&code);
                    if permanent {
                        tracing::warn!("⚠️ Dead device token ({code}): {}", truncate(token));
                    }
                    outcome.failure_count += 1;
                    outcome.results.push(TokenResult {
                        token: token.clone(),
                        success: false,
                        error_code: Some(code),
                        permanent,
                    });
                }
            }
        }
        Ok(())
    }
}

fn truncate(token: &str) -> &str {
    token.get(..12).unwrap_or(token)
}

#[async_trait]
impl MulticastSender for FcmClient {
    fn is_configured(&self) -> bool {
        self.config.enabled && !self.config.server_key.is_empty()
    }

    async fn send_multicast(
        &self,
        message: &NotificationMessage,
        tokens: &[String],
    ) -> Result<MulticastOutcome> {
        let mut outcome = MulticastOutcome::default();
        if tokens.is_empty() {
            return Ok(outcome);
        }
        for batch in tokens.chunks(MAX_BATCH) {
            self.send_batch(message, batch, &mut outcome).await?;
        }
        Ok(outcome)
    }
}
