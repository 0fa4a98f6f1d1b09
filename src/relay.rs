//! Relay endpoint client.
//!
//! Upstream, the local relay endpoint supplies the document and intent;
//! downstream it receives the final captured answer. Before any transport,
//! the answer is classified against the acknowledgment vocabulary - sending
//! "Received chunk 3/3" to the collaborator would just waste a round trip.

use crate::observer::AckVocabulary;
use crate::{CourierError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one attempt to hand the final answer to the relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Endpoint stored the answer
    Accepted,

    /// The answer looks incomplete - locally classified as acknowledgment
    /// noise, or rejected by the endpoint itself
    RejectedIncomplete,

    /// The endpoint could not be reached or answered garbage
    TransportError(String),
}

impl std::fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayOutcome::Accepted => write!(f, "accepted"),
            RelayOutcome::RejectedIncomplete => write!(f, "rejected-incomplete"),
            RelayOutcome::TransportError(reason) => write!(f, "transport-error: {reason}"),
        }
    }
}

/// The document and intent fetched from the upstream collaborator.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    /// Full document text
    pub content: String,

    /// What the recipient should do with the document
    pub intent: String,

    /// When the collaborator prepared the content
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ContentPayload {
    content: String,

    #[serde(default, alias = "question")]
    intent: Option<String>,

    /// Unix seconds, as the collaborator serves it
    #[serde(default)]
    timestamp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    success: bool,

    #[serde(default)]
    error: Option<String>,
}

const DEFAULT_INTENT: &str =
    "Please analyze the above document and answer thoroughly.";

/// Transport seam for handing an answer downstream. [`RelayClient`] is the
/// HTTP implementation; tests plug in scripted sinks.
#[allow(async_fn_in_trait)]
pub trait AnswerSink {
    async fn accept(&self, answer: &str) -> RelayOutcome;
}

impl<T: AnswerSink> AnswerSink for &T {
    async fn accept(&self, answer: &str) -> RelayOutcome {
        T::accept(self, answer).await
    }
}

/// HTTP client for the local relay endpoint.
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CourierError::Relay(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the pending document and intent from the collaborator.
    pub async fn fetch_job(&self) -> Result<DeliveryJob> {
        let url = format!("{}/content", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CourierError::Relay(format!("fetching content: {e}")))?;

        if !response.status().is_success() {
            return Err(CourierError::Relay(format!(
                "content endpoint returned {}",
                response.status()
            )));
        }

        let payload: ContentPayload = response
            .json()
            .await
            .map_err(|e| CourierError::Relay(format!("content payload: {e}")))?;

        let timestamp = payload
            .timestamp
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0));
        info!(
            "Fetched job: {} chars, prepared {}",
            payload.content.chars().count(),
            timestamp.map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339())
        );

        Ok(DeliveryJob {
            content: payload.content,
            intent: payload.intent.unwrap_or_else(|| DEFAULT_INTENT.to_string()),
            timestamp,
        })
    }
}

impl AnswerSink for RelayClient {
    async fn accept(&self, answer: &str) -> RelayOutcome {
        let url = format!("{}/response", self.base_url);
        let body = json!({
            "response": answer,
            "timestamp": Utc::now().timestamp() as f64,
        });

        let response = match self.client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => return RelayOutcome::TransportError(e.to_string()),
        };

        let status = response.status();
        let parsed: SubmitResponse = match response.json().await {
            Ok(p) => p,
            Err(e) if status.is_success() => {
                return RelayOutcome::TransportError(format!("response payload: {e}"))
            }
            Err(_) => SubmitResponse {
                success: false,
                error: Some(format!("endpoint returned {status}")),
            },
        };

        if parsed.success {
            RelayOutcome::Accepted
        } else if status.is_success() || status.is_client_error() {
            // The endpoint looked at the answer and said no
            debug!(
                "Endpoint rejected answer: {}",
                parsed.error.as_deref().unwrap_or("no detail")
            );
            RelayOutcome::RejectedIncomplete
        } else {
            RelayOutcome::TransportError(
                parsed.error.unwrap_or_else(|| format!("endpoint returned {status}")),
            )
        }
    }
}

/// Wraps a sink with the local pre-transport classification.
pub struct ResponseRelay<T: AnswerSink> {
    sink: T,
    vocabulary: AckVocabulary,
}

impl<T: AnswerSink> ResponseRelay<T> {
    pub fn new(sink: T) -> Self {
        Self {
            sink,
            vocabulary: AckVocabulary::new(),
        }
    }

    /// Hand `answer` downstream. Acknowledgment noise is rejected locally
    /// without ever touching the wire.
    pub async fn relay(&self, answer: &str) -> RelayOutcome {
        if self.vocabulary.is_relay_noise(answer) {
            warn!("Captured text is acknowledgment chatter, not relaying");
            return RelayOutcome::RejectedIncomplete;
        }
        self.sink.accept(answer).await
    }
}

/// Clean up the captured answer for terminal display: collapse runs of
/// blank lines and strip stray header/separator framing the interface
/// sometimes includes in its own text.
pub fn normalize_answer(answer: &str) -> String {
    let collapsed = Regex::new(r"\n{3,}")
        .unwrap()
        .replace_all(answer, "\n\n")
        .into_owned();
    let without_header = Regex::new(r"^-+\s*\n[A-Z ]*RESPONSE:\s*\n-+\s*\n")
        .unwrap()
        .replace(&collapsed, "")
        .into_owned();
    Regex::new(r"\n=+\s*$")
        .unwrap()
        .replace(&without_header, "")
        .trim()
        .to_string()
}
