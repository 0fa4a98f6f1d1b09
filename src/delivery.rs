//! Delivery state machine.
//!
//! Orchestrates segmentation, submission, oversize recovery, completion
//! observation and the final relay hand-off. The channel is strictly
//! sequential: chunk `i+1` is never produced before round `i` has been
//! observed as complete, because the host interface has no chunk-identity
//! concept of its own.

use crate::observer::{CompletionObserver, RoundPhase};
use crate::relay::{AnswerSink, RelayOutcome, ResponseRelay};
use crate::segmenter::Segmenter;
use crate::surface::{InterfaceAdapter, OversizeDetector, ProbeSet, Surface};
use crate::{CourierConfig, CourierError, Result};
use tracing::{debug, info, warn};

/// States of one delivery run, initial to terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    Ready,
    SentInitial,
    Sending(u32),
    AwaitingAck(u32),
    AwaitingFinal,
    Done,
    Failed,
}

/// Mutable per-run state, owned exclusively by the state machine.
#[derive(Debug)]
struct DeliverySession {
    state: DeliveryState,
    chunk_size: usize,
    chunks_sent: u32,
    total_estimate: u32,
    closing_sent: bool,
    /// Last output visible before the most recent submission; the observer
    /// treats text still equal to it as the previous round's reply.
    prior_output: Option<String>,
    captured: String,
}

impl DeliverySession {
    fn new(chunk_size: usize) -> Self {
        Self {
            state: DeliveryState::Idle,
            chunk_size,
            chunks_sent: 0,
            total_estimate: 0,
            closing_sent: false,
            prior_output: None,
            captured: String::new(),
        }
    }

    fn transition(&mut self, next: DeliveryState) {
        debug!("Delivery state: {:?} -> {next:?}", self.state);
        self.state = next;
    }
}

/// End-to-end driver for one document.
pub struct Courier {
    config: CourierConfig,
    adapter: InterfaceAdapter,
    observer: CompletionObserver,
    oversize: OversizeDetector,
}

impl Courier {
    pub fn new(config: CourierConfig) -> Self {
        Self::with_probes(config, ProbeSet::default())
    }

    pub fn with_probes(config: CourierConfig, probes: ProbeSet) -> Self {
        Self {
            adapter: InterfaceAdapter::new(probes, config.clone()),
            observer: CompletionObserver::new(config.clone()),
            oversize: OversizeDetector::new(),
            config,
        }
    }

    /// Deliver `document` through the interface and hand the final answer to
    /// the relay. Returns the accepted answer text.
    pub async fn run<S: Surface, T: AnswerSink>(
        &self,
        surface: &mut S,
        document: &str,
        intent: &str,
        relay: &ResponseRelay<T>,
    ) -> Result<String> {
        let mut session = DeliverySession::new(self.config.initial_chunk_size);

        self.adapter.wait_for_input(surface).await?;
        session.transition(DeliveryState::Ready);

        if document.chars().count() <= self.config.initial_chunk_size {
            self.deliver_single(surface, &mut session, document, intent)
                .await?;
        } else {
            self.deliver_chunked(surface, &mut session, document, intent)
                .await?;
        }

        debug_assert!(session.closing_sent);
        session.transition(DeliveryState::AwaitingFinal);
        let outcome = self
            .observer
            .await_round(
                surface,
                &self.adapter,
                RoundPhase::Final,
                session.prior_output.as_deref(),
            )
            .await?;
        if !outcome.started {
            warn!("No output ever appeared; proceeding with empty capture");
        }
        session.captured = outcome.text;

        match self.relay_with_retry(surface, &mut session, relay).await {
            Ok(answer) => {
                session.transition(DeliveryState::Done);
                info!(
                    "Delivery complete: {} chunks sent, {} chars relayed",
                    session.chunks_sent,
                    answer.chars().count()
                );
                Ok(answer)
            }
            Err(e) => {
                session.transition(DeliveryState::Failed);
                Err(e)
            }
        }
    }

    /// The document fits in one message under the initial size: a single
    /// combined submission carrying both the intent and the full content.
    /// If even that is rejected as oversize, shrink once and fall back to
    /// the chunked path.
    async fn deliver_single<S: Surface>(
        &self,
        surface: &mut S,
        session: &mut DeliverySession,
        document: &str,
        intent: &str,
    ) -> Result<()> {
        let message = combined_message(intent, document);
        session.transition(DeliveryState::Sending(1));

        session.prior_output = self.adapter.last_output(surface).await?;
        if self.submit_checked(surface, &message).await? {
            session.chunks_sent = 1;
            session.total_estimate = 1;
            session.closing_sent = true;
            return Ok(());
        }

        warn!("Combined message rejected as oversize, switching to chunked delivery");
        session.chunk_size = self.shrunk_size(session.chunk_size)?;
        self.deliver_chunked(surface, session, document, intent).await
    }

    /// Multi-chunk delivery: framing message, then the adaptive per-chunk
    /// loop with the closing marker appended to the last chunk.
    async fn deliver_chunked<S: Surface>(
        &self,
        surface: &mut S,
        session: &mut DeliverySession,
        document: &str,
        intent: &str,
    ) -> Result<()> {
        session.total_estimate = Segmenter::plan_estimate(document, session.chunk_size);
        info!(
            "Chunked delivery: {} chars in ~{} chunks of {}",
            document.chars().count(),
            session.total_estimate,
            session.chunk_size
        );

        let framing = framing_message(session.total_estimate, intent);
        session.prior_output = self.adapter.last_output(surface).await?;
        self.adapter.submit(surface, &framing).await?;
        session.transition(DeliveryState::SentInitial);
        self.observer
            .await_round(
                surface,
                &self.adapter,
                RoundPhase::MidDelivery,
                session.prior_output.as_deref(),
            )
            .await?;

        let mut remaining = document;
        let mut index: u32 = 1;

        while let Some(mut chunk) =
            Segmenter::next_chunk(remaining, session.chunk_size, index, session.total_estimate)
        {
            session.transition(DeliveryState::Sending(index));
            session.prior_output = self.adapter.last_output(surface).await?;

            // Adaptive sizing: shrink and re-derive from the same offset
            // until the interface accepts. Previously accepted chunks are
            // never re-sent.
            loop {
                let last = chunk.is_last();
                let message = if last {
                    let mut m = chunk_message(&chunk);
                    m.push_str(&closing_suffix(chunk.total_estimate, intent));
                    m
                } else {
                    chunk_message(&chunk)
                };

                if self.submit_checked(surface, &message).await? {
                    session.chunks_sent = index;
                    session.total_estimate = chunk.total_estimate;
                    remaining = &remaining[chunk.text.len()..];
                    if last {
                        session.closing_sent = true;
                        debug_assert!(remaining.is_empty());
                        return Ok(());
                    }
                    break;
                }

                session.chunk_size = self.shrunk_size(session.chunk_size)?;
                warn!(
                    "Chunk {index} rejected as oversize, retrying at {} chars",
                    session.chunk_size
                );
                chunk = Segmenter::next_chunk(
                    remaining,
                    session.chunk_size,
                    index,
                    session.total_estimate,
                )
                .expect("remaining is non-empty while resubmitting");
                session.total_estimate = chunk.total_estimate;
            }

            session.transition(DeliveryState::AwaitingAck(index));
            self.observer
                .await_round(
                    surface,
                    &self.adapter,
                    RoundPhase::MidDelivery,
                    session.prior_output.as_deref(),
                )
                .await?;
            index += 1;
        }

        Ok(())
    }

    /// Submit and check for an oversize rejection. `Ok(true)` means the
    /// interface accepted the message for processing.
    async fn submit_checked<S: Surface>(&self, surface: &mut S, message: &str) -> Result<bool> {
        self.adapter.submit(surface, message).await?;
        tokio::time::sleep(self.config.oversize_check_delay).await;
        let rejected = self.oversize.was_rejected(surface, &self.adapter).await?;
        Ok(!rejected)
    }

    /// Next chunk size after an oversize rejection. Reaching the floor
    /// without acceptance means the content cannot be delivered at all.
    fn shrunk_size(&self, current: usize) -> Result<usize> {
        if current <= self.config.min_chunk_size {
            return Err(CourierError::ChunkSizeExhausted {
                reached: current,
                floor: self.config.min_chunk_size,
            });
        }
        let next = (current as f64 * self.config.shrink_factor).floor() as usize;
        Ok(next.max(self.config.min_chunk_size))
    }

    /// Hand the captured answer downstream, re-polling for fresh text when
    /// the relay reports it looks incomplete. Attempts are bounded; every
    /// retry is counted.
    async fn relay_with_retry<S: Surface, T: AnswerSink>(
        &self,
        surface: &mut S,
        session: &mut DeliverySession,
        relay: &ResponseRelay<T>,
    ) -> Result<String> {
        let mut last_outcome = RelayOutcome::RejectedIncomplete;

        for attempt in 1..=self.config.max_relay_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.relay_retry_delay).await;
                // No new submission happened, so no baseline: the current
                // stable text is legitimate even if unchanged.
                let outcome = self
                    .observer
                    .await_round(surface, &self.adapter, RoundPhase::Final, None)
                    .await?;
                if !outcome.text.is_empty() {
                    session.captured = outcome.text;
                }
            }

            last_outcome = relay.relay(&session.captured).await;
            match &last_outcome {
                RelayOutcome::Accepted => return Ok(session.captured.clone()),
                RelayOutcome::RejectedIncomplete => {
                    warn!(
                        "Relay attempt {attempt}/{} rejected as incomplete",
                        self.config.max_relay_attempts
                    );
                }
                RelayOutcome::TransportError(reason) => {
                    warn!(
                        "Relay attempt {attempt}/{} transport error: {reason}",
                        self.config.max_relay_attempts
                    );
                }
            }
        }

        Err(CourierError::RelayExhausted {
            attempts: self.config.max_relay_attempts,
            last_outcome: last_outcome.to_string(),
        })
    }
}

// ─── Message framing ─────────────────────────────────────────────────

/// Single-message delivery: intent and full content in one submission.
fn combined_message(intent: &str, document: &str) -> String {
    format!("{intent}\n\nDocument content:\n\n{document}")
}

/// Announces the delivery and restates the intent before any content goes
/// out, so the recipient knows to hold its answer.
fn framing_message(estimate: u32, intent: &str) -> String {
    format!(
        "I am going to send you a document in {estimate} parts, one message at a time. \
         After each part, reply only with \"Received chunk N/{estimate}\" and wait for the next one. \
         Do not answer until I write ALL PARTS SENT. The eventual task: {intent}"
    )
}

fn chunk_message(chunk: &crate::segmenter::Chunk) -> String {
    format!(
        "CHUNK {}/{}:\n\n{}",
        chunk.index, chunk.total_estimate, chunk.text
    )
}

/// Appended to the last chunk instead of sent separately, to avoid an extra
/// acknowledgment round-trip right where a clean final answer matters most.
fn closing_suffix(total: u32, intent: &str) -> String {
    format!(
        "\n\nALL PARTS SENT ({total} chunks). Using the complete document above: {intent}"
    )
}
