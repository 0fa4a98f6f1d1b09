//! Completion observation.
//!
//! The host interface has no acknowledgment API; the only way to know a
//! round finished is to watch its live output region until the text stops
//! changing and no generation indicator remains. On top of stability the
//! observer classifies what it sees, because "Received chunk 2/5" is
//! chatter, not an answer.

use crate::surface::{InterfaceAdapter, Surface};
use crate::{CourierConfig, Result};
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Classification of the interface's current output text.
///
/// Derived on every poll, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputClass {
    /// A generation-in-progress indicator is present
    Thinking,

    /// Text matching the "received part N, waiting for more" vocabulary
    TransientAck,

    /// Non-empty text that could be the real answer
    FinalCandidate,

    /// Nothing observable yet
    Unknown,
}

/// Which round of the delivery this observation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Chunks remain unsent; an acknowledgment is the expected outcome
    MidDelivery,

    /// The closing marker went out; the next stable text is the answer
    Final,
}

/// What one bounded observation of a round produced.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// Best text captured when the round resolved (may be empty)
    pub text: String,

    /// Whether any output or busy indicator ever appeared
    pub started: bool,

    /// Whether the round resolved by hitting a ceiling instead of stability
    pub timed_out: bool,
}

/// Patterns meaning "I received part N, waiting for more".
///
/// The relay-side patterns cover the closing round's equivalent noise
/// ("confirmed all N chunks sent") which must never be relayed as an answer.
pub struct AckVocabulary {
    ack_patterns: Vec<Regex>,
    relay_patterns: Vec<Regex>,
}

impl AckVocabulary {
    pub fn new() -> Self {
        Self {
            ack_patterns: vec![
                Regex::new(r"(?i)received\s+(?:chunk|part)\s+\d+\s*(?:/|of)\s*\d+").unwrap(),
                Regex::new(r"(?i)^\s*(?:got|received)\s+(?:it|chunk|part)\b").unwrap(),
                Regex::new(r"(?i)waiting\s+for\s+(?:the\s+)?(?:next|more|remaining)").unwrap(),
                Regex::new(r"(?i)ready\s+for\s+(?:the\s+)?next\s+(?:chunk|part)").unwrap(),
                Regex::new(r"(?i)please\s+(?:send|continue|proceed)").unwrap(),
                Regex::new(r"(?i)send\s+the\s+next\s+(?:chunk|part)").unwrap(),
                Regex::new(r"(?i)\backnowledged\b").unwrap(),
            ],
            relay_patterns: vec![
                Regex::new(r"(?i)confirmed?\b.{0,40}\d+\s+(?:chunks?|parts?)\s+(?:sent|received)")
                    .unwrap(),
                Regex::new(r"(?i)all\s+\d+\s+(?:chunks?|parts?)\s+received").unwrap(),
            ],
        }
    }

    /// Whether `text` reads like mid-delivery acknowledgment chatter.
    pub fn is_transient_ack(&self, text: &str) -> bool {
        self.ack_patterns.iter().any(|p| p.is_match(text))
    }

    /// Whether `text` is acknowledgment noise that must not be relayed as a
    /// final answer (superset of the mid-delivery vocabulary).
    pub fn is_relay_noise(&self, text: &str) -> bool {
        self.is_transient_ack(text) || self.relay_patterns.iter().any(|p| p.is_match(text))
    }
}

impl Default for AckVocabulary {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify the current observation.
pub fn classify(text: &str, busy: bool, phase: RoundPhase, vocab: &AckVocabulary) -> OutputClass {
    if busy {
        return OutputClass::Thinking;
    }
    if text.trim().is_empty() {
        return OutputClass::Unknown;
    }
    // Once the closing marker is out, everything non-empty is a candidate;
    // the relay classifier takes over from there.
    if phase == RoundPhase::MidDelivery && vocab.is_transient_ack(text) {
        return OutputClass::TransientAck;
    }
    OutputClass::FinalCandidate
}

/// Watches the output region until a round genuinely finishes.
pub struct CompletionObserver {
    config: CourierConfig,
    vocabulary: AckVocabulary,
}

impl CompletionObserver {
    pub fn new(config: CourierConfig) -> Self {
        Self {
            config,
            vocabulary: AckVocabulary::new(),
        }
    }

    /// How many byte-identical consecutive polls the current text needs
    /// before the round counts as complete. Longer output needs a longer
    /// run (generation may pause mid-stream), and the final round needs a
    /// longer run than mid-delivery acknowledgments.
    pub fn required_stable_polls(&self, text_chars: usize, phase: RoundPhase) -> u32 {
        let base = match phase {
            RoundPhase::MidDelivery => self.config.ack_stable_polls,
            RoundPhase::Final => self.config.final_stable_polls,
        };
        let scaled = if self.config.stable_polls_per_chars == 0 {
            0
        } else {
            (text_chars / self.config.stable_polls_per_chars) as u32
        };
        (base + scaled).min(self.config.max_stable_polls)
    }

    /// Poll the output region until the round completes, a ceiling is hit,
    /// or output never starts at all.
    ///
    /// `prior` is the last output visible before the submission this round
    /// follows: text still byte-identical to it is the previous round's
    /// reply, not this one's, and counts as "not started yet". Pass `None`
    /// when re-polling without a new submission.
    ///
    /// Ceilings resolve to a degraded outcome rather than an error: a
    /// partial answer is more useful than none.
    pub async fn await_round<S: Surface>(
        &self,
        surface: &mut S,
        adapter: &InterfaceAdapter,
        phase: RoundPhase,
        prior: Option<&str>,
    ) -> Result<RoundOutcome> {
        let start = Instant::now();
        let mut started = false;
        let mut last_text = String::new();
        let mut stable_count: u32 = 0;

        loop {
            if start.elapsed() >= self.config.round_timeout {
                warn!("Round ceiling reached, capturing current output");
                return Ok(RoundOutcome {
                    text: last_text,
                    started,
                    timed_out: true,
                });
            }

            let busy = adapter.is_busy(surface).await?;
            let text = adapter.last_output(surface).await?.unwrap_or_default();
            let stale = !busy && prior.is_some_and(|p| p == text);

            if busy || (!stale && !text.trim().is_empty()) {
                started = true;
            }
            if !started && start.elapsed() >= self.config.never_started_timeout {
                warn!("Output never started within {:?}", self.config.never_started_timeout);
                return Ok(RoundOutcome {
                    text: String::new(),
                    started: false,
                    timed_out: true,
                });
            }

            let class = if stale {
                OutputClass::Unknown
            } else {
                classify(&text, busy, phase, &self.vocabulary)
            };
            match class {
                OutputClass::Thinking => {
                    // Never stable while generating
                    stable_count = 0;
                    last_text = text;
                }
                OutputClass::Unknown => {
                    stable_count = 0;
                }
                class @ (OutputClass::TransientAck | OutputClass::FinalCandidate) => {
                    if text == last_text {
                        stable_count += 1;
                    } else {
                        stable_count = 1;
                        last_text = text.clone();
                    }

                    let required = self.required_stable_polls(text.chars().count(), phase);
                    if stable_count >= required {
                        debug!(
                            "Round stable after {stable_count} polls ({class:?}, {} chars)",
                            text.chars().count()
                        );
                        info!("Round complete ({phase:?})");
                        return Ok(RoundOutcome {
                            text,
                            started: true,
                            timed_out: false,
                        });
                    }
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_vocabulary() {
        let vocab = AckVocabulary::new();

        let acks = vec![
            "Received chunk 2/5, waiting for more.",
            "Received Chunk 3/3",
            "Got it, please send the next part.",
            "Acknowledged. Ready for the next chunk.",
            "received part 1 of 4",
        ];
        for msg in acks {
            assert!(vocab.is_transient_ack(msg), "Should be ack: {msg}");
        }

        let answers = vec![
            "The document describes three architectural layers.",
            "Based on your notes, the main themes are:",
        ];
        for msg in answers {
            assert!(!vocab.is_transient_ack(msg), "Should not be ack: {msg}");
        }
    }

    #[test]
    fn test_relay_noise_superset() {
        let vocab = AckVocabulary::new();
        assert!(vocab.is_relay_noise("Received chunk 3/3"));
        assert!(vocab.is_relay_noise("Confirmed: all 3 chunks received."));
        assert!(vocab.is_relay_noise("Confirmed, 4 chunks sent successfully"));
        assert!(!vocab.is_relay_noise("Here is my full analysis of the notes."));
    }

    #[test]
    fn test_classification() {
        let vocab = AckVocabulary::new();

        assert_eq!(
            classify("anything", true, RoundPhase::MidDelivery, &vocab),
            OutputClass::Thinking
        );
        assert_eq!(
            classify("", false, RoundPhase::MidDelivery, &vocab),
            OutputClass::Unknown
        );
        assert_eq!(
            classify("Received chunk 1/3", false, RoundPhase::MidDelivery, &vocab),
            OutputClass::TransientAck
        );
        assert_eq!(
            classify("A real answer.", false, RoundPhase::MidDelivery, &vocab),
            OutputClass::FinalCandidate
        );
        // After the closing marker, even ack-shaped text is a candidate;
        // the relay classifier rejects it instead
        assert_eq!(
            classify("Received chunk 3/3", false, RoundPhase::Final, &vocab),
            OutputClass::FinalCandidate
        );
    }

    #[test]
    fn test_required_stable_polls_scaling() {
        let observer = CompletionObserver::new(CourierConfig::default());

        let short_ack = observer.required_stable_polls(20, RoundPhase::MidDelivery);
        let short_final = observer.required_stable_polls(20, RoundPhase::Final);
        let long_final = observer.required_stable_polls(10_000, RoundPhase::Final);

        // Final rounds demand a longer run than acknowledgments
        assert!(short_final > short_ack);
        // Longer answers demand a longer run still
        assert!(long_final > short_final);
        // But never beyond the cap
        let huge = observer.required_stable_polls(1_000_000, RoundPhase::Final);
        assert_eq!(huge, CourierConfig::default().max_stable_polls);
    }
}
