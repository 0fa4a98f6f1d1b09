//! chunk-courier - Chunked Conversation Delivery Driver
//!
//! A headless driver that pushes an arbitrarily large document into a
//! conversational text interface that only accepts one bounded-size message
//! at a time:
//! - Splits content into chunks, discovering the size limit empirically
//! - Tells the interface's "received part N" chatter apart from real answers
//! - Decides when generation has genuinely finished
//! - Hands exactly one final answer back to a local relay endpoint

pub mod delivery;
pub mod observer;
pub mod relay;
pub mod segmenter;
pub mod surface;
pub mod transcript;

pub use delivery::{Courier, DeliveryState};
pub use observer::{CompletionObserver, OutputClass, RoundPhase};
pub use relay::{RelayClient, RelayOutcome};
pub use segmenter::{Chunk, Segmenter};
pub use surface::{Probe, ProbeSet, Surface};
pub use transcript::Transcript;

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for a delivery run.
///
/// The stability counts and ceilings are empirical tuning, not protocol
/// guarantees; every one of them can be overridden from a TOML file or the
/// CLI.
#[derive(Debug, Clone)]
pub struct CourierConfig {
    /// Chunk size (characters) used until the interface rejects a message
    pub initial_chunk_size: usize,

    /// Floor below which the chunk size never shrinks; reaching it without
    /// acceptance fails the run
    pub min_chunk_size: usize,

    /// Factor applied to the chunk size on every oversize rejection
    pub shrink_factor: f64,

    /// Interval between output observations
    pub poll_interval: Duration,

    /// Delay between filling the input and triggering submission
    pub settle_delay: Duration,

    /// Delay between submission and the oversize check
    pub oversize_check_delay: Duration,

    /// How long to wait for the interface's input surface to appear
    pub ready_timeout: Duration,

    /// Ceiling for one round of output observation
    pub round_timeout: Duration,

    /// Shorter ceiling for "output never started at all"
    pub never_started_timeout: Duration,

    /// Base stable-poll run required mid-delivery (acknowledgments)
    pub ack_stable_polls: u32,

    /// Base stable-poll run required after the closing marker
    pub final_stable_polls: u32,

    /// One extra stable poll is required per this many characters of output
    pub stable_polls_per_chars: usize,

    /// Upper bound on the required stable-poll run
    pub max_stable_polls: u32,

    /// Delay before re-polling after the relay reports an incomplete answer
    pub relay_retry_delay: Duration,

    /// Maximum attempts to hand the answer to the relay endpoint
    pub max_relay_attempts: u32,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            initial_chunk_size: 12_000,
            min_chunk_size: 1_000,
            shrink_factor: 0.7,
            poll_interval: Duration::from_millis(500),
            settle_delay: Duration::from_millis(500),
            oversize_check_delay: Duration::from_millis(1_500),
            ready_timeout: Duration::from_secs(60),
            round_timeout: Duration::from_secs(300),
            never_started_timeout: Duration::from_secs(30),
            ack_stable_polls: 6,
            final_stable_polls: 10,
            stable_polls_per_chars: 2_000,
            max_stable_polls: 24,
            relay_retry_delay: Duration::from_secs(5),
            max_relay_attempts: 3,
        }
    }
}

impl CourierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_chunk_size(mut self, size: usize) -> Self {
        self.initial_chunk_size = size;
        self
    }

    pub fn with_min_chunk_size(mut self, size: usize) -> Self {
        self.min_chunk_size = size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_relay_attempts(mut self, attempts: u32) -> Self {
        self.max_relay_attempts = attempts;
        self
    }

    /// Load a config, applying a TOML overlay of optional fields on top of
    /// the defaults. Durations are given in milliseconds in the file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let overlay: ConfigOverlay =
            toml::from_str(&text).map_err(|e| CourierError::Config(e.to_string()))?;
        Ok(overlay.apply(Self::default()))
    }
}

/// Optional-field mirror of [`CourierConfig`] for the TOML file layer.
#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    initial_chunk_size: Option<usize>,
    min_chunk_size: Option<usize>,
    shrink_factor: Option<f64>,
    poll_interval_ms: Option<u64>,
    settle_delay_ms: Option<u64>,
    oversize_check_delay_ms: Option<u64>,
    ready_timeout_ms: Option<u64>,
    round_timeout_ms: Option<u64>,
    never_started_timeout_ms: Option<u64>,
    ack_stable_polls: Option<u32>,
    final_stable_polls: Option<u32>,
    stable_polls_per_chars: Option<usize>,
    max_stable_polls: Option<u32>,
    relay_retry_delay_ms: Option<u64>,
    max_relay_attempts: Option<u32>,
}

impl ConfigOverlay {
    fn apply(self, mut config: CourierConfig) -> CourierConfig {
        if let Some(v) = self.initial_chunk_size {
            config.initial_chunk_size = v;
        }
        if let Some(v) = self.min_chunk_size {
            config.min_chunk_size = v;
        }
        if let Some(v) = self.shrink_factor {
            config.shrink_factor = v;
        }
        if let Some(v) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = self.settle_delay_ms {
            config.settle_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.oversize_check_delay_ms {
            config.oversize_check_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.ready_timeout_ms {
            config.ready_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.round_timeout_ms {
            config.round_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.never_started_timeout_ms {
            config.never_started_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.ack_stable_polls {
            config.ack_stable_polls = v;
        }
        if let Some(v) = self.final_stable_polls {
            config.final_stable_polls = v;
        }
        if let Some(v) = self.stable_polls_per_chars {
            config.stable_polls_per_chars = v;
        }
        if let Some(v) = self.max_stable_polls {
            config.max_stable_polls = v;
        }
        if let Some(v) = self.relay_retry_delay_ms {
            config.relay_retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.max_relay_attempts {
            config.max_relay_attempts = v;
        }
        config
    }
}

/// Result type for courier operations
pub type Result<T> = std::result::Result<T, CourierError>;

/// Errors that can occur during a delivery run
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    #[error("Interface input surface not found: {0}")]
    SurfaceNotFound(String),

    #[error("Chunk size shrunk to {reached} (floor {floor}) without acceptance")]
    ChunkSizeExhausted { reached: usize, floor: usize },

    #[error("Relay attempts exhausted after {attempts} tries: {last_outcome}")]
    RelayExhausted { attempts: u32, last_outcome: String },

    #[error("Surface operation failed: {0}")]
    Surface(String),

    #[error("Relay endpoint error: {0}")]
    Relay(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
