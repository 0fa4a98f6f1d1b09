//! Interface adapter: locating and driving the host's controls.
//!
//! All lookups go through ranked probe lists (first match wins). Failing to
//! find an input control at all is fatal; a missing submit control falls
//! back to a simulated keyboard submit before giving up.

use super::{Probe, ProbeSet, Surface};
use crate::{CourierConfig, CourierError, Result};
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Drives the host interface's input and submission controls.
pub struct InterfaceAdapter {
    probes: ProbeSet,
    config: CourierConfig,
}

impl InterfaceAdapter {
    pub fn new(probes: ProbeSet, config: CourierConfig) -> Self {
        Self { probes, config }
    }

    pub fn probes(&self) -> &ProbeSet {
        &self.probes
    }

    /// Try `probes` in rank order, returning the first located control.
    pub async fn find_first<S: Surface>(
        &self,
        surface: &mut S,
        probes: &[Probe],
    ) -> Result<Option<(S::Handle, &'static str)>> {
        for probe in probes {
            if let Some(handle) = surface.locate(probe).await? {
                return Ok(Some((handle, probe.label)));
            }
        }
        Ok(None)
    }

    /// Wait until the interface's input surface becomes detectable, bounded
    /// by the ready timeout. Never finding it is a fatal condition.
    pub async fn wait_for_input<S: Surface>(&self, surface: &mut S) -> Result<S::Handle> {
        let deadline = Instant::now() + self.config.ready_timeout;

        loop {
            if let Some((handle, label)) = self.find_first(surface, &self.probes.input).await? {
                debug!("Input control located via {label}");
                return Ok(handle);
            }
            if Instant::now() >= deadline {
                let tried: Vec<&str> = self.probes.input.iter().map(|p| p.label).collect();
                return Err(CourierError::SurfaceNotFound(format!(
                    "no input control after {:?} (probes tried: {})",
                    self.config.ready_timeout,
                    tried.join(", ")
                )));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Populate the input control with `text` and trigger submission.
    ///
    /// "Accepted" here only means the gesture went through; whether the host
    /// actually took the message is the oversize detector's question.
    pub async fn submit<S: Surface>(&self, surface: &mut S, text: &str) -> Result<()> {
        let (input, label) = self
            .find_first(surface, &self.probes.input)
            .await?
            .ok_or_else(|| {
                CourierError::SurfaceNotFound("input control vanished before submit".to_string())
            })?;
        debug!("Submitting {} chars via {label}", text.chars().count());

        surface.fill(&input, text).await?;

        // The host enables its submit affordance off the input event; give it
        // a beat before looking for the button.
        tokio::time::sleep(self.config.settle_delay).await;

        match self.find_first(surface, &self.probes.submit).await? {
            Some((button, label)) => {
                debug!("Clicking submit control ({label})");
                surface.click(&button).await?;
            }
            None => {
                warn!("No submit control found, falling back to keyboard submit");
                surface.submit_key(&input).await?;
            }
        }

        Ok(())
    }

    /// Text of the last message in the interface's output region, if any
    /// output exists yet.
    pub async fn last_output<S: Surface>(&self, surface: &mut S) -> Result<Option<String>> {
        for probe in &self.probes.output {
            let nodes = surface.locate_all(probe).await?;
            if let Some(last) = nodes.last() {
                return Ok(Some(surface.text_of(last).await?));
            }
        }
        Ok(None)
    }

    /// Whether a generation-in-progress indicator is currently present.
    pub async fn is_busy<S: Surface>(&self, surface: &mut S) -> Result<bool> {
        Ok(self.find_first(surface, &self.probes.busy).await?.is_some())
    }

    /// First non-empty error-styled text on the page, if any.
    pub async fn visible_error<S: Surface>(&self, surface: &mut S) -> Result<Option<String>> {
        for probe in &self.probes.error {
            if let Some(handle) = surface.locate(probe).await? {
                let text = surface.text_of(&handle).await?;
                if !text.trim().is_empty() {
                    return Ok(Some(text));
                }
            }
        }
        Ok(None)
    }
}

/// Detects that the host silently or visibly refused a message as too large.
///
/// Two independent signals, either alone sufficient: error-styled text
/// matching the oversize vocabulary, or a disabled submit control while the
/// input still holds the content.
pub struct OversizeDetector {
    vocabulary: Vec<Regex>,
}

impl OversizeDetector {
    pub fn new() -> Self {
        Self {
            vocabulary: Self::compile_vocabulary(),
        }
    }

    fn compile_vocabulary() -> Vec<Regex> {
        vec![
            Regex::new(r"(?i)too\s+long").unwrap(),
            Regex::new(r"(?i)too\s+large").unwrap(),
            Regex::new(r"(?i)exceeds?").unwrap(),
            Regex::new(r"(?i)\blimit\b").unwrap(),
            Regex::new(r"(?i)maximum\s+(?:length|size|characters)").unwrap(),
            Regex::new(r"(?i)message\s+is\s+too").unwrap(),
        ]
    }

    /// Whether `text` reads like an oversize rejection.
    pub fn matches_vocabulary(&self, text: &str) -> bool {
        self.vocabulary.iter().any(|p| p.is_match(text))
    }

    /// Inspect the interface shortly after a submission attempt.
    pub async fn was_rejected<S: Surface>(
        &self,
        surface: &mut S,
        adapter: &InterfaceAdapter,
    ) -> Result<bool> {
        // Signal (a): visible error text from the oversize vocabulary
        if let Some(error_text) = adapter.visible_error(surface).await? {
            if self.matches_vocabulary(&error_text) {
                debug!("Oversize signal: error text {error_text:?}");
                return Ok(true);
            }
        }

        // Signal (b): submit control disabled while the input still holds
        // the content - the host silently refused it
        if let Some((input, _)) = adapter.find_first(surface, &adapter.probes().input).await? {
            let pending = surface.input_value(&input).await?;
            if !pending.trim().is_empty() {
                if let Some((button, _)) =
                    adapter.find_first(surface, &adapter.probes().submit).await?
                {
                    if !surface.is_enabled(&button).await? {
                        debug!("Oversize signal: submit disabled with populated input");
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }
}

impl Default for OversizeDetector {
    fn default() -> Self {
        Self::new()
    }
}
