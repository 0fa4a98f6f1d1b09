//! Host interface surface abstraction.
//!
//! The host chat interface's markup is not a contract this driver owns: it
//! changes constantly and without notice. Everything above this module sees
//! only generic structural operations (locate a control, fill it, click it)
//! plus ranked probe lists, so markup churn is isolated here.

pub mod adapter;
pub mod webdriver;

pub use adapter::{InterfaceAdapter, OversizeDetector};
pub use webdriver::WebDriverSurface;

use crate::Result;

/// A single structural probe: one way a control might be located.
///
/// Probes are heuristics, not guarantees; the adapter tries them in rank
/// order and takes the first success.
#[derive(Debug, Clone)]
pub struct Probe {
    /// CSS-style selector understood by the surface
    pub selector: String,

    /// Short human label used in logs and error causes
    pub label: &'static str,
}

impl Probe {
    pub fn new(selector: impl Into<String>, label: &'static str) -> Self {
        Self {
            selector: selector.into(),
            label,
        }
    }
}

/// Ranked probe lists for every control the delivery protocol needs.
#[derive(Debug, Clone)]
pub struct ProbeSet {
    /// Text-input-like control
    pub input: Vec<Probe>,

    /// Submit-like control
    pub submit: Vec<Probe>,

    /// Output-region-like container (the interface's reply messages)
    pub output: Vec<Probe>,

    /// "Generation in progress" indicator
    pub busy: Vec<Probe>,

    /// Error-styled text containers (oversize rejections surface here)
    pub error: Vec<Probe>,
}

impl Default for ProbeSet {
    fn default() -> Self {
        Self {
            input: vec![
                Probe::new("textarea[placeholder^=\"Send a message\"]", "placeholder textarea"),
                Probe::new("div[contenteditable=\"true\"]", "contenteditable div"),
                Probe::new("textarea.w-full", "full-width textarea"),
            ],
            submit: vec![
                Probe::new("button[aria-label=\"Send message\"]", "aria send button"),
                Probe::new("button[data-testid=\"send-button\"]", "testid send button"),
                Probe::new("form button[type=\"submit\"]", "form submit button"),
            ],
            output: vec![Probe::new(
                "[data-message-author-role=\"assistant\"]",
                "assistant message",
            )],
            busy: vec![
                Probe::new(".result-thinking", "thinking marker"),
                Probe::new("[role=\"progressbar\"]", "progressbar"),
                Probe::new(".animate-spin", "spinner"),
                Probe::new("[data-state=\"loading\"]", "loading state"),
            ],
            error: vec![
                Probe::new("[role=\"alert\"]", "alert"),
                Probe::new(".text-red-500", "red text"),
            ],
        }
    }
}

/// Generic structural operations on the host interface.
///
/// Implementations: [`WebDriverSurface`] for a real browser session, and
/// scripted in-memory surfaces in the tests. All methods take `&mut self`
/// because the driver is strictly sequential and owns its surface for the
/// whole run.
#[allow(async_fn_in_trait)]
pub trait Surface {
    /// Opaque handle to a located control, valid until the tree mutates
    type Handle: Clone;

    /// Locate the first control matching `probe`, if any.
    async fn locate(&mut self, probe: &Probe) -> Result<Option<Self::Handle>>;

    /// Locate every control matching `probe`, in document order.
    async fn locate_all(&mut self, probe: &Probe) -> Result<Vec<Self::Handle>>;

    /// Replace the control's content with `text` and synthesize the
    /// input-changed notification the host needs to enable its submit
    /// affordance.
    async fn fill(&mut self, handle: &Self::Handle, text: &str) -> Result<()>;

    /// Trigger the control (click).
    async fn click(&mut self, handle: &Self::Handle) -> Result<()>;

    /// Simulate a keyboard "submit" gesture (Enter) on the control.
    async fn submit_key(&mut self, handle: &Self::Handle) -> Result<()>;

    /// Whether the control currently accepts interaction.
    async fn is_enabled(&mut self, handle: &Self::Handle) -> Result<bool>;

    /// Visible text content of the control.
    async fn text_of(&mut self, handle: &Self::Handle) -> Result<String>;

    /// Current value of a text-input control.
    async fn input_value(&mut self, handle: &Self::Handle) -> Result<String>;
}
