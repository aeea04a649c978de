use crate::error::BridgeError;
use crate::types::{Action, Image, RenderMode, ResetResult, StepResult};

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// The reset/step/render/close contract every environment variant honours.
///
/// State machine:
///
/// ```text
/// Uninitialized --reset--> Ready --close--> Terminated
///                          Ready --reset--> Ready
///                          Ready --step---> Ready
/// ```
///
/// `step` before the first successful `reset` and any call except `close`
/// after `close` are errors. `close` is idempotent.
pub trait Environment {
    /// Start (or restart) an episode and return the first frame.
    fn reset(&mut self) -> Result<ResetResult, BridgeError>;

    /// Apply one action and return the resulting transition.
    fn step(&mut self, action: &Action) -> Result<StepResult, BridgeError>;

    /// Present the latest frame. `RgbArray` returns it; `Human` forwards it
    /// to an on-screen sink and returns `None`.
    fn render(&mut self, mode: RenderMode) -> Result<Option<Image>, BridgeError>;

    /// Release every resource the environment holds.
    fn close(&mut self) -> Result<(), BridgeError>;

    /// Fixed image shape `(height, width, 3)` for the lifetime of the instance.
    fn image_shape(&self) -> (u32, u32, u32);
}

// ---------------------------------------------------------------------------
// FrameSink
// ---------------------------------------------------------------------------

/// Receives frames for on-screen display. Implemented outside this workspace.
pub trait FrameSink: Send {
    /// Show one frame.
    fn show(&mut self, image: &Image);

    /// Tear down the window or surface.
    fn release(&mut self) {}
}
