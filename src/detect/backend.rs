use anyhow::Result;
use std::fmt;

use crate::frame::Frame;
use crate::detect::result::Inference;

/// Where inference runs. Chosen once at startup by
/// [`probe_execution_provider`](super::probe_execution_provider).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionProvider {
    /// Dedicated accelerator device.
    Hardware,
    /// Model executed on the CPU.
    SoftwareFallback,
    /// Synthetic detections, no model.
    Mock,
}

impl ExecutionProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionProvider::Hardware => "hardware",
            ExecutionProvider::SoftwareFallback => "software",
            ExecutionProvider::Mock => "mock",
        }
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Segmentation engine contract.
///
/// The collector owns exactly one detector and drives it from its control
/// thread, so implementations only need to be `Send`.
pub trait Detector: Send {
    /// Engine identifier for logs.
    fn name(&self) -> &'static str;

    fn provider(&self) -> ExecutionProvider;

    /// Acquire device or model resources. Called once before the first `infer`.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release resources. Must be safe to call more than once.
    fn stop(&mut self) {}

    /// Run segmentation on one frame.
    ///
    /// `Ok(None)` means the engine is not ready and the frame should be
    /// skipped. Masks in the result have the frame's dimensions.
    fn infer(&mut self, frame: &Frame) -> Result<Option<Inference>>;
}
