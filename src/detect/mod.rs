mod backend;
mod backends;
mod classes;
mod registry;
mod result;

pub use backend::{Detector, ExecutionProvider};
pub use backends::MockDetector;
#[cfg(feature = "backend-tract")]
pub use backends::TractSegDetector;
pub use classes::ClassNameResolver;
pub use registry::{probe_execution_provider, DetectorFactory, DetectorRegistry};
pub use result::{Detection, Inference};
