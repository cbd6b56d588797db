use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::config::InferenceSettings;

use super::backend::{Detector, ExecutionProvider};
use super::backends::MockDetector;

/// Builds a detector for one execution provider.
pub type DetectorFactory =
    Box<dyn Fn(&InferenceSettings) -> Result<Box<dyn Detector>> + Send + Sync>;

/// Engines available to this build, keyed by the provider they run on.
pub struct DetectorRegistry {
    engines: HashMap<ExecutionProvider, DetectorFactory>,
}

impl DetectorRegistry {
    /// Empty registry. Most callers want [`DetectorRegistry::with_defaults`].
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// Mock engine plus every engine compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            ExecutionProvider::Mock,
            Box::new(|_: &InferenceSettings| -> Result<Box<dyn Detector>> {
                Ok(Box::new(MockDetector::new()))
            }),
        );
        #[cfg(feature = "backend-tract")]
        registry.register(
            ExecutionProvider::SoftwareFallback,
            Box::new(|settings: &InferenceSettings| -> Result<Box<dyn Detector>> {
                let engine = super::backends::TractSegDetector::load(settings)?;
                Ok(Box::new(engine))
            }),
        );
        registry
    }

    /// Register an engine. A later registration for the same provider wins.
    pub fn register(&mut self, provider: ExecutionProvider, factory: DetectorFactory) {
        if self.engines.insert(provider, factory).is_some() {
            log::debug!("replaced detector engine for provider {}", provider);
        }
    }

    pub fn supports(&self, provider: ExecutionProvider) -> bool {
        self.engines.contains_key(&provider)
    }

    pub fn list(&self) -> Vec<ExecutionProvider> {
        self.engines.keys().copied().collect()
    }

    /// Construct the engine for `provider`.
    pub fn build(
        &self,
        provider: ExecutionProvider,
        settings: &InferenceSettings,
    ) -> Result<Box<dyn Detector>> {
        let factory = self
            .engines
            .get(&provider)
            .ok_or_else(|| anyhow!("no detector engine registered for provider {}", provider))?;
        factory(settings)
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Decide once where inference runs.
///
/// `backend = "mock"` forces the mock engine. Otherwise the accelerator is
/// preferred when its device node exists and a hardware engine is registered,
/// then a CPU engine when the model file exists, then the mock engine.
/// `backend = "hardware"` or `"software"` skips the earlier tiers.
pub fn probe_execution_provider(
    settings: &InferenceSettings,
    registry: &DetectorRegistry,
) -> ExecutionProvider {
    let requested = settings.backend.as_str();
    if requested == "mock" {
        log::info!("inference backend forced to mock");
        return ExecutionProvider::Mock;
    }

    let try_hardware = matches!(requested, "auto" | "hardware");
    if try_hardware {
        let device = settings.accelerator_device.exists();
        if device && registry.supports(ExecutionProvider::Hardware) {
            log::info!(
                "accelerator found at {}",
                settings.accelerator_device.display()
            );
            return ExecutionProvider::Hardware;
        }
        if requested == "hardware" {
            log::warn!(
                "hardware inference requested but unavailable (device present: {}, engine registered: {})",
                device,
                registry.supports(ExecutionProvider::Hardware)
            );
        }
    }

    let try_software = matches!(requested, "auto" | "hardware" | "software" | "tract");
    if try_software {
        let model = settings.model_path.exists();
        if model && registry.supports(ExecutionProvider::SoftwareFallback) {
            log::info!("running model {} on CPU", settings.model_path.display());
            return ExecutionProvider::SoftwareFallback;
        }
        log::warn!(
            "software inference unavailable (model present: {}, engine registered: {})",
            model,
            registry.supports(ExecutionProvider::SoftwareFallback)
        );
    } else {
        log::warn!("unknown inference backend '{}'", requested);
    }

    log::warn!("falling back to mock inference");
    ExecutionProvider::Mock
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::Inference;
    use crate::frame::Frame;
    use std::path::PathBuf;

    struct NullAccelerator;

    impl Detector for NullAccelerator {
        fn name(&self) -> &'static str {
            "null-accelerator"
        }

        fn provider(&self) -> ExecutionProvider {
            ExecutionProvider::Hardware
        }

        fn infer(&mut self, _frame: &Frame) -> Result<Option<Inference>> {
            Ok(Some(Inference::empty()))
        }
    }

    fn settings(backend: &str, device: PathBuf, model: PathBuf) -> InferenceSettings {
        InferenceSettings {
            backend: backend.to_string(),
            accelerator_device: device,
            model_path: model,
            ..InferenceSettings::default()
        }
    }

    fn with_hardware() -> DetectorRegistry {
        let mut registry = DetectorRegistry::with_defaults();
        registry.register(
            ExecutionProvider::Hardware,
            Box::new(|_: &InferenceSettings| -> Result<Box<dyn Detector>> {
                Ok(Box::new(NullAccelerator))
            }),
        );
        registry
    }

    #[test]
    fn mock_backend_is_forced() {
        let present = tempfile::NamedTempFile::new().unwrap();
        let s = settings(
            "mock",
            present.path().to_path_buf(),
            present.path().to_path_buf(),
        );
        assert_eq!(
            probe_execution_provider(&s, &with_hardware()),
            ExecutionProvider::Mock
        );
    }

    #[test]
    fn hardware_needs_device_and_engine() {
        let device = tempfile::NamedTempFile::new().unwrap();
        let missing = PathBuf::from("/nonexistent/accelerator0");
        let model = PathBuf::from("/nonexistent/model.onnx");

        let s = settings("auto", device.path().to_path_buf(), model.clone());
        assert_eq!(
            probe_execution_provider(&s, &with_hardware()),
            ExecutionProvider::Hardware
        );
        assert_eq!(
            probe_execution_provider(&s, &DetectorRegistry::with_defaults()),
            ExecutionProvider::Mock
        );

        let s = settings("auto", missing, model);
        assert_eq!(
            probe_execution_provider(&s, &with_hardware()),
            ExecutionProvider::Mock
        );
    }

    #[test]
    fn software_needs_model_and_engine() {
        let model = tempfile::NamedTempFile::new().unwrap();
        let mut registry = DetectorRegistry::with_defaults();
        registry.register(
            ExecutionProvider::SoftwareFallback,
            Box::new(|_: &InferenceSettings| -> Result<Box<dyn Detector>> {
                Ok(Box::new(MockDetector::new()))
            }),
        );
        let s = settings(
            "auto",
            PathBuf::from("/nonexistent/accelerator0"),
            model.path().to_path_buf(),
        );
        assert_eq!(
            probe_execution_provider(&s, &registry),
            ExecutionProvider::SoftwareFallback
        );
    }

    #[test]
    fn build_reports_missing_engine() {
        let registry = DetectorRegistry::new();
        assert!(registry
            .build(ExecutionProvider::Mock, &InferenceSettings::default())
            .is_err());
        let detector = DetectorRegistry::with_defaults()
            .build(ExecutionProvider::Mock, &InferenceSettings::default())
            .unwrap();
        assert_eq!(detector.provider(), ExecutionProvider::Mock);
    }
}
