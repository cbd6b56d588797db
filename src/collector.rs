//! Control loop: poll cameras, gate, segment, persist.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CollectionSettings;
use crate::dataset::{DatasetStore, SaveOutcome};
use crate::detect::{ClassNameResolver, Detector, Inference};
use crate::frame::Frame;
use crate::geometry::{format_label, mask_to_polygons, DEFAULT_EPSILON_FACTOR};
use crate::registry::CaptureRegistry;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub frames_polled: u64,
    pub motion_rejected: u64,
    pub detector_skipped: u64,
    pub samples_saved: u64,
    pub save_failures: u64,
}

pub struct Collector {
    registry: CaptureRegistry,
    detector: Box<dyn Detector>,
    store: Arc<DatasetStore>,
    settings: CollectionSettings,
    class_names: ClassNameResolver,
    last_sample: HashMap<String, Instant>,
    stats: CollectorStats,
    started: bool,
}

impl Collector {
    pub fn new(
        registry: CaptureRegistry,
        detector: Box<dyn Detector>,
        store: Arc<DatasetStore>,
        settings: CollectionSettings,
        class_names: ClassNameResolver,
    ) -> Self {
        Self {
            registry,
            detector,
            store,
            settings,
            class_names,
            last_sample: HashMap::new(),
            stats: CollectorStats::default(),
            started: false,
        }
    }

    /// Start the detector, then every camera.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.detector.start()?;
        log::info!(
            "detector {} started on {} provider",
            self.detector.name(),
            self.detector.provider()
        );
        self.registry.start_all();
        self.started = true;
        Ok(())
    }

    /// Stop every camera, then the detector. Safe to call more than once.
    pub fn stop(&mut self) {
        self.registry.stop_all();
        self.detector.stop();
        if self.started {
            log::info!("collector stopped: {:?}", self.stats);
        }
        self.started = false;
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    pub fn registry(&self) -> &CaptureRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<DatasetStore> {
        &self.store
    }

    /// Loop until `shutdown` is set, then stop cameras and detector.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        self.start()?;
        let mut last_health = Instant::now();
        while !shutdown.load(Ordering::SeqCst) {
            self.run_once();
            if last_health.elapsed() >= HEALTH_LOG_INTERVAL {
                self.log_health();
                last_health = Instant::now();
            }
            std::thread::sleep(self.settings.poll_interval);
        }
        log::info!("shutdown requested");
        self.stop();
        Ok(())
    }

    /// One pass over every camera's latest frame. Returns the number of
    /// samples saved in this pass.
    pub fn run_once(&mut self) -> usize {
        let mut saved = 0;
        for (camera_id, frame) in self.registry.snapshot_all() {
            self.stats.frames_polled += 1;
            if self.throttled(&camera_id) {
                continue;
            }
            if !self.registry.allow_motion(&camera_id, &frame) {
                self.stats.motion_rejected += 1;
                continue;
            }

            let inference = match self.detector.infer(&frame) {
                Ok(Some(inference)) => inference,
                Ok(None) => {
                    self.stats.detector_skipped += 1;
                    continue;
                }
                Err(err) => {
                    self.stats.detector_skipped += 1;
                    log::warn!("inference failed for {}: {:#}", camera_id, err);
                    continue;
                }
            };

            let (lines, classes) = self.label_lines(&inference);
            if lines.is_empty() {
                continue;
            }
            if self.persist(&camera_id, &frame, &lines, &classes) {
                saved += 1;
            }
        }
        saved
    }

    fn throttled(&self, camera_id: &str) -> bool {
        self.last_sample
            .get(camera_id)
            .map(|at| at.elapsed() < self.settings.interval)
            .unwrap_or(false)
    }

    /// Label lines plus one class name per accepted detection, in detection order.
    fn label_lines(&self, inference: &Inference) -> (Vec<String>, Vec<String>) {
        let mut lines = Vec::new();
        let mut classes = Vec::new();
        for detection in inference.detections() {
            if detection.score < self.settings.min_confidence {
                continue;
            }
            let name = self.class_names.resolve(detection.class_id);
            if !self.settings.target_classes.is_empty()
                && !self.settings.target_classes.contains(&name)
            {
                continue;
            }
            let polygons = mask_to_polygons(detection.mask, DEFAULT_EPSILON_FACTOR);
            if polygons.is_empty() {
                continue;
            }
            lines.extend(format_label(detection.class_id, &polygons));
            classes.push(name);
        }
        (lines, classes)
    }

    fn persist(&mut self, camera_id: &str, frame: &Frame, lines: &[String], classes: &[String]) -> bool {
        match self.store.save(frame, camera_id, lines, classes) {
            Ok(SaveOutcome::Saved(record)) => {
                self.stats.samples_saved += 1;
                self.last_sample.insert(camera_id.to_string(), Instant::now());
                log::info!(
                    "sample {} from {}: {} objects [{}] -> {}",
                    record.id,
                    camera_id,
                    record.objects_count,
                    record.classes.join(", "),
                    record.split
                );
                true
            }
            Ok(SaveOutcome::Skipped) => false,
            Err(err) => {
                self.stats.save_failures += 1;
                log::error!("dropping sample from {}: {:#}", camera_id, err);
                false
            }
        }
    }

    fn log_health(&self) {
        for status in self.registry.statuses() {
            log::info!(
                "health: camera={} state={} frames={} reconnects={} last_error={}",
                status.id,
                status.state,
                status.stats.frames_captured,
                status.stats.reconnects,
                status.stats.last_error.as_deref().unwrap_or("-")
            );
        }
        log::info!(
            "health: polled={} motion_rejected={} skipped={} saved={} failures={}",
            self.stats.frames_polled,
            self.stats.motion_rejected,
            self.stats.detector_skipped,
            self.stats.samples_saved,
            self.stats.save_failures
        );
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraConfig, CaptureSettings, MotionSettings, StorageSettings};
    use crate::detect::{ExecutionProvider, MockDetector};
    use image::{GrayImage, Luma};

    /// Returns a fixed set of square detections.
    struct ScriptedDetector {
        detections: Vec<(u32, f32)>,
    }

    impl Detector for ScriptedDetector {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn provider(&self) -> ExecutionProvider {
            ExecutionProvider::Mock
        }

        fn infer(&mut self, frame: &Frame) -> Result<Option<Inference>> {
            let mut masks = Vec::new();
            let mut ids = Vec::new();
            let mut scores = Vec::new();
            for (i, (class_id, score)) in self.detections.iter().enumerate() {
                let mut mask = GrayImage::new(frame.width(), frame.height());
                let offset = 10 + 60 * i as u32;
                for y in offset..offset + 40 {
                    for x in offset..offset + 40 {
                        mask.put_pixel(x, y, Luma([255]));
                    }
                }
                masks.push(mask);
                ids.push(*class_id);
                scores.push(*score);
            }
            Inference::new(masks, ids, scores).map(Some)
        }
    }

    fn registry() -> CaptureRegistry {
        let motion = MotionSettings {
            enabled: false,
            ..MotionSettings::default()
        };
        CaptureRegistry::new(
            &[CameraConfig::new("cam0", "test")],
            &motion,
            &CaptureSettings::default(),
        )
        .unwrap()
    }

    fn collection() -> CollectionSettings {
        CollectionSettings {
            interval: Duration::from_secs(3600),
            ..CollectionSettings::default()
        }
    }

    fn store(dir: &std::path::Path) -> Arc<DatasetStore> {
        Arc::new(DatasetStore::open(&StorageSettings::with_base(dir)).unwrap())
    }

    #[test]
    fn mock_detector_yields_one_sample_then_throttles() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = Collector::new(
            registry(),
            Box::new(MockDetector::new()),
            store(dir.path()),
            collection(),
            ClassNameResolver::from_list(["person"]),
        );
        collector.start().unwrap();

        assert_eq!(collector.run_once(), 1);
        assert_eq!(collector.run_once(), 0);

        let records = collector.store().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].camera_id, "cam0");
        assert_eq!(records[0].classes, vec!["person"]);
        assert!(records[0].objects_count >= 1);
        assert_eq!(collector.stats().samples_saved, 1);
        collector.stop();
    }

    #[test]
    fn low_confidence_and_unlisted_classes_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = collection();
        settings.target_classes.insert("car".to_string());
        let detector = ScriptedDetector {
            detections: vec![(0, 0.9), (1, 0.3), (1, 0.8)],
        };
        let mut collector = Collector::new(
            registry(),
            Box::new(detector),
            store(dir.path()),
            settings,
            ClassNameResolver::from_list(["person", "car"]),
        );
        collector.start().unwrap();
        assert_eq!(collector.run_once(), 1);

        let record = &collector.store().records().unwrap()[0];
        assert_eq!(record.objects_count, 1);
        assert_eq!(record.classes, vec!["car"]);
        let label =
            std::fs::read_to_string(dir.path().join(&record.label_path)).unwrap();
        assert!(label.starts_with("1 "));
    }

    #[test]
    fn nothing_accepted_means_nothing_saved() {
        let dir = tempfile::tempdir().unwrap();
        let detector = ScriptedDetector {
            detections: vec![(0, 0.1)],
        };
        let mut collector = Collector::new(
            registry(),
            Box::new(detector),
            store(dir.path()),
            collection(),
            ClassNameResolver::default(),
        );
        collector.start().unwrap();
        assert_eq!(collector.run_once(), 0);
        assert_eq!(collector.run_once(), 0);
        assert!(collector.store().records().unwrap().is_empty());
        assert_eq!(collector.stats().frames_polled, 2);
    }

    #[test]
    fn frames_without_accepted_detections_are_not_saved_even_with_save_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = StorageSettings::with_base(dir.path());
        storage.save_empty = true;
        let store = Arc::new(DatasetStore::open(&storage).unwrap());
        let detector = ScriptedDetector {
            detections: vec![(0, 0.1)],
        };
        let mut collector = Collector::new(
            registry(),
            Box::new(detector),
            Arc::clone(&store),
            collection(),
            ClassNameResolver::default(),
        );
        collector.start().unwrap();
        assert_eq!(collector.run_once(), 0);
        assert!(store.records().unwrap().is_empty());
        assert!(!collector.throttled("cam0"));
    }

    #[test]
    fn classes_list_one_name_per_detection() {
        let dir = tempfile::tempdir().unwrap();
        let detector = ScriptedDetector {
            detections: vec![(1, 0.9), (0, 0.9), (1, 0.7)],
        };
        let mut collector = Collector::new(
            registry(),
            Box::new(detector),
            store(dir.path()),
            collection(),
            ClassNameResolver::from_list(["person", "car"]),
        );
        collector.start().unwrap();
        assert_eq!(collector.run_once(), 1);
        let record = &collector.store().records().unwrap()[0];
        assert_eq!(record.objects_count, 3);
        assert_eq!(record.classes, vec!["car", "person", "car"]);
    }

    #[test]
    fn unready_detector_skips_frames() {
        let dir = tempfile::tempdir().unwrap();
        // never started, so the mock engine reports not ready
        let mut collector = Collector::new(
            registry(),
            Box::new(MockDetector::new()),
            store(dir.path()),
            collection(),
            ClassNameResolver::default(),
        );
        collector.registry.start_all();
        assert_eq!(collector.run_once(), 0);
        assert_eq!(collector.stats().detector_skipped, 1);
    }

    #[test]
    fn run_exits_when_shutdown_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = Collector::new(
            registry(),
            Box::new(MockDetector::new()),
            store(dir.path()),
            collection(),
            ClassNameResolver::default(),
        );
        let shutdown = AtomicBool::new(true);
        collector.run(&shutdown).unwrap();
        assert!(collector.registry().snapshot_all().is_empty());
    }
}
