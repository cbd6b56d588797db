use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use frame_harvest::config::{CameraConfig, CaptureSettings, CollectionSettings, MotionSettings, StorageSettings};
use frame_harvest::detect::{ClassNameResolver, MockDetector};
use frame_harvest::geometry::parse_label_line;
use frame_harvest::ingest::{FrameSource, NoiseSource, SourceState};
use frame_harvest::{CaptureRegistry, Collector, DatasetStore};

#[test]
fn test_source_delivers_a_frame_within_one_period() {
    let mut source = FrameSource::new("cam0", "test", Duration::from_millis(100));
    let started = Instant::now();
    source.start().unwrap();

    let deadline = NoiseSource::frame_period() + Duration::from_millis(250);
    let mut frame = None;
    while started.elapsed() < deadline {
        if let Some(f) = source.snapshot() {
            frame = Some(f);
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    let frame = frame.expect("no frame from test source");
    assert!(source.is_connected());
    assert_eq!(source.state(), SourceState::Connected);
    assert_eq!((frame.width(), frame.height()), (640, 640));

    source.stop();
    assert_eq!(source.state(), SourceState::Stopped);
    assert!(source.snapshot().is_none());
}

#[test]
fn mock_pipeline_writes_centered_polygon() {
    let dir = tempfile::tempdir().unwrap();
    let motion = MotionSettings {
        enabled: false,
        ..MotionSettings::default()
    };
    let registry = CaptureRegistry::new(
        &[CameraConfig::new("cam0", "test"), CameraConfig::new("cam1", "stub://yard")],
        &motion,
        &CaptureSettings::default(),
    )
    .unwrap();
    let store = Arc::new(DatasetStore::open(&StorageSettings::with_base(dir.path())).unwrap());
    let collection = CollectionSettings {
        interval: Duration::from_secs(3600),
        poll_interval: Duration::from_millis(10),
        ..CollectionSettings::default()
    };
    let mut collector = Collector::new(
        registry,
        Box::new(MockDetector::new()),
        Arc::clone(&store),
        collection,
        ClassNameResolver::from_list(["person"]),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(500));
        flag.store(true, Ordering::SeqCst);
    });
    collector.run(&shutdown).unwrap();
    stopper.join().unwrap();

    let records = store.records().unwrap();
    let cameras: Vec<&str> = records.iter().map(|r| r.camera_id.as_str()).collect();
    assert_eq!(records.len(), 2, "one sample per camera, got {:?}", cameras);
    assert!(cameras.contains(&"cam0") && cameras.contains(&"cam1"));

    for record in &records {
        let text = std::fs::read_to_string(dir.path().join(&record.label_path)).unwrap();
        let (class_id, polygon) = parse_label_line(text.lines().next().unwrap()).unwrap();
        assert_eq!(class_id, 0);
        assert!(polygon
            .points()
            .iter()
            .all(|(x, y)| (0.0..=1.0).contains(x) && (0.0..=1.0).contains(y)));
        let (cx, cy) = polygon.centroid().unwrap();
        assert!((cx - 0.5).abs() < 0.02 && (cy - 0.5).abs() < 0.02);
    }

    assert!(store.verify().unwrap().is_consistent());
    assert_eq!(collector.stats().samples_saved, 2);
}
