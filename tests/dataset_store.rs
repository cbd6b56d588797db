use std::collections::HashSet;
use std::sync::Arc;

use image::RgbImage;

use frame_harvest::config::StorageSettings;
use frame_harvest::dataset::{DatasetStore, SaveOutcome};
use frame_harvest::frame::Frame;

fn frame() -> Frame {
    Frame::new(RgbImage::from_pixel(8, 8, image::Rgb([10, 200, 30])))
}

fn label() -> Vec<String> {
    vec!["0 0.250000 0.250000 0.750000 0.250000 0.500000 0.750000".to_string()]
}

#[test]
fn split_fraction_tracks_train_split() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = StorageSettings::with_base(dir.path());
    settings.train_split = 0.8;
    let store = DatasetStore::open(&settings).unwrap();

    let n = 1000u64;
    for _ in 0..n {
        let outcome = store.save(&frame(), "cam0", &label(), &["person".to_string()]).unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved(_)));
    }

    let counts = store.split_counts().unwrap();
    assert_eq!(counts.total(), n);
    // 99% band of Binomial(1000, 0.8) is 800 +/- 2.576 * sqrt(160)
    assert!(
        (767..=833).contains(&counts.train),
        "train count {} outside 99% band",
        counts.train
    );

    let report = store.verify().unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.records, n as usize);
}

#[test]
fn concurrent_saves_get_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DatasetStore::open(&StorageSettings::with_base(dir.path())).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let mut ids = Vec::new();
                for _ in 0..25 {
                    match store.save(&frame(), "cam0", &label(), &[]).unwrap() {
                        SaveOutcome::Saved(record) => ids.push(record.id),
                        SaveOutcome::Skipped => panic!("labelled sample skipped"),
                    }
                }
                ids
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "duplicate sample id");
        }
    }
    assert_eq!(ids.len(), 200);
    assert_eq!(store.records().unwrap().len(), 200);
}

#[test]
fn empty_samples_write_nothing_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let store = DatasetStore::open(&StorageSettings::with_base(dir.path())).unwrap();
    assert_eq!(store.save(&frame(), "cam0", &[], &[]).unwrap(), SaveOutcome::Skipped);

    assert_eq!(store.split_counts().unwrap().total(), 0);
    for sub in ["images/train", "images/val", "labels/train", "labels/val"] {
        let entries = std::fs::read_dir(dir.path().join(sub)).unwrap().count();
        assert_eq!(entries, 0, "{} is not empty", sub);
    }
}

#[test]
fn reopening_keeps_existing_records() {
    let dir = tempfile::tempdir().unwrap();
    let settings = StorageSettings::with_base(dir.path());
    {
        let store = DatasetStore::open(&settings).unwrap();
        store.save(&frame(), "cam0", &label(), &["person".to_string()]).unwrap();
    }
    let store = DatasetStore::open(&settings).unwrap();
    let records = store.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].classes, vec!["person"]);
    assert!(dir.path().join("datacollector.db").is_file());
}
