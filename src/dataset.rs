//! Sample persistence.
//!
//! Layout under the dataset root:
//!
//! ```text
//! <images_dir>/{train,val}/<id>.<jpg|png>
//! <labels_dir>/{train,val}/<id>.txt
//! <database_path>                      catalog, table `frames`
//! ```
//!
//! A save writes the image, then the label, then the catalog row. If any
//! step fails the files written by that call are removed again.

use anyhow::{Context, Result};
use rand::Rng;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::catalog::{Catalog, DatasetRecord, Split, SplitCounts, SqliteCatalog};
use crate::config::{ImageFormat, StorageSettings};
use crate::error::HarvestError;
use crate::frame::Frame;

const ID_ATTEMPTS: usize = 4;

#[derive(Clone, Debug, PartialEq)]
pub enum SaveOutcome {
    Saved(DatasetRecord),
    /// Nothing to label and empty samples are not kept.
    Skipped,
}

/// Consistency report between the catalog and the files on disk.
#[derive(Clone, Debug, Default)]
pub struct VerifyReport {
    pub records: usize,
    pub counts: SplitCounts,
    /// Catalog rows whose image is missing.
    pub missing_images: Vec<String>,
    /// Catalog rows whose label file is missing.
    pub missing_labels: Vec<String>,
    /// Files under the split directories with no catalog row.
    pub orphans: Vec<PathBuf>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_images.is_empty() && self.missing_labels.is_empty() && self.orphans.is_empty()
    }
}

pub struct DatasetStore {
    settings: StorageSettings,
    catalog: Mutex<Box<dyn Catalog>>,
}

impl DatasetStore {
    /// Create the directory tree and open the SQLite catalog.
    pub fn open(settings: &StorageSettings) -> Result<Self> {
        Self::create_dirs(settings).map_err(|e| HarvestError::persistence(format!("{:#}", e)))?;
        let catalog = SqliteCatalog::open(&settings.catalog_path())
            .map_err(|e| HarvestError::persistence(format!("{:#}", e)))?;
        log::info!(
            "dataset opened at {} (catalog {})",
            settings.base_path.display(),
            settings.catalog_path().display()
        );
        Ok(Self {
            settings: settings.clone(),
            catalog: Mutex::new(Box::new(catalog)),
        })
    }

    /// Use an already-open catalog. Directories are still created.
    pub fn with_catalog(settings: &StorageSettings, catalog: Box<dyn Catalog>) -> Result<Self> {
        Self::create_dirs(settings)?;
        Ok(Self {
            settings: settings.clone(),
            catalog: Mutex::new(catalog),
        })
    }

    fn create_dirs(settings: &StorageSettings) -> Result<()> {
        for dir in [&settings.images_dir, &settings.labels_dir] {
            for split in Split::ALL {
                let path = settings.base_path.join(dir).join(split.as_str());
                std::fs::create_dir_all(&path)
                    .with_context(|| format!("create dataset directory {}", path.display()))?;
            }
        }
        if let Some(parent) = settings.catalog_path().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create catalog directory {}", parent.display()))?;
        }
        Ok(())
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    pub fn base_path(&self) -> &Path {
        &self.settings.base_path
    }

    /// Persist one sample.
    ///
    /// Safe to call from several threads; catalog inserts are serialized.
    /// Failures are tagged `PersistenceFailure` and leave no files behind.
    pub fn save(
        &self,
        frame: &Frame,
        camera_id: &str,
        label_lines: &[String],
        class_names: &[String],
    ) -> Result<SaveOutcome> {
        if label_lines.is_empty() && !self.settings.save_empty {
            return Ok(SaveOutcome::Skipped);
        }

        let split = if rand::thread_rng().gen::<f64>() < self.settings.train_split {
            Split::Train
        } else {
            Split::Val
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_else(|_| frame.captured_at_secs());

        let ext = self.settings.image_format.extension();
        let (id, image_rel, image_file) = self.reserve_image(camera_id, split, ext, timestamp)?;
        let label_rel = format!("{}/{}/{}.txt", self.settings.labels_dir, split, id);

        let record = DatasetRecord {
            id,
            camera_id: camera_id.to_string(),
            timestamp,
            split,
            image_path: image_rel,
            label_path: label_rel,
            objects_count: label_lines.len() as u32,
            classes: class_names.to_vec(),
        };

        let mut written = vec![self.settings.base_path.join(&record.image_path)];
        match self.write_sample(image_file, frame, label_lines, &record, &mut written) {
            Ok(()) => {
                log::debug!(
                    "saved {} ({} objects, split {})",
                    record.id,
                    record.objects_count,
                    record.split
                );
                Ok(SaveOutcome::Saved(record))
            }
            Err(err) => {
                for path in &written {
                    match std::fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(remove_err) => {
                            log::warn!("rollback of {} failed: {}", path.display(), remove_err)
                        }
                    }
                }
                Err(HarvestError::persistence(format!("save {}: {:#}", record.id, err)).into())
            }
        }
    }

    /// Pick an id and claim its image path with an exclusive create, so two
    /// concurrent saves can never share a file.
    fn reserve_image(
        &self,
        camera_id: &str,
        split: Split,
        ext: &str,
        timestamp: f64,
    ) -> Result<(String, String, File)> {
        let mut rng = rand::thread_rng();
        for _ in 0..ID_ATTEMPTS {
            let id = sample_id(camera_id, timestamp, rng.gen());
            let image_rel = format!("{}/{}/{}.{}", self.settings.images_dir, split, id, ext);
            let path = self.settings.base_path.join(&image_rel);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((id, image_rel, file)),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(HarvestError::persistence(format!(
                        "create image {}: {}",
                        path.display(),
                        err
                    ))
                    .into())
                }
            }
        }
        Err(HarvestError::persistence(format!(
            "could not allocate a unique id for {}",
            camera_id
        ))
        .into())
    }

    fn write_sample(
        &self,
        image_file: File,
        frame: &Frame,
        label_lines: &[String],
        record: &DatasetRecord,
        written: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let format = match self.settings.image_format {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        };
        let mut writer = BufWriter::new(image_file);
        frame
            .image()
            .write_to(&mut writer, format)
            .with_context(|| format!("write image {}", record.image_path))?;
        writer
            .flush()
            .with_context(|| format!("flush image {}", record.image_path))?;

        let label_path = self.settings.base_path.join(&record.label_path);
        written.push(label_path.clone());
        std::fs::write(&label_path, label_lines.join("\n"))
            .with_context(|| format!("write label {}", label_path.display()))?;

        let mut catalog = match self.catalog.lock() {
            Ok(catalog) => catalog,
            Err(poisoned) => poisoned.into_inner(),
        };
        catalog.insert(record)
    }

    pub fn split_counts(&self) -> Result<SplitCounts> {
        self.with_catalog_ref(|c| c.split_counts())
    }

    pub fn records(&self) -> Result<Vec<DatasetRecord>> {
        self.with_catalog_ref(|c| c.records())
    }

    /// Check that every row has its files and every file has a row.
    pub fn verify(&self) -> Result<VerifyReport> {
        let records = self.records()?;
        let mut report = VerifyReport {
            records: records.len(),
            counts: self.split_counts()?,
            ..VerifyReport::default()
        };

        let mut known = HashSet::new();
        for record in &records {
            let image = self.settings.base_path.join(&record.image_path);
            let label = self.settings.base_path.join(&record.label_path);
            if !image.is_file() {
                report.missing_images.push(record.id.clone());
            }
            if !label.is_file() {
                report.missing_labels.push(record.id.clone());
            }
            known.insert(image);
            known.insert(label);
        }

        for dir in [&self.settings.images_dir, &self.settings.labels_dir] {
            for split in Split::ALL {
                let split_dir = self.settings.base_path.join(dir).join(split.as_str());
                let entries = match std::fs::read_dir(&split_dir) {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        return Err(err).with_context(|| format!("list {}", split_dir.display()))
                    }
                };
                for entry in entries {
                    let path = entry?.path();
                    if path.is_file() && !known.contains(&path) {
                        report.orphans.push(path);
                    }
                }
            }
        }
        report.orphans.sort();
        Ok(report)
    }

    fn with_catalog_ref<T>(&self, f: impl FnOnce(&dyn Catalog) -> Result<T>) -> Result<T> {
        let catalog = match self.catalog.lock() {
            Ok(catalog) => catalog,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&**catalog)
    }
}

/// `<camera_id>_<unix millis>_<8 hex>`.
fn sample_id(camera_id: &str, timestamp: f64, suffix: u32) -> String {
    format!(
        "{}_{}_{:08x}",
        camera_id,
        (timestamp * 1000.0) as u64,
        suffix
    )
}
