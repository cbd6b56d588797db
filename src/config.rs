use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::ClassNameResolver;
use crate::error::HarvestError;
use crate::motion::{DEFAULT_DIFF_THRESHOLD, DEFAULT_HISTORY, DEFAULT_MIN_AREA, DEFAULT_VAR_THRESHOLD};

const DEFAULT_INTERVAL_SECS: f64 = 5.0;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.6;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_BACKEND: &str = "auto";
const DEFAULT_MODEL_PATH: &str = "models/yolov8n-seg.onnx";
const DEFAULT_INPUT_SHAPE: [u32; 2] = [640, 640];
const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
const DEFAULT_ACCELERATOR_DEVICE: &str = "/dev/hailo0";
const DEFAULT_BASE_PATH: &str = "dataset";
const DEFAULT_IMAGES_DIR: &str = "images";
const DEFAULT_LABELS_DIR: &str = "labels";
const DEFAULT_DATABASE_PATH: &str = "datacollector.db";
const DEFAULT_TRAIN_SPLIT: f64 = 0.8;
const DEFAULT_RECONNECT_SECS: u64 = 5;

// ----------------------------------------------------------------------------
// File representation
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct HarvestConfigFile {
    cameras: Option<Vec<CameraConfigFile>>,
    motion_detection: Option<MotionConfigFile>,
    collection: Option<CollectionConfigFile>,
    inference: Option<InferenceConfigFile>,
    storage: Option<StorageConfigFile>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize)]
struct CameraConfigFile {
    id: String,
    url: String,
    name: Option<String>,
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    enabled: Option<bool>,
    strategy: Option<String>,
    threshold: Option<u8>,
    min_area: Option<f64>,
    history: Option<u32>,
    var_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CollectionConfigFile {
    interval_seconds: Option<f64>,
    min_confidence: Option<f32>,
    target_classes: Option<Vec<String>>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_shape: Option<Vec<u32>>,
    score_threshold: Option<f32>,
    class_names: Option<ClassNamesFile>,
    accelerator_device: Option<PathBuf>,
}

/// Class tables appear either as a list indexed by id or as an id → name map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassNamesFile {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize, Default)]
struct StorageConfigFile {
    base_path: Option<PathBuf>,
    train_split: Option<f64>,
    save_empty: Option<bool>,
    images_dir: Option<String>,
    labels_dir: Option<String>,
    database_path: Option<String>,
    image_format: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    reconnect_interval_secs: Option<u64>,
}

// ----------------------------------------------------------------------------
// Resolved settings
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub cameras: Vec<CameraConfig>,
    pub motion: MotionSettings,
    pub collection: CollectionSettings,
    pub inference: InferenceSettings,
    pub storage: StorageSettings,
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub enabled: bool,
}

impl CameraConfig {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            uri: uri.into(),
            enabled: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionStrategy {
    BackgroundSubtraction,
    FrameDifferencing,
}

impl MotionStrategy {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "background_subtraction" | "mog2" => Ok(MotionStrategy::BackgroundSubtraction),
            "frame_differencing" | "diff" => Ok(MotionStrategy::FrameDifferencing),
            other => Err(anyhow!("unknown motion strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionSettings {
    pub enabled: bool,
    pub strategy: MotionStrategy,
    /// Per-pixel intensity delta for frame differencing.
    pub threshold: u8,
    pub min_area: f64,
    /// Background model history length in frames.
    pub history: u32,
    /// Squared Mahalanobis distance above which a pixel is foreground.
    pub var_threshold: f32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: MotionStrategy::BackgroundSubtraction,
            threshold: DEFAULT_DIFF_THRESHOLD,
            min_area: DEFAULT_MIN_AREA,
            history: DEFAULT_HISTORY,
            var_threshold: DEFAULT_VAR_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionSettings {
    pub interval: Duration,
    pub min_confidence: f32,
    /// Empty means every class is accepted.
    pub target_classes: HashSet<String>,
    pub poll_interval: Duration,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs_f64(DEFAULT_INTERVAL_SECS),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            target_classes: HashSet::new(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    /// `auto`, `mock`, `tract` or `hardware`.
    pub backend: String,
    pub model_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    pub score_threshold: f32,
    pub class_names: ClassNameResolver,
    pub accelerator_device: PathBuf,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_width: DEFAULT_INPUT_SHAPE[0],
            input_height: DEFAULT_INPUT_SHAPE[1],
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            class_names: ClassNameResolver::default(),
            accelerator_device: PathBuf::from(DEFAULT_ACCELERATOR_DEVICE),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(anyhow!("unsupported image format '{}'", other)),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub base_path: PathBuf,
    pub train_split: f64,
    pub save_empty: bool,
    pub images_dir: String,
    pub labels_dir: String,
    /// Catalog file, relative to `base_path` unless absolute.
    pub database_path: PathBuf,
    pub image_format: ImageFormat,
}

impl StorageSettings {
    pub fn with_base(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        if self.database_path.is_absolute() {
            self.database_path.clone()
        } else {
            self.base_path.join(&self.database_path)
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from(DEFAULT_BASE_PATH),
            train_split: DEFAULT_TRAIN_SPLIT,
            save_empty: false,
            images_dir: DEFAULT_IMAGES_DIR.to_string(),
            labels_dir: DEFAULT_LABELS_DIR.to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            image_format: ImageFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub reconnect_interval: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(DEFAULT_RECONNECT_SECS),
        }
    }
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

impl HarvestConfig {
    /// Load from `path`, or from `HARVEST_CONFIG` when no path is given,
    /// then apply environment overrides and validate.
    ///
    /// Any failure is tagged as a configuration error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_inner(path).map_err(|e| HarvestError::config(format!("{:#}", e)).into())
    }

    fn load_inner(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("HARVEST_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_config_file(&path)?,
            None => HarvestConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a config document held in memory. `format` is `json` or `toml`.
    pub fn parse_document(raw: &str, format: &str) -> Result<Self> {
        let file = parse_config(raw, format)?;
        let cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn enabled_cameras(&self) -> impl Iterator<Item = &CameraConfig> {
        self.cameras.iter().filter(|c| c.enabled)
    }

    fn from_file(file: HarvestConfigFile) -> Result<Self> {
        let cameras = file
            .cameras
            .unwrap_or_default()
            .into_iter()
            .map(|cam| CameraConfig {
                name: cam.name.unwrap_or_else(|| cam.id.clone()),
                id: cam.id,
                uri: cam.url,
                enabled: cam.enabled.unwrap_or(true),
            })
            .collect();

        let motion_file = file.motion_detection.unwrap_or_default();
        let defaults = MotionSettings::default();
        let motion = MotionSettings {
            enabled: motion_file.enabled.unwrap_or(defaults.enabled),
            strategy: match motion_file.strategy.as_deref() {
                Some(strategy) => MotionStrategy::parse(strategy)?,
                None => defaults.strategy,
            },
            threshold: motion_file.threshold.unwrap_or(defaults.threshold),
            min_area: motion_file.min_area.unwrap_or(defaults.min_area),
            history: motion_file.history.unwrap_or(defaults.history),
            var_threshold: motion_file.var_threshold.unwrap_or(defaults.var_threshold),
        };

        let collection_file = file.collection.unwrap_or_default();
        let collection = CollectionSettings {
            interval: seconds(
                "collection.interval_seconds",
                collection_file
                    .interval_seconds
                    .unwrap_or(DEFAULT_INTERVAL_SECS),
            )?,
            min_confidence: collection_file
                .min_confidence
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            target_classes: collection_file
                .target_classes
                .unwrap_or_default()
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            poll_interval: Duration::from_millis(
                collection_file
                    .poll_interval_ms
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        };

        let inference_file = file.inference.unwrap_or_default();
        let [input_width, input_height] = match inference_file.input_shape.as_deref() {
            None => DEFAULT_INPUT_SHAPE,
            Some([w, h]) | Some([w, h, _]) => [*w, *h],
            Some(other) => {
                return Err(anyhow!(
                    "inference.input_shape must be [width, height], got {:?}",
                    other
                ))
            }
        };
        let class_names = match inference_file.class_names {
            None => ClassNameResolver::default(),
            Some(ClassNamesFile::List(names)) => ClassNameResolver::from_list(names),
            Some(ClassNamesFile::Map(map)) => {
                let mut entries = Vec::with_capacity(map.len());
                for (id, name) in map {
                    let id: u32 = id
                        .trim()
                        .parse()
                        .with_context(|| format!("class_names key '{}' is not an integer", id))?;
                    entries.push((id, name));
                }
                ClassNameResolver::from_map(entries)
            }
        };
        let inference = InferenceSettings {
            backend: inference_file
                .backend
                .map(|b| b.trim().to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: inference_file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_width,
            input_height,
            score_threshold: inference_file
                .score_threshold
                .unwrap_or(DEFAULT_SCORE_THRESHOLD),
            class_names,
            accelerator_device: inference_file
                .accelerator_device
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ACCELERATOR_DEVICE)),
        };

        let storage_file = file.storage.unwrap_or_default();
        let storage = StorageSettings {
            base_path: storage_file
                .base_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_PATH)),
            train_split: storage_file.train_split.unwrap_or(DEFAULT_TRAIN_SPLIT),
            save_empty: storage_file.save_empty.unwrap_or(false),
            images_dir: storage_file
                .images_dir
                .unwrap_or_else(|| DEFAULT_IMAGES_DIR.to_string()),
            labels_dir: storage_file
                .labels_dir
                .unwrap_or_else(|| DEFAULT_LABELS_DIR.to_string()),
            database_path: PathBuf::from(
                storage_file
                    .database_path
                    .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            ),
            image_format: match storage_file.image_format.as_deref() {
                Some(format) => ImageFormat::parse(format)?,
                None => ImageFormat::Jpeg,
            },
        };

        let capture = CaptureSettings {
            reconnect_interval: Duration::from_secs(
                file.capture
                    .and_then(|c| c.reconnect_interval_secs)
                    .unwrap_or(DEFAULT_RECONNECT_SECS),
            ),
        };

        Ok(Self {
            cameras,
            motion,
            collection,
            inference,
            storage,
            capture,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(cameras) = std::env::var("HARVEST_CAMERAS") {
            let parsed = parse_camera_list(&cameras)?;
            if !parsed.is_empty() {
                self.cameras = parsed;
            }
        }
        if let Ok(path) = std::env::var("HARVEST_STORAGE_PATH") {
            if !path.trim().is_empty() {
                self.storage.base_path = PathBuf::from(path);
            }
        }
        if let Ok(backend) = std::env::var("HARVEST_INFERENCE_BACKEND") {
            if !backend.trim().is_empty() {
                self.inference.backend = backend.trim().to_ascii_lowercase();
            }
        }
        if let Ok(path) = std::env::var("HARVEST_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.inference.model_path = PathBuf::from(path);
            }
        }
        if let Ok(classes) = std::env::var("HARVEST_TARGET_CLASSES") {
            self.collection.target_classes = split_csv(&classes).into_iter().collect();
        }
        if let Ok(interval) = std::env::var("HARVEST_INTERVAL_SECS") {
            let secs: f64 = interval
                .trim()
                .parse()
                .map_err(|_| anyhow!("HARVEST_INTERVAL_SECS must be a number of seconds"))?;
            self.collection.interval = seconds("HARVEST_INTERVAL_SECS", secs)?;
        }
        if let Ok(confidence) = std::env::var("HARVEST_MIN_CONFIDENCE") {
            self.collection.min_confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("HARVEST_MIN_CONFIDENCE must be a number"))?;
        }
        if let Ok(split) = std::env::var("HARVEST_TRAIN_SPLIT") {
            self.storage.train_split = split
                .trim()
                .parse()
                .map_err(|_| anyhow!("HARVEST_TRAIN_SPLIT must be a number"))?;
        }
        if let Ok(enabled) = std::env::var("HARVEST_MOTION_ENABLED") {
            self.motion.enabled = parse_bool(&enabled)
                .ok_or_else(|| anyhow!("HARVEST_MOTION_ENABLED must be true or false"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if camera.id.trim().is_empty() {
                return Err(anyhow!("camera id must not be empty"));
            }
            if camera.uri.trim().is_empty() {
                return Err(anyhow!("camera '{}' has an empty url", camera.id));
            }
            if !seen.insert(camera.id.as_str()) {
                return Err(anyhow!("duplicate camera id '{}'", camera.id));
            }
        }
        if !(0.0..=1.0).contains(&self.collection.min_confidence) {
            return Err(anyhow!("collection.min_confidence must be within [0, 1]"));
        }
        if self.collection.poll_interval.is_zero() {
            return Err(anyhow!("collection.poll_interval_ms must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.storage.train_split) {
            return Err(anyhow!("storage.train_split must be within [0, 1]"));
        }
        if self.storage.images_dir.trim().is_empty() || self.storage.labels_dir.trim().is_empty() {
            return Err(anyhow!("storage directories must not be empty"));
        }
        if self.motion.min_area < 0.0 {
            return Err(anyhow!("motion_detection.min_area must not be negative"));
        }
        if self.motion.history == 0 {
            return Err(anyhow!("motion_detection.history must be greater than zero"));
        }
        if self.inference.input_width == 0 || self.inference.input_height == 0 {
            return Err(anyhow!("inference.input_shape must be positive"));
        }
        if self.capture.reconnect_interval.is_zero() {
            return Err(anyhow!("capture.reconnect_interval_secs must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            motion: MotionSettings::default(),
            collection: CollectionSettings::default(),
            inference: InferenceSettings::default(),
            storage: StorageSettings::default(),
            capture: CaptureSettings::default(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<HarvestConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("json");
    parse_config(&raw, format)
        .map_err(|e| anyhow!("invalid config file {}: {:#}", path.display(), e))
}

fn parse_config(raw: &str, format: &str) -> Result<HarvestConfigFile> {
    match format.to_ascii_lowercase().as_str() {
        "toml" => Ok(toml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(anyhow!("unsupported config format '{}'", other)),
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| anyhow!("{} must be a non-negative number of seconds", field))
}

/// `id=url` pairs separated by commas.
fn parse_camera_list(value: &str) -> Result<Vec<CameraConfig>> {
    split_csv(value)
        .into_iter()
        .map(|entry| {
            let (id, url) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("HARVEST_CAMERAS entry '{}' must be id=url", entry))?;
            Ok(CameraConfig::new(id.trim(), url.trim()))
        })
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = HarvestConfig::parse_document("{}", "json").unwrap();
        assert!(cfg.cameras.is_empty());
        assert_eq!(cfg.collection.interval, Duration::from_secs(5));
        assert_eq!(cfg.collection.min_confidence, 0.6);
        assert_eq!(cfg.collection.poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.storage.train_split, 0.8);
        assert!(!cfg.storage.save_empty);
        assert_eq!(cfg.storage.catalog_path(), Path::new("dataset/datacollector.db"));
        assert_eq!(cfg.capture.reconnect_interval, Duration::from_secs(5));
        assert_eq!(cfg.motion.strategy, MotionStrategy::BackgroundSubtraction);
        assert_eq!(cfg.motion.min_area, 500.0);
        assert!(!cfg.motion.enabled);
    }

    #[test]
    fn toml_and_json_describe_the_same_config() {
        let json = r#"{
            "cameras": [{"id": "cam0", "url": "test"}],
            "motion_detection": {"strategy": "frame_differencing", "threshold": 30},
            "inference": {"class_names": {"0": "person", "2": "car"}},
            "storage": {"image_format": "png"}
        }"#;
        let toml = r#"
            [[cameras]]
            id = "cam0"
            url = "test"

            [motion_detection]
            strategy = "frame_differencing"
            threshold = 30

            [inference.class_names]
            0 = "person"
            2 = "car"

            [storage]
            image_format = "png"
        "#;
        for cfg in [
            HarvestConfig::parse_document(json, "json").unwrap(),
            HarvestConfig::parse_document(toml, "toml").unwrap(),
        ] {
            assert_eq!(cfg.cameras, vec![CameraConfig::new("cam0", "test")]);
            assert_eq!(cfg.motion.strategy, MotionStrategy::FrameDifferencing);
            assert_eq!(cfg.motion.threshold, 30);
            assert_eq!(cfg.inference.class_names.resolve(2), "car");
            assert_eq!(cfg.inference.class_names.resolve(1), "1");
            assert_eq!(cfg.storage.image_format, ImageFormat::Png);
        }
    }

    #[test]
    fn class_name_list_is_indexed_by_id() {
        let cfg = HarvestConfig::parse_document(
            r#"{"inference": {"class_names": ["person", "helmet"]}}"#,
            "json",
        )
        .unwrap();
        assert_eq!(cfg.inference.class_names.resolve(1), "helmet");
        assert_eq!(cfg.inference.class_names.resolve(5), "5");
    }

    #[test]
    fn rejects_duplicate_and_empty_camera_ids() {
        let dup = r#"{"cameras": [{"id": "a", "url": "test"}, {"id": "a", "url": "0"}]}"#;
        assert!(HarvestConfig::parse_document(dup, "json").is_err());
        let empty = r#"{"cameras": [{"id": " ", "url": "test"}]}"#;
        assert!(HarvestConfig::parse_document(empty, "json").is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(HarvestConfig::parse_document(r#"{"storage": {"train_split": 1.5}}"#, "json").is_err());
        assert!(
            HarvestConfig::parse_document(r#"{"collection": {"interval_seconds": -1}}"#, "json").is_err()
        );
        assert!(HarvestConfig::parse_document(
            r#"{"motion_detection": {"strategy": "optical_flow"}}"#,
            "json"
        )
        .is_err());
        assert!(
            HarvestConfig::parse_document(r#"{"inference": {"input_shape": [640]}}"#, "json").is_err()
        );
    }

    #[test]
    fn camera_list_env_format() {
        let cams = parse_camera_list("front=rtsp://a/stream, lab=0").unwrap();
        assert_eq!(cams.len(), 2);
        assert_eq!(cams[1].id, "lab");
        assert_eq!(cams[1].uri, "0");
        assert!(parse_camera_list("nourl").is_err());
    }
}
