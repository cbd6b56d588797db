//! Frame Harvest
//!
//! Collects instance-segmentation training data from live cameras.
//!
//! # Architecture
//!
//! Each camera runs its own acquisition thread that keeps only the newest
//! frame. A single control loop polls those frames and, per camera:
//!
//! 1. skips the camera while its sampling interval has not elapsed,
//! 2. asks the camera's motion gate whether the scene changed,
//! 3. runs the segmentation detector,
//! 4. filters detections by confidence and class,
//! 5. converts masks to normalized polygons,
//! 6. writes image, label file and catalog row.
//!
//! # Module Structure
//!
//! - `frame`: `Frame` and the single-slot `Mailbox`
//! - `ingest`: capture devices and the reconnecting `FrameSource`
//! - `registry`: one source and motion gate per configured camera
//! - `motion`: background subtraction and frame differencing gates
//! - `detect`: `Detector` contract, engines and provider probe
//! - `geometry`: mask to polygon conversion and label lines
//! - `catalog`, `dataset`: on-disk dataset and its SQLite index
//! - `collector`: the control loop
//! - `config`, `error`: settings and error taxonomy

pub mod catalog;
pub mod collector;
pub mod config;
pub mod dataset;
pub mod detect;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod motion;
pub mod registry;

pub use catalog::{Catalog, DatasetRecord, InMemoryCatalog, Split, SplitCounts, SqliteCatalog};
pub use collector::{Collector, CollectorStats};
pub use config::{
    CameraConfig, CaptureSettings, CollectionSettings, HarvestConfig, ImageFormat,
    InferenceSettings, MotionSettings, MotionStrategy, StorageSettings,
};
pub use dataset::{DatasetStore, SaveOutcome, VerifyReport};
pub use detect::{
    probe_execution_provider, ClassNameResolver, Detection, Detector, DetectorRegistry,
    ExecutionProvider, Inference, MockDetector,
};
pub use error::{CaptureError, ErrorClass, HarvestError, HarvestErrorKind};
pub use frame::{Frame, Mailbox};
pub use geometry::{format_label, mask_to_polygons, parse_label_line, Polygon};
pub use ingest::{CaptureDevice, FrameSource, SourceState, SourceStats};
pub use motion::MotionGate;
pub use registry::{CameraStatus, CaptureRegistry};
