//! Frame acquisition.
//!
//! A camera URI is classified into a `SourceKind`, which selects the
//! `CaptureDevice` backend:
//! - `test`: random noise, always available
//! - `stub://<name>`: deterministic synthetic scene, always available
//! - `rtsp://`, `rtsps://`, `http(s)://`, `file://`: GStreamer (feature: rtsp-gstreamer)
//! - `0`, `1`, ... or `/dev/videoN`: V4L2 (feature: ingest-v4l2)
//!
//! `FrameSource` wraps a device in an acquisition thread with reconnect.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
#[cfg(feature = "rtsp-gstreamer")]
pub mod rtsp;
mod source;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::sync::Arc;

use crate::error::CaptureError;
use crate::frame::Frame;

pub use source::{FrameSource, SourceState, SourceStats};
pub use synthetic::{NoiseSource, PatternSource};

/// One opened camera handle.
///
/// `read` blocks for at most one frame period (or the backend's read
/// timeout) so that the acquisition loop can observe a stop request.
pub trait CaptureDevice: Send {
    fn connect(&mut self) -> Result<(), CaptureError>;

    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// Release the handle. Called before every reconnect attempt.
    fn disconnect(&mut self) {}
}

/// Opens a device for a camera URI.
pub type DeviceOpener =
    Arc<dyn Fn(&str) -> Result<Box<dyn CaptureDevice>, CaptureError> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Synthetic noise; never disconnects.
    Test,
    Stub(String),
    Stream(String),
    Device(String),
}

impl SourceKind {
    /// Classify a URI. Unrecognized schemes are a fatal error.
    pub fn parse(uri: &str) -> Result<Self, CaptureError> {
        let uri = uri.trim();
        if uri == "test" {
            return Ok(SourceKind::Test);
        }
        if let Some(name) = uri.strip_prefix("stub://") {
            return Ok(SourceKind::Stub(name.to_string()));
        }
        if !uri.is_empty() && uri.chars().all(|c| c.is_ascii_digit()) {
            return Ok(SourceKind::Device(format!("/dev/video{}", uri)));
        }
        if uri.starts_with("/dev/video") {
            return Ok(SourceKind::Device(uri.to_string()));
        }
        const STREAM_SCHEMES: [&str; 5] = ["rtsp://", "rtsps://", "http://", "https://", "file://"];
        if STREAM_SCHEMES.iter().any(|scheme| uri.starts_with(scheme)) {
            return Ok(SourceKind::Stream(uri.to_string()));
        }
        Err(CaptureError::fatal(format!("unsupported camera uri '{}'", uri)))
    }
}

/// Default opener covering every backend compiled into this build.
pub fn open_device(uri: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    match SourceKind::parse(uri)? {
        SourceKind::Test => Ok(Box::new(NoiseSource::new())),
        SourceKind::Stub(name) => Ok(Box::new(PatternSource::new(name))),
        SourceKind::Stream(uri) => open_stream(&uri),
        SourceKind::Device(path) => open_v4l2(&path),
    }
}

pub fn default_opener() -> DeviceOpener {
    Arc::new(open_device)
}

#[cfg(feature = "rtsp-gstreamer")]
fn open_stream(uri: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    Ok(Box::new(rtsp::GstreamerSource::new(uri)?))
}

#[cfg(not(feature = "rtsp-gstreamer"))]
fn open_stream(uri: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    Err(CaptureError::fatal(format!(
        "{} requires the rtsp-gstreamer feature",
        uri
    )))
}

#[cfg(feature = "ingest-v4l2")]
fn open_v4l2(path: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    Ok(Box::new(v4l2::V4l2Source::new(path)))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_v4l2(path: &str) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    Err(CaptureError::fatal(format!(
        "{} requires the ingest-v4l2 feature",
        path
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn classifies_uris() {
        assert_eq!(SourceKind::parse("test").unwrap(), SourceKind::Test);
        assert_eq!(
            SourceKind::parse("stub://yard").unwrap(),
            SourceKind::Stub("yard".into())
        );
        assert_eq!(
            SourceKind::parse("2").unwrap(),
            SourceKind::Device("/dev/video2".into())
        );
        assert_eq!(
            SourceKind::parse("rtsp://10.0.0.5/stream1").unwrap(),
            SourceKind::Stream("rtsp://10.0.0.5/stream1".into())
        );
        let err = SourceKind::parse("ftp://nope").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[cfg(not(feature = "rtsp-gstreamer"))]
    #[test]
    fn streams_without_backend_are_fatal() {
        let err = open_device("rtsp://10.0.0.5/stream1").err().unwrap();
        assert_eq!(err.class(), ErrorClass::Fatal);
    }
}
