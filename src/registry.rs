//! Per-camera sources and motion gates.

use anyhow::{anyhow, Result};
use std::collections::HashSet;

use crate::config::{CameraConfig, CaptureSettings, MotionSettings};
use crate::frame::Frame;
use crate::ingest::{default_opener, DeviceOpener, FrameSource, SourceState, SourceStats};
use crate::motion::MotionGate;

struct CameraSlot {
    config: CameraConfig,
    source: FrameSource,
    gate: MotionGate,
}

/// Health line for one camera.
#[derive(Clone, Debug)]
pub struct CameraStatus {
    pub id: String,
    pub name: String,
    pub state: SourceState,
    pub connected: bool,
    pub stats: SourceStats,
}

/// Owns one `FrameSource` and one `MotionGate` per enabled camera.
///
/// Cameras are visited in configuration order.
pub struct CaptureRegistry {
    cameras: Vec<CameraSlot>,
}

impl CaptureRegistry {
    pub fn new(
        cameras: &[CameraConfig],
        motion: &MotionSettings,
        capture: &CaptureSettings,
    ) -> Result<Self> {
        Self::with_opener(cameras, motion, capture, default_opener())
    }

    /// Like [`CaptureRegistry::new`] with a custom device opener.
    pub fn with_opener(
        cameras: &[CameraConfig],
        motion: &MotionSettings,
        capture: &CaptureSettings,
        opener: DeviceOpener,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut slots = Vec::new();
        for config in cameras {
            if !seen.insert(config.id.as_str()) {
                return Err(anyhow!("duplicate camera id '{}'", config.id));
            }
            if !config.enabled {
                log::info!("camera {} disabled, skipping", config.id);
                continue;
            }
            slots.push(CameraSlot {
                source: FrameSource::with_opener(
                    config.id.clone(),
                    config.uri.clone(),
                    capture.reconnect_interval,
                    opener.clone(),
                ),
                gate: MotionGate::from_settings(motion),
                config: config.clone(),
            });
        }
        Ok(Self { cameras: slots })
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn camera_ids(&self) -> Vec<String> {
        self.cameras.iter().map(|c| c.config.id.clone()).collect()
    }

    /// Start every source. A camera that fails to start is logged and left
    /// stopped; the others keep running.
    pub fn start_all(&mut self) {
        for slot in &mut self.cameras {
            match slot.source.start() {
                Ok(()) => log::info!(
                    "camera {} ({}) started with {} motion gate",
                    slot.config.id,
                    slot.config.name,
                    slot.gate.strategy_name()
                ),
                Err(err) => log::error!("camera {} failed to start: {:#}", slot.config.id, err),
            }
        }
    }

    pub fn stop_all(&mut self) {
        for slot in &mut self.cameras {
            slot.source.stop();
        }
    }

    /// Latest frame of every camera that has one, in configuration order.
    pub fn snapshot_all(&self) -> Vec<(String, Frame)> {
        self.cameras
            .iter()
            .filter_map(|slot| {
                slot.source
                    .snapshot()
                    .map(|frame| (slot.config.id.clone(), frame))
            })
            .collect()
    }

    pub fn snapshot(&self, camera_id: &str) -> Option<Frame> {
        self.slot(camera_id).and_then(|slot| slot.source.snapshot())
    }

    pub fn is_connected(&self, camera_id: &str) -> bool {
        self.slot(camera_id)
            .map(|slot| slot.source.is_connected())
            .unwrap_or(false)
    }

    /// Run the camera's motion gate. Unknown cameras are never allowed.
    pub fn allow_motion(&mut self, camera_id: &str, frame: &Frame) -> bool {
        match self.cameras.iter_mut().find(|s| s.config.id == camera_id) {
            Some(slot) => slot.gate.allow(frame),
            None => false,
        }
    }

    pub fn statuses(&self) -> Vec<CameraStatus> {
        self.cameras
            .iter()
            .map(|slot| CameraStatus {
                id: slot.config.id.clone(),
                name: slot.config.name.clone(),
                state: slot.source.state(),
                connected: slot.source.is_connected(),
                stats: slot.source.stats(),
            })
            .collect()
    }

    fn slot(&self, camera_id: &str) -> Option<&CameraSlot> {
        self.cameras.iter().find(|s| s.config.id == camera_id)
    }
}

impl Drop for CaptureRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
