//! Network and file streams via GStreamer.
//!
//! `uridecodebin` handles rtsp, http and file URIs alike; frames leave the
//! pipeline as packed RGB through a single-buffer appsink.

use anyhow::Context;
use gstreamer::prelude::*;
use std::time::{Duration, Instant};

use super::CaptureDevice;
use crate::error::CaptureError;
use crate::frame::Frame;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_MS: u64 = 2_000;

pub struct GstreamerSource {
    uri: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    last_frame_at: Option<Instant>,
}

impl GstreamerSource {
    pub fn new(uri: &str) -> Result<Self, CaptureError> {
        Self::build(uri).map_err(|e| CaptureError::fatal(format!("{:#}", e)))
    }

    fn build(uri: &str) -> anyhow::Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let description = format!(
            "uridecodebin uri={} ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            uri
        );
        let pipeline = gstreamer::parse::launch(&description)
            .context("build capture pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow::anyhow!("capture pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow::anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        Ok(Self {
            uri: uri.to_string(),
            pipeline,
            appsink,
            last_frame_at: None,
        })
    }

    /// Surface pipeline errors and end-of-stream as transient failures.
    fn poll_bus(&self) -> Result<(), CaptureError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Err(CaptureError::transient(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    )));
                }
                MessageView::Eos(..) => {
                    return Err(CaptureError::transient("stream reached end"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl CaptureDevice for GstreamerSource {
    fn connect(&mut self) -> Result<(), CaptureError> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CaptureError::transient(format!("start pipeline for {}: {}", self.uri, e)))?;
        let (result, _, _) = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(CONNECT_TIMEOUT_SECS));
        if let Err(err) = result {
            let _ = self.pipeline.set_state(gstreamer::State::Null);
            return Err(CaptureError::transient(format!(
                "open {}: {}",
                self.uri, err
            )));
        }
        self.poll_bus()?;
        log::info!("GstreamerSource: connected to {}", self.uri);
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        self.poll_bus()?;
        let sample = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_mseconds(READ_TIMEOUT_MS))
            .ok_or_else(|| {
                let idle = self
                    .last_frame_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                CaptureError::transient(format!("stream stalled (idle {:?})", idle))
            })?;

        let (pixels, width, height) = sample_to_pixels(&sample)?;
        self.last_frame_at = Some(Instant::now());
        Ok(Frame::from_rgb(width, height, pixels)?)
    }

    fn disconnect(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::debug!("GstreamerSource: stopping {} failed: {}", self.uri, err);
        }
    }
}

impl Drop for GstreamerSource {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn sample_to_pixels(sample: &gstreamer::Sample) -> anyhow::Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let packed = data.get(..len).context("buffer shorter than frame")?;
        return Ok((packed.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(data.get(start..end).context("buffer row is out of bounds")?);
    }

    Ok((pixels, width, height))
}
