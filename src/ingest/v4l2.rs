//! Local capture devices through V4L2.

use anyhow::Context;
use ouroboros::self_referencing;

use super::normalize::{to_rgb_image, PixelFormat};
use super::CaptureDevice;
use crate::error::CaptureError;
use crate::frame::Frame;

const PREFERRED_WIDTH: u32 = 640;
const PREFERRED_HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;

pub struct V4l2Source {
    device: String,
    state: Option<V4l2State>,
    format: PixelFormat,
    width: u32,
    height: u32,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            state: None,
            format: PixelFormat::Rgb24,
            width: PREFERRED_WIDTH,
            height: PREFERRED_HEIGHT,
        }
    }

    fn open(&mut self) -> anyhow::Result<V4l2State> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(&self.device)
            .with_context(|| format!("open v4l2 device {}", self.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = PREFERRED_WIDTH;
        format.height = PREFERRED_HEIGHT;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Source: failed to set format on {}: {}", self.device, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        self.format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb24,
            b"NV12" => PixelFormat::Nv12,
            other => {
                return Err(CaptureError::fatal(format!(
                    "{} delivers unsupported pixel format {}",
                    self.device,
                    String::from_utf8_lossy(other)
                ))
                .into())
            }
        };
        self.width = format.width;
        self.height = format.height;

        V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
    }
}

impl CaptureDevice for V4l2Source {
    fn connect(&mut self) -> Result<(), CaptureError> {
        let state = self.open()?;
        self.state = Some(state);
        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            self.device,
            self.width,
            self.height,
            self.format
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| CaptureError::transient("v4l2 device not connected"))?;
        let (width, height, format) = (self.width, self.height, self.format);
        let image = state.with_mut(|fields| -> anyhow::Result<image::RgbImage> {
            let (buf, meta) = fields.stream.next().context("capture v4l2 frame")?;
            let used = (meta.bytesused as usize).min(buf.len());
            let used = if used == 0 { buf.len() } else { used };
            to_rgb_image(&buf[..used], width, height, format)
        })?;
        Ok(Frame::new(image))
    }

    fn disconnect(&mut self) {
        self.state = None;
    }
}
