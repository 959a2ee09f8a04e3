use anyhow::{bail, Context, Result};
use opencv::{
    core::Mat,
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};

use super::{FrameSink, FrameSource, SinkControl};
use crate::video::RgbFrame;

const KEY_ESC: i32 = 27;
const KEY_Q: i32 = b'q' as i32;

/// Webcam capture through OpenCV.
pub struct Camera {
    capture: VideoCapture,
    frames: i64,
}

impl Camera {
    pub fn open(device_id: i32) -> Result<Self> {
        let capture = VideoCapture::new(device_id, videoio::CAP_ANY)
            .with_context(|| format!("failed to open camera {device_id}"))?;
        if !capture.is_opened()? {
            bail!("cannot open camera {device_id}; check camera permissions");
        }
        Ok(Self { capture, frames: 0 })
    }
}

impl FrameSource for Camera {
    fn read(&mut self) -> Result<RgbFrame> {
        let mut bgr = Mat::default();
        if !self.capture.read(&mut bgr)? || bgr.empty() {
            bail!("camera returned an empty frame");
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB)?;

        let frame = RgbFrame {
            data: rgb.data_bytes()?.to_vec(),
            width: rgb.cols() as u32,
            height: rgb.rows() as u32,
            pts: self.frames,
        };
        self.frames += 1;
        Ok(frame)
    }
}

/// HighGUI window; `q` or `Esc` asks the session to stop.
pub struct Window {
    title: String,
}

impl Window {
    pub fn open(title: &str) -> Result<Self> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE)
            .with_context(|| format!("failed to open window '{title}'"))?;
        Ok(Self {
            title: title.to_string(),
        })
    }
}

impl FrameSink for Window {
    fn show(&mut self, frame: &RgbFrame) -> Result<SinkControl> {
        let flat = Mat::from_slice(&frame.data)?;
        let rgb = flat.reshape(3, frame.height as i32)?;
        let mut bgr = Mat::default();
        imgproc::cvt_color_def(&*rgb, &mut bgr, imgproc::COLOR_RGB2BGR)?;

        highgui::imshow(&self.title, &bgr)?;
        let key = highgui::wait_key(1)?;
        if key == KEY_Q || key == KEY_ESC {
            return Ok(SinkControl::Stop);
        }
        Ok(SinkControl::Continue)
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.title);
    }
}
