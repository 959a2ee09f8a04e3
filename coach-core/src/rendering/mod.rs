//! rendering — draw the rep counter and measured limbs onto a frame
//!
//! Text goes through `ab_glyph` when a font file is configured.  Without a
//! font the counter value and the angle label are drawn as seven-segment
//! digits, so the overlay never depends on assets being present.

use ab_glyph::{FontArc, PxScale};
use anyhow::{bail, Context, Result};
use fast_image_resize as fr;
use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut,
    draw_text_mut,
};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::counter::Reading;
use crate::pose::Pose;
use crate::video::RgbFrame;

/// Counter panel: top-left corner, 225×73 px.
const PANEL_WIDTH: u32 = 225;
const PANEL_HEIGHT: u32 = 73;
const PANEL_COLOR: Rgb<u8> = Rgb([245, 117, 16]);
const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LIMB_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const JOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const JOINT_RING_COLOR: Rgb<u8> = Rgb([0, 60, 255]);

/// Seven-segment digit geometry.
#[derive(Debug, Clone, Copy)]
struct DigitSize {
    width: i32,
    height: i32,
    segment: i32,
    gap: i32,
}

const PANEL_DIGITS: DigitSize = DigitSize {
    width: 22,
    height: 40,
    segment: 5,
    gap: 8,
};
const LABEL_DIGITS: DigitSize = DigitSize {
    width: 12,
    height: 22,
    segment: 3,
    gap: 5,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// TTF/OTF font used for the "REPS" label and angle values.
    pub font_path: Option<PathBuf>,
}

pub struct Overlay {
    font: Option<FontArc>,
}

impl Overlay {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    pub fn from_config(config: &OverlayConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("failed to read font {}", path.display()))?;
                let font = FontArc::try_from_vec(bytes)
                    .map_err(|e| anyhow::anyhow!("invalid font {}: {e}", path.display()))?;
                Some(font)
            }
            None => None,
        };
        Ok(Self::new(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw the measured limbs (when a pose was found) and the rep panel.
    pub fn draw(
        &self,
        frame: &mut RgbFrame,
        reps: u32,
        pose: Option<&Pose>,
        reading: Option<&Reading>,
    ) -> Result<()> {
        with_image(frame, |img| {
            if let (Some(pose), Some(reading)) = (pose, reading) {
                self.draw_limbs(img, pose, reading);
            }
            self.draw_panel(img, reps);
        })
    }

    fn draw_limbs(&self, img: &mut RgbImage, pose: &Pose, reading: &Reading) {
        for limb in reading.limbs() {
            let [a, b, c] = limb.map(|id| pose.point(id));
            draw_line_segment_mut(img, a, b, LIMB_COLOR);
            draw_line_segment_mut(img, c, b, LIMB_COLOR);
            for (x, y) in [a, b, c] {
                let center = (x as i32, y as i32);
                draw_filled_circle_mut(img, center, 10, JOINT_COLOR);
                draw_hollow_circle_mut(img, center, 16, JOINT_RING_COLOR);
            }
        }

        let (joint, angle) = reading.display();
        let (x, y) = pose.point(joint);
        let (lx, ly) = (x as i32 - 50, y as i32 + 40);
        match &self.font {
            Some(font) => draw_text_mut(
                img,
                TEXT_COLOR,
                lx,
                ly,
                PxScale::from(24.0),
                font,
                &format!("{}", angle as i32),
            ),
            None => draw_number(img, lx, ly, angle as u32, LABEL_DIGITS, TEXT_COLOR),
        }
    }

    fn draw_panel(&self, img: &mut RgbImage, reps: u32) {
        draw_filled_rect_mut(
            img,
            Rect::at(0, 0).of_size(PANEL_WIDTH, PANEL_HEIGHT),
            PANEL_COLOR,
        );

        match &self.font {
            Some(font) => {
                draw_text_mut(img, LABEL_COLOR, 15, 4, PxScale::from(16.0), font, "REPS");
                draw_text_mut(
                    img,
                    TEXT_COLOR,
                    10,
                    20,
                    PxScale::from(48.0),
                    font,
                    &reps.to_string(),
                );
            }
            None => draw_number(img, 10, 22, reps, PANEL_DIGITS, TEXT_COLOR),
        }
    }
}

/// Run `f` on the frame's buffer viewed as an `RgbImage`, then hand the buffer
/// back to the frame.
fn with_image(frame: &mut RgbFrame, f: impl FnOnce(&mut RgbImage)) -> Result<()> {
    if !frame.is_well_formed() {
        bail!(
            "frame buffer holds {} bytes, expected {}x{}x3",
            frame.data.len(),
            frame.width,
            frame.height
        );
    }
    let mut img: RgbImage =
        ImageBuffer::from_raw(frame.width, frame.height, std::mem::take(&mut frame.data))
            .context("frame buffer does not match its dimensions")?;
    f(&mut img);
    frame.data = img.into_raw();
    Ok(())
}

// Segment order: top, upper-right, lower-right, bottom, lower-left, upper-left, middle.
const DIGIT_SEGMENTS: [[bool; 7]; 10] = [
    [true, true, true, true, true, true, false],
    [false, true, true, false, false, false, false],
    [true, true, false, true, true, false, true],
    [true, true, true, true, false, false, true],
    [false, true, true, false, false, true, true],
    [true, false, true, true, false, true, true],
    [true, false, true, true, true, true, true],
    [true, true, true, false, false, false, false],
    [true, true, true, true, true, true, true],
    [true, true, true, true, false, true, true],
];

fn draw_number(
    img: &mut RgbImage,
    x: i32,
    y: i32,
    value: u32,
    size: DigitSize,
    color: Rgb<u8>,
) {
    for (i, ch) in value.to_string().chars().enumerate() {
        let Some(digit) = ch.to_digit(10) else {
            continue;
        };
        let left = x + i as i32 * (size.width + size.gap);
        draw_digit(img, left, y, digit as usize, size, color);
    }
}

fn draw_digit(img: &mut RgbImage, x: i32, y: i32, digit: usize, size: DigitSize, color: Rgb<u8>) {
    let (w, h, t) = (size.width, size.height, size.segment);
    let half = h / 2;
    let segments = [
        (0, 0, w, t),
        (w - t, 0, t, half),
        (w - t, half, t, half),
        (0, h - t, w, t),
        (0, half, t, half),
        (0, 0, t, half),
        (0, half - t / 2, w, t),
    ];
    for (on, (sx, sy, sw, sh)) in DIGIT_SEGMENTS[digit % 10].iter().zip(segments) {
        if *on {
            draw_filled_rect_mut(
                img,
                Rect::at(x + sx, y + sy).of_size(sw as u32, sh as u32),
                color,
            );
        }
    }
}

/// Resize frames for display, reusing the resizer between calls.
pub struct FrameScaler {
    resizer: fr::Resizer,
}

impl FrameScaler {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
        }
    }

    /// Scale `frame` to `width` keeping its aspect ratio.
    pub fn fit_width(&mut self, frame: &RgbFrame, width: u32) -> Result<RgbFrame> {
        if width == 0 || frame.width == 0 || frame.height == 0 {
            bail!("cannot scale a {}x{} frame to width {width}", frame.width, frame.height);
        }
        let height =
            ((frame.height as f32 * width as f32 / frame.width as f32).round() as u32).max(1);

        let src =
            fr::images::ImageRef::new(frame.width, frame.height, &frame.data, fr::PixelType::U8x3)
                .context("failed to create display resize source")?;

        let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);

        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
        self.resizer
            .resize(&src, &mut dst, Some(&options))
            .context("display resize failed")?;

        Ok(RgbFrame {
            data: dst.into_vec(),
            width,
            height,
            pts: frame.pts,
        })
    }
}

impl Default for FrameScaler {
    fn default() -> Self {
        Self::new()
    }
}
