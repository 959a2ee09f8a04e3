//! video — FFmpeg bridge for offline analysis
//!
//! Decode a video file, hand every frame to a callback as packed RGB24, and
//! re-encode the (annotated) frames as H.264.  Audio is stream-copied.
//!
//! The callback may draw on the frame but must keep its dimensions; the
//! encoder is configured from the source stream before the first frame.

use anyhow::{bail, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{
    codec, encoder, format, frame, media, software::scaling, util::rational::Rational,
};
use std::path::Path;
use tracing::{debug, info, warn};

/// Output pixel format for the encoder (YUV420p is universally compatible).
const ENCODE_FORMAT: format::Pixel = format::Pixel::YUV420P;
const SCALE_FLAGS: scaling::Flags = scaling::Flags::BILINEAR;

/// A single decoded video frame in RGB24 format, along with its presentation
/// timestamp (in the source stream's time-base units).
#[derive(Debug, Clone, PartialEq)]
pub struct RgbFrame {
    pub data: Vec<u8>, // packed RGB24, row-major
    pub width: u32,
    pub height: u32,
    pub pts: i64,
}

impl RgbFrame {
    /// A black frame.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; (width * height * 3) as usize],
            width,
            height,
            pts: 0,
        }
    }

    /// RGB value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 3) as usize;
        self.data.get(i..i + 3).map(|p| [p[0], p[1], p[2]])
    }

    pub fn is_well_formed(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }
}

/// Flip a frame horizontally in place (selfie view for webcams).
pub fn mirror(frame: &mut RgbFrame) {
    let row_len = frame.width as usize * 3;
    if row_len == 0 {
        return;
    }
    for row in frame.data.chunks_exact_mut(row_len) {
        let (mut left, mut right) = (0usize, frame.width as usize - 1);
        while left < right {
            for c in 0..3 {
                row.swap(left * 3 + c, right * 3 + c);
            }
            left += 1;
            right -= 1;
        }
    }
}

/// Decode `input_path`, run `frame_fn` on every frame and encode the result to
/// `output_path`.  `progress_fn(done, total)` is called after each encoded
/// frame; `total` is whatever the caller passed (0 if unknown).
///
/// Returns the number of frames written.  On failure after the output was
/// created, the partial output file is removed.
pub fn transcode_with_progress<P, Q, F, G>(
    input_path: P,
    output_path: Q,
    total: u64,
    mut frame_fn: F,
    mut progress_fn: G,
) -> Result<u64>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: FnMut(&mut RgbFrame),
    G: FnMut(u64, u64),
{
    let output_path = output_path.as_ref();
    let mut output_created = false;
    let result = run_transcode(
        input_path.as_ref(),
        output_path,
        total,
        &mut frame_fn,
        &mut progress_fn,
        &mut output_created,
    );
    if result.is_err() && output_created {
        if let Err(e) = std::fs::remove_file(output_path) {
            warn!(path = %output_path.display(), "failed to remove partial output: {e}");
        }
    }
    result
}

fn run_transcode(
    input_path: &Path,
    output_path: &Path,
    total: u64,
    frame_fn: &mut dyn FnMut(&mut RgbFrame),
    progress_fn: &mut dyn FnMut(u64, u64),
    output_created: &mut bool,
) -> Result<u64> {
    ffmpeg::init().context("failed to initialise FFmpeg")?;

    // ── Input ────────────────────────────────────────────────────────────────
    let mut ictx = format::input(&input_path)
        .with_context(|| format!("could not open video {}", input_path.display()))?;

    let (video_in, time_base, frame_rate, video_params) = {
        let stream = ictx
            .streams()
            .best(media::Type::Video)
            .context("no video stream found in input")?;
        (
            stream.index(),
            stream.time_base(),
            stream.avg_frame_rate(),
            stream.parameters(),
        )
    };
    let audio_in = ictx
        .streams()
        .best(media::Type::Audio)
        .map(|s| (s.index(), s.parameters()));

    let decoder = codec::context::Context::from_parameters(video_params)
        .context("failed to build decoder context")?
        .decoder()
        .video()
        .context("failed to open video decoder")?;

    let width = decoder.width();
    let height = decoder.height();
    let src_format = decoder.format();
    info!(width, height, ?src_format, "opened input video stream");

    // ── Output ───────────────────────────────────────────────────────────────
    let mut octx = format::output(&output_path)
        .with_context(|| format!("could not create output {}", output_path.display()))?;
    *output_created = true;
    let global_header = octx
        .format()
        .flags()
        .contains(format::flag::Flags::GLOBAL_HEADER);

    let h264 = encoder::find(codec::Id::H264)
        .context("H.264 encoder not found — is FFmpeg built with libx264?")?;

    let (video_encoder, video_out) = {
        let mut stream = octx.add_stream(h264)?;
        let mut builder = codec::context::Context::new_with_codec(h264)
            .encoder()
            .video()?;
        builder.set_width(width);
        builder.set_height(height);
        builder.set_format(ENCODE_FORMAT);
        builder.set_time_base(time_base);
        builder.set_frame_rate(Some(frame_rate));
        if global_header {
            builder.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }
        let opened = builder
            .open_as_with(
                h264,
                ffmpeg::Dictionary::from_iter([("crf", "20"), ("preset", "fast")]),
            )
            .context("failed to open H.264 encoder")?;
        stream.set_parameters(&opened);
        (opened, stream.index())
    };

    let audio_map = match audio_in {
        Some((index, params)) => {
            let mut stream = octx.add_stream(codec::Id::None)?;
            stream.set_parameters(params);
            Some((index, stream.index()))
        }
        None => None,
    };

    format::context::output::dump(&octx, 0, output_path.to_str());
    octx.write_header()
        .context("failed to write output header")?;

    let mut pass = FramePass {
        decoder,
        encoder: video_encoder,
        to_rgb: scaling::Context::get(
            src_format,
            width,
            height,
            format::Pixel::RGB24,
            width,
            height,
            SCALE_FLAGS,
        )
        .context("failed to create to-RGB scaler")?,
        to_yuv: scaling::Context::get(
            format::Pixel::RGB24,
            width,
            height,
            ENCODE_FORMAT,
            width,
            height,
            SCALE_FLAGS,
        )
        .context("failed to create to-YUV scaler")?,
        width,
        height,
        time_base,
        video_out,
        frames: 0,
        total,
    };

    // ── Decode / annotate / encode ───────────────────────────────────────────
    for (stream, packet) in ictx.packets() {
        let index = stream.index();

        if let Some((audio_src, audio_dst)) = audio_map {
            if index == audio_src {
                let dst_tb = octx
                    .stream(audio_dst)
                    .context("audio output stream vanished")?
                    .time_base();
                let mut pkt = packet.clone();
                pkt.set_stream(audio_dst);
                pkt.rescale_ts(stream.time_base(), dst_tb);
                pkt.write_interleaved(&mut octx)
                    .context("failed to write audio packet")?;
                continue;
            }
        }

        if index != video_in {
            continue;
        }

        pass.decoder
            .send_packet(&packet)
            .context("decoder send_packet")?;
        pass.drain_decoder(&mut octx, frame_fn, progress_fn)?;
    }

    pass.decoder.send_eof().context("decoder send_eof")?;
    pass.drain_decoder(&mut octx, frame_fn, progress_fn)?;

    pass.encoder.send_eof().context("encoder send_eof")?;
    pass.drain_encoder(&mut octx)?;

    if pass.frames == 0 {
        bail!("no video frames were decoded");
    }

    octx.write_trailer()
        .context("failed to write output trailer")?;

    info!(frames = pass.frames, "transcode complete");
    Ok(pass.frames)
}

/// Per-run codec state shared by the packet loop and the final flush.
struct FramePass {
    decoder: ffmpeg::decoder::Video,
    encoder: encoder::Video,
    to_rgb: scaling::Context,
    to_yuv: scaling::Context,
    width: u32,
    height: u32,
    time_base: Rational,
    video_out: usize,
    frames: u64,
    total: u64,
}

impl FramePass {
    fn drain_decoder(
        &mut self,
        octx: &mut format::context::Output,
        frame_fn: &mut dyn FnMut(&mut RgbFrame),
        progress_fn: &mut dyn FnMut(u64, u64),
    ) -> Result<()> {
        let mut decoded = frame::Video::empty();
        let mut rgb = frame::Video::empty();

        while self.decoder.receive_frame(&mut decoded).is_ok() {
            self.to_rgb
                .run(&decoded, &mut rgb)
                .context("to-RGB scaling failed")?;

            let pts = decoded.pts().unwrap_or(self.frames as i64);
            let mut frame = RgbFrame {
                data: copy_plane(&rgb, self.width, self.height),
                width: self.width,
                height: self.height,
                pts,
            };

            frame_fn(&mut frame);

            if frame.width != self.width || frame.height != self.height || !frame.is_well_formed()
            {
                bail!(
                    "frame callback changed frame geometry to {}x{}",
                    frame.width,
                    frame.height
                );
            }

            let mut out_rgb = frame::Video::new(format::Pixel::RGB24, self.width, self.height);
            let row_len = self.width as usize * 3;
            let stride = out_rgb.stride(0);
            let plane = out_rgb.data_mut(0);
            for (row, src) in frame.data.chunks_exact(row_len).enumerate() {
                plane[row * stride..row * stride + row_len].copy_from_slice(src);
            }

            let mut yuv = frame::Video::empty();
            self.to_yuv
                .run(&out_rgb, &mut yuv)
                .context("to-YUV scaling failed")?;
            yuv.set_pts(Some(pts));

            self.encoder
                .send_frame(&yuv)
                .context("encoder send_frame")?;
            self.drain_encoder(octx)?;

            self.frames += 1;
            progress_fn(self.frames, self.total);
            if self.frames % 100 == 0 {
                debug!(frames = self.frames, "processed frames");
            }
        }
        Ok(())
    }

    /// Drain all pending packets from the encoder and write them to the muxer.
    fn drain_encoder(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let dst_tb = octx
            .stream(self.video_out)
            .context("video output stream vanished")?
            .time_base();
        let mut encoded = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.video_out);
            encoded.rescale_ts(self.time_base, dst_tb);
            encoded
                .write_interleaved(octx)
                .context("failed to write encoded packet")?;
        }
        Ok(())
    }
}

/// Copy an RGB24 AVFrame into a tightly packed buffer (drops stride padding).
fn copy_plane(rgb: &frame::Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb.stride(0);
    let raw = rgb.data(0);
    let row_len = width as usize * 3;
    let mut out = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        out.extend_from_slice(&raw[start..start + row_len]);
    }
    out
}

/// Approximate total frame count of a video file, for progress reporting.
/// Returns 0 when it cannot be determined.
pub fn total_frames<P: AsRef<Path>>(input_path: P) -> u64 {
    if ffmpeg::init().is_err() {
        return 0;
    }
    let Ok(ictx) = format::input(&input_path) else {
        return 0;
    };
    let Some(stream) = ictx.streams().best(media::Type::Video) else {
        return 0;
    };
    let nb = stream.frames();
    if nb > 0 {
        return nb as u64;
    }
    // fall back to duration × fps
    let dur = stream.duration();
    let tb = stream.time_base();
    let fps = stream.avg_frame_rate();
    if dur > 0 && tb.denominator() > 0 && fps.denominator() > 0 && fps.numerator() > 0 {
        let seconds = dur as f64 * tb.numerator() as f64 / tb.denominator() as f64;
        let fps = fps.numerator() as f64 / fps.denominator() as f64;
        return (seconds * fps).round() as u64;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_reverses_each_row() {
        let mut frame = RgbFrame {
            data: vec![
                1, 1, 1, 2, 2, 2, 3, 3, 3, //
                4, 4, 4, 5, 5, 5, 6, 6, 6,
            ],
            width: 3,
            height: 2,
            pts: 7,
        };
        mirror(&mut frame);
        assert_eq!(frame.pixel(0, 0), Some([3, 3, 3]));
        assert_eq!(frame.pixel(1, 0), Some([2, 2, 2]));
        assert_eq!(frame.pixel(2, 1), Some([4, 4, 4]));
        assert_eq!(frame.pts, 7);

        mirror(&mut frame);
        assert_eq!(frame.pixel(0, 0), Some([1, 1, 1]));
    }

    #[test]
    fn test_mirror_keeps_colour_channel_order() {
        let mut frame = RgbFrame {
            data: vec![10, 20, 30, 40, 50, 60],
            width: 2,
            height: 1,
            pts: 0,
        };
        mirror(&mut frame);
        assert_eq!(frame.data, vec![40, 50, 60, 10, 20, 30]);
    }

    #[test]
    fn test_pixel_bounds_and_shape() {
        let frame = RgbFrame::blank(4, 2);
        assert!(frame.is_well_formed());
        assert_eq!(frame.pixel(3, 1), Some([0, 0, 0]));
        assert_eq!(frame.pixel(4, 0), None);
        assert_eq!(frame.pixel(0, 2), None);
    }
}
