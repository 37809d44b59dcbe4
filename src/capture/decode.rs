//! Single-frame grabs from a media URL.
//!
//! Every grab opens its own input, decodes the first video frame it can and
//! drops the input again; nothing stays connected between slots.

use crate::error::CaptureError;
use ffmpeg::codec::Context as FFmpegCodecContext;
use ffmpeg::format::Pixel as FFmpegPixelFormat;
use ffmpeg::frame::Video as FFmpegVideoFrame;
use ffmpeg::media::Type as FFmpegMediaType;
use ffmpeg::software::scaling::flag::Flags as FFmpegScalingFlags;
use ffmpeg::software::scaling::Context as FFmpegScalingContext;
use ffmpeg_next as ffmpeg;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::time::Duration;

/// Give up on a stream that has not produced a frame after this many video
/// packets.
const MAX_VIDEO_PACKETS: usize = 600;

pub trait FrameDecoder {
    /// Open `url`, decode exactly one frame and close it again.
    fn grab(&mut self, url: &str) -> Result<RgbImage, CaptureError>;
}

pub struct FfmpegDecoder {
    io_timeout: Duration,
}

impl FfmpegDecoder {
    pub fn new(io_timeout: Duration) -> Result<Self, CaptureError> {
        ffmpeg::init()
            .map_err(|e| CaptureError::ConfigInvalid(format!("failed to initialize FFmpeg: {e}")))?;
        Ok(Self { io_timeout })
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn grab(&mut self, url: &str) -> Result<RgbImage, CaptureError> {
        let mut options = ffmpeg::Dictionary::new();
        // Microseconds
        options.set("rw_timeout", &self.io_timeout.as_micros().to_string());

        let mut input = ffmpeg::format::input_with_dictionary(url, options)
            .map_err(|e| CaptureError::DecodeFailed(format!("failed to open stream: {e}")))?;

        let (video_index, decoder_context) = {
            let stream = input
                .streams()
                .best(FFmpegMediaType::Video)
                .ok_or_else(|| CaptureError::DecodeFailed("no video stream".into()))?;
            let context = FFmpegCodecContext::from_parameters(stream.parameters())
                .map_err(|e| CaptureError::DecodeFailed(format!("bad codec parameters: {e}")))?;
            (stream.index(), context)
        };

        let mut decoder = decoder_context
            .decoder()
            .video()
            .map_err(|e| CaptureError::DecodeFailed(format!("failed to create decoder: {e}")))?;

        let mut frame = FFmpegVideoFrame::empty();
        let mut video_packets = 0;

        for (stream, packet) in input.packets() {
            if stream.index() != video_index {
                continue;
            }

            // Streams joined mid-GOP often start with undecodable packets.
            if let Err(e) = decoder.send_packet(&packet) {
                tracing::trace!("Skipping packet: {}", e);
            } else if decoder.receive_frame(&mut frame).is_ok() {
                return to_rgb(&frame);
            }

            video_packets += 1;
            if video_packets >= MAX_VIDEO_PACKETS {
                break;
            }
        }

        if decoder.send_eof().is_ok() && decoder.receive_frame(&mut frame).is_ok() {
            return to_rgb(&frame);
        }

        Err(CaptureError::DecodeFailed(format!(
            "no frame after {video_packets} video packets"
        )))
    }
}

fn to_rgb(frame: &FFmpegVideoFrame) -> Result<RgbImage, CaptureError> {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(CaptureError::DecodeFailed(format!(
            "decoded frame has zero size ({width}x{height})"
        )));
    }

    let mut scaler = FFmpegScalingContext::get(
        frame.format(),
        width,
        height,
        FFmpegPixelFormat::RGB24,
        width,
        height,
        FFmpegScalingFlags::BILINEAR,
    )
    .map_err(|e| CaptureError::DecodeFailed(format!("failed to create scaler: {e}")))?;

    let mut rgb = FFmpegVideoFrame::empty();
    scaler
        .run(frame, &mut rgb)
        .map_err(|e| CaptureError::DecodeFailed(format!("failed to convert frame: {e}")))?;

    // Rows may be padded; copy only the visible pixels.
    let stride = rgb.stride(0);
    let row_len = width as usize * 3;
    let data = rgb.data(0);
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in data.chunks(stride).take(height as usize) {
        pixels.extend_from_slice(&row[..row_len]);
    }

    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| CaptureError::DecodeFailed("frame buffer size mismatch".into()))
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(image)
        .map_err(|e| CaptureError::CaptureFailed(format!("failed to encode JPEG: {e}")))?;
    Ok(bytes)
}
