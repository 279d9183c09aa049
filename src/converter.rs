//! Raw buffer to encoder-format conversion.
//!
//! [`PixelConverter`] resamples a caller's packed RGB-family buffer at source
//! size into the pipeline's [`FrameBuffer`] at destination size and pixel
//! format. The scaling context is built once and never changes afterwards.

use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::Context as ScalingContext;

use crate::configuration::{Dimensions, ScalingQuality, SourcePixelFormat};
use crate::error::EncodeError;
use crate::frame_buffer::{FrameBuffer, allocate_frame};

pub(crate) struct PixelConverter {
    scaler: ScalingContext,
    // Packed source picture, with whatever row padding FFmpeg chose.
    staging: VideoFrame,
    source_format: SourcePixelFormat,
    source: Dimensions,
}

impl PixelConverter {
    /// Build a converter for one fixed source/destination pair.
    pub(crate) fn new(
        source_format: SourcePixelFormat,
        source: Dimensions,
        destination_format: Pixel,
        destination: Dimensions,
        quality: ScalingQuality,
    ) -> Result<Self, EncodeError> {
        log::debug!(
            "Creating {:?} {}x{} -> {:?} {}x{} converter ({:?})",
            source_format,
            source.width,
            source.height,
            destination_format,
            destination.width,
            destination.height,
            quality,
        );

        let scaler = ScalingContext::get(
            source_format.to_ffmpeg_pixel(),
            source.width,
            source.height,
            destination_format,
            destination.width,
            destination.height,
            quality.to_scaling_flags(),
        )
        .map_err(|e| EncodeError::allocation("could not get scaling context", e))?;

        let staging = allocate_frame(source_format.to_ffmpeg_pixel(), source)?;

        Ok(Self {
            scaler,
            staging,
            source_format,
            source,
        })
    }

    /// Minimum length of a raw source buffer.
    pub(crate) fn required_len(&self) -> usize {
        self.source_format.frame_len(self.source)
    }

    /// Reject buffers too short to hold one source picture.
    pub(crate) fn check_len(&self, len: usize) -> Result<(), EncodeError> {
        let required = self.required_len();
        if len < required {
            return Err(EncodeError::InvalidArgument(format!(
                "too short buffer: got {len} bytes, need {required} ({}x{} {:?})",
                self.source.width, self.source.height, self.source_format,
            )));
        }
        Ok(())
    }

    /// Convert `raw` into `target`.
    ///
    /// The caller must have made `target` writable. Nothing is written when
    /// `raw` is too short.
    pub(crate) fn convert(
        &mut self,
        raw: &[u8],
        target: &mut FrameBuffer,
    ) -> Result<(), EncodeError> {
        self.check_len(raw.len())?;

        let row_len = self.source.width as usize * self.source_format.bytes_per_pixel();
        let stride = self.staging.stride(0);
        let plane = self.staging.data_mut(0);
        for (row, source_row) in raw
            .chunks_exact(row_len)
            .take(self.source.height as usize)
            .enumerate()
        {
            let start = row * stride;
            plane[start..start + row_len].copy_from_slice(source_row);
        }

        self.scaler
            .run(&self.staging, target.frame_mut())
            .map_err(|e| EncodeError::Encoding(format!("pixel conversion failed: {e}")))
    }
}
