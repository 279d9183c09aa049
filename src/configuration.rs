//! Pipeline configuration.
//!
//! [`PipelineOptions`] bundles everything about an encode that is not a
//! dimension or a frame rate: the packed layout of the caller's raw buffers,
//! the codec and its tuning ([`EncoderProfile`]), and the resampling quality
//! used when source and destination sizes differ.
//!
//! # Example
//!
//! ```no_run
//! use framepipe::{EncoderProfile, PipelineOptions, ScalingQuality, SourcePixelFormat, VideoCodec};
//!
//! let options = PipelineOptions::new()
//!     .with_source_format(SourcePixelFormat::Rgb24)
//!     .with_profile(EncoderProfile::default().preset("medium").crf(18))
//!     .with_scaling(ScalingQuality::Lanczos);
//!
//! let mpeg4 = PipelineOptions::new().with_profile(EncoderProfile::for_codec(VideoCodec::Mpeg4));
//! ```

use ffmpeg_next::Dictionary;
use ffmpeg_next::codec::Id;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::Flags as ScalingFlags;

/// Width and height of a picture, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels in one picture.
    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns `true` if either side is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Packed pixel layout of the raw buffers handed to
/// [`EncodePipeline::add_frame`](crate::EncodePipeline::add_frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourcePixelFormat {
    /// 8-bit B, G, R, A (32 bpp). This is the default: it is the native
    /// layout of most canvas and screen-capture surfaces.
    #[default]
    Bgra,
    /// 8-bit R, G, B, A (32 bpp).
    Rgba,
    /// 8-bit R, G, B (24 bpp).
    Rgb24,
    /// 8-bit B, G, R (24 bpp).
    Bgr24,
}

impl SourcePixelFormat {
    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            SourcePixelFormat::Bgra | SourcePixelFormat::Rgba => 4,
            SourcePixelFormat::Rgb24 | SourcePixelFormat::Bgr24 => 3,
        }
    }

    /// Minimum buffer length for one picture of the given size.
    pub fn frame_len(self, dimensions: Dimensions) -> usize {
        dimensions.pixel_count() * self.bytes_per_pixel()
    }

    pub(crate) fn to_ffmpeg_pixel(self) -> Pixel {
        match self {
            SourcePixelFormat::Bgra => Pixel::BGRA,
            SourcePixelFormat::Rgba => Pixel::RGBA,
            SourcePixelFormat::Rgb24 => Pixel::RGB24,
            SourcePixelFormat::Bgr24 => Pixel::BGR24,
        }
    }
}

/// Resampling algorithm used by the pixel converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScalingQuality {
    /// Nearest neighbour.
    Point,
    /// Fast bilinear.
    FastBilinear,
    /// Bilinear.
    Bilinear,
    /// Bicubic (default).
    #[default]
    Bicubic,
    /// Lanczos.
    Lanczos,
}

impl ScalingQuality {
    pub(crate) fn to_scaling_flags(self) -> ScalingFlags {
        match self {
            ScalingQuality::Point => ScalingFlags::POINT,
            ScalingQuality::FastBilinear => ScalingFlags::FAST_BILINEAR,
            ScalingQuality::Bilinear => ScalingFlags::BILINEAR,
            ScalingQuality::Bicubic => ScalingFlags::BICUBIC,
            ScalingQuality::Lanczos => ScalingFlags::LANCZOS,
        }
    }
}

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoCodec {
    /// H.264 / AVC (default).
    #[default]
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2. Built into every libavcodec, needs no external library.
    Mpeg4,
}

impl VideoCodec {
    pub(crate) fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
            VideoCodec::Mpeg4 => Id::MPEG4,
        }
    }

    /// Parse a codec name as accepted on the command line.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "h264" | "avc" | "x264" => Some(VideoCodec::H264),
            "h265" | "hevc" | "x265" => Some(VideoCodec::H265),
            "mpeg4" => Some(VideoCodec::Mpeg4),
            _ => None,
        }
    }
}

/// Codec selection and tuning.
///
/// The defaults reproduce the classic export profile: H.264 with the
/// `veryfast` preset, `animation` tuning and CRF 22, encoding YUV 4:2:0.
/// Tuning values left as `None` are not passed to the codec at all, which
/// matters for codecs that do not understand them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderProfile {
    /// Codec to encode with.
    pub codec: VideoCodec,
    /// Pixel format of the encoded pictures.
    pub pixel_format: Pixel,
    /// Encoder speed preset (`veryfast`, `medium`, ...).
    pub preset: Option<String>,
    /// Content tuning (`animation`, `film`, ...).
    pub tune: Option<String>,
    /// Constant Rate Factor (0-51, lower is better).
    pub crf: Option<u32>,
    /// Target bitrate in bits per second.
    pub bitrate: Option<usize>,
}

impl Default for EncoderProfile {
    fn default() -> Self {
        Self::for_codec(VideoCodec::H264)
    }
}

impl EncoderProfile {
    /// Sensible defaults for the given codec.
    ///
    /// x264 and x265 get `veryfast` / `animation` / CRF 22. MPEG-4 Part 2
    /// has none of those knobs and gets no tuning options.
    pub fn for_codec(codec: VideoCodec) -> Self {
        match codec {
            VideoCodec::H264 | VideoCodec::H265 => Self {
                codec,
                pixel_format: Pixel::YUV420P,
                preset: Some("veryfast".to_string()),
                tune: Some("animation".to_string()),
                crf: Some(22),
                bitrate: None,
            },
            VideoCodec::Mpeg4 => Self {
                codec,
                pixel_format: Pixel::YUV420P,
                preset: None,
                tune: None,
                crf: None,
                bitrate: None,
            },
        }
    }

    /// Set the speed preset.
    #[must_use]
    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    /// Set the content tuning.
    #[must_use]
    pub fn tune(mut self, tune: impl Into<String>) -> Self {
        self.tune = Some(tune.into());
        self
    }

    /// Set the CRF quality value.
    #[must_use]
    pub fn crf(mut self, crf: u32) -> Self {
        self.crf = Some(crf);
        self
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Set the encoded pixel format.
    #[must_use]
    pub fn pixel_format(mut self, pixel_format: Pixel) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    /// Codec private options handed to the encoder when it is opened.
    pub(crate) fn to_dictionary(&self) -> Dictionary<'static> {
        let mut options = Dictionary::new();
        if let Some(preset) = &self.preset {
            options.set("preset", preset);
        }
        if let Some(tune) = &self.tune {
            options.set("tune", tune);
        }
        if let Some(crf) = self.crf {
            options.set("crf", &crf.to_string());
        }
        options
    }
}

/// Everything about a pipeline besides its sizes and frame rate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Layout of the raw input buffers.
    pub source_format: SourcePixelFormat,
    /// Codec and tuning.
    pub profile: EncoderProfile,
    /// Resampling quality.
    pub scaling: ScalingQuality,
}

impl PipelineOptions {
    /// Default options: BGRA input, default [`EncoderProfile`], bicubic scaling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw input layout.
    #[must_use]
    pub fn with_source_format(mut self, format: SourcePixelFormat) -> Self {
        self.source_format = format;
        self
    }

    /// Set the codec profile.
    #[must_use]
    pub fn with_profile(mut self, profile: EncoderProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Set the resampling quality.
    #[must_use]
    pub fn with_scaling(mut self, scaling: ScalingQuality) -> Self {
        self.scaling = scaling;
        self
    }
}
