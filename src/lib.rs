//! # framepipe
//!
//! Encode raw pixel frames into a video file, one frame at a time.
//!
//! `framepipe` is a synchronous, append-only encoder for hosts that produce
//! pictures themselves (a drawing canvas, a renderer, a screen recorder) and
//! want a finished, playable file at the end. Each frame is converted from a
//! packed RGB-family buffer to the encoder's pixel format and size, compressed,
//! and muxed into a single-video-stream container, powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framepipe::{Dimensions, EncodePipeline};
//!
//! let size = Dimensions::new(64, 64);
//! let mut pipeline = EncodePipeline::new("output.mp4", size, size, 30);
//! pipeline.init()?;
//! for _ in 0..10 {
//!     pipeline.add_frame(&vec![0u8; 64 * 64 * 4])?;
//! }
//! pipeline.finish()?;
//! # Ok::<(), framepipe::EncodeError>(())
//! ```
//!
//! ## Configuration
//!
//! ```no_run
//! use framepipe::{EncodePipeline, EncoderProfile, PipelineOptions, SourcePixelFormat, VideoCodec};
//!
//! let options = PipelineOptions::new()
//!     .with_source_format(SourcePixelFormat::Rgb24)
//!     .with_profile(EncoderProfile::for_codec(VideoCodec::H265).crf(26));
//! let mut pipeline =
//!     EncodePipeline::with_options("output.mkv", (1280, 720), (640, 360), 24, options);
//! pipeline.init()?;
//! # Ok::<(), framepipe::EncodeError>(())
//! ```
//!
//! ## Guarantees
//!
//! - Frames are stamped 0, 1, 2, ... in call order, regardless of how many
//!   packets each one produces.
//! - Every error releases all native resources before it is returned, and a
//!   failed pipeline refuses further work with
//!   [`EncodeError::InvalidState`].
//! - Dropping a pipeline releases its resources; the output is then left
//!   without a trailer.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system. The
//! default H.264 profile additionally needs an FFmpeg built with libx264.

pub mod backend;
mod codec;
pub mod configuration;
mod container;
mod converter;
pub mod error;
mod frame_buffer;
pub mod pipeline;

pub use backend::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use configuration::{
    Dimensions, EncoderProfile, PipelineOptions, ScalingQuality, SourcePixelFormat, VideoCodec,
};
pub use error::EncodeError;
pub use pipeline::{EncodePipeline, PipelineState};
