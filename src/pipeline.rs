//! The encode pipeline.
//!
//! [`EncodePipeline`] ties the converter, frame buffer, codec session and
//! container writer together behind three calls: [`init`], [`add_frame`]
//! and [`finish`]. It is a one-shot state machine:
//!
//! ```text
//! Created --init--> Initialized --add_frame--> Encoding --finish--> Finished
//!     \                  \                        \
//!      `------------------`------- any error ------`---> Failed
//! ```
//!
//! Every native resource is owned by the pipeline and released exactly once:
//! at the end of a successful [`finish`], at the first failure, on
//! [`close`], or when the pipeline is dropped, whichever comes first.
//!
//! [`init`]: EncodePipeline::init
//! [`add_frame`]: EncodePipeline::add_frame
//! [`finish`]: EncodePipeline::finish
//! [`close`]: EncodePipeline::close
//!
//! # Example
//!
//! ```no_run
//! use framepipe::{Dimensions, EncodePipeline, EncodeError};
//!
//! let size = Dimensions::new(640, 480);
//! let mut pipeline = EncodePipeline::new("drawing.mp4", size, size, 60);
//! pipeline.init()?;
//!
//! let mut canvas = vec![0u8; 640 * 480 * 4];
//! for step in 0..120u32 {
//!     canvas.fill((step % 256) as u8);
//!     pipeline.add_frame(&canvas)?;
//! }
//! pipeline.finish()?;
//! # Ok::<(), EncodeError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::Packet;
use image::DynamicImage;
use image::imageops::FilterType;

use crate::backend;
use crate::codec::CodecSession;
use crate::configuration::{Dimensions, PipelineOptions, SourcePixelFormat};
use crate::container::ContainerWriter;
use crate::converter::PixelConverter;
use crate::error::EncodeError;
use crate::frame_buffer::FrameBuffer;

/// Lifecycle state of an [`EncodePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Constructed; nothing allocated yet.
    Created,
    /// All resources allocated and the container header written.
    Initialized,
    /// At least one frame has been submitted.
    Encoding,
    /// Flushed, trailer written, resources released.
    Finished,
    /// A failure (or [`EncodePipeline::close`]) released everything. The
    /// pipeline cannot be used again.
    Failed,
}

impl PipelineState {
    /// Returns `true` for `Finished` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Finished | PipelineState::Failed)
    }
}

// Fields drop in declaration order: sink and muxer first, then the codec,
// then the buffers and the scaler.
struct PipelineResources {
    container: ContainerWriter,
    codec: CodecSession,
    frame: FrameBuffer,
    packet: Packet,
    converter: PixelConverter,
}

/// A synchronous, single-stream encoder from raw frames to a video file.
///
/// Not safe for concurrent use; one pipeline per thread. Independent
/// pipelines writing to different outputs share nothing.
pub struct EncodePipeline {
    output: PathBuf,
    source: Dimensions,
    destination: Dimensions,
    frame_rate: u32,
    options: PipelineOptions,
    frame_count: u64,
    state: PipelineState,
    resources: Option<PipelineResources>,
}

// SAFETY: every FFmpeg context the pipeline holds is exclusively owned by it
// and never shared; moving the whole pipeline to another thread moves all of
// them together.
unsafe impl Send for EncodePipeline {}

impl EncodePipeline {
    /// Create a pipeline with default [`PipelineOptions`] (BGRA input,
    /// H.264 `veryfast`/`animation`/CRF 22, bicubic scaling).
    ///
    /// Nothing is allocated or opened until [`init`](Self::init).
    pub fn new<P: AsRef<Path>>(
        output: P,
        source: impl Into<Dimensions>,
        destination: impl Into<Dimensions>,
        frame_rate: u32,
    ) -> Self {
        Self::with_options(output, source, destination, frame_rate, PipelineOptions::default())
    }

    /// Create a pipeline with explicit options.
    pub fn with_options<P: AsRef<Path>>(
        output: P,
        source: impl Into<Dimensions>,
        destination: impl Into<Dimensions>,
        frame_rate: u32,
        options: PipelineOptions,
    ) -> Self {
        Self {
            output: output.as_ref().to_path_buf(),
            source: source.into(),
            destination: destination.into(),
            frame_rate,
            options,
            frame_count: 0,
            state: PipelineState::Created,
            resources: None,
        }
    }

    /// Allocate every resource and write the container header.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::InvalidState`] if called more than once.
    /// - [`EncodeError::InvalidArgument`] for empty dimensions or a zero
    ///   frame rate.
    /// - [`EncodeError::ResourceAllocation`] if the output cannot be opened
    ///   or a buffer cannot be allocated.
    /// - [`EncodeError::CodecConfiguration`] if the codec is missing or
    ///   refuses the configuration.
    /// - [`EncodeError::IoWrite`] if the header cannot be written.
    ///
    /// On error, everything allocated so far has been released and the
    /// pipeline is [`Failed`](PipelineState::Failed).
    pub fn init(&mut self) -> Result<(), EncodeError> {
        if self.state != PipelineState::Created {
            return Err(EncodeError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }

        log::info!(
            "Initializing pipeline for {} ({}x{} -> {}x{} @ {} fps, {:?})",
            self.output.display(),
            self.source.width,
            self.source.height,
            self.destination.width,
            self.destination.height,
            self.frame_rate,
            self.options.profile.codec,
        );

        match self.acquire() {
            Ok(resources) => {
                self.resources = Some(resources);
                self.state = PipelineState::Initialized;
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    fn acquire(&self) -> Result<PipelineResources, EncodeError> {
        if self.source.is_empty() || self.destination.is_empty() {
            return Err(EncodeError::InvalidArgument(format!(
                "dimensions must be non-zero (source {}x{}, destination {}x{})",
                self.source.width,
                self.source.height,
                self.destination.width,
                self.destination.height,
            )));
        }
        if self.frame_rate == 0 || self.frame_rate > i32::MAX as u32 {
            return Err(EncodeError::InvalidArgument(format!(
                "frame rate must be between 1 and {}, got {}",
                i32::MAX,
                self.frame_rate
            )));
        }

        backend::initialize()?;

        // Anything acquired below is dropped again if a later step fails.
        let mut container = ContainerWriter::open(&self.output)?;
        let profile = &self.options.profile;
        let codec = CodecSession::open(
            profile,
            self.destination,
            self.frame_rate,
            container.requires_global_header(),
        )?;
        container.add_stream(&codec)?;
        container.write_header()?;

        let frame = FrameBuffer::allocate(profile.pixel_format, self.destination)?;
        let packet = Packet::empty();
        let converter = PixelConverter::new(
            self.options.source_format,
            self.source,
            profile.pixel_format,
            self.destination,
            self.options.scaling,
        )?;

        Ok(PipelineResources {
            container,
            codec,
            frame,
            packet,
            converter,
        })
    }

    /// Convert and encode one raw source picture.
    ///
    /// `buffer` holds a packed picture in the configured
    /// [`SourcePixelFormat`] at source size; extra trailing bytes are
    /// ignored. The frame is stamped with the current frame count, which is
    /// then incremented by one. Zero or more packets may be written,
    /// depending on how much the codec buffers.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::InvalidState`] unless the pipeline is initialized.
    /// - [`EncodeError::InvalidArgument`] if `buffer` is too short. Nothing
    ///   is converted or written.
    /// - [`EncodeError::ResourceBusy`] if the frame storage is not writable.
    /// - [`EncodeError::Encoding`] or [`EncodeError::IoWrite`] from the
    ///   drain loop.
    ///
    /// Any error other than `InvalidState` releases all resources and
    /// leaves the pipeline [`Failed`](PipelineState::Failed).
    pub fn add_frame(&mut self, buffer: &[u8]) -> Result<(), EncodeError> {
        self.ensure_open("add a frame to")?;

        match self.encode_frame(buffer) {
            Ok(written) => {
                log::trace!("Frame {} submitted, {written} packet(s) written", self.frame_count);
                self.frame_count += 1;
                self.state = PipelineState::Encoding;
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    fn encode_frame(&mut self, buffer: &[u8]) -> Result<u64, EncodeError> {
        let pts = self.frame_count as i64;
        let PipelineResources {
            container,
            codec,
            frame,
            packet,
            converter,
        } = self.resources.as_mut().ok_or(EncodeError::InvalidState {
            operation: "add a frame to",
            state: self.state,
        })?;

        converter.check_len(buffer.len())?;
        frame.make_writable()?;
        converter.convert(buffer, frame)?;
        frame.stamp(pts);
        codec.submit(Some(&*frame), packet, container)
    }

    /// Encode an [`image`] picture.
    ///
    /// The image is resized to the source dimensions if needed (Lanczos3),
    /// laid out in the configured [`SourcePixelFormat`], and passed to
    /// [`add_frame`](Self::add_frame).
    ///
    /// # Errors
    ///
    /// Same as [`add_frame`](Self::add_frame).
    pub fn add_image(&mut self, image: &DynamicImage) -> Result<(), EncodeError> {
        self.ensure_open("add a frame to")?;
        let pixels = image_to_source_layout(image, self.source, self.options.source_format);
        self.add_frame(&pixels)
    }

    /// Drain the codec, write the trailer, and release everything.
    ///
    /// Valid after [`init`](Self::init) even if no frame was added; the
    /// result is a playable file with zero frames.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::InvalidState`] unless the pipeline is initialized.
    /// - [`EncodeError::Encoding`] or [`EncodeError::IoWrite`] while
    ///   flushing.
    /// - [`EncodeError::IoWrite`] if the trailer cannot be written.
    ///
    /// Resources are released whether or not this succeeds.
    pub fn finish(&mut self) -> Result<(), EncodeError> {
        self.ensure_open("finish")?;

        match self.flush() {
            Ok(written) => {
                self.release();
                self.state = PipelineState::Finished;
                log::info!(
                    "Finished {} ({} frame(s), {written} packet(s) flushed)",
                    self.output.display(),
                    self.frame_count,
                );
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    fn flush(&mut self) -> Result<u64, EncodeError> {
        let PipelineResources {
            container,
            codec,
            packet,
            ..
        } = self.resources.as_mut().ok_or(EncodeError::InvalidState {
            operation: "finish",
            state: self.state,
        })?;

        let written = codec.submit(None, packet, container)?;
        container.write_trailer()?;
        Ok(written)
    }

    /// Abandon the encode and release every resource.
    ///
    /// The output is left without a trailer. Calling this more than once,
    /// or after [`finish`](Self::finish), is a no-op.
    pub fn close(&mut self) {
        self.release();
        if !self.state.is_terminal() {
            log::debug!("Pipeline for {} closed before finishing", self.output.display());
            self.state = PipelineState::Failed;
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), EncodeError> {
        match self.state {
            PipelineState::Initialized | PipelineState::Encoding => Ok(()),
            state => Err(EncodeError::InvalidState { operation, state }),
        }
    }

    fn fail(&mut self, error: EncodeError) -> EncodeError {
        log::warn!(
            "Pipeline for {} failed, releasing resources: {error}",
            self.output.display()
        );
        self.release();
        self.state = PipelineState::Failed;
        error
    }

    fn release(&mut self) {
        if let Some(resources) = self.resources.take() {
            log::debug!("Releasing resources for {}", self.output.display());
            drop(resources);
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Number of frames successfully submitted so far. Also the timestamp
    /// the next frame will receive.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Playback duration of the frames submitted so far.
    pub fn duration(&self) -> Duration {
        if self.frame_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count as f64 / self.frame_rate as f64)
    }

    /// Output path.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Size of the raw input pictures.
    pub fn source(&self) -> Dimensions {
        self.source
    }

    /// Size of the encoded pictures.
    pub fn destination(&self) -> Dimensions {
        self.destination
    }

    /// Frames per second.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Options this pipeline was built with.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Minimum length of a buffer passed to [`add_frame`](Self::add_frame).
    pub fn frame_len(&self) -> usize {
        self.options.source_format.frame_len(self.source)
    }
}

impl Drop for EncodePipeline {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for EncodePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodePipeline")
            .field("output", &self.output)
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("frame_rate", &self.frame_rate)
            .field("frame_count", &self.frame_count)
            .field("state", &self.state)
            .field("has_resources", &self.resources.is_some())
            .finish()
    }
}

/// Lay out `image` as a packed buffer in `format` at `size`.
fn image_to_source_layout(
    image: &DynamicImage,
    size: Dimensions,
    format: SourcePixelFormat,
) -> Vec<u8> {
    let resized;
    let image = if image.width() != size.width || image.height() != size.height {
        resized = image.resize_exact(size.width, size.height, FilterType::Lanczos3);
        &resized
    } else {
        image
    };

    match format {
        SourcePixelFormat::Rgba => image.to_rgba8().into_raw(),
        SourcePixelFormat::Rgb24 => image.to_rgb8().into_raw(),
        SourcePixelFormat::Bgra => {
            let mut pixels = image.to_rgba8().into_raw();
            pixels.chunks_exact_mut(4).for_each(|pixel| pixel.swap(0, 2));
            pixels
        }
        SourcePixelFormat::Bgr24 => {
            let mut pixels = image.to_rgb8().into_raw();
            pixels.chunks_exact_mut(3).for_each(|pixel| pixel.swap(0, 2));
            pixels
        }
    }
}
