//! Container writer.
//!
//! [`ContainerWriter`] owns the output sink and muxer context for a single
//! video stream. The container format is inferred from the output path's
//! extension.

use std::path::{Path, PathBuf};

use ffmpeg_next::Error as FfmpegError;
use ffmpeg_next::format::Flags as FormatFlags;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::{Packet, Rational};

use crate::codec::{CodecSession, PacketEngine, PacketSink};
use crate::error::EncodeError;

pub(crate) struct ContainerWriter {
    output: Output,
    path: PathBuf,
    stream_index: usize,
    stream_time_base: Rational,
}

impl ContainerWriter {
    /// Open the output file for writing and allocate a muxer for it.
    pub(crate) fn open(path: &Path) -> Result<Self, EncodeError> {
        log::debug!("Opening output container {}", path.display());
        let output = ffmpeg_next::format::output(path).map_err(|e| {
            EncodeError::ResourceAllocation(format!(
                "could not open output {}: {e}",
                path.display()
            ))
        })?;

        Ok(Self {
            output,
            path: path.to_path_buf(),
            stream_index: 0,
            stream_time_base: Rational::new(0, 1),
        })
    }

    /// Whether the muxer wants codec headers out of band.
    pub(crate) fn requires_global_header(&self) -> bool {
        self.output.format().flags().contains(FormatFlags::GLOBAL_HEADER)
    }

    /// Create the video stream and copy the opened encoder's parameters
    /// into it.
    pub(crate) fn add_stream(&mut self, session: &CodecSession) -> Result<(), EncodeError> {
        let time_base = session.time_base();
        let mut stream = self
            .output
            .add_stream(session.codec())
            .map_err(|e| EncodeError::allocation("could not create container stream", e))?;
        stream.set_time_base(time_base);

        let status = unsafe {
            ffmpeg_sys_next::avcodec_parameters_from_context(
                (*stream.as_mut_ptr()).codecpar,
                session.encoder().as_ptr(),
            )
        };
        if status < 0 {
            return Err(EncodeError::configuration(
                "could not copy codec parameters to the stream",
                FfmpegError::from(status),
            ));
        }

        self.stream_index = stream.index();
        self.stream_time_base = time_base;
        Ok(())
    }

    /// Write the container header.
    ///
    /// The muxer may pick its own stream time base here; packets written
    /// afterwards are rescaled to it.
    pub(crate) fn write_header(&mut self) -> Result<(), EncodeError> {
        self.output
            .write_header()
            .map_err(|e| EncodeError::write("could not write container header", e))?;

        if let Some(stream) = self.output.stream(self.stream_index) {
            self.stream_time_base = stream.time_base();
        }
        log::debug!(
            "Wrote header for {} (stream time base {})",
            self.path.display(),
            self.stream_time_base,
        );
        Ok(())
    }

    /// Finalize the container index and metadata.
    pub(crate) fn write_trailer(&mut self) -> Result<(), EncodeError> {
        self.output
            .write_trailer()
            .map_err(|e| EncodeError::write("could not write container trailer", e))
    }
}

impl PacketSink for ContainerWriter {
    fn stream_index(&self) -> usize {
        self.stream_index
    }

    fn stream_time_base(&self) -> Rational {
        self.stream_time_base
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<(), EncodeError> {
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| EncodeError::write("error during writing frame", e))
    }
}
