//! Error types for the `framepipe` crate.
//!
//! This module defines [`EncodeError`], the unified error type returned by
//! every fallible pipeline operation. Each variant corresponds to one class
//! of failure and carries a message naming the stage that failed, so callers
//! can report it without additional logging.

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

use crate::pipeline::PipelineState;

/// The unified error type for all `framepipe` operations.
///
/// A pipeline reports exactly one error per failed call: the first failure it
/// encountered. By the time the caller sees it, every native resource owned
/// by the pipeline has already been released.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// The output sink, container context, codec context, or a frame/packet
    /// buffer could not be allocated.
    #[error("Resource allocation failed: {0}")]
    ResourceAllocation(String),

    /// The codec was not found, could not be opened, or its parameters could
    /// not be copied to the container stream.
    #[error("Codec configuration failed: {0}")]
    CodecConfiguration(String),

    /// A caller-supplied argument was rejected (e.g. an undersized buffer).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The frame storage is still referenced elsewhere and cannot be written.
    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    /// The codec backend rejected a frame or failed while producing packets.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Writing the container header, a packet, or the trailer failed.
    #[error("Write failed: {0}")]
    IoWrite(String),

    /// The operation is not allowed in the pipeline's current state.
    #[error("Cannot {operation} a pipeline in state {state:?}")]
    InvalidState {
        /// The operation that was attempted (`"initialize"`, `"add a frame to"`, `"finish"`).
        operation: &'static str,
        /// The state the pipeline was in.
        state: PipelineState,
    },
}

impl EncodeError {
    /// Wrap an FFmpeg error as an allocation failure for the given stage.
    pub(crate) fn allocation(stage: &str, error: FfmpegError) -> Self {
        EncodeError::ResourceAllocation(format!("{stage}: {error}"))
    }

    /// Wrap an FFmpeg error as a codec configuration failure for the given stage.
    pub(crate) fn configuration(stage: &str, error: FfmpegError) -> Self {
        EncodeError::CodecConfiguration(format!("{stage}: {error}"))
    }

    /// Wrap an FFmpeg error as a write failure for the given stage.
    pub(crate) fn write(stage: &str, error: FfmpegError) -> Self {
        EncodeError::IoWrite(format!("{stage}: {error}"))
    }

    /// Wrap an FFmpeg error as an encoding failure for the given stage.
    pub(crate) fn encoding(stage: &str, error: FfmpegError) -> Self {
        EncodeError::Encoding(format!("{stage}: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_stage() {
        let error = EncodeError::encoding("error sending frame for encoding", FfmpegError::Eof);
        let message = error.to_string();
        assert!(message.starts_with("Encoding failed: error sending frame for encoding"));

        let error = EncodeError::write("cannot write trailer", FfmpegError::Eof);
        assert!(error.to_string().contains("cannot write trailer"));
    }

    #[test]
    fn invalid_state_mentions_operation_and_state() {
        let error = EncodeError::InvalidState {
            operation: "finish",
            state: PipelineState::Finished,
        };
        assert_eq!(
            error.to_string(),
            "Cannot finish a pipeline in state Finished"
        );
    }
}
