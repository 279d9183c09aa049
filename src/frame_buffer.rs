//! The encode-side picture.
//!
//! [`FrameBuffer`] owns the single destination-format frame a pipeline
//! converts into and hands to the encoder. It is allocated once, reused for
//! every submission, and freed when its owner is dropped.

use ffmpeg_next::Error as FfmpegError;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame::Video as VideoFrame;

use crate::configuration::Dimensions;
use crate::error::EncodeError;

/// Allocate a frame with its own pixel storage.
///
/// `frame::Video::new` ignores allocation failures, so the buffer is
/// requested directly and its status checked.
pub(crate) fn allocate_frame(format: Pixel, size: Dimensions) -> Result<VideoFrame, EncodeError> {
    let mut frame = VideoFrame::empty();
    frame.set_format(format);
    frame.set_width(size.width);
    frame.set_height(size.height);

    let status = unsafe { ffmpeg_sys_next::av_frame_get_buffer(frame.as_mut_ptr(), 0) };
    if status < 0 {
        return Err(EncodeError::allocation(
            "could not allocate the video frame data",
            FfmpegError::from(status),
        ));
    }
    Ok(frame)
}

/// The single mutable destination picture of a pipeline.
pub(crate) struct FrameBuffer {
    frame: VideoFrame,
}

impl FrameBuffer {
    /// Allocate storage for pictures of the given format and size.
    pub(crate) fn allocate(format: Pixel, size: Dimensions) -> Result<Self, EncodeError> {
        log::debug!("Allocating {format:?} frame buffer ({}x{})", size.width, size.height);
        Ok(Self {
            frame: allocate_frame(format, size)?,
        })
    }

    /// Ensure no one else holds a reference to the pixel storage.
    ///
    /// Must succeed before every write. If the encoder still references the
    /// storage, FFmpeg copies it out to fresh buffers; failing to do so is
    /// reported as [`EncodeError::ResourceBusy`].
    pub(crate) fn make_writable(&mut self) -> Result<(), EncodeError> {
        let status = unsafe { ffmpeg_sys_next::av_frame_make_writable(self.frame.as_mut_ptr()) };
        if status < 0 {
            return Err(EncodeError::ResourceBusy(format!(
                "could not make the encode frame writable: {}",
                FfmpegError::from(status)
            )));
        }
        Ok(())
    }

    /// Set the presentation timestamp of the next submission.
    pub(crate) fn stamp(&mut self, pts: i64) {
        self.frame.set_pts(Some(pts));
    }

    pub(crate) fn frame(&self) -> &VideoFrame {
        &self.frame
    }

    pub(crate) fn frame_mut(&mut self) -> &mut VideoFrame {
        &mut self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_requested_geometry() {
        let buffer = FrameBuffer::allocate(Pixel::YUV420P, Dimensions::new(64, 48)).unwrap();
        let frame = buffer.frame();
        assert_eq!(frame.format(), Pixel::YUV420P);
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.planes(), 3);
        assert!(frame.stride(0) >= 64);
    }

    #[test]
    fn writable_and_stamped() {
        let mut buffer = FrameBuffer::allocate(Pixel::YUV420P, Dimensions::new(16, 16)).unwrap();
        buffer.make_writable().unwrap();
        buffer.stamp(7);
        assert_eq!(buffer.frame().pts(), Some(7));
        buffer.make_writable().unwrap();
        buffer.stamp(8);
        assert_eq!(buffer.frame().pts(), Some(8));
    }

    #[test]
    fn shared_storage_is_copied_before_write() {
        let mut buffer = FrameBuffer::allocate(Pixel::GRAY8, Dimensions::new(8, 8)).unwrap();
        buffer.frame_mut().data_mut(0).fill(10);

        // A second reference to the same storage, as an encoder holding on
        // to the frame would have.
        let mut shared = unsafe { ffmpeg_sys_next::av_frame_clone(buffer.frame().as_ptr()) };
        assert!(!shared.is_null());
        let shared_plane = unsafe { (*shared).data[0] };
        assert_eq!(shared_plane, unsafe { (*buffer.frame().as_ptr()).data[0] });

        buffer.make_writable().unwrap();
        let own_plane = unsafe { (*buffer.frame().as_ptr()).data[0] };
        assert_ne!(shared_plane, own_plane);
        assert_eq!(buffer.frame().data(0)[0], 10);

        unsafe { ffmpeg_sys_next::av_frame_free(&mut shared) };
    }
}
