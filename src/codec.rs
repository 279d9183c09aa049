//! Codec session and the send/receive drain loop.
//!
//! A [`CodecSession`] owns an opened encoder. Every submission, including
//! the end-of-stream flush, goes through [`drain`]: the frame is handed to
//! the engine, then packets are pulled until the engine reports it has
//! nothing more to give. Each packet is rescaled to the container stream's
//! time base and forwarded to a [`PacketSink`].
//!
//! The loop is written against the [`PacketEngine`] and [`PacketSink`]
//! traits rather than FFmpeg types directly so that its termination and
//! error rules can be checked with scripted engines.

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::encoder::Video as VideoEncoder;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{Codec, Error as FfmpegError, Packet, Rational};

use crate::configuration::{Dimensions, EncoderProfile};
use crate::error::EncodeError;
use crate::frame_buffer::FrameBuffer;

/// Result of one attempt to pull a packet out of the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiveOutcome {
    /// A packet was written into the packet buffer.
    Produced,
    /// Nothing more right now ("try again") or ever (end of stream).
    Drained,
    /// A real encoder failure.
    Failed(FfmpegError),
}

impl ReceiveOutcome {
    /// Classify the raw result of `avcodec_receive_packet`.
    pub(crate) fn from_result(result: Result<(), FfmpegError>) -> Self {
        match result {
            Ok(()) => ReceiveOutcome::Produced,
            Err(FfmpegError::Eof) => ReceiveOutcome::Drained,
            Err(FfmpegError::Other { errno }) if errno == EAGAIN => ReceiveOutcome::Drained,
            Err(error) => ReceiveOutcome::Failed(error),
        }
    }
}

/// Something that turns frames into packets.
pub(crate) trait PacketEngine {
    /// Submit a frame, or `None` to signal end of stream.
    fn send(&mut self, frame: Option<&VideoFrame>) -> Result<(), FfmpegError>;

    /// Pull the next completed packet into `packet`.
    fn receive(&mut self, packet: &mut Packet) -> ReceiveOutcome;

    /// Time base of the timestamps on produced packets.
    fn time_base(&self) -> Rational;
}

/// Where drained packets go.
pub(crate) trait PacketSink {
    /// Index of the stream packets are attributed to.
    fn stream_index(&self) -> usize;

    /// Time base packets must be expressed in when written.
    fn stream_time_base(&self) -> Rational;

    /// Append one packet. Failures are [`EncodeError::IoWrite`].
    fn write_packet(&mut self, packet: &Packet) -> Result<(), EncodeError>;
}

/// Clear a packet's payload, keeping the packet itself for reuse.
fn clear_packet(packet: &mut Packet) {
    unsafe { ffmpeg_sys_next::av_packet_unref(packet.as_mut_ptr()) };
}

/// Submit `frame` (or end of stream) and forward every packet the engine
/// is ready to emit. Returns the number of packets written.
pub(crate) fn drain<E, S>(
    engine: &mut E,
    frame: Option<&VideoFrame>,
    packet: &mut Packet,
    sink: &mut S,
) -> Result<u64, EncodeError>
where
    E: PacketEngine + ?Sized,
    S: PacketSink + ?Sized,
{
    engine
        .send(frame)
        .map_err(|e| EncodeError::encoding("error sending frame for encoding", e))?;

    let mut written = 0;
    loop {
        match engine.receive(packet) {
            ReceiveOutcome::Drained => return Ok(written),
            ReceiveOutcome::Failed(error) => {
                return Err(EncodeError::encoding("error during encoding", error));
            }
            ReceiveOutcome::Produced => {
                packet.set_stream(sink.stream_index());
                packet.rescale_ts(engine.time_base(), sink.stream_time_base());
                log::trace!("Writing packet pts={:?} size={}", packet.pts(), packet.size());
                let result = sink.write_packet(packet);
                clear_packet(packet);
                result?;
                written += 1;
            }
        }
    }
}

/// An opened encoder with its configuration.
pub(crate) struct CodecSession {
    encoder: VideoEncoder,
    codec: Codec,
    time_base: Rational,
}

impl CodecSession {
    /// Locate, configure and open the encoder described by `profile`.
    ///
    /// The codec time base is `1/frame_rate`. `global_header` must be set
    /// when the container stores codec headers out of band.
    pub(crate) fn open(
        profile: &EncoderProfile,
        size: Dimensions,
        frame_rate: u32,
        global_header: bool,
    ) -> Result<Self, EncodeError> {
        let codec_id = profile.codec.to_codec_id();
        let codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            EncodeError::CodecConfiguration(format!("necessary encoder {codec_id:?} not found"))
        })?;

        let mut encoder = CodecContext::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| EncodeError::allocation("could not allocate the encoder context", e))?;

        let time_base = Rational::new(1, frame_rate as i32);
        encoder.set_width(size.width);
        encoder.set_height(size.height);
        encoder.set_format(profile.pixel_format);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(Rational::new(frame_rate as i32, 1)));
        if let Some(bitrate) = profile.bitrate {
            encoder.set_bit_rate(bitrate);
        }
        if global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = encoder
            .open_as_with(codec, profile.to_dictionary())
            .map_err(|e| EncodeError::configuration("could not open codec", e))?;

        log::debug!(
            "Opened {} encoder ({}x{}, time base {time_base}, {:?})",
            codec.name(),
            size.width,
            size.height,
            profile,
        );

        Ok(Self {
            encoder,
            codec,
            time_base,
        })
    }

    pub(crate) fn codec(&self) -> Codec {
        self.codec
    }

    pub(crate) fn encoder(&self) -> &VideoEncoder {
        &self.encoder
    }

    /// Encode one frame, or flush with `None`, writing packets to `sink`.
    pub(crate) fn submit<S: PacketSink + ?Sized>(
        &mut self,
        frame: Option<&FrameBuffer>,
        packet: &mut Packet,
        sink: &mut S,
    ) -> Result<u64, EncodeError> {
        drain(self, frame.map(FrameBuffer::frame), packet, sink)
    }
}

impl PacketEngine for CodecSession {
    fn send(&mut self, frame: Option<&VideoFrame>) -> Result<(), FfmpegError> {
        match frame {
            Some(frame) => self.encoder.send_frame(frame),
            None => self.encoder.send_eof(),
        }
    }

    fn receive(&mut self, packet: &mut Packet) -> ReceiveOutcome {
        ReceiveOutcome::from_result(self.encoder.receive_packet(packet))
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }
}
