//! End-to-end pipeline tests.
//!
//! Every test writes into a temporary directory and reads the result back
//! with FFmpeg's demuxer. MPEG-4 Part 2 is used wherever exact packet counts
//! matter: it is built into libavcodec and emits one packet per frame.

use std::path::Path;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::media::Type;
use framepipe::{
    Dimensions, EncodeError, EncodePipeline, EncoderProfile, PipelineOptions, PipelineState,
    SourcePixelFormat, VideoCodec,
};

fn mpeg4() -> PipelineOptions {
    PipelineOptions::new().with_profile(EncoderProfile::for_codec(VideoCodec::Mpeg4))
}

/// What the demuxer and decoder see in an output file.
struct Inspection {
    width: u32,
    height: u32,
    packet_count: usize,
    frame_indices: Vec<i64>,
    duration_seconds: f64,
    decoded_luma: Vec<(u8, u8)>,
}

/// Darkest and brightest visible Y sample of a decoded frame.
fn luma_range(frame: &ffmpeg_next::frame::Video) -> (u8, u8) {
    let stride = frame.stride(0);
    let width = frame.width() as usize;
    let plane = frame.data(0);
    (0..frame.height() as usize)
        .flat_map(|row| &plane[row * stride..row * stride + width])
        .fold((u8::MAX, u8::MIN), |(low, high), &y| (low.min(y), high.max(y)))
}

/// Demux and decode `path`, mapping packet timestamps back to frame indices
/// at `fps`. `decoded_luma` holds the luma range of each decoded frame.
fn inspect(path: &Path, fps: i64) -> Inspection {
    let mut input = ffmpeg_next::format::input(path).expect("open output for reading");

    let (index, time_base, parameters) = {
        let stream = input
            .streams()
            .best(Type::Video)
            .expect("output should have a video stream");
        (stream.index(), stream.time_base(), stream.parameters())
    };
    let mut decoder = ffmpeg_next::codec::context::Context::from_parameters(parameters)
        .expect("decoder context")
        .decoder()
        .video()
        .expect("video decoder");
    let (width, height) = (decoder.width(), decoder.height());

    let mut packet_count = 0;
    let mut frame_indices = Vec::new();
    let mut decoded_luma = Vec::new();
    let mut frame = ffmpeg_next::frame::Video::empty();

    for (stream, packet) in input.packets() {
        if stream.index() != index {
            continue;
        }
        packet_count += 1;
        if let Some(pts) = packet.pts() {
            let numerator = pts * time_base.numerator() as i64 * fps;
            let denominator = time_base.denominator() as i64;
            frame_indices.push((numerator as f64 / denominator as f64).round() as i64);
        }
        decoder.send_packet(&packet).expect("send packet to decoder");
        while decoder.receive_frame(&mut frame).is_ok() {
            decoded_luma.push(luma_range(&frame));
        }
    }
    decoder.send_eof().expect("flush decoder");
    while decoder.receive_frame(&mut frame).is_ok() {
        decoded_luma.push(luma_range(&frame));
    }

    frame_indices.sort_unstable();
    // Container duration is in microseconds.
    let duration_seconds = input.duration() as f64 / 1_000_000.0;

    Inspection {
        width,
        height,
        packet_count,
        frame_indices,
        duration_seconds,
        decoded_luma,
    }
}

fn encode_black(path: &Path, size: Dimensions, fps: u32, frames: u64) -> EncodePipeline {
    let mut pipeline = EncodePipeline::with_options(path, size, size, fps, mpeg4());
    pipeline.init().expect("init");
    let buffer = vec![0u8; pipeline.frame_len()];
    for _ in 0..frames {
        pipeline.add_frame(&buffer).expect("add frame");
    }
    pipeline.finish().expect("finish");
    pipeline
}

#[test]
fn black_frames_round_trip() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("black.mp4");

    let pipeline = encode_black(&output, Dimensions::new(64, 64), 30, 10);
    assert_eq!(pipeline.state(), PipelineState::Finished);
    assert_eq!(pipeline.frame_count(), 10);

    let inspection = inspect(&output, 30);
    assert_eq!((inspection.width, inspection.height), (64, 64));
    assert_eq!(inspection.packet_count, 10);
    assert_eq!(inspection.decoded_luma.len(), 10);
    assert!(
        inspection.decoded_luma.iter().all(|&(low, high)| high <= 20 && high - low <= 4),
        "black input should decode to black: {:?}",
        inspection.decoded_luma
    );
    assert!(
        (0.25..=0.45).contains(&inspection.duration_seconds),
        "10 frames at 30 fps should last about a third of a second, got {}",
        inspection.duration_seconds
    );
}

#[test]
fn timestamps_are_contiguous_from_zero() {
    for frames in [1u64, 5, 17] {
        let directory = tempfile::tempdir().unwrap();
        let output = directory.path().join(format!("count_{frames}.mp4"));

        encode_black(&output, Dimensions::new(32, 32), 25, frames);

        let inspection = inspect(&output, 25);
        assert_eq!(inspection.packet_count as u64, frames);
        let expected: Vec<i64> = (0..frames as i64).collect();
        assert_eq!(inspection.frame_indices, expected, "{frames} frame(s)");
    }
}

#[test]
fn finish_without_frames_gives_valid_file() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("empty.mp4");

    let pipeline = encode_black(&output, Dimensions::new(32, 32), 30, 0);
    assert_eq!(pipeline.state(), PipelineState::Finished);
    assert_eq!(pipeline.frame_count(), 0);

    let inspection = inspect(&output, 30);
    assert_eq!(inspection.packet_count, 0);
}

#[test]
fn downscale_sets_destination_size() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("downscaled.mkv");

    let mut pipeline = EncodePipeline::with_options(&output, (128, 96), (64, 48), 30, mpeg4());
    pipeline.init().unwrap();
    let buffer = vec![255u8; 128 * 96 * 4];
    for _ in 0..3 {
        pipeline.add_frame(&buffer).unwrap();
    }
    pipeline.finish().unwrap();

    let inspection = inspect(&output, 30);
    assert_eq!((inspection.width, inspection.height), (64, 48));
    assert_eq!(inspection.packet_count, 3);
    assert!(
        inspection.decoded_luma.iter().all(|&(low, _)| low >= 220),
        "white input should decode to white: {:?}",
        inspection.decoded_luma
    );
}

#[test]
fn rgb24_source_is_accepted() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("rgb.mp4");

    let options = mpeg4().with_source_format(SourcePixelFormat::Rgb24);
    let mut pipeline = EncodePipeline::with_options(&output, (48, 32), (48, 32), 24, options);
    pipeline.init().unwrap();
    assert_eq!(pipeline.frame_len(), 48 * 32 * 3);

    pipeline.add_frame(&vec![0u8; 48 * 32 * 3]).unwrap();
    pipeline.add_frame(&vec![0u8; 48 * 32 * 3]).unwrap();
    pipeline.finish().unwrap();

    assert_eq!(inspect(&output, 24).packet_count, 2);
}

#[test]
fn oversized_buffers_are_accepted() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("oversized.mp4");

    let mut pipeline = EncodePipeline::with_options(&output, (16, 16), (16, 16), 30, mpeg4());
    pipeline.init().unwrap();
    pipeline.add_frame(&vec![0u8; 16 * 16 * 4 + 100]).unwrap();
    pipeline.finish().unwrap();

    assert_eq!(inspect(&output, 30).packet_count, 1);
}

#[test]
fn h264_default_profile() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("h264.mp4");

    let size = Dimensions::new(64, 64);
    let mut pipeline = EncodePipeline::new(&output, size, size, 30);
    let result = pipeline.init();

    // Skip if the H264 encoder is not available on this platform.
    if let Err(EncodeError::CodecConfiguration(ref message)) = result {
        eprintln!("Skipping: H264 encoder not available ({message})");
        return;
    }
    result.expect("init h264");

    let buffer = vec![0u8; pipeline.frame_len()];
    for _ in 0..10 {
        pipeline.add_frame(&buffer).unwrap();
    }
    pipeline.finish().unwrap();

    // x264 may hold frames back; all of them must come out on finish.
    let inspection = inspect(&output, 30);
    assert_eq!(inspection.packet_count, 10);
    assert_eq!(inspection.frame_indices, (0..10).collect::<Vec<i64>>());
    assert_eq!(inspection.decoded_luma.len(), 10);
}

#[test]
fn yuv444_pixel_format() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("yuv444.mkv");

    let profile = EncoderProfile::default().pixel_format(Pixel::YUV444P);
    let options = PipelineOptions::new().with_profile(profile);
    let mut pipeline = EncodePipeline::with_options(&output, (32, 32), (32, 32), 30, options);
    if let Err(EncodeError::CodecConfiguration(message)) = pipeline.init() {
        eprintln!("Skipping: H264 encoder not available ({message})");
        return;
    }
    assert_eq!(pipeline.state(), PipelineState::Initialized);

    pipeline.add_frame(&vec![0u8; 32 * 32 * 4]).unwrap();
    pipeline.finish().unwrap();
    assert_eq!(inspect(&output, 30).packet_count, 1);
}

#[test]
fn pipelines_on_separate_threads() {
    let directory = tempfile::tempdir().unwrap();

    let handles: Vec<_> = (0..2)
        .map(|worker| {
            let output = directory.path().join(format!("worker_{worker}.mp4"));
            let mut pipeline =
                EncodePipeline::with_options(&output, (32, 32), (32, 32), 30, mpeg4());
            std::thread::spawn(move || {
                pipeline.init().unwrap();
                let buffer = vec![(worker * 100) as u8; pipeline.frame_len()];
                for _ in 0..(4 + worker) {
                    pipeline.add_frame(&buffer).unwrap();
                }
                pipeline.finish().unwrap();
                (output, pipeline.frame_count())
            })
        })
        .collect();

    for handle in handles {
        let (output, frames) = handle.join().unwrap();
        assert_eq!(inspect(&output, 30).packet_count as u64, frames);
    }
}

#[test]
fn accessors_report_configuration() {
    let directory = tempfile::tempdir().unwrap();
    let output = directory.path().join("accessors.mp4");

    let pipeline = EncodePipeline::with_options(&output, (40, 30), (20, 16), 12, mpeg4());
    assert_eq!(pipeline.output_path(), output.as_path());
    assert_eq!(pipeline.source(), Dimensions::new(40, 30));
    assert_eq!(pipeline.destination(), Dimensions::new(20, 16));
    assert_eq!(pipeline.frame_rate(), 12);
    assert_eq!(pipeline.options().profile.codec, VideoCodec::Mpeg4);
    assert!(!output.exists(), "nothing is opened before init");
}
