use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framepipe::{
    Dimensions, EncodePipeline, EncoderProfile, FfmpegLogLevel, PipelineOptions, ScalingQuality,
    SourcePixelFormat, VideoCodec,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framepipe images renders/ --out movie.mp4 --fps 24 --progress\n  framepipe images shots/ --out small.mp4 --size 640x360 --codec mpeg4\n  framepipe pattern --out ramp.mp4 --size 320x240 --frames 600 --json\n  framepipe completions zsh > _framepipe";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tiff", "tif", "webp"];

#[derive(Debug, Parser)]
#[command(
    name = "framepipe",
    version,
    about = "Encode raw frames or image sequences into a video file",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting an existing output file.
    #[arg(long, global = true)]
    overwrite: bool,

    /// Print a machine-readable JSON summary instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Args, Clone, Default)]
struct EncodeArgs {
    /// Output video file; the container is chosen from the extension.
    #[arg(long)]
    out: PathBuf,

    /// Frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Codec: h264 | h265 | mpeg4.
    #[arg(long)]
    codec: Option<String>,

    /// Encoder speed preset (e.g. veryfast, medium).
    #[arg(long)]
    preset: Option<String>,

    /// Encoder content tuning (e.g. animation, film).
    #[arg(long)]
    tune: Option<String>,

    /// Constant Rate Factor (lower is better quality).
    #[arg(long)]
    crf: Option<u32>,

    /// Resampling: point | fast-bilinear | bilinear | bicubic | lanczos.
    #[arg(long)]
    scaling: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encode every image in a directory, in file name order.
    #[command(
        about = "Encode an image sequence",
        after_help = "Examples:\n  framepipe images renders/ --out movie.mp4\n  framepipe images renders/ --out movie.mkv --size 1280x720 --codec h265 --crf 26"
    )]
    Images {
        /// Directory containing the frames.
        input: PathBuf,

        /// Output size as WIDTHxHEIGHT. Defaults to the first image's size.
        #[arg(long)]
        size: Option<String>,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Encode a synthetic grey ramp, useful for checking an FFmpeg build.
    #[command(
        about = "Encode a synthetic test pattern",
        after_help = "Examples:\n  framepipe pattern --out ramp.mp4\n  framepipe pattern --out ramp.mp4 --size 2000x2000 --frames 6000 --fps 60"
    )]
    Pattern {
        /// Frame size as WIDTHxHEIGHT.
        #[arg(long, default_value = "640x480")]
        size: String,

        /// Number of frames to encode.
        #[arg(long, default_value_t = 300)]
        frames: u64,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_size(value: &str) -> Option<Dimensions> {
    let (width, height) = value.trim().split_once(['x', 'X'])?;
    let width = width.trim().parse::<u32>().ok()?;
    let height = height.trim().parse::<u32>().ok()?;
    let size = Dimensions::new(width, height);
    (!size.is_empty()).then_some(size)
}

fn parse_scaling(value: &str) -> Option<ScalingQuality> {
    match value.to_ascii_lowercase().as_str() {
        "point" | "nearest" => Some(ScalingQuality::Point),
        "fast-bilinear" | "fast_bilinear" => Some(ScalingQuality::FastBilinear),
        "bilinear" => Some(ScalingQuality::Bilinear),
        "bicubic" => Some(ScalingQuality::Bicubic),
        "lanczos" => Some(ScalingQuality::Lanczos),
        _ => None,
    }
}

fn build_options(
    encode: &EncodeArgs,
    source_format: SourcePixelFormat,
) -> Result<PipelineOptions, Box<dyn std::error::Error>> {
    let codec = match &encode.codec {
        Some(name) => VideoCodec::parse(name).ok_or(format!("unsupported --codec: {name}"))?,
        None => VideoCodec::default(),
    };

    let mut profile = EncoderProfile::for_codec(codec);
    if let Some(preset) = &encode.preset {
        profile = profile.preset(preset);
    }
    if let Some(tune) = &encode.tune {
        profile = profile.tune(tune);
    }
    if let Some(crf) = encode.crf {
        profile = profile.crf(crf);
    }

    let mut options = PipelineOptions::new()
        .with_source_format(source_format)
        .with_profile(profile);
    if let Some(scaling) = &encode.scaling {
        let quality = parse_scaling(scaling).ok_or(format!("unsupported --scaling: {scaling}"))?;
        options = options.with_scaling(quality);
    }
    Ok(options)
}

fn list_images(directory: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut images: Vec<PathBuf> = fs::read_dir(directory)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|extension| extension.to_str())
                    .is_some_and(|extension| {
                        IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
                    })
        })
        .collect();
    images.sort();
    Ok(images)
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn progress_bar(
    global: &GlobalOptions,
    total: u64,
) -> Result<Option<ProgressBar>, Box<dyn std::error::Error>> {
    if !global.progress {
        return Ok(None);
    }
    let bar = ProgressBar::new(total);
    let style =
        ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
    bar.set_style(style.progress_chars("##-"));
    Ok(Some(bar))
}

fn report(global: &GlobalOptions, pipeline: &EncodePipeline) {
    if global.json {
        let payload = json!({
            "output": pipeline.output_path().display().to_string(),
            "frames": pipeline.frame_count(),
            "duration_seconds": pipeline.duration().as_secs_f64(),
            "frame_rate": pipeline.frame_rate(),
            "source": {
                "width": pipeline.source().width,
                "height": pipeline.source().height,
            },
            "destination": {
                "width": pipeline.destination().width,
                "height": pipeline.destination().height,
            },
            "codec": format!("{:?}", pipeline.options().profile.codec),
        });
        println!("{payload}");
    } else {
        println!(
            "{} {}",
            "success:".green().bold(),
            format!(
                "Encoded {} frame(s) ({:.2}s) to {}",
                pipeline.frame_count(),
                pipeline.duration().as_secs_f64(),
                pipeline.output_path().display()
            )
            .green()
        );
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if let Some(level) = &cli.global.log_level {
        let parsed =
            FfmpegLogLevel::parse(level).ok_or(format!("unsupported --log-level: {level}"))?;
        framepipe::set_ffmpeg_log_level(parsed);
    }
    if cli.global.verbose {
        if let Some(level) = framepipe::get_ffmpeg_log_level() {
            eprintln!("FFmpeg log level: {level:?}");
        }
    }

    match cli.command {
        Commands::Images {
            input,
            size,
            encode,
        } => {
            let images = list_images(&input)?;
            let Some(first) = images.first() else {
                return Err(format!("no images found in {}", input.display()).into());
            };
            ensure_writable_path(&encode.out, cli.global.overwrite)?;

            let first_image = image::open(first)?;
            let source = Dimensions::new(first_image.width(), first_image.height());
            let destination = match &size {
                Some(value) => parse_size(value).ok_or(format!("invalid --size: {value}"))?,
                None => source,
            };

            let options = build_options(&encode, SourcePixelFormat::Rgba)?;
            let mut pipeline =
                EncodePipeline::with_options(&encode.out, source, destination, encode.fps, options);
            pipeline.init()?;

            let bar = progress_bar(&cli.global, images.len() as u64)?;
            for path in &images {
                let picture = image::open(path)?;
                pipeline.add_image(&picture)?;
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
                if cli.global.verbose {
                    eprintln!("encoded {}", path.display());
                }
            }
            pipeline.finish()?;
            if let Some(bar) = bar {
                bar.finish_with_message("done");
            }

            report(&cli.global, &pipeline);
        }
        Commands::Pattern {
            size,
            frames,
            encode,
        } => {
            let size = parse_size(&size).ok_or(format!("invalid --size: {size}"))?;
            ensure_writable_path(&encode.out, cli.global.overwrite)?;

            let options = build_options(&encode, SourcePixelFormat::Bgra)?;
            let mut pipeline =
                EncodePipeline::with_options(&encode.out, size, size, encode.fps, options);
            pipeline.init()?;

            let bar = progress_bar(&cli.global, frames)?;
            let mut buffer = vec![0u8; pipeline.frame_len()];
            for index in 0..frames {
                buffer.fill((index % 256) as u8);
                pipeline.add_frame(&buffer)?;
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
            pipeline.finish()?;
            if let Some(bar) = bar {
                bar.finish_with_message("done");
            }

            report(&cli.global, &pipeline);
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framepipe", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
