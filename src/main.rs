//! Replays a video file through the streaming decoder as a series of chunks.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use ffmpeg_next::util::log::{self as av_log, Level};
use tracing::{info, warn};

use stream_decoder::logging::init_logging;
use stream_decoder::{DecoderConfig, DecoderState, StreamDecoder};

#[derive(Parser, Debug)]
#[command(name = "stream-decoder", version, about = "Decode a video fed in as byte chunks")]
struct Args {
    /// Video file to replay
    input: PathBuf,

    /// Fixed block size of the source in bytes (0 = unknown)
    #[arg(long, default_value_t = 0)]
    block_size: i32,

    /// Largest width or height of decoded frames (0 = no limit)
    #[arg(long, default_value_t = 480)]
    max_dimension: i32,

    /// Number of chunks to split the file into
    #[arg(long, default_value_t = 10)]
    chunks: usize,

    /// Number of frames to decode before stopping
    #[arg(long, default_value_t = 10)]
    frames: usize,

    /// Upper bound on decode steps
    #[arg(long, default_value_t = 10_000)]
    max_steps: usize,

    /// Mark the input complete after the last chunk
    #[arg(long)]
    seal: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// FFmpeg's own log level
    #[arg(long, value_enum, default_value_t = FfmpegLog::Error)]
    ffmpeg_log: FfmpegLog,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FfmpegLog {
    Quiet,
    Error,
    Warning,
    Info,
    Verbose,
    Debug,
}

impl From<FfmpegLog> for Level {
    fn from(level: FfmpegLog) -> Self {
        match level {
            FfmpegLog::Quiet => Level::Quiet,
            FfmpegLog::Error => Level::Error,
            FfmpegLog::Warning => Level::Warning,
            FfmpegLog::Info => Level::Info,
            FfmpegLog::Verbose => Level::Verbose,
            FfmpegLog::Debug => Level::Debug,
        }
    }
}

/// Split `data` into `count` chunks of near-equal size
fn split_chunks(data: &[u8], count: usize) -> impl Iterator<Item = &[u8]> {
    let size = data.len().div_ceil(count.max(1)).max(1);
    data.chunks(size)
}

fn checksum(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| acc.wrapping_mul(31).wrapping_add(b as u64))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);
    av_log::set_level(args.ffmpeg_log.into());

    let data = fs::read(&args.input).with_context(|| format!("failed to read {}", args.input.display()))?;
    if data.is_empty() {
        bail!("{} is empty", args.input.display());
    }

    let name = args
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let config = DecoderConfig::new(name, args.block_size, args.max_dimension);
    let mut decoder = StreamDecoder::with_config(config);

    for chunk in split_chunks(&data, args.chunks) {
        decoder.ingest_chunk(chunk);
    }
    if args.seal {
        decoder.end_of_input();
    }
    info!(bytes = data.len(), chunks = args.chunks, sealed = args.seal, "input buffered");

    if !decoder.open() {
        bail!("failed to open {}", decoder.config().source_name);
    }
    if let Some(geometry) = decoder.geometry() {
        info!(
            source_width = geometry.source_width,
            source_height = geometry.source_height,
            width = geometry.width,
            height = geometry.height,
            downscaled = geometry.is_downscaled(),
            frame_size = geometry.byte_size,
            "decoder ready"
        );
    }

    let mut decoded = 0;
    let mut steps = 0;
    while decoded < args.frames && steps < args.max_steps {
        steps += 1;
        match decoder.decode_step() {
            DecoderState::HasFrame => {
                let frame = decoder.take_frame();
                info!(
                    frame = decoded,
                    width = frame.width(),
                    height = frame.height(),
                    checksum = checksum(&frame),
                    "frame decoded"
                );
                decoded += 1;
            }
            state if state.is_terminal() => break,
            _ => {}
        }
    }

    if decoded < args.frames {
        warn!(decoded, requested = args.frames, steps, state = ?decoder.state(), "stopped early");
    }

    decoder.close();
    info!(decoded, steps, "done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chunks() {
        let data: Vec<u8> = (0..100).collect();
        let chunks: Vec<&[u8]> = split_chunks(&data, 10).collect();
        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c.len() == 10));

        let chunks: Vec<&[u8]> = split_chunks(&data, 3).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), data);

        assert_eq!(split_chunks(&data, 0).count(), 1);
        assert_eq!(split_chunks(&data[..2], 5).count(), 2);
    }
}
