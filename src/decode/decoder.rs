//! Streaming decoder: chunk ingestion in, RGBA frames out.
//!
//! Bytes arrive through [`StreamDecoder::ingest_chunk`] in any chunking, and
//! FFmpeg pulls them back through the virtual I/O adapter while demuxing. Each
//! call to [`StreamDecoder::decode_step`] demuxes at most one packet, so the
//! caller stays in control of pacing and retries.

use std::ffi::CString;
use std::os::raw::c_int;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use tracing::{debug, error, info, trace, warn};

use crate::core::geometry::FrameGeometry;
use crate::decode::config::DecoderConfig;
use crate::decode::error::DecodeError;
use crate::decode::frame::FrameView;
use crate::decode::resources::{CodecContext, FormatInput, Frame, Packet, Scaler};
use crate::decode::state::DecoderState;
use crate::io::{AvioContext, IoError, SourceCell, VirtualIo};

/// Result of a decode step that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    /// A frame was written to the output buffer
    Frame,
    /// Packet consumed, the decoder needs more input
    NeedMore,
    /// Packet belonged to another stream
    Skipped,
    /// Not enough data buffered yet
    Pending,
}

/// FFmpeg resources that exist between open and close.
///
/// Fields drop in declaration order, which is the release order: the output
/// buffer first, the I/O context (still referenced by `input`) last.
struct Pipeline {
    output: Vec<u8>,
    frame: Frame,
    scaler: Option<Scaler>,
    decoder: CodecContext,
    input: FormatInput,
    avio: AvioContext,
    video_stream: usize,
    geometry: FrameGeometry,
    draining: bool, // The decoder may still hold frames from the last packet
}

/// Zeroed output buffer; failure is reported instead of aborting
fn alloc_output(len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut output = Vec::new();
    output
        .try_reserve_exact(len)
        .map_err(|_| DecodeError::Allocation("output buffer"))?;
    output.resize(len, 0);
    Ok(output)
}

impl Pipeline {
    fn open(config: &DecoderConfig, source: &SourceCell) -> Result<Self, DecodeError> {
        ffmpeg::init().map_err(DecodeError::Init)?;

        let name = CString::new(config.source_name.as_str())
            .map_err(|_| DecodeError::InvalidSourceName(config.source_name.clone()))?;

        // SAFETY: the source cell outlives the pipeline, see StreamDecoder field order
        let mut avio = unsafe {
            AvioContext::new(source.as_opaque(), config.io_buffer_size(), config.has_fixed_block_size())
        }
        .ok_or(DecodeError::Allocation("AVIOContext"))?;

        let mut input = FormatInput::open(&avio, &name)?;

        // Streams found by the header alone remain usable if probing ahead fails
        if let Err(err) = input.find_stream_info().map_err(DecodeError::StreamInfo) {
            warn!(source = %config.source_name, %err, "continuing without full stream info");
        }

        let video_stream = input
            .first_stream_of(ffi::AVMediaType::AVMEDIA_TYPE_VIDEO)
            .ok_or(DecodeError::NoVideoStream)?;
        let params = input
            .codec_parameters(video_stream)
            .ok_or(DecodeError::NoVideoStream)?;

        // SAFETY: params belong to a stream of `input`, alive for this call
        let decoder = unsafe { CodecContext::open_decoder(params)? };

        let (width, height) = (decoder.width(), decoder.height());
        if width <= 0 || height <= 0 {
            return Err(DecodeError::InvalidDimensions { width, height });
        }

        let geometry = FrameGeometry::negotiate(width as u32, height as u32, config.max_dimension)
            .ok_or(DecodeError::DimensionsCollapsed {
                width: width as u32,
                height: height as u32,
                max_dimension: config.max_dimension,
            })?;

        debug!(
            streams = input.stream_count(),
            video_stream,
            codec = %decoder.codec_name(),
            source_width = width,
            source_height = height,
            width = geometry.width,
            height = geometry.height,
            "video stream selected"
        );

        let frame = Frame::alloc()?;
        let output = alloc_output(geometry.byte_size)?;

        // Probing may have stopped at the end of the buffered data
        avio.clear_error();

        Ok(Self {
            output,
            frame,
            scaler: None,
            decoder,
            input,
            avio,
            video_stream,
            geometry,
            draining: false,
        })
    }

    fn step(&mut self, input_sealed: bool) -> Result<StepOutcome, DecodeError> {
        if self.draining {
            if self.receive_frame()? {
                return Ok(StepOutcome::Frame);
            }
            self.draining = false;
        }

        let mut packet = Packet::alloc()?;
        if let Err(code) = self.input.read_packet(&mut packet) {
            return self.read_failed(code, input_sealed);
        }

        if packet.stream_index() != self.video_stream {
            trace!(stream = packet.stream_index(), "skipping packet");
            return Ok(StepOutcome::Skipped);
        }

        if self.scaler.is_none() {
            let scaler = Scaler::new(
                self.decoder.width(),
                self.decoder.height(),
                self.decoder.pixel_format(),
                self.geometry.width as c_int,
                self.geometry.height as c_int,
            )
            .ok_or(DecodeError::ScalerCreation)?;
            self.scaler = Some(scaler);
        }

        trace!(size = packet.size(), "decoding packet");
        let ret = self.decoder.send_packet(&packet);
        if ret < 0 {
            return Err(DecodeError::Decode(ffmpeg::Error::from(ret)));
        }

        if self.receive_frame()? {
            self.draining = true;
            Ok(StepOutcome::Frame)
        } else {
            Ok(StepOutcome::NeedMore)
        }
    }

    /// Classify a failed `av_read_frame`
    fn read_failed(&mut self, code: c_int, input_sealed: bool) -> Result<StepOutcome, DecodeError> {
        let again = IoError::WouldBlock.to_averror();

        // Running out of buffered bytes can surface as EOF with EAGAIN left
        // behind on the I/O context
        let transient = code == again || (code == ffi::AVERROR_EOF && !input_sealed && self.avio.error() == again);
        if transient {
            self.avio.clear_error();
            trace!("waiting for more data");
            return Ok(StepOutcome::Pending);
        }

        if code == ffi::AVERROR_EOF {
            Err(DecodeError::EndOfStream)
        } else {
            Err(DecodeError::Read(ffmpeg::Error::from(code)))
        }
    }

    /// Pull one frame from the decoder and scale it into the output buffer
    fn receive_frame(&mut self) -> Result<bool, DecodeError> {
        let ret = self.decoder.receive_frame(&mut self.frame);
        if ret == ffi::AVERROR(libc::EAGAIN) || ret == ffi::AVERROR_EOF {
            return Ok(false);
        }
        if ret < 0 {
            return Err(DecodeError::Decode(ffmpeg::Error::from(ret)));
        }

        let scaler = self.scaler.as_mut().ok_or(DecodeError::ScalerCreation)?;
        scaler.scale(&self.frame, &mut self.output, self.geometry.stride)?;
        Ok(true)
    }
}

/// Decoder for a video stream delivered as byte chunks.
///
/// Failures never surface as errors: they are logged and move the decoder
/// to [`DecoderState::Failed`], which is terminal. A failed decoder must be
/// replaced by a new one.
pub struct StreamDecoder {
    config: DecoderConfig,
    state: DecoderState,
    geometry: Option<FrameGeometry>,
    // Declared before `source`: FFmpeg holds a pointer into it
    pipeline: Option<Pipeline>,
    source: SourceCell,
}

// SAFETY: every FFmpeg object and the I/O source are exclusively owned by
// the decoder and only touched through &mut self
unsafe impl Send for StreamDecoder {}

impl StreamDecoder {
    /// Create a decoder from host-supplied hints.
    ///
    /// `block_size_hint` of 0 or 1 selects the default I/O buffer size and
    /// `max_dimension_hint` of 0 disables downscaling. Negative hints count as 0.
    pub fn new(source_name: impl Into<String>, block_size_hint: i32, max_dimension_hint: i32) -> Self {
        Self::with_config(DecoderConfig::new(source_name, block_size_hint, max_dimension_hint))
    }

    /// Create a decoder from a config
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            config,
            state: DecoderState::Init,
            geometry: None,
            pipeline: None,
            source: SourceCell::new(VirtualIo::new()),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Size in bytes of the output buffer, 0 before a successful open
    pub fn frame_byte_size(&self) -> usize {
        self.geometry.map_or(0, |g| g.byte_size)
    }

    /// Width of decoded frames, 0 before a successful open
    pub fn frame_width(&self) -> u32 {
        self.geometry.map_or(0, |g| g.width)
    }

    /// Height of decoded frames, 0 before a successful open
    pub fn frame_height(&self) -> u32 {
        self.geometry.map_or(0, |g| g.height)
    }

    /// Geometry negotiated at open
    pub fn geometry(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    /// Total bytes ingested so far
    pub fn buffered_size(&self) -> u64 {
        self.source.get().store().size()
    }

    /// Whether pipeline resources are currently held
    pub fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Append a chunk of the stream. Never fails and never changes the state.
    pub fn ingest_chunk(&mut self, chunk: impl Into<Vec<u8>>) {
        let store = self.source.get_mut().store_mut();
        store.append(chunk);
        trace!(chunks = store.chunk_count(), total = store.size(), "chunk ingested");
    }

    /// Declare that no further chunks will arrive.
    ///
    /// Reads past the end then report end of stream instead of "retry later".
    pub fn end_of_input(&mut self) {
        self.source.get_mut().store_mut().seal();
        debug!(total = self.buffered_size(), "input sealed");
    }

    /// Open the stream from the bytes ingested so far.
    ///
    /// Only the first call does any work; later calls report whether the
    /// decoder has not failed.
    pub fn open(&mut self) -> bool {
        if self.state == DecoderState::Init {
            self.source.get_mut().set_probing(true);
            let opened = Pipeline::open(&self.config, &self.source);
            self.source.get_mut().set_probing(false);

            match opened {
                Ok(pipeline) => {
                    info!(
                        source = %self.config.source_name,
                        width = pipeline.geometry.width,
                        height = pipeline.geometry.height,
                        frame_size = pipeline.geometry.byte_size,
                        "stream opened"
                    );
                    self.geometry = Some(pipeline.geometry);
                    self.pipeline = Some(pipeline);
                    self.state = DecoderState::Running;
                }
                Err(err) => {
                    error!(source = %self.config.source_name, %err, "failed to open stream");
                    self.state = DecoderState::Failed;
                }
            }
        }

        !self.state.is_failed()
    }

    /// Demux one packet and decode it if it belongs to the video stream.
    ///
    /// Returns the resulting state. Does nothing once failed, closed or
    /// before a successful open.
    pub fn decode_step(&mut self) -> DecoderState {
        if !self.state.is_active() {
            return self.state;
        }

        let input_sealed = self.source.get().store().is_sealed();
        let Some(pipeline) = self.pipeline.as_mut() else {
            return self.state;
        };

        match pipeline.step(input_sealed) {
            Ok(StepOutcome::Frame) => self.state = DecoderState::HasFrame,
            Ok(_) => {}
            Err(DecodeError::EndOfStream) => {
                info!(source = %self.config.source_name, "end of stream");
                self.state = DecoderState::Failed;
            }
            Err(err) => {
                error!(source = %self.config.source_name, %err, "decode failed");
                self.state = DecoderState::Failed;
            }
        }

        self.state
    }

    /// Borrow the output buffer and mark the frame as consumed.
    ///
    /// Callers should check for [`DecoderState::HasFrame`] first; the buffer
    /// is returned in any state. It is overwritten by the next decode step
    /// that produces a frame.
    pub fn take_frame(&mut self) -> FrameView<'_> {
        self.state = self.state.after_take();

        match &self.pipeline {
            Some(pipeline) => {
                let g = pipeline.geometry;
                FrameView::new(&pipeline.output, g.width, g.height, g.stride)
            }
            None => FrameView::empty(),
        }
    }

    /// Release all FFmpeg resources. Safe to call repeatedly or before open.
    pub fn close(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            drop(pipeline);
            info!(source = %self.config.source_name, "stream closed");
        }
    }
}

impl Drop for StreamDecoder {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_decoder() {
        let decoder = StreamDecoder::new("clip.mp4", 0, 480);
        assert_eq!(decoder.state(), DecoderState::Init);
        assert_eq!(decoder.frame_byte_size(), 0);
        assert_eq!(decoder.frame_width(), 0);
        assert_eq!(decoder.frame_height(), 0);
        assert!(!decoder.is_open());
    }

    #[test]
    fn test_ingest_does_not_change_state() {
        let mut decoder = StreamDecoder::new("clip.mp4", 0, 0);
        decoder.ingest_chunk(vec![1u8; 100]);
        decoder.ingest_chunk(&[2u8; 28][..]);

        assert_eq!(decoder.buffered_size(), 128);
        assert_eq!(decoder.state(), DecoderState::Init);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut decoder = StreamDecoder::new("clip.mp4", 0, 0);
        decoder.close();
        decoder.close();
        assert_eq!(decoder.state(), DecoderState::Init);
    }

    #[test]
    fn test_decode_before_open_is_noop() {
        let mut decoder = StreamDecoder::new("clip.mp4", 0, 0);
        assert_eq!(decoder.decode_step(), DecoderState::Init);
        assert!(decoder.take_frame().is_empty());
        assert_eq!(decoder.state(), DecoderState::Init);
    }

    #[test]
    fn test_open_without_data_fails() {
        let mut decoder = StreamDecoder::new("clip.mp4", 0, 0);
        assert!(!decoder.open());
        assert_eq!(decoder.state(), DecoderState::Failed);
        assert!(!decoder.is_open());
        assert!(!decoder.source.get().is_probing());

        // Failure is terminal
        assert!(!decoder.open());
        assert_eq!(decoder.decode_step(), DecoderState::Failed);
        assert_eq!(decoder.take_frame().len(), 0);
        assert_eq!(decoder.state(), DecoderState::Failed);
        decoder.close();
    }

    #[test]
    fn test_output_allocation() {
        let output = alloc_output(320 * 240 * 4).unwrap();
        assert_eq!(output.len(), 320 * 240 * 4);
        assert!(output.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_oversized_output_is_an_error() {
        let err = alloc_output(usize::MAX).unwrap_err();
        assert!(matches!(err, DecodeError::Allocation("output buffer")));
    }

    #[test]
    fn test_source_name_with_nul_fails_open() {
        let mut decoder = StreamDecoder::new("bad\0name", 0, 0);
        decoder.ingest_chunk(vec![0u8; 16]);
        assert!(!decoder.open());
        assert_eq!(decoder.state(), DecoderState::Failed);
    }
}
