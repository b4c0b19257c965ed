//! Streaming video frame decoder.
//!
//! A video file arrives as an ordered series of byte chunks. The decoder
//! buffers them, feeds them to FFmpeg through a virtual byte stream and hands
//! back frames as tightly sized RGBA8 buffers, optionally downscaled.
//!
//! ```no_run
//! use stream_decoder::{DecoderState, StreamDecoder};
//!
//! # fn chunks() -> Vec<Vec<u8>> { Vec::new() }
//! let mut decoder = StreamDecoder::new("clip.mp4", 0, 480);
//! for chunk in chunks() {
//!     decoder.ingest_chunk(chunk);
//! }
//! decoder.end_of_input();
//!
//! if decoder.open() {
//!     while decoder.decode_step() != DecoderState::Failed {
//!         if decoder.state() == DecoderState::HasFrame {
//!             let frame = decoder.take_frame();
//!             println!("{}x{}: {} bytes", frame.width(), frame.height(), frame.len());
//!         }
//!     }
//! }
//! decoder.close();
//! ```

pub mod core;
pub mod decode;
pub mod io;
pub mod logging;

pub use crate::core::{ChunkStore, FrameGeometry};
pub use decode::{DecodeError, DecoderConfig, DecoderState, FrameView, StreamDecoder};
