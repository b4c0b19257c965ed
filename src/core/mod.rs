//! Core data types for the stream decoder.
//!
//! This module holds the pure data side of the decoder: the chunk store that
//! backs the virtual byte stream, and the output frame geometry.

pub mod chunk_store;
pub mod geometry;

pub use chunk_store::ChunkStore;
pub use geometry::{fit_dimensions, FrameGeometry};
